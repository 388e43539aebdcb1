//! Product catalog rules: case-normalized SKU uniqueness and
//! deactivate-instead-of-delete for referenced products.

mod common;

use common::TestContext;
use rust_decimal_macros::dec;

use freshline_api::{
    errors::ServiceError,
    services::products::{
        CreateProductRequest, ProductDeletion, ProductService, UpdateProductRequest,
    },
};

fn request(sku: &str) -> CreateProductRequest {
    CreateProductRequest {
        name: format!("Product {}", sku),
        sku: sku.to_string(),
        category: None,
        unit: "each".to_string(),
        price: dec!(3.00),
        cost: dec!(1.50),
        min_stock_level: 5,
    }
}

#[tokio::test]
async fn skus_are_stored_normalized_and_collisions_rejected() {
    let ctx = TestContext::new().await;
    let service = ProductService::new(ctx.db.clone());

    let created = service.create_product(request("  sku-milk ")).await.unwrap();
    assert_eq!(created.sku, "SKU-MILK");

    let err = service
        .create_product(request("SKU-MILK"))
        .await
        .expect_err("case-insensitive duplicate must fail");
    assert!(matches!(err, ServiceError::DuplicateConstraint(_)));

    let err = service
        .create_product(request("sku-milk"))
        .await
        .expect_err("lowercase duplicate must fail");
    assert!(matches!(err, ServiceError::DuplicateConstraint(_)));
}

#[tokio::test]
async fn updating_to_a_taken_sku_is_rejected() {
    let ctx = TestContext::new().await;
    let service = ProductService::new(ctx.db.clone());

    service.create_product(request("SKU-ONE")).await.unwrap();
    let two = service.create_product(request("SKU-TWO")).await.unwrap();

    let err = service
        .update_product(
            two.id,
            UpdateProductRequest {
                sku: Some("sku-one".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect_err("stealing another product's SKU must fail");
    assert!(matches!(err, ServiceError::DuplicateConstraint(_)));

    // Re-saving a product under its own SKU is fine.
    let unchanged = service
        .update_product(
            two.id,
            UpdateProductRequest {
                sku: Some("SKU-TWO".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(unchanged.sku, "SKU-TWO");
}

#[tokio::test]
async fn referenced_products_are_deactivated_instead_of_deleted() {
    let ctx = TestContext::new().await;
    let store = ctx.seed_store("Keeper").await;
    let product = ctx.seed_product("KEEP-1", dec!(2.00), 0).await;
    ctx.create_simple_order(store.id, product.id, 1).await;

    let service = ProductService::new(ctx.db.clone());
    let outcome = service.delete_product(product.id).await.unwrap();

    match outcome {
        ProductDeletion::Deactivated { product } => {
            assert!(!product.is_active);
        }
        ProductDeletion::Deleted { .. } => panic!("referenced product must not be hard-deleted"),
    }

    // Still fetchable, just inactive.
    let fetched = service.get_product(product.id).await.unwrap();
    assert!(!fetched.is_active);
}

#[tokio::test]
async fn unreferenced_products_are_removed() {
    let ctx = TestContext::new().await;
    let product = ctx.seed_product("GONE-1", dec!(2.00), 0).await;

    let service = ProductService::new(ctx.db.clone());
    let outcome = service.delete_product(product.id).await.unwrap();
    assert!(matches!(outcome, ProductDeletion::Deleted { .. }));

    let err = service
        .get_product(product.id)
        .await
        .expect_err("deleted product must be gone");
    assert!(matches!(err, ServiceError::NotFound(_)));
}
