//! Kitchen sheet workflow: per-item preparation, sheet completion, and the
//! grouped document views.

mod common;

use chrono::{Duration, Utc};
use common::TestContext;
use rust_decimal_macros::dec;
use uuid::Uuid;

use freshline_api::{
    entities::enums::KitchenSheetStatus,
    services::{
        approval::ApprovalService, documents::DocumentService, invoicing, kitchen::KitchenService,
    },
};

#[tokio::test]
async fn sheet_completes_only_when_every_item_is_prepared() {
    let ctx = TestContext::new().await;
    let store = ctx.seed_store("Kitchen").await;
    let flour = ctx.seed_product("KIT-FLOUR", dec!(1.50), 0).await;
    let milk = ctx.seed_product("KIT-MILK", dec!(0.90), 0).await;
    ctx.seed_stock(store.id, flour.id, 50).await;
    ctx.seed_stock(store.id, milk.id, 50).await;

    let details = ctx
        .create_order(store.id, vec![(flour.id, 10), (milk.id, 4)])
        .await;
    let outcome = ApprovalService::new(ctx.db.clone(), None, invoicing::DEFAULT_DUE_DAYS)
        .approve_order(details.order.id, Uuid::new_v4())
        .await
        .unwrap();

    let sheet = outcome.kitchen_sheet.expect("sheet expected");
    let kitchen = KitchenService::new(ctx.db.clone(), None);
    let (_, items) = kitchen.get_sheet(sheet.id).await.unwrap();
    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|item| !item.prepared));

    let actor = Uuid::new_v4();
    let expiry = Utc::now().date_naive() + Duration::days(7);

    kitchen
        .mark_item_prepared(
            items[0].id,
            actor,
            Some("BATCH-7".to_string()),
            Some(expiry),
        )
        .await
        .unwrap();

    let (sheet_mid, _) = kitchen.get_sheet(sheet.id).await.unwrap();
    assert_eq!(sheet_mid.status, KitchenSheetStatus::Pending.to_string());
    assert!(sheet_mid.completed_at.is_none());

    kitchen
        .mark_item_prepared(items[1].id, actor, None, None)
        .await
        .unwrap();

    let (sheet_done, done_items) = kitchen.get_sheet(sheet.id).await.unwrap();
    assert_eq!(sheet_done.status, KitchenSheetStatus::Completed.to_string());
    assert!(sheet_done.completed_at.is_some());
    assert!(done_items.iter().all(|item| item.prepared));

    let prepared = done_items.iter().find(|i| i.id == items[0].id).unwrap();
    assert_eq!(prepared.batch_number.as_deref(), Some("BATCH-7"));
    assert_eq!(prepared.expiry_date, Some(expiry));
    assert_eq!(prepared.prepared_by, Some(actor));
}

#[tokio::test]
async fn preparing_an_item_twice_is_harmless() {
    let ctx = TestContext::new().await;
    let store = ctx.seed_store("Twice").await;
    let product = ctx.seed_product("TWI-1", dec!(1.00), 0).await;
    ctx.seed_stock(store.id, product.id, 50).await;

    let details = ctx.create_simple_order(store.id, product.id, 5).await;
    let outcome = ApprovalService::new(ctx.db.clone(), None, invoicing::DEFAULT_DUE_DAYS)
        .approve_order(details.order.id, Uuid::new_v4())
        .await
        .unwrap();

    let kitchen = KitchenService::new(ctx.db.clone(), None);
    let (_, items) = kitchen
        .get_sheet(outcome.kitchen_sheet.unwrap().id)
        .await
        .unwrap();

    let first_actor = Uuid::new_v4();
    let first = kitchen
        .mark_item_prepared(items[0].id, first_actor, Some("B-1".to_string()), None)
        .await
        .unwrap();
    let second = kitchen
        .mark_item_prepared(items[0].id, Uuid::new_v4(), Some("B-2".to_string()), None)
        .await
        .unwrap();

    // The second call returns the existing state untouched.
    assert_eq!(second.batch_number, first.batch_number);
    assert_eq!(second.prepared_by, Some(first_actor));
}

#[tokio::test]
async fn documents_group_by_category_and_expiry() {
    let ctx = TestContext::new().await;
    let store = ctx.seed_store("Grouped").await;

    // seed_product assigns the "pantry" category; give one product its own.
    let bread = ctx.seed_product("GRO-BREAD", dec!(2.00), 0).await;
    let cheese = ctx.seed_product("GRO-CHEESE", dec!(4.00), 0).await;
    {
        use freshline_api::services::products::{ProductService, UpdateProductRequest};
        ProductService::new(ctx.db.clone())
            .update_product(
                cheese.id,
                UpdateProductRequest {
                    category: Some(Some("dairy".to_string())),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }
    ctx.seed_stock(store.id, bread.id, 50).await;
    ctx.seed_stock(store.id, cheese.id, 50).await;

    let details = ctx
        .create_order(store.id, vec![(bread.id, 3), (cheese.id, 2)])
        .await;
    let outcome = ApprovalService::new(ctx.db.clone(), None, invoicing::DEFAULT_DUE_DAYS)
        .approve_order(details.order.id, Uuid::new_v4())
        .await
        .unwrap();
    let sheet_id = outcome.kitchen_sheet.unwrap().id;

    let kitchen = KitchenService::new(ctx.db.clone(), None);
    let (_, items) = kitchen.get_sheet(sheet_id).await.unwrap();
    let cheese_item = items.iter().find(|i| i.product_id == cheese.id).unwrap();
    let soon = Utc::now().date_naive() + Duration::days(2);
    kitchen
        .mark_item_prepared(cheese_item.id, Uuid::new_v4(), None, Some(soon))
        .await
        .unwrap();

    let documents = DocumentService::new(ctx.db.clone());

    let by_category = documents.kitchen_sheet_by_category(sheet_id).await.unwrap();
    let categories: Vec<&str> = by_category.iter().map(|g| g.category.as_str()).collect();
    assert_eq!(categories, vec!["dairy", "pantry"]);

    let by_expiry = documents.kitchen_sheet_by_expiry(sheet_id).await.unwrap();
    assert_eq!(by_expiry.len(), 2);
    assert_eq!(by_expiry[0].expiry_date, Some(soon));
    assert_eq!(by_expiry[1].expiry_date, None);

    let delivery_doc = documents
        .delivery_by_category(outcome.delivery.unwrap().id)
        .await
        .unwrap();
    let total_lines: usize = delivery_doc.iter().map(|g| g.lines.len()).sum();
    assert_eq!(total_lines, 2);
}
