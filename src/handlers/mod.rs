//! Thin HTTP layer over the service layer: JSON in, `ApiResponse` envelope
//! out. Business rules live in the services; handlers only extract, call,
//! and wrap.

pub mod deliveries;
pub mod kitchen;
pub mod orders;
pub mod payments;
pub mod products;
pub mod replenishment;
pub mod returns;
pub mod stock;

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::{
    config::AppConfig,
    events::EventSender,
    services::{
        approval::ApprovalService, deliveries::DeliveryService, documents::DocumentService,
        invoicing::InvoicingService, kitchen::KitchenService, notifications::NotificationService,
        orders::OrderService, payments::PaymentService, products::ProductService,
        replenishment::ReplenishmentService, returns::ReturnsService, stock::StockService,
        stores::StoreService,
    },
};

/// The fully wired service set shared by all handlers.
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<OrderService>,
    pub approval: Arc<ApprovalService>,
    pub stock: Arc<StockService>,
    pub replenishment: Arc<ReplenishmentService>,
    pub returns: Arc<ReturnsService>,
    pub invoicing: Arc<InvoicingService>,
    pub payments: Arc<PaymentService>,
    pub kitchen: Arc<KitchenService>,
    pub deliveries: Arc<DeliveryService>,
    pub documents: Arc<DocumentService>,
    pub notifications: Arc<NotificationService>,
    pub products: Arc<ProductService>,
    pub stores: Arc<StoreService>,
}

impl AppServices {
    pub fn build(
        db: Arc<DatabaseConnection>,
        event_sender: Option<Arc<EventSender>>,
        config: &AppConfig,
    ) -> Self {
        Self {
            orders: Arc::new(OrderService::new(db.clone(), event_sender.clone())),
            approval: Arc::new(ApprovalService::new(
                db.clone(),
                event_sender.clone(),
                config.invoice_due_days,
            )),
            stock: Arc::new(StockService::new(db.clone(), event_sender.clone())),
            replenishment: Arc::new(ReplenishmentService::new(db.clone(), event_sender.clone())),
            returns: Arc::new(ReturnsService::new(db.clone(), event_sender.clone())),
            invoicing: Arc::new(InvoicingService::new(
                db.clone(),
                event_sender.clone(),
                config.invoice_due_days,
            )),
            payments: Arc::new(PaymentService::new(db.clone(), event_sender.clone())),
            kitchen: Arc::new(KitchenService::new(db.clone(), event_sender.clone())),
            deliveries: Arc::new(DeliveryService::new(db.clone(), event_sender)),
            documents: Arc::new(DocumentService::new(db.clone())),
            notifications: Arc::new(NotificationService::new(db.clone())),
            products: Arc::new(ProductService::new(db.clone())),
            stores: Arc::new(StoreService::new(db)),
        }
    }
}
