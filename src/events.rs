//! Domain events emitted by the service layer.
//!
//! Events are fire-and-forget: a send failure is logged by the caller and
//! never escalated into the triggering operation.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Order events
    OrderCreated(Uuid),
    OrderItemsUpdated(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    OrderApproved {
        order_id: Uuid,
        store_id: Uuid,
        final_amount: Decimal,
    },
    OrderRejected(Uuid),
    OrderCancelled(Uuid),
    OrderCompleted(Uuid),

    // Stock events
    StockApplied {
        store_id: Uuid,
        product_id: Uuid,
        old_quantity: i32,
        new_quantity: i32,
        reason: String,
    },

    // Document events
    KitchenSheetGenerated {
        order_id: Uuid,
        sheet_id: Uuid,
    },
    KitchenSheetCompleted(Uuid),
    DeliveryGenerated {
        order_id: Uuid,
        delivery_id: Uuid,
    },
    DeliveryStatusChanged {
        delivery_id: Uuid,
        old_status: String,
        new_status: String,
    },
    InvoiceGenerated {
        order_id: Uuid,
        invoice_id: Uuid,
    },

    // Returns and payments
    ReturnsRecorded {
        delivery_id: Uuid,
        line_count: usize,
        return_amount: Decimal,
    },
    PaymentRecorded {
        invoice_id: Uuid,
        amount: Decimal,
    },

    // Replenishment
    ReplenishmentDraftCreated {
        store_id: Uuid,
        order_id: Uuid,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Creates a bounded event channel.
pub fn channel(buffer: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(buffer);
    (EventSender::new(tx), rx)
}

/// Drains the event channel, logging each event. Runs until every sender is
/// dropped. Downstream consumers (webhooks, analytics) would hang off this
/// loop; the core only requires that events are observed somewhere.
pub async fn run_event_logger(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        info!(?event, "domain event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_delivers_to_receiver() {
        let (sender, mut rx) = channel(8);
        let order_id = Uuid::new_v4();
        sender.send(Event::OrderCreated(order_id)).await.unwrap();

        match rx.recv().await {
            Some(Event::OrderCreated(id)) => assert_eq!(id, order_id),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn send_fails_when_receiver_dropped() {
        let (sender, rx) = channel(1);
        drop(rx);
        assert!(sender.send(Event::OrderCancelled(Uuid::new_v4())).await.is_err());
    }
}
