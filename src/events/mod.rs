use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Domain events emitted after successful state changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated(Uuid),
    /// A same-day duplicate was merged into an existing order's lines.
    OrderLinesMerged {
        order_id: Uuid,
        product_ids: Vec<Uuid>,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    OrderDelivered(Uuid),
    OrderNullified(Uuid),
    OrderUpdated(Uuid),

    CustomerCreated(Uuid),
    CustomerUpdated(Uuid),
    CustomerDeleted(Uuid),

    ProductCreated(Uuid),
    ProductUpdated(Uuid),
    ProductStockChanged {
        product_id: Uuid,
        old_stock: i32,
        new_stock: i32,
    },
    ProductDeleted(Uuid),

    UserCreated(Uuid),
    UserUpdated(Uuid),
    UserDeleted(Uuid),
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event. A full or closed channel is logged and swallowed:
    /// event delivery must never fail the request that produced it.
    pub async fn send(&self, event: Event) {
        if let Err(e) = self.sender.send(event).await {
            warn!(error = %e, "failed to enqueue event");
        }
    }
}

/// Background consumer for the event channel. Currently logs every event;
/// this is the seam where outbound integrations attach.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::OrderCreated(id) => info!(order_id = %id, "event: order created"),
            Event::OrderLinesMerged {
                order_id,
                product_ids,
            } => info!(
                order_id = %order_id,
                merged_products = product_ids.len(),
                "event: order lines merged"
            ),
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => info!(
                order_id = %order_id,
                from = %old_status,
                to = %new_status,
                "event: order status changed"
            ),
            Event::OrderDelivered(id) => info!(order_id = %id, "event: order delivered"),
            Event::OrderNullified(id) => info!(order_id = %id, "event: order nullified"),
            other => info!(event = ?other, "event"),
        }
    }
    info!("event channel closed; processor exiting");
}
