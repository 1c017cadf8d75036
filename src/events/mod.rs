use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::models::OrderStatus;

/// Order lifecycle events, published after the owning transaction commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    OrderCreated {
        order_id: String,
        buyer_id: String,
    },
    OrderUpdated(String),
    OrderCancelled(String),
    OrderClaimed {
        order_id: String,
        shipper_id: String,
    },
    DeliveryStarted {
        order_id: String,
        shipper_id: String,
    },
    DeliveryConfirmed {
        order_id: String,
        shipper_id: String,
    },
    OrderStatusChanged {
        order_id: String,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
}

impl Event {
    pub fn order_id(&self) -> &str {
        match self {
            Event::OrderCreated { order_id, .. }
            | Event::OrderClaimed { order_id, .. }
            | Event::DeliveryStarted { order_id, .. }
            | Event::DeliveryConfirmed { order_id, .. }
            | Event::OrderStatusChanged { order_id, .. } => order_id,
            Event::OrderUpdated(order_id) | Event::OrderCancelled(order_id) => order_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Bounded channel of `capacity` events.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing. The state change it
    /// reports has already been committed.
    pub async fn publish(&self, event: Event) {
        let order_id = event.order_id().to_string();
        if let Err(e) = self.send(event).await {
            warn!(order_id = %order_id, "{}", e);
        }
    }
}

/// Drains the event channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderCreated { order_id, buyer_id } => {
                info!(order_id = %order_id, buyer_id = %buyer_id, "Order created");
            }
            Event::OrderUpdated(order_id) => info!(order_id = %order_id, "Order updated"),
            Event::OrderCancelled(order_id) => info!(order_id = %order_id, "Order cancelled"),
            Event::OrderClaimed {
                order_id,
                shipper_id,
            } => info!(order_id = %order_id, shipper_id = %shipper_id, "Order claimed"),
            Event::DeliveryStarted {
                order_id,
                shipper_id,
            } => info!(order_id = %order_id, shipper_id = %shipper_id, "Delivery started"),
            Event::DeliveryConfirmed {
                order_id,
                shipper_id,
            } => info!(order_id = %order_id, shipper_id = %shipper_id, "Delivery confirmed"),
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => info!(
                order_id = %order_id,
                old_status = %old_status,
                new_status = %new_status,
                "Order status changed"
            ),
        }
    }

    warn!("Event processing loop has ended");
}
