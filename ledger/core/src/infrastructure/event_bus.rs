// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Ledger Events
//
// In-memory fan-out over a tokio broadcast channel. Events are published only
// after the transaction that produced them has committed. Nothing is
// persisted; a subscriber that lags loses the oldest events.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::domain::events::LedgerEvent;

/// Event bus for publishing and subscribing to ledger events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<LedgerEvent>>,
}

impl EventBus {
    /// Capacity is how many events are buffered before slow receivers lag.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    pub fn publish(&self, event: LedgerEvent) {
        debug!(event_type = event.event_type(), tenant_id = %event.tenant_id(), "Publishing event");

        let receiver_count = self.sender.send(event).unwrap_or(0);
        if receiver_count == 0 {
            debug!("No subscribers listening to event");
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

fn map_recv_error(e: broadcast::error::RecvError) -> EventBusError {
    match e {
        broadcast::error::RecvError::Closed => EventBusError::Closed,
        broadcast::error::RecvError::Lagged(n) => {
            warn!("Event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

pub struct EventReceiver {
    receiver: broadcast::Receiver<LedgerEvent>,
}

impl EventReceiver {
    pub async fn recv(&mut self) -> Result<LedgerEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    pub fn try_recv(&mut self) -> Result<LedgerEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::tenant::TenantId;
    use chrono::Utc;

    fn provisioned(tenant_id: TenantId, domain: &str) -> LedgerEvent {
        LedgerEvent::TenantProvisioned {
            tenant_id,
            domain: domain.to_string(),
            provisioned_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new(10);
        let mut receiver = bus.subscribe();
        let tenant_id = TenantId::new();

        bus.publish(provisioned(tenant_id, "newco.io"));

        match receiver.recv().await.unwrap() {
            LedgerEvent::TenantProvisioned { tenant_id: id, domain, .. } => {
                assert_eq!(id, tenant_id);
                assert_eq!(domain, "newco.io");
            }
            other => panic!("Wrong event type received: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_harmless() {
        let bus = EventBus::new(1);
        assert_eq!(bus.subscriber_count(), 0);
        bus.publish(provisioned(TenantId::new(), "newco.io"));
    }
}
