//! Event system for relationship changes
//!
//! Every committed transition is announced on the bus after the store write
//! succeeds. Listeners feed audit logs and notification fan-out.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

use crate::db::{ActorKind, Decision};

/// Relationship events emitted by services
#[derive(Debug, Clone)]
pub enum RelationshipEvent {
    // Connection events
    ConnectionRequested {
        request_id: String,
        kind: ActorKind,
        requester_id: String,
        addressee_id: String,
        acting_person_id: String,
    },
    ConnectionResponded {
        request_id: String,
        decision: Decision,
        responded_by: String,
    },
    ConnectionCanceled {
        request_id: String,
        canceled_by: String,
    },
    ConnectionRemoved {
        actor_a: String,
        actor_b: String,
        removed_by: String,
    },

    // Follow events
    Followed {
        person_id: String,
        organization_id: String,
    },
    Unfollowed {
        person_id: String,
        organization_id: String,
    },
}

/// Trait for event listeners
pub trait EventListener: Send + Sync {
    /// Handle an event
    fn on_event(&self, event: &RelationshipEvent);
}

/// Event bus for broadcasting relationship events
pub struct EventBus {
    sender: broadcast::Sender<RelationshipEvent>,
}

impl EventBus {
    /// Create a new event bus with default capacity
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    /// Create a new event bus with specified capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers
    pub fn emit(&self, event: RelationshipEvent) {
        trace!(event = ?event, "Emitting relationship event");
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<RelationshipEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Logging event listener for audit trails
pub struct LoggingEventListener;

impl EventListener for LoggingEventListener {
    fn on_event(&self, event: &RelationshipEvent) {
        match event {
            RelationshipEvent::ConnectionRequested {
                request_id,
                kind,
                requester_id,
                addressee_id,
                acting_person_id,
            } => {
                info!(
                    request = %request_id,
                    kind = %kind,
                    requester = %requester_id,
                    addressee = %addressee_id,
                    acting = %acting_person_id,
                    "Connection requested"
                );
            }
            RelationshipEvent::ConnectionResponded { request_id, decision, responded_by } => {
                info!(request = %request_id, decision = ?decision, by = %responded_by, "Connection request answered");
            }
            RelationshipEvent::ConnectionCanceled { request_id, canceled_by } => {
                info!(request = %request_id, by = %canceled_by, "Connection request canceled");
            }
            RelationshipEvent::ConnectionRemoved { actor_a, actor_b, removed_by } => {
                info!(a = %actor_a, b = %actor_b, by = %removed_by, "Connection removed");
            }
            RelationshipEvent::Followed { person_id, organization_id } => {
                debug!(person = %person_id, organization = %organization_id, "Followed");
            }
            RelationshipEvent::Unfollowed { person_id, organization_id } => {
                debug!(person = %person_id, organization = %organization_id, "Unfollowed");
            }
        }
    }
}

/// Spawn a background task that logs all events
pub fn spawn_logging_listener(event_bus: Arc<EventBus>) -> tokio::task::JoinHandle<()> {
    let mut receiver = event_bus.subscribe();
    let listener = LoggingEventListener;

    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => listener.on_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!(skipped = n, "Event listener lagged, skipped events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed, stopping listener");
                    break;
                }
            }
        }
    })
}
