//! Service layer for connection-engine
//!
//! Services encapsulate business logic between HTTP handlers and repositories.
//! Each service wraps database operations with:
//! - Directory resolution and authorization
//! - Precondition checks in a fixed order
//! - Event emission for audit/notifications
//!
//! ## Architecture
//!
//! ```text
//! HTTP Handlers (thin)
//!     ↓
//! Service Layer (business logic)
//!     ↓
//! Repository Layer (db/*.rs)
//!     ↓
//! SQLite Database
//! ```

pub mod response;
pub mod events;
pub mod connection_service;
pub mod follow_service;
pub mod query_service;

// Re-exports
pub use response::*;
pub use events::{EventBus, EventListener, RelationshipEvent};
pub use connection_service::ConnectionService;
pub use follow_service::{FollowService, FollowedOrganization};
pub use query_service::{ConnectionEntry, EnrichedRequest, QueryService};

use std::sync::Arc;

use crate::authz::AuthorizationGate;
use crate::config::RelationshipPolicy;
use crate::db::Database;
use crate::directory::ActorDirectory;

/// Service container for dependency injection
///
/// Holds all services over one shared pool and directory.
/// Pass this to HttpServer for handler access.
pub struct Services {
    pub connections: Arc<ConnectionService>,
    pub follows: Arc<FollowService>,
    pub queries: Arc<QueryService>,
    pub gate: AuthorizationGate,
    pub db: Database,
    pub events: Arc<EventBus>,
}

impl Services {
    /// Create all services with shared database and directory
    pub fn new(db: Database, directory: Arc<dyn ActorDirectory>, policy: RelationshipPolicy) -> Self {
        let events = Arc::new(EventBus::new());
        let gate = AuthorizationGate::new(directory.clone());

        let connections = Arc::new(ConnectionService::new(
            db.clone(),
            directory.clone(),
            gate.clone(),
            policy.clone(),
            events.clone(),
        ));
        let follows = Arc::new(FollowService::new(
            db.clone(),
            directory.clone(),
            gate.clone(),
            policy,
            events.clone(),
        ));
        let queries = Arc::new(QueryService::new(
            db.clone(),
            directory,
            gate.clone(),
            connections.clone(),
        ));

        Self { connections, follows, queries, gate, db, events }
    }
}
