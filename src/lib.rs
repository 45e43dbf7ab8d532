//! Connection Engine - relationship state for people and organizations
//!
//! Tracks who is connected to whom and who follows which organization:
//!
//! - person <-> person connection requests
//! - organization <-> organization connection requests, sent and answered
//!   by a delegated OWNER/ADMIN on the organization's behalf
//! - person -> organization follows, no approval involved
//!
//! ## Architecture
//!
//! ```text
//! HTTP (hyper)            http.rs
//!     ↓
//! Services                ConnectionService / FollowService / QueryService
//!     ↓            ↘
//! Repositories       AuthorizationGate → ActorDirectory
//!     ↓
//! SQLite (Diesel + r2d2)
//! ```
//!
//! The store is the only serialization point. Sends take the SQLite write
//! lock up front and a partial unique index keeps one active row per pair;
//! responses, cancels and removals are conditional writes whose affected-row
//! count picks the winner.
//!
//! ## Storage Layout
//!
//! ```text
//! ~/.local/share/connection-engine/
//! ├── relationships.db       # SQLite (WAL)
//! └── config.toml            # Configuration
//! ```

pub mod authz;
pub mod config;
pub mod db;
pub mod directory;
pub mod error;
pub mod http;
pub mod services;
pub mod state;
pub mod views;

// Re-exports
pub use authz::AuthorizationGate;
pub use config::{Config, RelationshipPolicy};
pub use db::{Actor, ActorKind, Database, Decision, MembershipRole, RequestStatus};
pub use directory::{ActorDirectory, ActorProfile, DirectorySeed, SqliteDirectory};
pub use error::EngineError;
pub use http::HttpServer;
pub use services::{ConnectionService, EventBus, FollowService, QueryService, RelationshipEvent, Services};
pub use state::ConnectionState;
