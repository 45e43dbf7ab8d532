//! SQLite database module for relationship state
//!
//! ## Architecture
//!
//! - Diesel over SQLite, pooled with r2d2
//! - Every pooled connection waits on the write lock (`busy_timeout`) instead
//!   of failing fast, so concurrent writers serialize inside SQLite
//! - Invariants live in the schema (partial unique index, CHECK constraints)
//!   and in the repository functions, never in callers
//!
//! ## Tables
//!
//! - `actors` / `memberships` - directory mirror, read-only to the engine
//! - `connection_requests` - directional requests, person-person or org-org
//! - `follow_edges` - person -> organization follows

pub mod schema;
pub mod diesel_schema;
pub mod models;
pub mod directory;
pub mod connection_requests;
pub mod follow_edges;

use std::path::Path;
use std::time::Duration;

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use tracing::{debug, info};

use crate::error::EngineError;
use diesel_schema::{actors, connection_requests as requests, follow_edges as follows};

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;
pub type DbConn = PooledConnection<ConnectionManager<SqliteConnection>>;

/// Per-connection PRAGMAs applied whenever the pool hands out a connection
#[derive(Debug)]
struct SqlitePragmas {
    busy_timeout_ms: u64,
}

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for SqlitePragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute(&format!(
            "PRAGMA busy_timeout = {}; PRAGMA foreign_keys = ON; PRAGMA synchronous = NORMAL;",
            self.busy_timeout_ms
        ))
        .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Pooled relationship database
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Open or create the relationship database
    pub fn open(db_path: &Path, pool_size: u32, busy_timeout_ms: u64) -> Result<Self, EngineError> {
        info!("Opening SQLite database at {:?}", db_path);

        let url = db_path
            .to_str()
            .ok_or_else(|| EngineError::Config(format!("Non UTF-8 database path: {:?}", db_path)))?;

        // WAL is persistent on the file; set it once before pooling
        let mut bootstrap = SqliteConnection::establish(url)
            .map_err(|e| EngineError::Internal(format!("Failed to open SQLite: {}", e)))?;
        bootstrap.batch_execute("PRAGMA journal_mode = WAL;")?;

        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .connection_customizer(Box::new(SqlitePragmas { busy_timeout_ms }))
            .build(ConnectionManager::<SqliteConnection>::new(url))?;

        let db = Self { pool };
        db.init_schema()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    ///
    /// Every in-memory SQLite connection is its own database, so the pool is
    /// pinned to a single connection that never expires.
    pub fn open_in_memory() -> Result<Self, EngineError> {
        debug!("Opening in-memory SQLite database");

        let pool = Pool::builder()
            .max_size(1)
            .min_idle(Some(1))
            .idle_timeout(None)
            .max_lifetime(None)
            .connection_timeout(Duration::from_secs(5))
            .connection_customizer(Box::new(SqlitePragmas { busy_timeout_ms: 1_000 }))
            .build(ConnectionManager::<SqliteConnection>::new(":memory:"))?;

        let db = Self { pool };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<(), EngineError> {
        self.with_conn(schema::init_schema)
    }

    /// Run `f` on a pooled connection
    ///
    /// Closures must not call back into `with_conn`; an in-memory pool has a
    /// single connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, EngineError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T, EngineError>,
    {
        let mut conn: DbConn = self.pool.get()?;
        f(&mut conn)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats, EngineError> {
        self.with_conn(|conn| {
            let actor_count: i64 = actors::table.count().get_result(conn)?;
            let by_status: Vec<(String, i64)> = requests::table
                .group_by(requests::status)
                .select((requests::status, diesel::dsl::count_star()))
                .load(conn)?;
            let follow_count: i64 = follows::table.count().get_result(conn)?;

            let count_of = |status: &str| -> u64 {
                by_status
                    .iter()
                    .filter(|(s, _)| s == status)
                    .map(|(_, n)| *n as u64)
                    .sum()
            };

            Ok(DbStats {
                actor_count: actor_count as u64,
                pending_requests: count_of("pending"),
                accepted_connections: count_of("accepted"),
                declined_requests: count_of("declined"),
                blocked_pairs: count_of("blocked"),
                follow_edges: follow_count as u64,
            })
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbStats {
    pub actor_count: u64,
    pub pending_requests: u64,
    pub accepted_connections: u64,
    pub declined_requests: u64,
    pub blocked_pairs: u64,
    pub follow_edges: u64,
}

// Re-exports
pub use models::{
    Actor, ActorKind, ActorRecord, ConnectionRequest, Decision, FollowEdge, Membership,
    MembershipRole, RequestStatus,
};
