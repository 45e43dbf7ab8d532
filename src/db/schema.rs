//! Database schema definitions

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::sql_types::Integer;
use tracing::info;

use super::connection_requests::pair_key;
use super::diesel_schema::{connection_requests, schema_version};
use crate::error::EngineError;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 3;

#[derive(QueryableByName)]
struct TableCount {
    #[diesel(sql_type = Integer)]
    n: i32,
}

/// Initialize the database schema
pub fn init_schema(conn: &mut SqliteConnection) -> Result<(), EngineError> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new database schema v{}", SCHEMA_VERSION);
        conn.immediate_transaction(|conn| {
            conn.batch_execute(DIRECTORY_SCHEMA)?;
            conn.batch_execute(RELATIONSHIP_SCHEMA)?;
            add_responder_column(conn)?;
            set_schema_version(conn, SCHEMA_VERSION)
        })?;
    } else if current_version < SCHEMA_VERSION {
        info!("Migrating schema from v{} to v{}", current_version, SCHEMA_VERSION);
        conn.immediate_transaction(|conn| migrate_schema(conn, current_version))?;
    } else {
        info!("Database schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Get current schema version (0 if not initialized)
fn get_schema_version(conn: &mut SqliteConnection) -> Result<i32, EngineError> {
    conn.batch_execute("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")?;

    let version = schema_version::table
        .select(schema_version::version)
        .first::<i32>(conn)
        .optional()?;

    Ok(version.unwrap_or(0))
}

/// Set schema version
fn set_schema_version(conn: &mut SqliteConnection, version: i32) -> Result<(), EngineError> {
    diesel::delete(schema_version::table).execute(conn)?;
    diesel::insert_into(schema_version::table)
        .values(schema_version::version.eq(version))
        .execute(conn)?;
    Ok(())
}

/// Add `responded_by` unless an earlier run already did
fn add_responder_column(conn: &mut SqliteConnection) -> Result<(), EngineError> {
    let present = diesel::sql_query(
        "SELECT COUNT(*) AS n FROM pragma_table_info('connection_requests') WHERE name = 'responded_by'",
    )
    .get_result::<TableCount>(conn)?;
    if present.n == 0 {
        conn.batch_execute(RESPONDER_COLUMN)?;
    }
    Ok(())
}

/// Recompute every pair key in the current format.
///
/// Keys are first parked on the unique row id so the partial unique index
/// never sees a half-rewritten pair.
fn rekey_pairs(conn: &mut SqliteConnection) -> Result<usize, EngineError> {
    conn.batch_execute("UPDATE connection_requests SET pair_key = 'legacy:' || id;")?;

    let rows: Vec<(String, String, String)> = connection_requests::table
        .select((
            connection_requests::id,
            connection_requests::requester_actor_id,
            connection_requests::addressee_actor_id,
        ))
        .load(conn)?;

    for (id, requester, addressee) in &rows {
        diesel::update(connection_requests::table.filter(connection_requests::id.eq(id)))
            .set(connection_requests::pair_key.eq(pair_key(requester, addressee)))
            .execute(conn)?;
    }

    Ok(rows.len())
}

/// Migrate schema from older version
fn migrate_schema(conn: &mut SqliteConnection, from_version: i32) -> Result<(), EngineError> {
    if from_version < 2 {
        // v1 databases predate the responded_by column
        add_responder_column(conn)?;
    }

    if from_version < 3 {
        // v2 keys joined ids with a bare separator
        let rekeyed = rekey_pairs(conn)?;
        info!(rows = rekeyed, "Rewrote connection pair keys");
    }

    set_schema_version(conn, SCHEMA_VERSION)?;
    Ok(())
}

/// Actor directory mirror. Written by the directory sync, read by the engine.
const DIRECTORY_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS actors (
    id TEXT PRIMARY KEY NOT NULL,
    kind TEXT NOT NULL CHECK (kind IN ('person', 'organization')),
    display_name TEXT NOT NULL,
    avatar_url TEXT,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE TABLE IF NOT EXISTS memberships (
    person_id TEXT NOT NULL,
    organization_id TEXT NOT NULL,
    role TEXT NOT NULL CHECK (role IN ('owner', 'admin', 'member', 'viewer')),
    PRIMARY KEY (person_id, organization_id)
);

CREATE INDEX IF NOT EXISTS idx_memberships_org ON memberships(organization_id);
"#;

/// Connection requests and follow edges
const RELATIONSHIP_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS connection_requests (
    id TEXT PRIMARY KEY NOT NULL,
    -- min(a, b) || '|' || max(a, b): one key per unordered pair
    pair_key TEXT NOT NULL,
    actor_kind TEXT NOT NULL CHECK (actor_kind IN ('person', 'organization')),
    requester_actor_id TEXT NOT NULL,
    addressee_actor_id TEXT NOT NULL,
    acting_person_id TEXT NOT NULL,
    status TEXT NOT NULL CHECK (status IN ('pending', 'accepted', 'declined', 'blocked')),
    notes TEXT,
    requested_at TEXT NOT NULL,
    responded_at TEXT,
    CHECK (requester_actor_id <> addressee_actor_id)
);

-- At most one in-flight or live row per unordered pair
CREATE UNIQUE INDEX IF NOT EXISTS idx_connection_requests_active_pair
    ON connection_requests(pair_key)
    WHERE status IN ('pending', 'accepted', 'blocked');

CREATE INDEX IF NOT EXISTS idx_connection_requests_addressee
    ON connection_requests(addressee_actor_id, status);
CREATE INDEX IF NOT EXISTS idx_connection_requests_requester
    ON connection_requests(requester_actor_id, status);

CREATE TABLE IF NOT EXISTS follow_edges (
    person_id TEXT NOT NULL,
    organization_id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (person_id, organization_id)
);

CREATE INDEX IF NOT EXISTS idx_follow_edges_org ON follow_edges(organization_id);
"#;

/// v2: who answered the request
const RESPONDER_COLUMN: &str = "ALTER TABLE connection_requests ADD COLUMN responded_by TEXT;";
