//! Actor directory mirror using Diesel
//!
//! Actors and memberships are owned by the platform's directory service.
//! The write functions here exist for the directory sync and for seeding;
//! relationship operations only ever read these tables.

use diesel::prelude::*;

use super::diesel_schema::{actors, memberships};
use super::models::{ActorKind, ActorRecord, Membership, MembershipRole, NewActorRecord, NewMembership};
use crate::error::EngineError;

// ============================================================================
// Read Operations
// ============================================================================

/// Get actor by ID
pub fn get_actor(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<ActorRecord>, EngineError> {
    actors::table
        .filter(actors::id.eq(id))
        .first(conn)
        .optional()
        .map_err(EngineError::from)
}

/// Get several actors at once; unknown IDs are simply absent from the result
pub fn get_actors(
    conn: &mut SqliteConnection,
    ids: &[String],
) -> Result<Vec<ActorRecord>, EngineError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    actors::table
        .filter(actors::id.eq_any(ids.to_vec()))
        .load(conn)
        .map_err(EngineError::from)
}

/// Get the membership of a person in an organization
pub fn get_membership(
    conn: &mut SqliteConnection,
    person_id: &str,
    organization_id: &str,
) -> Result<Option<Membership>, EngineError> {
    memberships::table
        .filter(memberships::person_id.eq(person_id))
        .filter(memberships::organization_id.eq(organization_id))
        .first(conn)
        .optional()
        .map_err(EngineError::from)
}

/// List memberships of an organization
pub fn list_memberships(
    conn: &mut SqliteConnection,
    organization_id: &str,
) -> Result<Vec<Membership>, EngineError> {
    memberships::table
        .filter(memberships::organization_id.eq(organization_id))
        .order(memberships::person_id.asc())
        .load(conn)
        .map_err(EngineError::from)
}

// ============================================================================
// Write Operations (directory sync only)
// ============================================================================

/// Insert or replace an actor
pub fn upsert_actor(
    conn: &mut SqliteConnection,
    id: &str,
    kind: ActorKind,
    display_name: &str,
    avatar_url: Option<&str>,
) -> Result<ActorRecord, EngineError> {
    if id.trim().is_empty() {
        return Err(EngineError::InvalidInput("actor id is required".into()));
    }

    diesel::replace_into(actors::table)
        .values(&NewActorRecord {
            id,
            kind: kind.as_str(),
            display_name,
            avatar_url,
        })
        .execute(conn)?;

    get_actor(conn, id)?
        .ok_or_else(|| EngineError::Internal("Failed to retrieve upserted actor".into()))
}

/// Insert or replace a membership
pub fn upsert_membership(
    conn: &mut SqliteConnection,
    person_id: &str,
    organization_id: &str,
    role: MembershipRole,
) -> Result<(), EngineError> {
    diesel::replace_into(memberships::table)
        .values(&NewMembership {
            person_id,
            organization_id,
            role: role.as_str(),
        })
        .execute(conn)?;
    Ok(())
}

/// Remove a membership; returns whether one existed
pub fn remove_membership(
    conn: &mut SqliteConnection,
    person_id: &str,
    organization_id: &str,
) -> Result<bool, EngineError> {
    let deleted = diesel::delete(
        memberships::table
            .filter(memberships::person_id.eq(person_id))
            .filter(memberships::organization_id.eq(organization_id)),
    )
    .execute(conn)?;

    Ok(deleted > 0)
}
