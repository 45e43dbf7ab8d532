//! Follow edge operations using Diesel
//!
//! A follow is a person -> organization edge with no status; the row existing
//! is the state. Inserts and deletes are idempotent.

use diesel::prelude::*;

use super::connection_requests::PageQuery;
use super::diesel_schema::follow_edges;
use super::models::{FollowEdge, NewFollowEdge, current_timestamp};
use crate::error::EngineError;

/// Get the edge for a pair
pub fn get_edge(
    conn: &mut SqliteConnection,
    person_id: &str,
    organization_id: &str,
) -> Result<Option<FollowEdge>, EngineError> {
    follow_edges::table
        .filter(follow_edges::person_id.eq(person_id))
        .filter(follow_edges::organization_id.eq(organization_id))
        .first(conn)
        .optional()
        .map_err(EngineError::from)
}

/// Insert the edge unless it exists; returns the stored edge either way and
/// whether this call created it
pub fn insert_edge(
    conn: &mut SqliteConnection,
    person_id: &str,
    organization_id: &str,
) -> Result<(FollowEdge, bool), EngineError> {
    let now = current_timestamp();

    let inserted = diesel::insert_or_ignore_into(follow_edges::table)
        .values(&NewFollowEdge {
            person_id,
            organization_id,
            created_at: &now,
        })
        .execute(conn)?;

    let edge = get_edge(conn, person_id, organization_id)?
        .ok_or_else(|| EngineError::Internal("Failed to retrieve follow edge".into()))?;
    Ok((edge, inserted > 0))
}

/// Delete the edge; returns whether one existed
pub fn delete_edge(
    conn: &mut SqliteConnection,
    person_id: &str,
    organization_id: &str,
) -> Result<bool, EngineError> {
    let deleted = diesel::delete(
        follow_edges::table
            .filter(follow_edges::person_id.eq(person_id))
            .filter(follow_edges::organization_id.eq(organization_id))
    )
    .execute(conn)?;

    Ok(deleted > 0)
}

/// Number of followers of an organization
pub fn follower_count(
    conn: &mut SqliteConnection,
    organization_id: &str,
) -> Result<i64, EngineError> {
    follow_edges::table
        .filter(follow_edges::organization_id.eq(organization_id))
        .count()
        .get_result(conn)
        .map_err(EngineError::from)
}

/// Organizations a person follows, newest first
pub fn list_followed(
    conn: &mut SqliteConnection,
    person_id: &str,
    page: PageQuery,
) -> Result<Vec<FollowEdge>, EngineError> {
    let page = page.normalized();
    follow_edges::table
        .filter(follow_edges::person_id.eq(person_id))
        .order(follow_edges::created_at.desc())
        .limit(page.limit)
        .offset(page.offset)
        .load(conn)
        .map_err(EngineError::from)
}
