//! Connection request CRUD operations using Diesel
//!
//! Requests are directional rows between two actors of the same kind. The
//! unordered pair is canonicalized into `pair_key`, and a partial unique index
//! over `pair_key` for pending/accepted/blocked rows is the final arbiter of
//! the one-active-row-per-pair invariant. Writers additionally take the SQLite
//! write lock up front (`immediate_transaction`) so the in-transaction checks
//! report precise errors instead of surfacing raw constraint failures.
//!
//! State-changing writes are conditional on the expected current status; an
//! affected-row count of zero means another caller got there first.

use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use super::diesel_schema::connection_requests;
use super::models::{ActorKind, ConnectionRequest, NewConnectionRequest, RequestStatus, current_timestamp};
use crate::error::EngineError;

/// Longest note a requester may attach
pub const MAX_NOTE_CHARS: usize = 500;

const ACTIVE_STATUSES: [&str; 2] = ["pending", "accepted"];

// ============================================================================
// Query Types
// ============================================================================

/// Pagination for list endpoints
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 { 100 }

impl Default for PageQuery {
    fn default() -> Self {
        Self { limit: default_limit(), offset: 0 }
    }
}

impl PageQuery {
    pub const MAX_LIMIT: i64 = 500;

    /// Clamp to sane bounds
    pub fn normalized(self) -> Self {
        Self {
            limit: self.limit.clamp(1, Self::MAX_LIMIT),
            offset: self.offset.max(0),
        }
    }
}

/// Input for inserting a pending request
#[derive(Debug, Clone)]
pub struct NewRequestInput<'a> {
    pub kind: ActorKind,
    pub requester_actor_id: &'a str,
    pub addressee_actor_id: &'a str,
    pub acting_person_id: &'a str,
    pub notes: Option<&'a str>,
    /// Whether an earlier decline between the pair permits this request
    pub allow_resend_after_decline: bool,
}

/// Canonical key for an unordered actor pair.
///
/// The lower id is length-prefixed so ids containing `|` or `:` cannot make
/// two different pairs share a key.
pub fn pair_key(a: &str, b: &str) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{}:{}|{}", lo.len(), lo, hi)
}

/// Whether a row is between exactly these two actors, in either direction
fn is_between(row: &ConnectionRequest, a: &str, b: &str) -> bool {
    let (r, d) = (row.requester_actor_id.as_str(), row.addressee_actor_id.as_str());
    (r == a && d == b) || (r == b && d == a)
}

fn is_unique_violation(e: &DieselError) -> bool {
    matches!(e, DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _))
}

// ============================================================================
// Read Operations
// ============================================================================

/// Get connection request by ID
pub fn get_request(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<ConnectionRequest>, EngineError> {
    connection_requests::table
        .filter(connection_requests::id.eq(id))
        .first(conn)
        .optional()
        .map_err(EngineError::from)
}

/// All rows ever recorded for a pair, newest first
pub fn rows_for_pair(
    conn: &mut SqliteConnection,
    a: &str,
    b: &str,
) -> Result<Vec<ConnectionRequest>, EngineError> {
    connection_requests::table
        .filter(connection_requests::pair_key.eq(pair_key(a, b)))
        .order((connection_requests::requested_at.desc(), connection_requests::id.desc()))
        .load(conn)
        .map_err(EngineError::from)
}

fn find_for_pair_with_status(
    conn: &mut SqliteConnection,
    a: &str,
    b: &str,
    statuses: &[&str],
) -> Result<Option<ConnectionRequest>, EngineError> {
    connection_requests::table
        .filter(connection_requests::pair_key.eq(pair_key(a, b)))
        .filter(connection_requests::status.eq_any(statuses.to_vec()))
        .first(conn)
        .optional()
        .map_err(EngineError::from)
}

/// The pending or accepted row for a pair, if any
pub fn find_active(
    conn: &mut SqliteConnection,
    a: &str,
    b: &str,
) -> Result<Option<ConnectionRequest>, EngineError> {
    find_for_pair_with_status(conn, a, b, &ACTIVE_STATUSES)
}

/// The block row for a pair, if any
pub fn find_block(
    conn: &mut SqliteConnection,
    a: &str,
    b: &str,
) -> Result<Option<ConnectionRequest>, EngineError> {
    find_for_pair_with_status(conn, a, b, &[RequestStatus::Blocked.as_str()])
}

/// Pending requests addressed to an actor, newest first
pub fn list_incoming_pending(
    conn: &mut SqliteConnection,
    actor_id: &str,
    page: PageQuery,
) -> Result<Vec<ConnectionRequest>, EngineError> {
    let page = page.normalized();
    connection_requests::table
        .filter(connection_requests::addressee_actor_id.eq(actor_id))
        .filter(connection_requests::status.eq(RequestStatus::Pending.as_str()))
        .order((connection_requests::requested_at.desc(), connection_requests::id.desc()))
        .limit(page.limit)
        .offset(page.offset)
        .load(conn)
        .map_err(EngineError::from)
}

/// Pending requests sent by an actor, newest first
pub fn list_outgoing_pending(
    conn: &mut SqliteConnection,
    actor_id: &str,
    page: PageQuery,
) -> Result<Vec<ConnectionRequest>, EngineError> {
    let page = page.normalized();
    connection_requests::table
        .filter(connection_requests::requester_actor_id.eq(actor_id))
        .filter(connection_requests::status.eq(RequestStatus::Pending.as_str()))
        .order((connection_requests::requested_at.desc(), connection_requests::id.desc()))
        .limit(page.limit)
        .offset(page.offset)
        .load(conn)
        .map_err(EngineError::from)
}

/// Accepted rows on either side of an actor, most recently answered first
pub fn list_accepted(
    conn: &mut SqliteConnection,
    actor_id: &str,
    page: PageQuery,
) -> Result<Vec<ConnectionRequest>, EngineError> {
    let page = page.normalized();
    connection_requests::table
        .filter(
            connection_requests::requester_actor_id.eq(actor_id)
                .or(connection_requests::addressee_actor_id.eq(actor_id))
        )
        .filter(connection_requests::status.eq(RequestStatus::Accepted.as_str()))
        .order((connection_requests::responded_at.desc(), connection_requests::id.desc()))
        .limit(page.limit)
        .offset(page.offset)
        .load(conn)
        .map_err(EngineError::from)
}

// ============================================================================
// Write Operations
// ============================================================================

/// Insert a pending request, enforcing the pair invariants atomically
pub fn insert_pending(
    conn: &mut SqliteConnection,
    input: &NewRequestInput<'_>,
) -> Result<ConnectionRequest, EngineError> {
    let requester = input.requester_actor_id;
    let addressee = input.addressee_actor_id;

    if requester == addressee {
        return Err(EngineError::SelfReference(requester.to_string()));
    }

    if let Some(notes) = input.notes {
        if notes.chars().count() > MAX_NOTE_CHARS {
            return Err(EngineError::InvalidInput(format!(
                "note exceeds {} characters",
                MAX_NOTE_CHARS
            )));
        }
    }

    let id = Uuid::new_v4().to_string();
    let key = pair_key(requester, addressee);

    conn.immediate_transaction(|conn| {
        if find_block(conn, requester, addressee)?.is_some() {
            return Err(EngineError::Blocked(requester.to_string(), addressee.to_string()));
        }

        if find_active(conn, requester, addressee)?.is_some() {
            return Err(EngineError::AlreadyRequested(requester.to_string(), addressee.to_string()));
        }

        if !input.allow_resend_after_decline
            && find_for_pair_with_status(conn, requester, addressee, &[RequestStatus::Declined.as_str()])?
                .is_some()
        {
            return Err(EngineError::ResendNotAllowed(requester.to_string(), addressee.to_string()));
        }

        let now = current_timestamp();
        let new_request = NewConnectionRequest {
            id: &id,
            pair_key: &key,
            actor_kind: input.kind.as_str(),
            requester_actor_id: requester,
            addressee_actor_id: addressee,
            acting_person_id: input.acting_person_id,
            status: RequestStatus::Pending.as_str(),
            notes: input.notes,
            requested_at: &now,
        };

        diesel::insert_into(connection_requests::table)
            .values(&new_request)
            .execute(conn)
            .map_err(|e| {
                if is_unique_violation(&e) {
                    EngineError::AlreadyRequested(requester.to_string(), addressee.to_string())
                } else {
                    EngineError::from(e)
                }
            })?;

        debug!(id = %id, requester = %requester, addressee = %addressee, "Inserted pending request");

        get_request(conn, &id)?
            .ok_or_else(|| EngineError::Internal("Failed to retrieve created request".into()))
    })
}

/// Move a pending request to `status`. Only the first caller wins.
pub fn resolve_pending(
    conn: &mut SqliteConnection,
    id: &str,
    status: RequestStatus,
    responded_by: &str,
) -> Result<ConnectionRequest, EngineError> {
    if !matches!(status, RequestStatus::Accepted | RequestStatus::Declined) {
        return Err(EngineError::InvalidInput(format!(
            "a request can only be resolved to accepted or declined, not {}",
            status
        )));
    }

    conn.immediate_transaction(|conn| {
        let request = get_request(conn, id)?
            .ok_or_else(|| EngineError::NotFound(format!("Connection request {} not found", id)))?;

        if request.status()? == RequestStatus::Blocked
            || find_block(conn, &request.requester_actor_id, &request.addressee_actor_id)?.is_some()
        {
            return Err(EngineError::Blocked(
                request.requester_actor_id.clone(),
                request.addressee_actor_id.clone(),
            ));
        }

        let now = current_timestamp();
        let updated = diesel::update(
            connection_requests::table
                .filter(connection_requests::id.eq(id))
                .filter(connection_requests::status.eq(RequestStatus::Pending.as_str()))
        )
        .set((
            connection_requests::status.eq(status.as_str()),
            connection_requests::responded_at.eq(Some(now.as_str())),
            connection_requests::responded_by.eq(Some(responded_by)),
        ))
        .execute(conn)?;

        if updated == 0 {
            return Err(EngineError::AlreadyResolved(id.to_string()));
        }

        get_request(conn, id)?
            .ok_or_else(|| EngineError::Internal("Failed to retrieve resolved request".into()))
    })
}

/// Delete a request that is still pending
pub fn delete_pending(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<ConnectionRequest, EngineError> {
    conn.immediate_transaction(|conn| {
        let request = get_request(conn, id)?
            .ok_or_else(|| EngineError::NotFound(format!("Connection request {} not found", id)))?;

        if find_block(conn, &request.requester_actor_id, &request.addressee_actor_id)?.is_some() {
            return Err(EngineError::Blocked(
                request.requester_actor_id.clone(),
                request.addressee_actor_id.clone(),
            ));
        }

        let deleted = diesel::delete(
            connection_requests::table
                .filter(connection_requests::id.eq(id))
                .filter(connection_requests::status.eq(RequestStatus::Pending.as_str()))
        )
        .execute(conn)?;

        if deleted == 0 {
            return Err(EngineError::NotCancelable(id.to_string()));
        }

        Ok(request)
    })
}

/// Tear down the accepted connection between two actors
pub fn delete_accepted(
    conn: &mut SqliteConnection,
    a: &str,
    b: &str,
) -> Result<ConnectionRequest, EngineError> {
    conn.immediate_transaction(|conn| {
        if find_block(conn, a, b)?.is_some() {
            return Err(EngineError::Blocked(a.to_string(), b.to_string()));
        }

        let accepted = find_for_pair_with_status(conn, a, b, &[RequestStatus::Accepted.as_str()])?
            .filter(|row| is_between(row, a, b))
            .ok_or_else(|| EngineError::NotFound(format!("No connection between {} and {}", a, b)))?;

        let deleted = diesel::delete(
            connection_requests::table
                .filter(connection_requests::id.eq(&accepted.id))
                .filter(connection_requests::status.eq(RequestStatus::Accepted.as_str()))
        )
        .execute(conn)?;

        if deleted == 0 {
            return Err(EngineError::NotFound(format!("No connection between {} and {}", a, b)));
        }

        Ok(accepted)
    })
}

// ============================================================================
// Trust & Safety (not reachable through the public API)
// ============================================================================

/// Block a pair: any pending/accepted row is replaced by a block row
pub fn block_pair(
    conn: &mut SqliteConnection,
    kind: ActorKind,
    a: &str,
    b: &str,
    operator_id: &str,
) -> Result<ConnectionRequest, EngineError> {
    if a == b {
        return Err(EngineError::SelfReference(a.to_string()));
    }

    let key = pair_key(a, b);

    conn.immediate_transaction(|conn| {
        if let Some(existing) = find_block(conn, a, b)? {
            return Ok(existing);
        }

        diesel::delete(
            connection_requests::table
                .filter(connection_requests::pair_key.eq(&key))
                .filter(connection_requests::status.eq_any(ACTIVE_STATUSES.to_vec()))
        )
        .execute(conn)?;

        let id = Uuid::new_v4().to_string();
        let now = current_timestamp();
        diesel::insert_into(connection_requests::table)
            .values(&NewConnectionRequest {
                id: &id,
                pair_key: &key,
                actor_kind: kind.as_str(),
                requester_actor_id: a,
                addressee_actor_id: b,
                acting_person_id: operator_id,
                status: RequestStatus::Blocked.as_str(),
                notes: None,
                requested_at: &now,
            })
            .execute(conn)?;

        get_request(conn, &id)?
            .ok_or_else(|| EngineError::Internal("Failed to retrieve block".into()))
    })
}

/// Lift a block; the pair returns to NONE
pub fn unblock_pair(
    conn: &mut SqliteConnection,
    a: &str,
    b: &str,
) -> Result<bool, EngineError> {
    let deleted = diesel::delete(
        connection_requests::table
            .filter(connection_requests::pair_key.eq(pair_key(a, b)))
            .filter(connection_requests::status.eq(RequestStatus::Blocked.as_str()))
    )
    .execute(conn)?;

    Ok(deleted > 0)
}
