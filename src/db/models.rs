//! Diesel model definitions for database tables
//!
//! - Queryable structs: for SELECT queries (reading data)
//! - Insertable structs: for INSERT queries (writing data)
//!
//! Enumerated columns are stored as lowercase TEXT. The Rust enums below are
//! the only vocabulary; parsing accepts any letter case so legacy rows written
//! as "ACCEPTED" or "Accepted" read back the same.

use std::fmt;
use std::str::FromStr;

use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::diesel_schema::*;
use crate::error::EngineError;

// ============================================================================
// Timestamp Helpers (SQLite stores timestamps as TEXT)
// ============================================================================

/// Get current UTC timestamp as RFC 3339 string (millisecond precision)
pub fn current_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

// ============================================================================
// Enumerations
// ============================================================================

fn parse_variant<T: Copy>(value: &str, all: &[(T, &str)], what: &str) -> Result<T, EngineError> {
    all.iter()
        .find(|(_, name)| name.eq_ignore_ascii_case(value.trim()))
        .map(|(v, _)| *v)
        .ok_or_else(|| EngineError::InvalidInput(format!("Unknown {}: {}", what, value)))
}

/// Whether an actor is an individual or an organization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum ActorKind {
    Person,
    Organization,
}

impl ActorKind {
    pub const ALL: [(ActorKind, &'static str); 2] = [
        (ActorKind::Person, "person"),
        (ActorKind::Organization, "organization"),
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActorKind::Person => "person",
            ActorKind::Organization => "organization",
        }
    }
}

impl FromStr for ActorKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_variant(s, &Self::ALL, "actor kind")
    }
}

impl fmt::Display for ActorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Membership role of a person within an organization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum MembershipRole {
    Owner,
    Admin,
    Member,
    Viewer,
}

impl MembershipRole {
    pub const ALL: [(MembershipRole, &'static str); 4] = [
        (MembershipRole::Owner, "owner"),
        (MembershipRole::Admin, "admin"),
        (MembershipRole::Member, "member"),
        (MembershipRole::Viewer, "viewer"),
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipRole::Owner => "owner",
            MembershipRole::Admin => "admin",
            MembershipRole::Member => "member",
            MembershipRole::Viewer => "viewer",
        }
    }

    /// Only owners and admins may act on the organization's behalf
    pub fn confers_authority(&self) -> bool {
        matches!(self, MembershipRole::Owner | MembershipRole::Admin)
    }
}

impl FromStr for MembershipRole {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_variant(s, &Self::ALL, "membership role")
    }
}

impl fmt::Display for MembershipRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored lifecycle status of a connection request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum RequestStatus {
    Pending,
    Accepted,
    Declined,
    Blocked,
}

impl RequestStatus {
    pub const ALL: [(RequestStatus, &'static str); 4] = [
        (RequestStatus::Pending, "pending"),
        (RequestStatus::Accepted, "accepted"),
        (RequestStatus::Declined, "declined"),
        (RequestStatus::Blocked, "blocked"),
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Accepted => "accepted",
            RequestStatus::Declined => "declined",
            RequestStatus::Blocked => "blocked",
        }
    }

    /// Pending and accepted rows occupy the pair; at most one may exist
    pub fn is_active(&self) -> bool {
        matches!(self, RequestStatus::Pending | RequestStatus::Accepted)
    }
}

impl FromStr for RequestStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_variant(s, &Self::ALL, "request status")
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Addressee's answer to a pending request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum Decision {
    Accept,
    Decline,
}

impl Decision {
    pub fn resulting_status(&self) -> RequestStatus {
        match self {
            Decision::Accept => RequestStatus::Accepted,
            Decision::Decline => RequestStatus::Declined,
        }
    }
}

impl FromStr for Decision {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_variant(
            s,
            &[(Decision::Accept, "accept"), (Decision::Decline, "decline")],
            "decision",
        )
    }
}

// ============================================================================
// Actor Directory Models
// ============================================================================

/// An identity reference: id plus kind
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub kind: ActorKind,
}

impl Actor {
    pub fn person(id: impl Into<String>) -> Self {
        Self { id: id.into(), kind: ActorKind::Person }
    }

    pub fn organization(id: impl Into<String>) -> Self {
        Self { id: id.into(), kind: ActorKind::Organization }
    }
}

/// Actor row from SELECT query
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = actors)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ActorRecord {
    pub id: String,
    pub kind: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub created_at: String,
}

impl ActorRecord {
    pub fn actor(&self) -> Result<Actor, EngineError> {
        Ok(Actor {
            id: self.id.clone(),
            kind: self.kind.parse()?,
        })
    }
}

/// New actor for INSERT
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = actors)]
pub struct NewActorRecord<'a> {
    pub id: &'a str,
    pub kind: &'a str,
    pub display_name: &'a str,
    pub avatar_url: Option<&'a str>,
}

/// Membership row from SELECT query
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = memberships)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Membership {
    pub person_id: String,
    pub organization_id: String,
    pub role: String,
}

impl Membership {
    pub fn role(&self) -> Result<MembershipRole, EngineError> {
        self.role.parse()
    }
}

/// New membership for INSERT
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = memberships)]
pub struct NewMembership<'a> {
    pub person_id: &'a str,
    pub organization_id: &'a str,
    pub role: &'a str,
}

// ============================================================================
// Connection Request Models
// ============================================================================

/// Connection request row from SELECT query
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = connection_requests)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ConnectionRequest {
    pub id: String,
    pub pair_key: String,
    pub actor_kind: String,
    pub requester_actor_id: String,
    pub addressee_actor_id: String,
    pub acting_person_id: String,
    pub status: String,
    pub notes: Option<String>,
    pub requested_at: String,
    pub responded_at: Option<String>,
    pub responded_by: Option<String>,
}

impl ConnectionRequest {
    pub fn status(&self) -> Result<RequestStatus, EngineError> {
        self.status.parse()
    }

    pub fn kind(&self) -> Result<ActorKind, EngineError> {
        self.actor_kind.parse()
    }

    pub fn requester(&self) -> Result<Actor, EngineError> {
        Ok(Actor { id: self.requester_actor_id.clone(), kind: self.kind()? })
    }

    pub fn addressee(&self) -> Result<Actor, EngineError> {
        Ok(Actor { id: self.addressee_actor_id.clone(), kind: self.kind()? })
    }

    /// The other party relative to `actor_id`
    pub fn counterpart_of(&self, actor_id: &str) -> &str {
        if self.requester_actor_id == actor_id {
            &self.addressee_actor_id
        } else {
            &self.requester_actor_id
        }
    }
}

/// New connection request for INSERT
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = connection_requests)]
pub struct NewConnectionRequest<'a> {
    pub id: &'a str,
    pub pair_key: &'a str,
    pub actor_kind: &'a str,
    pub requester_actor_id: &'a str,
    pub addressee_actor_id: &'a str,
    pub acting_person_id: &'a str,
    pub status: &'a str,
    pub notes: Option<&'a str>,
    pub requested_at: &'a str,
}

// ============================================================================
// Follow Edge Models
// ============================================================================

/// Follow edge row from SELECT query
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = follow_edges)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct FollowEdge {
    pub person_id: String,
    pub organization_id: String,
    pub created_at: String,
}

/// New follow edge for INSERT
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = follow_edges)]
pub struct NewFollowEdge<'a> {
    pub person_id: &'a str,
    pub organization_id: &'a str,
    pub created_at: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse_is_case_insensitive() {
        assert_eq!("ACCEPTED".parse::<RequestStatus>().unwrap(), RequestStatus::Accepted);
        assert_eq!("accepted".parse::<RequestStatus>().unwrap(), RequestStatus::Accepted);
        assert_eq!("Pending".parse::<RequestStatus>().unwrap(), RequestStatus::Pending);
        assert!("maybe".parse::<RequestStatus>().is_err());
    }

    #[test]
    fn test_only_owner_and_admin_confer_authority() {
        assert!(MembershipRole::Owner.confers_authority());
        assert!(MembershipRole::Admin.confers_authority());
        assert!(!MembershipRole::Member.confers_authority());
        assert!(!MembershipRole::Viewer.confers_authority());
    }

    #[test]
    fn test_decision_maps_to_status() {
        assert_eq!(Decision::Accept.resulting_status(), RequestStatus::Accepted);
        assert_eq!("DECLINE".parse::<Decision>().unwrap().resulting_status(), RequestStatus::Declined);
    }

    #[test]
    fn test_active_statuses() {
        assert!(RequestStatus::Pending.is_active());
        assert!(RequestStatus::Accepted.is_active());
        assert!(!RequestStatus::Declined.is_active());
        assert!(!RequestStatus::Blocked.is_active());
    }

    #[test]
    fn test_serde_uses_upper_case() {
        let json = serde_json::to_string(&ActorKind::Organization).unwrap();
        assert_eq!(json, "\"ORGANIZATION\"");
    }
}
