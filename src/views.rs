//! View types for HTTP API boundary
//!
//! These types use camelCase serialization for TypeScript clients.
//! Rows in db/models.rs keep the snake_case column names.
//!
//! Pattern:
//! - Service layer returns rows and domain types (ConnectionRequest, Actor, ...)
//! - HTTP layer converts to View types (ConnectionRequestView, ...)
//! - ts-rs generates camelCase TypeScript from View types
//!
//! Design principles:
//! - Status text is parsed at the boundary; views expose closed enums.
//! - Counterpart display info is optional. A profile the directory no longer
//!   knows degrades to the bare id.
//!
//! InputView types (suffix InputView):
//! - Accept camelCase JSON from TypeScript
//! - Carry `schemaVersion` (default 1); unknown fields are ignored

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::db::{Actor, ActorKind, ConnectionRequest, DbStats, Decision, FollowEdge, RequestStatus};
use crate::directory::ActorProfile;
use crate::error::EngineError;
use crate::services::{ConnectionEntry, EnrichedRequest, FollowedOrganization};
use crate::state::ConnectionState;

/// Default schema version for InputView types.
/// Clients that omit schemaVersion are implicitly version 1.
fn default_schema_version() -> u32 { 1 }

/// Supported schema versions. Reject anything not in this set.
pub const SUPPORTED_SCHEMA_VERSIONS: &[u32] = &[1];

/// Validate the schema version of an input body
pub fn validate_schema_version(version: u32) -> Result<(), EngineError> {
    if !SUPPORTED_SCHEMA_VERSIONS.contains(&version) {
        return Err(EngineError::InvalidInput(format!(
            "Unsupported schema version: {}. Supported: {:?}",
            version, SUPPORTED_SCHEMA_VERSIONS
        )));
    }
    Ok(())
}

// ============================================================================
// Connection Request Views
// ============================================================================

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ConnectionRequestView {
    pub id: String,
    pub kind: ActorKind,
    pub requester_id: String,
    pub addressee_id: String,
    /// Human who sent the request, on the requester's behalf for organizations
    pub acting_person_id: String,
    pub status: RequestStatus,
    pub note: Option<String>,
    pub requested_at: String,
    pub responded_at: Option<String>,
    pub responded_by: Option<String>,
}

impl TryFrom<ConnectionRequest> for ConnectionRequestView {
    type Error = EngineError;

    fn try_from(r: ConnectionRequest) -> Result<Self, Self::Error> {
        Ok(Self {
            kind: r.kind()?,
            status: r.status()?,
            id: r.id,
            requester_id: r.requester_actor_id,
            addressee_id: r.addressee_actor_id,
            acting_person_id: r.acting_person_id,
            note: r.notes,
            requested_at: r.requested_at,
            responded_at: r.responded_at,
            responded_by: r.responded_by,
        })
    }
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct EnrichedRequestView {
    #[serde(flatten)]
    pub request: ConnectionRequestView,
    /// The party on the other side, from the viewer's perspective
    pub counterpart: ActorProfileView,
}

impl TryFrom<EnrichedRequest> for EnrichedRequestView {
    type Error = EngineError;

    fn try_from(e: EnrichedRequest) -> Result<Self, Self::Error> {
        Ok(Self {
            request: e.request.try_into()?,
            counterpart: ActorProfileView::from_parts(e.counterpart, e.profile),
        })
    }
}

// ============================================================================
// Actor Views
// ============================================================================

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ActorProfileView {
    pub id: String,
    pub kind: ActorKind,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

impl ActorProfileView {
    pub fn from_parts(actor: Actor, profile: Option<ActorProfile>) -> Self {
        match profile {
            Some(p) => Self {
                id: actor.id,
                kind: actor.kind,
                display_name: Some(p.display_name),
                avatar_url: p.avatar_url,
            },
            None => Self {
                id: actor.id,
                kind: actor.kind,
                display_name: None,
                avatar_url: None,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ConnectionView {
    #[serde(flatten)]
    pub actor: ActorProfileView,
    pub connected_at: Option<String>,
}

impl From<ConnectionEntry> for ConnectionView {
    fn from(e: ConnectionEntry) -> Self {
        Self {
            actor: ActorProfileView::from_parts(e.actor, e.profile),
            connected_at: e.connected_at,
        }
    }
}

// ============================================================================
// Status Views
// ============================================================================

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct StatusView {
    pub status: ConnectionState,
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct FollowStatusView {
    pub following: bool,
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct FollowEdgeView {
    pub person_id: String,
    pub organization_id: String,
    pub created_at: String,
}

impl From<FollowEdge> for FollowEdgeView {
    fn from(e: FollowEdge) -> Self {
        Self {
            person_id: e.person_id,
            organization_id: e.organization_id,
            created_at: e.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct FollowedOrganizationView {
    #[serde(flatten)]
    pub organization: ActorProfileView,
    pub followed_at: String,
}

impl From<FollowedOrganization> for FollowedOrganizationView {
    fn from(f: FollowedOrganization) -> Self {
        Self {
            organization: ActorProfileView::from_parts(f.organization, f.profile),
            followed_at: f.followed_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AdminCheckView {
    pub is_admin: bool,
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CountView {
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthView {
    pub status: &'static str,
    pub version: &'static str,
    pub stats: DbStats,
}

// ============================================================================
// Input Views
// ============================================================================

#[derive(Debug, Clone, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SendConnectionInputView {
    pub addressee_person_id: String,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
}

#[derive(Debug, Clone, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SendCompanyConnectionInputView {
    pub target_company_id: String,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
}

#[derive(Debug, Clone, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RespondInputView {
    /// "ACCEPT" or "DECLINE", any letter case
    pub decision: String,
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
}

impl RespondInputView {
    pub fn decision(&self) -> Result<Decision, EngineError> {
        validate_schema_version(self.schema_version)?;
        self.decision.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> ConnectionRequest {
        ConnectionRequest {
            id: "r1".into(),
            pair_key: "u1|u2".into(),
            actor_kind: "person".into(),
            requester_actor_id: "u1".into(),
            addressee_actor_id: "u2".into(),
            acting_person_id: "u1".into(),
            status: "ACCEPTED".into(),
            notes: Some("hello".into()),
            requested_at: "2024-01-01T00:00:00.000Z".into(),
            responded_at: Some("2024-01-02T00:00:00.000Z".into()),
            responded_by: Some("u2".into()),
        }
    }

    #[test]
    fn request_view_is_camel_case() {
        let view = ConnectionRequestView::try_from(row()).unwrap();
        let json = serde_json::to_value(&view).unwrap();

        assert_eq!(json["requesterId"], "u1");
        assert_eq!(json["status"], "ACCEPTED");
        assert_eq!(json["kind"], "PERSON");
        assert_eq!(json["respondedBy"], "u2");
        assert_eq!(json["note"], "hello");
    }

    #[test]
    fn enriched_view_flattens_request() {
        let view = EnrichedRequestView::try_from(EnrichedRequest {
            request: row(),
            counterpart: Actor::person("u1"),
            profile: None,
        })
        .unwrap();
        let json = serde_json::to_value(&view).unwrap();

        assert_eq!(json["id"], "r1");
        assert_eq!(json["counterpart"]["id"], "u1");
        assert!(json["counterpart"]["displayName"].is_null());
    }

    #[test]
    fn status_view_uses_state_names() {
        let json = serde_json::to_value(StatusView { status: ConnectionState::DeclinedReceived }).unwrap();
        assert_eq!(json["status"], "DECLINED_RECEIVED");
    }

    #[test]
    fn admin_check_view_field_name() {
        let json = serde_json::to_value(AdminCheckView { is_admin: true }).unwrap();
        assert_eq!(json["isAdmin"], true);
    }

    #[test]
    fn default_schema_version_is_one() {
        let view: SendConnectionInputView =
            serde_json::from_str(r#"{"addresseePersonId":"u2"}"#).unwrap();
        assert_eq!(view.schema_version, 1);
        assert!(view.note.is_none());
    }

    #[test]
    fn unknown_fields_are_silently_ignored() {
        let view: SendCompanyConnectionInputView =
            serde_json::from_str(r#"{"targetCompanyId":"org2","futureField":42}"#).unwrap();
        assert_eq!(view.target_company_id, "org2");
    }

    #[test]
    fn decision_is_case_insensitive() {
        let view: RespondInputView = serde_json::from_str(r#"{"decision":"accept"}"#).unwrap();
        assert_eq!(view.decision().unwrap(), Decision::Accept);

        let bad: RespondInputView = serde_json::from_str(r#"{"decision":"maybe"}"#).unwrap();
        assert!(matches!(bad.decision(), Err(EngineError::InvalidInput(_))));

        let future: RespondInputView =
            serde_json::from_str(r#"{"decision":"DECLINE","schemaVersion":9}"#).unwrap();
        assert!(matches!(future.decision(), Err(EngineError::InvalidInput(_))));
    }
}
