//! Perspective-qualified connection state
//!
//! Rows are directional; what a caller sees depends on which side of the row
//! it is on. None of these states are stored.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::db::{ConnectionRequest, RequestStatus};
use crate::error::EngineError;

/// Situation of a pair as observed by one of its actors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum ConnectionState {
    None,
    PendingSent,
    PendingReceived,
    Accepted,
    DeclinedSent,
    DeclinedReceived,
    Blocked,
}

impl ConnectionState {
    /// State of a single row seen from `querying_actor_id`
    pub fn of_row(querying_actor_id: &str, row: &ConnectionRequest) -> Result<Self, EngineError> {
        let sent = row.requester_actor_id == querying_actor_id;
        Ok(match row.status()? {
            RequestStatus::Pending if sent => ConnectionState::PendingSent,
            RequestStatus::Pending => ConnectionState::PendingReceived,
            RequestStatus::Accepted => ConnectionState::Accepted,
            RequestStatus::Declined if sent => ConnectionState::DeclinedSent,
            RequestStatus::Declined => ConnectionState::DeclinedReceived,
            RequestStatus::Blocked => ConnectionState::Blocked,
        })
    }

    /// Fold every row of a pair into one state.
    ///
    /// A block wins over everything, then the active row, then the most
    /// recent decline. `rows` must be ordered newest first.
    pub fn derive(querying_actor_id: &str, rows: &[ConnectionRequest]) -> Result<Self, EngineError> {
        let mut newest_declined = None;
        let mut active = None;

        for row in rows {
            match row.status()? {
                RequestStatus::Blocked => return Ok(ConnectionState::Blocked),
                RequestStatus::Pending | RequestStatus::Accepted => {
                    active.get_or_insert(row);
                }
                RequestStatus::Declined => {
                    newest_declined.get_or_insert(row);
                }
            }
        }

        match active.or(newest_declined) {
            Some(row) => Self::of_row(querying_actor_id, row),
            None => Ok(ConnectionState::None),
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Accepted)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, ConnectionState::PendingSent | ConnectionState::PendingReceived)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str, from: &str, to: &str, status: &str, at: &str) -> ConnectionRequest {
        ConnectionRequest {
            id: id.to_string(),
            pair_key: crate::db::connection_requests::pair_key(from, to),
            actor_kind: "person".to_string(),
            requester_actor_id: from.to_string(),
            addressee_actor_id: to.to_string(),
            acting_person_id: from.to_string(),
            status: status.to_string(),
            notes: None,
            requested_at: at.to_string(),
            responded_at: None,
            responded_by: None,
        }
    }

    #[test]
    fn test_no_rows_is_none() {
        assert_eq!(ConnectionState::derive("a", &[]).unwrap(), ConnectionState::None);
    }

    #[test]
    fn test_pending_is_direction_qualified() {
        let rows = vec![row("r1", "a", "b", "pending", "2024-01-01T00:00:00.000Z")];
        assert_eq!(ConnectionState::derive("a", &rows).unwrap(), ConnectionState::PendingSent);
        assert_eq!(ConnectionState::derive("b", &rows).unwrap(), ConnectionState::PendingReceived);
    }

    #[test]
    fn test_accepted_is_symmetric() {
        let rows = vec![row("r1", "a", "b", "ACCEPTED", "2024-01-01T00:00:00.000Z")];
        assert_eq!(ConnectionState::derive("a", &rows).unwrap(), ConnectionState::Accepted);
        assert_eq!(ConnectionState::derive("b", &rows).unwrap(), ConnectionState::Accepted);
    }

    #[test]
    fn test_active_row_beats_older_decline() {
        let rows = vec![
            row("r2", "b", "a", "pending", "2024-02-01T00:00:00.000Z"),
            row("r1", "a", "b", "declined", "2024-01-01T00:00:00.000Z"),
        ];
        assert_eq!(ConnectionState::derive("a", &rows).unwrap(), ConnectionState::PendingReceived);
    }

    #[test]
    fn test_newest_decline_decides_direction() {
        let rows = vec![
            row("r2", "b", "a", "declined", "2024-02-01T00:00:00.000Z"),
            row("r1", "a", "b", "declined", "2024-01-01T00:00:00.000Z"),
        ];
        assert_eq!(ConnectionState::derive("a", &rows).unwrap(), ConnectionState::DeclinedReceived);
        assert_eq!(ConnectionState::derive("b", &rows).unwrap(), ConnectionState::DeclinedSent);
    }

    #[test]
    fn test_block_wins() {
        let rows = vec![
            row("r2", "a", "b", "declined", "2024-02-01T00:00:00.000Z"),
            row("r1", "b", "a", "blocked", "2024-01-01T00:00:00.000Z"),
        ];
        assert_eq!(ConnectionState::derive("a", &rows).unwrap(), ConnectionState::Blocked);
    }

    #[test]
    fn test_serializes_screaming_case() {
        let json = serde_json::to_string(&ConnectionState::PendingSent).unwrap();
        assert_eq!(json, "\"PENDING_SENT\"");
    }
}
