//! Connection service - the connection state machine
//!
//! Enacts send/respond/cancel/remove for both person-person and org-org
//! connections. Every precondition is checked before the store is asked to
//! write, and the store re-checks the racy ones inside its transaction, so a
//! failed call never leaves a partial change behind.
//!
//! Directory lookups happen outside `Database::with_conn`; the directory may
//! share the pool.

use std::sync::Arc;

use tracing::{debug, info};

use crate::authz::AuthorizationGate;
use crate::config::RelationshipPolicy;
use crate::db::connection_requests::{self as requests, NewRequestInput};
use crate::db::{Actor, ActorKind, ConnectionRequest, Database, Decision, RequestStatus};
use crate::directory::ActorDirectory;
use crate::error::EngineError;
use crate::state::ConnectionState;

use super::events::{EventBus, RelationshipEvent};

/// State machine over directional connection requests
pub struct ConnectionService {
    db: Database,
    directory: Arc<dyn ActorDirectory>,
    gate: AuthorizationGate,
    policy: RelationshipPolicy,
    events: Arc<EventBus>,
}

impl ConnectionService {
    pub fn new(
        db: Database,
        directory: Arc<dyn ActorDirectory>,
        gate: AuthorizationGate,
        policy: RelationshipPolicy,
        events: Arc<EventBus>,
    ) -> Self {
        Self { db, directory, gate, policy, events }
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    /// Get a request by ID
    pub fn get(&self, request_id: &str) -> Result<Option<ConnectionRequest>, EngineError> {
        self.db.with_conn(|conn| requests::get_request(conn, request_id))
    }

    /// State of the pair as seen by `querying_actor_id`
    pub fn status_of(&self, querying_actor_id: &str, other_actor_id: &str) -> Result<ConnectionState, EngineError> {
        if querying_actor_id == other_actor_id {
            return Ok(ConnectionState::None);
        }

        let rows = self
            .db
            .with_conn(|conn| requests::rows_for_pair(conn, querying_actor_id, other_actor_id))?;

        ConnectionState::derive(querying_actor_id, &rows)
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Propose a connection from `requester` to `addressee`.
    ///
    /// Both actors must resolve in the directory with the kinds the caller
    /// claims, and `acting_person_id` must be able to act for the requester.
    pub fn send(
        &self,
        acting_person_id: &str,
        requester: &Actor,
        addressee: &Actor,
        note: Option<&str>,
    ) -> Result<ConnectionRequest, EngineError> {
        if requester.id == addressee.id {
            return Err(EngineError::SelfReference(requester.id.clone()));
        }

        let requester = self.resolve(requester)?;
        let addressee = self.resolve(addressee)?;

        if requester.kind != addressee.kind {
            return Err(EngineError::InvalidInput(format!(
                "cannot connect {} {} with {} {}",
                requester.kind, requester.id, addressee.kind, addressee.id
            )));
        }

        self.gate.ensure_can_act_for(acting_person_id, &requester)?;

        let note = note.map(str::trim).filter(|n| !n.is_empty());
        let input = NewRequestInput {
            kind: requester.kind,
            requester_actor_id: &requester.id,
            addressee_actor_id: &addressee.id,
            acting_person_id,
            notes: note,
            allow_resend_after_decline: self.policy.allow_resend_after_decline,
        };

        let request = self.db.with_conn(|conn| requests::insert_pending(conn, &input))?;

        info!(
            request = %request.id,
            kind = %requester.kind,
            requester = %requester.id,
            addressee = %addressee.id,
            "Connection request sent"
        );

        self.events.emit(RelationshipEvent::ConnectionRequested {
            request_id: request.id.clone(),
            kind: requester.kind,
            requester_id: requester.id,
            addressee_id: addressee.id,
            acting_person_id: acting_person_id.to_string(),
        });

        Ok(request)
    }

    /// Accept or decline a pending request addressed to an actor the caller
    /// can act for. Requests of another kind than `kind` are not visible.
    pub fn respond(
        &self,
        acting_person_id: &str,
        kind: ActorKind,
        request_id: &str,
        decision: Decision,
    ) -> Result<ConnectionRequest, EngineError> {
        let request = self.load_request(kind, request_id)?;
        self.ensure_not_blocked(&request)?;

        if request.status()? != RequestStatus::Pending {
            return Err(EngineError::AlreadyResolved(request.id));
        }

        self.gate.ensure_can_act_for(acting_person_id, &request.addressee()?)?;

        if request.acting_person_id == acting_person_id {
            return Err(EngineError::Unauthorized(format!(
                "{} sent request {} and cannot answer it",
                acting_person_id, request.id
            )));
        }

        let resolved = self.db.with_conn(|conn| {
            requests::resolve_pending(conn, request_id, decision.resulting_status(), acting_person_id)
        })?;

        info!(request = %request_id, decision = ?decision, by = %acting_person_id, "Connection request answered");

        self.events.emit(RelationshipEvent::ConnectionResponded {
            request_id: resolved.id.clone(),
            decision,
            responded_by: acting_person_id.to_string(),
        });

        Ok(resolved)
    }

    /// Withdraw a pending request sent by an actor the caller can act for
    pub fn cancel(
        &self,
        acting_person_id: &str,
        kind: ActorKind,
        request_id: &str,
    ) -> Result<ConnectionRequest, EngineError> {
        let request = self.load_request(kind, request_id)?;
        self.ensure_not_blocked(&request)?;

        if request.status()? != RequestStatus::Pending {
            return Err(EngineError::NotCancelable(request.id));
        }

        self.gate.ensure_can_act_for(acting_person_id, &request.requester()?)?;

        let canceled = self.db.with_conn(|conn| requests::delete_pending(conn, request_id))?;

        info!(request = %request_id, by = %acting_person_id, "Connection request canceled");

        self.events.emit(RelationshipEvent::ConnectionCanceled {
            request_id: canceled.id.clone(),
            canceled_by: acting_person_id.to_string(),
        });

        Ok(canceled)
    }

    /// Tear down an accepted connection. Either side may remove it.
    pub fn remove(&self, acting_person_id: &str, a: &Actor, b: &Actor) -> Result<(), EngineError> {
        if a.id == b.id {
            return Err(EngineError::SelfReference(a.id.clone()));
        }

        let (block, active) = self.db.with_conn(|conn| {
            Ok((
                requests::find_block(conn, &a.id, &b.id)?,
                requests::find_active(conn, &a.id, &b.id)?,
            ))
        })?;

        if block.is_some() {
            return Err(EngineError::Blocked(a.id.clone(), b.id.clone()));
        }

        let connected = match active {
            Some(row) => row.status()? == RequestStatus::Accepted && row.kind()? == a.kind && a.kind == b.kind,
            None => false,
        };
        if !connected {
            return Err(EngineError::NotFound(format!("No connection between {} and {}", a.id, b.id)));
        }

        if !self.gate.can_act_for_actor(acting_person_id, a)? && !self.gate.can_act_for_actor(acting_person_id, b)? {
            return Err(EngineError::Unauthorized(format!(
                "{} may not act for {} or {}",
                acting_person_id, a.id, b.id
            )));
        }

        self.db.with_conn(|conn| requests::delete_accepted(conn, &a.id, &b.id))?;

        info!(a = %a.id, b = %b.id, by = %acting_person_id, "Connection removed");

        self.events.emit(RelationshipEvent::ConnectionRemoved {
            actor_a: a.id.clone(),
            actor_b: b.id.clone(),
            removed_by: acting_person_id.to_string(),
        });

        Ok(())
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Resolve an actor through the directory and check its kind
    fn resolve(&self, claimed: &Actor) -> Result<Actor, EngineError> {
        let actor = self
            .directory
            .actor(&claimed.id)?
            .ok_or_else(|| EngineError::NotFound(format!("Unknown {} {}", claimed.kind, claimed.id)))?;

        if actor.kind != claimed.kind {
            return Err(EngineError::InvalidInput(format!(
                "{} is a {}, not a {}",
                actor.id, actor.kind, claimed.kind
            )));
        }

        Ok(actor)
    }

    fn load_request(&self, kind: ActorKind, request_id: &str) -> Result<ConnectionRequest, EngineError> {
        let not_found = || EngineError::NotFound(format!("Connection request {} not found", request_id));

        let request = self.get(request_id)?.ok_or_else(not_found)?;
        if request.kind()? != kind {
            debug!(request = %request_id, expected = %kind, "Request belongs to the other flow");
            return Err(not_found());
        }
        Ok(request)
    }

    fn ensure_not_blocked(&self, request: &ConnectionRequest) -> Result<(), EngineError> {
        let blocked = request.status()? == RequestStatus::Blocked
            || self
                .db
                .with_conn(|conn| {
                    requests::find_block(conn, &request.requester_actor_id, &request.addressee_actor_id)
                })?
                .is_some();

        if blocked {
            return Err(EngineError::Blocked(
                request.requester_actor_id.clone(),
                request.addressee_actor_id.clone(),
            ));
        }
        Ok(())
    }
}
