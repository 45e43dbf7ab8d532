//! Query service - read side of the relationship graph
//!
//! Lists are answered straight from the store. The enriched variants join
//! counterpart display info from the directory in one batch; a counterpart
//! the directory no longer knows still appears, just without a profile.

use std::collections::HashMap;
use std::sync::Arc;

use crate::authz::AuthorizationGate;
use crate::db::connection_requests::{self as requests, PageQuery};
use crate::db::{Actor, ConnectionRequest, Database};
use crate::directory::{ActorDirectory, ActorProfile};
use crate::error::EngineError;
use crate::state::ConnectionState;

use super::connection_service::ConnectionService;

/// A request paired with the party on the other side of it
#[derive(Debug, Clone)]
pub struct EnrichedRequest {
    pub request: ConnectionRequest,
    pub counterpart: Actor,
    pub profile: Option<ActorProfile>,
}

/// A connected counterpart
#[derive(Debug, Clone)]
pub struct ConnectionEntry {
    pub actor: Actor,
    pub profile: Option<ActorProfile>,
    pub connected_at: Option<String>,
}

/// Read-side façade
pub struct QueryService {
    db: Database,
    directory: Arc<dyn ActorDirectory>,
    gate: AuthorizationGate,
    connections: Arc<ConnectionService>,
}

impl QueryService {
    pub fn new(
        db: Database,
        directory: Arc<dyn ActorDirectory>,
        gate: AuthorizationGate,
        connections: Arc<ConnectionService>,
    ) -> Self {
        Self { db, directory, gate, connections }
    }

    /// Fail with `Unauthorized` unless `person_id` may view `actor`'s lists
    pub fn ensure_can_view(&self, person_id: &str, actor: &Actor) -> Result<(), EngineError> {
        self.gate.ensure_can_act_for(person_id, actor)
    }

    // =========================================================================
    // Plain Lists
    // =========================================================================

    /// Pending requests addressed to the actor, newest first
    pub fn pending_incoming(&self, actor_id: &str, page: PageQuery) -> Result<Vec<ConnectionRequest>, EngineError> {
        self.db.with_conn(|conn| requests::list_incoming_pending(conn, actor_id, page))
    }

    /// Pending requests the actor sent, newest first
    pub fn pending_outgoing(&self, actor_id: &str, page: PageQuery) -> Result<Vec<ConnectionRequest>, EngineError> {
        self.db.with_conn(|conn| requests::list_outgoing_pending(conn, actor_id, page))
    }

    /// Counterparts of every accepted connection, across both directions
    pub fn current_connections(&self, actor_id: &str, page: PageQuery) -> Result<Vec<Actor>, EngineError> {
        self.accepted_rows(actor_id, page)?
            .iter()
            .map(|row| counterpart(row, actor_id))
            .collect()
    }

    pub fn status_between(&self, a: &str, b: &str) -> Result<ConnectionState, EngineError> {
        self.connections.status_of(a, b)
    }

    // =========================================================================
    // Enriched Lists
    // =========================================================================

    pub fn pending_incoming_enriched(&self, actor_id: &str, page: PageQuery) -> Result<Vec<EnrichedRequest>, EngineError> {
        let rows = self.pending_incoming(actor_id, page)?;
        self.enrich(actor_id, rows)
    }

    pub fn pending_outgoing_enriched(&self, actor_id: &str, page: PageQuery) -> Result<Vec<EnrichedRequest>, EngineError> {
        let rows = self.pending_outgoing(actor_id, page)?;
        self.enrich(actor_id, rows)
    }

    pub fn connections_enriched(&self, actor_id: &str, page: PageQuery) -> Result<Vec<ConnectionEntry>, EngineError> {
        let rows = self.accepted_rows(actor_id, page)?;
        let mut profiles = self.profiles_for(actor_id, &rows)?;

        rows.into_iter()
            .map(|row| {
                let actor = counterpart(&row, actor_id)?;
                Ok(ConnectionEntry {
                    profile: profiles.remove(&actor.id),
                    actor,
                    connected_at: row.responded_at,
                })
            })
            .collect()
    }

    fn accepted_rows(&self, actor_id: &str, page: PageQuery) -> Result<Vec<ConnectionRequest>, EngineError> {
        self.db.with_conn(|conn| requests::list_accepted(conn, actor_id, page))
    }

    fn profiles_for(
        &self,
        actor_id: &str,
        rows: &[ConnectionRequest],
    ) -> Result<HashMap<String, ActorProfile>, EngineError> {
        let ids: Vec<String> = rows
            .iter()
            .map(|row| row.counterpart_of(actor_id).to_string())
            .collect();
        self.directory.profiles(&ids)
    }

    fn enrich(&self, actor_id: &str, rows: Vec<ConnectionRequest>) -> Result<Vec<EnrichedRequest>, EngineError> {
        let profiles = self.profiles_for(actor_id, &rows)?;

        rows.into_iter()
            .map(|request| {
                let counterpart = counterpart(&request, actor_id)?;
                Ok(EnrichedRequest {
                    profile: profiles.get(&counterpart.id).cloned(),
                    counterpart,
                    request,
                })
            })
            .collect()
    }
}

fn counterpart(row: &ConnectionRequest, actor_id: &str) -> Result<Actor, EngineError> {
    Ok(Actor {
        id: row.counterpart_of(actor_id).to_string(),
        kind: row.kind()?,
    })
}
