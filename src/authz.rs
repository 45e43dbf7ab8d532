//! Authorization gate for delegated organization authority
//!
//! A person acts for an organization only while they hold an OWNER or ADMIN
//! membership in it. For person actors the only authorized human is the
//! person themselves.

use std::sync::Arc;

use tracing::debug;

use crate::db::{Actor, ActorKind};
use crate::directory::ActorDirectory;
use crate::error::EngineError;

/// Decides whether a human may act on an actor's behalf
#[derive(Clone)]
pub struct AuthorizationGate {
    directory: Arc<dyn ActorDirectory>,
}

impl AuthorizationGate {
    pub fn new(directory: Arc<dyn ActorDirectory>) -> Self {
        Self { directory }
    }

    /// True iff `person_id` is an OWNER or ADMIN of `organization_id`.
    /// Unknown pairs are simply not authorized.
    pub fn can_act_for(&self, person_id: &str, organization_id: &str) -> Result<bool, EngineError> {
        let allowed = self
            .directory
            .role_of(person_id, organization_id)?
            .map(|role| role.confers_authority())
            .unwrap_or(false);

        debug!(person = %person_id, organization = %organization_id, allowed, "Authorization check");
        Ok(allowed)
    }

    /// Generalization over both actor kinds
    pub fn can_act_for_actor(&self, person_id: &str, actor: &Actor) -> Result<bool, EngineError> {
        match actor.kind {
            ActorKind::Person => Ok(person_id == actor.id),
            ActorKind::Organization => self.can_act_for(person_id, &actor.id),
        }
    }

    /// Like [`Self::can_act_for_actor`] but fails with `Unauthorized`
    pub fn ensure_can_act_for(&self, person_id: &str, actor: &Actor) -> Result<(), EngineError> {
        if self.can_act_for_actor(person_id, actor)? {
            Ok(())
        } else {
            Err(EngineError::Unauthorized(format!(
                "{} may not act for {} {}",
                person_id, actor.kind, actor.id
            )))
        }
    }
}
