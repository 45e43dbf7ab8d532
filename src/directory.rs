//! Actor directory seam
//!
//! People, organizations and their membership roles belong to the platform's
//! directory service. The engine reads them through [`ActorDirectory`]; the
//! default [`SqliteDirectory`] reads the mirror tables kept in the
//! relationship database.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::db::{directory as repo, Actor, ActorKind, Database, MembershipRole};
use crate::error::EngineError;

/// Display metadata for an actor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorProfile {
    pub id: String,
    pub kind: ActorKind,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

/// Read access to identities and membership roles
pub trait ActorDirectory: Send + Sync {
    /// Resolve an actor; `None` if the directory does not know it
    fn actor(&self, id: &str) -> Result<Option<Actor>, EngineError>;

    /// Role of a person in an organization; `None` if not a member
    fn role_of(&self, person_id: &str, organization_id: &str) -> Result<Option<MembershipRole>, EngineError>;

    /// Display metadata for a batch of actors, keyed by id
    fn profiles(&self, ids: &[String]) -> Result<HashMap<String, ActorProfile>, EngineError>;
}

/// Directory backed by the mirror tables in the relationship database
#[derive(Clone)]
pub struct SqliteDirectory {
    db: Database,
}

impl SqliteDirectory {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl ActorDirectory for SqliteDirectory {
    fn actor(&self, id: &str) -> Result<Option<Actor>, EngineError> {
        self.db
            .with_conn(|conn| repo::get_actor(conn, id))?
            .map(|record| record.actor())
            .transpose()
    }

    fn role_of(&self, person_id: &str, organization_id: &str) -> Result<Option<MembershipRole>, EngineError> {
        self.db
            .with_conn(|conn| repo::get_membership(conn, person_id, organization_id))?
            .map(|m| m.role())
            .transpose()
    }

    fn profiles(&self, ids: &[String]) -> Result<HashMap<String, ActorProfile>, EngineError> {
        let records = self.db.with_conn(|conn| repo::get_actors(conn, ids))?;

        records
            .into_iter()
            .map(|r| {
                let kind = r.kind.parse()?;
                Ok((
                    r.id.clone(),
                    ActorProfile {
                        id: r.id,
                        kind,
                        display_name: r.display_name,
                        avatar_url: r.avatar_url,
                    },
                ))
            })
            .collect()
    }
}

// ============================================================================
// Seeding
// ============================================================================

/// Actor entry in a seed file
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedActor {
    pub id: String,
    pub kind: ActorKind,
    pub display_name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// Membership entry in a seed file
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedMembership {
    pub person_id: String,
    pub organization_id: String,
    pub role: MembershipRole,
}

/// Directory snapshot for development deployments without a directory sync
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirectorySeed {
    #[serde(default)]
    pub actors: Vec<SeedActor>,
    #[serde(default)]
    pub memberships: Vec<SeedMembership>,
}

impl DirectorySeed {
    /// Load a seed from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, EngineError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write the seed into the mirror tables
    pub fn apply(&self, db: &Database) -> Result<(), EngineError> {
        db.with_conn(|conn| {
            conn.immediate_transaction(|conn| {
                for actor in &self.actors {
                    repo::upsert_actor(
                        conn,
                        &actor.id,
                        actor.kind,
                        &actor.display_name,
                        actor.avatar_url.as_deref(),
                    )?;
                }
                for m in &self.memberships {
                    repo::upsert_membership(conn, &m.person_id, &m.organization_id, m.role)?;
                }
                Ok::<_, EngineError>(())
            })
        })?;

        info!(
            actors = self.actors.len(),
            memberships = self.memberships.len(),
            "Applied directory seed"
        );
        Ok(())
    }
}
