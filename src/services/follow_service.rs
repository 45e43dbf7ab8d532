//! Follow service - approval-free person -> organization edges

use std::sync::Arc;

use tracing::info;

use crate::authz::AuthorizationGate;
use crate::config::RelationshipPolicy;
use crate::db::connection_requests::PageQuery;
use crate::db::follow_edges;
use crate::db::{Actor, ActorKind, Database, FollowEdge};
use crate::directory::{ActorDirectory, ActorProfile};
use crate::error::EngineError;

use super::events::{EventBus, RelationshipEvent};

/// An organization a person follows, with its directory profile
#[derive(Debug, Clone)]
pub struct FollowedOrganization {
    pub organization: Actor,
    pub profile: Option<ActorProfile>,
    pub followed_at: String,
}

/// Follow manager
pub struct FollowService {
    db: Database,
    directory: Arc<dyn ActorDirectory>,
    gate: AuthorizationGate,
    policy: RelationshipPolicy,
    events: Arc<EventBus>,
}

impl FollowService {
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

    pub fn is_following(&self, person_id: &str, organization_id: &str) -> Result<bool, EngineError> {
        Ok(self
            .db
            .with_conn(|conn| follow_edges::get_edge(conn, person_id, organization_id))?
            .is_some())
    }

    pub fn follower_count(&self, organization_id: &str) -> Result<u64, EngineError> {
        let count = self
            .db
            .with_conn(|conn| follow_edges::follower_count(conn, organization_id))?;
        Ok(count.max(0) as u64)
    }

    /// Organizations a person follows, newest first
    pub fn followed_organizations(
        &self,
        person_id: &str,
        page: PageQuery,
    ) -> Result<Vec<FollowedOrganization>, EngineError> {
        let edges = self
            .db
            .with_conn(|conn| follow_edges::list_followed(conn, person_id, page))?;

        let ids: Vec<String> = edges.iter().map(|e| e.organization_id.clone()).collect();
        let mut profiles = self.directory.profiles(&ids)?;

        Ok(edges
            .into_iter()
            .map(|edge| FollowedOrganization {
                profile: profiles.remove(&edge.organization_id),
                organization: Actor::organization(edge.organization_id),
                followed_at: edge.created_at,
            })
            .collect())
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    /// Follow an organization; following again is a no-op
    pub fn follow(&self, person_id: &str, organization_id: &str) -> Result<FollowEdge, EngineError> {
        self.resolve(person_id, ActorKind::Person)?;
        self.resolve(organization_id, ActorKind::Organization)?;

        if self.policy.forbid_admin_self_follow && self.gate.can_act_for(person_id, organization_id)? {
            return Err(EngineError::SelfFollow(organization_id.to_string()));
        }

        let (edge, created) = self
            .db
            .with_conn(|conn| follow_edges::insert_edge(conn, person_id, organization_id))?;

        if created {
            info!(person = %person_id, organization = %organization_id, "Organization followed");
            self.events.emit(RelationshipEvent::Followed {
                person_id: person_id.to_string(),
                organization_id: organization_id.to_string(),
            });
        }

        Ok(edge)
    }

    /// Stop following; returns whether an edge was removed
    pub fn unfollow(&self, person_id: &str, organization_id: &str) -> Result<bool, EngineError> {
        let removed = self
            .db
            .with_conn(|conn| follow_edges::delete_edge(conn, person_id, organization_id))?;

        if removed {
            info!(person = %person_id, organization = %organization_id, "Organization unfollowed");
            self.events.emit(RelationshipEvent::Unfollowed {
                person_id: person_id.to_string(),
                organization_id: organization_id.to_string(),
            });
        }

        Ok(removed)
    }

    fn resolve(&self, id: &str, expected: ActorKind) -> Result<Actor, EngineError> {
        let actor = self
            .directory
            .actor(id)?
            .ok_or_else(|| EngineError::NotFound(format!("Unknown {} {}", expected, id)))?;

        if actor.kind != expected {
            return Err(EngineError::InvalidInput(format!("{} is not a {}", id, expected)));
        }
        Ok(actor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{directory as repo, MembershipRole};
    use crate::directory::SqliteDirectory;

    fn service_with(policy: RelationshipPolicy) -> FollowService {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            repo::upsert_actor(conn, "p1", ActorKind::Person, "Pat", None)?;
            repo::upsert_actor(conn, "boss", ActorKind::Person, "Boss", None)?;
            repo::upsert_actor(conn, "acme", ActorKind::Organization, "Acme", None)?;
            repo::upsert_membership(conn, "boss", "acme", MembershipRole::Owner)?;
            Ok(())
        })
        .unwrap();

        let directory: Arc<dyn ActorDirectory> = Arc::new(SqliteDirectory::new(db.clone()));
        FollowService::new(
            db,
            directory.clone(),
            AuthorizationGate::new(directory),
            policy,
            Arc::new(EventBus::new()),
        )
    }

    #[test]
    fn test_follow_twice_is_one_edge() {
        let svc = service_with(RelationshipPolicy::default());

        let first = svc.follow("p1", "acme").unwrap();
        let second = svc.follow("p1", "acme").unwrap();

        assert_eq!(first, second);
        assert!(svc.is_following("p1", "acme").unwrap());
        assert_eq!(svc.follower_count("acme").unwrap(), 1);

        let followed = svc.followed_organizations("p1", PageQuery::default()).unwrap();
        assert_eq!(followed.len(), 1);
        assert_eq!(followed[0].organization, Actor::organization("acme"));
        assert_eq!(followed[0].profile.as_ref().unwrap().display_name, "Acme");
        assert_eq!(followed[0].followed_at, first.created_at);
    }

    #[test]
    fn test_refollow_emits_no_event() {
        let svc = service_with(RelationshipPolicy::default());
        let mut events = svc.events.subscribe();

        svc.follow("p1", "acme").unwrap();
        svc.follow("p1", "acme").unwrap();

        assert!(matches!(events.try_recv(), Ok(RelationshipEvent::Followed { .. })));
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_unfollow_is_idempotent() {
        let svc = service_with(RelationshipPolicy::default());
        svc.follow("p1", "acme").unwrap();

        assert!(svc.unfollow("p1", "acme").unwrap());
        assert!(!svc.unfollow("p1", "acme").unwrap());
        assert!(!svc.is_following("p1", "acme").unwrap());
    }

    #[test]
    fn test_follow_validates_kinds() {
        let svc = service_with(RelationshipPolicy::default());

        assert!(matches!(svc.follow("ghost", "acme"), Err(EngineError::NotFound(_))));
        assert!(matches!(svc.follow("p1", "boss"), Err(EngineError::InvalidInput(_))));
        assert!(matches!(svc.follow("acme", "acme"), Err(EngineError::InvalidInput(_))));
    }

    #[test]
    fn test_admin_self_follow_policy() {
        let strict = service_with(RelationshipPolicy::default());
        assert!(matches!(strict.follow("boss", "acme"), Err(EngineError::SelfFollow(_))));

        let relaxed = service_with(RelationshipPolicy {
            forbid_admin_self_follow: false,
            ..RelationshipPolicy::default()
        });
        relaxed.follow("boss", "acme").unwrap();
        assert_eq!(relaxed.follower_count("acme").unwrap(), 1);
    }
}
