//! Integration tests for the connection and follow lifecycle
//!
//! These run against a file-backed database with a real connection pool so
//! concurrent callers contend on SQLite the way daemon requests do.

use std::sync::{Arc, Barrier};
use std::thread;

use connection_engine::db::connection_requests::{self as requests, PageQuery};
use connection_engine::{
    Actor, ActorKind, ConnectionState, Database, Decision, DirectorySeed, EngineError,
    RelationshipEvent, RelationshipPolicy, RequestStatus, Services, SqliteDirectory,
};
use tempfile::TempDir;

const SEED: &str = r#"{
    "actors": [
        {"id": "u1", "kind": "PERSON", "displayName": "Uma"},
        {"id": "u2", "kind": "PERSON", "displayName": "Ugo"},
        {"id": "u3", "kind": "PERSON", "displayName": "Ula"},
        {"id": "a1", "kind": "PERSON", "displayName": "Admin One"},
        {"id": "a2", "kind": "PERSON", "displayName": "Admin Two"},
        {"id": "a3", "kind": "PERSON", "displayName": "Admin Three"},
        {"id": "a4", "kind": "PERSON", "displayName": "Admin Four"},
        {"id": "m1", "kind": "PERSON", "displayName": "Member"},
        {"id": "a|b", "kind": "PERSON", "displayName": "Pipe Left"},
        {"id": "c", "kind": "PERSON", "displayName": "Plain C"},
        {"id": "a", "kind": "PERSON", "displayName": "Plain A"},
        {"id": "b|c", "kind": "PERSON", "displayName": "Pipe Right"},
        {"id": "org1", "kind": "ORGANIZATION", "displayName": "Org One"},
        {"id": "org2", "kind": "ORGANIZATION", "displayName": "Org Two"}
    ],
    "memberships": [
        {"personId": "u1", "organizationId": "org1", "role": "ADMIN"},
        {"personId": "m1", "organizationId": "org1", "role": "MEMBER"},
        {"personId": "a1", "organizationId": "org2", "role": "OWNER"},
        {"personId": "a2", "organizationId": "org2", "role": "ADMIN"},
        {"personId": "a3", "organizationId": "org2", "role": "ADMIN"},
        {"personId": "a4", "organizationId": "org2", "role": "ADMIN"}
    ]
}"#;

/// Services over a fresh file database, plus the database for direct checks
fn setup() -> (Arc<Services>, Database, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::open(&temp_dir.path().join("relationships.db"), 8, 5_000).unwrap();

    let seed: DirectorySeed = serde_json::from_str(SEED).unwrap();
    seed.apply(&db).unwrap();

    let directory = Arc::new(SqliteDirectory::new(db.clone()));
    let services = Arc::new(Services::new(db.clone(), directory, RelationshipPolicy::default()));
    (services, db, temp_dir)
}

fn active_rows(db: &Database, a: &str, b: &str) -> usize {
    db.with_conn(|conn| requests::rows_for_pair(conn, a, b))
        .unwrap()
        .iter()
        .filter(|r| r.status().unwrap().is_active())
        .count()
}

/// Test the send -> accept -> remove lifecycle between two people
#[test]
fn test_person_lifecycle() {
    let (services, db, _temp) = setup();
    let svc = &services.connections;

    let request = svc
        .send("u1", &Actor::person("u1"), &Actor::person("u2"), Some("hello"))
        .unwrap();
    assert_eq!(svc.status_of("u1", "u2").unwrap(), ConnectionState::PendingSent);
    assert_eq!(svc.status_of("u2", "u1").unwrap(), ConnectionState::PendingReceived);

    svc.respond("u2", ActorKind::Person, &request.id, Decision::Accept).unwrap();
    assert_eq!(svc.status_of("u1", "u2").unwrap(), ConnectionState::Accepted);
    assert_eq!(svc.status_of("u2", "u1").unwrap(), ConnectionState::Accepted);

    svc.remove("u1", &Actor::person("u1"), &Actor::person("u2")).unwrap();
    assert_eq!(svc.status_of("u1", "u2").unwrap(), ConnectionState::None);
    assert_eq!(active_rows(&db, "u1", "u2"), 0);
}

/// Test that ids containing the key separator never share pair state
#[test]
fn test_separator_ids_keep_pairs_apart() {
    let (services, db, _temp) = setup();
    let svc = &services.connections;

    let request = svc.send("a|b", &Actor::person("a|b"), &Actor::person("c"), None).unwrap();
    svc.respond("c", ActorKind::Person, &request.id, Decision::Accept).unwrap();

    assert_eq!(svc.status_of("a", "b|c").unwrap(), ConnectionState::None);

    let removal = svc.remove("a", &Actor::person("a"), &Actor::person("b|c"));
    assert!(matches!(removal, Err(EngineError::NotFound(_))));
    assert_eq!(svc.status_of("a|b", "c").unwrap(), ConnectionState::Accepted);

    svc.send("a", &Actor::person("a"), &Actor::person("b|c"), None).unwrap();
    assert_eq!(svc.status_of("a", "b|c").unwrap(), ConnectionState::PendingSent);
    assert_eq!(active_rows(&db, "a|b", "c"), 1);
    assert_eq!(active_rows(&db, "a", "b|c"), 1);
}

/// Test that a declined request cannot be answered again
#[test]
fn test_second_response_is_rejected() {
    let (services, db, _temp) = setup();
    let svc = &services.connections;

    let request = svc.send("u1", &Actor::person("u1"), &Actor::person("u2"), None).unwrap();
    svc.respond("u2", ActorKind::Person, &request.id, Decision::Decline).unwrap();

    let again = svc.respond("u2", ActorKind::Person, &request.id, Decision::Accept);
    assert!(matches!(again, Err(EngineError::AlreadyResolved(_))));

    let stored = db
        .with_conn(|conn| requests::get_request(conn, &request.id))
        .unwrap()
        .unwrap();
    assert_eq!(stored.status().unwrap(), RequestStatus::Declined);
}

/// Test duplicate sends leave exactly one pending row
#[test]
fn test_duplicate_send() {
    let (services, db, _temp) = setup();
    let svc = &services.connections;

    svc.send("u1", &Actor::person("u1"), &Actor::person("u2"), None).unwrap();
    let again = svc.send("u1", &Actor::person("u1"), &Actor::person("u2"), None);
    assert!(matches!(again, Err(EngineError::AlreadyRequested(..))));

    assert_eq!(active_rows(&db, "u1", "u2"), 1);
}

/// Test removing a connection that was never accepted
#[test]
fn test_remove_without_connection() {
    let (services, _db, _temp) = setup();
    let result = services
        .connections
        .remove("u1", &Actor::person("u1"), &Actor::person("u3"));
    assert!(matches!(result, Err(EngineError::NotFound(_))));
}

/// Test that a plain member cannot send on the organization's behalf
#[test]
fn test_member_cannot_send_for_org() {
    let (services, db, _temp) = setup();

    let result = services.connections.send(
        "m1",
        &Actor::organization("org1"),
        &Actor::organization("org2"),
        None,
    );
    assert!(matches!(result, Err(EngineError::Unauthorized(_))));
    assert!(db
        .with_conn(|conn| requests::rows_for_pair(conn, "org1", "org2"))
        .unwrap()
        .is_empty());
}

/// Test the incoming list references the requester
#[test]
fn test_incoming_list() {
    let (services, _db, _temp) = setup();
    services
        .connections
        .send("u1", &Actor::person("u1"), &Actor::person("u2"), None)
        .unwrap();

    let incoming = services.queries.pending_incoming("u2", PageQuery::default()).unwrap();
    assert_eq!(incoming.len(), 1);
    assert_eq!(incoming[0].requester_actor_id, "u1");

    let enriched = services
        .queries
        .pending_incoming_enriched("u2", PageQuery::default())
        .unwrap();
    assert_eq!(enriched[0].profile.as_ref().unwrap().display_name, "Uma");
}

/// Test an org admin's request stays outgoing until canceled or answered
#[test]
fn test_org_outgoing_until_resolved() {
    let (services, _db, _temp) = setup();
    let org1 = Actor::organization("org1");
    let org2 = Actor::organization("org2");

    let first = services.connections.send("u1", &org1, &org2, None).unwrap();
    assert_eq!(first.acting_person_id, "u1");
    assert_eq!(
        services.queries.pending_outgoing("org1", PageQuery::default()).unwrap().len(),
        1
    );
    assert_eq!(
        services.queries.pending_incoming("org2", PageQuery::default()).unwrap().len(),
        1
    );

    services.connections.cancel("u1", ActorKind::Organization, &first.id).unwrap();
    assert!(services.queries.pending_outgoing("org1", PageQuery::default()).unwrap().is_empty());

    let second = services.connections.send("u1", &org1, &org2, None).unwrap();
    services
        .connections
        .respond("a2", ActorKind::Organization, &second.id, Decision::Accept)
        .unwrap();
    assert!(services.queries.pending_outgoing("org1", PageQuery::default()).unwrap().is_empty());
    assert_eq!(
        services.queries.current_connections("org2", PageQuery::default()).unwrap(),
        vec![org1.clone()]
    );

    // Either side's admin may tear it down
    services.connections.remove("a4", &org2, &org1).unwrap();
    assert_eq!(services.queries.status_between("org1", "org2").unwrap(), ConnectionState::None);
}

/// Test follow idempotency
#[test]
fn test_follow_twice() {
    let (services, db, _temp) = setup();

    services.follows.follow("u2", "org1").unwrap();
    services.follows.follow("u2", "org1").unwrap();

    assert_eq!(services.follows.follower_count("org1").unwrap(), 1);
    assert_eq!(db.stats().unwrap().follow_edges, 1);

    assert!(services.follows.unfollow("u2", "org1").unwrap());
    assert!(!services.follows.unfollow("u2", "org1").unwrap());
    assert!(!services.follows.is_following("u2", "org1").unwrap());
}

/// Test that racing first follows announce the edge once
#[test]
fn test_concurrent_follows_emit_one_event() {
    let (services, _db, _temp) = setup();
    let mut events = services.events.subscribe();
    let workers = 8;
    let barrier = Arc::new(Barrier::new(workers));

    let handles: Vec<_> = (0..workers)
        .map(|_| {
            let services = services.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                services.follows.follow("u3", "org2")
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    let mut followed = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, RelationshipEvent::Followed { .. }) {
            followed += 1;
        }
    }
    assert_eq!(followed, 1);
    assert_eq!(services.follows.follower_count("org2").unwrap(), 1);
}

/// Test concurrent sends in both directions create one active row
#[test]
fn test_concurrent_sends_create_one_row() {
    let (services, db, _temp) = setup();
    let workers = 8;
    let barrier = Arc::new(Barrier::new(workers));

    let handles: Vec<_> = (0..workers)
        .map(|i| {
            let services = services.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let (from, to) = if i % 2 == 0 { ("u1", "u3") } else { ("u3", "u1") };
                barrier.wait();
                services
                    .connections
                    .send(from, &Actor::person(from), &Actor::person(to), None)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let created = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(created, 1);
    for result in results.iter().filter(|r| r.is_err()) {
        assert!(matches!(result, Err(EngineError::AlreadyRequested(..))));
    }
    assert_eq!(active_rows(&db, "u1", "u3"), 1);
}

/// Test concurrent responders: exactly one wins
#[test]
fn test_concurrent_responses_have_one_winner() {
    let (services, db, _temp) = setup();
    let request = services
        .connections
        .send("u1", &Actor::organization("org1"), &Actor::organization("org2"), None)
        .unwrap();

    let admins = ["a1", "a2", "a3", "a4"];
    let barrier = Arc::new(Barrier::new(admins.len()));

    let handles: Vec<_> = admins
        .iter()
        .enumerate()
        .map(|(i, admin)| {
            let services = services.clone();
            let barrier = barrier.clone();
            let id = request.id.clone();
            let admin = admin.to_string();
            thread::spawn(move || {
                let decision = if i % 2 == 0 { Decision::Accept } else { Decision::Decline };
                barrier.wait();
                services
                    .connections
                    .respond(&admin, ActorKind::Organization, &id, decision)
                    .map(|r| (admin, r))
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    for result in results.iter().filter(|r| r.is_err()) {
        assert!(matches!(result, Err(EngineError::AlreadyResolved(_))));
    }

    let (winner, resolved) = winners[0];
    let stored = db
        .with_conn(|conn| requests::get_request(conn, &request.id))
        .unwrap()
        .unwrap();
    assert_eq!(stored.responded_by.as_deref(), Some(winner.as_str()));
    assert_eq!(stored.status, resolved.status);
}

/// Test a block suppresses every transition until lifted
#[test]
fn test_block_suppresses_transitions() {
    let (services, db, _temp) = setup();
    let svc = &services.connections;

    let request = svc.send("u1", &Actor::person("u1"), &Actor::person("u2"), None).unwrap();
    svc.respond("u2", ActorKind::Person, &request.id, Decision::Accept).unwrap();

    db.with_conn(|conn| requests::block_pair(conn, ActorKind::Person, "u2", "u1", "trust-and-safety"))
        .unwrap();

    assert_eq!(svc.status_of("u1", "u2").unwrap(), ConnectionState::Blocked);
    assert!(matches!(
        svc.send("u1", &Actor::person("u1"), &Actor::person("u2"), None),
        Err(EngineError::Blocked(..))
    ));
    assert!(matches!(
        svc.remove("u1", &Actor::person("u1"), &Actor::person("u2")),
        Err(EngineError::Blocked(..))
    ));

    db.with_conn(|conn| requests::unblock_pair(conn, "u1", "u2")).unwrap();
    assert_eq!(svc.status_of("u1", "u2").unwrap(), ConnectionState::None);
    svc.send("u2", &Actor::person("u2"), &Actor::person("u1"), None).unwrap();
}

/// Test state survives reopening the database
#[test]
fn test_state_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("relationships.db");

    {
        let db = Database::open(&path, 2, 1_000).unwrap();
        let seed: DirectorySeed = serde_json::from_str(SEED).unwrap();
        seed.apply(&db).unwrap();
        let directory = Arc::new(SqliteDirectory::new(db.clone()));
        let services = Services::new(db, directory, RelationshipPolicy::default());
        services
            .connections
            .send("u1", &Actor::person("u1"), &Actor::person("u2"), None)
            .unwrap();
    }

    let db = Database::open(&path, 2, 1_000).unwrap();
    let directory = Arc::new(SqliteDirectory::new(db.clone()));
    let services = Services::new(db, directory, RelationshipPolicy::default());
    assert_eq!(
        services.connections.status_of("u2", "u1").unwrap(),
        ConnectionState::PendingReceived
    );
}
