//! Matchmaking scenario tests against the registry and pairing pass.

use server::matchmaking;
use server::profile::{MemoryStore, Profile, ProfileStore};
use server::registry::{QueueKind, Registry, SessionHandle};
use shared::robot::Robot;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

fn contender(
    user: &str,
    points: i32,
    attack: i32,
) -> (Arc<SessionHandle>, mpsc::Receiver<server::battle::Claim>) {
    let (claim_tx, claim_rx) = mpsc::channel(1);
    let handle = SessionHandle::new(user.to_string(), points, claim_tx);
    *handle.robot.lock().unwrap() = Some(Robot::new(attack, 5));
    (handle, claim_rx)
}

fn enqueue(registry: &Registry, kind: QueueKind, handle: &Arc<SessionHandle>) {
    registry.register(handle).unwrap();
    registry.admit(handle);
    registry.enqueue(kind, handle).unwrap();
}

#[test]
fn quick_pairs_are_neighbors_by_points() {
    let registry = Registry::new(100, 50);
    let mut receivers = Vec::new();
    for (user, points) in [("d", 40), ("a", 5), ("c", 20), ("b", 10)] {
        let (handle, claim_rx) = contender(user, points, 10);
        enqueue(&registry, QueueKind::Quick, &handle);
        receivers.push(claim_rx);
    }

    let pairs = registry.claim_pairs(QueueKind::Quick);
    let named: Vec<(String, String)> = pairs
        .iter()
        .map(|(first, second)| (first.user_id.clone(), second.user_id.clone()))
        .collect();

    // Ascending by points: a(5) meets b(10), c(20) meets d(40).
    assert_eq!(named, [("a".into(), "b".into()), ("c".into(), "d".into())]);
}

#[test]
fn ranked_pairs_are_neighbors_by_attack() {
    let registry = Registry::new(100, 50);
    let mut receivers = Vec::new();
    for (user, attack) in [("heavy", 20), ("light", 10), ("mid", 12), ("big", 18)] {
        let (handle, claim_rx) = contender(user, 0, attack);
        enqueue(&registry, QueueKind::Ranked, &handle);
        receivers.push(claim_rx);
    }

    let pairs = registry.claim_pairs(QueueKind::Ranked);
    let named: Vec<(String, String)> = pairs
        .iter()
        .map(|(first, second)| (first.user_id.clone(), second.user_id.clone()))
        .collect();

    assert_eq!(
        named,
        [("light".into(), "mid".into()), ("big".into(), "heavy".into())]
    );
}

#[test]
fn leftover_entry_accrues_priority_across_ticks() {
    let registry = Registry::new(100, 50);
    let mut sessions = Vec::new();
    let mut receivers = Vec::new();
    for user in ["a", "b", "c"] {
        let (handle, claim_rx) = contender(user, 0, 10);
        enqueue(&registry, QueueKind::Quick, &handle);
        sessions.push(handle);
        receivers.push(claim_rx);
    }

    assert_eq!(registry.claim_pairs(QueueKind::Quick).len(), 1);
    let (_, _, _, quick, _) = registry.counts();
    assert_eq!(quick, 1);

    // A pass with no pair still boosts the unpaired tail, monotonically.
    assert_eq!(registry.claim_pairs(QueueKind::Quick).len(), 0);

    let boosted: Vec<i32> = sessions
        .iter()
        .map(|session| session.priority())
        .filter(|priority| *priority > 0)
        .collect();
    assert_eq!(boosted, [2 * shared::PRIORITY_BOOST]);
}

#[tokio::test]
async fn pairing_tick_delivers_claims_to_both_sessions() {
    let registry = Arc::new(Registry::new(100, 50));
    let store: Arc<dyn ProfileStore> = Arc::new(MemoryStore::new(
        vec![
            Profile {
                user: "alice".into(),
                password: "pw".into(),
                wins: 0,
                losses: 0,
                draws: 0,
                scrap: 0,
                parts: vec![],
            },
            Profile {
                user: "bob".into(),
                password: "pw".into(),
                wins: 0,
                losses: 0,
                draws: 0,
                scrap: 0,
                parts: vec![],
            },
        ],
        vec![],
    ));

    let (alice, mut alice_rx) = contender("alice", 0, 12);
    let (bob, mut bob_rx) = contender("bob", 0, 10);
    enqueue(&registry, QueueKind::Quick, &alice);
    enqueue(&registry, QueueKind::Quick, &bob);

    matchmaking::pairing_tick(&registry, &store);

    // Both sessions received their hand-off and the match slot is taken.
    timeout(Duration::from_secs(1), alice_rx.recv())
        .await
        .expect("no claim for alice")
        .expect("claim channel closed");
    timeout(Duration::from_secs(1), bob_rx.recv())
        .await
        .expect("no claim for bob")
        .expect("claim channel closed");

    let (_, _, _, quick, active) = registry.counts();
    assert_eq!((quick, active), (0, 1));

    // Too late for either session to back out of the queue.
    assert!(!registry.leave_queue(QueueKind::Quick, &alice));
    assert!(!registry.leave_queue(QueueKind::Quick, &bob));
}
