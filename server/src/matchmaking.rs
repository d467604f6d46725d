//! Matchmaking: the ranking metric and the periodic pairing pass.
//!
//! Both wait queues pair on the same tick. Candidates sort ascending by the
//! pairwise metric and consecutive entries pair off, so neighbors in the
//! ordering meet each other. Ranked waiters weigh robot attack stats heavily;
//! quick waiters order on career points alone. Accrued waiting priority feeds
//! into the metric either way.

use crate::battle;
use crate::profile::ProfileStore;
use crate::registry::{QueueKind, Registry, SessionHandle};
use log::info;
use std::cmp::Ordering;
use std::sync::Arc;

/// How candidate `c` orders against `other`; lower sorts first.
pub fn metric(kind: QueueKind, c: &SessionHandle, other: &SessionHandle) -> i64 {
    let base = match kind {
        QueueKind::Ranked => {
            90 * (c.attack_stat() - other.attack_stat()) as i64
                + 10 * (c.points - other.points) as i64
        }
        QueueKind::Quick => (c.points - other.points) as i64,
    };
    base + c.priority() as i64
}

/// Total order induced by the pairwise metric. Comparing `a.metric(b)`
/// against `b.metric(a)` keeps the comparison antisymmetric, which a raw
/// sign test on one side's metric is not.
pub fn compare(kind: QueueKind, a: &SessionHandle, b: &SessionHandle) -> Ordering {
    metric(kind, a, b).cmp(&metric(kind, b, a))
}

/// One pairing pass over both queues. Pair selection happens inside the
/// registry lock; battles spawn after it releases.
pub fn pairing_tick(registry: &Arc<Registry>, store: &Arc<dyn ProfileStore>) {
    for kind in [QueueKind::Ranked, QueueKind::Quick] {
        let pairs = registry.claim_pairs(kind);
        if pairs.is_empty() {
            continue;
        }
        info!("pairing pass matched {} pair(s) from {:?}", pairs.len(), kind);
        for (first, second) in pairs {
            battle::launch(first, second, Arc::clone(registry), Arc::clone(store));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::robot::Robot;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn contender(user: &str, points: i32, attack: i32) -> Arc<SessionHandle> {
        let (claim_tx, _claim_rx) = mpsc::channel(1);
        let handle = SessionHandle::new(user.to_string(), points, claim_tx);
        *handle.robot.lock().unwrap() = Some(Robot::new(attack, 5));
        handle
    }

    #[test]
    fn test_quick_metric_orders_on_points() {
        let low = contender("low", 10, 50);
        let high = contender("high", 40, 1);

        assert_eq!(metric(QueueKind::Quick, &low, &high), -30);
        assert_eq!(metric(QueueKind::Quick, &high, &low), 30);
        assert_eq!(compare(QueueKind::Quick, &low, &high), Ordering::Less);
    }

    #[test]
    fn test_ranked_metric_weighs_attack_over_points() {
        let bruiser = contender("bruiser", 0, 20);
        let veteran = contender("veteran", 100, 10);

        // 90*(20-10) + 10*(0-100) = -100: the attack gap dominates.
        assert_eq!(metric(QueueKind::Ranked, &bruiser, &veteran), -100);
        assert_eq!(compare(QueueKind::Ranked, &bruiser, &veteran), Ordering::Less);
    }

    #[test]
    fn test_priority_shifts_the_ordering() {
        let first = contender("first", 10, 10);
        let second = contender("second", 10, 10);
        assert_eq!(compare(QueueKind::Quick, &first, &second), Ordering::Equal);

        second.boost_priority();
        assert_eq!(
            metric(QueueKind::Quick, &second, &first),
            shared::PRIORITY_BOOST as i64
        );
        assert_eq!(compare(QueueKind::Quick, &first, &second), Ordering::Less);
    }

    #[test]
    fn test_compare_is_antisymmetric() {
        let a = contender("a", 25, 12);
        let b = contender("b", 5, 18);
        b.boost_priority();

        for kind in [QueueKind::Ranked, QueueKind::Quick] {
            assert_eq!(compare(kind, &a, &b), compare(kind, &b, &a).reverse());
        }
    }
}
