//! Shared roster of live sessions, the matchmaking queues and the idle pool.
//!
//! Every cross-task mutation funnels through one mutex, so queue-membership
//! transitions are the atomic unit: a session is in exactly one of the idle
//! pool, the ranked queue, the quick queue, or an active match at any time.
//! The promotion-timeout path ([`Registry::leave_queue`]) and the pairing
//! pass ([`Registry::claim_pairs`]) take the same lock, which is what keeps a
//! self-dequeue from racing an in-flight pairing decision.

use crate::battle::Claim;
use crate::error::ServerError;
use crate::matchmaking;
use log::{info, warn};
use shared::robot::Robot;
use shared::PRIORITY_BOOST;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    Ranked,
    Quick,
}

/// The view of a session shared with the matchmaker and battles. The session
/// task keeps exclusive ownership of the socket; everyone else works through
/// this handle.
pub struct SessionHandle {
    pub user_id: String,
    /// Career points, computed once at login.
    pub points: i32,
    /// Tie-break boost accrued while waiting across pairing ticks. Monotone
    /// until the session leaves the queue.
    priority: AtomicI32,
    /// The robot committed for the next match; set when a loadout is read.
    pub robot: Mutex<Option<Robot>>,
    claim_tx: mpsc::Sender<Claim>,
}

impl SessionHandle {
    pub fn new(user_id: String, points: i32, claim_tx: mpsc::Sender<Claim>) -> Arc<Self> {
        Arc::new(SessionHandle {
            user_id,
            points,
            priority: AtomicI32::new(0),
            robot: Mutex::new(None),
            claim_tx,
        })
    }

    pub fn priority(&self) -> i32 {
        self.priority.load(Ordering::Relaxed)
    }

    pub fn boost_priority(&self) {
        self.priority.fetch_add(PRIORITY_BOOST, Ordering::Relaxed);
    }

    pub fn attack_stat(&self) -> i32 {
        self.robot
            .lock()
            .unwrap()
            .as_ref()
            .map(|robot| robot.attack_stat())
            .unwrap_or(0)
    }

    /// Hands this session to a battle. The session task picks the claim up in
    /// its waiting loop.
    pub fn claim(&self, claim: Claim) -> Result<(), ServerError> {
        self.claim_tx.try_send(claim).map_err(|_| {
            ServerError::InvariantViolation("claimed session cannot accept the hand-off")
        })
    }
}

struct Pools {
    roster: HashMap<String, Arc<SessionHandle>>,
    idle: Vec<Arc<SessionHandle>>,
    ranked: Vec<Arc<SessionHandle>>,
    quick: Vec<Arc<SessionHandle>>,
    active_matches: usize,
}

impl Pools {
    fn queue_mut(&mut self, kind: QueueKind) -> &mut Vec<Arc<SessionHandle>> {
        match kind {
            QueueKind::Ranked => &mut self.ranked,
            QueueKind::Quick => &mut self.quick,
        }
    }
}

pub struct Registry {
    max_sessions: usize,
    max_matches: usize,
    promotion_window: Duration,
    pools: Mutex<Pools>,
}

impl Registry {
    pub fn new(max_sessions: usize, max_matches: usize) -> Self {
        Registry {
            max_sessions,
            max_matches,
            promotion_window: Duration::from_secs(shared::PROMOTION_WINDOW_SECS),
            pools: Mutex::new(Pools {
                roster: HashMap::new(),
                idle: Vec::new(),
                ranked: Vec::new(),
                quick: Vec::new(),
                active_matches: 0,
            }),
        }
    }

    /// Overrides how long a session may wait unpaired before being returned
    /// to idle.
    pub fn with_promotion_window(mut self, window: Duration) -> Self {
        self.promotion_window = window;
        self
    }

    pub fn promotion_window(&self) -> Duration {
        self.promotion_window
    }

    /// Adds a freshly authenticated session to the roster. Duplicate-login
    /// and capacity checks happen under the same lock as the insertion.
    pub fn register(&self, handle: &Arc<SessionHandle>) -> Result<(), ServerError> {
        let mut pools = self.pools.lock().unwrap();
        if pools.roster.len() >= self.max_sessions {
            return Err(ServerError::CapacityExceeded);
        }
        if pools.roster.contains_key(&handle.user_id) {
            return Err(ServerError::AuthenticationFailure);
        }
        pools
            .roster
            .insert(handle.user_id.clone(), Arc::clone(handle));
        Ok(())
    }

    /// Moves an admitted session into the idle pool.
    pub fn admit(&self, handle: &Arc<SessionHandle>) {
        let mut pools = self.pools.lock().unwrap();
        pools.idle.push(Arc::clone(handle));
    }

    /// Removes a session from the roster and every pool it might be in.
    pub fn unregister(&self, handle: &Arc<SessionHandle>) {
        let mut pools = self.pools.lock().unwrap();
        pools.roster.remove(&handle.user_id);
        remove_session(&mut pools.idle, handle);
        remove_session(&mut pools.ranked, handle);
        remove_session(&mut pools.quick, handle);
    }

    /// Moves a session from the idle pool into a wait queue.
    pub fn enqueue(&self, kind: QueueKind, handle: &Arc<SessionHandle>) -> Result<(), ServerError> {
        let mut pools = self.pools.lock().unwrap();
        if !remove_session(&mut pools.idle, handle) {
            warn!("session {} enqueued while not idle", handle.user_id);
        }
        if pools.ranked.iter().any(|entry| Arc::ptr_eq(entry, handle))
            || pools.quick.iter().any(|entry| Arc::ptr_eq(entry, handle))
        {
            return Err(ServerError::InvariantViolation(
                "session is already in a wait queue",
            ));
        }
        pools.queue_mut(kind).push(Arc::clone(handle));
        Ok(())
    }

    /// Takes a session back out of its wait queue and returns it to idle.
    /// Returns false if a pairing pass already committed it to a match, in
    /// which case the caller must honor the imminent claim.
    pub fn leave_queue(&self, kind: QueueKind, handle: &Arc<SessionHandle>) -> bool {
        let mut pools = self.pools.lock().unwrap();
        if remove_session(pools.queue_mut(kind), handle) {
            pools.idle.push(Arc::clone(handle));
            true
        } else {
            false
        }
    }

    /// One pairing pass over a queue: sorts the entries captured at this
    /// moment by the ranking metric and drains consecutive pairs, leaving an
    /// odd tail in place. Entries arriving after the lock is taken wait for
    /// the next tick. Leftover entries earn a priority boost against
    /// starvation. Pairing stops at the active-match cap.
    pub fn claim_pairs(&self, kind: QueueKind) -> Vec<(Arc<SessionHandle>, Arc<SessionHandle>)> {
        let mut pools = self.pools.lock().unwrap();
        let open_slots = self.max_matches.saturating_sub(pools.active_matches);
        let queue = pools.queue_mut(kind);
        queue.sort_by(|a, b| matchmaking::compare(kind, a, b));

        let wanted = queue.len() / 2;
        let committed = wanted.min(open_slots);
        if wanted > committed {
            warn!(
                "match slots exhausted: pairing {} of {} possible pairs",
                committed, wanted
            );
        }

        let mut pairs = Vec::with_capacity(committed);
        for _ in 0..committed {
            let first = queue.remove(0);
            let second = queue.remove(0);
            pairs.push((first, second));
        }
        for leftover in queue.iter() {
            leftover.boost_priority();
        }
        pools.active_matches += pairs.len();
        pairs
    }

    /// Releases a finished match: both sessions rejoin the idle pool and the
    /// match slot frees up. Sessions that lost their connection mid-match
    /// unregister themselves right after the battle releases them.
    pub fn finish_match(&self, first: &Arc<SessionHandle>, second: &Arc<SessionHandle>) {
        let mut pools = self.pools.lock().unwrap();
        pools.active_matches = pools.active_matches.saturating_sub(1);
        pools.idle.push(Arc::clone(first));
        pools.idle.push(Arc::clone(second));
        info!(
            "match released: {} and {} back to idle",
            first.user_id, second.user_id
        );
    }

    /// Snapshot of up to ten idle opponents as `userID;points` CSV. The
    /// asking session is swapped in when the pool overflows the window.
    pub fn nearby_opponents(&self, asking: &Arc<SessionHandle>) -> String {
        let pools = self.pools.lock().unwrap();
        let mut window: Vec<&Arc<SessionHandle>> = pools.idle.iter().take(10).collect();
        if window.len() == 10 && !window.iter().any(|entry| Arc::ptr_eq(entry, asking)) {
            window.remove(0);
            window.push(asking);
        }

        let mut line = String::new();
        for entry in window {
            line.push_str(&format!("{};{},", entry.user_id, entry.points));
        }
        line
    }

    /// (sessions, idle, ranked, quick, active matches) for operator logging.
    pub fn counts(&self) -> (usize, usize, usize, usize, usize) {
        let pools = self.pools.lock().unwrap();
        (
            pools.roster.len(),
            pools.idle.len(),
            pools.ranked.len(),
            pools.quick.len(),
            pools.active_matches,
        )
    }
}

fn remove_session(pool: &mut Vec<Arc<SessionHandle>>, handle: &Arc<SessionHandle>) -> bool {
    match pool.iter().position(|entry| Arc::ptr_eq(entry, handle)) {
        Some(index) => {
            pool.remove(index);
            true
        }
        None => false,
    }
}
