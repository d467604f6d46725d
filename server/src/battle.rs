//! Battle coordination: one task mediating a single match.
//!
//! The battle task never touches a socket. It issues [`TurnRequest`]s to both
//! sessions' state machines, parks on the [`Rendezvous`] barrier until both
//! have serviced the request, and only then reads their post-request state.
//! Within one turn both action reads complete before combat resolves, and
//! both status writes complete before the next turn's reads begin.

use crate::error::ServerError;
use crate::profile::{career_points, ProfileStore};
use crate::registry::{Registry, SessionHandle};
use crate::rendezvous::Rendezvous;
use log::{debug, error, info, warn};
use shared::robot::{resolve_round, Die, RandomDie};
use shared::{Action, Outcome, StatusLine, DRAW_SCRAP, LOSS_SCRAP, MAX_TURNS, WIN_SCRAP};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// Request a battle issues to a session's state machine. Each serviced
/// request signals the match rendezvous exactly once.
#[derive(Debug)]
pub enum TurnRequest {
    /// Drain one acknowledgement line from the client.
    Read,
    /// Write a prepared line to the client.
    Write(String),
    /// Read the client's action for this round and store it on the robot.
    Update,
}

/// Hand-off delivered to a queued session when a pairing commits it.
pub struct Claim {
    pub requests: mpsc::Receiver<TurnRequest>,
    pub rendezvous: Arc<Rendezvous>,
}

/// Upper bound on one barrier wait. Sessions convert their own read timeouts
/// into forfeits well before this, so tripping it means a session task died.
const BARRIER_WINDOW: Duration = Duration::from_secs(120);

static NEXT_MATCH_ID: AtomicU64 = AtomicU64::new(1);

struct Fighter {
    handle: Arc<SessionHandle>,
    requests: mpsc::Sender<TurnRequest>,
    outcome: Outcome,
}

impl Fighter {
    fn health(&self) -> i32 {
        self.handle
            .robot
            .lock()
            .unwrap()
            .as_ref()
            .map(|robot| robot.health())
            .unwrap_or(0)
    }

    fn is_alive(&self) -> bool {
        self.handle
            .robot
            .lock()
            .unwrap()
            .as_ref()
            .map(|robot| robot.is_alive())
            .unwrap_or(false)
    }

    fn last_action(&self) -> Action {
        self.handle
            .robot
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|robot| robot.action())
            .unwrap_or(Action::Forfeit)
    }
}

pub struct Battle {
    id: u64,
    turn: u32,
    stopped: bool,
    first: Fighter,
    second: Fighter,
    rendezvous: Arc<Rendezvous>,
    registry: Arc<Registry>,
    store: Arc<dyn ProfileStore>,
    die: Box<dyn Die>,
}

/// Spawns the battle task for a committed pair.
pub fn launch(
    first: Arc<SessionHandle>,
    second: Arc<SessionHandle>,
    registry: Arc<Registry>,
    store: Arc<dyn ProfileStore>,
) -> JoinHandle<()> {
    let battle = Battle::new(first, second, registry, store, Box::new(RandomDie::new()));
    tokio::spawn(battle.run())
}

impl Battle {
    /// Builds the battle and hands both sessions their claims. The die is
    /// injectable so tests can run deterministic matches.
    pub fn new(
        first: Arc<SessionHandle>,
        second: Arc<SessionHandle>,
        registry: Arc<Registry>,
        store: Arc<dyn ProfileStore>,
        die: Box<dyn Die>,
    ) -> Battle {
        let id = NEXT_MATCH_ID.fetch_add(1, Ordering::Relaxed);
        let rendezvous = Arc::new(Rendezvous::new());
        let (first_tx, first_rx) = mpsc::channel(4);
        let (second_tx, second_rx) = mpsc::channel(4);

        for (handle, requests) in [(&first, first_rx), (&second, second_rx)] {
            let claim = Claim {
                requests,
                rendezvous: Arc::clone(&rendezvous),
            };
            if let Err(e) = handle.claim(claim) {
                error!("battle {}: {} ({})", id, e, handle.user_id);
            }
        }

        Battle {
            id,
            turn: 1,
            stopped: false,
            first: Fighter {
                handle: first,
                requests: first_tx,
                outcome: Outcome::None,
            },
            second: Fighter {
                handle: second,
                requests: second_tx,
                outcome: Outcome::None,
            },
            rendezvous,
            registry,
            store,
            die,
        }
    }

    pub async fn run(mut self) {
        info!(
            "battle {}: {} vs {}",
            self.id, self.first.handle.user_id, self.second.handle.user_id
        );

        if let Err(e) = self.open().await {
            warn!("battle {}: failed to start ({})", self.id, e);
            self.stopped = true;
        }

        while self.playing() && !self.stopped {
            if let Err(e) = self.play_turn().await {
                warn!("battle {}: aborting ({})", self.id, e);
                self.stopped = true;
            }
        }

        self.finish().await;
    }

    /// Announces the opponents to both sides, waits for their acknowledgement
    /// and publishes the opening status.
    async fn open(&mut self) -> Result<(), ServerError> {
        let intro_first = self.intro_for(&self.first, &self.second)?;
        let intro_second = self.intro_for(&self.second, &self.first)?;
        self.request_both(
            TurnRequest::Write(intro_first),
            TurnRequest::Write(intro_second),
        )
        .await?;

        self.request_both(TurnRequest::Read, TurnRequest::Read)
            .await?;

        self.publish_status().await
    }

    async fn play_turn(&mut self) -> Result<(), ServerError> {
        debug!("battle {}: round {}", self.id, self.turn);

        self.request_both(TurnRequest::Update, TurnRequest::Update)
            .await?;

        if self.check_forfeit() {
            return self.publish_status().await;
        }

        self.resolve_combat()?;
        self.turn += 1;

        if self.turn > MAX_TURNS {
            self.turn_cap_outcome();
            self.stopped = true;
        } else {
            self.round_outcome();
        }
        self.publish_status().await
    }

    /// Applies one round of combat to both robots.
    fn resolve_combat(&mut self) -> Result<(), ServerError> {
        let mut first_slot = self.first.handle.robot.lock().unwrap();
        let mut second_slot = self.second.handle.robot.lock().unwrap();
        match (first_slot.as_mut(), second_slot.as_mut()) {
            (Some(first), Some(second)) => {
                resolve_round(first, second, self.die.as_mut());
                Ok(())
            }
            _ => Err(ServerError::InvariantViolation(
                "battling session without a robot",
            )),
        }
    }

    /// Forfeit precedence: checked before combat every turn. A lone forfeiter
    /// loses outright; a double forfeit costs both sides the match.
    fn check_forfeit(&mut self) -> bool {
        let first = self.first.last_action() == Action::Forfeit;
        let second = self.second.last_action() == Action::Forfeit;
        match (first, second) {
            (true, true) => {
                self.first.outcome = Outcome::Lose;
                self.second.outcome = Outcome::Lose;
            }
            (true, false) => {
                self.first.outcome = Outcome::Lose;
                self.second.outcome = Outcome::Win;
            }
            (false, true) => {
                self.first.outcome = Outcome::Win;
                self.second.outcome = Outcome::Lose;
            }
            (false, false) => return false,
        }
        self.stopped = true;
        true
    }

    /// A side wins only when it is ahead on health AND the opponent is down;
    /// a draw needs both sides equal and down. Otherwise the match goes on.
    fn round_outcome(&mut self) {
        let first = self.first.health();
        let second = self.second.health();
        if first > second && second <= 0 {
            self.first.outcome = Outcome::Win;
            self.second.outcome = Outcome::Lose;
        }
        if first < second && first <= 0 {
            self.first.outcome = Outcome::Lose;
            self.second.outcome = Outcome::Win;
        }
        if first == second && first <= 0 {
            self.first.outcome = Outcome::Draw;
            self.second.outcome = Outcome::Draw;
        }
    }

    /// Past the turn cap the match resolves on raw health comparison, with
    /// no requirement that anyone is actually down.
    fn turn_cap_outcome(&mut self) {
        let first = self.first.health();
        let second = self.second.health();
        if first > second {
            self.first.outcome = Outcome::Win;
            self.second.outcome = Outcome::Lose;
        }
        if first < second {
            self.first.outcome = Outcome::Lose;
            self.second.outcome = Outcome::Win;
        }
        if first == second {
            self.first.outcome = Outcome::Draw;
            self.second.outcome = Outcome::Draw;
        }
    }

    async fn publish_status(&self) -> Result<(), ServerError> {
        let status_first = self.status_for(&self.first, &self.second)?;
        let status_second = self.status_for(&self.second, &self.first)?;
        self.request_both(
            TurnRequest::Write(status_first.to_wire()),
            TurnRequest::Write(status_second.to_wire()),
        )
        .await
    }

    fn status_for(&self, own: &Fighter, opponent: &Fighter) -> Result<StatusLine, ServerError> {
        let slot = own.handle.robot.lock().unwrap();
        let robot = slot.as_ref().ok_or(ServerError::InvariantViolation(
            "battling session without a robot",
        ))?;
        Ok(StatusLine {
            own_health: robot.health(),
            opponent_health: opponent.health(),
            outcome: own.outcome,
            charge_cooldown: robot.charge_cooldown(),
            heal_cooldown: robot.heal_cooldown(),
            turn: self.turn,
            opponent_action: opponent
                .handle
                .robot
                .lock()
                .unwrap()
                .as_ref()
                .and_then(|other| other.action()),
        })
    }

    fn intro_for(&self, own: &Fighter, opponent: &Fighter) -> Result<String, ServerError> {
        let own_slot = own.handle.robot.lock().unwrap();
        let opponent_slot = opponent.handle.robot.lock().unwrap();
        match (own_slot.as_ref(), opponent_slot.as_ref()) {
            (Some(own_robot), Some(opponent_robot)) => Ok(format!(
                "{},{},{},{},{},{},",
                self.id,
                opponent.handle.user_id,
                own_robot.attack_stat(),
                own_robot.defend_stat(),
                opponent_robot.attack_stat(),
                opponent_robot.defend_stat()
            )),
            _ => Err(ServerError::InvariantViolation(
                "battling session without a robot",
            )),
        }
    }

    /// Sends one request to each session, then blocks this task until both
    /// have signalled completion.
    async fn request_both(
        &self,
        to_first: TurnRequest,
        to_second: TurnRequest,
    ) -> Result<(), ServerError> {
        self.first
            .requests
            .send(to_first)
            .await
            .map_err(|_| ServerError::ConnectionClosed)?;
        self.second
            .requests
            .send(to_second)
            .await
            .map_err(|_| ServerError::ConnectionClosed)?;
        timeout(BARRIER_WINDOW, self.rendezvous.wait_both())
            .await
            .map_err(|_| ServerError::ProtocolTimeout)
    }

    fn playing(&self) -> bool {
        self.first.is_alive() && self.second.is_alive()
    }

    /// Releases both sessions, records the results and pushes each side its
    /// updated career stats. Dropping the request senders afterwards is the
    /// end-of-match signal the session state machines observe.
    async fn finish(&mut self) {
        self.registry
            .finish_match(&self.first.handle, &self.second.handle);
        self.record_results();
        self.report_stats().await;
        info!(
            "battle {} over: {} {}, {} {}",
            self.id,
            self.first.handle.user_id,
            self.first.outcome,
            self.second.handle.user_id,
            self.second.outcome
        );
    }

    /// Store failures are surfaced to the operator but never change what the
    /// clients were already told.
    fn record_results(&self) {
        for fighter in [&self.first, &self.second] {
            let user = fighter.handle.user_id.as_str();
            let recorded = match fighter.outcome {
                Outcome::Win => self
                    .store
                    .increment_win(user)
                    .and_then(|_| self.store.award_scrap(user, WIN_SCRAP)),
                Outcome::Draw => self
                    .store
                    .increment_draw(user)
                    .and_then(|_| self.store.award_scrap(user, DRAW_SCRAP)),
                Outcome::Lose | Outcome::Forfeit => self
                    .store
                    .increment_loss(user)
                    .and_then(|_| self.store.award_scrap(user, LOSS_SCRAP)),
                Outcome::None => Ok(()),
            };
            if let Err(e) = recorded {
                error!("battle {}: failed to record result for {}: {}", self.id, user, e);
            }
        }
    }

    async fn report_stats(&self) {
        for fighter in [&self.first, &self.second] {
            let user = fighter.handle.user_id.as_str();
            match self.store.profile(user) {
                Ok(profile) => {
                    let line = format!(
                        "{},{},{},{},{},",
                        profile.wins,
                        profile.losses,
                        profile.draws,
                        career_points(&profile),
                        profile.scrap
                    );
                    if fighter.requests.send(TurnRequest::Write(line)).await.is_err() {
                        warn!("battle {}: {} left before the stats report", self.id, user);
                    }
                }
                Err(e) => error!("battle {}: no stats for {}: {}", self.id, user, e),
            }
        }
    }
}
