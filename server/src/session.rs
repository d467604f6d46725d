//! Per-connection session: the login handshake and the lifecycle state
//! machine.
//!
//! Each accepted connection gets exactly one session task. The task owns the
//! socket for its whole life and walks the state machine
//! `Idle -> Waiting -> Battling -> Idle` driven by client request lines and
//! matchmaker claims. While battling, the task only services the requests its
//! battle issues, signalling the match rendezvous after each one.
//!
//! Failure policy: an unexpected read or write failure ends the session no
//! matter the state. Mid-battle the teardown is deferred — the session keeps
//! servicing coordinator requests (reads resolve to forfeit, writes are
//! skipped) so the rendezvous never wedges, and destroys itself once the
//! battle releases it.

use crate::battle::{Claim, TurnRequest};
use crate::comms::Comms;
use crate::error::ServerError;
use crate::profile::{career_points, ProfileStore};
use crate::registry::{QueueKind, Registry, SessionHandle};
use crate::timer::Timer;
use log::{debug, info, warn};
use shared::robot::Robot;
use shared::{Action, IDLE_READ_WINDOW_SECS, NULL_TURN_NOTICE};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

const IDLE_READ_WINDOW: Duration = Duration::from_secs(IDLE_READ_WINDOW_SECS);
const LOADOUT_READ_WINDOW: Duration = Duration::from_secs(60);

/// Lifecycle states of a connected session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Shopping,
    WaitingRanked,
    WaitingQuick,
    Battling,
}

/// Why a session left its run loop.
enum Shutdown {
    SignOut,
    Failed(ServerError),
}

impl From<ServerError> for Shutdown {
    fn from(error: ServerError) -> Self {
        Shutdown::Failed(error)
    }
}

impl fmt::Display for Shutdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shutdown::SignOut => f.write_str("signed out"),
            Shutdown::Failed(error) => write!(f, "{}", error),
        }
    }
}

pub struct Session {
    handle: Arc<SessionHandle>,
    comms: Comms<TcpStream>,
    claim_rx: mpsc::Receiver<Claim>,
    registry: Arc<Registry>,
    store: Arc<dyn ProfileStore>,
    state: State,
    pending_claim: Option<Claim>,
}

impl Session {
    /// Performs the login handshake on a fresh connection. A successful login
    /// registers the session and answers `logged in,<owned parts>`; any
    /// failure answers `fail,` and the connection drops without a session.
    pub async fn login(
        stream: TcpStream,
        registry: Arc<Registry>,
        store: Arc<dyn ProfileStore>,
    ) -> Result<Session, ServerError> {
        let mut comms = Comms::new(stream);
        match Self::handshake(&mut comms, &registry, &store).await {
            Ok((handle, claim_rx, owned_parts)) => {
                if let Err(e) = comms.write(&format!("logged in,{}", owned_parts)).await {
                    registry.unregister(&handle);
                    return Err(e);
                }
                info!("client accepted: {}", handle.user_id);
                Ok(Session {
                    handle,
                    comms,
                    claim_rx,
                    registry,
                    store,
                    state: State::Idle,
                    pending_claim: None,
                })
            }
            Err(e) => {
                let _ = comms.write("fail,").await;
                Err(e)
            }
        }
    }

    async fn handshake(
        comms: &mut Comms<TcpStream>,
        registry: &Registry,
        store: &Arc<dyn ProfileStore>,
    ) -> Result<(Arc<SessionHandle>, mpsc::Receiver<Claim>, String), ServerError> {
        let fields = comms.read().await?;
        if fields.len() < 2 || fields[0].is_empty() {
            return Err(ServerError::MalformedRequest);
        }

        let profile = store.authenticate(&fields[0], &fields[1])?;
        let (claim_tx, claim_rx) = mpsc::channel(1);
        let handle = SessionHandle::new(profile.user.clone(), career_points(&profile), claim_tx);
        registry.register(&handle)?;
        Ok((handle, claim_rx, profile.parts.join(",")))
    }

    pub fn handle(&self) -> &Arc<SessionHandle> {
        &self.handle
    }

    /// Drives the state machine until the session ends, then tears it down.
    pub async fn run(mut self) {
        let shutdown = loop {
            let step = match self.state {
                State::Idle => self.idle().await,
                State::Shopping => self.shop(),
                State::WaitingRanked => self.waiting(QueueKind::Ranked).await,
                State::WaitingQuick => self.waiting(QueueKind::Quick).await,
                State::Battling => self.battling().await,
            };
            if let Err(reason) = step {
                break reason;
            }
        };

        self.registry.unregister(&self.handle);
        info!("session {} ended: {}", self.handle.user_id, shutdown);
    }

    /// Waits for the client's next request. Idle reads get a long window;
    /// exhausting it ends the session like any other failure here.
    async fn idle(&mut self) -> Result<(), Shutdown> {
        let fields = self.comms.read_within(IDLE_READ_WINDOW).await?;
        match fields[0].as_str() {
            "list" => {
                let nearby = self.registry.nearby_opponents(&self.handle);
                self.comms.write(&nearby).await?;
            }
            "match" => self.join_queue(QueueKind::Ranked).await?,
            "quick" => self.join_queue(QueueKind::Quick).await?,
            "store" => self.state = State::Shopping,
            "signout" => return Err(Shutdown::SignOut),
            other => debug!(
                "session {}: ignoring unknown request {:?}",
                self.handle.user_id, other
            ),
        }
        Ok(())
    }

    /// The store is an unimplemented passthrough.
    fn shop(&mut self) -> Result<(), Shutdown> {
        self.state = State::Idle;
        Ok(())
    }

    /// Reads the loadout line, builds the robot and moves into a wait queue.
    /// A signout or an invalid loadout ends the session BEFORE it is
    /// enqueued, so the queue can never hold a dead entry.
    async fn join_queue(&mut self, kind: QueueKind) -> Result<(), Shutdown> {
        let fields = self.comms.read_within(LOADOUT_READ_WINDOW).await?;
        let slots = self.store.part_slots();
        if fields.len() < 2 || fields[1] == "signout" {
            return Err(Shutdown::SignOut);
        }
        if fields.len() < slots + 1 {
            return Err(ServerError::MalformedRequest.into());
        }

        // Fields beyond the declared part slots are ignored.
        let loadout = fields[1..=slots].to_vec();
        let (attack, defend) = self.store.get_attack_defend(&loadout)?;
        *self.handle.robot.lock().unwrap() = Some(Robot::new(attack, defend));

        self.registry.enqueue(kind, &self.handle)?;
        self.state = match kind {
            QueueKind::Ranked => State::WaitingRanked,
            QueueKind::Quick => State::WaitingQuick,
        };
        debug!(
            "session {}: queued for {:?} with robot {}/{}",
            self.handle.user_id, kind, attack, defend
        );
        Ok(())
    }

    /// Blocks until a battle claims this session or the promotion window
    /// runs out. On expiry the session atomically removes itself from the
    /// queue; if that fails a pairing pass already committed it, and the
    /// claim is honored when it lands.
    async fn waiting(&mut self, kind: QueueKind) -> Result<(), Shutdown> {
        let window = Timer::new(self.registry.promotion_window());
        let mut expired = false;
        loop {
            tokio::select! {
                claim = self.claim_rx.recv() => match claim {
                    Some(claim) => {
                        self.pending_claim = Some(claim);
                        self.state = State::Battling;
                        return Ok(());
                    }
                    None => {
                        return Err(ServerError::InvariantViolation(
                            "claim channel closed while queued",
                        )
                        .into())
                    }
                },
                _ = tokio::time::sleep(window.remaining()), if !expired => {
                    expired = true;
                    if self.registry.leave_queue(kind, &self.handle) {
                        debug!("session {}: wait expired, back to idle", self.handle.user_id);
                        self.state = State::Idle;
                        self.comms.write(NULL_TURN_NOTICE).await?;
                        return Ok(());
                    }
                    // A pairing pass owns this session; the claim is imminent.
                }
            }
        }
    }

    /// Services the owning battle's requests until it drops the channel,
    /// which releases this session back to idle.
    async fn battling(&mut self) -> Result<(), Shutdown> {
        let Some(claim) = self.pending_claim.take() else {
            return Err(ServerError::InvariantViolation("battling without a claim").into());
        };
        let Claim {
            mut requests,
            rendezvous,
        } = claim;

        let mut connection_lost = false;
        while let Some(request) = requests.recv().await {
            match request {
                TurnRequest::Read => {
                    if !connection_lost && self.comms.read().await.is_err() {
                        connection_lost = true;
                    }
                }
                TurnRequest::Write(line) => {
                    if !connection_lost && self.comms.write(&line).await.is_err() {
                        connection_lost = true;
                    }
                }
                TurnRequest::Update => self.update_action(&mut connection_lost).await,
            }
            if let Err(e) = rendezvous.signal() {
                warn!("session {}: {}", self.handle.user_id, e);
            }
        }

        if connection_lost {
            Err(ServerError::ConnectionClosed.into())
        } else {
            self.state = State::Idle;
            Ok(())
        }
    }

    /// Reads the client's action for this round. A timed-out or failed read
    /// counts as an implicit forfeit so a stalled client cannot hang the
    /// match; hard connection failures additionally mark the session for
    /// teardown once the battle releases it.
    async fn update_action(&mut self, connection_lost: &mut bool) {
        let action = if *connection_lost {
            Action::Forfeit
        } else {
            match self.comms.read().await {
                Ok(fields) if fields.len() >= 2 => Action::from_wire(&fields[1]),
                Ok(_) => Action::Forfeit,
                Err(ServerError::ProtocolTimeout) => Action::Forfeit,
                Err(_) => {
                    *connection_lost = true;
                    Action::Forfeit
                }
            }
        };

        if let Some(robot) = self.handle.robot.lock().unwrap().as_mut() {
            robot.set_action(action);
        }
    }
}
