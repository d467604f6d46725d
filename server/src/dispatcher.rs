//! Admission loop: drains freshly authenticated sessions into the idle pool
//! and ticks the matchmaking queues on a fixed period.

use crate::matchmaking;
use crate::profile::ProfileStore;
use crate::registry::Registry;
use crate::session::Session;
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

/// Most sessions admitted from the queue in one burst.
const ADMISSION_BURST: usize = 10;

pub struct Dispatcher {
    admissions: mpsc::Receiver<Session>,
    registry: Arc<Registry>,
    store: Arc<dyn ProfileStore>,
    pairing_period: Duration,
}

impl Dispatcher {
    pub fn new(
        admissions: mpsc::Receiver<Session>,
        registry: Arc<Registry>,
        store: Arc<dyn ProfileStore>,
        pairing_period: Duration,
    ) -> Self {
        Dispatcher {
            admissions,
            registry,
            store,
            pairing_period,
        }
    }

    pub async fn run(mut self) {
        let mut pairing = interval(self.pairing_period);
        pairing.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // Skip the first tick since it fires immediately
        pairing.tick().await;

        info!("dispatcher running");

        loop {
            tokio::select! {
                admitted = self.admissions.recv() => {
                    match admitted {
                        Some(session) => {
                            self.admit(session);
                            let mut admitted_now = 1;
                            while admitted_now < ADMISSION_BURST {
                                match self.admissions.try_recv() {
                                    Ok(session) => {
                                        self.admit(session);
                                        admitted_now += 1;
                                    }
                                    Err(_) => break,
                                }
                            }
                        }
                        None => {
                            info!("admission channel closed, dispatcher stopping");
                            break;
                        }
                    }
                },

                _ = pairing.tick() => {
                    matchmaking::pairing_tick(&self.registry, &self.store);

                    let (sessions, idle, ranked, quick, battles) = self.registry.counts();
                    debug!(
                        "pairing tick: {} sessions ({} idle, {} ranked, {} quick), {} battles",
                        sessions, idle, ranked, quick, battles
                    );
                },
            }
        }
    }

    fn admit(&self, session: Session) {
        self.registry.admit(session.handle());
        debug!("admitted session {}", session.handle().user_id);
        tokio::spawn(session.run());
    }
}
