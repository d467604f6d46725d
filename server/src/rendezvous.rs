//! Two-party completion barrier between a battle and its sessions.
//!
//! The battle task issues a request to both sessions, then parks in
//! [`Rendezvous::wait_both`] until each session has signalled completion
//! exactly once. Reaching two signals releases the battle and resets the
//! counter for the next request; a third signal before the reset is a
//! protocol violation and is rejected rather than releasing early.

use crate::error::ServerError;
use std::sync::Mutex;
use tokio::sync::Notify;

#[derive(Debug, Default)]
pub struct Rendezvous {
    count: Mutex<u8>,
    ready: Notify,
}

impl Rendezvous {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one completion signal.
    pub fn signal(&self) -> Result<(), ServerError> {
        let mut count = self.count.lock().unwrap();
        if *count >= 2 {
            return Err(ServerError::InvariantViolation(
                "rendezvous signalled a third time before reset",
            ));
        }
        *count += 1;
        if *count == 2 {
            self.ready.notify_one();
        }
        Ok(())
    }

    /// Parks the calling task until both signals have arrived, then resets
    /// the counter for the next request.
    pub async fn wait_both(&self) {
        loop {
            let notified = self.ready.notified();
            {
                let mut count = self.count.lock().unwrap();
                if *count >= 2 {
                    *count = 0;
                    return;
                }
            }
            notified.await;
        }
    }
}
