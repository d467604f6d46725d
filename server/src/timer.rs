//! Monotonic elapsed-time gate for promotion windows and poll intervals.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct Timer {
    started: Instant,
    window: Duration,
}

impl Timer {
    pub fn new(window: Duration) -> Self {
        Timer {
            started: Instant::now(),
            window,
        }
    }

    pub fn restart(&mut self) {
        self.started = Instant::now();
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn expired(&self) -> bool {
        self.elapsed() > self.window
    }

    pub fn remaining(&self) -> Duration {
        self.window.saturating_sub(self.elapsed())
    }
}
