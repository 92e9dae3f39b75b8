//! Client-side heartbeat bookkeeping.
//!
//! The session sends a `ping` every period. Each ping schedules a check one
//! grace period later; at that check, if nothing has confirmed liveness for
//! longer than the grace period, the connection is declared dead even though
//! the transport itself never reported an error.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Alive,
    Dead { silent_for: Duration },
}

#[derive(Debug)]
pub struct HeartbeatMonitor {
    grace: Duration,
    last_pong_at: Option<Instant>,
    pending_checks: VecDeque<Instant>,
}

impl HeartbeatMonitor {
    pub fn new(grace: Duration) -> Self {
        Self {
            grace,
            last_pong_at: None,
            pending_checks: VecDeque::new(),
        }
    }

    /// Arm the monitor for a freshly connected transport. The connection
    /// itself counts as the first sign of life.
    pub fn start(&mut self, now: Instant) {
        self.last_pong_at = Some(now);
        self.pending_checks.clear();
    }

    pub fn stop(&mut self) {
        self.last_pong_at = None;
        self.pending_checks.clear();
    }

    pub fn is_running(&self) -> bool {
        self.last_pong_at.is_some()
    }

    pub fn on_ping_sent(&mut self, now: Instant) {
        if self.is_running() {
            self.pending_checks.push_back(now + self.grace);
        }
    }

    pub fn on_pong(&mut self, now: Instant) {
        if self.is_running() {
            self.last_pong_at = Some(now);
        }
    }

    /// When the earliest scheduled check is due.
    pub fn next_check(&self) -> Option<Instant> {
        self.pending_checks.front().copied()
    }

    /// Run every check due at `now`.
    pub fn check(&mut self, now: Instant) -> Liveness {
        let Some(last_pong_at) = self.last_pong_at else {
            return Liveness::Alive;
        };

        let mut ran = false;
        while self.pending_checks.front().is_some_and(|due| *due <= now) {
            self.pending_checks.pop_front();
            ran = true;
        }

        let silent_for = now.saturating_duration_since(last_pong_at);
        if ran && silent_for > self.grace {
            Liveness::Dead { silent_for }
        } else {
            Liveness::Alive
        }
    }
}
