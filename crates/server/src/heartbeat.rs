//! Per-session liveness tracking on the server side.
//!
//! Clients ping on a fixed period. A socket that is still open at the TCP
//! level but has sent nothing for longer than the grace period is treated
//! as dead and closed by its own session task.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct Liveness {
    last_seen: Instant,
    grace: Duration,
}

impl Liveness {
    pub fn new(now: Instant, grace: Duration) -> Self {
        Self {
            last_seen: now,
            grace,
        }
    }

    /// Record inbound traffic from the peer.
    pub fn touch(&mut self, now: Instant) {
        self.last_seen = now;
    }

    pub fn silence(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_seen)
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.silence(now) > self.grace
    }
}
