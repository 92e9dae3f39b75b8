//! Connection state and the bounded retry policy that drives reconnects.

use std::time::Duration;

/// Connection state for a chat session
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    Failed { reason: String },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Reconnecting { .. }
        )
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ConnectionState::Failed { .. })
    }
}

/// Delay strategy between reconnect attempts.
#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    Fixed(Duration),
    Exponential {
        initial: Duration,
        max: Duration,
        multiplier: f32,
    },
}

/// Configuration for auto-reconnect behavior
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Maximum consecutive reconnect attempts after a failure. Zero disables
    /// reconnecting altogether; there is no unbounded mode.
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Backoff::Fixed(Duration::from_secs(3)),
        }
    }
}

impl ReconnectPolicy {
    /// Calculate delay before a given attempt number (1-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match &self.backoff {
            Backoff::Fixed(delay) => *delay,
            Backoff::Exponential {
                initial,
                max,
                multiplier,
            } => {
                let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
                let delay = initial.as_secs_f32() * multiplier.powi(exponent);
                Duration::try_from_secs_f32(delay)
                    .unwrap_or(*max)
                    .min(*max)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter { attempt: u32, delay: Duration },
    GiveUp { attempts: u32 },
}

/// Counts consecutive failures and decides whether another attempt is allowed.
#[derive(Debug)]
pub struct ReconnectController {
    policy: ReconnectPolicy,
    attempt: u32,
}

impl ReconnectController {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Attempts made since the last successful connection.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn on_connected(&mut self) {
        self.attempt = 0;
    }

    /// A connect attempt failed or an established connection was lost.
    pub fn on_failure(&mut self) -> RetryDecision {
        if self.attempt >= self.policy.max_attempts {
            return RetryDecision::GiveUp {
                attempts: self.attempt,
            };
        }
        self.attempt += 1;
        RetryDecision::RetryAfter {
            attempt: self.attempt,
            delay: self.policy.delay_for_attempt(self.attempt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_policy_gives_up_after_max_attempts() {
        let mut controller = ReconnectController::new(ReconnectPolicy::default());
        for expected in 1..=5 {
            assert_eq!(
                controller.on_failure(),
                RetryDecision::RetryAfter {
                    attempt: expected,
                    delay: Duration::from_secs(3)
                }
            );
        }
        assert_eq!(controller.on_failure(), RetryDecision::GiveUp { attempts: 5 });
        assert_eq!(controller.on_failure(), RetryDecision::GiveUp { attempts: 5 });
    }

    #[test]
    fn success_resets_the_counter() {
        let mut controller = ReconnectController::new(ReconnectPolicy::default());
        controller.on_failure();
        controller.on_failure();
        controller.on_connected();
        assert_eq!(controller.attempt(), 0);
        assert!(matches!(
            controller.on_failure(),
            RetryDecision::RetryAfter { attempt: 1, .. }
        ));
    }

    #[test]
    fn zero_attempts_never_retries() {
        let mut controller = ReconnectController::new(ReconnectPolicy {
            max_attempts: 0,
            ..ReconnectPolicy::default()
        });
        assert_eq!(controller.on_failure(), RetryDecision::GiveUp { attempts: 0 });
    }

    #[test]
    fn exponential_delay_grows_and_caps() {
        let policy = ReconnectPolicy {
            max_attempts: 10,
            backoff: Backoff::Exponential {
                initial: Duration::from_secs(1),
                max: Duration::from_secs(30),
                multiplier: 2.0,
            },
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(8));
        assert_eq!(policy.delay_for_attempt(9), Duration::from_secs(30));
        assert_eq!(policy.delay_for_attempt(u32::MAX), Duration::from_secs(30));
    }
}
