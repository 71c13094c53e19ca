//! Rate-limit cooldown gate.
//!
//! When an upstream answers HTTP 429 the scheduled poll loop goes quiet for
//! a fixed window instead of hammering the API. Manual refreshes are allowed
//! through regardless; the gate only arms the scheduler.

use log::warn;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// Scheduler gate armed by rate-limit responses.
#[derive(Default)]
pub struct Cooldown {
    until: Mutex<Option<Instant>>,
}

impl Cooldown {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_until(&self) -> MutexGuard<'_, Option<Instant>> {
        match self.until.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Cooldown mutex poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Arm the gate for `duration` from now. Returns `true` when the gate
    /// was not already active, so the caller can notify exactly once per
    /// cooldown window even when a sweep produces several 429s.
    pub fn engage(&self, duration: Duration) -> bool {
        let mut until = self.lock_until();
        let was_active = until.is_some_and(|u| Instant::now() < u);
        *until = Some(Instant::now() + duration);
        !was_active
    }

    /// Whether the gate is currently armed.
    pub fn active(&self) -> bool {
        self.lock_until().is_some_and(|u| Instant::now() < u)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_engage_arms_the_gate() {
        let cooldown = Cooldown::new();
        assert!(!cooldown.active());

        assert!(cooldown.engage(Duration::from_secs(60)));
        assert!(cooldown.active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_expires() {
        let cooldown = Cooldown::new();
        cooldown.engage(Duration::from_secs(60));

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(cooldown.active());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!cooldown.active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_engage_is_not_new() {
        let cooldown = Cooldown::new();
        assert!(cooldown.engage(Duration::from_secs(60)));
        assert!(!cooldown.engage(Duration::from_secs(60)));

        // A fresh window after expiry counts as new again.
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(cooldown.engage(Duration::from_secs(60)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_re_engage_extends_the_window() {
        let cooldown = Cooldown::new();
        cooldown.engage(Duration::from_secs(60));

        tokio::time::advance(Duration::from_secs(45)).await;
        cooldown.engage(Duration::from_secs(60));

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(cooldown.active());
    }
}
