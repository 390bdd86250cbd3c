//! Fixed-window cooldown per beneficiary.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

use crate::encoding::pubkey_map;
use crate::errors::{CoordinatorError, Result};
use crate::state::CooldownState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimiter {
    window_secs: i64,
    #[serde(with = "pubkey_map")]
    last: HashMap<Pubkey, CooldownState>,
}

impl RateLimiter {
    pub fn new(window_secs: i64) -> Self {
        Self {
            window_secs,
            last: HashMap::new(),
        }
    }

    pub fn window_secs(&self) -> i64 {
        self.window_secs
    }

    pub(crate) fn set_window(&mut self, window_secs: i64) {
        self.window_secs = window_secs;
    }

    /// Seconds until `beneficiary` may submit again; zero when allowed.
    pub fn remaining(&self, beneficiary: &Pubkey, now: i64) -> i64 {
        let Some(state) = self.last.get(beneficiary) else {
            return 0;
        };
        let elapsed = now.saturating_sub(state.last_request_at).max(0);
        if elapsed < self.window_secs {
            self.window_secs - elapsed
        } else {
            0
        }
    }

    /// Fails with `CooldownActive` without touching state.
    pub fn check(&self, beneficiary: &Pubkey, now: i64) -> Result<()> {
        match self.remaining(beneficiary, now) {
            0 => Ok(()),
            remaining_secs => Err(CoordinatorError::CooldownActive { remaining_secs }),
        }
    }

    /// Stamp a successful submission. Never moves the timestamp backwards.
    pub(crate) fn record(&mut self, beneficiary: Pubkey, now: i64) {
        let state = self.last.entry(beneficiary).or_insert(CooldownState {
            last_request_at: now,
        });
        state.last_request_at = state.last_request_at.max(now);
    }

    pub fn last_request_at(&self, beneficiary: &Pubkey) -> Option<i64> {
        self.last.get(beneficiary).map(|state| state.last_request_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_request_passes() {
        let limiter = RateLimiter::new(30);
        assert!(limiter.check(&Pubkey::new_unique(), 1_000).is_ok());
    }

    #[test]
    fn blocks_inside_window_and_reports_remaining() {
        let mut limiter = RateLimiter::new(30);
        let user = Pubkey::new_unique();
        limiter.record(user, 1_000);

        assert_eq!(
            limiter.check(&user, 1_010),
            Err(CoordinatorError::CooldownActive { remaining_secs: 20 })
        );
        assert!(limiter.check(&user, 1_030).is_ok());
    }

    #[test]
    fn clock_going_backwards_keeps_timestamp() {
        let mut limiter = RateLimiter::new(0);
        let user = Pubkey::new_unique();

        limiter.record(user, 500);
        limiter.record(user, 400);
        assert_eq!(limiter.last_request_at(&user), Some(500));
    }

    #[test]
    fn earlier_clock_counts_as_no_elapsed_time() {
        let mut limiter = RateLimiter::new(10);
        let user = Pubkey::new_unique();
        limiter.record(user, 500);

        assert_eq!(limiter.remaining(&user, 450), 10);
    }

    #[test]
    fn zero_window_disables_cooldown() {
        let mut limiter = RateLimiter::new(0);
        let user = Pubkey::new_unique();
        limiter.record(user, 100);
        assert!(limiter.check(&user, 100).is_ok());
    }
}
