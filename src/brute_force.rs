/// Per-IP brute-force protection.
///
/// A fixed-window counter of failed login attempts keyed by client IP.
/// The IP is blocked once the count reaches the threshold inside the
/// window, independent of which account was targeted, so distributed
/// account guessing from one address is caught too. Fixed-window semantics
/// allow up to 2x the threshold across a window boundary in exchange for
/// O(1) updates; the guard is supplementary to password policy, not the
/// sole defense.
///
/// Fail-closed: if the counter state is unreachable (poisoned lock),
/// `is_blocked` reports blocked rather than permitting unlimited attempts.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Window {
    count: u32,
    started_at: Instant,
}

pub struct BruteForceGuard {
    attempts: Mutex<HashMap<String, Window>>,
    threshold: u32,
    window: Duration,
}

impl BruteForceGuard {
    pub fn new(threshold: u32, window: Duration) -> Self {
        Self {
            attempts: Mutex::new(HashMap::new()),
            threshold,
            window,
        }
    }

    pub fn is_blocked(&self, ip: &str) -> bool {
        let map = match self.attempts.lock() {
            Ok(guard) => guard,
            // Counter state unreachable: treat as blocked.
            Err(_) => return true,
        };
        match map.get(ip) {
            Some(window) => {
                window.started_at.elapsed() <= self.window && window.count >= self.threshold
            }
            None => false,
        }
    }

    pub fn register_failed_attempt(&self, ip: &str) {
        let now = Instant::now();
        let mut map = match self.attempts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let window = map.entry(ip.to_string()).or_insert(Window {
            count: 0,
            started_at: now,
        });

        if window.started_at.elapsed() > self.window {
            window.count = 1;
            window.started_at = now;
        } else {
            window.count += 1;
        }
    }

    /// Resets the counter; a success dominates any concurrent increment.
    pub fn register_successful_attempt(&self, ip: &str) {
        let mut map = match self.attempts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        map.remove(ip);
    }

    /// Drops windows that have lapsed and returns how many were removed.
    /// Lapsed windows already read as unblocked; this reclaims their memory.
    pub fn prune_expired(&self) -> usize {
        let mut map = match self.attempts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = map.len();
        map.retain(|_, window| window.started_at.elapsed() <= self.window);
        before - map.len()
    }

    pub fn remaining_attempts(&self, ip: &str) -> u32 {
        let map = match self.attempts.lock() {
            Ok(guard) => guard,
            Err(_) => return 0,
        };
        match map.get(ip) {
            Some(window) if window.started_at.elapsed() <= self.window => {
                self.threshold.saturating_sub(window.count)
            }
            _ => self.threshold,
        }
    }
}
