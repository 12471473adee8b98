//! Per-identity alert suppression within a cooldown window.

use crate::types::UNKNOWN_IDENTITY;
use chrono::{DateTime, Local, TimeDelta};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Default cooldown window: one hour.
pub const DEFAULT_COOLDOWN_SECS: i64 = 3600;

/// Last-accepted timestamp per identity, for the lifetime of the process.
///
/// An identity is accepted again only once strictly more than `window`
/// has elapsed; exactly `window` is still inside the cooldown. "Unknown"
/// is never tracked. Keys are never removed, so the map is bounded by the
/// number of gallery identities.
#[derive(Debug, Clone)]
pub struct CooldownTracker {
    window: TimeDelta,
    last_accepted: HashMap<String, DateTime<Local>>,
}

impl Default for CooldownTracker {
    fn default() -> Self {
        Self::new(TimeDelta::seconds(DEFAULT_COOLDOWN_SECS))
    }
}

impl CooldownTracker {
    pub fn new(window: TimeDelta) -> Self {
        Self {
            window,
            last_accepted: HashMap::new(),
        }
    }

    /// Window from a configured number of seconds. Negative values mean no
    /// cooldown; values too large for a `TimeDelta` fall back to the default.
    pub fn from_secs(secs: i64) -> Self {
        let window = TimeDelta::try_seconds(secs.max(0)).unwrap_or_else(|| {
            tracing::warn!(secs, "cooldown out of range; using default");
            TimeDelta::seconds(DEFAULT_COOLDOWN_SECS)
        });
        Self::new(window)
    }

    pub fn window(&self) -> TimeDelta {
        self.window
    }

    /// Whether a match for `identity` at `now` should be recorded and alerted.
    pub fn should_accept(&self, identity: &str, now: DateTime<Local>) -> bool {
        if identity == UNKNOWN_IDENTITY {
            return false;
        }
        match self.last_accepted.get(identity) {
            None => true,
            Some(last) => now.signed_duration_since(*last) > self.window,
        }
    }

    /// Mark `identity` as accepted at `now`. Ignored for "Unknown".
    pub fn record_accept(&mut self, identity: &str, now: DateTime<Local>) {
        if identity == UNKNOWN_IDENTITY {
            return;
        }
        self.last_accepted.insert(identity.to_string(), now);
    }

    pub fn last_accepted(&self, identity: &str) -> Option<DateTime<Local>> {
        self.last_accepted.get(identity).copied()
    }

    /// Number of identities with a recorded acceptance.
    pub fn tracked(&self) -> usize {
        self.last_accepted.len()
    }
}

/// A [`CooldownTracker`] behind a mutex, for use from the capture worker.
///
/// [`try_accept`](Self::try_accept) performs the check and the record under
/// one lock, so two callers evaluating the same identity in the same window
/// cannot both be accepted.
#[derive(Debug, Default)]
pub struct SharedCooldown {
    inner: Mutex<CooldownTracker>,
}

impl SharedCooldown {
    pub fn new(tracker: CooldownTracker) -> Self {
        Self {
            inner: Mutex::new(tracker),
        }
    }

    /// Check-and-record in one step. Returns `true` if the match is accepted.
    pub fn try_accept(&self, identity: &str, now: DateTime<Local>) -> bool {
        let mut tracker = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if tracker.should_accept(identity, now) {
            tracker.record_accept(identity, now);
            true
        } else {
            false
        }
    }

    pub fn last_accepted(&self, identity: &str) -> Option<DateTime<Local>> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last_accepted(identity)
    }

    pub fn tracked(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .tracked()
    }
}
