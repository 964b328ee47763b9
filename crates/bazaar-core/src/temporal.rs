//! # Temporal Types
//!
//! UTC-only timestamps and the injectable [`Clock`].
//!
//! ## Lazy deadlines
//!
//! The engine has no timer infrastructure. Voucher windows, dispute periods
//! and dispute timeouts are compared against [`Clock::now`] only when an
//! operation that depends on them is invoked. Production wiring uses
//! [`SystemClock`]; tests and simulations use [`ManualClock`] to step across
//! deadlines deterministically.

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A UTC timestamp.
///
/// Serializes to ISO 8601 with a `Z` suffix. Ordered, so deadline checks are
/// plain comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// The current wall-clock time. Prefer a [`Clock`] inside the engine.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Create a timestamp from a `chrono::DateTime<Utc>`.
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Create a timestamp from seconds since the Unix epoch.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidTimestamp`] if the value is outside
    /// chrono's representable range.
    pub fn from_unix_seconds(secs: i64) -> Result<Self, ValidationError> {
        Utc.timestamp_opt(secs, 0)
            .single()
            .map(Self)
            .ok_or_else(|| ValidationError::InvalidTimestamp {
                value: secs.to_string(),
                reason: "outside the representable UTC range".to_string(),
            })
    }

    /// Access the underlying `chrono::DateTime<Utc>`.
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Seconds since the Unix epoch.
    pub fn unix_seconds(&self) -> i64 {
        self.0.timestamp()
    }

    /// This timestamp moved forward by `secs` seconds.
    ///
    /// Saturates at the latest representable instant, so an absurdly long
    /// period yields a deadline that never passes rather than an error.
    pub fn plus_seconds(&self, secs: u64) -> Self {
        let shifted = i64::try_from(secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .and_then(|delta| self.0.checked_add_signed(delta));
        Self(shifted.unwrap_or(DateTime::<Utc>::MAX_UTC))
    }

    /// ISO 8601 with `Z` suffix, truncated to seconds.
    pub fn to_canonical_string(&self) -> String {
        self.0.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_canonical_string())
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }
}

// ── Clock ────────────────────────────────────────────────────────────

/// Source of "now" for every deadline comparison.
pub trait Clock: Send + Sync {
    /// The current time.
    fn now(&self) -> Timestamp;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    /// A clock frozen at `start`.
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// A clock frozen at `secs` after the Unix epoch.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidTimestamp`] for out-of-range input.
    pub fn starting_at_unix(secs: i64) -> Result<Self, ValidationError> {
        Timestamp::from_unix_seconds(secs).map(Self::new)
    }

    /// Jump to an absolute instant. The clock may move backwards.
    pub fn set(&self, at: Timestamp) {
        *self.now.lock() = at;
    }

    /// Move forward by `secs` seconds and return the new time.
    pub fn advance_seconds(&self, secs: u64) -> Timestamp {
        let mut guard = self.now.lock();
        *guard = guard.plus_seconds(secs);
        *guard
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unix_roundtrip() {
        let ts = Timestamp::from_unix_seconds(1_700_000_000).unwrap();
        assert_eq!(ts.unix_seconds(), 1_700_000_000);
    }

    #[test]
    fn from_unix_rejects_out_of_range() {
        assert!(Timestamp::from_unix_seconds(i64::MAX).is_err());
    }

    #[test]
    fn plus_seconds_moves_forward() {
        let ts = Timestamp::from_unix_seconds(1_000).unwrap();
        assert_eq!(ts.plus_seconds(86_400).unix_seconds(), 87_400);
        assert!(ts.plus_seconds(1) > ts);
    }

    #[test]
    fn plus_seconds_saturates() {
        let ts = Timestamp::from_unix_seconds(1_000).unwrap();
        let far = ts.plus_seconds(u64::MAX);
        assert_eq!(*far.as_datetime(), DateTime::<Utc>::MAX_UTC);
        assert_eq!(far.plus_seconds(10), far);
    }

    #[test]
    fn canonical_string_has_z_suffix() {
        let ts = Timestamp::from_unix_seconds(0).unwrap();
        assert_eq!(ts.to_canonical_string(), "1970-01-01T00:00:00Z");
        assert_eq!(format!("{ts}"), "1970-01-01T00:00:00Z");
    }

    #[test]
    fn manual_clock_advances_only_when_told() {
        let clock = ManualClock::starting_at_unix(100).unwrap();
        assert_eq!(clock.now().unix_seconds(), 100);
        assert_eq!(clock.now().unix_seconds(), 100);
        let after = clock.advance_seconds(50);
        assert_eq!(after.unix_seconds(), 150);
        assert_eq!(clock.now(), after);
    }

    #[test]
    fn manual_clock_set_jumps() {
        let clock = ManualClock::starting_at_unix(100).unwrap();
        clock.set(Timestamp::from_unix_seconds(10).unwrap());
        assert_eq!(clock.now().unix_seconds(), 10);
    }

    #[test]
    fn system_clock_is_monotone_enough() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }

    #[test]
    fn timestamp_serde_roundtrip() {
        let ts = Timestamp::from_unix_seconds(1_700_000_000).unwrap();
        let json = serde_json::to_string(&ts).unwrap();
        let back: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ts);
    }
}
