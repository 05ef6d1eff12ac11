//! Expiry requests and the one-year TTL ceiling.

use std::time::Duration;

pub const ONE_MINUTE_IN_SECONDS: u64 = 60;
pub const ONE_HOUR_IN_SECONDS: u64 = 3_600;
pub const ONE_DAY_IN_SECONDS: u64 = ONE_HOUR_IN_SECONDS * 24;
pub const ONE_WEEK_IN_SECONDS: u64 = ONE_DAY_IN_SECONDS * 7;
pub const ONE_MONTH_IN_SECONDS: u64 = ONE_DAY_IN_SECONDS * 30;
pub const ONE_YEAR_IN_SECONDS: u64 = ONE_DAY_IN_SECONDS * 365;

/// Upper bound on every stored TTL.
pub const MAX_TTL_SECONDS: u64 = ONE_YEAR_IN_SECONDS;

/// A requested expiry: a second count or a duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expire {
    Seconds(u64),
    Duration(Duration),
}

impl Default for Expire {
    fn default() -> Self {
        Expire::Seconds(ONE_YEAR_IN_SECONDS)
    }
}

impl From<u64> for Expire {
    fn from(seconds: u64) -> Self {
        Expire::Seconds(seconds)
    }
}

impl From<Duration> for Expire {
    fn from(duration: Duration) -> Self {
        Expire::Duration(duration)
    }
}

impl Expire {
    /// Whole seconds, clamped to [`MAX_TTL_SECONDS`]. Sub-second parts of a
    /// duration are truncated.
    pub fn resolve(self) -> u64 {
        resolve_expiry(self)
    }
}

/// Converts `requested` to seconds and clamps it to one year.
pub fn resolve_expiry(requested: impl Into<Expire>) -> u64 {
    let seconds = match requested.into() {
        Expire::Seconds(s) => s,
        Expire::Duration(d) => d.as_secs(),
    };
    seconds.min(MAX_TTL_SECONDS)
}
