//! Real and mockable system time.
//!
//! [`unix_time_as_millis`] and [`unix_time_as_micros`] return wall-clock
//! time unless the `enable_faketime` feature is on and a [`faketime`]
//! guard has pinned a value; [`Instant`] is built on top of the latter
//! so the tracker and deployment-engine tests can drive time forward and
//! backward deterministically.

#[cfg(feature = "enable_faketime")]
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub use std::time::Duration;

#[cfg(test)]
mod test_faketime;
#[cfg(test)]
mod test_realtime;

#[cfg(feature = "enable_faketime")]
static FAKETIME_ENABLED: AtomicBool = AtomicBool::new(false);
#[cfg(feature = "enable_faketime")]
static FAKETIME_MICROS: AtomicU64 = AtomicU64::new(0);

/// Real wall-clock milliseconds since the Unix epoch; never mocked.
pub fn system_time_as_millis() -> u64 {
    (system_time_as_micros_real() / 1_000) as u64
}

fn system_time_as_micros_real() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time is before the Unix epoch")
        .as_micros()
}

/// Milliseconds since the Unix epoch; returns the faketime value when one
/// has been set through [`faketime`], otherwise real wall-clock time.
pub fn unix_time_as_millis() -> u64 {
    unix_time_as_micros() / 1_000
}

/// Microseconds since the Unix epoch; returns the faketime value when one
/// has been set through [`faketime`], otherwise real wall-clock time.
pub fn unix_time_as_micros() -> u64 {
    #[cfg(feature = "enable_faketime")]
    {
        if FAKETIME_ENABLED.load(Ordering::SeqCst) {
            return FAKETIME_MICROS.load(Ordering::SeqCst);
        }
    }
    system_time_as_micros_real() as u64
}

/// RAII handle that pins [`unix_time_as_millis`]/[`unix_time_as_micros`]
/// while held. Dropping it (or calling [`FaketimeGuard::disable_faketime`])
/// restores real wall-clock time.
#[cfg(feature = "enable_faketime")]
pub struct FaketimeGuard {
    _private: (),
}

#[cfg(feature = "enable_faketime")]
impl FaketimeGuard {
    /// Pins the clock to `millis` milliseconds since the Unix epoch.
    pub fn set_faketime(&self, millis: u64) {
        FAKETIME_MICROS.store(millis * 1_000, Ordering::SeqCst);
        FAKETIME_ENABLED.store(true, Ordering::SeqCst);
    }

    /// Pins the clock to `micros` microseconds since the Unix epoch.
    pub fn set_faketime_micros(&self, micros: u64) {
        FAKETIME_MICROS.store(micros, Ordering::SeqCst);
        FAKETIME_ENABLED.store(true, Ordering::SeqCst);
    }

    /// Resumes real wall-clock time.
    pub fn disable_faketime(&self) {
        FAKETIME_ENABLED.store(false, Ordering::SeqCst);
    }
}

#[cfg(feature = "enable_faketime")]
impl Drop for FaketimeGuard {
    fn drop(&mut self) {
        self.disable_faketime();
    }
}

/// Acquires the process-wide faketime override. Tests that need
/// deterministic timing hold this for their duration.
#[cfg(feature = "enable_faketime")]
pub fn faketime() -> FaketimeGuard {
    FaketimeGuard { _private: () }
}

/// A point in time with microsecond resolution, mockable via [`faketime`].
///
/// Unlike [`std::time::Instant`] this is anchored to the Unix epoch so it
/// can be serialized and compared across process restarts in tests; it is
/// not meant to replace `std::time::Instant` for wall-clock-independent
/// monotonic measurements.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Instant(u64);

impl Instant {
    /// The current time, real or faked.
    pub fn now() -> Self {
        Instant(unix_time_as_micros())
    }

    /// Builds an `Instant` from microseconds since the Unix epoch.
    pub fn from_micros(micros: u64) -> Self {
        Instant(micros)
    }

    /// Microseconds since the Unix epoch.
    pub fn as_micros(self) -> u64 {
        self.0
    }

    /// `self - earlier`, clamped to zero if `earlier` is later than `self`.
    pub fn saturating_duration_since(self, earlier: Instant) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }

    /// `self + duration`, saturating at `u64::MAX` microseconds.
    pub fn saturating_add(self, duration: Duration) -> Self {
        Instant(self.0.saturating_add(duration.as_micros() as u64))
    }
}

impl std::ops::Add<Duration> for Instant {
    type Output = Instant;
    fn add(self, rhs: Duration) -> Instant {
        self.saturating_add(rhs)
    }
}

impl std::ops::Sub<Duration> for Instant {
    type Output = Instant;
    fn sub(self, rhs: Duration) -> Instant {
        Instant(self.0.saturating_sub(rhs.as_micros() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instant_arithmetic_round_trips() {
        let t0 = Instant::from_micros(1_000_000);
        let t1 = t0 + Duration::from_secs(1);
        assert_eq!(t1.as_micros(), 2_000_000);
        assert_eq!(t1.saturating_duration_since(t0), Duration::from_secs(1));
        assert_eq!(t0.saturating_duration_since(t1), Duration::from_secs(0));
    }
}
