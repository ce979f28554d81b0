use super::ClockError;
use crate::config::DEFAULT_BPM;
use std::fmt;
use std::time::Duration;

const MILLIS_PER_MINUTE: u32 = 60_000;

/// A validated tempo in beats per minute.
///
/// The upper bound keeps the tick interval at one millisecond or more.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Bpm(u32);

impl Bpm {
    pub const MIN: u32 = 1;
    pub const MAX: u32 = MILLIS_PER_MINUTE;

    pub fn new(bpm: u32) -> Result<Self, ClockError> {
        if (Self::MIN..=Self::MAX).contains(&bpm) {
            Ok(Bpm(bpm))
        } else {
            Err(ClockError::InvalidTempo(bpm))
        }
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// Milliseconds between ticks, truncated (`70 -> 857`).
    pub fn interval_millis(self) -> u32 {
        MILLIS_PER_MINUTE / self.0
    }

    pub fn tick_interval(self) -> Duration {
        Duration::from_millis(u64::from(self.interval_millis()))
    }
}

const _: () = assert!(DEFAULT_BPM >= Bpm::MIN && DEFAULT_BPM <= Bpm::MAX);

impl Default for Bpm {
    fn default() -> Self {
        Bpm(DEFAULT_BPM)
    }
}

impl TryFrom<u32> for Bpm {
    type Error = ClockError;

    fn try_from(bpm: u32) -> Result<Self, Self::Error> {
        Bpm::new(bpm)
    }
}

impl From<Bpm> for u32 {
    fn from(bpm: Bpm) -> u32 {
        bpm.0
    }
}

impl fmt::Display for Bpm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} BPM", self.0)
    }
}
