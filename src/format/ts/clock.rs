use std::fmt;
use std::time::Duration;

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Virtual multiplex time, seconds plus nanoseconds.
///
/// Ordering is lexicographic on (sec, nanosec), which is chronological as
/// long as `nanosec` stays normalized below one second.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MuxTime {
    pub sec: u64,
    pub nanosec: u32,
}

impl MuxTime {
    pub const ZERO: MuxTime = MuxTime { sec: 0, nanosec: 0 };

    pub fn from_nanos(nanos: u128) -> Self {
        Self {
            sec: (nanos / NANOS_PER_SEC as u128) as u64,
            nanosec: (nanos % NANOS_PER_SEC as u128) as u32,
        }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self::from_nanos(ms as u128 * 1_000_000)
    }

    /// Time of `ticks` on a clock running at `timescale` Hz
    pub fn from_ticks(ticks: u64, timescale: u64) -> Self {
        if timescale == 0 {
            return Self::ZERO;
        }
        Self::from_nanos(ticks as u128 * NANOS_PER_SEC as u128 / timescale as u128)
    }

    pub fn as_nanos(&self) -> u128 {
        self.sec as u128 * NANOS_PER_SEC as u128 + self.nanosec as u128
    }

    pub fn as_millis(&self) -> u64 {
        (self.as_nanos() / 1_000_000) as u64
    }

    /// Value of this instant on a clock running at `timescale` Hz
    pub fn to_ticks(&self, timescale: u64) -> u64 {
        (self.as_nanos() * timescale as u128 / NANOS_PER_SEC as u128) as u64
    }

    pub fn add(&self, other: MuxTime) -> MuxTime {
        Self::from_nanos(self.as_nanos() + other.as_nanos())
    }

    /// Advances by `num / den` seconds
    pub fn inc(&mut self, num: u64, den: u64) {
        if den == 0 {
            return;
        }
        *self = self.add(Self::from_nanos(
            num as u128 * NANOS_PER_SEC as u128 / den as u128,
        ));
    }

    /// Signed distance `self - earlier` in nanoseconds
    pub fn diff_nanos(&self, earlier: MuxTime) -> i128 {
        self.as_nanos() as i128 - earlier.as_nanos() as i128
    }

    pub fn saturating_sub(&self, other: MuxTime) -> MuxTime {
        Self::from_nanos(self.as_nanos().saturating_sub(other.as_nanos()))
    }

    pub fn is_zero(&self) -> bool {
        self.sec == 0 && self.nanosec == 0
    }
}

impl From<Duration> for MuxTime {
    fn from(d: Duration) -> Self {
        Self {
            sec: d.as_secs(),
            nanosec: d.subsec_nanos(),
        }
    }
}

impl From<MuxTime> for Duration {
    fn from(t: MuxTime) -> Self {
        Duration::new(t.sec, t.nanosec)
    }
}

impl fmt::Display for MuxTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:09}", self.sec, self.nanosec)
    }
}
