//! Urgency ranking run once per output packet slot.

use super::clock::MuxTime;
use std::cmp::{Ordering, Reverse};

/// A PID that may receive the next packet slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Pat,
    Pmt { program: usize },
    Es { program: usize, stream: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub target: Target,
    pub pid: u16,
    /// Mux time at which the source wants to send
    pub due: MuxTime,
    /// Object descriptor streams win ties against other streams
    pub priority: bool,
}

impl Candidate {
    /// How far past due the candidate is at `now`, in nanoseconds
    pub fn urgency(&self, now: MuxTime) -> i128 {
        now.diff_nanos(self.due)
    }

    fn rank(&self, now: MuxTime) -> (i128, bool, Reverse<u16>) {
        (self.urgency(now), self.priority, Reverse(self.pid))
    }
}

/// Most overdue candidate among those due at `now`.
///
/// Ties go to priority streams first, then to the lowest PID.
pub fn most_urgent(candidates: &[Candidate], now: MuxTime) -> Option<Candidate> {
    candidates
        .iter()
        .filter(|c| c.urgency(now) >= 0)
        .max_by(|a, b| a.rank(now).cmp(&b.rank(now)))
        .copied()
}

/// Candidate with the earliest due time, used when the output is not
/// padded and the mux clock can jump forward to the next data.
pub fn earliest(candidates: &[Candidate]) -> Option<Candidate> {
    candidates
        .iter()
        .min_by(|a, b| match a.due.cmp(&b.due) {
            Ordering::Equal => (!a.priority, a.pid).cmp(&(!b.priority, b.pid)),
            other => other,
        })
        .copied()
}
