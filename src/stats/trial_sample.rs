//! Trial sample record produced by the latency sampler.

use serde::Serialize;

/// One successful trial: the press-to-LED latency and how many polls of the
/// LED state it took to observe the change.
///
/// `elapsed_ns` comes from a monotonic clock and is only meaningful as a
/// relative duration. `polls` is at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TrialSample {
    pub elapsed_ns: u64,
    pub polls: u32,
}
