//! Injectable time source.
//!
//! The Raft core never calls [`std::time::Instant::now`] or a random-number generator directly;
//! both are threaded through a `Clock` so tests can drive elections deterministically instead of
//! racing real timers.

use std::time::{Duration, Instant};

use rand::Rng;

/// A source of monotonic time and election-timeout jitter.
pub trait Clock {
    /// The current instant.
    fn now(&self) -> Instant;

    /// Draws a randomized election timeout uniformly from `[base, 2 * base)`, per the
    /// split-vote-avoidance rule.
    fn election_timeout(&mut self, base: Duration) -> Duration {
        let extra_ms = self.jitter_ms(base.as_millis() as u64);
        base + Duration::from_millis(extra_ms)
    }

    /// Draws a uniformly random value in `[0, bound)` milliseconds. Exposed separately from
    /// [`election_timeout`](Self::election_timeout) so tests can assert on the raw draw.
    fn jitter_ms(&mut self, bound: u64) -> u64;
}

/// The production clock: real wall-clock time and a thread-local RNG.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn jitter_ms(&mut self, bound: u64) -> u64 {
        if bound == 0 {
            return 0;
        }
        rand::thread_rng().gen_range(0..bound)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn election_timeout_is_at_least_base() {
        let mut clock = SystemClock;
        let base = Duration::from_millis(100);
        let t = clock.election_timeout(base);
        assert!(t >= base);
        assert!(t < base * 2);
    }
}
