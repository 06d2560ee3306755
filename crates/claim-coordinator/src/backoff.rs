//! # Linear Conflict Backoff
//!
//! The claim coordinator retries an optimistic-concurrency conflict on the
//! same candidate host up to 5 times before moving to the next candidate
//!. The spacing is linear in the attempt number rather
//! than exponential, since these conflicts resolve quickly (another
//! reconciler finishing its own claim) and the coordinator would rather move
//! to the next candidate soon than wait out a long backoff on one host.

use std::time::Duration;

/// Maximum number of same-candidate retries before moving on.
pub const MAX_ATTEMPTS_PER_CANDIDATE: u32 = 5;

/// Backoff before retrying the same candidate: `attempt * 100ms`.
#[must_use]
pub fn conflict_backoff(attempt: u32) -> Duration {
    Duration::from_millis(u64::from(attempt) * 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_linearly_with_attempt() {
        assert_eq!(conflict_backoff(1), Duration::from_millis(100));
        assert_eq!(conflict_backoff(2), Duration::from_millis(200));
        assert_eq!(conflict_backoff(5), Duration::from_millis(500));
    }
}
