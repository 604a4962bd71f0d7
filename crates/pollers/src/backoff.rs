//! Reset-on-success exponential backoff (spec.md §4.1 "sleep for
//! `base_interval * 2^failures`, capped (e.g., 300 s); a successful cycle
//! resets the counter").

use std::time::Duration;

const CAP: Duration = Duration::from_secs(300);

pub(crate) fn backoff_delay(base_interval: Duration, failures: u32) -> Duration {
    base_interval
        .checked_mul(1u32 << failures.min(16))
        .unwrap_or(CAP)
        .min(CAP)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_failure_doubles_the_interval() {
        assert_eq!(backoff_delay(Duration::from_secs(10), 1), Duration::from_secs(20));
    }

    #[test]
    fn backoff_is_capped() {
        assert_eq!(backoff_delay(Duration::from_secs(60), 10), CAP);
    }

    #[test]
    fn zero_failures_is_the_base_interval() {
        assert_eq!(backoff_delay(Duration::from_secs(60), 0), Duration::from_secs(60));
    }
}
