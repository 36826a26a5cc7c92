use std::time::Duration;

use ledger_resilience::backoff::backoff_with_jitter;

/// Fraction used by the dispatcher's own retry schedule (spec §4.9: `± 25%`,
/// distinct from the `± 50%` used elsewhere in the job fabric, e.g. storage
/// retries).
const RETRY_JITTER_FRACTION: f64 = 0.25;

/// `interval_i = base * 2^i +/- 25% * base * 2^i` for the i-th retry
/// (spec §4.9).
pub fn retry_delay(base: Duration, attempt: u32) -> Duration {
    backoff_with_jitter(base, attempt, RETRY_JITTER_FRACTION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_with_attempt_and_stays_in_bounds() {
        let base = Duration::from_secs(1);
        for attempt in 0..6 {
            let d = retry_delay(base, attempt);
            let exp = base.as_secs_f64() * 2f64.powi(attempt as i32);
            assert!(d.as_secs_f64() >= exp * 0.75 - 1e-6);
            assert!(d.as_secs_f64() <= exp * 1.25 + 1e-6);
        }
    }
}
