//! Retry schedule for transient upstream failures.
//!
//! Delays follow the "decorrelated jitter" backoff (second revision): each
//! delay is drawn from a smoothly growing exponential curve with random steps,
//! so concurrent workers hitting the same throttling window spread their
//! retries out instead of retrying in lockstep.

use std::time::Duration;

use rand::Rng;

const P_FACTOR: f64 = 4.0;
const RP_SCALING_FACTOR: f64 = 1.0 / 1.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts are at most this plus one
    pub max_retry_count: u32,
    /// Median of the first delay
    pub median_first_retry_delay: Duration,
    /// Upper bound on any single delay
    pub max_retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retry_count: 3,
            median_first_retry_delay: Duration::from_secs(1),
            max_retry_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Fresh randomized delay schedule, one entry per allowed retry.
    pub fn delays(&self) -> Vec<Duration> {
        self.delays_with(&mut rand::thread_rng())
    }

    pub fn delays_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<Duration> {
        decorrelated_jitter_backoff(self.median_first_retry_delay, self.max_retry_count, rng)
            .into_iter()
            .map(|d| d.min(self.max_retry_delay))
            .collect()
    }
}

/// Generates `retry_count` delays whose first element has a median close to
/// `median_first_retry_delay`.
pub fn decorrelated_jitter_backoff<R: Rng + ?Sized>(
    median_first_retry_delay: Duration,
    retry_count: u32,
    rng: &mut R,
) -> Vec<Duration> {
    let target_secs = median_first_retry_delay.as_secs_f64();
    let mut delays = Vec::with_capacity(retry_count as usize);
    let mut t = 0.0_f64;
    let mut prev = 0.0_f64;

    for _ in 0..retry_count {
        t += rng.r#gen::<f64>();
        let next = 2f64.powf(t) * (P_FACTOR * t).sqrt().tanh();
        let secs = ((next - prev) * RP_SCALING_FACTOR * target_secs).max(0.0);
        delays.push(Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX));
        prev = next;
    }

    delays
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_one_delay_per_retry() {
        let mut rng = StdRng::seed_from_u64(7);
        let delays = decorrelated_jitter_backoff(Duration::from_millis(100), 5, &mut rng);
        assert_eq!(delays.len(), 5);

        let none = decorrelated_jitter_backoff(Duration::from_millis(100), 0, &mut rng);
        assert!(none.is_empty());
    }

    #[test]
    fn test_first_delay_is_bounded_around_median() {
        let mut rng = StdRng::seed_from_u64(42);
        let median = Duration::from_millis(1000);
        let mut firsts: Vec<Duration> = (0..1001)
            .map(|_| decorrelated_jitter_backoff(median, 1, &mut rng)[0])
            .collect();
        firsts.sort();

        // 2 * tanh(2) / 1.4 is the supremum of the first step.
        assert!(firsts.iter().all(|d| *d < Duration::from_millis(1380)));
        let observed = firsts[500];
        assert!(observed > Duration::from_millis(600), "median {observed:?}");
        assert!(observed < Duration::from_millis(1200), "median {observed:?}");
    }

    #[test]
    fn test_later_delays_grow_on_average() {
        let mut rng = StdRng::seed_from_u64(3);
        let runs = 500;
        let mut sums = [0f64; 4];
        for _ in 0..runs {
            let delays = decorrelated_jitter_backoff(Duration::from_millis(100), 4, &mut rng);
            for (sum, d) in sums.iter_mut().zip(&delays) {
                *sum += d.as_secs_f64();
            }
        }
        assert!(sums[3] > sums[0]);
    }

    #[test]
    fn test_policy_caps_each_delay() {
        let policy = RetryPolicy {
            max_retry_count: 10,
            median_first_retry_delay: Duration::from_secs(5),
            max_retry_delay: Duration::from_secs(8),
        };
        let delays = policy.delays_with(&mut StdRng::seed_from_u64(11));
        assert_eq!(delays.len(), 10);
        assert!(delays.iter().all(|d| *d <= Duration::from_secs(8)));
        assert_eq!(*delays.last().unwrap(), Duration::from_secs(8));
    }
}
