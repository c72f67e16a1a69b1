//! Sliding-window throughput metrics for a publish run.
//!
//! Events are binned into a fixed circular array of time slots. When an event
//! lands past the last slot, the oldest slots are evicted one at a time, so the
//! rate always covers the most recent `bins * resolution` of activity.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::observability::Observability;

pub const DEFAULT_BINS: usize = 30;
pub const DEFAULT_RESOLUTION: Duration = Duration::from_millis(1000);

#[derive(Debug)]
struct Window {
    counts: Vec<u64>,
    start_bin: usize,
    start_time: Option<Instant>,
    max_bin_index: usize,
    success_count: u64,
}

impl Window {
    fn new(bins: usize) -> Self {
        Self {
            counts: vec![0; bins],
            start_bin: 0,
            start_time: None,
            max_bin_index: 0,
            success_count: 0,
        }
    }
}

/// Run-duration stopwatch, frozen while stopped.
#[derive(Debug, Default)]
struct Stopwatch {
    running_since: Option<Instant>,
    accumulated: Duration,
}

impl Stopwatch {
    fn start(&mut self) {
        if self.running_since.is_none() {
            self.running_since = Some(Instant::now());
        }
    }

    fn stop(&mut self) {
        if let Some(since) = self.running_since.take() {
            self.accumulated += since.elapsed();
        }
    }

    fn elapsed(&self) -> Duration {
        self.accumulated + self.running_since.map_or(Duration::ZERO, |s| s.elapsed())
    }
}

struct Reporter {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct MetricsCollector {
    bins: usize,
    resolution: Duration,
    window: Mutex<Window>,
    stopwatch: Mutex<Stopwatch>,
    reporter: Mutex<Option<Reporter>>,
    observability: Arc<Observability>,
}

impl std::fmt::Debug for MetricsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsCollector")
            .field("bins", &self.bins)
            .field("resolution", &self.resolution)
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panic while holding the lock leaves plain counters behind; keep using them.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MetricsCollector {
    pub fn new(observability: Arc<Observability>) -> Self {
        Self::with_window(DEFAULT_BINS, DEFAULT_RESOLUTION, observability)
    }

    /// Creates a collector with a custom window shape.
    ///
    /// `bins` and `resolution` are clamped to at least one bin of one millisecond.
    pub fn with_window(bins: usize, resolution: Duration, observability: Arc<Observability>) -> Self {
        let bins = bins.max(1);
        let resolution = resolution.max(Duration::from_millis(1));
        Self {
            bins,
            resolution,
            window: Mutex::new(Window::new(bins)),
            stopwatch: Mutex::new(Stopwatch::default()),
            reporter: Mutex::new(None),
            observability,
        }
    }

    /// Records one publish outcome observed at `event_time`.
    pub fn collect(&self, event_time: Instant, success: bool) {
        self.collect_at(event_time, Instant::now(), success);
    }

    fn collect_at(&self, event_time: Instant, now: Instant, success: bool) {
        let resolution_ms = self.resolution.as_millis();
        let mut window = lock(&self.window);

        let mut start_time = *window.start_time.get_or_insert(now);
        if success {
            window.success_count += 1;
        }

        let offset_ms = event_time.saturating_duration_since(start_time).as_millis();
        let mut bin_index = usize::try_from(offset_ms / resolution_ms).unwrap_or(usize::MAX);

        while bin_index >= self.bins {
            let evicted = window.start_bin;
            window.counts[evicted] = 0;
            window.start_bin = (evicted + 1) % self.bins;
            start_time += self.resolution;
            bin_index -= 1;
        }
        window.start_time = Some(start_time);

        let slot = (window.start_bin + bin_index) % self.bins;
        window.counts[slot] += 1;
        window.max_bin_index = window.max_bin_index.max(bin_index);
    }

    /// Events per second over the bins actually covered so far.
    pub fn events_per_second(&self) -> f64 {
        let window = lock(&self.window);
        let total: u64 = window.counts.iter().sum();
        let covered_secs =
            self.resolution.as_secs_f64() * (window.max_bin_index as f64 + 1.0);
        total as f64 / covered_secs
    }

    pub fn total_success(&self) -> u64 {
        lock(&self.window).success_count
    }

    /// Total run time, independent of the bin bookkeeping.
    pub fn elapsed(&self) -> Duration {
        lock(&self.stopwatch).elapsed()
    }

    /// Bin counts in chronological order, oldest first.
    pub fn bin_counts(&self) -> Vec<u64> {
        let window = lock(&self.window);
        (0..self.bins)
            .map(|i| window.counts[(window.start_bin + i) % self.bins])
            .collect()
    }

    /// Clears all counters and the stopwatch for a new run.
    pub fn reset(&self) {
        *lock(&self.window) = Window::new(self.bins);
        *lock(&self.stopwatch) = Stopwatch::default();
    }

    /// Starts the stopwatch and a periodic progress reporter.
    ///
    /// Calling `start` while a reporter is already running only restarts the
    /// stopwatch.
    pub fn start(self: &Arc<Self>, refresh_interval: Duration) {
        lock(&self.stopwatch).start();

        let mut reporter = lock(&self.reporter);
        if reporter.is_some() {
            return;
        }

        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let collector = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(refresh_interval);
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;

                    result = shutdown_rx.changed() => {
                        match result {
                            Ok(()) if *shutdown_rx.borrow() => break,
                            Ok(()) => {}
                            Err(_) => break,
                        }
                    }
                    _ = ticker.tick() => collector.log_progress(),
                }
            }
        });

        *reporter = Some(Reporter { shutdown, handle });
    }

    /// Stops the reporter and freezes the stopwatch.
    pub fn stop(&self) {
        lock(&self.stopwatch).stop();

        if let Some(reporter) = lock(&self.reporter).take() {
            let _ = reporter.shutdown.send(true);
            drop(reporter.handle);
        }
    }

    fn log_progress(&self) {
        if !self.observability.verbose() {
            tracing::debug!(
                successful = self.total_success(),
                elapsed = ?self.elapsed(),
                rate = self.events_per_second().ceil(),
                "Publish progress"
            );
            return;
        }
        tracing::info!(
            run_id = %self.observability.run_id(),
            successful = self.total_success(),
            elapsed = ?self.elapsed(),
            rate = self.events_per_second().ceil(),
            "Publish progress"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collector(bins: usize, resolution_ms: u64) -> MetricsCollector {
        MetricsCollector::with_window(
            bins,
            Duration::from_millis(resolution_ms),
            Arc::new(Observability::with_run_id("test", false)),
        )
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_success_count_and_bins() {
        let m = collector(5, 100);
        let t0 = Instant::now();

        m.collect_at(t0, t0, true);
        m.collect_at(t0 + ms(50), t0, true);
        m.collect_at(t0 + ms(150), t0, false);
        m.collect_at(t0 + ms(420), t0, true);

        assert_eq!(m.total_success(), 3);
        assert_eq!(m.bin_counts(), vec![2, 1, 0, 0, 1]);
    }

    #[test]
    fn test_rate_during_warm_up_uses_covered_bins_only() {
        let m = collector(10, 1000);
        let t0 = Instant::now();

        for i in 0..4 {
            m.collect_at(t0 + ms(i * 500), t0, true);
        }

        // Highest bin touched is 1, so two seconds are covered.
        assert!((m.events_per_second() - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_window_slides_one_bin_at_a_time() {
        let m = collector(3, 100);
        let t0 = Instant::now();

        m.collect_at(t0, t0, true);
        m.collect_at(t0 + ms(100), t0, true);
        m.collect_at(t0 + ms(200), t0, true);
        m.collect_at(t0 + ms(300), t0, true);

        // The first bin was evicted; the window now covers 100..400 ms.
        assert_eq!(m.bin_counts(), vec![1, 1, 1]);
        assert_eq!(m.total_success(), 4);
        assert!((m.events_per_second() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_old_bins_read_back_zero_after_long_gap() {
        let m = collector(4, 100);
        let t0 = Instant::now();

        for i in 0..4 {
            m.collect_at(t0 + ms(i * 100), t0, true);
        }
        m.collect_at(t0 + ms(2_000), t0, true);

        assert_eq!(m.bin_counts(), vec![0, 0, 0, 1]);
        let expected = 1.0 / 0.4;
        assert!((m.events_per_second() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_event_before_start_lands_in_first_bin() {
        let m = collector(3, 100);
        let t0 = Instant::now();
        let later = t0 + ms(250);

        m.collect_at(t0, later, false);
        assert_eq!(m.bin_counts(), vec![1, 0, 0]);
        assert_eq!(m.total_success(), 0);
    }

    #[test]
    fn test_reset_clears_everything() {
        let m = collector(3, 100);
        let t0 = Instant::now();
        m.collect_at(t0, t0, true);

        m.reset();
        assert_eq!(m.total_success(), 0);
        assert_eq!(m.bin_counts(), vec![0, 0, 0]);
        assert_eq!(m.events_per_second(), 0.0);
        assert_eq!(m.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_stop_freezes_stopwatch() {
        let m = Arc::new(collector(3, 100));
        m.start(Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(20)).await;
        m.stop();

        let frozen = m.elapsed();
        assert!(frozen >= Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(m.elapsed(), frozen);
    }
}
