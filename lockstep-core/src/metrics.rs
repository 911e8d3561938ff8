//! Prometheus-text metrics
//!
//! Per-process counters and histograms. The worker binary dumps them to a
//! file on exit when asked to.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Instant;

/// Counter metric (monotonically increasing)
pub struct Counter {
    value: AtomicU64,
    name: &'static str,
    help: &'static str,
}

impl Counter {
    /// Create a new counter
    pub const fn new(name: &'static str, help: &'static str) -> Self {
        Self {
            value: AtomicU64::new(0),
            name,
            help,
        }
    }

    /// Increment by 1
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current value
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Format as Prometheus metric
    pub fn to_prometheus(&self) -> String {
        format!(
            "# HELP {} {}\n# TYPE {} counter\n{} {}\n",
            self.name, self.help, self.name, self.name, self.get()
        )
    }
}

/// Gauge metric (can go up or down)
pub struct Gauge {
    value: AtomicI64,
    name: &'static str,
    help: &'static str,
}

impl Gauge {
    /// Create a new gauge
    pub const fn new(name: &'static str, help: &'static str) -> Self {
        Self {
            value: AtomicI64::new(0),
            name,
            help,
        }
    }

    /// Set value
    pub fn set(&self, val: i64) {
        self.value.store(val, Ordering::Relaxed);
    }

    /// Get current value
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Format as Prometheus metric
    pub fn to_prometheus(&self) -> String {
        format!(
            "# HELP {} {}\n# TYPE {} gauge\n{} {}\n",
            self.name, self.help, self.name, self.name, self.get()
        )
    }
}

/// Histogram for latency measurements, in seconds
pub struct Histogram {
    buckets: Vec<(f64, AtomicU64)>,
    sum_micros: AtomicU64,
    count: AtomicU64,
    name: &'static str,
    help: &'static str,
}

impl Histogram {
    /// Create with buckets suited to commands that run seconds to minutes
    pub fn new(name: &'static str, help: &'static str) -> Self {
        Self::with_buckets(
            name,
            help,
            vec![0.01, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0, 1800.0],
        )
    }

    /// Create with custom buckets
    pub fn with_buckets(name: &'static str, help: &'static str, bounds: Vec<f64>) -> Self {
        Self {
            buckets: bounds.into_iter().map(|b| (b, AtomicU64::new(0))).collect(),
            sum_micros: AtomicU64::new(0),
            count: AtomicU64::new(0),
            name,
            help,
        }
    }

    /// Observe a value
    pub fn observe(&self, value: f64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_micros
            .fetch_add((value * 1_000_000.0) as u64, Ordering::Relaxed);
        for (bound, count) in &self.buckets {
            if value <= *bound {
                count.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Observe the time elapsed since `start`
    pub fn observe_since(&self, start: Instant) {
        self.observe(start.elapsed().as_secs_f64());
    }

    /// Number of observations
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Format as Prometheus metric
    pub fn to_prometheus(&self) -> String {
        let mut output = format!(
            "# HELP {} {}\n# TYPE {} histogram\n",
            self.name, self.help, self.name
        );

        for (bound, count) in &self.buckets {
            output.push_str(&format!(
                "{}_bucket{{le=\"{}\"}} {}\n",
                self.name,
                bound,
                count.load(Ordering::Relaxed)
            ));
        }
        output.push_str(&format!(
            "{}_bucket{{le=\"+Inf\"}} {}\n",
            self.name,
            self.count()
        ));

        let sum_secs = self.sum_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0;
        output.push_str(&format!("{}_sum {}\n", self.name, sum_secs));
        output.push_str(&format!("{}_count {}\n", self.name, self.count()));

        output
    }
}

/// Standard Lockstep metrics
pub mod standard {
    use super::*;
    use std::sync::LazyLock;

    pub static TASKS_EXECUTED: Counter =
        Counter::new("lockstep_tasks_executed_total", "Tasks run by this worker");

    pub static TASKS_FAILED: Counter =
        Counter::new("lockstep_tasks_failed_total", "Tasks that exited non-zero or failed to start");

    pub static PHASES_COMPLETED: Counter =
        Counter::new("lockstep_phases_completed_total", "Phases this worker finished");

    pub static CURRENT_PHASE: Gauge =
        Gauge::new("lockstep_current_phase", "Phase number currently executing");

    pub static TASK_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
        Histogram::new("lockstep_task_duration_seconds", "Wall time per task")
    });

    pub static BARRIER_WAIT: LazyLock<Histogram> = LazyLock::new(|| {
        Histogram::new(
            "lockstep_barrier_wait_seconds",
            "Time the leader spent waiting for followers after its own batch",
        )
    });
}

/// Gather all standard metrics
pub fn gather_metrics() -> String {
    let mut output = String::new();

    output.push_str(&standard::TASKS_EXECUTED.to_prometheus());
    output.push_str(&standard::TASKS_FAILED.to_prometheus());
    output.push_str(&standard::PHASES_COMPLETED.to_prometheus());
    output.push_str(&standard::CURRENT_PHASE.to_prometheus());
    output.push_str(&standard::TASK_DURATION.to_prometheus());
    output.push_str(&standard::BARRIER_WAIT.to_prometheus());

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter() {
        let counter = Counter::new("test_counter", "Test counter");
        assert_eq!(counter.get(), 0);

        counter.inc();
        counter.inc();
        assert_eq!(counter.get(), 2);
        assert!(counter.to_prometheus().contains("test_counter 2"));
    }

    #[test]
    fn test_histogram() {
        let histogram = Histogram::new("test_histogram", "Test histogram");

        histogram.observe(0.005);
        histogram.observe(2.0);
        histogram.observe(4000.0);

        let prometheus = histogram.to_prometheus();
        assert!(prometheus.contains("test_histogram_count 3"));
        assert!(prometheus.contains("test_histogram_bucket{le=\"0.01\"} 1"));
        assert!(prometheus.contains("test_histogram_bucket{le=\"+Inf\"} 3"));
    }

    #[test]
    fn test_gather_lists_standard_metrics() {
        let output = gather_metrics();
        assert!(output.contains("lockstep_tasks_executed_total"));
        assert!(output.contains("lockstep_barrier_wait_seconds_count"));
    }
}
