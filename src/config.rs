//! Queue and sampler configuration types

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default worker count per queue
pub const DEFAULT_WORKER_COUNT: usize = 2;
/// Default per-slot queue capacity
pub const DEFAULT_CAPACITY: usize = 10_000;
/// Default occupancy ratio above which a queue stops admitting
pub const DEFAULT_WARNING_THRESHOLD: f64 = 0.8;
/// Default number of throughput snapshots retained per queue
pub const DEFAULT_HISTORY_DEPTH: usize = 30;

/// Per-queue configuration
///
/// Non-positive worker count or capacity is corrected to the default at
/// [`DispatchQueue::start`](crate::queue::DispatchQueue::start) rather than
/// rejected, so a zeroed config is always usable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueConfig {
    /// Number of worker tasks and physical slots
    pub worker_count: usize,
    /// Bounded capacity of each physical slot
    pub capacity: usize,
    /// Occupancy ratio (size / capacity) above which `is_admissible` is false
    pub warning_threshold: f64,
    /// Depth of the per-queue snapshot ring buffer
    pub history_depth: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            capacity: DEFAULT_CAPACITY,
            warning_threshold: DEFAULT_WARNING_THRESHOLD,
            history_depth: DEFAULT_HISTORY_DEPTH,
        }
    }
}

impl QueueConfig {
    /// Create a configuration with the given worker count and capacity
    pub fn new(worker_count: usize, capacity: usize) -> Self {
        Self {
            worker_count,
            capacity,
            ..Self::default()
        }
    }

    /// Create a configuration sized to the available CPU cores
    pub fn auto() -> Self {
        Self {
            worker_count: num_cpus::get(),
            ..Self::default()
        }
    }

    /// Set the admissibility threshold (builder pattern)
    pub fn with_warning_threshold(mut self, threshold: f64) -> Self {
        self.warning_threshold = threshold;
        self
    }

    /// Set the snapshot history depth (builder pattern)
    pub fn with_history_depth(mut self, depth: usize) -> Self {
        self.history_depth = depth;
        self
    }

    /// Apply defaults to non-positive fields, as the queue does at start
    pub(crate) fn normalized(mut self) -> Self {
        if self.worker_count == 0 {
            self.worker_count = DEFAULT_WORKER_COUNT;
        }
        if self.capacity == 0 {
            self.capacity = DEFAULT_CAPACITY;
        }
        if self.history_depth == 0 {
            self.history_depth = DEFAULT_HISTORY_DEPTH;
        }
        self
    }
}

/// Periodic sampler configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SamplerConfig {
    /// Interval between snapshot ticks
    #[serde(with = "duration_serde")]
    pub period: Duration,
    /// Delay before the first tick
    #[serde(with = "duration_serde")]
    pub initial_delay: Duration,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(5),
            initial_delay: Duration::from_secs(10),
        }
    }
}

impl SamplerConfig {
    /// Create a sampler configuration with the given period and initial delay
    pub fn new(period: Duration, initial_delay: Duration) -> Self {
        Self {
            period,
            initial_delay,
        }
    }

    /// Set the sampling period (builder pattern)
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Set the initial delay (builder pattern)
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_config_default() {
        let config = QueueConfig::default();
        assert_eq!(config.worker_count, 2);
        assert_eq!(config.capacity, 10_000);
        assert_eq!(config.warning_threshold, 0.8);
        assert_eq!(config.history_depth, 30);
    }

    #[test]
    fn test_queue_config_new() {
        let config = QueueConfig::new(4, 500);
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.capacity, 500);
        assert_eq!(config.warning_threshold, 0.8);
    }

    #[test]
    fn test_queue_config_auto_uses_cores() {
        let config = QueueConfig::auto();
        assert!(config.worker_count >= 1);
        assert_eq!(config.capacity, 10_000);
    }

    #[test]
    fn test_queue_config_builders() {
        let config = QueueConfig::new(3, 100)
            .with_warning_threshold(0.5)
            .with_history_depth(10);
        assert_eq!(config.warning_threshold, 0.5);
        assert_eq!(config.history_depth, 10);
    }

    #[test]
    fn test_queue_config_normalized_zeroes() {
        let config = QueueConfig {
            worker_count: 0,
            capacity: 0,
            warning_threshold: 0.8,
            history_depth: 0,
        }
        .normalized();
        assert_eq!(config.worker_count, DEFAULT_WORKER_COUNT);
        assert_eq!(config.capacity, DEFAULT_CAPACITY);
        assert_eq!(config.history_depth, DEFAULT_HISTORY_DEPTH);
    }

    #[test]
    fn test_queue_config_normalized_keeps_values() {
        let config = QueueConfig::new(7, 42).normalized();
        assert_eq!(config.worker_count, 7);
        assert_eq!(config.capacity, 42);
    }

    #[test]
    fn test_queue_config_serialization() {
        let config = QueueConfig::new(2, 10);
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"worker_count\":2"));
        assert!(json.contains("\"capacity\":10"));

        let parsed: QueueConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_sampler_config_default() {
        let config = SamplerConfig::default();
        assert_eq!(config.period, Duration::from_secs(5));
        assert_eq!(config.initial_delay, Duration::from_secs(10));
    }

    #[test]
    fn test_sampler_config_builders() {
        let config = SamplerConfig::default()
            .with_period(Duration::from_millis(50))
            .with_initial_delay(Duration::ZERO);
        assert_eq!(config.period, Duration::from_millis(50));
        assert_eq!(config.initial_delay, Duration::ZERO);
    }

    #[test]
    fn test_sampler_config_duration_as_millis() {
        let config = SamplerConfig::new(Duration::from_secs(5), Duration::from_secs(10));
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"period\":5000"));
        assert!(json.contains("\"initial_delay\":10000"));

        let parsed: SamplerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
