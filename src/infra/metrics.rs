//! Lock-free metrics collection and periodic reporting
//!
//! Counters are atomics updated from the scanning-engine callback path and the
//! broadcaster task. All atomics use Relaxed ordering; these are statistical
//! counters only and must not be used for coordination.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Apply latency bucket boundaries (microseconds)
/// Buckets: ≤10, ≤20, ≤40, ≤80, ≤160, ≤320, ≤640, ≤1280, ≤2560, ≤5120, >5120
const BUCKET_BOUNDS: [u64; 10] = [10, 20, 40, 80, 160, 320, 640, 1280, 2560, 5120];
const NUM_BUCKETS: usize = 11;

pub const METRICS_BUCKET_BOUNDS: [u64; 10] = BUCKET_BOUNDS;
pub const METRICS_NUM_BUCKETS: usize = NUM_BUCKETS;

#[inline]
fn bucket_index(latency_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

#[inline]
fn load_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.load(Ordering::Relaxed);
    }
    result
}

/// Lock-free metrics collector
pub struct Metrics {
    callbacks_total: AtomicU64,
    unknown_region_total: AtomicU64,
    duplicates_suppressed_total: AtomicU64,
    state_determined_total: AtomicU64,
    enters_total: AtomicU64,
    exits_total: AtomicU64,
    publish_ok_total: AtomicU64,
    publish_failed_total: AtomicU64,
    resolution_miss_total: AtomicU64,
    notifications_total: AtomicU64,
    rebuilds_total: AtomicU64,
    registry_errors_total: AtomicU64,
    /// Regions in the installed set (gauge)
    regions_watched: AtomicU64,
    /// Beacons currently in range (gauge)
    beacons_in_range: AtomicU64,
    apply_latency_buckets: [AtomicU64; NUM_BUCKETS],
    apply_latency_sum_us: AtomicU64,
    apply_latency_max_us: AtomicU64,
    started_at: Instant,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            callbacks_total: AtomicU64::new(0),
            unknown_region_total: AtomicU64::new(0),
            duplicates_suppressed_total: AtomicU64::new(0),
            state_determined_total: AtomicU64::new(0),
            enters_total: AtomicU64::new(0),
            exits_total: AtomicU64::new(0),
            publish_ok_total: AtomicU64::new(0),
            publish_failed_total: AtomicU64::new(0),
            resolution_miss_total: AtomicU64::new(0),
            notifications_total: AtomicU64::new(0),
            rebuilds_total: AtomicU64::new(0),
            registry_errors_total: AtomicU64::new(0),
            regions_watched: AtomicU64::new(0),
            beacons_in_range: AtomicU64::new(0),
            apply_latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            apply_latency_sum_us: AtomicU64::new(0),
            apply_latency_max_us: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    #[inline]
    pub fn record_callback(&self) {
        self.callbacks_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_unknown_region(&self) {
        self.unknown_region_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_duplicate_suppressed(&self) {
        self.duplicates_suppressed_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_state_determined(&self) {
        self.state_determined_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_enter(&self) {
        self.enters_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_exit(&self) {
        self.exits_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_publish(&self, ok: bool) {
        if ok {
            self.publish_ok_total.fetch_add(1, Ordering::Relaxed);
        } else {
            self.publish_failed_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_resolution_miss(&self) {
        self.resolution_miss_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_notification(&self) {
        self.notifications_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a registry rebuild with its outcome
    pub fn record_rebuild(&self, regions: usize, errors: usize) {
        self.rebuilds_total.fetch_add(1, Ordering::Relaxed);
        self.registry_errors_total.fetch_add(errors as u64, Ordering::Relaxed);
        self.regions_watched.store(regions as u64, Ordering::Relaxed);
        self.beacons_in_range.store(0, Ordering::Relaxed);
    }

    #[inline]
    pub fn set_beacons_in_range(&self, count: usize) {
        self.beacons_in_range.store(count as u64, Ordering::Relaxed);
    }

    /// Record time spent inside the mutation lock for one event
    #[inline]
    pub fn record_apply_latency(&self, latency_us: u64) {
        self.apply_latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        self.apply_latency_buckets[bucket_index(latency_us)].fetch_add(1, Ordering::Relaxed);
        update_atomic_max(&self.apply_latency_max_us, latency_us);
    }

    pub fn publish_failed_total(&self) -> u64 {
        self.publish_failed_total.load(Ordering::Relaxed)
    }

    pub fn duplicates_suppressed_total(&self) -> u64 {
        self.duplicates_suppressed_total.load(Ordering::Relaxed)
    }

    pub fn unknown_region_total(&self) -> u64 {
        self.unknown_region_total.load(Ordering::Relaxed)
    }

    /// Take a snapshot of all counters
    ///
    /// Counters are monotonic; nothing is reset by reporting.
    pub fn report(&self) -> MetricsSummary {
        let apply_lat_buckets = load_buckets(&self.apply_latency_buckets);
        let applied: u64 = apply_lat_buckets.iter().sum();
        let sum = self.apply_latency_sum_us.load(Ordering::Relaxed);
        MetricsSummary {
            uptime_secs: self.started_at.elapsed().as_secs(),
            callbacks_total: self.callbacks_total.load(Ordering::Relaxed),
            unknown_region_total: self.unknown_region_total.load(Ordering::Relaxed),
            duplicates_suppressed_total: self.duplicates_suppressed_total.load(Ordering::Relaxed),
            state_determined_total: self.state_determined_total.load(Ordering::Relaxed),
            enters_total: self.enters_total.load(Ordering::Relaxed),
            exits_total: self.exits_total.load(Ordering::Relaxed),
            publish_ok_total: self.publish_ok_total.load(Ordering::Relaxed),
            publish_failed_total: self.publish_failed_total.load(Ordering::Relaxed),
            resolution_miss_total: self.resolution_miss_total.load(Ordering::Relaxed),
            notifications_total: self.notifications_total.load(Ordering::Relaxed),
            rebuilds_total: self.rebuilds_total.load(Ordering::Relaxed),
            registry_errors_total: self.registry_errors_total.load(Ordering::Relaxed),
            regions_watched: self.regions_watched.load(Ordering::Relaxed),
            beacons_in_range: self.beacons_in_range.load(Ordering::Relaxed),
            apply_lat_buckets,
            apply_lat_sum_us: sum,
            apply_lat_avg_us: if applied > 0 { sum / applied } else { 0 },
            apply_lat_max_us: self.apply_latency_max_us.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the metrics
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub uptime_secs: u64,
    pub callbacks_total: u64,
    pub unknown_region_total: u64,
    pub duplicates_suppressed_total: u64,
    pub state_determined_total: u64,
    pub enters_total: u64,
    pub exits_total: u64,
    pub publish_ok_total: u64,
    pub publish_failed_total: u64,
    pub resolution_miss_total: u64,
    pub notifications_total: u64,
    pub rebuilds_total: u64,
    pub registry_errors_total: u64,
    pub regions_watched: u64,
    pub beacons_in_range: u64,
    pub apply_lat_buckets: [u64; NUM_BUCKETS],
    pub apply_lat_sum_us: u64,
    pub apply_lat_avg_us: u64,
    pub apply_lat_max_us: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            uptime_secs = %self.uptime_secs,
            callbacks = %self.callbacks_total,
            unknown = %self.unknown_region_total,
            duplicates = %self.duplicates_suppressed_total,
            enters = %self.enters_total,
            exits = %self.exits_total,
            publish_ok = %self.publish_ok_total,
            publish_failed = %self.publish_failed_total,
            resolution_miss = %self.resolution_miss_total,
            notifications = %self.notifications_total,
            regions = %self.regions_watched,
            in_range = %self.beacons_in_range,
            apply_avg_us = %self.apply_lat_avg_us,
            apply_max_us = %self.apply_lat_max_us,
            "metrics"
        );
    }
}
