use std::sync::atomic::{AtomicU64, AtomicU32, Ordering::Relaxed};

/// Process-wide diagnostic counters. Additive only — nothing here is ever
/// observable by a connected client, it exists for operators tailing logs
/// or scraping a future metrics endpoint.
#[derive(Default)]
pub struct Metrics {
    pub translations_total: AtomicU64,
    pub translations_sla_violations: AtomicU64,
    pub translate_identifiers_total: AtomicU64,
    pub translate_nanos_total: AtomicU64,
    pub pool_leases_total: AtomicU64,
    pub pool_lease_timeouts: AtomicU64,
    pub pool_health_check_failures: AtomicU64,
    pub pool_connections_recycled: AtomicU64,
    pub pool_in_use: AtomicU32,
    pub sessions_active: AtomicU32,
    pub cancellations_total: AtomicU64,
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            translations_total: AtomicU64::new(0),
            translations_sla_violations: AtomicU64::new(0),
            translate_identifiers_total: AtomicU64::new(0),
            translate_nanos_total: AtomicU64::new(0),
            pool_leases_total: AtomicU64::new(0),
            pool_lease_timeouts: AtomicU64::new(0),
            pool_health_check_failures: AtomicU64::new(0),
            pool_connections_recycled: AtomicU64::new(0),
            pool_in_use: AtomicU32::new(0),
            sessions_active: AtomicU32::new(0),
            cancellations_total: AtomicU64::new(0),
        }
    }

    pub fn record_translation(&self, num_identifiers: usize, elapsed_nanos: u64, sla_nanos: u64) {
        self.translations_total.fetch_add(1, Relaxed);
        self.translate_identifiers_total.fetch_add(num_identifiers as u64, Relaxed);
        self.translate_nanos_total.fetch_add(elapsed_nanos, Relaxed);
        if elapsed_nanos > sla_nanos {
            self.translations_sla_violations.fetch_add(1, Relaxed);
        }
    }
}

/// The single process-wide metrics instance.
pub static METRICS: Metrics = Metrics::new();
