use std::net::SocketAddr;

use crate::admission::AdmissionError;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total admission attempts. Labels: outcome.
pub const ADMISSIONS_TOTAL: &str = "venued_admissions_total";

/// Histogram: admission latency in seconds.
pub const ADMISSION_DURATION_SECONDS: &str = "venued_admission_duration_seconds";

/// Counter: total booking cancellations.
pub const CANCELLATIONS_TOTAL: &str = "venued_cancellations_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: number of active tenants (loaded ledgers).
pub const TENANTS_ACTIVE: &str = "venued_tenants_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "venued_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "venued_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}

/// Outcome label for the admissions counter.
pub fn admission_label(outcome: Result<(), &AdmissionError>) -> &'static str {
    match outcome {
        Ok(()) => "admitted",
        Err(AdmissionError::MissingFields(_)) => "missing_fields",
        Err(AdmissionError::InvalidDateTime { .. }) => "invalid_datetime",
        Err(AdmissionError::InvalidDuration(_)) => "invalid_duration",
        Err(AdmissionError::InvalidAmount) => "invalid_amount",
        Err(AdmissionError::InvalidStatus(_)) => "invalid_status",
        Err(AdmissionError::InvalidBookingType(_)) => "invalid_booking_type",
        Err(AdmissionError::VenueNotFound) => "venue_not_found",
        Err(AdmissionError::SlotConflict) => "slot_conflict",
        Err(AdmissionError::Persistence(_)) => "persistence_failure",
    }
}
