//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `secret_lease_events_total` - Pod lifecycle events handled
//! - `secret_lease_event_exceptions_total` - Events that failed as a whole
//! - `secret_lease_event_duration_seconds` - Time spent handling one event
//! - `secret_lease_parameter_failures_total` - Parameters that failed, by kind
//! - `secret_lease_secrets_created_total` - Secret values written to the store
//! - `secret_lease_leases_assigned_total` - Lease slots assigned
//! - `secret_lease_leases_released_total` - Lease slots released
//! - `secret_lease_cache_hits_total` - Parameters skipped by the dedup cache
//! - `secret_lease_storage_operation_duration_seconds` - Store call latency, by operation
//! - `secret_lease_storage_operation_errors_total` - Failed store calls, by operation

use anyhow::Result;
use prometheus::{Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry};
use std::sync::LazyLock;

// Metrics
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static EVENTS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("secret_lease_events_total", "Total number of pod events handled")
        .expect("Failed to create EVENTS_TOTAL metric - this should never happen")
});

static EVENT_EXCEPTIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "secret_lease_event_exceptions_total",
        "Total number of pod events that failed as a whole",
    )
    .expect("Failed to create EVENT_EXCEPTIONS_TOTAL metric - this should never happen")
});

static EVENT_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "secret_lease_event_duration_seconds",
            "Duration of pod event handling in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
    )
    .expect("Failed to create EVENT_DURATION metric - this should never happen")
});

static PARAMETER_FAILURES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "secret_lease_parameter_failures_total",
            "Total number of parameters that could not be handled",
        ),
        &["kind"],
    )
    .expect("Failed to create PARAMETER_FAILURES_TOTAL metric - this should never happen")
});

static SECRETS_CREATED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "secret_lease_secrets_created_total",
        "Total number of secret values written to the store",
    )
    .expect("Failed to create SECRETS_CREATED_TOTAL metric - this should never happen")
});

static LEASES_ASSIGNED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("secret_lease_leases_assigned_total", "Total number of lease slots assigned")
        .expect("Failed to create LEASES_ASSIGNED_TOTAL metric - this should never happen")
});

static LEASES_RELEASED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("secret_lease_leases_released_total", "Total number of lease slots released")
        .expect("Failed to create LEASES_RELEASED_TOTAL metric - this should never happen")
});

static CACHE_HITS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "secret_lease_cache_hits_total",
        "Total number of parameters skipped by the dedup cache",
    )
    .expect("Failed to create CACHE_HITS_TOTAL metric - this should never happen")
});

static STORAGE_OPERATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "secret_lease_storage_operation_duration_seconds",
            "Duration of backing store calls in seconds",
        )
        .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        &["operation"],
    )
    .expect("Failed to create STORAGE_OPERATION_DURATION metric - this should never happen")
});

static STORAGE_OPERATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "secret_lease_storage_operation_errors_total",
            "Total number of failed backing store calls",
        ),
        &["operation"],
    )
    .expect("Failed to create STORAGE_OPERATION_ERRORS_TOTAL metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(EVENTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(EVENT_EXCEPTIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(EVENT_DURATION.clone()))?;
    REGISTRY.register(Box::new(PARAMETER_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SECRETS_CREATED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(LEASES_ASSIGNED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(LEASES_RELEASED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CACHE_HITS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(STORAGE_OPERATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(STORAGE_OPERATION_ERRORS_TOTAL.clone()))?;

    Ok(())
}

pub fn increment_events() {
    EVENTS_TOTAL.inc();
}

pub fn increment_event_exceptions() {
    EVENT_EXCEPTIONS_TOTAL.inc();
}

pub fn observe_event_duration(duration: f64) {
    EVENT_DURATION.observe(duration);
}

pub fn increment_parameter_failures(kind: &str) {
    PARAMETER_FAILURES_TOTAL.with_label_values(&[kind]).inc();
}

pub fn increment_secrets_created(count: u64) {
    SECRETS_CREATED_TOTAL.inc_by(count);
}

pub fn increment_leases_assigned() {
    LEASES_ASSIGNED_TOTAL.inc();
}

pub fn increment_leases_released() {
    LEASES_RELEASED_TOTAL.inc();
}

pub fn increment_cache_hits() {
    CACHE_HITS_TOTAL.inc();
}

pub fn record_storage_operation(operation: &str, duration: f64) {
    STORAGE_OPERATION_DURATION
        .with_label_values(&[operation])
        .observe(duration);
}

pub fn increment_storage_operation_errors(operation: &str) {
    STORAGE_OPERATION_ERRORS_TOTAL
        .with_label_values(&[operation])
        .inc();
}

/// Events handled since start, for the health endpoint.
#[must_use]
pub fn events_total() -> u64 {
    EVENTS_TOTAL.get()
}

/// Failed events since start, for the health endpoint.
#[must_use]
pub fn event_exceptions_total() -> u64 {
    EVENT_EXCEPTIONS_TOTAL.get()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_metrics() {
        // This should not panic - metrics should register successfully
        assert!(register_metrics().is_ok());
    }

    #[test]
    fn test_increment_events() {
        let before = events_total();
        increment_events();
        assert!(events_total() > before);
    }

    #[test]
    fn test_increment_event_exceptions() {
        let before = event_exceptions_total();
        increment_event_exceptions();
        assert!(event_exceptions_total() > before);
    }

    #[test]
    fn test_parameter_failures_by_kind() {
        let before = PARAMETER_FAILURES_TOTAL.with_label_values(&["lease"]).get();
        increment_parameter_failures("lease");
        let after = PARAMETER_FAILURES_TOTAL.with_label_values(&["lease"]).get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_secrets_created_by_count() {
        let before = SECRETS_CREATED_TOTAL.get();
        increment_secrets_created(3);
        assert!(SECRETS_CREATED_TOTAL.get() >= before + 3);
    }

    #[test]
    fn test_record_storage_operation() {
        let before = STORAGE_OPERATION_DURATION
            .with_label_values(&["put"])
            .get_sample_count();
        record_storage_operation("put", 0.02);
        let after = STORAGE_OPERATION_DURATION
            .with_label_values(&["put"])
            .get_sample_count();
        assert!(after > before);
    }
}
