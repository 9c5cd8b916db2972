//! Prometheus metrics for the deployment webhook
//!
//! All metrics live in a dedicated registry exposed through the optional
//! metrics route.

use lazy_static::lazy_static;
use prometheus::{
    opts, register_histogram_vec_with_registry, register_int_counter_vec_with_registry,
    register_int_counter_with_registry, register_int_gauge_with_registry, Encoder, HistogramVec,
    IntCounter, IntCounterVec, IntGauge, Registry, TextEncoder,
};
use tracing::debug;

lazy_static! {
    /// Registry for all deployhook metrics
    pub static ref REGISTRY: Registry = Registry::new();

    /// Deploy requests by outcome (requested, succeeded, failed)
    pub static ref DEPLOYS_TOTAL: IntCounterVec = register_int_counter_vec_with_registry!(
        opts!("deployhook_deploys_total", "Total number of deploy requests by outcome"),
        &["outcome"],
        REGISTRY
    )
    .expect("Failed to create deployhook_deploys_total metric");

    /// Deployment script duration in seconds by outcome
    pub static ref DEPLOY_DURATION_SECONDS: HistogramVec = register_histogram_vec_with_registry!(
        "deployhook_deploy_duration_seconds",
        "Time spent running the deployment script",
        &["outcome"],
        vec![0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0],
        REGISTRY
    )
    .expect("Failed to create deployhook_deploy_duration_seconds metric");

    /// Deployment scripts currently running
    pub static ref DEPLOYS_ACTIVE: IntGauge = register_int_gauge_with_registry!(
        opts!("deployhook_deploys_active", "Deployment scripts currently running"),
        REGISTRY
    )
    .expect("Failed to create deployhook_deploys_active metric");

    /// Requests rejected by the bearer gate
    /// Labels: reason (unauthorized, forbidden)
    pub static ref AUTH_REJECTIONS_TOTAL: IntCounterVec = register_int_counter_vec_with_registry!(
        opts!("deployhook_auth_rejections_total", "Requests rejected by bearer authentication"),
        &["reason"],
        REGISTRY
    )
    .expect("Failed to create deployhook_auth_rejections_total metric");

    /// Audit records that could not be written
    pub static ref AUDIT_WRITE_FAILURES_TOTAL: IntCounter = register_int_counter_with_registry!(
        opts!("deployhook_audit_write_failures_total", "Audit log appends that failed"),
        REGISTRY
    )
    .expect("Failed to create deployhook_audit_write_failures_total metric");
}

/// Force registration of every metric so the first scrape lists them all
pub fn init_metrics() {
    lazy_static::initialize(&DEPLOYS_TOTAL);
    lazy_static::initialize(&DEPLOY_DURATION_SECONDS);
    lazy_static::initialize(&DEPLOYS_ACTIVE);
    lazy_static::initialize(&AUTH_REJECTIONS_TOTAL);
    lazy_static::initialize(&AUDIT_WRITE_FAILURES_TOTAL);

    debug!("Prometheus metrics registry initialized");
}

/// Record an accepted deploy request
pub fn record_deploy_requested() {
    DEPLOYS_TOTAL.with_label_values(&["requested"]).inc();
}

/// Record the end of a deployment script run
pub fn record_deploy_complete(succeeded: bool, duration_ms: u64) {
    let outcome = if succeeded { "succeeded" } else { "failed" };

    DEPLOYS_TOTAL.with_label_values(&[outcome]).inc();
    DEPLOY_DURATION_SECONDS
        .with_label_values(&[outcome])
        .observe(duration_ms as f64 / 1000.0);

    debug!(
        outcome = %outcome,
        duration_ms = duration_ms,
        "Recorded deployment completion metric"
    );
}

/// Record a request rejected by the bearer gate
pub fn record_auth_rejection(reason: &str) {
    AUTH_REJECTIONS_TOTAL.with_label_values(&[reason]).inc();
}

/// Record a failed audit append
pub fn record_audit_write_failure() {
    AUDIT_WRITE_FAILURES_TOTAL.inc();
}

/// Gather all metrics and encode them in Prometheus text format
pub fn gather_metrics() -> Result<String, String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| format!("Failed to encode metrics: {}", e))?;

    String::from_utf8(buffer).map_err(|e| format!("Failed to convert metrics to UTF-8: {}", e))
}

/// Tracks a running deployment script; decrements the gauge when dropped
pub struct ActiveDeployGuard;

impl ActiveDeployGuard {
    pub fn new() -> Self {
        DEPLOYS_ACTIVE.inc();
        Self
    }
}

impl Default for ActiveDeployGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ActiveDeployGuard {
    fn drop(&mut self) {
        DEPLOYS_ACTIVE.dec();
    }
}
