use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, Gauge, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all bridge metrics
const PREFIX: &str = "capability_bridge";

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_http_requests_total"), "Total number of HTTP requests"),
        &["method", "path", "status"]
    ).expect("Failed to create http_requests_total metric");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_http_request_duration_seconds"),
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["method", "path"]
    ).expect("Failed to create http_request_duration_seconds metric");

    // Tools
    pub static ref TOOL_INVOCATIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_tool_invocations_total"), "Tool invocations by outcome"),
        &["tool", "outcome"]
    ).expect("Failed to create tool_invocations_total metric");

    pub static ref TOOL_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_tool_duration_seconds"),
            "Tool invocation duration in seconds"
        )
        .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
        &["tool"]
    ).expect("Failed to create tool_duration_seconds metric");

    // Backend
    pub static ref BACKEND_CALLS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_backend_calls_total"), "Backend calls by outcome"),
        &["outcome"]
    ).expect("Failed to create backend_calls_total metric");

    pub static ref BACKEND_CALL_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_backend_call_duration_seconds"),
            "Backend call duration in seconds, retries included"
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
        &["outcome"]
    ).expect("Failed to create backend_call_duration_seconds metric");

    pub static ref BACKEND_RETRIES_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_backend_retries_total"), "Retries performed by successful backend calls"),
        &[]
    ).expect("Failed to create backend_retries_total metric");

    // Catalog
    pub static ref CATALOG_ENTRIES: GaugeVec = GaugeVec::new(
        Opts::new(format!("{PREFIX}_catalog_entries"), "Entries in the catalog index"),
        &["type"]
    ).expect("Failed to create catalog_entries metric");

    // Session
    pub static ref SESSION_STATE: GaugeVec = GaugeVec::new(
        Opts::new(format!("{PREFIX}_session_state"), "1 for the current session state, 0 otherwise"),
        &["state"]
    ).expect("Failed to create session_state metric");

    pub static ref PROCESS_MEMORY_BYTES: Gauge = Gauge::new(
        format!("{PREFIX}_process_memory_bytes"),
        "Resident memory of the process in bytes"
    ).expect("Failed to create process_memory_bytes metric");
}

pub const SESSION_STATES: &[&str] = &[
    "none",
    "created",
    "initializing",
    "ready",
    "shutting_down",
    "closed",
];

/// Register every metric. Safe to call more than once.
pub fn init_metrics() {
    let _ = REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(TOOL_INVOCATIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(TOOL_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(BACKEND_CALLS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(BACKEND_CALL_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(BACKEND_RETRIES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(CATALOG_ENTRIES.clone()));
    let _ = REGISTRY.register(Box::new(SESSION_STATE.clone()));
    let _ = REGISTRY.register(Box::new(PROCESS_MEMORY_BYTES.clone()));

    set_session_state("none");
    tracing::debug!("Metrics registered");
}

pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration.as_secs_f64());
}

pub fn record_tool_invocation(tool: &str, outcome: &str, duration: Duration) {
    TOOL_INVOCATIONS_TOTAL
        .with_label_values(&[tool, outcome])
        .inc();
    TOOL_DURATION_SECONDS
        .with_label_values(&[tool])
        .observe(duration.as_secs_f64());
}

pub fn record_backend_call(outcome: &str, duration: Duration) {
    BACKEND_CALLS_TOTAL.with_label_values(&[outcome]).inc();
    BACKEND_CALL_DURATION_SECONDS
        .with_label_values(&[outcome])
        .observe(duration.as_secs_f64());
}

pub fn record_backend_retries(retries: u32) {
    if retries > 0 {
        BACKEND_RETRIES_TOTAL
            .with_label_values(&[])
            .inc_by(retries as f64);
    }
}

pub fn set_catalog_entries(kind: &str, count: usize) {
    CATALOG_ENTRIES.with_label_values(&[kind]).set(count as f64);
}

/// Mark `state` as the current session state.
pub fn set_session_state(state: &str) {
    for s in SESSION_STATES {
        SESSION_STATE
            .with_label_values(&[s])
            .set(if *s == state { 1.0 } else { 0.0 });
    }
}

/// Resident set size of this process, when the platform exposes it.
pub fn resident_memory_bytes() -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        let status = std::fs::read_to_string("/proc/self/status").ok()?;
        let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
        let kb: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
        Some(kb * 1024)
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    if let Some(bytes) = resident_memory_bytes() {
        PROCESS_MEMORY_BYTES.set(bytes as f64);
    }

    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_default();
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}
