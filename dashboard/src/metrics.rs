use lazy_static::lazy_static;
use prometheus::{Counter, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder};
use tracing::error;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref POLLS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "dashboard_polls_total",
        "Total tag polls started"
    ))
    .expect("valid metric options");
    pub static ref POLL_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "dashboard_poll_failures_total",
        "Total tag polls that failed"
    ))
    .expect("valid metric options");
    pub static ref STALE_RESPONSES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "dashboard_stale_responses_total",
        "Poll results discarded because the selection changed"
    ))
    .expect("valid metric options");
    pub static ref POLL_LATENCY_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "dashboard_poll_latency_seconds",
            "Time taken to fetch and derive one site"
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0])
    )
    .expect("valid metric options");
    pub static ref MARKERS: Gauge = Gauge::with_opts(Opts::new(
        "dashboard_markers",
        "Markers derived by the latest poll"
    ))
    .expect("valid metric options");
    pub static ref ACTIVE_ALERTS: Gauge = Gauge::with_opts(Opts::new(
        "dashboard_active_alerts",
        "Alerts currently inside the alert window"
    ))
    .expect("valid metric options");
}

pub fn init_metrics() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(POLLS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(POLL_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(STALE_RESPONSES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(POLL_LATENCY_SECONDS.clone()))?;
    REGISTRY.register(Box::new(MARKERS.clone()))?;
    REGISTRY.register(Box::new(ACTIVE_ALERTS.clone()))?;
    Ok(())
}

pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
