use crate::context::TelemetryLabels;

/// Mirrors a counter increment through the `metrics` facade so an operator
/// can wire in whatever recorder they like. Never the source of truth for
/// `/status` — that reads the bridge's own guarded counters.
pub fn record_counter(name: &'static str, value: u64, labels: &TelemetryLabels) {
    metrics::counter!(
        name,
        "account_id" => labels.account_id.clone(),
        "platform" => labels.platform.clone().unwrap_or_default(),
    )
    .increment(value);
}

pub fn record_histogram(name: &'static str, value: f64, labels: &TelemetryLabels) {
    metrics::histogram!(
        name,
        "account_id" => labels.account_id.clone(),
        "platform" => labels.platform.clone().unwrap_or_default(),
    )
    .record(value);
}

pub fn record_gauge(name: &'static str, value: i64, labels: &TelemetryLabels) {
    metrics::gauge!(
        name,
        "account_id" => labels.account_id.clone(),
        "platform" => labels.platform.clone().unwrap_or_default(),
    )
    .set(value as f64);
}
