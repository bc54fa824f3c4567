use std::sync::RwLock;

use gsm_core::Platform;
use gsm_telemetry::TelemetryLabels;
use serde::Serialize;
use time::OffsetDateTime;

#[derive(Debug, Clone, Default, Serialize)]
pub struct PlatformCounters {
    pub inbound_forwarded: u64,
    pub inbound_forward_errors: u64,
    pub inbound_auth_rejected: u64,
    pub outbound_sent: u64,
    pub outbound_errors: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LastError {
    pub message: String,
    pub at_rfc3339: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    pub slack: PlatformCounters,
    pub teams: PlatformCounters,
    pub last_inbound_error: Option<LastError>,
    pub last_outbound_error: Option<LastError>,
}

/// In-process counters read back verbatim by C13's `/status` handler (C19,
/// §4.19). Guarded by `metrics_lock`; mirrored fire-and-forget through the
/// `metrics` facade crate for any external recorder an operator wires in.
#[derive(Default)]
pub struct Metrics {
    metrics_lock: RwLock<MetricsSnapshot>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.metrics_lock
            .read()
            .unwrap_or_else(|err| err.into_inner())
            .clone()
    }

    fn counters_mut<'a>(
        guard: &'a mut MetricsSnapshot,
        platform: Platform,
    ) -> &'a mut PlatformCounters {
        match platform {
            Platform::Slack => &mut guard.slack,
            Platform::Teams => &mut guard.teams,
        }
    }

    pub fn record_inbound_forwarded(&self, platform: Platform) {
        let mut guard = self.metrics_lock.write().unwrap_or_else(|e| e.into_inner());
        Self::counters_mut(&mut guard, platform).inbound_forwarded += 1;
        drop(guard);
        emit_counter("inbound_forwarded_total", platform);
    }

    pub fn record_inbound_forward_error(&self, platform: Platform, message: impl Into<String>) {
        let mut guard = self.metrics_lock.write().unwrap_or_else(|e| e.into_inner());
        Self::counters_mut(&mut guard, platform).inbound_forward_errors += 1;
        guard.last_inbound_error = Some(LastError {
            message: message.into(),
            at_rfc3339: gsm_core::now_rfc3339(),
        });
        drop(guard);
        emit_counter("inbound_forward_errors_total", platform);
    }

    pub fn record_inbound_auth_rejected(&self, platform: Platform) {
        let mut guard = self.metrics_lock.write().unwrap_or_else(|e| e.into_inner());
        Self::counters_mut(&mut guard, platform).inbound_auth_rejected += 1;
        drop(guard);
        emit_counter("inbound_auth_rejected_total", platform);
    }

    pub fn record_outbound_sent(&self, platform: Platform) {
        let mut guard = self.metrics_lock.write().unwrap_or_else(|e| e.into_inner());
        Self::counters_mut(&mut guard, platform).outbound_sent += 1;
        drop(guard);
        emit_counter("outbound_sent_total", platform);
    }

    pub fn record_outbound_error(&self, platform: Platform, message: impl Into<String>) {
        let mut guard = self.metrics_lock.write().unwrap_or_else(|e| e.into_inner());
        Self::counters_mut(&mut guard, platform).outbound_errors += 1;
        guard.last_outbound_error = Some(LastError {
            message: message.into(),
            at_rfc3339: gsm_core::now_rfc3339(),
        });
        drop(guard);
        emit_counter("outbound_errors_total", platform);
    }
}

fn emit_counter(name: &'static str, platform: Platform) {
    let labels = TelemetryLabels {
        account_id: String::new(),
        platform: Some(platform.as_str().to_string()),
        chat_id: None,
        msg_id: None,
        extra: Vec::new(),
    };
    gsm_telemetry::record_counter(name, 1, &labels);
}

/// Snapshot shape describing auxiliary store sizes, also surfaced by `/status`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreSizes {
    pub conversation_refs: usize,
    pub polls: usize,
    pub dedupe_keys: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment_per_platform() {
        let metrics = Metrics::new();
        metrics.record_inbound_forwarded(Platform::Slack);
        metrics.record_inbound_forwarded(Platform::Slack);
        metrics.record_outbound_error(Platform::Teams, "boom");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.slack.inbound_forwarded, 2);
        assert_eq!(snapshot.teams.outbound_errors, 1);
        assert_eq!(
            snapshot.last_outbound_error.unwrap().message,
            "boom".to_string()
        );
    }
}
