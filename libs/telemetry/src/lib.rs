//! Lightweight facade around tracing setup for the messaging bridge.
//!
//! ```no_run
//! use gsm_telemetry::{init_telemetry, TelemetryConfig};
//!
//! # fn main() -> anyhow::Result<()> {
//! let cfg = TelemetryConfig::from_env("bridge", "0.1.0");
//! init_telemetry(cfg)?;
//! tracing::info!("telemetry configured");
//! Ok(())
//! # }
//! ```

mod config;
mod context;
mod metrics;
mod tracing_init;

pub use config::TelemetryConfig;
pub use context::{MessageContext, TelemetryLabels};
pub use metrics::{record_counter, record_gauge, record_histogram};
pub use tracing_init::{init_telemetry, telemetry_enabled, with_common_fields};

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::{Mutex, MutexGuard, OnceLock};

    pub fn env_lock() -> &'static Mutex<()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
    }

    pub fn env_guard() -> MutexGuard<'static, ()> {
        env_lock().lock().unwrap_or_else(|err| err.into_inner())
    }
}

#[macro_export]
macro_rules! counter {
    ($name:expr, $value:expr, $labels:expr) => {{
        $crate::record_counter($name, $value, $labels)
    }};
}

#[macro_export]
macro_rules! histogram {
    ($name:expr, $value:expr, $labels:expr) => {{
        $crate::record_histogram($name, $value, $labels)
    }};
}

#[macro_export]
macro_rules! gauge {
    ($name:expr, $value:expr, $labels:expr) => {{
        $crate::record_gauge($name, $value, $labels)
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::env_guard;

    #[test]
    fn config_defaults_to_pretty_logs() {
        let _guard = env_guard();
        std::env::remove_var("LOG_FORMAT");
        let cfg = TelemetryConfig::from_env("test-service", "0.0.1");
        assert_eq!(cfg.service_name, "test-service");
        assert!(!cfg.json_logs);
    }

    #[test]
    fn config_honors_json_log_format() {
        let _guard = env_guard();
        std::env::set_var("LOG_FORMAT", "json");
        let cfg = TelemetryConfig::from_env("svc", "1.2.3");
        assert!(cfg.json_logs);
        std::env::remove_var("LOG_FORMAT");
    }

    #[test]
    fn init_is_idempotent() {
        let _guard = env_guard();
        let cfg = TelemetryConfig::from_env("svc", "1.0.0");
        init_telemetry(cfg.clone()).expect("init should succeed");
        init_telemetry(cfg).expect("second init should be a no-op");
        assert!(telemetry_enabled());
    }
}
