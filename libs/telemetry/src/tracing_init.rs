use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use anyhow::Result;
use tracing::Span;
use tracing_subscriber::layer::Layer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::TelemetryConfig;

static INIT: OnceLock<()> = OnceLock::new();
static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Installs the process-wide tracing subscriber. Safe to call more than once;
/// only the first call takes effect.
pub fn init_telemetry(cfg: TelemetryConfig) -> Result<()> {
    if INIT.get().is_some() {
        return Ok(());
    }

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = if cfg.json_logs {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .ok();

    INITIALIZED.store(true, Ordering::SeqCst);
    INIT.set(()).ok();
    Ok(())
}

pub fn telemetry_enabled() -> bool {
    INITIALIZED.load(Ordering::SeqCst)
}

pub fn with_common_fields(
    span: &Span,
    platform: &str,
    chat_id: Option<&str>,
    msg_id: Option<&str>,
) {
    span.record("platform", tracing::field::display(platform));
    if let Some(chat_id) = chat_id {
        span.record("chat_id", tracing::field::display(chat_id));
    }
    if let Some(msg_id) = msg_id {
        span.record("msg_id", tracing::field::display(msg_id));
    }
}
