//! Slack socket-mode subscriber (second half of C15, §4.15).
//!
//! Started only when `SLACK_APP_TOKEN` is configured; consumes four event
//! categories — `events_api`, `slash_commands`, `interactive`, and
//! `hello`/`disconnect` — acking each immediately before forwarding it into
//! the same normalization pipeline the HTTP surface uses.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use gsm_core::Platform;
use gsm_idempotency::{slack_event_fingerprint, slack_message_fingerprint};
use serde::Deserialize;
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::app_state::AppState;
use crate::forward::forward_inbound;
use crate::normalize::slack::{self as slack_normalize, SlackEvent, SlashCommandForm};

const DEFAULT_ACCOUNT_ID: &str = "default";
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct ConnectionsOpenResponse {
    ok: bool,
    url: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SocketEnvelope {
    #[serde(default)]
    envelope_id: Option<String>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    payload: Option<Value>,
}

/// Runs forever, reconnecting after [`RECONNECT_DELAY`] whenever the socket
/// drops. Intended to be spawned as a background task from `main`.
pub async fn run(state: AppState) {
    let Some(app_token) = state.config.slack_app_token.clone() else {
        return;
    };

    loop {
        match connect_and_serve(&state, &app_token).await {
            Ok(()) => tracing::info!("slack socket-mode connection closed cleanly"),
            Err(err) => tracing::warn!(error = %err, "slack socket-mode connection failed"),
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

async fn connect_and_serve(state: &AppState, app_token: &str) -> anyhow::Result<()> {
    let response: ConnectionsOpenResponse = state
        .http
        .raw()
        .post("https://slack.com/api/apps.connections.open")
        .bearer_auth(app_token)
        .send()
        .await?
        .json()
        .await?;

    if !response.ok {
        anyhow::bail!(
            "apps.connections.open failed: {}",
            response.error.unwrap_or_default()
        );
    }
    let url = response.url.ok_or_else(|| anyhow::anyhow!("no socket url returned"))?;

    let (ws_stream, _) = tokio_tungstenite::connect_async(url).await?;
    let (mut write, mut read) = ws_stream.split();

    while let Some(message) = read.next().await {
        let message = message?;
        let WsMessage::Text(text) = message else {
            continue;
        };

        let envelope: SocketEnvelope = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(error = %err, "malformed socket-mode envelope");
                continue;
            }
        };

        if let Some(envelope_id) = &envelope.envelope_id {
            let ack = serde_json::json!({"envelope_id": envelope_id});
            if let Err(err) = write.send(WsMessage::Text(ack.to_string().into())).await {
                tracing::warn!(error = %err, "failed to ack socket-mode envelope");
            }
        }

        match envelope.kind.as_deref() {
            Some("hello") => tracing::info!("slack socket-mode hello received"),
            Some("disconnect") => {
                tracing::info!("slack socket-mode disconnect requested");
                return Ok(());
            }
            Some("events_api") => handle_events_api(state, envelope.payload).await,
            Some("slash_commands") => handle_slash_command(state, envelope.payload).await,
            Some("interactive") => handle_interactive(state, envelope.payload).await,
            other => tracing::debug!(kind = ?other, "ignoring unrecognized socket-mode event"),
        }
    }

    Ok(())
}

async fn handle_events_api(state: &AppState, payload: Option<Value>) {
    let Some(payload) = payload else { return };
    let Some(event_id) = payload.get("event_id").and_then(Value::as_str) else {
        return;
    };
    let Some(event): Option<SlackEvent> = payload
        .get("event")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
    else {
        return;
    };

    let fingerprint = slack_event_fingerprint(event_id);
    match state.dedupe.should_process(&fingerprint).await {
        Ok(true) => {}
        Ok(false) => return,
        Err(err) => {
            tracing::error!(error = %err, "dedupe check failed for socket-mode event");
            return;
        }
    }
    state.persist().await;

    let Some(envelope) = slack_normalize::normalize_event(
        DEFAULT_ACCOUNT_ID,
        state.config.slack_bot_user_id.as_deref(),
        &event,
    ) else {
        return;
    };
    forward_or_log(state, envelope).await;
}

async fn handle_slash_command(state: &AppState, payload: Option<Value>) {
    let Some(payload) = payload else { return };
    let Ok(form): Result<SlashCommandForm, _> = serde_json::from_value(payload) else {
        return;
    };

    let envelope = slack_normalize::normalize_slash_command(DEFAULT_ACCOUNT_ID, &form);
    let fingerprint = slack_message_fingerprint(&envelope.chat_id, &envelope.message_id);
    match state.dedupe.should_process(&fingerprint).await {
        Ok(true) => {}
        Ok(false) => return,
        Err(err) => {
            tracing::error!(error = %err, "dedupe check failed for socket-mode slash command");
            return;
        }
    }
    state.persist().await;
    forward_or_log(state, envelope).await;
}

async fn handle_interactive(state: &AppState, payload: Option<Value>) {
    let Some(payload) = payload else { return };
    let Some(envelope) = slack_normalize::normalize_interaction(DEFAULT_ACCOUNT_ID, &payload) else {
        return;
    };

    let fingerprint = slack_message_fingerprint(&envelope.chat_id, &envelope.message_id);
    match state.dedupe.should_process(&fingerprint).await {
        Ok(true) => {}
        Ok(false) => return,
        Err(err) => {
            tracing::error!(error = %err, "dedupe check failed for socket-mode interaction");
            return;
        }
    }
    state.persist().await;
    forward_or_log(state, envelope).await;
}

async fn forward_or_log(state: &AppState, envelope: gsm_core::InboundEnvelope) {
    if !envelope.is_forwardable() {
        return;
    }
    match forward_inbound(
        &state.http,
        &state.config.core_bus_base_url,
        state.config.core_bus_channel_token.as_deref(),
        Platform::Slack,
        &envelope,
    )
    .await
    {
        Ok(()) => state.metrics.record_inbound_forwarded(Platform::Slack),
        Err(err) => state
            .metrics
            .record_inbound_forward_error(Platform::Slack, err.to_string()),
    }
}
