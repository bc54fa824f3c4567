//! HTTP surface: the fixed route table of §6, realized as axum handlers
//! (C15).

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use gsm_core::{OutboundRequest, Platform};
use gsm_idempotency::{slack_event_fingerprint, slack_message_fingerprint, teams_message_fingerprint};
use security::verify_slack_signature;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::app_state::AppState;
use crate::dispatch::{slack as slack_dispatch, teams as teams_dispatch, DispatchError};
use crate::directory;
use crate::error::{duplicate_event_response, ok_response, BridgeError};
use crate::forward::forward_inbound;
use crate::normalize::slack::{self as slack_normalize, SlackEnvelope, SlashCommandForm};
use crate::normalize::teams::{self as teams_normalize, TeamsActivity};
use crate::poll_store::extract_vote_selection;
use crate::probe;

const DEFAULT_ACCOUNT_ID: &str = "default";

pub async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    metrics: crate::metrics::MetricsSnapshot,
    conversation_refs: usize,
    polls: usize,
    dedupe_keys: usize,
    teams_token_cache_present: bool,
}

pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        metrics: state.metrics.snapshot(),
        conversation_refs: state.conversations.len().await,
        polls: state.polls.len().await,
        dedupe_keys: state.dedupe.store().len().await,
        teams_token_cache_present: state.teams_tokens.is_some(),
    })
}

fn verify_slack_request(
    config: &crate::config::BridgeConfig,
    headers: &HeaderMap,
    raw_body: &[u8],
) -> Result<(), BridgeError> {
    let ts = headers
        .get("X-Slack-Request-Timestamp")
        .and_then(|v| v.to_str().ok());
    let sig = headers.get("X-Slack-Signature").and_then(|v| v.to_str().ok());
    verify_slack_signature(&config.slack_signing_secret, ts, sig, raw_body)?;
    Ok(())
}

/// Forwards a normalized envelope, recording metrics per §4.10/§7.
async fn forward_and_ack(state: &AppState, platform: Platform, envelope: gsm_core::InboundEnvelope) -> Response {
    if !envelope.is_forwardable() {
        return ok_response();
    }
    match forward_inbound(
        &state.http,
        &state.config.core_bus_base_url,
        state.config.core_bus_channel_token.as_deref(),
        platform,
        &envelope,
    )
    .await
    {
        Ok(()) => {
            state.metrics.record_inbound_forwarded(platform);
            ok_response()
        }
        Err(err) => {
            state.metrics.record_inbound_forward_error(platform, err.to_string());
            BridgeError::UpstreamFailure(err.to_string()).into_response()
        }
    }
}

/// `POST /slack/events` (§6).
pub async fn slack_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    raw_body: axum::body::Bytes,
) -> Response {
    if let Err(err) = verify_slack_request(&state.config, &headers, &raw_body) {
        state.metrics.record_inbound_auth_rejected(Platform::Slack);
        return err.into_response();
    }

    let envelope: SlackEnvelope = match serde_json::from_slice(&raw_body) {
        Ok(v) => v,
        Err(err) => return BridgeError::from(err).into_response(),
    };

    if let Some(challenge) = slack_normalize::extract_challenge(&envelope) {
        return Json(serde_json::json!({"challenge": challenge})).into_response();
    }

    let Some(event_id) = envelope.event_id.clone() else {
        return ok_response();
    };
    let Some(event) = envelope.event.clone() else {
        return ok_response();
    };

    let fingerprint = slack_event_fingerprint(&event_id);
    match state.dedupe.should_process(&fingerprint).await {
        Ok(true) => {}
        Ok(false) => return duplicate_event_response(),
        Err(err) => return BridgeError::UpstreamFailure(err.to_string()).into_response(),
    }
    state.persist().await;

    let Some(envelope) =
        slack_normalize::normalize_event(DEFAULT_ACCOUNT_ID, state.config.slack_bot_user_id.as_deref(), &event)
    else {
        return ok_response();
    };

    forward_and_ack(&state, Platform::Slack, envelope).await
}

#[derive(Debug, Deserialize)]
pub struct SlackInteractionForm {
    payload: String,
}

/// `POST /slack/commands` (§6, form-encoded).
pub async fn slack_commands(
    State(state): State<AppState>,
    headers: HeaderMap,
    raw_body: axum::body::Bytes,
) -> Response {
    if let Err(err) = verify_slack_request(&state.config, &headers, &raw_body) {
        state.metrics.record_inbound_auth_rejected(Platform::Slack);
        return err.into_response();
    }

    let form: SlashCommandForm = match serde_urlencoded::from_bytes(&raw_body) {
        Ok(v) => v,
        Err(err) => return BridgeError::BadRequest(err.to_string()).into_response(),
    };

    let envelope = slack_normalize::normalize_slash_command(DEFAULT_ACCOUNT_ID, &form);
    let fingerprint = slack_message_fingerprint(&envelope.chat_id, &envelope.message_id);
    match state.dedupe.should_process(&fingerprint).await {
        Ok(true) => {}
        Ok(false) => return duplicate_event_response(),
        Err(err) => return BridgeError::UpstreamFailure(err.to_string()).into_response(),
    }
    state.persist().await;

    forward_and_ack(&state, Platform::Slack, envelope).await
}

/// `POST /slack/interactions` (§6, form-encoded `payload=…`).
pub async fn slack_interactions(
    State(state): State<AppState>,
    headers: HeaderMap,
    raw_body: axum::body::Bytes,
) -> Response {
    if let Err(err) = verify_slack_request(&state.config, &headers, &raw_body) {
        state.metrics.record_inbound_auth_rejected(Platform::Slack);
        return err.into_response();
    }

    let form: SlackInteractionForm = match serde_urlencoded::from_bytes(&raw_body) {
        Ok(v) => v,
        Err(err) => return BridgeError::BadRequest(err.to_string()).into_response(),
    };
    let payload: Value = match serde_json::from_str(&form.payload) {
        Ok(v) => v,
        Err(err) => return BridgeError::from(err).into_response(),
    };

    let Some(envelope) = slack_normalize::normalize_interaction(DEFAULT_ACCOUNT_ID, &payload) else {
        return ok_response();
    };

    let fingerprint = slack_message_fingerprint(&envelope.chat_id, &envelope.message_id);
    match state.dedupe.should_process(&fingerprint).await {
        Ok(true) => {}
        Ok(false) => return duplicate_event_response(),
        Err(err) => return BridgeError::UpstreamFailure(err.to_string()).into_response(),
    }
    state.persist().await;

    forward_and_ack(&state, Platform::Slack, envelope).await
}

/// `POST /slack/outbound` (§6, §4.11).
pub async fn slack_outbound(
    State(state): State<AppState>,
    Json(request): Json<OutboundRequest>,
) -> Response {
    let Some(bot_token) = state.config.slack_bot_token.as_deref() else {
        return BridgeError::ConfigurationMissing("SLACK_BOT_TOKEN not configured".into()).into_response();
    };

    let result = slack_dispatch::dispatch(
        &state.http,
        bot_token,
        &state.config.slack_media_allowed_hosts,
        &state.reply_memory,
        &state.config.reply_mode_default,
        &request,
    )
    .await;

    match result {
        Ok(()) => {
            state.metrics.record_outbound_sent(Platform::Slack);
            ok_response()
        }
        Err(err) => {
            state.metrics.record_outbound_error(Platform::Slack, err.to_string());
            dispatch_error_response(err)
        }
    }
}

fn dispatch_error_response(err: DispatchError) -> Response {
    match err {
        DispatchError::BadRequest(msg) => BridgeError::BadRequest(msg).into_response(),
        DispatchError::ConfigurationMissing(msg) => BridgeError::ConfigurationMissing(msg).into_response(),
        DispatchError::Upstream(err) => BridgeError::from(err).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct ResolveResponse {
    pub resolved_id: Option<String>,
}

pub async fn slack_resolve_users(
    State(state): State<AppState>,
    Json(req): Json<ResolveRequest>,
) -> Response {
    let Some(bot_token) = state.config.slack_bot_token.as_deref() else {
        return BridgeError::ConfigurationMissing("SLACK_BOT_TOKEN not configured".into()).into_response();
    };
    match directory::slack_resolve_user(&state.http, bot_token, &req.query).await {
        Ok(resolved_id) => Json(ResolveResponse { resolved_id }).into_response(),
        Err(err) => dispatch_error_response(err),
    }
}

pub async fn slack_resolve_channels(
    State(state): State<AppState>,
    Json(req): Json<ResolveRequest>,
) -> Response {
    let Some(bot_token) = state.config.slack_bot_token.as_deref() else {
        return BridgeError::ConfigurationMissing("SLACK_BOT_TOKEN not configured".into()).into_response();
    };
    match directory::slack_resolve_channel(&state.http, bot_token, &req.query).await {
        Ok(resolved_id) => Json(ResolveResponse { resolved_id }).into_response(),
        Err(err) => dispatch_error_response(err),
    }
}

pub async fn slack_probe(State(state): State<AppState>) -> Json<probe::SlackProbe> {
    Json(probe::slack_probe(&state.http, state.config.slack_bot_token.as_deref()).await)
}

/// `POST /teams/messages` (§6, bearer + JWT).
pub async fn teams_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    let activity: TeamsActivity = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(err) => return BridgeError::from(err).into_response(),
    };

    let service_url = activity.service_url.clone().unwrap_or_default();
    let bearer = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    if !state.teams_jwt.is_bypassed() {
        let Some(token) = bearer else {
            state.metrics.record_inbound_auth_rejected(Platform::Teams);
            return BridgeError::AuthFailure("missing bearer token".into()).into_response();
        };
        if let Err(err) = state.teams_jwt.verify(token, &service_url).await {
            state.metrics.record_inbound_auth_rejected(Platform::Teams);
            return BridgeError::from(err).into_response();
        }
    }

    if activity.r#type.as_deref() != Some("message") {
        return ok_response();
    }

    let Some(activity_id) = activity.id.clone() else {
        return ok_response();
    };
    let Some(conversation_id) = activity.conversation.as_ref().and_then(|c| c.id.clone()) else {
        return ok_response();
    };

    let fingerprint = teams_message_fingerprint(&conversation_id, &activity_id);
    match state.dedupe.should_process(&fingerprint).await {
        Ok(true) => {}
        Ok(false) => return duplicate_event_response(),
        Err(err) => return BridgeError::UpstreamFailure(err.to_string()).into_response(),
    }

    if let (Some(from), Some(service_url)) = (activity.from.as_ref(), activity.service_url.clone()) {
        let user_id = from
            .aad_object_id
            .clone()
            .or_else(|| from.id.clone())
            .unwrap_or_default();
        state
            .conversations
            .record(
                &user_id,
                gsm_core::ConversationRef {
                    service_url,
                    conversation_id: conversation_id.clone(),
                    user_id,
                },
            )
            .await;
    }
    state.persist().await;

    if let Some(value) = &activity.value {
        if let Some(selection) = extract_vote_selection(value) {
            let sender_id = activity
                .from
                .as_ref()
                .and_then(|f| f.id.clone())
                .unwrap_or_default();
            if state.polls.record_vote(&conversation_id, &sender_id, &selection).await {
                state.persist().await;
                return Json(serde_json::json!({"ok": true, "poll_vote_recorded": true})).into_response();
            }
        }
    }

    let Some(envelope) = teams_normalize::normalize_activity(
        DEFAULT_ACCOUNT_ID,
        None,
        state.config.teams_bot_name.as_deref(),
        &activity,
    ) else {
        return ok_response();
    };

    forward_and_ack(&state, Platform::Teams, envelope).await
}

/// `POST /teams/outbound` (§6, §4.11).
pub async fn teams_outbound(
    State(state): State<AppState>,
    Json(request): Json<OutboundRequest>,
) -> Response {
    let Some(tokens) = state.teams_tokens.as_deref() else {
        return BridgeError::ConfigurationMissing("Teams credentials not configured".into()).into_response();
    };

    let result = teams_dispatch::dispatch(
        &state.http,
        &state.conversations,
        tokens,
        &state.reply_memory,
        &state.config.reply_mode_default,
        state.config.teams_service_url_override.as_deref(),
        &request,
    )
    .await;

    match result {
        Ok(()) => {
            state.metrics.record_outbound_sent(Platform::Teams);
            ok_response()
        }
        Err(err) => {
            state.metrics.record_outbound_error(Platform::Teams, err.to_string());
            dispatch_error_response(err)
        }
    }
}

pub async fn teams_resolve_users(
    State(state): State<AppState>,
    Json(req): Json<ResolveRequest>,
) -> Response {
    let Some(tokens) = state.teams_tokens.as_deref() else {
        return BridgeError::ConfigurationMissing("Teams credentials not configured".into()).into_response();
    };
    match directory::teams_resolve_user(&state.http, tokens, &req.query).await {
        Ok(resolved_id) => Json(ResolveResponse { resolved_id }).into_response(),
        Err(err) => dispatch_error_response(err),
    }
}

pub async fn teams_resolve_channels(
    State(state): State<AppState>,
    Json(req): Json<ResolveRequest>,
) -> Response {
    let Some(tokens) = state.teams_tokens.as_deref() else {
        return BridgeError::ConfigurationMissing("Teams credentials not configured".into()).into_response();
    };
    match directory::teams_resolve_channel(&state.http, tokens, &req.query).await {
        Ok(resolved_id) => Json(ResolveResponse { resolved_id }).into_response(),
        Err(err) => dispatch_error_response(err),
    }
}

pub async fn teams_probe(State(state): State<AppState>) -> Json<probe::TeamsProbe> {
    Json(probe::teams_probe(&state.http, state.teams_tokens.as_deref()).await)
}

#[derive(Debug, Deserialize)]
pub struct ValidationQuery {
    #[serde(rename = "validationToken")]
    pub validation_token: Option<String>,
}

/// Some Bot Framework deployments probe with a `GET` carrying a validation
/// token before POSTing real activities; echo it when present, matching
/// this codebase's ingress convention.
pub async fn teams_validate(Query(q): Query<ValidationQuery>) -> impl IntoResponse {
    q.validation_token.unwrap_or_default()
}
