//! Slack-like events-api payload → [`InboundEnvelope`] (C9, §4.9).

use gsm_core::InboundEnvelope;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub struct SlackEnvelope {
    #[serde(default)]
    pub r#type: Option<String>,
    #[serde(default)]
    pub challenge: Option<String>,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub event: Option<SlackEvent>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SlackEvent {
    #[serde(default)]
    pub r#type: Option<String>,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub channel_type: Option<String>,
    #[serde(default)]
    pub ts: Option<String>,
    #[serde(default)]
    pub thread_ts: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
    #[serde(default)]
    pub deleted_ts: Option<String>,
    #[serde(default)]
    pub message: Option<Box<SlackEvent>>,
    #[serde(default)]
    pub files: Vec<Value>,
}

/// Echoes the `url_verification` challenge, per §4.9.
pub fn extract_challenge(envelope: &SlackEnvelope) -> Option<String> {
    if envelope.r#type.as_deref() == Some("url_verification") {
        return envelope.challenge.clone();
    }
    None
}

fn is_dm(event: &SlackEvent) -> bool {
    event.channel_type.as_deref() == Some("im")
        || event
            .channel
            .as_deref()
            .is_some_and(|c| c.starts_with('D'))
}

fn was_mentioned(text: &str, bot_user_id: Option<&str>) -> bool {
    bot_user_id.is_some_and(|bot| text.contains(&format!("<@{bot}>")))
}

/// Normalizes a single Slack event into an [`InboundEnvelope`], or `None` when
/// the event should be silently ignored (§4.9).
pub fn normalize_event(account_id: &str, bot_user_id: Option<&str>, event: &SlackEvent) -> Option<InboundEnvelope> {
    let event_type = event.r#type.as_deref().unwrap_or_default();

    match event_type {
        "app_mention" => {
            let channel = event.channel.clone()?;
            let user = event.user.clone()?;
            let ts = event.ts.clone().unwrap_or_default();
            let text = event.text.clone().unwrap_or_default();
            Some(InboundEnvelope {
                account_id: account_id.to_string(),
                sender_id: user,
                user_id: None,
                chat_id: channel,
                thread_id: event.thread_ts.clone(),
                message_id: ts,
                text,
                is_group: true,
                was_mentioned: true,
                conversation_type: None,
                group_id: None,
                channel_id: None,
                tenant_id: None,
                service_url: None,
                service_url_domain: None,
                history_limit: None,
                dm_history_limit: None,
            })
        }
        "message" => {
            if event.bot_id.is_some() || event.subtype.as_deref() == Some("bot_message") {
                return None;
            }

            match event.subtype.as_deref() {
                Some("message_changed") => {
                    let embedded = event.message.as_deref()?;
                    let channel = event.channel.clone()?;
                    let user = embedded.user.clone()?;
                    let text = embedded.text.clone().unwrap_or_default();
                    let ts = embedded.ts.clone().unwrap_or_default();
                    Some(InboundEnvelope {
                        account_id: account_id.to_string(),
                        sender_id: user,
                        user_id: None,
                        chat_id: channel.clone(),
                        thread_id: embedded.thread_ts.clone(),
                        message_id: ts,
                        was_mentioned: was_mentioned(&text, bot_user_id),
                        text,
                        is_group: !is_dm(event),
                        conversation_type: None,
                        group_id: None,
                        channel_id: None,
                        tenant_id: None,
                        service_url: None,
                        service_url_domain: None,
                        history_limit: None,
                        dm_history_limit: None,
                    })
                }
                Some("message_deleted") => {
                    let channel = event.channel.clone()?;
                    let message_id = event.deleted_ts.clone().unwrap_or_default();
                    Some(InboundEnvelope {
                        account_id: account_id.to_string(),
                        sender_id: event.user.clone().unwrap_or_default(),
                        user_id: None,
                        chat_id: channel,
                        thread_id: event.thread_ts.clone(),
                        message_id,
                        text: "[message deleted]".to_string(),
                        is_group: !is_dm(event),
                        was_mentioned: false,
                        conversation_type: None,
                        group_id: None,
                        channel_id: None,
                        tenant_id: None,
                        service_url: None,
                        service_url_domain: None,
                        history_limit: None,
                        dm_history_limit: None,
                    })
                }
                Some("file_share") => {
                    let channel = event.channel.clone()?;
                    let user = event.user.clone()?;
                    let ts = event.ts.clone().unwrap_or_default();
                    Some(InboundEnvelope {
                        account_id: account_id.to_string(),
                        sender_id: user,
                        user_id: None,
                        chat_id: channel,
                        thread_id: event.thread_ts.clone(),
                        message_id: ts,
                        text: "[file shared]".to_string(),
                        is_group: !is_dm(event),
                        was_mentioned: false,
                        conversation_type: None,
                        group_id: None,
                        channel_id: None,
                        tenant_id: None,
                        service_url: None,
                        service_url_domain: None,
                        history_limit: None,
                        dm_history_limit: None,
                    })
                }
                _ => {
                    let channel = event.channel.clone()?;
                    let user = event.user.clone()?;
                    let ts = event.ts.clone().unwrap_or_default();
                    let text = event.text.clone().unwrap_or_default();
                    Some(InboundEnvelope {
                        account_id: account_id.to_string(),
                        sender_id: user,
                        user_id: None,
                        chat_id: channel,
                        thread_id: event.thread_ts.clone(),
                        message_id: ts,
                        was_mentioned: was_mentioned(&text, bot_user_id),
                        text,
                        is_group: !is_dm(event),
                        conversation_type: None,
                        group_id: None,
                        channel_id: None,
                        tenant_id: None,
                        service_url: None,
                        service_url_domain: None,
                        history_limit: None,
                        dm_history_limit: None,
                    })
                }
            }
        }
        _ => None,
    }
}

/// Form fields posted to `/slack/commands` (§6).
#[derive(Debug, Deserialize)]
pub struct SlashCommandForm {
    pub command: String,
    #[serde(default)]
    pub text: String,
    pub user_id: String,
    pub channel_id: String,
}

/// Synthesizes `"{command} {text}"`, always treated as mentioned (§4.9).
pub fn normalize_slash_command(account_id: &str, form: &SlashCommandForm) -> InboundEnvelope {
    InboundEnvelope {
        account_id: account_id.to_string(),
        sender_id: form.user_id.clone(),
        user_id: None,
        chat_id: form.channel_id.clone(),
        thread_id: None,
        message_id: format!("cmd:{}:{}", form.user_id, gsm_core::now_rfc3339()),
        text: format!("{} {}", form.command, form.text).trim().to_string(),
        is_group: true,
        was_mentioned: true,
        conversation_type: None,
        group_id: None,
        channel_id: None,
        tenant_id: None,
        service_url: None,
        service_url_domain: None,
        history_limit: None,
        dm_history_limit: None,
    }
}

/// Synthesizes `"interactive {action_id} {value}"` from a `payload=` JSON
/// body posted to `/slack/interactions`, always treated as mentioned (§4.9).
pub fn normalize_interaction(account_id: &str, payload: &Value) -> Option<InboundEnvelope> {
    let channel = payload
        .get("channel")
        .and_then(|c| c.get("id"))
        .and_then(Value::as_str)?;
    let user = payload
        .get("user")
        .and_then(|u| u.get("id"))
        .and_then(Value::as_str)?;
    let action = payload.get("actions").and_then(Value::as_array)?.first()?;
    let action_id = action.get("action_id").and_then(Value::as_str).unwrap_or_default();
    let value = action.get("value").and_then(Value::as_str).unwrap_or_default();
    let message_ts = payload
        .get("message")
        .and_then(|m| m.get("ts"))
        .and_then(Value::as_str)
        .unwrap_or_default();

    Some(InboundEnvelope {
        account_id: account_id.to_string(),
        sender_id: user.to_string(),
        user_id: None,
        chat_id: channel.to_string(),
        thread_id: None,
        message_id: format!("interactive:{message_ts}:{action_id}"),
        text: format!("interactive {action_id} {value}").trim().to_string(),
        is_group: true,
        was_mentioned: true,
        conversation_type: None,
        group_id: None,
        channel_id: None,
        tenant_id: None,
        service_url: None,
        service_url_domain: None,
        history_limit: None,
        dm_history_limit: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_mention_is_always_accepted_and_mentioned() {
        let event = SlackEvent {
            r#type: Some("app_mention".into()),
            channel: Some("C1".into()),
            user: Some("U1".into()),
            text: Some("hi".into()),
            ts: Some("171.1".into()),
            ..Default::default()
        };
        let env = normalize_event("acct", Some("Ubot"), &event).expect("accepted");
        assert!(env.was_mentioned);
        assert!(env.is_group);
    }

    #[test]
    fn bot_message_is_rejected() {
        let event = SlackEvent {
            r#type: Some("message".into()),
            subtype: Some("bot_message".into()),
            channel: Some("C1".into()),
            ..Default::default()
        };
        assert!(normalize_event("acct", None, &event).is_none());
    }

    #[test]
    fn message_changed_uses_embedded_message() {
        let event = SlackEvent {
            r#type: Some("message".into()),
            subtype: Some("message_changed".into()),
            channel: Some("C123".into()),
            message: Some(Box::new(SlackEvent {
                user: Some("U123".into()),
                text: Some("hi <@Ubot>".into()),
                thread_ts: Some("171.200".into()),
                ts: Some("171.201".into()),
                ..Default::default()
            })),
            ..Default::default()
        };
        let env = normalize_event("acct", Some("Ubot"), &event).expect("accepted");
        assert_eq!(env.chat_id, "C123");
        assert_eq!(env.sender_id, "U123");
        assert_eq!(env.message_id, "171.201");
        assert_eq!(env.thread_id.as_deref(), Some("171.200"));
        assert!(env.was_mentioned);
    }

    #[test]
    fn message_deleted_uses_fallback_text_and_deleted_ts() {
        let event = SlackEvent {
            r#type: Some("message".into()),
            subtype: Some("message_deleted".into()),
            channel: Some("C1".into()),
            deleted_ts: Some("171.9".into()),
            ..Default::default()
        };
        let env = normalize_event("acct", None, &event).expect("accepted");
        assert_eq!(env.text, "[message deleted]");
        assert_eq!(env.message_id, "171.9");
    }

    #[test]
    fn dm_channel_type_marks_not_group() {
        let event = SlackEvent {
            r#type: Some("message".into()),
            channel: Some("D1".into()),
            channel_type: Some("im".into()),
            user: Some("U1".into()),
            ts: Some("1".into()),
            text: Some("hi".into()),
            ..Default::default()
        };
        let env = normalize_event("acct", None, &event).expect("accepted");
        assert!(!env.is_group);
    }

    #[test]
    fn slash_command_synthesizes_text_and_is_mentioned() {
        let form = SlashCommandForm {
            command: "/poll".into(),
            text: "lunch".into(),
            user_id: "U1".into(),
            channel_id: "C1".into(),
        };
        let env = normalize_slash_command("acct", &form);
        assert_eq!(env.text, "/poll lunch");
        assert!(env.was_mentioned);
    }

    #[test]
    fn interaction_synthesizes_text_and_is_mentioned() {
        let payload = serde_json::json!({
            "channel": {"id": "C1"},
            "user": {"id": "U1"},
            "actions": [{"action_id": "vote", "value": "opt_0"}],
            "message": {"ts": "171.1"},
        });
        let env = normalize_interaction("acct", &payload).expect("accepted");
        assert_eq!(env.text, "interactive vote opt_0");
        assert!(env.was_mentioned);
    }
}
