//! Bot Framework activity → [`InboundEnvelope`] (C9, §4.9).

use gsm_core::InboundEnvelope;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub struct TeamsActivity {
    #[serde(default)]
    pub r#type: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, rename = "replyToId")]
    pub reply_to_id: Option<String>,
    #[serde(default, rename = "serviceUrl")]
    pub service_url: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub from: Option<TeamsFrom>,
    #[serde(default)]
    pub conversation: Option<TeamsConversation>,
    #[serde(default, rename = "channelData")]
    pub channel_data: Option<TeamsChannelData>,
    #[serde(default)]
    pub entities: Vec<Value>,
    #[serde(default)]
    pub value: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct TeamsFrom {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, rename = "aadObjectId")]
    pub aad_object_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TeamsConversation {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, rename = "conversationType")]
    pub conversation_type: Option<String>,
    #[serde(default, rename = "tenantId")]
    pub tenant_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TeamsChannelData {
    #[serde(default)]
    pub team: Option<TeamsIdRef>,
    #[serde(default)]
    pub channel: Option<TeamsIdRef>,
    #[serde(default)]
    pub tenant: Option<TeamsIdRef>,
}

#[derive(Debug, Deserialize)]
pub struct TeamsIdRef {
    #[serde(default)]
    pub id: Option<String>,
}

/// Repeatedly strips `<at>…</at>` mention markup and collapses whitespace
/// (§4.9).
pub fn clean_mention_markup(text: &str) -> String {
    let mut cleaned = text.to_string();
    loop {
        let Some(start) = cleaned.find("<at>") else { break };
        let Some(end_rel) = cleaned[start..].find("</at>") else {
            break;
        };
        let end = start + end_rel + "</at>".len();
        cleaned.replace_range(start..end, " ");
    }
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn entity_mention_matches(entities: &[Value], bot_id: Option<&str>, bot_name: Option<&str>) -> bool {
    entities.iter().any(|entity| {
        if entity.get("type").and_then(Value::as_str) != Some("mention") {
            return false;
        }
        let Some(mentioned) = entity.get("mentioned") else {
            return false;
        };
        let id_matches = bot_id.is_some()
            && mentioned.get("id").and_then(Value::as_str) == bot_id;
        let name_matches = bot_name.is_some_and(|name| {
            mentioned
                .get("name")
                .and_then(Value::as_str)
                .map(|n| n.to_lowercase())
                .as_deref()
                == Some(name.to_lowercase().as_str())
        });
        id_matches || name_matches
    })
}

/// Normalizes a Teams Bot Framework activity, or `None` when it should be
/// acked but otherwise ignored (§4.9).
pub fn normalize_activity(
    account_id: &str,
    bot_id: Option<&str>,
    bot_name: Option<&str>,
    activity: &TeamsActivity,
) -> Option<InboundEnvelope> {
    if activity.r#type.as_deref() != Some("message") {
        return None;
    }

    let from = activity.from.as_ref()?;
    let sender_id = from.id.clone()?;
    let user_id = from.aad_object_id.clone().unwrap_or_else(|| sender_id.clone());

    let conversation_id = activity.conversation.as_ref().and_then(|c| c.id.clone());
    let team_id = activity
        .channel_data
        .as_ref()
        .and_then(|cd| cd.team.as_ref())
        .and_then(|t| t.id.clone());
    let channel_id = activity
        .channel_data
        .as_ref()
        .and_then(|cd| cd.channel.as_ref())
        .and_then(|c| c.id.clone());
    let tenant_id = activity
        .channel_data
        .as_ref()
        .and_then(|cd| cd.tenant.as_ref())
        .and_then(|t| t.id.clone())
        .or_else(|| activity.conversation.as_ref().and_then(|c| c.tenant_id.clone()));

    let chat_id = conversation_id.clone().or_else(|| {
        Some(format!(
            "{}:{}",
            team_id.clone().unwrap_or_default(),
            channel_id.clone().unwrap_or_default()
        ))
    })?;

    let raw_text = activity.text.clone().unwrap_or_default();
    let was_mentioned = raw_text.contains("<at>")
        || entity_mention_matches(&activity.entities, bot_id, bot_name);
    let text = clean_mention_markup(&raw_text);

    let mut conversation_type = activity
        .conversation
        .as_ref()
        .and_then(|c| c.conversation_type.clone())
        .map(|t| t.to_lowercase())
        .unwrap_or_default();
    if conversation_type.is_empty() && channel_id.is_some() {
        conversation_type = "channel".to_string();
    }
    let is_group = conversation_type != "personal";

    Some(InboundEnvelope {
        account_id: account_id.to_string(),
        sender_id,
        user_id: Some(user_id),
        chat_id,
        thread_id: activity.reply_to_id.clone(),
        message_id: activity.id.clone().unwrap_or_default(),
        text,
        is_group,
        was_mentioned,
        conversation_type: if conversation_type.is_empty() {
            None
        } else {
            Some(conversation_type)
        },
        group_id: team_id,
        channel_id,
        tenant_id,
        service_url: activity.service_url.clone(),
        service_url_domain: activity
            .service_url
            .as_deref()
            .and_then(|url| url::Url::parse(url).ok())
            .and_then(|u| u.host_str().map(str::to_string)),
        history_limit: None,
        dm_history_limit: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_activity() -> TeamsActivity {
        TeamsActivity {
            r#type: Some("message".into()),
            id: Some("act-1".into()),
            reply_to_id: None,
            service_url: Some("https://smba.trafficmanager.net/emea".into()),
            text: Some("<at>KafClaw</at> status".into()),
            from: Some(TeamsFrom {
                id: Some("user-1".into()),
                aad_object_id: None,
            }),
            conversation: Some(TeamsConversation {
                id: None,
                conversation_type: None,
                tenant_id: Some("tenant-1".into()),
            }),
            channel_data: Some(TeamsChannelData {
                team: Some(TeamsIdRef { id: Some("team-1".into()) }),
                channel: Some(TeamsIdRef { id: Some("channel-1".into()) }),
                tenant: Some(TeamsIdRef { id: Some("tenant-1".into()) }),
            }),
            entities: vec![serde_json::json!({
                "type": "mention",
                "mentioned": {"id": "bot-1", "name": "KafClaw"}
            })],
            value: None,
        }
    }

    #[test]
    fn channel_activity_normalizes_per_scenario_four() {
        let activity = sample_activity();
        let env = normalize_activity("acct", Some("bot-1"), Some("KafClaw"), &activity)
            .expect("accepted");
        assert_eq!(env.text, "status");
        assert_eq!(env.group_id.as_deref(), Some("team-1"));
        assert_eq!(env.channel_id.as_deref(), Some("channel-1"));
        assert_eq!(env.tenant_id.as_deref(), Some("tenant-1"));
        assert!(env.was_mentioned);
        assert!(env.is_group);
    }

    #[test]
    fn non_message_type_is_ignored() {
        let mut activity = sample_activity();
        activity.r#type = Some("conversationUpdate".into());
        assert!(normalize_activity("acct", None, None, &activity).is_none());
    }

    #[test]
    fn personal_conversation_is_not_group() {
        let mut activity = sample_activity();
        activity.conversation = Some(TeamsConversation {
            id: Some("conv-1".into()),
            conversation_type: Some("personal".into()),
            tenant_id: None,
        });
        let env = normalize_activity("acct", None, None, &activity).expect("accepted");
        assert!(!env.is_group);
    }

    #[test]
    fn mention_markup_is_stripped_and_whitespace_collapsed() {
        assert_eq!(clean_mention_markup("<at>Bot</at>   hello   world"), "hello world");
        assert_eq!(clean_mention_markup("no mentions here"), "no mentions here");
    }

    #[test]
    fn missing_conversation_id_synthesizes_from_team_and_channel() {
        let activity = sample_activity();
        let env = normalize_activity("acct", None, None, &activity).expect("accepted");
        assert_eq!(env.chat_id, "team-1:channel-1");
    }
}
