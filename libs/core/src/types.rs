use serde::{Deserialize, Serialize};

/// Which chat backend a message came from or is destined to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Slack,
    Teams,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Slack => "slack",
            Platform::Teams => "teams",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uniform inbound message, produced by a normalizer and forwarded once to
/// the core bus (§3 InboundEnvelope).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEnvelope {
    pub account_id: String,
    pub sender_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub chat_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    pub message_id: String,
    pub text: String,
    pub is_group: bool,
    pub was_mentioned: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_url_domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dm_history_limit: Option<u32>,
}

impl InboundEnvelope {
    /// §3 invariant: `chat_id` and `sender_id` must be non-empty when forwarded.
    pub fn is_forwardable(&self) -> bool {
        !self.chat_id.is_empty() && !self.sender_id.is_empty()
    }
}

/// An action requested on an existing message (one of §4.11's Slack actions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboundAction {
    React,
    Edit,
    Delete,
    Pin,
    Unpin,
    Read,
}

/// Uniform outbound request accepted from the core bus (§3 OutboundRequest).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutboundRequest {
    pub account_id: String,
    pub chat_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default)]
    pub media_urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<OutboundAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_params: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_question: Option<String>,
    #[serde(default)]
    pub poll_options: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_max_selections: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub native_streaming: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_chunk_chars: Option<u32>,
}

impl OutboundRequest {
    /// §3 invariant: rejected if `chat_id` empty or no deliverable payload present.
    pub fn has_deliverable_payload(&self) -> bool {
        self.content.as_ref().is_some_and(|c| !c.is_empty())
            || !self.media_urls.is_empty()
            || self.card.is_some()
            || self.action.is_some()
            || self.poll_question.is_some()
    }

    pub fn is_valid(&self) -> bool {
        !self.chat_id.is_empty() && self.has_deliverable_payload()
    }
}

/// The triple needed to reply into Teams (§3 ConversationRef).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationRef {
    pub service_url: String,
    pub conversation_id: String,
    pub user_id: String,
}

impl ConversationRef {
    pub fn is_valid(&self) -> bool {
        !self.service_url.is_empty()
    }
}

/// A single- or multi-select poll created by an outbound poll send, with
/// votes accumulated from inbound activities (§3 Poll, §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Poll {
    pub chat_id: String,
    pub question: String,
    pub options: Vec<String>,
    pub max_selections: u32,
    pub created_at_rfc3339: String,
    #[serde(default)]
    pub votes: std::collections::HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at_rfc3339: Option<String>,
}

impl Poll {
    pub fn record_vote(&mut self, sender_id: impl Into<String>, selection: impl Into<String>) {
        self.votes.insert(sender_id.into(), selection.into());
        self.updated_at_rfc3339 = Some(now_rfc3339());
    }
}

pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}
