//! Outbound request → Bot Framework activity POST (C11, §4.11).

use gsm_core::{HttpError, OutboundRequest, RetryingHttpClient, TokenCache};
use serde_json::{json, Value};
use url::Url;

use super::DispatchError;
use crate::conversation_store::ConversationStore;
use crate::poll_store::poll_card;
use crate::reply_policy::ReplyMemory;

const BOT_FRAMEWORK_SCOPE: &str = "https://api.botframework.com/.default";

fn attachment_name(media_url: &str) -> String {
    Url::parse(media_url)
        .ok()
        .and_then(|url| {
            url.path_segments()
                .and_then(|mut segments| segments.next_back())
                .filter(|name| !name.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "attachment".to_string())
}

fn build_attachments(media_urls: &[String], card: Option<&Value>) -> Vec<Value> {
    let mut attachments: Vec<Value> = media_urls
        .iter()
        .map(|url| {
            json!({
                "contentType": "application/octet-stream",
                "contentUrl": url,
                "name": attachment_name(url),
            })
        })
        .collect();

    if let Some(card) = card {
        attachments.push(json!({
            "contentType": "application/vnd.microsoft.card.adaptive",
            "content": card,
        }));
    }

    attachments
}

/// Executes the Teams dispatch order for one outbound request (§4.11).
pub async fn dispatch(
    http: &RetryingHttpClient,
    conversations: &ConversationStore,
    tokens: &TokenCache,
    reply_memory: &ReplyMemory,
    reply_mode_default: &str,
    service_url_override: Option<&str>,
    request: &OutboundRequest,
) -> Result<(), DispatchError> {
    if !request.is_valid() {
        return Err(DispatchError::BadRequest(
            "chat_id and a deliverable payload are required".into(),
        ));
    }

    let reference = conversations
        .resolve(&request.chat_id)
        .await
        .ok_or_else(|| DispatchError::BadRequest(format!("no conversation reference for {}", request.chat_id)))?;

    let token = tokens
        .token("bot-framework", BOT_FRAMEWORK_SCOPE)
        .await
        .map_err(DispatchError::Upstream)?;

    let thread_id = reply_memory
        .decide_thread(
            "teams",
            &request.account_id,
            &reference.conversation_id,
            request.thread_id.as_deref(),
            request.reply_mode.as_deref(),
            reply_mode_default,
        )
        .await;

    let card = if let Some(question) = &request.poll_question {
        Some(poll_card(
            question,
            &request.poll_options,
            request.poll_max_selections.unwrap_or(1),
        ))
    } else {
        request.card.clone()
    };

    let attachments = build_attachments(&request.media_urls, card.as_ref());
    let mut body = json!({"type": "message", "text": request.content.clone().unwrap_or_default()});
    if let Some(thread_id) = &thread_id {
        body["replyToId"] = Value::String(thread_id.clone());
    }
    if !attachments.is_empty() {
        body["attachments"] = Value::Array(attachments);
    }

    let base = service_url_override.unwrap_or(reference.service_url.as_str());
    let url = format!(
        "{base}/v3/conversations/{}/activities",
        reference.conversation_id
    );

    http.execute(|| http.raw().post(&url).bearer_auth(&token).json(&body))
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachment_name_uses_last_path_segment() {
        assert_eq!(attachment_name("https://x.example.com/dir/report.pdf"), "report.pdf");
    }

    #[test]
    fn attachment_name_falls_back_when_path_empty() {
        assert_eq!(attachment_name("https://x.example.com"), "attachment");
    }

    #[test]
    fn build_attachments_appends_card_last() {
        let media = vec!["https://x.example.com/a.png".to_string()];
        let card = json!({"type": "AdaptiveCard"});
        let attachments = build_attachments(&media, Some(&card));
        assert_eq!(attachments.len(), 2);
        assert_eq!(attachments[1]["contentType"], "application/vnd.microsoft.card.adaptive");
    }
}
