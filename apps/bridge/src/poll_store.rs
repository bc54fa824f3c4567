use std::collections::HashMap;

use gsm_core::{now_rfc3339, Poll};
use serde_json::{json, Value};
use tokio::sync::Mutex;

/// Poll definitions and votes (C7), guarded by `poll_lock` (§5).
#[derive(Default)]
pub struct PollStore {
    poll_lock: Mutex<HashMap<String, Poll>>,
}

impl PollStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_polls(polls: HashMap<String, Poll>) -> Self {
        Self {
            poll_lock: Mutex::new(polls),
        }
    }

    /// Creates a poll under a fresh `chat_id:nanos`-shaped key and returns
    /// that key alongside the synthesized adaptive-card payload (§4.7).
    pub async fn create(
        &self,
        chat_id: &str,
        question: &str,
        options: &[String],
        max_selections: u32,
        nonce: u64,
    ) -> (String, Value) {
        let key = format!("{chat_id}:{nonce}");
        let poll = Poll {
            chat_id: chat_id.to_string(),
            question: question.to_string(),
            options: options.to_vec(),
            max_selections,
            created_at_rfc3339: now_rfc3339(),
            votes: HashMap::new(),
            updated_at_rfc3339: None,
        };
        let card = poll_card(question, options, max_selections);

        let mut guard = self.poll_lock.lock().await;
        guard.insert(key.clone(), poll);
        (key, card)
    }

    /// Scans for an open poll matching `chat_id` and records `sender_id`'s
    /// vote, returning `true` if a matching poll was found (§4.7).
    pub async fn record_vote(&self, chat_id: &str, sender_id: &str, selection: &str) -> bool {
        let mut guard = self.poll_lock.lock().await;
        let Some(poll) = guard.values_mut().find(|poll| poll.chat_id == chat_id) else {
            return false;
        };
        poll.record_vote(sender_id, selection);
        true
    }

    pub async fn len(&self) -> usize {
        self.poll_lock.lock().await.len()
    }

    pub async fn snapshot(&self) -> HashMap<String, Poll> {
        self.poll_lock.lock().await.clone()
    }
}

/// Synthesizes an `Input.ChoiceSet` adaptive card with a submit action over
/// `options`, values named `opt_{i}` (§4.7).
pub fn poll_card(question: &str, options: &[String], max_selections: u32) -> Value {
    let choices: Vec<Value> = options
        .iter()
        .enumerate()
        .map(|(i, option)| json!({"title": option, "value": format!("opt_{i}")}))
        .collect();

    json!({
        "type": "AdaptiveCard",
        "version": "1.4",
        "body": [
            {"type": "TextBlock", "text": question, "wrap": true, "weight": "Bolder"},
            {
                "type": "Input.ChoiceSet",
                "id": "poll_choice",
                "style": "expanded",
                "isMultiSelect": max_selections > 1,
                "choices": choices,
            },
        ],
        "actions": [
            {"type": "Action.Submit", "title": "Vote", "data": {"poll_choice": true}}
        ],
    })
}

/// Extracts the voter's selection from an inbound activity's `value` object,
/// looking for `poll_choice` first and falling back to `choices[0]` (§4.7).
pub fn extract_vote_selection(value: &Value) -> Option<String> {
    if let Some(choice) = value.get("poll_choice").and_then(Value::as_str) {
        return Some(choice.to_string());
    }
    value
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_vote_round_trips() {
        let store = PollStore::new();
        let options = vec!["Red".to_string(), "Blue".to_string()];
        let (_key, card) = store.create("C1", "Pick one", &options, 1, 1).await;
        assert_eq!(card["body"][1]["choices"][0]["value"], "opt_0");

        assert!(store.record_vote("C1", "U1", "opt_1").await);
        let polls = store.snapshot().await;
        let poll = polls.values().next().unwrap();
        assert_eq!(poll.votes.get("U1"), Some(&"opt_1".to_string()));
    }

    #[tokio::test]
    async fn vote_for_unknown_chat_is_not_recorded() {
        let store = PollStore::new();
        assert!(!store.record_vote("missing", "U1", "opt_0").await);
    }

    #[test]
    fn extract_vote_prefers_poll_choice_field() {
        let value = json!({"poll_choice": "opt_2", "choices": ["opt_0"]});
        assert_eq!(extract_vote_selection(&value).as_deref(), Some("opt_2"));
    }

    #[test]
    fn extract_vote_falls_back_to_choices_array() {
        let value = json!({"choices": ["opt_1"]});
        assert_eq!(extract_vote_selection(&value).as_deref(), Some("opt_1"));
    }
}
