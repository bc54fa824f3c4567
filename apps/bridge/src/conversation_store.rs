use std::collections::HashMap;

use gsm_core::ConversationRef;
use tokio::sync::RwLock;

/// Conversation-id and user-id indexed lookup for Teams reply routing (C6).
///
/// Guards both indices under one lock named `teams_lock`, matching this
/// codebase's convention of naming a guard after the shared state it
/// protects (§5); the token caches that share the same conceptual lock in
/// the source system live in [`gsm_core::TokenCache`] with their own
/// independent lock, a deliberate split recorded in the grounding ledger.
#[derive(Default)]
pub struct ConversationStore {
    teams_lock: RwLock<ConversationIndices>,
}

#[derive(Default, Clone)]
struct ConversationIndices {
    by_conversation_id: HashMap<String, ConversationRef>,
    by_user_id: HashMap<String, ConversationRef>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(
        by_conversation_id: HashMap<String, ConversationRef>,
        by_user_id: HashMap<String, ConversationRef>,
    ) -> Self {
        Self {
            teams_lock: RwLock::new(ConversationIndices {
                by_conversation_id,
                by_user_id,
            }),
        }
    }

    /// Records a Teams activity's conversation reference under both indices.
    pub async fn record(&self, user_id: &str, reference: ConversationRef) {
        let mut guard = self.teams_lock.write().await;
        guard
            .by_conversation_id
            .insert(reference.conversation_id.clone(), reference.clone());
        guard.by_user_id.insert(user_id.to_string(), reference);
    }

    /// Resolves a target that may be a raw conversation id, a raw user id, or
    /// one of the prefixed forms `conversation:`, `user:`, `msteams:user:`
    /// (§4.6).
    pub async fn resolve(&self, target: &str) -> Option<ConversationRef> {
        let normalized = normalize_target(target);
        let guard = self.teams_lock.read().await;
        guard
            .by_conversation_id
            .get(normalized)
            .or_else(|| guard.by_user_id.get(normalized))
            .filter(|reference| reference.is_valid())
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.teams_lock.read().await.by_conversation_id.len()
    }

    pub async fn snapshot(
        &self,
    ) -> (
        HashMap<String, ConversationRef>,
        HashMap<String, ConversationRef>,
    ) {
        let guard = self.teams_lock.read().await;
        (
            guard.by_conversation_id.clone(),
            guard.by_user_id.clone(),
        )
    }
}

fn normalize_target(target: &str) -> &str {
    for prefix in ["msteams:user:", "conversation:", "user:"] {
        if let Some(stripped) = target.strip_prefix(prefix) {
            return stripped;
        }
    }
    target
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_ref(conversation_id: &str) -> ConversationRef {
        ConversationRef {
            service_url: "https://smba.trafficmanager.net/emea".into(),
            conversation_id: conversation_id.into(),
            user_id: "user-1".into(),
        }
    }

    #[tokio::test]
    async fn resolves_by_conversation_id_and_user_id() {
        let store = ConversationStore::new();
        store.record("user-1", sample_ref("conv-1")).await;

        assert!(store.resolve("conv-1").await.is_some());
        assert!(store.resolve("user-1").await.is_some());
        assert!(store.resolve("conversation:conv-1").await.is_some());
        assert!(store.resolve("msteams:user:user-1").await.is_some());
    }

    #[tokio::test]
    async fn unknown_target_resolves_to_none() {
        let store = ConversationStore::new();
        assert!(store.resolve("missing").await.is_none());
    }
}
