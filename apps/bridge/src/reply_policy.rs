use std::collections::HashSet;

use tokio::sync::Mutex;

/// `(channel, account, chat)` triples already granted a thread under the
/// `first` policy (§3 ReplyMemory), guarded by `reply_lock` (§5).
#[derive(Default)]
pub struct ReplyMemory {
    reply_lock: Mutex<HashSet<(String, String, String)>>,
}

impl ReplyMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decides the thread id to use for this post, per §4.8.
    pub async fn decide_thread(
        &self,
        channel: &str,
        account: &str,
        chat_id: &str,
        requested_thread_id: Option<&str>,
        requested_mode: Option<&str>,
        default_mode: &str,
    ) -> Option<String> {
        let thread_id = requested_thread_id.filter(|id| !id.is_empty())?;
        let mode = normalize_mode(requested_mode.unwrap_or(default_mode));

        match mode.as_str() {
            "off" => None,
            "first" => {
                let key = (channel.to_string(), account.to_string(), chat_id.to_string());
                let mut guard = self.reply_lock.lock().await;
                if guard.insert(key) {
                    Some(thread_id.to_string())
                } else {
                    None
                }
            }
            _ => Some(thread_id.to_string()),
        }
    }
}

fn normalize_mode(mode: &str) -> String {
    match mode {
        "off" | "first" | "all" => mode.to_string(),
        _ => "all".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_mode_threads_once_then_stops() {
        let memory = ReplyMemory::new();
        let first = memory
            .decide_thread("slack", "default", "C111", Some("171.2"), Some("first"), "all")
            .await;
        let second = memory
            .decide_thread("slack", "default", "C111", Some("171.2"), Some("first"), "all")
            .await;

        assert_eq!(first.as_deref(), Some("171.2"));
        assert_eq!(second, None);
    }

    #[tokio::test]
    async fn off_mode_never_threads() {
        let memory = ReplyMemory::new();
        let decided = memory
            .decide_thread("slack", "default", "C1", Some("171.2"), Some("off"), "all")
            .await;
        assert_eq!(decided, None);
    }

    #[tokio::test]
    async fn empty_requested_thread_id_is_never_threaded() {
        let memory = ReplyMemory::new();
        let decided = memory
            .decide_thread("slack", "default", "C1", Some(""), Some("all"), "all")
            .await;
        assert_eq!(decided, None);
    }

    #[tokio::test]
    async fn unknown_mode_falls_back_to_all() {
        let memory = ReplyMemory::new();
        let decided = memory
            .decide_thread("slack", "default", "C1", Some("t1"), Some("bogus"), "all")
            .await;
        assert_eq!(decided.as_deref(), Some("t1"));
    }
}
