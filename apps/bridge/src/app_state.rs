//! Process-wide state container (C16's companion): one instance built once
//! in `main`, shared across handlers via `axum::extract::State` (§9 "Global
//! process state → explicit container").

use std::sync::Arc;

use gsm_core::{PersistedState, RetryingHttpClient, TokenCache};
use gsm_idempotency::{IdempotencyGuard, InMemoryIdemStore, SharedIdemStore};
use security::TeamsJwtVerifier;

use crate::config::BridgeConfig;
use crate::conversation_store::ConversationStore;
use crate::metrics::Metrics;
use crate::poll_store::PollStore;
use crate::reply_policy::ReplyMemory;

/// Everything a handler needs, grouped the way §5's lock names group the
/// state they guard. Construction order matters: the persisted state is
/// loaded once up front and used to seed the conversation/poll/dedupe
/// stores before the router starts accepting requests.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<BridgeConfig>,
    pub http: RetryingHttpClient,
    pub conversations: Arc<ConversationStore>,
    pub polls: Arc<PollStore>,
    pub dedupe: IdempotencyGuard,
    pub reply_memory: Arc<ReplyMemory>,
    pub metrics: Arc<Metrics>,
    pub teams_jwt: Arc<TeamsJwtVerifier>,
    pub teams_tokens: Option<Arc<TokenCache>>,
}

impl AppState {
    pub fn build(config: BridgeConfig) -> Self {
        let loaded = gsm_core::load_state(&config.state_file).unwrap_or_else(|err| {
            tracing::error!(error = %err, "failed to load persisted state, starting empty");
            PersistedState::default()
        });

        let dedupe_store: SharedIdemStore = Arc::new(InMemoryIdemStore::new());
        let restore_entries = loaded
            .inbound_seen
            .iter()
            .filter_map(|(key, expiry)| {
                time::OffsetDateTime::parse(expiry, &time::format_description::well_known::Rfc3339)
                    .ok()
                    .map(|at| (key.clone(), at))
            })
            .collect();

        let conversations =
            ConversationStore::from_parts(loaded.teams_conv_by_id, loaded.teams_conv_by_user_id);
        let polls = PollStore::from_polls(loaded.teams_polls);

        let http = RetryingHttpClient::with_timeout(config.http_timeout);

        let teams_tokens = config.teams_credentials().map(|(app_id, tenant, secret)| {
            Arc::new(TokenCache::new(http.clone(), tenant, app_id, secret))
        });

        let teams_jwt = Arc::new(TeamsJwtVerifier::new(config.teams_app_id.clone()));

        let state = Self {
            config: Arc::new(config),
            http,
            conversations: Arc::new(conversations),
            polls: Arc::new(polls),
            dedupe: IdempotencyGuard::new(dedupe_store),
            reply_memory: Arc::new(ReplyMemory::new()),
            metrics: Arc::new(Metrics::new()),
            teams_jwt,
            teams_tokens,
        };

        // restore() needs the async runtime; deferred to `restore_dedupe`.
        state.schedule_dedupe_restore(restore_entries);
        state
    }

    fn schedule_dedupe_restore(
        &self,
        entries: std::collections::HashMap<String, time::OffsetDateTime>,
    ) {
        if entries.is_empty() {
            return;
        }
        let store = self.dedupe.store().clone();
        tokio::spawn(async move {
            store.restore(entries).await;
        });
    }

    /// Copies the sub-stores under their own locks, then writes outside any
    /// lock, per §4.14's stated discipline. Errors are logged, not
    /// propagated — persistence is a crash-recovery aid, not load-bearing
    /// for the request in flight.
    pub async fn persist(&self) {
        let (teams_conv_by_id, teams_conv_by_user_id) = self.conversations.snapshot().await;
        let teams_polls = self.polls.snapshot().await;
        let inbound_seen = self
            .dedupe
            .store()
            .snapshot()
            .await
            .into_iter()
            .map(|(key, expiry)| {
                let formatted = expiry
                    .format(&time::format_description::well_known::Rfc3339)
                    .unwrap_or_default();
                (key, formatted)
            })
            .collect();

        let snapshot = PersistedState {
            teams_conv_by_id,
            teams_conv_by_user_id,
            inbound_seen,
            teams_polls,
        };

        let path = self.config.state_file.clone();
        if let Err(err) = tokio::task::spawn_blocking(move || gsm_core::save_state(&path, &snapshot))
            .await
            .unwrap_or_else(|err| Err(gsm_core::StateError::Write(std::io::Error::other(err))))
        {
            tracing::error!(error = %err, "failed to persist bridge state");
        }
    }
}
