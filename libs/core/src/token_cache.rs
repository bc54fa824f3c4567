use std::collections::HashMap;

use serde::Deserialize;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::http::{HttpError, RetryingHttpClient};

/// Minimum remaining lifetime before a cached token is proactively refreshed (§4.4).
const REFRESH_MARGIN_SECS: i64 = 2 * 60;

#[derive(Debug, Clone)]
struct TokenEntry {
    access_token: String,
    expires_at: OffsetDateTime,
}

impl TokenEntry {
    fn is_fresh(&self, now: OffsetDateTime) -> bool {
        self.expires_at - now > time::Duration::seconds(REFRESH_MARGIN_SECS)
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// Per-audience OAuth2 client-credentials token cache (C4). Keyed by an
/// arbitrary audience label so the bot-framework and directory-graph
/// audiences can be refreshed independently while sharing one cache.
///
/// Named `teams_lock` to match this codebase's convention of naming the
/// guard after the shared state it protects (§5).
pub struct TokenCache {
    http: RetryingHttpClient,
    tenant_id: String,
    client_id: String,
    client_secret: String,
    teams_lock: RwLock<HashMap<String, TokenEntry>>,
}

impl TokenCache {
    pub fn new(
        http: RetryingHttpClient,
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            http,
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            teams_lock: RwLock::new(HashMap::new()),
        }
    }

    /// Returns a valid access token for `audience_label`/`scope`, refreshing
    /// it if missing or within [`REFRESH_MARGIN_SECS`] of expiry.
    pub async fn token(&self, audience_label: &str, scope: &str) -> Result<String, HttpError> {
        if let Some(mock) = scope.strip_prefix("mock://") {
            return Ok(format!("mock-token-{mock}"));
        }

        {
            let cache = self.teams_lock.read().await;
            if let Some(entry) = cache.get(audience_label) {
                if entry.is_fresh(OffsetDateTime::now_utc()) {
                    return Ok(entry.access_token.clone());
                }
            }
        }

        let mut cache = self.teams_lock.write().await;
        if let Some(entry) = cache.get(audience_label) {
            if entry.is_fresh(OffsetDateTime::now_utc()) {
                return Ok(entry.access_token.clone());
            }
        }

        let fresh = self.fetch_token(scope).await?;
        let entry = TokenEntry {
            access_token: fresh.access_token.clone(),
            expires_at: OffsetDateTime::now_utc() + time::Duration::seconds(fresh.expires_in),
        };
        cache.insert(audience_label.to_string(), entry);
        Ok(fresh.access_token)
    }

    fn token_url(&self) -> String {
        format!(
            "https://login.microsoftonline.com/{}/oauth2/v2.0/token",
            self.tenant_id
        )
    }

    async fn fetch_token(&self, scope: &str) -> Result<TokenResponse, HttpError> {
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", scope),
        ];

        let response = self
            .http
            .execute(|| self.http.raw().post(self.token_url()).form(&form))
            .await?;

        response
            .json::<TokenResponse>()
            .await
            .map_err(HttpError::Transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_scope_bypasses_network() {
        let cache = TokenCache::new(RetryingHttpClient::new(), "tenant", "client", "secret");
        let token = cache
            .token("bot-framework", "mock://bot-framework")
            .await
            .expect("mock token");
        assert_eq!(token, "mock-token-bot-framework");
    }

    #[tokio::test]
    async fn cached_token_is_reused_until_near_expiry() {
        let cache = TokenCache::new(RetryingHttpClient::new(), "tenant", "client", "secret");
        {
            let mut guard = cache.teams_lock.write().await;
            guard.insert(
                "bot-framework".to_string(),
                TokenEntry {
                    access_token: "cached".into(),
                    expires_at: OffsetDateTime::now_utc() + time::Duration::minutes(10),
                },
            );
        }
        let token = cache
            .token("bot-framework", "https://api.botframework.com/.default")
            .await
            .expect("cached token");
        assert_eq!(token, "cached");
    }

    #[tokio::test]
    async fn near_expiry_token_is_not_considered_fresh() {
        let cache = TokenCache::new(RetryingHttpClient::new(), "tenant", "client", "secret");
        let mut guard = cache.teams_lock.write().await;
        guard.insert(
            "bot-framework".to_string(),
            TokenEntry {
                access_token: "stale".into(),
                expires_at: OffsetDateTime::now_utc() + time::Duration::seconds(30),
            },
        );
        let entry = guard.get("bot-framework").unwrap();
        assert!(!entry.is_fresh(OffsetDateTime::now_utc()));
    }
}
