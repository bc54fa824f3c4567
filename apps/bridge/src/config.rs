use std::time::Duration;

/// Process configuration resolved once at startup and shared via `Arc` (C16).
///
/// Platform-specific credentials are read opportunistically: a deployment
/// running only one platform simply never populates the other's fields, and
/// the dispatcher that needs them surfaces `ConfigurationMissing` lazily
/// rather than failing startup (§4.16).
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub core_bus_base_url: String,
    pub core_bus_channel_token: Option<String>,

    pub slack_signing_secret: String,
    pub slack_bot_user_id: Option<String>,
    pub slack_bot_token: Option<String>,
    pub slack_app_token: Option<String>,
    pub slack_media_allowed_hosts: Vec<String>,

    pub teams_app_id: Option<String>,
    pub teams_tenant_id: Option<String>,
    pub teams_client_secret: Option<String>,
    pub teams_bot_name: Option<String>,
    pub teams_service_url_override: Option<String>,

    pub state_file: std::path::PathBuf,
    pub http_timeout: Duration,
    pub reply_mode_default: String,
    pub listen_addr: String,
    pub log_format: String,
}

const DEFAULT_SLACK_MEDIA_HOST: &str = "files.slack.com";
const DEFAULT_STATE_FILE: &str = "./state/bridge-state.json";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 20;
const DEFAULT_REPLY_MODE: &str = "all";
const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

impl BridgeConfig {
    /// Reads every process configuration value from the environment in one
    /// place, per this codebase's `from_env()` convention (§4.16).
    pub fn from_env() -> Self {
        Self {
            core_bus_base_url: std::env::var("CORE_BUS_BASE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8090".into()),
            core_bus_channel_token: std::env::var("CORE_BUS_CHANNEL_TOKEN").ok(),

            slack_signing_secret: std::env::var("SLACK_SIGNING_SECRET").unwrap_or_default(),
            slack_bot_user_id: std::env::var("SLACK_BOT_USER_ID").ok(),
            slack_bot_token: std::env::var("SLACK_BOT_TOKEN").ok(),
            slack_app_token: std::env::var("SLACK_APP_TOKEN").ok(),
            slack_media_allowed_hosts: std::env::var("SLACK_MEDIA_ALLOWED_HOSTS")
                .ok()
                .map(|raw| {
                    raw.split(',')
                        .map(|host| host.trim().to_lowercase())
                        .filter(|host| !host.is_empty())
                        .collect()
                })
                .filter(|hosts: &Vec<String>| !hosts.is_empty())
                .unwrap_or_else(|| vec![DEFAULT_SLACK_MEDIA_HOST.to_string()]),

            teams_app_id: std::env::var("TEAMS_APP_ID").ok(),
            teams_tenant_id: std::env::var("TEAMS_TENANT_ID").ok(),
            teams_client_secret: std::env::var("TEAMS_CLIENT_SECRET").ok(),
            teams_bot_name: std::env::var("TEAMS_BOT_NAME").ok(),
            teams_service_url_override: std::env::var("TEAMS_SERVICE_URL_OVERRIDE").ok(),

            state_file: std::env::var("BRIDGE_STATE_FILE")
                .unwrap_or_else(|_| DEFAULT_STATE_FILE.into())
                .into(),
            http_timeout: std::env::var("BRIDGE_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS)),
            reply_mode_default: std::env::var("BRIDGE_REPLY_MODE_DEFAULT")
                .unwrap_or_else(|_| DEFAULT_REPLY_MODE.into()),
            listen_addr: std::env::var("BRIDGE_LISTEN_ADDR")
                .unwrap_or_else(|_| DEFAULT_LISTEN_ADDR.into()),
            log_format: std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".into()),
        }
    }

    pub fn teams_credentials(
        &self,
    ) -> Option<(&str, &str, &str)> {
        Some((
            self.teams_app_id.as_deref()?,
            self.teams_tenant_id.as_deref()?,
            self.teams_client_secret.as_deref()?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> std::sync::MutexGuard<'static, ()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(())).lock().unwrap()
    }

    #[test]
    fn media_allowlist_defaults_to_slack_files_host() {
        let _guard = env_guard();
        std::env::remove_var("SLACK_MEDIA_ALLOWED_HOSTS");
        let cfg = BridgeConfig::from_env();
        assert_eq!(cfg.slack_media_allowed_hosts, vec!["files.slack.com"]);
    }

    #[test]
    fn media_allowlist_honors_comma_separated_override() {
        let _guard = env_guard();
        std::env::set_var("SLACK_MEDIA_ALLOWED_HOSTS", "Files.Example.com, cdn.example.com");
        let cfg = BridgeConfig::from_env();
        assert_eq!(
            cfg.slack_media_allowed_hosts,
            vec!["files.example.com", "cdn.example.com"]
        );
        std::env::remove_var("SLACK_MEDIA_ALLOWED_HOSTS");
    }

    #[test]
    fn missing_teams_credentials_yield_none() {
        let _guard = env_guard();
        std::env::remove_var("TEAMS_APP_ID");
        std::env::remove_var("TEAMS_TENANT_ID");
        std::env::remove_var("TEAMS_CLIENT_SECRET");
        let cfg = BridgeConfig::from_env();
        assert!(cfg.teams_credentials().is_none());
    }
}
