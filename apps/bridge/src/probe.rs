//! Diagnostic introspection endpoints (C13, §4.13).

use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;
use base64::Engine;
use gsm_core::RetryingHttpClient;
use serde::Serialize;
use serde_json::Value;

const SLACK_API_BASE: &str = "https://slack.com/api";
const BOT_FRAMEWORK_SCOPE: &str = "https://api.botframework.com/.default";
const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";
const GRAPH_API_BASE: &str = "https://graph.microsoft.com/v1.0";

#[derive(Debug, Serialize)]
pub struct SlackProbe {
    pub ok: bool,
    pub auth: Value,
}

/// Runs `auth.test` against the configured bot token (§4.13).
pub async fn slack_probe(http: &RetryingHttpClient, bot_token: Option<&str>) -> SlackProbe {
    let Some(token) = bot_token else {
        return SlackProbe {
            ok: false,
            auth: serde_json::json!({"error": "SLACK_BOT_TOKEN not configured"}),
        };
    };

    match http
        .execute(|| {
            http.raw()
                .post(format!("{SLACK_API_BASE}/auth.test"))
                .bearer_auth(token)
        })
        .await
    {
        Ok(response) => match response.json::<Value>().await {
            Ok(body) => SlackProbe {
                ok: body["ok"].as_bool().unwrap_or(false),
                auth: body,
            },
            Err(err) => SlackProbe {
                ok: false,
                auth: serde_json::json!({"error": err.to_string()}),
            },
        },
        Err(err) => SlackProbe {
            ok: false,
            auth: serde_json::json!({"error": err.to_string()}),
        },
    }
}

/// Decodes a JWT's payload segment without verifying signature or header,
/// for diagnostic display only (§4.13).
fn decode_payload_unverified(token: &str) -> Option<Value> {
    let payload_b64 = token.split('.').nth(1)?;
    let bytes = B64.decode(payload_b64).ok()?;
    serde_json::from_slice(&bytes).ok()
}

#[derive(Debug, Serialize)]
pub struct TokenIntrospection {
    pub present: bool,
    pub audience: Option<Value>,
    pub issuer: Option<String>,
    pub expires_at: Option<i64>,
    pub scopes: Option<String>,
    pub roles: Option<Value>,
}

fn introspect(token: Option<&str>) -> TokenIntrospection {
    let Some(claims) = token.and_then(decode_payload_unverified) else {
        return TokenIntrospection {
            present: token.is_some(),
            audience: None,
            issuer: None,
            expires_at: None,
            scopes: None,
            roles: None,
        };
    };
    TokenIntrospection {
        present: true,
        audience: claims.get("aud").cloned(),
        issuer: claims.get("iss").and_then(Value::as_str).map(str::to_string),
        expires_at: claims.get("exp").and_then(Value::as_i64),
        scopes: claims.get("scp").and_then(Value::as_str).map(str::to_string),
        roles: claims.get("roles").cloned(),
    }
}

#[derive(Debug, Serialize)]
pub struct CapabilityProbe {
    pub capability: &'static str,
    pub status: u16,
    pub pass: bool,
    pub required_permission_hint: Option<&'static str>,
    pub remediation: Option<&'static str>,
}

fn remediation_for(capability: &'static str, status: u16) -> (Option<&'static str>, Option<&'static str>) {
    match status {
        401 => (
            Some("graph token missing or expired"),
            Some("verify TEAMS_CLIENT_SECRET and TEAMS_TENANT_ID, then retry"),
        ),
        403 => {
            let hint = match capability {
                "users" => "User.Read.All (application)",
                "teams" => "Team.ReadBasic.All (application)",
                "channels" => "Channel.ReadBasic.All (application)",
                "organization" => "Organization.Read.All (application)",
                _ => "an application permission for this capability",
            };
            (
                Some(hint),
                Some("grant admin consent for the missing application permission in Entra ID"),
            )
        }
        _ => (None, None),
    }
}

async fn probe_capability(
    http: &RetryingHttpClient,
    token: &str,
    capability: &'static str,
    path: &str,
) -> CapabilityProbe {
    let url = format!("{GRAPH_API_BASE}{path}");
    let status = match http.raw().get(&url).bearer_auth(token).send().await {
        Ok(response) => response.status().as_u16(),
        Err(_) => 0,
    };
    let (required_permission_hint, remediation) = remediation_for(capability, status);
    CapabilityProbe {
        capability,
        status,
        pass: (200..300).contains(&status),
        required_permission_hint,
        remediation,
    }
}

#[derive(Debug, Serialize)]
pub struct TeamsProbe {
    pub bot_token: TokenIntrospection,
    pub graph_token: TokenIntrospection,
    pub capabilities: Vec<CapabilityProbe>,
}

/// Decodes the cached bot/graph tokens (headers and signature ignored,
/// diagnostic only) and runs per-capability GET probes against Graph
/// (§4.13).
pub async fn teams_probe(
    http: &RetryingHttpClient,
    tokens: Option<&gsm_core::TokenCache>,
) -> TeamsProbe {
    let Some(tokens) = tokens else {
        return TeamsProbe {
            bot_token: introspect(None),
            graph_token: introspect(None),
            capabilities: Vec::new(),
        };
    };

    let bot_token = tokens.token("bot-framework", BOT_FRAMEWORK_SCOPE).await.ok();
    let graph_token = tokens.token("directory-graph", GRAPH_SCOPE).await.ok();

    let capabilities = if let Some(token) = &graph_token {
        vec![
            probe_capability(http, token, "users", "/users?$top=1").await,
            probe_capability(http, token, "teams", "/teams?$top=1").await,
            probe_capability(http, token, "channels", "/teams/getAllMessages?$top=1").await,
            probe_capability(http, token, "organization", "/organization").await,
        ]
    } else {
        Vec::new()
    };

    TeamsProbe {
        bot_token: introspect(bot_token.as_deref()),
        graph_token: introspect(graph_token.as_deref()),
        capabilities,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;

    fn sample_jwt(claims: Value) -> String {
        let header = B64.encode(r#"{"alg":"none"}"#);
        let payload = B64.encode(claims.to_string());
        format!("{header}.{payload}.")
    }

    #[test]
    fn decode_payload_extracts_claims() {
        let token = sample_jwt(serde_json::json!({"aud": "app", "exp": 123, "iss": "https://x"}));
        let claims = decode_payload_unverified(&token).expect("decodes");
        assert_eq!(claims["aud"], "app");
        assert_eq!(claims["exp"], 123);
    }

    #[test]
    fn introspect_reports_absent_token() {
        let result = introspect(None);
        assert!(!result.present);
    }

    #[test]
    fn introspect_reports_present_claims() {
        let token = sample_jwt(serde_json::json!({"aud": "app", "exp": 123}));
        let result = introspect(Some(&token));
        assert!(result.present);
        assert_eq!(result.expires_at, Some(123));
    }

    #[test]
    fn remediation_hints_are_capability_specific() {
        let (hint, _) = remediation_for("users", 403);
        assert_eq!(hint, Some("User.Read.All (application)"));
        let (hint, _) = remediation_for("teams", 401);
        assert!(hint.is_some());
    }
}
