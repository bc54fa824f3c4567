use std::collections::HashMap;

use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, JwkSet};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde_json::Value;
use time::OffsetDateTime;
use tokio::sync::Mutex;

const JWKS_CACHE_WINDOW_SECS: i64 = 30 * 60;
const NBF_SKEW_SECS: i64 = 60;

const DEFAULT_OPENID_CONFIG_URL: &str =
    "https://login.botframework.com/v1/.well-known/openidconfiguration";

const TRUSTED_SERVICE_URL_SUFFIXES: &[&str] = &[
    ".trafficmanager.net",
    ".botframework.com",
    ".teams.microsoft.com",
];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TeamsJwtError {
    #[error("malformed bearer token")]
    Malformed,
    #[error("unsupported signing algorithm")]
    UnsupportedAlgorithm,
    #[error("token is missing a key id")]
    MissingKeyId,
    #[error("no matching signing key found")]
    KeyNotFound,
    #[error("signature verification failed")]
    SignatureInvalid,
    #[error("audience does not match the configured app id")]
    AudienceMismatch,
    #[error("issuer is missing or does not match the discovered issuer")]
    IssuerMismatch,
    #[error("token has expired")]
    Expired,
    #[error("token is not yet valid")]
    NotYetValid,
    #[error("request service URL is not in the trusted suffix set")]
    UntrustedServiceUrl,
    #[error("token's serviceurl claim does not match the request service URL")]
    ServiceUrlClaimMismatch,
    #[error("failed to discover signing keys: {0}")]
    Discovery(String),
}

#[derive(Debug, Clone)]
pub struct TeamsClaims {
    pub raw: Value,
}

impl TeamsClaims {
    pub fn service_url_claim(&self) -> Option<&str> {
        self.raw
            .get("serviceurl")
            .or_else(|| self.raw.get("serviceUrl"))
            .and_then(Value::as_str)
    }
}

struct JwksCacheState {
    keys_by_kid: HashMap<String, Jwk>,
    issuer: String,
    cache_until: OffsetDateTime,
}

impl JwksCacheState {
    fn empty() -> Self {
        Self {
            keys_by_kid: HashMap::new(),
            issuer: String::new(),
            cache_until: OffsetDateTime::UNIX_EPOCH,
        }
    }

    fn is_fresh(&self, now: OffsetDateTime) -> bool {
        now < self.cache_until
    }
}

/// Verifies Bot Framework RS256 activity tokens against the published JWKS,
/// caching discovered keys for [`JWKS_CACHE_WINDOW_SECS`].
///
/// Verification is skipped entirely (bypass mode) when no app id is
/// configured, matching test-mode deployments.
pub struct TeamsJwtVerifier {
    http: reqwest::Client,
    openid_config_url: String,
    app_id: Option<String>,
    jwt_lock: Mutex<JwksCacheState>,
}

impl TeamsJwtVerifier {
    pub fn new(app_id: Option<String>) -> Self {
        Self::with_config_url(app_id, DEFAULT_OPENID_CONFIG_URL.to_string())
    }

    pub fn with_config_url(app_id: Option<String>, openid_config_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            openid_config_url,
            app_id,
            jwt_lock: Mutex::new(JwksCacheState::empty()),
        }
    }

    pub fn is_bypassed(&self) -> bool {
        self.app_id.is_none()
    }

    pub async fn verify(
        &self,
        bearer_token: &str,
        request_service_url: &str,
    ) -> Result<TeamsClaims, TeamsJwtError> {
        let Some(app_id) = self.app_id.as_deref() else {
            return Ok(TeamsClaims {
                raw: Value::Object(Default::default()),
            });
        };

        let header = decode_header(bearer_token).map_err(|_| TeamsJwtError::Malformed)?;
        if header.alg != Algorithm::RS256 {
            return Err(TeamsJwtError::UnsupportedAlgorithm);
        }
        let kid = header.kid.filter(|k| !k.is_empty()).ok_or(TeamsJwtError::MissingKeyId)?;

        let (jwk, issuer) = self.resolve_key(&kid).await?;
        let decoding_key =
            DecodingKey::from_jwk(&jwk).map_err(|_| TeamsJwtError::SignatureInvalid)?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let data = decode::<Value>(bearer_token, &decoding_key, &validation)
            .map_err(|_| TeamsJwtError::SignatureInvalid)?;
        let claims = data.claims;

        let now = OffsetDateTime::now_utc();
        check_audience(&claims, app_id)?;
        check_issuer(&claims, &issuer)?;
        check_times(&claims, now)?;
        check_service_url_trust(request_service_url)?;
        check_service_url_claim(&claims, request_service_url)?;

        Ok(TeamsClaims { raw: claims })
    }

    async fn resolve_key(&self, kid: &str) -> Result<(Jwk, String), TeamsJwtError> {
        let mut state = self.jwt_lock.lock().await;
        let now = OffsetDateTime::now_utc();
        let needs_refresh = !state.is_fresh(now) || !state.keys_by_kid.contains_key(kid);

        if needs_refresh {
            let (keys, issuer) = self.fetch_jwks().await?;
            state.keys_by_kid = keys;
            state.issuer = issuer;
            state.cache_until = now + time::Duration::seconds(JWKS_CACHE_WINDOW_SECS);
        }

        state
            .keys_by_kid
            .get(kid)
            .cloned()
            .map(|jwk| (jwk, state.issuer.clone()))
            .ok_or(TeamsJwtError::KeyNotFound)
    }

    async fn fetch_jwks(&self) -> Result<(HashMap<String, Jwk>, String), TeamsJwtError> {
        #[derive(serde::Deserialize)]
        struct OpenIdConfig {
            issuer: String,
            jwks_uri: String,
        }

        let config: OpenIdConfig = self
            .http
            .get(&self.openid_config_url)
            .send()
            .await
            .map_err(|e| TeamsJwtError::Discovery(e.to_string()))?
            .json()
            .await
            .map_err(|e| TeamsJwtError::Discovery(e.to_string()))?;

        let jwk_set: JwkSet = self
            .http
            .get(&config.jwks_uri)
            .send()
            .await
            .map_err(|e| TeamsJwtError::Discovery(e.to_string()))?
            .json()
            .await
            .map_err(|e| TeamsJwtError::Discovery(e.to_string()))?;

        let mut keys_by_kid = HashMap::new();
        for jwk in jwk_set.keys {
            if !matches!(jwk.algorithm, AlgorithmParameters::RSA(_)) {
                continue;
            }
            if let Some(kid) = jwk.common.key_id.clone().filter(|k| !k.is_empty()) {
                keys_by_kid.insert(kid, jwk);
            }
        }

        Ok((keys_by_kid, config.issuer))
    }
}

fn check_audience(claims: &Value, app_id: &str) -> Result<(), TeamsJwtError> {
    let aud = claims.get("aud");
    let matches = match aud {
        Some(Value::String(s)) => s == app_id,
        Some(Value::Array(items)) => items.iter().any(|v| v.as_str() == Some(app_id)),
        _ => false,
    };
    if matches {
        Ok(())
    } else {
        Err(TeamsJwtError::AudienceMismatch)
    }
}

fn check_issuer(claims: &Value, cached_issuer: &str) -> Result<(), TeamsJwtError> {
    let iss = claims.get("iss").and_then(Value::as_str).unwrap_or_default();
    if iss.is_empty() || cached_issuer.is_empty() {
        return Err(TeamsJwtError::IssuerMismatch);
    }
    if normalize_issuer(iss) == normalize_issuer(cached_issuer) {
        Ok(())
    } else {
        Err(TeamsJwtError::IssuerMismatch)
    }
}

fn normalize_issuer(issuer: &str) -> String {
    issuer.trim_end_matches('/').to_lowercase()
}

fn check_times(claims: &Value, now: OffsetDateTime) -> Result<(), TeamsJwtError> {
    let exp = claims.get("exp").and_then(Value::as_i64).ok_or(TeamsJwtError::Expired)?;
    if now.unix_timestamp() >= exp {
        return Err(TeamsJwtError::Expired);
    }
    if let Some(nbf) = claims.get("nbf").and_then(Value::as_i64) {
        if now.unix_timestamp() + NBF_SKEW_SECS < nbf {
            return Err(TeamsJwtError::NotYetValid);
        }
    }
    Ok(())
}

fn check_service_url_trust(request_service_url: &str) -> Result<(), TeamsJwtError> {
    if host_is_trusted(request_service_url) {
        Ok(())
    } else {
        Err(TeamsJwtError::UntrustedServiceUrl)
    }
}

fn check_service_url_claim(claims: &Value, request_service_url: &str) -> Result<(), TeamsJwtError> {
    let Some(claim_url) = claims
        .get("serviceurl")
        .or_else(|| claims.get("serviceUrl"))
        .and_then(Value::as_str)
    else {
        return Ok(());
    };

    if !host_is_trusted(claim_url) {
        return Err(TeamsJwtError::UntrustedServiceUrl);
    }

    let claim_host = extract_host(claim_url).unwrap_or_default().to_lowercase();
    let request_host = extract_host(request_service_url).unwrap_or_default().to_lowercase();
    if claim_host == request_host {
        Ok(())
    } else {
        Err(TeamsJwtError::ServiceUrlClaimMismatch)
    }
}

fn host_is_trusted(url: &str) -> bool {
    let Some(host) = extract_host(url) else {
        return false;
    };
    let host = host.to_lowercase();
    TRUSTED_SERVICE_URL_SUFFIXES
        .iter()
        .any(|suffix| host.ends_with(suffix))
}

fn extract_host(url: &str) -> Option<String> {
    url::Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::thread_rng;
    use rsa::traits::PublicKeyParts;
    use rsa::RsaPrivateKey;

    fn sample_rsa_jwk(kid: &str, private: &RsaPrivateKey) -> Jwk {
        use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;
        use base64::Engine;

        let public = private.to_public_key();
        let n = B64.encode(public.n().to_bytes_be());
        let e = B64.encode(public.e().to_bytes_be());
        let json = serde_json::json!({
            "kty": "RSA",
            "use": "sig",
            "kid": kid,
            "alg": "RS256",
            "n": n,
            "e": e,
        });
        serde_json::from_value(json).expect("valid jwk")
    }

    #[test]
    fn trusted_suffixes_match_expected_hosts() {
        assert!(host_is_trusted("https://smba.trafficmanager.net/emea"));
        assert!(host_is_trusted("https://api.botframework.com"));
        assert!(host_is_trusted("https://smba.teams.microsoft.com/x"));
        assert!(!host_is_trusted("https://evil.example.com"));
    }

    #[test]
    fn bypass_mode_without_app_id() {
        let verifier = TeamsJwtVerifier::new(None);
        assert!(verifier.is_bypassed());
    }

    #[test]
    fn issuer_normalization_ignores_trailing_slash_and_case() {
        assert_eq!(
            normalize_issuer("https://api.botframework.com/"),
            normalize_issuer("HTTPS://API.BOTFRAMEWORK.COM")
        );
    }

    #[test]
    fn jwk_from_rsa_key_has_expected_kid() {
        let mut rng = thread_rng();
        let key = RsaPrivateKey::new(&mut rng, 2048).expect("key");
        let jwk = sample_rsa_jwk("kid-1", &key);
        assert_eq!(jwk.common.key_id.as_deref(), Some("kid-1"));
    }
}
