use std::time::Duration;

use reqwest::{header, Method, RequestBuilder, Response, StatusCode};
use thiserror::Error;

use super::retry::{retry, Attempt, RetryPolicy};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server error {status}: {body}")]
    Server { status: StatusCode, body: String },
    #[error("client error {status}: {body}")]
    Client { status: StatusCode, body: String },
}

impl HttpError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            HttpError::Transport(_) => None,
            HttpError::Server { status, .. } | HttpError::Client { status, .. } => Some(*status),
        }
    }
}

/// Thin wrapper around [`reqwest::Client`] applying the §4.2 retry
/// classification to every call. Every external HTTP call in this codebase
/// should go through here rather than calling `reqwest` directly.
#[derive(Clone)]
pub struct RetryingHttpClient {
    inner: reqwest::Client,
    policy: RetryPolicy,
}

impl RetryingHttpClient {
    pub fn new() -> Self {
        Self::with_policy(RetryPolicy::default())
    }

    pub fn with_policy(policy: RetryPolicy) -> Self {
        Self::with_timeout_and_policy(REQUEST_TIMEOUT, policy)
    }

    /// Builds a client whose per-request timeout is `timeout` rather than
    /// the default (C16's `BRIDGE_HTTP_TIMEOUT_SECS`, §4.16).
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_timeout_and_policy(timeout, RetryPolicy::default())
    }

    pub fn with_timeout_and_policy(timeout: Duration, policy: RetryPolicy) -> Self {
        let inner = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client builds with static config");
        Self { inner, policy }
    }

    pub fn raw(&self) -> &reqwest::Client {
        &self.inner
    }

    /// Executes a request built from `build`, retrying under the §4.2 rules.
    /// `build` is called fresh on every attempt since `reqwest::Request` is
    /// not cheaply cloneable once a body has been attached.
    pub async fn execute<F>(&self, mut build: F) -> Result<Response, HttpError>
    where
        F: FnMut() -> RequestBuilder,
    {
        retry(self.policy, |_attempt| {
            let request = build();
            async move {
                let response = match request.send().await {
                    Ok(res) => res,
                    Err(err) => return Err(Attempt::retryable(HttpError::Transport(err))),
                };
                classify(response).await
            }
        })
        .await
    }

    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.inner.request(method, url)
    }
}

impl Default for RetryingHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

async fn classify(response: Response) -> Result<Response, Attempt<HttpError>> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after);

    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        if let Some(wait) = retry_after {
            tokio::time::sleep(wait).await;
        }
        let body = response.text().await.unwrap_or_default();
        return Err(Attempt::retryable(HttpError::Server { status, body }));
    }

    let body = response.text().await.unwrap_or_default();
    Err(Attempt::terminal(HttpError::Client { status, body }))
}

/// Parses a `Retry-After` header value: integer seconds, or an HTTP-date
/// (RFC 2822). Negative/invalid input yields `None` (treated as 0 elsewhere).
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    time::OffsetDateTime::parse(value, &time::format_description::well_known::Rfc2822)
        .ok()
        .and_then(|when| {
            let now = time::OffsetDateTime::now_utc();
            let delta = when - now;
            if delta.is_positive() {
                Some(delta.unsigned_abs())
            } else {
                None
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_retry_after_seconds() {
        assert_eq!(parse_retry_after("10"), Some(Duration::from_secs(10)));
    }

    #[test]
    fn parses_retry_after_rfc2822() {
        let future = time::OffsetDateTime::now_utc() + time::Duration::seconds(5);
        let header = future
            .format(&time::format_description::well_known::Rfc2822)
            .unwrap();
        let parsed = parse_retry_after(&header).expect("retry");
        assert!(parsed >= Duration::from_secs(4));
    }

    #[test]
    fn empty_or_invalid_input_yields_none() {
        assert_eq!(parse_retry_after(""), None);
        assert_eq!(parse_retry_after("not-a-date"), None);
        assert_eq!(parse_retry_after("-5"), None);
    }

    #[test]
    fn past_http_date_yields_none() {
        let past = time::OffsetDateTime::now_utc() - time::Duration::seconds(60);
        let header = past
            .format(&time::format_description::well_known::Rfc2822)
            .unwrap();
        assert_eq!(parse_retry_after(&header), None);
    }
}
