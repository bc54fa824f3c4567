//! Inbound forwarder: envelope → core-bus POST (C10, §4.10).

use gsm_core::{HttpError, InboundEnvelope, Platform, RetryingHttpClient};
use reqwest::header::CONTENT_TYPE;

fn path_for(platform: Platform) -> &'static str {
    match platform {
        Platform::Slack => "/api/v1/channels/slack/inbound",
        Platform::Teams => "/api/v1/channels/msteams/inbound",
    }
}

/// POSTs `envelope` to the core bus, retried under C1/C2.
pub async fn forward_inbound(
    http: &RetryingHttpClient,
    core_bus_base_url: &str,
    channel_token: Option<&str>,
    platform: Platform,
    envelope: &InboundEnvelope,
) -> Result<(), HttpError> {
    let url = format!("{core_bus_base_url}{}", path_for(platform));
    let body = serde_json::to_vec(envelope).map_err(|err| HttpError::Client {
        status: reqwest::StatusCode::BAD_REQUEST,
        body: err.to_string(),
    })?;

    http.execute(|| {
        let mut builder = http
            .raw()
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .body(body.clone());
        if let Some(token) = channel_token {
            builder = builder.header("X-Channel-Token", token);
        }
        builder
    })
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_for_platform_matches_route_table() {
        assert_eq!(path_for(Platform::Slack), "/api/v1/channels/slack/inbound");
        assert_eq!(path_for(Platform::Teams), "/api/v1/channels/msteams/inbound");
    }
}
