//! Directory resolver: human-typed names → platform IDs (C12, §4.12).

use gsm_core::{HttpError, RetryingHttpClient, TokenCache};
use serde_json::Value;

use crate::dispatch::DispatchError;

const SLACK_API_BASE: &str = "https://slack.com/api";
const GRAPH_API_BASE: &str = "https://graph.microsoft.com/v1.0";
const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";

fn looks_resolved_slack(input: &str) -> bool {
    input.starts_with('U') || input.starts_with('C') || input.starts_with('G')
}

/// Paginates `users.list`, matching `input` against lowercase name/real_name/
/// display_name (§4.12).
pub async fn slack_resolve_user(
    http: &RetryingHttpClient,
    bot_token: &str,
    input: &str,
) -> Result<Option<String>, DispatchError> {
    if looks_resolved_slack(input) {
        return Ok(Some(input.to_string()));
    }
    let needle = input.to_lowercase();

    let mut cursor: Option<String> = None;
    loop {
        let mut url = format!("{SLACK_API_BASE}/users.list?limit=200");
        if let Some(c) = &cursor {
            url.push_str("&cursor=");
            url.push_str(c);
        }
        let response = http
            .execute(|| http.raw().get(&url).bearer_auth(bot_token))
            .await?;
        let body: Value = response.json().await.map_err(HttpError::Transport)?;

        for member in body["members"].as_array().into_iter().flatten() {
            let id = member["id"].as_str().unwrap_or_default();
            let name = member["name"].as_str().unwrap_or_default().to_lowercase();
            let real_name = member["real_name"].as_str().unwrap_or_default().to_lowercase();
            let display_name = member["profile"]["display_name"]
                .as_str()
                .unwrap_or_default()
                .to_lowercase();
            if name == needle || real_name == needle || display_name == needle {
                return Ok(Some(id.to_string()));
            }
        }

        cursor = body["response_metadata"]["next_cursor"]
            .as_str()
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        if cursor.is_none() {
            return Ok(None);
        }
    }
}

/// Paginates `conversations.list`, matching `input` against lowercase
/// channel `name` (§4.12).
pub async fn slack_resolve_channel(
    http: &RetryingHttpClient,
    bot_token: &str,
    input: &str,
) -> Result<Option<String>, DispatchError> {
    if looks_resolved_slack(input) {
        return Ok(Some(input.to_string()));
    }
    let needle = input.to_lowercase();

    let mut cursor: Option<String> = None;
    loop {
        let mut url = format!("{SLACK_API_BASE}/conversations.list?limit=200");
        if let Some(c) = &cursor {
            url.push_str("&cursor=");
            url.push_str(c);
        }
        let response = http
            .execute(|| http.raw().get(&url).bearer_auth(bot_token))
            .await?;
        let body: Value = response.json().await.map_err(HttpError::Transport)?;

        for channel in body["channels"].as_array().into_iter().flatten() {
            let id = channel["id"].as_str().unwrap_or_default();
            let name = channel["name"].as_str().unwrap_or_default().to_lowercase();
            if name == needle {
                return Ok(Some(id.to_string()));
            }
        }

        cursor = body["response_metadata"]["next_cursor"]
            .as_str()
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        if cursor.is_none() {
            return Ok(None);
        }
    }
}

fn looks_resolved_teams(input: &str) -> bool {
    input.contains('@') || uuid::Uuid::parse_str(input).is_ok()
}

/// Lists `/users` via Graph with `$select`, matching `input` against
/// display name / mail / UPN; GUID or `@`-bearing inputs pass through
/// (§4.12).
pub async fn teams_resolve_user(
    http: &RetryingHttpClient,
    tokens: &TokenCache,
    input: &str,
) -> Result<Option<String>, DispatchError> {
    if looks_resolved_teams(input) {
        return Ok(Some(input.to_string()));
    }
    let needle = input.to_lowercase();
    let token = tokens.token("directory-graph", GRAPH_SCOPE).await?;

    let url = format!(
        "{GRAPH_API_BASE}/users?$select=id,displayName,mail,userPrincipalName&$top=999"
    );
    let response = http
        .execute(|| http.raw().get(&url).bearer_auth(&token))
        .await?;
    let body: Value = response.json().await.map_err(HttpError::Transport)?;

    for user in body["value"].as_array().into_iter().flatten() {
        let id = user["id"].as_str().unwrap_or_default();
        let display_name = user["displayName"].as_str().unwrap_or_default().to_lowercase();
        let mail = user["mail"].as_str().unwrap_or_default().to_lowercase();
        let upn = user["userPrincipalName"]
            .as_str()
            .unwrap_or_default()
            .to_lowercase();
        if display_name == needle || mail == needle || upn == needle {
            return Ok(Some(id.to_string()));
        }
    }
    Ok(None)
}

/// Resolves a `team/channel`-shaped input by matching the team's display
/// name first, then the channel's within that team; a bare input resolves
/// against `/teams` directly (§4.12).
pub async fn teams_resolve_channel(
    http: &RetryingHttpClient,
    tokens: &TokenCache,
    input: &str,
) -> Result<Option<String>, DispatchError> {
    if looks_resolved_teams(input) {
        return Ok(Some(input.to_string()));
    }
    let token = tokens.token("directory-graph", GRAPH_SCOPE).await?;

    let Some((team_part, channel_part)) = input.split_once('/') else {
        return teams_resolve_team(http, tokens, input).await;
    };

    let Some(team_id) = teams_resolve_team(http, tokens, team_part).await? else {
        return Ok(None);
    };
    let needle = channel_part.to_lowercase();

    let url = format!("{GRAPH_API_BASE}/teams/{team_id}/channels?$select=id,displayName");
    let response = http
        .execute(|| http.raw().get(&url).bearer_auth(&token))
        .await?;
    let body: Value = response.json().await.map_err(HttpError::Transport)?;

    for channel in body["value"].as_array().into_iter().flatten() {
        let id = channel["id"].as_str().unwrap_or_default();
        let name = channel["displayName"].as_str().unwrap_or_default().to_lowercase();
        if name == needle {
            return Ok(Some(id.to_string()));
        }
    }
    Ok(None)
}

/// Lists `/teams` (via the joined-teams endpoint), matching `input` against
/// lowercase display name (§4.12).
pub async fn teams_resolve_team(
    http: &RetryingHttpClient,
    tokens: &TokenCache,
    input: &str,
) -> Result<Option<String>, DispatchError> {
    if looks_resolved_teams(input) {
        return Ok(Some(input.to_string()));
    }
    let needle = input.to_lowercase();
    let token = tokens.token("directory-graph", GRAPH_SCOPE).await?;

    let url = format!("{GRAPH_API_BASE}/groups?$select=id,displayName&$filter=resourceProvisioningOptions/Any(x:x eq 'Team')");
    let response = http
        .execute(|| http.raw().get(&url).bearer_auth(&token))
        .await?;
    let body: Value = response.json().await.map_err(HttpError::Transport)?;

    for team in body["value"].as_array().into_iter().flatten() {
        let id = team["id"].as_str().unwrap_or_default();
        let name = team["displayName"].as_str().unwrap_or_default().to_lowercase();
        if name == needle {
            return Ok(Some(id.to_string()));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slack_prefixed_ids_are_passed_through() {
        assert!(looks_resolved_slack("U123"));
        assert!(looks_resolved_slack("C123"));
        assert!(looks_resolved_slack("G123"));
        assert!(!looks_resolved_slack("alice"));
    }

    #[test]
    fn teams_guid_or_email_is_passed_through() {
        assert!(looks_resolved_teams("alice@example.com"));
        assert!(looks_resolved_teams("3fa85f64-5717-4562-b3fc-2c963f66afa6"));
        assert!(!looks_resolved_teams("alice"));
    }
}
