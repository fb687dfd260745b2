//! HTTP implementation of the account-linking collaborator.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::linker::{AccountLinker, LinkReply, LinkStatus, LinkerError, PlayerIdentity};

#[derive(Debug, Clone, Deserialize)]
struct TokenReply {
    status: Option<String>,
    token: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RelationshipReply {
    status: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct IdentityReply {
    name: Option<String>,
    region: Option<String>,
    level: Option<Value>,
}

/// Talks to the friend-service provider over HTTP.
///
/// Every request carries a hard timeout so one slow provider call cannot
/// occupy a request handler indefinitely.
pub struct HttpAccountLinker {
    http: reqwest::Client,
    api_base: String,
}

impl HttpAccountLinker {
    pub fn new(api_base: String, request_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .context("failed to construct account provider http client")?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &Value,
    ) -> Result<T, LinkerError> {
        let url = format!("{}{path}", self.api_base);
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(map_transport_error)?;
        let status = response.status();
        let payload = response.text().await.map_err(map_transport_error)?;
        if !status.is_success() {
            return Err(LinkerError::Transport(format!(
                "{url} returned {status}: {payload}"
            )));
        }
        serde_json::from_str::<T>(&payload)
            .map_err(|error| LinkerError::MalformedReply(format!("{url}: {error}")))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, LinkerError> {
        let url = format!("{}{path}", self.api_base);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(map_transport_error)?;
        let status = response.status();
        let payload = response.text().await.map_err(map_transport_error)?;
        if !status.is_success() {
            return Err(LinkerError::Transport(format!(
                "{url} returned {status}: {payload}"
            )));
        }
        serde_json::from_str::<T>(&payload)
            .map_err(|error| LinkerError::MalformedReply(format!("{url}: {error}")))
    }
}

#[async_trait::async_trait]
impl AccountLinker for HttpAccountLinker {
    async fn authenticate(
        &self,
        account_uid: &str,
        credential: &str,
    ) -> Result<String, LinkerError> {
        let reply: TokenReply = self
            .post_json(
                "/friend/token",
                &json!({ "uid": account_uid, "password": credential }),
            )
            .await?;
        match reply.token {
            Some(token) if reply.status.as_deref() != Some("error") => Ok(token),
            _ => Err(LinkerError::AuthenticationFailed(
                reply
                    .message
                    .unwrap_or_else(|| "provider returned no session token".to_string()),
            )),
        }
    }

    async fn establish_relationship(
        &self,
        session_token: &str,
        target_uid: &str,
    ) -> Result<LinkReply, LinkerError> {
        let reply: RelationshipReply = self
            .post_json(
                "/friend/add",
                &json!({ "token": session_token, "target": target_uid }),
            )
            .await?;
        Ok(relationship_reply_to_link_reply(reply))
    }

    async fn dissolve_relationship(
        &self,
        session_token: &str,
        target_uid: &str,
    ) -> Result<LinkReply, LinkerError> {
        let reply: RelationshipReply = self
            .post_json(
                "/friend/remove",
                &json!({ "token": session_token, "target": target_uid }),
            )
            .await?;
        Ok(relationship_reply_to_link_reply(reply))
    }

    async fn resolve_identity(&self, target_uid: &str) -> Result<PlayerIdentity, LinkerError> {
        let reply: IdentityReply = self.get_json(&format!("/friend/info/{target_uid}")).await?;
        Ok(PlayerIdentity {
            name: reply.name.unwrap_or_else(|| "unknown".to_string()),
            region: reply.region.unwrap_or_else(|| "unknown".to_string()),
            level: reply.level.map(render_level).unwrap_or_else(|| "unknown".to_string()),
        })
    }
}

fn map_transport_error(error: reqwest::Error) -> LinkerError {
    if error.is_timeout() {
        LinkerError::Timeout
    } else {
        LinkerError::Transport(error.to_string())
    }
}

/// Maps the provider's reply onto a structured verdict. Providers that omit
/// the `status` field are classified by scanning the message for a
/// not-found marker.
fn relationship_reply_to_link_reply(reply: RelationshipReply) -> LinkReply {
    let message = reply.message.unwrap_or_default();
    let status = match reply.status.as_deref() {
        Some("success") => LinkStatus::Confirmed,
        Some("not_found") => LinkStatus::NotFound,
        Some(_) => LinkStatus::Rejected,
        None if message.to_lowercase().contains("not found") => LinkStatus::NotFound,
        None => LinkStatus::Rejected,
    };
    LinkReply { status, message }
}

fn render_level(level: Value) -> String {
    match level {
        Value::String(text) => text,
        other => other.to_string(),
    }
}
