//! Slack Web API client — identity lookups and message posting.
//! Thin reqwest wrapper; every call is `POST {base}/{method}` with a bearer token.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

pub const SLACK_API_BASE: &str = "https://slack.com/api";

const PAGE_LIMIT: &str = "200";
const HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum SlackError {
    #[error("{method}: request failed: {source}")]
    Http {
        method: String,
        #[source]
        source: reqwest::Error,
    },

    /// Slack answered `{"ok": false, "error": ...}`.
    #[error("{method}: {error}")]
    Api { method: String, error: String },

    #[error("{method}: unexpected response: {source}")]
    Decode {
        method: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("channel {0} not found")]
    ChannelNotFound(String),

    #[error("user @{0} not found")]
    UserNotFound(String),
}

/// What the session needs from the platform. `SlackClient` is the real one.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// User id of the bot token's own user (`auth.test`).
    async fn self_user_id(&self) -> Result<String, SlackError>;

    /// Channel id for a name, with or without the leading `#`.
    async fn resolve_channel(&self, name: &str) -> Result<String, SlackError>;

    /// User id for a handle (no `@`), matching username or display name.
    async fn resolve_user(&self, handle: &str) -> Result<String, SlackError>;

    /// `@display_name`, or `@name` when no display name is set.
    async fn user_label(&self, user_id: &str) -> Result<String, SlackError>;

    /// Post `text`, threaded under `thread_ts` when given. Returns the new message ts.
    async fn post_message(
        &self,
        channel_id: &str,
        text: &str,
        thread_ts: Option<&str>,
    ) -> Result<String, SlackError>;
}

// ── Response shapes ──

#[derive(Debug, Deserialize)]
struct AuthTest {
    user_id: String,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: String,
}

#[derive(Debug, Deserialize)]
struct Channel {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ConversationsList {
    #[serde(default)]
    channels: Vec<Channel>,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Default, Deserialize)]
struct Profile {
    #[serde(default)]
    display_name: String,
}

#[derive(Debug, Deserialize)]
struct User {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    profile: Profile,
}

impl User {
    fn matches_handle(&self, handle: &str) -> bool {
        if handle.is_empty() {
            return false;
        }
        self.name == handle || self.profile.display_name == handle
    }

    fn label(&self) -> String {
        if self.profile.display_name.is_empty() {
            format!("@{}", self.name)
        } else {
            format!("@{}", self.profile.display_name)
        }
    }
}

#[derive(Debug, Deserialize)]
struct UsersList {
    #[serde(default)]
    members: Vec<User>,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    user: User,
}

#[derive(Debug, Deserialize)]
struct PostMessage {
    ts: String,
}

#[derive(Debug, Deserialize)]
struct ConnectionsOpen {
    url: String,
}

fn next_cursor(meta: Option<ResponseMetadata>) -> Option<String> {
    meta.map(|m| m.next_cursor).filter(|c| !c.is_empty())
}

/// `#general` and `general` both name the same channel.
pub fn normalize_channel_name(name: &str) -> &str {
    name.trim().trim_start_matches('#')
}

/// Split Slack's `{ok, error, ...}` envelope into the typed body or an API error.
fn decode<T: DeserializeOwned>(method: &str, body: Value) -> Result<T, SlackError> {
    if !body.get("ok").and_then(Value::as_bool).unwrap_or(false) {
        let error = body
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown_error")
            .to_string();
        return Err(SlackError::Api {
            method: method.to_string(),
            error,
        });
    }
    serde_json::from_value(body).map_err(|source| SlackError::Decode {
        method: method.to_string(),
        source,
    })
}

// ── Client ──

#[derive(Debug, Clone)]
pub struct SlackClient {
    http: reqwest::Client,
    bot_token: String,
    base_url: String,
}

impl SlackClient {
    pub fn new(bot_token: impl Into<String>) -> Result<Self, SlackError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("ask-human/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|source| SlackError::Http {
                method: "client".to_string(),
                source,
            })?;
        Ok(Self {
            http,
            bot_token: bot_token.into(),
            base_url: SLACK_API_BASE.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        token: &str,
        params: &[(&str, &str)],
    ) -> Result<T, SlackError> {
        debug!(method, "Slack API call");
        let http_err = |source: reqwest::Error| SlackError::Http {
            method: method.to_string(),
            source,
        };
        let body: Value = self
            .http
            .post(format!("{}/{}", self.base_url, method))
            .bearer_auth(token)
            .form(params)
            .send()
            .await
            .map_err(http_err)?
            .error_for_status()
            .map_err(http_err)?
            .json()
            .await
            .map_err(http_err)?;
        decode(method, body)
    }

    /// WebSocket URL for a new Socket Mode connection. Needs the app-level token.
    pub async fn open_socket_url(&self, app_token: &str) -> Result<String, SlackError> {
        let opened: ConnectionsOpen = self.call("apps.connections.open", app_token, &[]).await?;
        Ok(opened.url)
    }
}

#[async_trait]
impl ChatApi for SlackClient {
    async fn self_user_id(&self) -> Result<String, SlackError> {
        let auth: AuthTest = self.call("auth.test", &self.bot_token, &[]).await?;
        Ok(auth.user_id)
    }

    async fn resolve_channel(&self, name: &str) -> Result<String, SlackError> {
        let target = normalize_channel_name(name);
        let mut cursor = String::new();
        loop {
            let page: ConversationsList = self
                .call(
                    "conversations.list",
                    &self.bot_token,
                    &[
                        ("types", "public_channel,private_channel"),
                        ("exclude_archived", "true"),
                        ("limit", PAGE_LIMIT),
                        ("cursor", cursor.as_str()),
                    ],
                )
                .await?;
            if let Some(ch) = page.channels.into_iter().find(|c| c.name == target) {
                return Ok(ch.id);
            }
            match next_cursor(page.response_metadata) {
                Some(next) => cursor = next,
                None => return Err(SlackError::ChannelNotFound(format!("#{}", target))),
            }
        }
    }

    async fn resolve_user(&self, handle: &str) -> Result<String, SlackError> {
        let mut cursor = String::new();
        loop {
            let page: UsersList = self
                .call(
                    "users.list",
                    &self.bot_token,
                    &[("limit", PAGE_LIMIT), ("cursor", cursor.as_str())],
                )
                .await?;
            if let Some(user) = page.members.into_iter().find(|u| u.matches_handle(handle)) {
                return Ok(user.id);
            }
            match next_cursor(page.response_metadata) {
                Some(next) => cursor = next,
                None => return Err(SlackError::UserNotFound(handle.to_string())),
            }
        }
    }

    async fn user_label(&self, user_id: &str) -> Result<String, SlackError> {
        let info: UserInfo = self
            .call("users.info", &self.bot_token, &[("user", user_id)])
            .await?;
        Ok(info.user.label())
    }

    async fn post_message(
        &self,
        channel_id: &str,
        text: &str,
        thread_ts: Option<&str>,
    ) -> Result<String, SlackError> {
        let mut params = vec![("channel", channel_id), ("text", text)];
        if let Some(ts) = thread_ts {
            params.push(("thread_ts", ts));
        }
        let posted: PostMessage = self.call("chat.postMessage", &self.bot_token, &params).await?;
        Ok(posted.ts)
    }
}
