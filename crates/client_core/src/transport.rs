//! REST bindings for the chat backend.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use shared::{
    domain::{ConversationRef, GroupId, UserId},
    error::RequestError,
    protocol::{
        BanResponse, ChatMessage, DirectMessagePayload, GroupDraft, GroupMember,
        GroupMessagePayload, GroupSummary, JoinResponse, SendMessageRequest, SignupRequest,
        TokenResponse, User, UserSummary,
    },
};
use tracing::debug;
use url::Url;

use crate::error::TransportError;

pub const LOAD_MESSAGES_FALLBACK: &str = "Failed to load messages";
pub const SEND_MESSAGE_FALLBACK: &str = "Failed to send message";

/// Message operations the synchronizer depends on.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn load_history(
        &self,
        conversation: &ConversationRef,
    ) -> Result<Vec<ChatMessage>, TransportError>;
    async fn send_message(
        &self,
        conversation: &ConversationRef,
        content: &str,
    ) -> Result<ChatMessage, TransportError>;
    fn feed_url(&self, conversation: &ConversationRef) -> Result<Url, TransportError>;
}

#[derive(Clone)]
pub struct HttpTransport {
    http: Client,
    base_url: Url,
    token: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, token: impl Into<String>) -> Result<Self, TransportError> {
        Ok(Self {
            http: Client::new(),
            base_url: Url::parse(base_url.trim_end_matches('/'))?,
            token: token.into(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn set_token(&mut self, token: impl Into<String>) {
        self.token = token.into();
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, TransportError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(&self.token)
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        fallback: &str,
    ) -> Result<T, TransportError> {
        let response = request.send().await.map_err(TransportError::Network)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = RequestError::from_body(status.as_u16(), &body, fallback);
            debug!(status = err.status, message = %err.message, "chat api request rejected");
            return Err(err.into());
        }
        response.json::<T>().await.map_err(TransportError::Decode)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        fallback: &str,
    ) -> Result<T, TransportError> {
        let url = self.endpoint(segments)?;
        debug!(%url, "GET");
        self.execute(self.authorized(self.http.get(url)), fallback)
            .await
    }

    async fn post_empty<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        fallback: &str,
    ) -> Result<T, TransportError> {
        let url = self.endpoint(segments)?;
        debug!(%url, "POST");
        self.execute(self.authorized(self.http.post(url)), fallback)
            .await
    }

    pub async fn signup(&self, request: &SignupRequest) -> Result<User, TransportError> {
        let url = self.endpoint(&["auth", "signup"])?;
        self.execute(self.http.post(url).json(request), "Signup failed")
            .await
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<TokenResponse, TransportError> {
        let url = self.endpoint(&["auth", "login"])?;
        let form = [("username", username), ("password", password)];
        self.execute(self.http.post(url).form(&form), "Login failed")
            .await
    }

    pub async fn me(&self) -> Result<User, TransportError> {
        self.get(&["users", "me"], "Unauthorized").await
    }

    pub async fn user_by_username(&self, username: &str) -> Result<UserSummary, TransportError> {
        self.get(&["users", "by-username", username], "User not found")
            .await
    }

    pub async fn list_groups(&self) -> Result<Vec<GroupSummary>, TransportError> {
        self.get(&["groups"], "Failed to load groups").await
    }

    pub async fn list_all_groups(&self) -> Result<Vec<GroupSummary>, TransportError> {
        self.get(&["groups", "all"], "Failed to load groups").await
    }

    pub async fn create_group(&self, draft: &GroupDraft) -> Result<GroupSummary, TransportError> {
        let url = self.endpoint(&["groups"])?;
        self.execute(
            self.authorized(self.http.post(url).json(draft)),
            "Failed to create group",
        )
        .await
    }

    pub async fn update_group(
        &self,
        group_id: GroupId,
        draft: &GroupDraft,
    ) -> Result<GroupSummary, TransportError> {
        let url = self.endpoint(&["groups", &group_id.to_string()])?;
        self.execute(
            self.authorized(self.http.put(url).json(draft)),
            "Failed to update group",
        )
        .await
    }

    pub async fn delete_group(&self, group_id: GroupId) -> Result<serde_json::Value, TransportError> {
        let url = self.endpoint(&["groups", &group_id.to_string()])?;
        self.execute(self.authorized(self.http.delete(url)), "Failed to delete group")
            .await
    }

    pub async fn join_group(&self, group_id: GroupId) -> Result<JoinResponse, TransportError> {
        self.post_empty(&["groups", &group_id.to_string(), "join"], "Failed to join group")
            .await
    }

    pub async fn list_members(&self, group_id: GroupId) -> Result<Vec<GroupMember>, TransportError> {
        self.get(
            &["groups", &group_id.to_string(), "members"],
            "Failed to load members",
        )
        .await
    }

    pub async fn ban_member(
        &self,
        group_id: GroupId,
        user_id: UserId,
    ) -> Result<BanResponse, TransportError> {
        self.post_empty(
            &[
                "groups",
                &group_id.to_string(),
                "members",
                &user_id.to_string(),
                "ban",
            ],
            "Failed to ban member",
        )
        .await
    }

    pub async fn unban_member(
        &self,
        group_id: GroupId,
        user_id: UserId,
    ) -> Result<BanResponse, TransportError> {
        self.post_empty(
            &[
                "groups",
                &group_id.to_string(),
                "members",
                &user_id.to_string(),
                "unban",
            ],
            "Failed to unban member",
        )
        .await
    }
}

fn messages_path(conversation: &ConversationRef) -> Vec<String> {
    match conversation {
        ConversationRef::Group(group_id) => {
            vec!["groups".into(), group_id.to_string(), "messages".into()]
        }
        ConversationRef::Direct(username) => vec![
            "dm".into(),
            "with".into(),
            username.clone(),
            "messages".into(),
        ],
    }
}

/// Derives the live-feed origin from the REST origin (`http` becomes `ws`,
/// `https` becomes `wss`).
pub fn feed_url_for(
    base_url: &Url,
    token: &str,
    conversation: &ConversationRef,
) -> Result<Url, TransportError> {
    let raw = base_url.as_str();
    let ws_base = if let Some(rest) = raw.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = raw.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        raw.to_string()
    };

    let mut url = Url::parse(&ws_base)?;
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?;
        segments.pop_if_empty();
        match conversation {
            ConversationRef::Group(group_id) => {
                segments.extend(["ws", "groups", &group_id.to_string()]);
            }
            ConversationRef::Direct(username) => {
                segments.extend(["ws", "dm", username.as_str()]);
            }
        }
    }
    url.query_pairs_mut().append_pair("token", token);
    Ok(url)
}

#[async_trait]
impl ChatApi for HttpTransport {
    async fn load_history(
        &self,
        conversation: &ConversationRef,
    ) -> Result<Vec<ChatMessage>, TransportError> {
        let path = messages_path(conversation);
        let segments: Vec<&str> = path.iter().map(String::as_str).collect();
        match conversation {
            ConversationRef::Group(_) => {
                let payloads: Vec<GroupMessagePayload> =
                    self.get(&segments, LOAD_MESSAGES_FALLBACK).await?;
                Ok(payloads.into_iter().map(ChatMessage::from_group).collect())
            }
            ConversationRef::Direct(peer) => {
                let payloads: Vec<DirectMessagePayload> =
                    self.get(&segments, LOAD_MESSAGES_FALLBACK).await?;
                Ok(payloads
                    .into_iter()
                    .map(|payload| ChatMessage::from_direct(payload, peer))
                    .collect())
            }
        }
    }

    async fn send_message(
        &self,
        conversation: &ConversationRef,
        content: &str,
    ) -> Result<ChatMessage, TransportError> {
        let path = messages_path(conversation);
        let segments: Vec<&str> = path.iter().map(String::as_str).collect();
        let url = self.endpoint(&segments)?;
        debug!(%url, %conversation, "POST message");
        let request = self.authorized(self.http.post(url).json(&SendMessageRequest {
            content: content.to_string(),
        }));
        match conversation {
            ConversationRef::Group(_) => {
                let payload: GroupMessagePayload =
                    self.execute(request, SEND_MESSAGE_FALLBACK).await?;
                Ok(ChatMessage::from_group(payload))
            }
            ConversationRef::Direct(peer) => {
                let payload: DirectMessagePayload =
                    self.execute(request, SEND_MESSAGE_FALLBACK).await?;
                Ok(ChatMessage::from_direct(payload, peer))
            }
        }
    }

    fn feed_url(&self, conversation: &ConversationRef) -> Result<Url, TransportError> {
        feed_url_for(&self.base_url, &self.token, conversation)
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
