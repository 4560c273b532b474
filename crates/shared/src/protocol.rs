use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{ConversationRef, GroupId, MessageId, UserId},
    error::FeedParseError,
};

/// Message record as the client displays it, independent of the wire shape
/// it arrived in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: MessageId,
    pub conversation: ConversationRef,
    pub sender_id: UserId,
    pub sender_display_name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn from_group(payload: GroupMessagePayload) -> Self {
        Self {
            id: payload.id,
            conversation: ConversationRef::Group(payload.group_id),
            sender_id: payload.user_id,
            sender_display_name: payload.sender_username,
            content: payload.content,
            created_at: payload.created_at,
        }
    }

    /// Direct payloads do not name the thread, so the peer comes from the
    /// conversation the payload was fetched for.
    pub fn from_direct(payload: DirectMessagePayload, peer_username: &str) -> Self {
        Self {
            id: payload.id,
            conversation: ConversationRef::Direct(peer_username.to_string()),
            sender_id: payload.sender_id,
            sender_display_name: payload.sender_username,
            content: payload.content,
            created_at: payload.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMessagePayload {
    pub id: MessageId,
    pub group_id: GroupId,
    pub user_id: UserId,
    pub sender_username: String,
    pub content: String,
    #[serde(with = "utc_timestamp")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectMessagePayload {
    pub id: MessageId,
    pub sender_id: UserId,
    pub recipient_id: UserId,
    pub sender_username: String,
    pub content: String,
    #[serde(with = "utc_timestamp")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

/// Frames pushed by the live feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum FeedFrame {
    Message(GroupMessagePayload),
    DmMessage(DirectMessagePayload),
}

impl FeedFrame {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::DmMessage(_) => "dm_message",
        }
    }
}

fn expected_frame_kind(conversation: &ConversationRef) -> &'static str {
    match conversation {
        ConversationRef::Group(_) => "message",
        ConversationRef::Direct(_) => "dm_message",
    }
}

/// Decodes one live-feed text frame for `conversation`.
///
/// Only frames whose discriminator matches the conversation kind are
/// accepted; group frames must also name the same group.
pub fn decode_feed_frame(
    text: &str,
    conversation: &ConversationRef,
) -> Result<ChatMessage, FeedParseError> {
    let frame: FeedFrame = serde_json::from_str(text)?;
    match (frame, conversation) {
        (FeedFrame::Message(payload), ConversationRef::Group(group_id)) => {
            if payload.group_id != *group_id {
                return Err(FeedParseError::ForeignGroup {
                    expected: group_id.0,
                    received: payload.group_id.0,
                });
            }
            Ok(ChatMessage::from_group(payload))
        }
        (FeedFrame::DmMessage(payload), ConversationRef::Direct(peer)) => {
            Ok(ChatMessage::from_direct(payload, peer))
        }
        (frame, conversation) => Err(FeedParseError::KindMismatch {
            expected: expected_frame_kind(conversation),
            received: frame.kind(),
        }),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub is_admin: bool,
    #[serde(with = "utc_timestamp")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: UserId,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupSummary {
    pub id: GroupId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub created_by: UserId,
    #[serde(with = "utc_timestamp")]
    pub created_at: DateTime<Utc>,
    /// Present only on the `/groups/all` listing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_member: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupDraft {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMember {
    pub user_id: UserId,
    pub username: String,
    pub role: String,
    pub is_banned: bool,
    #[serde(with = "utc_timestamp")]
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinResponse {
    pub joined: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BanResponse {
    pub banned: bool,
}

/// ISO-8601 timestamps; values without a zone designator are UTC.
pub mod utc_timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Some(parsed.with_timezone(&Utc));
        }
        raw.replacen(' ', "T", 1)
            .parse::<NaiveDateTime>()
            .ok()
            .map(|naive| naive.and_utc())
    }

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid timestamp `{raw}`")))
    }
}
