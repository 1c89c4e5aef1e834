use std::sync::LazyLock;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::ValidationError;

pub type ChannelId = i64;
pub type MessageId = i64;
pub type TeamId = i64;
pub type UserId = String;

static IMAGE_DATA_URI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^data:image/[A-Za-z0-9.+-]+;base64,[A-Za-z0-9+/]+=*$")
        .expect("image data URI pattern is valid")
});

/// A named sub-stream of messages within a team's chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    pub team_id: Option<TeamId>,
    pub name: String,
    pub kind: Option<String>,
    pub message_count: u64,
}

/// Body of a chat message: plain text or an inline image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageContent {
    Text(String),
    Image { data_uri: String },
}

impl MessageContent {
    /// Classifies a raw wire string. Anything that is not a well-formed
    /// image data URI is treated as text.
    pub fn from_wire(raw: String) -> Self {
        if is_image_data_uri(&raw) {
            MessageContent::Image { data_uri: raw }
        } else {
            MessageContent::Text(raw)
        }
    }

    pub fn as_wire(&self) -> &str {
        match self {
            MessageContent::Text(text) => text,
            MessageContent::Image { data_uri } => data_uri,
        }
    }
}

/// Deduplication key of a stored message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKey {
    Server(MessageId),
    Local(Uuid),
}

/// Domain model of a chat message after normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Server-assigned id, absent until the server acknowledges the message.
    pub id: Option<MessageId>,
    /// Client-generated temporary id used before a server id exists.
    pub local_id: Option<Uuid>,
    pub channel_id: ChannelId,
    pub sender_id: UserId,
    pub sender_name: Option<String>,
    pub content: MessageContent,
    pub sent_at: DateTime<Utc>,
    pub is_edited: bool,
    pub reply_to_id: Option<MessageId>,
}

impl ChatMessage {
    /// Resolved identity: server id first, temporary id otherwise.
    pub fn key(&self) -> Option<MessageKey> {
        self.id
            .map(MessageKey::Server)
            .or(self.local_id.map(MessageKey::Local))
    }
}

/// One page of channel history, oldest message first.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MessagePage {
    pub messages: Vec<ChatMessage>,
    pub has_more: bool,
}

/// Socket push carrying a new message for some channel.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub channel_id: ChannelId,
    pub message: ChatMessage,
}

/// Socket push announcing that a user is composing in a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingSignal {
    pub channel_id: ChannelId,
    pub user_id: UserId,
}

/// Outgoing message body before it is handed to the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessagePayload {
    Text(String),
    Image { data_uri: String },
}

impl MessagePayload {
    /// Builds an image payload from raw file bytes, rejecting non-image MIME types.
    pub fn image(mime_type: &str, bytes: &[u8]) -> Result<Self, ValidationError> {
        if !mime_type.starts_with("image/") {
            return Err(ValidationError::NotAnImage(mime_type.to_string()));
        }
        if bytes.is_empty() {
            return Err(ValidationError::InvalidDataUri);
        }
        Ok(MessagePayload::Image {
            data_uri: format!("data:{mime_type};base64,{}", STANDARD.encode(bytes)),
        })
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            MessagePayload::Text(text) if text.trim().is_empty() => {
                Err(ValidationError::EmptyMessage)
            }
            MessagePayload::Text(_) => Ok(()),
            MessagePayload::Image { data_uri } if is_image_data_uri(data_uri) => Ok(()),
            MessagePayload::Image { .. } => Err(ValidationError::InvalidDataUri),
        }
    }

    /// Content string sent in the POST body.
    pub fn into_wire(self) -> String {
        match self {
            MessagePayload::Text(text) => text.trim().to_string(),
            MessagePayload::Image { data_uri } => data_uri,
        }
    }
}

pub fn is_image_data_uri(raw: &str) -> bool {
    IMAGE_DATA_URI.is_match(raw)
}

/// Guesses an image MIME type from a file extension.
pub fn image_mime_for_extension(extension: &str) -> Option<&'static str> {
    match extension.to_ascii_lowercase().as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "bmp" => Some("image/bmp"),
        "svg" => Some("image/svg+xml"),
        _ => None,
    }
}
