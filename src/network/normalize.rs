//! Single translation step from loosely-typed server payloads to the
//! canonical domain types. Identifier spellings are resolved here and
//! nowhere else.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::common::{
    Channel, ChannelId, ChatError, ChatMessage, ChatResult, InboundMessage, MessageContent,
    MessageId, MessagePage, TypingSignal,
};

/// Numeric ids sometimes arrive as strings, user ids sometimes as numbers.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawId {
    Int(i64),
    Str(String),
}

impl RawId {
    fn as_i64(&self) -> Option<i64> {
        match self {
            RawId::Int(value) => Some(*value),
            RawId::Str(value) => value.trim().parse().ok(),
        }
    }

    fn into_string(self) -> String {
        match self {
            RawId::Int(value) => value.to_string(),
            RawId::Str(value) => value,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawRef {
    id: Option<RawId>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    message_id: Option<RawId>,
    id: Option<RawId>,
    channel_id: Option<RawId>,
    channel: Option<RawRef>,
    sender_id: Option<RawId>,
    user_id: Option<RawId>,
    sender_name: Option<String>,
    content: Option<String>,
    sent_at: Option<String>,
    created_at: Option<String>,
    is_edited: Option<bool>,
    reply_to_id: Option<RawId>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawPage {
    Envelope {
        messages: Vec<RawMessage>,
        has_more: Option<bool>,
    },
    Bare(Vec<RawMessage>),
}

#[derive(Debug, Deserialize)]
struct RawChannel {
    channel_id: Option<RawId>,
    id: Option<RawId>,
    team_id: Option<RawId>,
    name: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    message_count: u64,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawChannelList {
    Envelope { data: Vec<RawChannel> },
    Bare(Vec<RawChannel>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawSent {
    Wrapped { message: RawMessage },
    Bare(RawMessage),
}

#[derive(Debug, Deserialize)]
struct RawPresence {
    channel_id: Option<RawId>,
    user_id: Option<RawId>,
}

#[derive(Debug, Deserialize)]
struct RawDeletion {
    channel_id: Option<RawId>,
    message_id: Option<RawId>,
}

fn message_from_raw(raw: RawMessage, channel_hint: Option<ChannelId>) -> ChatResult<ChatMessage> {
    let id = raw
        .message_id
        .or(raw.id)
        .and_then(|id| id.as_i64());
    let channel_id = raw
        .channel_id
        .and_then(|id| id.as_i64())
        .or_else(|| raw.channel.and_then(|c| c.id).and_then(|id| id.as_i64()))
        .or(channel_hint)
        .ok_or(ChatError::MissingField("channel_id"))?;
    let sender_id = raw
        .sender_id
        .or(raw.user_id)
        .map(RawId::into_string)
        .ok_or(ChatError::MissingField("sender_id"))?;

    Ok(ChatMessage {
        id,
        local_id: id.is_none().then(Uuid::new_v4),
        channel_id,
        sender_id,
        sender_name: raw.sender_name,
        content: MessageContent::from_wire(raw.content.unwrap_or_default()),
        sent_at: raw
            .sent_at
            .or(raw.created_at)
            .and_then(|raw| timestamp(&raw))
            .unwrap_or_else(Utc::now),
        is_edited: raw.is_edited.unwrap_or(false),
        reply_to_id: raw.reply_to_id.and_then(|id| id.as_i64()),
    })
}

/// RFC 3339, or a naive ISO timestamp taken as UTC.
fn timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    match NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        Ok(naive) => Some(naive.and_utc()),
        Err(err) => {
            log::debug!("Unparseable timestamp `{raw}`: {err}");
            None
        }
    }
}

fn channel_from_raw(raw: RawChannel) -> ChatResult<Channel> {
    let id = raw
        .channel_id
        .or(raw.id)
        .and_then(|id| id.as_i64())
        .ok_or(ChatError::MissingField("channel_id"))?;
    Ok(Channel {
        id,
        team_id: raw.team_id.and_then(|id| id.as_i64()),
        name: raw.name.unwrap_or_else(|| format!("channel-{id}")),
        kind: raw.kind,
        message_count: raw.message_count,
    })
}

/// Normalizes a history response. An explicit `has_more` wins; a bare
/// array falls back to "a full page means there may be more".
pub fn page(body: Value, channel_id: ChannelId, page_size: usize) -> ChatResult<MessagePage> {
    let (raw_messages, explicit) = match serde_json::from_value::<RawPage>(body)? {
        RawPage::Envelope { messages, has_more } => (messages, has_more),
        RawPage::Bare(messages) => (messages, None),
    };
    let full_page = raw_messages.len() == page_size;
    let messages = raw_messages
        .into_iter()
        .map(|raw| message_from_raw(raw, Some(channel_id)))
        .collect::<ChatResult<Vec<_>>>()?;

    Ok(MessagePage {
        messages,
        has_more: explicit.unwrap_or(full_page),
    })
}

pub fn channels(body: Value) -> ChatResult<Vec<Channel>> {
    let raw = match serde_json::from_value::<RawChannelList>(body)? {
        RawChannelList::Envelope { data } => data,
        RawChannelList::Bare(list) => list,
    };
    raw.into_iter().map(channel_from_raw).collect()
}

/// Normalizes the POST response of a send, bare or wrapped in `message`.
pub fn sent_message(body: Value, channel_id: ChannelId) -> ChatResult<ChatMessage> {
    let raw = match serde_json::from_value::<RawSent>(body)? {
        RawSent::Wrapped { message } => message,
        RawSent::Bare(message) => message,
    };
    message_from_raw(raw, Some(channel_id))
}

/// Normalizes a socket message push: either `{channel_id, message}` or the
/// message object itself.
pub fn inbound(mut body: Value) -> ChatResult<InboundMessage> {
    let envelope_channel = body
        .get("channel_id")
        .cloned()
        .and_then(|value| serde_json::from_value::<RawId>(value).ok())
        .and_then(|id| id.as_i64());
    let raw_body = if body.get("message").is_some_and(Value::is_object) {
        body["message"].take()
    } else {
        body
    };
    let message = message_from_raw(serde_json::from_value(raw_body)?, envelope_channel)?;
    Ok(InboundMessage {
        channel_id: envelope_channel.unwrap_or(message.channel_id),
        message,
    })
}

pub fn typing(body: Value) -> ChatResult<TypingSignal> {
    let raw: RawPresence = serde_json::from_value(body)?;
    Ok(TypingSignal {
        channel_id: raw
            .channel_id
            .and_then(|id| id.as_i64())
            .ok_or(ChatError::MissingField("channel_id"))?,
        user_id: raw
            .user_id
            .map(RawId::into_string)
            .ok_or(ChatError::MissingField("user_id"))?,
    })
}

pub fn deletion(body: Value) -> ChatResult<(ChannelId, MessageId)> {
    let raw: RawDeletion = serde_json::from_value(body)?;
    let channel_id = raw
        .channel_id
        .and_then(|id| id.as_i64())
        .ok_or(ChatError::MissingField("channel_id"))?;
    let message_id = raw
        .message_id
        .and_then(|id| id.as_i64())
        .ok_or(ChatError::MissingField("message_id"))?;
    Ok((channel_id, message_id))
}
