use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode, header::AUTHORIZATION};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::common::{ChannelId, ChatError, ChatResult, NetworkEvent};

use super::normalize;

pub type GatewayStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Wire frame of the realtime gateway: `{"event": "...", "data": {...}}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

/// Signals the client pushes to the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outbound {
    JoinChannel(ChannelId),
    LeaveChannel(ChannelId),
    Typing(ChannelId),
}

impl Outbound {
    pub fn to_frame(self) -> Frame {
        let (event, channel_id) = match self {
            Outbound::JoinChannel(id) => ("join_channel", id),
            Outbound::LeaveChannel(id) => ("leave_channel", id),
            Outbound::Typing(id) => ("typing", id),
        };
        Frame {
            event: event.to_string(),
            data: json!({ "channel_id": channel_id }),
        }
    }

    pub fn to_message(self) -> ChatResult<Message> {
        Ok(Message::Text(serde_json::to_string(&self.to_frame())?.into()))
    }
}

/// Opens the gateway connection, authenticating with a bearer token.
pub async fn connect(url: &str, token: Option<&str>) -> ChatResult<GatewayStream> {
    let mut request = url.into_client_request()?;
    if let Some(token) = token {
        let value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|err| ChatError::Socket(tungstenite::Error::HttpFormat(err.into())))?;
        request.headers_mut().insert(AUTHORIZATION, value);
    }
    let (stream, response) = connect_async(request).await.map_err(|err| match err {
        tungstenite::Error::Http(ref response) if response.status() == StatusCode::UNAUTHORIZED => {
            ChatError::Unauthorized
        }
        other => ChatError::Socket(other),
    })?;
    log::debug!("Gateway handshake completed with status {}", response.status());
    Ok(stream)
}

/// Translates one inbound text frame. `Ok(None)` for events the client
/// does not consume.
pub fn decode(text: &str) -> ChatResult<Option<NetworkEvent>> {
    let frame: Frame = serde_json::from_str(text)?;
    let event = match frame.event.as_str() {
        "message_received" => NetworkEvent::MessageReceived(normalize::inbound(frame.data)?),
        "message_updated" => NetworkEvent::MessageUpdated(normalize::inbound(frame.data)?),
        "message_deleted" => {
            let (channel_id, message_id) = normalize::deletion(frame.data)?;
            NetworkEvent::MessageDeleted {
                channel_id,
                message_id,
            }
        }
        "user_typing" => NetworkEvent::UserTyping(normalize::typing(frame.data)?),
        "user_stopped_typing" => NetworkEvent::UserStoppedTyping(normalize::typing(frame.data)?),
        "connected" | "joined_channel" | "joined_team" => {
            log::debug!("Gateway ack `{}`: {}", frame.event, frame.data);
            return Ok(None);
        }
        other => {
            log::debug!("Ignoring gateway event `{other}`");
            return Ok(None);
        }
    };
    Ok(Some(event))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbound_frames() {
        let frame = Outbound::Typing(4).to_frame();
        assert_eq!(frame.event, "typing");
        assert_eq!(frame.data, json!({"channel_id": 4}));

        let Message::Text(text) = Outbound::JoinChannel(9).to_message().unwrap() else {
            panic!("expected text frame");
        };
        let value: Value = serde_json::from_str(text.as_str()).unwrap();
        assert_eq!(value, json!({"event": "join_channel", "data": {"channel_id": 9}}));
    }

    #[test]
    fn test_decode_message_push() {
        let text = r#"{"event":"message_received","data":{"type":"message:new","channel_id":2,
            "message":{"message_id":42,"sender_id":"u1","content":"hello"}}}"#;
        match decode(text).unwrap() {
            Some(NetworkEvent::MessageReceived(inbound)) => {
                assert_eq!(inbound.channel_id, 2);
                assert_eq!(inbound.message.id, Some(42));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_decode_typing_and_deletion() {
        let typing = decode(r#"{"event":"user_typing","data":{"channel_id":1,"user_id":"u7"}}"#)
            .unwrap();
        assert!(matches!(typing, Some(NetworkEvent::UserTyping(ref s)) if s.user_id == "u7"));

        let deleted =
            decode(r#"{"event":"message_deleted","data":{"channel_id":1,"message_id":5}}"#).unwrap();
        assert!(matches!(
            deleted,
            Some(NetworkEvent::MessageDeleted {
                channel_id: 1,
                message_id: 5
            })
        ));
    }

    #[test]
    fn test_unknown_and_malformed_frames() {
        assert!(decode(r#"{"event":"task_updated","data":{}}"#).unwrap().is_none());
        assert!(decode(r#"{"event":"connected"}"#).unwrap().is_none());
        assert!(decode("not json").is_err());
        assert!(decode(r#"{"event":"user_typing","data":{"channel_id":1}}"#).is_err());
    }
}
