use super::error::{ChatError, ChatResult};
use super::types::{
    Channel, ChannelId, ChatMessage, InboundMessage, MessageId, MessagePage, TeamId,
    TypingSignal,
};
use crate::sync::LoadTicket;

/// Events the network task reports up to the UI.
#[derive(Debug)]
pub enum NetworkEvent {
    GatewayConnected,
    GatewayDisconnected {
        reason: String,
    },
    ChannelsLoaded {
        team_id: TeamId,
        result: ChatResult<Vec<Channel>>,
    },
    PageLoaded {
        ticket: LoadTicket,
        result: ChatResult<MessagePage>,
    },
    MessageSent {
        channel_id: ChannelId,
        result: ChatResult<ChatMessage>,
    },
    MessageReceived(InboundMessage),
    MessageUpdated(InboundMessage),
    MessageDeleted {
        channel_id: ChannelId,
        message_id: MessageId,
    },
    UserTyping(TypingSignal),
    UserStoppedTyping(TypingSignal),
    /// Failure with no request-specific event to carry it.
    Failed {
        context: &'static str,
        error: ChatError,
    },
}
