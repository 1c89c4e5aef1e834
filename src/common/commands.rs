use super::types::{ChannelId, MessagePayload, TeamId};
use crate::sync::LoadTicket;

/// Commands the UI sends down to the network task.
#[derive(Debug, Clone)]
pub enum NetworkCommand {
    LoadChannels {
        team_id: TeamId,
    },
    /// Fetch one history page; the ticket travels back with the result so
    /// the store can drop it if the selection moved on.
    LoadPage {
        ticket: LoadTicket,
    },
    /// Payload has already passed local validation.
    SendMessage {
        channel_id: ChannelId,
        payload: MessagePayload,
    },
    JoinChannel {
        channel_id: ChannelId,
    },
    LeaveChannel {
        channel_id: ChannelId,
    },
    /// One outbound typing signal per command; callers throttle.
    Typing {
        channel_id: ChannelId,
    },
}
