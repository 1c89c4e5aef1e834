pub mod commands;
pub mod error;
pub mod events;
pub mod types;

pub use commands::NetworkCommand;
pub use error::{ChatError, ChatResult, ValidationError};
pub use events::NetworkEvent;
pub use types::{
    Channel, ChannelId, ChatMessage, InboundMessage, MessageContent, MessageId, MessageKey,
    MessagePage, MessagePayload, TeamId, TypingSignal, UserId,
};
