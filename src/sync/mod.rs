pub mod store;
pub mod typing;

pub use store::{ChannelStore, LoadState, LoadTicket, PageOutcome};
pub use typing::{TypingEntry, TypingPresence};
