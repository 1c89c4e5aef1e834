use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::common::{Channel, ChannelId};
use crate::sync::{ChannelStore, TypingPresence};

const MAX_NOTICES: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// Transient, non-blocking notification shown to the user.
#[derive(Debug, Clone)]
pub struct Notice {
    pub timestamp: DateTime<Utc>,
    pub level: NoticeLevel,
    pub message: String,
}

/// Local state of the chat screen.
pub struct AppState {
    pub store: ChannelStore,
    pub typing: TypingPresence,
    pub channels: Vec<Channel>,
    pub notices: VecDeque<Notice>,
    pub gateway_online: bool,
    pub draft: String,
}

impl AppState {
    pub fn new(typing_ttl: Duration) -> Self {
        Self {
            store: ChannelStore::new(),
            typing: TypingPresence::new(typing_ttl),
            channels: Vec::new(),
            notices: VecDeque::new(),
            gateway_online: false,
            draft: String::new(),
        }
    }

    pub fn push_notice(&mut self, level: NoticeLevel, message: impl Into<String>) {
        let notice = Notice {
            timestamp: Utc::now(),
            level,
            message: message.into(),
        };
        match level {
            NoticeLevel::Info => log::info!("{}", notice.message),
            NoticeLevel::Warning => log::warn!("{}", notice.message),
            NoticeLevel::Error => log::error!("{}", notice.message),
        }
        self.notices.push_back(notice);

        if self.notices.len() > MAX_NOTICES {
            self.notices.pop_front();
        }
    }

    pub fn selected_channel(&self) -> Option<&Channel> {
        let id = self.store.selected()?;
        self.channels.iter().find(|channel| channel.id == id)
    }

    pub fn has_channel(&self, channel_id: ChannelId) -> bool {
        self.channels.iter().any(|channel| channel.id == channel_id)
    }

    /// Selection plus teardown of the previous channel's typing timers.
    pub fn select_channel(&mut self, channel_id: ChannelId) -> crate::sync::LoadTicket {
        self.typing.set_channel(Some(channel_id));
        self.store.select(channel_id)
    }

    pub fn leave_channel(&mut self) {
        self.typing.set_channel(None);
        self.store.clear();
    }
}
