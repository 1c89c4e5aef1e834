use std::collections::HashMap;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::time::{DelayQueue, delay_queue};

use crate::common::{ChannelId, TypingSignal, UserId};

pub const DEFAULT_TYPING_TTL: Duration = Duration::from_secs(2);

/// A user currently shown as typing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingEntry {
    pub user_id: UserId,
    pub channel_id: ChannelId,
    pub expires_at: Instant,
}

struct Slot {
    entry: TypingEntry,
    timer: delay_queue::Key,
}

/// Per-sender countdowns for the typing indicator of the active channel.
///
/// Every signal restarts that sender's countdown; expiry removes only that
/// sender. Leaving the channel cancels every pending countdown.
pub struct TypingPresence {
    ttl: Duration,
    channel: Option<ChannelId>,
    order: Vec<UserId>,
    slots: HashMap<UserId, Slot>,
    timers: DelayQueue<UserId>,
}

impl TypingPresence {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            channel: None,
            order: Vec::new(),
            slots: HashMap::new(),
            timers: DelayQueue::new(),
        }
    }

    /// Switches the tracked channel. Pending countdowns are dropped.
    pub fn set_channel(&mut self, channel: Option<ChannelId>) {
        self.clear();
        self.channel = channel;
    }

    /// Records a typing signal. Returns true when the sender was not
    /// already shown as typing.
    pub fn observe(&mut self, signal: &TypingSignal, current_user: Option<&str>) -> bool {
        if current_user == Some(signal.user_id.as_str()) {
            return false;
        }
        if self.channel != Some(signal.channel_id) {
            return false;
        }

        let expires_at = Instant::now() + self.ttl;
        if let Some(slot) = self.slots.get_mut(&signal.user_id) {
            self.timers.reset(&slot.timer, self.ttl);
            slot.entry.expires_at = expires_at;
            return false;
        }

        let timer = self.timers.insert(signal.user_id.clone(), self.ttl);
        self.order.push(signal.user_id.clone());
        self.slots.insert(
            signal.user_id.clone(),
            Slot {
                entry: TypingEntry {
                    user_id: signal.user_id.clone(),
                    channel_id: signal.channel_id,
                    expires_at,
                },
                timer,
            },
        );
        true
    }

    /// Explicit stop signal from the sender.
    pub fn stop(&mut self, user_id: &str) -> bool {
        let Some(slot) = self.slots.remove(user_id) else {
            return false;
        };
        self.timers.remove(&slot.timer);
        self.order.retain(|id| id != user_id);
        true
    }

    pub fn clear(&mut self) {
        self.timers.clear();
        self.slots.clear();
        self.order.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Typing users in the order they started typing.
    pub fn entries(&self) -> impl Iterator<Item = &TypingEntry> {
        self.order
            .iter()
            .filter_map(|id| self.slots.get(id).map(|slot| &slot.entry))
    }

    pub fn users(&self) -> Vec<UserId> {
        self.entries().map(|entry| entry.user_id.clone()).collect()
    }

    /// Pending while no countdown has elapsed, including when none is running.
    pub fn poll_expired(&mut self, cx: &mut Context<'_>) -> Poll<UserId> {
        loop {
            match self.timers.poll_expired(cx) {
                Poll::Ready(Some(expired)) => {
                    let user_id = expired.into_inner();
                    if self.slots.remove(&user_id).is_some() {
                        self.order.retain(|id| id != &user_id);
                        return Poll::Ready(user_id);
                    }
                }
                Poll::Ready(None) | Poll::Pending => return Poll::Pending,
            }
        }
    }

    /// Removes every sender whose countdown already ran out. Meant to be
    /// called once per frame; nothing is awaited.
    pub fn drain_expired(&mut self) -> Vec<UserId> {
        let mut cx = Context::from_waker(futures::task::noop_waker_ref());
        let mut expired = Vec::new();
        while let Poll::Ready(user_id) = self.poll_expired(&mut cx) {
            expired.push(user_id);
        }
        expired
    }
}

impl Default for TypingPresence {
    fn default() -> Self {
        Self::new(DEFAULT_TYPING_TTL)
    }
}
