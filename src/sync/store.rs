use std::collections::HashSet;

use uuid::Uuid;

use crate::common::{
    ChannelId, ChatError, ChatMessage, ChatResult, InboundMessage, MessageId, MessageKey,
    MessagePage,
};

/// Identifies one history request. Results are only applied while the
/// ticket still matches the store's selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket {
    pub channel_id: ChannelId,
    pub page: u32,
    epoch: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Unselected,
    Loading,
    Ready,
    LoadingMore { page: u32 },
}

impl LoadState {
    fn pending_page(self) -> Option<u32> {
        match self {
            LoadState::Loading => Some(1),
            LoadState::LoadingMore { page } => Some(page),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub enum PageOutcome {
    Applied { received: usize },
    /// Result belonged to a previous selection and was dropped.
    Stale,
    /// Fetch failed; the list is unchanged.
    Failed(ChatError),
}

/// Ordered, deduplicated message list of the selected channel.
pub struct ChannelStore {
    selected: Option<ChannelId>,
    epoch: u64,
    state: LoadState,
    page: u32,
    has_more: bool,
    messages: Vec<ChatMessage>,
    keys: HashSet<MessageKey>,
}

impl ChannelStore {
    pub fn new() -> Self {
        Self {
            selected: None,
            epoch: 0,
            state: LoadState::Unselected,
            page: 0,
            has_more: false,
            messages: Vec::new(),
            keys: HashSet::new(),
        }
    }

    /// Switches to `channel_id`, discarding the current list. The returned
    /// ticket must accompany the page-1 fetch.
    pub fn select(&mut self, channel_id: ChannelId) -> LoadTicket {
        self.reset();
        self.selected = Some(channel_id);
        self.state = LoadState::Loading;
        LoadTicket {
            channel_id,
            page: 1,
            epoch: self.epoch,
        }
    }

    /// Back to `Unselected`; any in-flight result becomes stale.
    pub fn clear(&mut self) {
        self.reset();
    }

    fn reset(&mut self) {
        self.epoch += 1;
        self.selected = None;
        self.state = LoadState::Unselected;
        self.page = 0;
        self.has_more = false;
        self.messages.clear();
        self.keys.clear();
    }

    /// Starts fetching the next older page, if there is one and nothing
    /// else is loading.
    pub fn begin_load_more(&mut self) -> Option<LoadTicket> {
        let channel_id = self.selected?;
        if self.state != LoadState::Ready || !self.has_more {
            return None;
        }
        let page = self.page + 1;
        self.state = LoadState::LoadingMore { page };
        Some(LoadTicket {
            channel_id,
            page,
            epoch: self.epoch,
        })
    }

    pub fn apply_page(&mut self, ticket: LoadTicket, result: ChatResult<MessagePage>) -> PageOutcome {
        if !self.is_current(&ticket) {
            log::debug!(
                "Dropping page {} for stale channel {}",
                ticket.page,
                ticket.channel_id
            );
            return PageOutcome::Stale;
        }

        let page = match result {
            Ok(page) => page,
            Err(err) => {
                self.state = LoadState::Ready;
                return PageOutcome::Failed(err);
            }
        };

        let received = page.messages.len();
        if ticket.page <= 1 {
            // Messages pushed live while page 1 was in flight stay after the history.
            let live = std::mem::take(&mut self.messages);
            self.keys.clear();
            for message in page.messages.into_iter().chain(live) {
                self.push_unique(message);
            }
        } else {
            let mut older = Vec::with_capacity(received);
            for mut message in page.messages {
                let key = ensure_key(&mut message);
                if self.keys.insert(key) {
                    older.push(message);
                }
            }
            self.messages.splice(0..0, older);
        }

        self.page = ticket.page;
        self.has_more = page.has_more;
        self.state = LoadState::Ready;
        PageOutcome::Applied { received }
    }

    /// Merges the server's confirmation of our own send. Returns whether
    /// the message was inserted.
    pub fn apply_sent(&mut self, channel_id: ChannelId, message: ChatMessage) -> bool {
        if self.selected != Some(channel_id) {
            return false;
        }
        self.push_unique(message)
    }

    /// Merges a socket-pushed message. Events for other channels are ignored.
    pub fn receive_inbound(&mut self, inbound: InboundMessage) -> bool {
        if self.selected != Some(inbound.channel_id) {
            return false;
        }
        self.push_unique(inbound.message)
    }

    pub fn apply_edit(&mut self, inbound: InboundMessage) -> bool {
        if self.selected != Some(inbound.channel_id) {
            return false;
        }
        let Some(key) = inbound.message.key() else {
            return false;
        };
        match self.messages.iter_mut().find(|m| m.key() == Some(key)) {
            Some(slot) => {
                *slot = inbound.message;
                slot.is_edited = true;
                true
            }
            None => false,
        }
    }

    pub fn apply_delete(&mut self, channel_id: ChannelId, message_id: MessageId) -> bool {
        if self.selected != Some(channel_id) {
            return false;
        }
        let key = MessageKey::Server(message_id);
        if !self.keys.remove(&key) {
            return false;
        }
        self.messages.retain(|m| m.key() != Some(key));
        true
    }

    pub fn selected(&self) -> Option<ChannelId> {
        self.selected
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn is_loading(&self) -> bool {
        self.state.pending_page().is_some()
    }

    /// Last page applied, 0 before the first.
    pub fn page(&self) -> u32 {
        self.page
    }

    fn is_current(&self, ticket: &LoadTicket) -> bool {
        self.selected == Some(ticket.channel_id)
            && self.epoch == ticket.epoch
            && self.state.pending_page() == Some(ticket.page)
    }

    fn push_unique(&mut self, mut message: ChatMessage) -> bool {
        let key = ensure_key(&mut message);
        if !self.keys.insert(key) {
            return false;
        }
        self.messages.push(message);
        true
    }
}

impl Default for ChannelStore {
    fn default() -> Self {
        Self::new()
    }
}

fn ensure_key(message: &mut ChatMessage) -> MessageKey {
    match message.key() {
        Some(key) => key,
        None => {
            let local = Uuid::new_v4();
            message.local_id = Some(local);
            MessageKey::Local(local)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::MessageContent;
    use chrono::Utc;

    fn msg(id: MessageId, channel_id: ChannelId, text: &str) -> ChatMessage {
        ChatMessage {
            id: Some(id),
            local_id: None,
            channel_id,
            sender_id: "sender".to_string(),
            sender_name: None,
            content: MessageContent::Text(text.to_string()),
            sent_at: Utc::now(),
            is_edited: false,
            reply_to_id: None,
        }
    }

    fn page(ids: std::ops::RangeInclusive<MessageId>, channel_id: ChannelId, has_more: bool) -> MessagePage {
        MessagePage {
            messages: ids.map(|id| msg(id, channel_id, "x")).collect(),
            has_more,
        }
    }

    fn ids(store: &ChannelStore) -> Vec<MessageId> {
        store.messages().iter().filter_map(|m| m.id).collect()
    }

    fn ready_store(channel_id: ChannelId) -> ChannelStore {
        let mut store = ChannelStore::new();
        let ticket = store.select(channel_id);
        store.apply_page(ticket, Ok(MessagePage::default()));
        store
    }

    #[test]
    fn test_send_response_then_socket_echo_keeps_one_entry() {
        let mut store = ready_store(1);
        assert!(store.apply_sent(1, msg(42, 1, "hello")));
        assert!(!store.receive_inbound(InboundMessage {
            channel_id: 1,
            message: msg(42, 1, "hello"),
        }));
        assert_eq!(ids(&store), vec![42]);
    }

    #[test]
    fn test_socket_echo_before_send_response_keeps_one_entry() {
        let mut store = ready_store(1);
        assert!(store.receive_inbound(InboundMessage {
            channel_id: 1,
            message: msg(42, 1, "hello"),
        }));
        assert!(!store.apply_sent(1, msg(42, 1, "hello")));
        assert_eq!(store.messages().len(), 1);
        assert_eq!(
            store.messages()[0].content,
            MessageContent::Text("hello".to_string())
        );
    }

    #[test]
    fn test_repeated_deliveries_are_idempotent() {
        let mut store = ready_store(1);
        for _ in 0..3 {
            store.receive_inbound(InboundMessage {
                channel_id: 1,
                message: msg(5, 1, "a"),
            });
            store.apply_sent(1, msg(5, 1, "a"));
        }
        store.apply_sent(1, msg(6, 1, "b"));
        assert_eq!(ids(&store), vec![5, 6]);
    }

    #[test]
    fn test_inbound_for_other_channel_is_ignored() {
        let mut store = ready_store(1);
        store.apply_sent(1, msg(1, 1, "mine"));
        assert!(!store.receive_inbound(InboundMessage {
            channel_id: 2,
            message: msg(2, 2, "elsewhere"),
        }));
        assert!(!store.apply_sent(2, msg(3, 2, "elsewhere")));
        assert_eq!(ids(&store), vec![1]);
    }

    #[test]
    fn test_channel_switch_replaces_list() {
        let mut store = ChannelStore::new();
        let first = store.select(1);
        store.apply_page(first, Ok(page(51..=100, 1, true)));
        let more = store.begin_load_more().unwrap();
        assert_eq!(more.page, 2);
        store.apply_page(more, Ok(page(1..=50, 1, false)));
        assert_eq!(store.messages().len(), 100);

        let switched = store.select(2);
        assert!(store.messages().is_empty());
        store.apply_page(switched, Ok(page(500..=502, 2, false)));
        assert_eq!(ids(&store), vec![500, 501, 502]);
        assert_eq!(store.page(), 1);
    }

    #[test]
    fn test_load_more_prepends_older_without_duplicates() {
        let mut store = ChannelStore::new();
        let first = store.select(1);
        store.apply_page(first, Ok(page(10..=12, 1, true)));
        let more = store.begin_load_more().unwrap();
        store.apply_page(more, Ok(page(8..=10, 1, false)));
        assert_eq!(ids(&store), vec![8, 9, 10, 11, 12]);
        assert!(!store.has_more());
        assert_eq!(store.state(), LoadState::Ready);
    }

    #[test]
    fn test_load_more_requires_ready_and_has_more() {
        let mut store = ChannelStore::new();
        assert!(store.begin_load_more().is_none());

        let first = store.select(1);
        assert!(store.begin_load_more().is_none());
        store.apply_page(first, Ok(page(1..=3, 1, false)));
        assert!(store.begin_load_more().is_none());

        let first = store.select(1);
        store.apply_page(first, Ok(page(1..=3, 1, true)));
        let more = store.begin_load_more().unwrap();
        assert!(store.begin_load_more().is_none());
        assert_eq!(store.state(), LoadState::LoadingMore { page: 2 });
        assert_eq!(more.page, 2);
    }

    #[test]
    fn test_stale_channel_results_are_dropped() {
        let mut store = ChannelStore::new();
        let old = store.select(1);
        let current = store.select(2);

        assert!(matches!(
            store.apply_page(old, Ok(page(1..=2, 1, false))),
            PageOutcome::Stale
        ));
        assert!(store.messages().is_empty());
        assert!(store.is_loading());

        assert!(matches!(
            store.apply_page(current, Ok(page(7..=7, 2, false))),
            PageOutcome::Applied { received: 1 }
        ));
        assert_eq!(ids(&store), vec![7]);
    }

    #[test]
    fn test_reselecting_same_channel_drops_earlier_fetch() {
        let mut store = ChannelStore::new();
        let first = store.select(1);
        store.select(2);
        let again = store.select(1);
        assert!(matches!(
            store.apply_page(first, Ok(page(1..=1, 1, false))),
            PageOutcome::Stale
        ));
        assert!(matches!(
            store.apply_page(again, Ok(page(2..=2, 1, false))),
            PageOutcome::Applied { .. }
        ));
        assert_eq!(ids(&store), vec![2]);
    }

    #[test]
    fn test_failed_fetch_leaves_state_intact() {
        let mut store = ChannelStore::new();
        let first = store.select(1);
        store.apply_page(first, Ok(page(10..=12, 1, true)));
        let more = store.begin_load_more().unwrap();

        let outcome = store.apply_page(more, Err(ChatError::Closed));
        assert!(matches!(outcome, PageOutcome::Failed(ChatError::Closed)));
        assert_eq!(ids(&store), vec![10, 11, 12]);
        assert!(store.has_more());
        assert_eq!(store.page(), 1);
        assert_eq!(store.state(), LoadState::Ready);

        // the same page can be retried
        assert_eq!(store.begin_load_more().unwrap().page, 2);
    }

    #[test]
    fn test_live_message_during_initial_load_survives() {
        let mut store = ChannelStore::new();
        let first = store.select(1);
        store.receive_inbound(InboundMessage {
            channel_id: 1,
            message: msg(99, 1, "fresh"),
        });
        store.receive_inbound(InboundMessage {
            channel_id: 1,
            message: msg(3, 1, "already in history"),
        });
        store.apply_page(first, Ok(page(1..=3, 1, false)));
        assert_eq!(ids(&store), vec![1, 2, 3, 99]);
    }

    #[test]
    fn test_messages_without_server_id_get_local_keys() {
        let mut store = ready_store(1);
        let mut pending = msg(0, 1, "no id");
        pending.id = None;
        assert!(store.receive_inbound(InboundMessage {
            channel_id: 1,
            message: pending.clone(),
        }));
        assert!(store.receive_inbound(InboundMessage {
            channel_id: 1,
            message: pending,
        }));
        assert_eq!(store.messages().len(), 2);
        assert!(store.messages().iter().all(|m| m.local_id.is_some()));

        let local = store.messages()[0].clone();
        assert!(!store.receive_inbound(InboundMessage {
            channel_id: 1,
            message: local,
        }));
    }

    #[test]
    fn test_edit_and_delete() {
        let mut store = ready_store(1);
        store.apply_sent(1, msg(1, 1, "frist"));
        store.apply_sent(1, msg(2, 1, "second"));

        assert!(store.apply_edit(InboundMessage {
            channel_id: 1,
            message: msg(1, 1, "first"),
        }));
        assert!(store.messages()[0].is_edited);
        assert_eq!(
            store.messages()[0].content,
            MessageContent::Text("first".to_string())
        );
        assert!(!store.apply_edit(InboundMessage {
            channel_id: 1,
            message: msg(3, 1, "unknown"),
        }));

        assert!(store.apply_delete(1, 2));
        assert!(!store.apply_delete(1, 2));
        assert!(!store.apply_delete(9, 1));
        assert_eq!(ids(&store), vec![1]);

        // a deleted id may be delivered again later
        assert!(store.apply_sent(1, msg(2, 1, "second")));
    }

    #[test]
    fn test_clear_returns_to_unselected() {
        let mut store = ChannelStore::new();
        let ticket = store.select(4);
        store.clear();
        assert_eq!(store.state(), LoadState::Unselected);
        assert_eq!(store.selected(), None);
        assert!(matches!(
            store.apply_page(ticket, Ok(page(1..=1, 4, false))),
            PageOutcome::Stale
        ));
    }
}
