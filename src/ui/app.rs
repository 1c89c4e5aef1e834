use std::path::Path;
use std::time::Duration;

use eframe::egui;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::common::{
    ChannelId, ChatError, MessagePayload, NetworkCommand, NetworkEvent, TeamId, UserId,
    ValidationError, types::image_mime_for_extension,
};
use crate::storage::SessionCache;
use crate::storage::session_cache::keys;
use crate::sync::{LoadTicket, PageOutcome};

use super::components::{chat_area, input_bar, notices, sidebar};
use super::state::{AppState, NoticeLevel};

const TYPING_THROTTLE: Duration = Duration::from_secs(1);

/// Whether the UI keeps going after handling a network event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// HTTP 401 somewhere: session state was cleared, re-authenticate.
    SessionExpired,
}

/// Who is signed in and where the screen should start.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub user_id: Option<UserId>,
    pub team_id: Option<TeamId>,
    pub preferred_channel: Option<ChannelId>,
}

pub struct ChatApp {
    state: AppState,
    session: Session,
    cache: SessionCache,
    command_sender: mpsc::Sender<NetworkCommand>,
    event_receiver: mpsc::Receiver<NetworkEvent>,
    last_typing_signal: Option<Instant>,
    session_expired: bool,
}

impl ChatApp {
    pub fn new(
        state: AppState,
        session: Session,
        cache: SessionCache,
        command_sender: mpsc::Sender<NetworkCommand>,
        event_receiver: mpsc::Receiver<NetworkEvent>,
    ) -> Self {
        Self {
            state,
            session,
            cache,
            command_sender,
            event_receiver,
            last_typing_signal: None,
            session_expired: false,
        }
    }

    fn send_command(&mut self, command: NetworkCommand) {
        if let Err(err) = self.command_sender.try_send(command) {
            log::warn!("Failed to send command to network: {err}");
            self.state
                .push_notice(NoticeLevel::Error, ChatError::Closed.to_string());
        }
    }

    pub fn start(&mut self) {
        match self.session.team_id {
            Some(team_id) => self.send_command(NetworkCommand::LoadChannels { team_id }),
            None => self
                .state
                .push_notice(NoticeLevel::Warning, "No team configured; use --team <id>"),
        }
    }

    pub fn select_channel(&mut self, channel_id: ChannelId) {
        if let Some(previous) = self.state.store.selected() {
            self.send_command(NetworkCommand::LeaveChannel {
                channel_id: previous,
            });
        }
        let ticket = self.state.select_channel(channel_id);
        self.send_command(NetworkCommand::JoinChannel { channel_id });
        self.request_page(ticket);

        if let Some(user_id) = self.session.user_id.as_deref() {
            if let Err(err) = self.cache.put(user_id, keys::LAST_CHANNEL, &channel_id) {
                log::warn!("Failed to remember last channel: {err}");
            }
        }
    }

    pub fn load_more(&mut self) {
        match self.state.store.begin_load_more() {
            Some(ticket) => self.request_page(ticket),
            None if self.state.store.is_loading() => {
                self.state.push_notice(NoticeLevel::Info, "Already loading")
            }
            None => self
                .state
                .push_notice(NoticeLevel::Info, "No older messages"),
        }
    }

    fn request_page(&mut self, ticket: LoadTicket) {
        self.send_command(NetworkCommand::LoadPage { ticket });
    }

    /// Validates locally; only valid payloads reach the network. Returns
    /// whether the message was handed to the network task.
    pub fn send(&mut self, payload: MessagePayload) -> bool {
        let Some(channel_id) = self.state.store.selected() else {
            self.state
                .push_notice(NoticeLevel::Warning, "Select a channel first");
            return false;
        };
        match payload.validate() {
            Ok(()) => {
                self.send_command(NetworkCommand::SendMessage {
                    channel_id,
                    payload,
                });
                true
            }
            Err(ValidationError::EmptyMessage) => false,
            Err(err) => {
                self.state.push_notice(NoticeLevel::Warning, err.to_string());
                false
            }
        }
    }

    /// Sends the draft as a text message and clears it once it was accepted.
    pub fn submit_draft(&mut self) {
        let text = self.state.draft.clone();
        if self.send(MessagePayload::Text(text)) {
            self.state.draft.clear();
            self.last_typing_signal = None;
        }
    }

    /// The draft changed; let the channel know we are typing.
    pub fn draft_edited(&mut self) {
        if !self.state.draft.trim().is_empty() {
            self.notify_typing();
        }
    }

    pub fn attach_image(&mut self, path: &Path) {
        let mime = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(image_mime_for_extension);
        let Some(mime) = mime else {
            let err = ValidationError::NotAnImage(path.display().to_string());
            self.state.push_notice(NoticeLevel::Warning, err.to_string());
            return;
        };
        match std::fs::read(path) {
            Ok(bytes) => self.attach_bytes(mime, &bytes),
            Err(err) => self.state.push_notice(
                NoticeLevel::Warning,
                format!("Cannot read {}: {err}", path.display()),
            ),
        }
    }

    fn attach_bytes(&mut self, mime: &str, bytes: &[u8]) {
        match MessagePayload::image(mime, bytes) {
            Ok(payload) => {
                self.send(payload);
            }
            Err(err) => self.state.push_notice(NoticeLevel::Warning, err.to_string()),
        }
    }

    /// Files dropped on the window are sent as image messages.
    fn attach_dropped(&mut self, file: &egui::DroppedFile) {
        match (&file.path, &file.bytes) {
            (Some(path), _) => self.attach_image(path),
            (None, Some(bytes)) => self.attach_bytes(&file.mime, bytes),
            (None, None) => log::warn!("Dropped file {} has no content", file.name),
        }
    }

    /// Emits a typing signal, at most once per `TYPING_THROTTLE`.
    pub fn notify_typing(&mut self) {
        let Some(channel_id) = self.state.store.selected() else {
            return;
        };
        let now = Instant::now();
        if self
            .last_typing_signal
            .is_some_and(|last| now.duration_since(last) < TYPING_THROTTLE)
        {
            return;
        }
        self.last_typing_signal = Some(now);
        self.send_command(NetworkCommand::Typing { channel_id });
    }

    pub fn handle_network_event(&mut self, event: NetworkEvent) -> Flow {
        match event {
            NetworkEvent::GatewayConnected => {
                self.state.gateway_online = true;
                self.state
                    .push_notice(NoticeLevel::Info, "Realtime connection established");
            }
            NetworkEvent::GatewayDisconnected { reason } => {
                self.state.gateway_online = false;
                self.state.push_notice(
                    NoticeLevel::Warning,
                    format!("Realtime connection lost: {reason}"),
                );
            }
            NetworkEvent::ChannelsLoaded { team_id, result } => match result {
                Ok(channels) => {
                    if self.session.team_id != Some(team_id) {
                        log::debug!("Dropping channel list for stale team {team_id}");
                        return Flow::Continue;
                    }
                    self.state.channels = channels;
                    if self.state.store.selected().is_none() {
                        if let Some(channel_id) = self.initial_channel() {
                            self.select_channel(channel_id);
                        }
                    }
                }
                Err(err) => return self.fail("Failed to load channels", err),
            },
            NetworkEvent::PageLoaded { ticket, result } => {
                match self.state.store.apply_page(ticket, result) {
                    PageOutcome::Applied { received } => {
                        log::debug!("Applied page {} ({received} messages)", ticket.page)
                    }
                    PageOutcome::Stale => {}
                    PageOutcome::Failed(err) => return self.fail("Failed to load messages", err),
                }
            }
            NetworkEvent::MessageSent { channel_id, result } => match result {
                Ok(message) => {
                    self.state.store.apply_sent(channel_id, message);
                }
                Err(err) => return self.fail("Failed to send message", err),
            },
            NetworkEvent::MessageReceived(inbound) => {
                self.state.store.receive_inbound(inbound);
            }
            NetworkEvent::MessageUpdated(inbound) => {
                self.state.store.apply_edit(inbound);
            }
            NetworkEvent::MessageDeleted {
                channel_id,
                message_id,
            } => {
                self.state.store.apply_delete(channel_id, message_id);
            }
            NetworkEvent::UserTyping(signal) => {
                self.state
                    .typing
                    .observe(&signal, self.session.user_id.as_deref());
            }
            NetworkEvent::UserStoppedTyping(signal) => {
                if self.state.store.selected() == Some(signal.channel_id) {
                    self.state.typing.stop(&signal.user_id);
                }
            }
            NetworkEvent::Failed { context, error } => return self.fail(context, error),
        }
        Flow::Continue
    }

    fn initial_channel(&self) -> Option<ChannelId> {
        let cached = self.session.user_id.as_deref().and_then(|user_id| {
            self.cache
                .get::<ChannelId>(user_id, keys::LAST_CHANNEL)
                .unwrap_or_else(|err| {
                    log::warn!("Failed to read cached channel: {err}");
                    None
                })
        });
        [self.session.preferred_channel, cached]
            .into_iter()
            .flatten()
            .find(|id| self.state.has_channel(*id))
            .or_else(|| self.state.channels.first().map(|channel| channel.id))
    }

    pub fn handle_network_events(&mut self) {
        while let Ok(event) = self.event_receiver.try_recv() {
            if self.handle_network_event(event) == Flow::SessionExpired {
                self.session_expired = true;
            }
        }
    }

    fn fail(&mut self, context: &str, err: ChatError) -> Flow {
        if err.is_session_expired() {
            self.expire_session();
            return Flow::SessionExpired;
        }
        self.state
            .push_notice(NoticeLevel::Error, format!("{context}: {err}"));
        Flow::Continue
    }

    fn expire_session(&mut self) {
        self.state.leave_channel();
        self.state.channels.clear();
        if let Some(user_id) = self.session.user_id.as_deref() {
            match self.cache.clear_user(user_id) {
                Ok(cleared) => log::info!("Cleared {cleared} cached entries for {user_id}"),
                Err(err) => log::warn!("Failed to clear session cache: {err}"),
            }
        }
        self.state.push_notice(
            NoticeLevel::Error,
            "Session expired. Please sign in again.",
        );
    }

    fn render_session_expired(&self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.add_space(40.0);
                ui.heading("Session expired. Please sign in again.");
                ui.label("Update CHAT_TOKEN and restart the client.");
                ui.add_space(10.0);
                if ui.button("Quit").clicked() {
                    ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                }
            });
        });
    }
}

impl eframe::App for ChatApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.handle_network_events();
        for user_id in self.state.typing.drain_expired() {
            log::debug!("{user_id} stopped typing");
        }

        if self.session_expired {
            self.render_session_expired(ctx);
            return;
        }

        for file in ctx.input(|i| i.raw.dropped_files.clone()) {
            self.attach_dropped(&file);
        }

        let mut picked = None;
        egui::SidePanel::left("channel_sidebar")
            .resizable(true)
            .default_width(200.0)
            .show(ctx, |ui| {
                picked = sidebar::render(ui, &self.state);
            });

        egui::TopBottomPanel::bottom("notices")
            .resizable(false)
            .show(ctx, |ui| {
                notices::render(ui, &self.state.notices);
            });

        let typing_line = chat_area::typing_text(&self.state.typing);
        let can_send = self.state.store.selected().is_some();
        let mut input = input_bar::InputOutcome::default();
        egui::TopBottomPanel::bottom("composer").show(ctx, |ui| {
            ui.label(egui::RichText::new(typing_line.unwrap_or_default()).italics().weak());
            input = input_bar::render(ui, &mut self.state.draft, can_send);
        });

        let mut load_more = false;
        egui::CentralPanel::default().show(ctx, |ui| {
            match self.state.selected_channel() {
                Some(channel) => ui.heading(format!("# {}", channel.name)),
                None => ui.heading("Pick a channel"),
            };
            ui.separator();
            load_more = chat_area::render(
                ui,
                self.state.store.messages(),
                self.state.store.has_more(),
                self.state.store.is_loading(),
            );
        });

        if let Some(channel_id) = picked {
            self.select_channel(channel_id);
        }
        if load_more {
            self.load_more();
        }
        if input.edited {
            self.draft_edited();
        }
        if input.submitted {
            self.submit_draft();
        }

        ctx.request_repaint();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{ChatMessage, InboundMessage, MessageContent, MessagePage, TypingSignal};
    use chrono::Utc;
    use tokio::sync::mpsc::error::TryRecvError;

    struct Harness {
        app: ChatApp,
        commands: mpsc::Receiver<NetworkCommand>,
        events: mpsc::Sender<NetworkEvent>,
    }

    fn harness() -> Harness {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (event_tx, event_rx) = mpsc::channel(32);
        let app = ChatApp::new(
            AppState::new(Duration::from_secs(2)),
            Session {
                user_id: Some("me".to_string()),
                team_id: Some(1),
                preferred_channel: None,
            },
            SessionCache::in_memory().unwrap(),
            cmd_tx,
            event_rx,
        );
        Harness {
            app,
            commands: cmd_rx,
            events: event_tx,
        }
    }

    fn drain(commands: &mut mpsc::Receiver<NetworkCommand>) -> Vec<NetworkCommand> {
        let mut out = Vec::new();
        while let Ok(command) = commands.try_recv() {
            out.push(command);
        }
        out
    }

    fn message(id: i64, channel_id: ChannelId, text: &str) -> ChatMessage {
        ChatMessage {
            id: Some(id),
            local_id: None,
            channel_id,
            sender_id: "me".to_string(),
            sender_name: None,
            content: MessageContent::Text(text.to_string()),
            sent_at: Utc::now(),
            is_edited: false,
            reply_to_id: None,
        }
    }

    /// Selects `channel_id` and applies an empty first page.
    fn ready(h: &mut Harness, channel_id: ChannelId) {
        h.app.select_channel(channel_id);
        let ticket = drain(&mut h.commands)
            .into_iter()
            .find_map(|command| match command {
                NetworkCommand::LoadPage { ticket } => Some(ticket),
                _ => None,
            })
            .unwrap();
        h.app.handle_network_event(NetworkEvent::PageLoaded {
            ticket,
            result: Ok(MessagePage::default()),
        });
    }

    #[tokio::test]
    async fn test_empty_send_makes_no_call() {
        let mut h = harness();
        ready(&mut h, 3);
        h.app.send(MessagePayload::Text(String::new()));
        h.app.send(MessagePayload::Text("  ".to_string()));
        assert!(matches!(h.commands.try_recv(), Err(TryRecvError::Empty)));
        assert!(h.app.state.store.messages().is_empty());
    }

    #[tokio::test]
    async fn test_hello_arrives_once_from_both_paths() {
        let mut h = harness();
        ready(&mut h, 3);

        h.app.send(MessagePayload::Text("hello".to_string()));
        assert!(matches!(
            h.commands.try_recv(),
            Ok(NetworkCommand::SendMessage { channel_id: 3, .. })
        ));

        h.app
            .handle_network_event(NetworkEvent::MessageReceived(InboundMessage {
                channel_id: 3,
                message: message(42, 3, "hello"),
            }));
        h.app.handle_network_event(NetworkEvent::MessageSent {
            channel_id: 3,
            result: Ok(message(42, 3, "hello")),
        });

        let messages = h.app.state.store.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, MessageContent::Text("hello".to_string()));
    }

    #[tokio::test]
    async fn test_switching_channel_leaves_joins_and_loads() {
        let mut h = harness();
        ready(&mut h, 3);
        h.app.select_channel(4);

        let commands = drain(&mut h.commands);
        assert!(matches!(commands[0], NetworkCommand::LeaveChannel { channel_id: 3 }));
        assert!(matches!(commands[1], NetworkCommand::JoinChannel { channel_id: 4 }));
        assert!(matches!(
            commands[2],
            NetworkCommand::LoadPage { ticket } if ticket.channel_id == 4 && ticket.page == 1
        ));
    }

    #[tokio::test]
    async fn test_channel_list_selects_first_or_remembered() {
        let mut h = harness();
        h.app
            .cache
            .put("me", keys::LAST_CHANNEL, &8_i64)
            .unwrap();
        let channels = vec![
            crate::common::Channel {
                id: 7,
                team_id: Some(1),
                name: "general".to_string(),
                kind: None,
                message_count: 0,
            },
            crate::common::Channel {
                id: 8,
                team_id: Some(1),
                name: "random".to_string(),
                kind: None,
                message_count: 0,
            },
        ];
        h.app.handle_network_event(NetworkEvent::ChannelsLoaded {
            team_id: 1,
            result: Ok(channels),
        });
        assert_eq!(h.app.state.store.selected(), Some(8));
    }

    #[tokio::test]
    async fn test_unauthorized_expires_session() {
        let mut h = harness();
        h.app.cache.put("me", keys::PROFILE, &"profile").unwrap();
        ready(&mut h, 3);

        let flow = h.app.handle_network_event(NetworkEvent::MessageSent {
            channel_id: 3,
            result: Err(ChatError::Unauthorized),
        });
        assert_eq!(flow, Flow::SessionExpired);
        assert!(h.app.cache.keys("me").unwrap().is_empty());
        assert_eq!(h.app.state.store.selected(), None);
    }

    #[tokio::test]
    async fn test_ordinary_failure_is_a_notice() {
        let mut h = harness();
        ready(&mut h, 3);
        let flow = h.app.handle_network_event(NetworkEvent::MessageSent {
            channel_id: 3,
            result: Err(ChatError::Closed),
        });
        assert_eq!(flow, Flow::Continue);
        assert!(h.app.state.store.messages().is_empty());
        let last = h.app.state.notices.back().unwrap();
        assert_eq!(last.level, NoticeLevel::Error);
        assert!(last.message.starts_with("Failed to send message"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_typing_is_throttled_and_own_signals_ignored() {
        let mut h = harness();
        ready(&mut h, 3);

        h.app.notify_typing();
        h.app.notify_typing();
        tokio::time::advance(TYPING_THROTTLE).await;
        h.app.notify_typing();
        let typing = drain(&mut h.commands)
            .into_iter()
            .filter(|command| matches!(command, NetworkCommand::Typing { channel_id: 3 }))
            .count();
        assert_eq!(typing, 2);

        h.app.handle_network_event(NetworkEvent::UserTyping(TypingSignal {
            channel_id: 3,
            user_id: "me".to_string(),
        }));
        h.app.handle_network_event(NetworkEvent::UserTyping(TypingSignal {
            channel_id: 3,
            user_id: "friend".to_string(),
        }));
        assert_eq!(h.app.state.typing.users(), vec!["friend".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_editing_the_draft_signals_typing_but_sending_does_not() {
        let mut h = harness();
        ready(&mut h, 3);

        h.app.state.draft = "   ".to_string();
        h.app.draft_edited();
        assert!(drain(&mut h.commands).is_empty());

        h.app.state.draft = "h".to_string();
        h.app.draft_edited();
        h.app.state.draft = "hello".to_string();
        h.app.draft_edited();
        let commands = drain(&mut h.commands);
        assert_eq!(commands.len(), 1);
        assert!(matches!(commands[0], NetworkCommand::Typing { channel_id: 3 }));

        h.app.submit_draft();
        let commands = drain(&mut h.commands);
        assert_eq!(commands.len(), 1);
        assert!(matches!(
            &commands[0],
            NetworkCommand::SendMessage { channel_id: 3, payload: MessagePayload::Text(text) }
                if text == "hello"
        ));
        assert!(h.app.state.draft.is_empty());

        // The next message starts a fresh typing burst.
        h.app.state.draft = "a".to_string();
        h.app.draft_edited();
        assert!(matches!(
            drain(&mut h.commands).as_slice(),
            [NetworkCommand::Typing { channel_id: 3 }]
        ));
    }

    #[tokio::test]
    async fn test_draft_is_kept_without_a_channel() {
        let mut h = harness();
        h.app.state.draft = "hello".to_string();
        h.app.submit_draft();
        assert!(drain(&mut h.commands).is_empty());
        assert_eq!(h.app.state.draft, "hello");
        assert_eq!(h.app.state.notices.back().unwrap().level, NoticeLevel::Warning);
    }

    #[tokio::test]
    async fn test_queued_events_are_drained_each_frame() {
        let mut h = harness();
        ready(&mut h, 3);
        h.events.send(NetworkEvent::GatewayConnected).await.unwrap();
        h.events
            .send(NetworkEvent::MessageReceived(InboundMessage {
                channel_id: 3,
                message: message(7, 3, "hi"),
            }))
            .await
            .unwrap();

        h.app.handle_network_events();
        assert!(h.app.state.gateway_online);
        assert_eq!(h.app.state.store.messages().len(), 1);
        assert!(!h.app.session_expired);

        h.events
            .send(NetworkEvent::Failed {
                context: "Failed to load channels",
                error: ChatError::Unauthorized,
            })
            .await
            .unwrap();
        h.app.handle_network_events();
        assert!(h.app.session_expired);
    }

    #[tokio::test]
    async fn test_non_image_attachment_is_rejected_locally() {
        let mut h = harness();
        ready(&mut h, 3);
        h.app.attach_image(Path::new("notes.pdf"));
        assert!(matches!(h.commands.try_recv(), Err(TryRecvError::Empty)));
        assert_eq!(h.app.state.notices.back().unwrap().level, NoticeLevel::Warning);
    }

    #[tokio::test]
    async fn test_image_attachment_is_sent_as_data_uri() {
        let mut h = harness();
        ready(&mut h, 3);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cat.PNG");
        std::fs::write(&path, [0x89, b'P', b'N', b'G']).unwrap();

        h.app.attach_image(&path);
        match h.commands.try_recv() {
            Ok(NetworkCommand::SendMessage {
                channel_id: 3,
                payload: MessagePayload::Image { data_uri },
            }) => assert!(data_uri.starts_with("data:image/png;base64,")),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
