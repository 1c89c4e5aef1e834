use std::collections::BTreeSet;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tokio_tungstenite::tungstenite::Message;

use crate::common::{ChannelId, ChatResult, NetworkCommand, NetworkEvent};

use super::api::RestClient;
use super::socket::{self, GatewayStream, Outbound};

/// How the realtime gateway is reached and how hard to retry it.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub url: String,
    pub token: Option<String>,
    pub reconnect_attempts: u32,
    pub reconnect_delay: Duration,
}

enum Link {
    Up(GatewayStream),
    Retrying { attempt: u32, at: Instant },
    Down,
}

enum LinkEvent {
    Frame(Message),
    Lost(String),
    RetryDue,
}

async fn next_link_event(link: &mut Link) -> LinkEvent {
    match link {
        Link::Up(stream) => match stream.next().await {
            Some(Ok(message)) => LinkEvent::Frame(message),
            Some(Err(err)) => LinkEvent::Lost(err.to_string()),
            None => LinkEvent::Lost("closed by server".to_string()),
        },
        Link::Retrying { at, .. } => {
            sleep_until(*at).await;
            LinkEvent::RetryDue
        }
        Link::Down => std::future::pending().await,
    }
}

/// Network task: runs REST calls and the realtime gateway on behalf of the
/// UI, reporting everything back as `NetworkEvent`s.
pub struct ChatClient {
    rest: RestClient,
    gateway: GatewaySettings,
    event_sender: mpsc::Sender<NetworkEvent>,
    command_receiver: mpsc::Receiver<NetworkCommand>,
    joined: BTreeSet<ChannelId>,
}

impl ChatClient {
    pub fn new(
        rest: RestClient,
        gateway: GatewaySettings,
        event_sender: mpsc::Sender<NetworkEvent>,
        command_receiver: mpsc::Receiver<NetworkCommand>,
    ) -> Self {
        Self {
            rest,
            gateway,
            event_sender,
            command_receiver,
            joined: BTreeSet::new(),
        }
    }

    /// Runs until the UI drops its command sender.
    pub async fn run(mut self) -> ChatResult<()> {
        let mut link = self.open_link(1).await;
        log::info!("Network event loop started");

        loop {
            tokio::select! {
                command = self.command_receiver.recv() => {
                    match command {
                        Some(command) => self.handle_command(command, &mut link).await,
                        None => break,
                    }
                }
                event = next_link_event(&mut link) => {
                    match event {
                        LinkEvent::Frame(message) => self.handle_frame(message).await,
                        LinkEvent::Lost(reason) => {
                            log::warn!("Gateway connection lost: {reason}");
                            self.emit(NetworkEvent::GatewayDisconnected { reason }).await;
                            link = self.schedule_retry(1);
                        }
                        LinkEvent::RetryDue => {
                            let attempt = match link {
                                Link::Retrying { attempt, .. } => attempt,
                                _ => 1,
                            };
                            link = self.open_link(attempt).await;
                        }
                    }
                }
            }
        }

        if let Link::Up(mut stream) = link {
            stream.close(None).await.ok();
        }
        log::info!("Network event loop stopped");
        Ok(())
    }

    async fn open_link(&mut self, attempt: u32) -> Link {
        match socket::connect(&self.gateway.url, self.gateway.token.as_deref()).await {
            Ok(mut stream) => {
                log::info!("Connected to gateway {}", self.gateway.url);
                for channel_id in &self.joined {
                    if let Err(err) = send_outbound(&mut stream, Outbound::JoinChannel(*channel_id)).await {
                        log::warn!("Failed to rejoin channel {channel_id}: {err}");
                    }
                }
                self.emit(NetworkEvent::GatewayConnected).await;
                Link::Up(stream)
            }
            Err(err) => {
                log::warn!(
                    "Gateway connect attempt {attempt}/{} failed: {err}",
                    self.gateway.reconnect_attempts
                );
                if err.is_session_expired() {
                    self.emit(NetworkEvent::Failed {
                        context: "gateway",
                        error: err,
                    })
                    .await;
                    return Link::Down;
                }
                self.schedule_retry(attempt + 1)
            }
        }
    }

    fn schedule_retry(&self, attempt: u32) -> Link {
        if attempt > self.gateway.reconnect_attempts {
            log::error!("Giving up on gateway after {} attempts", self.gateway.reconnect_attempts);
            return Link::Down;
        }
        Link::Retrying {
            attempt,
            at: Instant::now() + self.gateway.reconnect_delay,
        }
    }

    async fn handle_command(&mut self, command: NetworkCommand, link: &mut Link) {
        match command {
            NetworkCommand::LoadChannels { team_id } => {
                let rest = self.rest.clone();
                let events = self.event_sender.clone();
                tokio::spawn(async move {
                    let result = rest.list_channels(team_id).await;
                    let _ = events
                        .send(NetworkEvent::ChannelsLoaded { team_id, result })
                        .await;
                });
            }
            NetworkCommand::LoadPage { ticket } => {
                let rest = self.rest.clone();
                let events = self.event_sender.clone();
                tokio::spawn(async move {
                    let result = rest.fetch_page(ticket.channel_id, ticket.page).await;
                    let _ = events.send(NetworkEvent::PageLoaded { ticket, result }).await;
                });
            }
            NetworkCommand::SendMessage {
                channel_id,
                payload,
            } => {
                let rest = self.rest.clone();
                let events = self.event_sender.clone();
                tokio::spawn(async move {
                    let result = rest.send_message(channel_id, payload).await;
                    let _ = events
                        .send(NetworkEvent::MessageSent { channel_id, result })
                        .await;
                });
            }
            NetworkCommand::JoinChannel { channel_id } => {
                self.joined.insert(channel_id);
                self.push(link, Outbound::JoinChannel(channel_id)).await;
            }
            NetworkCommand::LeaveChannel { channel_id } => {
                self.joined.remove(&channel_id);
                self.push(link, Outbound::LeaveChannel(channel_id)).await;
            }
            NetworkCommand::Typing { channel_id } => {
                self.push(link, Outbound::Typing(channel_id)).await;
            }
        }
    }

    async fn push(&mut self, link: &mut Link, outbound: Outbound) {
        let Link::Up(stream) = link else {
            log::debug!("Gateway offline; dropping {outbound:?}");
            return;
        };
        if let Err(err) = send_outbound(stream, outbound).await {
            log::warn!("Failed to push {outbound:?}: {err}");
            self.emit(NetworkEvent::GatewayDisconnected {
                reason: err.to_string(),
            })
            .await;
            *link = self.schedule_retry(1);
        }
    }

    async fn handle_frame(&self, message: Message) {
        let text = match message {
            Message::Text(text) => text,
            Message::Close(frame) => {
                log::info!("Gateway sent close: {frame:?}");
                return;
            }
            _ => return,
        };
        match socket::decode(text.as_str()) {
            Ok(Some(event)) => self.emit(event).await,
            Ok(None) => {}
            Err(err) => log::warn!("Dropping malformed gateway frame: {err}"),
        }
    }

    async fn emit(&self, event: NetworkEvent) {
        if let Err(err) = self.event_sender.send(event).await {
            log::debug!("UI no longer listening: {err}");
        }
    }
}

async fn send_outbound(stream: &mut GatewayStream, outbound: Outbound) -> ChatResult<()> {
    stream.send(outbound.to_message()?).await?;
    Ok(())
}
