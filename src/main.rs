mod common;
mod config;
mod network;
mod storage;
mod sync;
mod ui;

use std::path::Path;

use clap::Parser;
use dotenvy::dotenv;
use network::{ChatClient, GatewaySettings, RestClient};
use storage::SessionCache;
use tokio::sync::mpsc;
use ui::{AppState, ChatApp, Session};

use crate::common::{ChannelId, TeamId};

#[derive(Parser)]
#[command(
    name = "teamchat_sync",
    version,
    about = "Desktop client for team channel chat"
)]
struct Cli {
    /// Path to JSON config file
    #[arg(long, default_value = config::DEFAULT_CONFIG_PATH, value_name = "FILE")]
    config: String,
    /// Team whose channels are listed
    #[arg(long)]
    team: Option<TeamId>,
    /// Channel to open first
    #[arg(long)]
    channel: Option<ChannelId>,
}

#[tokio::main]
async fn main() -> Result<(), eframe::Error> {
    dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    let mut app_config = config::load_config(&cli.config);
    if cli.team.is_some() {
        app_config.team_id = cli.team;
    }
    if cli.channel.is_some() {
        app_config.channel_id = cli.channel;
    }

    run_full_client(app_config).await
}

async fn run_full_client(app_config: config::AppConfig) -> Result<(), eframe::Error> {
    let mut cache = open_cache(&app_config.cache_path);
    cache.subscribe(storage::session_cache::keys::LAST_CHANNEL, |change| {
        log::debug!("Remembered channel for {}: {:?}", change.user_id, change.value);
    });

    // UI -> Network
    let (cmd_tx, cmd_rx) = mpsc::channel(100);
    // Network -> UI
    let (event_tx, event_rx) = mpsc::channel(100);

    let rest = RestClient::new(
        &app_config.api_base_url,
        app_config.access_token.clone(),
        app_config.page_size,
    );
    let gateway = GatewaySettings {
        url: app_config.socket_url.clone(),
        token: app_config.access_token.clone(),
        reconnect_attempts: app_config.reconnect_attempts,
        reconnect_delay: app_config.reconnect_delay(),
    };
    tokio::spawn(async move {
        let client = ChatClient::new(rest, gateway, event_tx, cmd_rx);
        if let Err(err) = client.run().await {
            log::error!("Network client terminated: {err}");
        }
    });

    let session = Session {
        user_id: app_config.user_id.clone(),
        team_id: app_config.team_id,
        preferred_channel: app_config.channel_id,
    };
    let mut app = ChatApp::new(
        AppState::new(app_config.typing_ttl()),
        session,
        cache,
        cmd_tx,
        event_rx,
    );

    let options = eframe::NativeOptions::default();
    eframe::run_native(
        "Team Chat",
        options,
        Box::new(move |_cc| {
            log::info!(
                "Client started against {} (team {:?})",
                app_config.api_base_url,
                app_config.team_id
            );
            app.start();
            Ok(Box::new(app))
        }),
    )
}

fn open_cache(path: &Path) -> SessionCache {
    let opened = storage::ensure_parent_dir(path)
        .map_err(common::ChatError::from)
        .and_then(|()| SessionCache::open(path));
    match opened {
        Ok(cache) => cache,
        Err(err) => {
            log::warn!(
                "Session cache at {} unavailable ({err}); using memory",
                path.display()
            );
            SessionCache::in_memory().unwrap_or_else(|err| {
                log::error!("In-memory cache failed: {err}");
                std::process::exit(1)
            })
        }
    }
}
