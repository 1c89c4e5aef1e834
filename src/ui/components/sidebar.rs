use eframe::egui;

use crate::common::{Channel, ChannelId};
use crate::ui::state::AppState;

pub fn channel_label(channel: &Channel) -> String {
    match channel.message_count {
        0 => format!("# {}", channel.name),
        count => format!("# {} ({count})", channel.name),
    }
}

/// Channel list with the realtime link status on top. Returns the channel
/// the user clicked, if any.
pub fn render(ui: &mut egui::Ui, state: &AppState) -> Option<ChannelId> {
    ui.heading("Channels");
    ui.horizontal(|ui| {
        if state.gateway_online {
            ui.colored_label(egui::Color32::GREEN, "●");
            ui.label(egui::RichText::new("live").weak());
        } else {
            ui.colored_label(egui::Color32::RED, "●");
            ui.label(egui::RichText::new("offline").weak());
        }
    });
    ui.separator();

    if state.channels.is_empty() {
        ui.label("No channels in this team yet");
        return None;
    }

    let selected = state.store.selected();
    let mut clicked = None;
    for channel in &state.channels {
        let is_selected = selected == Some(channel.id);
        if ui
            .selectable_label(is_selected, channel_label(channel))
            .clicked()
            && !is_selected
        {
            clicked = Some(channel.id);
        }
    }
    clicked
}
