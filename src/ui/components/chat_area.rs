use chrono::{DateTime, Utc};
use eframe::egui;

use crate::common::{ChatMessage, MessageContent};
use crate::sync::TypingPresence;

/// Short relative timestamp for a message.
pub fn format_time(sent_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(sent_at);
    if elapsed.num_seconds() < 60 {
        "just now".to_string()
    } else if elapsed.num_minutes() < 60 {
        format!("{} min ago", elapsed.num_minutes())
    } else if elapsed.num_hours() < 24 {
        format!("{} h ago", elapsed.num_hours())
    } else {
        sent_at.format("%d/%m %H:%M").to_string()
    }
}

pub fn content_text(content: &MessageContent) -> String {
    match content {
        MessageContent::Text(text) => text.clone(),
        MessageContent::Image { .. } => {
            format!("🖼 image ({} KB encoded)", content.as_wire().len().div_ceil(1024))
        }
    }
}

pub fn typing_text(typing: &TypingPresence) -> Option<String> {
    let users = typing.users();
    match users.as_slice() {
        [] => None,
        [one] => Some(format!("{one} is typing...")),
        [first, second] => Some(format!("{first} and {second} are typing...")),
        [first, rest @ ..] => Some(format!("{first} and {} others are typing...", rest.len())),
    }
}

/// Message list, oldest first. Returns true when "load older" was clicked.
pub fn render(
    ui: &mut egui::Ui,
    messages: &[ChatMessage],
    has_more: bool,
    loading: bool,
) -> bool {
    let mut load_more = false;
    let now = Utc::now();

    egui::ScrollArea::vertical()
        .stick_to_bottom(true)
        .auto_shrink([false, false])
        .show(ui, |ui| {
            if loading {
                ui.horizontal(|ui| {
                    ui.spinner();
                    ui.label("Loading messages...");
                });
            } else if has_more && ui.button("Load older messages").clicked() {
                load_more = true;
            }

            if messages.is_empty() && !loading {
                ui.label(egui::RichText::new("No messages yet").weak());
            }

            for message in messages {
                ui.horizontal_wrapped(|ui| {
                    let sender = message.sender_name.as_deref().unwrap_or(&message.sender_id);
                    ui.label(egui::RichText::new(sender).strong());
                    ui.label(
                        egui::RichText::new(format_time(message.sent_at, now))
                            .small()
                            .weak(),
                    );
                    if message.is_edited {
                        ui.label(egui::RichText::new("(edited)").small().italics());
                    }
                });
                ui.label(content_text(&message.content));
                ui.add_space(4.0);
            }
        });

    load_more
}
