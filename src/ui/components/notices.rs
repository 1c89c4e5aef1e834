use std::collections::VecDeque;

use eframe::egui;

use crate::ui::state::{Notice, NoticeLevel};

const SHOWN: usize = 5;

fn color(level: NoticeLevel) -> egui::Color32 {
    match level {
        NoticeLevel::Info => egui::Color32::GRAY,
        NoticeLevel::Warning => egui::Color32::YELLOW,
        NoticeLevel::Error => egui::Color32::RED,
    }
}

pub fn stamp(notice: &Notice) -> String {
    format!("[{}]", notice.timestamp.format("%H:%M:%S"))
}

/// Latest notices, newest first.
pub fn render(ui: &mut egui::Ui, notices: &VecDeque<Notice>) {
    for notice in notices.iter().rev().take(SHOWN) {
        ui.horizontal(|ui| {
            ui.colored_label(color(notice.level), stamp(notice));
            ui.label(&notice.message);
        });
    }
}
