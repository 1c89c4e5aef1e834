use eframe::egui;

/// What happened to the draft during this frame.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct InputOutcome {
    /// The draft text changed (a keystroke, paste or deletion).
    pub edited: bool,
    pub submitted: bool,
}

pub fn render(ui: &mut egui::Ui, draft: &mut String, enabled: bool) -> InputOutcome {
    let mut outcome = InputOutcome::default();
    ui.horizontal(|ui| {
        let width = ui.available_width() - 60.0;
        let response = ui.add_enabled(
            enabled,
            egui::TextEdit::singleline(draft)
                .hint_text("Message (drop an image to attach it)")
                .desired_width(width),
        );
        outcome.edited = response.changed();

        if ui.add_enabled(enabled, egui::Button::new("Send")).clicked() {
            outcome.submitted = true;
        }

        if response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
            outcome.submitted = true;
            response.request_focus();
        }
    });
    outcome
}
