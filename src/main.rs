#[cfg(feature = "gui")]
use eframe::egui;

#[cfg(feature = "gui")]
use cavelink::{
    Axis, CellValue, LinkState, Notification, SyncEngine, ViewMode, CHANNELS, STEPS,
};

#[cfg(feature = "gui")]
fn main() -> Result<(), eframe::Error> {
    env_logger::init();

    let host = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "mycavian.local".to_string());

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([780.0, 900.0])
            .with_title("Cavelink"),
        ..Default::default()
    };

    eframe::run_native(
        "Cavelink",
        options,
        Box::new(move |_cc| Ok(Box::new(ControlApp::new(&host)))),
    )
}

#[cfg(not(feature = "gui"))]
fn main() {
    eprintln!("This binary requires the 'gui' feature to be enabled");
    std::process::exit(1);
}

#[cfg(feature = "gui")]
struct ControlApp {
    engine: SyncEngine,
    status: String,
}

#[cfg(feature = "gui")]
impl ControlApp {
    fn new(host: &str) -> Self {
        Self {
            engine: SyncEngine::connect(host),
            status: format!("Connecting to {host}..."),
        }
    }

    fn handle_notifications(&mut self) {
        for note in self.engine.pump() {
            if let Notification::ConnectivityChanged(state) = note {
                self.status = match state {
                    LinkState::Connecting => "Connecting to device...".to_string(),
                    LinkState::Live => "🔌 Connected to device".to_string(),
                    LinkState::ReconnectWait { attempt } => {
                        format!("Reconnecting... attempt {attempt}")
                    }
                    LinkState::Demo => {
                        "🎮 Demo Mode - Connect device for live control".to_string()
                    }
                };
            }
        }
    }

    fn view_mode_label(mode: ViewMode) -> &'static str {
        match mode {
            ViewMode::Vertical => "Vertical",
            ViewMode::Horizontal8x8 => "8x8",
            ViewMode::Horizontal64 => "64",
        }
    }

    fn cell_fill(&self, value: CellValue, playing: bool, muted: bool) -> egui::Color32 {
        if playing && value != CellValue::Off {
            return egui::Color32::from_rgb(100, 200, 100);
        }
        match value {
            CellValue::Off if playing => egui::Color32::from_rgb(70, 90, 70),
            CellValue::Off => egui::Color32::from_rgb(40, 40, 40),
            CellValue::Active if muted => egui::Color32::from_rgb(50, 50, 110),
            CellValue::Active => egui::Color32::from_rgb(60, 60, 200),
            CellValue::AlwaysActive if muted => egui::Color32::from_rgb(110, 70, 40),
            CellValue::AlwaysActive => egui::Color32::from_rgb(220, 120, 40),
        }
    }

    fn navigation_row(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            for (label, axis, index) in [
                ("Group", Axis::Group, self.engine.cursor().group()),
                ("Preset", Axis::Preset, self.engine.cursor().preset()),
                ("Channel", Axis::Channel, self.engine.cursor().channel()),
            ] {
                ui.label(format!("{label}:"));
                if ui.button("◀").clicked() {
                    self.engine.navigate(axis, -1);
                }
                ui.label(format!("{}", index + 1));
                if ui.button("▶").clicked() {
                    self.engine.navigate(axis, 1);
                }
                ui.add_space(14.0);
            }
        });
    }

    fn tempo_row(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.label("BPM:");
            if ui.button("-5").clicked() {
                self.engine.set_tempo(-5);
            }
            if ui.button("-").clicked() {
                self.engine.set_tempo(-1);
            }
            ui.label(format!("{}", self.engine.bpm()));
            if ui.button("+").clicked() {
                self.engine.set_tempo(1);
            }
            if ui.button("+5").clicked() {
                self.engine.set_tempo(5);
            }

            ui.add_space(20.0);

            ui.label("View:");
            let mut selected = self.engine.cursor().view_mode();
            egui::ComboBox::from_label("")
                .selected_text(Self::view_mode_label(selected))
                .show_ui(ui, |ui| {
                    for mode in [
                        ViewMode::Vertical,
                        ViewMode::Horizontal8x8,
                        ViewMode::Horizontal64,
                    ] {
                        ui.selectable_value(&mut selected, mode, Self::view_mode_label(mode));
                    }
                });
            if selected != self.engine.cursor().view_mode() {
                self.engine.set_view_mode(selected);
            }
        });
    }

    fn grid(&mut self, ui: &mut egui::Ui) {
        let view_mode = self.engine.cursor().view_mode();
        let current_step = self.engine.current_step();
        let active_preset = self.engine.cursor().preset();
        let mutes = self.engine.store().mute_vector();
        let mut clicked: Option<(usize, usize)> = None;

        for row in 0..CHANNELS {
            ui.horizontal(|ui| {
                let channel_row = view_mode != ViewMode::Horizontal64;
                let row_label = if channel_row {
                    format!("CH{}", row + 1)
                } else {
                    format!("P{}", row + 1)
                };
                if ui
                    .add_sized([44.0, 40.0], egui::Button::new(row_label))
                    .clicked()
                    && channel_row
                {
                    let _ = self.engine.select_channel(row);
                }

                for col in 0..STEPS {
                    let (g, p, c, s) = self.engine.cursor().cell_coords(row, col);
                    let value = self.engine.store().get(g, p, c, s);
                    let playing = match view_mode {
                        ViewMode::Horizontal64 => row == active_preset && col == current_step,
                        _ => col == current_step,
                    };
                    let muted = channel_row && mutes[row];

                    let button = egui::Button::new("")
                        .min_size(egui::vec2(58.0, 40.0))
                        .fill(self.cell_fill(value, playing, muted));
                    if ui.add(button).clicked() {
                        clicked = Some((row, col));
                    }
                }
            });
        }

        if let Some((row, col)) = clicked {
            if let Some(value) = self.engine.toggle_cell(row, col) {
                self.status = format!("Cell {}:{} = {}", row + 1, col + 1, u8::from(value));
            }
        }
    }

    fn mute_strip(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.add_space(48.0);
            for channel in 0..CHANNELS {
                let muted = self.engine.store().is_muted(channel);
                let fill = if muted {
                    egui::Color32::from_rgb(200, 60, 60)
                } else {
                    egui::Color32::from_rgb(55, 55, 55)
                };
                let button = egui::Button::new(format!("M{}", channel + 1))
                    .min_size(egui::vec2(58.0, 26.0))
                    .fill(fill);
                if ui.add(button).clicked() {
                    let muted = self.engine.toggle_mute(channel);
                    self.status = format!(
                        "CH{} {}",
                        channel + 1,
                        if muted { "muted" } else { "unmuted" }
                    );
                }
            }
        });
    }

    fn step_indicator(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.add_space(48.0);
            for step in 0..STEPS {
                let on = step == self.engine.current_step() && self.engine.is_playing();
                let color = if on {
                    egui::Color32::from_rgb(100, 200, 100)
                } else {
                    egui::Color32::from_rgb(60, 60, 60)
                };
                ui.add_sized([58.0, 12.0], egui::Label::new(
                    egui::RichText::new("●").color(color),
                ));
            }
        });
    }
}

#[cfg(feature = "gui")]
impl eframe::App for ControlApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        ctx.request_repaint();

        self.handle_notifications();

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("Cavelink");
            ui.add_space(6.0);

            self.navigation_row(ui);
            ui.add_space(6.0);
            self.tempo_row(ui);
            ui.add_space(14.0);

            if self.engine.has_pattern() {
                self.grid(ui);
                ui.add_space(6.0);
                self.step_indicator(ui);
                ui.add_space(6.0);
                self.mute_strip(ui);
            } else {
                ui.label("Waiting for pattern...");
            }

            ui.add_space(10.0);
            ui.separator();
            ui.horizontal(|ui| {
                ui.label(&self.status);
                if self.engine.link_state() == LinkState::Demo && ui.button("Reconnect").clicked()
                {
                    self.engine.reconnect();
                }
            });
        });
    }
}

#[cfg(feature = "gui")]
impl Drop for ControlApp {
    fn drop(&mut self) {
        self.engine.shutdown();
    }
}
