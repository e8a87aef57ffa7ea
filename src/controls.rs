// ============================================================================
// controls.rs — slimetrail
// Parameter source for the windowed host: egui control panel, minimal
// overlay, and JSON parameter presets under `presets/`.
// ============================================================================

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::config::SimParams;
use crate::error::SimError;

pub const PRESET_DIR: &str = "presets";
const STATUS_TIMEOUT: Duration = Duration::from_secs(4);

// ======================== Panel State ========================

/// What the host should do after this frame's UI pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ControlRequests {
    /// One of the eight parameters moved (hot reload).
    pub params_changed: bool,
    /// Population slider released on a new value (full restart).
    pub population_changed: bool,
    pub restart: bool,
    pub screenshot: bool,
}

/// Read-only numbers shown by the panel.
#[derive(Clone, Debug, Default)]
pub struct PanelStats {
    pub frame: u64,
    pub fps: f32,
    pub width: u32,
    pub height: u32,
    pub agents: u32,
    pub points_of_interest: usize,
    pub adapter: String,
    pub error: Option<String>,
}

pub struct ControlPanel {
    pub visible: bool,
    pub paused: bool,
    pub params: SimParams,
    pub population: u32,
    preset_name: String,
    status: Option<(String, Instant)>,
}

impl ControlPanel {
    pub fn new(params: SimParams, population: u32) -> Self {
        Self {
            visible: true,
            paused: false,
            params,
            population,
            preset_name: "default".into(),
            status: None,
        }
    }

    pub fn set_status(&mut self, msg: impl Into<String>) {
        self.status = Some((msg.into(), Instant::now()));
    }

    fn current_status(&mut self) -> Option<&str> {
        if self
            .status
            .as_ref()
            .is_some_and(|(_, at)| at.elapsed() > STATUS_TIMEOUT)
        {
            self.status = None;
        }
        self.status.as_ref().map(|(msg, _)| msg.as_str())
    }

    /// Draws the panel (or the overlay when hidden) and reports requests.
    pub fn show(&mut self, ctx: &egui::Context, stats: &PanelStats) -> ControlRequests {
        let mut requests = ControlRequests::default();

        if let Some(err) = &stats.error {
            render_error_banner(ctx, err);
        }

        if !self.visible {
            self.render_minimal_overlay(ctx, stats);
        } else {
            egui::SidePanel::left("control_panel")
                .default_width(280.0)
                .min_width(240.0)
                .max_width(400.0)
                .show(ctx, |ui| {
                    egui::ScrollArea::vertical().show(ui, |ui| {
                        ui.heading("Slime Trail");
                        ui.separator();

                        self.render_control_section(ui, stats, &mut requests);
                        ui.separator();
                        self.render_params_section(ui, &mut requests);
                        ui.separator();
                        self.render_preset_section(ui, &mut requests);

                        ui.add_space(10.0);
                    });
                });
        }

        self.render_status_bar(ctx);
        requests
    }

    // ======================== Minimal Overlay ========================

    fn render_minimal_overlay(&self, ctx: &egui::Context, stats: &PanelStats) {
        egui::Area::new(egui::Id::new("minimal_overlay"))
            .fixed_pos(egui::pos2(10.0, 10.0))
            .show(ctx, |ui| {
                ui.visuals_mut().override_text_color = Some(egui::Color32::from_rgb(220, 220, 220));
                let pause_str = if self.paused { " [PAUSED]" } else { "" };
                ui.label(
                    egui::RichText::new(format!(
                        "F: {}  FPS: {:.0}{}  | F1: Controls",
                        stats.frame, stats.fps, pause_str,
                    ))
                    .monospace()
                    .size(13.0),
                );
            });
    }

    // ======================== Control Section ========================

    fn render_control_section(
        &mut self,
        ui: &mut egui::Ui,
        stats: &PanelStats,
        requests: &mut ControlRequests,
    ) {
        ui.collapsing("Control", |ui| {
            ui.horizontal(|ui| {
                let play_label = if self.paused { "Play" } else { "Pause" };
                if ui.button(play_label).clicked() {
                    self.paused = !self.paused;
                }
                if ui.button("Restart (R)").clicked() {
                    requests.restart = true;
                }
                if ui.button("Screenshot (F12)").clicked() {
                    requests.screenshot = true;
                }
            });

            ui.add_space(4.0);
            egui::Grid::new("session_stats").num_columns(2).show(ui, |ui| {
                stat_row(ui, "Adapter", &stats.adapter);
                stat_row(ui, "Frame", &stats.frame.to_string());
                stat_row(ui, "FPS", &format!("{:.0}", stats.fps));
                stat_row(ui, "Field", &format!("{}x{}", stats.width, stats.height));
                stat_row(ui, "Agents", &stats.agents.to_string());
                stat_row(ui, "Boxes", &stats.points_of_interest.to_string());
            });
        });
    }

    // ======================== Parameters Section ========================

    fn render_params_section(&mut self, ui: &mut egui::Ui, requests: &mut ControlRequests) {
        ui.collapsing("Parameters", |ui| {
            // Population only applies once the drag ends: every change is a restart.
            let population = ui.add(
                egui::Slider::new(&mut self.population, 1000..=100_000)
                    .step_by(1000.0)
                    .text("Population"),
            );
            if population.drag_stopped() || (population.changed() && !population.dragged()) {
                requests.population_changed = true;
            }

            let p = &mut self.params;
            let mut changed = false;
            changed |= ui
                .add(egui::Slider::new(&mut p.decay_rate, 0.9..=0.999).step_by(0.001).text("Decay"))
                .changed();
            changed |= ui
                .add(egui::Slider::new(&mut p.diffusion_rate, 0.01..=0.5).step_by(0.01).text("Diffusion"))
                .changed();
            changed |= ui
                .add(egui::Slider::new(&mut p.move_speed, 0.001..=0.01).step_by(0.0001).text("Move speed"))
                .changed();
            changed |= ui
                .add(egui::Slider::new(&mut p.turn_speed, 0.1..=1.0).step_by(0.01).text("Turn speed"))
                .changed();
            changed |= ui
                .add(
                    egui::Slider::new(&mut p.sensor_distance, 0.001..=0.02)
                        .step_by(0.0001)
                        .text("Sensor distance"),
                )
                .changed();
            changed |= ui
                .add(egui::Slider::new(&mut p.sensor_size, 1.0..=5.0).step_by(1.0).text("Sensor size"))
                .changed();
            changed |= ui
                .add(egui::Slider::new(&mut p.sensor_angle, 0.1..=1.0).step_by(0.01).text("Sensor angle"))
                .changed();
            changed |= ui
                .add(
                    egui::Slider::new(&mut p.attraction_strength, 0.1..=2.0)
                        .step_by(0.01)
                        .text("Attraction"),
                )
                .changed();

            if ui.button("Reset to defaults").clicked() {
                self.params = SimParams::default();
                changed = true;
            }
            requests.params_changed |= changed;
        });
    }

    // ======================== Presets ========================

    fn render_preset_section(&mut self, ui: &mut egui::Ui, requests: &mut ControlRequests) {
        ui.collapsing("Presets", |ui| {
            ui.horizontal(|ui| {
                ui.label("Name:");
                ui.text_edit_singleline(&mut self.preset_name);
            });
            ui.horizontal(|ui| {
                if ui.button("Save").clicked() {
                    match save_preset(Path::new(PRESET_DIR), &self.preset_name, &self.params) {
                        Ok(path) => self.set_status(format!("Preset saved to {:?}", path)),
                        Err(e) => self.set_status(format!("Save failed: {e}")),
                    }
                }
                if ui.button("Load").clicked() {
                    match load_preset(Path::new(PRESET_DIR), &self.preset_name) {
                        Ok(params) => {
                            self.params = params;
                            requests.params_changed = true;
                            self.set_status(format!("Preset '{}' loaded", self.preset_name));
                        }
                        Err(e) => self.set_status(format!("Load failed: {e}")),
                    }
                }
            });
        });
    }

    // ======================== Status Bar ========================

    fn render_status_bar(&mut self, ctx: &egui::Context) {
        if let Some(msg) = self.current_status() {
            let msg = msg.to_string();
            egui::Area::new(egui::Id::new("status_bar"))
                .anchor(egui::Align2::CENTER_BOTTOM, egui::vec2(0.0, -10.0))
                .show(ctx, |ui| {
                    egui::Frame::default()
                        .fill(egui::Color32::from_rgba_premultiplied(30, 80, 30, 220))
                        .corner_radius(egui::CornerRadius::same(4))
                        .inner_margin(egui::Margin::symmetric(12, 6))
                        .show(ui, |ui| {
                            ui.label(egui::RichText::new(msg).color(egui::Color32::WHITE));
                        });
                });
        }
    }
}

fn render_error_banner(ctx: &egui::Context, err: &str) {
    egui::Area::new(egui::Id::new("error_banner"))
        .anchor(egui::Align2::CENTER_CENTER, egui::vec2(0.0, 0.0))
        .show(ctx, |ui| {
            egui::Frame::default()
                .fill(egui::Color32::from_rgba_premultiplied(90, 20, 20, 230))
                .corner_radius(egui::CornerRadius::same(4))
                .inner_margin(egui::Margin::symmetric(16, 10))
                .show(ui, |ui| {
                    ui.label(
                        egui::RichText::new(format!("Simulation stopped: {err}"))
                            .color(egui::Color32::WHITE),
                    );
                    ui.label(egui::RichText::new("Press R to restart").small());
                });
        });
}

fn stat_row(ui: &mut egui::Ui, label: &str, value: &str) {
    ui.label(label);
    ui.label(egui::RichText::new(value).monospace());
    ui.end_row();
}

// ======================== Preset Save/Load ========================

pub fn save_preset(dir: &Path, name: &str, params: &SimParams) -> Result<PathBuf, SimError> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.json", preset_file_stem(name)?));
    std::fs::write(&path, serde_json::to_string_pretty(params)?)?;
    log::info!("Preset saved: {:?}", path);
    Ok(path)
}

/// Missing fields fall back to defaults; the result is validated.
pub fn load_preset(dir: &Path, name: &str) -> Result<SimParams, SimError> {
    let path = dir.join(format!("{}.json", preset_file_stem(name)?));
    let content = std::fs::read_to_string(&path)?;
    let params: SimParams = serde_json::from_str(&content)?;
    params.validate()?;
    log::info!("Loaded preset from {:?}", path);
    Ok(params)
}

fn preset_file_stem(name: &str) -> Result<&str, SimError> {
    let name = name.trim();
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(name)
    } else {
        Err(SimError::InvalidInput(format!(
            "preset name {name:?} must be non-empty letters, digits, '-' or '_'"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("slimetrail-presets-{tag}-{}", std::process::id()))
    }

    #[test]
    fn preset_survives_save_and_load() {
        let dir = scratch_dir("roundtrip");
        let params = SimParams {
            turn_speed: 0.75,
            sensor_size: 3.0,
            ..SimParams::default()
        };
        let path = save_preset(&dir, "wide", &params).unwrap();
        assert!(path.ends_with("wide.json"));
        assert_eq!(load_preset(&dir, "wide").unwrap(), params);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn invalid_preset_is_rejected() {
        let dir = scratch_dir("invalid");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("bad.json"), r#"{ "decay_rate": 4.0 }"#).unwrap();
        assert!(matches!(
            load_preset(&dir, "bad"),
            Err(SimError::InvalidConfig(_))
        ));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn preset_names_cannot_escape_the_directory() {
        assert!(preset_file_stem("../etc").is_err());
        assert!(preset_file_stem("  ").is_err());
        assert_eq!(preset_file_stem(" calm_1 ").unwrap(), "calm_1");
    }
}
