// ============================================================================
// headless.rs — slimetrail
// Offscreen batch runner on either substrate: N frames, progress and
// diagnostics logging, optional PNG of the final composite.
// ============================================================================

use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::backend::{BackendFactory, SimBackend};
use crate::composite::save_png;
use crate::config::SceneConfig;
use crate::error::SimError;
use crate::field::TrailField;
use crate::inputs::scene_inputs;
use crate::metrics::TrailDiagnostics;
use crate::session::SimulationSession;

#[derive(Clone, Debug)]
pub struct HeadlessConfig {
    pub frames: u64,
    pub output: Option<PathBuf>,
    pub progress_interval: u64,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            frames: 1_000,
            output: None,
            progress_interval: 250,
        }
    }
}

/// Outcome of a completed run.
#[derive(Clone, Debug)]
pub struct HeadlessReport {
    pub frames: u64,
    pub elapsed: Duration,
    pub final_diagnostics: TrailDiagnostics,
}

pub fn run_headless<F: BackendFactory>(
    factory: F,
    scene: &SceneConfig,
    config: &HeadlessConfig,
) -> Result<HeadlessReport, SimError> {
    let backend_name = factory.name();
    let sim = &scene.simulation;
    let mut session = SimulationSession::new(factory, sim.clone())?;
    session.initialize()?;

    let (attraction, points) = scene_inputs(scene, sim.width, sim.height)?;
    if let Some(field) = attraction {
        session.update_attraction_field(field)?;
    }
    session.update_points_of_interest(points)?;
    session.start()?;

    log::info!(
        "Headless run started: {} frames on {}x{} with {} agents ({})",
        config.frames,
        sim.width,
        sim.height,
        sim.population,
        backend_name
    );

    let started = Instant::now();
    let mut last_report = Instant::now();
    let mut last_report_frame = 0u64;
    let mut last_diag: Option<TrailDiagnostics> = None;
    let metrics_interval = scene.metrics_interval as u64;

    for step in 0..config.frames {
        // No surface to present to; the last composite is read back at the end.
        session.frame(|_| Ok(()))?;
        let done = step + 1;

        if config.progress_interval > 0 && done % config.progress_interval == 0 {
            let total_elapsed = started.elapsed().as_secs_f64().max(1e-6);
            let total_fps = done as f64 / total_elapsed;

            let window_elapsed = last_report.elapsed().as_secs_f64().max(1e-6);
            let window_fps = (done - last_report_frame) as f64 / window_elapsed;

            let remaining = config.frames.saturating_sub(done);
            let eta_secs = if total_fps > 1e-6 {
                remaining as f64 / total_fps
            } else {
                0.0
            };

            log::info!(
                "Headless progress: {}/{} | fps={:.0} (window {:.0}) | ETA={:.1} s",
                done,
                config.frames,
                total_fps,
                window_fps,
                eta_secs,
            );

            last_report = Instant::now();
            last_report_frame = done;
        }

        if metrics_interval > 0 && done % metrics_interval == 0 {
            let field = read_current(&mut session)?;
            let diag = TrailDiagnostics::from_field(&field);
            diag.log(done, last_diag.as_ref());
            last_diag = Some(diag);
        }
    }

    let field = read_current(&mut session)?;
    let final_diagnostics = TrailDiagnostics::from_field(&field);
    if let Some(path) = &config.output {
        save_png(path, &field)?;
    }

    let elapsed = started.elapsed();
    let frames = session.frames();
    session.dispose();
    log::info!(
        "Headless run finished: {} frames in {:.2} s, {} lit cells",
        frames,
        elapsed.as_secs_f64(),
        final_diagnostics.lit_cells
    );

    Ok(HeadlessReport {
        frames,
        elapsed,
        final_diagnostics,
    })
}

fn read_current<F: BackendFactory>(
    session: &mut SimulationSession<F>,
) -> Result<TrailField, SimError> {
    session
        .backend_mut()
        .ok_or(SimError::InvalidState {
            op: "read_trail",
            state: "released",
        })?
        .read_trail()
}
