// ============================================================================
// main.rs — slimetrail
// Entry point. Parses the command line, initializes logging and runs either
// the windowed viewer or a headless batch.
// ============================================================================

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use slimetrail::app::{App, AppConfig};
use slimetrail::config::SceneConfig;
use slimetrail::cpu::CpuFactory;
use slimetrail::gpu::GpuFactory;
use slimetrail::headless::{run_headless, HeadlessConfig, HeadlessReport};
use winit::event_loop::{ControlFlow, EventLoop};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Scene file (JSON): simulation sizing, parameters and input providers
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run without a window and exit after `--frames` frames
    #[arg(long)]
    headless: bool,

    /// Frames to simulate in headless mode
    #[arg(long, default_value_t = 1000)]
    frames: u64,

    /// Compute substrate for headless runs
    #[arg(long, value_enum, default_value = "gpu")]
    backend: Backend,

    /// PNG written with the final composite of a headless run
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(long)]
    width: Option<u32>,

    #[arg(long)]
    height: Option<u32>,

    /// Agent count
    #[arg(short, long)]
    population: Option<u32>,

    /// Fixed seed for agent initialisation
    #[arg(long)]
    seed: Option<u64>,

    /// Frames between diagnostics samples (0 disables)
    #[arg(long)]
    metrics_interval: Option<u32>,

    /// Directory for F12 screenshots
    #[arg(long, default_value = "screenshots")]
    screenshot_dir: PathBuf,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum Backend {
    Cpu,
    Gpu,
}

impl Args {
    /// Scene file (or defaults) with command-line overrides applied.
    fn scene(&self) -> Result<SceneConfig> {
        let mut scene = match &self.config {
            Some(path) => SceneConfig::load(path)
                .with_context(|| format!("failed to load scene {}", path.display()))?,
            None => AppConfig::default().scene,
        };

        let sim = &mut scene.simulation;
        if let Some(width) = self.width {
            sim.width = width;
        }
        if let Some(height) = self.height {
            sim.height = height;
        }
        if let Some(population) = self.population {
            sim.population = population;
        }
        if self.seed.is_some() {
            sim.seed = self.seed;
        }
        if let Some(interval) = self.metrics_interval {
            scene.metrics_interval = interval;
        }

        scene.simulation.validate().context("invalid simulation settings")?;
        Ok(scene)
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();
    let scene = args.scene()?;

    if args.headless {
        let config = HeadlessConfig {
            frames: args.frames,
            output: args.output.clone(),
            ..HeadlessConfig::default()
        };
        let report = match args.backend {
            Backend::Cpu => run_headless(CpuFactory, &scene, &config),
            Backend::Gpu => run_headless(GpuFactory::headless(), &scene, &config),
        }
        .context("headless run failed")?;
        print_report(&report, &config);
        return Ok(());
    }

    let event_loop = EventLoop::new().context("failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(AppConfig {
        scene,
        screenshot_dir: args.screenshot_dir,
    });
    event_loop.run_app(&mut app).context("event loop terminated abnormally")?;

    if let Some(err) = app.take_fatal() {
        return Err(err).context("simulation could not start");
    }
    Ok(())
}

fn print_report(report: &HeadlessReport, config: &HeadlessConfig) {
    let fps = report.frames as f64 / report.elapsed.as_secs_f64().max(1e-6);
    println!(
        "Simulated {} frames in {:.2} s ({:.0} fps)",
        report.frames,
        report.elapsed.as_secs_f64(),
        fps
    );
    println!(
        "Final field: {} lit cells ({:.1}%), max {:.3}",
        report.final_diagnostics.lit_cells,
        report.final_diagnostics.lit_fraction * 100.0,
        report.final_diagnostics.max_intensity
    );
    if let Some(path) = &config.output {
        println!("Wrote {}", path.display());
    }
}
