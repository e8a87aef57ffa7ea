// ============================================================================
// app.rs — slimetrail
// Windowed host: winit event loop, wgpu surface, GPU-backed simulation
// session and the egui control panel.
// ============================================================================

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    keyboard::{Key, NamedKey},
    window::{Window, WindowAttributes},
};

use crate::backend::SimBackend;
use crate::composite::save_png;
use crate::config::{SceneConfig, SimConfig};
use crate::controls::{ControlPanel, ControlRequests, PanelStats};
use crate::error::SimError;
use crate::gpu::{surface_config, GpuContext, GpuFactory};
use crate::inputs::scene_inputs;
use crate::metrics::TrailDiagnostics;
use crate::session::{SessionState, SimulationSession};

// ======================== Application ========================

pub struct App {
    state: Option<AppState>,
    config: AppConfig,
    fatal: Option<SimError>,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub scene: SceneConfig,
    pub screenshot_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            scene: SceneConfig {
                metrics_interval: 300,
                ..SceneConfig::default()
            },
            screenshot_dir: PathBuf::from("screenshots"),
        }
    }
}

struct AppState {
    // GPU
    context: GpuContext,
    surface: wgpu::Surface<'static>,
    surface_config: wgpu::SurfaceConfiguration,

    // Simulation
    session: SimulationSession<GpuFactory>,

    // Window
    window: Arc<Window>,

    // egui
    egui_ctx: egui::Context,
    egui_winit_state: egui_winit::State,
    egui_renderer: egui_wgpu::Renderer,
    panel: ControlPanel,

    // Timing
    last_redraw: Instant,
    fps: f32,

    // Diagnostics
    last_diag: Option<TrailDiagnostics>,
    screenshot_requested: bool,
}

impl App {
    pub fn new(config: AppConfig) -> Self {
        Self {
            state: None,
            config,
            fatal: None,
        }
    }

    /// Error that prevented the window from ever showing a simulation.
    pub fn take_fatal(&mut self) -> Option<SimError> {
        self.fatal.take()
    }

    fn init_state(&self, event_loop: &winit::event_loop::ActiveEventLoop) -> Result<AppState, SimError> {
        let sim = &self.config.scene.simulation;
        let window_attrs = WindowAttributes::default()
            .with_title("slimetrail")
            .with_inner_size(winit::dpi::PhysicalSize::new(sim.width, sim.height));
        let window = Arc::new(
            event_loop
                .create_window(window_attrs)
                .map_err(|e| SimError::Capability(format!("window creation failed: {e}")))?,
        );

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance
            .create_surface(window.clone())
            .map_err(|e| SimError::Capability(format!("surface creation failed: {e}")))?;

        let (context, adapter) = pollster::block_on(GpuContext::request(&instance, Some(&surface)))?;
        let size = window.inner_size();
        let surface_config = surface_config(&adapter, &surface, size.width, size.height)?;
        surface.configure(&context.device, &surface_config);

        // The field always matches the viewport.
        let config = SimConfig {
            width: surface_config.width,
            height: surface_config.height,
            ..sim.clone()
        };
        let panel = ControlPanel::new(config.params, config.population);
        let session = new_session(&context, surface_config.format, config, &self.config.scene)?;

        // ---- Initialize egui ----
        let egui_ctx = egui::Context::default();
        let mut visuals = egui::Visuals::dark();
        visuals.window_fill = egui::Color32::from_rgba_premultiplied(27, 27, 35, 235);
        visuals.panel_fill = egui::Color32::from_rgba_premultiplied(20, 20, 28, 230);
        egui_ctx.set_visuals(visuals);

        let egui_winit_state = egui_winit::State::new(
            egui_ctx.clone(),
            egui::ViewportId::ROOT,
            event_loop,
            Some(window.scale_factor() as f32),
            None,
            None,
        );

        let egui_renderer =
            egui_wgpu::Renderer::new(&context.device, surface_config.format, None, 1, false);

        Ok(AppState {
            context,
            surface,
            surface_config,
            session,
            window,
            egui_ctx,
            egui_winit_state,
            egui_renderer,
            panel,
            last_redraw: Instant::now(),
            fps: 0.0,
            last_diag: None,
            screenshot_requested: false,
        })
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &winit::event_loop::ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        match self.init_state(event_loop) {
            Ok(state) => {
                // First frame has to be requested explicitly on some platforms.
                state.window.request_redraw();
                self.state = Some(state);
            }
            Err(err) => {
                log::error!("Windowed host failed to start: {err}");
                self.fatal = Some(err);
                event_loop.exit();
            }
        }
    }

    fn about_to_wait(&mut self, _event_loop: &winit::event_loop::ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.window.request_redraw();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &winit::event_loop::ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let Some(state) = &mut self.state else {
            return;
        };

        // Pass events to egui first
        let egui_response = state.egui_winit_state.on_window_event(&state.window, &event);

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),

            WindowEvent::KeyboardInput { event, .. } => {
                handle_keyboard(state, &self.config, event_loop, &event, egui_response.consumed);
            }

            WindowEvent::Resized(new_size) => {
                if new_size.width > 0 && new_size.height > 0 {
                    state.surface_config.width = new_size.width;
                    state.surface_config.height = new_size.height;
                    state.surface.configure(&state.context.device, &state.surface_config);
                    let population = state.session.config().population;
                    reconfigure(state, &self.config.scene, population, Trigger::Resize);
                }
            }

            WindowEvent::RedrawRequested => {
                redraw(state, &self.config);
            }

            _ => {}
        }
    }

    fn exiting(&mut self, _event_loop: &winit::event_loop::ActiveEventLoop) {
        if let Some(state) = &mut self.state {
            state.session.dispose();
        }
    }
}

// ======================== Session Management ========================

fn new_session(
    context: &GpuContext,
    format: wgpu::TextureFormat,
    config: SimConfig,
    scene: &SceneConfig,
) -> Result<SimulationSession<GpuFactory>, SimError> {
    let (width, height) = (config.width, config.height);
    let mut session = SimulationSession::new(GpuFactory::new(context.clone(), format), config)?;
    match session.initialize() {
        Ok(()) => {
            apply_scene_inputs(&mut session, scene);
            if let Some(backend) = session.backend() {
                backend.set_surface_size(width, height);
            }
            session.start()?;
        }
        // Session is Errored; the panel shows the message.
        Err(err) if err.is_fatal() => {}
        Err(err) => return Err(err),
    }
    Ok(session)
}

/// Re-rasterises the scene's inputs at the session's current viewport.
fn apply_scene_inputs(session: &mut SimulationSession<GpuFactory>, scene: &SceneConfig) {
    let (width, height) = (session.config().width, session.config().height);
    match scene_inputs(scene, width, height) {
        Ok((attraction, points)) => {
            if let Some(field) = attraction {
                if let Err(err) = session.update_attraction_field(field) {
                    log::warn!("Attraction field not applied: {err}");
                }
            }
            if let Err(err) = session.update_points_of_interest(points) {
                log::warn!("Points of interest not applied: {err}");
            }
        }
        Err(err) => log::warn!("Scene inputs unavailable: {err}"),
    }
}

/// What caused a session teardown.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Trigger {
    /// Window resize, including the ones winit sends on its own.
    Resize,
    Population,
    /// R key or the panel's Restart button.
    UserRestart,
}

/// A terminal session is only rebuilt on an explicit restart; nothing else
/// may retry after a fatal error.
fn rebuilds_terminal(session: SessionState, trigger: Trigger) -> bool {
    session.is_terminal() && trigger == Trigger::UserRestart
}

/// Viewport or population change: full restart at the new size. A failed
/// session keeps its error; the surface alone follows the window.
fn reconfigure(state: &mut AppState, scene: &SceneConfig, population: u32, trigger: Trigger) {
    let (width, height) = (state.surface_config.width, state.surface_config.height);
    if state.session.state().is_terminal() {
        log::debug!("{:?} ignored: session is {}", trigger, state.session.state());
        return;
    }
    match state.session.reconfigure(width.max(3), height.max(3), population) {
        Ok(()) => {
            apply_scene_inputs(&mut state.session, scene);
            if let Some(backend) = state.session.backend() {
                backend.set_surface_size(width, height);
            }
            state.last_diag = None;
        }
        Err(err) => state.panel.set_status(format!("Reconfigure failed: {err}")),
    }
}

fn restart(state: &mut AppState, scene: &SceneConfig) {
    if rebuilds_terminal(state.session.state(), Trigger::UserRestart) {
        rebuild_session(state, scene);
        return;
    }
    match state.session.restart() {
        Ok(()) => {
            apply_scene_inputs(&mut state.session, scene);
            if let Some(backend) = state.session.backend() {
                backend
                    .set_surface_size(state.surface_config.width, state.surface_config.height);
            }
            state.last_diag = None;
            state.panel.set_status("Simulation restarted");
            log::info!("Simulation restarted");
        }
        Err(err) => state.panel.set_status(format!("Restart failed: {err}")),
    }
}

/// A user-requested fresh session after a terminal failure.
fn rebuild_session(state: &mut AppState, scene: &SceneConfig) {
    let config = SimConfig {
        width: state.surface_config.width.max(3),
        height: state.surface_config.height.max(3),
        population: state.panel.population,
        params: state.panel.params,
        ..state.session.config().clone()
    };
    match new_session(&state.context, state.surface_config.format, config, scene) {
        Ok(session) => {
            state.session.dispose();
            state.session = session;
            state.last_diag = None;
        }
        Err(err) => state.panel.set_status(format!("Restart failed: {err}")),
    }
}

// ======================== Keyboard Handling ========================

fn handle_keyboard(
    state: &mut AppState,
    config: &AppConfig,
    event_loop: &winit::event_loop::ActiveEventLoop,
    event: &winit::event::KeyEvent,
    egui_consumed: bool,
) {
    if !event.state.is_pressed() {
        return;
    }

    // Handled even while a slider or text field has focus.
    match &event.logical_key {
        Key::Named(NamedKey::Escape) => event_loop.exit(),
        Key::Named(NamedKey::F1) => {
            state.panel.visible = !state.panel.visible;
            log::info!("Controls: {}", if state.panel.visible { "ON" } else { "OFF" });
        }
        Key::Named(NamedKey::F12) => state.screenshot_requested = true,
        _ => {}
    }

    if egui_consumed {
        return;
    }

    match &event.logical_key {
        Key::Named(NamedKey::Space) => {
            state.panel.paused = !state.panel.paused;
            log::info!("{}", if state.panel.paused { "Paused" } else { "Resumed" });
        }
        Key::Character(c) if c.as_str().eq_ignore_ascii_case("r") => {
            restart(state, &config.scene);
        }
        _ => {}
    }
}

// ======================== Frame Rendering ========================

fn redraw(state: &mut AppState, config: &AppConfig) {
    // FPS (exponential moving average)
    let now = Instant::now();
    let dt = now.duration_since(state.last_redraw).as_secs_f32().max(0.0001);
    state.last_redraw = now;
    state.fps = state.fps * 0.95 + (1.0 / dt) * 0.05;

    // ---- egui frame ----
    let stats = PanelStats {
        frame: state.session.frames(),
        fps: state.fps,
        width: state.session.config().width,
        height: state.session.config().height,
        agents: state.session.config().population,
        points_of_interest: state.session.points().real_count(),
        adapter: state.context.adapter_name.clone(),
        error: state.session.error().map(str::to_owned),
    };
    let raw_input = state.egui_winit_state.take_egui_input(&state.window);
    let mut requests = ControlRequests::default();
    let full_output = state.egui_ctx.run(raw_input, |ctx| {
        requests = state.panel.show(ctx, &stats);
    });
    state
        .egui_winit_state
        .handle_platform_output(&state.window, full_output.platform_output);

    // ---- Handle panel requests ----
    if requests.params_changed {
        if let Err(err) = state.session.update_parameters(state.panel.params) {
            state.panel.set_status(format!("Parameters rejected: {err}"));
        }
    }
    if requests.population_changed {
        let population = state.panel.population;
        reconfigure(state, &config.scene, population, Trigger::Population);
    }
    if requests.restart {
        restart(state, &config.scene);
    }
    state.screenshot_requested |= requests.screenshot;

    let win_w = state.surface_config.width;
    let win_h = state.surface_config.height;

    let output = match state.surface.get_current_texture() {
        Ok(t) => t,
        Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
            state.surface.configure(&state.context.device, &state.surface_config);
            return;
        }
        Err(e) => {
            log::error!("Surface error: {:?}", e);
            return;
        }
    };

    let view = output
        .texture
        .create_view(&wgpu::TextureViewDescriptor::default());

    // ---- Simulation frame + composite ----
    let running = state.session.state() == SessionState::Running;
    if running && !state.panel.paused {
        let device = state.context.device.clone();
        let queue = state.context.queue.clone();
        let result = state.session.frame(|backend| {
            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("composite_encoder"),
            });
            backend.encode_composite(&mut encoder, &view);
            queue.submit(std::iter::once(encoder.finish()));
            Ok(())
        });
        if let Err(err) = result {
            log::error!("Frame loop stopped: {err}");
        }
    } else {
        let mut encoder = state
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("paused_encoder"),
            });
        match state.session.backend() {
            Some(backend) => backend.encode_composite_current(&mut encoder, &view),
            None => clear_view(&mut encoder, &view),
        }
        state.context.queue.submit(std::iter::once(encoder.finish()));
    }

    // ---- egui render pass (on top of simulation, separate encoder) ----
    let paint_jobs = state
        .egui_ctx
        .tessellate(full_output.shapes, full_output.pixels_per_point);

    for (id, image_delta) in &full_output.textures_delta.set {
        state.egui_renderer.update_texture(
            &state.context.device,
            &state.context.queue,
            *id,
            image_delta,
        );
    }

    let screen_descriptor = egui_wgpu::ScreenDescriptor {
        size_in_pixels: [win_w, win_h],
        pixels_per_point: full_output.pixels_per_point,
    };

    let mut egui_encoder =
        state
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("egui_encoder"),
            });

    state.egui_renderer.update_buffers(
        &state.context.device,
        &state.context.queue,
        &mut egui_encoder,
        &paint_jobs,
        &screen_descriptor,
    );

    render_egui_pass(
        &state.egui_renderer,
        &mut egui_encoder,
        &view,
        &paint_jobs,
        &screen_descriptor,
    );

    state.context.queue.submit(std::iter::once(egui_encoder.finish()));
    output.present();

    for id in &full_output.textures_delta.free {
        state.egui_renderer.free_texture(id);
    }

    // ---- Screenshot (the composite just presented, without the overlay) ----
    if state.screenshot_requested {
        state.screenshot_requested = false;
        match take_screenshot(state, &config.screenshot_dir) {
            Ok(path) => state.panel.set_status(format!("Screenshot saved: {:?}", path)),
            Err(err) => {
                log::error!("Screenshot failed: {err}");
                state.panel.set_status(format!("Screenshot failed: {err}"));
            }
        }
    }

    // ---- Periodic diagnostics ----
    let interval = config.scene.metrics_interval as u64;
    let frames = state.session.frames();
    if running && !state.panel.paused && interval > 0 && frames > 0 && frames % interval == 0 {
        if let Some(backend) = state.session.backend_mut() {
            match backend.read_trail() {
                Ok(field) => {
                    let diag = TrailDiagnostics::from_field(&field);
                    diag.log(frames, state.last_diag.as_ref());
                    state.last_diag = Some(diag);
                }
                Err(err) => log::warn!("Diagnostics readback failed: {err}"),
            }
        }
    }

    state.window.request_redraw();
}

fn take_screenshot(state: &mut AppState, dir: &std::path::Path) -> Result<PathBuf, SimError> {
    let frame = state.session.frames();
    let backend = state
        .session
        .backend_mut()
        .ok_or(SimError::InvalidState {
            op: "screenshot",
            state: "stopped",
        })?;
    let field = backend.read_trail()?;
    std::fs::create_dir_all(dir)?;
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("slimetrail_{stamp}_frame{frame:06}.png"));
    save_png(&path, &field)?;
    Ok(path)
}

fn clear_view(encoder: &mut wgpu::CommandEncoder, view: &wgpu::TextureView) {
    let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("clear_pass"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
    });
}

// ======================== Panel Overlay ========================

/// Draws the control panel over the composite (load, never clear).
fn render_egui_pass(
    renderer: &egui_wgpu::Renderer,
    encoder: &mut wgpu::CommandEncoder,
    view: &wgpu::TextureView,
    paint_jobs: &[egui::ClippedPrimitive],
    screen_descriptor: &egui_wgpu::ScreenDescriptor,
) {
    let pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("egui_render_pass"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Load,
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
    });
    // egui_wgpu wants a 'static pass.
    let mut pass = pass.forget_lifetime();
    renderer.render(&mut pass, paint_jobs, screen_descriptor);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_an_explicit_restart_rebuilds_a_failed_session() {
        for terminal in [SessionState::Errored, SessionState::Disposed] {
            assert!(!rebuilds_terminal(terminal, Trigger::Resize));
            assert!(!rebuilds_terminal(terminal, Trigger::Population));
            assert!(rebuilds_terminal(terminal, Trigger::UserRestart));
        }
        assert!(!rebuilds_terminal(SessionState::Running, Trigger::UserRestart));
    }
}
