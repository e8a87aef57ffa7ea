// ============================================================================
// gpu.rs — slimetrail
// Device substrate: adapter/device acquisition, the compute-kernel backend
// and the factory the session uses to build it.
// ============================================================================

use std::sync::{Arc, Mutex};

use crate::agents::AgentStore;
use crate::backend::{BackendFactory, SimBackend};
use crate::config::{SimConfig, SimParams};
use crate::error::SimError;
use crate::field::TrailField;
use crate::inputs::{AttractionField, PointsOfInterest};
use crate::pipeline::{create_pipelines, Pipelines};
use crate::world::{GpuWorld, AGENT_WORKGROUP, WORKGROUP_X, WORKGROUP_Y};

// ======================== Device Context ========================

/// Device and queue shared by every backend built on this adapter.
#[derive(Clone)]
pub struct GpuContext {
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
    pub adapter_name: String,
    errors: Arc<Mutex<Option<String>>>,
}

impl GpuContext {
    /// Requests an adapter (optionally compatible with `surface`) and a
    /// device. No adapter or no device is a `Capability` error.
    pub async fn request(
        instance: &wgpu::Instance,
        surface: Option<&wgpu::Surface<'_>>,
    ) -> Result<(Self, wgpu::Adapter), SimError> {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: surface,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| {
                SimError::Capability(
                    "no suitable GPU adapter (Vulkan, Metal, DX12 or GL required)".into(),
                )
            })?;

        log::info!("GPU: {}", adapter.get_info().name);

        let adapter_limits = adapter.limits();
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("slimetrail_device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits {
                        max_storage_buffer_binding_size: adapter_limits
                            .max_storage_buffer_binding_size,
                        max_buffer_size: adapter_limits.max_buffer_size,
                        ..wgpu::Limits::default()
                    },
                    memory_hints: Default::default(),
                },
                None,
            )
            .await
            .map_err(|e| SimError::Capability(format!("device request failed: {e}")))?;

        let errors = Arc::new(Mutex::new(None));
        let slot = errors.clone();
        device.on_uncaptured_error(Box::new(move |err| {
            log::error!("GPU error: {err}");
            if let Ok(mut slot) = slot.lock() {
                slot.get_or_insert_with(|| err.to_string());
            }
        }));

        let context = Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            adapter_name: adapter.get_info().name,
            errors,
        };
        Ok((context, adapter))
    }

    /// Blocking adapter + device for runs without a window.
    pub fn headless() -> Result<Self, SimError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        pollster::block_on(Self::request(&instance, None)).map(|(context, _)| context)
    }

    /// First uncaptured device error since the last call, if any.
    pub fn take_error(&self) -> Option<String> {
        self.errors.lock().ok().and_then(|mut slot| slot.take())
    }
}

/// Picks a non-sRGB surface format so intensities are written without a
/// gamma curve.
pub fn surface_config(
    adapter: &wgpu::Adapter,
    surface: &wgpu::Surface<'_>,
    width: u32,
    height: u32,
) -> Result<wgpu::SurfaceConfiguration, SimError> {
    let surface_caps = surface.get_capabilities(adapter);
    let surface_format = surface_caps
        .formats
        .iter()
        .find(|f| !f.is_srgb())
        .or_else(|| surface_caps.formats.first())
        .copied()
        .ok_or_else(|| SimError::Capability("surface reports no formats".into()))?;
    if surface_format.is_srgb() {
        log::warn!("Only sRGB surface formats available; output will be gamma encoded");
    }
    log::info!("Surface format: {:?}", surface_format);

    let present_mode = if surface_caps.present_modes.contains(&wgpu::PresentMode::Mailbox) {
        log::info!("Present mode: Mailbox");
        wgpu::PresentMode::Mailbox
    } else {
        log::info!("Present mode: Fifo (VSync ON)");
        wgpu::PresentMode::Fifo
    };

    Ok(wgpu::SurfaceConfiguration {
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        format: surface_format,
        width: width.max(1),
        height: height.max(1),
        present_mode,
        alpha_mode: surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto),
        view_formats: vec![],
        desired_maximum_frame_latency: 2,
    })
}

// ======================== Backend ========================

pub struct GpuBackend {
    context: GpuContext,
    world: GpuWorld,
    pipelines: Pipelines,
    released: bool,
}

impl GpuBackend {
    pub fn world(&self) -> &GpuWorld {
        &self.world
    }

    pub fn set_surface_size(&self, width: u32, height: u32) {
        self.world
            .write_surface_size(&self.context.queue, width, height);
    }

    /// Records the composite pass (next buffer -> `view`). Call between
    /// `simulate` and `swap`.
    pub fn encode_composite(&self, encoder: &mut wgpu::CommandEncoder, view: &wgpu::TextureView) {
        self.encode_composite_from(encoder, view, self.world.cur());
    }

    /// Composites the current buffer, i.e. the last presented frame; used
    /// while paused.
    pub fn encode_composite_current(&self, encoder: &mut wgpu::CommandEncoder, view: &wgpu::TextureView) {
        self.encode_composite_from(encoder, view, self.world.next());
    }

    // Bind group `i` reads trail buffer `1 - i`.
    fn encode_composite_from(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        view: &wgpu::TextureView,
        bind_index: usize,
    ) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("composite_pass"),
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
        pass.set_pipeline(&self.pipelines.composite_pipeline);
        pass.set_bind_group(0, &self.pipelines.composite_bind_groups[bind_index], &[]);
        pass.draw(0..3, 0..1);
    }

    fn check_device(&self) -> Result<(), SimError> {
        match self.context.take_error() {
            Some(err) => Err(SimError::Frame(err)),
            None => Ok(()),
        }
    }
}

impl SimBackend for GpuBackend {
    fn dimensions(&self) -> (u32, u32) {
        (self.world.width, self.world.height)
    }

    fn population(&self) -> u32 {
        self.world.agent_count
    }

    fn write_params(&mut self, params: &SimParams) {
        self.world.write_params(&self.context.queue, params);
    }

    fn write_attraction(&mut self, field: &AttractionField) -> Result<(), SimError> {
        self.world.write_attraction(&self.context.queue, field)
    }

    fn write_points(&mut self, points: &PointsOfInterest) {
        self.world.write_points(&self.context.queue, points);
    }

    fn simulate(&mut self) -> Result<(), SimError> {
        if self.released {
            return Err(SimError::Frame("backend already released".into()));
        }
        let cur = self.world.cur();
        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("simulation_encoder"),
            });

        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("diffusion_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipelines.diffusion_pipeline);
            pass.set_bind_group(0, &self.pipelines.diffusion_bind_groups[cur], &[]);
            pass.dispatch_workgroups(
                self.world.width.div_ceil(WORKGROUP_X),
                self.world.height.div_ceil(WORKGROUP_Y),
                1,
            );
        }

        // Separate pass: every diffused cell lands before any deposit.
        if self.world.agent_count > 0 {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("agent_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipelines.agent_pipeline);
            pass.set_bind_group(0, &self.pipelines.agent_bind_groups[cur], &[]);
            pass.dispatch_workgroups(self.world.agent_count.div_ceil(AGENT_WORKGROUP), 1, 1);
        }

        self.context.queue.submit(std::iter::once(encoder.finish()));
        self.check_device()
    }

    fn swap(&mut self) {
        self.world.swap();
    }

    fn read_trail(&mut self) -> Result<TrailField, SimError> {
        let field = self
            .world
            .readback_trail(&self.context.device, &self.context.queue, self.world.cur())?;
        self.check_device()?;
        Ok(field)
    }

    fn release(&mut self) {
        if !self.released {
            self.world.destroy();
            self.released = true;
            log::info!("GPU world released");
        }
    }
}

// ======================== Factory ========================

/// Builds `GpuBackend`s on one device. Without a context the capability
/// query answers false.
pub struct GpuFactory {
    context: Option<GpuContext>,
    format: wgpu::TextureFormat,
}

impl GpuFactory {
    pub fn new(context: GpuContext, format: wgpu::TextureFormat) -> Self {
        Self {
            context: Some(context),
            format,
        }
    }

    /// Probes for a device; a missing one is logged and reported through
    /// `capability_available`.
    pub fn headless() -> Self {
        let context = match GpuContext::headless() {
            Ok(context) => Some(context),
            Err(err) => {
                log::warn!("{err}");
                None
            }
        };
        Self {
            context,
            format: wgpu::TextureFormat::Rgba8Unorm,
        }
    }
}

impl BackendFactory for GpuFactory {
    type Backend = GpuBackend;

    fn name(&self) -> &'static str {
        "gpu"
    }

    fn capability_available(&self) -> bool {
        self.context.is_some()
    }

    fn create(&self, config: &SimConfig, agents: AgentStore) -> Result<GpuBackend, SimError> {
        let context = self
            .context
            .clone()
            .ok_or_else(|| SimError::Capability("no GPU device".into()))?;

        let world = GpuWorld::new(&context.device, config, &agents)?;

        context.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipelines = create_pipelines(&context.device, &world, self.format);
        if let Some(err) = pollster::block_on(context.device.pop_error_scope()) {
            world.destroy();
            return Err(SimError::Capability(format!("pipeline creation failed: {err}")));
        }

        Ok(GpuBackend {
            context,
            world,
            pipelines,
            released: false,
        })
    }
}
