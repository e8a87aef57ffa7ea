// ============================================================================
// world.rs — slimetrail
// GpuWorld: every device buffer of one session (ping-pong trail pair, agents,
// step counter, collaborator inputs, uniforms) plus upload and readback.
// ============================================================================

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::agents::{Agent, AgentStore};
use crate::config::{SimConfig, SimParams};
use crate::error::SimError;
use crate::field::TrailField;
use crate::inputs::{AttractionField, PointsOfInterest, POI_CAPACITY};

// ======================== Constants ========================

pub const WORKGROUP_X: u32 = 16;
pub const WORKGROUP_Y: u32 = 16;
pub const AGENT_WORKGROUP: u32 = 64;

// ======================== Uniform Structs ========================

/// Parameter tuple plus grid sizing; matches `SimUniforms` in the shaders.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct SimUniforms {
    pub params: [f32; 8],
    pub width: u32,
    pub height: u32,
    pub agent_count: u32,
    pub _pad: u32,
}

impl SimUniforms {
    pub fn new(params: &SimParams, width: u32, height: u32, agent_count: u32) -> Self {
        Self {
            params: params.to_array(),
            width,
            height,
            agent_count,
            _pad: 0,
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct CompositeUniforms {
    pub field_w: u32,
    pub field_h: u32,
    pub surface_w: u32,
    pub surface_h: u32,
}

// ======================== GpuWorld ========================

pub struct GpuWorld {
    // Ping-pong buffer index: 0 or 1
    pub current: usize,

    pub width: u32,
    pub height: u32,
    pub agent_count: u32,

    // Trail buffers (ping-pong)
    pub trail: [wgpu::Buffer; 2],

    // Single buffers (updated in-place)
    pub agents: wgpu::Buffer,
    pub step_counter: wgpu::Buffer,
    pub attraction: wgpu::Buffer,
    pub points: wgpu::Buffer,

    // Uniform buffers
    pub sim_uniforms: wgpu::Buffer,
    pub composite_uniforms: wgpu::Buffer,

    params: SimParams,
}

impl GpuWorld {
    /// Allocates and seeds every buffer. Allocation failures (device limits
    /// or out-of-memory) surface as `ResourceExhausted`.
    pub fn new(
        device: &wgpu::Device,
        config: &SimConfig,
        agents: &AgentStore,
    ) -> Result<Self, SimError> {
        let (width, height) = (config.width, config.height);
        let field_bytes = config.field_bytes();
        let agent_bytes = (agents.len().max(1) * std::mem::size_of::<Agent>()) as u64;

        let limits = device.limits();
        let max_binding = limits.max_storage_buffer_binding_size as u64;
        let max_buffer = limits.max_buffer_size;
        for (what, bytes) in [("trail field", field_bytes), ("agent store", agent_bytes)] {
            if bytes > max_binding || bytes > max_buffer {
                return Err(SimError::ResourceExhausted {
                    what: what.into(),
                    bytes,
                    reason: format!(
                        "exceeds device limit of {} bytes",
                        max_binding.min(max_buffer)
                    ),
                });
            }
        }

        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);

        let usage = wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::COPY_SRC
            | wgpu::BufferUsages::COPY_DST;

        let create_field_buffer = |label: &str| -> wgpu::Buffer {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: field_bytes,
                usage,
                mapped_at_creation: false,
            })
        };

        // Both trail buffers start zeroed.
        let trail = [create_field_buffer("trail_0"), create_field_buffer("trail_1")];
        let attraction = create_field_buffer("attraction");

        // A zero-length storage binding is invalid; pad an empty store.
        let agent_data: Vec<Agent> = if agents.is_empty() {
            vec![Agent::new(0.0, 0.0, 0.0)]
        } else {
            agents.agents().to_vec()
        };
        let agent_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("agents"),
            contents: bytemuck::cast_slice(&agent_data),
            usage,
        });

        let step_counter = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("step_counter"),
            contents: bytemuck::bytes_of(&agents.step()),
            usage,
        });

        let points = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("points_of_interest"),
            contents: bytemuck::cast_slice(&PointsOfInterest::default().packed()),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        });

        // ---- Uniform Buffers ----
        let agent_count = agents.len() as u32;
        let sim = SimUniforms::new(&config.params, width, height, agent_count);
        let sim_uniforms = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("sim_uniforms"),
            contents: bytemuck::bytes_of(&sim),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let composite = CompositeUniforms {
            field_w: width,
            field_h: height,
            surface_w: width,
            surface_h: height,
        };
        let composite_uniforms = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("composite_uniforms"),
            contents: bytemuck::bytes_of(&composite),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(SimError::ResourceExhausted {
                what: format!("{}x{} world with {} agents", width, height, agent_count),
                bytes: field_bytes * 3 + agent_bytes,
                reason: err.to_string(),
            });
        }

        log::info!(
            "GPU world allocated: {}x{} field, {} agents ({:.1} MiB)",
            width,
            height,
            agent_count,
            (field_bytes * 3 + agent_bytes) as f64 / (1024.0 * 1024.0)
        );

        Ok(GpuWorld {
            current: 0,
            width,
            height,
            agent_count,
            trail,
            agents: agent_buffer,
            step_counter,
            attraction,
            points,
            sim_uniforms,
            composite_uniforms,
            params: config.params,
        })
    }

    /// Swap ping-pong buffers after a frame
    pub fn swap(&mut self) {
        self.current = 1 - self.current;
    }

    /// Index of the current (read) buffer
    pub fn cur(&self) -> usize {
        self.current
    }

    /// Index of the next (write) buffer
    pub fn next(&self) -> usize {
        1 - self.current
    }

    pub fn params(&self) -> &SimParams {
        &self.params
    }

    pub fn write_params(&mut self, queue: &wgpu::Queue, params: &SimParams) {
        self.params = *params;
        let sim = SimUniforms::new(params, self.width, self.height, self.agent_count);
        queue.write_buffer(&self.sim_uniforms, 0, bytemuck::bytes_of(&sim));
    }

    pub fn write_attraction(&self, queue: &wgpu::Queue, field: &AttractionField) -> Result<(), SimError> {
        if (field.width(), field.height()) != (self.width, self.height) {
            return Err(SimError::InvalidInput(format!(
                "attraction field is {}x{}, trail field is {}x{}",
                field.width(),
                field.height(),
                self.width,
                self.height
            )));
        }
        queue.write_buffer(&self.attraction, 0, bytemuck::cast_slice(field.values()));
        Ok(())
    }

    pub fn write_points(&self, queue: &wgpu::Queue, points: &PointsOfInterest) {
        let packed: [f32; POI_CAPACITY * 4] = points.packed();
        queue.write_buffer(&self.points, 0, bytemuck::cast_slice(&packed));
    }

    pub fn write_surface_size(&self, queue: &wgpu::Queue, surface_w: u32, surface_h: u32) {
        let composite = CompositeUniforms {
            field_w: self.width,
            field_h: self.height,
            surface_w: surface_w.max(1),
            surface_h: surface_h.max(1),
        };
        queue.write_buffer(&self.composite_uniforms, 0, bytemuck::bytes_of(&composite));
    }

    /// Copies trail buffer `index` back to the host (blocking).
    pub fn readback_trail(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        index: usize,
    ) -> Result<TrailField, SimError> {
        let size = self.trail[index].size();
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("trail_readback"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("trail_readback_encoder"),
        });
        encoder.copy_buffer_to_buffer(&self.trail[index], 0, &staging, 0, size);
        queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        device.poll(wgpu::Maintain::Wait);

        match rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(SimError::Frame(format!("trail readback failed: {e}"))),
            Err(e) => return Err(SimError::Frame(format!("trail readback dropped: {e}"))),
        }

        let values: Vec<f32> = {
            let data = slice.get_mapped_range();
            bytemuck::cast_slice(&data).to_vec()
        };
        staging.unmap();

        TrailField::from_values(self.width, self.height, values)
            .ok_or_else(|| SimError::Frame("trail readback size mismatch".into()))
    }

    /// Releases every device buffer immediately.
    pub fn destroy(&self) {
        for buffer in self.trail.iter().chain([
            &self.agents,
            &self.step_counter,
            &self.attraction,
            &self.points,
            &self.sim_uniforms,
            &self.composite_uniforms,
        ]) {
            buffer.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_layouts_match_shaders() {
        assert_eq!(std::mem::size_of::<SimUniforms>(), 48);
        assert_eq!(std::mem::size_of::<CompositeUniforms>(), 16);
        assert_eq!(std::mem::size_of::<Agent>(), 12);
    }

    #[test]
    fn sim_uniforms_pack_params_in_order() {
        let params = SimParams::default();
        let u = SimUniforms::new(&params, 640, 480, 7);
        assert_eq!(u.params, params.to_array());
        assert_eq!((u.width, u.height, u.agent_count), (640, 480, 7));
    }
}
