// ============================================================================
// pipeline.rs — slimetrail
// GPU pipeline creation (two compute stages, one composite render pass) and
// the ping-pong bind groups that feed them.
// ============================================================================

use crate::world::GpuWorld;

// ======================== Pipelines ========================

/// Every pipeline with one bind group per value of the world's current
/// buffer index. Group `[cur]` of each stage is the one to use while
/// `world.cur() == cur`.
pub struct Pipelines {
    pub diffusion_pipeline: wgpu::ComputePipeline,
    pub diffusion_bind_groups: [wgpu::BindGroup; 2],

    pub agent_pipeline: wgpu::ComputePipeline,
    pub agent_bind_groups: [wgpu::BindGroup; 2],

    pub composite_pipeline: wgpu::RenderPipeline,
    pub composite_bind_groups: [wgpu::BindGroup; 2],
}

/// How a kernel touches one binding slot.
#[derive(Clone, Copy)]
enum Access {
    Uniform,
    Read,
    Write,
}

// ======================== Pipeline Creation ========================

pub fn create_pipelines(
    device: &wgpu::Device,
    world: &GpuWorld,
    surface_format: wgpu::TextureFormat,
) -> Pipelines {
    let compute = wgpu::ShaderStages::COMPUTE;

    // ---- Diffusion-decay: params, trail in, trail out ----
    let diffusion_bgl = bind_layout(
        device,
        "diffusion",
        compute,
        &[Access::Uniform, Access::Read, Access::Write],
    );
    let diffusion_pipeline = compute_pipeline(
        device,
        "diffusion",
        &diffusion_bgl,
        include_str!("shaders/decay_diffusion.wgsl"),
    );
    let diffusion_bind_groups = ping_pong(device, "diffusion", &diffusion_bgl, |cur| {
        vec![&world.sim_uniforms, &world.trail[cur], &world.trail[1 - cur]]
    });

    // ---- Agent update: senses current, deposits into next ----
    let agent_bgl = bind_layout(
        device,
        "agents",
        compute,
        &[
            Access::Uniform,
            Access::Read,
            Access::Write,
            Access::Write,
            Access::Read,
            Access::Read,
            Access::Write,
        ],
    );
    let agent_pipeline = compute_pipeline(
        device,
        "agents",
        &agent_bgl,
        include_str!("shaders/agents.wgsl"),
    );
    let agent_bind_groups = ping_pong(device, "agents", &agent_bgl, |cur| {
        vec![
            &world.sim_uniforms,
            &world.trail[cur],
            &world.trail[1 - cur],
            &world.agents,
            &world.attraction,
            &world.points,
            &world.step_counter,
        ]
    });

    // ---- Composite: next buffer (post-deposit, pre-swap) -> surface ----
    let composite_bgl = bind_layout(
        device,
        "composite",
        wgpu::ShaderStages::FRAGMENT,
        &[Access::Uniform, Access::Read],
    );
    let composite_pipeline = composite_pipeline(device, &composite_bgl, surface_format);
    let composite_bind_groups = ping_pong(device, "composite", &composite_bgl, |cur| {
        vec![&world.composite_uniforms, &world.trail[1 - cur]]
    });

    Pipelines {
        diffusion_pipeline,
        diffusion_bind_groups,
        agent_pipeline,
        agent_bind_groups,
        composite_pipeline,
        composite_bind_groups,
    }
}

fn composite_pipeline(
    device: &wgpu::Device,
    bgl: &wgpu::BindGroupLayout,
    surface_format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("composite_shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("shaders/composite.wgsl").into()),
    });
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("composite_pipeline_layout"),
        bind_group_layouts: &[bgl],
        push_constant_ranges: &[],
    });

    // Fullscreen triangle, no vertex buffers; the fragment stage overwrites
    // every pixel.
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("composite_pipeline"),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: &module,
            entry_point: Some("vs_main"),
            buffers: &[],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &module,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: surface_format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

// ======================== Helpers ========================

/// Compute pipeline from WGSL source with entry point `main`.
fn compute_pipeline(
    device: &wgpu::Device,
    name: &str,
    bgl: &wgpu::BindGroupLayout,
    source: &str,
) -> wgpu::ComputePipeline {
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(&format!("{name}_shader")),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(&format!("{name}_pipeline_layout")),
        bind_group_layouts: &[bgl],
        push_constant_ranges: &[],
    });
    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(&format!("{name}_pipeline")),
        layout: Some(&layout),
        module: &module,
        entry_point: Some("main"),
        compilation_options: Default::default(),
        cache: None,
    })
}

/// Buffer-only layout; slot `i` gets binding index `i`.
fn bind_layout(
    device: &wgpu::Device,
    name: &str,
    visibility: wgpu::ShaderStages,
    slots: &[Access],
) -> wgpu::BindGroupLayout {
    let entries: Vec<wgpu::BindGroupLayoutEntry> = slots
        .iter()
        .enumerate()
        .map(|(binding, access)| {
            let ty = match access {
                Access::Uniform => wgpu::BufferBindingType::Uniform,
                Access::Read => wgpu::BufferBindingType::Storage { read_only: true },
                Access::Write => wgpu::BufferBindingType::Storage { read_only: false },
            };
            wgpu::BindGroupLayoutEntry {
                binding: binding as u32,
                visibility,
                ty: wgpu::BindingType::Buffer {
                    ty,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }
        })
        .collect();
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(&format!("{name}_bgl")),
        entries: &entries,
    })
}

/// One bind group per current-buffer index; `buffers(cur)` lists the
/// buffers in binding order.
fn ping_pong<'a>(
    device: &wgpu::Device,
    name: &str,
    layout: &wgpu::BindGroupLayout,
    buffers: impl Fn(usize) -> Vec<&'a wgpu::Buffer>,
) -> [wgpu::BindGroup; 2] {
    [0usize, 1].map(|cur| {
        let entries: Vec<wgpu::BindGroupEntry> = buffers(cur)
            .into_iter()
            .enumerate()
            .map(|(binding, buffer)| wgpu::BindGroupEntry {
                binding: binding as u32,
                resource: buffer.as_entire_binding(),
            })
            .collect();
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{name}_bg_{cur}")),
            layout,
            entries: &entries,
        })
    })
}
