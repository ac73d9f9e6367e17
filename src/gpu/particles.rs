// ============================================================================
// PARTICLE PIPELINE — instanced quads, additive blend, no depth buffer
// ============================================================================

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::camera::OrbitCamera;
use crate::driver::FrameState;
use crate::error::PipelineError;
use crate::field::{ParticleField, ParticleInstance};

/// Offscreen colour format.  Not sRGB: photo bytes go in and come out as-is.
pub const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Background colour, #050505.
pub const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 5.0 / 255.0,
    g: 5.0 / 255.0,
    b: 5.0 / 255.0,
    a: 1.0,
};

/// Vertices per particle quad (two triangles).
const QUAD_VERTICES: u32 = 6;

/// Per-frame uniform block.  Layout mirrors `Uniforms` in PARTICLE_SHADER.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct ParticleUniforms {
    pub model_view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    pub pointer: [f32; 2],
    /// Target size in physical pixels.
    pub viewport: [f32; 2],
    pub time: f32,
    pub audio: f32,
    pub size: f32,
    pub dispersion: f32,
    pub curvature: f32,
    pub roughness: f32,
    pub pixel_ratio: f32,
    pub _pad: f32,
}

impl ParticleUniforms {
    pub fn new(frame: &FrameState, camera: &OrbitCamera, width: u32, height: u32, pixel_ratio: f32) -> Self {
        let aspect = width.max(1) as f32 / height.max(1) as f32;
        let model_view = camera.view() * frame.model_matrix();
        let inputs = &frame.inputs;
        Self {
            model_view: model_view.to_cols_array_2d(),
            projection: camera.projection(aspect).to_cols_array_2d(),
            pointer: inputs.pointer,
            viewport: [width as f32, height as f32],
            time: inputs.time,
            audio: inputs.audio,
            size: inputs.config.size,
            dispersion: inputs.config.dispersion,
            curvature: inputs.config.curvature,
            roughness: inputs.config.roughness,
            pixel_ratio,
            _pad: 0.0,
        }
    }
}

/// The uploaded instance buffer of the current field.
struct InstanceBuffer {
    buffer: wgpu::Buffer,
    count: u32,
}

/// Render pipeline plus the GPU copy of the current field.
pub struct ParticlePipeline {
    pipeline: wgpu::RenderPipeline,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    instances: Option<InstanceBuffer>,
}

impl ParticlePipeline {
    const INSTANCE_ATTRS: [wgpu::VertexAttribute; 4] = wgpu::vertex_attr_array![
        0 => Float32x3,
        1 => Float32x2,
        2 => Float32x3,
        3 => Float32,
    ];

    /// Compile the shader and build the pipeline.  A shader or pipeline
    /// validation failure comes back as `PipelineError::ShaderCompile`.
    pub fn new(device: &wgpu::Device) -> Result<Self, PipelineError> {
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("particle_shader"),
            source: wgpu::ShaderSource::Wgsl(super::shaders::PARTICLE_SHADER.into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("particle_uniform_bgl"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("particle_uniforms"),
            size: std::mem::size_of::<ParticleUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("particle_uniform_bg"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("particle_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("particle_pipeline"),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<ParticleInstance>() as wgpu::BufferAddress,
                    step_mode: wgpu::VertexStepMode::Instance,
                    attributes: &Self::INSTANCE_ATTRS,
                }],
                compilation_options: Default::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            // Additive particles: order-independent, so no depth test.
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: TARGET_FORMAT,
                    blend: Some(wgpu::BlendState {
                        color: wgpu::BlendComponent {
                            src_factor: wgpu::BlendFactor::SrcAlpha,
                            dst_factor: wgpu::BlendFactor::One,
                            operation: wgpu::BlendOperation::Add,
                        },
                        alpha: wgpu::BlendComponent {
                            src_factor: wgpu::BlendFactor::One,
                            dst_factor: wgpu::BlendFactor::One,
                            operation: wgpu::BlendOperation::Add,
                        },
                    }),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            multiview: None,
        });

        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(PipelineError::ShaderCompile(err.to_string()));
        }

        Ok(Self {
            pipeline,
            uniform_buffer,
            bind_group,
            instances: None,
        })
    }

    /// Upload a new field.  The previous buffer is released only after the
    /// new one exists, so a draw never sees a half-written field.
    pub fn upload_field(&mut self, device: &wgpu::Device, field: &ParticleField) {
        if field.is_empty() {
            self.instances = None;
            return;
        }
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("particle_instances"),
            contents: field.as_bytes(),
            usage: wgpu::BufferUsages::VERTEX,
        });
        self.instances = Some(InstanceBuffer {
            buffer,
            count: field.len() as u32,
        });
    }

    /// Particles drawn per frame (0 when no field is uploaded).
    pub fn instance_count(&self) -> u32 {
        self.instances.as_ref().map_or(0, |i| i.count)
    }

    pub fn write_uniforms(&self, queue: &wgpu::Queue, uniforms: &ParticleUniforms) {
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(uniforms));
    }

    /// Clear `view` and draw every particle into it.
    pub fn encode(&self, encoder: &mut wgpu::CommandEncoder, view: &wgpu::TextureView) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("particle_pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        if let Some(instances) = &self.instances {
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &self.bind_group, &[]);
            pass.set_vertex_buffer(0, instances.buffer.slice(..));
            pass.draw(0..QUAD_VERTICES, 0..instances.count);
        }
    }
}
