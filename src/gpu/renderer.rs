// ============================================================================
// PARTICLE RENDERER — offscreen target, frame submission, pixel readback
// ============================================================================

use image::RgbaImage;

use super::context::GpuContext;
use super::particles::{ParticlePipeline, ParticleUniforms, TARGET_FORMAT};
use crate::error::{PipelineError, RenderError};
use crate::field::ParticleField;

/// WGPU requires `bytes_per_row` in texture copies to be a multiple of 256.
pub const COPY_BYTES_PER_ROW_ALIGNMENT: u32 = 256;

pub fn aligned_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * 4;
    unpadded.div_ceil(COPY_BYTES_PER_ROW_ALIGNMENT) * COPY_BYTES_PER_ROW_ALIGNMENT
}

/// Strip row padding from a mapped staging buffer.
fn unpad_rows(mapped: &[u8], width: u32, height: u32, padded_bytes_per_row: u32) -> Vec<u8> {
    let tight = width as usize * 4;
    let padded = padded_bytes_per_row as usize;
    let mut out = Vec::with_capacity(tight * height as usize);
    for row in 0..height as usize {
        let start = row * padded;
        out.extend_from_slice(&mapped[start..start + tight]);
    }
    out
}

// ============================================================================
// ASYNC GPU READBACK — double-buffered staging for stall-free display
// ============================================================================

/// What a pending readback buffer holds.
#[derive(Clone, Copy, Debug)]
struct ReadbackMeta {
    width: u32,
    height: u32,
    padded_bytes_per_row: u32,
}

/// Double-buffered async GPU readback.  The UI thread never waits on
/// `Maintain::Wait`: it reads the PREVIOUS frame's staging buffer while the
/// GPU fills the other one.
///
/// Flow per frame:
///   1. `try_read()` — non-blocking poll, take the previous frame if mapped
///   2. render + copy into `write_buffer()` (skipped while a read is pending)
///   3. `submit_and_swap()` — map_async on the write buffer, swap indices
struct AsyncReadback {
    buffers: [Option<wgpu::Buffer>; 2],
    write_idx: usize,
    buf_size: u64,
    read_rx: Option<std::sync::mpsc::Receiver<Result<(), wgpu::BufferAsyncError>>>,
    read_meta: Option<ReadbackMeta>,
}

impl AsyncReadback {
    fn new() -> Self {
        Self {
            buffers: [None, None],
            write_idx: 0,
            buf_size: 0,
            read_rx: None,
            read_meta: None,
        }
    }

    fn read_pending(&self) -> bool {
        self.read_rx.is_some()
    }

    /// Ensure both staging buffers exist with at least `size` bytes.
    fn ensure_buffers(&mut self, device: &wgpu::Device, size: u64) {
        if self.buf_size >= size && self.buffers.iter().all(Option::is_some) {
            return;
        }
        self.cancel_pending();
        for (i, slot) in self.buffers.iter_mut().enumerate() {
            *slot = Some(device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(if i == 0 { "async_readback_0" } else { "async_readback_1" }),
                size,
                usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
                mapped_at_creation: false,
            }));
        }
        self.buf_size = size;
    }

    fn write_buffer(&self) -> Option<&wgpu::Buffer> {
        self.buffers[self.write_idx].as_ref()
    }

    /// Call after `queue.submit()` with the copy command.
    fn submit_and_swap(&mut self, meta: ReadbackMeta) {
        let Some(buf) = self.buffers[self.write_idx].as_ref() else {
            return;
        };
        let (tx, rx) = std::sync::mpsc::channel();
        buf.slice(..).map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.write_idx = 1 - self.write_idx;
        self.read_rx = Some(rx);
        self.read_meta = Some(meta);
    }

    /// Non-blocking read of the previous frame.  Pumps callbacks with
    /// `Maintain::Poll`; returns tightly packed RGBA once mapping completes.
    fn try_read(&mut self, device: &wgpu::Device) -> Option<RgbaImage> {
        let rx = self.read_rx.as_ref()?;
        device.poll(wgpu::Maintain::Poll);

        let mapped_ok = match rx.try_recv() {
            Ok(result) => result.is_ok(),
            Err(std::sync::mpsc::TryRecvError::Empty) => return None,
            Err(std::sync::mpsc::TryRecvError::Disconnected) => false,
        };
        self.read_rx = None;
        let meta = self.read_meta.take()?;
        let buf = self.buffers[1 - self.write_idx].as_ref()?;
        if !mapped_ok {
            log::warn!("async readback map failed; frame dropped");
            return None;
        }

        let pixels = {
            let mapped = buf.slice(..).get_mapped_range();
            unpad_rows(&mapped, meta.width, meta.height, meta.padded_bytes_per_row)
        };
        buf.unmap();
        RgbaImage::from_raw(meta.width, meta.height, pixels)
    }

    /// Drop the pending read and both buffers; a cancelled map may still
    /// complete later, so neither buffer is safe to copy into again.
    fn cancel_pending(&mut self) {
        self.read_rx = None;
        self.read_meta = None;
        self.buffers = [None, None];
        self.buf_size = 0;
    }
}

// ============================================================================
// RENDERER
// ============================================================================

/// Offscreen colour target, recreated when the size changes.
struct RenderTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
}

/// Owns the GPU context, the particle pipeline and the offscreen target.
pub struct ParticleRenderer {
    ctx: GpuContext,
    pipeline: ParticlePipeline,
    target: Option<RenderTarget>,
    /// Cached staging buffer for synchronous readback.
    cached_staging_buf: Option<(wgpu::Buffer, u64)>,
    async_readback: AsyncReadback,
}

impl ParticleRenderer {
    /// Bring up a device and compile the particle pipeline.
    pub fn new(preferred_gpu: &str) -> Result<Self, PipelineError> {
        let ctx = GpuContext::new(preferred_gpu)?;
        Self::with_context(ctx)
    }

    pub fn with_context(ctx: GpuContext) -> Result<Self, PipelineError> {
        let pipeline = ParticlePipeline::new(&ctx.device)?;
        Ok(Self {
            ctx,
            pipeline,
            target: None,
            cached_staging_buf: None,
            async_readback: AsyncReadback::new(),
        })
    }

    pub fn adapter_name(&self) -> &str {
        &self.ctx.adapter_name
    }

    /// Replace the displayed field.
    pub fn set_field(&mut self, field: &ParticleField) {
        self.pipeline.upload_field(&self.ctx.device, field);
        log::debug!("uploaded {} particles", self.pipeline.instance_count());
    }

    pub fn instance_count(&self) -> u32 {
        self.pipeline.instance_count()
    }

    fn ensure_target(&mut self, width: u32, height: u32) -> Result<&RenderTarget, RenderError> {
        if !self.ctx.supports_size(width, height) {
            return Err(RenderError::Readback(format!(
                "render target {width}x{height} not supported (max {})",
                self.ctx.max_texture_dim
            )));
        }
        let stale = !matches!(&self.target, Some(t) if t.width == width && t.height == height);
        if stale {
            let texture = self.ctx.device.create_texture(&wgpu::TextureDescriptor {
                label: Some("particle_target"),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: TARGET_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
                view_formats: &[],
            });
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            self.target = Some(RenderTarget {
                texture,
                view,
                width,
                height,
            });
        }
        self.target
            .as_ref()
            .ok_or_else(|| RenderError::Readback("render target missing".into()))
    }

    /// Encode the particle pass plus a copy of the target into `staging`.
    fn encode_frame(
        &self,
        target: &RenderTarget,
        uniforms: &ParticleUniforms,
        staging: &wgpu::Buffer,
    ) -> wgpu::CommandEncoder {
        self.pipeline.write_uniforms(&self.ctx.queue, uniforms);
        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("particle_frame_encoder"),
            });
        self.pipeline.encode(&mut encoder, &target.view);
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(aligned_bytes_per_row(target.width)),
                    rows_per_image: Some(target.height),
                },
            },
            wgpu::Extent3d {
                width: target.width,
                height: target.height,
                depth_or_array_layers: 1,
            },
        );
        encoder
    }

    /// Render one frame and block until its pixels are back on the CPU.
    pub fn render_frame(
        &mut self,
        uniforms: &ParticleUniforms,
        width: u32,
        height: u32,
    ) -> Result<RgbaImage, RenderError> {
        self.ensure_target(width, height)?;
        let buffer_size = aligned_bytes_per_row(width) as u64 * height as u64;
        let need_new = !matches!(&self.cached_staging_buf, Some((_, sz)) if *sz >= buffer_size);
        if need_new {
            let buf = self.ctx.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("readback_staging"),
                size: buffer_size,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            self.cached_staging_buf = Some((buf, buffer_size));
        }

        let (Some(target), Some((staging, _))) = (&self.target, &self.cached_staging_buf) else {
            return Err(RenderError::Readback("render resources missing".into()));
        };
        let encoder = self.encode_frame(target, uniforms, staging);
        self.ctx.submit_one(encoder);

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.ctx.device.poll(wgpu::Maintain::Wait);
        match rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(RenderError::Readback(format!("map error: {e:?}"))),
            Err(e) => return Err(RenderError::Readback(format!("channel error: {e}"))),
        }

        let pixels = {
            let mapped = slice.get_mapped_range();
            unpad_rows(&mapped, width, height, aligned_bytes_per_row(width))
        };
        staging.unmap();
        RgbaImage::from_raw(width, height, pixels)
            .ok_or_else(|| RenderError::Readback("pixel buffer size mismatch".into()))
    }

    /// Submit a frame for non-blocking readback.  Returns `false` (and
    /// renders nothing) while the previous frame is still being mapped.
    pub fn submit_frame_async(
        &mut self,
        uniforms: &ParticleUniforms,
        width: u32,
        height: u32,
    ) -> Result<bool, RenderError> {
        if self.async_readback.read_pending() {
            return Ok(false);
        }
        self.ensure_target(width, height)?;
        let padded_bytes_per_row = aligned_bytes_per_row(width);
        self.async_readback
            .ensure_buffers(&self.ctx.device, padded_bytes_per_row as u64 * height as u64);

        let (Some(target), Some(staging)) = (&self.target, self.async_readback.write_buffer()) else {
            return Err(RenderError::Readback("render resources missing".into()));
        };
        let encoder = self.encode_frame(target, uniforms, staging);
        self.ctx.submit_one(encoder);
        self.async_readback.submit_and_swap(ReadbackMeta {
            width,
            height,
            padded_bytes_per_row,
        });
        Ok(true)
    }

    /// The most recent asynchronously rendered frame, once it is mapped.
    pub fn try_take_frame(&mut self) -> Option<RgbaImage> {
        self.async_readback.try_read(&self.ctx.device)
    }
}
