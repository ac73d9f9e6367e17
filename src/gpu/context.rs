// ============================================================================
// GPU CONTEXT — wgpu Device, Queue, and adapter initialization
// ============================================================================

use std::sync::Arc;

use crate::error::PipelineError;

/// Holds the core wgpu resources shared by every pipeline in the session.
pub struct GpuContext {
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
    pub adapter_name: String,
    /// Maximum texture dimension supported by this device.
    pub max_texture_dim: u32,
}

impl GpuContext {
    /// Create a GPU context.  Tries hardware first, then falls back to a
    /// software rasterizer (`force_fallback_adapter`) so headless machines
    /// can still render.
    ///
    /// We use `pollster::block_on` because eframe's glow backend has no wgpu
    /// device to share; we need our own for offscreen particle rendering.
    pub fn new(preferred_gpu: &str) -> Result<Self, PipelineError> {
        match pollster::block_on(Self::new_async(preferred_gpu, false)) {
            Ok(ctx) => return Ok(ctx),
            Err(e) => log::warn!("hardware adapter unavailable ({e}), trying software fallback"),
        }
        pollster::block_on(Self::new_async(preferred_gpu, true))
    }

    async fn new_async(preferred_gpu: &str, force_fallback: bool) -> Result<Self, PipelineError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: power_preference(preferred_gpu),
                compatible_surface: None,
                force_fallback_adapter: force_fallback,
            })
            .await
            .ok_or(PipelineError::NoAdapter)?;

        let adapter_name = adapter.get_info().name.clone();
        let limits = adapter.limits();

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("PhotoDust GPU"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits {
                        max_texture_dimension_2d: limits.max_texture_dimension_2d,
                        max_buffer_size: limits.max_buffer_size,
                        ..wgpu::Limits::downlevel_defaults()
                    },
                },
                None,
            )
            .await?;

        log::info!(
            "GPU adapter: {adapter_name}{}",
            if force_fallback { " (software)" } else { "" }
        );

        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            adapter_name,
            max_texture_dim: limits.max_texture_dimension_2d,
        })
    }

    /// Check if a render target of the given dimensions can be created.
    pub fn supports_size(&self, width: u32, height: u32) -> bool {
        width > 0 && height > 0 && width <= self.max_texture_dim && height <= self.max_texture_dim
    }

    /// Submit a single encoder's commands.
    pub fn submit_one(&self, encoder: wgpu::CommandEncoder) {
        self.queue.submit(std::iter::once(encoder.finish()));
    }
}

/// Map the settings string onto a wgpu power preference.
pub fn power_preference(preferred_gpu: &str) -> wgpu::PowerPreference {
    match preferred_gpu.to_lowercase().as_str() {
        "low power" | "integrated" => wgpu::PowerPreference::LowPower,
        _ => wgpu::PowerPreference::HighPerformance,
    }
}
