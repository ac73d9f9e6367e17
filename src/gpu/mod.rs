// ============================================================================
// GPU MODULE — offscreen particle rendering
// ============================================================================
//
// Architecture:
//   context.rs   — wgpu Device, Queue, adapter init
//   shaders.rs   — WGSL source for the particle pass (inline string)
//   particles.rs — uniform block, instanced render pipeline, field upload
//   renderer.rs  — offscreen target + sync/async readback
// ============================================================================

pub mod context;
pub mod particles;
pub mod renderer;
pub mod shaders;

pub use context::GpuContext;
pub use particles::{CLEAR_COLOR, ParticleUniforms};
pub use renderer::ParticleRenderer;
