//! PhotoDust: turns a photo into a dissolving cloud of GPU particles.
//!
//! The pipeline is photo -> [`sampler`] -> [`field::ParticleField`] ->
//! GPU instance buffer, animated each frame by [`driver::AnimationDriver`]
//! and deformed in the particle shader ([`gpu::shaders`]), whose math is
//! mirrored on the CPU in [`deform`].

pub mod app;
pub mod audio;
pub mod camera;
pub mod cli;
pub mod config;
pub mod deform;
pub mod driver;
pub mod error;
pub mod field;
pub mod gpu;
pub mod loader;
pub mod logger;
pub mod noise;
pub mod sampler;
pub mod settings;

pub use config::ParticleConfig;
pub use error::{LoadError, PipelineError, RenderError};
pub use field::{ParticleField, ParticleInstance};
