// ============================================================================
// ERRORS — recoverable load failures vs. fatal pipeline failures
// ============================================================================

use std::path::PathBuf;

use thiserror::Error;

/// A photo could not be turned into a particle field.
///
/// Always recoverable: the caller keeps whatever field it already has.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("could not read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("image has zero size ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    #[error("{columns}x{rows} particle grid exceeds the {max_cells}-cell limit")]
    GridTooLarge { columns: u32, rows: u32, max_cells: u64 },
}

/// The GPU pipeline could not be brought up.  Fatal for the session.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("no GPU adapter available (hardware or software)")]
    NoAdapter,

    #[error("GPU device request failed: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),

    #[error("particle shader failed to compile: {0}")]
    ShaderCompile(String),
}

/// A frame could not be produced or written out.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("GPU readback failed: {0}")]
    Readback(String),

    #[error("could not write '{path}': {message}")]
    Encode { path: PathBuf, message: String },
}
