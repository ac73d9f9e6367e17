// ============================================================================
// PhotoDust CLI — headless frame rendering via command-line arguments
// ============================================================================
//
// Usage examples:
//   photodust --input photo.jpg                         (60 frames into photodust_out/)
//   photodust -i portrait.png -o frames/ --frames 240 --pulse 120 --gif
//   photodust -i "shots/*.jpg" --resolution 1280x720 --curvature 1.5
//   photodust -i a.png b.png --pointer 0.5,-1 --audio 0.6
//
// No window is opened.  One GPU context is shared by every input; frames
// are rendered and read back synchronously on the current thread.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, Frame, ImageFormat, RgbaImage};

use crate::audio::pulse_level;
use crate::camera::OrbitCamera;
use crate::config::ParticleConfig;
use crate::driver::{AnimationDriver, FAR_POINTER, FrameTargets};
use crate::error::RenderError;
use crate::gpu::{ParticleRenderer, ParticleUniforms};
use crate::loader::{PhotoSource, load_field};
use crate::sampler::SamplerSettings;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// PhotoDust headless renderer.
///
/// Turns photos into dissolving particle clouds and writes the animation
/// out as a PNG sequence (and optionally an animated GIF).
#[derive(Parser, Debug)]
#[command(
    name = "photodust",
    about = "PhotoDust headless particle renderer",
    long_about = "Render the dissolving-dust animation of one or more photos without\n\
                  opening the GUI. Writes frame_0000.png, frame_0001.png, ... per input.\n\n\
                  Example:\n  \
                  photodust --input photo.jpg --frames 120 --gif\n  \
                  photodust -i \"*.png\" --output-dir out/ --pulse 128"
)]
pub struct CliArgs {
    /// Input image(s). Glob patterns accepted (e.g. "*.png", "shots/*.jpg").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Directory frames are written into.  With several inputs, each gets a
    /// sub-directory named after its file stem.
    #[arg(short, long, default_value = "photodust_out", value_name = "DIR")]
    pub output_dir: PathBuf,

    /// Number of frames to render.
    #[arg(short = 'n', long, default_value_t = 60)]
    pub frames: u32,

    /// Animation frames per second (sets the time step).
    #[arg(long, default_value_t = 30.0)]
    pub fps: f32,

    /// Output size in pixels, WIDTHxHEIGHT.
    #[arg(long, default_value = "960x540", value_parser = parse_resolution, value_name = "WxH")]
    pub resolution: (u32, u32),

    /// Base point size.
    #[arg(long, default_value_t = 1.8)]
    pub size: f32,

    /// Push along the surface normal.
    #[arg(long, default_value_t = 0.2)]
    pub dispersion: f32,

    /// Paraboloid bend of the field.
    #[arg(long, default_value_t = 0.5)]
    pub curvature: f32,

    /// Noise-driven breathing amplitude.
    #[arg(long, default_value_t = 1.0)]
    pub roughness: f32,

    /// Constant audio level in [0, 1].
    #[arg(long, default_value_t = 0.0)]
    pub audio: f32,

    /// Drive the audio level with a synthetic beat at this tempo instead.
    #[arg(long, value_name = "BPM")]
    pub pulse: Option<f32>,

    /// Pointer position on the field plane, "X,Y" in world units.  Omit for
    /// no pointer.
    #[arg(long, value_parser = parse_pointer, allow_hyphen_values = true, value_name = "X,Y")]
    pub pointer: Option<[f32; 2]>,

    /// Columns in the particle grid.
    #[arg(long, default_value_t = 180)]
    pub grid_width: u32,

    /// Seed for depth jitter and size randomness.
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Camera orbit speed (1.0 = one orbit per minute, 0 = fixed camera).
    #[arg(long, default_value_t = 0.0)]
    pub orbit: f32,

    /// Also write an animated GIF of the frames (animation.gif).
    #[arg(long)]
    pub gif: bool,

    /// GPU preference: auto, integrated, discrete.
    #[arg(long, default_value = "auto")]
    pub gpu: String,

    /// Print per-file field statistics and timing.
    #[arg(short, long)]
    pub verbose: bool,
}

impl CliArgs {
    /// Returns `true` when any CLI-mode flag is present in the real process arguments.
    /// Used by `main()` to route before creating an eframe window.
    pub fn is_cli_mode() -> bool {
        std::env::args().any(|a| a == "--input" || a == "-i")
    }

    pub fn particle_config(&self) -> ParticleConfig {
        ParticleConfig {
            size: self.size,
            dispersion: self.dispersion,
            curvature: self.curvature,
            roughness: self.roughness,
        }
    }

    pub fn sampler_settings(&self) -> SamplerSettings {
        SamplerSettings {
            grid_width: self.grid_width.max(1),
            ..SamplerSettings::default()
        }
    }
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run all CLI processing and return an OS exit code.
/// `0` = all inputs rendered, `1` = pipeline failure or any input failed.
pub fn run(args: CliArgs) -> ExitCode {
    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }
    if args.frames == 0 || !(args.fps > 0.0) {
        eprintln!("error: --frames and --fps must be positive.");
        return ExitCode::FAILURE;
    }

    // A broken GPU pipeline is fatal for every input.
    let mut renderer = match ParticleRenderer::new(&args.gpu) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("error: {e}");
            log::error!("pipeline setup failed: {e}");
            return ExitCode::FAILURE;
        }
    };
    if args.verbose {
        println!("GPU: {}", renderer.adapter_name());
    }

    let total = inputs.len();
    let multi = total > 1;
    let mut any_failure = false;

    for (idx, input_path) in inputs.iter().enumerate() {
        if multi || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }
        let file_start = Instant::now();
        let dir = frame_dir(&args.output_dir, input_path, multi);

        match run_one(&mut renderer, input_path, &dir, &args) {
            Ok(written) => {
                if args.verbose || multi {
                    println!(
                        "  → {} ({} frames, {:.0}ms)",
                        dir.display(),
                        written,
                        file_start.elapsed().as_secs_f64() * 1000.0
                    );
                }
            }
            Err(e) => {
                eprintln!("  error: {}", e);
                log::error!("{}: {}", input_path.display(), e);
                any_failure = true;
            }
        }
    }

    if any_failure { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

// ============================================================================
// Per-input rendering
// ============================================================================

fn run_one(
    renderer: &mut ParticleRenderer,
    input: &Path,
    dir: &Path,
    args: &CliArgs,
) -> Result<u32, String> {
    // -- Step 1: Load ----------------------------------------------------
    let source = PhotoSource::Path(input.to_path_buf());
    let field = load_field(&source, &args.sampler_settings(), args.seed)
        .map_err(|e| format!("load failed: {}", e))?;
    if args.verbose {
        let stats = field.stats();
        let (cols, rows) = field.grid();
        println!(
            "  grid {}x{}: {} particles, {} visible",
            cols, rows, stats.total, stats.visible
        );
    }
    renderer.set_field(&field);

    std::fs::create_dir_all(dir)
        .map_err(|e| format!("could not create '{}': {}", dir.display(), e))?;

    // -- Step 2: Animate + render -----------------------------------------
    let (width, height) = args.resolution;
    let dt = 1.0 / args.fps;
    let config = args.particle_config();
    let pointer = args.pointer.unwrap_or(FAR_POINTER);
    let mut driver = AnimationDriver::with_pointer(pointer);
    let mut camera = OrbitCamera {
        auto_rotate_speed: args.orbit,
        ..OrbitCamera::default()
    };
    let mut gif = if args.gif {
        Some(GifSink::create(&dir.join("animation.gif"), args.fps).map_err(|e| e.to_string())?)
    } else {
        None
    };

    for i in 0..args.frames {
        let t = driver.elapsed();
        let audio = match args.pulse {
            Some(bpm) => pulse_level(t, bpm),
            None => args.audio,
        };
        let frame = driver.tick(dt, &FrameTargets { audio, pointer, config });
        camera.update(dt);
        let uniforms = ParticleUniforms::new(&frame, &camera, width, height, 1.0);

        let image = renderer
            .render_frame(&uniforms, width, height)
            .map_err(|e| e.to_string())?;
        write_png(&image, &frame_path(dir, i)).map_err(|e| e.to_string())?;
        if let Some(sink) = gif.as_mut() {
            sink.push(image).map_err(|e| e.to_string())?;
        }
    }

    // -- Step 3: Finish --------------------------------------------------
    if let Some(sink) = gif {
        sink.finish();
    }
    log::info!("{}: {} frames written to {}", input.display(), args.frames, dir.display());
    Ok(args.frames)
}

/// Animated GIF written frame by frame.
struct GifSink {
    path: PathBuf,
    encoder: GifEncoder<BufWriter<File>>,
    delay: Delay,
}

impl GifSink {
    fn create(path: &Path, fps: f32) -> Result<Self, RenderError> {
        let encode_err = |message: String| RenderError::Encode {
            path: path.to_path_buf(),
            message,
        };
        let file = File::create(path).map_err(|e| encode_err(e.to_string()))?;
        let mut encoder = GifEncoder::new(BufWriter::new(file));
        encoder
            .set_repeat(Repeat::Infinite)
            .map_err(|e| encode_err(e.to_string()))?;
        Ok(Self {
            path: path.to_path_buf(),
            encoder,
            delay: Delay::from_numer_denom_ms(1000, fps.round().max(1.0) as u32),
        })
    }

    fn push(&mut self, image: RgbaImage) -> Result<(), RenderError> {
        self.encoder
            .encode_frame(Frame::from_parts(image, 0, 0, self.delay))
            .map_err(|e| RenderError::Encode {
                path: self.path.clone(),
                message: e.to_string(),
            })
    }

    /// Dropping the encoder writes the trailer.
    fn finish(self) {
        log::debug!("gif written: {}", self.path.display());
    }
}

fn write_png(image: &RgbaImage, path: &Path) -> Result<(), RenderError> {
    image
        .save_with_format(path, ImageFormat::Png)
        .map_err(|e| RenderError::Encode {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

// ============================================================================
// Helpers
// ============================================================================

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
pub fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}

/// Where the frames of `input` go: the output directory itself, or a
/// sub-directory named after the input's stem when rendering several inputs.
pub fn frame_dir(output_dir: &Path, input: &Path, multi: bool) -> PathBuf {
    if !multi {
        return output_dir.to_path_buf();
    }
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "input".to_string());
    output_dir.join(stem)
}

/// `dir/frame_0007.png`
pub fn frame_path(dir: &Path, index: u32) -> PathBuf {
    dir.join(format!("frame_{index:04}.png"))
}

/// Parse `WIDTHxHEIGHT`.
fn parse_resolution(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .to_lowercase()
        .split_once('x')
        .map(|(w, h)| (w.trim().to_string(), h.trim().to_string()))
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{s}'"))?;
    let w: u32 = w.parse().map_err(|_| format!("bad width '{w}'"))?;
    let h: u32 = h.parse().map_err(|_| format!("bad height '{h}'"))?;
    if w == 0 || h == 0 {
        return Err("resolution must be non-zero".into());
    }
    Ok((w, h))
}

/// Parse `X,Y`.
fn parse_pointer(s: &str) -> Result<[f32; 2], String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected X,Y, got '{s}'"))?;
    let x: f32 = x.trim().parse().map_err(|_| format!("bad x '{x}'"))?;
    let y: f32 = y.trim().parse().map_err(|_| format!("bad y '{y}'"))?;
    if !x.is_finite() || !y.is_finite() {
        return Err("pointer must be finite".into());
    }
    Ok([x, y])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_gui_defaults() {
        let args = CliArgs::try_parse_from(["photodust", "-i", "photo.png"]).unwrap();
        assert_eq!(args.particle_config(), ParticleConfig::default());
        assert_eq!(args.sampler_settings(), SamplerSettings::default());
        assert_eq!(args.resolution, (960, 540));
        assert_eq!(args.frames, 60);
        assert!(args.pointer.is_none());
        assert!(!args.gif);
    }

    #[test]
    fn full_flag_set_parses() {
        let args = CliArgs::try_parse_from([
            "photodust", "-i", "a.png", "b.jpg", "-o", "out", "-n", "12", "--fps", "24",
            "--resolution", "640x480", "--curvature", "2", "--pulse", "128",
            "--pointer", "-1.5,2", "--grid-width", "90", "--seed", "9", "--gif",
        ])
        .unwrap();
        assert_eq!(args.input, vec!["a.png", "b.jpg"]);
        assert_eq!(args.output_dir, PathBuf::from("out"));
        assert_eq!(args.frames, 12);
        assert_eq!(args.resolution, (640, 480));
        assert_eq!(args.particle_config().curvature, 2.0);
        assert_eq!(args.pulse, Some(128.0));
        assert_eq!(args.pointer, Some([-1.5, 2.0]));
        assert_eq!(args.sampler_settings().grid_width, 90);
        assert_eq!(args.seed, 9);
        assert!(args.gif);
    }

    #[test]
    fn input_is_required() {
        assert!(CliArgs::try_parse_from(["photodust"]).is_err());
    }

    #[test]
    fn resolution_parsing() {
        assert_eq!(parse_resolution("1920x1080"), Ok((1920, 1080)));
        assert_eq!(parse_resolution("800X600"), Ok((800, 600)));
        assert!(parse_resolution("0x10").is_err());
        assert!(parse_resolution("wide").is_err());
    }

    #[test]
    fn pointer_parsing() {
        assert_eq!(parse_pointer("0.5, -2"), Ok([0.5, -2.0]));
        assert!(parse_pointer("1;2").is_err());
        assert!(parse_pointer("inf,0").is_err());
    }

    #[test]
    fn frames_are_numbered_with_four_digits() {
        assert_eq!(frame_path(Path::new("out"), 7), PathBuf::from("out/frame_0007.png"));
    }

    #[test]
    fn several_inputs_get_their_own_directories() {
        let out = Path::new("out");
        assert_eq!(frame_dir(out, Path::new("x/cat.jpg"), false), PathBuf::from("out"));
        assert_eq!(frame_dir(out, Path::new("x/cat.jpg"), true), PathBuf::from("out/cat"));
    }

    #[test]
    fn missing_literal_path_matches_nothing() {
        assert!(resolve_inputs(&["/definitely/not/here.png".to_string()]).is_empty());
    }
}
