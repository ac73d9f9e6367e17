// ============================================================================
// PHOTODUST APP — eframe front end: controls, photo loading, live view
// ============================================================================

use std::sync::Arc;

use eframe::egui;
use egui::{Color32, ColorImage, Pos2, Rect, Sense, TextureHandle, TextureOptions};
use glam::{Mat4, Vec2};

use crate::audio::{AudioLevel, pulse_level};
use crate::camera::OrbitCamera;
use crate::config::{CURVATURE_RANGE, DISPERSION_RANGE, ROUGHNESS_RANGE, SIZE_RANGE};
use crate::driver::{AnimationDriver, FAR_POINTER, FrameTargets};
use crate::error::PipelineError;
use crate::field::FieldStats;
use crate::gpu::{ParticleRenderer, ParticleUniforms};
use crate::loader::{FieldLoader, LoadOutcome, PhotoSource};
use crate::sampler::SamplerSettings;
use crate::settings::{AppSettings, MAX_GRID_WIDTH};

/// File extensions the decoder is built with.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp", "tga", "gif"];

const BACKGROUND: Color32 = Color32::from_rgb(5, 5, 5);
/// Radians of orbit per dragged point.
const ORBIT_SENSITIVITY: f32 = 0.01;
/// Zoom factor per scrolled point.
const ZOOM_SENSITIVITY: f32 = 0.0015;
/// Frame-time ceiling so a stalled frame doesn't jump the animation.
const MAX_DT: f32 = 0.1;

pub fn is_supported(path: &std::path::Path) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

// ============================================================================
// SCENE STATE
// ============================================================================

/// What the particle view currently shows.
#[derive(Clone, Debug, PartialEq)]
pub struct ShownField {
    pub label: String,
    pub grid: (u32, u32),
    pub stats: FieldStats,
}

/// Lifecycle of the view.  A load in flight or a failed load never takes
/// the current field off screen.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum SceneState {
    #[default]
    Empty,
    Loading {
        label: String,
        current: Option<ShownField>,
    },
    Showing(ShownField),
    Failed {
        error: String,
        current: Option<ShownField>,
    },
}

impl SceneState {
    /// The field on screen, if any.
    pub fn current(&self) -> Option<&ShownField> {
        match self {
            SceneState::Empty => None,
            SceneState::Showing(shown) => Some(shown),
            SceneState::Loading { current, .. } | SceneState::Failed { current, .. } => {
                current.as_ref()
            }
        }
    }

    fn into_current(self) -> Option<ShownField> {
        match self {
            SceneState::Empty => None,
            SceneState::Showing(shown) => Some(shown),
            SceneState::Loading { current, .. } | SceneState::Failed { current, .. } => current,
        }
    }

    pub fn begin_load(self, label: String) -> Self {
        SceneState::Loading {
            label,
            current: self.into_current(),
        }
    }

    pub fn loaded(self, shown: ShownField) -> Self {
        SceneState::Showing(shown)
    }

    pub fn failed(self, error: String) -> Self {
        SceneState::Failed {
            error,
            current: self.into_current(),
        }
    }

    pub fn status_line(&self) -> String {
        let showing = |s: &ShownField| {
            format!(
                "{}: {}x{} grid, {} particles ({} visible)",
                s.label, s.grid.0, s.grid.1, s.stats.total, s.stats.visible
            )
        };
        match self {
            SceneState::Empty => "Open a photo or drop one onto the window.".to_string(),
            SceneState::Loading { label, .. } => format!("Loading {label}…"),
            SceneState::Showing(s) => showing(s),
            SceneState::Failed { error, current } => match current {
                Some(s) => format!("Load failed: {error}  (still showing {})", s.label),
                None => format!("Load failed: {error}"),
            },
        }
    }
}

// ============================================================================
// APP
// ============================================================================

pub struct PhotoDustApp {
    settings: AppSettings,
    saved_settings: AppSettings,
    renderer: Result<ParticleRenderer, PipelineError>,
    loader: FieldLoader,
    scene: SceneState,
    last_source: Option<PhotoSource>,
    driver: AnimationDriver,
    camera: OrbitCamera,
    audio: AudioLevel,
    /// Where the pointer last was on the field plane; `None` until the
    /// first hover.
    pointer_target: Option<[f32; 2]>,
    /// Model matrix of the previous frame, for pointer unprojection.
    model: Mat4,
    frame_texture: Option<TextureHandle>,
    render_error_logged: bool,
}

impl PhotoDustApp {
    pub fn new(_cc: &eframe::CreationContext<'_>) -> Self {
        let settings = AppSettings::load();
        let renderer = ParticleRenderer::new(&settings.preferred_gpu);
        match &renderer {
            Ok(r) => log::info!("particle renderer ready on {}", r.adapter_name()),
            Err(e) => log::error!("particle renderer unavailable: {e}"),
        }
        Self {
            saved_settings: settings.clone(),
            audio: AudioLevel::new(settings.audio_level),
            settings,
            renderer,
            loader: FieldLoader::new(),
            scene: SceneState::Empty,
            last_source: None,
            driver: AnimationDriver::new(),
            camera: OrbitCamera::default(),
            pointer_target: None,
            model: Mat4::IDENTITY,
            frame_texture: None,
            render_error_logged: false,
        }
    }

    fn request_load(&mut self, source: PhotoSource) {
        let sampler = SamplerSettings {
            grid_width: self.settings.grid_width,
            ..SamplerSettings::default()
        };
        let scene = std::mem::take(&mut self.scene);
        self.scene = scene.begin_load(source.label());
        self.loader.request(source.clone(), sampler, fastrand::u64(..));
        self.last_source = Some(source);
    }

    fn open_dialog(&mut self) {
        let mut dialog = rfd::FileDialog::new().add_filter("Image", SUPPORTED_EXTENSIONS);
        if let Some(dir) = &self.settings.last_dir {
            dialog = dialog.set_directory(dir);
        }
        if let Some(path) = dialog.pick_file() {
            self.settings.last_dir = path.parent().map(|p| p.to_path_buf());
            self.request_load(PhotoSource::Path(path));
        }
    }

    fn handle_dropped_files(&mut self, ctx: &egui::Context) {
        let dropped: Vec<egui::DroppedFile> = ctx.input(|i| i.raw.dropped_files.clone());
        // Only the last supported file matters; earlier ones would be superseded.
        let source = dropped.into_iter().rev().find_map(|file| {
            if let Some(path) = file.path {
                return is_supported(&path).then_some(PhotoSource::Path(path));
            }
            file.bytes.map(|data: Arc<[u8]>| PhotoSource::Bytes {
                name: file.name,
                data,
            })
        });
        if let Some(source) = source {
            self.request_load(source);
        }
    }

    fn poll_loader(&mut self) {
        let Some(outcome) = self.loader.poll() else { return };
        let scene = std::mem::take(&mut self.scene);
        self.scene = match outcome {
            LoadOutcome::Ready { source, field, .. } => {
                if let Ok(renderer) = &mut self.renderer {
                    renderer.set_field(&field);
                }
                let stats = field.stats();
                log::info!(
                    "showing {}: {} particles, {} visible",
                    source.label(),
                    stats.total,
                    stats.visible
                );
                scene.loaded(ShownField {
                    label: source.label(),
                    grid: field.grid(),
                    stats,
                })
            }
            LoadOutcome::Failed { source, error, .. } => {
                log::warn!("could not load {}: {error}", source.label());
                scene.failed(error.to_string())
            }
        };
    }

    fn current_audio(&self) -> f32 {
        if self.settings.pulse_enabled {
            pulse_level(self.driver.elapsed(), self.settings.pulse_bpm)
        } else {
            self.settings.audio_level
        }
    }

    // ========================================================================
    // PANELS
    // ========================================================================

    fn controls_panel(&mut self, ctx: &egui::Context) {
        egui::SidePanel::left("controls")
            .resizable(false)
            .default_width(240.0)
            .show(ctx, |ui| {
                ui.heading("PhotoDust");
                ui.add_space(6.0);

                ui.horizontal(|ui| {
                    if ui.button("Open photo…").clicked() {
                        self.open_dialog();
                    }
                    let can_reload = self.last_source.is_some();
                    if ui.add_enabled(can_reload, egui::Button::new("Resample")).clicked()
                        && let Some(source) = self.last_source.clone()
                    {
                        self.request_load(source);
                    }
                });

                ui.separator();
                ui.label("Particles");
                let p = &mut self.settings.particles;
                ui.add(egui::Slider::new(&mut p.size, SIZE_RANGE).text("Size"));
                ui.add(egui::Slider::new(&mut p.dispersion, DISPERSION_RANGE).text("Dispersion"));
                ui.add(egui::Slider::new(&mut p.curvature, CURVATURE_RANGE).text("Curvature"));
                ui.add(egui::Slider::new(&mut p.roughness, ROUGHNESS_RANGE).text("Roughness"));
                if ui.small_button("Reset").clicked() {
                    *p = Default::default();
                }

                ui.separator();
                ui.label("Audio");
                ui.checkbox(&mut self.settings.pulse_enabled, "Synthetic beat");
                if self.settings.pulse_enabled {
                    ui.add(
                        egui::Slider::new(&mut self.settings.pulse_bpm, 40.0..=200.0).text("BPM"),
                    );
                } else {
                    ui.add(egui::Slider::new(&mut self.settings.audio_level, 0.0..=1.0).text("Level"));
                }
                let level = self.driver.smoothed_audio();
                ui.add(egui::ProgressBar::new(level.clamp(0.0, 1.0)).desired_width(180.0));

                ui.separator();
                ui.label("Camera");
                ui.checkbox(&mut self.settings.auto_rotate, "Auto-rotate");
                ui.add_enabled(
                    self.settings.auto_rotate,
                    egui::Slider::new(&mut self.settings.auto_rotate_speed, 0.0..=4.0).text("Speed"),
                );
                if ui.small_button("Reset view").clicked() {
                    self.camera = OrbitCamera::default();
                }

                ui.separator();
                ui.label("Sampling");
                ui.add(
                    egui::Slider::new(&mut self.settings.grid_width, 16..=MAX_GRID_WIDTH)
                        .text("Grid width"),
                );
                ui.small("Applies to the next photo or Resample.");
            });
    }

    fn status_bar(&self, ctx: &egui::Context) {
        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label(self.scene.status_line());
                if let Ok(renderer) = &self.renderer {
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        ui.weak(renderer.adapter_name());
                    });
                }
            });
        });
    }

    fn viewport(&mut self, ctx: &egui::Context, dt: f32) {
        egui::CentralPanel::default()
            .frame(egui::Frame::none().fill(BACKGROUND))
            .show(ctx, |ui| {
                if let Err(e) = &self.renderer {
                    ui.centered_and_justified(|ui| {
                        ui.colored_label(Color32::LIGHT_RED, format!("GPU unavailable: {e}"));
                    });
                    return;
                }

                let (rect, response) = ui.allocate_exact_size(ui.available_size(), Sense::click_and_drag());
                let ppp = ctx.pixels_per_point();
                let width = (rect.width() * ppp).round().max(1.0) as u32;
                let height = (rect.height() * ppp).round().max(1.0) as u32;
                let aspect = rect.width().max(1.0) / rect.height().max(1.0);

                // -- camera + pointer -------------------------------------
                if response.dragged() {
                    let d = response.drag_delta();
                    self.camera.orbit(-d.x * ORBIT_SENSITIVITY, d.y * ORBIT_SENSITIVITY);
                }
                if response.hovered() {
                    let scroll = ui.input(|i| i.scroll_delta.y);
                    if scroll != 0.0 {
                        self.camera.zoom((-scroll * ZOOM_SENSITIVITY).exp());
                    }
                }
                if let Some(pos) = response.hover_pos() {
                    let ndc = pointer_ndc(rect, pos);
                    let target = self.camera.pointer_on_field(ndc, aspect, self.model).to_array();
                    if self.pointer_target.is_none() {
                        // First hover: start the glow under the cursor.
                        self.driver.snap_pointer(target);
                    }
                    self.pointer_target = Some(target);
                }
                self.camera.auto_rotate_speed = if self.settings.auto_rotate && !response.dragged() {
                    self.settings.auto_rotate_speed
                } else {
                    0.0
                };
                self.camera.update(dt);

                // -- animate -----------------------------------------------
                self.audio.store(self.current_audio());
                let frame = self.driver.tick(
                    dt,
                    &FrameTargets {
                        audio: self.audio.latest(),
                        pointer: self.pointer_target.unwrap_or(FAR_POINTER),
                        config: self.settings.particles,
                    },
                );
                self.model = frame.model_matrix();
                let uniforms = ParticleUniforms::new(&frame, &self.camera, width, height, ppp);

                // -- render (async readback: shows the previous frame) --------
                if let Ok(renderer) = &mut self.renderer {
                    if let Some(image) = renderer.try_take_frame() {
                        let size = [image.width() as usize, image.height() as usize];
                        let color = ColorImage::from_rgba_unmultiplied(size, image.as_raw());
                        match &mut self.frame_texture {
                            Some(tex) => tex.set(color, TextureOptions::LINEAR),
                            None => {
                                self.frame_texture =
                                    Some(ctx.load_texture("particle_frame", color, TextureOptions::LINEAR));
                            }
                        }
                    }
                    match renderer.submit_frame_async(&uniforms, width, height) {
                        Ok(_) => self.render_error_logged = false,
                        Err(e) => {
                            if !self.render_error_logged {
                                log::error!("frame render failed: {e}");
                                self.render_error_logged = true;
                            }
                        }
                    }
                }

                if let Some(tex) = &self.frame_texture {
                    let uv = Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0));
                    ui.painter().image(tex.id(), rect, uv, Color32::WHITE);
                }
            });
    }
}

/// Pointer position in `rect` as normalized device coordinates (y up).
pub fn pointer_ndc(rect: Rect, pos: Pos2) -> Vec2 {
    let x = (pos.x - rect.left()) / rect.width().max(1.0) * 2.0 - 1.0;
    let y = 1.0 - (pos.y - rect.top()) / rect.height().max(1.0) * 2.0;
    Vec2::new(x, y)
}

impl eframe::App for PhotoDustApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let dt = ctx.input(|i| i.stable_dt).clamp(0.0, MAX_DT);

        self.handle_dropped_files(ctx);
        self.poll_loader();

        self.controls_panel(ctx);
        self.status_bar(ctx);
        self.viewport(ctx, dt);

        // Persist once sliders are released, and on close.
        let closing = ctx.input(|i| i.viewport().close_requested());
        let idle = !ctx.input(|i| i.pointer.any_down());
        if self.settings != self.saved_settings && (idle || closing) {
            self.settings.save();
            self.saved_settings = self.settings.clone();
        }

        ctx.request_repaint();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shown(label: &str) -> ShownField {
        ShownField {
            label: label.to_string(),
            grid: (4, 3),
            stats: FieldStats {
                total: 12,
                visible: 10,
                centroid: [0.0; 3],
                max_radius: 1.0,
            },
        }
    }

    #[test]
    fn failed_load_keeps_the_current_field() {
        let scene = SceneState::Showing(shown("cat.png"))
            .begin_load("dog.png".into())
            .failed("could not decode image".into());
        assert_eq!(scene.current().map(|s| s.label.as_str()), Some("cat.png"));
        assert!(scene.status_line().contains("still showing cat.png"));
    }

    #[test]
    fn loading_from_empty_shows_nothing_yet() {
        let scene = SceneState::Empty.begin_load("a.png".into());
        assert!(scene.current().is_none());
        assert_eq!(scene.status_line(), "Loading a.png…");
    }

    #[test]
    fn successful_load_replaces_the_field() {
        let scene = SceneState::Showing(shown("old.png"))
            .begin_load("new.png".into())
            .loaded(shown("new.png"));
        assert_eq!(scene, SceneState::Showing(shown("new.png")));
        assert!(scene.status_line().contains("12 particles (10 visible)"));
    }

    #[test]
    fn pointer_ndc_corners() {
        let rect = Rect::from_min_max(Pos2::new(100.0, 50.0), Pos2::new(300.0, 150.0));
        assert_eq!(pointer_ndc(rect, Pos2::new(200.0, 100.0)), Vec2::ZERO);
        assert_eq!(pointer_ndc(rect, Pos2::new(100.0, 50.0)), Vec2::new(-1.0, 1.0));
        assert_eq!(pointer_ndc(rect, Pos2::new(300.0, 150.0)), Vec2::new(1.0, -1.0));
    }

    #[test]
    fn only_decodable_extensions_are_accepted() {
        assert!(is_supported(std::path::Path::new("a/b/photo.JPG")));
        assert!(is_supported(std::path::Path::new("x.webp")));
        assert!(!is_supported(std::path::Path::new("notes.txt")));
        assert!(!is_supported(std::path::Path::new("noext")));
    }
}
