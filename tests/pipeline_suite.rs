use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};

use photodust::camera::OrbitCamera;
use photodust::deform::{self, FrameInputs, GLOW_BRIGHTEN, GLOW_COLOR, GLOW_MIX};
use photodust::driver::{AnimationDriver, FrameTargets};
use photodust::field::SENTINEL_POSITION;
use photodust::gpu::{ParticleRenderer, ParticleUniforms};
use photodust::loader::{FieldLoader, LoadOutcome, PhotoSource, load_field};
use photodust::sampler::SamplerSettings;
use photodust::{ParticleConfig, ParticleField, ParticleInstance};

fn png_source(name: &str, img: &RgbaImage) -> PhotoSource {
    let mut bytes = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(img.clone())
        .write_to(&mut bytes, ImageFormat::Png)
        .expect("png encode should succeed");
    PhotoSource::Bytes {
        name: name.to_string(),
        data: Arc::from(bytes.into_inner()),
    }
}

fn still_config() -> ParticleConfig {
    ParticleConfig {
        size: 1.8,
        dispersion: 0.0,
        curvature: 0.0,
        roughness: 0.0,
    }
}

#[test]
fn uniform_red_square_fills_a_square_grid() {
    let img = RgbaImage::from_pixel(100, 100, Rgba([255, 0, 0, 255]));
    let field = load_field(&png_source("red.png", &img), &SamplerSettings::default(), 1)
        .expect("red square should load");

    assert_eq!(field.grid(), (180, 180));
    assert_eq!(field.len(), 180 * 180);
    assert!(field.particles().iter().all(|p| p.color == [1.0, 0.0, 0.0]));
    assert_eq!(field.stats().visible, field.len());
}

#[test]
fn transparent_pixel_lands_on_the_sentinel_whatever_its_colour() {
    let mut img = RgbaImage::from_pixel(180, 90, Rgba([20, 40, 60, 255]));
    img.put_pixel(17, 33, Rgba([255, 255, 255, 0]));
    let field = load_field(&png_source("hole.png", &img), &SamplerSettings::default(), 3)
        .expect("image with a hole should load");

    let hole = field.at(17, 33).expect("cell should exist");
    assert_eq!(hole.rest_position, SENTINEL_POSITION);
    assert_eq!(field.stats().visible, field.len() - 1);
}

#[test]
fn fully_transparent_photo_is_a_valid_empty_field() {
    let img = RgbaImage::from_pixel(40, 20, Rgba([200, 10, 10, 0]));
    let field = load_field(&png_source("clear.png", &img), &SamplerSettings::default(), 9)
        .expect("transparent image is not an error");

    assert_eq!(field.grid(), (180, 90));
    assert!(field.particles().iter().all(ParticleInstance::is_culled));
    assert_eq!(field.stats().visible, 0);
}

#[test]
fn interior_particles_hold_still_with_everything_off() {
    let img = RgbaImage::from_pixel(64, 64, Rgba([90, 90, 90, 255]));
    let field = load_field(&png_source("grey.png", &img), &SamplerSettings::default(), 5)
        .expect("grey square should load");

    let mut driver = AnimationDriver::new();
    let targets = FrameTargets {
        audio: 0.0,
        pointer: photodust::driver::FAR_POINTER,
        config: still_config(),
    };
    let interior: Vec<_> = field
        .visible()
        .filter(|p| (p.uv[0] * p.uv[0] + p.uv[1] * p.uv[1]).sqrt() < deform::dissolve::SOLID_RADIUS)
        .copied()
        .collect();
    assert!(!interior.is_empty());

    for _ in 0..30 {
        let frame = driver.tick(1.0 / 30.0, &targets);
        for p in &interior {
            let out = deform::deform(p, &frame.inputs);
            assert_eq!(out.position, p.rest_position);
            assert_eq!(out.edge_alpha, 1.0);
            assert_eq!(out.influence, 0.0);
        }
    }
}

#[test]
fn pointer_parked_on_a_particle_glows_and_doubles_its_size() {
    let particle = ParticleInstance {
        rest_position: [0.3, -0.2, 0.0],
        uv: [0.025, -0.0167],
        color: [0.2, 0.4, 0.6],
        size_random: 0.5,
    };
    let config = still_config();

    // Time is held still so the distorted position stays put while the
    // smoothed pointer closes in on it.
    let t = 0.0;
    let target = deform::distorted_position([particle.rest_position[0], particle.rest_position[1]], t);
    let mut driver = AnimationDriver::new();
    let targets = FrameTargets {
        audio: 0.0,
        pointer: target,
        config,
    };
    let mut frame = driver.tick(0.0, &targets);
    let first = deform::deform(&particle, &frame.inputs).influence;
    for _ in 0..400 {
        frame = driver.tick(0.0, &targets);
    }
    let out = deform::deform(&particle, &frame.inputs);
    assert!(first < 0.01, "pointer starts far away, got {first}");
    assert!(out.influence > 0.999, "influence {}", out.influence);

    let rgba = deform::shade(particle.color, out.edge_alpha, out.influence, [0.5, 0.5])
        .expect("centre fragment is kept");
    for c in 0..3 {
        let glowed = particle.color[c] + (GLOW_COLOR[c] - particle.color[c]) * GLOW_MIX;
        assert!((rgba[c] - (glowed + GLOW_BRIGHTEN)).abs() < 1e-3);
    }

    let base = deform::point_size(config.size, particle.size_random, -20.0, 0.0);
    let lit = deform::point_size(config.size, particle.size_random, -20.0, out.influence);
    assert!((lit / base - 2.0).abs() < 1e-3);
}

#[test]
fn loader_only_delivers_the_newest_request() {
    let small = RgbaImage::from_pixel(10, 10, Rgba([0, 255, 0, 255]));
    let wide = RgbaImage::from_pixel(20, 10, Rgba([0, 0, 255, 255]));
    let settings = SamplerSettings {
        grid_width: 20,
        ..SamplerSettings::default()
    };

    let mut loader = FieldLoader::new();
    let _stale = loader.request(png_source("small.png", &small), settings, 1);
    let newest = loader.request(png_source("wide.png", &wide), settings, 2);

    match loader.wait(Duration::from_secs(30)) {
        Some(LoadOutcome::Ready { id, source, field }) => {
            assert_eq!(id, newest);
            assert_eq!(source.label(), "wide.png");
            assert_eq!(field.grid(), (20, 10));
        }
        other => panic!("expected the wide photo, got {other:?}"),
    }
    assert!(loader.pending().is_none());
    assert!(loader.poll().is_none());
}

#[test]
fn extreme_aspect_photo_fails_the_load_instead_of_the_process() {
    let sliver = RgbaImage::from_pixel(1, 100_000, Rgba([255, 255, 255, 255]));
    let mut loader = FieldLoader::new();
    let id = loader.request(png_source("sliver.png", &sliver), SamplerSettings::default(), 1);

    match loader.wait(Duration::from_secs(30)) {
        Some(LoadOutcome::Failed { id: got, error, .. }) => {
            assert_eq!(got, id);
            assert!(matches!(error, photodust::LoadError::GridTooLarge { .. }), "{error}");
        }
        other => panic!("expected a failed load, got {other:?}"),
    }
}

#[test]
fn gpu_renders_background_and_field_frames() {
    // Machines without any adapter (not even a software one) skip this.
    let Ok(mut renderer) = ParticleRenderer::new("auto") else {
        return;
    };

    let mut driver = AnimationDriver::new();
    let frame = driver.tick(
        1.0 / 30.0,
        &FrameTargets {
            audio: 0.0,
            pointer: photodust::driver::FAR_POINTER,
            config: ParticleConfig::default(),
        },
    );
    let camera = OrbitCamera::default();
    let uniforms = ParticleUniforms::new(&frame, &camera, 64, 48, 1.0);

    let empty = renderer
        .render_frame(&uniforms, 64, 48)
        .expect("empty frame should render");
    assert_eq!(empty.dimensions(), (64, 48));
    assert!(empty.pixels().all(|p| p.0 == [5, 5, 5, 255]));

    let img = RgbaImage::from_pixel(32, 32, Rgba([255, 255, 255, 255]));
    let field: ParticleField = load_field(&png_source("white.png", &img), &SamplerSettings::default(), 4)
        .expect("white square should load");
    renderer.set_field(&field);
    assert_eq!(renderer.instance_count() as usize, field.len());

    let lit = renderer
        .render_frame(&uniforms, 64, 48)
        .expect("field frame should render");
    assert_eq!(lit.dimensions(), (64, 48));
    assert!(lit.pixels().all(|p| p.0[3] == 255));
    // The field's solid centre sits in the middle of the frame.
    let [r, g, b, _] = lit.get_pixel(32, 24).0;
    assert!(r > 40 && g > 40 && b > 40, "centre pixel is background: {:?}", [r, g, b]);
    assert!(lit.pixels().filter(|p| p.0[0] > 5).count() > 64 * 48 / 10);
}

#[test]
fn frame_inputs_copy_config_untouched() {
    let wild = ParticleConfig {
        size: 50.0,
        dispersion: -1.0,
        curvature: 9.0,
        roughness: 0.0,
    };
    let mut driver = AnimationDriver::new();
    let frame = driver.tick(
        0.5,
        &FrameTargets {
            audio: 1.0,
            pointer: [0.0, 0.0],
            config: wild,
        },
    );
    let FrameInputs { config, time, .. } = frame.inputs;
    assert_eq!(config, wild);
    assert_eq!(time, 0.5);
}
