// ============================================================================
// IMAGE SAMPLER — photo -> fixed-width grid -> particle field
// ============================================================================

use std::path::Path;

use image::RgbaImage;
use image::imageops::{self, FilterType};

use crate::error::LoadError;
use crate::field::{ParticleField, ParticleInstance};

/// How a photo is turned into a grid of particles.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SamplerSettings {
    /// Columns in the particle grid; rows follow the photo's aspect ratio.
    pub grid_width: u32,
    /// World-space width of the field.  Height scales with the aspect ratio.
    pub world_width: f32,
    /// Pixels with alpha below this become sentinel particles.
    pub alpha_cutoff: f32,
    /// Total spread of the random z jitter, centred on 0.
    pub depth_jitter: f32,
    /// Largest grid accepted.  Extreme aspect ratios past this are refused
    /// before anything is resized or allocated.
    pub max_cells: u64,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            grid_width: 180,
            world_width: 12.0,
            alpha_cutoff: 0.1,
            depth_jitter: 0.5,
            max_cells: MAX_CELLS,
        }
    }
}

/// Default cell cap: a 1024-wide square grid.
pub const MAX_CELLS: u64 = 1024 * 1024;

/// Grid dimensions for a `width x height` photo: `(grid_width, round(h/w * grid_width))`,
/// with at least one row.
pub fn grid_size(width: u32, height: u32, grid_width: u32) -> (u32, u32) {
    let columns = grid_width.max(1);
    let rows = (height as f64 / width.max(1) as f64 * columns as f64).round() as u32;
    (columns, rows.max(1))
}

/// Read and decode an image file.
pub fn decode_path(path: &Path) -> Result<RgbaImage, LoadError> {
    let bytes = std::fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    decode_bytes(&bytes)
}

/// Decode an in-memory image (format sniffed from the bytes).
pub fn decode_bytes(bytes: &[u8]) -> Result<RgbaImage, LoadError> {
    Ok(image::load_from_memory(bytes)?.to_rgba8())
}

/// Build the particle field for a decoded photo.
///
/// One particle per grid cell.  Cells whose alpha is below the cutoff get the
/// sentinel rest position so the buffer size depends only on the grid.
pub fn sample_image(
    img: &RgbaImage,
    settings: &SamplerSettings,
    rng: &mut fastrand::Rng,
) -> Result<ParticleField, LoadError> {
    let (src_w, src_h) = img.dimensions();
    if src_w == 0 || src_h == 0 {
        return Err(LoadError::EmptyImage {
            width: src_w,
            height: src_h,
        });
    }

    let (columns, rows) = grid_size(src_w, src_h, settings.grid_width);
    let cells = columns as u64 * rows as u64;
    if cells > settings.max_cells {
        return Err(LoadError::GridTooLarge {
            columns,
            rows,
            max_cells: settings.max_cells,
        });
    }
    let resized;
    let grid: &RgbaImage = if (src_w, src_h) == (columns, rows) {
        img
    } else {
        resized = imageops::resize(img, columns, rows, FilterType::Triangle);
        &resized
    };

    let world_w = settings.world_width;
    let world_h = world_w * rows as f32 / columns as f32;

    let mut particles = Vec::with_capacity(columns as usize * rows as usize);
    for (col, row, px) in grid.enumerate_pixels() {
        let [r, g, b, a] = px.0;
        let alpha = a as f32 / 255.0;
        if alpha < settings.alpha_cutoff {
            particles.push(ParticleInstance::CULLED);
            continue;
        }

        let x = col as f32 / columns as f32 - 0.5;
        let y = 0.5 - row as f32 / rows as f32;
        let jitter = (rng.f32() - 0.5) * settings.depth_jitter;

        particles.push(ParticleInstance {
            rest_position: [x * world_w, y * world_h, jitter],
            uv: [x, y],
            color: [r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0],
            size_random: rng.f32(),
        });
    }

    // enumerate_pixels walks row-major over exactly columns * rows cells.
    ParticleField::from_grid(particles, columns, rows).ok_or(LoadError::EmptyImage {
        width: columns,
        height: rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::SENTINEL_POSITION;
    use image::Rgba;

    fn rng() -> fastrand::Rng {
        fastrand::Rng::with_seed(7)
    }

    #[test]
    fn grid_follows_aspect_ratio() {
        assert_eq!(grid_size(100, 100, 180), (180, 180));
        assert_eq!(grid_size(400, 300, 180), (180, 135));
        assert_eq!(grid_size(1920, 1080, 180), (180, 101));
        assert_eq!(grid_size(5000, 10, 180), (180, 1));
    }

    #[test]
    fn opaque_image_fills_every_cell() {
        let img = RgbaImage::from_pixel(64, 48, Rgba([10, 200, 30, 255]));
        let field = sample_image(&img, &SamplerSettings::default(), &mut rng()).unwrap();
        assert_eq!(field.len(), 180 * 135);
        assert_eq!(field.stats().visible, field.len());
    }

    #[test]
    fn uv_and_positions_stay_in_bounds() {
        let img = RgbaImage::from_pixel(30, 60, Rgba([255, 255, 255, 255]));
        let settings = SamplerSettings {
            grid_width: 20,
            ..SamplerSettings::default()
        };
        let field = sample_image(&img, &settings, &mut rng()).unwrap();
        assert_eq!(field.grid(), (20, 40));
        for p in field.particles() {
            assert!((-0.5..=0.5).contains(&p.uv[0]));
            assert!((-0.5..=0.5).contains(&p.uv[1]));
            assert!(p.rest_position[0].abs() <= 6.0);
            assert!(p.rest_position[1].abs() <= 12.0);
            assert!(p.rest_position[2].abs() <= 0.25);
            assert!((0.0..1.0).contains(&p.size_random));
        }
        // Top-left cell maps to (-0.5, +0.5).
        let tl = field.at(0, 0).unwrap();
        assert_eq!(tl.uv, [-0.5, 0.5]);
        assert_eq!(&tl.rest_position[..2], &[-6.0, 12.0]);
    }

    #[test]
    fn transparent_pixels_become_sentinels() {
        let mut img = RgbaImage::from_pixel(8, 8, Rgba([255, 255, 255, 255]));
        img.put_pixel(3, 5, Rgba([255, 0, 0, 0]));
        img.put_pixel(6, 1, Rgba([0, 255, 0, 20]));
        let settings = SamplerSettings {
            grid_width: 8,
            ..SamplerSettings::default()
        };
        let field = sample_image(&img, &settings, &mut rng()).unwrap();
        assert_eq!(field.at(3, 5).unwrap().rest_position, SENTINEL_POSITION);
        assert_eq!(field.at(6, 1).unwrap().rest_position, SENTINEL_POSITION);
        assert_eq!(field.at(3, 5).unwrap().color, [0.0; 3]);
        assert_eq!(field.stats().visible, 62);
    }

    #[test]
    fn same_seed_same_field() {
        let img = RgbaImage::from_pixel(16, 16, Rgba([90, 90, 90, 255]));
        let settings = SamplerSettings {
            grid_width: 16,
            ..SamplerSettings::default()
        };
        let a = sample_image(&img, &settings, &mut rng()).unwrap();
        let b = sample_image(&img, &settings, &mut rng()).unwrap();
        assert_eq!(a.particles(), b.particles());
    }

    #[test]
    fn zero_sized_image_is_an_error() {
        let img = RgbaImage::new(0, 10);
        assert!(matches!(
            sample_image(&img, &SamplerSettings::default(), &mut rng()),
            Err(LoadError::EmptyImage { .. })
        ));
    }

    #[test]
    fn tall_sliver_is_refused_before_allocating() {
        let img = RgbaImage::from_pixel(1, 100_000, Rgba([255, 255, 255, 255]));
        assert_eq!(grid_size(1, 100_000, 180), (180, 18_000_000));
        match sample_image(&img, &SamplerSettings::default(), &mut rng()) {
            Err(LoadError::GridTooLarge { columns, rows, max_cells }) => {
                assert_eq!((columns, rows), (180, 18_000_000));
                assert_eq!(max_cells, MAX_CELLS);
            }
            other => panic!("expected GridTooLarge, got {other:?}"),
        }
    }

    #[test]
    fn cell_cap_is_inclusive() {
        let img = RgbaImage::from_pixel(8, 4, Rgba([1, 2, 3, 255]));
        let settings = SamplerSettings {
            grid_width: 8,
            max_cells: 32,
            ..SamplerSettings::default()
        };
        assert_eq!(sample_image(&img, &settings, &mut rng()).unwrap().len(), 32);
        let tighter = SamplerSettings { max_cells: 31, ..settings };
        assert!(matches!(
            sample_image(&img, &tighter, &mut rng()),
            Err(LoadError::GridTooLarge { .. })
        ));
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        assert!(matches!(decode_bytes(b"definitely not a png"), Err(LoadError::Decode(_))));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = decode_path(Path::new("/nonexistent/photo.png")).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }
}
