// ============================================================================
// PARTICLE FIELD — per-particle attributes for one photo, ready for upload
// ============================================================================
//
// One `ParticleInstance` per grid cell, in row-major order.  Storing whole
// records in a single Vec means every attribute always has the same length;
// the GPU reads the Vec as one instance-rate vertex buffer.
// ============================================================================

use bytemuck::{Pod, Zeroable};

/// Rest position given to transparent pixels: far behind the camera, so the
/// particle is never seen.  Kept in the buffer so the layout stays fixed.
pub const SENTINEL_POSITION: [f32; 3] = [0.0, 0.0, 5000.0];

/// Attributes of a single particle.  Layout matches the vertex buffer
/// declared in `gpu::particles::ParticlePipeline`.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct ParticleInstance {
    /// Undeformed world-space position.
    pub rest_position: [f32; 3],
    /// Position normalized to `[-0.5, 0.5]` on both axes.
    pub uv: [f32; 2],
    /// Linear RGB in `[0, 1]`.
    pub color: [f32; 3],
    /// Uniform in `[0, 1)`, scales the point size.
    pub size_random: f32,
}

impl ParticleInstance {
    /// A transparent-pixel placeholder.
    pub const CULLED: Self = Self {
        rest_position: SENTINEL_POSITION,
        uv: [0.0, 0.0],
        color: [0.0, 0.0, 0.0],
        size_random: 0.0,
    };

    pub fn is_culled(&self) -> bool {
        self.rest_position == SENTINEL_POSITION
    }
}

/// Summary of the visible (non-sentinel) particles.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FieldStats {
    pub total: usize,
    pub visible: usize,
    /// Mean rest position of visible particles, `[0; 3]` when none are visible.
    pub centroid: [f32; 3],
    /// Largest XY distance of a visible particle from the origin.
    pub max_radius: f32,
}

/// The immutable particle set built from one photo.
#[derive(Clone, Debug)]
pub struct ParticleField {
    particles: Vec<ParticleInstance>,
    columns: u32,
    rows: u32,
}

impl ParticleField {
    /// Build from a full grid of particles in row-major order.
    ///
    /// Returns `None` if `particles.len() != columns * rows`.
    pub fn from_grid(particles: Vec<ParticleInstance>, columns: u32, rows: u32) -> Option<Self> {
        if particles.len() != columns as usize * rows as usize {
            return None;
        }
        Some(Self { particles, columns, rows })
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    /// Grid dimensions `(columns, rows)`.
    pub fn grid(&self) -> (u32, u32) {
        (self.columns, self.rows)
    }

    pub fn particles(&self) -> &[ParticleInstance] {
        &self.particles
    }

    /// Particle at grid cell `(col, row)`.
    pub fn at(&self, col: u32, row: u32) -> Option<&ParticleInstance> {
        if col >= self.columns || row >= self.rows {
            return None;
        }
        self.particles.get((row * self.columns + col) as usize)
    }

    pub fn visible(&self) -> impl Iterator<Item = &ParticleInstance> {
        self.particles.iter().filter(|p| !p.is_culled())
    }

    /// Raw bytes for `queue.write_buffer` / `create_buffer_init`.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.particles)
    }

    pub fn stats(&self) -> FieldStats {
        let mut visible = 0usize;
        let mut sum = [0.0f64; 3];
        let mut max_radius = 0.0f32;
        for p in self.visible() {
            visible += 1;
            for (acc, v) in sum.iter_mut().zip(p.rest_position.iter()) {
                *acc += *v as f64;
            }
            let [x, y, _] = p.rest_position;
            max_radius = max_radius.max((x * x + y * y).sqrt());
        }
        let centroid = if visible == 0 {
            [0.0; 3]
        } else {
            let n = visible as f64;
            [(sum[0] / n) as f32, (sum[1] / n) as f32, (sum[2] / n) as f32]
        };
        FieldStats {
            total: self.particles.len(),
            visible,
            centroid,
            max_radius,
        }
    }
}
