// ============================================================================
// PARTICLE CONFIG — the four user-tunable shader scalars
// ============================================================================

use std::ops::RangeInclusive;

pub const SIZE_RANGE: RangeInclusive<f32> = 0.5..=5.0;
pub const DISPERSION_RANGE: RangeInclusive<f32> = 0.0..=2.0;
pub const CURVATURE_RANGE: RangeInclusive<f32> = 0.0..=3.0;
pub const ROUGHNESS_RANGE: RangeInclusive<f32> = 0.1..=4.0;

/// Look of the particle cloud, read by the shader every frame.
///
/// The engine copies these values verbatim into the frame uniforms.  Values
/// outside the documented ranges are passed through untouched and simply
/// produce an out-of-range look; use [`ParticleConfig::clamped`] at the UI
/// boundary if that is not wanted.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParticleConfig {
    /// Base point size, `0.5..=5`.
    pub size: f32,
    /// Push along the surface normal, `0..=2`.
    pub dispersion: f32,
    /// Paraboloid bend of the whole field, `0..=3`.
    pub curvature: f32,
    /// Noise-driven out-of-plane breathing, `0.1..=4`.
    pub roughness: f32,
}

impl Default for ParticleConfig {
    fn default() -> Self {
        Self {
            size: 1.8,
            dispersion: 0.2,
            curvature: 0.5,
            roughness: 1.0,
        }
    }
}

impl ParticleConfig {
    /// Copy of `self` with every field clamped into its documented range.
    pub fn clamped(&self) -> Self {
        Self {
            size: clamp_to(self.size, &SIZE_RANGE),
            dispersion: clamp_to(self.dispersion, &DISPERSION_RANGE),
            curvature: clamp_to(self.curvature, &CURVATURE_RANGE),
            roughness: clamp_to(self.roughness, &ROUGHNESS_RANGE),
        }
    }

    /// True when every field is inside its documented range.
    pub fn in_range(&self) -> bool {
        SIZE_RANGE.contains(&self.size)
            && DISPERSION_RANGE.contains(&self.dispersion)
            && CURVATURE_RANGE.contains(&self.curvature)
            && ROUGHNESS_RANGE.contains(&self.roughness)
    }
}

fn clamp_to(v: f32, range: &RangeInclusive<f32>) -> f32 {
    // NaN collapses to the lower bound
    if v.is_nan() {
        return *range.start();
    }
    v.clamp(*range.start(), *range.end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_in_range() {
        assert!(ParticleConfig::default().in_range());
    }

    #[test]
    fn clamped_pulls_each_field_into_range() {
        let wild = ParticleConfig {
            size: 40.0,
            dispersion: -1.0,
            curvature: f32::NAN,
            roughness: 0.0,
        };
        let c = wild.clamped();
        assert_eq!(c.size, 5.0);
        assert_eq!(c.dispersion, 0.0);
        assert_eq!(c.curvature, 0.0);
        assert_eq!(c.roughness, 0.1);
        assert!(c.in_range());
        assert!(!wild.in_range());
    }
}
