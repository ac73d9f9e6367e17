// ============================================================================
// DEFORMATION — CPU mirror of the particle vertex/fragment stages
// ============================================================================
//
// The GPU does this work every frame (see gpu/shaders.rs).  This module runs
// the exact same math for one particle at a time so the behaviour can be
// checked without an adapter: edge dissolution, breathing, curvature,
// dispersion, pointer influence, point size and the fragment colour rules.
//
// Any constant changed here must be changed in PARTICLE_SHADER too.
// ============================================================================

use crate::config::ParticleConfig;
use crate::field::ParticleInstance;
use crate::noise::{snoise, snoise2};

/// Edge-dissolution tuning.  Freely retunable as long as the band stays
/// below |uv| = 0.707 (the corner of the unit square).
pub mod dissolve {
    pub const BASE_THRESHOLD: f32 = 0.4;
    pub const COARSE_FREQ: f32 = 4.0;
    pub const COARSE_SPEED: f32 = 0.15;
    pub const COARSE_AMP: f32 = 0.15;
    pub const FINE_FREQ: f32 = 10.0;
    pub const FINE_SPEED: f32 = 0.2;
    pub const FINE_AMP: f32 = 0.05;
    /// Fade starts this far inside the threshold ...
    pub const INNER_BAND: f32 = 0.1;
    /// ... and finishes this far outside it.
    pub const OUTER_BAND: f32 = 0.05;
    /// Below this edge alpha the particle starts flying outward.
    pub const SCATTER_BELOW: f32 = 0.9;
    pub const SCATTER_DEPTH: f32 = 4.0;
    pub const SCATTER_RADIAL: f32 = 1.5;
    /// Fragments of particles fainter than this are discarded outright.
    pub const DISCARD_BELOW: f32 = 0.05;

    /// Largest |uv| that is guaranteed fully opaque at every time.
    pub const SOLID_RADIUS: f32 = BASE_THRESHOLD - COARSE_AMP - FINE_AMP - INNER_BAND;
}

pub const BASE_NOISE_FREQ: f32 = 0.4;
pub const BASE_NOISE_SPEED: f32 = 0.3;
pub const BREATH_NOISE: f32 = 0.8;
pub const BREATH_AUDIO: f32 = 8.0;
pub const CURVATURE_SCALE: f32 = 0.15;
pub const DISPERSION_SCALE: f32 = 4.0;
pub const POINTER_NOISE_FREQ: f32 = 2.0;
pub const POINTER_NOISE_OFFSET: f32 = 100.0;
pub const POINTER_DISTORTION: f32 = 1.5;
pub const POINTER_RADIUS: f32 = 3.5;
pub const POINTER_LIFT: f32 = 4.0;
pub const PERSPECTIVE_SIZE: f32 = 12.0;
pub const GLOW_COLOR: [f32; 3] = [1.0, 0.85, 0.5];
pub const GLOW_MIX: f32 = 0.6;
pub const GLOW_BRIGHTEN_ABOVE: f32 = 0.2;
pub const GLOW_BRIGHTEN: f32 = 0.15;
pub const MAX_ALPHA: f32 = 0.8;

/// Per-frame inputs the vertex stage reads (the uniform block minus matrices).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameInputs {
    pub time: f32,
    pub audio: f32,
    pub pointer: [f32; 2],
    pub config: ParticleConfig,
}

/// Result of the vertex stage for one particle, before projection.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DeformedParticle {
    /// Field-local position after all displacement.
    pub position: [f32; 3],
    pub edge_alpha: f32,
    pub influence: f32,
}

/// GLSL/WGSL `smoothstep`.
#[inline]
pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

#[inline]
fn length2(v: [f32; 2]) -> f32 {
    (v[0] * v[0] + v[1] * v[1]).sqrt()
}

/// Base organic motion driver for a rest position at time `t`.
#[inline]
pub fn base_noise(rest: [f32; 3], t: f32) -> f32 {
    snoise(rest[0] * BASE_NOISE_FREQ, rest[1] * BASE_NOISE_FREQ, t * BASE_NOISE_SPEED)
}

/// The wobbling dissolution threshold at a given uv.
pub fn dissolve_threshold(uv: [f32; 2], t: f32) -> f32 {
    use dissolve::*;
    let coarse = snoise2([uv[0] * COARSE_FREQ, uv[1] * COARSE_FREQ], t * COARSE_SPEED);
    let fine = snoise2([uv[0] * FINE_FREQ, uv[1] * FINE_FREQ], t * FINE_SPEED);
    BASE_THRESHOLD + coarse * COARSE_AMP + fine * FINE_AMP
}

/// Edge alpha for a particle with normalized position `uv` at time `t`.
///
/// 1 well inside the silhouette, fading continuously to 0 past the noisy
/// threshold.
pub fn edge_alpha(uv: [f32; 2], t: f32) -> f32 {
    edge_alpha_at(length2(uv), dissolve_threshold(uv, t))
}

/// Edge alpha for distance `d` against an already computed threshold.
#[inline]
pub fn edge_alpha_at(d: f32, threshold: f32) -> f32 {
    1.0 - smoothstep(
        threshold - dissolve::INNER_BAND,
        threshold + dissolve::OUTER_BAND,
        d,
    )
}

/// Unit normal of `z = -(x^2 + y^2) * k` at `(x, y)`.
pub fn surface_normal(xy: [f32; 2], curvature: f32) -> [f32; 3] {
    let k = curvature * CURVATURE_SCALE;
    let n = [2.0 * k * xy[0], 2.0 * k * xy[1], 1.0];
    let len = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
    [n[0] / len, n[1] / len, n[2] / len]
}

/// Noise-distorted 2D position the pointer is measured against.
pub fn distorted_position(xy: [f32; 2], t: f32) -> [f32; 2] {
    let q = [xy[0] * POINTER_NOISE_FREQ, xy[1] * POINTER_NOISE_FREQ];
    let dx = snoise2(q, t);
    let dy = snoise2([q[0] + POINTER_NOISE_OFFSET, q[1] + POINTER_NOISE_OFFSET], t);
    [
        xy[0] + dx * POINTER_DISTORTION,
        xy[1] + dy * POINTER_DISTORTION,
    ]
}

/// Pointer influence for a distance between pointer and distorted position.
#[inline]
pub fn influence_at(dist: f32) -> f32 {
    1.0 - smoothstep(0.0, POINTER_RADIUS, dist)
}

/// Vertex stage for one particle.
pub fn deform(p: &ParticleInstance, frame: &FrameInputs) -> DeformedParticle {
    let t = frame.time;
    let cfg = &frame.config;
    let mut pos = p.rest_position;

    let n = base_noise(p.rest_position, t);

    // Edge dissolution
    let d = length2(p.uv);
    let edge = edge_alpha_at(d, dissolve_threshold(p.uv, t));
    if edge < dissolve::SCATTER_BELOW {
        let scatter = 1.0 - edge;
        pos[2] += n * dissolve::SCATTER_DEPTH * scatter;
        if d > 0.0 {
            pos[0] += p.uv[0] / d * scatter * dissolve::SCATTER_RADIAL;
            pos[1] += p.uv[1] / d * scatter * dissolve::SCATTER_RADIAL;
        }
    }

    // Breathing, amplified by audio
    pos[2] += (n * BREATH_NOISE + frame.audio * BREATH_AUDIO * n) * cfg.roughness;

    // Curvature
    pos[2] -= (pos[0] * pos[0] + pos[1] * pos[1]) * cfg.curvature * CURVATURE_SCALE;

    // Dispersion
    let normal = surface_normal([pos[0], pos[1]], cfg.curvature);
    let push = cfg.dispersion * n * DISPERSION_SCALE;
    pos[0] += normal[0] * push;
    pos[1] += normal[1] * push;
    pos[2] += normal[2] * push;

    // Pointer
    let distorted = distorted_position([pos[0], pos[1]], t);
    let dist = length2([frame.pointer[0] - distorted[0], frame.pointer[1] - distorted[1]]);
    let influence = influence_at(dist);
    pos[2] += influence * POINTER_LIFT * (0.8 + 0.4 * n);

    DeformedParticle {
        position: pos,
        edge_alpha: edge,
        influence,
    }
}

/// Point size in pixels for a particle at view-space depth `view_z` (negative
/// in front of the camera).
#[inline]
pub fn point_size(base_size: f32, size_random: f32, view_z: f32, influence: f32) -> f32 {
    base_size * size_random * (PERSPECTIVE_SIZE / -view_z) * (1.0 + influence)
}

/// Fragment stage.  `coord` is the position inside the sprite in `[0, 1]^2`.
/// Returns `None` when the fragment is discarded, else straight RGBA.
pub fn shade(color: [f32; 3], edge_alpha: f32, influence: f32, coord: [f32; 2]) -> Option<[f32; 4]> {
    if edge_alpha < dissolve::DISCARD_BELOW {
        return None;
    }
    let r = length2([coord[0] - 0.5, coord[1] - 0.5]);
    if r > 0.5 {
        return None;
    }
    let particle_alpha = 1.0 - smoothstep(0.3, 0.5, r);

    let w = influence * GLOW_MIX;
    let mut rgb = [
        color[0] + (GLOW_COLOR[0] - color[0]) * w,
        color[1] + (GLOW_COLOR[1] - color[1]) * w,
        color[2] + (GLOW_COLOR[2] - color[2]) * w,
    ];
    if influence > GLOW_BRIGHTEN_ABOVE {
        for c in &mut rgb {
            *c += GLOW_BRIGHTEN * influence;
        }
    }

    Some([rgb[0], rgb[1], rgb[2], MAX_ALPHA * particle_alpha * edge_alpha])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn particle(rest: [f32; 3], uv: [f32; 2]) -> ParticleInstance {
        ParticleInstance {
            rest_position: rest,
            uv,
            color: [0.2, 0.4, 0.6],
            size_random: 0.5,
        }
    }

    fn still_frame(t: f32) -> FrameInputs {
        FrameInputs {
            time: t,
            audio: 0.0,
            pointer: [1000.0, 1000.0],
            config: ParticleConfig {
                size: 1.0,
                dispersion: 0.0,
                curvature: 0.0,
                roughness: 0.0,
            },
        }
    }

    #[test]
    fn center_is_always_opaque() {
        for k in 0..100 {
            let t = k as f32 * 0.77;
            for &uv in &[[0.0, 0.0], [0.05, -0.05], [-0.06, 0.02], [0.0, 0.08]] {
                assert_eq!(edge_alpha(uv, t), 1.0, "uv={uv:?} t={t}");
            }
        }
    }

    #[test]
    fn corners_always_dissolve() {
        for k in 0..100 {
            let t = k as f32 * 0.53;
            for &uv in &[[0.5, 0.5], [-0.5, 0.5], [0.5, -0.5], [-0.5, -0.5]] {
                assert!(edge_alpha(uv, t) < dissolve::DISCARD_BELOW, "uv={uv:?} t={t}");
            }
        }
    }

    #[test]
    fn edge_alpha_non_increasing_in_distance() {
        // Same threshold, growing distance.
        for k in 0..20 {
            let thr = 0.2 + k as f32 * 0.02;
            let mut prev = 1.0;
            for step in 0..=80 {
                let d = step as f32 * 0.01;
                let a = edge_alpha_at(d, thr);
                assert!(a <= prev + 1e-6, "thr={thr} d={d}: {a} > {prev}");
                assert!((0.0..=1.0).contains(&a));
                prev = a;
            }
        }
    }

    #[test]
    fn edge_alpha_is_continuous() {
        let thr = 0.4;
        let mut prev = edge_alpha_at(0.0, thr);
        for step in 1..=1000 {
            let d = step as f32 * 0.001;
            let a = edge_alpha_at(d, thr);
            assert!((a - prev).abs() < 0.02);
            prev = a;
        }
    }

    #[test]
    fn interior_particle_is_static_with_everything_off() {
        let p = particle([0.3, -0.2, 0.1], [0.02, -0.03]);
        for k in 0..10 {
            let out = deform(&p, &still_frame(k as f32 * 1.3));
            assert_eq!(out.position, p.rest_position);
            assert_eq!(out.edge_alpha, 1.0);
            assert_eq!(out.influence, 0.0);
        }
    }

    #[test]
    fn audio_scales_breathing_linearly() {
        let p = particle([1.1, 0.7, 0.0], [0.05, 0.03]);
        let mut frame = still_frame(2.0);
        frame.config.roughness = 1.0;
        let n = base_noise(p.rest_position, frame.time);

        let quiet = deform(&p, &frame).position[2];
        frame.audio = 0.5;
        let loud = deform(&p, &frame).position[2];
        frame.audio = 1.0;
        let louder = deform(&p, &frame).position[2];

        assert!((quiet - n * BREATH_NOISE).abs() < 1e-5);
        assert!((loud - quiet - 0.5 * BREATH_AUDIO * n).abs() < 1e-4);
        assert!((louder - quiet - BREATH_AUDIO * n).abs() < 1e-4);
    }

    #[test]
    fn curvature_bends_edges_back() {
        let near = particle([0.5, 0.0, 0.0], [0.04, 0.0]);
        let far = particle([0.0, 1.0, 0.0], [0.0, 0.08]);
        let mut frame = still_frame(0.0);
        frame.config.curvature = 2.0;
        let zn = deform(&near, &frame).position[2];
        let zf = deform(&far, &frame).position[2];
        assert!((zn - -(0.25 * 2.0 * CURVATURE_SCALE)).abs() < 1e-6);
        assert!((zf - -(1.0 * 2.0 * CURVATURE_SCALE)).abs() < 1e-6);
    }

    #[test]
    fn flat_dispersion_moves_along_z_only() {
        let p = particle([0.9, -0.4, 0.0], [0.06, -0.02]);
        let mut frame = still_frame(1.0);
        frame.config.dispersion = 1.5;
        let n = base_noise(p.rest_position, frame.time);
        let out = deform(&p, &frame);
        assert_eq!(out.position[0], p.rest_position[0]);
        assert_eq!(out.position[1], p.rest_position[1]);
        assert!((out.position[2] - 1.5 * n * DISPERSION_SCALE).abs() < 1e-5);
    }

    #[test]
    fn curved_normal_is_unit_and_tilts_outward() {
        let n = surface_normal([2.0, 0.0], 1.0);
        let len = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
        assert!((len - 1.0).abs() < 1e-6);
        assert!(n[0] > 0.0 && n[2] > 0.0);
        assert_eq!(surface_normal([2.0, 3.0], 0.0), [0.0, 0.0, 1.0]);
    }

    #[test]
    fn dissolving_particle_flies_outward() {
        // Well past the threshold at every t.
        let p = particle([5.0, 0.0, 0.0], [0.68, 0.0]);
        let out = deform(&p, &still_frame(3.0));
        assert!(out.edge_alpha < dissolve::DISCARD_BELOW);
        let scatter = 1.0 - out.edge_alpha;
        assert!((out.position[0] - (5.0 + scatter * dissolve::SCATTER_RADIAL)).abs() < 1e-5);
        assert_eq!(out.position[1], 0.0);
    }

    #[test]
    fn pointer_on_distorted_position_gives_full_influence() {
        let p = particle([0.4, 0.3, 0.0], [0.03, 0.02]);
        let mut frame = still_frame(4.0);
        frame.pointer = distorted_position([0.4, 0.3], frame.time);
        let out = deform(&p, &frame);
        assert!((out.influence - 1.0).abs() < 1e-6);

        let n = base_noise(p.rest_position, frame.time);
        assert!((out.position[2] - POINTER_LIFT * (0.8 + 0.4 * n)).abs() < 1e-5);

        let base = point_size(2.0, 0.5, -6.0, 0.0);
        let boosted = point_size(2.0, 0.5, -6.0, out.influence);
        assert!((boosted - 2.0 * base).abs() < 1e-5);
    }

    #[test]
    fn influence_falls_off_to_zero() {
        assert_eq!(influence_at(0.0), 1.0);
        assert!(influence_at(1.0) > influence_at(2.0));
        assert_eq!(influence_at(POINTER_RADIUS), 0.0);
        assert_eq!(influence_at(50.0), 0.0);
    }

    #[test]
    fn point_size_shrinks_with_depth() {
        let near = point_size(1.8, 0.7, -4.0, 0.0);
        let far = point_size(1.8, 0.7, -8.0, 0.0);
        assert!((near - 2.0 * far).abs() < 1e-5);
    }

    #[test]
    fn fragment_discards_dissolved_and_outside_circle() {
        assert!(shade([1.0; 3], 0.049, 0.0, [0.5, 0.5]).is_none());
        assert!(shade([1.0; 3], 1.0, 0.0, [0.0, 0.0]).is_none());
        let center = shade([1.0; 3], 1.0, 0.0, [0.5, 0.5]).unwrap();
        assert!((center[3] - MAX_ALPHA).abs() < 1e-6);
        let rim = shade([1.0; 3], 1.0, 0.0, [0.5, 0.95]).unwrap();
        assert!(rim[3] < center[3]);
    }

    #[test]
    fn fragment_alpha_scales_with_edge_alpha() {
        let full = shade([0.3; 3], 1.0, 0.0, [0.5, 0.5]).unwrap();
        let half = shade([0.3; 3], 0.5, 0.0, [0.5, 0.5]).unwrap();
        assert!((half[3] - full[3] * 0.5).abs() < 1e-6);
    }

    #[test]
    fn full_influence_shifts_toward_glow() {
        let base = [0.0, 0.0, 1.0];
        let lit = shade(base, 1.0, 1.0, [0.5, 0.5]).unwrap();
        for c in 0..3 {
            let expected = base[c] + (GLOW_COLOR[c] - base[c]) * GLOW_MIX + GLOW_BRIGHTEN;
            assert!((lit[c] - expected).abs() < 1e-6);
        }
        // Weak influence mixes but does not brighten.
        let faint = shade(base, 1.0, 0.1, [0.5, 0.5]).unwrap();
        assert!((faint[0] - GLOW_COLOR[0] * 0.1 * GLOW_MIX).abs() < 1e-6);
    }

    #[test]
    fn out_of_range_config_is_not_clamped() {
        let p = particle([0.5, 0.5, 0.0], [0.04, 0.04]);
        let mut frame = still_frame(0.0);
        frame.config.curvature = 30.0;
        let z = deform(&p, &frame).position[2];
        assert!((z - -(0.5 * 30.0 * CURVATURE_SCALE)).abs() < 1e-5);
    }
}
