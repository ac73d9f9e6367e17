// ============================================================================
// WGSL SHADER SOURCES — inline strings, compiled once per pipeline
// ============================================================================
//
// PARTICLE_SHADER is the GPU half of `crate::deform`.  Every tuning constant
// below has a Rust twin there; the test at the bottom keeps them in lockstep.
//
// Particles are drawn as instanced quads (wgpu has no point size): six
// vertices per instance, the corner picked from `vertex_index`, and the
// quad expanded in clip space so its on-screen size is in pixels.
// ============================================================================

pub const PARTICLE_SHADER: &str = r#"
struct Uniforms {
    model_view: mat4x4<f32>,
    projection: mat4x4<f32>,
    pointer: vec2<f32>,
    viewport: vec2<f32>,
    time: f32,
    audio: f32,
    size: f32,
    dispersion: f32,
    curvature: f32,
    roughness: f32,
    pixel_ratio: f32,
    _pad: f32,
};

@group(0) @binding(0) var<uniform> u: Uniforms;

// ---- dissolution --------------------------------------------------------
const BASE_THRESHOLD: f32 = 0.4;
const COARSE_FREQ: f32 = 4.0;
const COARSE_SPEED: f32 = 0.15;
const COARSE_AMP: f32 = 0.15;
const FINE_FREQ: f32 = 10.0;
const FINE_SPEED: f32 = 0.2;
const FINE_AMP: f32 = 0.05;
const INNER_BAND: f32 = 0.1;
const OUTER_BAND: f32 = 0.05;
const SCATTER_BELOW: f32 = 0.9;
const SCATTER_DEPTH: f32 = 4.0;
const SCATTER_RADIAL: f32 = 1.5;
const DISCARD_BELOW: f32 = 0.05;

// ---- motion -------------------------------------------------------------
const BASE_NOISE_FREQ: f32 = 0.4;
const BASE_NOISE_SPEED: f32 = 0.3;
const BREATH_NOISE: f32 = 0.8;
const BREATH_AUDIO: f32 = 8.0;
const CURVATURE_SCALE: f32 = 0.15;
const DISPERSION_SCALE: f32 = 4.0;
const POINTER_NOISE_FREQ: f32 = 2.0;
const POINTER_NOISE_OFFSET: f32 = 100.0;
const POINTER_DISTORTION: f32 = 1.5;
const POINTER_RADIUS: f32 = 3.5;
const POINTER_LIFT: f32 = 4.0;
const PERSPECTIVE_SIZE: f32 = 12.0;

// ---- colour -------------------------------------------------------------
const GLOW_COLOR: vec3<f32> = vec3<f32>(1.0, 0.85, 0.5);
const GLOW_MIX: f32 = 0.6;
const GLOW_BRIGHTEN_ABOVE: f32 = 0.2;
const GLOW_BRIGHTEN: f32 = 0.15;
const MAX_ALPHA: f32 = 0.8;

const SENTINEL_Z: f32 = 4000.0;

// ---- simplex noise (Ashima Arts / Ian McEwan) -----------------------------
fn mod289_3(x: vec3<f32>) -> vec3<f32> {
    return x - floor(x * (1.0 / 289.0)) * 289.0;
}

fn mod289_4(x: vec4<f32>) -> vec4<f32> {
    return x - floor(x * (1.0 / 289.0)) * 289.0;
}

fn permute(x: vec4<f32>) -> vec4<f32> {
    return mod289_4(((x * 34.0) + 1.0) * x);
}

fn taylor_inv_sqrt(r: vec4<f32>) -> vec4<f32> {
    return 1.79284291400159 - 0.85373472095314 * r;
}

fn snoise(v: vec3<f32>) -> f32 {
    let C = vec2<f32>(1.0 / 6.0, 1.0 / 3.0);
    let D = vec4<f32>(0.0, 0.5, 1.0, 2.0);

    var i = floor(v + dot(v, C.yyy));
    let x0 = v - i + dot(i, C.xxx);

    let g = step(x0.yzx, x0.xyz);
    let l = 1.0 - g;
    let i1 = min(g.xyz, l.zxy);
    let i2 = max(g.xyz, l.zxy);

    let x1 = x0 - i1 + C.xxx;
    let x2 = x0 - i2 + C.yyy;
    let x3 = x0 - D.yyy;

    i = mod289_3(i);
    let p = permute(permute(permute(
                i.z + vec4<f32>(0.0, i1.z, i2.z, 1.0))
              + i.y + vec4<f32>(0.0, i1.y, i2.y, 1.0))
              + i.x + vec4<f32>(0.0, i1.x, i2.x, 1.0));

    let n_ = 0.142857142857;
    let ns = n_ * D.wyz - D.xzx;

    let j = p - 49.0 * floor(p * ns.z * ns.z);
    let x_ = floor(j * ns.z);
    let y_ = floor(j - 7.0 * x_);

    let x = x_ * ns.x + ns.yyyy;
    let y = y_ * ns.x + ns.yyyy;
    let h = 1.0 - abs(x) - abs(y);

    let b0 = vec4<f32>(x.xy, y.xy);
    let b1 = vec4<f32>(x.zw, y.zw);
    let s0 = floor(b0) * 2.0 + 1.0;
    let s1 = floor(b1) * 2.0 + 1.0;
    let sh = -step(h, vec4<f32>(0.0));

    let a0 = b0.xzyw + s0.xzyw * sh.xxyy;
    let a1 = b1.xzyw + s1.xzyw * sh.zzww;

    var p0 = vec3<f32>(a0.xy, h.x);
    var p1 = vec3<f32>(a0.zw, h.y);
    var p2 = vec3<f32>(a1.xy, h.z);
    var p3 = vec3<f32>(a1.zw, h.w);

    let norm = taylor_inv_sqrt(vec4<f32>(dot(p0, p0), dot(p1, p1), dot(p2, p2), dot(p3, p3)));
    p0 = p0 * norm.x;
    p1 = p1 * norm.y;
    p2 = p2 * norm.z;
    p3 = p3 * norm.w;

    var m = max(0.6 - vec4<f32>(dot(x0, x0), dot(x1, x1), dot(x2, x2), dot(x3, x3)), vec4<f32>(0.0));
    m = m * m;
    return 42.0 * dot(m * m, vec4<f32>(dot(p0, x0), dot(p1, x1), dot(p2, x2), dot(p3, x3)));
}

// ---- stages ---------------------------------------------------------------
struct ParticleIn {
    @location(0) rest_position: vec3<f32>,
    @location(1) uv: vec2<f32>,
    @location(2) color: vec3<f32>,
    @location(3) size_random: f32,
};

struct VsOut {
    @builtin(position) clip: vec4<f32>,
    @location(0) color: vec3<f32>,
    @location(1) coord: vec2<f32>,
    @location(2) edge_alpha: f32,
    @location(3) influence: f32,
};

fn quad_corner(index: u32) -> vec2<f32> {
    var corners = array<vec2<f32>, 6>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>( 1.0, -1.0),
        vec2<f32>( 1.0,  1.0),
        vec2<f32>(-1.0, -1.0),
        vec2<f32>( 1.0,  1.0),
        vec2<f32>(-1.0,  1.0),
    );
    return corners[index];
}

@vertex
fn vs_main(@builtin(vertex_index) vid: u32, p: ParticleIn) -> VsOut {
    var result: VsOut;
    let corner = quad_corner(vid % 6u);
    result.color = p.color;
    result.coord = corner * 0.5 + 0.5;

    if (p.rest_position.z > SENTINEL_Z) {
        // Culled cell: park it outside the clip volume.
        result.clip = vec4<f32>(0.0, 0.0, 2.0, 1.0);
        result.edge_alpha = 0.0;
        result.influence = 0.0;
        return result;
    }

    var pos = p.rest_position;
    let t = u.time;
    let n = snoise(vec3<f32>(pos.xy * BASE_NOISE_FREQ, t * BASE_NOISE_SPEED));

    // Edge dissolution
    let d = length(p.uv);
    let coarse = snoise(vec3<f32>(p.uv * COARSE_FREQ, t * COARSE_SPEED));
    let fine = snoise(vec3<f32>(p.uv * FINE_FREQ, t * FINE_SPEED));
    let threshold = BASE_THRESHOLD + coarse * COARSE_AMP + fine * FINE_AMP;
    let edge = 1.0 - smoothstep(threshold - INNER_BAND, threshold + OUTER_BAND, d);
    if (edge < SCATTER_BELOW) {
        let scatter = 1.0 - edge;
        pos.z = pos.z + n * SCATTER_DEPTH * scatter;
        if (d > 0.0) {
            pos = vec3<f32>(pos.xy + p.uv / d * scatter * SCATTER_RADIAL, pos.z);
        }
    }

    // Breathing
    pos.z = pos.z + (n * BREATH_NOISE + u.audio * BREATH_AUDIO * n) * u.roughness;

    // Curvature
    pos.z = pos.z - dot(pos.xy, pos.xy) * u.curvature * CURVATURE_SCALE;

    // Dispersion along the curved surface normal
    let k = u.curvature * CURVATURE_SCALE;
    let normal = normalize(vec3<f32>(2.0 * k * pos.x, 2.0 * k * pos.y, 1.0));
    pos = pos + normal * (u.dispersion * n * DISPERSION_SCALE);

    // Pointer
    let q = pos.xy * POINTER_NOISE_FREQ;
    let dx = snoise(vec3<f32>(q, t));
    let dy = snoise(vec3<f32>(q + POINTER_NOISE_OFFSET, t));
    let distorted = pos.xy + vec2<f32>(dx, dy) * POINTER_DISTORTION;
    let influence = 1.0 - smoothstep(0.0, POINTER_RADIUS, distance(u.pointer, distorted));
    pos.z = pos.z + influence * POINTER_LIFT * (0.8 + 0.4 * n);

    let view = u.model_view * vec4<f32>(pos, 1.0);
    var clip = u.projection * view;

    let size_px = u.size * p.size_random * (PERSPECTIVE_SIZE / -view.z) * (1.0 + influence) * u.pixel_ratio;
    let offset = corner * size_px / max(u.viewport, vec2<f32>(1.0));
    clip = vec4<f32>(clip.xy + offset * clip.w, clip.zw);

    result.clip = clip;
    result.edge_alpha = edge;
    result.influence = influence;
    return result;
}

@fragment
fn fs_main(frag: VsOut) -> @location(0) vec4<f32> {
    if (frag.edge_alpha < DISCARD_BELOW) {
        discard;
    }
    let r = distance(frag.coord, vec2<f32>(0.5));
    if (r > 0.5) {
        discard;
    }
    let particle_alpha = 1.0 - smoothstep(0.3, 0.5, r);

    var rgb = mix(frag.color, GLOW_COLOR, frag.influence * GLOW_MIX);
    if (frag.influence > GLOW_BRIGHTEN_ABOVE) {
        rgb = rgb + vec3<f32>(GLOW_BRIGHTEN * frag.influence);
    }
    return vec4<f32>(rgb, MAX_ALPHA * particle_alpha * frag.edge_alpha);
}
"#;
