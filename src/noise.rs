//! 3D simplex noise, CPU side.
//!
//! Same formula as `snoise` in the particle WGSL shader (Ashima Arts /
//! Ian McEwan): no permutation table, the lattice hash is the
//! `mod289((x * 34 + 1) * x)` polynomial and gradients come from a 7x7 grid
//! folded onto an octahedron.  Output is roughly in `[-1, 1]`.
//!
//! CPU and GPU results agree to within float rounding, which is all the
//! dissolution tests need.

#[inline]
fn mod289(x: f32) -> f32 {
    x - (x * (1.0 / 289.0)).floor() * 289.0
}

#[inline]
fn permute(x: f32) -> f32 {
    mod289((x * 34.0 + 1.0) * x)
}

#[inline]
fn taylor_inv_sqrt(r: f32) -> f32 {
    1.792_842_9 - 0.853_734_7 * r
}

#[inline]
fn dot3(a: [f32; 3], b: [f32; 3]) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// Gradient for one simplex corner from its lattice hash.
fn gradient(hash: f32) -> [f32; 3] {
    const NS_X: f32 = 2.0 / 7.0;
    const NS_Y: f32 = 0.5 / 7.0 - 1.0;
    const NS_Z: f32 = 1.0 / 7.0;

    let j = hash - 49.0 * (hash * NS_Z * NS_Z).floor();
    let gx_cell = (j * NS_Z).floor();
    let gy_cell = (j - 7.0 * gx_cell).floor();

    let mut gx = gx_cell * NS_X + NS_Y;
    let mut gy = gy_cell * NS_X + NS_Y;
    let h = 1.0 - gx.abs() - gy.abs();

    // Fold the lower octahedron half back up.
    if h <= 0.0 {
        gx -= gx.floor() * 2.0 + 1.0;
        gy -= gy.floor() * 2.0 + 1.0;
    }

    let g = [gx, gy, h];
    let norm = taylor_inv_sqrt(dot3(g, g));
    [g[0] * norm, g[1] * norm, g[2] * norm]
}

/// Simplex noise at `(x, y, z)`.
pub fn snoise(x: f32, y: f32, z: f32) -> f32 {
    const C_X: f32 = 1.0 / 6.0;
    const C_Y: f32 = 1.0 / 3.0;

    let v = [x, y, z];

    // Skew into simplex space and find the cell origin.
    let s = (x + y + z) * C_Y;
    let i = [(x + s).floor(), (y + s).floor(), (z + s).floor()];
    let t = (i[0] + i[1] + i[2]) * C_X;
    let x0 = [v[0] - i[0] + t, v[1] - i[1] + t, v[2] - i[2] + t];

    // Rank the components to pick the two middle corners.
    let g: [f32; 3] = [
        if x0[0] >= x0[1] { 1.0 } else { 0.0 },
        if x0[1] >= x0[2] { 1.0 } else { 0.0 },
        if x0[2] >= x0[0] { 1.0 } else { 0.0 },
    ];
    let l = [1.0 - g[0], 1.0 - g[1], 1.0 - g[2]];
    let i1 = [g[0].min(l[2]), g[1].min(l[0]), g[2].min(l[1])];
    let i2 = [g[0].max(l[2]), g[1].max(l[0]), g[2].max(l[1])];

    let x1 = [x0[0] - i1[0] + C_X, x0[1] - i1[1] + C_X, x0[2] - i1[2] + C_X];
    let x2 = [x0[0] - i2[0] + C_Y, x0[1] - i2[1] + C_Y, x0[2] - i2[2] + C_Y];
    let x3 = [x0[0] - 0.5, x0[1] - 0.5, x0[2] - 0.5];

    let i = [mod289(i[0]), mod289(i[1]), mod289(i[2])];
    let offsets = [
        [0.0, 0.0, 0.0],
        [i1[0], i1[1], i1[2]],
        [i2[0], i2[1], i2[2]],
        [1.0, 1.0, 1.0],
    ];
    let corners = [x0, x1, x2, x3];

    let mut total = 0.0;
    for (offset, corner) in offsets.iter().zip(corners.iter()) {
        let hash = permute(permute(permute(i[2] + offset[2]) + i[1] + offset[1]) + i[0] + offset[0]);
        let falloff = (0.6 - dot3(*corner, *corner)).max(0.0);
        let falloff = falloff * falloff;
        total += falloff * falloff * dot3(gradient(hash), *corner);
    }
    42.0 * total
}

/// Convenience for the `snoise(vec3(xy, z))` pattern the shader uses.
#[inline]
pub fn snoise2(xy: [f32; 2], z: f32) -> f32 {
    snoise(xy[0], xy[1], z)
}
