// ============================================================================
// ANIMATION DRIVER — per-frame uniform state for one rendering session
// ============================================================================
//
// Created when a session starts, ticked once per displayed frame, dropped
// when the session ends.  Nothing here touches particles; it only produces
// the handful of scalars the shader reads.
// ============================================================================

use glam::{EulerRot, Mat4};

use crate::config::ParticleConfig;
use crate::deform::FrameInputs;

/// Fraction of the remaining gap closed per tick.
pub const SMOOTHING: f32 = 0.1;

/// Pointer target far outside any field: no particle feels it.
pub const FAR_POINTER: [f32; 2] = [1000.0, 1000.0];

/// Whole-field wobble: `(amplitude rad, angular speed)` per axis.
const ROTATION_X: (f32, f32) = (0.05, 0.08);
const ROTATION_Y: (f32, f32) = (0.15, 0.1);
const ROTATION_Z: (f32, f32) = (0.03, 0.05);

/// First-order low-pass toward an externally supplied target.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Smoothed<const N: usize> {
    value: [f32; N],
}

impl<const N: usize> Smoothed<N> {
    pub fn new(initial: [f32; N]) -> Self {
        Self { value: initial }
    }

    pub fn value(&self) -> [f32; N] {
        self.value
    }

    /// `value += (target - value) * SMOOTHING`, per component.
    pub fn step(&mut self, target: [f32; N]) -> [f32; N] {
        for (v, t) in self.value.iter_mut().zip(target.iter()) {
            *v += (*t - *v) * SMOOTHING;
        }
        self.value
    }
}

/// What the outside world supplies each frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameTargets {
    /// Latest audio level from the analyser, nominally `[0, 1]`.
    pub audio: f32,
    /// Pointer position in field-plane world units.
    pub pointer: [f32; 2],
    pub config: ParticleConfig,
}

/// Uniform values for one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameState {
    pub inputs: FrameInputs,
    /// Euler angles (XYZ order) of the whole-field wobble, radians.
    pub rotation: [f32; 3],
}

impl FrameState {
    /// Model matrix for the field at this frame.
    pub fn model_matrix(&self) -> Mat4 {
        let [x, y, z] = self.rotation;
        Mat4::from_euler(EulerRot::XYZ, x, y, z)
    }
}

/// Per-session animation context.
#[derive(Clone, Debug)]
pub struct AnimationDriver {
    elapsed: f32,
    audio: Smoothed<1>,
    pointer: Smoothed<2>,
    frames: u64,
}

impl Default for AnimationDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl AnimationDriver {
    pub fn new() -> Self {
        Self::with_pointer(FAR_POINTER)
    }

    /// Start with the smoothed pointer already resting at `pointer`.
    pub fn with_pointer(pointer: [f32; 2]) -> Self {
        Self {
            elapsed: 0.0,
            audio: Smoothed::new([0.0]),
            pointer: Smoothed::new(pointer),
            frames: 0,
        }
    }

    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn smoothed_audio(&self) -> f32 {
        self.audio.value()[0]
    }

    pub fn smoothed_pointer(&self) -> [f32; 2] {
        self.pointer.value()
    }

    /// Move the smoothed pointer straight to `pointer`, skipping the glide.
    /// Time and audio are untouched.
    pub fn snap_pointer(&mut self, pointer: [f32; 2]) {
        self.pointer = Smoothed::new(pointer);
    }

    /// Advance by `dt` seconds and produce this frame's uniforms.
    ///
    /// Config is copied as-is; no clamping happens here.
    pub fn tick(&mut self, dt: f32, targets: &FrameTargets) -> FrameState {
        self.elapsed += dt.max(0.0);
        self.frames += 1;
        let [audio] = self.audio.step([targets.audio]);
        let pointer = self.pointer.step(targets.pointer);

        FrameState {
            inputs: FrameInputs {
                time: self.elapsed,
                audio,
                pointer,
                config: targets.config,
            },
            rotation: field_rotation(self.elapsed),
        }
    }
}

/// Slow cosmetic rotation of the whole field at elapsed time `t`.
pub fn field_rotation(t: f32) -> [f32; 3] {
    [
        (t * ROTATION_X.1).cos() * ROTATION_X.0,
        (t * ROTATION_Y.1).sin() * ROTATION_Y.0,
        (t * ROTATION_Z.1).sin() * ROTATION_Z.0,
    ]
}
