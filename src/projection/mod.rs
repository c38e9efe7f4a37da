//! View and projection matrix construction.
//!
//! Projectors rarely have their optical axis through the image centre, so the
//! projection is an off-centre (asymmetric) frustum shifted by the principal
//! point. All matrices follow the OpenGL conventions: right-handed view space,
//! clip-space depth in [-1, 1], window depth in [0, 1].

use glam::{DMat4, DVec3, DVec4, EulerRot};

/// Canonical forward axis rotated by the solver's yaw/pitch/roll.
pub const CANONICAL_FORWARD: DVec3 = DVec3::X;
/// Canonical up axis rotated by the solver's yaw/pitch/roll.
pub const CANONICAL_UP: DVec3 = DVec3::Z;

/// Pixel rectangle the normalized device coordinates map onto.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    /// Viewport anchored at the origin.
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width,
            height,
        }
    }
}

/// Off-centre perspective frustum from its clip-plane extents at `near`.
pub fn frustum(left: f64, right: f64, bottom: f64, top: f64, near: f64, far: f64) -> DMat4 {
    DMat4::from_cols(
        DVec4::new(2.0 * near / (right - left), 0.0, 0.0, 0.0),
        DVec4::new(0.0, 2.0 * near / (top - bottom), 0.0, 0.0),
        DVec4::new(
            (right + left) / (right - left),
            (top + bottom) / (top - bottom),
            -(far + near) / (far - near),
            -1.0,
        ),
        DVec4::new(0.0, 0.0, -2.0 * far * near / (far - near), 0.0),
    )
}

/// Asymmetric perspective projection.
///
/// `fov` is the vertical field of view in degrees, `(cx, cy)` the principal
/// point in [0, 1] and `aspect` the output width over height. A principal
/// point of (0.5, 0.5) yields the symmetric frustum.
pub fn asymmetric_frustum(fov: f64, cx: f64, cy: f64, near: f64, far: f64, aspect: f64) -> DMat4 {
    let t_sym = near * (fov * std::f64::consts::PI / 360.0).tan();
    let b_sym = -t_sym;
    let r_sym = t_sym * aspect;
    let l_sym = -r_sym;

    let dy = (cy - 0.5) * (t_sym - b_sym);
    let dx = (cx - 0.5) * (r_sym - l_sym);

    frustum(l_sym - dx, r_sym - dx, b_sym - dy, t_sym - dy, near, far)
}

/// Returns a usable look-at target.
///
/// When `eye` and `target` coincide the view basis is singular; the target is
/// then moved off the eye by a permutation of `up`.
pub fn guarded_target(eye: DVec3, target: DVec3, up: DVec3) -> DVec3 {
    if eye == target {
        eye + DVec3::new(up.y, up.z, up.x)
    } else {
        target
    }
}

/// Right-handed look-at view matrix with the degenerate-eye guard applied.
pub fn view_matrix(eye: DVec3, target: DVec3, up: DVec3) -> DMat4 {
    DMat4::look_at_rh(eye, guarded_target(eye, target, up), up)
}

/// Rotation by yaw (about Y), then pitch (about X), then roll (about Z).
pub fn yaw_pitch_roll(yaw: f64, pitch: f64, roll: f64) -> DMat4 {
    DMat4::from_euler(EulerRot::YXZ, yaw, pitch, roll)
}

/// Target and up vectors obtained by rotating the canonical axes.
pub fn orientation_from_euler(euler: DVec3) -> (DVec3, DVec3) {
    let rotation = yaw_pitch_roll(euler.x, euler.y, euler.z);
    (
        rotation.transform_vector3(CANONICAL_FORWARD),
        rotation.transform_vector3(CANONICAL_UP),
    )
}

/// Maps a world point to window coordinates (x, y in pixels, z in [0, 1]).
pub fn project(point: DVec3, view: &DMat4, projection: &DMat4, viewport: &Viewport) -> DVec3 {
    let mut clip = *projection * (*view * point.extend(1.0));
    clip /= clip.w;
    let ndc = clip.truncate() * 0.5 + DVec3::splat(0.5);
    DVec3::new(
        ndc.x * viewport.width + viewport.x,
        ndc.y * viewport.height + viewport.y,
        ndc.z,
    )
}

/// Inverse of [`project`]: window coordinates back to the space `view` maps from.
pub fn unproject(window: DVec3, view: &DMat4, projection: &DMat4, viewport: &Viewport) -> DVec3 {
    let inverse = (*projection * *view).inverse();
    let ndc = DVec4::new(
        (window.x - viewport.x) / viewport.width * 2.0 - 1.0,
        (window.y - viewport.y) / viewport.height * 2.0 - 1.0,
        window.z * 2.0 - 1.0,
        1.0,
    );
    let object = inverse * ndc;
    object.truncate() / object.w
}
