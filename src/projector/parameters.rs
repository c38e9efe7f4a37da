//! Pose, lens and output parameters of a projector.

use glam::{DMat4, DQuat, DVec2, DVec3, DVec4};

use crate::projection::{self, Viewport};

/// Minimum angle (radians) between the view direction and the vertical
/// that orbiting commands will accept.
const MIN_TILT_FROM_VERTICAL: f64 = 0.2;

/// Everything needed to build the view and projection matrices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectorParameters {
    pub eye: DVec3,
    pub target: DVec3,
    pub up: DVec3,
    /// Vertical field of view in degrees.
    pub fov: f64,
    /// Optical axis offset in [0, 1] on both axes.
    pub principal_point: DVec2,
    pub near: f64,
    pub far: f64,
    pub width: u32,
    pub height: u32,
}

impl Default for ProjectorParameters {
    fn default() -> Self {
        Self {
            eye: DVec3::new(2.0, 2.0, 1.0),
            target: DVec3::ZERO,
            up: DVec3::Z,
            fov: 35.0,
            principal_point: DVec2::splat(0.5),
            near: 0.1,
            far: 100.0,
            width: 1920,
            height: 1080,
        }
    }
}

impl ProjectorParameters {
    pub fn aspect(&self) -> f64 {
        self.width as f64 / self.height as f64
    }

    pub fn viewport(&self) -> Viewport {
        Viewport::new(self.width as f64, self.height as f64)
    }

    /// Moves the target off the eye when they coincide.
    pub fn correct_degenerate_target(&mut self) {
        self.target = projection::guarded_target(self.eye, self.target, self.up);
    }

    pub fn view_matrix(&self) -> DMat4 {
        projection::view_matrix(self.eye, self.target, self.up)
    }

    pub fn projection_matrix(&self) -> DMat4 {
        projection::asymmetric_frustum(
            self.fov,
            self.principal_point.x,
            self.principal_point.y,
            self.near,
            self.far,
            self.aspect(),
        )
    }

    /// Window coordinates of a world point.
    pub fn project(&self, world: DVec3) -> DVec3 {
        projection::project(world, &self.view_matrix(), &self.projection_matrix(), &self.viewport())
    }

    /// Translates eye and target along the viewing axis.
    pub fn forward(&mut self, distance: f64) {
        let direction = (self.eye - self.target).normalize_or_zero() * distance;
        self.eye += direction;
        self.target += direction;
    }

    /// Translates eye and target by a view-space vector.
    pub fn pan(&mut self, delta: DVec3) {
        let world = self.view_matrix().inverse() * DVec4::new(delta.x, delta.y, delta.z, 0.0);
        let world = world.truncate();
        self.eye += world;
        self.target += world;
    }

    /// Orbits the eye around the target: `yaw` about the Z axis, then `pitch`
    /// about the horizontal axis. The pitch is dropped when it would bring
    /// the view too close to vertical.
    pub fn rotate_around_target(&mut self, yaw: f64, pitch: f64) {
        let direction = self.target - self.eye;
        self.eye = self.target - DQuat::from_rotation_z(-yaw) * direction;

        let direction = self.eye - self.target;
        if let Some(tilted) = tilt(direction, direction, pitch) {
            if far_from_vertical(tilted) {
                self.eye = self.target + tilted;
            }
        }
    }

    /// Orbits eye and target together around `point`.
    pub fn rotate_around_point(&mut self, yaw: f64, pitch: f64, point: DVec3) {
        let rotation = DQuat::from_rotation_z(-yaw);
        self.target = point - rotation * (point - self.target);
        self.eye = point - rotation * (point - self.eye);

        let axis_source = self.eye - self.target;
        let tilted = tilt(point - self.target, axis_source, pitch)
            .zip(tilt(point - self.eye, axis_source, pitch));
        if let Some((to_target, to_eye)) = tilted {
            let target = point - to_target;
            let eye = point - to_eye;
            if far_from_vertical(eye - target) {
                self.eye = eye;
                self.target = target;
            }
        }
    }
}

/// Rotates `v` by `angle` about the horizontal axis perpendicular to `reference`.
fn tilt(v: DVec3, reference: DVec3, angle: f64) -> Option<DVec3> {
    let axis = DVec3::new(reference.y, -reference.x, 0.0).try_normalize()?;
    Some(DQuat::from_axis_angle(axis, angle) * v)
}

fn far_from_vertical(direction: DVec3) -> bool {
    let folded = DVec3::new(direction.x, direction.y, direction.z.abs());
    match folded.try_normalize() {
        Some(d) => d.angle_between(DVec3::Z) >= MIN_TILT_FROM_VERTICAL,
        None => false,
    }
}
