//! Orbit camera over spherical coordinates around a fixed look-at target.
//!
//! The camera never stores an eye position: radius, azimuth and polar angle
//! are the single source of truth and the eye is derived on demand, so
//! repeated drags cannot drift the state the way incremental eye-vector
//! rotation does.

use glam::{Mat4, Vec3};
use std::f32::consts::PI;

pub const MIN_DISTANCE: f32 = 10.0;
pub const MAX_DISTANCE: f32 = 100.0;
/// Keeps the polar angle away from the poles so the view basis never flips.
pub const POLAR_MARGIN: f32 = 0.01;

const DEFAULT_EYE: Vec3 = Vec3::new(30.0, 20.0, 30.0);
const FOV_Y: f32 = 75.0 * PI / 180.0;
const NEAR: f32 = 0.1;
const FAR: f32 = 1000.0;

const ROTATE_SPEED: f32 = 0.01;
/// Pan speed per pixel, scaled by the current orbit radius.
const PAN_SPEED: f32 = 0.0015;
pub const ZOOM_IN_FACTOR: f32 = 0.9;
pub const ZOOM_OUT_FACTOR: f32 = 1.1;

pub struct OrbitCamera {
    radius: f32,
    /// Azimuth around the +Y axis, measured from +Z.
    theta: f32,
    /// Polar angle from +Y, clamped to (POLAR_MARGIN, PI - POLAR_MARGIN).
    phi: f32,
    target: Vec3,
}

impl OrbitCamera {
    pub fn new() -> Self {
        let mut camera = Self {
            radius: MIN_DISTANCE,
            theta: 0.0,
            phi: PI / 2.0,
            target: Vec3::ZERO,
        };
        camera.reset();
        camera
    }

    /// Restore the default eye and target, discarding accumulated state.
    pub fn reset(&mut self) {
        self.target = Vec3::ZERO;
        self.sync_from_eye(DEFAULT_EYE);
    }

    /// Eye position derived from the spherical triple.
    pub fn eye(&self) -> Vec3 {
        let dir = Vec3::new(
            self.phi.sin() * self.theta.sin(),
            self.phi.cos(),
            self.phi.sin() * self.theta.cos(),
        );
        self.target + self.radius * dir
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn phi(&self) -> f32 {
        self.phi
    }

    /// Mouse-drag rotation: pixel deltas map linearly onto the angles.
    pub fn rotate(&mut self, dx: f32, dy: f32) {
        self.theta -= dx * ROTATE_SPEED;
        self.phi = clamp_phi(self.phi - dy * ROTATE_SPEED);
    }

    /// Mouse-drag pan: the pixel delta is projected onto the camera's
    /// right/up basis and added to the eye; the spherical triple is then
    /// resynchronized from the displaced eye so rotate and zoom keep
    /// operating on consistent state.
    pub fn pan(&mut self, dx: f32, dy: f32) {
        let eye = self.eye();
        let forward = (self.target - eye).normalize();
        let right = forward.cross(Vec3::Y).normalize();
        let up = right.cross(forward);
        let offset = (right * -dx + up * dy) * self.radius * PAN_SPEED;
        self.sync_from_eye(eye + offset);
    }

    /// Multiplicative zoom on the orbit radius, clamped to the distance range.
    pub fn zoom(&mut self, factor: f32) {
        self.radius = (self.radius * factor).clamp(MIN_DISTANCE, MAX_DISTANCE);
    }

    pub fn zoom_in(&mut self) {
        self.zoom(ZOOM_IN_FACTOR);
    }

    pub fn zoom_out(&mut self) {
        self.zoom(ZOOM_OUT_FACTOR);
    }

    /// Wheel input: only the delta sign selects the zoom direction.
    pub fn handle_scroll(&mut self, delta: f32) {
        if delta > 0.0 {
            self.zoom_in();
        } else if delta < 0.0 {
            self.zoom_out();
        }
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye(), self.target, Vec3::Y)
    }

    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh_gl(FOV_Y, aspect.max(1e-3), NEAR, FAR)
    }

    pub fn view_projection(&self, aspect: f32) -> Mat4 {
        self.projection_matrix(aspect) * self.view_matrix()
    }

    fn sync_from_eye(&mut self, eye: Vec3) {
        let rel = eye - self.target;
        let len = rel.length();
        if len < 1e-6 {
            return;
        }
        self.radius = len.clamp(MIN_DISTANCE, MAX_DISTANCE);
        self.theta = rel.x.atan2(rel.z);
        self.phi = clamp_phi((rel.y / len).acos());
    }
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self::new()
    }
}

fn clamp_phi(phi: f32) -> f32 {
    phi.clamp(POLAR_MARGIN, PI - POLAR_MARGIN)
}
