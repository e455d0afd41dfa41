/// Look-at camera with a left-handed perspective or orthographic projection.

use glam::{Mat4, Vec3};

/// Projection kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProjectionMode {
    #[default]
    Perspective,
    Orthographic,
}

/// Scene camera
///
/// View and projection are derived on demand from position, target, up
/// vector and lens parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    position: Vec3,
    target: Vec3,
    up: Vec3,
    fov_y: f32,
    near: f32,
    far: f32,
    width: f32,
    height: f32,
    mode: ProjectionMode,
}

impl Camera {
    pub const DEFAULT_POSITION: Vec3 = Vec3::new(0.0, 5.0, -10.0);
    pub const RESET_POSITION: Vec3 = Vec3::new(0.0, 0.0, -5.0);

    /// Camera looking at the origin from `DEFAULT_POSITION`
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            position: Self::DEFAULT_POSITION,
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov_y: 60f32.to_radians(),
            near: 1.0,
            far: 10000.0,
            width: width.max(1) as f32,
            height: height.max(1) as f32,
            mode: ProjectionMode::Perspective,
        }
    }

    // ===== MATRICES =====

    pub fn view(&self) -> Mat4 {
        Mat4::look_at_lh(self.position, self.target, self.up)
    }

    pub fn projection(&self) -> Mat4 {
        match self.mode {
            ProjectionMode::Perspective => {
                Mat4::perspective_lh(self.fov_y, self.aspect(), self.near, self.far)
            }
            ProjectionMode::Orthographic => {
                let (hw, hh) = (self.width * 0.5, self.height * 0.5);
                Mat4::orthographic_lh(-hw, hw, -hh, hh, self.near, self.far)
            }
        }
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection() * self.view()
    }

    /// Unit vector from position towards target
    pub fn forward(&self) -> Vec3 {
        (self.target - self.position).normalize_or_zero()
    }

    /// Unit vector to the right of `forward` (left-handed)
    pub fn right(&self) -> Vec3 {
        self.up.cross(self.forward()).normalize_or_zero()
    }

    // ===== MOVEMENT =====

    /// Translate position and target together
    pub fn translate(&mut self, delta: Vec3) {
        self.position += delta;
        self.target += delta;
    }

    pub fn move_forward(&mut self, amount: f32) {
        self.translate(self.forward() * amount);
    }

    pub fn move_right(&mut self, amount: f32) {
        self.translate(self.right() * amount);
    }

    pub fn move_up(&mut self, amount: f32) {
        self.translate(self.up * amount);
    }

    /// Back to `RESET_POSITION` looking at the origin
    pub fn reset(&mut self) {
        self.set_position_and_target(Self::RESET_POSITION, Vec3::ZERO);
    }

    // ===== SETTERS =====

    pub fn set_position_and_target(&mut self, position: Vec3, target: Vec3) {
        self.position = position;
        self.target = target;
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    pub fn set_up(&mut self, up: Vec3) {
        self.up = up;
    }

    pub fn set_fov_y(&mut self, radians: f32) {
        self.fov_y = radians;
    }

    pub fn set_clip_planes(&mut self, near: f32, far: f32) {
        self.near = near;
        self.far = far;
    }

    pub fn set_projection_mode(&mut self, mode: ProjectionMode) {
        self.mode = mode;
    }

    /// Update the viewport size; zero dimensions are ignored
    pub fn set_viewport_size(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.width = width as f32;
        self.height = height as f32;
    }

    // ===== GETTERS =====

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn target(&self) -> Vec3 {
        self.target
    }

    pub fn fov_y(&self) -> f32 {
        self.fov_y
    }

    pub fn near(&self) -> f32 {
        self.near
    }

    pub fn far(&self) -> f32 {
        self.far
    }

    pub fn aspect(&self) -> f32 {
        self.width / self.height
    }

    pub fn projection_mode(&self) -> ProjectionMode {
        self.mode
    }
}

#[cfg(test)]
#[path = "camera_tests.rs"]
mod tests;
