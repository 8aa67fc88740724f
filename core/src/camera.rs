//! Orbit camera state and the input policy that drives it.
//!
//! The camera orbits the origin. Yaw and pitch rotate a fixed eye position
//! around it, the pan offsets translate the model, and the field of view
//! zooms. All angles are stored in degrees.
//!
//! ```text
//!   left drag     yaw   += lastX - x      pitch += lastY - y
//!   right drag    panX  -= lastX - x      panY  += lastY - y
//!   ctrl + right  panZ  -= lastY - y
//!   wheel         fov   += delta / -60
//! ```
//!
//! How yaw and pitch behave at their limits is a [`CameraPolicy`] decision,
//! not hard-coded: the default wraps yaw at ±360 and clamps pitch at ±89.

use glam::{EulerRot, Mat4, Vec3};

use crate::input::{InputEvent, MouseButtons};

/// Eye position before rotation.
pub const CAMERA_START: Vec3 = Vec3::new(0.0, 0.0, -600.0);

/// Near clip plane distance.
pub const NEAR_PLANE: f32 = 0.1;

/// Far clip plane distance.
pub const FAR_PLANE: f32 = 100_000.0;

/// Initial vertical field of view in degrees.
pub const DEFAULT_FOV: f32 = 45.0;

/// Wheel units per degree of field-of-view change. Negative so that rolling
/// the wheel away from the user narrows the view.
pub const WHEEL_DIVISOR: f32 = -60.0;

/// How an accumulated angle behaves at its limit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AngleLimit {
    /// Unbounded.
    Free,
    /// Values beyond `±limit` are reduced modulo `limit`, keeping the sign.
    Wrap(f32),
    /// Values are clamped into `[-limit, limit]`.
    Clamp(f32),
}

impl AngleLimit {
    /// Apply the limit to an angle.
    pub fn apply(self, value: f32) -> f32 {
        match self {
            Self::Free => value,
            Self::Wrap(limit) if value > limit || value < -limit => value % limit,
            Self::Wrap(_) => value,
            Self::Clamp(limit) => value.clamp(-limit, limit),
        }
    }
}

/// Limits applied when input mutates the view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPolicy {
    /// Yaw behavior.
    pub yaw: AngleLimit,
    /// Pitch behavior.
    pub pitch: AngleLimit,
    /// Allowed field of view range in degrees.
    pub fov_range: (f32, f32),
}

impl Default for CameraPolicy {
    fn default() -> Self {
        Self {
            yaw: AngleLimit::Wrap(360.0),
            pitch: AngleLimit::Clamp(89.0),
            fov_range: (1.0, 179.0),
        }
    }
}

impl CameraPolicy {
    /// Replace the yaw limit.
    pub fn with_yaw(mut self, yaw: AngleLimit) -> Self {
        self.yaw = yaw;
        self
    }

    /// Replace the pitch limit.
    pub fn with_pitch(mut self, pitch: AngleLimit) -> Self {
        self.pitch = pitch;
        self
    }

    /// Replace the field of view range.
    pub fn with_fov_range(mut self, min: f32, max: f32) -> Self {
        self.fov_range = (min.min(max), max.max(min));
        self
    }
}

/// The camera parameters read by the update phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewState {
    /// Rotation around the vertical axis, degrees.
    pub yaw: f32,
    /// Rotation around the horizontal axis, degrees.
    pub pitch: f32,
    /// Model translation along X.
    pub pan_x: f32,
    /// Model translation along Y.
    pub pan_y: f32,
    /// Model translation along Z.
    pub pan_z: f32,
    /// Vertical field of view, degrees.
    pub field_of_view: f32,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            yaw: 0.0,
            pitch: 0.0,
            pan_x: 0.0,
            pan_y: 0.0,
            pan_z: 0.0,
            field_of_view: DEFAULT_FOV,
        }
    }
}

impl ViewState {
    /// Model matrix: the pan translation.
    pub fn model(&self) -> Mat4 {
        Mat4::from_translation(Vec3::new(self.pan_x, self.pan_y, self.pan_z))
    }

    /// Eye position after applying yaw and pitch to [`CAMERA_START`].
    pub fn eye(&self) -> Vec3 {
        let rotation = Mat4::from_euler(
            EulerRot::YXZ,
            (-self.yaw).to_radians(),
            (-self.pitch).to_radians(),
            0.0,
        );
        rotation.transform_point3(CAMERA_START)
    }

    /// Left-handed view matrix looking at the origin with +Y up.
    pub fn view(&self) -> Mat4 {
        Mat4::look_at_lh(self.eye(), Vec3::ZERO, Vec3::Y)
    }

    /// Left-handed perspective projection.
    pub fn projection(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_lh(self.field_of_view.to_radians(), aspect, NEAR_PLANE, FAR_PLANE)
    }

    /// Build the per-frame constants for a viewport.
    pub fn constants(&self, width: u32, height: u32, icon_size: f32) -> SceneConstants {
        let aspect = width.max(1) as f32 / height.max(1) as f32;
        let model = self.model();
        let mvp = self.projection(aspect) * self.view() * model;
        SceneConstants {
            mvp: mvp.to_cols_array_2d(),
            world: model.to_cols_array_2d(),
            viewport: [width as f32, height as f32, icon_size, 0.0],
        }
    }
}

/// Per-frame shader constants, column-major.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SceneConstants {
    /// Model-view-projection matrix.
    pub mvp: [[f32; 4]; 4],
    /// Model matrix.
    pub world: [[f32; 4]; 4],
    /// `(width, height, icon size, unused)`.
    pub viewport: [f32; 4],
}

/// Applies pointer input to a [`ViewState`] under a [`CameraPolicy`].
#[derive(Debug, Clone, Default)]
pub struct CameraController {
    policy: CameraPolicy,
    last_pointer: Option<(i32, i32)>,
}

impl CameraController {
    /// Create a controller with the given policy.
    pub fn new(policy: CameraPolicy) -> Self {
        Self {
            policy,
            last_pointer: None,
        }
    }

    /// The active policy.
    pub fn policy(&self) -> &CameraPolicy {
        &self.policy
    }

    /// Rotate by the given deltas, then apply the policy limits.
    pub fn rotate(&self, view: &mut ViewState, yaw_delta: f32, pitch_delta: f32) {
        view.yaw = self.policy.yaw.apply(view.yaw + yaw_delta);
        view.pitch = self.policy.pitch.apply(view.pitch + pitch_delta);
    }

    /// Change the field of view by a wheel delta.
    pub fn zoom(&self, view: &mut ViewState, wheel_delta: i16) {
        let (min, max) = self.policy.fov_range;
        view.field_of_view =
            (view.field_of_view + f32::from(wheel_delta) / WHEEL_DIVISOR).clamp(min, max);
    }

    /// Apply a pointer event. Returns `true` if the view changed.
    ///
    /// The first move after construction only records the pointer position.
    pub fn handle(&mut self, view: &mut ViewState, event: &InputEvent) -> bool {
        match *event {
            InputEvent::MouseMove {
                x,
                y,
                buttons,
                ctrl,
            } => {
                let Some((last_x, last_y)) = self.last_pointer.replace((x, y)) else {
                    return false;
                };
                let dx = (last_x - x) as f32;
                let dy = (last_y - y) as f32;
                let before = *view;
                self.drag(view, dx, dy, buttons, ctrl);
                before != *view
            }
            InputEvent::MouseWheel { delta } => {
                let before = view.field_of_view;
                self.zoom(view, delta);
                before != view.field_of_view
            }
            InputEvent::KeyDown { .. } => false,
        }
    }

    fn drag(&self, view: &mut ViewState, dx: f32, dy: f32, buttons: MouseButtons, ctrl: bool) {
        if buttons.left {
            self.rotate(view, dx, dy);
        }
        if buttons.right && !ctrl {
            view.pan_x -= dx;
            view.pan_y += dy;
        } else if buttons.right {
            view.pan_z -= dy;
        }
    }
}
