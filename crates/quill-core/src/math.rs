//! Matrix helpers on top of [`glam`].
//!
//! Everything uses the column-vector convention: applying `a` and then `b`
//! is `b * a`, and a point is transformed as `m * p`. Projection builders
//! produce the classic OpenGL clip-space layout (z in `[-1, 1]`).

pub use glam::{Mat4, Vec2, Vec3, Vec4};

/// Orthographic projection with the `glOrtho` layout.
///
/// Computed in `f64` and narrowed at the end, so very large extents keep
/// their precision.
pub fn ortho(left: f64, right: f64, bottom: f64, top: f64, near: f64, far: f64) -> Mat4 {
    let rl = right - left;
    let tb = top - bottom;
    let fn_ = far - near;

    Mat4::from_cols_array(&[
        (2.0 / rl) as f32,
        0.0,
        0.0,
        0.0,
        0.0,
        (2.0 / tb) as f32,
        0.0,
        0.0,
        0.0,
        0.0,
        (-2.0 / fn_) as f32,
        0.0,
        (-(left + right) / rl) as f32,
        (-(top + bottom) / tb) as f32,
        (-(far + near) / fn_) as f32,
        1.0,
    ])
}

/// Perspective projection with the `glFrustum` layout.
pub fn frustum(left: f64, right: f64, bottom: f64, top: f64, near: f64, far: f64) -> Mat4 {
    let rl = right - left;
    let tb = top - bottom;
    let fn_ = far - near;

    Mat4::from_cols_array(&[
        (near * 2.0 / rl) as f32,
        0.0,
        0.0,
        0.0,
        0.0,
        (near * 2.0 / tb) as f32,
        0.0,
        0.0,
        ((right + left) / rl) as f32,
        ((top + bottom) / tb) as f32,
        (-(far + near) / fn_) as f32,
        -1.0,
        0.0,
        0.0,
        (-(far * near * 2.0) / fn_) as f32,
        0.0,
    ])
}

/// Rotation of `angle_degrees` around `axis`. The axis need not be normalized;
/// a zero axis yields the identity.
pub fn rotation(angle_degrees: f32, axis: Vec3) -> Mat4 {
    match axis.try_normalize() {
        Some(axis) => Mat4::from_axis_angle(axis, angle_degrees.to_radians()),
        None => Mat4::IDENTITY,
    }
}
