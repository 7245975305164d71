/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use euclid::Point2D;
use euclid::Rect;
use euclid::RigidTransform3D;
use euclid::Rotation3D;
use euclid::Size2D;
use euclid::Transform3D;
use euclid::Vector3D;

use xrlayers_api::util::ClipPlanes;
use xrlayers_api::EyeRect;
use xrlayers_api::Fov;
use xrlayers_api::Viewport;

pub fn fov_to_projection_matrix<T, U>(fov: &Fov, clip_planes: ClipPlanes) -> Transform3D<f32, T, U> {
    let near = clip_planes.near;
    let far = clip_planes.far;
    let left = fov.angle_left.tan() * near;
    let right = fov.angle_right.tan() * near;
    let top = fov.angle_up.tan() * near;
    let bottom = fov.angle_down.tan() * near;

    let w = right - left;
    let h = top - bottom;
    let d = far - near;

    Transform3D::new(
        2. * near / w,
        0.,
        0.,
        0.,
        0.,
        2. * near / h,
        0.,
        0.,
        (right + left) / w,
        (top + bottom) / h,
        -(far + near) / d,
        -1.,
        0.,
        0.,
        -2. * far * near / d,
        0.,
    )
}

/// Splits a rigid (possibly uniformly scaled) matrix into rotation and translation.
pub fn transform_to_pose<T, U>(t: &Transform3D<f32, T, U>) -> RigidTransform3D<f32, T, U> {
    RigidTransform3D::new(matrix_rotation(t), Vector3D::new(t.m41, t.m42, t.m43))
}

pub fn matrix_rotation<T, U>(t: &Transform3D<f32, T, U>) -> Rotation3D<f32, T, U> {
    let rows = [
        normalize([t.m11, t.m12, t.m13]),
        normalize([t.m21, t.m22, t.m23]),
        normalize([t.m31, t.m32, t.m33]),
    ];
    let (m11, m12, m13) = (rows[0][0], rows[0][1], rows[0][2]);
    let (m21, m22, m23) = (rows[1][0], rows[1][1], rows[1][2]);
    let (m31, m32, m33) = (rows[2][0], rows[2][1], rows[2][2]);

    let trace = m11 + m22 + m33;
    let (i, j, k, r) = if trace > 0. {
        let s = (trace + 1.).sqrt() * 2.;
        ((m23 - m32) / s, (m31 - m13) / s, (m12 - m21) / s, s / 4.)
    } else if m11 > m22 && m11 > m33 {
        let s = (1. + m11 - m22 - m33).sqrt() * 2.;
        (s / 4., (m21 + m12) / s, (m31 + m13) / s, (m23 - m32) / s)
    } else if m22 > m33 {
        let s = (1. + m22 - m11 - m33).sqrt() * 2.;
        ((m21 + m12) / s, s / 4., (m32 + m23) / s, (m31 - m13) / s)
    } else {
        let s = (1. + m33 - m11 - m22).sqrt() * 2.;
        ((m31 + m13) / s, (m32 + m23) / s, s / 4., (m12 - m21) / s)
    };
    Rotation3D::unit_quaternion(i, j, k, r)
}

fn normalize(v: [f32; 3]) -> [f32; 3] {
    let len = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if len == 0. {
        return v;
    }
    [v[0] / len, v[1] / len, v[2] / len]
}

/// A normalized texture rect in pixels of a `size` image.
pub fn pixel_rect(rect: &EyeRect, size: Size2D<i32, Viewport>) -> Rect<i32, Viewport> {
    let w = size.width as f32;
    let h = size.height as f32;
    Rect::new(
        Point2D::new((rect.origin.x * w) as i32, (rect.origin.y * h) as i32),
        Size2D::new(
            (rect.size.width * w) as i32,
            (rect.size.height * h) as i32,
        ),
    )
}

pub fn is_full_rect(rect: &EyeRect) -> bool {
    *rect == xrlayers_api::full_texture_rect()
}
