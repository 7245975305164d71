/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! This crate uses `euclid`'s typed units, and exposes different coordinate spaces.

use euclid::Point2D;
use euclid::Rect;
use euclid::Size2D;

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// The native tracking space of the device
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum Native {}

/// The coordinate space of the viewer's head
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum Viewer {}

/// The coordinate space of one eye. Which eye is a runtime value,
/// since layers are updated per eye in a loop.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum EyeSpace {}

/// The local space of a layer's geometry, before its model transform.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum LayerSpace {}

/// The normalized device coordinate space, where the display
/// is from (-1,-1) to (1,1).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum Display {}

/// The unnormalized pixel space of a swapchain image, from (0,0) to (w,h).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum Viewport {}

/// Normalized texture coordinates, from (0,0) to (1,1).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum Uv {}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum Eye {
    Left,
    Right,
}

impl Eye {
    pub const ALL: [Eye; 2] = [Eye::Left, Eye::Right];

    pub fn index(self) -> usize {
        match self {
            Eye::Left => 0,
            Eye::Right => 1,
        }
    }
}

impl Default for Eye {
    fn default() -> Self {
        Eye::Left
    }
}

/// A normalized sub-rectangle of a layer's backing texture.
pub type EyeRect = Rect<f32, Uv>;

/// The whole texture, [0,1]x[0,1].
pub fn full_texture_rect() -> EyeRect {
    Rect::new(Point2D::new(0., 0.), Size2D::new(1., 1.))
}

/// Tangent-space field of view, in radians. Left and down are
/// normally negative.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct Fov {
    pub angle_left: f32,
    pub angle_right: f32,
    pub angle_up: f32,
    pub angle_down: f32,
}

impl Fov {
    pub fn symmetric(half_angle: f32) -> Fov {
        Fov {
            angle_left: -half_angle,
            angle_right: half_angle,
            angle_up: half_angle,
            angle_down: -half_angle,
        }
    }
}
