/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Traits to be implemented by backends

use crate::Display;
use crate::Eye;
use crate::EyeSpace;
use crate::Layer;
use crate::LayerId;
use crate::Native;
use crate::SurfaceType;
use crate::Viewer;

use euclid::RigidTransform3D;
use euclid::Transform3D;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FrameEndMode {
    /// Compose and submit the frame.
    Apply,
    /// Release everything that is bound and submit nothing.
    Discard,
}

/// The per-vendor facade the browser drives every frame.
pub trait DeviceDelegate {
    /// Begin a frame. Returns false if there is no session or the
    /// runtime refused the frame.
    fn start_frame(&mut self) -> bool;

    /// Acquire and bind the eye buffer for `eye`.
    fn bind_eye(&mut self, eye: Eye);

    fn end_frame(&mut self, mode: FrameEndMode);

    /// The head pose predicted for the current frame.
    fn head_transform(&self) -> RigidTransform3D<f32, Viewer, Native>;

    /// The transform from an eye to the head.
    fn eye_transform(&self, eye: Eye) -> RigidTransform3D<f32, EyeSpace, Viewer>;

    fn eye_projection(&self, eye: Eye) -> Transform3D<f32, EyeSpace, Display>;

    fn update_clip_planes(&mut self, near: f32, far: f32);

    /// Extra transform applied to cylinder layers, used to recenter the UI.
    fn set_reorient_transform(&mut self, transform: Transform3D<f32, Native, Native>);

    fn create_layer_quad(&mut self, width: i32, height: i32, surface_type: SurfaceType) -> Option<LayerId>;

    /// A quad that takes over the surface of `moved`, which is deleted.
    fn create_layer_quad_from(&mut self, moved: LayerId) -> Option<LayerId>;

    fn create_layer_cylinder(
        &mut self,
        width: i32,
        height: i32,
        surface_type: SurfaceType,
    ) -> Option<LayerId>;

    /// A cylinder that takes over the surface of `moved`, which is deleted.
    fn create_layer_cylinder_from(&mut self, moved: LayerId) -> Option<LayerId>;

    fn create_layer_projection(
        &mut self,
        width: i32,
        height: i32,
        surface_type: SurfaceType,
    ) -> Option<LayerId>;

    /// There is at most one cube layer. Creating one destroys the previous.
    fn create_layer_cube(&mut self, width: i32, height: i32, format: u32) -> Option<LayerId>;

    /// There is at most one equirect layer. Creating one destroys the previous.
    fn create_layer_equirect(&mut self, source: LayerId) -> Option<LayerId>;

    fn delete_layer(&mut self, layer: LayerId);

    fn layer(&self, layer: LayerId) -> Option<&Layer>;

    fn layer_mut(&mut self, layer: LayerId) -> Option<&mut Layer>;

    /// Make `layer`'s surface the current render target, stacking
    /// whatever was bound before.
    fn bind_layer(&mut self, layer: LayerId, target: u32);

    /// Undo `bind_layer`, restoring the previously bound layer if any.
    fn unbind_layer(&mut self, layer: LayerId);
}
