/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use crate::native::NativeLayer;
use crate::utils;
use crate::CompositorConfig;
use crate::FrameCompositor;
use crate::LayerRequester;

use euclid::RigidTransform3D;
use euclid::Transform3D;

use log::{debug, warn};

use xrlayers_api::util::ClipPlanes;
use xrlayers_api::DeviceDelegate;
use xrlayers_api::Display;
use xrlayers_api::Eye;
use xrlayers_api::EyeSpace;
use xrlayers_api::FrameEndMode;
use xrlayers_api::FrameState;
use xrlayers_api::Graphics;
use xrlayers_api::Layer;
use xrlayers_api::LayerId;
use xrlayers_api::LayerType;
use xrlayers_api::Native;
use xrlayers_api::Platform;
use xrlayers_api::SurfaceType;
use xrlayers_api::Viewer;

/// A `DeviceDelegate` over any platform that speaks a native layer format.
pub struct LayerDevice<P, G>
where
    P: Platform,
    P::Layer: NativeLayer,
    G: Graphics,
{
    compositor: FrameCompositor<P, G>,
    clip_planes: ClipPlanes,
    reorient: Transform3D<f32, Native, Native>,
    frame: FrameState,
    in_frame: bool,
}

impl<P, G> LayerDevice<P, G>
where
    P: Platform,
    P::Layer: NativeLayer,
    G: Graphics,
{
    pub fn new(platform: P, graphics: G, config: CompositorConfig) -> Self {
        LayerDevice {
            compositor: FrameCompositor::new(platform, graphics, config),
            clip_planes: ClipPlanes::default(),
            reorient: Transform3D::identity(),
            frame: FrameState::default(),
            in_frame: false,
        }
    }

    pub fn start_session(&mut self) {
        self.compositor.start_session();
    }

    pub fn end_session(&mut self) {
        self.in_frame = false;
        self.compositor.end_session();
    }

    pub fn requester(&self) -> LayerRequester {
        self.compositor.requester()
    }

    pub fn platform(&self) -> &P {
        self.compositor.platform()
    }

    pub fn platform_mut(&mut self) -> &mut P {
        self.compositor.platform_mut()
    }

    pub fn graphics(&self) -> &G {
        self.compositor.graphics()
    }

    pub fn compositor(&self) -> &FrameCompositor<P, G> {
        &self.compositor
    }

    pub fn compositor_mut(&mut self) -> &mut FrameCompositor<P, G> {
        &mut self.compositor
    }

    pub fn frame(&self) -> &FrameState {
        &self.frame
    }

    pub fn clip_planes(&self) -> ClipPlanes {
        self.clip_planes
    }

    fn layers_enabled(&self) -> bool {
        if !self.compositor.config().layers_enabled {
            debug!("Layers are disabled");
            return false;
        }
        true
    }

    fn create_from(&mut self, moved: LayerId, layer_type: LayerType) -> Option<LayerId> {
        if !self.layers_enabled() {
            return None;
        }
        let old = self.compositor.layer(moved)?;
        let size = old.size();
        let surface_type = old.surface_type().unwrap_or(SurfaceType::Fbo);
        let layer = match layer_type {
            LayerType::Cylinder => Layer::cylinder(size.width, size.height, surface_type),
            _ => Layer::quad(size.width, size.height, surface_type),
        };
        self.compositor.move_layer(moved, layer)
    }
}

impl<P, G> DeviceDelegate for LayerDevice<P, G>
where
    P: Platform,
    P::Layer: NativeLayer,
    G: Graphics,
{
    fn start_frame(&mut self) -> bool {
        if !self.compositor.has_session() {
            warn!("start_frame with no session");
            return false;
        }
        let frame = match self.compositor.platform_mut().begin_frame() {
            Ok(frame) => frame,
            Err(e) => {
                warn!("The runtime refused a frame: {}", e);
                self.in_frame = false;
                return false;
            }
        };
        self.compositor.process_requests(frame.frame_index);
        self.compositor.set_views(&frame);
        self.frame = frame;
        self.in_frame = true;
        self.frame.should_render
    }

    fn bind_eye(&mut self, eye: Eye) {
        self.compositor.bind_eye(eye, self.frame.frame_index);
    }

    fn end_frame(&mut self, mode: FrameEndMode) {
        let frame = if self.in_frame { Some(&self.frame) } else { None };
        self.compositor.end_frame(
            frame,
            self.clip_planes,
            &self.reorient,
            mode == FrameEndMode::Discard,
        );
        self.in_frame = false;
    }

    fn head_transform(&self) -> RigidTransform3D<f32, Viewer, Native> {
        self.frame.head
    }

    fn eye_transform(&self, eye: Eye) -> RigidTransform3D<f32, EyeSpace, Viewer> {
        self.frame.eyes[eye.index()]
            .pose
            .then(&self.frame.head.inverse())
    }

    fn eye_projection(&self, eye: Eye) -> Transform3D<f32, EyeSpace, Display> {
        utils::fov_to_projection_matrix(&self.frame.eyes[eye.index()].fov, self.clip_planes)
    }

    fn update_clip_planes(&mut self, near: f32, far: f32) {
        self.clip_planes.update(near, far);
    }

    fn set_reorient_transform(&mut self, transform: Transform3D<f32, Native, Native>) {
        self.reorient = transform;
    }

    fn create_layer_quad(&mut self, width: i32, height: i32, surface_type: SurfaceType) -> Option<LayerId> {
        if !self.layers_enabled() {
            return None;
        }
        Some(self.compositor.add_layer(Layer::quad(width, height, surface_type)))
    }

    fn create_layer_quad_from(&mut self, moved: LayerId) -> Option<LayerId> {
        self.create_from(moved, LayerType::Quad)
    }

    fn create_layer_cylinder(
        &mut self,
        width: i32,
        height: i32,
        surface_type: SurfaceType,
    ) -> Option<LayerId> {
        if !self.layers_enabled() {
            return None;
        }
        Some(self.compositor.add_layer(Layer::cylinder(width, height, surface_type)))
    }

    fn create_layer_cylinder_from(&mut self, moved: LayerId) -> Option<LayerId> {
        self.create_from(moved, LayerType::Cylinder)
    }

    fn create_layer_projection(
        &mut self,
        width: i32,
        height: i32,
        surface_type: SurfaceType,
    ) -> Option<LayerId> {
        if !self.layers_enabled() {
            return None;
        }
        Some(self.compositor.add_layer(Layer::projection(width, height, surface_type)))
    }

    fn create_layer_cube(&mut self, width: i32, height: i32, format: u32) -> Option<LayerId> {
        if !self.layers_enabled() {
            return None;
        }
        Some(self.compositor.set_cube(Layer::cube(width, height, format)))
    }

    fn create_layer_equirect(&mut self, source: LayerId) -> Option<LayerId> {
        if !self.layers_enabled() {
            return None;
        }
        if self.compositor.layer(source).is_none() {
            warn!("Equirect source {:?} does not exist", source);
            return None;
        }
        Some(self.compositor.set_equirect(Layer::equirect(source)))
    }

    fn delete_layer(&mut self, layer: LayerId) {
        self.compositor.delete_layer(layer);
    }

    fn layer(&self, layer: LayerId) -> Option<&Layer> {
        self.compositor.layer(layer)
    }

    fn layer_mut(&mut self, layer: LayerId) -> Option<&mut Layer> {
        self.compositor.layer_mut(layer)
    }

    fn bind_layer(&mut self, layer: LayerId, target: u32) {
        self.compositor.bind_layer(layer, target, self.frame.frame_index);
    }

    fn unbind_layer(&mut self, layer: LayerId) {
        self.compositor.unbind_layer(layer);
    }
}
