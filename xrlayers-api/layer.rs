/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use crate::full_texture_rect;
use crate::Color;
use crate::Eye;
use crate::EyeRect;
use crate::EyeSpace;
use crate::LayerSpace;
use crate::Native;
use crate::SurfaceChangedBuffer;
use crate::SurfaceChangedDelegate;
use crate::SurfaceChangedEvent;
use crate::SurfaceHandle;
use crate::Uv;
use crate::Viewport;

use euclid::Size2D;
use euclid::Transform3D;

use std::cmp::Ordering;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering as AtomicOrdering;

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

const GL_FRAMEBUFFER: u32 = 0x8D40;

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct LayerId(usize);

static NEXT_LAYER_ID: AtomicUsize = AtomicUsize::new(0);

// Shared by every layer so that requests order FIFO across the whole process.
static NEXT_DRAW_INDEX: AtomicU64 = AtomicU64::new(0);

impl LayerId {
    pub fn new() -> LayerId {
        LayerId(NEXT_LAYER_ID.fetch_add(1, AtomicOrdering::SeqCst))
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum LayerType {
    Projection,
    Quad,
    Cylinder,
    Cube,
    Equirect,
}

impl LayerType {
    /// Skybox-like layers that always sit behind everything else.
    pub fn is_background(self) -> bool {
        match self {
            LayerType::Cube | LayerType::Equirect => true,
            _ => false,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum SurfaceType {
    AndroidSurface,
    Fbo,
}

/// Layers whose content is rendered by the application into a surface
/// that the layer owns.
#[derive(Clone, Debug)]
pub struct SurfaceLayer {
    surface_type: SurfaceType,
    size: Size2D<i32, Viewport>,
    world_size: Size2D<f32, LayerSpace>,
    surface: Option<SurfaceHandle>,
    bound_target: u32,
}

impl SurfaceLayer {
    fn new(width: i32, height: i32, surface_type: SurfaceType) -> SurfaceLayer {
        SurfaceLayer {
            surface_type,
            size: Size2D::new(width, height),
            world_size: Size2D::zero(),
            surface: None,
            bound_target: GL_FRAMEBUFFER,
        }
    }
}

#[derive(Clone, Debug)]
pub struct CylinderLayer {
    surface: SurfaceLayer,
    radius: f32,
    uv_transform: [Transform3D<f32, Uv, Uv>; 2],
}

#[derive(Clone, Debug)]
pub struct CubeLayer {
    size: Size2D<i32, Viewport>,
    format: u32,
    loaded: bool,
    texture_handle: u32,
}

/// Equirect layers never own a swapchain, they show the swapchain of
/// their source layer.
#[derive(Clone, Debug)]
pub struct EquirectLayer {
    source: LayerId,
    uv_transform: [Transform3D<f32, Uv, Uv>; 2],
}

#[derive(Clone, Debug)]
pub enum LayerKind {
    Projection(SurfaceLayer),
    Quad(SurfaceLayer),
    Cylinder(CylinderLayer),
    Cube(CubeLayer),
    Equirect(EquirectLayer),
}

/// One unit of compositor submission, as the application sees it.
#[derive(Debug)]
pub struct Layer {
    id: LayerId,
    kind: LayerKind,
    name: String,
    initialized: bool,
    composited: bool,
    draw_requested: bool,
    draw_index: u64,
    draw_in_front: bool,
    priority: i32,
    model_transform: [Transform3D<f32, LayerSpace, Native>; 2],
    view: [Transform3D<f32, Native, EyeSpace>; 2],
    current_eye: Eye,
    clear_color: Color,
    tint_color: Color,
    texture_rect: [EyeRect; 2],
    same_layer_for_both_eyes: bool,
    pending_resize: bool,
    surface_changed: SurfaceChangedBuffer,
}

impl Layer {
    fn new(kind: LayerKind) -> Layer {
        Layer {
            id: LayerId::new(),
            kind,
            name: String::new(),
            initialized: false,
            composited: false,
            draw_requested: false,
            draw_index: 0,
            draw_in_front: false,
            priority: 0,
            model_transform: [Transform3D::identity(); 2],
            view: [Transform3D::identity(); 2],
            current_eye: Eye::Left,
            clear_color: Color::TRANSPARENT,
            tint_color: Color::WHITE,
            texture_rect: [full_texture_rect(); 2],
            same_layer_for_both_eyes: true,
            pending_resize: false,
            surface_changed: SurfaceChangedBuffer::default(),
        }
    }

    pub fn quad(width: i32, height: i32, surface_type: SurfaceType) -> Layer {
        Layer::new(LayerKind::Quad(SurfaceLayer::new(width, height, surface_type)))
    }

    pub fn cylinder(width: i32, height: i32, surface_type: SurfaceType) -> Layer {
        Layer::new(LayerKind::Cylinder(CylinderLayer {
            surface: SurfaceLayer::new(width, height, surface_type),
            radius: 1.,
            uv_transform: [Transform3D::identity(); 2],
        }))
    }

    pub fn projection(width: i32, height: i32, surface_type: SurfaceType) -> Layer {
        Layer::new(LayerKind::Projection(SurfaceLayer::new(
            width,
            height,
            surface_type,
        )))
    }

    pub fn cube(width: i32, height: i32, format: u32) -> Layer {
        Layer::new(LayerKind::Cube(CubeLayer {
            size: Size2D::new(width, height),
            format,
            loaded: false,
            texture_handle: 0,
        }))
    }

    pub fn equirect(source: LayerId) -> Layer {
        Layer::new(LayerKind::Equirect(EquirectLayer {
            source,
            uv_transform: [Transform3D::identity(); 2],
        }))
    }

    pub fn id(&self) -> LayerId {
        self.id
    }

    pub fn kind(&self) -> &LayerKind {
        &self.kind
    }

    pub fn layer_type(&self) -> LayerType {
        match self.kind {
            LayerKind::Projection(_) => LayerType::Projection,
            LayerKind::Quad(_) => LayerType::Quad,
            LayerKind::Cylinder(_) => LayerType::Cylinder,
            LayerKind::Cube(_) => LayerType::Cube,
            LayerKind::Equirect(_) => LayerType::Equirect,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn set_initialized(&mut self, initialized: bool) {
        self.initialized = initialized;
    }

    /// True once the platform has shown the current surface at least once.
    pub fn is_composited(&self) -> bool {
        self.composited
    }

    pub fn set_composited(&mut self, composited: bool) {
        self.composited = composited;
    }

    /// The raw request flag. Whether the layer is actually drawn also
    /// depends on its surface, which the compositor decides.
    pub fn is_draw_requested(&self) -> bool {
        self.draw_requested
    }

    /// Ask for this layer to be drawn in the next frame. Only the first
    /// request after a clear takes a new position in the FIFO.
    pub fn request_draw(&mut self) {
        if !self.draw_requested {
            self.draw_index = NEXT_DRAW_INDEX.fetch_add(1, AtomicOrdering::SeqCst) + 1;
        }
        self.draw_requested = true;
    }

    pub fn clear_request_draw(&mut self) {
        self.draw_requested = false;
    }

    pub fn draw_index(&self) -> u64 {
        self.draw_index
    }

    pub fn should_draw_before(&self, other: &Layer) -> bool {
        if self.layer_type().is_background() {
            return true;
        }
        if other.layer_type().is_background() {
            return false;
        }
        if self.priority != other.priority {
            return self.priority > other.priority;
        }
        self.draw_index < other.draw_index
    }

    /// `should_draw_before` as an `Ordering`, for sorting.
    pub fn draw_order(&self, other: &Layer) -> Ordering {
        match (self.should_draw_before(other), other.should_draw_before(self)) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => Ordering::Equal,
        }
    }

    pub fn draw_in_front(&self) -> bool {
        self.draw_in_front
    }

    pub fn set_draw_in_front(&mut self, draw_in_front: bool) {
        self.draw_in_front = draw_in_front;
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn set_priority(&mut self, priority: i32) {
        self.priority = priority;
    }

    pub fn model_transform(&self, eye: Eye) -> &Transform3D<f32, LayerSpace, Native> {
        &self.model_transform[eye.index()]
    }

    pub fn set_model_transform(&mut self, eye: Eye, transform: Transform3D<f32, LayerSpace, Native>) {
        self.model_transform[eye.index()] = transform;
    }

    pub fn view(&self, eye: Eye) -> &Transform3D<f32, Native, EyeSpace> {
        &self.view[eye.index()]
    }

    pub fn set_view(&mut self, eye: Eye, view: Transform3D<f32, Native, EyeSpace>) {
        self.view[eye.index()] = view;
    }

    pub fn current_eye(&self) -> Eye {
        self.current_eye
    }

    pub fn set_current_eye(&mut self, eye: Eye) {
        self.current_eye = eye;
    }

    pub fn clear_color(&self) -> Color {
        self.clear_color
    }

    pub fn set_clear_color(&mut self, color: Color) {
        self.clear_color = color;
    }

    pub fn tint_color(&self) -> Color {
        self.tint_color
    }

    pub fn set_tint_color(&mut self, color: Color) {
        self.tint_color = color;
    }

    pub fn texture_rect(&self, eye: Eye) -> &EyeRect {
        &self.texture_rect[eye.index()]
    }

    pub fn set_texture_rect(&mut self, eye: Eye, rect: EyeRect) {
        self.texture_rect[eye.index()] = rect;
    }

    pub fn same_layer_for_both_eyes(&self) -> bool {
        self.same_layer_for_both_eyes
    }

    pub fn set_same_layer_for_both_eyes(&mut self, same: bool) {
        self.same_layer_for_both_eyes = same;
    }

    fn surface_layer(&self) -> Option<&SurfaceLayer> {
        match self.kind {
            LayerKind::Projection(ref s) | LayerKind::Quad(ref s) => Some(s),
            LayerKind::Cylinder(ref c) => Some(&c.surface),
            _ => None,
        }
    }

    fn surface_layer_mut(&mut self) -> Option<&mut SurfaceLayer> {
        match self.kind {
            LayerKind::Projection(ref mut s) | LayerKind::Quad(ref mut s) => Some(s),
            LayerKind::Cylinder(ref mut c) => Some(&mut c.surface),
            _ => None,
        }
    }

    /// `None` for layers that do not render into their own surface.
    pub fn surface_type(&self) -> Option<SurfaceType> {
        self.surface_layer().map(|s| s.surface_type)
    }

    /// Pixel size of the backing surface. Zero for equirect layers.
    pub fn size(&self) -> Size2D<i32, Viewport> {
        match self.kind {
            LayerKind::Cube(ref cube) => cube.size,
            LayerKind::Equirect(_) => Size2D::zero(),
            _ => self.surface_layer().map_or(Size2D::zero(), |s| s.size),
        }
    }

    pub fn world_size(&self) -> Size2D<f32, LayerSpace> {
        self.surface_layer().map_or(Size2D::zero(), |s| s.world_size)
    }

    pub fn set_world_size(&mut self, width: f32, height: f32) {
        if let Some(s) = self.surface_layer_mut() {
            s.world_size = Size2D::new(width, height);
        }
    }

    pub fn surface(&self) -> Option<SurfaceHandle> {
        self.surface_layer().and_then(|s| s.surface)
    }

    pub fn set_surface(&mut self, surface: Option<SurfaceHandle>) {
        if let Some(s) = self.surface_layer_mut() {
            s.surface = surface;
        }
    }

    pub fn bound_target(&self) -> u32 {
        self.surface_layer().map_or(GL_FRAMEBUFFER, |s| s.bound_target)
    }

    pub fn set_bound_target(&mut self, target: u32) {
        if let Some(s) = self.surface_layer_mut() {
            s.bound_target = target;
        }
    }

    /// Change the surface size. The new surface is allocated on the render
    /// thread at the start of the next frame.
    pub fn resize(&mut self, width: i32, height: i32) {
        let size = Size2D::new(width, height);
        let changed = match self.surface_layer_mut() {
            Some(s) if s.size != size => {
                s.size = size;
                true
            }
            _ => false,
        };
        self.pending_resize |= changed;
    }

    pub fn take_pending_resize(&mut self) -> bool {
        std::mem::replace(&mut self.pending_resize, false)
    }

    pub fn radius(&self) -> f32 {
        match self.kind {
            LayerKind::Cylinder(ref c) => c.radius,
            _ => 0.,
        }
    }

    pub fn set_radius(&mut self, radius: f32) {
        if let LayerKind::Cylinder(ref mut c) = self.kind {
            c.radius = radius;
        }
    }

    pub fn uv_transform(&self, eye: Eye) -> Transform3D<f32, Uv, Uv> {
        match self.kind {
            LayerKind::Cylinder(ref c) => c.uv_transform[eye.index()],
            LayerKind::Equirect(ref e) => e.uv_transform[eye.index()],
            _ => Transform3D::identity(),
        }
    }

    pub fn set_uv_transform(&mut self, eye: Eye, transform: Transform3D<f32, Uv, Uv>) {
        match self.kind {
            LayerKind::Cylinder(ref mut c) => c.uv_transform[eye.index()] = transform,
            LayerKind::Equirect(ref mut e) => e.uv_transform[eye.index()] = transform,
            _ => log::warn!("{:?} layers have no UV transform", self.layer_type()),
        }
    }

    pub fn is_loaded(&self) -> bool {
        match self.kind {
            LayerKind::Cube(ref cube) => cube.loaded,
            _ => true,
        }
    }

    pub fn set_loaded(&mut self, loaded: bool) {
        if let LayerKind::Cube(ref mut cube) = self.kind {
            cube.loaded = loaded;
        }
    }

    pub fn texture_handle(&self) -> u32 {
        match self.kind {
            LayerKind::Cube(ref cube) => cube.texture_handle,
            _ => 0,
        }
    }

    pub fn set_texture_handle(&mut self, handle: u32) {
        if let LayerKind::Cube(ref mut cube) = self.kind {
            cube.texture_handle = handle;
        }
    }

    pub fn format(&self) -> Option<u32> {
        match self.kind {
            LayerKind::Cube(ref cube) => Some(cube.format),
            _ => None,
        }
    }

    /// The layer whose swapchain an equirect layer shows.
    pub fn source(&self) -> Option<LayerId> {
        match self.kind {
            LayerKind::Equirect(ref e) => Some(e.source),
            _ => None,
        }
    }

    /// Attach the surface delegate. A creation that happened before this
    /// call is delivered immediately.
    pub fn set_surface_changed_delegate(&mut self, delegate: Box<dyn SurfaceChangedDelegate>) {
        self.surface_changed.upgrade(delegate);
    }

    pub fn notify_surface_changed(&mut self, event: SurfaceChangedEvent) {
        self.surface_changed.notify(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use euclid::{Point2D, Rect};

    #[test]
    fn defaults() {
        let layer = Layer::quad(256, 256, SurfaceType::Fbo);
        assert_eq!(layer.tint_color(), Color::WHITE);
        assert_eq!(layer.clear_color(), Color::TRANSPARENT);
        assert_eq!(*layer.texture_rect(Eye::Left), full_texture_rect());
        assert_eq!(*layer.texture_rect(Eye::Right), full_texture_rect());
        assert!(!layer.is_draw_requested());
        assert!(layer.same_layer_for_both_eyes());
        assert_eq!(layer.surface_type(), Some(SurfaceType::Fbo));
    }

    #[test]
    fn request_draw_stamps_once() {
        let mut layer = Layer::quad(1, 1, SurfaceType::Fbo);
        layer.request_draw();
        let first = layer.draw_index();
        layer.request_draw();
        assert_eq!(layer.draw_index(), first);
        layer.clear_request_draw();
        layer.request_draw();
        assert!(layer.draw_index() > first);
    }

    #[test]
    fn backgrounds_sort_first() {
        let mut quad = Layer::quad(1, 1, SurfaceType::Fbo);
        quad.set_priority(100);
        let cube = Layer::cube(1, 1, 0);
        let equirect = Layer::equirect(quad.id());
        assert!(cube.should_draw_before(&quad));
        assert!(!quad.should_draw_before(&cube));
        assert!(equirect.should_draw_before(&quad));
        assert_eq!(quad.draw_order(&equirect), Ordering::Greater);
    }

    #[test]
    fn higher_priority_first_then_fifo() {
        let mut a = Layer::quad(1, 1, SurfaceType::Fbo);
        let mut b = Layer::quad(1, 1, SurfaceType::Fbo);
        a.request_draw();
        b.request_draw();
        assert_eq!(a.draw_order(&b), Ordering::Less);
        b.set_priority(1);
        assert_eq!(a.draw_order(&b), Ordering::Greater);
    }

    #[test]
    fn resize_flags_only_on_change() {
        let mut layer = Layer::cylinder(10, 10, SurfaceType::AndroidSurface);
        layer.resize(10, 10);
        assert!(!layer.take_pending_resize());
        layer.resize(20, 10);
        assert_eq!(layer.size(), Size2D::new(20, 10));
        assert!(layer.take_pending_resize());
        assert!(!layer.take_pending_resize());
    }

    #[test]
    fn transforms_read_back_unchanged() {
        let mut layer = Layer::quad(1, 1, SurfaceType::Fbo);
        let t = Transform3D::translation(0.25, -1.5, -3.);
        let rect = Rect::new(Point2D::new(0.5, 0.), Size2D::new(0.5, 1.));
        layer.set_model_transform(Eye::Right, t);
        layer.set_texture_rect(Eye::Right, rect);
        assert_eq!(*layer.model_transform(Eye::Right), t);
        assert_eq!(*layer.texture_rect(Eye::Right), rect);
        assert_eq!(*layer.model_transform(Eye::Left), Transform3D::identity());
    }
}
