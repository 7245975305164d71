/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use crate::adapter::LayerAdapter;
use crate::adapter::TargetRegistry;
use crate::native::EyeBuffers;
use crate::native::LayerUpdate;
use crate::native::NativeLayer;
use crate::CompositorConfig;
use crate::RenderContext;
use crate::SwapChain;

use crossbeam_channel::{unbounded, Receiver, Sender};

use euclid::Rect;
use euclid::Size2D;
use euclid::Transform3D;

use log::{debug, error, warn};

use sparkle::gl;

use std::cmp;

use xrlayers_api::util::ClipPlanes;
use xrlayers_api::Color;
use xrlayers_api::CompositeNotice;
use xrlayers_api::Eye;
use xrlayers_api::FrameState;
use xrlayers_api::FrameSubmission;
use xrlayers_api::Graphics;
use xrlayers_api::Layer;
use xrlayers_api::LayerId;
use xrlayers_api::LayerType;
use xrlayers_api::Native;
use xrlayers_api::Platform;
use xrlayers_api::SwapChainId;
use xrlayers_api::SwapChainInfo;

/// Work posted from other threads, picked up at the start of the next frame.
#[derive(Clone, Debug)]
pub enum LayerRequest {
    Resize { layer: LayerId, width: i32, height: i32 },
    SurfaceComposited(CompositeNotice),
    /// Acquire and release a surface that produced nothing this frame.
    DrainSurface(LayerId),
}

/// A handle for posting `LayerRequest`s to the render thread.
#[derive(Clone)]
pub struct LayerRequester {
    sender: Sender<LayerRequest>,
}

impl LayerRequester {
    pub fn resize(&self, layer: LayerId, width: i32, height: i32) {
        self.send(LayerRequest::Resize { layer, width, height });
    }

    pub fn surface_composited(&self, notice: CompositeNotice) {
        self.send(LayerRequest::SurfaceComposited(notice));
    }

    pub fn drain_surface(&self, layer: LayerId) {
        self.send(LayerRequest::DrainSurface(layer));
    }

    fn send(&self, request: LayerRequest) {
        if self.sender.send(request).is_err() {
            warn!("Compositor is gone, dropping layer request");
        }
    }
}

/// Every swapchain the compositor knows about.
#[derive(Default)]
struct LayerSet {
    eyes: [Option<SwapChain>; 2],
    clear: Option<SwapChain>,
    ui: Vec<LayerAdapter>,
    cube: Option<LayerAdapter>,
    equirect: Option<LayerAdapter>,
}

impl LayerSet {
    fn adapters(&self) -> impl Iterator<Item = &LayerAdapter> {
        self.ui.iter().chain(self.cube.iter()).chain(self.equirect.iter())
    }

    fn adapters_mut(&mut self) -> impl Iterator<Item = &mut LayerAdapter> {
        self.ui
            .iter_mut()
            .chain(self.cube.iter_mut())
            .chain(self.equirect.iter_mut())
    }

    fn adapter(&self, id: LayerId) -> Option<&LayerAdapter> {
        self.adapters().find(|adapter| adapter.id() == id)
    }

    fn adapter_mut(&mut self, id: LayerId) -> Option<&mut LayerAdapter> {
        self.adapters_mut().find(|adapter| adapter.id() == id)
    }

    fn ui_mut(&mut self, id: LayerId) -> Option<&mut LayerAdapter> {
        self.ui.iter_mut().find(|adapter| adapter.id() == id)
    }

    fn swapchain_mut(&mut self, id: SwapChainId) -> Option<&mut SwapChain> {
        let LayerSet {
            ref mut eyes,
            ref mut clear,
            ref mut ui,
            ref mut cube,
            ref mut equirect,
        } = *self;
        if let Some(swapchain) = eyes
            .iter_mut()
            .chain(std::iter::once(clear))
            .flatten()
            .find(|swapchain| swapchain.id() == id)
        {
            return Some(swapchain);
        }
        ui.iter_mut()
            .chain(cube.iter_mut())
            .chain(equirect.iter_mut())
            .find_map(|adapter| adapter.swapchain_mut(id))
    }
}

/// Swapchains with an acquired image and the target each was bound to,
/// innermost last. Binding a layer while another is bound stacks it,
/// unbinding restores the one below.
#[derive(Debug, Default)]
struct BindStack {
    stack: Vec<(SwapChainId, u32)>,
}

impl BindStack {
    fn bound(&self) -> Option<SwapChainId> {
        self.stack.last().map(|&(id, _)| id)
    }

    fn contains(&self, id: SwapChainId) -> bool {
        self.stack.iter().any(|&(bound, _)| bound == id)
    }

    fn release_all(&mut self, layers: &mut LayerSet, ctx: &mut RenderContext) {
        while let Some((id, _)) = self.stack.pop() {
            match layers.swapchain_mut(id) {
                Some(swapchain) if swapchain.acquired_image().is_some() => swapchain.release_image(ctx),
                _ => debug!("Bound swapchain {:?} is already gone", id),
            }
        }
    }

    fn forget_missing(&mut self, layers: &mut LayerSet) {
        self.stack.retain(|&(id, _)| layers.swapchain_mut(id).is_some());
    }
}

/// Per-frame assembly of the native layer list.
struct FrameBuilder<'a, L> {
    headers: Vec<L>,
    cap: usize,
    /// Slots held back for the main projection.
    reserved: usize,
    frame: &'a FrameState,
    reorient: &'a Transform3D<f32, Native, Native>,
    force_clip: bool,
    clear: Option<&'a SwapChain>,
}

impl<'a, L: NativeLayer> FrameBuilder<'a, L> {
    fn swapchains<'b>(
        &self,
        adapter: &'b LayerAdapter,
        source: Option<&'b LayerAdapter>,
    ) -> Option<([&'b SwapChain; 2], bool)>
    where
        'a: 'b,
    {
        if adapter.uses_placeholder() {
            let clear = self.clear.filter(|clear| clear.is_ready())?;
            return Some(([clear, clear], true));
        }
        let owner = match adapter.layer().layer_type() {
            LayerType::Equirect => source?,
            _ => adapter,
        };
        let left = owner.submit_swapchain(Eye::Left).filter(|s| s.is_ready())?;
        let right = owner.submit_swapchain(Eye::Right).filter(|s| s.is_ready())?;
        Some(([left, right], false))
    }

    /// Encode `adapter` if all of its headers fit under the cap.
    fn append(&mut self, adapter: &LayerAdapter, source: Option<&LayerAdapter>) -> bool {
        let count = L::header_count(adapter.layer());
        if self.headers.len() + count + self.reserved > self.cap {
            debug!("Layer cap {} reached, skipping {:?}", self.cap, adapter.id());
            return false;
        }
        let (swapchains, placeholder) = match self.swapchains(adapter, source) {
            Some(found) => found,
            None => return false,
        };
        let update = LayerUpdate {
            layer: adapter.layer(),
            swapchains,
            placeholder,
            frame: self.frame,
            reorient: self.reorient,
            force_clip: self.force_clip,
        };
        L::encode(&update, &mut self.headers);
        true
    }
}

/// Orders and submits every layer each frame, and owns the eye buffers.
pub struct FrameCompositor<P, G>
where
    P: Platform,
    P::Layer: NativeLayer,
    G: Graphics,
{
    platform: P,
    graphics: G,
    config: CompositorConfig,
    session: bool,
    layers: LayerSet,
    targets: TargetRegistry,
    binding: BindStack,
    requests: Receiver<LayerRequest>,
    requester: LayerRequester,
}

impl<P, G> FrameCompositor<P, G>
where
    P: Platform,
    P::Layer: NativeLayer,
    G: Graphics,
{
    pub fn new(platform: P, graphics: G, config: CompositorConfig) -> Self {
        let (sender, requests) = unbounded();
        FrameCompositor {
            platform,
            graphics,
            config,
            session: false,
            layers: LayerSet::default(),
            targets: TargetRegistry::new(),
            binding: BindStack::default(),
            requests,
            requester: LayerRequester { sender },
        }
    }

    pub fn requester(&self) -> LayerRequester {
        self.requester.clone()
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    pub fn graphics(&self) -> &G {
        &self.graphics
    }

    pub fn config(&self) -> &CompositorConfig {
        &self.config
    }

    pub fn has_session(&self) -> bool {
        self.session
    }

    /// Allocate the eye buffers and every layer's surface.
    pub fn start_session(&mut self) {
        if self.session {
            return;
        }
        let size = self.platform.recommended_eye_size();
        let config = &self.config;
        let mut ctx = RenderContext {
            provider: &mut self.platform,
            graphics: &self.graphics,
        };
        let info = SwapChainInfo::fbo(size, config.color_format, config.eye_buffer_count)
            .with_samples(config.eye_samples, true);
        for eye in self.layers.eyes.iter_mut() {
            *eye = Some(SwapChain::create_fbo_with_info(
                &mut ctx,
                info.clone(),
                config.clear_color,
            ));
        }
        self.layers.clear = Some(SwapChain::create_fbo(
            &mut ctx,
            Size2D::new(1, 1),
            config.color_format,
            1,
            Color::WHITE,
        ));
        for adapter in self.layers.adapters_mut() {
            adapter.init(&mut ctx, config, &mut self.targets);
        }
        self.session = true;
        debug!("Session started with {}x{} eye buffers", size.width, size.height);
    }

    /// Release every native resource. Layers stay registered and are
    /// allocated again by the next `start_session`.
    pub fn end_session(&mut self) {
        let mut ctx = RenderContext {
            provider: &mut self.platform,
            graphics: &self.graphics,
        };
        self.binding.release_all(&mut self.layers, &mut ctx);
        for adapter in self.layers.adapters_mut() {
            adapter.destroy(&mut ctx, &mut self.targets);
        }
        let LayerSet {
            ref mut eyes,
            ref mut clear,
            ..
        } = self.layers;
        for swapchain in eyes.iter_mut().chain(std::iter::once(clear)) {
            if let Some(mut swapchain) = swapchain.take() {
                swapchain.destroy(&mut ctx);
            }
        }
        self.session = false;
    }

    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.adapter(id).map(LayerAdapter::layer)
    }

    pub fn layer_mut(&mut self, id: LayerId) -> Option<&mut Layer> {
        self.layers.adapter_mut(id).map(LayerAdapter::layer_mut)
    }

    pub fn eye_swapchain(&self, eye: Eye) -> Option<&SwapChain> {
        self.layers.eyes[eye.index()].as_ref()
    }

    /// The swapchain the compositor currently shows for `layer`.
    pub fn layer_swapchain(&self, layer: LayerId, eye: Eye) -> Option<&SwapChain> {
        self.layers
            .adapter(layer)
            .and_then(|adapter| adapter.submit_swapchain(eye))
    }

    /// The swapchain bound when the application renders into `layer`.
    pub fn layer_render_swapchain(&mut self, layer: LayerId) -> Option<&SwapChain> {
        self.layers
            .ui_mut(layer)
            .and_then(|adapter| adapter.bind_swapchain_mut())
            .map(|swapchain| &*swapchain)
    }

    pub fn bound_swapchain(&self) -> Option<SwapChainId> {
        self.binding.bound()
    }

    fn init_adapter(&mut self, adapter: &mut LayerAdapter) {
        if !self.session {
            return;
        }
        let mut ctx = RenderContext {
            provider: &mut self.platform,
            graphics: &self.graphics,
        };
        adapter.init(&mut ctx, &self.config, &mut self.targets);
    }

    fn destroy_adapter(&mut self, mut adapter: LayerAdapter) {
        let mut ctx = RenderContext {
            provider: &mut self.platform,
            graphics: &self.graphics,
        };
        adapter.destroy(&mut ctx, &mut self.targets);
        self.binding.forget_missing(&mut self.layers);
    }

    /// Register a quad, cylinder or projection layer.
    pub fn add_layer(&mut self, layer: Layer) -> LayerId {
        let mut adapter = LayerAdapter::new(layer);
        self.init_adapter(&mut adapter);
        let id = adapter.id();
        self.layers.ui.push(adapter);
        id
    }

    /// Replace the cube layer.
    pub fn set_cube(&mut self, layer: Layer) -> LayerId {
        if let Some(previous) = self.layers.cube.take() {
            self.destroy_adapter(previous);
        }
        let mut adapter = LayerAdapter::new(layer);
        self.init_adapter(&mut adapter);
        let id = adapter.id();
        self.layers.cube = Some(adapter);
        id
    }

    /// Replace the equirect layer.
    pub fn set_equirect(&mut self, layer: Layer) -> LayerId {
        if let Some(previous) = self.layers.equirect.take() {
            self.destroy_adapter(previous);
        }
        let mut adapter = LayerAdapter::new(layer);
        self.init_adapter(&mut adapter);
        let id = adapter.id();
        self.layers.equirect = Some(adapter);
        id
    }

    fn remove_adapter(&mut self, id: LayerId) -> Option<LayerAdapter> {
        if self.layers.cube.as_ref().map(LayerAdapter::id) == Some(id) {
            return self.layers.cube.take();
        }
        if self.layers.equirect.as_ref().map(LayerAdapter::id) == Some(id) {
            return self.layers.equirect.take();
        }
        let index = self.layers.ui.iter().position(|adapter| adapter.id() == id)?;
        Some(self.layers.ui.remove(index))
    }

    pub fn delete_layer(&mut self, id: LayerId) {
        match self.remove_adapter(id) {
            Some(adapter) => self.destroy_adapter(adapter),
            None => warn!("Deleting unknown layer {:?}", id),
        }
    }

    /// Replace `moved` with `layer`, handing over its surface untouched.
    pub fn move_layer(&mut self, moved: LayerId, layer: Layer) -> Option<LayerId> {
        if self.layers.ui.iter().all(|adapter| adapter.id() != moved) {
            warn!("Cannot move unknown layer {:?}", moved);
            return None;
        }
        let mut old = self.remove_adapter(moved)?;
        let mut adapter = LayerAdapter::new(layer);
        adapter.take_surface(&mut old, &mut self.targets);
        self.destroy_adapter(old);
        self.init_adapter(&mut adapter);
        let id = adapter.id();
        self.layers.ui.push(adapter);
        Some(id)
    }

    /// Route a composite notice to whichever layer owns its target now.
    pub fn surface_composited(&mut self, notice: CompositeNotice) {
        let id = match self.targets.get(&notice.target) {
            Some(&id) => id,
            None => return warn!("Composite notice for a dropped target {:?}", notice.target),
        };
        let mut ctx = RenderContext {
            provider: &mut self.platform,
            graphics: &self.graphics,
        };
        match self.layers.adapter_mut(id) {
            Some(adapter) => {
                adapter.handle_composited(&mut ctx, notice.generation);
            }
            None => warn!("Composite notice for unknown layer {:?}", id),
        }
        self.binding.forget_missing(&mut self.layers);
    }

    /// Apply everything posted through the requester, then any resize
    /// requested directly on a layer.
    pub fn process_requests(&mut self, frame_index: u64) {
        while let Ok(request) = self.requests.try_recv() {
            match request {
                LayerRequest::Resize {
                    layer,
                    width,
                    height,
                } => match self.layers.ui_mut(layer) {
                    Some(adapter) => adapter.layer_mut().resize(width, height),
                    None => warn!("Resize of unknown layer {:?}", layer),
                },
                LayerRequest::SurfaceComposited(notice) => self.surface_composited(notice),
                LayerRequest::DrainSurface(layer) => {
                    let mut ctx = RenderContext {
                        provider: &mut self.platform,
                        graphics: &self.graphics,
                    };
                    match self.layers.ui_mut(layer) {
                        Some(adapter) => adapter.drain(&mut ctx, frame_index),
                        None => warn!("Drain of unknown layer {:?}", layer),
                    }
                }
            }
        }

        if !self.session {
            return;
        }
        let mut ctx = RenderContext {
            provider: &mut self.platform,
            graphics: &self.graphics,
        };
        for adapter in self.layers.ui.iter_mut() {
            if adapter.layer_mut().take_pending_resize() {
                adapter.resize(&mut ctx, &self.config, &mut self.targets);
            }
        }
    }

    /// Copy this frame's eye views into every layer.
    pub fn set_views(&mut self, frame: &FrameState) {
        for adapter in self.layers.adapters_mut() {
            for &eye in Eye::ALL.iter() {
                let view = frame.eyes[eye.index()].pose.inverse().to_transform();
                adapter.layer_mut().set_view(eye, view);
            }
        }
    }

    pub fn bind_eye(&mut self, eye: Eye, frame_index: u64) {
        if !self.session {
            return error!("bind_eye({:?}) with no session", eye);
        }
        let mut ctx = RenderContext {
            provider: &mut self.platform,
            graphics: &self.graphics,
        };
        self.binding.release_all(&mut self.layers, &mut ctx);

        let swapchain = match self.layers.eyes[eye.index()].as_mut() {
            Some(swapchain) if swapchain.is_ready() => swapchain,
            _ => return error!("No eye buffer for {:?}", eye),
        };
        if let Err(e) = swapchain.acquire_image(&mut ctx, frame_index) {
            return error!("Failed to acquire eye buffer {:?}: {}", eye, e);
        }
        if let Err(e) = swapchain.bind_fbo(ctx.graphics, gl::FRAMEBUFFER) {
            error!("Failed to bind eye buffer {:?}: {}", eye, e);
            return swapchain.release_image(&mut ctx);
        }
        self.binding.stack.push((swapchain.id(), gl::FRAMEBUFFER));
        self.graphics.viewport(Rect::from_size(swapchain.size()));
        self.graphics.clear(self.config.clear_color);

        for adapter in self.layers.adapters_mut() {
            adapter.layer_mut().set_current_eye(eye);
        }
    }

    pub fn bind_layer(&mut self, id: LayerId, target: u32, frame_index: u64) {
        if !self.session {
            return error!("bind_layer({:?}) with no session", id);
        }
        let adapter = match self.layers.ui_mut(id) {
            Some(adapter) => adapter,
            None => return warn!("Binding unknown layer {:?}", id),
        };
        adapter.layer_mut().set_bound_target(target);
        let projection = adapter.layer().layer_type() == LayerType::Projection;
        let swapchain = match adapter.bind_swapchain_mut() {
            Some(swapchain) if swapchain.is_ready() => swapchain,
            _ => return warn!("Layer {:?} has no surface to bind", id),
        };
        let swapchain_id = swapchain.id();
        if self.binding.bound() == Some(swapchain_id) {
            return;
        }
        if self.binding.contains(swapchain_id) {
            return warn!("Layer {:?} is already bound further down", id);
        }
        let mut ctx = RenderContext {
            provider: &mut self.platform,
            graphics: &self.graphics,
        };
        if let Err(e) = swapchain.acquire_image(&mut ctx, frame_index) {
            return error!("Failed to acquire image for {:?}: {}", id, e);
        }
        if let Err(e) = swapchain.bind_fbo(ctx.graphics, target) {
            error!("Failed to bind {:?}: {}", id, e);
            return swapchain.release_image(&mut ctx);
        }
        self.binding.stack.push((swapchain_id, target));
        if projection {
            // Projection content is rendered in place, there is nothing to wait for.
            adapter.layer_mut().set_composited(true);
        }
    }

    pub fn unbind_layer(&mut self, id: LayerId) {
        let adapter = match self.layers.ui_mut(id) {
            Some(adapter) => adapter,
            None => return warn!("Unbinding unknown layer {:?}", id),
        };
        let target = adapter.layer().bound_target();
        let swapchain = match adapter.bind_swapchain_mut() {
            Some(swapchain) => swapchain,
            None => return,
        };
        if self.binding.bound() != Some(swapchain.id()) {
            return warn!("Unbinding {:?}, which is not the bound layer", id);
        }
        let mut ctx = RenderContext {
            provider: &mut self.platform,
            graphics: &self.graphics,
        };
        self.binding.stack.pop();
        swapchain.release_image(&mut ctx);

        let (restored, restored_target) = match self.binding.stack.last() {
            Some(&(previous, previous_target)) => (self.layers.swapchain_mut(previous), previous_target),
            None => (None, target),
        };
        match restored {
            Some(previous) => {
                if let Err(e) = previous.bind_fbo(&self.graphics, restored_target) {
                    error!("Failed to restore {:?}: {}", previous.id(), e);
                }
            }
            None => self.graphics.bind_framebuffer(target, 0),
        }
    }

    /// Release what is bound, then build and submit the frame's layers:
    /// backgrounds, layers behind the scene, the eye buffers, layers in front.
    pub fn end_frame(
        &mut self,
        frame: Option<&FrameState>,
        clip_planes: ClipPlanes,
        reorient: &Transform3D<f32, Native, Native>,
        discard: bool,
    ) {
        {
            let mut ctx = RenderContext {
                provider: &mut self.platform,
                graphics: &self.graphics,
            };
            self.binding.release_all(&mut self.layers, &mut ctx);
        }
        if discard {
            return debug!("Discarding frame");
        }
        if !self.session {
            return error!("end_frame with no session");
        }
        let frame = match frame {
            Some(frame) => frame,
            None => return error!("end_frame without a started frame"),
        };

        let cap = cmp::max(
            1,
            self.config
                .max_layer_count
                .unwrap_or_else(|| self.platform.max_layer_count()),
        );
        self.layers
            .ui
            .sort_by(|a, b| a.layer().draw_order(b.layer()));

        let layers = &self.layers;
        let mut builder: FrameBuilder<P::Layer> = FrameBuilder {
            headers: Vec::with_capacity(cap),
            cap,
            reserved: 1,
            frame,
            reorient,
            force_clip: self.config.force_clip,
            clear: layers.clear.as_ref(),
        };
        let mut submitted = vec![];

        if let Some(cube) = layers.cube.as_ref() {
            if cube.is_draw_requested(None) && builder.append(cube, None) {
                submitted.push(cube.id());
            }
        }

        if let Some(equirect) = layers.equirect.as_ref() {
            let source = equirect
                .layer()
                .source()
                .and_then(|source| layers.ui.iter().find(|adapter| adapter.id() == source));
            if equirect.is_draw_requested(source) && builder.append(equirect, source) {
                submitted.push(equirect.id());
            }
        }

        for adapter in layers.ui.iter().filter(|a| !a.layer().draw_in_front()) {
            if adapter.is_draw_requested(None) && builder.append(adapter, None) {
                submitted.push(adapter.id());
            }
        }

        builder.reserved = 0;
        match (layers.eyes[0].as_ref(), layers.eyes[1].as_ref()) {
            (Some(left), Some(right)) => {
                let eyes = EyeBuffers {
                    swapchains: [left, right],
                    frame,
                    clip_planes,
                };
                builder.headers.push(<P::Layer as NativeLayer>::main_projection(&eyes));
            }
            _ => error!("Eye buffers missing from frame {}", frame.frame_index),
        }

        for adapter in layers.ui.iter().filter(|a| a.layer().draw_in_front()) {
            if adapter.is_draw_requested(None) && builder.append(adapter, None) {
                submitted.push(adapter.id());
            }
        }

        let headers = builder.headers;
        for id in submitted {
            if let Some(adapter) = self.layers.adapter_mut(id) {
                adapter.layer_mut().clear_request_draw();
            }
        }

        debug!(
            "Submitting frame {} with {} layers",
            frame.frame_index,
            headers.len()
        );
        let submission = FrameSubmission {
            frame_index: frame.frame_index,
            display_time: frame.predicted_display_time,
            layers: &headers,
        };
        if let Err(e) = self.platform.submit_frame(submission) {
            error!("Frame {} submission failed: {}", frame.frame_index, e);
        }
    }
}

impl<P, G> Drop for FrameCompositor<P, G>
where
    P: Platform,
    P::Layer: NativeLayer,
    G: Graphics,
{
    fn drop(&mut self) {
        self.end_session();
    }
}
