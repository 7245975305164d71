/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Binds one `Layer` to the swapchains behind it.
//!
//! Surface-owning layers (quads and cylinders) go through the resize
//! hand-off: a resize allocates a new swapchain next to the one being
//! shown, and the old one is only retired once the embedder confirms the
//! new one has content. Each allocation is a new generation, and composite
//! notices name the generation they were issued for.

use crate::CompositorConfig;
use crate::RenderContext;
use crate::SwapChain;

use log::{debug, error, warn};

use std::collections::HashMap;

use xrlayers_api::CompositeNotice;
use xrlayers_api::Eye;
use xrlayers_api::Layer;
use xrlayers_api::LayerId;
use xrlayers_api::LayerType;
use xrlayers_api::SurfaceChange;
use xrlayers_api::SurfaceChangedEvent;
use xrlayers_api::SurfaceType;
use xrlayers_api::SwapChainId;
use xrlayers_api::TargetId;

/// Which layer currently receives the notices sent to a target.
pub(crate) type TargetRegistry = HashMap<TargetId, LayerId>;

#[derive(Debug, Default)]
struct SurfaceBinding {
    current: Option<SwapChain>,
    current_generation: u64,
    generation: u64,
    incoming: Vec<(u64, SwapChain)>,
}

impl SurfaceBinding {
    fn newest_mut(&mut self) -> Option<&mut SwapChain> {
        match self.incoming.last_mut() {
            Some(&mut (_, ref mut swapchain)) => Some(swapchain),
            None => self.current.as_mut(),
        }
    }

    fn destroy(&mut self, ctx: &mut RenderContext) {
        if let Some(mut swapchain) = self.current.take() {
            swapchain.destroy(ctx);
        }
        for (_, mut swapchain) in self.incoming.drain(..) {
            swapchain.destroy(ctx);
        }
    }
}

#[derive(Debug)]
enum Backing {
    Surface(SurfaceBinding),
    Stereo([Option<SwapChain>; 2]),
    Cubemap(Option<SwapChain>),
    /// Equirect layers show their source's swapchain.
    Borrowed,
}

#[derive(Debug)]
pub(crate) struct LayerAdapter {
    layer: Layer,
    backing: Backing,
    target: Option<TargetId>,
}

fn create_surface_swapchain(ctx: &mut RenderContext, config: &CompositorConfig, layer: &Layer) -> SwapChain {
    match layer.surface_type() {
        Some(SurfaceType::AndroidSurface) => SwapChain::create_android_surface(ctx, layer.size()),
        _ => SwapChain::create_fbo(
            ctx,
            layer.size(),
            config.color_format,
            config.layer_buffer_count,
            layer.clear_color(),
        ),
    }
}

fn is_ready(swapchain: &Option<SwapChain>) -> bool {
    swapchain.as_ref().map_or(false, SwapChain::is_ready)
}

impl LayerAdapter {
    pub(crate) fn new(layer: Layer) -> LayerAdapter {
        let backing = match layer.layer_type() {
            LayerType::Quad | LayerType::Cylinder => Backing::Surface(SurfaceBinding::default()),
            LayerType::Projection => Backing::Stereo([None, None]),
            LayerType::Cube => Backing::Cubemap(None),
            LayerType::Equirect => Backing::Borrowed,
        };
        LayerAdapter {
            layer,
            backing,
            target: None,
        }
    }

    pub(crate) fn id(&self) -> LayerId {
        self.layer.id()
    }

    pub(crate) fn layer(&self) -> &Layer {
        &self.layer
    }

    pub(crate) fn layer_mut(&mut self) -> &mut Layer {
        &mut self.layer
    }

    pub(crate) fn is_ready(&self) -> bool {
        match self.backing {
            Backing::Surface(ref binding) => is_ready(&binding.current),
            Backing::Stereo(ref eyes) => eyes.iter().all(is_ready),
            Backing::Cubemap(ref swapchain) => is_ready(swapchain),
            Backing::Borrowed => false,
        }
    }

    /// Allocate the backing swapchain. Does nothing if it is already live.
    pub(crate) fn init(&mut self, ctx: &mut RenderContext, config: &CompositorConfig, targets: &mut TargetRegistry) {
        let created = match self.backing {
            Backing::Surface(ref mut binding) => {
                if is_ready(&binding.current) {
                    return;
                }
                binding.destroy(ctx);
                self.layer.take_pending_resize();
                let swapchain = create_surface_swapchain(ctx, config, &self.layer);
                binding.generation += 1;
                binding.current_generation = binding.generation;
                self.layer.set_surface(swapchain.surface());
                binding.current = Some(swapchain);
                Some(binding.generation)
            }
            Backing::Stereo(ref mut eyes) => {
                if eyes.iter().all(is_ready) {
                    return;
                }
                self.layer.take_pending_resize();
                for eye in eyes.iter_mut() {
                    if let Some(mut old) = eye.take() {
                        old.destroy(ctx);
                    }
                    *eye = Some(create_surface_swapchain(ctx, config, &self.layer));
                }
                None
            }
            Backing::Cubemap(ref mut swapchain) => {
                if is_ready(swapchain) {
                    return;
                }
                let format = self.layer.format().unwrap_or(config.color_format);
                let cubemap = SwapChain::create_cubemap(ctx, format, self.layer.size());
                self.layer.set_texture_handle(cubemap.cube_texture().unwrap_or(0));
                *swapchain = Some(cubemap);
                None
            }
            Backing::Borrowed => None,
        };
        self.layer.set_initialized(true);
        if let Some(generation) = created {
            self.notify_created(targets, generation);
        }
    }

    fn notify_created(&mut self, targets: &mut TargetRegistry, generation: u64) {
        let target = *self.target.get_or_insert_with(TargetId::new);
        targets.insert(target, self.layer.id());
        let size = self.layer.size();
        let event = SurfaceChangedEvent {
            layer: self.layer.id(),
            change: SurfaceChange::Create,
            surface: self.layer.surface(),
            width: size.width,
            height: size.height,
            notice: Some(CompositeNotice { target, generation }),
        };
        self.layer.notify_surface_changed(event);
    }

    pub(crate) fn target(&self) -> Option<TargetId> {
        self.target
    }

    /// The layer asked for a draw and there is something to show: its own
    /// composited surface, or its clear color as a placeholder.
    /// `source` is only consulted for equirect layers.
    pub(crate) fn is_draw_requested(&self, source: Option<&LayerAdapter>) -> bool {
        if !self.layer.is_draw_requested() {
            return false;
        }
        match self.backing {
            Backing::Borrowed => source.map_or(false, |source| {
                source.layer.is_composited() &&
                    source
                        .submit_swapchain(Eye::Left)
                        .map_or(false, SwapChain::is_ready)
            }),
            Backing::Cubemap(_) => self.layer.is_loaded() && self.is_ready(),
            _ => (self.is_ready() && self.layer.is_composited()) || self.layer.clear_color().a > 0.,
        }
    }

    /// Not composited yet, so the clear color stands in for the content.
    pub(crate) fn uses_placeholder(&self) -> bool {
        match self.backing {
            Backing::Surface(_) | Backing::Stereo(_) => {
                !self.layer.is_composited() && self.layer.clear_color().a > 0.
            }
            _ => false,
        }
    }

    /// The swapchain the compositor reads for `eye`. During a resize this
    /// stays the old one until the new one is confirmed.
    pub(crate) fn submit_swapchain(&self, eye: Eye) -> Option<&SwapChain> {
        match self.backing {
            Backing::Surface(ref binding) => binding.current.as_ref(),
            Backing::Stereo(ref eyes) => eyes[eye.index()].as_ref(),
            Backing::Cubemap(ref swapchain) => swapchain.as_ref(),
            Backing::Borrowed => None,
        }
    }

    /// The swapchain the application renders into: the newest one.
    pub(crate) fn bind_swapchain_mut(&mut self) -> Option<&mut SwapChain> {
        let eye = self.layer.current_eye();
        match self.backing {
            Backing::Surface(ref mut binding) => binding.newest_mut(),
            Backing::Stereo(ref mut eyes) => eyes[eye.index()].as_mut(),
            _ => None,
        }
    }

    pub(crate) fn swapchain_mut(&mut self, id: SwapChainId) -> Option<&mut SwapChain> {
        match self.backing {
            Backing::Surface(ref mut binding) => binding
                .current
                .iter_mut()
                .chain(binding.incoming.iter_mut().map(|entry| &mut entry.1))
                .find(|swapchain| swapchain.id() == id),
            Backing::Stereo(ref mut eyes) => eyes.iter_mut().flatten().find(|swapchain| swapchain.id() == id),
            Backing::Cubemap(ref mut swapchain) => swapchain.as_mut().filter(|swapchain| swapchain.id() == id),
            Backing::Borrowed => None,
        }
    }

    /// Start the resize hand-off after `Layer::resize`. The swapchain being
    /// shown is left alone.
    pub(crate) fn resize(&mut self, ctx: &mut RenderContext, config: &CompositorConfig, targets: &mut TargetRegistry) {
        let created = match self.backing {
            Backing::Surface(ref mut binding) => {
                if binding.current.is_none() && binding.incoming.is_empty() {
                    // Not allocated yet, init picks up the new size.
                    return;
                }
                let mut swapchain = create_surface_swapchain(ctx, config, &self.layer);
                if !swapchain.is_ready() {
                    error!("Resize of {:?} failed, keeping the current surface", self.layer.id());
                    swapchain.destroy(ctx);
                    // Report the size that is really allocated so the same
                    // resize can be requested again.
                    if let Some(size) = binding.newest_mut().map(|swapchain| swapchain.size()) {
                        self.layer.resize(size.width, size.height);
                        self.layer.take_pending_resize();
                    }
                    return;
                }
                binding.generation += 1;
                self.layer.set_surface(swapchain.surface());
                binding.incoming.push((binding.generation, swapchain));
                binding.generation
            }
            Backing::Stereo(ref mut eyes) => {
                for eye in eyes.iter_mut() {
                    if let Some(mut old) = eye.take() {
                        old.destroy(ctx);
                    }
                }
                return self.init(ctx, config, targets);
            }
            _ => return warn!("{:?} layers cannot be resized", self.layer.layer_type()),
        };
        debug!("Resizing {:?} to {:?}, generation {}", self.layer.id(), self.layer.size(), created);
        self.notify_created(targets, created);
    }

    /// Apply a composite notice for `generation`. Adopting a resized
    /// swapchain retires the old one and any older replacement.
    /// Returns false for a notice that no longer applies.
    pub(crate) fn handle_composited(&mut self, ctx: &mut RenderContext, generation: u64) -> bool {
        let binding = match self.backing {
            Backing::Surface(ref mut binding) => binding,
            _ => {
                self.layer.set_composited(true);
                return true;
            }
        };
        if binding.incoming.iter().any(|&(g, _)| g == generation) {
            let mut retired: Vec<SwapChain> = binding.current.take().into_iter().collect();
            let mut pending = vec![];
            for (g, swapchain) in binding.incoming.drain(..) {
                if g < generation {
                    retired.push(swapchain);
                } else if g == generation {
                    binding.current = Some(swapchain);
                } else {
                    pending.push((g, swapchain));
                }
            }
            for mut swapchain in retired {
                swapchain.destroy(ctx);
            }
            binding.incoming = pending;
            binding.current_generation = generation;
        } else if generation != binding.current_generation || binding.current.is_none() {
            warn!(
                "Ignoring composite notice for generation {} of {:?}, showing {}",
                generation,
                self.layer.id(),
                binding.current_generation
            );
            return false;
        }
        self.layer.set_composited(true);
        true
    }

    /// Move `other`'s surface, notice target and state into this adapter.
    /// `other` is left with nothing to tear down. A resize `other` had not
    /// allocated yet is carried over and runs on the next frame.
    pub(crate) fn take_surface(&mut self, other: &mut LayerAdapter, targets: &mut TargetRegistry) {
        let allocated = match (&mut self.backing, &mut other.backing) {
            (Backing::Surface(mine), Backing::Surface(theirs)) => {
                *mine = std::mem::take(theirs);
                mine.newest_mut().map(|swapchain| swapchain.size())
            }
            _ => {
                return warn!(
                    "Cannot move a {:?} surface into a {:?} layer",
                    other.layer.layer_type(),
                    self.layer.layer_type()
                )
            }
        };
        other.layer.take_pending_resize();
        if let Some(allocated) = allocated {
            let requested = self.layer.size();
            self.layer.resize(allocated.width, allocated.height);
            self.layer.take_pending_resize();
            self.layer.resize(requested.width, requested.height);
        }
        self.target = other.target.take();
        if let Some(target) = self.target {
            targets.insert(target, self.layer.id());
        }
        self.layer.set_surface(other.layer.surface());
        self.layer.set_composited(other.layer.is_composited());
        self.layer.set_initialized(other.layer.is_initialized());
        other.layer.set_surface(None);
        other.layer.set_composited(false);
        other.layer.set_initialized(false);
    }

    /// Acquire and release the newest image without rendering. That is the
    /// chain the producer writes to, even while a resize is pending.
    pub(crate) fn drain(&mut self, ctx: &mut RenderContext, frame_index: u64) {
        match self.backing {
            Backing::Surface(ref mut binding) => {
                if let Some(swapchain) = binding.newest_mut() {
                    swapchain.drain(ctx, frame_index);
                }
            }
            _ => debug!("Nothing to drain on {:?}", self.layer.id()),
        }
    }

    /// Release every swapchain and tell the delegate the surface is gone.
    /// Calling it again does nothing.
    pub(crate) fn destroy(&mut self, ctx: &mut RenderContext, targets: &mut TargetRegistry) {
        let was_initialized = self.layer.is_initialized();
        match self.backing {
            Backing::Surface(ref mut binding) => binding.destroy(ctx),
            Backing::Stereo(ref mut eyes) => {
                for eye in eyes.iter_mut() {
                    if let Some(mut swapchain) = eye.take() {
                        swapchain.destroy(ctx);
                    }
                }
            }
            Backing::Cubemap(ref mut swapchain) => {
                if let Some(mut swapchain) = swapchain.take() {
                    swapchain.destroy(ctx);
                }
            }
            Backing::Borrowed => {}
        }
        if let Some(target) = self.target.take() {
            targets.remove(&target);
        }
        self.layer.set_initialized(false);
        self.layer.set_composited(false);
        if was_initialized && self.layer.surface_type().is_some() {
            self.layer.set_surface(None);
            let event = SurfaceChangedEvent {
                layer: self.layer.id(),
                change: SurfaceChange::Destroy,
                surface: None,
                width: 0,
                height: 0,
                notice: None,
            };
            self.layer.notify_surface_changed(event);
        }
    }
}

#[cfg(all(test, feature = "headless"))]
mod tests {
    use super::*;
    use crate::headless::{HeadlessGraphics, HeadlessPlatform};
    use std::sync::{Arc, Mutex};

    fn recorded(layer: &mut Layer) -> Arc<Mutex<Vec<SurfaceChangedEvent>>> {
        let events = Arc::new(Mutex::new(vec![]));
        let sink = events.clone();
        layer.set_surface_changed_delegate(Box::new(move |event| sink.lock().unwrap().push(event)));
        events
    }

    #[test]
    fn resize_keeps_old_surface_until_composited() {
        let mut platform: HeadlessPlatform<()> = HeadlessPlatform::default();
        let graphics = HeadlessGraphics::new();
        let config = CompositorConfig::default();
        let mut targets = TargetRegistry::new();
        let mut layer = Layer::quad(64, 64, SurfaceType::Fbo);
        let events = recorded(&mut layer);
        let mut adapter = LayerAdapter::new(layer);
        let mut ctx = RenderContext {
            provider: &mut platform,
            graphics: &graphics,
        };

        adapter.init(&mut ctx, &config, &mut targets);
        let first = events.lock().unwrap()[0].notice.unwrap();
        assert!(adapter.handle_composited(&mut ctx, first.generation));
        let shown = adapter.submit_swapchain(Eye::Left).and_then(SwapChain::native);

        adapter.layer_mut().resize(128, 128);
        assert!(adapter.layer_mut().take_pending_resize());
        adapter.resize(&mut ctx, &config, &mut targets);
        let second = events.lock().unwrap()[1].notice.unwrap();
        assert_eq!(second.target, first.target);
        assert_eq!(second.generation, first.generation + 1);

        // Still showing the old one, rendering goes to the new one.
        assert_eq!(adapter.submit_swapchain(Eye::Left).and_then(SwapChain::native), shown);
        assert_eq!(adapter.bind_swapchain_mut().map(|s| s.size().width), Some(128));

        // A repeated notice for the old generation changes nothing.
        assert!(adapter.handle_composited(&mut ctx, first.generation));
        assert_eq!(adapter.submit_swapchain(Eye::Left).and_then(SwapChain::native), shown);

        assert!(adapter.handle_composited(&mut ctx, second.generation));
        assert_eq!(adapter.submit_swapchain(Eye::Left).map(|s| s.size().width), Some(128));
        assert!(!platform.is_live(shown.unwrap()));

        let mut ctx = RenderContext {
            provider: &mut platform,
            graphics: &graphics,
        };
        adapter.destroy(&mut ctx, &mut targets);
        adapter.destroy(&mut ctx, &mut targets);
        assert!(targets.is_empty());
        let events = events.lock().unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[2].change, SurfaceChange::Destroy);
    }

    #[test]
    fn stale_notice_is_ignored() {
        let mut platform: HeadlessPlatform<()> = HeadlessPlatform::default();
        let graphics = HeadlessGraphics::new();
        let config = CompositorConfig::default();
        let mut targets = TargetRegistry::new();
        let mut adapter = LayerAdapter::new(Layer::cylinder(32, 32, SurfaceType::Fbo));
        let mut ctx = RenderContext {
            provider: &mut platform,
            graphics: &graphics,
        };
        adapter.init(&mut ctx, &config, &mut targets);
        assert!(!adapter.handle_composited(&mut ctx, 7));
        assert!(!adapter.layer().is_composited());
        adapter.destroy(&mut ctx, &mut targets);
    }

    #[test]
    fn failed_resize_keeps_current_surface() {
        let mut platform: HeadlessPlatform<()> = HeadlessPlatform::default();
        let graphics = HeadlessGraphics::new();
        let config = CompositorConfig::default();
        let mut targets = TargetRegistry::new();
        let mut adapter = LayerAdapter::new(Layer::quad(32, 32, SurfaceType::Fbo));
        {
            let mut ctx = RenderContext {
                provider: &mut platform,
                graphics: &graphics,
            };
            adapter.init(&mut ctx, &config, &mut targets);
        }
        platform.set_fail_allocations(true);
        let mut ctx = RenderContext {
            provider: &mut platform,
            graphics: &graphics,
        };
        adapter.layer_mut().resize(64, 64);
        adapter.resize(&mut ctx, &config, &mut targets);
        assert!(adapter.is_ready());
        assert_eq!(adapter.bind_swapchain_mut().map(|s| s.size().width), Some(32));
        assert_eq!(adapter.layer().size().width, 32);
        assert!(!adapter.layer_mut().take_pending_resize());
        adapter.destroy(&mut ctx, &mut targets);
    }

    #[test]
    fn unallocated_resize_follows_a_move() {
        let mut platform: HeadlessPlatform<()> = HeadlessPlatform::default();
        let graphics = HeadlessGraphics::new();
        let config = CompositorConfig::default();
        let mut targets = TargetRegistry::new();
        let mut old = LayerAdapter::new(Layer::quad(32, 32, SurfaceType::Fbo));
        let mut ctx = RenderContext {
            provider: &mut platform,
            graphics: &graphics,
        };
        old.init(&mut ctx, &config, &mut targets);
        old.layer_mut().resize(64, 64);

        let mut moved = LayerAdapter::new(Layer::cylinder(64, 64, SurfaceType::Fbo));
        moved.take_surface(&mut old, &mut targets);
        old.destroy(&mut ctx, &mut targets);
        assert!(moved.layer_mut().take_pending_resize());
        moved.resize(&mut ctx, &config, &mut targets);
        assert_eq!(moved.bind_swapchain_mut().map(|s| s.size().width), Some(64));
        assert_eq!(moved.submit_swapchain(Eye::Left).map(|s| s.size().width), Some(32));
        moved.destroy(&mut ctx, &mut targets);
    }

    #[test]
    fn drain_cycles_the_newest_surface() {
        let mut platform: HeadlessPlatform<()> = HeadlessPlatform::default();
        let graphics = HeadlessGraphics::new();
        let config = CompositorConfig::default();
        let mut targets = TargetRegistry::new();
        let mut adapter = LayerAdapter::new(Layer::quad(32, 32, SurfaceType::Fbo));
        let mut ctx = RenderContext {
            provider: &mut platform,
            graphics: &graphics,
        };
        adapter.init(&mut ctx, &config, &mut targets);
        adapter.layer_mut().resize(64, 64);
        adapter.layer_mut().take_pending_resize();
        adapter.resize(&mut ctx, &config, &mut targets);
        let shown = adapter.submit_swapchain(Eye::Left).and_then(SwapChain::native).unwrap();
        let newest = adapter.bind_swapchain_mut().and_then(|s| s.native()).unwrap();

        adapter.drain(&mut ctx, 0);
        adapter.destroy(&mut ctx, &mut targets);
        assert_eq!(platform.acquire_count(newest), 1);
        assert_eq!(platform.acquire_count(shown), 0);
        assert_eq!(platform.acquired_count(), 0);
    }

    #[test]
    fn moved_surface_keeps_its_target() {
        let mut platform: HeadlessPlatform<()> = HeadlessPlatform::default();
        let graphics = HeadlessGraphics::new();
        let config = CompositorConfig::default();
        let mut targets = TargetRegistry::new();
        let mut old = LayerAdapter::new(Layer::quad(32, 32, SurfaceType::AndroidSurface));
        let mut ctx = RenderContext {
            provider: &mut platform,
            graphics: &graphics,
        };
        old.init(&mut ctx, &config, &mut targets);
        let target = old.target().unwrap();

        let mut moved = LayerAdapter::new(Layer::cylinder(32, 32, SurfaceType::AndroidSurface));
        moved.take_surface(&mut old, &mut targets);
        old.destroy(&mut ctx, &mut targets);
        moved.init(&mut ctx, &config, &mut targets);

        assert_eq!(targets.get(&target), Some(&moved.id()));
        assert!(moved.is_ready());
        assert!(moved.layer().surface().is_some());
        moved.destroy(&mut ctx, &mut targets);
        assert_eq!(platform.live_surface_count(), 0);
    }
}
