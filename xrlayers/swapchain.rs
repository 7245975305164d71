/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use euclid::Size2D;

use log::{debug, error, warn};

use xrlayers_api::Color;
use xrlayers_api::Error;
use xrlayers_api::Graphics;
use xrlayers_api::ImageCycle;
use xrlayers_api::NativeSwapChain;
use xrlayers_api::SurfaceHandle;
use xrlayers_api::SwapChainId;
use xrlayers_api::SwapChainInfo;
use xrlayers_api::SwapChainKind;
use xrlayers_api::SwapChainProvider;
use xrlayers_api::Viewport;

/// The two things a swapchain talks to while it is alive.
pub struct RenderContext<'a> {
    pub provider: &'a mut dyn SwapChainProvider,
    pub graphics: &'a dyn Graphics,
}

/// One surface's ring of platform images.
#[derive(Debug)]
pub struct SwapChain {
    id: SwapChainId,
    info: SwapChainInfo,
    native: Option<NativeSwapChain>,
    images: Vec<u32>,
    framebuffers: Vec<Option<u32>>,
    acquired: Option<usize>,
    last_image: Option<usize>,
    surface: Option<SurfaceHandle>,
    cube_texture: Option<u32>,
}

impl SwapChain {
    fn allocate(ctx: &mut RenderContext, info: SwapChainInfo) -> SwapChain {
        let mut swapchain = SwapChain {
            id: SwapChainId::new(),
            info,
            native: None,
            images: vec![],
            framebuffers: vec![],
            acquired: None,
            last_image: None,
            surface: None,
            cube_texture: None,
        };
        match ctx.provider.create_swapchain(&swapchain.info) {
            Ok(allocated) => {
                debug!(
                    "Allocated {:?} swapchain {:?} {}x{} with {} images",
                    swapchain.info.kind,
                    allocated.handle,
                    swapchain.info.size.width,
                    swapchain.info.size.height,
                    allocated.images.len()
                );
                swapchain.native = Some(allocated.handle);
                swapchain.images = allocated.images;
                swapchain.surface = allocated.surface;
            }
            Err(e) => error!(
                "Failed to allocate {:?} swapchain {}x{}: {}",
                swapchain.info.kind, swapchain.info.size.width, swapchain.info.size.height, e
            ),
        }
        swapchain
    }

    /// Allocates `buffer_count` images, each wrapped in a framebuffer and
    /// cleared once to `clear_color`. Images that cannot be attached to a
    /// framebuffer are logged and left without one.
    pub fn create_fbo(
        ctx: &mut RenderContext,
        size: Size2D<i32, Viewport>,
        format: u32,
        buffer_count: usize,
        clear_color: Color,
    ) -> SwapChain {
        SwapChain::create_fbo_with_info(ctx, SwapChainInfo::fbo(size, format, buffer_count), clear_color)
    }

    pub fn create_fbo_with_info(
        ctx: &mut RenderContext,
        info: SwapChainInfo,
        clear_color: Color,
    ) -> SwapChain {
        let mut swapchain = SwapChain::allocate(ctx, info);
        let size = swapchain.info.size;
        let framebuffers: Vec<_> = swapchain
            .images
            .iter()
            .map(|&texture| {
                let fbo = ctx.graphics.create_framebuffer(texture, size);
                match fbo {
                    Some(fbo) => ctx.graphics.clear_framebuffer(fbo, clear_color),
                    None => error!("Texture {} of {:?} cannot back a framebuffer", texture, swapchain.id),
                }
                fbo
            })
            .collect();
        swapchain.framebuffers = framebuffers;
        swapchain
    }

    pub fn create_android_surface(ctx: &mut RenderContext, size: Size2D<i32, Viewport>) -> SwapChain {
        let swapchain = SwapChain::allocate(ctx, SwapChainInfo::android_surface(size));
        if swapchain.native.is_some() && swapchain.surface.is_none() {
            warn!("Surface swapchain {:?} came back without a surface", swapchain.id);
        }
        swapchain
    }

    /// A static single-image cubemap. The image is acquired once to learn
    /// its texture and released straight away.
    pub fn create_cubemap(ctx: &mut RenderContext, format: u32, size: Size2D<i32, Viewport>) -> SwapChain {
        let mut swapchain = SwapChain::allocate(ctx, SwapChainInfo::cubemap(size, format));
        if !swapchain.is_ready() {
            return swapchain;
        }
        match swapchain.acquire_image(ctx, 0) {
            Ok(index) => {
                swapchain.cube_texture = swapchain.images.get(index).cloned();
                swapchain.release_image(ctx);
            }
            Err(e) => error!("Failed to acquire cubemap image of {:?}: {}", swapchain.id, e),
        }
        swapchain
    }

    pub fn id(&self) -> SwapChainId {
        self.id
    }

    pub fn kind(&self) -> SwapChainKind {
        self.info.kind
    }

    pub fn info(&self) -> &SwapChainInfo {
        &self.info
    }

    pub fn size(&self) -> Size2D<i32, Viewport> {
        self.info.size
    }

    pub fn native(&self) -> Option<NativeSwapChain> {
        self.native
    }

    pub fn surface(&self) -> Option<SurfaceHandle> {
        self.surface
    }

    pub fn cube_texture(&self) -> Option<u32> {
        self.cube_texture
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Allocated and not destroyed. Surface-backed chains may report no
    /// images, the runtime owns them.
    pub fn is_ready(&self) -> bool {
        self.native.is_some()
    }

    pub fn acquired_image(&self) -> Option<usize> {
        self.acquired
    }

    /// The image the runtime will read for `frame_index`: the one held or
    /// last released, else the one the frame index selects.
    pub fn image_index(&self, frame_index: u64) -> usize {
        match self.acquired.or(self.last_image) {
            Some(index) => index,
            None if self.images.is_empty() => 0,
            None => (frame_index % self.images.len() as u64) as usize,
        }
    }

    pub fn framebuffer(&self, index: usize) -> Option<u32> {
        self.framebuffers.get(index).cloned().flatten()
    }

    pub fn acquire_image(&mut self, ctx: &mut RenderContext, frame_index: u64) -> Result<usize, Error> {
        let native = self.native.ok_or(Error::InvalidSwapChain)?;
        if self.acquired.is_some() {
            return Err(Error::ImageAlreadyAcquired);
        }
        let index = match ctx.provider.image_cycle() {
            ImageCycle::Handshake => ctx.provider.acquire_image(native)?,
            ImageCycle::FrameIndex if self.images.is_empty() => 0,
            ImageCycle::FrameIndex => (frame_index % self.images.len() as u64) as usize,
        };
        self.acquired = Some(index);
        Ok(index)
    }

    /// Bind the acquired image's framebuffer to `target`.
    pub fn bind_fbo(&self, graphics: &dyn Graphics, target: u32) -> Result<(), Error> {
        let index = self.acquired.ok_or(Error::ImageNotAcquired)?;
        let fbo = self.framebuffer(index).ok_or(Error::InvalidFramebuffer)?;
        graphics.bind_framebuffer(target, fbo);
        Ok(())
    }

    pub fn release_image(&mut self, ctx: &mut RenderContext) {
        let index = match self.acquired.take() {
            Some(index) => index,
            None => return warn!("Releasing {:?} with no acquired image", self.id),
        };
        self.last_image = Some(index);
        let native = match self.native {
            Some(native) => native,
            None => return,
        };
        if ctx.provider.image_cycle() == ImageCycle::Handshake {
            if let Err(e) = ctx.provider.release_image(native) {
                error!("Failed to release image {} of {:?}: {}", index, self.id, e);
            }
        }
    }

    /// Acquire and release without rendering, so a consumer queue that
    /// produced nothing this frame does not starve.
    pub fn drain(&mut self, ctx: &mut RenderContext, frame_index: u64) {
        if self.acquired.is_some() {
            return;
        }
        match self.acquire_image(ctx, frame_index) {
            Ok(_) => self.release_image(ctx),
            Err(e) => debug!("Nothing to drain on {:?}: {}", self.id, e),
        }
    }

    /// Release every native resource. Calling it again does nothing.
    pub fn destroy(&mut self, ctx: &mut RenderContext) {
        if self.acquired.is_some() {
            self.release_image(ctx);
        }
        for fbo in self.framebuffers.drain(..).flatten() {
            ctx.graphics.delete_framebuffer(fbo);
        }
        if let Some(native) = self.native.take() {
            debug!("Destroying swapchain {:?} ({:?})", self.id, native);
            ctx.provider.destroy_swapchain(native);
        }
        if let Some(surface) = self.surface.take() {
            ctx.provider.release_surface(surface);
        }
        self.images.clear();
        self.last_image = None;
        self.cube_texture = None;
    }
}

impl Drop for SwapChain {
    fn drop(&mut self) {
        if let Some(native) = self.native {
            warn!("Swapchain {:?} ({:?}) dropped without being destroyed", self.id, native);
        }
    }
}

#[cfg(all(test, feature = "headless"))]
mod tests {
    use super::*;
    use crate::headless::{HeadlessGraphics, HeadlessPlatform};

    fn setup() -> (HeadlessPlatform<()>, HeadlessGraphics) {
        (HeadlessPlatform::default(), HeadlessGraphics::new())
    }

    #[test]
    fn fbo_chain_lifecycle() {
        let (mut platform, graphics) = setup();
        let mut ctx = RenderContext {
            provider: &mut platform,
            graphics: &graphics,
        };
        let mut swapchain = SwapChain::create_fbo(&mut ctx, Size2D::new(64, 32), 0x8C43, 3, Color::BLACK);
        assert!(swapchain.is_ready());
        assert_eq!(swapchain.len(), 3);
        assert!((0..3).all(|i| swapchain.framebuffer(i).is_some()));

        let index = swapchain.acquire_image(&mut ctx, 7).unwrap();
        assert_eq!(swapchain.acquire_image(&mut ctx, 7), Err(Error::ImageAlreadyAcquired));
        swapchain.bind_fbo(ctx.graphics, 0x8D40).unwrap();
        swapchain.release_image(&mut ctx);
        assert_eq!(swapchain.image_index(8), index);

        swapchain.destroy(&mut ctx);
        swapchain.destroy(&mut ctx);
        assert!(!swapchain.is_ready());
        assert_eq!(platform.live_swapchain_count(), 0);
        assert_eq!(graphics.live_framebuffers(), 0);
    }

    #[test]
    fn frame_index_cycle() {
        let (mut platform, graphics) = setup();
        platform.set_image_cycle(ImageCycle::FrameIndex);
        let mut ctx = RenderContext {
            provider: &mut platform,
            graphics: &graphics,
        };
        let mut swapchain = SwapChain::create_fbo(&mut ctx, Size2D::new(8, 8), 0x8C43, 3, Color::BLACK);
        assert_eq!(swapchain.image_index(4), 1);
        assert_eq!(swapchain.acquire_image(&mut ctx, 5), Ok(2));
        swapchain.release_image(&mut ctx);
        swapchain.destroy(&mut ctx);
    }

    #[test]
    fn failed_allocation_is_not_ready() {
        let (mut platform, graphics) = setup();
        platform.set_fail_allocations(true);
        let mut ctx = RenderContext {
            provider: &mut platform,
            graphics: &graphics,
        };
        let mut swapchain = SwapChain::create_fbo(&mut ctx, Size2D::new(8, 8), 0x8C43, 3, Color::BLACK);
        assert!(!swapchain.is_ready());
        assert_eq!(swapchain.acquire_image(&mut ctx, 0), Err(Error::InvalidSwapChain));
        swapchain.destroy(&mut ctx);
    }

    #[test]
    fn unattachable_images_cannot_bind() {
        let (mut platform, graphics) = setup();
        graphics.set_refuse_attachments(true);
        let mut ctx = RenderContext {
            provider: &mut platform,
            graphics: &graphics,
        };
        let mut swapchain = SwapChain::create_fbo(&mut ctx, Size2D::new(8, 8), 0x8C43, 2, Color::BLACK);
        assert!(swapchain.is_ready());
        swapchain.acquire_image(&mut ctx, 0).unwrap();
        assert_eq!(swapchain.bind_fbo(ctx.graphics, 0x8D40), Err(Error::InvalidFramebuffer));
        swapchain.destroy(&mut ctx);
        assert_eq!(platform.acquired_count(), 0);
    }

    #[test]
    fn drain_handshake() {
        let (mut platform, graphics) = setup();
        let mut ctx = RenderContext {
            provider: &mut platform,
            graphics: &graphics,
        };
        let mut swapchain = SwapChain::create_fbo(&mut ctx, Size2D::new(8, 8), 0x8C43, 3, Color::BLACK);
        let native = swapchain.native().unwrap();
        swapchain.drain(&mut ctx, 0);
        swapchain.drain(&mut ctx, 1);
        assert_eq!(swapchain.acquired_image(), None);
        assert_eq!(swapchain.image_index(5), 1);

        // Held by a render in progress, so there is nothing to drain.
        swapchain.acquire_image(&mut ctx, 2).unwrap();
        swapchain.drain(&mut ctx, 2);
        assert_eq!(swapchain.acquired_image(), Some(2));
        swapchain.release_image(&mut ctx);
        swapchain.destroy(&mut ctx);
        assert_eq!(platform.acquire_count(native), 3);
        assert_eq!(platform.acquired_count(), 0);
    }

    #[test]
    fn drain_frame_index() {
        let (mut platform, graphics) = setup();
        platform.set_image_cycle(ImageCycle::FrameIndex);
        let mut ctx = RenderContext {
            provider: &mut platform,
            graphics: &graphics,
        };
        let mut swapchain = SwapChain::create_fbo(&mut ctx, Size2D::new(8, 8), 0x8C43, 3, Color::BLACK);
        let native = swapchain.native().unwrap();
        swapchain.drain(&mut ctx, 4);
        assert_eq!(swapchain.acquired_image(), None);
        assert_eq!(swapchain.image_index(0), 1);

        swapchain.acquire_image(&mut ctx, 5).unwrap();
        swapchain.drain(&mut ctx, 6);
        assert_eq!(swapchain.acquired_image(), Some(2));
        swapchain.release_image(&mut ctx);
        swapchain.destroy(&mut ctx);
        // The runtime is never asked for images in this mode.
        assert_eq!(platform.acquire_count(native), 0);
        assert_eq!(platform.acquired_count(), 0);
    }

    #[test]
    fn cubemap_records_texture() {
        let (mut platform, graphics) = setup();
        let mut ctx = RenderContext {
            provider: &mut platform,
            graphics: &graphics,
        };
        let mut swapchain = SwapChain::create_cubemap(&mut ctx, 0x8C43, Size2D::new(16, 16));
        assert!(swapchain.cube_texture().is_some());
        assert_eq!(swapchain.acquired_image(), None);
        assert_eq!(swapchain.info().face_count, 6);
        swapchain.destroy(&mut ctx);
    }
}
