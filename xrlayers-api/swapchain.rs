/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use crate::Color;
use crate::Error;
use crate::Viewport;

use euclid::Rect;
use euclid::Size2D;

use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

const GL_SRGB8_ALPHA8: u32 = 0x8C43;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct SwapChainId(usize);

static NEXT_SWAPCHAIN_ID: AtomicUsize = AtomicUsize::new(0);

impl SwapChainId {
    pub fn new() -> SwapChainId {
        SwapChainId(NEXT_SWAPCHAIN_ID.fetch_add(1, Ordering::SeqCst))
    }
}

/// The platform's handle for an allocated swapchain.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct NativeSwapChain(pub u64);

impl NativeSwapChain {
    pub const NULL: NativeSwapChain = NativeSwapChain(0);
}

/// A platform surface object (an Android `Surface` global reference)
/// whose consumer side feeds a swapchain.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct SurfaceHandle(pub u64);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum SwapChainKind {
    Fbo,
    AndroidSurface,
    Cubemap,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct SwapChainInfo {
    pub kind: SwapChainKind,
    pub size: Size2D<i32, Viewport>,
    pub format: u32,
    pub buffer_count: usize,
    pub sample_count: u32,
    pub mip_count: u32,
    pub face_count: u32,
    pub depth: bool,
}

impl SwapChainInfo {
    pub fn fbo(size: Size2D<i32, Viewport>, format: u32, buffer_count: usize) -> SwapChainInfo {
        SwapChainInfo {
            kind: SwapChainKind::Fbo,
            size,
            format,
            buffer_count,
            sample_count: 1,
            mip_count: 1,
            face_count: 1,
            depth: false,
        }
    }

    /// Surface-backed chains leave format and counts to the runtime.
    pub fn android_surface(size: Size2D<i32, Viewport>) -> SwapChainInfo {
        SwapChainInfo {
            kind: SwapChainKind::AndroidSurface,
            size,
            format: 0,
            buffer_count: 0,
            sample_count: 0,
            mip_count: 0,
            face_count: 0,
            depth: false,
        }
    }

    pub fn cubemap(size: Size2D<i32, Viewport>, format: u32) -> SwapChainInfo {
        SwapChainInfo {
            kind: SwapChainKind::Cubemap,
            size,
            format,
            buffer_count: 1,
            sample_count: 1,
            mip_count: 1,
            face_count: 6,
            depth: false,
        }
    }

    pub fn with_samples(mut self, sample_count: u32, depth: bool) -> SwapChainInfo {
        self.sample_count = sample_count;
        self.depth = depth;
        self
    }
}

impl Default for SwapChainInfo {
    fn default() -> Self {
        SwapChainInfo::fbo(Size2D::new(1, 1), GL_SRGB8_ALPHA8, 1)
    }
}

/// What the platform hands back for a successful allocation.
#[derive(Clone, Debug)]
pub struct AllocatedSwapChain {
    pub handle: NativeSwapChain,
    /// GL texture names, one per image.
    pub images: Vec<u32>,
    pub surface: Option<SurfaceHandle>,
}

/// How images of a chain are cycled.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum ImageCycle {
    /// Explicit acquire/release handshake with the runtime.
    Handshake,
    /// The current image is `frame_index % length`.
    FrameIndex,
}

/// The platform side of swapchain allocation and image cycling.
pub trait SwapChainProvider {
    fn image_cycle(&self) -> ImageCycle;

    fn create_swapchain(&mut self, info: &SwapChainInfo) -> Result<AllocatedSwapChain, Error>;

    /// Acquire and wait for the next image. Only used with `ImageCycle::Handshake`.
    fn acquire_image(&mut self, swapchain: NativeSwapChain) -> Result<usize, Error>;

    fn release_image(&mut self, swapchain: NativeSwapChain) -> Result<(), Error>;

    fn destroy_swapchain(&mut self, swapchain: NativeSwapChain);

    /// Drop the global reference held on a surface object.
    fn release_surface(&mut self, surface: SurfaceHandle);
}

/// The render-target operations the core needs from a GL context.
pub trait Graphics {
    /// Wrap a texture in a framebuffer. `None` if the texture cannot be attached.
    fn create_framebuffer(&self, texture: u32, size: Size2D<i32, Viewport>) -> Option<u32>;

    fn bind_framebuffer(&self, target: u32, framebuffer: u32);

    /// Clear a framebuffer without disturbing the current bindings.
    fn clear_framebuffer(&self, framebuffer: u32, color: Color);

    fn delete_framebuffer(&self, framebuffer: u32);

    fn viewport(&self, rect: Rect<i32, Viewport>);

    /// Clear whatever is currently bound.
    fn clear(&self, color: Color);
}
