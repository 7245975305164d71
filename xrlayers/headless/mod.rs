/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! A platform and GL stand-in with no headset behind them. Swapchains are
//! plain bookkeeping, submissions are recorded for inspection.

use euclid::Rect;
use euclid::RigidTransform3D;
use euclid::Size2D;
use euclid::Vector3D;

use log::{debug, warn};

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};

use xrlayers_api::AllocatedSwapChain;
use xrlayers_api::Color;
use xrlayers_api::Error;
use xrlayers_api::EyeView;
use xrlayers_api::Fov;
use xrlayers_api::FrameState;
use xrlayers_api::FrameSubmission;
use xrlayers_api::Graphics;
use xrlayers_api::ImageCycle;
use xrlayers_api::NativeSwapChain;
use xrlayers_api::Platform;
use xrlayers_api::SurfaceHandle;
use xrlayers_api::SwapChainInfo;
use xrlayers_api::SwapChainKind;
use xrlayers_api::SwapChainProvider;
use xrlayers_api::Viewport;

/// 72Hz
const FRAME_PERIOD_NS: u64 = 13_888_889;

const DEFAULT_IPD: f32 = 0.064;

struct HeadlessSwapChain {
    info: SwapChainInfo,
    images: Vec<u32>,
    acquired: bool,
    next_image: usize,
}

/// One recorded `submit_frame`.
#[derive(Clone, Debug)]
pub struct HeadlessSubmission<L> {
    pub frame_index: u64,
    pub display_time: u64,
    pub layers: Vec<L>,
}

pub struct HeadlessPlatform<L> {
    swapchains: HashMap<NativeSwapChain, HeadlessSwapChain>,
    surfaces: HashSet<SurfaceHandle>,
    acquires: HashMap<NativeSwapChain, usize>,
    next_handle: u64,
    next_texture: u32,
    frame_index: u64,
    eye_size: Size2D<i32, Viewport>,
    ipd: f32,
    image_cycle: ImageCycle,
    max_layer_count: usize,
    fail_allocations: bool,
    submissions: Vec<HeadlessSubmission<L>>,
}

impl<L> Default for HeadlessPlatform<L> {
    fn default() -> Self {
        HeadlessPlatform::new(Size2D::new(1440, 1600))
    }
}

impl<L> HeadlessPlatform<L> {
    pub fn new(eye_size: Size2D<i32, Viewport>) -> Self {
        HeadlessPlatform {
            swapchains: HashMap::new(),
            surfaces: HashSet::new(),
            acquires: HashMap::new(),
            next_handle: 1,
            next_texture: 1,
            frame_index: 0,
            eye_size,
            ipd: DEFAULT_IPD,
            image_cycle: ImageCycle::Handshake,
            max_layer_count: 16,
            fail_allocations: false,
            submissions: vec![],
        }
    }

    pub fn set_image_cycle(&mut self, image_cycle: ImageCycle) {
        self.image_cycle = image_cycle;
    }

    pub fn set_max_layer_count(&mut self, count: usize) {
        self.max_layer_count = count;
    }

    /// Make every following `create_swapchain` fail.
    pub fn set_fail_allocations(&mut self, fail: bool) {
        self.fail_allocations = fail;
    }

    pub fn set_ipd(&mut self, ipd: f32) {
        self.ipd = ipd;
    }

    pub fn submissions(&self) -> &[HeadlessSubmission<L>] {
        &self.submissions
    }

    pub fn last_submission(&self) -> Option<&HeadlessSubmission<L>> {
        self.submissions.last()
    }

    pub fn is_live(&self, swapchain: NativeSwapChain) -> bool {
        self.swapchains.contains_key(&swapchain)
    }

    pub fn live_swapchain_count(&self) -> usize {
        self.swapchains.len()
    }

    pub fn live_surface_count(&self) -> usize {
        self.surfaces.len()
    }

    pub fn swapchain_info(&self, swapchain: NativeSwapChain) -> Option<&SwapChainInfo> {
        self.swapchains.get(&swapchain).map(|s| &s.info)
    }

    /// Whether an image of `swapchain` is held by the application.
    pub fn is_acquired(&self, swapchain: NativeSwapChain) -> bool {
        self.swapchains.get(&swapchain).map_or(false, |s| s.acquired)
    }

    pub fn acquired_count(&self) -> usize {
        self.swapchains.values().filter(|s| s.acquired).count()
    }

    /// How many images of `swapchain` were ever acquired, kept after it is destroyed.
    pub fn acquire_count(&self, swapchain: NativeSwapChain) -> usize {
        self.acquires.get(&swapchain).cloned().unwrap_or(0)
    }
}

impl<L> SwapChainProvider for HeadlessPlatform<L> {
    fn image_cycle(&self) -> ImageCycle {
        self.image_cycle
    }

    fn create_swapchain(&mut self, info: &SwapChainInfo) -> Result<AllocatedSwapChain, Error> {
        if self.fail_allocations {
            return Err(Error::AllocationFailed(format!("{:?} swapchain", info.kind)));
        }
        if info.size.width <= 0 || info.size.height <= 0 {
            return Err(Error::AllocationFailed(format!(
                "invalid size {}x{}",
                info.size.width, info.size.height
            )));
        }
        let handle = NativeSwapChain(self.next_handle);
        self.next_handle += 1;
        let (images, surface) = match info.kind {
            // The producer owns the images of a surface chain.
            SwapChainKind::AndroidSurface => {
                let surface = SurfaceHandle(handle.0);
                self.surfaces.insert(surface);
                (vec![], Some(surface))
            }
            SwapChainKind::Fbo | SwapChainKind::Cubemap => {
                let count = info.buffer_count.max(1) as u32;
                let images = (self.next_texture..self.next_texture + count).collect();
                self.next_texture += count;
                (images, None)
            }
        };
        debug!("Headless swapchain {:?}: {:?}", handle, info);
        self.swapchains.insert(
            handle,
            HeadlessSwapChain {
                info: info.clone(),
                images: images.clone(),
                acquired: false,
                next_image: 0,
            },
        );
        Ok(AllocatedSwapChain {
            handle,
            images,
            surface,
        })
    }

    fn acquire_image(&mut self, swapchain: NativeSwapChain) -> Result<usize, Error> {
        let chain = self.swapchains.get_mut(&swapchain).ok_or(Error::InvalidSwapChain)?;
        if chain.acquired {
            return Err(Error::ImageAlreadyAcquired);
        }
        let index = chain.next_image;
        chain.next_image = match chain.images.len() {
            0 => 0,
            len => (index + 1) % len,
        };
        chain.acquired = true;
        *self.acquires.entry(swapchain).or_insert(0) += 1;
        Ok(index)
    }

    fn release_image(&mut self, swapchain: NativeSwapChain) -> Result<(), Error> {
        let chain = self.swapchains.get_mut(&swapchain).ok_or(Error::InvalidSwapChain)?;
        if !chain.acquired {
            return Err(Error::ImageNotAcquired);
        }
        chain.acquired = false;
        Ok(())
    }

    fn destroy_swapchain(&mut self, swapchain: NativeSwapChain) {
        if self.swapchains.remove(&swapchain).is_none() {
            warn!("Destroying unknown swapchain {:?}", swapchain);
        }
    }

    fn release_surface(&mut self, surface: SurfaceHandle) {
        if !self.surfaces.remove(&surface) {
            warn!("Releasing unknown surface {:?}", surface);
        }
    }
}

impl<L: Clone> Platform for HeadlessPlatform<L> {
    type Layer = L;

    fn begin_frame(&mut self) -> Result<FrameState, Error> {
        self.frame_index += 1;
        let head = RigidTransform3D::identity();
        let fov = Fov::symmetric(std::f32::consts::FRAC_PI_4);
        let eye = |x: f32| EyeView {
            pose: RigidTransform3D::from_translation(Vector3D::new(x, 0., 0.)),
            fov,
        };
        Ok(FrameState {
            frame_index: self.frame_index,
            predicted_display_time: time::precise_time_ns() + FRAME_PERIOD_NS,
            head,
            eyes: [eye(-self.ipd / 2.), eye(self.ipd / 2.)],
            should_render: true,
        })
    }

    fn recommended_eye_size(&self) -> Size2D<i32, Viewport> {
        self.eye_size
    }

    fn max_layer_count(&self) -> usize {
        self.max_layer_count
    }

    fn submit_frame(&mut self, submission: FrameSubmission<L>) -> Result<(), Error> {
        if submission.layers.len() > self.max_layer_count {
            return Err(Error::BackendSpecific(format!(
                "{} layers submitted, at most {} accepted",
                submission.layers.len(),
                self.max_layer_count
            )));
        }
        self.submissions.push(HeadlessSubmission {
            frame_index: submission.frame_index,
            display_time: submission.display_time,
            layers: submission.layers.to_vec(),
        });
        Ok(())
    }
}

/// What `HeadlessGraphics` was asked to do, in order.
#[derive(Clone, Debug, PartialEq)]
pub enum GraphicsCall {
    CreateFramebuffer { texture: u32, framebuffer: u32 },
    BindFramebuffer { target: u32, framebuffer: u32 },
    ClearFramebuffer { framebuffer: u32, color: Color },
    DeleteFramebuffer(u32),
    Viewport(Rect<i32, Viewport>),
    Clear(Color),
}

#[derive(Default)]
pub struct HeadlessGraphics {
    next_framebuffer: Cell<u32>,
    framebuffers: RefCell<HashSet<u32>>,
    bindings: RefCell<HashMap<u32, u32>>,
    calls: RefCell<Vec<GraphicsCall>>,
    refuse_attachments: Cell<bool>,
}

impl HeadlessGraphics {
    pub fn new() -> HeadlessGraphics {
        HeadlessGraphics::default()
    }

    /// Make every following `create_framebuffer` fail.
    pub fn set_refuse_attachments(&self, refuse: bool) {
        self.refuse_attachments.set(refuse);
    }

    /// The framebuffer last bound to `target`, 0 if none.
    pub fn bound_framebuffer(&self, target: u32) -> u32 {
        self.bindings.borrow().get(&target).cloned().unwrap_or(0)
    }

    pub fn live_framebuffers(&self) -> usize {
        self.framebuffers.borrow().len()
    }

    pub fn calls(&self) -> Vec<GraphicsCall> {
        self.calls.borrow().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    fn record(&self, call: GraphicsCall) {
        self.calls.borrow_mut().push(call);
    }
}

impl Graphics for HeadlessGraphics {
    fn create_framebuffer(&self, texture: u32, _size: Size2D<i32, Viewport>) -> Option<u32> {
        if self.refuse_attachments.get() {
            return None;
        }
        let framebuffer = self.next_framebuffer.get() + 1;
        self.next_framebuffer.set(framebuffer);
        self.framebuffers.borrow_mut().insert(framebuffer);
        self.record(GraphicsCall::CreateFramebuffer {
            texture,
            framebuffer,
        });
        Some(framebuffer)
    }

    fn bind_framebuffer(&self, target: u32, framebuffer: u32) {
        self.bindings.borrow_mut().insert(target, framebuffer);
        self.record(GraphicsCall::BindFramebuffer {
            target,
            framebuffer,
        });
    }

    fn clear_framebuffer(&self, framebuffer: u32, color: Color) {
        self.record(GraphicsCall::ClearFramebuffer { framebuffer, color });
    }

    fn delete_framebuffer(&self, framebuffer: u32) {
        if !self.framebuffers.borrow_mut().remove(&framebuffer) {
            warn!("Deleting unknown framebuffer {}", framebuffer);
        }
        self.record(GraphicsCall::DeleteFramebuffer(framebuffer));
    }

    fn viewport(&self, rect: Rect<i32, Viewport>) {
        self.record(GraphicsCall::Viewport(rect));
    }

    fn clear(&self, color: Color) {
        self.record(GraphicsCall::Clear(color));
    }
}
