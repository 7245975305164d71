/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! This crate defines the backend-neutral API for VR compositor layers.
//! It is implemented by the `xrlayers` crate.

mod color;
mod device;
mod error;
mod events;
mod layer;
mod platform;
mod swapchain;
pub mod util;
mod view;

pub use color::Color;

pub use device::DeviceDelegate;
pub use device::FrameEndMode;

pub use error::Error;

pub use events::CompositeNotice;
pub use events::SurfaceChange;
pub use events::SurfaceChangedBuffer;
pub use events::SurfaceChangedDelegate;
pub use events::SurfaceChangedEvent;
pub use events::TargetId;

pub use layer::CubeLayer;
pub use layer::CylinderLayer;
pub use layer::EquirectLayer;
pub use layer::Layer;
pub use layer::LayerId;
pub use layer::LayerKind;
pub use layer::LayerType;
pub use layer::SurfaceLayer;
pub use layer::SurfaceType;

pub use platform::EyeView;
pub use platform::FrameState;
pub use platform::FrameSubmission;
pub use platform::Platform;

pub use swapchain::AllocatedSwapChain;
pub use swapchain::Graphics;
pub use swapchain::ImageCycle;
pub use swapchain::NativeSwapChain;
pub use swapchain::SurfaceHandle;
pub use swapchain::SwapChainId;
pub use swapchain::SwapChainInfo;
pub use swapchain::SwapChainKind;
pub use swapchain::SwapChainProvider;

pub use view::full_texture_rect;
pub use view::Display;
pub use view::Eye;
pub use view::EyeRect;
pub use view::EyeSpace;
pub use view::Fov;
pub use view::LayerSpace;
pub use view::Native;
pub use view::Uv;
pub use view::Viewer;
pub use view::Viewport;
