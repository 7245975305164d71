/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! This crate binds application-rendered surfaces to VR compositor layers
//! for OpenXR and the Oculus Mobile SDK.

mod adapter;
mod compositor;
mod config;
mod device;
mod swapchain;

pub mod gl_utils;

#[cfg(feature = "headless")]
pub mod headless;

pub mod native;
pub mod oculus;
pub mod openxr;
pub mod utils;

pub use compositor::FrameCompositor;
pub use compositor::LayerRequest;
pub use compositor::LayerRequester;

pub use config::CompositorConfig;

pub use device::LayerDevice;

pub use native::EyeBuffers;
pub use native::LayerUpdate;
pub use native::NativeLayer;

pub use swapchain::RenderContext;
pub use swapchain::SwapChain;
