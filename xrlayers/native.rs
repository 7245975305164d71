/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Translation of backend-neutral layers into a runtime's native layer headers.

use crate::SwapChain;

use euclid::Transform3D;

use xrlayers_api::util::ClipPlanes;
use xrlayers_api::Color;
use xrlayers_api::Eye;
use xrlayers_api::FrameState;
use xrlayers_api::Layer;
use xrlayers_api::LayerId;
use xrlayers_api::LayerType;
use xrlayers_api::Native;
use xrlayers_api::NativeSwapChain;

/// Inputs for encoding one layer in one frame.
pub struct LayerUpdate<'a> {
    pub layer: &'a Layer,
    /// The chain shown to each eye. Both entries are the same chain for
    /// everything except stereo projection layers.
    pub swapchains: [&'a SwapChain; 2],
    /// The layer is not composited yet and shows the shared clear chain.
    pub placeholder: bool,
    pub frame: &'a FrameState,
    pub reorient: &'a Transform3D<f32, Native, Native>,
    pub force_clip: bool,
}

impl<'a> LayerUpdate<'a> {
    pub fn swapchain(&self, eye: Eye) -> &'a SwapChain {
        self.swapchains[eye.index()]
    }

    /// Tint for composited layers, the clear color for placeholders.
    pub fn color_scale(&self) -> Color {
        if self.placeholder {
            self.layer.clear_color()
        } else {
            self.layer.tint_color()
        }
    }

    pub fn native(&self, eye: Eye) -> NativeSwapChain {
        self.swapchain(eye).native().unwrap_or(NativeSwapChain::NULL)
    }

    pub fn image_index(&self, eye: Eye) -> usize {
        self.swapchain(eye).image_index(self.frame.frame_index)
    }
}

/// The eye buffers, for the main projection entry.
pub struct EyeBuffers<'a> {
    pub swapchains: [&'a SwapChain; 2],
    pub frame: &'a FrameState,
    pub clip_planes: ClipPlanes,
}

pub trait NativeLayer: Clone + std::fmt::Debug {
    /// How many headers `encode` appends for `layer`.
    fn header_count(layer: &Layer) -> usize;

    fn encode(update: &LayerUpdate, out: &mut Vec<Self>);

    fn main_projection(eyes: &EyeBuffers) -> Self;

    /// `None` for the main projection entry.
    fn layer_type(&self) -> Option<LayerType>;

    /// `None` for the main projection entry.
    fn layer_id(&self) -> Option<LayerId>;

    /// Every swapchain this header reads from.
    fn swapchains(&self) -> Vec<NativeSwapChain>;
}
