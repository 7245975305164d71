/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! The boundary with a vendor runtime's frame loop.

use crate::Error;
use crate::EyeSpace;
use crate::Fov;
use crate::Native;
use crate::SwapChainProvider;
use crate::Viewer;
use crate::Viewport;

use euclid::RigidTransform3D;
use euclid::Size2D;

#[derive(Clone, Copy, Debug)]
pub struct EyeView {
    pub pose: RigidTransform3D<f32, EyeSpace, Native>,
    pub fov: Fov,
}

/// Everything the runtime tells us when a frame begins.
#[derive(Clone, Debug)]
pub struct FrameState {
    pub frame_index: u64,
    /// Nanoseconds, in the runtime's clock.
    pub predicted_display_time: u64,
    pub head: RigidTransform3D<f32, Viewer, Native>,
    pub eyes: [EyeView; 2],
    pub should_render: bool,
}

impl Default for FrameState {
    fn default() -> Self {
        let eye = EyeView {
            pose: RigidTransform3D::identity(),
            fov: Fov::symmetric(std::f32::consts::FRAC_PI_4),
        };
        FrameState {
            frame_index: 0,
            predicted_display_time: 0,
            head: RigidTransform3D::identity(),
            eyes: [eye; 2],
            should_render: true,
        }
    }
}

/// The ordered native layer list for one frame.
#[derive(Debug)]
pub struct FrameSubmission<'a, L> {
    pub frame_index: u64,
    pub display_time: u64,
    pub layers: &'a [L],
}

/// A vendor compositor. `Layer` is the runtime's native layer header.
pub trait Platform: SwapChainProvider {
    type Layer;

    fn begin_frame(&mut self) -> Result<FrameState, Error>;

    fn recommended_eye_size(&self) -> Size2D<i32, Viewport>;

    /// The most layers the runtime accepts in one submission.
    fn max_layer_count(&self) -> usize;

    fn submit_frame(&mut self, submission: FrameSubmission<Self::Layer>) -> Result<(), Error>;
}
