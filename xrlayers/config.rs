/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use sparkle::gl;
use xrlayers_api::Color;

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct CompositorConfig {
    /// When false no layers are created and only the eye buffers are submitted.
    pub layers_enabled: bool,
    /// Overrides the runtime's layer cap when set.
    pub max_layer_count: Option<usize>,
    pub eye_buffer_count: usize,
    pub layer_buffer_count: usize,
    pub color_format: u32,
    pub eye_samples: u32,
    /// Always clip Oculus quads to their texture rect.
    pub force_clip: bool,
    pub clear_color: Color,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        CompositorConfig {
            layers_enabled: true,
            max_layer_count: None,
            eye_buffer_count: 3,
            layer_buffer_count: 3,
            color_format: gl::SRGB8_ALPHA8,
            eye_samples: 4,
            force_clip: false,
            clear_color: Color::BLACK,
        }
    }
}
