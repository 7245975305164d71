/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// An RGBA color with components in [0, 1].
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Color = Color::new(1., 1., 1., 1.);
    pub const BLACK: Color = Color::new(0., 0., 0., 1.);
    pub const TRANSPARENT: Color = Color::new(0., 0., 0., 0.);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Color {
        Color { r, g, b, a }
    }

    /// Converts the color channels from sRGB to linear. Alpha is kept as is.
    pub fn to_linear(self) -> Color {
        Color {
            r: srgb_to_linear(self.r),
            g: srgb_to_linear(self.g),
            b: srgb_to_linear(self.b),
            a: self.a,
        }
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::TRANSPARENT
    }
}

fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_conversion_keeps_endpoints() {
        let c = Color::new(0., 1., 0.5, 0.25).to_linear();
        assert_eq!(c.r, 0.);
        assert!((c.g - 1.).abs() < 1e-6);
        assert!((c.b - 0.214).abs() < 1e-3);
        assert_eq!(c.a, 0.25);
    }

    #[test]
    fn linear_conversion_low_segment() {
        let c = Color::new(0.04, 0.04, 0.04, 1.).to_linear();
        assert!((c.r - 0.04 / 12.92).abs() < 1e-7);
    }
}
