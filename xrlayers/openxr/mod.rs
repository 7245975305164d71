/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! OpenXR composition layers.
//!
//! These mirror `XrCompositionLayer*` structs with typed poses. A platform
//! built on an OpenXR runtime converts them one to one when it submits
//! `xrEndFrame`.

use crate::native::EyeBuffers;
use crate::native::LayerUpdate;
use crate::native::NativeLayer;
use crate::utils::pixel_rect;
use crate::utils::transform_to_pose;

use euclid::Rect;
use euclid::RigidTransform3D;
use euclid::Rotation3D;
use euclid::Size2D;
use euclid::Vector2D;

use std::f32::consts::PI;

use xrlayers_api::Color;
use xrlayers_api::Eye;
use xrlayers_api::EyeSpace;
use xrlayers_api::Fov;
use xrlayers_api::Layer;
use xrlayers_api::LayerId;
use xrlayers_api::LayerSpace;
use xrlayers_api::LayerType;
use xrlayers_api::Native;
use xrlayers_api::NativeSwapChain;
use xrlayers_api::Uv;
use xrlayers_api::Viewport;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EyeVisibility {
    Both,
    Left,
    Right,
}

impl EyeVisibility {
    fn eye(self) -> Eye {
        match self {
            EyeVisibility::Both | EyeVisibility::Left => Eye::Left,
            EyeVisibility::Right => Eye::Right,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SubImage {
    pub swapchain: NativeSwapChain,
    pub image_rect: Rect<i32, Viewport>,
    pub image_array_index: u32,
}

/// Fields shared by every non-projection layer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayerHeader {
    pub layer: LayerId,
    pub layer_type: LayerType,
    pub eye_visibility: EyeVisibility,
    pub blend_texture_source_alpha: bool,
    /// From `XR_KHR_composition_layer_color_scale_bias`.
    pub color_scale: Color,
    pub color_bias: Color,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProjectionView {
    pub pose: RigidTransform3D<f32, EyeSpace, Native>,
    pub fov: Fov,
    pub sub_image: SubImage,
}

#[derive(Clone, Debug, PartialEq)]
pub enum CompositionLayer {
    Projection {
        layer: Option<LayerId>,
        views: [ProjectionView; 2],
    },
    Quad {
        header: LayerHeader,
        sub_image: SubImage,
        pose: RigidTransform3D<f32, LayerSpace, Native>,
        size: Size2D<f32, LayerSpace>,
    },
    Cylinder {
        header: LayerHeader,
        sub_image: SubImage,
        pose: RigidTransform3D<f32, LayerSpace, Native>,
        radius: f32,
        central_angle: f32,
        aspect_ratio: f32,
    },
    Cube {
        header: LayerHeader,
        swapchain: NativeSwapChain,
        image_array_index: u32,
        orientation: Rotation3D<f32, LayerSpace, Native>,
    },
    Equirect {
        header: LayerHeader,
        sub_image: SubImage,
        pose: RigidTransform3D<f32, LayerSpace, Native>,
        radius: f32,
        scale: Vector2D<f32, Uv>,
        bias: Vector2D<f32, Uv>,
    },
}

impl CompositionLayer {
    pub fn header(&self) -> Option<&LayerHeader> {
        match *self {
            CompositionLayer::Projection { .. } => None,
            CompositionLayer::Quad { ref header, .. } |
            CompositionLayer::Cylinder { ref header, .. } |
            CompositionLayer::Cube { ref header, .. } |
            CompositionLayer::Equirect { ref header, .. } => Some(header),
        }
    }

    pub fn sub_image(&self) -> Option<&SubImage> {
        match *self {
            CompositionLayer::Quad { ref sub_image, .. } |
            CompositionLayer::Cylinder { ref sub_image, .. } |
            CompositionLayer::Equirect { ref sub_image, .. } => Some(sub_image),
            _ => None,
        }
    }
}

fn visibilities(layer: &Layer) -> &'static [EyeVisibility] {
    if layer.layer_type() == LayerType::Cube || layer.same_layer_for_both_eyes() {
        &[EyeVisibility::Both]
    } else {
        &[EyeVisibility::Left, EyeVisibility::Right]
    }
}

fn sub_image(update: &LayerUpdate, eye: Eye) -> SubImage {
    let swapchain = update.swapchain(eye);
    // Placeholders always show the whole 1x1 clear image.
    let rect = if update.placeholder {
        xrlayers_api::full_texture_rect()
    } else {
        *update.layer.texture_rect(eye)
    };
    SubImage {
        swapchain: update.native(eye),
        image_rect: pixel_rect(&rect, swapchain.size()),
        image_array_index: 0,
    }
}

fn header(update: &LayerUpdate, eye_visibility: EyeVisibility) -> LayerHeader {
    let layer = update.layer;
    LayerHeader {
        layer: layer.id(),
        layer_type: layer.layer_type(),
        eye_visibility,
        blend_texture_source_alpha: layer.layer_type() != LayerType::Cube,
        color_scale: update.color_scale(),
        color_bias: Color::TRANSPARENT,
    }
}

fn projection_views(update: &LayerUpdate) -> [ProjectionView; 2] {
    let view = |eye: Eye| ProjectionView {
        pose: update.frame.eyes[eye.index()].pose,
        fov: update.frame.eyes[eye.index()].fov,
        sub_image: sub_image(update, eye),
    };
    [view(Eye::Left), view(Eye::Right)]
}

impl NativeLayer for CompositionLayer {
    fn header_count(layer: &Layer) -> usize {
        match layer.layer_type() {
            LayerType::Projection => 1,
            _ => visibilities(layer).len(),
        }
    }

    fn encode(update: &LayerUpdate, out: &mut Vec<CompositionLayer>) {
        let layer = update.layer;
        if layer.layer_type() == LayerType::Projection {
            out.push(CompositionLayer::Projection {
                layer: Some(layer.id()),
                views: projection_views(update),
            });
            return;
        }

        for &visibility in visibilities(layer) {
            let eye = visibility.eye();
            let header = header(update, visibility);
            let model = layer.model_transform(eye);
            let encoded = match layer.layer_type() {
                LayerType::Quad => CompositionLayer::Quad {
                    header,
                    sub_image: sub_image(update, eye),
                    pose: transform_to_pose(model),
                    size: layer.world_size(),
                },
                LayerType::Cylinder => {
                    let uv_scale = layer.uv_transform(eye).m11;
                    let world = layer.world_size();
                    CompositionLayer::Cylinder {
                        header,
                        sub_image: sub_image(update, eye),
                        pose: transform_to_pose(&model.then(update.reorient)),
                        radius: layer.radius(),
                        central_angle: PI / uv_scale,
                        aspect_ratio: world.width / world.height,
                    }
                }
                LayerType::Cube => CompositionLayer::Cube {
                    header,
                    swapchain: update.native(eye),
                    image_array_index: 0,
                    orientation: Rotation3D::identity(),
                },
                LayerType::Equirect => {
                    let uv = layer.uv_transform(eye);
                    CompositionLayer::Equirect {
                        header,
                        sub_image: sub_image(update, eye),
                        pose: transform_to_pose(model),
                        radius: 0.,
                        scale: Vector2D::new(uv.m11, uv.m22),
                        bias: Vector2D::new(uv.m41, uv.m42),
                    }
                }
                LayerType::Projection => continue,
            };
            out.push(encoded);
        }
    }

    fn main_projection(eyes: &EyeBuffers) -> CompositionLayer {
        let view = |eye: Eye| {
            let swapchain = eyes.swapchains[eye.index()];
            ProjectionView {
                pose: eyes.frame.eyes[eye.index()].pose,
                fov: eyes.frame.eyes[eye.index()].fov,
                sub_image: SubImage {
                    swapchain: swapchain.native().unwrap_or(NativeSwapChain::NULL),
                    image_rect: Rect::from_size(swapchain.size()),
                    image_array_index: 0,
                },
            }
        };
        CompositionLayer::Projection {
            layer: None,
            views: [view(Eye::Left), view(Eye::Right)],
        }
    }

    fn layer_type(&self) -> Option<LayerType> {
        match *self {
            CompositionLayer::Projection { layer: None, .. } => None,
            CompositionLayer::Projection { .. } => Some(LayerType::Projection),
            _ => self.header().map(|h| h.layer_type),
        }
    }

    fn layer_id(&self) -> Option<LayerId> {
        match *self {
            CompositionLayer::Projection { layer, .. } => layer,
            _ => self.header().map(|h| h.layer),
        }
    }

    fn swapchains(&self) -> Vec<NativeSwapChain> {
        match *self {
            CompositionLayer::Projection { ref views, .. } => {
                views.iter().map(|v| v.sub_image.swapchain).collect()
            }
            CompositionLayer::Cube { swapchain, .. } => vec![swapchain],
            _ => self.sub_image().map(|s| s.swapchain).into_iter().collect(),
        }
    }
}
