/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Oculus Mobile SDK frame layers.
//!
//! Matrices here use the SDK's layout: `m[row][col]` with column vectors,
//! the transpose of `euclid`'s row-vector layout.

use crate::native::EyeBuffers;
use crate::native::LayerUpdate;
use crate::native::NativeLayer;
use crate::utils::fov_to_projection_matrix;
use crate::utils::is_full_rect;
use crate::utils::matrix_rotation;

use euclid::Rotation3D;
use euclid::Transform3D;
use euclid::UnknownUnit;

use log::warn;

use xrlayers_api::Color;
use xrlayers_api::Display;
use xrlayers_api::Eye;
use xrlayers_api::EyeRect;
use xrlayers_api::EyeSpace;
use xrlayers_api::Layer;
use xrlayers_api::LayerId;
use xrlayers_api::LayerSpace;
use xrlayers_api::LayerType;
use xrlayers_api::Native;
use xrlayers_api::NativeSwapChain;
use xrlayers_api::Uv;
use xrlayers_api::Viewer;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OvrMatrix {
    pub m: [[f32; 4]; 4],
}

impl OvrMatrix {
    pub fn identity() -> OvrMatrix {
        let mut m = [[0.; 4]; 4];
        for (i, row) in m.iter_mut().enumerate() {
            row[i] = 1.;
        }
        OvrMatrix { m }
    }

    pub fn from_transform<S, D>(t: &Transform3D<f32, S, D>) -> OvrMatrix {
        let a = t.to_array();
        let mut m = [[0.; 4]; 4];
        for (row, values) in m.iter_mut().enumerate() {
            for (col, value) in values.iter_mut().enumerate() {
                *value = a[col * 4 + row];
            }
        }
        OvrMatrix { m }
    }

    fn to_transform(&self) -> Transform3D<f32, UnknownUnit, UnknownUnit> {
        let m = &self.m;
        Transform3D::new(
            m[0][0], m[1][0], m[2][0], m[3][0], m[0][1], m[1][1], m[2][1], m[3][1], m[0][2],
            m[1][2], m[2][2], m[3][2], m[0][3], m[1][3], m[2][3], m[3][3],
        )
    }

    pub fn inverse(&self) -> OvrMatrix {
        match self.to_transform().inverse() {
            Some(inverse) => OvrMatrix::from_transform(&inverse),
            None => {
                warn!("Singular layer matrix {:?}", self.m);
                OvrMatrix::identity()
            }
        }
    }

    /// Maps eye-space tangent angles to eye buffer texture coordinates.
    pub fn tan_angle_from_projection(projection: &OvrMatrix) -> OvrMatrix {
        let p = &projection.m;
        OvrMatrix {
            m: [
                [0.5 * p[0][0], 0., 0.5 * p[0][2] - 0.5, 0.],
                [0., 0.5 * p[1][1], 0.5 * p[1][2] - 0.5, 0.],
                [0., 0., -1., 0.],
                // Clip-Z to linear depth, in otherwise unused elements.
                [p[2][2], p[2][3], p[3][2], 1.],
            ],
        }
    }

    /// Maps tangent angles onto a unit square placed by `model_view`.
    pub fn tan_angle_from_unit_square(model_view: &OvrMatrix) -> OvrMatrix {
        let inv = model_view.inverse().m;
        let coef = if inv[2][3] > 0. { 1. } else { -1. };
        let mut m = OvrMatrix::identity().m;
        for col in 0..3 {
            m[0][col] = (0.5 * (inv[0][col] * inv[2][3] - inv[0][3] * inv[2][col]) -
                0.5 * inv[2][col]) *
                coef;
            m[1][col] = (-0.5 * (inv[1][col] * inv[2][3] - inv[1][3] * inv[2][col]) -
                0.5 * inv[2][col]) *
                coef;
            m[2][col] = -inv[2][col] * coef;
        }
        OvrMatrix { m }
    }

    pub fn tan_angle_for_cube_map(view: &OvrMatrix) -> OvrMatrix {
        let mut m = *view;
        for row in m.m.iter_mut().take(3) {
            row[3] = 0.;
        }
        m.inverse()
    }

    /// 2D scale and offset of a UV transform, as a texture matrix.
    pub fn texture_matrix(uv: &Transform3D<f32, Uv, Uv>) -> OvrMatrix {
        let mut m = OvrMatrix::identity();
        m.m[0][0] = uv.m11;
        m.m[1][1] = uv.m22;
        m.m[0][2] = uv.m41;
        m.m[1][2] = uv.m42;
        m
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BlendFactor {
    Zero,
    One,
    SrcAlpha,
    OneMinusSrcAlpha,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayerHeader {
    pub layer: Option<LayerId>,
    pub layer_type: Option<LayerType>,
    pub color_scale: Color,
    pub src_blend: BlendFactor,
    pub dst_blend: BlendFactor,
    pub clip_to_texture_rect: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayerTexture {
    pub swapchain: NativeSwapChain,
    pub image_index: usize,
    pub tex_coords_from_tan_angles: OvrMatrix,
    pub texture_rect: EyeRect,
    pub texture_matrix: OvrMatrix,
}

#[derive(Clone, Debug, PartialEq)]
pub enum OvrLayer {
    /// Eye buffers and flat quads.
    Projection2 {
        header: LayerHeader,
        head_pose: Rotation3D<f32, Viewer, Native>,
        textures: [LayerTexture; 2],
    },
    Cylinder2 {
        header: LayerHeader,
        textures: [LayerTexture; 2],
    },
    Cube2 {
        header: LayerHeader,
        texture: LayerTexture,
    },
    Equirect2 {
        header: LayerHeader,
        head_orientation: Rotation3D<f32, Native, LayerSpace>,
        textures: [LayerTexture; 2],
    },
}

impl OvrLayer {
    pub fn header(&self) -> &LayerHeader {
        match *self {
            OvrLayer::Projection2 { ref header, .. } |
            OvrLayer::Cylinder2 { ref header, .. } |
            OvrLayer::Cube2 { ref header, .. } |
            OvrLayer::Equirect2 { ref header, .. } => header,
        }
    }

    pub fn textures(&self) -> &[LayerTexture] {
        match *self {
            OvrLayer::Projection2 { ref textures, .. } |
            OvrLayer::Cylinder2 { ref textures, .. } |
            OvrLayer::Equirect2 { ref textures, .. } => textures,
            OvrLayer::Cube2 { ref texture, .. } => std::slice::from_ref(texture),
        }
    }
}

fn surface_header(update: &LayerUpdate, clip: bool) -> LayerHeader {
    let color_scale = if update.placeholder {
        update.layer.clear_color().to_linear()
    } else {
        update.layer.tint_color()
    };
    LayerHeader {
        layer: Some(update.layer.id()),
        layer_type: Some(update.layer.layer_type()),
        color_scale,
        src_blend: BlendFactor::SrcAlpha,
        dst_blend: BlendFactor::OneMinusSrcAlpha,
        clip_to_texture_rect: clip,
    }
}

fn opaque_header(layer: Option<&Layer>) -> LayerHeader {
    LayerHeader {
        layer: layer.map(|l| l.id()),
        layer_type: layer.map(|l| l.layer_type()),
        color_scale: layer.map_or(Color::WHITE, |l| l.tint_color()),
        src_blend: BlendFactor::One,
        dst_blend: BlendFactor::Zero,
        clip_to_texture_rect: false,
    }
}

fn texture(update: &LayerUpdate, eye: Eye, tan_angles: OvrMatrix, texture_matrix: OvrMatrix) -> LayerTexture {
    let texture_rect = if update.placeholder {
        xrlayers_api::full_texture_rect()
    } else {
        *update.layer.texture_rect(eye)
    };
    LayerTexture {
        swapchain: update.native(eye),
        image_index: update.image_index(eye),
        tex_coords_from_tan_angles: tan_angles,
        texture_rect,
        texture_matrix,
    }
}

fn model_view(layer: &Layer, eye: Eye) -> Transform3D<f32, LayerSpace, EyeSpace> {
    layer.model_transform(eye).then(layer.view(eye))
}

fn per_eye<F: Fn(Eye) -> LayerTexture>(f: F) -> [LayerTexture; 2] {
    [f(Eye::Left), f(Eye::Right)]
}

fn projection_tan_angles(update: &LayerUpdate, eye: Eye) -> OvrMatrix {
    let fov = &update.frame.eyes[eye.index()].fov;
    let projection: Transform3D<f32, EyeSpace, Display> =
        fov_to_projection_matrix(fov, Default::default());
    OvrMatrix::tan_angle_from_projection(&OvrMatrix::from_transform(&projection))
}

impl NativeLayer for OvrLayer {
    fn header_count(_: &Layer) -> usize {
        1
    }

    fn encode(update: &LayerUpdate, out: &mut Vec<OvrLayer>) {
        let layer = update.layer;
        let encoded = match layer.layer_type() {
            LayerType::Quad => {
                let clip = update.force_clip || !is_full_rect(layer.texture_rect(Eye::Left));
                let world = layer.world_size();
                let scale: Transform3D<f32, LayerSpace, LayerSpace> =
                    Transform3D::scale(world.width * 0.5, world.height * 0.5, 1.);
                OvrLayer::Projection2 {
                    header: surface_header(update, clip),
                    head_pose: update.frame.head.rotation,
                    textures: per_eye(|eye| {
                        let m = scale.then(&model_view(layer, eye));
                        let tan_angles =
                            OvrMatrix::tan_angle_from_unit_square(&OvrMatrix::from_transform(&m));
                        texture(update, eye, tan_angles, OvrMatrix::identity())
                    }),
                }
            }
            LayerType::Cylinder => OvrLayer::Cylinder2 {
                header: surface_header(update, false),
                textures: per_eye(|eye| {
                    let m = OvrMatrix::from_transform(&model_view(layer, eye));
                    let uv = layer.uv_transform(eye);
                    texture(update, eye, m.inverse(), OvrMatrix::texture_matrix(&uv))
                }),
            },
            LayerType::Projection => OvrLayer::Projection2 {
                header: surface_header(update, false),
                head_pose: update.frame.head.rotation,
                textures: per_eye(|eye| {
                    texture(update, eye, projection_tan_angles(update, eye), OvrMatrix::identity())
                }),
            },
            LayerType::Cube => {
                let view = OvrMatrix::from_transform(layer.view(Eye::Left));
                OvrLayer::Cube2 {
                    header: opaque_header(Some(layer)),
                    texture: texture(
                        update,
                        Eye::Left,
                        OvrMatrix::tan_angle_for_cube_map(&view),
                        OvrMatrix::identity(),
                    ),
                }
            }
            LayerType::Equirect => {
                let rotation: Rotation3D<f32, LayerSpace, Native> =
                    matrix_rotation(layer.model_transform(Eye::Left));
                OvrLayer::Equirect2 {
                    header: opaque_header(Some(layer)),
                    head_orientation: rotation.inverse(),
                    textures: per_eye(|eye| {
                        let uv = layer.uv_transform(eye);
                        texture(update, eye, OvrMatrix::identity(), OvrMatrix::texture_matrix(&uv))
                    }),
                }
            }
        };
        out.push(encoded);
    }

    fn main_projection(eyes: &EyeBuffers) -> OvrLayer {
        let textures = per_eye(|eye| {
            let swapchain = eyes.swapchains[eye.index()];
            let fov = &eyes.frame.eyes[eye.index()].fov;
            let projection: Transform3D<f32, EyeSpace, Display> =
                fov_to_projection_matrix(fov, eyes.clip_planes);
            LayerTexture {
                swapchain: swapchain.native().unwrap_or(NativeSwapChain::NULL),
                image_index: swapchain.image_index(eyes.frame.frame_index),
                tex_coords_from_tan_angles: OvrMatrix::tan_angle_from_projection(
                    &OvrMatrix::from_transform(&projection),
                ),
                texture_rect: xrlayers_api::full_texture_rect(),
                texture_matrix: OvrMatrix::identity(),
            }
        });
        OvrLayer::Projection2 {
            header: opaque_header(None),
            head_pose: eyes.frame.head.rotation,
            textures,
        }
    }

    fn layer_type(&self) -> Option<LayerType> {
        self.header().layer_type
    }

    fn layer_id(&self) -> Option<LayerId> {
        self.header().layer
    }

    fn swapchains(&self) -> Vec<NativeSwapChain> {
        self.textures().iter().map(|t| t.swapchain).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_transform_transposes() {
        let t: Transform3D<f32, LayerSpace, Native> = Transform3D::translation(1., 2., 3.);
        let m = OvrMatrix::from_transform(&t);
        assert_eq!(m.m[0][3], 1.);
        assert_eq!(m.m[1][3], 2.);
        assert_eq!(m.m[2][3], 3.);
        assert_eq!(m.m[3][0], 0.);
    }

    #[test]
    fn inverse_of_translation() {
        let t: Transform3D<f32, LayerSpace, Native> = Transform3D::translation(1., -2., 3.);
        let inv = OvrMatrix::from_transform(&t).inverse();
        assert!((inv.m[0][3] + 1.).abs() < 1e-6);
        assert!((inv.m[1][3] - 2.).abs() < 1e-6);
    }

    #[test]
    fn cube_map_ignores_translation() {
        let t: Transform3D<f32, Native, EyeSpace> = Transform3D::translation(5., 5., 5.);
        let m = OvrMatrix::tan_angle_for_cube_map(&OvrMatrix::from_transform(&t));
        assert_eq!(m, OvrMatrix::identity());
    }

    #[test]
    fn unit_square_in_front_of_eye() {
        // A unit square one meter ahead maps its center to the texture center.
        let t: Transform3D<f32, LayerSpace, EyeSpace> = Transform3D::translation(0., 0., -1.);
        let m = OvrMatrix::tan_angle_from_unit_square(&OvrMatrix::from_transform(&t)).m;
        // (tanX, tanY, -1) = (0, 0, -1) is the square's center.
        let u = -m[0][2];
        let v = -m[1][2];
        let w = -m[2][2];
        assert!((u / w - 0.5).abs() < 1e-6);
        assert!((v / w - 0.5).abs() < 1e-6);
    }
}
