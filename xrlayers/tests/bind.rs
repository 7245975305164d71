/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

mod common;

use common::*;

use sparkle::gl;

use xrlayers::headless::GraphicsCall;
use xrlayers::oculus::OvrLayer;
use xrlayers::openxr::CompositionLayer;
use xrlayers::NativeLayer;
use xrlayers_api::{DeviceDelegate, Eye, FrameEndMode, LayerId, LayerType, SurfaceType};

fn eye_framebuffer<L: NativeLayer>(device: &Device<L>, eye: Eye) -> u32 {
    let swapchain = device.compositor().eye_swapchain(eye).unwrap();
    swapchain.framebuffer(swapchain.acquired_image().unwrap()).unwrap()
}

fn layer_framebuffer<L: NativeLayer>(device: &mut Device<L>, layer: LayerId) -> u32 {
    let swapchain = device.compositor_mut().layer_render_swapchain(layer).unwrap();
    swapchain.framebuffer(swapchain.acquired_image().unwrap()).unwrap()
}

fn nested_binds<L: NativeLayer>() {
    let mut device = default_device::<L>();
    let a = device.create_layer_quad(32, 32, SurfaceType::Fbo).unwrap();
    let b = device.create_layer_cylinder(32, 32, SurfaceType::Fbo).unwrap();
    let graphics_bound = |device: &Device<L>| device.graphics().bound_framebuffer(gl::FRAMEBUFFER);

    assert!(device.start_frame());
    device.bind_eye(Eye::Left);
    let eye = eye_framebuffer(&device, Eye::Left);
    assert_eq!(graphics_bound(&device), eye);

    device.bind_layer(a, gl::FRAMEBUFFER);
    let fbo_a = layer_framebuffer(&mut device, a);
    assert_eq!(graphics_bound(&device), fbo_a);

    device.bind_layer(b, gl::FRAMEBUFFER);
    let fbo_b = layer_framebuffer(&mut device, b);
    assert_eq!(graphics_bound(&device), fbo_b);
    assert_eq!(device.platform().acquired_count(), 3);

    // Binding the top again does nothing.
    device.bind_layer(b, gl::FRAMEBUFFER);
    assert_eq!(device.platform().acquired_count(), 3);

    // Only the top may be unbound.
    device.unbind_layer(a);
    assert_eq!(graphics_bound(&device), fbo_b);
    assert_eq!(device.platform().acquired_count(), 3);

    device.unbind_layer(b);
    assert_eq!(graphics_bound(&device), fbo_a);
    device.unbind_layer(a);
    assert_eq!(graphics_bound(&device), eye);
    assert_eq!(device.platform().acquired_count(), 1);

    device.end_frame(FrameEndMode::Apply);
    assert_eq!(device.platform().acquired_count(), 0);
}

#[test]
fn nested_binds_openxr() {
    nested_binds::<CompositionLayer>();
}

#[test]
fn nested_binds_oculus() {
    nested_binds::<OvrLayer>();
}

#[test]
fn binding_an_eye_releases_layers() {
    let mut device = default_device::<OvrLayer>();
    let a = device.create_layer_quad(32, 32, SurfaceType::Fbo).unwrap();
    assert!(device.start_frame());
    device.bind_eye(Eye::Left);
    device.bind_layer(a, gl::DRAW_FRAMEBUFFER);
    assert_eq!(device.layer(a).unwrap().bound_target(), gl::DRAW_FRAMEBUFFER);
    assert_eq!(device.platform().acquired_count(), 2);

    device.bind_eye(Eye::Right);
    assert_eq!(device.platform().acquired_count(), 1);
    assert_eq!(
        device.graphics().bound_framebuffer(gl::FRAMEBUFFER),
        eye_framebuffer(&device, Eye::Right)
    );
    assert_eq!(device.layer(a).unwrap().current_eye(), Eye::Right);
    device.end_frame(FrameEndMode::Apply);
}

#[test]
fn unbind_without_bind_is_ignored() {
    let mut device = default_device::<CompositionLayer>();
    let a = device.create_layer_quad(32, 32, SurfaceType::Fbo).unwrap();
    assert!(device.start_frame());
    device.unbind_layer(a);
    assert_eq!(device.platform().acquired_count(), 0);
    device.end_frame(FrameEndMode::Apply);
}

#[test]
fn projection_layers_bind_per_eye() {
    let mut device = default_device::<CompositionLayer>();
    let projection = device.create_layer_projection(64, 64, SurfaceType::Fbo).unwrap();
    assert!(device.start_frame());
    for &eye in Eye::ALL.iter() {
        device.bind_eye(eye);
        device.bind_layer(projection, gl::FRAMEBUFFER);
        let fbo = layer_framebuffer(&mut device, projection);
        assert_eq!(device.graphics().bound_framebuffer(gl::FRAMEBUFFER), fbo);
        device.unbind_layer(projection);
    }
    device.layer_mut(projection).unwrap().request_draw();
    device.end_frame(FrameEndMode::Apply);

    // Binding marks projection content as composited.
    let layers = submitted_layers(&device);
    assert_eq!(layers[0].layer_type(), Some(LayerType::Projection));
    assert_eq!(layers[0].layer_id(), Some(projection));
    match layers[0] {
        CompositionLayer::Projection { ref views, .. } => assert_ne!(views[0].sub_image.swapchain, views[1].sub_image.swapchain),
        ref other => panic!("expected a projection, got {:?}", other),
    }
}

#[test]
fn bind_without_session_does_nothing() {
    let mut device = default_device::<OvrLayer>();
    let a = device.create_layer_quad(32, 32, SurfaceType::Fbo).unwrap();
    device.end_session();
    assert!(!device.start_frame());
    device.bind_eye(Eye::Left);
    device.bind_layer(a, gl::FRAMEBUFFER);
    device.end_frame(FrameEndMode::Apply);
    assert!(device.platform().submissions().is_empty());
    assert_eq!(device.platform().acquired_count(), 0);
}

#[test]
fn unbind_restores_the_target_below() {
    let mut device = default_device::<CompositionLayer>();
    let a = device.create_layer_quad(32, 32, SurfaceType::Fbo).unwrap();
    let b = device.create_layer_quad(32, 32, SurfaceType::Fbo).unwrap();
    assert!(device.start_frame());
    device.bind_eye(Eye::Left);
    device.bind_layer(a, gl::FRAMEBUFFER);
    let fbo_a = layer_framebuffer(&mut device, a);
    device.bind_layer(b, gl::DRAW_FRAMEBUFFER);

    device.unbind_layer(b);
    assert_eq!(
        device.graphics().calls().last(),
        Some(&GraphicsCall::BindFramebuffer {
            target: gl::FRAMEBUFFER,
            framebuffer: fbo_a,
        })
    );

    device.unbind_layer(a);
    assert_eq!(
        device.graphics().calls().last(),
        Some(&GraphicsCall::BindFramebuffer {
            target: gl::FRAMEBUFFER,
            framebuffer: eye_framebuffer(&device, Eye::Left),
        })
    );
    device.end_frame(FrameEndMode::Apply);
}

#[test]
fn unbindable_projection_is_not_composited() {
    let mut device = default_device::<OvrLayer>();
    device.platform_mut().set_fail_allocations(true);
    let projection = device.create_layer_projection(64, 64, SurfaceType::Fbo).unwrap();
    assert!(device.start_frame());
    device.bind_eye(Eye::Left);
    device.bind_layer(projection, gl::FRAMEBUFFER);
    assert!(!device.layer(projection).unwrap().is_composited());
    assert_eq!(device.platform().acquired_count(), 1);
    device.end_frame(FrameEndMode::Apply);
}
