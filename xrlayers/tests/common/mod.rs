/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use xrlayers::headless::{HeadlessGraphics, HeadlessPlatform};
use xrlayers::{CompositorConfig, LayerDevice, NativeLayer};
use xrlayers_api::{
    CompositeNotice, DeviceDelegate, Eye, FrameEndMode, LayerId, NativeSwapChain, SurfaceChangedEvent,
    SurfaceType,
};

pub type Device<L> = LayerDevice<HeadlessPlatform<L>, HeadlessGraphics>;

pub fn device<L: NativeLayer>(config: CompositorConfig) -> Device<L> {
    let mut device = LayerDevice::new(HeadlessPlatform::default(), HeadlessGraphics::new(), config);
    device.start_session();
    device
}

pub fn default_device<L: NativeLayer>() -> Device<L> {
    device(CompositorConfig::default())
}

/// Collects the surface-changed events of one layer.
#[derive(Clone)]
pub struct Recorder(Arc<Mutex<Vec<SurfaceChangedEvent>>>);

impl Recorder {
    pub fn attach<L: NativeLayer>(device: &mut Device<L>, layer: LayerId) -> Recorder {
        let events = Arc::new(Mutex::new(vec![]));
        let sink = events.clone();
        device
            .layer_mut(layer)
            .unwrap()
            .set_surface_changed_delegate(Box::new(move |event| sink.lock().unwrap().push(event)));
        Recorder(events)
    }

    pub fn events(&self) -> Vec<SurfaceChangedEvent> {
        self.0.lock().unwrap().clone()
    }

    pub fn last_notice(&self) -> CompositeNotice {
        self.events().iter().rev().find_map(|e| e.notice).unwrap()
    }
}

/// Post the newest composite notice of `recorder`. It is applied by the
/// next `start_frame`.
pub fn composite<L: NativeLayer>(device: &Device<L>, recorder: &Recorder) {
    device.requester().surface_composited(recorder.last_notice());
}

pub fn composited_quad<L: NativeLayer>(device: &mut Device<L>, width: i32, height: i32) -> (LayerId, Recorder) {
    let id = device.create_layer_quad(width, height, SurfaceType::Fbo).unwrap();
    let recorder = Recorder::attach(device, id);
    composite(device, &recorder);
    (id, recorder)
}

/// One full frame. `during` runs between the eyes and the end of the frame.
pub fn frame<L: NativeLayer, F: FnOnce(&mut Device<L>)>(device: &mut Device<L>, during: F) {
    assert!(device.start_frame());
    device.bind_eye(Eye::Left);
    device.bind_eye(Eye::Right);
    during(device);
    device.end_frame(FrameEndMode::Apply);
}

pub fn request<L: NativeLayer>(device: &mut Device<L>, layers: &[LayerId]) {
    for &id in layers {
        device.layer_mut(id).unwrap().request_draw();
    }
}

/// The layer ids of the last submission, `None` for the main projection.
pub fn submitted<L: NativeLayer>(device: &Device<L>) -> Vec<Option<LayerId>> {
    device
        .platform()
        .last_submission()
        .unwrap()
        .layers
        .iter()
        .map(NativeLayer::layer_id)
        .collect()
}

pub fn submitted_layers<L: NativeLayer>(device: &Device<L>) -> Vec<L> {
    device.platform().last_submission().unwrap().layers.clone()
}

pub fn native_of<L: NativeLayer>(device: &Device<L>, layer: LayerId) -> NativeSwapChain {
    device
        .compositor()
        .layer_swapchain(layer, Eye::Left)
        .and_then(|s| s.native())
        .unwrap()
}

/// A small deterministic generator for randomized tests.
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Lcg {
        Lcg(seed)
    }

    pub fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    pub fn below(&mut self, n: u64) -> u64 {
        self.next() % n
    }

    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.below(i as u64 + 1) as usize;
            items.swap(i, j);
        }
    }
}
