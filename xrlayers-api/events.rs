/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use crate::LayerId;
use crate::SurfaceHandle;

use std::fmt;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// A non-owning name for the adapter that should receive composite
/// notices for a surface. When a surface moves to another layer the
/// target moves with it, so late notices reach the new owner.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct TargetId(usize);

static NEXT_TARGET_ID: AtomicUsize = AtomicUsize::new(0);

impl TargetId {
    pub fn new() -> TargetId {
        TargetId(NEXT_TARGET_ID.fetch_add(1, Ordering::SeqCst))
    }
}

/// Handed to the embedder with every `SurfaceChange::Create`. Sending it
/// back once content has reached the surface marks that swapchain
/// generation as composited.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct CompositeNotice {
    pub target: TargetId,
    pub generation: u64,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum SurfaceChange {
    Create,
    Destroy,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct SurfaceChangedEvent {
    pub layer: LayerId,
    pub change: SurfaceChange,
    pub surface: Option<SurfaceHandle>,
    pub width: i32,
    pub height: i32,
    pub notice: Option<CompositeNotice>,
}

pub trait SurfaceChangedDelegate: 'static + Send {
    fn surface_changed(&mut self, event: SurfaceChangedEvent);
}

impl<F> SurfaceChangedDelegate for F
where
    F: FnMut(SurfaceChangedEvent) + 'static + Send,
{
    fn surface_changed(&mut self, event: SurfaceChangedEvent) {
        self(event)
    }
}

/// Holds back the latest surface creation until a delegate is attached.
pub enum SurfaceChangedBuffer {
    Pending(Option<SurfaceChangedEvent>),
    Sink(Box<dyn SurfaceChangedDelegate>),
}

impl Default for SurfaceChangedBuffer {
    fn default() -> Self {
        SurfaceChangedBuffer::Pending(None)
    }
}

impl fmt::Debug for SurfaceChangedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            SurfaceChangedBuffer::Pending(ref event) => {
                f.debug_tuple("Pending").field(event).finish()
            }
            SurfaceChangedBuffer::Sink(_) => f.write_str("Sink"),
        }
    }
}

impl SurfaceChangedBuffer {
    pub fn notify(&mut self, event: SurfaceChangedEvent) {
        match *self {
            SurfaceChangedBuffer::Sink(ref mut sink) => sink.surface_changed(event),
            SurfaceChangedBuffer::Pending(ref mut pending) => match event.change {
                SurfaceChange::Create => *pending = Some(event),
                SurfaceChange::Destroy => {
                    // The surface never reached anyone, there is nothing to tear down.
                    log::debug!("Dropping surface destroy for {:?}, no delegate", event.layer);
                    *pending = None;
                }
            },
        }
    }

    pub fn upgrade(&mut self, mut sink: Box<dyn SurfaceChangedDelegate>) {
        if let SurfaceChangedBuffer::Pending(ref mut pending) = *self {
            if let Some(event) = pending.take() {
                sink.surface_changed(event);
            }
        }
        *self = SurfaceChangedBuffer::Sink(sink)
    }

    pub fn has_pending(&self) -> bool {
        match *self {
            SurfaceChangedBuffer::Pending(ref pending) => pending.is_some(),
            SurfaceChangedBuffer::Sink(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn event(layer: LayerId, change: SurfaceChange) -> SurfaceChangedEvent {
        SurfaceChangedEvent {
            layer,
            change,
            surface: None,
            width: 4,
            height: 4,
            notice: None,
        }
    }

    #[test]
    fn create_before_delegate_is_replayed() {
        let layer = LayerId::new();
        let seen = Arc::new(Mutex::new(vec![]));
        let seen_ = seen.clone();
        let mut buffer = SurfaceChangedBuffer::default();
        buffer.notify(event(layer, SurfaceChange::Create));
        assert!(buffer.has_pending());
        buffer.upgrade(Box::new(move |e: SurfaceChangedEvent| {
            seen_.lock().unwrap().push(e.change)
        }));
        assert_eq!(*seen.lock().unwrap(), vec![SurfaceChange::Create]);
        assert!(!buffer.has_pending());
    }

    #[test]
    fn destroy_discards_pending_create() {
        let layer = LayerId::new();
        let mut buffer = SurfaceChangedBuffer::default();
        buffer.notify(event(layer, SurfaceChange::Create));
        buffer.notify(event(layer, SurfaceChange::Destroy));
        assert!(!buffer.has_pending());
    }
}
