/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::fmt;

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// Errors that can be produced by compositor backends.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum Error {
    AllocationFailed(String),
    InvalidSwapChain,
    InvalidFramebuffer,
    ImageNotAcquired,
    ImageAlreadyAcquired,
    BackendSpecific(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::AllocationFailed(ref reason) => write!(f, "allocation failed: {}", reason),
            Error::InvalidSwapChain => write!(f, "invalid swapchain"),
            Error::InvalidFramebuffer => write!(f, "invalid framebuffer"),
            Error::ImageNotAcquired => write!(f, "no swapchain image acquired"),
            Error::ImageAlreadyAcquired => write!(f, "swapchain image already acquired"),
            Error::BackendSpecific(ref reason) => write!(f, "{}", reason),
        }
    }
}

impl std::error::Error for Error {}
