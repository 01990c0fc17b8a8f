// Copyright 2015 The Servo Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Why a [`PipeClient`](crate::PipeClient) could not be constructed.
///
/// Connection setup is the loud half of the error model: it fails with an
/// error and no partially-usable client. Once a client exists, sends report
/// [`SendStatus`](crate::SendStatus) values instead.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// No endpoint with this name exists. Surfaced immediately, no retry.
    #[error("no pipe endpoint exists at {0:?}")]
    NotFound(String),

    /// The endpoint exists but every server-side instance stayed taken for
    /// a whole wait window.
    #[error("pipe endpoint {name:?} is busy: no instance freed up within {timeout:?}")]
    WaitTimedOut { name: String, timeout: Duration },

    /// Connected, but the handle could not be switched to message-mode
    /// reads. The handle is closed before this is returned.
    #[error("failed to switch pipe handle to message read mode")]
    MessageMode(#[source] io::Error),

    /// Any other failure while opening the endpoint.
    #[error("failed to open pipe endpoint")]
    Io(#[from] io::Error),
}
