// Copyright 2015 The Servo Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A minimal client for message-mode IPC pipe endpoints.
//!
//! [`PipeClient`] connects to a well-known local endpoint exposed by another
//! process -- a named pipe on Windows, a seqpacket socket elsewhere --
//! switches the channel into message-oriented reads, and sends one
//! null-terminated text message per [`PipeClient::send`] call. There is no
//! receiving, no response handling, and no reconnection: a client that loses
//! its peer surfaces the loss as a failed send.
//!
//! Connection setup distinguishes a missing endpoint (fatal, surfaced
//! immediately) from a busy one (every server-side instance taken); busy
//! endpoints are waited on in bounded windows of
//! [`PipeClientConfig::busy_wait`]. Once a client exists it always holds a
//! valid, connected, message-mode handle, released exactly once on drop.

use std::env;
use std::sync::LazyLock;

pub(crate) static DEBUG_TRACE_ENABLED: LazyLock<bool> =
    LazyLock::new(|| env::var_os("MESSAGE_PIPE_DEBUG_TRACE").is_some());

/// Debug macro to better track what's going on in case of errors.
macro_rules! pipe_trace {
    ($($rest:tt)*) => {
        if cfg!(feature = "pipe-trace") {
            if *$crate::DEBUG_TRACE_ENABLED { println!($($rest)*); }
        }
    }
}

mod client;
mod error;
mod platform;


pub use client::{PipeClient, PipeClientConfig, SendStatus, TextEncoding, DEFAULT_BUSY_WAIT};
pub use error::ConnectError;
