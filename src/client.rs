// Copyright 2015 The Servo Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Public client surface over the per-OS pipe transports.

use std::cell::Cell;
use std::io;
use std::marker::PhantomData;
use std::time::Duration;

use crate::error::ConnectError;
use crate::platform::OsPipeClient;

/// How long a single wait for a busy endpoint may block before the connect
/// attempt fails with [`ConnectError::WaitTimedOut`].
pub const DEFAULT_BUSY_WAIT: Duration = Duration::from_millis(20_000);

/// Construction-time settings for [`PipeClient::connect`].
///
/// The endpoint name is the entire wire contract: it must match exactly what
/// the server process is listening on (a `\\.\pipe\...` path on Windows, a
/// socket path elsewhere).
#[derive(Clone, Debug)]
pub struct PipeClientConfig {
    pub endpoint: String,
    pub busy_wait: Duration,
    pub max_busy_waits: Option<u32>,
    pub encoding: TextEncoding,
}

impl PipeClientConfig {
    pub fn new<S: Into<String>>(endpoint: S) -> PipeClientConfig {
        PipeClientConfig {
            endpoint: endpoint.into(),
            busy_wait: DEFAULT_BUSY_WAIT,
            max_busy_waits: None,
            encoding: TextEncoding::native(),
        }
    }

    /// Upper bound on a single wait for a busy endpoint.
    pub fn busy_wait(mut self, busy_wait: Duration) -> PipeClientConfig {
        self.busy_wait = busy_wait;
        self
    }

    /// Bound the number of busy waits before the connect attempt gives up
    /// with [`ConnectError::WaitTimedOut`]. The default (`None`) keeps
    /// retrying for as long as each individual wait keeps succeeding; every
    /// wait is still bounded by [`busy_wait`](Self::busy_wait) on its own.
    pub fn max_busy_waits(mut self, max: u32) -> PipeClientConfig {
        self.max_busy_waits = Some(max);
        self
    }

    pub fn encoding(mut self, encoding: TextEncoding) -> PipeClientConfig {
        self.encoding = encoding;
        self
    }
}

/// Wire encoding of a text payload.
///
/// The receiver must decode with the same convention; there is no length
/// prefix and no framing beyond the transport's message boundaries.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TextEncoding {
    /// One byte per UTF-8 code unit, terminated by a single zero byte.
    Utf8,
    /// Two bytes per UTF-16 code unit in native byte order, terminated by a
    /// two-byte zero element.
    WideUtf16,
}

impl TextEncoding {
    /// The platform's native character width: wide on Windows, where named
    /// pipe peers conventionally decode UTF-16, single-byte elsewhere.
    pub fn native() -> TextEncoding {
        if cfg!(windows) {
            TextEncoding::WideUtf16
        } else {
            TextEncoding::Utf8
        }
    }

    /// Encodes `text` followed by one null element of the encoding's width,
    /// so the output is `(code units + 1) * element width` bytes long.
    pub(crate) fn encode_with_nul(self, text: &str) -> Vec<u8> {
        match self {
            TextEncoding::Utf8 => {
                let mut bytes = Vec::with_capacity(text.len() + 1);
                bytes.extend_from_slice(text.as_bytes());
                bytes.push(0);
                bytes
            },
            TextEncoding::WideUtf16 => {
                let mut bytes = Vec::with_capacity((text.len() + 1) * 2);
                for unit in text.encode_utf16().chain(Some(0u16)) {
                    bytes.extend_from_slice(&unit.to_ne_bytes());
                }
                bytes
            },
        }
    }
}

/// Outcome of a [`PipeClient::send`] call.
///
/// Sends report status values rather than `Result`: setup failures abort
/// construction, runtime failures are ordinary values for the embedding
/// application to interpret.
#[derive(Debug)]
#[must_use]
pub enum SendStatus {
    /// Every byte of the message was accepted by the transport in one write.
    Sent,
    /// The payload was empty or contained an interior NUL, which would break
    /// the terminator framing. Nothing was written.
    InvalidPayload,
    /// The transport rejected the write; the error is passed through as-is.
    TransportError(io::Error),
}

impl SendStatus {
    pub fn is_sent(&self) -> bool {
        matches!(self, SendStatus::Sent)
    }
}

/// A connected, message-mode client for a local pipe endpoint.
///
/// The client owns its connection handle exclusively and releases it exactly
/// once on drop. It may move between threads but is deliberately not
/// shareable: one owner, one thread, matching the exclusive-handle contract.
#[derive(Debug)]
pub struct PipeClient {
    os: OsPipeClient,
    encoding: TextEncoding,
    nosync_marker: PhantomData<Cell<()>>,
}

impl PipeClient {
    /// Connects to `config.endpoint` and switches the channel into
    /// message-mode reads.
    ///
    /// A missing endpoint fails immediately with [`ConnectError::NotFound`];
    /// a busy one is waited on in windows of `config.busy_wait`, failing with
    /// [`ConnectError::WaitTimedOut`] once a whole window passes without a
    /// server-side instance freeing up. On any error no client is produced
    /// and any handle opened along the way has already been closed.
    pub fn connect(config: PipeClientConfig) -> Result<PipeClient, ConnectError> {
        let os = OsPipeClient::connect(&config.endpoint, config.busy_wait, config.max_busy_waits)?;
        Ok(PipeClient {
            os,
            encoding: config.encoding,
            nosync_marker: PhantomData,
        })
    }

    /// Sends one null-terminated text message as a single message-mode write.
    ///
    /// Success means the transport accepted all
    /// `(code units + 1) * element width` bytes in one write; no
    /// acknowledgment from the receiving side is awaited or interpreted.
    /// There is no partial-write recovery: a short write is a
    /// [`SendStatus::TransportError`], not a retry.
    pub fn send(&self, text: &str) -> SendStatus {
        if text.is_empty() || text.contains('\0') {
            return SendStatus::InvalidPayload;
        }
        let message = self.encoding.encode_with_nul(text);
        match self.os.send_message(&message) {
            Ok(()) => SendStatus::Sent,
            Err(err) => SendStatus::TransportError(err),
        }
    }

    pub fn encoding(&self) -> TextEncoding {
        self.encoding
    }
}
