// Copyright 2015 The Servo Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Pipe client over a Windows named pipe.
//!
//! The open loop is the classic named-pipe client handshake: `CreateFileW`
//! with the open-existing policy, `WaitNamedPipeW` when every server
//! instance is taken, then `SetNamedPipeHandleState` to switch the handle to
//! message-mode reads. A wait that succeeds only means an instance freed up
//! at that moment; the re-opened `CreateFileW` can still lose the race to
//! another client and come back busy, which is why the open is a loop.

use std::io;
use std::thread;
use std::time::Duration;

use windows::core::PCWSTR;
use windows::Win32::Foundation::{
    CloseHandle, ERROR_FILE_NOT_FOUND, ERROR_PIPE_BUSY, ERROR_SEM_TIMEOUT, GENERIC_READ,
    GENERIC_WRITE, HANDLE,
};
use windows::Win32::Storage::FileSystem::{
    CreateFileW, WriteFile, FILE_ATTRIBUTE_NORMAL, FILE_SHARE_NONE, OPEN_EXISTING,
};
use windows::Win32::System::Pipes::{
    SetNamedPipeHandleState, WaitNamedPipeW, PIPE_READMODE_MESSAGE,
};

use crate::error::ConnectError;

#[cfg(test)]
mod tests;

/// `WaitNamedPipe` treats 0 as "use the server's default" and `!0` as "wait
/// forever"; clamp so a caller-supplied duration can express neither.
fn wait_timeout_ms(busy_wait: Duration) -> u32 {
    u32::try_from(busy_wait.as_millis())
        .unwrap_or(u32::MAX - 1)
        .clamp(1, u32::MAX - 1)
}

fn wait_timed_out(endpoint: &str, timeout: Duration) -> ConnectError {
    ConnectError::WaitTimedOut {
        name: endpoint.to_owned(),
        timeout,
    }
}

#[derive(Debug)]
struct WinHandle {
    h: HANDLE,
}

unsafe impl Send for WinHandle {}

impl Drop for WinHandle {
    fn drop(&mut self) {
        unsafe {
            if !self.h.is_invalid() {
                let result = CloseHandle(self.h);
                assert!(thread::panicking() || result.is_ok());
            }
        }
    }
}

impl WinHandle {
    fn new(h: HANDLE) -> WinHandle {
        WinHandle { h }
    }

    fn as_raw(&self) -> HANDLE {
        self.h
    }
}

#[derive(Debug)]
pub struct OsPipeClient {
    handle: WinHandle,
}

impl OsPipeClient {
    pub(crate) fn connect(
        endpoint: &str,
        busy_wait: Duration,
        max_busy_waits: Option<u32>,
    ) -> Result<OsPipeClient, ConnectError> {
        let wide_name: Vec<u16> = endpoint.encode_utf16().chain(Some(0)).collect();
        let name = PCWSTR::from_raw(wide_name.as_ptr());
        let timeout_ms = wait_timeout_ms(busy_wait);
        let mut busy_waits = 0u32;

        let handle = loop {
            let opened = unsafe {
                CreateFileW(
                    name,
                    (GENERIC_READ | GENERIC_WRITE).0,
                    FILE_SHARE_NONE,
                    None,
                    OPEN_EXISTING,
                    FILE_ATTRIBUTE_NORMAL,
                    None,
                )
            };
            match opened {
                Ok(handle) => break WinHandle::new(handle),
                Err(err) if err.code() == ERROR_FILE_NOT_FOUND.to_hresult() => {
                    return Err(ConnectError::NotFound(endpoint.to_owned()));
                },
                Err(err) if err.code() == ERROR_PIPE_BUSY.to_hresult() => {
                    if max_busy_waits.is_some_and(|max| busy_waits >= max) {
                        return Err(wait_timed_out(endpoint, busy_wait));
                    }
                    busy_waits += 1;
                    pipe_trace!(
                        "[pipe {}] busy; waiting up to {}ms for a free instance",
                        endpoint,
                        timeout_ms
                    );
                    if let Err(err) = unsafe { WaitNamedPipeW(name, timeout_ms) } {
                        return Err(if err.code() == ERROR_SEM_TIMEOUT.to_hresult() {
                            wait_timed_out(endpoint, busy_wait)
                        } else {
                            ConnectError::Io(err.into())
                        });
                    }
                    // An instance freed up; re-race for it with CreateFileW.
                },
                Err(err) => return Err(ConnectError::Io(err.into())),
            }
        };

        // Message-mode reads; the write side takes its type from the server
        // end of the pipe. The handle is dropped, and therefore closed, if
        // the switch fails.
        let mode = PIPE_READMODE_MESSAGE;
        unsafe { SetNamedPipeHandleState(handle.as_raw(), Some(&mode), None, None) }
            .map_err(|err| ConnectError::MessageMode(err.into()))?;

        Ok(OsPipeClient { handle })
    }

    /// One message per call; the transport either takes the whole buffer in
    /// a single `WriteFile` or the send fails.
    pub(crate) fn send_message(&self, message: &[u8]) -> io::Result<()> {
        let mut written = 0u32;
        unsafe {
            WriteFile(
                self.handle.as_raw(),
                Some(message),
                Some(&mut written),
                None,
            )
        }
        .map_err(io::Error::from)?;
        if written as usize != message.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "message truncated by transport",
            ));
        }
        Ok(())
    }
}
