// Copyright 2015 The Servo Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Pipe client over an `AF_UNIX` seqpacket socket.
//!
//! Seqpacket is the Unix spelling of message mode: each `send` is delivered
//! to a single `recv` as one discrete unit. The busy condition -- every
//! server-side instance taken -- shows up here as `EAGAIN` from a connect
//! against a full listen backlog, which is only observable on a nonblocking
//! socket; connects are therefore made nonblocking and the flag is cleared
//! again once the connection is established.

use std::ffi::CString;
use std::io;
use std::mem;
use std::thread;
use std::time::{Duration, Instant};

use libc::{c_char, c_int, c_void, sa_family_t, sockaddr, sockaddr_un, socklen_t};
use libc::{EAGAIN, ENOENT, SOCK_SEQPACKET, SOL_SOCKET, SO_TYPE};

use crate::error::ConnectError;

#[cfg(target_os = "linux")]
const SOCK_FLAGS: c_int = libc::SOCK_CLOEXEC;
#[cfg(not(target_os = "linux"))]
const SOCK_FLAGS: c_int = 0;

/// Poll step while waiting out a busy endpoint. There is no Unix analogue
/// of `WaitNamedPipe`, so a wait window is a bounded connect-poll loop.
const BUSY_POLL_INTERVAL: Duration = Duration::from_millis(10);

unsafe fn new_sockaddr_un(path: *const c_char) -> (sockaddr_un, usize) {
    let mut sockaddr: sockaddr_un = mem::zeroed();
    libc::strncpy(
        sockaddr.sun_path.as_mut_ptr(),
        path,
        sockaddr.sun_path.len() - 1,
    );
    sockaddr.sun_family = libc::AF_UNIX as sa_family_t;
    (sockaddr, mem::size_of::<sockaddr_un>())
}

enum ConnectAttempt {
    Connected(c_int),
    Busy,
    Failed(io::Error),
}

fn attempt_connect(path: &CString) -> ConnectAttempt {
    unsafe {
        let fd = libc::socket(
            libc::AF_UNIX,
            SOCK_SEQPACKET | libc::SOCK_NONBLOCK | SOCK_FLAGS,
            0,
        );
        if fd < 0 {
            return ConnectAttempt::Failed(io::Error::last_os_error());
        }
        let (sockaddr, len) = new_sockaddr_un(path.as_ptr());
        if libc::connect(
            fd,
            &sockaddr as *const _ as *const sockaddr,
            len as socklen_t,
        ) < 0
        {
            let err = io::Error::last_os_error();
            libc::close(fd);
            return match err.raw_os_error() {
                // A full listen backlog: the endpoint exists but has no
                // free server-side instance.
                Some(EAGAIN) => ConnectAttempt::Busy,
                _ => ConnectAttempt::Failed(err),
            };
        }

        // Nonblocking was only needed to make the busy condition
        // distinguishable; sends themselves should block.
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags < 0 || libc::fcntl(fd, libc::F_SETFL, flags & !libc::O_NONBLOCK) < 0 {
            let err = io::Error::last_os_error();
            libc::close(fd);
            return ConnectAttempt::Failed(err);
        }

        ConnectAttempt::Connected(fd)
    }
}

enum WaitOutcome {
    Connected(c_int),
    TimedOut,
    Failed(io::Error),
}

/// Waits up to `busy_wait` for a server-side instance to free up. Unlike
/// `WaitNamedPipe`, a poll that lands a connection completes the open
/// directly, so a wait window never loses a re-open race afterwards.
fn wait_for_free_instance(path: &CString, busy_wait: Duration) -> WaitOutcome {
    let deadline = Instant::now() + busy_wait;
    loop {
        thread::sleep(BUSY_POLL_INTERVAL);
        match attempt_connect(path) {
            ConnectAttempt::Connected(fd) => return WaitOutcome::Connected(fd),
            ConnectAttempt::Failed(err) => return WaitOutcome::Failed(err),
            ConnectAttempt::Busy => {
                if Instant::now() >= deadline {
                    return WaitOutcome::TimedOut;
                }
            },
        }
    }
}

fn classify_open_failure(endpoint: &str, err: io::Error) -> ConnectError {
    if err.raw_os_error() == Some(ENOENT) {
        ConnectError::NotFound(endpoint.to_owned())
    } else {
        ConnectError::Io(err)
    }
}

fn wait_timed_out(endpoint: &str, timeout: Duration) -> ConnectError {
    ConnectError::WaitTimedOut {
        name: endpoint.to_owned(),
        timeout,
    }
}

#[derive(Debug)]
pub struct OsPipeClient {
    fd: c_int,
}

impl Drop for OsPipeClient {
    fn drop(&mut self) {
        unsafe {
            let result = libc::close(self.fd);
            assert!(thread::panicking() || result == 0);
        }
    }
}

impl OsPipeClient {
    pub(crate) fn connect(
        endpoint: &str,
        busy_wait: Duration,
        max_busy_waits: Option<u32>,
    ) -> Result<OsPipeClient, ConnectError> {
        let path = CString::new(endpoint).map_err(|_| {
            ConnectError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "endpoint name contains an interior NUL",
            ))
        })?;

        let mut busy_waits = 0u32;
        loop {
            match attempt_connect(&path) {
                ConnectAttempt::Connected(fd) => return OsPipeClient::from_connected_fd(fd),
                ConnectAttempt::Failed(err) => return Err(classify_open_failure(endpoint, err)),
                ConnectAttempt::Busy => {
                    if max_busy_waits.is_some_and(|max| busy_waits >= max) {
                        return Err(wait_timed_out(endpoint, busy_wait));
                    }
                    busy_waits += 1;
                    pipe_trace!(
                        "[pipe {}] busy; waiting up to {:?} for a free instance",
                        endpoint,
                        busy_wait
                    );
                    match wait_for_free_instance(&path, busy_wait) {
                        WaitOutcome::Connected(fd) => return OsPipeClient::from_connected_fd(fd),
                        WaitOutcome::Failed(err) => {
                            return Err(classify_open_failure(endpoint, err))
                        },
                        WaitOutcome::TimedOut => return Err(wait_timed_out(endpoint, busy_wait)),
                    }
                },
            }
        }
    }

    /// Wraps the fd before configuring it, so it is released even when the
    /// message-mode check fails.
    fn from_connected_fd(fd: c_int) -> Result<OsPipeClient, ConnectError> {
        let client = OsPipeClient { fd };
        client.verify_message_mode()?;
        Ok(client)
    }

    /// Message boundaries on Unix come from the socket type itself; the
    /// configuration step checks the endpoint really is seqpacket.
    fn verify_message_mode(&self) -> Result<(), ConnectError> {
        let mut sock_type: c_int = 0;
        let mut len = mem::size_of::<c_int>() as socklen_t;
        let result = unsafe {
            libc::getsockopt(
                self.fd,
                SOL_SOCKET,
                SO_TYPE,
                &mut sock_type as *mut _ as *mut c_void,
                &mut len,
            )
        };
        if result < 0 {
            return Err(ConnectError::MessageMode(io::Error::last_os_error()));
        }
        if sock_type != SOCK_SEQPACKET {
            return Err(ConnectError::MessageMode(io::Error::new(
                io::ErrorKind::InvalidData,
                "endpoint does not preserve message boundaries",
            )));
        }
        Ok(())
    }

    /// One message per call; the transport either takes the whole buffer or
    /// the send fails.
    pub(crate) fn send_message(&self, message: &[u8]) -> io::Result<()> {
        let result = unsafe {
            libc::send(
                self.fd,
                message.as_ptr() as *const c_void,
                message.len(),
                libc::MSG_NOSIGNAL,
            )
        };
        if result < 0 {
            return Err(io::Error::last_os_error());
        }
        if result as usize != message.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "message truncated by transport",
            ));
        }
        Ok(())
    }
}
