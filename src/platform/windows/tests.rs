// Copyright 2015 The Servo Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::{ConnectError, PipeClient, PipeClientConfig};

fn fresh_pipe_name() -> String {
    format!(r"\\.\pipe\message-pipe-test-{}", Uuid::new_v4())
}

#[test]
fn connect_to_missing_pipe_fails_immediately() {
    let started = Instant::now();
    let err = PipeClient::connect(PipeClientConfig::new(fresh_pipe_name())).unwrap_err();
    assert!(matches!(err, ConnectError::NotFound(_)));
    // Not-found must not enter the busy-wait path.
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn missing_pipe_error_names_the_endpoint() {
    let name = fresh_pipe_name();
    match PipeClient::connect(PipeClientConfig::new(&name)) {
        Err(ConnectError::NotFound(reported)) => assert_eq!(reported, name),
        other => panic!("expected NotFound, got {:?}", other.err()),
    }
}
