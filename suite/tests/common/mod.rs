//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Shared helpers for the suite tests

#![allow(dead_code)]

use bytes::Bytes;
use sockhost_codec::{CryptoError, CryptoService, FrameCodec};
use sockhost_service::{
    Connection, ConnectionHost, ConnectionId, ConnectionService, HandlerResult, HostConfig,
    HostEvent,
};
use std::io::Read;
use std::net::TcpStream;
use std::sync::mpsc;
use std::time::{Duration, Instant};

pub const WAIT: Duration = Duration::from_secs(10);

/// Echoes every message back to its sender
pub struct Echo;

impl ConnectionService for Echo {
    fn on_received(&self, _id: ConnectionId, conn: &Connection, payload: Bytes) -> HandlerResult {
        conn.send(&payload)?;
        Ok(())
    }
}

/// Echoes, except that the message `boom` makes the callback panic
pub struct Fragile;

impl ConnectionService for Fragile {
    fn on_received(&self, _id: ConnectionId, conn: &Connection, payload: Bytes) -> HandlerResult {
        if payload.as_ref() == b"boom" {
            panic!("handler exploded");
        }
        conn.send(&payload)?;
        Ok(())
    }
}

/// Toy cipher: XOR with a fixed key byte
pub struct XorCipher(pub u8);

impl CryptoService for XorCipher {
    fn encrypt(&self, plain: &[u8]) -> Result<Vec<u8>, CryptoError> {
        Ok(plain.iter().map(|b| b ^ self.0).collect())
    }

    fn decrypt(&self, cipher: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.encrypt(cipher)
    }
}

/// Small host configuration suited to tests
pub fn test_config() -> HostConfig {
    HostConfig::default()
        .with_threads(2, 8)
        .with_io_threads(2)
        .with_idle_timeout(None)
        .with_shutdown_timeout(Duration::from_secs(2))
}

/// Subscribe a channel to every host event
pub fn events(host: &ConnectionHost) -> mpsc::Receiver<HostEvent> {
    let (tx, rx) = mpsc::channel();
    host.subscribe(move |event: &HostEvent| {
        let _ = tx.send(event.clone());
    });
    rx
}

/// Wait for the first event matching `predicate`, skipping others
pub fn wait_for(
    rx: &mpsc::Receiver<HostEvent>,
    mut predicate: impl FnMut(&HostEvent) -> bool,
) -> HostEvent {
    let deadline = Instant::now() + WAIT;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok(event) if predicate(&event) => return event,
            Ok(_) => continue,
            Err(e) => panic!("expected event did not arrive: {e}"),
        }
    }
}

/// Wait for the next `Connected` event and return its connection ID
pub fn next_connected(rx: &mpsc::Receiver<HostEvent>) -> ConnectionId {
    match wait_for(rx, |event| matches!(event, HostEvent::Connected { .. })) {
        HostEvent::Connected { id, .. } => id,
        _ => unreachable!(),
    }
}

/// Poll `condition` until it holds or the wait expires
pub fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    condition()
}

/// Read from a blocking socket until one complete frame is available
pub fn read_frame(stream: &mut TcpStream, codec: &FrameCodec) -> Bytes {
    stream.set_read_timeout(Some(WAIT)).unwrap();
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        if let Some((payload, _rest)) = codec.try_extract(&buffer).unwrap() {
            return payload;
        }
        let n = stream.read(&mut chunk).unwrap();
        assert!(n > 0, "connection closed before a full frame arrived");
        buffer.extend_from_slice(&chunk[..n]);
    }
}
