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

//! End-to-end host scenarios over real loopback sockets

mod common;

use common::*;
use sockhost_codec::FrameCodec;
use sockhost_service::{
    ConnectionHost, ConnectionState, Direction, HostError, HostEvent, ListenerConfig, NoopService,
    UdpConfig,
};
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream, UdpSocket};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

fn listener() -> ListenerConfig {
    ListenerConfig::new("127.0.0.1:0".parse().unwrap())
}

#[test]
fn ping_frame_matches_wire_format() {
    let host = ConnectionHost::new(
        test_config().with_header(vec![0xAAu8, 0x55]),
        Arc::new(NoopService),
    )
    .unwrap();
    host.add_listener(listener()).unwrap();
    let rx = events(&host);
    host.start().unwrap();

    let mut client = TcpStream::connect(host.local_addrs()[0]).unwrap();
    let id = next_connected(&rx);
    client
        .write_all(&[0xAA, 0x55, 0x00, 0x08, 0x50, 0x49, 0x4E, 0x47])
        .unwrap();

    match wait_for(&rx, |e| matches!(e, HostEvent::Received { .. })) {
        HostEvent::Received { id: from, payload } => {
            assert_eq!(from, id);
            assert_eq!(&payload[..], b"PING");
        }
        _ => unreachable!(),
    }

    host.send(id, b"PING").unwrap();
    let mut wire = [0u8; 8];
    client.set_read_timeout(Some(WAIT)).unwrap();
    client.read_exact(&mut wire).unwrap();
    assert_eq!(wire, [0xAA, 0x55, 0x00, 0x08, 0x50, 0x49, 0x4E, 0x47]);

    host.stop();
}

#[test]
fn split_and_coalesced_frames_are_reassembled() {
    let host = ConnectionHost::new(test_config(), Arc::new(Echo)).unwrap();
    host.add_listener(listener()).unwrap();
    host.start().unwrap();
    let codec = FrameCodec::new();

    let mut client = TcpStream::connect(host.local_addrs()[0]).unwrap();
    client.set_nodelay(true).unwrap();

    let mut wire = Vec::new();
    for payload in [&b"alpha"[..], b"beta", b"gamma"] {
        wire.extend_from_slice(&codec.encode(payload).unwrap());
    }
    // First frame split mid-length, the rest coalesced
    client.write_all(&wire[..1]).unwrap();
    thread::sleep(Duration::from_millis(50));
    client.write_all(&wire[1..]).unwrap();

    let mut buffer = Vec::new();
    let mut received = Vec::new();
    let mut chunk = [0u8; 1024];
    client.set_read_timeout(Some(WAIT)).unwrap();
    while received.len() < 3 {
        while let Some((payload, rest)) = codec.try_extract(&buffer).unwrap() {
            let consumed = buffer.len() - rest.len();
            received.push(payload);
            buffer.drain(..consumed);
        }
        if received.len() == 3 {
            break;
        }
        let n = client.read(&mut chunk).unwrap();
        assert!(n > 0);
        buffer.extend_from_slice(&chunk[..n]);
    }
    assert_eq!(&received[0][..], b"alpha");
    assert_eq!(&received[1][..], b"beta");
    assert_eq!(&received[2][..], b"gamma");

    host.stop();
}

#[test]
fn handler_fault_only_disconnects_its_connection() {
    let host = ConnectionHost::new(test_config(), Arc::new(Fragile)).unwrap();
    host.add_listener(listener()).unwrap();
    let rx = events(&host);
    host.start().unwrap();
    let addr = host.local_addrs()[0];
    let codec = FrameCodec::new();

    let mut a = TcpStream::connect(addr).unwrap();
    let id_a = next_connected(&rx);
    let mut b = TcpStream::connect(addr).unwrap();
    let id_b = next_connected(&rx);

    a.write_all(&codec.encode(b"boom").unwrap()).unwrap();

    match wait_for(&rx, |e| matches!(e, HostEvent::ConnectionError { id, .. } if *id == id_a)) {
        HostEvent::ConnectionError { error, .. } => {
            assert!(matches!(&*error, HostError::Handler(e) if e.is_panic()))
        }
        _ => unreachable!(),
    }
    match wait_for(&rx, |e| matches!(e, HostEvent::Disconnected { id, .. } if *id == id_a)) {
        HostEvent::Disconnected { error, .. } => {
            assert!(matches!(error.as_deref(), Some(HostError::Handler(_))))
        }
        _ => unreachable!(),
    }

    // The faulty peer sees its socket closed
    a.set_read_timeout(Some(WAIT)).unwrap();
    let mut rest = Vec::new();
    let _ = a.read_to_end(&mut rest);

    // The sibling keeps working
    b.write_all(&codec.encode(b"still here").unwrap()).unwrap();
    assert_eq!(&read_frame(&mut b, &codec)[..], b"still here");
    assert_eq!(
        host.get_connection(id_b).map(|c| c.state()),
        Some(ConnectionState::Connected)
    );
    assert!(host.get_connection(id_a).is_none());
    assert_eq!(host.metrics().handler_errors, 1);

    host.stop();
}

#[test]
fn idle_connections_are_swept() {
    let idle_timeout = Duration::from_millis(400);
    let check_interval = Duration::from_millis(100);
    let host = ConnectionHost::new(
        test_config()
            .with_idle_timeout(Some(idle_timeout))
            .with_idle_check_interval(check_interval),
        Arc::new(NoopService),
    )
    .unwrap();
    host.add_listener(listener()).unwrap();
    let rx = events(&host);
    host.start().unwrap();
    let addr = host.local_addrs()[0];
    let codec = FrameCodec::new();

    let idle_since = Instant::now();
    let _idle = TcpStream::connect(addr).unwrap();
    let id_idle = next_connected(&rx);
    let mut busy = TcpStream::connect(addr).unwrap();
    let id_busy = next_connected(&rx);

    let keepalive = thread::spawn(move || {
        let frame = codec.encode(b"tick").unwrap();
        for _ in 0..15 {
            busy.write_all(&frame).unwrap();
            thread::sleep(Duration::from_millis(100));
        }
        busy
    });

    match wait_for(&rx, |e| matches!(e, HostEvent::Disconnected { id, .. } if *id == id_idle)) {
        HostEvent::Disconnected { error, .. } => {
            assert!(matches!(error.as_deref(), Some(HostError::IdleTimeout(_))))
        }
        _ => unreachable!(),
    }
    assert!(idle_since.elapsed() >= idle_timeout);
    assert!(idle_since.elapsed() < idle_timeout + check_interval + Duration::from_secs(2));

    let _busy = keepalive.join().unwrap();
    assert!(host.get_connection(id_busy).is_some());
    assert_eq!(host.metrics().timeout_errors, 1);

    host.stop();
}

#[test]
fn burst_across_two_listeners() {
    let host = ConnectionHost::new(test_config(), Arc::new(NoopService)).unwrap();
    host.add_listener(listener()).unwrap();
    host.add_listener(listener().with_accept_tasks(4)).unwrap();
    host.start().unwrap();
    let addrs = host.local_addrs();
    assert_eq!(addrs.len(), 2);

    let clients = 50;
    let barrier = Arc::new(Barrier::new(clients));
    let handles: Vec<_> = (0..clients)
        .map(|i| {
            let addr = addrs[i % 2];
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                TcpStream::connect(addr).unwrap()
            })
        })
        .collect();
    let streams: Vec<TcpStream> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(eventually(|| host.connection_count() == clients));
    assert!(eventually(|| {
        host.connections()
            .iter()
            .all(|info| info.state == ConnectionState::Connected)
    }));
    assert_eq!(host.metrics().total_connections, clients as u64);

    drop(streams);
    assert!(eventually(|| host.connection_count() == 0));
    host.stop();
}

#[test]
fn broadcast_skips_excluded_connection() {
    let host = ConnectionHost::new(test_config(), Arc::new(NoopService)).unwrap();
    host.add_listener(listener()).unwrap();
    let rx = events(&host);
    host.start().unwrap();
    let addr = host.local_addrs()[0];
    let codec = FrameCodec::new();

    let mut origin = TcpStream::connect(addr).unwrap();
    let id_origin = next_connected(&rx);
    let mut peers = Vec::new();
    for _ in 0..2 {
        peers.push(TcpStream::connect(addr).unwrap());
        next_connected(&rx);
    }

    let result = host.broadcast(b"news", Some(id_origin)).unwrap();
    assert_eq!(result.total, 2);
    assert!(result.all_succeeded());

    for peer in &mut peers {
        assert_eq!(&read_frame(peer, &codec)[..], b"news");
    }

    origin
        .set_read_timeout(Some(Duration::from_millis(300)))
        .unwrap();
    let mut byte = [0u8; 1];
    let err = origin.read(&mut byte).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut));

    host.stop();
}

#[test]
fn oversized_frame_is_a_protocol_violation() {
    let host = ConnectionHost::new(
        test_config().with_message_buffer_size(64),
        Arc::new(NoopService),
    )
    .unwrap();
    host.add_listener(listener()).unwrap();
    let rx = events(&host);
    host.start().unwrap();

    let mut client = TcpStream::connect(host.local_addrs()[0]).unwrap();
    let id = next_connected(&rx);
    // Declares a 1000 byte frame; rejected before the body arrives
    client.write_all(&[0x03, 0xE8]).unwrap();

    match wait_for(&rx, |e| matches!(e, HostEvent::Disconnected { id: d, .. } if *d == id)) {
        HostEvent::Disconnected { error, .. } => {
            assert!(error.is_some_and(|e| e.is_protocol_error()))
        }
        _ => unreachable!(),
    }
    assert_eq!(host.metrics().protocol_errors, 1);

    host.stop();
}

#[test]
fn udp_peers_get_their_own_connections() {
    let host = ConnectionHost::new(test_config(), Arc::new(Echo)).unwrap();
    host.add_udp_endpoint(UdpConfig::new("127.0.0.1:0".parse().unwrap()))
        .unwrap();
    let rx = events(&host);
    host.start().unwrap();
    let server: SocketAddr = host.local_addrs()[0];
    let codec = FrameCodec::new();

    let client = UdpSocket::bind("127.0.0.1:0").unwrap();
    client.set_read_timeout(Some(WAIT)).unwrap();
    client
        .send_to(&codec.encode(b"over udp").unwrap(), server)
        .unwrap();

    match wait_for(&rx, |e| matches!(e, HostEvent::Connected { .. })) {
        HostEvent::Connected {
            peer_addr,
            direction,
            ..
        } => {
            assert_eq!(direction, Direction::UdpPeer);
            assert_eq!(peer_addr, client.local_addr().unwrap());
        }
        _ => unreachable!(),
    }

    let mut datagram = [0u8; 1024];
    let (n, from) = client.recv_from(&mut datagram).unwrap();
    assert_eq!(from, server);
    let (payload, rest) = codec.try_extract(&datagram[..n]).unwrap().unwrap();
    assert_eq!(&payload[..], b"over udp");
    assert!(rest.is_empty());

    // A second datagram from the same peer reuses the connection
    client
        .send_to(&codec.encode(b"again").unwrap(), server)
        .unwrap();
    client.recv_from(&mut datagram).unwrap();
    assert_eq!(host.connection_count(), 1);

    host.stop();
}

#[test]
fn stop_disconnects_everything_once() {
    let host = ConnectionHost::new(test_config(), Arc::new(NoopService)).unwrap();
    host.add_listener(listener()).unwrap();
    let rx = events(&host);
    host.start().unwrap();
    let addr = host.local_addrs()[0];

    let _clients: Vec<_> = (0..3)
        .map(|_| {
            let stream = TcpStream::connect(addr).unwrap();
            next_connected(&rx);
            stream
        })
        .collect();

    host.stop();
    host.stop();

    let disconnected = rx
        .try_iter()
        .filter(|e| matches!(e, HostEvent::Disconnected { error: None, .. }))
        .count();
    assert_eq!(disconnected, 3);
    assert_eq!(host.connection_count(), 0);
    assert!(!host.snapshot().running);
    assert!(host.send(sockhost_service::ConnectionId::new(1), b"late").is_err());
}
