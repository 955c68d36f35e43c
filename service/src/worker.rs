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

//! Connection worker implementation
//!
//! One ConnectionWorker task per connection owns the socket and is
//! responsible for:
//! - Reading into the reassembly buffer and draining complete frames
//! - Writing queued frames, one at a time
//! - Posting connection events to the dispatcher
//! - Teardown: flush, close, state transitions and removal from the host

use crate::host::HostShared;
use crate::{Connection, Direction, HostError, HostEvent};
use bytes::{Bytes, BytesMut};
use sockhost_codec::{CodecError, FrameCodec};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, UdpSocket};
use tokio::select;
use tokio::sync::mpsc;
use tokio_util::codec::Decoder;
use tracing::{debug, info, instrument, trace, warn};

/// Datagrams queued per UDP peer before new ones are dropped
pub(crate) const DATAGRAM_QUEUE: usize = 1024;

enum Inbound {
    Stream(OwnedReadHalf),
    Datagrams(mpsc::Receiver<Bytes>),
}

impl Inbound {
    /// Append received bytes to `buffer`; zero means the source is closed
    async fn read_into(&mut self, buffer: &mut BytesMut) -> io::Result<usize> {
        match self {
            Inbound::Stream(reader) => reader.read_buf(buffer).await,
            Inbound::Datagrams(datagrams) => match datagrams.recv().await {
                Some(datagram) => {
                    buffer.extend_from_slice(&datagram);
                    Ok(datagram.len())
                }
                None => Ok(0),
            },
        }
    }
}

enum Outbound {
    Stream(OwnedWriteHalf),
    Datagram {
        socket: Arc<UdpSocket>,
        peer: SocketAddr,
    },
}

impl Outbound {
    async fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        match self {
            Outbound::Stream(writer) => writer.write_all(frame).await,
            Outbound::Datagram { socket, peer } => socket.send_to(frame, *peer).await.map(|_| ()),
        }
    }

    async fn shutdown(&mut self) {
        if let Outbound::Stream(writer) = self {
            if let Err(e) = writer.shutdown().await {
                trace!(error = %e, "Socket shutdown failed");
            }
        }
    }
}

/// Register an accepted or established TCP stream and spawn its worker
pub(crate) fn spawn_stream(
    shared: &Arc<HostShared>,
    stream: TcpStream,
    direction: Direction,
    codec: FrameCodec,
) -> crate::Result<Connection> {
    let peer_addr = stream.peer_addr()?;
    let local_addr = stream.local_addr()?;
    if let Err(e) = stream.set_nodelay(true) {
        debug!(peer_addr = %peer_addr, error = %e, "Failed to set TCP_NODELAY");
    }

    let (connection, queue) = shared
        .manager
        .register(direction, peer_addr, local_addr, codec.clone());
    let (reader, writer) = stream.into_split();
    let worker = ConnectionWorker {
        connection: connection.clone(),
        inbound: Inbound::Stream(reader),
        outbound: Outbound::Stream(writer),
        queue,
        codec,
        buffer: BytesMut::with_capacity(shared.config.socket_buffer_size),
        shared: shared.clone(),
    };
    tokio::spawn(worker.run());
    Ok(connection)
}

/// Register a UDP peer and spawn its worker
///
/// Returns the sender the endpoint uses to hand datagrams to the peer.
pub(crate) fn spawn_datagram(
    shared: &Arc<HostShared>,
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
    codec: FrameCodec,
) -> crate::Result<(Connection, mpsc::Sender<Bytes>)> {
    let local_addr = socket.local_addr()?;
    let (connection, queue) =
        shared
            .manager
            .register(Direction::UdpPeer, peer, local_addr, codec.clone());
    let (datagrams_tx, datagrams_rx) = mpsc::channel(DATAGRAM_QUEUE);
    let worker = ConnectionWorker {
        connection: connection.clone(),
        inbound: Inbound::Datagrams(datagrams_rx),
        outbound: Outbound::Datagram { socket, peer },
        queue,
        codec,
        buffer: BytesMut::with_capacity(shared.config.socket_buffer_size),
        shared: shared.clone(),
    };
    tokio::spawn(worker.run());
    Ok((connection, datagrams_tx))
}

/// Connection worker that drives a single connection's socket
struct ConnectionWorker {
    connection: Connection,
    inbound: Inbound,
    outbound: Outbound,
    queue: mpsc::UnboundedReceiver<Bytes>,
    codec: FrameCodec,
    buffer: BytesMut,
    shared: Arc<HostShared>,
}

impl ConnectionWorker {
    /// Run the worker until the connection is closed or faults
    #[instrument(name = "connection", skip(self), fields(connection_id = %self.connection.id()))]
    async fn run(mut self) {
        self.connection.mark_connected();
        self.shared.metrics.connection_opened();
        info!(
            peer_addr = %self.connection.peer_addr(),
            direction = %self.connection.direction(),
            "Connection established"
        );
        self.post(HostEvent::Connected {
            id: self.connection.id(),
            peer_addr: self.connection.peer_addr(),
            direction: self.connection.direction(),
        });

        let reason = self.event_loop().await;
        if reason.is_none() {
            self.flush().await;
        }
        self.outbound.shutdown().await;

        let reason = reason.map(Arc::new).or_else(|| self.connection.take_failure());
        self.teardown(reason);
    }

    /// Main event processing loop
    ///
    /// Returns why the connection ended, or `None` for a local close.
    async fn event_loop(&mut self) -> Option<HostError> {
        let close = self.connection.close_token();
        loop {
            self.buffer.reserve(self.shared.config.socket_buffer_size);
            select! {
                biased;

                _ = close.cancelled() => return None,

                read = self.inbound.read_into(&mut self.buffer) => match read {
                    Ok(0) => return Some(HostError::ConnectionClosed),
                    Ok(n) => {
                        self.connection.touch();
                        self.connection.record_received_bytes(n);
                        self.shared.metrics.bytes_received(n as u64);
                        if let Err(e) = self.drain_frames() {
                            return Some(e);
                        }
                    }
                    Err(e) => return Some(HostError::Io(e)),
                },

                frame = self.queue.recv() => match frame {
                    Some(frame) => {
                        if let Err(e) = self.write(frame).await {
                            return Some(HostError::Io(e));
                        }
                    }
                    None => return None,
                },
            }
        }
    }

    /// Hand every complete frame in the buffer to the dispatcher
    fn drain_frames(&mut self) -> Result<(), HostError> {
        loop {
            let payload = match self.codec.decode(&mut self.buffer) {
                Ok(Some(payload)) => payload,
                Ok(None) => return Ok(()),
                Err(CodecError::Io(e)) => return Err(HostError::Io(e)),
                Err(e) => return Err(HostError::Codec(e)),
            };
            self.connection.record_received_message();
            self.shared.metrics.message_received();
            self.post(HostEvent::Received {
                id: self.connection.id(),
                payload,
            });
        }
    }

    async fn write(&mut self, frame: Bytes) -> io::Result<()> {
        self.outbound.write_frame(&frame).await?;
        self.connection.touch();
        self.connection.record_sent(frame.len());
        self.shared.metrics.bytes_sent(frame.len() as u64);
        self.shared.metrics.message_sent();
        self.post(HostEvent::Sent {
            id: self.connection.id(),
            bytes: frame.len(),
        });
        Ok(())
    }

    /// Write frames queued before the close
    async fn flush(&mut self) {
        while let Ok(frame) = self.queue.try_recv() {
            if let Err(e) = self.write(frame).await {
                debug!(error = %e, "Flush on close failed");
                return;
            }
        }
    }

    fn teardown(&mut self, reason: Option<Arc<HostError>>) {
        let id = self.connection.id();

        let fault = reason
            .clone()
            .filter(|e| !matches!(**e, HostError::ConnectionClosed));
        if let Some(error) = fault {
            self.connection.mark_error();
            self.record_fault(&error);
            warn!(error = %error, "Connection fault");
            self.post(HostEvent::ConnectionError { id, error });
        }

        self.shared.manager.remove(id);
        self.connection.mark_disconnected();
        self.shared
            .metrics
            .connection_closed(self.connection.created_at().elapsed());
        info!(
            reason = reason.as_ref().map(|e| e.to_string()).unwrap_or_default(),
            "Connection closed"
        );
        self.post(HostEvent::Disconnected { id, error: reason });
    }

    fn record_fault(&self, error: &HostError) {
        match error {
            HostError::IdleTimeout(_) => self.shared.metrics.timeout_error(),
            HostError::Handler(_) => {}
            e if e.is_protocol_error() => self.shared.metrics.protocol_error(),
            _ => self.shared.metrics.connection_error(),
        }
    }

    fn post(&self, event: HostEvent) {
        self.shared.dispatcher.post(&self.connection, event);
    }
}
