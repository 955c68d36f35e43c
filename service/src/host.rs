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

//! Connection host
//!
//! The aggregate root. A host owns:
//! - its connectors (TCP listeners, outbound connectors, UDP endpoints)
//! - the live-connection table
//! - the worker pool that runs application callbacks
//! - the I/O runtime whose threads complete accepts, connects, reads and
//!   writes
//!
//! The public API is synchronous and can be called from any thread,
//! including from inside service callbacks.

use crate::dispatch::Dispatcher;
use crate::manager::ConnectionManager;
use crate::{
    BroadcastResult, Connection, ConnectionId, ConnectionInfo, ConnectionService, ConnectorConfig,
    HostConfig, HostError, HostEvent, HostMetrics, HostSnapshot, ListenerConfig, MetricsSnapshot,
    Result, UdpConfig, dialer, listener, udp,
};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tokio::runtime::{Builder, Handle, Runtime};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// State shared between the host and its I/O tasks
pub(crate) struct HostShared {
    pub(crate) config: HostConfig,
    pub(crate) manager: ConnectionManager,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) metrics: Arc<HostMetrics>,
}

#[derive(Debug, Clone)]
enum Connector {
    Listener(ListenerConfig),
    Dialer(ConnectorConfig),
    Udp(UdpConfig),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Created,
    Running,
    Stopped,
}

struct Lifecycle {
    phase: Phase,
    connectors: Vec<Connector>,
    runtime: Option<Runtime>,
    started_at: Option<Instant>,
}

/// TCP/UDP connection host
///
/// # Example
///
/// ```no_run
/// use sockhost_service::{ConnectionHost, HostConfig, ListenerConfig, NoopService};
/// use std::sync::Arc;
///
/// let host = ConnectionHost::new(HostConfig::default(), Arc::new(NoopService))?;
/// host.add_listener(ListenerConfig::new("0.0.0.0:7000".parse().unwrap()))?;
/// host.start()?;
/// // ...
/// host.stop();
/// # Ok::<(), sockhost_service::HostError>(())
/// ```
pub struct ConnectionHost {
    shared: Arc<HostShared>,
    lifecycle: Mutex<Lifecycle>,
    local_addrs: Mutex<Vec<SocketAddr>>,
    running: AtomicBool,
    shutdown: CancellationToken,
}

impl ConnectionHost {
    /// Create a host
    ///
    /// Nothing is bound and no thread is spawned until [`start`](Self::start).
    pub fn new(config: HostConfig, service: Arc<dyn ConnectionService>) -> Result<Self> {
        config.validate()?;
        let metrics = Arc::new(HostMetrics::new());
        let dispatcher = Dispatcher::new(config.pool_config(), service, metrics.clone());
        Ok(Self {
            shared: Arc::new(HostShared {
                config,
                manager: ConnectionManager::new(),
                dispatcher,
                metrics,
            }),
            lifecycle: Mutex::new(Lifecycle {
                phase: Phase::Created,
                connectors: Vec::new(),
                runtime: None,
                started_at: None,
            }),
            local_addrs: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        })
    }

    /// Register a TCP listener
    ///
    /// On a running host the listener is started immediately.
    pub fn add_listener(&self, config: ListenerConfig) -> Result<()> {
        config.validate()?;
        self.add_connector_inner(Connector::Listener(config))
    }

    /// Register an outbound connector
    ///
    /// On a running host the connector starts dialing immediately.
    pub fn add_connector(&self, config: ConnectorConfig) -> Result<()> {
        config.validate()?;
        self.add_connector_inner(Connector::Dialer(config))
    }

    /// Register a UDP endpoint
    ///
    /// On a running host the endpoint is bound immediately.
    pub fn add_udp_endpoint(&self, config: UdpConfig) -> Result<()> {
        self.add_connector_inner(Connector::Udp(config))
    }

    fn add_connector_inner(&self, connector: Connector) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        match lifecycle.phase {
            Phase::Stopped => Err(HostError::Stopped),
            Phase::Created => {
                lifecycle.connectors.push(connector);
                Ok(())
            }
            Phase::Running => {
                let runtime = lifecycle.runtime.as_ref().ok_or(HostError::NotRunning)?;
                self.start_connector(runtime, &connector)?;
                lifecycle.connectors.push(connector);
                Ok(())
            }
        }
    }

    /// Register a closure that receives every [`HostEvent`]
    ///
    /// Listeners run on pool workers after the service callback.
    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(&HostEvent) + Send + Sync + 'static,
    {
        self.shared.dispatcher.subscribe(Arc::new(listener));
    }

    /// Start the worker pool, then every registered connector
    ///
    /// If a connector fails to start, everything started so far is torn
    /// down and the host is left stopped.
    pub fn start(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        match lifecycle.phase {
            Phase::Running => return Err(HostError::AlreadyStarted),
            Phase::Stopped => return Err(HostError::Stopped),
            Phase::Created => {}
        }

        let runtime = Builder::new_multi_thread()
            .worker_threads(self.shared.config.io_threads)
            .thread_name("sockhost-io")
            .enable_all()
            .build()?;
        if let Err(e) = self.shared.dispatcher.start() {
            runtime.shutdown_background();
            return Err(e);
        }

        let started = lifecycle
            .connectors
            .iter()
            .try_for_each(|connector| self.start_connector(&runtime, connector));

        lifecycle.runtime = Some(runtime);
        if let Err(e) = started {
            error!(error = %e, "Failed to start connector, stopping host");
            drop(lifecycle);
            self.stop();
            return Err(e);
        }

        if let (Some(timeout), Some(runtime)) =
            (self.shared.config.idle_timeout, lifecycle.runtime.as_ref())
        {
            runtime.spawn(idle_sweep(
                self.shared.clone(),
                self.shared.config.idle_check_interval,
                timeout,
                self.shutdown.clone(),
            ));
        }

        lifecycle.phase = Phase::Running;
        lifecycle.started_at = Some(Instant::now());
        self.running.store(true, Ordering::Release);
        info!(
            connectors = lifecycle.connectors.len(),
            local_addrs = ?self.local_addrs(),
            "Connection host started"
        );
        Ok(())
    }

    fn start_connector(&self, runtime: &Runtime, connector: &Connector) -> Result<()> {
        let _guard = runtime.enter();
        let config = &self.shared.config;
        match connector {
            Connector::Listener(listener_config) => {
                let bound = listener::bind(listener_config, config)?;
                let local_addr = bound.local_addr()?;
                let tasks = listener_config.accept_tasks.unwrap_or(config.accept_tasks);
                listener::spawn_accept_tasks(
                    bound,
                    tasks,
                    self.shared.clone(),
                    config.frame_codec(listener_config.transform()),
                    self.shutdown.child_token(),
                );
                self.local_addrs.lock().push(local_addr);
                info!(local_addr = %local_addr, accept_tasks = tasks, "Listener started");
            }
            Connector::Dialer(connector_config) => {
                runtime.spawn(dialer::run(
                    connector_config.clone(),
                    self.shared.clone(),
                    config.frame_codec(connector_config.transform()),
                    self.shutdown.child_token(),
                ));
                info!(remote = %connector_config.remote, "Connector started");
            }
            Connector::Udp(udp_config) => {
                let socket = udp::bind(udp_config)?;
                let local_addr = socket.local_addr()?;
                runtime.spawn(udp::run(
                    socket,
                    udp_config.remote,
                    self.shared.clone(),
                    config.frame_codec(udp_config.transform()),
                    self.shutdown.child_token(),
                ));
                self.local_addrs.lock().push(local_addr);
                info!(local_addr = %local_addr, "UDP endpoint started");
            }
        }
        Ok(())
    }

    /// Stop the host
    ///
    /// Stops all connectors, closes every live connection, waits for them
    /// to drain, shuts down the I/O runtime, then stops the worker pool
    /// after it has delivered the remaining events. Every wait is bounded
    /// by the configured shutdown timeout. Calling `stop()` again is a
    /// no-op.
    pub fn stop(&self) {
        let runtime = {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.phase == Phase::Stopped {
                return;
            }
            lifecycle.phase = Phase::Stopped;
            self.running.store(false, Ordering::Release);
            lifecycle.runtime.take()
        };
        info!("Stopping connection host");

        self.shutdown.cancel();
        let closed = self.shared.manager.close_all();

        let timeout = self.shared.config.shutdown_timeout;
        let deadline = Instant::now() + timeout;
        while !self.shared.manager.is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        if !self.shared.manager.is_empty() {
            warn!(
                remaining = self.shared.manager.count(),
                "Connections did not drain before shutdown timeout"
            );
        }

        if let Some(runtime) = runtime {
            if Handle::try_current().is_ok() {
                debug!("Stopping from inside a runtime, shutting down in background");
                runtime.shutdown_background();
            } else {
                runtime.shutdown_timeout(deadline.saturating_duration_since(Instant::now()));
            }
        }

        self.shared.dispatcher.stop();
        info!(closed, "Connection host stopped");
    }

    /// Check if the host is started and not yet stopped
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }
        match self.lifecycle.lock().phase {
            Phase::Stopped => Err(HostError::Stopped),
            _ => Err(HostError::NotRunning),
        }
    }

    /// Frame and send a payload to one connection
    ///
    /// An unknown ID, or a connection that is no longer connected, is a
    /// no-op: the caller has raced a disconnect.
    pub fn send(&self, id: ConnectionId, payload: &[u8]) -> Result<()> {
        self.ensure_running()?;
        match self.shared.manager.get(id) {
            Some(connection) => connection.send(payload),
            None => {
                debug!(connection_id = %id, "Send to unknown connection ignored");
                Ok(())
            }
        }
    }

    /// Send a payload to every connected peer except `exclude`
    pub fn broadcast(&self, payload: &[u8], exclude: Option<ConnectionId>) -> Result<BroadcastResult> {
        self.ensure_running()?;
        Ok(self.shared.manager.broadcast(payload, exclude))
    }

    /// Explicitly close one connection
    ///
    /// Returns `false` if no such connection exists.
    pub fn disconnect(&self, id: ConnectionId) -> Result<bool> {
        self.ensure_running()?;
        match self.shared.manager.get(id) {
            Some(connection) => {
                connection.close();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Look up a live connection
    pub fn get_connection(&self, id: ConnectionId) -> Option<Connection> {
        self.shared.manager.get(id)
    }

    /// IDs of all live connections
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.shared.manager.ids()
    }

    /// Number of live connections
    pub fn connection_count(&self) -> usize {
        self.shared.manager.count()
    }

    /// Snapshots of all live connections
    pub fn connections(&self) -> Vec<ConnectionInfo> {
        self.shared.manager.infos()
    }

    /// Addresses bound by started listeners and UDP endpoints
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.local_addrs.lock().clone()
    }

    /// Get the host configuration
    pub fn config(&self) -> &HostConfig {
        &self.shared.config
    }

    /// Get a snapshot of the host metrics
    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// Live worker pool threads
    pub fn worker_threads(&self) -> usize {
        self.shared.dispatcher.pool().thread_count()
    }

    /// Events waiting for a pool worker
    pub fn queued_events(&self) -> usize {
        self.shared.dispatcher.pool().queued()
    }

    /// Get a snapshot of the host
    pub fn snapshot(&self) -> HostSnapshot {
        let started_at = self.lifecycle.lock().started_at;
        HostSnapshot {
            running: self.is_running(),
            active_connections: self.connection_count(),
            total_connections: self.shared.metrics.total_connections(),
            local_addrs: self.local_addrs(),
            worker_threads: self.worker_threads(),
            queued_events: self.queued_events(),
            uptime: started_at.map(|t| t.elapsed()).unwrap_or_default(),
        }
    }
}

impl Drop for ConnectionHost {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("ConnectionHost dropped while running, stopping");
        }
        self.stop();
    }
}

impl std::fmt::Debug for ConnectionHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHost")
            .field("running", &self.is_running())
            .field("connections", &self.connection_count())
            .field("local_addrs", &self.local_addrs())
            .field("dispatcher", &self.shared.dispatcher)
            .finish()
    }
}

async fn idle_sweep(
    shared: Arc<HostShared>,
    interval: Duration,
    timeout: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let swept = shared.manager.sweep_idle(timeout);
                if swept > 0 {
                    debug!(swept, "Idle sweep complete");
                }
            }
        }
    }
}
