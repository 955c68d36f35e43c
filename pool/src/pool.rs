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

//! Elastic worker pool implementation
//!
//! The pool starts `min_threads` workers. Each time a worker picks up an item
//! it bumps the active-worker counter; if every live worker is now busy and
//! the pool is still below `max_threads`, exactly one more worker is
//! spawned. Workers never retire on their own; only [`WorkerPool::stop`]
//! ends them.
//!
//! Two locks are involved and never nested: the queue lock (items and the
//! set of keys currently executing) and the active-counter lock, which is
//! also held while a new worker is spawned.

use crate::{PoolError, Result, WorkError, WorkItem};
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::collections::{HashSet, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// Worker pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Workers spawned by `start()`
    pub min_threads: usize,
    /// Upper bound for elastic growth
    pub max_threads: usize,
    /// Prefix for worker thread names
    pub thread_name: String,
    /// How long `stop()` waits for each worker to exit
    pub join_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_threads: 4,
            max_threads: 16,
            thread_name: "sockhost-worker".to_string(),
            join_timeout: Duration::from_secs(5),
        }
    }
}

impl PoolConfig {
    /// Set the thread bounds
    pub fn with_threads(mut self, min: usize, max: usize) -> Self {
        self.min_threads = min;
        self.max_threads = max;
        self
    }

    /// Set the worker thread name prefix
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Set the per-worker join timeout used by `stop()`
    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.min_threads == 0 {
            return Err(PoolError::InvalidConfig(
                "min_threads must be greater than 0".to_string(),
            ));
        }
        if self.max_threads < self.min_threads {
            return Err(PoolError::InvalidConfig(format!(
                "max_threads ({}) must be >= min_threads ({})",
                self.max_threads, self.min_threads
            )));
        }
        Ok(())
    }
}

struct Queue {
    items: VecDeque<Box<dyn WorkItem>>,
    in_flight: HashSet<u64>,
}

impl Queue {
    /// Take the oldest item whose key is not already executing
    fn take_runnable(&mut self) -> Option<Box<dyn WorkItem>> {
        let position = self.items.iter().position(|item| match item.key() {
            Some(key) => !self.in_flight.contains(&key),
            None => true,
        })?;
        let item = self.items.remove(position)?;
        if let Some(key) = item.key() {
            self.in_flight.insert(key);
        }
        Some(item)
    }
}

struct Shared {
    config: PoolConfig,
    queue: Mutex<Queue>,
    available: Condvar,
    running: AtomicBool,
    stopped: AtomicBool,
    active: Mutex<usize>,
    threads: AtomicUsize,
    spawned: AtomicUsize,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Shared {
    fn next_item(&self) -> Option<Box<dyn WorkItem>> {
        let mut queue = self.queue.lock();
        loop {
            if let Some(item) = queue.take_runnable() {
                return Some(item);
            }
            if !self.running.load(Ordering::Acquire) {
                return None;
            }
            self.available.wait(&mut queue);
        }
    }

    fn begin_work(self: &Arc<Self>) {
        let mut active = self.active.lock();
        *active += 1;
        let threads = self.threads.load(Ordering::Acquire);
        if *active >= threads && threads < self.config.max_threads {
            if let Err(e) = self.spawn_worker() {
                error!(error = %e, "Failed to grow worker pool");
            }
        }
    }

    fn finish_work(&self, key: Option<u64>) {
        *self.active.lock() -= 1;

        let mut queue = self.queue.lock();
        if let Some(key) = key {
            queue.in_flight.remove(&key);
        }
        let pending = !queue.items.is_empty();
        drop(queue);

        if pending {
            self.available.notify_one();
        }
    }

    fn spawn_worker(self: &Arc<Self>) -> std::io::Result<()> {
        let mut handles = self.handles.lock();
        if !self.running.load(Ordering::Acquire) {
            return Ok(());
        }

        let index = self.spawned.fetch_add(1, Ordering::Relaxed);
        self.threads.fetch_add(1, Ordering::AcqRel);
        let shared = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(format!("{}-{}", self.config.thread_name, index))
            .spawn(move || worker_loop(shared, index));

        match spawned {
            Ok(handle) => {
                debug!(
                    worker = index,
                    threads = self.threads.load(Ordering::Relaxed),
                    "Spawned pool worker"
                );
                handles.push(handle);
                Ok(())
            }
            Err(e) => {
                self.threads.fetch_sub(1, Ordering::AcqRel);
                Err(e)
            }
        }
    }
}

fn worker_loop(shared: Arc<Shared>, index: usize) {
    trace!(worker = index, "Worker loop entered");

    while let Some(item) = shared.next_item() {
        shared.begin_work();
        let key = item.key();
        run_item(item);
        shared.finish_work(key);
    }

    shared.threads.fetch_sub(1, Ordering::AcqRel);
    trace!(worker = index, "Worker loop exited");
}

fn run_item(mut item: Box<dyn WorkItem>) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| item.execute()));
    let error = match outcome {
        Ok(Ok(())) => return,
        Ok(Err(e)) => WorkError::Failed(e),
        Err(payload) => WorkError::Panicked(panic_message(payload.as_ref())),
    };

    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(move || item.fault(error))) {
        error!(
            panic = %panic_message(payload.as_ref()),
            "Fault handler panicked"
        );
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Elastic pool of OS worker threads
///
/// # Example
///
/// ```
/// use sockhost_pool::{PoolConfig, Task, WorkerPool};
/// use std::sync::mpsc;
///
/// let pool = WorkerPool::new(PoolConfig::default().with_threads(2, 4));
/// pool.start().unwrap();
///
/// let (tx, rx) = mpsc::channel();
/// pool.enqueue(Task::new(move || tx.send(42).unwrap())).unwrap();
/// assert_eq!(rx.recv().unwrap(), 42);
///
/// pool.stop();
/// ```
pub struct WorkerPool {
    shared: Arc<Shared>,
}

impl WorkerPool {
    /// Create a stopped pool
    pub fn new(config: PoolConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                queue: Mutex::new(Queue {
                    items: VecDeque::new(),
                    in_flight: HashSet::new(),
                }),
                available: Condvar::new(),
                running: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                active: Mutex::new(0),
                threads: AtomicUsize::new(0),
                spawned: AtomicUsize::new(0),
                handles: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Spawn the minimum number of workers
    ///
    /// Items enqueued before `start()` are picked up once workers exist.
    pub fn start(&self) -> Result<()> {
        self.shared.config.validate()?;
        if self.shared.stopped.load(Ordering::Acquire) {
            return Err(PoolError::Stopped);
        }
        if self.shared.running.swap(true, Ordering::AcqRel) {
            return Err(PoolError::AlreadyRunning);
        }

        for _ in 0..self.shared.config.min_threads {
            self.shared.spawn_worker()?;
        }

        info!(
            min_threads = self.shared.config.min_threads,
            max_threads = self.shared.config.max_threads,
            "Worker pool started"
        );
        Ok(())
    }

    /// Append an item to the queue and wake one idle worker
    pub fn enqueue(&self, item: impl WorkItem) -> Result<()> {
        self.enqueue_boxed(Box::new(item))
    }

    /// Append an already boxed item to the queue
    pub fn enqueue_boxed(&self, item: Box<dyn WorkItem>) -> Result<()> {
        let mut queue = self.shared.queue.lock();
        if self.shared.stopped.load(Ordering::Acquire) {
            return Err(PoolError::Stopped);
        }
        queue.items.push_back(item);
        drop(queue);

        self.shared.available.notify_one();
        Ok(())
    }

    /// Stop the pool
    ///
    /// Workers finish the item they are running and drain whatever is still
    /// queued, then exit. Each worker is given `join_timeout` to do so;
    /// stragglers are detached. Calling `stop()` again is a no-op, and
    /// calling it from a pool worker skips joining that worker.
    pub fn stop(&self) {
        {
            let _queue = self.shared.queue.lock();
            if self.shared.stopped.swap(true, Ordering::AcqRel) {
                return;
            }
            self.shared.running.store(false, Ordering::Release);
        }
        self.shared.available.notify_all();

        let handles = std::mem::take(&mut *self.shared.handles.lock());
        let deadline = Instant::now() + self.shared.config.join_timeout;
        let current = thread::current().id();

        for handle in handles {
            if handle.thread().id() == current {
                continue;
            }
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(5));
            }
            if !handle.is_finished() {
                warn!(
                    worker = handle.thread().name().unwrap_or("unnamed"),
                    "Worker did not exit before join timeout, detaching"
                );
                continue;
            }
            if handle.join().is_err() {
                warn!("Worker thread terminated by panic");
            }
        }

        info!("Worker pool stopped");
    }

    /// Check if the pool is accepting and executing work
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Number of live worker threads
    pub fn thread_count(&self) -> usize {
        self.shared.threads.load(Ordering::Acquire)
    }

    /// Number of workers currently executing an item
    pub fn active_count(&self) -> usize {
        *self.shared.active.lock()
    }

    /// Number of items waiting in the queue
    pub fn queued(&self) -> usize {
        self.shared.queue.lock().items.len()
    }

    /// Get the pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("running", &self.is_running())
            .field("threads", &self.thread_count())
            .field("active", &self.active_count())
            .field("queued", &self.queued())
            .finish()
    }
}
