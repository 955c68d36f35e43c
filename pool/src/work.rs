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

//! Work item contract

use crate::{BoxError, WorkError};
use tracing::warn;

/// A unit of work executed by a pool worker
///
/// Items that share a [`key`](WorkItem::key) are executed one at a time in
/// the order they were enqueued. Items without a key may run on any idle
/// worker.
pub trait WorkItem: Send + 'static {
    /// Ordering key; items with equal keys never run concurrently
    fn key(&self) -> Option<u64> {
        None
    }

    /// Run the item on a pool worker
    fn execute(&mut self) -> Result<(), BoxError>;

    /// Called on the same worker when `execute` failed or panicked
    ///
    /// The default implementation logs the failure.
    fn fault(self: Box<Self>, error: WorkError) {
        warn!(key = ?self.key(), error = %error, "Work item failed");
    }
}

/// Closure adapter for [`WorkItem`]
///
/// # Example
///
/// ```
/// use sockhost_pool::{PoolConfig, Task, WorkerPool};
///
/// let pool = WorkerPool::new(PoolConfig::default().with_threads(1, 2));
/// pool.start().unwrap();
/// pool.enqueue(Task::keyed(7, || println!("runs after earlier key-7 work"))).unwrap();
/// pool.stop();
/// ```
pub struct Task<F> {
    key: Option<u64>,
    func: Option<F>,
}

impl<F> Task<F>
where
    F: FnOnce() + Send + 'static,
{
    /// Create an unordered task
    pub fn new(func: F) -> Self {
        Self {
            key: None,
            func: Some(func),
        }
    }

    /// Create a task ordered with every other task of the same key
    pub fn keyed(key: u64, func: F) -> Self {
        Self {
            key: Some(key),
            func: Some(func),
        }
    }
}

impl<F> WorkItem for Task<F>
where
    F: FnOnce() + Send + 'static,
{
    fn key(&self) -> Option<u64> {
        self.key
    }

    fn execute(&mut self) -> Result<(), BoxError> {
        if let Some(func) = self.func.take() {
            func();
        }
        Ok(())
    }
}
