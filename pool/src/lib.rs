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

//! # Sockhost Worker Pool
//!
//! An elastic pool of OS threads used to move application-facing callbacks
//! off the I/O completion threads.
//!
//! - Starts with `min_threads` workers and grows by one whenever every live
//!   worker is busy, up to `max_threads`. It never shrinks while running.
//! - [`WorkItem`]s that share a key run one at a time, in enqueue order.
//! - Errors and panics escaping an item are captured at the worker boundary
//!   and handed back to the item through [`WorkItem::fault`], so a faulty
//!   callback never takes a worker down.
//! - [`WorkerPool::stop`] is idempotent and joins workers with a bounded
//!   timeout.

mod error;
mod pool;
mod work;

pub use error::{BoxError, PoolError, Result, WorkError};
pub use pool::{PoolConfig, WorkerPool};
pub use work::{Task, WorkItem};
