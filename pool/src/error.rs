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

//! Error types for the worker pool

use thiserror::Error;

/// Result type for pool operations
pub type Result<T> = std::result::Result<T, PoolError>;

/// Boxed error returned by a failing work item
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Worker pool error types
#[derive(Debug, Error)]
pub enum PoolError {
    /// The pool has been stopped and accepts no further work
    #[error("Worker pool stopped")]
    Stopped,

    /// `start()` was called on a pool that is already running
    #[error("Worker pool already running")]
    AlreadyRunning,

    /// The pool configuration is inconsistent
    #[error("Invalid pool configuration: {0}")]
    InvalidConfig(String),

    /// The operating system refused to create a worker thread
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Failure captured at the worker boundary while executing a work item
#[derive(Debug, Error)]
pub enum WorkError {
    /// The item returned an error
    #[error("{0}")]
    Failed(#[source] BoxError),

    /// The item panicked; the payload message is preserved when it is a string
    #[error("panicked: {0}")]
    Panicked(String),
}

impl WorkError {
    /// Check if the failure was a panic
    pub fn is_panic(&self) -> bool {
        matches!(self, WorkError::Panicked(_))
    }
}
