// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.
//! Per-fragment-instance execution context.
//!
//! Responsibilities:
//! - Carries the query options operators read at runtime, chiefly the target
//!   output chunk size (`batch_size` in plan terms).
//!
//! Key exported interfaces:
//! - Types: `RuntimeState`.

const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Execution context handed by the driver into every operator push/pull.
#[derive(Clone, Debug)]
pub struct RuntimeState {
    chunk_size: usize,
}

impl Default for RuntimeState {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl RuntimeState {
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    /// Target number of rows per output chunk.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}
