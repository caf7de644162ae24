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
//! Core operator traits and cooperative-scheduling contracts.
//!
//! Responsibilities:
//! - Defines the lifecycle and push/pull contracts the pipeline driver polls.
//! - No call here blocks: "not ready" and "no output yet" are observable
//!   states the driver reacts to, never waits on.
//!
//! Key exported interfaces:
//! - Types: `Operator`, `ProcessorOperator`.

use crate::exec::chunk::Chunk;
use crate::exec::pipeline::dependency::DependencyHandle;
use crate::runtime::runtime_state::RuntimeState;

/// Base operator contract implemented by source/processor/sink operators.
pub trait Operator: Send {
    fn name(&self) -> &str;

    /// One-time setup before the first push/pull.
    fn prepare(&mut self, state: &RuntimeState) -> Result<(), String> {
        let _ = state;
        Ok(())
    }

    /// Release shared resources; called exactly once after the driver is done.
    fn close(&mut self) -> Result<(), String> {
        Ok(())
    }

    /// Immediate, unconditional termination (query cancel / force finish).
    fn set_force_finished(&mut self) {}

    fn is_finished(&self) -> bool {
        false
    }

    fn as_processor_mut(&mut self) -> Option<&mut dyn ProcessorOperator> {
        None
    }

    fn as_processor_ref(&self) -> Option<&dyn ProcessorOperator> {
        None
    }
}

/// Extended operator contract for processor stages with push/pull semantics.
pub trait ProcessorOperator: Operator {
    fn need_input(&self) -> bool;

    fn has_output(&self) -> bool;

    /// Install a new input chunk. Only legal while `need_input` is true.
    fn push_chunk(&mut self, state: &RuntimeState, chunk: Chunk) -> Result<(), String>;

    /// Produce the next output chunk, or `None` when nothing is ready yet.
    fn pull_chunk(&mut self, state: &RuntimeState) -> Result<Option<Chunk>, String>;

    /// Signal that no further input chunks will be pushed.
    fn set_finishing(&mut self, state: &RuntimeState) -> Result<(), String>;

    /// Dependency that must be ready before the operator can make progress,
    /// e.g. build-side materialization for joins.
    fn precondition_dependency(&self) -> Option<DependencyHandle> {
        None
    }
}
