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
//! Nested-loop join build sink.
//!
//! Responsibilities:
//! - Materializes build-side chunks into the shared cross join context and
//!   publishes completion so probe partitions may start.
//!
//! Key exported interfaces:
//! - Types: `NlJoinBuildSinkFactory`.

use std::sync::Arc;

use super::cross_join_context::CrossJoinContext;
use crate::exec::chunk::Chunk;
use crate::exec::pipeline::operator::{Operator, ProcessorOperator};
use crate::exec::pipeline::operator_factory::OperatorFactory;
use crate::runtime::runtime_state::RuntimeState;

/// Factory for the sink that materializes the broadcast build side.
pub struct NlJoinBuildSinkFactory {
    name: String,
    context: Arc<CrossJoinContext>,
}

impl NlJoinBuildSinkFactory {
    pub fn new(context: Arc<CrossJoinContext>) -> Self {
        let node_id = context.node_id();
        let name = if node_id >= 0 {
            format!("NlJoinBuildSink (id={node_id})")
        } else {
            "NlJoinBuildSink".to_string()
        };
        Self { name, context }
    }
}

impl OperatorFactory for NlJoinBuildSinkFactory {
    fn name(&self) -> &str {
        &self.name
    }

    fn create(&self, _dop: i32, _driver_id: i32) -> Box<dyn Operator> {
        self.context.ref_op();
        Box::new(NlJoinBuildSinkOperator {
            name: self.name.clone(),
            context: Arc::clone(&self.context),
            finished: false,
            closed: false,
        })
    }

    fn is_sink(&self) -> bool {
        true
    }
}

struct NlJoinBuildSinkOperator {
    name: String,
    context: Arc<CrossJoinContext>,
    finished: bool,
    closed: bool,
}

impl Operator for NlJoinBuildSinkOperator {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_finished(&self) -> bool {
        self.finished
    }

    fn set_force_finished(&mut self) {
        self.finished = true;
        self.context.set_finished();
    }

    fn close(&mut self) -> Result<(), String> {
        if !self.closed {
            self.closed = true;
            self.context.unref_op();
        }
        Ok(())
    }

    fn as_processor_mut(&mut self) -> Option<&mut dyn ProcessorOperator> {
        Some(self)
    }

    fn as_processor_ref(&self) -> Option<&dyn ProcessorOperator> {
        Some(self)
    }
}

impl ProcessorOperator for NlJoinBuildSinkOperator {
    fn need_input(&self) -> bool {
        !self.finished
    }

    fn has_output(&self) -> bool {
        false
    }

    fn push_chunk(&mut self, _state: &RuntimeState, chunk: Chunk) -> Result<(), String> {
        if self.finished {
            return Ok(());
        }
        // Empty chunks carry no rows worth broadcasting; dropping them keeps
        // every published build chunk non-empty for the probe's cursors.
        if !chunk.is_empty() {
            self.context.append_build_chunk(chunk)?;
        }
        Ok(())
    }

    fn pull_chunk(&mut self, _state: &RuntimeState) -> Result<Option<Chunk>, String> {
        Ok(None)
    }

    fn set_finishing(&mut self, _state: &RuntimeState) -> Result<(), String> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.context.mark_right_finished();
        Ok(())
    }
}
