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
//! Nested-loop join operators.
//!
//! The fallback join strategy for arbitrary (non-equi) join predicates:
//! the build side is materialized in full and broadcast to every probe
//! partition, then each probe chunk is paired row-by-row against it.

mod chunk_accumulator;
mod cross_join_context;
mod join_output;
mod nljoin_build_sink;
mod nljoin_probe_operator;

pub use chunk_accumulator::ChunkAccumulator;
pub use cross_join_context::CrossJoinContext;
pub use nljoin_build_sink::NlJoinBuildSinkFactory;
pub use nljoin_probe_operator::NlJoinProbeOperatorFactory;

/// Join kinds the nested-loop probe supports.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum NlJoinType {
    /// Pure cross product; identical to `Inner` with no join conjuncts.
    Cross,
    Inner,
    LeftOuter,
    RightOuter,
    FullOuter,
}

impl NlJoinType {
    /// Probe side is preserved: unmatched probe rows surface with null build columns.
    pub fn is_left_join(self) -> bool {
        matches!(self, NlJoinType::LeftOuter | NlJoinType::FullOuter)
    }

    /// Build side is preserved: unmatched build rows surface with null probe columns.
    pub fn is_right_join(self) -> bool {
        matches!(self, NlJoinType::RightOuter | NlJoinType::FullOuter)
    }
}

/// Shape of the materialized build side, the key for the outer-join
/// bookkeeping dispatch: unmatched detection differs by whether the build
/// side has zero, one, or many chunks.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum BuildSideShape {
    Empty,
    SingleChunk,
    MultiChunk,
}

impl BuildSideShape {
    pub(crate) fn of(num_build_chunks: usize) -> Self {
        match num_build_chunks {
            0 => BuildSideShape::Empty,
            1 => BuildSideShape::SingleChunk,
            _ => BuildSideShape::MultiChunk,
        }
    }
}
