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
//! Nested-loop join probe operator.
//!
//! Responsibilities:
//! - Pairs each probe row against the broadcast build side, evaluates the
//!   join conjuncts, and streams joined chunks out through an accumulator.
//! - Tracks unmatched probe rows (left/full outer) locally and unmatched
//!   build rows (right/full outer) through the shared match-flag vector,
//!   with exactly one partition emitting the unmatched-build pass.
//!
//! Key exported interfaces:
//! - Types: `NlJoinProbeOperatorFactory`.

use std::cell::Cell;
use std::sync::Arc;

use arrow::compute::filter_record_batch;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;

use super::chunk_accumulator::ChunkAccumulator;
use super::cross_join_context::CrossJoinContext;
use super::join_output::{
    build_join_batch, build_null_probe_with_build, build_probe_with_null_build, output_schema,
};
use super::{BuildSideShape, NlJoinType};
use crate::common::logging::debug;
use crate::exec::chunk::Chunk;
use crate::exec::expr::{apply_conjuncts, eval_conjunct_filter, ExprArena, ExprId};
use crate::exec::pipeline::dependency::DependencyHandle;
use crate::exec::pipeline::operator::{Operator, ProcessorOperator};
use crate::exec::pipeline::operator_factory::OperatorFactory;
use crate::runtime::runtime_state::RuntimeState;

/// Probe-side lifecycle. Stages only ever advance.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
enum JoinStage {
    /// Consuming probe input and producing matched output.
    Probing,
    /// Won the unmatched-build handoff; the next pull emits those rows.
    EmitUnmatchedBuild,
    /// All rows produced; draining the accumulator.
    Draining,
    Finished,
}

/// Factory for the probe side of a nested-loop join node.
pub struct NlJoinProbeOperatorFactory {
    name: String,
    arena: Arc<ExprArena>,
    join_type: NlJoinType,
    join_conjuncts: Vec<ExprId>,
    other_conjuncts: Vec<ExprId>,
    probe_schema: SchemaRef,
    build_schema: SchemaRef,
    output_schema: SchemaRef,
    context: Arc<CrossJoinContext>,
}

impl NlJoinProbeOperatorFactory {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        arena: Arc<ExprArena>,
        join_type: NlJoinType,
        join_conjuncts: Vec<ExprId>,
        other_conjuncts: Vec<ExprId>,
        probe_schema: SchemaRef,
        build_schema: SchemaRef,
        context: Arc<CrossJoinContext>,
    ) -> Self {
        let node_id = context.node_id();
        let name = if node_id >= 0 {
            format!("NlJoinProbe (id={node_id})")
        } else {
            "NlJoinProbe".to_string()
        };
        let output_schema = output_schema(&probe_schema, &build_schema, join_type);
        Self {
            name,
            arena,
            join_type,
            join_conjuncts,
            other_conjuncts,
            probe_schema,
            build_schema,
            output_schema,
            context,
        }
    }

    pub fn output_schema(&self) -> SchemaRef {
        Arc::clone(&self.output_schema)
    }
}

impl OperatorFactory for NlJoinProbeOperatorFactory {
    fn name(&self) -> &str {
        &self.name
    }

    fn create(&self, _dop: i32, driver_id: i32) -> Box<dyn Operator> {
        self.context.ref_op();
        Box::new(NlJoinProbeOperator {
            name: self.name.clone(),
            arena: Arc::clone(&self.arena),
            join_type: self.join_type,
            join_conjuncts: self.join_conjuncts.clone(),
            other_conjuncts: self.other_conjuncts.clone(),
            probe_schema: Arc::clone(&self.probe_schema),
            build_schema: Arc::clone(&self.build_schema),
            output_schema: Arc::clone(&self.output_schema),
            context: Arc::clone(&self.context),
            driver_seq: driver_id,
            build_loaded: false,
            build_chunks: Vec::new(),
            build_chunk_starts: Vec::new(),
            probe_chunk: None,
            probe_row_current: 0,
            probe_row_start: 0,
            curr_build_chunk_index: 0,
            probe_row_matched: false,
            self_build_match_flags: Vec::new(),
            join_stage: Cell::new(JoinStage::Probing),
            input_finished: false,
            closed: false,
            output_accumulator: ChunkAccumulator::default(),
        })
    }
}

struct NlJoinProbeOperator {
    name: String,
    arena: Arc<ExprArena>,
    join_type: NlJoinType,
    join_conjuncts: Vec<ExprId>,
    other_conjuncts: Vec<ExprId>,
    probe_schema: SchemaRef,
    build_schema: SchemaRef,
    output_schema: SchemaRef,
    context: Arc<CrossJoinContext>,
    driver_seq: i32,

    // Snapshot of the frozen build side, loaded once after readiness.
    build_loaded: bool,
    build_chunks: Vec<Chunk>,
    build_chunk_starts: Vec<usize>,

    // Resumable probe cursor: the current probe row, the first probe row of
    // the in-flight window (single-chunk shape), and the next build chunk to
    // pair with the current probe row (multi-chunk shape).
    probe_chunk: Option<Chunk>,
    probe_row_current: usize,
    probe_row_start: usize,
    curr_build_chunk_index: usize,
    // Whether the current probe row matched any build row so far.
    probe_row_matched: bool,

    // Partition-local build match observations, merged into the shared
    // vector exactly once when this partition reports completion.
    self_build_match_flags: Vec<u8>,

    // In a Cell: stage transitions are re-evaluated from `has_output(&self)`.
    join_stage: Cell<JoinStage>,
    input_finished: bool,
    closed: bool,

    output_accumulator: ChunkAccumulator,
}

impl NlJoinProbeOperator {
    fn is_ready(&self) -> bool {
        self.context.is_right_finished()
    }

    /// Probing is pointless when the build side is empty, unless unmatched
    /// probe rows must still surface.
    fn skip_probe(&self) -> bool {
        self.is_ready() && !self.join_type.is_left_join() && self.context.is_build_empty()
    }

    fn probe_chunk_finished(&self) -> bool {
        match &self.probe_chunk {
            None => true,
            Some(chunk) => self.probe_row_current >= chunk.len(),
        }
    }

    fn advance_join_stage(&self, stage: JoinStage) {
        let current = self.join_stage.get();
        if current == stage {
            return;
        }
        debug_assert!(current < stage, "nljoin stage may only advance");
        debug!(name = %self.name, ?current, ?stage, "nljoin probe stage advance");
        self.join_stage.set(stage);
    }

    /// The stage transition rule, runnable from any polling point.
    ///
    /// Probing ends when the input is finished and fully drained, or when
    /// probing is skipped outright. A right-preserving partition then reports
    /// completion; the one whose report is last takes the unmatched-build
    /// emission stage, everyone else finishes.
    fn check_post_probe(&self) {
        if self.context.is_force_finished() {
            self.advance_join_stage(JoinStage::Finished);
            return;
        }
        // No completion decision before the build side is published.
        if !self.is_ready() {
            return;
        }
        let output_finished = self.probe_chunk_finished() && self.output_accumulator.empty();
        if !((self.input_finished && output_finished) || self.skip_probe()) {
            return;
        }
        match self.join_stage.get() {
            JoinStage::Probing => {
                if !self.join_type.is_right_join() {
                    self.advance_join_stage(JoinStage::Finished);
                    return;
                }
                let flags = (!self.self_build_match_flags.is_empty())
                    .then_some(self.self_build_match_flags.as_slice());
                if self.context.finish_probe(self.driver_seq, flags) {
                    self.advance_join_stage(JoinStage::EmitUnmatchedBuild);
                } else {
                    self.advance_join_stage(JoinStage::Finished);
                }
            }
            JoinStage::EmitUnmatchedBuild => {}
            JoinStage::Draining => {
                if output_finished {
                    self.advance_join_stage(JoinStage::Finished);
                }
            }
            JoinStage::Finished => {}
        }
    }

    fn ensure_build_loaded(&mut self) -> Result<(), String> {
        if self.build_loaded {
            return Ok(());
        }
        let (chunks, starts) = self.context.build_chunks()?;
        self.build_chunks = chunks;
        self.build_chunk_starts = starts;
        self.build_loaded = true;
        Ok(())
    }

    fn push_output(&mut self, batch: RecordBatch) -> Result<(), String> {
        if batch.num_rows() == 0 {
            return Ok(());
        }
        self.output_accumulator.push(Chunk::try_new(batch)?)
    }

    /// Evaluate the join conjuncts over a raw product batch. Returns the
    /// compacted batch and, when conjuncts exist, the pre-compaction
    /// selection vector the outer-join bookkeeping reads.
    fn eval_join_conjuncts(
        &self,
        batch: RecordBatch,
    ) -> Result<(RecordBatch, Option<Vec<bool>>), String> {
        if self.join_conjuncts.is_empty() {
            return Ok((batch, None));
        }
        let filter = eval_conjunct_filter(&self.arena, &self.join_conjuncts, &batch)?;
        let selected: Vec<bool> = filter.iter().map(|v| v.unwrap_or(false)).collect();
        let compacted = filter_record_batch(&batch, &filter).map_err(|e| e.to_string())?;
        Ok((compacted, Some(selected)))
    }

    fn probe_step(&mut self, state: &RuntimeState, probe_chunk: &Chunk) -> Result<(), String> {
        match BuildSideShape::of(self.build_chunks.len()) {
            BuildSideShape::Empty => self.probe_empty_build(probe_chunk),
            BuildSideShape::SingleChunk => self.probe_single_chunk(state, probe_chunk),
            BuildSideShape::MultiChunk => self.probe_multi_chunk(probe_chunk),
        }
    }

    /// Empty build side: every probe row is unmatched. Only probe-preserving
    /// joins get here (everything else short-circuits through `skip_probe`),
    /// and the join conjuncts are never evaluated.
    fn probe_empty_build(&mut self, probe_chunk: &Chunk) -> Result<(), String> {
        debug_assert!(self.join_type.is_left_join());
        let rows = probe_chunk.len();
        self.probe_row_current = rows;
        let indices: Vec<u32> = (0..rows as u32).collect();
        if let Some(batch) = build_probe_with_null_build(
            probe_chunk,
            &indices,
            &self.build_schema,
            &self.output_schema,
        )? {
            let batch = apply_conjuncts(&self.arena, &self.other_conjuncts, batch)?;
            self.push_output(batch)?;
        }
        Ok(())
    }

    /// Single build chunk: window whole probe rows so the selection vector is
    /// exactly consecutive runs of `build_rows`, one run per probe row.
    fn probe_single_chunk(&mut self, state: &RuntimeState, probe_chunk: &Chunk) -> Result<(), String> {
        let build = self.build_chunks[0].clone();
        let build_rows = build.len();
        self.probe_row_start = self.probe_row_current;
        let target = state.chunk_size().max(1);
        let mut probe_indices: Vec<u32> = Vec::new();
        let mut build_indices: Vec<u32> = Vec::new();
        while self.probe_row_current < probe_chunk.len() && probe_indices.len() < target {
            for r in 0..build_rows as u32 {
                probe_indices.push(self.probe_row_current as u32);
                build_indices.push(r);
            }
            self.probe_row_current += 1;
        }
        let Some(batch) = build_join_batch(
            probe_chunk,
            &build,
            &probe_indices,
            &build_indices,
            &self.output_schema,
        )?
        else {
            return Ok(());
        };
        let (compacted, selected) = self.eval_join_conjuncts(batch)?;

        if self.join_type.is_right_join() {
            match &selected {
                None => self.self_build_match_flags[..build_rows].fill(1),
                Some(sel) => {
                    for (i, matched) in sel.iter().enumerate() {
                        if *matched {
                            self.self_build_match_flags[i % build_rows] = 1;
                        }
                    }
                }
            }
        }

        let compacted = apply_conjuncts(&self.arena, &self.other_conjuncts, compacted)?;
        self.push_output(compacted)?;

        if self.join_type.is_left_join() {
            let unmatched: Vec<u32> = match &selected {
                None => Vec::new(),
                Some(sel) => {
                    let rows = self.probe_row_current - self.probe_row_start;
                    (0..rows)
                        .filter(|row| {
                            !sel[row * build_rows..(row + 1) * build_rows].iter().any(|&v| v)
                        })
                        .map(|row| (self.probe_row_start + row) as u32)
                        .collect()
                }
            };
            if let Some(batch) = build_probe_with_null_build(
                probe_chunk,
                &unmatched,
                &self.build_schema,
                &self.output_schema,
            )? {
                let batch = apply_conjuncts(&self.arena, &self.other_conjuncts, batch)?;
                self.push_output(batch)?;
            }
        }
        Ok(())
    }

    /// Multiple build chunks: exactly one (probe row, build chunk) pair per
    /// pass, so match flags always land at that chunk's row offset and the
    /// per-row match bit resolves once the row's last chunk is seen.
    fn probe_multi_chunk(&mut self, probe_chunk: &Chunk) -> Result<(), String> {
        if self.curr_build_chunk_index >= self.build_chunks.len() {
            // The previous pass paired the row's last chunk; wrap to the next
            // probe row before producing anything new.
            self.curr_build_chunk_index = 0;
            self.probe_row_matched = false;
            self.probe_row_current += 1;
            return Ok(());
        }
        let pair_index = self.curr_build_chunk_index;
        let build = self.build_chunks[pair_index].clone();
        self.curr_build_chunk_index += 1;
        let row_complete = self.curr_build_chunk_index >= self.build_chunks.len();

        let build_rows = build.len();
        let probe_indices = vec![self.probe_row_current as u32; build_rows];
        let build_indices: Vec<u32> = (0..build_rows as u32).collect();
        let Some(batch) = build_join_batch(
            probe_chunk,
            &build,
            &probe_indices,
            &build_indices,
            &self.output_schema,
        )?
        else {
            return Ok(());
        };
        let (compacted, selected) = self.eval_join_conjuncts(batch)?;
        let matched_any = selected.as_ref().map_or(true, |sel| sel.iter().any(|&v| v));

        if self.join_type.is_right_join() {
            let start = self.build_chunk_starts[pair_index];
            let flags = &mut self.self_build_match_flags[start..start + build_rows];
            match &selected {
                None => flags.fill(1),
                Some(sel) => {
                    for (flag, matched) in flags.iter_mut().zip(sel) {
                        *flag |= *matched as u8;
                    }
                }
            }
        }

        let compacted = apply_conjuncts(&self.arena, &self.other_conjuncts, compacted)?;
        self.push_output(compacted)?;

        if self.join_type.is_left_join() {
            self.probe_row_matched = self.probe_row_matched || matched_any;
            if row_complete && !self.probe_row_matched {
                let indices = [self.probe_row_current as u32];
                if let Some(batch) = build_probe_with_null_build(
                    probe_chunk,
                    &indices,
                    &self.build_schema,
                    &self.output_schema,
                )? {
                    let batch = apply_conjuncts(&self.arena, &self.other_conjuncts, batch)?;
                    self.push_output(batch)?;
                }
            }
        }
        Ok(())
    }

    /// The winner's sweep over the shared flags: every still-unset build row
    /// goes out once with a null-filled probe side.
    fn permute_unmatched_build(&mut self) -> Result<(), String> {
        self.ensure_build_loaded()?;
        let flags = self.context.shared_match_flags();
        let chunks = self.build_chunks.clone();
        for (chunk_index, build) in chunks.iter().enumerate() {
            let start = self.build_chunk_starts[chunk_index];
            let unmatched: Vec<u32> = (0..build.len())
                .filter(|&i| flags.get(start + i).copied().unwrap_or(1) == 0)
                .map(|i| i as u32)
                .collect();
            let Some(batch) = build_null_probe_with_build(
                build,
                &unmatched,
                &self.probe_schema,
                &self.output_schema,
            )?
            else {
                continue;
            };
            let batch = apply_conjuncts(&self.arena, &self.other_conjuncts, batch)?;
            self.push_output(batch)?;
        }
        Ok(())
    }
}

impl Operator for NlJoinProbeOperator {
    fn name(&self) -> &str {
        &self.name
    }

    fn prepare(&mut self, state: &RuntimeState) -> Result<(), String> {
        self.output_accumulator.set_desired_size(state.chunk_size());
        Ok(())
    }

    fn close(&mut self) -> Result<(), String> {
        if !self.closed {
            self.closed = true;
            self.context.unref_op();
        }
        Ok(())
    }

    fn set_force_finished(&mut self) {
        self.context.set_finished();
        self.probe_chunk = None;
        self.output_accumulator.reset();
        self.advance_join_stage(JoinStage::Finished);
    }

    fn is_finished(&self) -> bool {
        if self.context.is_force_finished() {
            return !self.has_output();
        }
        (self.input_finished || self.skip_probe()) && !self.has_output()
    }

    fn as_processor_mut(&mut self) -> Option<&mut dyn ProcessorOperator> {
        Some(self)
    }

    fn as_processor_ref(&self) -> Option<&dyn ProcessorOperator> {
        Some(self)
    }
}

impl ProcessorOperator for NlJoinProbeOperator {
    fn need_input(&self) -> bool {
        if self.input_finished || self.join_stage.get() != JoinStage::Probing {
            return false;
        }
        if !self.is_ready() || self.skip_probe() {
            return false;
        }
        self.probe_chunk_finished()
    }

    fn has_output(&self) -> bool {
        self.check_post_probe();
        self.join_stage.get() != JoinStage::Finished
    }

    fn push_chunk(&mut self, _state: &RuntimeState, chunk: Chunk) -> Result<(), String> {
        if !self.need_input() {
            return Err("nljoin probe pushed a chunk while not accepting input".to_string());
        }
        self.ensure_build_loaded()?;
        if self.join_type.is_right_join() && self.self_build_match_flags.is_empty() {
            self.self_build_match_flags = vec![0; self.context.num_build_rows()];
        }
        self.probe_row_current = 0;
        self.probe_row_start = 0;
        self.curr_build_chunk_index = 0;
        self.probe_row_matched = false;
        self.probe_chunk = Some(chunk);
        Ok(())
    }

    fn pull_chunk(&mut self, state: &RuntimeState) -> Result<Option<Chunk>, String> {
        self.check_post_probe();
        match self.join_stage.get() {
            JoinStage::Finished => return Ok(None),
            JoinStage::EmitUnmatchedBuild => {
                self.permute_unmatched_build()?;
                self.output_accumulator.finalize()?;
                self.advance_join_stage(JoinStage::Draining);
            }
            JoinStage::Probing | JoinStage::Draining => {}
        }

        if let Some(chunk) = self.output_accumulator.pull() {
            return Ok(Some(chunk));
        }
        while !self.probe_chunk_finished() {
            let probe_chunk = self.probe_chunk.clone().ok_or("nljoin probe chunk missing")?;
            self.probe_step(state, &probe_chunk)?;
            if let Some(chunk) = self.output_accumulator.pull() {
                return Ok(Some(chunk));
            }
        }
        self.output_accumulator.finalize()?;
        Ok(self.output_accumulator.pull())
    }

    fn set_finishing(&mut self, _state: &RuntimeState) -> Result<(), String> {
        self.input_finished = true;
        self.check_post_probe();
        Ok(())
    }

    fn precondition_dependency(&self) -> Option<DependencyHandle> {
        Some(self.context.build_dep())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ids::SlotId;
    use crate::exec::chunk::field_with_slot_id;
    use crate::exec::expr::{ExprNode, LiteralValue};
    use crate::exec::operators::nljoin::NlJoinBuildSinkFactory;
    use arrow::array::{Array, Int32Array};
    use arrow::datatypes::{DataType, Field, Schema};

    fn probe_schema() -> SchemaRef {
        Arc::new(Schema::new(vec![field_with_slot_id(
            Field::new("a", DataType::Int32, false),
            SlotId::new(1),
        )]))
    }

    fn build_schema() -> SchemaRef {
        Arc::new(Schema::new(vec![field_with_slot_id(
            Field::new("b", DataType::Int32, false),
            SlotId::new(2),
        )]))
    }

    fn probe_chunk(values: Vec<i32>) -> Chunk {
        let batch = RecordBatch::try_new(probe_schema(), vec![Arc::new(Int32Array::from(values))])
            .expect("probe record batch");
        Chunk::try_new(batch).expect("probe chunk")
    }

    fn build_chunk(values: Vec<i32>) -> Chunk {
        let batch = RecordBatch::try_new(build_schema(), vec![Arc::new(Int32Array::from(values))])
            .expect("build record batch");
        Chunk::try_new(batch).expect("build chunk")
    }

    fn eq_arena() -> (Arc<ExprArena>, ExprId) {
        let mut arena = ExprArena::default();
        let a = arena.push(ExprNode::SlotId(SlotId::new(1)));
        let b = arena.push(ExprNode::SlotId(SlotId::new(2)));
        let eq = arena.push(ExprNode::Eq(a, b));
        (Arc::new(arena), eq)
    }

    /// Drive one build sink plus one probe partition to completion.
    fn run_join(
        state: &RuntimeState,
        join_type: NlJoinType,
        arena: Arc<ExprArena>,
        join_conjuncts: Vec<ExprId>,
        probe_chunks: Vec<Chunk>,
        build_chunks: Vec<Chunk>,
    ) -> Vec<Chunk> {
        let context = Arc::new(CrossJoinContext::new(7, 1));
        let probe_factory = NlJoinProbeOperatorFactory::new(
            arena,
            join_type,
            join_conjuncts,
            Vec::new(),
            probe_schema(),
            build_schema(),
            Arc::clone(&context),
        );
        let sink_factory = NlJoinBuildSinkFactory::new(Arc::clone(&context));
        let mut sink = sink_factory.create(1, 0);
        let mut op = probe_factory.create(1, 0);
        op.prepare(state).expect("prepare probe");

        {
            let s = sink.as_processor_mut().expect("sink processor");
            for chunk in build_chunks {
                s.push_chunk(state, chunk).expect("push build");
            }
            s.set_finishing(state).expect("finish build");
        }

        let mut out = Vec::new();
        let mut inputs = probe_chunks.into_iter();
        loop {
            {
                let p = op.as_processor_mut().expect("probe processor");
                if p.need_input() {
                    match inputs.next() {
                        Some(chunk) => p.push_chunk(state, chunk).expect("push probe"),
                        None => p.set_finishing(state).expect("finish probe"),
                    }
                }
                while p.has_output() {
                    match p.pull_chunk(state).expect("pull probe") {
                        Some(chunk) => out.push(chunk),
                        None => break,
                    }
                }
            }
            if op.is_finished() {
                break;
            }
        }
        op.close().expect("close probe");
        sink.close().expect("close sink");
        out
    }

    fn collect_rows(chunks: &[Chunk]) -> Vec<(Option<i32>, Option<i32>)> {
        let mut rows = Vec::new();
        for chunk in chunks {
            let a = chunk
                .batch
                .column(0)
                .as_any()
                .downcast_ref::<Int32Array>()
                .expect("probe column");
            let b = chunk
                .batch
                .column(1)
                .as_any()
                .downcast_ref::<Int32Array>()
                .expect("build column");
            for i in 0..chunk.len() {
                rows.push((
                    a.is_valid(i).then(|| a.value(i)),
                    b.is_valid(i).then(|| b.value(i)),
                ));
            }
        }
        rows
    }

    #[test]
    fn inner_join_keeps_only_matching_pairs() {
        let state = RuntimeState::default();
        let (arena, eq) = eq_arena();
        let out = run_join(
            &state,
            NlJoinType::Inner,
            arena,
            vec![eq],
            vec![probe_chunk(vec![1, 2, 3])],
            vec![build_chunk(vec![2, 3, 3])],
        );
        let mut rows = collect_rows(&out);
        rows.sort();
        assert_eq!(
            rows,
            vec![
                (Some(2), Some(2)),
                (Some(3), Some(3)),
                (Some(3), Some(3)),
            ]
        );
    }

    #[test]
    fn cross_join_emits_the_full_product_over_multiple_build_chunks() {
        let state = RuntimeState::default();
        let out = run_join(
            &state,
            NlJoinType::Cross,
            Arc::new(ExprArena::default()),
            Vec::new(),
            vec![probe_chunk(vec![1, 2])],
            vec![build_chunk(vec![10]), build_chunk(vec![20, 30])],
        );
        let mut rows = collect_rows(&out);
        rows.sort();
        assert_eq!(
            rows,
            vec![
                (Some(1), Some(10)),
                (Some(1), Some(20)),
                (Some(1), Some(30)),
                (Some(2), Some(10)),
                (Some(2), Some(20)),
                (Some(2), Some(30)),
            ]
        );
    }

    #[test]
    fn left_outer_preserves_unmatched_probe_rows() {
        let state = RuntimeState::default();
        let (arena, eq) = eq_arena();
        let out = run_join(
            &state,
            NlJoinType::LeftOuter,
            arena,
            vec![eq],
            vec![probe_chunk(vec![1, 2, 3])],
            vec![build_chunk(vec![2])],
        );
        let mut rows = collect_rows(&out);
        rows.sort();
        assert_eq!(
            rows,
            vec![(Some(1), None), (Some(2), Some(2)), (Some(3), None)]
        );
    }

    #[test]
    fn left_outer_resolves_matches_across_build_chunks() {
        // A row matched by any build chunk must not also surface as unmatched.
        let state = RuntimeState::default();
        let (arena, eq) = eq_arena();
        let out = run_join(
            &state,
            NlJoinType::LeftOuter,
            arena,
            vec![eq],
            vec![probe_chunk(vec![1, 2, 4])],
            vec![build_chunk(vec![2]), build_chunk(vec![4])],
        );
        let mut rows = collect_rows(&out);
        rows.sort();
        assert_eq!(
            rows,
            vec![(Some(1), None), (Some(2), Some(2)), (Some(4), Some(4))]
        );
    }

    #[test]
    fn left_outer_with_empty_build_never_evaluates_conjuncts() {
        // The conjunct id points into an empty arena, so any evaluation
        // attempt would fail the run.
        let state = RuntimeState::default();
        let bogus = ExprId(99);
        let out = run_join(
            &state,
            NlJoinType::LeftOuter,
            Arc::new(ExprArena::default()),
            vec![bogus],
            vec![probe_chunk(vec![1, 2])],
            Vec::new(),
        );
        let mut rows = collect_rows(&out);
        rows.sort();
        assert_eq!(rows, vec![(Some(1), None), (Some(2), None)]);
    }

    #[test]
    fn right_outer_emits_unmatched_build_rows_after_probing() {
        let state = RuntimeState::default();
        let (arena, eq) = eq_arena();
        let out = run_join(
            &state,
            NlJoinType::RightOuter,
            arena,
            vec![eq],
            vec![probe_chunk(vec![2])],
            vec![build_chunk(vec![1, 2]), build_chunk(vec![3])],
        );
        let mut rows = collect_rows(&out);
        rows.sort();
        assert_eq!(
            rows,
            vec![(None, Some(1)), (None, Some(3)), (Some(2), Some(2))]
        );
    }

    #[test]
    fn full_outer_preserves_both_sides_without_double_counting() {
        let state = RuntimeState::default();
        let (arena, eq) = eq_arena();
        let out = run_join(
            &state,
            NlJoinType::FullOuter,
            arena,
            vec![eq],
            vec![probe_chunk(vec![1, 2])],
            vec![build_chunk(vec![2]), build_chunk(vec![3])],
        );
        let mut rows = collect_rows(&out);
        rows.sort();
        assert_eq!(
            rows,
            vec![(None, Some(3)), (Some(1), None), (Some(2), Some(2))]
        );
    }

    #[test]
    fn inner_join_with_empty_build_finishes_without_probing() {
        let state = RuntimeState::default();
        let (arena, eq) = eq_arena();
        let out = run_join(
            &state,
            NlJoinType::Inner,
            arena,
            vec![eq],
            vec![probe_chunk(vec![1, 2, 3])],
            Vec::new(),
        );
        assert!(out.is_empty());
    }

    #[test]
    fn output_chunks_respect_the_configured_chunk_size() {
        let state = RuntimeState::with_chunk_size(2);
        let out = run_join(
            &state,
            NlJoinType::Cross,
            Arc::new(ExprArena::default()),
            Vec::new(),
            vec![probe_chunk(vec![1, 2, 3])],
            vec![build_chunk(vec![7, 8])],
        );
        assert_eq!(out.iter().map(Chunk::len).sum::<usize>(), 6);
        for chunk in &out {
            assert!(chunk.len() <= 2);
        }
    }

    #[test]
    fn probe_rejects_input_before_the_build_side_is_ready() {
        let state = RuntimeState::default();
        let context = Arc::new(CrossJoinContext::new(7, 1));
        let factory = NlJoinProbeOperatorFactory::new(
            Arc::new(ExprArena::default()),
            NlJoinType::Cross,
            Vec::new(),
            Vec::new(),
            probe_schema(),
            build_schema(),
            Arc::clone(&context),
        );
        let mut op = factory.create(1, 0);
        op.prepare(&state).expect("prepare");
        let p = op.as_processor_mut().expect("probe processor");
        assert!(!p.need_input());
        assert!(p.push_chunk(&state, probe_chunk(vec![1])).is_err());
        op.close().expect("close");
    }

    #[test]
    fn null_predicate_results_do_not_match() {
        // b IS NULL rows compare to NULL under a = b and must not join,
        // but the build row itself still counts as unmatched for full outer.
        let state = RuntimeState::default();
        let (arena, eq) = eq_arena();
        let schema = Arc::new(Schema::new(vec![field_with_slot_id(
            Field::new("b", DataType::Int32, true),
            SlotId::new(2),
        )]));
        let batch = RecordBatch::try_new(
            schema,
            vec![Arc::new(Int32Array::from(vec![Some(1), None]))],
        )
        .expect("build record batch");
        let build = Chunk::try_new(batch).expect("build chunk");

        let context = Arc::new(CrossJoinContext::new(7, 1));
        let probe_factory = NlJoinProbeOperatorFactory::new(
            arena,
            NlJoinType::FullOuter,
            vec![eq],
            Vec::new(),
            probe_schema(),
            build.schema(),
            Arc::clone(&context),
        );
        let sink_factory = NlJoinBuildSinkFactory::new(Arc::clone(&context));
        let mut sink = sink_factory.create(1, 0);
        let mut op = probe_factory.create(1, 0);
        op.prepare(&state).expect("prepare probe");
        {
            let s = sink.as_processor_mut().expect("sink processor");
            s.push_chunk(&state, build).expect("push build");
            s.set_finishing(&state).expect("finish build");
        }
        let mut out = Vec::new();
        {
            let p = op.as_processor_mut().expect("probe processor");
            p.push_chunk(&state, probe_chunk(vec![1, 5])).expect("push probe");
            p.set_finishing(&state).expect("finish probe");
            while p.has_output() {
                match p.pull_chunk(&state).expect("pull probe") {
                    Some(chunk) => out.push(chunk),
                    None => break,
                }
            }
        }
        op.close().expect("close probe");
        sink.close().expect("close sink");

        let mut rows = collect_rows(&out);
        rows.sort();
        assert_eq!(
            rows,
            vec![(None, None), (Some(1), Some(1)), (Some(5), None)]
        );
    }

    #[test]
    fn force_finish_drops_pending_output() {
        let state = RuntimeState::default();
        let context = Arc::new(CrossJoinContext::new(7, 1));
        let probe_factory = NlJoinProbeOperatorFactory::new(
            Arc::new(ExprArena::default()),
            NlJoinType::Cross,
            Vec::new(),
            Vec::new(),
            probe_schema(),
            build_schema(),
            Arc::clone(&context),
        );
        let sink_factory = NlJoinBuildSinkFactory::new(Arc::clone(&context));
        let mut sink = sink_factory.create(1, 0);
        let mut op = probe_factory.create(1, 0);
        op.prepare(&state).expect("prepare probe");
        {
            let s = sink.as_processor_mut().expect("sink processor");
            s.push_chunk(&state, build_chunk(vec![1, 2])).expect("push build");
            s.set_finishing(&state).expect("finish build");
        }
        {
            let p = op.as_processor_mut().expect("probe processor");
            p.push_chunk(&state, probe_chunk(vec![1, 2, 3])).expect("push probe");
        }
        op.set_force_finished();
        assert!(op.is_finished());
        {
            let p = op.as_processor_mut().expect("probe processor");
            assert!(!p.has_output());
            assert!(p.pull_chunk(&state).expect("pull").is_none());
        }
        op.close().expect("close probe");
        sink.close().expect("close sink");
    }

    #[test]
    fn literal_false_conjunct_turns_left_outer_into_all_null_build() {
        let state = RuntimeState::default();
        let mut arena = ExprArena::default();
        let f = arena.push(ExprNode::Literal(LiteralValue::Bool(false)));
        let out = run_join(
            &state,
            NlJoinType::LeftOuter,
            Arc::new(arena),
            vec![f],
            vec![probe_chunk(vec![1, 2])],
            vec![build_chunk(vec![9])],
        );
        let mut rows = collect_rows(&out);
        rows.sort();
        assert_eq!(rows, vec![(Some(1), None), (Some(2), None)]);
    }
}
