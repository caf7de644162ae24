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
//! Output chunk accumulator.
//!
//! Responsibilities:
//! - Coalesces repeated small appends into chunks of the desired size, and
//!   releases full chunks eagerly so the operator can stream them out.
//!
//! Key exported interfaces:
//! - Types: `ChunkAccumulator`.

use std::collections::VecDeque;

use arrow::compute::concat_batches;

use crate::exec::chunk::Chunk;

/// Buffers partial output chunks and releases them at the desired size.
///
/// Pushed chunks must all share one schema. Full chunks of exactly
/// `desired_size` rows move to the ready queue as they fill; the trailing
/// partial chunk is held back until `finalize`.
#[derive(Debug, Default)]
pub struct ChunkAccumulator {
    desired_size: usize,
    partial: Vec<Chunk>,
    partial_rows: usize,
    ready: VecDeque<Chunk>,
}

impl ChunkAccumulator {
    pub fn set_desired_size(&mut self, desired_size: usize) {
        self.desired_size = desired_size.max(1);
    }

    pub fn push(&mut self, chunk: Chunk) -> Result<(), String> {
        debug_assert!(self.desired_size > 0, "accumulator used before prepare");
        let mut remaining = chunk;
        loop {
            if remaining.is_empty() {
                return Ok(());
            }
            let want = self.desired_size - self.partial_rows;
            if remaining.len() < want {
                self.partial_rows += remaining.len();
                self.partial.push(remaining);
                return Ok(());
            }
            let fill = remaining.slice(0, want);
            let rest_len = remaining.len() - want;
            let rest = remaining.slice(want, rest_len);
            self.partial_rows += fill.len();
            self.partial.push(fill);
            self.flush_partial()?;
            remaining = rest;
        }
    }

    /// Flush the trailing partial chunk into the ready queue.
    pub fn finalize(&mut self) -> Result<(), String> {
        if self.partial_rows > 0 {
            self.flush_partial()?;
        }
        Ok(())
    }

    pub fn pull(&mut self) -> Option<Chunk> {
        self.ready.pop_front()
    }

    pub fn empty(&self) -> bool {
        self.partial_rows == 0 && self.ready.is_empty()
    }

    pub fn reset(&mut self) {
        self.partial.clear();
        self.partial_rows = 0;
        self.ready.clear();
    }

    fn flush_partial(&mut self) -> Result<(), String> {
        let parts = std::mem::take(&mut self.partial);
        self.partial_rows = 0;
        match parts.len() {
            0 => Ok(()),
            1 => {
                self.ready.push_back(parts.into_iter().next().ok_or("chunk missing")?);
                Ok(())
            }
            _ => {
                let schema = parts[0].schema();
                let batches: Vec<_> = parts.iter().map(|c| c.batch.clone()).collect();
                let merged = concat_batches(&schema, batches.iter()).map_err(|e| e.to_string())?;
                self.ready.push_back(Chunk::try_new(merged)?);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ids::SlotId;
    use crate::exec::chunk::field_with_slot_id;
    use arrow::array::Int32Array;
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::record_batch::RecordBatch;
    use std::sync::Arc;

    fn make_chunk(start: i32, rows: usize) -> Chunk {
        let schema = Arc::new(Schema::new(vec![field_with_slot_id(
            Field::new("v", DataType::Int32, false),
            SlotId::new(1),
        )]));
        let values: Vec<i32> = (0..rows as i32).map(|i| start + i).collect();
        let batch = RecordBatch::try_new(schema, vec![Arc::new(Int32Array::from(values))])
            .expect("build record batch");
        Chunk::try_new(batch).expect("build chunk")
    }

    fn chunk_values(chunk: &Chunk) -> Vec<i32> {
        let arr = chunk
            .columns()
            .first()
            .expect("first column")
            .as_any()
            .downcast_ref::<Int32Array>()
            .expect("int32 column");
        (0..arr.len()).map(|i| arr.value(i)).collect()
    }

    #[test]
    fn accumulator_releases_full_chunks_eagerly() {
        let mut acc = ChunkAccumulator::default();
        acc.set_desired_size(4);

        acc.push(make_chunk(0, 3)).expect("push #1");
        assert!(acc.pull().is_none());
        assert!(!acc.empty());

        acc.push(make_chunk(3, 3)).expect("push #2");
        let full = acc.pull().expect("full chunk");
        assert_eq!(chunk_values(&full), vec![0, 1, 2, 3]);
        assert!(acc.pull().is_none());

        acc.finalize().expect("finalize");
        let tail = acc.pull().expect("tail chunk");
        assert_eq!(chunk_values(&tail), vec![4, 5]);
        assert!(acc.empty());
    }

    #[test]
    fn accumulator_splits_oversized_pushes() {
        let mut acc = ChunkAccumulator::default();
        acc.set_desired_size(2);

        acc.push(make_chunk(0, 7)).expect("push");
        let mut sizes = Vec::new();
        while let Some(chunk) = acc.pull() {
            sizes.push(chunk.len());
        }
        assert_eq!(sizes, vec![2, 2, 2]);
        acc.finalize().expect("finalize");
        assert_eq!(acc.pull().expect("tail").len(), 1);
    }

    #[test]
    fn finalize_on_empty_accumulator_is_a_no_op() {
        let mut acc = ChunkAccumulator::default();
        acc.set_desired_size(8);
        acc.finalize().expect("finalize");
        assert!(acc.pull().is_none());
        assert!(acc.empty());
    }
}
