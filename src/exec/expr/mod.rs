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
//! Arena-based compiled-expression evaluation.
//!
//! Responsibilities:
//! - Evaluates planner-compiled predicate trees against chunks, producing
//!   Arrow arrays; join and residual conjuncts are lists of boolean roots.
//! - Provides the conjunct-to-filter helper used by join operators.
//!
//! Key exported interfaces:
//! - Types: `ExprArena`, `ExprId`, `ExprNode`, `LiteralValue`.
//! - Functions: `eval_conjunct_filter`.

mod comparison;
mod literal;

use arrow::array::{Array, ArrayRef, BooleanArray};
use arrow::record_batch::RecordBatch;

use crate::common::ids::SlotId;
use crate::exec::chunk::Chunk;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ExprId(pub usize);

#[derive(Clone, Debug)]
pub enum LiteralValue {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    Utf8(String),
}

#[derive(Clone, Debug)]
pub enum ExprNode {
    Literal(LiteralValue),
    /// Column reference resolved through the chunk's slot-id map.
    SlotId(SlotId),
    Eq(ExprId, ExprId),
    Ne(ExprId, ExprId),
    Lt(ExprId, ExprId),
    Le(ExprId, ExprId),
    Gt(ExprId, ExprId),
    Ge(ExprId, ExprId),
    And(ExprId, ExprId),
    Or(ExprId, ExprId),
    Not(ExprId),
    IsNull(ExprId),
    IsNotNull(ExprId),
}

#[derive(Clone, Debug, Default)]
pub struct ExprArena {
    nodes: Vec<ExprNode>,
}

impl ExprArena {
    pub fn push(&mut self, node: ExprNode) -> ExprId {
        let id = ExprId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    pub fn node(&self, id: ExprId) -> Option<&ExprNode> {
        self.nodes.get(id.0)
    }

    pub fn eval(&self, id: ExprId, chunk: &Chunk) -> Result<ArrayRef, String> {
        let node = self
            .nodes
            .get(id.0)
            .ok_or_else(|| format!("invalid expr id {}", id.0))?;
        match node {
            ExprNode::Literal(v) => literal::eval(v, chunk.len()),
            ExprNode::SlotId(slot_id) => chunk.column_by_slot_id(*slot_id),
            ExprNode::Eq(a, b) => comparison::eval_eq(self, *a, *b, chunk),
            ExprNode::Ne(a, b) => comparison::eval_ne(self, *a, *b, chunk),
            ExprNode::Lt(a, b) => comparison::eval_lt(self, *a, *b, chunk),
            ExprNode::Le(a, b) => comparison::eval_le(self, *a, *b, chunk),
            ExprNode::Gt(a, b) => comparison::eval_gt(self, *a, *b, chunk),
            ExprNode::Ge(a, b) => comparison::eval_ge(self, *a, *b, chunk),
            ExprNode::And(a, b) => comparison::eval_and(self, *a, *b, chunk),
            ExprNode::Or(a, b) => comparison::eval_or(self, *a, *b, chunk),
            ExprNode::Not(child) => comparison::eval_not(self, *child, chunk),
            ExprNode::IsNull(child) => comparison::eval_is_null(self, *child, chunk),
            ExprNode::IsNotNull(child) => comparison::eval_is_not_null(self, *child, chunk),
        }
    }

    /// Evaluate `id` as a predicate over `chunk`, yielding one boolean per row.
    pub fn eval_predicate(&self, id: ExprId, chunk: &Chunk) -> Result<BooleanArray, String> {
        let arr = self.eval(id, chunk)?;
        arr.as_any()
            .downcast_ref::<BooleanArray>()
            .cloned()
            .ok_or_else(|| {
                format!(
                    "predicate expr {} must return a boolean array, got {:?}",
                    id.0,
                    arr.data_type()
                )
            })
    }
}

/// Evaluate a conjunct list over a batch into one selection filter.
///
/// NULL predicate results select nothing (SQL WHERE semantics), so the
/// returned filter has no nulls of its own.
pub fn eval_conjunct_filter(
    arena: &ExprArena,
    conjuncts: &[ExprId],
    batch: &RecordBatch,
) -> Result<BooleanArray, String> {
    let rows = batch.num_rows();
    let chunk = Chunk::try_new(batch.clone())?;
    let mut combined: Option<Vec<bool>> = None;
    for expr in conjuncts {
        let mask = arena.eval_predicate(*expr, &chunk)?;
        if mask.len() != rows {
            return Err(format!(
                "conjunct filter length {} does not match batch rows {}",
                mask.len(),
                rows
            ));
        }
        let acc = combined.get_or_insert_with(|| vec![true; rows]);
        for (i, keep) in acc.iter_mut().enumerate() {
            *keep = *keep && mask.is_valid(i) && mask.value(i);
        }
    }
    Ok(BooleanArray::from(
        combined.unwrap_or_else(|| vec![true; rows]),
    ))
}

/// Apply a conjunct list to a batch, returning the compacted batch.
pub fn apply_conjuncts(
    arena: &ExprArena,
    conjuncts: &[ExprId],
    batch: RecordBatch,
) -> Result<RecordBatch, String> {
    if conjuncts.is_empty() || batch.num_rows() == 0 {
        return Ok(batch);
    }
    let filter = eval_conjunct_filter(arena, conjuncts, &batch)?;
    arrow::compute::filter_record_batch(&batch, &filter).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::chunk::field_with_slot_id;
    use arrow::array::Int32Array;
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    fn test_chunk() -> Chunk {
        let schema = Arc::new(Schema::new(vec![
            field_with_slot_id(Field::new("a", DataType::Int32, false), SlotId::new(1)),
            field_with_slot_id(Field::new("b", DataType::Int32, true), SlotId::new(2)),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int32Array::from(vec![1, 2, 3, 4])),
                Arc::new(Int32Array::from(vec![Some(1), None, Some(3), Some(0)])),
            ],
        )
        .expect("build record batch");
        Chunk::try_new(batch).expect("build chunk")
    }

    #[test]
    fn eq_on_slots_handles_nulls() {
        let mut arena = ExprArena::default();
        let a = arena.push(ExprNode::SlotId(SlotId::new(1)));
        let b = arena.push(ExprNode::SlotId(SlotId::new(2)));
        let pred = arena.push(ExprNode::Eq(a, b));

        let chunk = test_chunk();
        let mask = arena.eval_predicate(pred, &chunk).expect("eval eq");
        assert!(mask.value(0));
        assert!(mask.is_null(1));
        assert!(mask.value(2));
        assert!(!mask.value(3));
    }

    #[test]
    fn conjunct_filter_treats_null_as_false() {
        let mut arena = ExprArena::default();
        let a = arena.push(ExprNode::SlotId(SlotId::new(1)));
        let b = arena.push(ExprNode::SlotId(SlotId::new(2)));
        let pred = arena.push(ExprNode::Eq(a, b));

        let chunk = test_chunk();
        let filter =
            eval_conjunct_filter(&arena, &[pred], &chunk.batch).expect("eval conjuncts");
        let values: Vec<bool> = (0..filter.len()).map(|i| filter.value(i)).collect();
        assert_eq!(values, vec![true, false, true, false]);
        assert_eq!(filter.null_count(), 0);
    }

    #[test]
    fn apply_conjuncts_compacts_batch() {
        let mut arena = ExprArena::default();
        let a = arena.push(ExprNode::SlotId(SlotId::new(1)));
        let two = arena.push(ExprNode::Literal(LiteralValue::Int32(2)));
        let pred = arena.push(ExprNode::Gt(a, two));

        let chunk = test_chunk();
        let out = apply_conjuncts(&arena, &[pred], chunk.batch).expect("apply conjuncts");
        assert_eq!(out.num_rows(), 2);
    }

    #[test]
    fn invalid_expr_id_is_an_error() {
        let arena = ExprArena::default();
        let chunk = test_chunk();
        assert!(arena.eval(ExprId(42), &chunk).is_err());
    }
}
