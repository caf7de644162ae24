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
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, BooleanArray, BooleanBuilder};
use arrow::compute::cast;
use arrow::compute::kernels::cmp::{eq, gt, gt_eq, lt, lt_eq, neq};
use arrow::datatypes::DataType;

use crate::exec::chunk::Chunk;
use crate::exec::expr::{ExprArena, ExprId};

/// Widen mismatched numeric operand types so the Arrow cmp kernels accept them.
pub fn normalize_comparison_types(
    left: ArrayRef,
    right: ArrayRef,
) -> Result<(ArrayRef, ArrayRef), String> {
    let left_type = left.data_type().clone();
    let right_type = right.data_type().clone();
    if left_type == right_type {
        return Ok((left, right));
    }

    let is_int = |dt: &DataType| {
        matches!(
            dt,
            DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64
        )
    };
    let is_float = |dt: &DataType| matches!(dt, DataType::Float32 | DataType::Float64);

    let target = if is_int(&left_type) && is_int(&right_type) {
        DataType::Int64
    } else if (is_int(&left_type) || is_float(&left_type))
        && (is_int(&right_type) || is_float(&right_type))
    {
        DataType::Float64
    } else if matches!(left_type, DataType::Null) {
        right_type.clone()
    } else if matches!(right_type, DataType::Null) {
        left_type.clone()
    } else {
        return Err(format!(
            "cannot compare {:?} with {:?}",
            left_type, right_type
        ));
    };

    let left = if left.data_type() == &target {
        left
    } else {
        cast(&left, &target).map_err(|e| e.to_string())?
    };
    let right = if right.data_type() == &target {
        right
    } else {
        cast(&right, &target).map_err(|e| e.to_string())?
    };
    Ok((left, right))
}

macro_rules! binary_cmp {
    ($name:ident, $kernel:ident) => {
        pub(super) fn $name(
            arena: &ExprArena,
            left: ExprId,
            right: ExprId,
            chunk: &Chunk,
        ) -> Result<ArrayRef, String> {
            let l = arena.eval(left, chunk)?;
            let r = arena.eval(right, chunk)?;
            let (l, r) = normalize_comparison_types(l, r)?;
            let result = $kernel(&l, &r).map_err(|e| e.to_string())?;
            Ok(Arc::new(result))
        }
    };
}

binary_cmp!(eval_eq, eq);
binary_cmp!(eval_ne, neq);
binary_cmp!(eval_lt, lt);
binary_cmp!(eval_le, lt_eq);
binary_cmp!(eval_gt, gt);
binary_cmp!(eval_ge, gt_eq);

fn as_boolean(arr: &ArrayRef, op: &str) -> Result<BooleanArray, String> {
    arr.as_any()
        .downcast_ref::<BooleanArray>()
        .cloned()
        .ok_or_else(|| format!("{op} operand must be boolean"))
}

// SQL three-valued logic: FALSE dominates AND, TRUE dominates OR.
pub(super) fn eval_and(
    arena: &ExprArena,
    left: ExprId,
    right: ExprId,
    chunk: &Chunk,
) -> Result<ArrayRef, String> {
    let l = as_boolean(&arena.eval(left, chunk)?, "AND")?;
    let r = as_boolean(&arena.eval(right, chunk)?, "AND")?;
    let mut builder = BooleanBuilder::with_capacity(l.len());
    for i in 0..l.len() {
        let lv = if l.is_null(i) { None } else { Some(l.value(i)) };
        let rv = if r.is_null(i) { None } else { Some(r.value(i)) };
        match (lv, rv) {
            (Some(false), _) | (_, Some(false)) => builder.append_value(false),
            (Some(true), Some(true)) => builder.append_value(true),
            _ => builder.append_null(),
        }
    }
    Ok(Arc::new(builder.finish()))
}

pub(super) fn eval_or(
    arena: &ExprArena,
    left: ExprId,
    right: ExprId,
    chunk: &Chunk,
) -> Result<ArrayRef, String> {
    let l = as_boolean(&arena.eval(left, chunk)?, "OR")?;
    let r = as_boolean(&arena.eval(right, chunk)?, "OR")?;
    let mut builder = BooleanBuilder::with_capacity(l.len());
    for i in 0..l.len() {
        let lv = if l.is_null(i) { None } else { Some(l.value(i)) };
        let rv = if r.is_null(i) { None } else { Some(r.value(i)) };
        match (lv, rv) {
            (Some(true), _) | (_, Some(true)) => builder.append_value(true),
            (Some(false), Some(false)) => builder.append_value(false),
            _ => builder.append_null(),
        }
    }
    Ok(Arc::new(builder.finish()))
}

pub(super) fn eval_not(
    arena: &ExprArena,
    child: ExprId,
    chunk: &Chunk,
) -> Result<ArrayRef, String> {
    let c = as_boolean(&arena.eval(child, chunk)?, "NOT")?;
    let result = arrow::compute::kernels::boolean::not(&c).map_err(|e| e.to_string())?;
    Ok(Arc::new(result))
}

pub(super) fn eval_is_null(
    arena: &ExprArena,
    child: ExprId,
    chunk: &Chunk,
) -> Result<ArrayRef, String> {
    let c = arena.eval(child, chunk)?;
    let result = arrow::compute::kernels::boolean::is_null(&c).map_err(|e| e.to_string())?;
    Ok(Arc::new(result))
}

pub(super) fn eval_is_not_null(
    arena: &ExprArena,
    child: ExprId,
    chunk: &Chunk,
) -> Result<ArrayRef, String> {
    let c = arena.eval(child, chunk)?;
    let result = arrow::compute::kernels::boolean::is_not_null(&c).map_err(|e| e.to_string())?;
    Ok(Arc::new(result))
}
