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
//! Output batch construction for nested-loop join.
//!
//! Responsibilities:
//! - Assembles joined batches from (probe row, build row) index pairs and
//!   the null-padded batches for unmatched rows of either side.
//! - Derives the joined output schema with outer-join nullability widening.
//!
//! Key exported interfaces:
//! - Functions: `output_schema`, `build_join_batch`,
//!   `build_probe_with_null_build`, `build_null_probe_with_build`.

use std::sync::Arc;

use arrow::array::{ArrayRef, UInt32Array, new_null_array};
use arrow::compute::take;
use arrow::datatypes::{Schema, SchemaRef};
use arrow::record_batch::RecordBatch;

use super::NlJoinType;
use crate::exec::chunk::Chunk;

/// Joined output schema: probe fields first, then build fields.
///
/// A column becomes nullable when its declared type is nullable, when it is a
/// probe-side column under right/full outer, or a build-side column under
/// left/full outer — unmatched rows null-fill the opposite side.
pub(crate) fn output_schema(
    probe_schema: &SchemaRef,
    build_schema: &SchemaRef,
    join_type: NlJoinType,
) -> SchemaRef {
    let mut fields = Vec::with_capacity(probe_schema.fields().len() + build_schema.fields().len());
    for field in probe_schema.fields() {
        let nullable = field.is_nullable() || join_type.is_right_join();
        fields.push(field.as_ref().clone().with_nullable(nullable));
    }
    for field in build_schema.fields() {
        let nullable = field.is_nullable() || join_type.is_left_join();
        fields.push(field.as_ref().clone().with_nullable(nullable));
    }
    Arc::new(Schema::new(fields))
}

/// Assemble one joined batch from matched (probe, build) row index pairs.
pub(crate) fn build_join_batch(
    probe: &Chunk,
    build: &Chunk,
    probe_indices: &[u32],
    build_indices: &[u32],
    output_schema: &SchemaRef,
) -> Result<Option<RecordBatch>, String> {
    if probe_indices.is_empty() || build_indices.is_empty() {
        return Ok(None);
    }
    debug_assert_eq!(probe_indices.len(), build_indices.len());
    let probe_idx = Arc::new(UInt32Array::from(probe_indices.to_vec())) as ArrayRef;
    let build_idx = Arc::new(UInt32Array::from(build_indices.to_vec())) as ArrayRef;

    let mut columns = Vec::with_capacity(probe.batch.num_columns() + build.batch.num_columns());
    for col in probe.batch.columns() {
        let taken = take(col.as_ref(), &probe_idx, None).map_err(|e| e.to_string())?;
        columns.push(taken);
    }
    for col in build.batch.columns() {
        let taken = take(col.as_ref(), &build_idx, None).map_err(|e| e.to_string())?;
        columns.push(taken);
    }

    let batch = RecordBatch::try_new(output_schema.clone(), columns).map_err(|e| e.to_string())?;
    Ok(Some(batch))
}

/// Probe-preserving rows with a null-filled build side (left/full outer).
pub(crate) fn build_probe_with_null_build(
    probe: &Chunk,
    probe_indices: &[u32],
    build_schema: &SchemaRef,
    output_schema: &SchemaRef,
) -> Result<Option<RecordBatch>, String> {
    if probe_indices.is_empty() {
        return Ok(None);
    }
    let len = probe_indices.len();
    let probe_idx = Arc::new(UInt32Array::from(probe_indices.to_vec())) as ArrayRef;

    let mut columns = Vec::with_capacity(probe.batch.num_columns() + build_schema.fields().len());
    for col in probe.batch.columns() {
        let taken = take(col.as_ref(), &probe_idx, None).map_err(|e| e.to_string())?;
        columns.push(taken);
    }
    for field in build_schema.fields() {
        columns.push(new_null_array(field.data_type(), len));
    }

    let batch = RecordBatch::try_new(output_schema.clone(), columns).map_err(|e| e.to_string())?;
    Ok(Some(batch))
}

/// Build-preserving rows with a null-filled probe side (right/full outer).
pub(crate) fn build_null_probe_with_build(
    build: &Chunk,
    build_indices: &[u32],
    probe_schema: &SchemaRef,
    output_schema: &SchemaRef,
) -> Result<Option<RecordBatch>, String> {
    if build_indices.is_empty() {
        return Ok(None);
    }
    let len = build_indices.len();
    let build_idx = Arc::new(UInt32Array::from(build_indices.to_vec())) as ArrayRef;

    let mut columns = Vec::with_capacity(probe_schema.fields().len() + build.batch.num_columns());
    for field in probe_schema.fields() {
        columns.push(new_null_array(field.data_type(), len));
    }
    for col in build.batch.columns() {
        let taken = take(col.as_ref(), &build_idx, None).map_err(|e| e.to_string())?;
        columns.push(taken);
    }

    let batch = RecordBatch::try_new(output_schema.clone(), columns).map_err(|e| e.to_string())?;
    Ok(Some(batch))
}
