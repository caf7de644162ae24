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
//! Shared build-side state for nested-loop join execution.
//!
//! Responsibilities:
//! - Owns the materialized build chunks and their cumulative row offsets,
//!   published once by the build sink and read-only for probes afterwards.
//! - Hosts the shared per-build-row match flags for right/full outer joins
//!   and the exactly-once handoff that picks the partition responsible for
//!   emitting unmatched build rows.
//!
//! Key exported interfaces:
//! - Types: `CrossJoinContext`.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::common::logging::debug;
use crate::exec::chunk::Chunk;
use crate::exec::pipeline::dependency::{Dependency, DependencyHandle};

#[derive(Default)]
struct BuildSide {
    chunks: Vec<Chunk>,
    // Cumulative row offset of each chunk, for mapping a chunk-local row
    // to its slot in the flat match-flag vector.
    chunk_starts: Vec<usize>,
}

/// State shared by the build sink and all parallel probe partitions.
///
/// Lifecycle: created when the build side begins, populated by the sink
/// (single writer), frozen by `mark_right_finished`, read by probes, and
/// torn down when the last holder calls `unref_op`.
pub struct CrossJoinContext {
    node_id: i32,
    build_dep: DependencyHandle,
    build: Mutex<BuildSide>,
    right_finished: AtomicBool,
    build_rows: AtomicUsize,
    refs: AtomicUsize,
    // Countdown of probe partitions still probing; the caller that drives it
    // to zero wins the unmatched-build emission pass.
    probe_remaining: AtomicUsize,
    shared_match_flags: Mutex<Vec<u8>>,
    force_finished: AtomicBool,
}

impl CrossJoinContext {
    pub fn new(node_id: i32, probe_dop: usize) -> Self {
        let dop = probe_dop.max(1);
        Self {
            node_id,
            build_dep: Dependency::new(format!("nljoin_build:{node_id}")),
            build: Mutex::new(BuildSide::default()),
            right_finished: AtomicBool::new(false),
            build_rows: AtomicUsize::new(0),
            refs: AtomicUsize::new(0),
            probe_remaining: AtomicUsize::new(dop),
            shared_match_flags: Mutex::new(Vec::new()),
            force_finished: AtomicBool::new(false),
        }
    }

    pub fn node_id(&self) -> i32 {
        self.node_id
    }

    pub fn build_dep(&self) -> DependencyHandle {
        DependencyHandle::clone(&self.build_dep)
    }

    /// Register one holder (sink or probe partition).
    pub fn ref_op(&self) {
        self.refs.fetch_add(1, Ordering::AcqRel);
    }

    /// Release one holder; the last release frees the build chunks.
    pub fn unref_op(&self) {
        let prev = self.refs.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "cross join context unref without ref");
        if prev == 1 {
            self.release_build();
        }
    }

    /// Append one build chunk. Single-writer: only the build sink calls this,
    /// and only before `mark_right_finished`.
    pub fn append_build_chunk(&self, chunk: Chunk) -> Result<(), String> {
        if self.right_finished.load(Ordering::Acquire) {
            return Err("nljoin build side already finished".to_string());
        }
        let mut build = self.build.lock().expect("nljoin build lock");
        build.chunk_starts.push(self.build_rows.load(Ordering::Acquire));
        self.build_rows.fetch_add(chunk.len(), Ordering::AcqRel);
        build.chunks.push(chunk);
        Ok(())
    }

    /// Freeze the build side and unblock probes. The shared match-flag
    /// vector is sized here and never resized afterwards.
    pub fn mark_right_finished(&self) {
        let rows = self.build_rows.load(Ordering::Acquire);
        {
            let mut flags = self.shared_match_flags.lock().expect("nljoin match flags lock");
            flags.resize(rows, 0);
        }
        self.right_finished.store(true, Ordering::Release);
        self.build_dep.set_ready();
        debug!(node_id = self.node_id, rows, "nljoin build side finished");
    }

    pub fn is_right_finished(&self) -> bool {
        self.right_finished.load(Ordering::Acquire)
    }

    pub fn is_build_empty(&self) -> bool {
        self.is_right_finished() && self.build_rows.load(Ordering::Acquire) == 0
    }

    pub fn num_build_rows(&self) -> usize {
        self.build_rows.load(Ordering::Acquire)
    }

    pub fn num_build_chunks(&self) -> usize {
        self.build.lock().expect("nljoin build lock").chunks.len()
    }

    /// Snapshot of the build chunks and their cumulative starts.
    /// Valid only after `mark_right_finished`; probes load this once.
    pub fn build_chunks(&self) -> Result<(Vec<Chunk>, Vec<usize>), String> {
        if !self.is_right_finished() {
            return Err("nljoin build not ready".to_string());
        }
        let build = self.build.lock().expect("nljoin build lock");
        Ok((build.chunks.clone(), build.chunk_starts.clone()))
    }

    pub fn get_build_chunk(&self, index: usize) -> Result<Chunk, String> {
        let build = self.build.lock().expect("nljoin build lock");
        build
            .chunks
            .get(index)
            .cloned()
            .ok_or_else(|| format!("nljoin build chunk {index} missing"))
    }

    pub fn build_chunk_start(&self, index: usize) -> Result<usize, String> {
        let build = self.build.lock().expect("nljoin build lock");
        build
            .chunk_starts
            .get(index)
            .copied()
            .ok_or_else(|| format!("nljoin build chunk {index} missing"))
    }

    /// OR a partition's local match observations into the shared vector
    /// starting at `offset`. Bits are only ever set, never cleared, so
    /// interleaved merges from different partitions commute.
    pub fn merge_match_flags(&self, offset: usize, local: &[u8]) -> Result<(), String> {
        let mut shared = self.shared_match_flags.lock().expect("nljoin match flags lock");
        if offset + local.len() > shared.len() {
            return Err(format!(
                "nljoin match flag merge out of bounds: offset={} len={} shared={}",
                offset,
                local.len(),
                shared.len()
            ));
        }
        for (dst, src) in shared[offset..offset + local.len()].iter_mut().zip(local) {
            *dst |= *src;
        }
        Ok(())
    }

    /// Report that `driver_seq` has no more probe input and no buffered
    /// output, merging its local match flags first. Returns whether this
    /// caller is the one responsible for emitting unmatched build rows:
    /// exactly one caller across all partitions gets `true` — the one whose
    /// decrement drives the countdown to zero.
    pub fn finish_probe(&self, driver_seq: i32, local_flags: Option<&[u8]>) -> bool {
        if let Some(local) = local_flags {
            if let Err(e) = self.merge_match_flags(0, local) {
                debug_assert!(false, "{e}");
            }
        }
        let prev = self.probe_remaining.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "nljoin finish_probe called more times than dop");
        let last = prev == 1;
        debug!(
            node_id = self.node_id,
            driver_seq, last, "nljoin probe partition finished"
        );
        last
    }

    /// Copy of the shared match flags, for the unmatched-build sweep.
    pub fn shared_match_flags(&self) -> Vec<u8> {
        self.shared_match_flags.lock().expect("nljoin match flags lock").clone()
    }

    /// Force finish: release everything now, regardless of partition state.
    pub fn set_finished(&self) {
        self.force_finished.store(true, Ordering::Release);
        self.release_build();
    }

    pub fn is_force_finished(&self) -> bool {
        self.force_finished.load(Ordering::Acquire)
    }

    fn release_build(&self) {
        if let Ok(mut build) = self.build.lock() {
            build.chunks.clear();
            build.chunk_starts.clear();
        }
        if let Ok(mut flags) = self.shared_match_flags.lock() {
            flags.clear();
            flags.shrink_to_fit();
        }
    }
}
