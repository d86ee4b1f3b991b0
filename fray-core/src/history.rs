/*
 *   Copyright (c) 2026 The Fray Authors
 *   All rights reserved.
 *
 *   Licensed under the Apache License, Version 2.0 (the "License");
 *   you may not use this file except in compliance with the License.
 *   You may obtain a copy of the License at
 *
 *   http://www.apache.org/licenses/LICENSE-2.0
 *
 *   Unless required by applicable law or agreed to in writing, software
 *   distributed under the License is distributed on an "AS IS" BASIS,
 *   WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *   See the License for the specific language governing permissions and
 *   limitations under the License.
 */

//! The append-only, totally-indexed journal (spec §3, "History").

use std::collections::HashMap;
use std::time::Duration;

use crate::op::{Op, Process};

/// Owned exclusively by the interpreter while a test runs; handed out as an
/// immutable view once the test ends (spec §5, "Shared resources").
#[derive(Debug, Default, Clone)]
pub struct History {
    ops: Vec<Op>,
    /// Side-effect entries from `log(msg)` generators (spec §4.1). Kept
    /// separate from the `Op` stream so they never participate in the
    /// per-process alternation invariant.
    notes: Vec<(Duration, String)>,
}

impl History {
    pub fn new() -> History {
        History::default()
    }

    /// Stamp `op` with the next dense index and the given logical time, then
    /// append it. Only the interpreter should call this (spec §5).
    pub fn record(&mut self, mut op: Op, now: Duration) -> Op {
        op.index = self.ops.len() as u64;
        op.time = now.as_nanos() as u64;
        self.ops.push(op.clone());
        op
    }

    /// Append a `log(msg)` side-effect entry (spec §4.1).
    pub fn add_note(&mut self, now: Duration, message: String) {
        self.notes.push((now, message));
    }

    pub fn notes(&self) -> &[(Duration, String)] {
        &self.notes
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn as_slice(&self) -> &[Op] {
        &self.ops
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Op> {
        self.ops.iter()
    }

    /// Partition a history whose `value` fields are `[key, inner_value]` pairs
    /// into one sub-history per key, demultiplexing the `value` back down to
    /// `inner_value` (spec §4.6, "Independent wrapper", step 1).
    pub fn split_by_key(&self) -> HashMap<String, History> {
        let mut out: HashMap<String, History> = HashMap::new();
        for op in &self.ops {
            let (key, inner) = split_keyed_value(&op.value);
            let mut stripped = op.clone();
            stripped.value = inner;
            out.entry(key).or_default().ops.push(stripped);
        }
        out
    }

    /// Inverse of [`History::split_by_key`]: re-wrap each partition's ops as
    /// `[key, inner_value]` and merge into index order. This round-trips with
    /// `split_by_key` on well-formed histories (spec §8, "Round-trip and
    /// idempotence laws").
    pub fn merge_keyed(partitions: HashMap<String, History>) -> History {
        let mut merged: Vec<Op> = Vec::new();
        for (key, history) in partitions {
            for mut op in history.ops {
                op.value = serde_json::json!([key, op.value]);
                merged.push(op);
            }
        }
        merged.sort_by_key(|op| op.index);
        History {
            ops: merged,
            notes: Vec::new(),
        }
    }

    /// Checks the structural invariants spec §8.1 requires of every produced
    /// history. Returns the first violation found, if any.
    pub fn check_invariants(&self) -> Result<(), String> {
        let mut last_time = 0u64;
        let mut open: HashMap<Process, usize> = HashMap::new();
        let mut retired: std::collections::HashSet<Process> = std::collections::HashSet::new();

        for (i, op) in self.ops.iter().enumerate() {
            if op.index as usize != i {
                return Err(format!("index {} is not dense/0-based at position {i}", op.index));
            }
            if op.time < last_time {
                return Err(format!(
                    "time went backwards at index {}: {} < {}",
                    op.index, op.time, last_time
                ));
            }
            last_time = op.time;

            if retired.contains(&op.process) {
                return Err(format!(
                    "process {} emitted another op after an info completion",
                    op.process
                ));
            }

            if op.is_invoke() {
                if open.contains_key(&op.process) {
                    return Err(format!(
                        "process {} invoked again before its prior op completed",
                        op.process
                    ));
                }
                open.insert(op.process, i);
            } else {
                if open.remove(&op.process).is_none() {
                    return Err(format!(
                        "process {} completed without a preceding invoke",
                        op.process
                    ));
                }
                if op.op_type == crate::op::OpType::Info {
                    retired.insert(op.process);
                }
            }
        }
        Ok(())
    }

    /// Render the teacher-style human-readable `history.txt` line format.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for op in &self.ops {
            out.push_str(&format!(
                "{}\t{}\t{:?}\t{}\t{}\n",
                op.index, op.process, op.op_type, op.f, op.value
            ));
        }
        for (time, message) in &self.notes {
            out.push_str(&format!("# [{time:?}] {message}\n"));
        }
        out
    }
}

impl IntoIterator for History {
    type Item = Op;
    type IntoIter = std::vec::IntoIter<Op>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.into_iter()
    }
}

fn split_keyed_value(value: &serde_json::Value) -> (String, serde_json::Value) {
    match value {
        serde_json::Value::Array(items) if items.len() == 2 => {
            let key = match &items[0] {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key, items[1].clone())
        }
        other => ("".to_string(), other.clone()),
    }
}
