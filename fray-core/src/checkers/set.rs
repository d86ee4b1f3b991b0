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

//! An illustrative checker (spec §8, scenario S5: "set-add with crashed
//! writes") for the classic Jepsen set workload: clients `add` elements and
//! occasionally `read` the whole set. Every acknowledged `add` must show up
//! in every later `read`; elements that appear in a `read` without a
//! matching `add` are a correctness violation.

use std::collections::BTreeSet;

use super::{CheckResult, Checker};
use crate::history::History;
use crate::op::OpType;

/// Checks a set workload's `add`/`read` history.
pub struct SetChecker;

fn as_u64(value: &serde_json::Value) -> Option<u64> {
    value.as_u64()
}

impl Checker for SetChecker {
    fn check(&self, history: &History) -> CheckResult {
        let mut acknowledged: BTreeSet<u64> = BTreeSet::new();
        let mut attempted: BTreeSet<u64> = BTreeSet::new();
        let mut final_read: Option<BTreeSet<u64>> = None;

        for op in history.as_slice() {
            match (op.f.as_ref(), op.op_type) {
                ("add", OpType::Invoke) => {
                    if let Some(v) = as_u64(&op.value) {
                        attempted.insert(v);
                    }
                }
                ("add", OpType::Ok) => {
                    if let Some(v) = as_u64(&op.value) {
                        acknowledged.insert(v);
                    }
                }
                ("read", OpType::Ok) => {
                    if let Some(items) = op.value.as_array() {
                        let read: BTreeSet<u64> = items.iter().filter_map(as_u64).collect();
                        final_read = Some(read);
                    }
                }
                _ => {}
            }
        }

        let Some(read) = final_read else {
            return CheckResult::violation("no successful read observed; cannot check set contents");
        };

        let lost: Vec<u64> = acknowledged.difference(&read).copied().collect();
        let unexpected: Vec<u64> = read.difference(&attempted).copied().collect();

        let mut result = CheckResult::ok();
        if !lost.is_empty() {
            result = result.and(CheckResult::violation(format!(
                "acknowledged adds missing from final read: {lost:?}"
            )));
        }
        if !unexpected.is_empty() {
            result = result.and(CheckResult::violation(format!(
                "final read contains elements that were never attempted: {unexpected:?}"
            )));
        }
        result
    }
}
