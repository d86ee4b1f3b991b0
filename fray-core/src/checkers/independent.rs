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

//! The checker half of the independent-keys wrapper (spec §4.6, "Independent
//! wrapper", step 2): demultiplex the keyed history and check each key's
//! sub-history in parallel, on its own thread, then fold the per-key
//! verdicts together.

use super::{CheckResult, Checker};
use crate::history::History;

/// Wraps a per-key [`Checker`] so it can be applied to a history whose `Op`
/// values are `[key, inner_value]` pairs, produced by
/// [`crate::generator::independent::independent`].
pub struct IndependentChecker<C> {
    inner: C,
}

impl<C: Checker> IndependentChecker<C> {
    pub fn new(inner: C) -> IndependentChecker<C> {
        IndependentChecker { inner }
    }
}

impl<C: Checker> Checker for IndependentChecker<C> {
    fn check(&self, history: &History) -> CheckResult {
        let partitions = history.split_by_key();
        std::thread::scope(|scope| {
            let handles: Vec<_> = partitions
                .into_iter()
                .map(|(key, sub_history)| {
                    scope.spawn(move || {
                        let result = self.inner.check(&sub_history);
                        (key, result)
                    })
                })
                .collect();

            let mut overall = CheckResult::ok();
            for handle in handles {
                let (key, result) = handle.join().expect("checker thread panicked");
                if !result.valid {
                    overall.valid = false;
                }
                overall
                    .details
                    .extend(result.details.into_iter().map(|d| format!("key {key:?}: {d}")));
            }
            overall
        })
    }
}
