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

//! Post-hoc history analysis (spec §4.6). A checker never sees the system
//! under test directly — only the finished [`crate::history::History`].

pub mod bank;
pub mod independent;
pub mod set;

use crate::history::History;

/// The verdict a [`Checker`] reaches, plus whatever details are worth
/// surfacing to a human (spec §4.6: "valid/invalid plus supporting
/// details").
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub valid: bool,
    pub details: Vec<String>,
}

impl CheckResult {
    pub fn ok() -> CheckResult {
        CheckResult {
            valid: true,
            details: Vec::new(),
        }
    }

    pub fn violation(detail: impl Into<String>) -> CheckResult {
        CheckResult {
            valid: false,
            details: vec![detail.into()],
        }
    }

    /// Folds another result's details in; stays valid only if both are.
    pub fn and(mut self, other: CheckResult) -> CheckResult {
        self.valid &= other.valid;
        self.details.extend(other.details);
        self
    }
}

/// Judges a finished history for consistency violations specific to one
/// workload (spec §4.6). Implementations are pure functions of the history.
pub trait Checker: Send + Sync {
    fn check(&self, history: &History) -> CheckResult;
}
