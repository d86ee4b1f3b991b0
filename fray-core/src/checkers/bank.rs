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

//! An illustrative checker (spec §8, scenario S3: "bank transfers") for the
//! classic Jepsen bank workload: `read` returns every account's balance;
//! `transfer` moves an amount between two accounts. Every successfully
//! completed `read` must sum to the bank's starting total, and no account
//! may show a negative balance.

use std::collections::BTreeMap;

use super::{CheckResult, Checker};
use crate::history::History;
use crate::op::OpType;

/// Checks a bank workload's `read` history for conservation-of-balance and
/// non-negativity violations.
pub struct BankChecker {
    pub expected_total: i64,
}

impl BankChecker {
    pub fn new(expected_total: i64) -> BankChecker {
        BankChecker { expected_total }
    }

    fn balances(value: &serde_json::Value) -> Option<BTreeMap<String, i64>> {
        let obj = value.as_object()?;
        let mut balances = BTreeMap::new();
        for (account, balance) in obj {
            balances.insert(account.clone(), balance.as_i64()?);
        }
        Some(balances)
    }
}

impl Checker for BankChecker {
    fn check(&self, history: &History) -> CheckResult {
        let mut result = CheckResult::ok();
        let mut reads_seen = 0usize;

        for op in history.as_slice() {
            if op.f.as_ref() != "read" || op.op_type != OpType::Ok {
                continue;
            }
            let Some(balances) = Self::balances(&op.value) else {
                continue;
            };
            reads_seen += 1;

            let total: i64 = balances.values().sum();
            if total != self.expected_total {
                result = result.and(CheckResult::violation(format!(
                    "read at index {} summed to {total}, expected {}",
                    op.index, self.expected_total
                )));
            }

            let negative: Vec<(&String, &i64)> = balances.iter().filter(|(_, &b)| b < 0).collect();
            if !negative.is_empty() {
                result = result.and(CheckResult::violation(format!(
                    "read at index {} has negative balances: {negative:?}",
                    op.index
                )));
            }
        }

        if reads_seen == 0 {
            return CheckResult::violation("no successful reads observed; cannot check conservation");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::{f, Op, Process};
    use serde_json::json;
    use std::time::Duration;

    fn read(h: &mut History, balances: serde_json::Value) {
        let inv = h.record(
            Op::invoke(Process::Client(0), f("read"), serde_json::Value::Null),
            Duration::from_nanos(1),
        );
        h.record(inv.complete(OpType::Ok, balances), Duration::from_nanos(2));
    }

    #[test]
    fn valid_when_every_read_conserves_the_total() {
        let mut h = History::new();
        read(&mut h, json!({"a": 50, "b": 50}));
        read(&mut h, json!({"a": 30, "b": 70}));
        assert!(BankChecker::new(100).check(&h).valid);
    }

    #[test]
    fn invalid_when_a_read_loses_money() {
        let mut h = History::new();
        read(&mut h, json!({"a": 50, "b": 40}));
        let result = BankChecker::new(100).check(&h);
        assert!(!result.valid);
        assert!(result.details.iter().any(|d| d.contains("summed to 90")));
    }

    #[test]
    fn invalid_on_negative_balance() {
        let mut h = History::new();
        read(&mut h, json!({"a": -10, "b": 110}));
        let result = BankChecker::new(100).check(&h);
        assert!(!result.valid);
        assert!(result.details.iter().any(|d| d.contains("negative balances")));
    }
}
