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

//! End-to-end scenario S3: concurrent bank transfers plus reads, checked
//! for conservation of the total balance by [`fray_core::checkers::bank::BankChecker`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde_json::{json, Value};
use tokio::sync::Mutex as AsyncMutex;

use fray_core::checkers::bank::BankChecker;
use fray_core::checkers::Checker;
use fray_core::client::{Client, ClientFactory};
use fray_core::config::TestConfig;
use fray_core::ctx::Ctx;
use fray_core::error::CrashReason;
use fray_core::generator::combinators::clients;
use fray_core::generator::{GenBox, Generator, Step};
use fray_core::interpreter::Interpreter;
use fray_core::op::{f, Op, OpType};
use fray_core::test_handle::Test;

const ACCOUNTS: usize = 5;
const STARTING_BALANCE: i64 = 10;

fn initial_balances() -> BTreeMap<String, i64> {
    (0..ACCOUNTS).map(|i| (format!("a{i}"), STARTING_BALANCE)).collect()
}

/// Forever picks `transfer` or `read` uniformly, addressed to whichever
/// process is free.
struct BankOps;

impl Generator for BankOps {
    fn op(self: Box<Self>, test: &Test, ctx: &Ctx) -> Step {
        let Some(process) = ctx.pick_any_free_process() else {
            return Step::Pending(self);
        };
        let is_read = test.with_rng(|r| r.gen_bool(0.25));
        let op = if is_read {
            Op::invoke(process, f("read"), Value::Null)
        } else {
            let (from, to) = test.with_rng(|r| {
                let from = r.gen_range(0..ACCOUNTS);
                let mut to = r.gen_range(0..ACCOUNTS);
                while to == from {
                    to = r.gen_range(0..ACCOUNTS);
                }
                (from, to)
            });
            let amount = test.with_rng(|r| r.gen_range(1..=5));
            Op::invoke(
                process,
                f("transfer"),
                json!({"from": format!("a{from}"), "to": format!("a{to}"), "amount": amount}),
            )
        };
        Step::Emit(op, self)
    }

    fn update(self: Box<Self>, _test: &Test, _ctx: &Ctx, _event: &Op) -> GenBox {
        self
    }
}

struct BankClient {
    balances: Arc<AsyncMutex<BTreeMap<String, i64>>>,
}

#[async_trait]
impl Client for BankClient {
    async fn invoke(&mut self, _test: &Test, op: &Op) -> Result<Op, CrashReason> {
        let mut balances = self.balances.lock().await;
        let completion = match op.f.as_ref() {
            "read" => op.complete(OpType::Ok, serde_json::to_value(&*balances).unwrap()),
            "transfer" => {
                let from = op.value["from"].as_str().unwrap().to_string();
                let to = op.value["to"].as_str().unwrap().to_string();
                let amount = op.value["amount"].as_i64().unwrap();
                let available = *balances.get(&from).unwrap_or(&0);
                if available < amount {
                    op.complete(OpType::Fail, json!({"reason": "insufficient-funds", "available": available}))
                } else {
                    *balances.get_mut(&from).unwrap() -= amount;
                    *balances.get_mut(&to).unwrap() += amount;
                    op.complete(OpType::Ok, Value::Null)
                }
            }
            other => return Err(CrashReason::Crashed(format!("unknown op {other:?}"))),
        };
        Ok(completion)
    }
}

struct NoopNemesis;
#[async_trait]
impl Client for NoopNemesis {
    async fn invoke(&mut self, _test: &Test, op: &Op) -> Result<Op, CrashReason> {
        Ok(op.complete(OpType::Ok, Value::Null))
    }
}

#[tokio::test]
async fn concurrent_transfers_always_conserve_the_total() {
    let test = Test::new(TestConfig {
        nodes: vec!["n1".into()],
        concurrency: 8,
        workload: "bank".into(),
        time_limit: Duration::from_millis(400),
        drain_grace_period: Duration::from_millis(200),
        ..Default::default()
    });
    let balances = Arc::new(AsyncMutex::new(initial_balances()));
    let factory: Arc<dyn ClientFactory> = {
        let balances = balances.clone();
        Arc::new(move || Box::new(BankClient { balances: balances.clone() }) as Box<dyn Client>)
    };
    let interpreter = Interpreter::new(test.clone(), factory, Box::new(NoopNemesis));

    let gen: GenBox = clients(Box::new(BankOps));
    let history = interpreter.run(gen).await.unwrap();

    assert!(history.check_invariants().is_ok());

    let checker = BankChecker::new(STARTING_BALANCE * ACCOUNTS as i64);
    let result = checker.check(&history);
    assert!(result.valid, "conservation violated: {:?}", result.details);

    // A transfer that would overdraw an account fails rather than crashing
    // the client or corrupting state (spec §7: definite-failure policy).
    for op in history.as_slice() {
        if op.f.as_ref() == "transfer" && op.op_type == OpType::Fail {
            assert_eq!(op.value["reason"], json!("insufficient-funds"));
        }
    }
}
