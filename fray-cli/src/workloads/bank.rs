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

//! `--workload bank` (spec §8, scenario S3): five accounts start with an
//! equal balance; every client thread continuously `transfer`s a random
//! amount between two random accounts (failing, not crashing, on
//! insufficient funds), then a final `read` reports every balance.
//! [`fray_core::checkers::bank::BankChecker`] checks conservation of the
//! total and non-negativity.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use fray_core::checkers::bank::BankChecker;
use fray_core::client::{Client, ClientFactory};
use fray_core::config::TestConfig;
use fray_core::ctx::Ctx;
use fray_core::error::CrashReason;
use fray_core::generator::combinators::{clients, each_thread, limit, once, phases};
use fray_core::generator::{GenBox, Generator, Step};
use fray_core::op::{f, Op, OpType, Value};
use fray_core::test_handle::Test;
use rand::Rng;
use serde_json::json;
use tokio::sync::Mutex;

use super::{DemoDb, Workload};

const ACCOUNT_COUNT: u32 = 5;
const INITIAL_BALANCE: i64 = 100;

type BankState = Arc<Mutex<BTreeMap<String, i64>>>;

struct BankClient {
    state: BankState,
}

#[async_trait]
impl Client for BankClient {
    async fn invoke(&mut self, _test: &Test, op: &Op) -> Result<Op, CrashReason> {
        match op.f.as_ref() {
            "transfer" => {
                let from = op.value["from"]
                    .as_str()
                    .ok_or_else(|| CrashReason::Crashed("transfer requires \"from\"".into()))?
                    .to_string();
                let to = op.value["to"]
                    .as_str()
                    .ok_or_else(|| CrashReason::Crashed("transfer requires \"to\"".into()))?
                    .to_string();
                let amount = op.value["amount"]
                    .as_i64()
                    .ok_or_else(|| CrashReason::Crashed("transfer requires \"amount\"".into()))?;

                let mut balances = self.state.lock().await;
                let available = *balances.get(&from).unwrap_or(&0);
                if available < amount {
                    return Ok(op.complete(
                        OpType::Fail,
                        json!({"reason": "insufficient funds", "available": available}),
                    ));
                }
                *balances.entry(from).or_insert(0) -= amount;
                *balances.entry(to).or_insert(0) += amount;
                Ok(op.complete(OpType::Ok, Value::Null))
            }
            "read" => {
                let balances = self.state.lock().await.clone();
                let as_json: serde_json::Map<String, Value> =
                    balances.into_iter().map(|(k, v)| (k, json!(v))).collect();
                Ok(op.complete(OpType::Ok, Value::Object(as_json)))
            }
            other => Err(CrashReason::Crashed(format!("bank workload cannot handle op {other:?}"))),
        }
    }
}

/// Emits `transfer {from, to, amount}` between two distinct accounts chosen
/// uniformly at random, forever.
struct TransferForever {
    accounts: Vec<String>,
}

impl Generator for TransferForever {
    fn op(self: Box<Self>, test: &Test, ctx: &Ctx) -> Step {
        match ctx.pick_any_free_process() {
            Some(process) => {
                let accounts = self.accounts.clone();
                let (from, to, amount) = test.with_rng(|rng| {
                    let from_idx = rng.gen_range(0..accounts.len());
                    let mut to_idx = rng.gen_range(0..accounts.len());
                    while to_idx == from_idx && accounts.len() > 1 {
                        to_idx = rng.gen_range(0..accounts.len());
                    }
                    let amount: i64 = rng.gen_range(1..=10);
                    (accounts[from_idx].clone(), accounts[to_idx].clone(), amount)
                });
                let value = json!({"from": from, "to": to, "amount": amount});
                Step::Emit(Op::invoke(process, f("transfer"), value), self)
            }
            None => Step::Pending(self),
        }
    }

    fn update(self: Box<Self>, _test: &Test, _ctx: &Ctx, _event: &Op) -> GenBox {
        self
    }
}

pub fn build(config: &TestConfig) -> Workload {
    let accounts: Vec<String> = (0..ACCOUNT_COUNT).map(|i| format!("a{i}")).collect();
    let total = INITIAL_BALANCE * i64::from(ACCOUNT_COUNT);
    let initial: BTreeMap<String, i64> = accounts.iter().map(|a| (a.clone(), INITIAL_BALANCE)).collect();
    let state: BankState = Arc::new(Mutex::new(initial));

    let factory_state = state.clone();
    let client_factory: Arc<dyn ClientFactory> =
        Arc::new(move || Box::new(BankClient { state: factory_state.clone() }) as Box<dyn Client>);

    let total_transfers = u64::from(config.ops_per_key.unwrap_or(200));
    let per_thread: GenBox = each_thread(Arc::new(move || {
        Box::new(TransferForever { accounts: accounts.clone() }) as GenBox
    }));

    let generator = phases(vec![
        clients(limit(total_transfers, per_thread)),
        clients(once(f("read"), Value::Null)),
    ]);

    Workload {
        generator,
        client_factory,
        db: Arc::new(DemoDb),
        checker: Box::new(BankChecker::new(total)),
    }
}
