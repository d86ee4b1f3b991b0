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

//! `--workload set` (spec §8, scenario S5): every client thread continuously
//! `add`s a fresh element; once the configured number of adds has settled,
//! a single final `read` reports the whole set. [`fray_core::checkers::set::SetChecker`]
//! flags any acknowledged add missing from that read, or any element present
//! that was never attempted.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use fray_core::checkers::set::SetChecker;
use fray_core::client::{Client, ClientFactory};
use fray_core::config::TestConfig;
use fray_core::ctx::Ctx;
use fray_core::error::CrashReason;
use fray_core::generator::combinators::{clients, each_thread, limit, once, phases};
use fray_core::generator::{GenBox, Generator, Step};
use fray_core::op::{f, Op, OpType, Value};
use fray_core::test_handle::Test;
use serde_json::json;
use tokio::sync::Mutex;

use super::{DemoDb, Workload};

type SetState = Arc<Mutex<BTreeSet<u64>>>;

struct SetClient {
    state: SetState,
}

#[async_trait]
impl Client for SetClient {
    async fn invoke(&mut self, _test: &Test, op: &Op) -> Result<Op, CrashReason> {
        match op.f.as_ref() {
            "add" => {
                let value = op
                    .value
                    .as_u64()
                    .ok_or_else(|| CrashReason::Crashed("add requires a u64 value".into()))?;
                self.state.lock().await.insert(value);
                Ok(op.complete(OpType::Ok, op.value.clone()))
            }
            "read" => {
                let items: Vec<u64> = self.state.lock().await.iter().copied().collect();
                Ok(op.complete(OpType::Ok, json!(items)))
            }
            other => Err(CrashReason::Crashed(format!("set workload cannot handle op {other:?}"))),
        }
    }
}

/// Emits `add(n)` for an ever-increasing, globally-unique `n` on whichever
/// process is free. Shares `counter` across every thread's copy so no two
/// threads ever attempt the same element.
struct AddForever {
    counter: Arc<AtomicU64>,
}

impl Generator for AddForever {
    fn op(self: Box<Self>, _test: &Test, ctx: &Ctx) -> Step {
        match ctx.pick_any_free_process() {
            Some(process) => {
                let value = self.counter.fetch_add(1, Ordering::SeqCst);
                Step::Emit(Op::invoke(process, f("add"), json!(value)), self)
            }
            None => Step::Pending(self),
        }
    }

    fn update(self: Box<Self>, _test: &Test, _ctx: &Ctx, _event: &Op) -> GenBox {
        self
    }
}

pub fn build(config: &TestConfig) -> Workload {
    let state: SetState = Arc::new(Mutex::new(BTreeSet::new()));
    let factory_state = state.clone();
    let client_factory: Arc<dyn ClientFactory> =
        Arc::new(move || Box::new(SetClient { state: factory_state.clone() }) as Box<dyn Client>);

    let total_adds = u64::from(config.ops_per_key.unwrap_or(200));
    let counter = Arc::new(AtomicU64::new(0));
    let per_thread: GenBox = each_thread(Arc::new(move || {
        Box::new(AddForever { counter: counter.clone() }) as GenBox
    }));

    let generator = phases(vec![
        clients(limit(total_adds, per_thread)),
        clients(once(f("read"), Value::Null)),
    ]);

    Workload {
        generator,
        client_factory,
        db: Arc::new(DemoDb),
        checker: Box::new(SetChecker),
    }
}
