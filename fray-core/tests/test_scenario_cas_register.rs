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

//! End-to-end scenario S1: a single in-process atomic register under a
//! uniformly mixed read/write/cas workload, no nemesis. There is no
//! linearizability checker in this crate (spec §1, out of scope), so this
//! exercises the generator/interpreter/client pipeline and the structural
//! history invariants rather than a correctness verdict.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde_json::{json, Value};
use tokio::sync::Mutex as AsyncMutex;

use fray_core::client::{Client, ClientFactory};
use fray_core::config::TestConfig;
use fray_core::ctx::Ctx;
use fray_core::error::CrashReason;
use fray_core::generator::combinators::clients;
use fray_core::generator::{GenBox, Generator, Step};
use fray_core::interpreter::Interpreter;
use fray_core::op::{f, Op, OpType};
use fray_core::test_handle::Test;

const DOMAIN: i64 = 5;

/// Forever emits a uniformly chosen `read`/`write`/`cas` to whichever
/// process is free, with values drawn from `0..DOMAIN`.
struct MixedRegisterOps;

impl Generator for MixedRegisterOps {
    fn op(self: Box<Self>, test: &Test, ctx: &Ctx) -> Step {
        let Some(process) = ctx.pick_any_free_process() else {
            return Step::Pending(self);
        };
        let choice = test.with_rng(|r| r.gen_range(0..3));
        let op = match choice {
            0 => Op::invoke(process, f("read"), Value::Null),
            1 => {
                let v = test.with_rng(|r| r.gen_range(0..DOMAIN));
                Op::invoke(process, f("write"), json!(v))
            }
            _ => {
                let old = test.with_rng(|r| r.gen_range(0..DOMAIN));
                let new = test.with_rng(|r| r.gen_range(0..DOMAIN));
                Op::invoke(process, f("cas"), json!([old, new]))
            }
        };
        Step::Emit(op, self)
    }

    fn update(self: Box<Self>, _test: &Test, _ctx: &Ctx, _event: &Op) -> GenBox {
        self
    }
}

struct RegisterClient {
    state: Arc<AsyncMutex<i64>>,
}

#[async_trait]
impl Client for RegisterClient {
    async fn invoke(&mut self, _test: &Test, op: &Op) -> Result<Op, CrashReason> {
        let mut state = self.state.lock().await;
        let completion = match op.f.as_ref() {
            "read" => op.complete(OpType::Ok, json!(*state)),
            "write" => {
                let v = op.value.as_i64().expect("write carries an integer value");
                *state = v;
                op.complete(OpType::Ok, json!(v))
            }
            "cas" => {
                let pair = op.value.as_array().expect("cas carries [old, new]");
                let old = pair[0].as_i64().unwrap();
                let new = pair[1].as_i64().unwrap();
                if *state == old {
                    *state = new;
                    op.complete(OpType::Ok, json!(new))
                } else {
                    op.complete(OpType::Fail, json!({"expected": old, "actual": *state}))
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

fn config() -> TestConfig {
    TestConfig {
        nodes: vec!["n1".into()],
        concurrency: 3,
        workload: "register".into(),
        time_limit: Duration::from_millis(300),
        drain_grace_period: Duration::from_millis(200),
        ..Default::default()
    }
}

#[tokio::test]
async fn mixed_read_write_cas_produces_a_well_formed_history() {
    let test = Test::new(config());
    let state = Arc::new(AsyncMutex::new(0i64));
    let factory: Arc<dyn ClientFactory> = {
        let state = state.clone();
        Arc::new(move || Box::new(RegisterClient { state: state.clone() }) as Box<dyn Client>)
    };
    let interpreter = Interpreter::new(test.clone(), factory, Box::new(NoopNemesis));

    let gen: GenBox = clients(Box::new(MixedRegisterOps));
    let history = interpreter.run(gen).await.unwrap();

    assert!(history.check_invariants().is_ok());
    assert!(history.len() > 0, "a 300ms run with free threads should emit some ops");

    // Not guaranteed every kind fires in a short run, but whichever did must
    // be one of the three the workload ever emits.
    let fs: BTreeSet<&str> = history.as_slice().iter().map(|op| op.f.as_ref()).collect();
    for kind in &fs {
        assert!(["read", "write", "cas"].contains(kind), "unexpected op kind {kind:?}");
    }

    for op in history.as_slice() {
        assert!(!op.process.is_nemesis(), "register workload never touches the nemesis process");
    }
}

#[tokio::test]
async fn empty_generator_against_a_single_thread_completes_with_an_empty_history() {
    use fray_core::generator::nil;

    let mut cfg = config();
    cfg.concurrency = 1;
    cfg.time_limit = Duration::from_millis(50);
    cfg.drain_grace_period = Duration::from_millis(50);
    let test = Test::new(cfg);
    let state = Arc::new(AsyncMutex::new(0i64));
    let factory: Arc<dyn ClientFactory> = {
        let state = state.clone();
        Arc::new(move || Box::new(RegisterClient { state: state.clone() }) as Box<dyn Client>)
    };
    let interpreter = Interpreter::new(test.clone(), factory, Box::new(NoopNemesis));

    let history = interpreter.run(nil()).await.unwrap();
    assert!(history.is_empty());
}
