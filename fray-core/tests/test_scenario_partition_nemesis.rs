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

//! End-to-end scenario S4: a client workload interleaved with a real
//! `PartitionNemesis` cycling `start-partition`/`stop-partition`, verifying
//! both keep being emitted on their own thread banks throughout the run.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use fray_core::client::{Client, ClientFactory};
use fray_core::config::TestConfig;
use fray_core::ctx::Ctx;
use fray_core::error::CrashReason;
use fray_core::generator::combinators::{clients, concat, mix, nemesis, once, sleep};
use fray_core::generator::{GenBox, Generator, Step};
use fray_core::interpreter::Interpreter;
use fray_core::nemesis::PartitionNemesis;
use fray_core::op::{f, Op, OpType};
use fray_core::remote::LocalShellRemote;
use fray_core::test_handle::Test;

struct ReadForever;

impl Generator for ReadForever {
    fn op(self: Box<Self>, _test: &Test, ctx: &Ctx) -> Step {
        match ctx.pick_any_free_process() {
            Some(process) => Step::Emit(Op::invoke(process, f("read"), Value::Null), self),
            None => Step::Pending(self),
        }
    }

    fn update(self: Box<Self>, _test: &Test, _ctx: &Ctx, _event: &Op) -> GenBox {
        self
    }
}

struct EchoClient;

#[async_trait]
impl Client for EchoClient {
    async fn invoke(&mut self, _test: &Test, op: &Op) -> Result<Op, CrashReason> {
        Ok(op.complete(OpType::Ok, Value::Null))
    }
}

/// Alternates `start-partition`, a short pause, `stop-partition`, forever —
/// the `--nemesis-interval`-style cycle of spec §8, scenario S4.
fn partition_cycle() -> GenBox {
    concat(vec![
        once(f("start-partition"), Value::Null),
        sleep(Duration::from_millis(30)),
        once(f("stop-partition"), Value::Null),
        sleep(Duration::from_millis(30)),
    ])
}

struct Loop {
    factory: Arc<dyn Fn() -> GenBox + Send + Sync>,
    current: GenBox,
}

impl Generator for Loop {
    fn op(mut self: Box<Self>, test: &Test, ctx: &Ctx) -> Step {
        loop {
            match self.current.op(test, ctx) {
                Step::Emit(op, g2) => {
                    self.current = g2;
                    return Step::Emit(op, self);
                }
                Step::Note(msg, g2) => {
                    self.current = g2;
                    return Step::Note(msg, self);
                }
                Step::Pending(g2) => {
                    self.current = g2;
                    return Step::Pending(self);
                }
                Step::Done => {
                    self.current = (self.factory)();
                    continue;
                }
            }
        }
    }

    fn update(mut self: Box<Self>, test: &Test, ctx: &Ctx, event: &Op) -> GenBox {
        self.current = self.current.update(test, ctx, event);
        self
    }
}

#[tokio::test]
async fn partition_ops_interleave_with_client_traffic() {
    let nodes = vec!["n1".to_string(), "n2".to_string()];
    let test = Test::new(TestConfig {
        nodes: nodes.clone(),
        concurrency: 2,
        workload: "register".into(),
        nemesis: vec!["partition".into()],
        time_limit: Duration::from_millis(250),
        drain_grace_period: Duration::from_millis(200),
        ..Default::default()
    });

    let factory: Arc<dyn ClientFactory> = Arc::new(|| Box::new(EchoClient) as Box<dyn Client>);
    let nemesis_client = Box::new(PartitionNemesis::new(nodes, Arc::new(LocalShellRemote)));
    let interpreter = Interpreter::new(test.clone(), factory, nemesis_client);

    let client_gen = clients(Box::new(ReadForever));
    let nemesis_gen = nemesis(Box::new(Loop {
        factory: Arc::new(partition_cycle),
        current: partition_cycle(),
    }));

    let history = interpreter.run(mix(vec![client_gen, nemesis_gen])).await.unwrap();
    assert!(history.check_invariants().is_ok());

    let reads = history.as_slice().iter().filter(|op| op.f.as_ref() == "read").count();
    assert!(reads > 0, "client traffic kept flowing alongside the nemesis");

    let starts = history
        .as_slice()
        .iter()
        .filter(|op| op.f.as_ref() == "start-partition" && op.op_type == OpType::Ok)
        .count();
    assert!(starts > 0, "nemesis injected at least one partition");

    for op in history.as_slice() {
        if op.f.as_ref() == "read" {
            assert!(!op.process.is_nemesis());
        }
        if op.f.as_ref() == "start-partition" || op.f.as_ref() == "stop-partition" {
            assert!(op.process.is_nemesis());
        }
    }
}
