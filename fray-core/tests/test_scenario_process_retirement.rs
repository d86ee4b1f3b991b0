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

//! End-to-end scenario S6: a client that `info`s on every invocation. The
//! thread identifier pinned to it never changes, but each invocation burns
//! a fresh process incarnation (spec §3, "Thread vs. process":
//! `process = thread + k * thread_count`).

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use fray_core::client::{Client, ClientFactory};
use fray_core::config::TestConfig;
use fray_core::ctx::Ctx;
use fray_core::error::CrashReason;
use fray_core::generator::combinators::{limit, on};
use fray_core::generator::{GenBox, Generator, Step};
use fray_core::interpreter::Interpreter;
use fray_core::op::{f, Op, OpType, Process};
use fray_core::test_handle::Test;

const INVOCATIONS: u64 = 6;
const CONCURRENCY: u32 = 2;

struct ReadOnFreeProcess;

impl Generator for ReadOnFreeProcess {
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

/// Always returns an `info` completion, unconditionally retiring whichever
/// process invoked it.
struct AlwaysInfoClient;

#[async_trait]
impl Client for AlwaysInfoClient {
    async fn invoke(&mut self, _test: &Test, op: &Op) -> Result<Op, CrashReason> {
        Ok(op.complete(OpType::Info, Value::Null))
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
async fn every_invocation_burns_a_fresh_process_on_the_same_thread() {
    let test = Test::new(TestConfig {
        nodes: vec!["n1".into()],
        concurrency: CONCURRENCY,
        workload: "retirement".into(),
        time_limit: Duration::from_secs(3),
        drain_grace_period: Duration::from_millis(200),
        ..Default::default()
    });
    let factory: Arc<dyn ClientFactory> = Arc::new(|| Box::new(AlwaysInfoClient) as Box<dyn Client>);
    let interpreter = Interpreter::new(test.clone(), factory, Box::new(NoopNemesis));

    // Pin every invocation to thread 0, so every process it ever holds is of
    // the form `0 + k * CONCURRENCY`.
    let pinned_to_thread_zero = on(
        Arc::new(|_ctx: &Ctx, thread: u32| thread == 0),
        limit(INVOCATIONS, Box::new(ReadOnFreeProcess)),
    );

    let history = interpreter.run(pinned_to_thread_zero).await.unwrap();
    assert!(history.check_invariants().is_ok());

    let invoking_processes: BTreeSet<Process> = history
        .as_slice()
        .iter()
        .filter(|op| op.is_invoke())
        .map(|op| op.process)
        .collect();

    assert_eq!(invoking_processes.len(), INVOCATIONS as usize);
    for process in &invoking_processes {
        match process {
            Process::Client(n) => assert_eq!(n % CONCURRENCY as u64, 0, "thread identifier stayed constant"),
            Process::Nemesis => panic!("this generator never targets the nemesis thread"),
        }
    }

    let info_completions = history
        .as_slice()
        .iter()
        .filter(|op| op.op_type == OpType::Info)
        .count();
    assert_eq!(info_completions, INVOCATIONS as usize);
}
