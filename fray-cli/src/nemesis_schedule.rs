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

//! Builds the nemesis client and its driving generator from `--nemesis`
//! (spec §4.4, §8 scenario S4: "partition nemesis interleaving"). Each named
//! fault gets a sub-nemesis routed into a [`CompositeNemesis`] plus a cycle
//! on the nemesis thread alternating it on and off every `--nemesis-interval`.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use fray_core::client::Client;
use fray_core::config::TestConfig;
use fray_core::ctx::Ctx;
use fray_core::db::Db;
use fray_core::error::{ConfigError, CrashReason};
use fray_core::generator::combinators::{concat, mix, nemesis as on_nemesis_thread, once, sleep};
use fray_core::generator::{nil, GenBox, Generator, Step};
use fray_core::nemesis::{CompositeNemesis, KillNemesis, PartitionNemesis};
use fray_core::op::{f, FKind, Op, OpType, Value};
use fray_core::remote::{LocalShellRemote, Remote};
use fray_core::test_handle::Test;

/// Rebuilds a fresh generator from `factory` every time the previous one is
/// exhausted, turning a one-shot sequence into a standing cycle.
struct Loop {
    factory: Arc<dyn Fn() -> GenBox + Send + Sync>,
    inner: GenBox,
}

impl Generator for Loop {
    fn op(self: Box<Self>, test: &Test, ctx: &Ctx) -> Step {
        let Loop { factory, inner } = *self;
        match inner.op(test, ctx) {
            Step::Emit(op, g2) => Step::Emit(op, Box::new(Loop { factory, inner: g2 })),
            Step::Note(msg, g2) => Step::Note(msg, Box::new(Loop { factory, inner: g2 })),
            Step::Pending(g2) => Step::Pending(Box::new(Loop { factory, inner: g2 })),
            Step::Done => {
                let fresh = factory();
                Box::new(Loop { factory, inner: fresh }).op(test, ctx)
            }
        }
    }

    fn update(self: Box<Self>, test: &Test, ctx: &Ctx, event: &Op) -> GenBox {
        let Loop { factory, inner } = *self;
        Box::new(Loop {
            factory,
            inner: inner.update(test, ctx, event),
        })
    }
}

fn loop_forever(factory: Arc<dyn Fn() -> GenBox + Send + Sync>) -> GenBox {
    let inner = factory();
    Box::new(Loop { factory, inner })
}

struct NoopNemesis;

#[async_trait]
impl Client for NoopNemesis {
    async fn invoke(&mut self, _test: &Test, op: &Op) -> Result<Op, CrashReason> {
        Ok(op.complete(OpType::Ok, Value::Null))
    }
}

/// A `Db` standing in for whatever real node-control the kill nemesis needs;
/// the demo workloads run entirely in-process, so "killing" a node is a
/// no-op that still exercises the nemesis's own state machine and history.
struct NoopDb;

#[async_trait]
impl Db for NoopDb {
    async fn setup(&self, _test: &Test, _node: &str) -> Result<(), String> {
        Ok(())
    }
    async fn teardown(&self, _test: &Test, _node: &str) -> Result<(), String> {
        Ok(())
    }
    async fn kill(&self, _test: &Test, _node: &str) -> Result<(), String> {
        Ok(())
    }
    async fn start(&self, _test: &Test, _node: &str) -> Result<(), String> {
        Ok(())
    }
    async fn stop(&self, _test: &Test, _node: &str) -> Result<(), String> {
        Ok(())
    }
}

pub fn build(config: &TestConfig) -> Result<(Box<dyn Client>, GenBox), ConfigError> {
    if config.nemesis.is_empty() {
        return Ok((Box::new(NoopNemesis) as Box<dyn Client>, nil()));
    }

    let remote: Arc<dyn Remote> = Arc::new(LocalShellRemote);
    let interval = config.nemesis_interval;
    let mut subs: Vec<(HashSet<FKind>, Box<dyn Client>)> = Vec::new();
    let mut cycles: Vec<GenBox> = Vec::new();

    for name in &config.nemesis {
        match name.as_str() {
            "partition" => {
                let tags: HashSet<FKind> = ["start-partition", "stop-partition"].into_iter().map(f).collect();
                subs.push((
                    tags,
                    Box::new(PartitionNemesis::new(config.nodes.clone(), remote.clone())) as Box<dyn Client>,
                ));
                cycles.push(on_nemesis_thread(loop_forever(Arc::new(move || {
                    concat(vec![
                        once(f("start-partition"), Value::Null),
                        sleep(interval),
                        once(f("stop-partition"), Value::Null),
                        sleep(interval),
                    ])
                }))));
            }
            "kill" => {
                let tags: HashSet<FKind> = ["kill", "start", "stop"].into_iter().map(f).collect();
                subs.push((
                    tags,
                    Box::new(KillNemesis::new(config.nodes.clone(), Arc::new(NoopDb))) as Box<dyn Client>,
                ));
                cycles.push(on_nemesis_thread(loop_forever(Arc::new(move || {
                    concat(vec![
                        once(f("kill"), Value::Null),
                        sleep(interval),
                        once(f("start"), Value::Null),
                        sleep(interval),
                    ])
                }))));
            }
            other => return Err(ConfigError::UnknownKey(format!("nemesis {other:?}"))),
        }
    }

    Ok((Box::new(CompositeNemesis::new(subs)) as Box<dyn Client>, mix(cycles)))
}
