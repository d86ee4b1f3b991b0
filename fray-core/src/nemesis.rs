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

//! Fault injection (spec §4.4). A nemesis is "a client with the same
//! interface" attached to reserved threads, so every state machine here
//! implements [`crate::client::Client`] rather than a separate trait.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::client::Client;
use crate::db::Db;
use crate::error::{ClientError, CrashReason};
use crate::op::{FKind, Op, OpType};
use crate::remote::Remote;
use crate::test_handle::Test;

fn targets(value: &Value, all: &[String]) -> Vec<String> {
    match value {
        Value::Null => all.to_vec(),
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

// ---------------------------------------------------------------------
// Partition nemesis
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PartitionState {
    Healed,
    Partitioned,
}

/// A "grudge": which peers each node must not be able to reach (spec
/// GLOSSARY, "Grudge").
pub type Grudge = HashMap<String, HashSet<String>>;

/// The partition nemesis state machine of spec §4.4. `start-partition`
/// computes a random bisection of `nodes` and applies it via `remote`;
/// `stop-partition` restores full connectivity.
pub struct PartitionNemesis {
    nodes: Vec<String>,
    remote: Arc<dyn Remote>,
    state: PartitionState,
    grudge: Grudge,
}

impl PartitionNemesis {
    pub fn new(nodes: Vec<String>, remote: Arc<dyn Remote>) -> PartitionNemesis {
        PartitionNemesis {
            nodes,
            remote,
            state: PartitionState::Healed,
            grudge: Grudge::new(),
        }
    }

    /// Splits `nodes` into two halves and has each half grudge the other —
    /// the classic Jepsen bisection.
    fn random_bisection(&self, test: &Test) -> Grudge {
        let mut shuffled = self.nodes.clone();
        test.with_rng(|rng| {
            use rand::seq::SliceRandom;
            shuffled.shuffle(rng);
        });
        let half = shuffled.len() / 2;
        let (a, b) = shuffled.split_at(half);
        let a_set: HashSet<String> = a.iter().cloned().collect();
        let b_set: HashSet<String> = b.iter().cloned().collect();
        let mut grudge = Grudge::new();
        for node in a {
            grudge.insert(node.clone(), b_set.clone());
        }
        for node in b {
            grudge.insert(node.clone(), a_set.clone());
        }
        grudge
    }

    async fn apply_grudge(&self, grudge: &Grudge) -> Result<(), String> {
        for (node, cut_off) in grudge {
            for peer in cut_off {
                let cmd = format!("# drop traffic from {node} to {peer}");
                self.remote
                    .exec(node, &cmd)
                    .await
                    .map_err(|e| format!("{node}: {e}"))?;
            }
        }
        Ok(())
    }

    async fn heal(&self) -> Result<(), String> {
        for node in &self.nodes {
            self.remote
                .exec(node, "# restore all traffic")
                .await
                .map_err(|e| format!("{node}: {e}"))?;
        }
        Ok(())
    }
}

#[async_trait]
impl Client for PartitionNemesis {
    async fn invoke(&mut self, test: &Test, op: &Op) -> Result<Op, CrashReason> {
        match op.f.as_ref() {
            "start-partition" => {
                let grudge = self.random_bisection(test);
                self.apply_grudge(&grudge)
                    .await
                    .map_err(CrashReason::Crashed)?;
                self.grudge = grudge.clone();
                self.state = PartitionState::Partitioned;
                let as_json: HashMap<String, Vec<String>> = grudge
                    .into_iter()
                    .map(|(k, v)| (k, v.into_iter().collect()))
                    .collect();
                Ok(op.complete(OpType::Ok, json!(as_json)))
            }
            "stop-partition" => {
                self.heal().await.map_err(CrashReason::Crashed)?;
                self.grudge.clear();
                self.state = PartitionState::Healed;
                Ok(op.complete(OpType::Ok, Value::Null))
            }
            other => Err(CrashReason::Crashed(format!(
                "partition nemesis cannot handle op {other:?}"
            ))),
        }
    }

    async fn teardown(&mut self, _test: &Test) {
        // Always heal on teardown regardless of current state (spec §4.4).
        if self.heal().await.is_err() {
            tracing::warn!("partition nemesis failed to heal network during teardown");
        }
        self.state = PartitionState::Healed;
        self.grudge.clear();
    }
}

// ---------------------------------------------------------------------
// Kill/restart nemesis
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeState {
    Running,
    Stopped,
    Killed,
}

/// Per-node `running`/`stopped`/`killed` state machine of spec §4.4.
pub struct KillNemesis {
    nodes: Vec<String>,
    db: Arc<dyn Db>,
    states: BTreeMap<String, NodeState>,
}

impl KillNemesis {
    pub fn new(nodes: Vec<String>, db: Arc<dyn Db>) -> KillNemesis {
        let states = nodes.iter().map(|n| (n.clone(), NodeState::Running)).collect();
        KillNemesis { nodes, db, states }
    }

    async fn apply<F, Fut>(&mut self, value: &Value, next: NodeState, action: F) -> Result<Vec<String>, String>
    where
        F: Fn(String) -> Fut,
        Fut: std::future::Future<Output = Result<(), String>>,
    {
        let nodes = targets(value, &self.nodes);
        let mut failed = Vec::new();
        for node in &nodes {
            match action(node.clone()).await {
                Ok(()) => {
                    self.states.insert(node.clone(), next);
                }
                Err(e) => failed.push(format!("{node}: {e}")),
            }
        }
        if failed.is_empty() {
            Ok(nodes)
        } else {
            Err(failed.join(", "))
        }
    }
}

#[async_trait]
impl Client for KillNemesis {
    async fn invoke(&mut self, test: &Test, op: &Op) -> Result<Op, CrashReason> {
        let _ = test;
        let result = match op.f.as_ref() {
            "stop" => {
                let db = self.db.clone();
                self.apply(&op.value, NodeState::Stopped, |node| {
                    let db = db.clone();
                    async move { db.stop(test, &node).await }
                })
                .await
            }
            "kill" => {
                let db = self.db.clone();
                self.apply(&op.value, NodeState::Killed, |node| {
                    let db = db.clone();
                    async move { db.kill(test, &node).await }
                })
                .await
            }
            "start" => {
                let db = self.db.clone();
                self.apply(&op.value, NodeState::Running, |node| {
                    let db = db.clone();
                    async move { db.start(test, &node).await }
                })
                .await
            }
            other => {
                return Err(CrashReason::Crashed(format!(
                    "kill nemesis cannot handle op {other:?}"
                )))
            }
        };
        result
            .map(|nodes| op.complete(OpType::Ok, json!(nodes)))
            .map_err(CrashReason::Crashed)
    }

    async fn teardown(&mut self, test: &Test) {
        for node in self.nodes.clone() {
            if self.states.get(&node) != Some(&NodeState::Running) && self.db.start(test, &node).await.is_ok() {
                self.states.insert(node, NodeState::Running);
            }
        }
    }
}

// ---------------------------------------------------------------------
// Topology nemesis
// ---------------------------------------------------------------------

/// The assignment of nodes to roles and log partitions (spec GLOSSARY,
/// "Topology"). Mutated only by [`TopologyNemesis`]; this value is
/// authoritative, not advisory, resolving the open question in spec §9
/// ("the authoritative-vs-advisory status of the local topology value is
/// unclear and should be decided up front") — see DESIGN.md.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct Topology {
    pub active_nodes: BTreeSet<String>,
    pub roles: HashMap<String, String>,
    pub log_partitions: HashMap<String, u32>,
}

pub struct TopologyNemesis {
    topology: Arc<Mutex<Topology>>,
    remote: Arc<dyn Remote>,
}

impl TopologyNemesis {
    pub fn new(initial: Topology, remote: Arc<dyn Remote>) -> TopologyNemesis {
        TopologyNemesis {
            topology: Arc::new(Mutex::new(initial)),
            remote,
        }
    }

    /// A handle readers (e.g. other nemeses, or a checker) can use to observe
    /// the current topology without racing the nemesis's own updates.
    pub fn handle(&self) -> Arc<Mutex<Topology>> {
        self.topology.clone()
    }
}

#[async_trait]
impl Client for TopologyNemesis {
    async fn invoke(&mut self, test: &Test, op: &Op) -> Result<Op, CrashReason> {
        let _ = test;
        let mut guard = self.topology.lock().await;
        let mut next = guard.clone();
        match op.f.as_ref() {
            "add-node" => {
                let node = op
                    .value
                    .as_str()
                    .ok_or_else(|| CrashReason::Crashed("add-node requires a node name".into()))?
                    .to_string();
                next.active_nodes.insert(node.clone());
                next.roles.entry(node.clone()).or_insert_with(|| "replica".to_string());
                self.remote
                    .exec(&node, "# join cluster")
                    .await
                    .map_err(|e| CrashReason::Crashed(e.to_string()))?;
            }
            "remove-node" => {
                let node = op
                    .value
                    .as_str()
                    .ok_or_else(|| CrashReason::Crashed("remove-node requires a node name".into()))?
                    .to_string();
                next.active_nodes.remove(&node);
                next.roles.remove(&node);
                self.remote
                    .exec(&node, "# leave cluster")
                    .await
                    .map_err(|e| CrashReason::Crashed(e.to_string()))?;
            }
            "remove-log-node" => {
                let node = op
                    .value
                    .as_str()
                    .ok_or_else(|| CrashReason::Crashed("remove-log-node requires a node name".into()))?
                    .to_string();
                next.log_partitions.remove(&node);
            }
            other => {
                return Err(CrashReason::Crashed(format!(
                    "topology nemesis cannot handle op {other:?}"
                )))
            }
        }
        *guard = next.clone();
        Ok(op.complete(OpType::Ok, serde_json::to_value(&next).unwrap_or(Value::Null)))
    }
}

// ---------------------------------------------------------------------
// Composite nemesis
// ---------------------------------------------------------------------

/// Tag-dispatched composition (spec §4.4): routes each incoming op's `f` to
/// the sub-nemesis whose tag set claims it. An `f` no sub-nemesis claims is
/// a fatal error (lifted via [`CrashReason::Fatal`]), not a recoverable
/// nemesis failure.
pub struct CompositeNemesis {
    subs: Vec<(HashSet<FKind>, Box<dyn Client>)>,
}

impl CompositeNemesis {
    pub fn new(subs: Vec<(HashSet<FKind>, Box<dyn Client>)>) -> CompositeNemesis {
        CompositeNemesis { subs }
    }

    fn find_mut(&mut self, f: &FKind) -> Option<&mut Box<dyn Client>> {
        self.subs
            .iter_mut()
            .find(|(tags, _)| tags.contains(f))
            .map(|(_, client)| client)
    }
}

#[async_trait]
impl Client for CompositeNemesis {
    async fn open(&mut self, test: &Test, node: &str) -> Result<(), ClientError> {
        for (_, sub) in &mut self.subs {
            sub.open(test, node).await?;
        }
        Ok(())
    }

    async fn setup(&mut self, test: &Test) -> Result<(), ClientError> {
        for (_, sub) in &mut self.subs {
            sub.setup(test).await?;
        }
        Ok(())
    }

    async fn invoke(&mut self, test: &Test, op: &Op) -> Result<Op, CrashReason> {
        match self.find_mut(&op.f) {
            Some(sub) => sub.invoke(test, op).await,
            None => Err(CrashReason::Fatal(format!(
                "no nemesis registered for op {:?}",
                op.f
            ))),
        }
    }

    async fn teardown(&mut self, test: &Test) {
        for (_, sub) in &mut self.subs {
            sub.teardown(test).await;
        }
    }

    async fn close(&mut self, test: &Test) {
        for (_, sub) in &mut self.subs {
            sub.close(test).await;
        }
    }
}
