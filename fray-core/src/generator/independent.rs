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

//! Lifts a single-key workload into a many-keys concurrent one (spec §4.1,
//! "Independent / concurrent generator"). Not to be confused with the
//! checker-side independent wrapper (spec §4.6), which demultiplexes the
//! resulting history after the fact — this module only shapes the op
//! stream; [`crate::history::History::split_by_key`] does the demux.

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::Arc;

use super::{GenBox, Generator, Step};
use crate::ctx::Ctx;
use crate::op::{Op, Process, ThreadId};
use crate::test_handle::Test;

type PerKeyGen = Arc<dyn Fn(&str) -> GenBox + Send + Sync>;

struct Group {
    threads: BTreeSet<ThreadId>,
    current_key: Option<String>,
    gen: Option<GenBox>,
    /// Processes this group is still waiting on before it may advance to the
    /// next key — mirrors `phases`' inter-phase barrier (spec §4.1), scoped
    /// to this group's threads rather than the whole pool.
    outstanding: HashSet<Process>,
}

fn build_groups(ctx: &Ctx, threads_per_key: u32) -> Vec<Group> {
    let mut threads: Vec<ThreadId> = ctx
        .workers
        .keys()
        .copied()
        .filter(|t| !ctx.is_nemesis_thread(*t))
        .collect();
    threads.sort_unstable();
    threads
        .chunks(threads_per_key.max(1) as usize)
        .map(|chunk| Group {
            threads: chunk.iter().copied().collect(),
            current_key: None,
            gen: None,
            outstanding: HashSet::new(),
        })
        .collect()
}

struct Independent {
    threads_per_key: u32,
    keys: VecDeque<String>,
    per_key_gen: PerKeyGen,
    groups: Option<Vec<Group>>,
}

impl Generator for Independent {
    fn op(mut self: Box<Self>, test: &Test, ctx: &Ctx) -> Step {
        let mut groups = self
            .groups
            .take()
            .unwrap_or_else(|| build_groups(ctx, self.threads_per_key));

        for g in groups.iter_mut() {
            if g.gen.is_none() && g.current_key.is_none() && g.outstanding.is_empty() {
                if let Some(key) = self.keys.pop_front() {
                    g.gen = Some((self.per_key_gen)(&key));
                    g.current_key = Some(key);
                }
            }
        }

        for g in groups.iter_mut() {
            let Some(inner) = g.gen.take() else { continue };
            let free: BTreeSet<ThreadId> = g.threads.intersection(&ctx.free_threads).copied().collect();
            let sub_ctx = ctx.restricted_to(free);
            match inner.op(test, &sub_ctx) {
                Step::Emit(mut op, g2) => {
                    g.outstanding.insert(op.process);
                    g.gen = Some(g2);
                    let key = g.current_key.clone().expect("a running group always has a key");
                    op.value = serde_json::json!([key, op.value]);
                    self.groups = Some(groups);
                    return Step::Emit(op, self);
                }
                Step::Note(msg, g2) => {
                    g.gen = Some(g2);
                    self.groups = Some(groups);
                    return Step::Note(msg, self);
                }
                Step::Pending(g2) => {
                    g.gen = Some(g2);
                }
                Step::Done => {
                    if g.outstanding.is_empty() {
                        match self.keys.pop_front() {
                            Some(key) => {
                                g.gen = Some((self.per_key_gen)(&key));
                                g.current_key = Some(key);
                            }
                            None => {
                                g.current_key = None;
                                g.gen = None;
                            }
                        }
                    } else {
                        // This group's key is exhausted but its outstanding ops
                        // haven't all completed; hold off on the next key until
                        // `update` drains them.
                        g.current_key = None;
                        g.gen = None;
                    }
                }
            }
        }

        let all_idle = groups.iter().all(|g| g.gen.is_none() && g.outstanding.is_empty());
        self.groups = Some(groups);
        if all_idle && self.keys.is_empty() {
            Step::Done
        } else {
            Step::Pending(self)
        }
    }

    fn update(mut self: Box<Self>, test: &Test, ctx: &Ctx, event: &Op) -> GenBox {
        if let Some(mut groups) = self.groups.take() {
            for g in groups.iter_mut() {
                if event.is_completion() {
                    g.outstanding.remove(&event.process);
                }
                if let Some(inner) = g.gen.take() {
                    g.gen = Some(inner.update(test, ctx, event));
                }
            }
            self.groups = Some(groups);
        }
        self
    }
}

/// Partitions the thread pool into groups of `threads_per_key`, assigning
/// each group a key from `keys` at a time and running `per_key_gen(key)` on
/// it. A group's op values are wrapped as `[key, inner_value]` (spec §4.1).
/// Concurrency must be a multiple of `threads_per_key`; the caller (harness
/// configuration validation) is responsible for rejecting mismatches before
/// construction.
pub fn independent(threads_per_key: u32, keys: Vec<String>, per_key_gen: PerKeyGen) -> GenBox {
    Box::new(Independent {
        threads_per_key,
        keys: keys.into(),
        per_key_gen,
        groups: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TestConfig;
    use crate::generator::combinators::{once, OpTemplate};
    use crate::op::{f, Value};
    use crate::testutil::ctx_with_free_clients;

    fn test() -> Test {
        Test::new(TestConfig::default())
    }

    fn one_shot_gen(key: &str) -> GenBox {
        once(f("op"), Value::from(key.to_string()))
    }

    #[test]
    fn wraps_value_as_key_and_inner_value() {
        let t = test();
        let ctx = ctx_with_free_clients(2);
        let keys = vec!["a".to_string(), "b".to_string()];
        let g = independent(2, keys, Arc::new(one_shot_gen));
        match g.op(&t, &ctx) {
            Step::Emit(op, _) => {
                let arr = op.value.as_array().expect("wrapped value is an array");
                assert_eq!(arr[0], serde_json::json!("a"));
            }
            _ => panic!("expected Emit"),
        }
    }

    #[test]
    fn exhausts_once_all_keys_and_groups_drain() {
        let t = test();
        let ctx = ctx_with_free_clients(1);
        let g = independent(1, vec!["only".to_string()], Arc::new(one_shot_gen));
        let (op, g) = match g.op(&t, &ctx) {
            Step::Emit(op, g2) => (op, g2),
            _ => panic!("expected Emit"),
        };
        let completion = op.complete(crate::op::OpType::Ok, Value::Null);
        let g = g.update(&t, &ctx, &completion);
        match g.op(&t, &ctx) {
            Step::Done => {}
            _ => panic!("expected Done once the single key's group drains"),
        }
        let _ = OpTemplate::new(f("unused"), Value::Null);
    }
}
