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

//! Small fixtures shared across unit tests.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use crate::ctx::Ctx;
use crate::op::Process;

pub fn empty_ctx() -> Ctx {
    Ctx::new(Duration::ZERO, BTreeSet::new(), BTreeMap::new(), BTreeSet::new())
}

/// A context with `count` client threads, all free, all on their first
/// incarnation (`process = thread`).
pub fn ctx_with_free_clients(count: u32) -> Ctx {
    ctx_at(Duration::ZERO, count, &(0..count).collect::<Vec<_>>())
}

pub fn ctx_at(time: Duration, thread_count: u32, free: &[u32]) -> Ctx {
    let workers: BTreeMap<u32, Process> =
        (0..thread_count).map(|t| (t, Process::Client(t as u64))).collect();
    let free_threads: BTreeSet<u32> = free.iter().copied().collect();
    Ctx::new(time, free_threads, workers, BTreeSet::new())
}
