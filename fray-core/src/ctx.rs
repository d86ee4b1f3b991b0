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

//! The immutable per-step context snapshot (spec §3, "Context (`Ctx`)").

use std::any::{Any, TypeId};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use crate::op::{Process, ThreadId};

/// A type-erased bag of domain-specific context extensions (spec §3: "domain
/// specific extensions, e.g. pending key → owning thread for independent
/// tests"). Cloning is cheap: every slot is an `Arc`.
#[derive(Debug, Default, Clone)]
pub struct Extensions {
    slots: BTreeMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl Extensions {
    pub fn new() -> Extensions {
        Extensions::default()
    }

    pub fn insert<T: Any + Send + Sync>(&mut self, value: T) {
        self.slots.insert(TypeId::of::<T>(), Arc::new(value));
    }

    pub fn get<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.slots
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
    }
}

/// An immutable snapshot handed to generators on every call (spec §4.1:
/// "given (test, ctx), return ..."). Constructed fresh by the interpreter on
/// every scheduling-loop iteration; never mutated in place.
#[derive(Debug, Clone)]
pub struct Ctx {
    /// Current logical time, offset from test start.
    pub time: Duration,
    /// Threads currently idle (not executing an invocation).
    pub free_threads: BTreeSet<ThreadId>,
    /// Mapping from thread to the process currently (or most recently)
    /// assigned to it.
    pub workers: BTreeMap<ThreadId, Process>,
    /// Total count of client threads, used by combinators like
    /// `clients`/`nemesis` to classify a thread without consulting the
    /// nemesis thread bank directly.
    pub nemesis_threads: BTreeSet<ThreadId>,
    pub extensions: Extensions,
}

impl Ctx {
    pub fn new(
        time: Duration,
        free_threads: BTreeSet<ThreadId>,
        workers: BTreeMap<ThreadId, Process>,
        nemesis_threads: BTreeSet<ThreadId>,
    ) -> Ctx {
        Ctx {
            time,
            free_threads,
            workers,
            nemesis_threads,
            extensions: Extensions::new(),
        }
    }

    pub fn is_nemesis_thread(&self, thread: ThreadId) -> bool {
        self.nemesis_threads.contains(&thread)
    }

    pub fn is_free(&self, thread: ThreadId) -> bool {
        self.free_threads.contains(&thread)
    }

    /// The lowest-indexed free thread's current process, if any is free.
    /// This is the default assignment policy leaf generators use when they
    /// don't care which specific thread picks up their op (spec §4.2:
    /// "otherwise the lowest-indexed free thread").
    pub fn pick_any_free_process(&self) -> Option<Process> {
        self.free_threads
            .iter()
            .next()
            .and_then(|t| self.workers.get(t).copied())
    }

    /// A clone of this context with `free_threads` restricted to the given
    /// subset. Used by `on`/`reserve`/`each_thread`/the independent
    /// generator to scope which threads a sub-generator is allowed to see.
    pub fn restricted_to(&self, threads: BTreeSet<ThreadId>) -> Ctx {
        Ctx {
            time: self.time,
            free_threads: threads,
            workers: self.workers.clone(),
            nemesis_threads: self.nemesis_threads.clone(),
            extensions: self.extensions.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions_round_trip_by_type() {
        let mut ext = Extensions::new();
        ext.insert(42u64);
        ext.insert("hello".to_string());
        assert_eq!(ext.get::<u64>(), Some(&42));
        assert_eq!(ext.get::<String>(), Some(&"hello".to_string()));
        assert_eq!(ext.get::<i32>(), None);
    }
}
