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

//! The per-logical-process capability (spec §4.3). A nemesis is "a client
//! with the same interface" (spec §4.4), so it implements this same trait
//! rather than a parallel one — see `nemesis.rs`.

use async_trait::async_trait;

use crate::error::{ClientError, CrashReason};
use crate::op::Op;
use crate::test_handle::Test;

/// Polymorphic over the capability set spec §4.3 lists. `invoke` is the only
/// required method with no default — everything else is a best-effort hook.
#[async_trait]
pub trait Client: Send + Sync {
    /// Establish a connection to `node`. Called once per incarnation, before
    /// `setup`.
    async fn open(&mut self, _test: &Test, _node: &str) -> Result<(), ClientError> {
        Ok(())
    }

    /// Run at most once per test per process.
    async fn setup(&mut self, _test: &Test) -> Result<(), ClientError> {
        Ok(())
    }

    /// Carry out `op` against the system under test and return its
    /// completion. Must return within the invocation's configured timeout —
    /// the interpreter enforces this externally and synthesizes a timeout
    /// completion if the future doesn't resolve in time (spec §5).
    async fn invoke(&mut self, test: &Test, op: &Op) -> Result<Op, CrashReason>;

    /// Best-effort cleanup; failures are logged, not propagated (spec §7).
    async fn teardown(&mut self, _test: &Test) {}

    /// Release connections.
    async fn close(&mut self, _test: &Test) {}
}

/// Constructs a fresh [`Client`] for a new process incarnation (spec §4.3:
/// "Clients are constructed per logical process... not shared between
/// processes"). Implementations are typically a thin closure capturing the
/// workload's shared configuration.
pub trait ClientFactory: Send + Sync {
    fn create(&self) -> Box<dyn Client>;
}

impl<F> ClientFactory for F
where
    F: Fn() -> Box<dyn Client> + Send + Sync,
{
    fn create(&self) -> Box<dyn Client> {
        self()
    }
}
