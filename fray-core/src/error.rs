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

//! Error taxonomy (spec §7). Each subsystem gets its own `thiserror` enum;
//! fatal ones additionally derive [`miette::Diagnostic`] so `fray-cli` can
//! render a full stacktrace-equivalent report (spec §7, "User-visible
//! output always includes the full stacktrace for fatal errors").

use crate::op::ThreadId;

/// Configuration errors (spec §7: "bad concurrency, missing workload,
/// unreachable node"). Fatal, exit code 2.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum ConfigError {
    #[error("concurrency {concurrency} is not a multiple of threads-per-key {threads_per_key}")]
    #[diagnostic(code(fray::config::concurrency_not_multiple))]
    ConcurrencyNotMultipleOfGroupSize {
        concurrency: u32,
        threads_per_key: u32,
    },

    #[error("no nodes configured")]
    #[diagnostic(code(fray::config::no_nodes))]
    NoNodes,

    #[error("unknown workload {0:?}")]
    #[diagnostic(code(fray::config::unknown_workload))]
    UnknownWorkload(String),

    #[error("unrecognized configuration key: {0:?}")]
    #[diagnostic(code(fray::config::unknown_key))]
    UnknownKey(String),
}

/// Errors raised by a generator's `op`/`update` implementation. Per spec
/// §4.2/§7 these are always fatal.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum GeneratorError {
    #[error("generator failed: {0}")]
    #[diagnostic(code(fray::generator::failed))]
    Failed(String),

    #[error("independent generator misconfigured: {0}")]
    #[diagnostic(code(fray::generator::independent_misconfigured))]
    IndependentMisconfigured(String),
}

/// A client invocation either completes normally, fails definitely, or
/// crashes indeterminately (spec §4.3, §7). `CrashReason` is lifted to an
/// `info` completion by the interpreter rather than propagated as a panic
/// (spec §9: "Exception-based control flow for invoke failures").
#[derive(Debug, Clone, thiserror::Error)]
pub enum CrashReason {
    #[error("client invoke timed out")]
    Timeout,
    #[error("client invoke crashed: {0}")]
    Crashed(String),
    #[error("connection lost: {0}")]
    ConnectionLost(String),
    /// A composite nemesis was asked to dispatch an `f` no sub-nemesis claims
    /// (spec §4.4: "unknown `f` is a fatal error"). The interpreter lifts
    /// this straight to [`HarnessError::Internal`] instead of an `info`
    /// completion — the one documented exception to "nemesis failures are
    /// local" (spec §7).
    #[error("fatal nemesis dispatch error: {0}")]
    Fatal(String),
}

/// Errors from establishing or tearing down a client connection.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("failed to open client on node {node:?}: {source}")]
    OpenFailed { node: String, source: String },
    #[error("client crash: {0}")]
    Crash(#[from] CrashReason),
}

/// A synchronization barrier failed to rendezvous within its timeout, or one
/// of its participants raised (spec §4.5).
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum BarrierError {
    #[error("barrier timed out waiting for {waiting_on} of {total} participants")]
    #[diagnostic(code(fray::barrier::timeout))]
    Timeout { waiting_on: usize, total: usize },

    #[error("participant on thread {thread} failed: {source}")]
    #[diagnostic(code(fray::barrier::participant_failed))]
    ParticipantFailed {
        thread: ThreadId,
        source: String,
    },
}

/// Top-level error a run can end with; maps 1:1 to the exit codes in spec §6.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum HarnessError {
    #[error(transparent)]
    #[diagnostic(code(fray::config))]
    Config(#[from] ConfigError),

    #[error("setup failed: {0}")]
    #[diagnostic(code(fray::setup))]
    Setup(String),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Barrier(#[from] BarrierError),

    #[error(transparent)]
    #[diagnostic(code(fray::generator))]
    Generator(#[from] GeneratorError),

    #[error("internal fatal error: {0}")]
    #[diagnostic(code(fray::internal))]
    Internal(String),
}

impl HarnessError {
    /// Exit code as specified in spec §6.
    pub fn exit_code(&self) -> i32 {
        match self {
            HarnessError::Config(_) => 2,
            HarnessError::Setup(_) | HarnessError::Barrier(_) => 2,
            HarnessError::Generator(_) | HarnessError::Internal(_) => 3,
        }
    }
}
