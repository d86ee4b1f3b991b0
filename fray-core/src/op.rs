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

//! The `Op` record and the thread/process identity model (spec §3).

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A physical worker slot. Stable for the lifetime of a test run.
pub type ThreadId = u32;

/// A logical identity that issues a strictly-alternating invoke/completion
/// sequence. May be retired and replaced with a fresh incarnation on the same
/// thread (spec §3, "Thread vs. process").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Process {
    /// A client process: `thread + k * thread_count` for the k-th incarnation.
    Client(u64),
    /// The distinguished nemesis process.
    Nemesis,
}

impl Process {
    pub fn is_nemesis(self) -> bool {
        matches!(self, Process::Nemesis)
    }
}

impl fmt::Display for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Process::Client(n) => write!(f, "{n}"),
            Process::Nemesis => write!(f, "nemesis"),
        }
    }
}

impl Serialize for Process {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Process::Client(n) => serializer.serialize_u64(*n),
            Process::Nemesis => serializer.serialize_str("nemesis"),
        }
    }
}

impl<'de> Deserialize<'de> for Process {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Num(u64),
            Str(String),
        }
        match Repr::deserialize(deserializer)? {
            Repr::Num(n) => Ok(Process::Client(n)),
            Repr::Str(s) if s == "nemesis" => Ok(Process::Nemesis),
            Repr::Str(other) => Err(serde::de::Error::custom(format!(
                "unrecognized process tag: {other:?}"
            ))),
        }
    }
}

/// One of the four points in an op's lifecycle (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpType {
    /// Begins an operation.
    Invoke,
    /// Definite success.
    Ok,
    /// Definite failure.
    Fail,
    /// Indeterminate outcome. Retires the issuing process.
    Info,
}

impl OpType {
    pub fn is_invoke(self) -> bool {
        matches!(self, OpType::Invoke)
    }

    pub fn is_completion(self) -> bool {
        !self.is_invoke()
    }
}

/// An operation kind, e.g. `read`, `write`, `cas`, `start-partition`. Opaque
/// to the core; interned as a cheap-to-clone `Arc<str>` because every `Op`
/// carries one and generators construct many of them (spec §9, "dynamic
/// keyword/symbol operation names" → small interned-string alternative to a
/// per-workload enum, so the core stays workload-agnostic).
pub type FKind = Arc<str>;

pub fn f(name: &str) -> FKind {
    Arc::from(name)
}

/// Operation payload and completion error tag. Left opaque (`serde_json::Value`)
/// per spec §3 — the core never interprets these, only checkers do.
pub type Value = serde_json::Value;

/// An immutable record in the history (spec §3, "Operation (`Op`)").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Op {
    /// Assigned on entry to the history. Dense, 0-based.
    pub index: u64,
    /// Logical nanoseconds since test start, assigned at journaling time.
    pub time: u64,
    pub process: Process,
    #[serde(rename = "type")]
    pub op_type: OpType,
    pub f: FKind,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl Op {
    /// Build an as-yet-unindexed invocation. `index`/`time` are filled in by
    /// the interpreter when the op is appended to the history.
    pub fn invoke(process: Process, f: FKind, value: Value) -> Op {
        Op {
            index: 0,
            time: 0,
            process,
            op_type: OpType::Invoke,
            f,
            value,
            error: None,
        }
    }

    /// Build the completion of this invocation, keeping `process` and `f`.
    pub fn complete(&self, op_type: OpType, value: Value) -> Op {
        assert!(op_type.is_completion(), "complete() requires a completion OpType");
        Op {
            index: 0,
            time: 0,
            process: self.process,
            op_type,
            f: self.f.clone(),
            value,
            error: None,
        }
    }

    pub fn with_error(mut self, error: Value) -> Op {
        self.error = Some(error);
        self
    }

    pub fn is_invoke(&self) -> bool {
        self.op_type.is_invoke()
    }

    pub fn is_completion(&self) -> bool {
        self.op_type.is_completion()
    }
}
