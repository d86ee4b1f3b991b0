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

//! Core harness for testing distributed systems under fault injection.
//!
//! A test is assembled from a [`generator`] (what to try), a [`client`] (how
//! to talk to the system under test), a [`db`] (how to deploy and wreck it),
//! and a [`nemesis`] (faults to inject alongside the workload); the
//! [`interpreter`] schedules all of it into an append-only [`history`], which
//! a [`checkers`] implementation then judges for consistency violations.

pub mod backoff;
pub mod barrier;
pub mod checkers;
pub mod client;
pub mod config;
pub mod ctx;
pub mod db;
pub mod error;
pub mod generator;
pub mod history;
pub mod history_writer;
pub mod interpreter;
pub mod logging;
pub mod nemesis;
pub mod op;
pub mod orchestrator;
pub mod remote;
pub mod test_handle;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::TestConfig;
pub use error::HarnessError;
pub use history::History;
pub use op::{Op, OpType, Process};
pub use test_handle::Test;
