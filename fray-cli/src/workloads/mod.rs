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

//! Named workloads selectable via `--workload` (spec §6). Each one bundles
//! the generator, client factory, `Db`, and checker that belong together;
//! `fray-core` stays workload-agnostic, so this wiring lives in the binary.

pub mod bank;
pub mod set;

use std::sync::Arc;

use async_trait::async_trait;
use fray_core::client::ClientFactory;
use fray_core::config::TestConfig;
use fray_core::db::Db;
use fray_core::error::ConfigError;
use fray_core::generator::GenBox;
use fray_core::test_handle::Test;

use fray_core::checkers::Checker;

/// Everything `run_test` needs besides the nemesis (spec §6's `--workload`
/// selects one of these).
pub struct Workload {
    pub generator: GenBox,
    pub client_factory: Arc<dyn ClientFactory>,
    pub db: Arc<dyn Db>,
    pub checker: Box<dyn Checker>,
}

/// A `Db` with nothing to install: every workload here keeps its state
/// in-process, so cluster setup/teardown is a no-op.
pub(crate) struct DemoDb;

#[async_trait]
impl Db for DemoDb {
    async fn setup(&self, _test: &Test, _node: &str) -> Result<(), String> {
        Ok(())
    }

    async fn teardown(&self, _test: &Test, _node: &str) -> Result<(), String> {
        Ok(())
    }
}

pub fn build(config: &TestConfig) -> Result<Workload, ConfigError> {
    match config.workload.as_str() {
        "set" => Ok(set::build(config)),
        "bank" => Ok(bank::build(config)),
        other => Err(ConfigError::UnknownWorkload(other.to_string())),
    }
}
