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

//! Explicit, typed test configuration (spec §6, §9 REDESIGN FLAGS: "Promote
//! to explicit configuration records with recognized options enumerated").
//! `fray-cli` builds one of these from `clap`; `fray-core` never sees a
//! stringly-typed map.

use std::time::Duration;

use crate::error::ConfigError;

#[derive(Debug, Clone)]
pub struct TestConfig {
    pub nodes: Vec<String>,
    /// Number of client threads. Must be a multiple of `threads_per_key` if
    /// the workload uses the independent-keys generator (spec §4.1).
    pub concurrency: u32,
    pub time_limit: Duration,
    pub test_count: u32,
    pub workload: String,
    pub nemesis: Vec<String>,
    pub nemesis_interval: Duration,
    pub rate: Option<f64>,
    pub ops_per_key: Option<u32>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ssh_private_key: Option<String>,
    /// Grace period before outstanding invokes are synthesized into `info`
    /// completions at test end (spec §5, "Cancellation & timeouts").
    pub drain_grace_period: Duration,
    /// Seed for the single `rand::rngs::StdRng` shared via [`crate::Test`].
    pub seed: u64,
}

impl Default for TestConfig {
    fn default() -> TestConfig {
        TestConfig {
            nodes: Vec::new(),
            concurrency: 5,
            time_limit: Duration::from_secs(60),
            test_count: 1,
            workload: String::new(),
            nemesis: Vec::new(),
            nemesis_interval: Duration::from_secs(10),
            rate: None,
            ops_per_key: None,
            username: None,
            password: None,
            ssh_private_key: None,
            drain_grace_period: Duration::from_secs(10),
            seed: 0,
        }
    }
}

impl TestConfig {
    /// Validate cross-field invariants that only make sense once the whole
    /// record is assembled (spec §4.1: "Concurrency must be a multiple of k
    /// or the interpreter fails with a configuration error").
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nodes.is_empty() {
            return Err(ConfigError::NoNodes);
        }
        if self.workload.is_empty() {
            return Err(ConfigError::UnknownWorkload(self.workload.clone()));
        }
        Ok(())
    }

    pub fn validate_independent_concurrency(&self, threads_per_key: u32) -> Result<(), ConfigError> {
        if threads_per_key == 0 || self.concurrency % threads_per_key != 0 {
            return Err(ConfigError::ConcurrencyNotMultipleOfGroupSize {
                concurrency: self.concurrency,
                threads_per_key,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_node_list() {
        let mut cfg = TestConfig {
            workload: "register".into(),
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::NoNodes)));
        cfg.nodes.push("n1".into());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_concurrency_not_multiple_of_group_size() {
        let cfg = TestConfig {
            nodes: vec!["n1".into()],
            workload: "register".into(),
            concurrency: 5,
            ..Default::default()
        };
        assert!(cfg.validate_independent_concurrency(2).is_err());
        assert!(cfg.validate_independent_concurrency(5).is_ok());
    }
}
