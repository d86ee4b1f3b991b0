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

//! The CLI surface common to every workload (spec §6).

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use fray_core::config::TestConfig;
use fray_core::error::ConfigError;

#[derive(Debug, Parser)]
#[command(name = "fray", about = "A fault-injecting test harness for distributed systems")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a test.
    Test(TestArgs),
}

#[derive(Debug, Parser)]
pub struct TestArgs {
    /// Comma-separated node hostnames.
    #[arg(long, value_delimiter = ',')]
    pub nodes: Vec<String>,

    /// Path to a file with one node hostname per line, as an alternative to `--nodes`.
    #[arg(long)]
    pub nodes_file: Option<PathBuf>,

    /// Client thread count. Accepts either a bare number or `Nn` for N per node.
    #[arg(long, default_value = "5")]
    pub concurrency: String,

    #[arg(long, default_value = "60")]
    pub time_limit: u64,

    #[arg(long, default_value = "1")]
    pub test_count: u32,

    #[arg(long)]
    pub workload: String,

    /// Comma-separated nemesis fault specs, e.g. `partition,kill`.
    #[arg(long, value_delimiter = ',')]
    pub nemesis: Vec<String>,

    #[arg(long, default_value = "10")]
    pub nemesis_interval: u64,

    #[arg(long)]
    pub rate: Option<f64>,

    #[arg(long)]
    pub ops_per_key: Option<u32>,

    #[arg(long, env = "FRAY_USERNAME")]
    pub username: Option<String>,

    #[arg(long, env = "FRAY_PASSWORD")]
    pub password: Option<String>,

    #[arg(long, env = "FRAY_SSH_PRIVATE_KEY")]
    pub ssh_private_key: Option<String>,

    #[arg(long, default_value = "10")]
    pub drain_grace_period: u64,

    #[arg(long, default_value = "0")]
    pub seed: u64,

    /// Directory to persist run histories under; omit to skip persistence.
    #[arg(long)]
    pub history_dir: Option<PathBuf>,

    /// Directory to write rolling log files under; omit to log to stdout only.
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
}

impl TestArgs {
    /// Resolves the raw CLI arguments into a [`TestConfig`], reading
    /// `--nodes-file` and parsing `Nn`-style concurrency if present (spec
    /// §6, "`--concurrency N` or `Nn` (N × node count)").
    pub fn into_config(self) -> Result<TestConfig, ConfigError> {
        let mut nodes = self.nodes;
        if let Some(path) = &self.nodes_file {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::UnknownKey(format!("nodes-file {path:?}: {e}")))?;
            nodes.extend(contents.lines().map(str::trim).filter(|l| !l.is_empty()).map(String::from));
        }
        if nodes.is_empty() {
            return Err(ConfigError::NoNodes);
        }

        let concurrency = parse_concurrency(&self.concurrency, nodes.len() as u32)?;

        Ok(TestConfig {
            nodes,
            concurrency,
            time_limit: Duration::from_secs(self.time_limit),
            test_count: self.test_count,
            workload: self.workload,
            nemesis: self.nemesis,
            nemesis_interval: Duration::from_secs(self.nemesis_interval),
            rate: self.rate,
            ops_per_key: self.ops_per_key,
            username: self.username,
            password: self.password,
            ssh_private_key: self.ssh_private_key,
            drain_grace_period: Duration::from_secs(self.drain_grace_period),
            seed: self.seed,
        })
    }
}

fn parse_concurrency(raw: &str, node_count: u32) -> Result<u32, ConfigError> {
    if let Some(per_node) = raw.strip_suffix('n') {
        let per_node: u32 = per_node
            .parse()
            .map_err(|_| ConfigError::UnknownKey(format!("concurrency {raw:?}")))?;
        Ok(per_node * node_count)
    } else {
        raw.parse().map_err(|_| ConfigError::UnknownKey(format!("concurrency {raw:?}")))
    }
}
