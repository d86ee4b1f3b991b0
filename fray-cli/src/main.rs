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

//! `fray test`: parse arguments, assemble a workload and nemesis, run the
//! interpreter, and exit with the code spec §6 assigns to the outcome.

mod cli;
mod nemesis_schedule;
mod workloads;

use std::process::ExitCode;

use clap::Parser;
use fray_core::generator::combinators::mix;
use fray_core::orchestrator::run_test;
use fray_core::test_handle::Test;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let Command::Test(args) = cli.command;

    let log_dir = args.log_dir.clone();
    let history_dir = args.history_dir.clone();
    let _logging_guard = fray_core::logging::init(log_dir.as_deref());

    let config = match args.into_config() {
        Ok(config) => config,
        Err(e) => return report_fatal(e, 2),
    };

    let workload = match workloads::build(&config) {
        Ok(workload) => workload,
        Err(e) => return report_fatal(e, 2),
    };
    let (nemesis_client, nemesis_generator) = match nemesis_schedule::build(&config) {
        Ok(pair) => pair,
        Err(e) => return report_fatal(e, 2),
    };

    tracing::info!(workload = %config.workload, nodes = config.nodes.len(), concurrency = config.concurrency, "starting run");

    let test = Test::new(config);
    let generator = mix(vec![workload.generator, nemesis_generator]);

    let result = run_test(
        test,
        workload.db,
        workload.client_factory,
        nemesis_client,
        generator,
        workload.checker.as_ref(),
        history_dir.as_deref(),
    )
    .await;

    match result {
        Ok(report) => {
            if let Some(dir) = &report.run_dir {
                println!("history written to {}", dir.display());
            }
            if report.check_result.valid {
                tracing::info!(ops = report.history.len(), "run completed, history is valid");
                println!("Valid: true");
                ExitCode::SUCCESS
            } else {
                tracing::error!(ops = report.history.len(), "run completed, history is invalid");
                println!("Valid: false");
                for detail in &report.check_result.details {
                    println!("  - {detail}");
                }
                ExitCode::from(1)
            }
        }
        Err(e) => {
            let code = e.exit_code() as u8;
            report_fatal(e, code)
        }
    }
}

fn report_fatal<E>(error: E, code: u8) -> ExitCode
where
    E: std::error::Error + miette::Diagnostic + Send + Sync + 'static,
{
    eprintln!("{:?}", miette::Report::new(error));
    ExitCode::from(code)
}
