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

//! Top-level test orchestration (spec §1, subsystem "test orchestrator"):
//! validate configuration, bring the cluster up, run the interpreter, tear
//! the cluster back down, persist the history, then check it.

use std::path::PathBuf;
use std::sync::Arc;

use crate::checkers::{CheckResult, Checker};
use crate::client::{Client, ClientFactory};
use crate::db::{setup_cluster, teardown_cluster, Db};
use crate::error::HarnessError;
use crate::generator::GenBox;
use crate::history::History;
use crate::history_writer::HistoryWriter;
use crate::interpreter::Interpreter;
use crate::test_handle::Test;

/// Everything a completed run produced, for `fray-cli` to report and map to
/// an exit code (spec §6).
pub struct RunReport {
    pub history: History,
    pub check_result: CheckResult,
    pub run_dir: Option<PathBuf>,
}

/// Runs one complete test: setup, workload, teardown, persist, check (spec
/// §1, §4.5, §4.6). `history_root`, if given, is where [`HistoryWriter`]
/// persists the run; if omitted the history is returned without being
/// written to disk.
pub async fn run_test(
    test: Test,
    db: Arc<dyn Db>,
    client_factory: Arc<dyn ClientFactory>,
    nemesis_client: Box<dyn Client>,
    generator: GenBox,
    checker: &dyn Checker,
    history_root: Option<&std::path::Path>,
) -> Result<RunReport, HarnessError> {
    test.config.validate()?;

    let setup_timeout = test.config.time_limit;
    setup_cluster(&test, db.clone(), &test.config.nodes, setup_timeout).await?;

    let interpreter = Interpreter::new(test.clone(), client_factory, nemesis_client);
    let run_result = interpreter.run(generator).await;

    teardown_cluster(&test, db, &test.config.nodes, setup_timeout).await;

    let history = run_result?;

    let run_dir = match history_root {
        Some(root) => {
            let writer = HistoryWriter::new(root);
            match writer.write(&test.config.workload, &history) {
                Ok(dir) => Some(dir),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to persist history to disk");
                    None
                }
            }
        }
        None => None,
    };

    let check_result = checker.check(&history);

    Ok(RunReport {
        history,
        check_result,
        run_dir,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkers::set::SetChecker;
    use crate::config::TestConfig;
    use crate::error::CrashReason;
    use crate::generator::combinators::{limit, once};
    use crate::op::{f, Op, OpType, Value};
    use async_trait::async_trait;
    use std::time::Duration;

    struct NoopDb;
    #[async_trait]
    impl Db for NoopDb {
        async fn setup(&self, _test: &Test, _node: &str) -> Result<(), String> {
            Ok(())
        }
        async fn teardown(&self, _test: &Test, _node: &str) -> Result<(), String> {
            Ok(())
        }
    }

    struct AddOneClient;
    #[async_trait]
    impl Client for AddOneClient {
        async fn invoke(&mut self, _test: &Test, op: &Op) -> Result<Op, CrashReason> {
            Ok(op.complete(OpType::Ok, op.value.clone()))
        }
    }

    struct NoopNemesis;
    #[async_trait]
    impl Client for NoopNemesis {
        async fn invoke(&mut self, _test: &Test, op: &Op) -> Result<Op, CrashReason> {
            Ok(op.complete(OpType::Ok, Value::Null))
        }
    }

    #[tokio::test]
    async fn runs_end_to_end_and_returns_a_report() {
        let test = Test::new(TestConfig {
            nodes: vec!["n1".into()],
            concurrency: 1,
            workload: "set".into(),
            time_limit: Duration::from_secs(2),
            drain_grace_period: Duration::from_millis(100),
            ..Default::default()
        });
        let factory: Arc<dyn ClientFactory> = Arc::new(|| Box::new(AddOneClient) as Box<dyn Client>);
        let gen = limit(1, once(f("add"), serde_json::json!(1)));

        let report = run_test(
            test,
            Arc::new(NoopDb),
            factory,
            Box::new(NoopNemesis),
            gen,
            &SetChecker,
            None,
        )
        .await
        .unwrap();

        assert_eq!(report.history.len(), 2);
        assert!(report.run_dir.is_none());
    }
}
