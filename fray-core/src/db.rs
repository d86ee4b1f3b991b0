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

//! DB lifecycle (spec §4.5). `Db` is opaque to the core (spec §1); this
//! module fixes its boundary trait and the concurrent setup/teardown glue
//! with the synchronization barrier spec §4.5 requires.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::barrier::Barrier;
use crate::error::{BarrierError, HarnessError};
use crate::test_handle::Test;

/// Required setup/teardown plus the optional lifecycle hooks spec §4.5
/// lists. Defaults return "unsupported" so a `Db` only needs to override
/// what it actually implements.
#[async_trait]
pub trait Db: Send + Sync {
    async fn setup(&self, test: &Test, node: &str) -> Result<(), String>;
    async fn teardown(&self, test: &Test, node: &str) -> Result<(), String>;

    async fn kill(&self, _test: &Test, _node: &str) -> Result<(), String> {
        Err("kill unsupported".into())
    }
    async fn start(&self, _test: &Test, _node: &str) -> Result<(), String> {
        Err("start unsupported".into())
    }
    async fn pause(&self, _test: &Test, _node: &str) -> Result<(), String> {
        Err("pause unsupported".into())
    }
    async fn resume(&self, _test: &Test, _node: &str) -> Result<(), String> {
        Err("resume unsupported".into())
    }
    async fn primaries(&self, _test: &Test) -> Result<Vec<String>, String> {
        Err("primaries unsupported".into())
    }
    async fn setup_primary(&self, _test: &Test, _node: &str) -> Result<(), String> {
        Err("setup-primary unsupported".into())
    }
    async fn log_files(&self, _test: &Test, _node: &str) -> Result<Vec<String>, String> {
        Ok(Vec::new())
    }

    /// Graceful shutdown, distinct from [`Db::kill`]'s signal-based kill
    /// (spec §4.4, kill/restart nemesis state machine: "`stop` (any ->
    /// stopped via graceful shutdown)"). Not in spec §4.5's DB surface, but
    /// required by the kill-nemesis state machine §4.4 names explicitly.
    async fn stop(&self, _test: &Test, _node: &str) -> Result<(), String> {
        Err("stop unsupported".into())
    }
}

/// Runs `db.setup` concurrently on every node, rendezvousing at one barrier
/// so the workload only starts once every node is ready (spec §4.5, first
/// sync point). A node whose setup fails still arrives at the barrier (via
/// [`Barrier::rendezvous`]'s deferred release) so peers are not blocked
/// forever; the first failure becomes the run's fatal error.
pub async fn setup_cluster(
    test: &Test,
    db: Arc<dyn Db>,
    nodes: &[String],
    timeout: Duration,
) -> Result<(), HarnessError> {
    if nodes.is_empty() {
        return Ok(());
    }
    let barrier = Barrier::new(nodes.len());
    let mut handles = Vec::with_capacity(nodes.len());
    for node in nodes {
        let db = db.clone();
        let barrier = barrier.clone();
        let test = test.clone();
        let node = node.clone();
        handles.push(tokio::spawn(async move {
            barrier
                .rendezvous(timeout, || async { db.setup(&test, &node).await })
                .await
        }));
    }
    join_or_first_error(handles).await
}

/// The second synchronization point of spec §4.5: runs `db.teardown` on
/// every node after the workload completes. Per spec §7's error taxonomy,
/// teardown failures are logged, not fatal — the test's result is preserved
/// regardless of cleanup success.
pub async fn teardown_cluster(test: &Test, db: Arc<dyn Db>, nodes: &[String], timeout: Duration) {
    if nodes.is_empty() {
        return;
    }
    let barrier = Barrier::new(nodes.len());
    let mut handles = Vec::with_capacity(nodes.len());
    for node in nodes {
        let db = db.clone();
        let barrier = barrier.clone();
        let test = test.clone();
        let node = node.clone();
        handles.push(tokio::spawn(async move {
            barrier
                .rendezvous(timeout, || async { db.teardown(&test, &node).await })
                .await
        }));
    }
    if let Err(err) = join_or_first_error(handles).await {
        tracing::warn!(error = %err, "db teardown did not complete cleanly");
    }
}

async fn join_or_first_error(
    handles: Vec<tokio::task::JoinHandle<Result<(), BarrierError>>>,
) -> Result<(), HarnessError> {
    let mut first_err = None;
    for handle in handles {
        let result = handle.await.map_err(|e| HarnessError::Internal(e.to_string()))?;
        if let Err(e) = result {
            first_err.get_or_insert(e);
        }
    }
    match first_err {
        Some(e) => Err(HarnessError::Barrier(e)),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TestConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingDb {
        setups: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Db for CountingDb {
        async fn setup(&self, _test: &Test, _node: &str) -> Result<(), String> {
            self.setups.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn teardown(&self, _test: &Test, _node: &str) -> Result<(), String> {
            Ok(())
        }
    }

    struct FailingDb;

    #[async_trait]
    impl Db for FailingDb {
        async fn setup(&self, _test: &Test, node: &str) -> Result<(), String> {
            if node == "n2" {
                Err("disk full".into())
            } else {
                Ok(())
            }
        }
        async fn teardown(&self, _test: &Test, _node: &str) -> Result<(), String> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn setup_runs_on_every_node_concurrently() {
        let test = Test::new(TestConfig::default());
        let setups = Arc::new(AtomicUsize::new(0));
        let db = Arc::new(CountingDb { setups: setups.clone() });
        let nodes = vec!["n1".to_string(), "n2".to_string(), "n3".to_string()];
        setup_cluster(&test, db, &nodes, Duration::from_secs(5)).await.unwrap();
        assert_eq!(setups.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn one_failing_node_does_not_block_the_others_and_surfaces_fatal() {
        let test = Test::new(TestConfig::default());
        let db = Arc::new(FailingDb);
        let nodes = vec!["n1".to_string(), "n2".to_string(), "n3".to_string()];
        let result = setup_cluster(&test, db, &nodes, Duration::from_secs(5)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn empty_node_set_succeeds_trivially() {
        let test = Test::new(TestConfig::default());
        let db = Arc::new(CountingDb { setups: Arc::new(AtomicUsize::new(0)) });
        assert!(setup_cluster(&test, db, &[], Duration::from_secs(5)).await.is_ok());
    }
}
