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

//! The single-threaded scheduler (spec §4.2, §5). Owns the generator, the
//! history, and the thread/process bookkeeping; a pool of tokio tasks (one
//! per thread) perform the actual blocking `Client::invoke` calls and report
//! back over a channel so the scheduling loop itself never awaits an
//! arbitrary, workload-chosen future directly.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::backoff::Backoff;
use crate::client::{Client, ClientFactory};
use crate::config::TestConfig;
use crate::ctx::Ctx;
use crate::error::{CrashReason, HarnessError};
use crate::generator::{GenBox, Step};
use crate::history::History;
use crate::op::{Op, OpType, Process, ThreadId, Value};
use crate::test_handle::Test;

/// Sent from the scheduling loop to a worker task.
enum WorkerCmd {
    Invoke(Op),
    /// The process on this thread was retired (an `info` completion); tear
    /// the old client down and stand up a fresh incarnation (spec §3,
    /// "Thread vs. process"). Client threads only.
    Retire,
    Shutdown,
}

/// Sent from a worker task back to the scheduling loop.
enum WorkerEvent {
    Completed { thread: ThreadId, completion: Op },
    Crashed {
        thread: ThreadId,
        reason: CrashReason,
    },
}

async fn run_worker(
    thread: ThreadId,
    mut client: Box<dyn Client>,
    test: Test,
    node: String,
    mut cmd_rx: mpsc::UnboundedReceiver<WorkerCmd>,
    event_tx: mpsc::UnboundedSender<WorkerEvent>,
    factory: Option<Arc<dyn ClientFactory>>,
) {
    if let Err(e) = client.open(&test, &node).await {
        tracing::warn!(thread, error = %e, "client failed to open");
    }
    if let Err(e) = client.setup(&test).await {
        tracing::warn!(thread, error = %e, "client failed to set up");
    }

    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            WorkerCmd::Invoke(op) => {
                let outcome = client.invoke(&test, &op).await;
                let event = match outcome {
                    Ok(completion) => WorkerEvent::Completed { thread, completion },
                    Err(reason) => WorkerEvent::Crashed { thread, reason },
                };
                if event_tx.send(event).is_err() {
                    break;
                }
            }
            WorkerCmd::Retire => {
                client.teardown(&test).await;
                client.close(&test).await;
                if let Some(factory) = &factory {
                    client = factory.create();
                    if let Err(e) = client.open(&test, &node).await {
                        tracing::warn!(thread, error = %e, "client failed to reopen after retirement");
                    }
                    if let Err(e) = client.setup(&test).await {
                        tracing::warn!(thread, error = %e, "client failed to set up after retirement");
                    }
                }
            }
            WorkerCmd::Shutdown => break,
        }
    }
    client.teardown(&test).await;
    client.close(&test).await;
}

/// The scheduling loop of spec §4.2: repeatedly asks the generator for work,
/// dispatches it to the thread owning the targeted process, and folds
/// completions back in as they arrive.
pub struct Interpreter {
    test: Test,
    thread_count: u32,
    free_threads: BTreeSet<ThreadId>,
    workers: BTreeMap<ThreadId, Process>,
    nemesis_threads: BTreeSet<ThreadId>,
    incarnations: BTreeMap<ThreadId, u64>,
    outstanding: BTreeMap<ThreadId, Op>,
    cmd_txs: BTreeMap<ThreadId, mpsc::UnboundedSender<WorkerCmd>>,
    handles: Vec<tokio::task::JoinHandle<()>>,
    event_tx: mpsc::UnboundedSender<WorkerEvent>,
    event_rx: mpsc::UnboundedReceiver<WorkerEvent>,
    history: History,
    backoff: Backoff,
}

impl Interpreter {
    /// Spawns one worker task per client thread plus one for the nemesis
    /// process, and sets up the initial thread/process assignment (spec §3:
    /// incarnation `k=0` is `process == thread`).
    pub fn new(
        test: Test,
        client_factory: Arc<dyn ClientFactory>,
        nemesis_client: Box<dyn Client>,
    ) -> Interpreter {
        let concurrency = test.config.concurrency;
        let nemesis_thread = concurrency as ThreadId;
        let thread_count = concurrency;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let mut workers = BTreeMap::new();
        let mut free_threads = BTreeSet::new();
        let mut incarnations = BTreeMap::new();
        let mut cmd_txs = BTreeMap::new();
        let mut handles = Vec::new();

        for thread in 0..concurrency {
            let (tx, rx) = mpsc::unbounded_channel();
            let node = node_for_thread(&test.config, thread);
            let client = client_factory.create();
            workers.insert(thread, Process::Client(thread as u64));
            free_threads.insert(thread);
            incarnations.insert(thread, 0);
            cmd_txs.insert(thread, tx);
            handles.push(tokio::spawn(run_worker(
                thread,
                client,
                test.clone(),
                node,
                rx,
                event_tx.clone(),
                Some(client_factory.clone()),
            )));
        }

        let (nemesis_tx, nemesis_rx) = mpsc::unbounded_channel();
        workers.insert(nemesis_thread, Process::Nemesis);
        free_threads.insert(nemesis_thread);
        cmd_txs.insert(nemesis_thread, nemesis_tx);
        handles.push(tokio::spawn(run_worker(
            nemesis_thread,
            nemesis_client,
            test.clone(),
            String::new(),
            nemesis_rx,
            event_tx.clone(),
            None,
        )));

        Interpreter {
            test,
            thread_count,
            free_threads,
            workers,
            nemesis_threads: [nemesis_thread].into_iter().collect(),
            incarnations,
            outstanding: BTreeMap::new(),
            cmd_txs,
            handles,
            event_tx,
            event_rx,
            history: History::new(),
            backoff: Backoff::default_policy(),
        }
    }

    fn ctx(&self) -> Ctx {
        Ctx::new(
            self.test.elapsed(),
            self.free_threads.clone(),
            self.workers.clone(),
            self.nemesis_threads.clone(),
        )
    }

    fn thread_for_process(&self, process: Process) -> Option<ThreadId> {
        self.workers
            .iter()
            .find(|(_, p)| **p == process)
            .map(|(t, _)| *t)
    }

    /// Drains any events already buffered on the channel without blocking, so
    /// `free_threads`/`workers` reflect recent completions before the
    /// generator is asked for more work.
    fn drain_ready_events(&mut self, generator: &mut GenBox) -> Result<(), HarnessError> {
        while let Ok(event) = self.event_rx.try_recv() {
            self.handle_event(event, generator)?;
        }
        Ok(())
    }

    /// Records `op` into the history and immediately notifies `generator` via
    /// `update` — every op entering the history does, invocation or
    /// completion alike (spec §4.1: "event is any op entering the history").
    fn record_and_notify(&mut self, generator: &mut GenBox, op: Op) -> Op {
        let ctx = self.ctx();
        let stamped = self.history.record(op, self.test.elapsed());
        let current = std::mem::replace(generator, crate::generator::nil());
        *generator = current.update(&self.test, &ctx, &stamped);
        stamped
    }

    fn handle_event(&mut self, event: WorkerEvent, generator: &mut GenBox) -> Result<(), HarnessError> {
        match event {
            WorkerEvent::Completed { thread, completion } => {
                self.outstanding.remove(&thread);
                let stamped = self.record_and_notify(generator, completion);
                self.retire_if_needed(thread, &stamped);
                self.free_threads.insert(thread);
                Ok(())
            }
            WorkerEvent::Crashed { thread, reason } => {
                if let CrashReason::Fatal(msg) = reason {
                    return Err(HarnessError::Internal(msg));
                }
                if let Some(op) = self.outstanding.remove(&thread) {
                    let completion = op
                        .complete(OpType::Info, Value::Null)
                        .with_error(Value::String(reason.to_string()));
                    let stamped = self.record_and_notify(generator, completion);
                    self.retire_if_needed(thread, &stamped);
                }
                self.free_threads.insert(thread);
                Ok(())
            }
        }
    }

    /// Retires the client process on `thread` and requests a fresh
    /// incarnation, per spec §3: an `info` completion always retires its
    /// process; nemesis never retires, it is a single standing identity.
    fn retire_if_needed(&mut self, thread: ThreadId, completion: &Op) {
        if completion.op_type != OpType::Info || self.nemesis_threads.contains(&thread) {
            return;
        }
        let k = self.incarnations.entry(thread).or_insert(0);
        *k += 1;
        let next = Process::Client(thread as u64 + *k * self.thread_count as u64);
        self.workers.insert(thread, next);
        if let Some(tx) = self.cmd_txs.get(&thread) {
            let _ = tx.send(WorkerCmd::Retire);
        }
    }

    /// Dispatch an already-recorded invocation to the thread currently
    /// holding its process.
    fn queue_invoke(&mut self, stamped: Op) -> Result<(), HarnessError> {
        let thread = self
            .thread_for_process(stamped.process)
            .ok_or_else(|| HarnessError::Internal(format!("no thread owns process {}", stamped.process)))?;
        self.free_threads.remove(&thread);
        self.outstanding.insert(thread, stamped.clone());
        self.cmd_txs
            .get(&thread)
            .expect("every tracked thread has a command channel")
            .send(WorkerCmd::Invoke(stamped))
            .map_err(|_| HarnessError::Internal(format!("worker thread {thread} is gone")))
    }

    /// Runs the generator to exhaustion (or until `time_limit` elapses),
    /// folding completions back into the generator via `update`, then drains
    /// outstanding invocations and returns the finished history.
    pub async fn run(mut self, mut generator: GenBox) -> Result<History, HarnessError> {
        let time_limit = self.test.config.time_limit;
        loop {
            self.drain_ready_events(&mut generator)?;

            if self.test.elapsed() >= time_limit {
                break;
            }

            let ctx = self.ctx();
            let step = generator.op(&self.test, &ctx);
            match step {
                Step::Emit(op, next) => {
                    generator = next;
                    self.backoff.reset();
                    let stamped = self.record_and_notify(&mut generator, op);
                    self.queue_invoke(stamped)?;
                }
                Step::Pending(next) => {
                    generator = next;
                    tokio::select! {
                        _ = self.backoff.wait() => {}
                        Some(event) = self.event_rx.recv() => {
                            self.handle_event(event, &mut generator)?;
                        }
                    }
                }
                Step::Note(message, next) => {
                    generator = next;
                    self.history.add_note(self.test.elapsed(), message);
                }
                Step::Done => break,
            }
        }

        self.drain(&mut generator).await?;
        self.shutdown().await;

        if let Err(violation) = self.history.check_invariants() {
            tracing::error!(violation, "history failed its structural invariants");
        }

        Ok(self.history)
    }

    /// Waits up to `drain_grace_period` for every outstanding invocation to
    /// complete; anything still outstanding past the deadline is synthesized
    /// into an `info` completion (spec §5, "Cancellation & timeouts").
    async fn drain(&mut self, generator: &mut GenBox) -> Result<(), HarnessError> {
        let grace = self.test.config.drain_grace_period;
        let deadline = tokio::time::Instant::now() + grace;
        while !self.outstanding.is_empty() {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                break;
            }
            match tokio::time::timeout(remaining, self.event_rx.recv()).await {
                Ok(Some(event)) => self.handle_event(event, generator)?,
                Ok(None) => break,
                Err(_elapsed) => break,
            }
        }
        if !self.outstanding.is_empty() {
            let stragglers: Vec<(ThreadId, Op)> = std::mem::take(&mut self.outstanding).into_iter().collect();
            for (thread, op) in stragglers {
                tracing::warn!(thread, "synthesizing info completion for straggler at drain");
                let completion = op.complete(OpType::Info, Value::Null);
                self.record_and_notify(generator, completion);
                self.free_threads.insert(thread);
            }
        }
        Ok(())
    }

    async fn shutdown(self) {
        for tx in self.cmd_txs.values() {
            let _ = tx.send(WorkerCmd::Shutdown);
        }
        drop(self.cmd_txs);
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

fn node_for_thread(config: &TestConfig, thread: ThreadId) -> String {
    if config.nodes.is_empty() {
        return String::new();
    }
    config.nodes[thread as usize % config.nodes.len()].clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::combinators::limit;
    use crate::op::f;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Emits `read` forever on whichever process is free, for exercising
    /// `limit`/time-bounded termination without a workload-specific generator.
    struct Repeat;

    impl crate::generator::Generator for Repeat {
        fn op(self: Box<Self>, _test: &Test, ctx: &Ctx) -> Step {
            match ctx.pick_any_free_process() {
                Some(process) => Step::Emit(Op::invoke(process, f("read"), Value::Null), self),
                None => Step::Pending(self),
            }
        }

        fn update(self: Box<Self>, _test: &Test, _ctx: &Ctx, _event: &Op) -> GenBox {
            self
        }
    }

    struct CountingClient {
        count: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Client for CountingClient {
        async fn invoke(&mut self, _test: &Test, op: &Op) -> Result<Op, CrashReason> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(op.complete(OpType::Ok, Value::Null))
        }
    }

    struct NoopNemesis;
    #[async_trait]
    impl Client for NoopNemesis {
        async fn invoke(&mut self, _test: &Test, op: &Op) -> Result<Op, CrashReason> {
            Ok(op.complete(OpType::Ok, Value::Null))
        }
    }

    fn config() -> TestConfig {
        TestConfig {
            nodes: vec!["n1".into()],
            concurrency: 2,
            workload: "noop".into(),
            time_limit: Duration::from_secs(2),
            drain_grace_period: Duration::from_millis(200),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn runs_a_bounded_generator_to_completion() {
        let test = Test::new(config());
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        let factory: Arc<dyn ClientFactory> =
            Arc::new(move || Box::new(CountingClient { count: count2.clone() }) as Box<dyn Client>);
        let interpreter = Interpreter::new(test.clone(), factory, Box::new(NoopNemesis));

        let gen: GenBox = limit(5, Box::new(Repeat));
        let history = interpreter.run(gen).await.unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 5);
        assert_eq!(history.len(), 10);
        assert!(history.check_invariants().is_ok());
    }

    #[tokio::test]
    async fn stops_at_time_limit_even_with_an_unbounded_generator() {
        let mut cfg = config();
        cfg.time_limit = Duration::from_millis(50);
        cfg.drain_grace_period = Duration::from_millis(50);
        let test = Test::new(cfg);
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        let factory: Arc<dyn ClientFactory> =
            Arc::new(move || Box::new(CountingClient { count: count2.clone() }) as Box<dyn Client>);
        let interpreter = Interpreter::new(test.clone(), factory, Box::new(NoopNemesis));

        let gen: GenBox = Box::new(Repeat);
        let history = interpreter.run(gen).await.unwrap();
        assert!(history.check_invariants().is_ok());
    }
}
