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

//! A reusable rendezvous point for exactly `total` participants, with a
//! timeout and a "deferred release" so one participant's failure doesn't
//! strand the others (spec §4.5). `tokio::sync::Barrier` doesn't expose a
//! timeout or a way to tell waiters apart after release, so this is a small
//! hand-rolled counter over `tokio::sync::{Mutex, Notify}`, in the style of
//! `redux::Store`'s use of `tokio::sync::RwLock` for shared, async-guarded
//! state.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};

use crate::error::BarrierError;

struct Inner {
    arrived: usize,
    total: usize,
    first_failure: Option<String>,
}

/// Cheap to clone: every participant gets its own handle onto the same
/// shared counter.
#[derive(Clone)]
pub struct Barrier {
    inner: Arc<Mutex<Inner>>,
    notify: Arc<Notify>,
}

impl Barrier {
    pub fn new(total: usize) -> Barrier {
        Barrier {
            inner: Arc::new(Mutex::new(Inner {
                arrived: 0,
                total,
                first_failure: None,
            })),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Runs `work`, then rendezvouses regardless of whether `work` failed —
    /// a participant whose own work throws is still counted (spec §4.5: "via
    /// a deferred release") so its peers don't block forever. Returns the
    /// first participant's failure, if any, once every participant has
    /// arrived; times out if `total` participants don't arrive within
    /// `timeout`.
    pub async fn rendezvous<F, Fut>(&self, timeout: Duration, work: F) -> Result<(), BarrierError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), String>>,
    {
        let outcome = work().await;
        self.arrive(outcome.clone().err()).await;

        match tokio::time::timeout(timeout, self.wait_until_complete()).await {
            Err(_elapsed) => {
                let guard = self.inner.lock().await;
                Err(BarrierError::Timeout {
                    waiting_on: guard.total - guard.arrived,
                    total: guard.total,
                })
            }
            Ok(()) => {
                let guard = self.inner.lock().await;
                match &guard.first_failure {
                    Some(msg) => Err(BarrierError::ParticipantFailed {
                        thread: 0,
                        source: msg.clone(),
                    }),
                    None => Ok(()),
                }
            }
        }
    }

    async fn arrive(&self, failure: Option<String>) {
        let mut guard = self.inner.lock().await;
        guard.arrived += 1;
        if guard.first_failure.is_none() {
            guard.first_failure = failure;
        }
        if guard.arrived >= guard.total {
            self.notify.notify_waiters();
        }
    }

    async fn wait_until_complete(&self) {
        loop {
            {
                let guard = self.inner.lock().await;
                if guard.arrived >= guard.total {
                    return;
                }
            }
            self.notify.notified().await;
        }
    }
}
