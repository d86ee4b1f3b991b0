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

//! The `test` handle threaded through every `(test, ctx)` call in spec §4.
//! Not named directly in spec.md's data model, but presupposed by every
//! generator/client/nemesis/db signature — see SPEC_FULL.md, "Supplemented
//! features", #1.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::TestConfig;

/// Shared, cloneable handle for a single test run. `rng` is behind a
/// `Mutex` because the interpreter and any number of generator/nemesis calls
/// may need a random draw, but `Ctx`/generators themselves stay `Send + Sync`
/// without requiring `&mut` access.
#[derive(Clone)]
pub struct Test {
    pub config: Arc<TestConfig>,
    start: Instant,
    rng: Arc<Mutex<StdRng>>,
}

impl Test {
    pub fn new(config: TestConfig) -> Test {
        let rng = StdRng::seed_from_u64(config.seed);
        Test {
            config: Arc::new(config),
            start: Instant::now(),
            rng: Arc::new(Mutex::new(rng)),
        }
    }

    /// Logical nanoseconds since test start (spec §3, `Op.time`; §4.2,
    /// "Time source").
    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }

    /// Draw from the shared RNG under lock. Used by `stagger`, `mix`, and the
    /// partition nemesis's grudge construction.
    pub fn with_rng<R>(&self, f: impl FnOnce(&mut StdRng) -> R) -> R {
        let mut guard = self.rng.lock().expect("test rng poisoned");
        f(&mut guard)
    }
}

impl std::fmt::Debug for Test {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Test")
            .field("workload", &self.config.workload)
            .field("elapsed", &self.elapsed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rng_is_deterministic_for_a_fixed_seed() {
        let t1 = Test::new(TestConfig {
            seed: 7,
            ..Default::default()
        });
        let t2 = Test::new(TestConfig {
            seed: 7,
            ..Default::default()
        });
        let draws1: Vec<u32> = (0..5).map(|_| t1.with_rng(|r| rand::Rng::gen(r))).collect();
        let draws2: Vec<u32> = (0..5).map(|_| t2.with_rng(|r| rand::Rng::gen(r))).collect();
        assert_eq!(draws1, draws2);
    }
}
