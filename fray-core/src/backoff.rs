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

//! Bounded exponential backoff for `Pending` responses.
//!
//! Resolves the open question in spec §9 ("whether backoff should be
//! per-generator or per-interpreter is ambiguous") in favor of a single,
//! interpreter-owned policy: every `Pending` result from any generator in the
//! tree drives the *same* backoff counter, which resets the instant a real op
//! is produced. See DESIGN.md for the reasoning.

use std::time::Duration;

/// Exponential backoff capped at a ceiling, per spec §4.1/§4.2 ("capped at
/// ~100 ms").
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    cap: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, cap: Duration) -> Backoff {
        Backoff {
            initial,
            cap,
            current: initial,
        }
    }

    /// The default policy spec §4.1 recommends: start at 1ms, cap at 100ms.
    pub fn default_policy() -> Backoff {
        Backoff::new(Duration::from_millis(1), Duration::from_millis(100))
    }

    /// Sleep for the current delay, then double it (capped).
    pub async fn wait(&mut self) {
        tokio::time::sleep(self.current).await;
        self.current = (self.current * 2).min(self.cap);
    }

    /// Reset to the initial delay. Call whenever real progress is made.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_up_to_cap() {
        let mut b = Backoff::new(Duration::from_millis(1), Duration::from_millis(8));
        assert_eq!(b.current, Duration::from_millis(1));
        b.current = (b.current * 2).min(b.cap);
        b.current = (b.current * 2).min(b.cap);
        b.current = (b.current * 2).min(b.cap);
        b.current = (b.current * 2).min(b.cap);
        assert_eq!(b.current, Duration::from_millis(8));
    }

    #[test]
    fn reset_returns_to_initial() {
        let mut b = Backoff::new(Duration::from_millis(1), Duration::from_millis(100));
        b.current = Duration::from_millis(64);
        b.reset();
        assert_eq!(b.current, Duration::from_millis(1));
    }
}
