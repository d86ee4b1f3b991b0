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

//! The generator: a pure, composable description of the op stream (spec
//! §4.1). Per spec §9's design note, this is implemented as a small sealed
//! set of combinator structs behind one trait, rather than an open interface
//! hierarchy — `update` needs every combinator to understand its own child's
//! shape, so the set is closed by construction (only this module constructs
//! `GenBox` values; callers compose, they don't implement the trait).

pub mod combinators;
pub mod independent;

use crate::ctx::Ctx;
use crate::op::Op;
use crate::test_handle::Test;

/// An owned, heap-allocated generator value. Generators are immutable: every
/// call consumes `self` and returns the generator for subsequent calls,
/// matching spec §4.1's `(op, gen')` contract and §9's "interpreter replaces
/// its handle wholesale."
pub type GenBox = Box<dyn Generator>;

/// The result of asking a generator for work.
pub enum Step {
    /// A fresh invocation, and the generator to use from now on.
    Emit(Op, GenBox),
    /// No op available for any currently-visible free thread right now;
    /// retry after backoff. Carries the (possibly updated) generator.
    Pending(GenBox),
    /// `log(msg)` (spec §4.1): no op is emitted, but the interpreter should
    /// record a side-effect entry in the history. Kept out of the `Op`
    /// stream entirely (rather than synthesizing a process id for it) so it
    /// can never interfere with the per-process invoke/completion
    /// alternation invariant (spec §3).
    Note(String, GenBox),
    /// Exhausted. Sticky — once returned, this generator position always
    /// returns `Done` again conceptually, though in practice the interpreter
    /// simply stops calling it.
    Done,
}

pub trait Generator: Send + Sync {
    /// Ask for the next invocation, given the current test and context
    /// snapshot (spec §4.1).
    fn op(self: Box<Self>, test: &Test, ctx: &Ctx) -> Step;

    /// Notify the generator of any op entering the history — its own
    /// emissions' completions, as well as everyone else's (spec §4.1:
    /// "`update(test, ctx, event) -> gen''`; event is any op entering the
    /// history"). Combinators that don't care simply return `self`.
    fn update(self: Box<Self>, test: &Test, ctx: &Ctx, event: &Op) -> GenBox;
}

/// A generator that is permanently exhausted. The sink every combinator
/// collapses to once it has nothing left to say.
pub struct Nil;

impl Generator for Nil {
    fn op(self: Box<Self>, _test: &Test, _ctx: &Ctx) -> Step {
        Step::Done
    }

    fn update(self: Box<Self>, _test: &Test, _ctx: &Ctx, _event: &Op) -> GenBox {
        self
    }
}

pub fn nil() -> GenBox {
    Box::new(Nil)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nil_is_always_done() {
        let test = Test::new(crate::config::TestConfig::default());
        let ctx = crate::testutil::empty_ctx();
        match nil().op(&test, &ctx) {
            Step::Done => {}
            _ => panic!("expected Done"),
        }
    }
}
