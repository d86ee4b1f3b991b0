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

//! The stackable generator combinators of spec §4.1's table.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use super::{nil, GenBox, Generator, Step};
use crate::ctx::Ctx;
use crate::op::{FKind, Op, Process, ThreadId, Value};
use crate::test_handle::Test;

/// A not-yet-targeted invocation: an `f`/`value` pair waiting for a free
/// thread to be addressed to. Leaf generators (`once`, `seq`) build real
/// `Op`s from these by picking a free thread themselves (spec §4.2: "the
/// op's `:process` field if specified, otherwise the lowest-indexed free
/// thread" — here every leaf always fills in `:process` itself, using the
/// "lowest-indexed free thread" rule as its default).
#[derive(Clone, Debug)]
pub struct OpTemplate {
    pub f: FKind,
    pub value: Value,
}

impl OpTemplate {
    pub fn new(f: FKind, value: Value) -> OpTemplate {
        OpTemplate { f, value }
    }
}

fn rand_duration_up_to(test: &Test, max: Duration) -> Duration {
    if max.is_zero() {
        return Duration::ZERO;
    }
    let max_nanos = max.as_nanos().min(u64::MAX as u128) as u64;
    let nanos = test.with_rng(|r| r.gen_range(0..=max_nanos));
    Duration::from_nanos(nanos)
}

// ---------------------------------------------------------------------
// once / seq
// ---------------------------------------------------------------------

struct Once {
    template: Option<OpTemplate>,
}

impl Generator for Once {
    fn op(mut self: Box<Self>, _test: &Test, ctx: &Ctx) -> Step {
        let Some(template) = self.template.take() else {
            return Step::Done;
        };
        match ctx.pick_any_free_process() {
            Some(process) => {
                let op = Op::invoke(process, template.f, template.value);
                Step::Emit(op, nil())
            }
            None => {
                self.template = Some(template);
                Step::Pending(self)
            }
        }
    }

    fn update(self: Box<Self>, _test: &Test, _ctx: &Ctx, _event: &Op) -> GenBox {
        self
    }
}

/// Emits `op` exactly once.
pub fn once(f: FKind, value: Value) -> GenBox {
    Box::new(Once {
        template: Some(OpTemplate::new(f, value)),
    })
}

struct Seq {
    items: VecDeque<OpTemplate>,
}

impl Generator for Seq {
    fn op(mut self: Box<Self>, _test: &Test, ctx: &Ctx) -> Step {
        if self.items.is_empty() {
            return Step::Done;
        }
        match ctx.pick_any_free_process() {
            Some(process) => {
                let template = self.items.pop_front().expect("checked non-empty");
                Step::Emit(Op::invoke(process, template.f, template.value), self)
            }
            None => Step::Pending(self),
        }
    }

    fn update(self: Box<Self>, _test: &Test, _ctx: &Ctx, _event: &Op) -> GenBox {
        self
    }
}

/// Wraps a finite sequence of literal ops.
pub fn seq(items: Vec<OpTemplate>) -> GenBox {
    Box::new(Seq {
        items: items.into(),
    })
}

// ---------------------------------------------------------------------
// limit / time_limit
// ---------------------------------------------------------------------

struct Limit {
    remaining: u64,
    inner: GenBox,
}

impl Generator for Limit {
    fn op(self: Box<Self>, test: &Test, ctx: &Ctx) -> Step {
        let Limit { remaining, inner } = *self;
        if remaining == 0 {
            return Step::Done;
        }
        match inner.op(test, ctx) {
            Step::Emit(op, g2) => Step::Emit(
                op,
                Box::new(Limit {
                    remaining: remaining - 1,
                    inner: g2,
                }),
            ),
            Step::Pending(g2) => Step::Pending(Box::new(Limit { remaining, inner: g2 })),
            Step::Note(msg, g2) => Step::Note(msg, Box::new(Limit { remaining, inner: g2 })),
            Step::Done => Step::Done,
        }
    }

    fn update(self: Box<Self>, test: &Test, ctx: &Ctx, event: &Op) -> GenBox {
        let Limit { remaining, inner } = *self;
        Box::new(Limit {
            remaining,
            inner: inner.update(test, ctx, event),
        })
    }
}

/// Passes through at most the first `n` ops of `g`.
pub fn limit(n: u64, g: GenBox) -> GenBox {
    Box::new(Limit { remaining: n, inner: g })
}

struct TimeLimit {
    dt: Duration,
    deadline: Option<Duration>,
    inner: GenBox,
}

impl Generator for TimeLimit {
    fn op(self: Box<Self>, test: &Test, ctx: &Ctx) -> Step {
        let TimeLimit { dt, deadline, inner } = *self;
        let deadline = deadline.unwrap_or(ctx.time + dt);
        if ctx.time >= deadline {
            return Step::Done;
        }
        match inner.op(test, ctx) {
            Step::Emit(op, g2) => Step::Emit(
                op,
                Box::new(TimeLimit {
                    dt,
                    deadline: Some(deadline),
                    inner: g2,
                }),
            ),
            Step::Pending(g2) => Step::Pending(Box::new(TimeLimit {
                dt,
                deadline: Some(deadline),
                inner: g2,
            })),
            Step::Note(msg, g2) => Step::Note(
                msg,
                Box::new(TimeLimit {
                    dt,
                    deadline: Some(deadline),
                    inner: g2,
                }),
            ),
            Step::Done => Step::Done,
        }
    }

    fn update(self: Box<Self>, test: &Test, ctx: &Ctx, event: &Op) -> GenBox {
        let TimeLimit { dt, deadline, inner } = *self;
        Box::new(TimeLimit {
            dt,
            deadline,
            inner: inner.update(test, ctx, event),
        })
    }
}

/// Wraps `g`; returns `nil` once wall-logical-time since entry exceeds `dt`.
pub fn time_limit(dt: Duration, g: GenBox) -> GenBox {
    Box::new(TimeLimit {
        dt,
        deadline: None,
        inner: g,
    })
}

// ---------------------------------------------------------------------
// stagger / delay
// ---------------------------------------------------------------------

struct Stagger {
    dt: Duration,
    next_allowed: Option<Duration>,
    inner: GenBox,
}

impl Generator for Stagger {
    fn op(self: Box<Self>, test: &Test, ctx: &Ctx) -> Step {
        let Stagger { dt, next_allowed, inner } = *self;
        if let Some(next) = next_allowed {
            if ctx.time < next {
                return Step::Pending(Box::new(Stagger { dt, next_allowed, inner }));
            }
        }
        match inner.op(test, ctx) {
            Step::Emit(op, g2) => {
                let jitter = rand_duration_up_to(test, dt * 2);
                Step::Emit(
                    op,
                    Box::new(Stagger {
                        dt,
                        next_allowed: Some(ctx.time + jitter),
                        inner: g2,
                    }),
                )
            }
            Step::Pending(g2) => Step::Pending(Box::new(Stagger { dt, next_allowed, inner: g2 })),
            Step::Note(msg, g2) => {
                Step::Note(msg, Box::new(Stagger { dt, next_allowed, inner: g2 }))
            }
            Step::Done => Step::Done,
        }
    }

    fn update(self: Box<Self>, test: &Test, ctx: &Ctx, event: &Op) -> GenBox {
        let Stagger { dt, next_allowed, inner } = *self;
        Box::new(Stagger {
            dt,
            next_allowed,
            inner: inner.update(test, ctx, event),
        })
    }
}

/// Delays each op to at least `last_emit + rand(0, 2*dt)` (mean `dt`).
pub fn stagger(dt: Duration, g: GenBox) -> GenBox {
    Box::new(Stagger {
        dt,
        next_allowed: None,
        inner: g,
    })
}

struct Delay {
    dt: Duration,
    next_allowed: Option<Duration>,
    inner: GenBox,
}

impl Generator for Delay {
    fn op(self: Box<Self>, test: &Test, ctx: &Ctx) -> Step {
        let Delay { dt, next_allowed, inner } = *self;
        if let Some(next) = next_allowed {
            if ctx.time < next {
                return Step::Pending(Box::new(Delay { dt, next_allowed, inner }));
            }
        }
        match inner.op(test, ctx) {
            Step::Emit(op, g2) => Step::Emit(
                op,
                Box::new(Delay {
                    dt,
                    next_allowed: Some(ctx.time + dt),
                    inner: g2,
                }),
            ),
            Step::Pending(g2) => Step::Pending(Box::new(Delay { dt, next_allowed, inner: g2 })),
            Step::Note(msg, g2) => Step::Note(msg, Box::new(Delay { dt, next_allowed, inner: g2 })),
            Step::Done => Step::Done,
        }
    }

    fn update(self: Box<Self>, test: &Test, ctx: &Ctx, event: &Op) -> GenBox {
        let Delay { dt, next_allowed, inner } = *self;
        Box::new(Delay {
            dt,
            next_allowed,
            inner: inner.update(test, ctx, event),
        })
    }
}

/// Fixed inter-op delay.
pub fn delay(dt: Duration, g: GenBox) -> GenBox {
    Box::new(Delay {
        dt,
        next_allowed: None,
        inner: g,
    })
}

// ---------------------------------------------------------------------
// mix / concat / phases
// ---------------------------------------------------------------------

struct Mix {
    children: Vec<Option<GenBox>>,
}

impl Generator for Mix {
    fn op(self: Box<Self>, test: &Test, ctx: &Ctx) -> Step {
        let Mix { mut children } = *self;
        let mut order: Vec<usize> = (0..children.len()).filter(|&i| children[i].is_some()).collect();
        if order.is_empty() {
            return Step::Done;
        }
        // Fisher-Yates shuffle via the test's shared RNG (spec §4.1: "picks
        // one child uniformly per request").
        test.with_rng(|rng| {
            for i in (1..order.len()).rev() {
                let j = rng.gen_range(0..=i);
                order.swap(i, j);
            }
        });

        for idx in order {
            let child = children[idx].take().expect("index came from non-None filter");
            match child.op(test, ctx) {
                Step::Emit(op, g2) => {
                    children[idx] = Some(g2);
                    return Step::Emit(op, Box::new(Mix { children }));
                }
                Step::Note(msg, g2) => {
                    children[idx] = Some(g2);
                    return Step::Note(msg, Box::new(Mix { children }));
                }
                Step::Pending(g2) => {
                    children[idx] = Some(g2);
                }
                Step::Done => {
                    children[idx] = None;
                }
            }
        }

        if children.iter().any(Option::is_some) {
            Step::Pending(Box::new(Mix { children }))
        } else {
            Step::Done
        }
    }

    fn update(self: Box<Self>, test: &Test, ctx: &Ctx, event: &Op) -> GenBox {
        let Mix { children } = *self;
        let children = children
            .into_iter()
            .map(|c| c.map(|g| g.update(test, ctx, event)))
            .collect();
        Box::new(Mix { children })
    }
}

/// Picks one child uniformly per request.
pub fn mix(children: Vec<GenBox>) -> GenBox {
    Box::new(Mix {
        children: children.into_iter().map(Some).collect(),
    })
}

struct Concat {
    remaining: VecDeque<GenBox>,
}

impl Generator for Concat {
    fn op(self: Box<Self>, test: &Test, ctx: &Ctx) -> Step {
        let Concat { mut remaining } = *self;
        loop {
            let Some(front) = remaining.pop_front() else {
                return Step::Done;
            };
            match front.op(test, ctx) {
                Step::Emit(op, g2) => {
                    remaining.push_front(g2);
                    return Step::Emit(op, Box::new(Concat { remaining }));
                }
                Step::Note(msg, g2) => {
                    remaining.push_front(g2);
                    return Step::Note(msg, Box::new(Concat { remaining }));
                }
                Step::Pending(g2) => {
                    remaining.push_front(g2);
                    return Step::Pending(Box::new(Concat { remaining }));
                }
                Step::Done => continue,
            }
        }
    }

    fn update(self: Box<Self>, test: &Test, ctx: &Ctx, event: &Op) -> GenBox {
        let Concat { mut remaining } = *self;
        if let Some(front) = remaining.pop_front() {
            remaining.push_front(front.update(test, ctx, event));
        }
        Box::new(Concat { remaining })
    }
}

/// Advances to `g(i+1)` only when `g(i)` is exhausted.
pub fn concat(children: Vec<GenBox>) -> GenBox {
    Box::new(Concat {
        remaining: children.into(),
    })
}

struct Phases {
    current: Option<GenBox>,
    remaining: VecDeque<GenBox>,
    outstanding: HashSet<Process>,
}

impl Generator for Phases {
    fn op(mut self: Box<Self>, test: &Test, ctx: &Ctx) -> Step {
        loop {
            match self.current.take() {
                None => {
                    if !self.outstanding.is_empty() {
                        return Step::Pending(self);
                    }
                    match self.remaining.pop_front() {
                        Some(g) => {
                            self.current = Some(g);
                            continue;
                        }
                        None => return Step::Done,
                    }
                }
                Some(child) => match child.op(test, ctx) {
                    Step::Emit(op, g2) => {
                        self.outstanding.insert(op.process);
                        self.current = Some(g2);
                        return Step::Emit(op, self);
                    }
                    Step::Note(msg, g2) => {
                        self.current = Some(g2);
                        return Step::Note(msg, self);
                    }
                    Step::Pending(g2) => {
                        self.current = Some(g2);
                        return Step::Pending(self);
                    }
                    Step::Done => {
                        self.current = None;
                        continue;
                    }
                },
            }
        }
    }

    fn update(mut self: Box<Self>, test: &Test, ctx: &Ctx, event: &Op) -> GenBox {
        if event.is_completion() {
            self.outstanding.remove(&event.process);
        }
        if let Some(child) = self.current.take() {
            self.current = Some(child.update(test, ctx, event));
        }
        self
    }
}

/// `concat`, plus a barrier between phases: no phase `i+1` op is emitted
/// until every op drawn from phase `i` has completed.
pub fn phases(mut children: Vec<GenBox>) -> GenBox {
    if children.is_empty() {
        return nil();
    }
    let current = Some(children.remove(0));
    Box::new(Phases {
        current,
        remaining: children.into(),
        outstanding: HashSet::new(),
    })
}

// ---------------------------------------------------------------------
// on / clients / nemesis / reserve
// ---------------------------------------------------------------------

pub type Pred = Arc<dyn Fn(&Ctx, ThreadId) -> bool + Send + Sync>;

struct On {
    pred: Pred,
    inner: GenBox,
}

impl Generator for On {
    fn op(self: Box<Self>, test: &Test, ctx: &Ctx) -> Step {
        let On { pred, inner } = *self;
        let filtered: BTreeSet<ThreadId> = ctx
            .free_threads
            .iter()
            .copied()
            .filter(|&t| pred(ctx, t))
            .collect();
        let sub_ctx = ctx.restricted_to(filtered);
        match inner.op(test, &sub_ctx) {
            Step::Emit(op, g2) => Step::Emit(op, Box::new(On { pred, inner: g2 })),
            Step::Pending(g2) => Step::Pending(Box::new(On { pred, inner: g2 })),
            Step::Note(msg, g2) => Step::Note(msg, Box::new(On { pred, inner: g2 })),
            Step::Done => Step::Done,
        }
    }

    fn update(self: Box<Self>, test: &Test, ctx: &Ctx, event: &Op) -> GenBox {
        let On { pred, inner } = *self;
        Box::new(On {
            pred: pred.clone(),
            inner: inner.update(test, ctx, event),
        })
    }
}

/// Only emits to threads matching `pred`.
pub fn on(pred: Pred, g: GenBox) -> GenBox {
    Box::new(On { pred, inner: g })
}

/// `on(thread not in nemesis bank, g)`.
pub fn clients(g: GenBox) -> GenBox {
    on(Arc::new(|ctx: &Ctx, t: ThreadId| !ctx.is_nemesis_thread(t)), g)
}

/// `on(thread in nemesis bank, g)`.
pub fn nemesis(g: GenBox) -> GenBox {
    on(Arc::new(|ctx: &Ctx, t: ThreadId| ctx.is_nemesis_thread(t)), g)
}

fn split_threads(ctx: &Ctx, k: u32) -> (BTreeSet<ThreadId>, BTreeSet<ThreadId>) {
    let mut sorted: Vec<ThreadId> = ctx.workers.keys().copied().collect();
    sorted.sort_unstable();
    let reserved: BTreeSet<ThreadId> = sorted.into_iter().take(k as usize).collect();
    let for_g1 = ctx
        .free_threads
        .iter()
        .copied()
        .filter(|t| reserved.contains(t))
        .collect();
    let for_g2 = ctx
        .free_threads
        .iter()
        .copied()
        .filter(|t| !reserved.contains(t))
        .collect();
    (for_g1, for_g2)
}

struct Reserve {
    k: u32,
    g1: GenBox,
    g2: GenBox,
}

impl Generator for Reserve {
    fn op(self: Box<Self>, test: &Test, ctx: &Ctx) -> Step {
        let Reserve { k, g1, g2 } = *self;
        let (free1, free2) = split_threads(ctx, k);
        let ctx1 = ctx.restricted_to(free1);
        match g1.op(test, &ctx1) {
            Step::Emit(op, g1b) => Step::Emit(op, Box::new(Reserve { k, g1: g1b, g2 })),
            Step::Note(msg, g1b) => Step::Note(msg, Box::new(Reserve { k, g1: g1b, g2 })),
            Step::Pending(g1b) => {
                let ctx2 = ctx.restricted_to(free2);
                match g2.op(test, &ctx2) {
                    Step::Emit(op, g2b) => Step::Emit(op, Box::new(Reserve { k, g1: g1b, g2: g2b })),
                    Step::Note(msg, g2b) => Step::Note(msg, Box::new(Reserve { k, g1: g1b, g2: g2b })),
                    Step::Pending(g2b) => Step::Pending(Box::new(Reserve { k, g1: g1b, g2: g2b })),
                    Step::Done => Step::Pending(Box::new(Reserve { k, g1: g1b, g2: nil() })),
                }
            }
            Step::Done => {
                let ctx2 = ctx.restricted_to(free2);
                match g2.op(test, &ctx2) {
                    Step::Emit(op, g2b) => Step::Emit(op, Box::new(Reserve { k, g1: nil(), g2: g2b })),
                    Step::Note(msg, g2b) => Step::Note(msg, Box::new(Reserve { k, g1: nil(), g2: g2b })),
                    Step::Pending(g2b) => Step::Pending(Box::new(Reserve { k, g1: nil(), g2: g2b })),
                    Step::Done => Step::Done,
                }
            }
        }
    }

    fn update(self: Box<Self>, test: &Test, ctx: &Ctx, event: &Op) -> GenBox {
        let Reserve { k, g1, g2 } = *self;
        Box::new(Reserve {
            k,
            g1: g1.update(test, ctx, event),
            g2: g2.update(test, ctx, event),
        })
    }
}

/// Reserves the first `k` threads (by thread id) for `g1`; the rest run `g2`.
pub fn reserve(k: u32, g1: GenBox, g2: GenBox) -> GenBox {
    Box::new(Reserve { k, g1, g2 })
}

// ---------------------------------------------------------------------
// each_thread
// ---------------------------------------------------------------------

struct EachThread {
    factory: Arc<dyn Fn() -> GenBox + Send + Sync>,
    states: HashMap<ThreadId, Option<GenBox>>,
}

impl Generator for EachThread {
    fn op(mut self: Box<Self>, test: &Test, ctx: &Ctx) -> Step {
        let free: Vec<ThreadId> = ctx.free_threads.iter().copied().collect();
        for t in free {
            let slot = self.states.remove(&t).unwrap_or_else(|| Some((self.factory)()));
            match slot {
                None => {
                    self.states.insert(t, None);
                    continue;
                }
                Some(g) => {
                    let sub_ctx = ctx.restricted_to(BTreeSet::from([t]));
                    match g.op(test, &sub_ctx) {
                        Step::Emit(op, g2) => {
                            self.states.insert(t, Some(g2));
                            return Step::Emit(op, self);
                        }
                        Step::Note(msg, g2) => {
                            self.states.insert(t, Some(g2));
                            return Step::Note(msg, self);
                        }
                        Step::Pending(g2) => {
                            self.states.insert(t, Some(g2));
                        }
                        Step::Done => {
                            self.states.insert(t, None);
                        }
                    }
                }
            }
        }

        let all_exhausted = ctx
            .workers
            .keys()
            .all(|t| matches!(self.states.get(t), Some(None)));
        if all_exhausted {
            Step::Done
        } else {
            Step::Pending(self)
        }
    }

    fn update(mut self: Box<Self>, test: &Test, ctx: &Ctx, event: &Op) -> GenBox {
        if let Some((&t, _)) = ctx.workers.iter().find(|(_, p)| **p == event.process) {
            if let Some(entry) = self.states.remove(&t) {
                self.states.insert(t, entry.map(|g| g.update(test, ctx, event)));
            }
        }
        self
    }
}

/// Emits a fresh child generator `g` per thread; each thread runs it
/// independently.
pub fn each_thread(factory: Arc<dyn Fn() -> GenBox + Send + Sync>) -> GenBox {
    Box::new(EachThread {
        factory,
        states: HashMap::new(),
    })
}

// ---------------------------------------------------------------------
// synchronize / sleep / log
// ---------------------------------------------------------------------

struct Synchronize;

impl Generator for Synchronize {
    fn op(self: Box<Self>, _test: &Test, ctx: &Ctx) -> Step {
        if ctx.free_threads.len() == ctx.workers.len() {
            Step::Done
        } else {
            Step::Pending(self)
        }
    }

    fn update(self: Box<Self>, _test: &Test, _ctx: &Ctx, _event: &Op) -> GenBox {
        self
    }
}

/// Waits until all active threads become free, then exhausts.
pub fn synchronize() -> GenBox {
    Box::new(Synchronize)
}

struct Sleep {
    dt: Duration,
    until: Option<Duration>,
}

impl Generator for Sleep {
    fn op(self: Box<Self>, _test: &Test, ctx: &Ctx) -> Step {
        let until = self.until.unwrap_or(ctx.time + self.dt);
        if ctx.time >= until {
            Step::Done
        } else {
            Step::Pending(Box::new(Sleep {
                dt: self.dt,
                until: Some(until),
            }))
        }
    }

    fn update(self: Box<Self>, _test: &Test, _ctx: &Ctx, _event: &Op) -> GenBox {
        self
    }
}

/// Returns `:pending` until `dt` has elapsed; then exhausts.
pub fn sleep(dt: Duration) -> GenBox {
    Box::new(Sleep { dt, until: None })
}

struct Log {
    message: Option<String>,
}

impl Generator for Log {
    fn op(mut self: Box<Self>, _test: &Test, _ctx: &Ctx) -> Step {
        match self.message.take() {
            Some(message) => Step::Note(message, nil()),
            None => Step::Done,
        }
    }

    fn update(self: Box<Self>, _test: &Test, _ctx: &Ctx, _event: &Op) -> GenBox {
        self
    }
}

/// Emits no op; produces a side-effect entry in the history on first call.
pub fn log(message: impl Into<String>) -> GenBox {
    Box::new(Log {
        message: Some(message.into()),
    })
}
