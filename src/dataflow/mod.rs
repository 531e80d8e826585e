//! # Generic Dataflow Engine
//!
//! A monotone fixpoint engine over per-predicate facts, generic in the
//! abstract domain. Domains implement [`FactDomain`]; the engine never
//! looks inside a fact. Two propagation modes are supported:
//!
//! - **bottom-up**: seed every rule with [`FactDomain::init_up`], then
//!   re-propagate rules whose positive tail mentions a changed predicate
//!   until nothing grows;
//! - **top-down**: seed from the output predicates with
//!   [`FactDomain::init_down`], then push head facts into tail facts with
//!   [`FactDomain::propagate_down`].
//!
//! The worklist is a pair of buckets with an active index: a step drains
//! the active bucket while changes accumulate in the other, then the
//! buckets swap. Termination relies on each domain forming a finite-height
//! lattice per predicate and reporting `changed` only on strict growth.
//!
//! ```text
//! RuleSet ──run_bottom_up/run_top_down──▶ facts: PredId → F
//!                    │
//!          join / intersect (pointwise)
//! ```

use crate::rules::{PredId, Rule, RuleSet, SymbolStore};
use crate::term::TermStore;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

pub mod reachability;
pub mod tuple_set;

/// Abstract domain plugged into the [`DataflowEngine`].
///
/// `Default::default()` must be the null/bottom fact: the value a predicate
/// has before anything was derived about it.
pub trait FactDomain: Clone + Default {
    /// Per-engine analysis context: configuration and scratch space.
    type Ctx;

    /// The initial (bottom) fact for a specific predicate.
    fn initial(store: &TermStore, syms: &SymbolStore, pred: PredId) -> Self;

    /// Bottom-up seeding from a single rule with this fact's predicate as
    /// head. Returns true if the fact grew.
    fn init_up(&mut self, ctx: &mut Self::Ctx, store: &TermStore, rule: &Rule) -> bool;

    /// Top-down seeding over the whole rule set. The domain decides which
    /// predicates to seed (typically the outputs) and marks them changed.
    fn init_down(
        ctx: &mut Self::Ctx,
        store: &TermStore,
        rules: &RuleSet,
        setter: &mut FactSetter<'_, Self>,
    );

    /// Recompute this head fact from the rule's tail facts. Returns true if
    /// the fact grew.
    fn propagate_up(
        &mut self,
        ctx: &mut Self::Ctx,
        store: &TermStore,
        rule: &Rule,
        tail: TailFacts<'_, Self>,
    ) -> bool;

    /// Push information from this head fact into the rule's tail facts,
    /// marking changed tails through the writer.
    fn propagate_down(
        &self,
        ctx: &mut Self::Ctx,
        store: &TermStore,
        rule: &Rule,
        writer: &mut TailWriter<'_, Self>,
    );

    /// Pointwise least upper bound.
    fn join(&mut self, ctx: &mut Self::Ctx, other: &Self);

    /// Pointwise intersection.
    fn intersect(&mut self, ctx: &mut Self::Ctx, other: &Self);

    /// One-line textual rendering for the engine dump.
    fn dump(&self, store: &TermStore, out: &mut String);
}

/// Read-only view of the tail facts of one rule, indexed like the rule's
/// uninterpreted tail. Missing facts read as the null fact.
pub struct TailFacts<'a, F: FactDomain> {
    facts: &'a BTreeMap<PredId, F>,
    rule: &'a Rule,
    null: F,
}

impl<'a, F: FactDomain> TailFacts<'a, F> {
    pub fn get(&self, idx: usize) -> &F {
        self.facts
            .get(&self.rule.uninterpreted_atom(idx).pred)
            .unwrap_or(&self.null)
    }

    pub fn len(&self) -> usize {
        self.rule.uninterpreted_tail_size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Mutable access to the fact store during top-down seeding. Writes insert
/// the per-predicate initial fact on first touch; `set_changed` enqueues
/// the predicate into the bucket this setter was configured for.
pub struct FactSetter<'a, F: FactDomain> {
    facts: &'a mut BTreeMap<PredId, F>,
    todo: &'a mut BTreeSet<PredId>,
    store: &'a TermStore,
    syms: &'a SymbolStore,
}

impl<'a, F: FactDomain> FactSetter<'a, F> {
    pub fn get(&mut self, pred: PredId) -> &mut F {
        let (store, syms) = (self.store, self.syms);
        self.facts
            .entry(pred)
            .or_insert_with(|| F::initial(store, syms, pred))
    }

    pub fn set_changed(&mut self, pred: PredId) {
        self.todo.insert(pred);
    }
}

/// [`FactSetter`] addressed by tail position of a fixed rule.
pub struct TailWriter<'a, F: FactDomain> {
    setter: FactSetter<'a, F>,
    rule: &'a Rule,
}

impl<'a, F: FactDomain> TailWriter<'a, F> {
    pub fn get(&mut self, idx: usize) -> &mut F {
        let pred = self.rule.uninterpreted_atom(idx).pred;
        self.setter.get(pred)
    }

    pub fn set_changed(&mut self, idx: usize) {
        let pred = self.rule.uninterpreted_atom(idx).pred;
        self.setter.set_changed(pred);
    }

    pub fn len(&self) -> usize {
        self.rule.uninterpreted_tail_size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The fixpoint engine. One instance owns one fact store; the rule set,
/// term store and symbol store are shared read-only.
pub struct DataflowEngine<'a, F: FactDomain> {
    rules: &'a RuleSet,
    store: &'a TermStore,
    syms: &'a SymbolStore,
    ctx: F::Ctx,
    facts: BTreeMap<PredId, F>,
    todo: [BTreeSet<PredId>; 2],
    active: usize,
    body2rules: BTreeMap<PredId, Vec<usize>>,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'a, F: FactDomain> DataflowEngine<'a, F> {
    pub fn new(
        ctx: F::Ctx,
        store: &'a TermStore,
        syms: &'a SymbolStore,
        rules: &'a RuleSet,
    ) -> Self {
        DataflowEngine {
            rules,
            store,
            syms,
            ctx,
            facts: BTreeMap::new(),
            todo: [BTreeSet::new(), BTreeSet::new()],
            active: 0,
            body2rules: BTreeMap::new(),
            cancel: None,
        }
    }

    /// Install a cooperative cancellation flag, checked between waves.
    pub fn set_cancel_flag(&mut self, flag: Arc<AtomicBool>) {
        self.cancel = Some(flag);
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|f| f.load(Ordering::Relaxed))
    }

    pub fn ctx(&self) -> &F::Ctx {
        &self.ctx
    }

    fn init_bottom_up(&mut self) {
        let (rules, store, syms) = (self.rules, self.store, self.syms);
        self.body2rules.clear();
        for (i, rule) in rules.iter().enumerate() {
            for atom in rule.positive_tail() {
                self.body2rules.entry(atom.pred).or_default().push(i);
            }
            let head = rule.head.pred;
            let mut fact = self
                .facts
                .remove(&head)
                .unwrap_or_else(|| F::initial(store, syms, head));
            let changed = fact.init_up(&mut self.ctx, store, rule);
            self.facts.insert(head, fact);
            if changed {
                self.todo[self.active].insert(head);
            }
        }
    }

    fn step_bottom_up(&mut self) {
        let (rules, store, syms) = (self.rules, self.store, self.syms);
        let wave = std::mem::take(&mut self.todo[self.active]);
        let next = 1 - self.active;
        let mut next_bucket = std::mem::take(&mut self.todo[next]);
        for sym in wave {
            let Some(rule_ids) = self.body2rules.get(&sym) else {
                continue;
            };
            for &ri in rule_ids {
                let rule = rules.get(ri);
                let head = rule.head.pred;
                let mut fact = self
                    .facts
                    .get(&head)
                    .cloned()
                    .unwrap_or_else(|| F::initial(store, syms, head));
                let tail = TailFacts {
                    facts: &self.facts,
                    rule,
                    null: F::default(),
                };
                let changed = fact.propagate_up(&mut self.ctx, store, rule, tail);
                self.facts.insert(head, fact);
                if changed {
                    trace!(pred = syms.name(head), "fact grew, re-enqueueing");
                    next_bucket.insert(head);
                }
            }
        }
        self.todo[next] = next_bucket;
        self.active = next;
    }

    fn init_top_down(&mut self) {
        let (rules, store, syms) = (self.rules, self.store, self.syms);
        let mut setter = FactSetter {
            facts: &mut self.facts,
            todo: &mut self.todo[self.active],
            store,
            syms,
        };
        F::init_down(&mut self.ctx, store, rules, &mut setter);
    }

    fn step_top_down(&mut self) {
        let (rules, store, syms) = (self.rules, self.store, self.syms);
        let wave = std::mem::take(&mut self.todo[self.active]);
        let next = 1 - self.active;
        let mut next_bucket = std::mem::take(&mut self.todo[next]);
        for sym in wave {
            // Snapshot: the fact map is written underneath propagate_down.
            let head_fact = self.facts.get(&sym).cloned().unwrap_or_default();
            for rule in rules.rules_for(sym) {
                let mut writer = TailWriter {
                    setter: FactSetter {
                        facts: &mut self.facts,
                        todo: &mut next_bucket,
                        store,
                        syms,
                    },
                    rule,
                };
                head_fact.propagate_down(&mut self.ctx, store, rule, &mut writer);
            }
        }
        self.todo[next] = next_bucket;
        self.active = next;
    }

    fn done(&self) -> bool {
        self.todo[self.active].is_empty()
    }

    /// Run the bottom-up analysis to fixpoint.
    pub fn run_bottom_up(&mut self) {
        debug!(rules = self.rules.len(), "bottom-up analysis starting");
        self.init_bottom_up();
        let mut waves = 0usize;
        while !self.done() && !self.cancelled() {
            self.step_bottom_up();
            waves += 1;
        }
        debug!(waves, facts = self.facts.len(), "bottom-up analysis done");
    }

    /// Run the top-down analysis to fixpoint.
    pub fn run_top_down(&mut self) {
        debug!(rules = self.rules.len(), "top-down analysis starting");
        self.init_top_down();
        let mut waves = 0usize;
        while !self.done() && !self.cancelled() {
            self.step_top_down();
            waves += 1;
        }
        debug!(waves, facts = self.facts.len(), "top-down analysis done");
    }

    /// The fact for `pred`, if any was derived.
    pub fn get_fact(&self, pred: PredId) -> Option<&F> {
        self.facts.get(&pred)
    }

    pub fn facts(&self) -> impl Iterator<Item = (PredId, &F)> {
        self.facts.iter().map(|(&p, f)| (p, f))
    }

    /// Detach the fact store from the engine.
    pub fn into_facts(self) -> BTreeMap<PredId, F> {
        self.facts
    }

    /// Pointwise join with another engine's facts.
    pub fn join(&mut self, other: &DataflowEngine<'_, F>) {
        for (&pred, fact) in &other.facts {
            match self.facts.get_mut(&pred) {
                Some(mine) => mine.join(&mut self.ctx, fact),
                None => {
                    self.facts.insert(pred, fact.clone());
                }
            }
        }
    }

    /// Pointwise intersection; predicates absent from `other` are removed.
    pub fn intersect(&mut self, other: &DataflowEngine<'_, F>) {
        let mut to_delete = Vec::new();
        for (&pred, fact) in &mut self.facts {
            match other.facts.get(&pred) {
                Some(theirs) => fact.intersect(&mut self.ctx, theirs),
                None => to_delete.push(pred),
            }
        }
        for pred in to_delete {
            self.facts.remove(&pred);
        }
    }

    /// One line per predicate occurring in the rule set: `name -> <fact>`.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let null = F::default();
        for pred in self.rules.predicates_in_order() {
            out.push_str(self.syms.name(pred));
            out.push_str(" -> ");
            self.facts
                .get(&pred)
                .unwrap_or(&null)
                .dump(self.store, &mut out);
            out.push('\n');
        }
        out
    }
}
