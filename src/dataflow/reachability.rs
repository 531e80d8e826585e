//! # Argument Reachability Domain
//!
//! Tracks, per predicate, which argument positions carry information that
//! can influence the analysis result: a bitmap of length equal to the
//! predicate's arity.
//!
//! Bottom-up, a head position is reachable when it is instantiated with a
//! non-variable, when its variable occurs in the interpreted tail, when the
//! variable is repeated in the head (an implicit equality), or when the
//! variable sits in a reachable position of a positive tail atom.
//!
//! Top-down, all output positions are reachable, and reachability flows
//! from head positions to tail positions through variables - including
//! variables connected indirectly through interpreted constraints, which is
//! what the [`TaintTracer`] union-find computes. Given `x = y, b = x + 1`
//! and reachable `{b}`, the tracer concludes `{b, x, y}` are reachable.

use super::{FactDomain, FactSetter, TailFacts, TailWriter};
use crate::rules::{PredId, Rule, RuleSet, SymbolStore};
use crate::term::TermStore;
use fixedbitset::FixedBitSet;
use std::collections::{BTreeMap, BTreeSet};

/// Union-find over variable indices with a distinguished "reachable" class.
#[derive(Debug, Default)]
pub struct TaintTracer {
    parent: Vec<u32>,
    reachable_root: Option<u32>,
}

impl TaintTracer {
    pub fn new() -> Self {
        TaintTracer::default()
    }

    pub fn reset(&mut self) {
        self.parent.clear();
        self.reachable_root = None;
    }

    fn ensure(&mut self, idx: u32) {
        while self.parent.len() <= idx as usize {
            self.parent.push(self.parent.len() as u32);
        }
    }

    fn find(&mut self, idx: u32) -> u32 {
        self.ensure(idx);
        let mut root = idx;
        while self.parent[root as usize] != root {
            root = self.parent[root as usize];
        }
        // Path compression.
        let mut cur = idx;
        while self.parent[cur as usize] != root {
            let next = self.parent[cur as usize];
            self.parent[cur as usize] = root;
            cur = next;
        }
        root
    }

    fn merge(&mut self, a: u32, b: u32) -> u32 {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return ra;
        }
        self.parent[rb as usize] = ra;
        if self.reachable_root == Some(rb) {
            self.reachable_root = Some(ra);
        }
        ra
    }

    /// Union `idx` into the reachable class.
    pub fn set_reachable(&mut self, idx: u32) {
        match self.reachable_root {
            None => self.reachable_root = Some(self.find(idx)),
            Some(root) => self.reachable_root = Some(self.merge(root, idx)),
        }
    }

    /// Union all variables occurring in `term` into a single class.
    pub fn process(&mut self, store: &TermStore, term: crate::term::TermId) {
        let mut class_root: Option<u32> = None;
        for idx in store.vars(term) {
            class_root = Some(match class_root {
                None => self.find(idx),
                Some(root) => self.merge(root, idx),
            });
        }
    }

    pub fn is_reachable(&mut self, idx: u32) -> bool {
        match self.reachable_root {
            Some(root) => self.find(idx) == root,
            None => false,
        }
    }
}

/// Analysis context for [`ArgReachability`]. `prev` carries the bottom-up
/// result into a subsequent top-down run, which consults it to skip
/// variables already known to be unconstrained.
#[derive(Debug, Default)]
pub struct ArgReachabilityCtx {
    pub prev: Option<BTreeMap<PredId, ArgReachability>>,
    tracer: TaintTracer,
}

impl ArgReachabilityCtx {
    pub fn new() -> Self {
        ArgReachabilityCtx::default()
    }

    pub fn with_previous(prev: BTreeMap<PredId, ArgReachability>) -> Self {
        ArgReachabilityCtx {
            prev: Some(prev),
            tracer: TaintTracer::new(),
        }
    }

    fn prev_reachable(&self, pred: PredId, pos: usize) -> bool {
        match &self.prev {
            // Without a previous round every variable is assumed constrained.
            None => true,
            Some(facts) => facts.get(&pred).is_some_and(|f| f.is_reachable(pos)),
        }
    }
}

/// Per-predicate reachability bitmap. The zero-length bitset is the null
/// fact ("no information yet"); once constructed for a predicate the
/// length equals its arity and only ever gains bits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgReachability {
    reachable: FixedBitSet,
}

impl ArgReachability {
    pub fn is_reachable(&self, idx: usize) -> bool {
        self.reachable.contains(idx)
    }

    pub fn any_reachable(&self) -> bool {
        self.reachable.count_ones(..) > 0
    }

    /// True for the null fact as well: nothing is known to be dead.
    pub fn all_reachable(&self) -> bool {
        self.reachable.count_ones(..) == self.reachable.len()
    }

    pub fn count_reachable(&self) -> usize {
        self.reachable.count_ones(..)
    }

    pub fn len(&self) -> usize {
        self.reachable.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reachable.len() == 0
    }

    fn mark(&mut self, idx: usize) -> bool {
        if self.reachable.contains(idx) {
            false
        } else {
            self.reachable.insert(idx);
            true
        }
    }

    /// Shared head marking for `init_up` / `propagate_up`: non-variable
    /// arguments and variables from `reachable_vars` become reachable.
    fn mark_head(
        &mut self,
        store: &TermStore,
        rule: &Rule,
        reachable_vars: &BTreeSet<u32>,
    ) -> bool {
        let mut new_info = false;
        for (i, &arg) in rule.head.args.iter().enumerate() {
            if self.reachable.contains(i) {
                continue;
            }
            match store.as_var(arg) {
                Some((idx, _)) => {
                    if reachable_vars.contains(&idx) {
                        self.reachable.insert(i);
                        new_info = true;
                    }
                }
                None => {
                    self.reachable.insert(i);
                    new_info = true;
                }
            }
        }
        new_info
    }
}

impl FactDomain for ArgReachability {
    type Ctx = ArgReachabilityCtx;

    fn initial(_store: &TermStore, syms: &SymbolStore, pred: PredId) -> Self {
        ArgReachability {
            reachable: FixedBitSet::with_capacity(syms.arity(pred)),
        }
    }

    fn init_up(&mut self, _ctx: &mut Self::Ctx, store: &TermStore, rule: &Rule) -> bool {
        // Every variable of the interpreted tail is reachable.
        let mut reachable_vars = BTreeSet::new();
        for &(t, _) in rule.interpreted_tail() {
            store.collect_vars(t, &mut reachable_vars);
        }
        // A variable repeated in the head is an implicit equality.
        let mut seen = BTreeSet::new();
        for &arg in &rule.head.args {
            if let Some((idx, _)) = store.as_var(arg) {
                if !seen.insert(idx) {
                    reachable_vars.insert(idx);
                }
            }
        }
        self.mark_head(store, rule, &reachable_vars)
    }

    fn propagate_up(
        &mut self,
        _ctx: &mut Self::Ctx,
        store: &TermStore,
        rule: &Rule,
        tail: TailFacts<'_, Self>,
    ) -> bool {
        // Variables sitting in reachable positions of positive tail atoms
        // taint every head occurrence of the same variable.
        let mut reachable_vars = BTreeSet::new();
        for i in 0..rule.positive_tail_size() {
            let atom = rule.uninterpreted_atom(i);
            let info = tail.get(i);
            for (j, &arg) in atom.args.iter().enumerate() {
                if info.is_reachable(j) {
                    store.collect_vars(arg, &mut reachable_vars);
                }
            }
        }
        self.mark_head(store, rule, &reachable_vars)
    }

    fn init_down(
        ctx: &mut Self::Ctx,
        store: &TermStore,
        rules: &RuleSet,
        setter: &mut FactSetter<'_, Self>,
    ) {
        // Output predicates are observable in full.
        for sym in rules.output_predicates() {
            let fact = setter.get(sym);
            let len = fact.reachable.len();
            fact.reachable.insert_range(..len);
            setter.set_changed(sym);
        }
        for rule in rules.iter() {
            // Interpreted-tail variables are constrained, hence reachable.
            let mut reachable_vars = BTreeSet::new();
            for &(t, _) in rule.interpreted_tail() {
                store.collect_vars(t, &mut reachable_vars);
            }
            // A variable occurring more than once across the uninterpreted
            // tail introduces an implicit equality, but only occurrences in
            // positions the previous (bottom-up) round considers reachable
            // count - unconstrained positions cannot observe the equality.
            let mut seen = BTreeSet::new();
            for atom in rule.uninterpreted_tail() {
                for (j, &arg) in atom.args.iter().enumerate() {
                    if let Some((idx, _)) = store.as_var(arg) {
                        if ctx.prev_reachable(atom.pred, j) && !seen.insert(idx) {
                            reachable_vars.insert(idx);
                        }
                    }
                }
            }
            // Mark tail positions holding non-variables or reachable vars.
            for atom in rule.uninterpreted_tail() {
                let fact = setter.get(atom.pred);
                let mut change = false;
                for (j, &arg) in atom.args.iter().enumerate() {
                    match store.as_var(arg) {
                        Some((idx, _)) => {
                            if reachable_vars.contains(&idx) {
                                change |= fact.mark(j);
                            }
                        }
                        None => change |= fact.mark(j),
                    }
                }
                if change {
                    setter.set_changed(atom.pred);
                }
            }
        }
    }

    fn propagate_down(
        &self,
        ctx: &mut Self::Ctx,
        store: &TermStore,
        rule: &Rule,
        writer: &mut TailWriter<'_, Self>,
    ) {
        let tracer = &mut ctx.tracer;
        tracer.reset();
        if !self.is_empty() {
            for (i, &arg) in rule.head.args.iter().enumerate() {
                if let Some((idx, _)) = store.as_var(arg) {
                    if self.reachable.contains(i) {
                        tracer.set_reachable(idx);
                    }
                }
            }
        }
        // Variables co-occurring inside one interpreted conjunct depend on
        // each other; merging them spreads reachability across the class.
        for &(t, _) in rule.interpreted_tail() {
            tracer.process(store, t);
        }
        for i in 0..rule.uninterpreted_tail_size() {
            let atom = rule.uninterpreted_atom(i);
            let fact = writer.get(i);
            let mut changed = false;
            for (j, &arg) in atom.args.iter().enumerate() {
                if fact.reachable.contains(j) {
                    continue;
                }
                match store.as_var(arg) {
                    Some((idx, _)) => {
                        if tracer.is_reachable(idx) {
                            fact.reachable.insert(j);
                            changed = true;
                        }
                    }
                    None => {
                        fact.reachable.insert(j);
                        changed = true;
                    }
                }
            }
            if changed {
                writer.set_changed(i);
            }
        }
    }

    fn join(&mut self, _ctx: &mut Self::Ctx, other: &Self) {
        if other.reachable.len() == 0 {
            return;
        }
        if self.reachable.len() < other.reachable.len() {
            self.reachable.grow(other.reachable.len());
        }
        for i in other.reachable.ones() {
            self.reachable.insert(i);
        }
    }

    fn intersect(&mut self, _ctx: &mut Self::Ctx, other: &Self) {
        if other.reachable.len() == 0 {
            // Intersection with the null fact clears everything.
            self.reachable.clear();
            return;
        }
        let dropped: Vec<usize> = self
            .reachable
            .ones()
            .filter(|&i| !other.reachable.contains(i))
            .collect();
        for i in dropped {
            self.reachable.set(i, false);
        }
    }

    fn dump(&self, _store: &TermStore, out: &mut String) {
        out.push('[');
        for i in 0..self.reachable.len() {
            out.push(if self.reachable.contains(i) { '+' } else { '-' });
        }
        out.push(']');
    }
}
