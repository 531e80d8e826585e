//! # Rule Exploder
//!
//! Specializes rules by case-splitting over the tuple-set analysis: a
//! predicate whose tracked columns range over finitely many value rows is
//! cloned once per row (`p_expl0`, `p_expl1`, ...), each clone of reduced
//! arity, and every rule is cloned once per consistent combination of row
//! choices for its head and positive tail atoms.
//!
//! Negative literals over exploded predicates need care: when the bounded
//! arguments are fully determined the literal either resolves to a single
//! clone or is vacuously true and dropped; otherwise a fresh auxiliary
//! `neg` predicate enumerates the compatible rows. When many clones are
//! expected (`threshold > 1`), tail literals independent of the case split
//! are factored into one shared `common` predicate so they are not copied
//! into every clone.

use super::RuleTransformer;
use crate::dataflow::tuple_set::{TupleSet, TupleSetCtx};
use crate::dataflow::DataflowEngine;
use crate::rules::{Atom, PredId, Rule, RuleSet, SymbolStore};
use crate::term::{SortId, TermId, TermStore};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, trace};

/// The exploder pass. `threshold` is forwarded as the tuple-set cutoff;
/// values above one additionally enable common-tail factoring.
pub struct RuleExploder {
    threshold: usize,
}

impl RuleExploder {
    pub fn new(threshold: usize) -> Self {
        assert!(threshold > 0, "exploder threshold must be positive");
        RuleExploder { threshold }
    }
}

impl Default for RuleExploder {
    fn default() -> Self {
        RuleExploder::new(1)
    }
}

impl RuleTransformer for RuleExploder {
    fn name(&self) -> &'static str {
        "rule-exploder"
    }

    fn transform(
        &mut self,
        store: &mut TermStore,
        syms: &mut SymbolStore,
        source: &RuleSet,
    ) -> RuleSet {
        let facts = {
            let mut up = DataflowEngine::<TupleSet>::new(
                TupleSetCtx::new(self.threshold),
                store,
                syms,
                source,
            );
            up.run_bottom_up();
            let mut down = DataflowEngine::<TupleSet>::new(
                TupleSetCtx::new(self.threshold),
                store,
                syms,
                source,
            );
            down.run_top_down();
            up.intersect(&down);
            up.into_facts()
        };

        let mut target = RuleSet::new();

        // One specialized symbol per (predicate, row); the row index is the
        // position in the mapping vector.
        let mut mappings: BTreeMap<PredId, Vec<PredId>> = BTreeMap::new();
        for (&pred, fact) in &facts {
            if fact.num_cols() == 0 {
                continue;
            }
            let domain: Vec<SortId> = syms
                .symbol(pred)
                .domain
                .iter()
                .enumerate()
                .filter(|(i, _)| fact.tracked_column(*i as u32).is_none())
                .map(|(_, &s)| s)
                .collect();
            let mut clones = Vec::with_capacity(fact.num_rows());
            for _ in 0..fact.num_rows() {
                clones.push(syms.fresh(pred, "expl", domain.clone()));
            }
            debug!(pred = syms.name(pred), clones = clones.len(), "exploding predicate");
            mappings.insert(pred, clones);
        }

        // Output registration: every clone of an output is an output.
        let mut preds = source.predicates_in_order();
        for out in source.output_predicates() {
            if !preds.contains(&out) {
                preds.push(out);
            }
        }
        for pred in preds {
            match mappings.get(&pred) {
                Some(clones) => {
                    for &clone in clones {
                        target.inherit_predicate(source, pred, clone);
                    }
                }
                None => target.inherit_predicate(source, pred, pred),
            }
        }

        let null = TupleSet::default();
        let mut state = ExploderState {
            store,
            syms,
            facts: &facts,
            mappings: &mappings,
            threshold: self.threshold,
            neg_cache: HashMap::new(),
            null: &null,
        };
        for rule in source.iter() {
            state.translate_rule(rule, &mut target);
        }
        target.close();
        target
    }
}

struct ExploderState<'a> {
    store: &'a mut TermStore,
    syms: &'a mut SymbolStore,
    facts: &'a BTreeMap<PredId, TupleSet>,
    mappings: &'a BTreeMap<PredId, Vec<PredId>>,
    threshold: usize,
    /// Auxiliary negation predicates, keyed by the exploded predicate and
    /// the pattern of determined tracked-column values (`None` = free).
    neg_cache: HashMap<(PredId, Vec<Option<TermId>>), PredId>,
    null: &'a TupleSet,
}

/// The factored-out rule-independent part of one source rule.
struct CommonTail {
    call: Atom,
    rule: Rule,
    excluded_negative: BTreeSet<usize>,
    excluded_interpreted: BTreeSet<usize>,
}

impl<'a> ExploderState<'a> {
    fn fact(&self, pred: PredId) -> &'a TupleSet {
        self.facts.get(&pred).unwrap_or(self.null)
    }

    fn translate_rule(&mut self, rule: &Rule, target: &mut RuleSet) {
        let psz = rule.positive_tail_size();
        let mappings = self.mappings;
        // Slot 0 is the head, slots 1..=psz the positive tail atoms.
        let slot_atom = |slot: usize| -> &Atom {
            if slot == 0 {
                &rule.head
            } else {
                rule.uninterpreted_atom(slot - 1)
            }
        };
        let slot_facts: Vec<&'a TupleSet> =
            (0..=psz).map(|s| self.fact(slot_atom(s).pred)).collect();
        let slot_clones: Vec<Option<&'a Vec<PredId>>> = (0..=psz)
            .map(|s| mappings.get(&slot_atom(s).pred))
            .collect();

        // Variables sitting in a bounded column of the head or a positive
        // tail atom: exactly the variables the case split can bind.
        let mut bound_vars: BTreeSet<u32> = BTreeSet::new();
        for slot in 0..=psz {
            if slot_clones[slot].is_none() {
                continue;
            }
            let atom = slot_atom(slot);
            for &col in slot_facts[slot].columns() {
                if let Some((idx, _)) = self.store.as_var(atom.args[col as usize]) {
                    bound_vars.insert(idx);
                }
            }
        }

        let any_negative_replaced = rule
            .negative_tail()
            .iter()
            .any(|a| self.mappings.contains_key(&a.pred));
        let no_replacement =
            slot_clones.iter().all(|c| c.is_none()) && !any_negative_replaced;
        if no_replacement {
            target.add_rule(rule.clone());
            return;
        }

        let common = if self.threshold > 1 {
            self.create_common_tail(rule, &bound_vars)
        } else {
            None
        };
        let empty = BTreeSet::new();
        let (excluded_neg, excluded_interp) = match &common {
            Some(c) => (&c.excluded_negative, &c.excluded_interpreted),
            None => (&empty, &empty),
        };
        let mut common_rule = common.as_ref().map(|c| c.rule.clone());

        let num_vars = rule
            .vars(self.store)
            .into_iter()
            .max()
            .map_or(0, |v| v as usize + 1);
        let mut iters = vec![0usize; psz + 1];
        loop {
            let mut bindings: Vec<Option<TermId>> = vec![None; num_vars];
            let mut feasible = true;
            'slots: for slot in 0..=psz {
                if slot_clones[slot].is_none() {
                    continue;
                }
                let fact = slot_facts[slot];
                if fact.num_rows() == 0 && fact.num_cols() != 0 {
                    feasible = false;
                    break;
                }
                let atom = slot_atom(slot);
                let row = fact.row(iters[slot]);
                for (j, &col) in fact.columns().iter().enumerate() {
                    let arg = atom.args[col as usize];
                    let inst = row[j];
                    match self.store.as_var(arg) {
                        Some((idx, _)) => {
                            let slot_binding = &mut bindings[idx as usize];
                            match slot_binding {
                                None => *slot_binding = Some(inst),
                                Some(bound) if *bound != inst => {
                                    feasible = false;
                                    break 'slots;
                                }
                                Some(_) => {}
                            }
                        }
                        None => {
                            if arg != inst {
                                feasible = false;
                                break 'slots;
                            }
                        }
                    }
                }
            }

            if feasible {
                if let Some(new_rule) = self.make_clone(
                    rule,
                    &slot_facts,
                    &slot_clones,
                    &iters,
                    &bindings,
                    common.as_ref().map(|c| c.call.clone()),
                    excluded_neg,
                    excluded_interp,
                    target,
                ) {
                    if let Some(cr) = common_rule.take() {
                        target.add_rule(cr);
                    }
                    target.add_rule(new_rule);
                }
            }

            // Ripple-carry increment across the per-slot row counters.
            let mut valid = false;
            for (slot, counter) in iters.iter_mut().enumerate() {
                *counter += 1;
                if *counter >= slot_facts[slot].num_rows() {
                    *counter = 0;
                } else {
                    valid = true;
                    break;
                }
            }
            if !valid {
                break;
            }
        }
    }

    /// Materialize one specialized clone; `None` when an interpreted
    /// literal proves the combination infeasible.
    #[allow(clippy::too_many_arguments)]
    fn make_clone(
        &mut self,
        rule: &Rule,
        slot_facts: &[&TupleSet],
        slot_clones: &[Option<&Vec<PredId>>],
        iters: &[usize],
        bindings: &[Option<TermId>],
        common_call: Option<Atom>,
        excluded_neg: &BTreeSet<usize>,
        excluded_interp: &BTreeSet<usize>,
        target: &mut RuleSet,
    ) -> Option<Rule> {
        let psz = rule.positive_tail_size();
        let mut new_positive = Vec::with_capacity(psz + 1);
        if let Some(call) = common_call {
            new_positive.push(call);
        }
        let mut new_head = None;
        for slot in 0..=psz {
            let atom = if slot == 0 {
                &rule.head
            } else {
                rule.uninterpreted_atom(slot - 1)
            };
            let fact = slot_facts[slot];
            let replaced = slot_clones[slot].is_some();
            let mut new_args = Vec::with_capacity(atom.args.len());
            for (j, &arg) in atom.args.iter().enumerate() {
                if replaced && fact.tracked_column(j as u32).is_some() {
                    continue;
                }
                new_args.push(self.store.substitute(arg, bindings));
            }
            let new_atom = match slot_clones[slot] {
                Some(clones) => self.syms.atom(clones[iters[slot]], new_args),
                None => self.syms.atom(atom.pred, new_args),
            };
            if slot == 0 {
                new_head = Some(new_atom);
            } else {
                new_positive.push(new_atom);
            }
        }

        let mut new_negative = Vec::new();
        for (ni, atom) in rule.negative_tail().iter().enumerate() {
            if excluded_neg.contains(&ni) {
                continue;
            }
            let inst: Vec<TermId> = atom
                .args
                .iter()
                .map(|&a| self.store.substitute(a, bindings))
                .collect();
            match self.negation_replacement(atom.pred, inst, target) {
                Some(replaced) => new_negative.push(replaced),
                // No matching row: the negated literal holds vacuously.
                None => trace!(pred = self.syms.name(atom.pred), "negative literal dropped"),
            }
        }

        let mut new_interpreted = Vec::new();
        for (ii, &(t, neg)) in rule.interpreted_tail().iter().enumerate() {
            if excluded_interp.contains(&ii) {
                continue;
            }
            let substituted = self.store.substitute(t, bindings);
            let simplified = self.store.simplify(substituted);
            if self.store.is_false(simplified) {
                if !neg {
                    return None;
                }
                // A negated falsehood holds; drop it.
            } else if self.store.is_true(simplified) {
                if neg {
                    return None;
                }
            } else {
                new_interpreted.push((simplified, neg));
            }
        }

        Some(Rule::new(
            new_head.expect("head slot always produces an atom"),
            new_positive,
            new_negative,
            new_interpreted,
        ))
    }

    /// Replacement for a negative literal `!pred(inst)` over an exploded
    /// predicate. `None` means the literal is vacuously true.
    fn negation_replacement(
        &mut self,
        pred: PredId,
        inst: Vec<TermId>,
        target: &mut RuleSet,
    ) -> Option<Atom> {
        let fact = self.fact(pred);
        if fact.num_cols() == 0 {
            return Some(self.syms.atom(pred, inst));
        }
        let mappings = self.mappings;
        let clones: &'a [PredId] = &mappings[&pred];

        let all_determined = fact
            .columns()
            .iter()
            .all(|&c| !self.store.is_var(inst[c as usize]));
        if all_determined {
            for r in 0..fact.num_rows() {
                let matches = fact
                    .columns()
                    .iter()
                    .enumerate()
                    .all(|(j, &c)| fact.row(r)[j] == inst[c as usize]);
                if matches {
                    let args: Vec<TermId> = inst
                        .iter()
                        .enumerate()
                        .filter(|(i, _)| fact.tracked_column(*i as u32).is_none())
                        .map(|(_, &a)| a)
                        .collect();
                    return Some(self.syms.atom(clones[r], args));
                }
            }
            return None;
        }

        // Partially determined: synthesize (or reuse) an auxiliary
        // predicate enumerating the compatible rows.
        let pattern: Vec<Option<TermId>> = fact
            .columns()
            .iter()
            .map(|&c| {
                let arg = inst[c as usize];
                if self.store.is_var(arg) {
                    None
                } else {
                    Some(arg)
                }
            })
            .collect();
        let key = (pred, pattern.clone());
        let aux = match self.neg_cache.get(&key) {
            Some(&aux) => aux,
            None => {
                let aux = self.build_negation_aux(pred, fact, clones, &pattern, target);
                self.neg_cache.insert(key, aux);
                aux
            }
        };
        // The call keeps free tracked positions and untracked positions.
        let args: Vec<TermId> = inst
            .iter()
            .enumerate()
            .filter(|(i, arg)| {
                fact.tracked_column(*i as u32).is_none() || self.store.is_var(**arg)
            })
            .map(|(_, &a)| a)
            .collect();
        Some(self.syms.atom(aux, args))
    }

    /// Define the auxiliary predicate for a partially determined negation:
    /// one forwarding rule per tuple-set row compatible with the pattern.
    fn build_negation_aux(
        &mut self,
        pred: PredId,
        fact: &TupleSet,
        clones: &[PredId],
        pattern: &[Option<TermId>],
        target: &mut RuleSet,
    ) -> PredId {
        let arity = self.syms.arity(pred);
        let orig_domain = self.syms.symbol(pred).domain.clone();
        let tracked: BTreeMap<u32, usize> = fact
            .columns()
            .iter()
            .enumerate()
            .map(|(j, &c)| (c, j))
            .collect();
        // Aux domain: untracked positions plus tracked positions the call
        // leaves free; forwarding variables cover the untracked positions.
        let mut domain = Vec::new();
        let mut var_domain = Vec::new();
        for (i, &sort) in orig_domain.iter().enumerate() {
            match tracked.get(&(i as u32)) {
                Some(&j) => {
                    if pattern[j].is_none() {
                        domain.push(sort);
                    }
                }
                None => {
                    domain.push(sort);
                    var_domain.push(sort);
                }
            }
        }
        let aux = self.syms.fresh(pred, "neg", domain);
        let vars: Vec<TermId> = var_domain
            .iter()
            .enumerate()
            .map(|(i, &s)| self.store.var(i as u32, s))
            .collect();
        for r in 0..fact.num_rows() {
            let mut head_args = Vec::new();
            let mut body_args = Vec::new();
            let mut vidx = 0;
            let mut compatible = true;
            for i in 0..arity {
                match tracked.get(&(i as u32)) {
                    Some(&j) => match pattern[j] {
                        None => head_args.push(fact.row(r)[j]),
                        Some(value) => {
                            if value != fact.row(r)[j] {
                                compatible = false;
                                break;
                            }
                        }
                    },
                    None => {
                        head_args.push(vars[vidx]);
                        body_args.push(vars[vidx]);
                        vidx += 1;
                    }
                }
            }
            if compatible {
                let head = self.syms.atom(aux, head_args);
                let body = self.syms.atom(clones[r], body_args);
                target.add_rule(Rule::new(head, vec![body], Vec::new(), Vec::new()));
            }
        }
        aux
    }

    /// Factor the negative and interpreted tail literals untouched by the
    /// case split into a single fresh predicate, so clones share them
    /// instead of copying them. Negative literals over exploded predicates
    /// stay put: they go through the negation replacement instead.
    fn create_common_tail(&mut self, rule: &Rule, bound_vars: &BTreeSet<u32>) -> Option<CommonTail> {
        let mut excluded_negative = BTreeSet::new();
        let mut excluded_interpreted = BTreeSet::new();
        let mut common_negative = Vec::new();
        let mut common_interpreted = Vec::new();
        let mut call_vars: BTreeMap<u32, SortId> = BTreeMap::new();

        for (ni, atom) in rule.negative_tail().iter().enumerate() {
            if self.mappings.contains_key(&atom.pred) {
                continue;
            }
            let mut vars = BTreeMap::new();
            for &a in &atom.args {
                self.store.collect_vars_with_sorts(a, &mut vars);
            }
            if vars.keys().any(|v| bound_vars.contains(v)) {
                continue;
            }
            for (v, s) in vars {
                call_vars.entry(v).or_insert(s);
            }
            excluded_negative.insert(ni);
            common_negative.push(atom.clone());
        }
        for (ii, &(t, neg)) in rule.interpreted_tail().iter().enumerate() {
            let mut vars = BTreeMap::new();
            self.store.collect_vars_with_sorts(t, &mut vars);
            if vars.keys().any(|v| bound_vars.contains(v)) {
                continue;
            }
            for (v, s) in vars {
                call_vars.entry(v).or_insert(s);
            }
            excluded_interpreted.insert(ii);
            common_interpreted.push((t, neg));
        }

        if common_negative.is_empty() && common_interpreted.is_empty() {
            return None;
        }

        let domain: Vec<SortId> = call_vars.values().copied().collect();
        let common_sym = self.syms.fresh(rule.head.pred, "common", domain);
        let args: Vec<TermId> = call_vars
            .iter()
            .map(|(&v, &s)| self.store.var(v, s))
            .collect();
        let call = self.syms.atom(common_sym, args.clone());
        let head = self.syms.atom(common_sym, args);
        let rule = Rule::new(head, Vec::new(), common_negative, common_interpreted);
        debug!(pred = self.syms.name(common_sym), "factored common tail");
        Some(CommonTail {
            call,
            rule,
            excluded_negative,
            excluded_interpreted,
        })
    }
}
