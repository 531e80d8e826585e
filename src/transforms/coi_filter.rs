//! # Cone-of-Influence Argument Filter
//!
//! Removes predicate arguments whose values cannot influence the output
//! predicates. Argument reachability is computed bottom-up and top-down;
//! the intersection is the cone of influence. Predicates with dead
//! positions are replaced by fresh `slice` predicates of smaller arity,
//! and every rule is rewritten to the sliced vocabulary.
//!
//! The pass registers a model converter that maps a model over the sliced
//! predicates back to the source predicates, leaving the erased argument
//! positions free.

use super::RuleTransformer;
use crate::dataflow::reachability::{ArgReachability, ArgReachabilityCtx};
use crate::dataflow::DataflowEngine;
use crate::model::{FuncInterp, Model, ModelConverter};
use crate::rules::{fix_unbound_vars, Atom, PredId, Rule, RuleSet, SymbolStore};
use crate::term::{SortId, TermStore};
use std::collections::BTreeMap;
use tracing::debug;

/// The filter pass. One instance is good for one `transform` call.
#[derive(Default)]
pub struct CoiArgFilter {
    converter: Option<Box<dyn ModelConverter>>,
}

impl CoiArgFilter {
    pub fn new() -> Self {
        CoiArgFilter::default()
    }
}

impl RuleTransformer for CoiArgFilter {
    fn name(&self) -> &'static str {
        "coi-arg-filter"
    }

    fn transform(
        &mut self,
        store: &mut TermStore,
        syms: &mut SymbolStore,
        source: &RuleSet,
    ) -> RuleSet {
        // Forward reachability, then backward seeded with the forward
        // result, then the pointwise intersection.
        let facts = {
            let mut up =
                DataflowEngine::<ArgReachability>::new(ArgReachabilityCtx::new(), store, syms, source);
            up.run_bottom_up();
            let prev: BTreeMap<PredId, ArgReachability> =
                up.facts().map(|(p, f)| (p, f.clone())).collect();
            let mut down = DataflowEngine::<ArgReachability>::new(
                ArgReachabilityCtx::with_previous(prev),
                store,
                syms,
                source,
            );
            down.run_top_down();
            up.intersect(&down);
            debug!("argument COI:\n{}", up.dump());
            up.into_facts()
        };

        let mut replacements: BTreeMap<PredId, PredId> = BTreeMap::new();
        let null = ArgReachability::default();
        let mut result = RuleSet::new();
        let mut domains: BTreeMap<PredId, Vec<SortId>> = BTreeMap::new();

        for rule in source.iter() {
            let head_fact = facts.get(&rule.head.pred).unwrap_or(&null);
            let new_head = replace_atom(syms, &mut replacements, &rule.head, head_fact);
            let mut changed = new_head.is_some();
            let new_head = new_head.unwrap_or_else(|| rule.head.clone());

            let mut new_positive = Vec::with_capacity(rule.positive_tail().len());
            for atom in rule.positive_tail() {
                let fact = facts.get(&atom.pred).unwrap_or(&null);
                match replace_atom(syms, &mut replacements, atom, fact) {
                    Some(replaced) => {
                        changed = true;
                        new_positive.push(replaced);
                    }
                    None => new_positive.push(atom.clone()),
                }
            }
            let mut new_negative = Vec::with_capacity(rule.negative_tail().len());
            for atom in rule.negative_tail() {
                let fact = facts.get(&atom.pred).unwrap_or(&null);
                match replace_atom(syms, &mut replacements, atom, fact) {
                    Some(replaced) => {
                        changed = true;
                        new_negative.push(replaced);
                    }
                    None => new_negative.push(atom.clone()),
                }
            }

            if changed {
                // Flatten the positive interpreted conjunction, then drop
                // conjuncts whose variables lost their binding site.
                let mut conjs = Vec::new();
                let mut negated = Vec::new();
                for &(t, neg) in rule.interpreted_tail() {
                    if neg {
                        negated.push((t, true));
                    } else {
                        crate::rules::flatten_conjunction(store, t, &mut conjs);
                    }
                }
                let tail_refs: Vec<(&Atom, bool)> = new_positive
                    .iter()
                    .map(|a| (a, false))
                    .chain(new_negative.iter().map(|a| (a, true)))
                    .collect();
                fix_unbound_vars(store, &new_head, &tail_refs, &mut conjs);
                let mut interpreted: Vec<_> = conjs.into_iter().map(|t| (t, false)).collect();
                interpreted.extend(negated);
                result.add_rule(Rule::new(new_head, new_positive, new_negative, interpreted));
            } else {
                result.add_rule(rule.clone());
            }
        }

        // Output registration: replaced predicates carry their status over.
        let mut preds = source.predicates_in_order();
        for out in source.output_predicates() {
            if !preds.contains(&out) {
                preds.push(out);
            }
        }
        for pred in preds {
            let target = replacements.get(&pred).copied().unwrap_or(pred);
            result.inherit_predicate(source, pred, target);
        }
        result.close();

        for &orig in replacements.keys() {
            domains.insert(orig, syms.symbol(orig).domain.clone());
        }
        self.converter = Some(Box::new(SliceModelConverter {
            entries: replacements
                .iter()
                .map(|(&orig, &slice)| SliceEntry {
                    orig,
                    slice,
                    domain: domains[&orig].clone(),
                    reachable: facts.get(&orig).cloned().unwrap_or_default(),
                })
                .collect(),
        }));

        result
    }

    fn take_model_converter(&mut self) -> Option<Box<dyn ModelConverter>> {
        self.converter.take()
    }
}

/// Rewrite an atom to its sliced predicate, if one applies. Returns `None`
/// when every position is reachable (the atom is reused as is).
fn replace_atom(
    syms: &mut SymbolStore,
    replacements: &mut BTreeMap<PredId, PredId>,
    atom: &Atom,
    fact: &ArgReachability,
) -> Option<Atom> {
    if fact.all_reachable() {
        return None;
    }
    let slice = match replacements.get(&atom.pred) {
        Some(&s) => s,
        None => {
            let domain: Vec<SortId> = syms
                .symbol(atom.pred)
                .domain
                .iter()
                .enumerate()
                .filter(|(i, _)| fact.is_reachable(*i))
                .map(|(_, &s)| s)
                .collect();
            let slice = syms.fresh(atom.pred, "slice", domain);
            replacements.insert(atom.pred, slice);
            slice
        }
    };
    let args: Vec<_> = atom
        .args
        .iter()
        .enumerate()
        .filter(|(i, _)| fact.is_reachable(*i))
        .map(|(_, &a)| a)
        .collect();
    Some(syms.atom(slice, args))
}

struct SliceEntry {
    orig: PredId,
    slice: PredId,
    domain: Vec<SortId>,
    reachable: ArgReachability,
}

/// Lifts a model over sliced predicates back to the original vocabulary:
/// kept positions take the stored entry arguments, dropped positions are
/// left free as variables of the original sort.
struct SliceModelConverter {
    entries: Vec<SliceEntry>,
}

impl ModelConverter for SliceModelConverter {
    fn convert(&self, store: &mut TermStore, model: &mut Model) {
        let mut converted = Model::new();
        for entry in &self.entries {
            let orig_arity = entry.domain.len();
            let mut old_fi = FuncInterp::new(orig_arity);
            if entry.reachable.count_reachable() == 0 {
                // Fully sliced away: the slice predicate is an arity-0
                // constant and the original is free everywhere.
                if let Some(value) = model.const_interp(entry.slice) {
                    old_fi.set_else(value);
                    converted.register_func(entry.orig, old_fi);
                }
                continue;
            }
            let Some(new_fi) = model.func_interp(entry.slice) else {
                debug!(slice = entry.slice.0, "slice predicate has no interpretation");
                continue;
            };
            if let Some(els) = new_fi.else_value() {
                old_fi.set_else(els);
            }
            for point in new_fi.entries() {
                let mut args = Vec::with_capacity(orig_arity);
                let mut kept = 0;
                for k in 0..orig_arity {
                    if entry.reachable.is_reachable(k) {
                        args.push(point.args[kept]);
                        kept += 1;
                    } else {
                        args.push(store.var(k as u32, entry.domain[k]));
                    }
                }
                old_fi.insert_entry(args, point.result);
            }
            converted.register_func(entry.orig, old_fi);
        }
        // Constants and functions untouched by the pass copy through.
        let sliced: Vec<PredId> = self.entries.iter().map(|e| e.slice).collect();
        for (pred, value) in model.consts() {
            if !sliced.contains(&pred) {
                converted.register_const(pred, value);
            }
        }
        for (pred, interp) in model.funcs() {
            if !sliced.contains(&pred) {
                converted.register_func(pred, interp.clone());
            }
        }
        *model = converted;
    }
}
