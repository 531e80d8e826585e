//! # Predicate Symbols, Rules and Rule Sets
//!
//! The rule container the analyses and transformations operate on. A
//! [`Rule`] is a head atom plus a tail split into three contiguous regions:
//! positive uninterpreted atoms, negative uninterpreted atoms, and
//! interpreted formulas (with a per-position negation flag). A [`RuleSet`]
//! keeps rules in insertion order, groups them by head predicate once
//! [`RuleSet::close`] has been called, and carries the set of *output
//! predicates* that seed every top-down analysis.
//!
//! Predicate symbols are owned by a [`SymbolStore`]; transformations mint
//! fresh specialized symbols (`reach_slice`, `p_expl0`, ...) through
//! [`SymbolStore::fresh`].

use crate::term::{SortId, TermId, TermStore};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Write as _;
use tracing::debug;

/// Stable handle to a predicate symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PredId(pub(crate) u32);

/// A predicate symbol: name plus per-position sorts.
#[derive(Debug, Clone)]
pub struct PredicateSymbol {
    pub name: String,
    pub domain: Vec<SortId>,
}

impl PredicateSymbol {
    pub fn arity(&self) -> usize {
        self.domain.len()
    }
}

/// Owning registry of predicate symbols.
#[derive(Debug, Default)]
pub struct SymbolStore {
    preds: Vec<PredicateSymbol>,
    by_name: HashMap<String, PredId>,
}

impl SymbolStore {
    pub fn new() -> Self {
        SymbolStore::default()
    }

    /// Register a predicate. Re-registering an existing name returns the
    /// existing handle; the domain must match.
    pub fn add(&mut self, name: &str, domain: Vec<SortId>) -> PredId {
        if let Some(&id) = self.by_name.get(name) {
            debug_assert_eq!(self.preds[id.0 as usize].domain, domain);
            return id;
        }
        let id = PredId(self.preds.len() as u32);
        self.preds.push(PredicateSymbol {
            name: name.to_string(),
            domain,
        });
        self.by_name.insert(name.to_string(), id);
        id
    }

    /// Mint a fresh symbol derived from `base`, tagged with the pass that
    /// created it. The first candidate is `<base>_<tag>`; a numeric suffix
    /// disambiguates if that name is taken.
    pub fn fresh(&mut self, base: PredId, tag: &str, domain: Vec<SortId>) -> PredId {
        let base_name = self.preds[base.0 as usize].name.clone();
        let mut candidate = format!("{}_{}", base_name, tag);
        let mut n = 0u32;
        while self.by_name.contains_key(&candidate) {
            candidate = format!("{}_{}{}", base_name, tag, n);
            n += 1;
        }
        self.add(&candidate, domain)
    }

    pub fn symbol(&self, id: PredId) -> &PredicateSymbol {
        &self.preds[id.0 as usize]
    }

    pub fn arity(&self, id: PredId) -> usize {
        self.preds[id.0 as usize].arity()
    }

    pub fn name(&self, id: PredId) -> &str {
        &self.preds[id.0 as usize].name
    }

    pub fn lookup(&self, name: &str) -> Option<PredId> {
        self.by_name.get(name).copied()
    }

    /// Build an atom, checking the arity in debug builds.
    pub fn atom(&self, pred: PredId, args: Vec<TermId>) -> Atom {
        debug_assert_eq!(
            self.arity(pred),
            args.len(),
            "arity mismatch for {}",
            self.name(pred)
        );
        Atom { pred, args }
    }
}

/// An uninterpreted predicate application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Atom {
    pub pred: PredId,
    pub args: Vec<TermId>,
}

impl Atom {
    pub fn arity(&self) -> usize {
        self.args.len()
    }

    pub fn vars(&self, store: &TermStore) -> BTreeSet<u32> {
        let mut acc = BTreeSet::new();
        for &a in &self.args {
            store.collect_vars(a, &mut acc);
        }
        acc
    }
}

/// A single rule. Tail regions keep the order positive, negative,
/// interpreted; the uninterpreted tail is the concatenation of the first
/// two and is what `uninterpreted_atom` indexes into.
#[derive(Debug, Clone)]
pub struct Rule {
    pub head: Atom,
    positive: Vec<Atom>,
    negative: Vec<Atom>,
    interpreted: Vec<(TermId, bool)>,
}

impl Rule {
    pub fn new(
        head: Atom,
        positive: Vec<Atom>,
        negative: Vec<Atom>,
        interpreted: Vec<(TermId, bool)>,
    ) -> Self {
        Rule {
            head,
            positive,
            negative,
            interpreted,
        }
    }

    /// A rule with an empty tail (a fact).
    pub fn fact(head: Atom) -> Self {
        Rule::new(head, Vec::new(), Vec::new(), Vec::new())
    }

    pub fn positive_tail(&self) -> &[Atom] {
        &self.positive
    }

    pub fn negative_tail(&self) -> &[Atom] {
        &self.negative
    }

    /// Interpreted tail formulas with their negation flags.
    pub fn interpreted_tail(&self) -> &[(TermId, bool)] {
        &self.interpreted
    }

    pub fn positive_tail_size(&self) -> usize {
        self.positive.len()
    }

    pub fn uninterpreted_tail_size(&self) -> usize {
        self.positive.len() + self.negative.len()
    }

    /// Index into the uninterpreted tail, positives first.
    pub fn uninterpreted_atom(&self, idx: usize) -> &Atom {
        if idx < self.positive.len() {
            &self.positive[idx]
        } else {
            &self.negative[idx - self.positive.len()]
        }
    }

    pub fn is_negative(&self, idx: usize) -> bool {
        idx >= self.positive.len()
    }

    pub fn uninterpreted_tail(&self) -> impl Iterator<Item = &Atom> {
        self.positive.iter().chain(self.negative.iter())
    }

    /// All variable indices occurring anywhere in the rule.
    pub fn vars(&self, store: &TermStore) -> BTreeSet<u32> {
        let mut acc = self.head.vars(store);
        for atom in self.uninterpreted_tail() {
            for &a in &atom.args {
                store.collect_vars(a, &mut acc);
            }
        }
        for &(t, _) in &self.interpreted {
            store.collect_vars(t, &mut acc);
        }
        acc
    }

    /// Render the rule in source syntax, for dumps and logs.
    pub fn display(&self, store: &TermStore, syms: &SymbolStore) -> String {
        let mut out = String::new();
        write_atom(&mut out, &self.head, store, syms);
        let tail_len = self.uninterpreted_tail_size() + self.interpreted.len();
        if tail_len > 0 {
            out.push_str(" :- ");
            let mut first = true;
            for (i, atom) in self.uninterpreted_tail().enumerate() {
                if !first {
                    out.push_str(", ");
                }
                first = false;
                if self.is_negative(i) {
                    out.push('!');
                }
                write_atom(&mut out, atom, store, syms);
            }
            for &(t, neg) in &self.interpreted {
                if !first {
                    out.push_str(", ");
                }
                first = false;
                if neg {
                    let _ = write!(out, "!({})", store.display(t));
                } else {
                    let _ = write!(out, "{}", store.display(t));
                }
            }
        }
        out.push('.');
        out
    }
}

fn write_atom(out: &mut String, atom: &Atom, store: &TermStore, syms: &SymbolStore) {
    out.push_str(syms.name(atom.pred));
    if !atom.args.is_empty() {
        out.push('(');
        for (i, &a) in atom.args.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let _ = write!(out, "{}", store.display(a));
        }
        out.push(')');
    }
}

/// Insertion-ordered rule container with head grouping and output tracking.
#[derive(Debug, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
    by_head: BTreeMap<PredId, Vec<usize>>,
    outputs: BTreeSet<PredId>,
    closed: bool,
}

impl RuleSet {
    pub fn new() -> Self {
        RuleSet::default()
    }

    pub fn add_rule(&mut self, rule: Rule) {
        assert!(!self.closed, "rule set is sealed");
        self.rules.push(rule);
    }

    /// Seal the set: build the head grouping. Mutation afterwards is a bug.
    pub fn close(&mut self) {
        self.by_head.clear();
        for (i, rule) in self.rules.iter().enumerate() {
            self.by_head.entry(rule.head.pred).or_default().push(i);
        }
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Rule> {
        self.rules.iter()
    }

    pub fn get(&self, idx: usize) -> &Rule {
        &self.rules[idx]
    }

    /// Rules whose head is `pred`, in insertion order. Empty for predicates
    /// with no defining rules.
    pub fn rules_for(&self, pred: PredId) -> impl Iterator<Item = &Rule> {
        debug_assert!(self.closed, "rule set must be closed before grouping queries");
        self.by_head
            .get(&pred)
            .into_iter()
            .flat_map(|v| v.iter())
            .map(|&i| &self.rules[i])
    }

    /// Head predicates that have at least one rule, grouped.
    pub fn heads(&self) -> impl Iterator<Item = PredId> + '_ {
        debug_assert!(self.closed, "rule set must be closed before grouping queries");
        self.by_head.keys().copied()
    }

    pub fn set_output(&mut self, pred: PredId) {
        self.outputs.insert(pred);
    }

    pub fn is_output(&self, pred: PredId) -> bool {
        self.outputs.contains(&pred)
    }

    pub fn output_predicates(&self) -> impl Iterator<Item = PredId> + '_ {
        self.outputs.iter().copied()
    }

    /// Carry the output status of `orig` in `source` over to `new` in this
    /// set. Called once per original predicate by every transformation.
    pub fn inherit_predicate(&mut self, source: &RuleSet, orig: PredId, new: PredId) {
        if source.is_output(orig) {
            self.outputs.insert(new);
        }
    }

    /// Every predicate occurring in the set, head before its tail, rules in
    /// insertion order, without duplicates. This is the dump order.
    pub fn predicates_in_order(&self) -> Vec<PredId> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for rule in &self.rules {
            if seen.insert(rule.head.pred) {
                out.push(rule.head.pred);
            }
            for atom in rule.uninterpreted_tail() {
                if seen.insert(atom.pred) {
                    out.push(atom.pred);
                }
            }
        }
        out
    }

    pub fn display(&self, store: &TermStore, syms: &SymbolStore) -> String {
        let mut out = String::new();
        for rule in &self.rules {
            if self.is_output(rule.head.pred) {
                out.push_str("[O] ");
            }
            out.push_str(&rule.display(store, syms));
            out.push('\n');
        }
        out
    }
}

/// Split a conjunction into its conjuncts, recursively.
pub fn flatten_conjunction(store: &TermStore, term: TermId, out: &mut Vec<TermId>) {
    if let crate::term::Term::App {
        op: crate::term::Op::And,
        args,
    } = store.term(term)
    {
        for &a in args {
            flatten_conjunction(store, a, out);
        }
    } else {
        out.push(term);
    }
}

/// After a rewrite changed the head or uninterpreted tail, interpreted
/// conjuncts can reference variables that no longer have a binding site.
/// Such conjuncts constrain values the transformed program no longer
/// observes, so they are dropped; the rest pass through unchanged.
pub fn fix_unbound_vars(
    store: &TermStore,
    head: &Atom,
    tail: &[(&Atom, bool)],
    conjuncts: &mut Vec<TermId>,
) {
    let mut bound = head.vars(store);
    for (atom, _) in tail {
        for &a in &atom.args {
            store.collect_vars(a, &mut bound);
        }
    }
    conjuncts.retain(|&c| {
        let keep = store.vars(c).is_subset(&bound);
        if !keep {
            debug!(term = %store.display(c), "dropping interpreted conjunct with unbound variable");
        }
        keep
    });
}
