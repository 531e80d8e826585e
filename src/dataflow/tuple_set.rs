//! # Tuple Set Domain
//!
//! Represents, for each predicate, a bounded relation over a subset of its
//! argument positions: which combinations of values the tracked columns can
//! take. Bottom-up the rows are derived values; top-down they are query
//! tuples. Only ground values ever appear in rows.
//!
//! Precision degrades monotonically by *deleting columns*: a column is
//! dropped as soon as one derivation cannot determine it, and [`prune`]
//! drops the column with the most distinct values whenever the row count
//! exceeds the configured cutoff. A fact with no tracked columns is fully
//! abstracted; `has_tuples` then still distinguishes "nothing derived yet"
//! from "the unit tuple is present".
//!
//! [`prune`]: TupleSet::prune

use super::{FactDomain, FactSetter, TailFacts, TailWriter};
use crate::rules::{PredId, Rule, RuleSet, SymbolStore};
use crate::term::{Op, Term, TermId, TermStore};
use std::collections::HashSet;
use tracing::trace;

/// Context for the tuple-set analysis: the prune bound.
#[derive(Debug, Clone)]
pub struct TupleSetCtx {
    pub cutoff: usize,
}

impl TupleSetCtx {
    pub fn new(cutoff: usize) -> Self {
        assert!(cutoff > 0, "tuple-set cutoff must be positive");
        TupleSetCtx { cutoff }
    }
}

impl Default for TupleSetCtx {
    fn default() -> Self {
        TupleSetCtx { cutoff: 5 }
    }
}

/// The per-predicate fact. See the module docs for the interpretation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TupleSet {
    pred: Option<PredId>,
    /// Tracked argument positions, strictly increasing.
    columns: Vec<u32>,
    /// Row-major matrix, `columns.len() * num_rows` ground values.
    rows: Vec<TermId>,
    num_rows: usize,
    has_tuples: bool,
}

impl TupleSet {
    pub fn num_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn columns(&self) -> &[u32] {
        &self.columns
    }

    pub fn has_tuples(&self) -> bool {
        self.has_tuples
    }

    pub fn row(&self, r: usize) -> &[TermId] {
        let n = self.columns.len();
        &self.rows[r * n..(r + 1) * n]
    }

    /// If argument position `idx` is tracked, its column index.
    pub fn tracked_column(&self, idx: u32) -> Option<usize> {
        self.columns.binary_search(&idx).ok()
    }

    fn delete_column(&mut self, col: usize) {
        let ncols = self.columns.len();
        debug_assert!(col < ncols);
        debug_assert_eq!(self.rows.len(), ncols * self.num_rows);
        self.columns.remove(col);
        let mut packed = Vec::with_capacity((ncols - 1) * self.num_rows);
        for r in 0..self.num_rows {
            for c in 0..ncols {
                if c != col {
                    packed.push(self.rows[r * ncols + c]);
                }
            }
        }
        self.rows = packed;
    }

    fn remove_duplicates(&mut self) {
        let ncols = self.columns.len();
        if ncols == 0 {
            // All remaining rows are the zero-width row.
            self.num_rows = self.num_rows.min(1);
            self.rows.clear();
            return;
        }
        if self.num_rows <= 1 {
            return;
        }
        let mut seen: HashSet<Vec<TermId>> = HashSet::new();
        let mut packed = Vec::with_capacity(self.rows.len());
        let mut kept = 0;
        for r in 0..self.num_rows {
            let row = &self.rows[r * ncols..(r + 1) * ncols];
            if seen.insert(row.to_vec()) {
                packed.extend_from_slice(row);
                kept += 1;
            }
        }
        self.rows = packed;
        self.num_rows = kept;
    }

    /// Insert a row unless present. With no tracked columns the zero-width
    /// row is represented by `has_tuples` alone.
    pub fn insert_row(&mut self, row: &[TermId]) -> bool {
        debug_assert_eq!(row.len(), self.columns.len());
        if self.columns.is_empty() {
            if self.has_tuples {
                return false;
            }
            self.has_tuples = true;
            return true;
        }
        for r in 0..self.num_rows {
            if self.row(r) == row {
                return false;
            }
        }
        self.rows.extend_from_slice(row);
        self.num_rows += 1;
        self.has_tuples = true;
        true
    }

    /// Distinct values in column `col` across all rows.
    pub fn count_unique_values(&self, col: usize) -> usize {
        let mut seen = HashSet::new();
        for r in 0..self.num_rows {
            seen.insert(self.row(r)[col]);
        }
        seen.len()
    }

    /// A column is full when its distinct value count reaches its sort's
    /// finite cardinality: tracking it no longer excludes anything.
    pub fn is_full(&self, store: &TermStore, syms: &SymbolStore, col: usize) -> bool {
        let Some(pred) = self.pred else {
            return false;
        };
        let pos = self.columns[col] as usize;
        let sort = syms.symbol(pred).domain[pos];
        match store.sort(sort).card {
            Some(card) => self.count_unique_values(col) as u64 >= card,
            None => false,
        }
    }

    /// Enforce the row bound by deleting the noisiest column (most distinct
    /// values, first wins) and re-deduplicating until the bound holds.
    pub fn prune(&mut self, cutoff: usize) {
        while self.num_rows > cutoff && !self.columns.is_empty() {
            let mut max_col = 0;
            let mut max_val = 0;
            for c in 0..self.columns.len() {
                let count = self.count_unique_values(c);
                if count > max_val {
                    max_col = c;
                    max_val = count;
                }
            }
            trace!(column = self.columns[max_col], distinct = max_val, "pruning column");
            self.delete_column(max_col);
            self.remove_duplicates();
        }
    }

    /// Base-fact deduction for rules without a positive uninterpreted tail.
    fn deduce_base_facts(&mut self, ctx: &TupleSetCtx, store: &TermStore, rule: &Rule) -> bool {
        debug_assert_eq!(self.rows.len(), self.columns.len() * self.num_rows);
        let mut bindings = rule_bindings_buffer(store, rule);
        if !apply_equalities(store, rule, &mut bindings) {
            // Contradictory interpreted tail: the rule derives nothing.
            return false;
        }
        let mut staged = Vec::with_capacity(self.columns.len());
        let mut changed = false;
        let mut i = 0;
        while i < self.columns.len() {
            let pos = self.columns[i] as usize;
            let arg = rule.head.args[pos];
            let resolved = match store.as_var(arg) {
                Some((vidx, _)) => bindings.get(vidx as usize).copied().flatten(),
                None if store.is_ground(arg) => Some(arg),
                None => None,
            };
            match resolved {
                Some(value) => {
                    staged.push(value);
                    i += 1;
                }
                None => {
                    // Not determinable by this rule: the column goes.
                    self.delete_column(i);
                    self.remove_duplicates();
                    changed = true;
                }
            }
        }
        changed |= self.insert_row(&staged);
        if changed {
            self.prune(ctx.cutoff);
        }
        changed
    }

    /// Join deduction: enumerate the Cartesian product of the positive tail
    /// facts' rows, bind variables, and stage one head row per consistent
    /// combination.
    fn deduce_var_facts(
        &mut self,
        ctx: &TupleSetCtx,
        store: &TermStore,
        rule: &Rule,
        tail: &TailFacts<'_, Self>,
    ) -> bool {
        debug_assert_eq!(self.rows.len(), self.columns.len() * self.num_rows);
        let psz = rule.positive_tail_size();
        let mut iters = vec![0usize; psz];
        let template = rule_bindings_buffer(store, rule);
        let mut new_facts = false;
        let mut staged = Vec::new();
        loop {
            let mut bindings = template.clone();
            let mut feasible = true;
            'tails: for i in 0..psz {
                let atom = rule.uninterpreted_atom(i);
                let fact = tail.get(i);
                // A fact with tracked columns but no rows carries no
                // information yet; it contributes no constraints.
                if fact.num_rows() == 0 && fact.num_cols() != 0 {
                    continue;
                }
                let row_nr = iters[i];
                for (j, &col) in fact.columns.iter().enumerate() {
                    let arg = atom.args[col as usize];
                    let value = fact.row(row_nr)[j];
                    match store.as_var(arg) {
                        Some((vidx, _)) => {
                            let slot = &mut bindings[vidx as usize];
                            match slot {
                                None => *slot = Some(value),
                                Some(bound) if *bound != value => {
                                    feasible = false;
                                    break 'tails;
                                }
                                Some(_) => {}
                            }
                        }
                        None => {
                            if arg != value {
                                feasible = false;
                                break 'tails;
                            }
                        }
                    }
                }
            }
            if feasible {
                feasible = apply_equalities(store, rule, &mut bindings);
            }
            if feasible {
                staged.clear();
                let mut i = 0;
                while i < self.columns.len() {
                    let pos = self.columns[i] as usize;
                    let arg = rule.head.args[pos];
                    match store.as_var(arg) {
                        Some((vidx, _)) => match bindings.get(vidx as usize).copied().flatten() {
                            Some(value) => {
                                staged.push(value);
                                i += 1;
                            }
                            None => {
                                // The head argument stays unbounded.
                                self.delete_column(i);
                                self.remove_duplicates();
                                new_facts = true;
                            }
                        },
                        None if store.is_ground(arg) => {
                            staged.push(arg);
                            i += 1;
                        }
                        None => {
                            self.delete_column(i);
                            self.remove_duplicates();
                            new_facts = true;
                        }
                    }
                }
                if self.insert_row(&staged) {
                    new_facts = true;
                }
            }
            // Ripple-carry increment over the per-tail row counters.
            let mut valid = false;
            for i in 0..psz {
                iters[i] += 1;
                if iters[i] >= tail.get(i).num_rows() {
                    iters[i] = 0;
                } else {
                    valid = true;
                    break;
                }
            }
            if !valid {
                break;
            }
        }
        if new_facts {
            self.prune(ctx.cutoff);
        }
        new_facts
    }

    /// Top-down query distribution: for every query row of this head fact,
    /// derive the query tuples it imposes on the tail predicates.
    fn distribute_query_facts(
        &self,
        ctx: &TupleSetCtx,
        store: &TermStore,
        rule: &Rule,
        writer: &mut TailWriter<'_, Self>,
    ) {
        let head_rows: usize = if self.columns.is_empty() {
            if self.has_tuples {
                1
            } else {
                0
            }
        } else {
            self.num_rows
        };
        let template = rule_bindings_buffer(store, rule);
        for r in 0..head_rows {
            let mut bindings = template.clone();
            let mut feasible = true;
            for (j, &col) in self.columns.iter().enumerate() {
                let arg = rule.head.args[col as usize];
                let value = self.row(r)[j];
                match store.as_var(arg) {
                    Some((vidx, _)) => {
                        let slot = &mut bindings[vidx as usize];
                        match slot {
                            None => *slot = Some(value),
                            Some(bound) if *bound != value => {
                                feasible = false;
                                break;
                            }
                            Some(_) => {}
                        }
                    }
                    None => {
                        if arg != value {
                            feasible = false;
                            break;
                        }
                    }
                }
            }
            if feasible {
                feasible = apply_equalities(store, rule, &mut bindings);
            }
            if !feasible {
                continue;
            }
            let mut staged = Vec::new();
            for i in 0..rule.uninterpreted_tail_size() {
                let atom = rule.uninterpreted_atom(i);
                let fact = writer.get(i);
                staged.clear();
                let mut structural = false;
                let mut j = 0;
                while j < fact.columns.len() {
                    let pos = fact.columns[j] as usize;
                    let arg = atom.args[pos];
                    let resolved = match store.as_var(arg) {
                        Some((vidx, _)) => bindings.get(vidx as usize).copied().flatten(),
                        None if store.is_ground(arg) => Some(arg),
                        None => None,
                    };
                    match resolved {
                        Some(value) => {
                            staged.push(value);
                            j += 1;
                        }
                        None => {
                            // Unbound in the query: any value may matter.
                            fact.delete_column(j);
                            fact.remove_duplicates();
                            structural = true;
                        }
                    }
                }
                let inserted = fact.insert_row(&staged);
                if inserted {
                    fact.prune(ctx.cutoff);
                }
                if inserted || structural {
                    writer.set_changed(i);
                }
            }
        }
    }

    fn is_null(&self) -> bool {
        self.columns.is_empty() && !self.has_tuples
    }
}

/// An all-`None` binding buffer sized for every variable of `rule`.
fn rule_bindings_buffer(store: &TermStore, rule: &Rule) -> Vec<Option<TermId>> {
    let max_vidx = rule.vars(store).into_iter().max().map_or(0, |v| v as usize + 1);
    vec![None; max_vidx]
}

/// Propagate the positive interpreted equalities of `rule` into `bindings`
/// until fixpoint. Returns false when a conflict makes the combination
/// infeasible.
fn apply_equalities(store: &TermStore, rule: &Rule, bindings: &mut [Option<TermId>]) -> bool {
    // Resolve a term to a ground value under the current bindings.
    fn resolve(store: &TermStore, bindings: &[Option<TermId>], t: TermId) -> Option<TermId> {
        match store.as_var(t) {
            Some((vidx, _)) => bindings.get(vidx as usize).copied().flatten(),
            None if store.is_ground(t) => Some(t),
            None => None,
        }
    }
    loop {
        let mut changed = false;
        for &(t, neg) in rule.interpreted_tail() {
            if neg {
                continue;
            }
            let Term::App { op: Op::Eq, args } = store.term(t) else {
                continue;
            };
            if args.len() != 2 {
                continue;
            }
            let (lhs, rhs) = (args[0], args[1]);
            let lv = resolve(store, bindings, lhs);
            let rv = resolve(store, bindings, rhs);
            match (lv, rv) {
                (Some(a), Some(b)) => {
                    if a != b {
                        return false;
                    }
                }
                (Some(a), None) => {
                    if let Some((vidx, _)) = store.as_var(rhs) {
                        bindings[vidx as usize] = Some(a);
                        changed = true;
                    }
                }
                (None, Some(b)) => {
                    if let Some((vidx, _)) = store.as_var(lhs) {
                        bindings[vidx as usize] = Some(b);
                        changed = true;
                    }
                }
                (None, None) => {}
            }
        }
        if !changed {
            return true;
        }
    }
}

impl FactDomain for TupleSet {
    type Ctx = TupleSetCtx;

    fn initial(_store: &TermStore, syms: &SymbolStore, pred: PredId) -> Self {
        let arity = syms.arity(pred);
        TupleSet {
            pred: Some(pred),
            columns: (0..arity as u32).collect(),
            rows: Vec::new(),
            num_rows: 0,
            has_tuples: false,
        }
    }

    fn init_up(&mut self, ctx: &mut Self::Ctx, store: &TermStore, rule: &Rule) -> bool {
        if rule.positive_tail_size() == 0 {
            self.deduce_base_facts(ctx, store, rule)
        } else {
            false
        }
    }

    fn propagate_up(
        &mut self,
        ctx: &mut Self::Ctx,
        store: &TermStore,
        rule: &Rule,
        tail: TailFacts<'_, Self>,
    ) -> bool {
        self.deduce_var_facts(ctx, store, rule, &tail)
    }

    fn init_down(
        _ctx: &mut Self::Ctx,
        _store: &TermStore,
        rules: &RuleSet,
        setter: &mut FactSetter<'_, Self>,
    ) {
        // Outputs are queried in full: the unit query over no columns.
        for sym in rules.output_predicates() {
            let fact = setter.get(sym);
            fact.columns.clear();
            fact.rows.clear();
            fact.num_rows = 0;
            fact.has_tuples = true;
            setter.set_changed(sym);
        }
    }

    fn propagate_down(
        &self,
        ctx: &mut Self::Ctx,
        store: &TermStore,
        rule: &Rule,
        writer: &mut TailWriter<'_, Self>,
    ) {
        self.distribute_query_facts(ctx, store, rule, writer);
    }

    fn join(&mut self, ctx: &mut Self::Ctx, other: &Self) {
        if other.is_null() {
            return;
        }
        if self.is_null() {
            *self = other.clone();
            return;
        }
        // Union is only meaningful over commonly tracked columns; a column
        // absent on either side is unconstrained there.
        let shared: Vec<u32> = self
            .columns
            .iter()
            .copied()
            .filter(|c| other.columns.binary_search(c).is_ok())
            .collect();
        let mut drop_cols: Vec<usize> = Vec::new();
        for (c, col) in self.columns.iter().enumerate() {
            if shared.binary_search(col).is_err() {
                drop_cols.push(c);
            }
        }
        for &c in drop_cols.iter().rev() {
            self.delete_column(c);
        }
        self.remove_duplicates();
        let mut staged = Vec::with_capacity(shared.len());
        for r in 0..other.num_rows {
            staged.clear();
            for &col in &shared {
                let j = other.columns.binary_search(&col).unwrap();
                staged.push(other.row(r)[j]);
            }
            self.insert_row(&staged);
        }
        self.has_tuples |= other.has_tuples;
        self.prune(ctx.cutoff);
    }

    fn intersect(&mut self, ctx: &mut Self::Ctx, other: &Self) {
        if other.is_null() {
            return;
        }
        if self.is_null() {
            *self = other.clone();
            return;
        }
        // Sort-merge the two column lists into their union.
        let mut merged_cols: Vec<u32> = Vec::with_capacity(self.columns.len() + other.columns.len());
        {
            let (mut i, mut j) = (0, 0);
            while i < self.columns.len() || j < other.columns.len() {
                match (self.columns.get(i), other.columns.get(j)) {
                    (Some(&a), Some(&b)) if a == b => {
                        merged_cols.push(a);
                        i += 1;
                        j += 1;
                    }
                    (Some(&a), Some(&b)) if a < b => {
                        merged_cols.push(a);
                        i += 1;
                    }
                    (Some(_), Some(&b)) => {
                        merged_cols.push(b);
                        j += 1;
                    }
                    (Some(&a), None) => {
                        merged_cols.push(a);
                        i += 1;
                    }
                    (None, Some(&b)) => {
                        merged_cols.push(b);
                        j += 1;
                    }
                    (None, None) => unreachable!(),
                }
            }
        }
        let self_rows: usize = if self.columns.is_empty() {
            usize::from(self.has_tuples)
        } else {
            self.num_rows
        };
        let other_rows: usize = if other.columns.is_empty() {
            usize::from(other.has_tuples)
        } else {
            other.num_rows
        };
        let mut result = TupleSet {
            pred: self.pred.or(other.pred),
            columns: merged_cols.clone(),
            rows: Vec::new(),
            num_rows: 0,
            has_tuples: false,
        };
        let mut staged = Vec::with_capacity(merged_cols.len());
        for l in 0..self_rows {
            'pairs: for r in 0..other_rows {
                staged.clear();
                for &col in &merged_cols {
                    let lv = self
                        .columns
                        .binary_search(&col)
                        .ok()
                        .map(|j| self.row(l)[j]);
                    let rv = other
                        .columns
                        .binary_search(&col)
                        .ok()
                        .map(|j| other.row(r)[j]);
                    match (lv, rv) {
                        (Some(a), Some(b)) => {
                            if a != b {
                                // Shared columns must agree.
                                continue 'pairs;
                            }
                            staged.push(a);
                        }
                        (Some(a), None) => staged.push(a),
                        (None, Some(b)) => staged.push(b),
                        (None, None) => unreachable!(),
                    }
                }
                result.insert_row(&staged);
            }
        }
        if merged_cols.is_empty() {
            result.has_tuples = self.has_tuples && other.has_tuples;
        }
        result.prune(ctx.cutoff);
        *self = result;
    }

    fn dump(&self, store: &TermStore, out: &mut String) {
        if self.columns.is_empty() {
            return;
        }
        for r in 0..self.num_rows {
            if r > 0 {
                out.push('\n');
            }
            let mut col_idx = 0;
            let mut pos = 0u32;
            loop {
                if self.columns[col_idx] == pos {
                    out.push(' ');
                    out.push_str(&format!("{}", store.display(self.row(r)[col_idx])));
                    col_idx += 1;
                    if col_idx == self.columns.len() {
                        break;
                    }
                } else {
                    out.push_str(" *");
                }
                pos += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (TermStore, SymbolStore) {
        (TermStore::new(), SymbolStore::new())
    }

    fn fact_with_rows(
        store: &TermStore,
        syms: &SymbolStore,
        pred: PredId,
        rows: &[&[TermId]],
    ) -> TupleSet {
        let mut fact = TupleSet::initial(store, syms, pred);
        for row in rows {
            assert!(fact.insert_row(row));
        }
        fact
    }

    #[test]
    fn null_fact_shape() {
        let fact = TupleSet::default();
        assert!(fact.is_null());
        assert_eq!(fact.num_cols(), 0);
        assert_eq!(fact.num_rows(), 0);
        assert!(!fact.has_tuples());
    }

    #[test]
    fn insert_dedups_and_counts() {
        let (mut store, mut syms) = setup();
        let s = store.add_sort("node", None);
        let p = syms.add("p", vec![s, s]);
        let one = store.int(1);
        let two = store.int(2);

        let mut fact = TupleSet::initial(&store, &syms, p);
        assert!(fact.insert_row(&[one, two]));
        assert!(!fact.insert_row(&[one, two]));
        assert!(fact.insert_row(&[two, two]));
        assert_eq!(fact.num_rows(), 2);
        assert_eq!(fact.count_unique_values(0), 2);
        assert_eq!(fact.count_unique_values(1), 1);
        assert_eq!(fact.rows.len(), fact.num_cols() * fact.num_rows());
    }

    #[test]
    fn zero_width_insert_toggles_has_tuples() {
        let (store, mut syms) = setup();
        let p = syms.add("p", vec![]);
        let mut fact = TupleSet::initial(&store, &syms, p);
        assert_eq!(fact.num_cols(), 0);
        assert!(!fact.has_tuples());
        assert!(fact.insert_row(&[]));
        assert!(fact.has_tuples());
        assert!(!fact.insert_row(&[]));
    }

    #[test]
    fn prune_deletes_noisiest_column() {
        let (mut store, mut syms) = setup();
        let s = store.add_sort("node", None);
        let p = syms.add("p", vec![s, s]);
        let vals: Vec<TermId> = (0..4).map(|i| store.int(i)).collect();
        let zero = store.int(0);

        // Column 0 has 4 distinct values, column 1 only one.
        let mut fact = TupleSet::initial(&store, &syms, p);
        for &v in &vals {
            fact.insert_row(&[v, zero]);
        }
        fact.prune(2);
        // Column 0 (arg position 0) went; the remaining relation is {(0)}.
        assert_eq!(fact.columns(), &[1]);
        assert_eq!(fact.num_rows(), 1);
        assert_eq!(fact.row(0), &[zero]);
    }

    #[test]
    fn prune_degenerate_drops_everything() {
        let (mut store, mut syms) = setup();
        let s = store.add_sort("node", None);
        let p = syms.add("p", vec![s]);
        let mut fact = TupleSet::initial(&store, &syms, p);
        for i in 0..5 {
            let v = store.int(i);
            fact.insert_row(&[v]);
        }
        fact.prune(2);
        assert_eq!(fact.num_cols(), 0);
        assert!(fact.has_tuples());
        assert!(fact.num_rows() <= 1);
    }

    #[test]
    fn is_full_uses_sort_cardinality() {
        let (mut store, mut syms) = setup();
        let bit = store.add_sort("bit", Some(2));
        let p = syms.add("p", vec![bit]);
        let zero = store.int(0);
        let one = store.int(1);

        let mut fact = TupleSet::initial(&store, &syms, p);
        fact.insert_row(&[zero]);
        assert!(!fact.is_full(&store, &syms, 0));
        fact.insert_row(&[one]);
        assert!(fact.is_full(&store, &syms, 0));
    }

    #[test]
    fn intersect_is_natural_join() {
        let (mut store, mut syms) = setup();
        let s = store.add_sort("node", None);
        let p = syms.add("p", vec![s, s]);
        let one = store.int(1);
        let two = store.int(2);
        let three = store.int(3);

        // left tracks column 0 only, right tracks column 1 only
        let mut left = fact_with_rows(&store, &syms, p, &[&[one, two], &[two, two]]);
        left.delete_column(1);
        left.remove_duplicates();
        let mut right = fact_with_rows(&store, &syms, p, &[&[one, three]]);
        right.delete_column(0);
        right.remove_duplicates();

        let mut ctx = TupleSetCtx::default();
        let mut a = left.clone();
        a.intersect(&mut ctx, &right);
        assert_eq!(a.columns(), &[0, 1]);
        assert_eq!(a.num_rows(), 2);
        assert_eq!(a.row(0), &[one, three]);
        assert_eq!(a.row(1), &[two, three]);

        // commutative over pairs (same row set, possibly different order)
        let mut b = right.clone();
        b.intersect(&mut ctx, &left);
        let rows_a: HashSet<Vec<TermId>> = (0..a.num_rows()).map(|r| a.row(r).to_vec()).collect();
        let rows_b: HashSet<Vec<TermId>> = (0..b.num_rows()).map(|r| b.row(r).to_vec()).collect();
        assert_eq!(rows_a, rows_b);
    }

    #[test]
    fn intersect_shared_columns_must_agree() {
        let (mut store, mut syms) = setup();
        let s = store.add_sort("node", None);
        let p = syms.add("p", vec![s]);
        let one = store.int(1);
        let two = store.int(2);

        let left = fact_with_rows(&store, &syms, p, &[&[one]]);
        let right = fact_with_rows(&store, &syms, p, &[&[two]]);
        let mut ctx = TupleSetCtx::default();
        let mut a = left.clone();
        a.intersect(&mut ctx, &right);
        assert_eq!(a.num_rows(), 0);
    }

    #[test]
    fn join_unions_rows_on_shared_columns() {
        let (mut store, mut syms) = setup();
        let s = store.add_sort("node", None);
        let p = syms.add("p", vec![s]);
        let one = store.int(1);
        let two = store.int(2);

        let left = fact_with_rows(&store, &syms, p, &[&[one]]);
        let right = fact_with_rows(&store, &syms, p, &[&[two]]);
        let mut ctx = TupleSetCtx::default();
        let mut a = left.clone();
        a.join(&mut ctx, &right);
        assert_eq!(a.num_rows(), 2);

        // joining again changes nothing
        let snapshot = a.clone();
        a.join(&mut ctx, &right);
        assert_eq!(a, snapshot);
    }

    #[test]
    fn dump_marks_untracked_positions() {
        let (mut store, mut syms) = setup();
        let s = store.add_sort("node", None);
        let p = syms.add("p", vec![s, s, s]);
        let one = store.int(1);
        let two = store.int(2);
        let three = store.int(3);

        let mut fact = fact_with_rows(&store, &syms, p, &[&[one, two, three]]);
        fact.delete_column(1);
        fact.remove_duplicates();
        let mut out = String::new();
        fact.dump(&store, &mut out);
        assert_eq!(out, " 1 * 3");
    }
}
