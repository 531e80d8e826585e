//! # Terms, Sorts and the Term Store
//!
//! Hash-consed term representation shared by every analysis and
//! transformation pass. All terms live in a [`TermStore`] and are referred
//! to by [`TermId`] handles; structural equality of terms is therefore
//! handle equality, which is what lets the tuple-set domain compare ground
//! values without walking them.
//!
//! Variables are identified by a nonnegative index local to the enclosing
//! rule (de-Bruijn style) plus the sort of the argument position they were
//! first seen in. Ground values are [`Value`] literals. Everything else is
//! an [`App`] of an interpreted operator, which is how comparison and
//! arithmetic constraints in rule tails are represented.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Handle to an interned term. Copy-cheap; equality is structural equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TermId(u32);

/// Handle to a registered sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SortId(u32);

/// A ground constant value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Value {
    Int(i64),
    Str(String),
    Bool(bool),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Str(s) => write!(f, "\"{}\"", s),
            Value::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// A sort (argument type). `card` is the number of inhabitants for finite
/// sorts; `None` means unbounded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub name: String,
    pub card: Option<u64>,
}

/// Interpreted operators appearing in rule tails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Op {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Not,
}

impl Op {
    pub fn as_str(&self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::Ne => "!=",
            Op::Lt => "<",
            Op::Le => "<=",
            Op::Gt => ">",
            Op::Ge => ">=",
            Op::Add => "+",
            Op::Sub => "-",
            Op::Mul => "*",
            Op::Div => "/",
            Op::Mod => "%",
            Op::And => "and",
            Op::Or => "or",
            Op::Not => "not",
        }
    }
}

/// A term node. Never constructed directly - go through [`TermStore`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Term {
    /// Rule-local variable with its argument sort.
    Var { idx: u32, sort: SortId },
    /// Ground literal.
    Lit(Value),
    /// Interpreted application.
    App { op: Op, args: Vec<TermId> },
}

/// Owning, interning store for terms and sorts.
///
/// Passes share one store for the lifetime of a pipeline; analyses only
/// read it, transformations also mint new terms while rewriting.
#[derive(Debug, Default)]
pub struct TermStore {
    terms: Vec<Term>,
    interned: HashMap<Term, TermId>,
    sorts: Vec<Sort>,
    sort_names: HashMap<String, SortId>,
}

impl TermStore {
    pub fn new() -> Self {
        TermStore::default()
    }

    /// Register a sort, returning the existing handle if the name is taken.
    pub fn add_sort(&mut self, name: &str, card: Option<u64>) -> SortId {
        if let Some(&id) = self.sort_names.get(name) {
            return id;
        }
        let id = SortId(self.sorts.len() as u32);
        self.sorts.push(Sort {
            name: name.to_string(),
            card,
        });
        self.sort_names.insert(name.to_string(), id);
        id
    }

    pub fn sort(&self, id: SortId) -> &Sort {
        &self.sorts[id.0 as usize]
    }

    pub fn sort_named(&self, name: &str) -> Option<SortId> {
        self.sort_names.get(name).copied()
    }

    fn intern(&mut self, term: Term) -> TermId {
        if let Some(&id) = self.interned.get(&term) {
            return id;
        }
        let id = TermId(self.terms.len() as u32);
        self.terms.push(term.clone());
        self.interned.insert(term, id);
        id
    }

    pub fn var(&mut self, idx: u32, sort: SortId) -> TermId {
        self.intern(Term::Var { idx, sort })
    }

    pub fn int(&mut self, v: i64) -> TermId {
        self.intern(Term::Lit(Value::Int(v)))
    }

    pub fn str_lit(&mut self, s: &str) -> TermId {
        self.intern(Term::Lit(Value::Str(s.to_string())))
    }

    pub fn bool_lit(&mut self, b: bool) -> TermId {
        self.intern(Term::Lit(Value::Bool(b)))
    }

    /// The `true` literal.
    pub fn tt(&mut self) -> TermId {
        self.bool_lit(true)
    }

    /// The `false` literal.
    pub fn ff(&mut self) -> TermId {
        self.bool_lit(false)
    }

    pub fn app(&mut self, op: Op, args: Vec<TermId>) -> TermId {
        self.intern(Term::App { op, args })
    }

    pub fn term(&self, id: TermId) -> &Term {
        &self.terms[id.0 as usize]
    }

    pub fn is_var(&self, id: TermId) -> bool {
        matches!(self.term(id), Term::Var { .. })
    }

    pub fn as_var(&self, id: TermId) -> Option<(u32, SortId)> {
        match self.term(id) {
            Term::Var { idx, sort } => Some((*idx, *sort)),
            _ => None,
        }
    }

    pub fn as_value(&self, id: TermId) -> Option<&Value> {
        match self.term(id) {
            Term::Lit(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_true(&self, id: TermId) -> bool {
        matches!(self.term(id), Term::Lit(Value::Bool(true)))
    }

    pub fn is_false(&self, id: TermId) -> bool {
        matches!(self.term(id), Term::Lit(Value::Bool(false)))
    }

    /// A term is ground when no variable occurs in it.
    pub fn is_ground(&self, id: TermId) -> bool {
        match self.term(id) {
            Term::Var { .. } => false,
            Term::Lit(_) => true,
            Term::App { args, .. } => args.iter().all(|&a| self.is_ground(a)),
        }
    }

    /// Collect the variable indices occurring in `id` into `acc`.
    pub fn collect_vars(&self, id: TermId, acc: &mut BTreeSet<u32>) {
        match self.term(id) {
            Term::Var { idx, .. } => {
                acc.insert(*idx);
            }
            Term::Lit(_) => {}
            Term::App { args, .. } => {
                for &a in args {
                    self.collect_vars(a, acc);
                }
            }
        }
    }

    /// The set of variable indices occurring in `id`.
    pub fn vars(&self, id: TermId) -> BTreeSet<u32> {
        let mut acc = BTreeSet::new();
        self.collect_vars(id, &mut acc);
        acc
    }

    /// Like [`collect_vars`], but remembering each variable's sort.
    ///
    /// [`collect_vars`]: TermStore::collect_vars
    pub fn collect_vars_with_sorts(
        &self,
        id: TermId,
        acc: &mut std::collections::BTreeMap<u32, SortId>,
    ) {
        match self.term(id) {
            Term::Var { idx, sort } => {
                acc.entry(*idx).or_insert(*sort);
            }
            Term::Lit(_) => {}
            Term::App { args, .. } => {
                for &a in args {
                    self.collect_vars_with_sorts(a, acc);
                }
            }
        }
    }

    /// Apply a variable substitution. `bindings[i]` replaces variable `i`;
    /// `None` (or an index past the end) leaves the variable untouched.
    pub fn substitute(&mut self, id: TermId, bindings: &[Option<TermId>]) -> TermId {
        match self.term(id).clone() {
            Term::Var { idx, .. } => bindings
                .get(idx as usize)
                .copied()
                .flatten()
                .unwrap_or(id),
            Term::Lit(_) => id,
            Term::App { op, args } => {
                let new_args: Vec<TermId> = args
                    .iter()
                    .map(|&a| self.substitute(a, bindings))
                    .collect();
                if new_args == args {
                    id
                } else {
                    self.app(op, new_args)
                }
            }
        }
    }

    /// Bottom-up simplification: constant folding for arithmetic and
    /// comparisons, syntactic equality collapse, boolean flattening. This
    /// is the full extent of rewriting the specializer needs to decide
    /// clone feasibility.
    pub fn simplify(&mut self, id: TermId) -> TermId {
        let (op, args) = match self.term(id).clone() {
            Term::App { op, args } => (op, args),
            _ => return id,
        };
        let args: Vec<TermId> = args.iter().map(|&a| self.simplify(a)).collect();
        match op {
            Op::Eq if args.len() == 2 => self.simplify_eq(args[0], args[1], false),
            Op::Ne if args.len() == 2 => self.simplify_eq(args[0], args[1], true),
            Op::Lt | Op::Le | Op::Gt | Op::Ge if args.len() == 2 => {
                self.simplify_cmp(op, args[0], args[1])
            }
            Op::Add | Op::Sub | Op::Mul | Op::Div | Op::Mod if args.len() == 2 => {
                self.simplify_arith(op, args[0], args[1])
            }
            Op::Not if args.len() == 1 => {
                if self.is_true(args[0]) {
                    self.ff()
                } else if self.is_false(args[0]) {
                    self.tt()
                } else if let Term::App {
                    op: Op::Not,
                    args: inner,
                } = self.term(args[0])
                {
                    inner[0]
                } else {
                    self.app(Op::Not, args)
                }
            }
            Op::And => {
                let mut flat = Vec::new();
                for &a in &args {
                    if self.is_false(a) {
                        return self.ff();
                    }
                    if self.is_true(a) {
                        continue;
                    }
                    if let Term::App { op: Op::And, args } = self.term(a) {
                        flat.extend(args.iter().copied());
                    } else {
                        flat.push(a);
                    }
                }
                match flat.len() {
                    0 => self.tt(),
                    1 => flat[0],
                    _ => self.app(Op::And, flat),
                }
            }
            Op::Or => {
                let mut flat = Vec::new();
                for &a in &args {
                    if self.is_true(a) {
                        return self.tt();
                    }
                    if self.is_false(a) {
                        continue;
                    }
                    flat.push(a);
                }
                match flat.len() {
                    0 => self.ff(),
                    1 => flat[0],
                    _ => self.app(Op::Or, flat),
                }
            }
            _ => self.app(op, args),
        }
    }

    fn simplify_eq(&mut self, lhs: TermId, rhs: TermId, negate: bool) -> TermId {
        if lhs == rhs {
            return self.bool_lit(!negate);
        }
        // Distinct interned literals can never be equal.
        if self.as_value(lhs).is_some() && self.as_value(rhs).is_some() {
            return self.bool_lit(negate);
        }
        let op = if negate { Op::Ne } else { Op::Eq };
        self.app(op, vec![lhs, rhs])
    }

    fn simplify_cmp(&mut self, op: Op, lhs: TermId, rhs: TermId) -> TermId {
        if let (Some(Value::Int(a)), Some(Value::Int(b))) =
            (self.as_value(lhs).cloned(), self.as_value(rhs).cloned())
        {
            let res = match op {
                Op::Lt => a < b,
                Op::Le => a <= b,
                Op::Gt => a > b,
                Op::Ge => a >= b,
                _ => unreachable!(),
            };
            return self.bool_lit(res);
        }
        if lhs == rhs {
            // x < x is false, x <= x is true, for any x.
            return self.bool_lit(matches!(op, Op::Le | Op::Ge));
        }
        self.app(op, vec![lhs, rhs])
    }

    fn simplify_arith(&mut self, op: Op, lhs: TermId, rhs: TermId) -> TermId {
        if let (Some(Value::Int(a)), Some(Value::Int(b))) =
            (self.as_value(lhs).cloned(), self.as_value(rhs).cloned())
        {
            let res = match op {
                Op::Add => Some(a.wrapping_add(b)),
                Op::Sub => Some(a.wrapping_sub(b)),
                Op::Mul => Some(a.wrapping_mul(b)),
                Op::Div if b != 0 => Some(a / b),
                Op::Mod if b != 0 => Some(a % b),
                _ => None,
            };
            if let Some(v) = res {
                return self.int(v);
            }
        }
        self.app(op, vec![lhs, rhs])
    }

    /// Printable view of a term, used by the engine dumps.
    pub fn display(&self, id: TermId) -> TermDisplay<'_> {
        TermDisplay { store: self, id }
    }
}

/// Borrowing [`fmt::Display`] adapter for a stored term.
pub struct TermDisplay<'a> {
    store: &'a TermStore,
    id: TermId,
}

impl fmt::Display for TermDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.store.term(self.id) {
            Term::Var { idx, .. } => write!(f, "#{}", idx),
            Term::Lit(v) => write!(f, "{}", v),
            Term::App { op, args } => match op {
                Op::Not => write!(f, "not({})", self.store.display(args[0])),
                _ if args.len() == 2 => write!(
                    f,
                    "({} {} {})",
                    self.store.display(args[0]),
                    op.as_str(),
                    self.store.display(args[1])
                ),
                _ => {
                    write!(f, "{}(", op.as_str())?;
                    for (i, &a) in args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", self.store.display(a))?;
                    }
                    write!(f, ")")
                }
            },
        }
    }
}
