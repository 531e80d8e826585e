//! # Rulescope
//!
//! Static analyses and specializing transformations for Datalog-style rule
//! sets. Rulescope does not evaluate rules; it analyzes them with a
//! generic monotone dataflow engine and rewrites them into a semantically
//! equivalent but more specialized program.
//!
//! ## Pipeline Architecture
//!
//! ```text
//! Rule source text
//!     ↓
//! [parser]                   → TermStore + SymbolStore + RuleSet
//!     ↓
//! [dataflow engine]          → per-predicate facts
//!     │     ArgReachability: which argument positions matter
//!     │     TupleSet:        which value combinations occur
//!     ↓
//! [coi_filter | exploder]    → specialized RuleSet
//!     ↓
//! [model converter]          → lift models back to the source vocabulary
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use rulescope::parser::parse_program;
//! use rulescope::transforms::{CoiArgFilter, Pipeline};
//!
//! let mut program = parse_program(
//!     "q(X) :- p(X, 3).\n\
//!      p(1, 3).\n\
//!      output q.\n",
//! )
//! .unwrap();
//!
//! let mut pipeline = Pipeline::new();
//! let mut filter = CoiArgFilter::new();
//! let sliced = pipeline.apply(
//!     &mut filter,
//!     &mut program.store,
//!     &mut program.syms,
//!     &program.rules,
//! );
//! assert_eq!(sliced.len(), program.rules.len());
//! ```
//!
//! ## Module Organization
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `term` | Hash-consed terms, sorts, values, simplifier |
//! | `rules` | Predicate symbols, rules, rule sets |
//! | `parser` | Rule text → rule set |
//! | `dataflow` | Generic bottom-up/top-down fixpoint engine |
//! | `dataflow::reachability` | Argument-reachability domain |
//! | `dataflow::tuple_set` | Bounded-relation domain |
//! | `transforms` | Cone-of-influence filter, rule exploder |
//! | `model` | Models and model converters |
//! | `config` | Configuration system |

pub mod config;
pub mod dataflow;
pub mod model;
pub mod parser;
pub mod rules;
pub mod term;
pub mod transforms;

pub use config::{AnalysisConfig, Config};
pub use dataflow::reachability::{ArgReachability, ArgReachabilityCtx, TaintTracer};
pub use dataflow::tuple_set::{TupleSet, TupleSetCtx};
pub use dataflow::{DataflowEngine, FactDomain};
pub use model::{FuncEntry, FuncInterp, Model, ModelConverter};
pub use parser::{parse_program, ParseError, Program};
pub use rules::{Atom, PredId, PredicateSymbol, Rule, RuleSet, SymbolStore};
pub use term::{Op, Sort, SortId, Term, TermId, TermStore, Value};
pub use transforms::{CoiArgFilter, Pipeline, RuleExploder, RuleTransformer};
