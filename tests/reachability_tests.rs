//! Argument-reachability analysis tests.

use rulescope::dataflow::reachability::{ArgReachability, ArgReachabilityCtx};
use rulescope::dataflow::DataflowEngine;
use rulescope::parser::parse_program;
use rulescope::rules::PredId;
use rulescope::Program;
use std::collections::BTreeMap;

fn bottom_up(program: &Program) -> DataflowEngine<'_, ArgReachability> {
    let mut engine = DataflowEngine::new(
        ArgReachabilityCtx::new(),
        &program.store,
        &program.syms,
        &program.rules,
    );
    engine.run_bottom_up();
    engine
}

fn top_down(program: &Program) -> DataflowEngine<'_, ArgReachability> {
    let mut engine = DataflowEngine::new(
        ArgReachabilityCtx::new(),
        &program.store,
        &program.syms,
        &program.rules,
    );
    engine.run_top_down();
    engine
}

fn top_down_with(
    program: &Program,
    prev: BTreeMap<PredId, ArgReachability>,
) -> DataflowEngine<'_, ArgReachability> {
    let mut engine = DataflowEngine::new(
        ArgReachabilityCtx::with_previous(prev),
        &program.store,
        &program.syms,
        &program.rules,
    );
    engine.run_top_down();
    engine
}

#[test]
fn constant_head_argument_is_reachable_bottom_up() {
    // a(X, 3) :- b(X).  b(X).
    let program = parse_program(
        "a(X, 3) :- b(X).\n\
         b(X).\n\
         output a.\n",
    )
    .unwrap();
    let a = program.syms.lookup("a").unwrap();
    let b = program.syms.lookup("b").unwrap();

    let up = bottom_up(&program);
    let fa = up.get_fact(a).unwrap();
    assert!(!fa.is_reachable(0));
    assert!(fa.is_reachable(1));
    assert!(!up.get_fact(b).unwrap().any_reachable());
}

#[test]
fn intersection_of_both_directions() {
    let program = parse_program(
        "a(X, 3) :- b(X).\n\
         b(X).\n\
         output a.\n",
    )
    .unwrap();
    let a = program.syms.lookup("a").unwrap();
    let b = program.syms.lookup("b").unwrap();

    let mut up = bottom_up(&program);
    let prev: BTreeMap<_, _> = up.facts().map(|(p, f)| (p, f.clone())).collect();
    let down = top_down_with(&program, prev);

    // Top-down: the output is observable in full and b's position flows
    // back through X.
    let da = down.get_fact(a).unwrap();
    assert!(da.all_reachable());
    assert!(down.get_fact(b).unwrap().is_reachable(0));

    up.intersect(&down);
    let fa = up.get_fact(a).unwrap();
    assert!(!fa.is_reachable(0));
    assert!(fa.is_reachable(1));
    // b stays unconstrained: bottom-up never marked it.
    assert!(!up.get_fact(b).unwrap().any_reachable());
}

#[test]
fn interpreted_constraint_marks_head_variable() {
    // a(X) :- X < 10.
    let program = parse_program("a(X) :- X < 10.\noutput a.\n").unwrap();
    let a = program.syms.lookup("a").unwrap();

    let up = bottom_up(&program);
    assert!(up.get_fact(a).unwrap().is_reachable(0));
}

#[test]
fn reachability_propagates_through_shared_variable() {
    // a(X, Y) :- b(X), c(Y).  c's position 0 is reachable because of the
    // constant fact, so a's position 1 becomes reachable through Y.
    let program = parse_program(
        "c(3).\n\
         a(X, Y) :- b(X), c(Y).\n",
    )
    .unwrap();
    let a = program.syms.lookup("a").unwrap();
    let c = program.syms.lookup("c").unwrap();

    let up = bottom_up(&program);
    assert!(up.get_fact(c).unwrap().is_reachable(0));
    let fa = up.get_fact(a).unwrap();
    assert!(!fa.is_reachable(0));
    assert!(fa.is_reachable(1));
}

#[test]
fn repeated_head_variable_is_an_implicit_equality() {
    let program = parse_program("a(X, X) :- b(X).\n").unwrap();
    let a = program.syms.lookup("a").unwrap();
    let up = bottom_up(&program);
    assert!(up.get_fact(a).unwrap().all_reachable());
}

#[test]
fn taint_spreads_through_interpreted_dependencies_top_down() {
    // a(X, Y) :- b(X), c(Z), Y < Z.  With a fully observable, Z depends on
    // Y through the comparison, so c's position becomes reachable.
    let program = parse_program(
        "a(X, Y) :- b(X), c(Z), Y < Z.\n\
         output a.\n",
    )
    .unwrap();
    let b = program.syms.lookup("b").unwrap();
    let c = program.syms.lookup("c").unwrap();

    let down = top_down(&program);
    assert!(down.get_fact(b).unwrap().is_reachable(0));
    assert!(down.get_fact(c).unwrap().is_reachable(0));
}

#[test]
fn arity_zero_predicate() {
    let program = parse_program(
        "p.\n\
         q :- p.\n\
         output q.\n",
    )
    .unwrap();
    let p = program.syms.lookup("p").unwrap();

    let up = bottom_up(&program);
    let fp = up.get_fact(p).unwrap();
    assert_eq!(fp.len(), 0);
    assert!(fp.all_reachable());
    assert!(!fp.any_reachable());
}

#[test]
fn output_without_rules_is_seeded_fully_reachable() {
    let program = parse_program(
        "sort node.\n\
         decl q(node, node).\n\
         output q.\n\
         p(1).\n",
    )
    .unwrap();
    let q = program.syms.lookup("q").unwrap();

    let down = top_down(&program);
    let fq = down.get_fact(q).unwrap();
    assert_eq!(fq.len(), 2);
    assert!(fq.all_reachable());
}

#[test]
fn reruns_are_idempotent() {
    let program = parse_program(
        "a(X, 3) :- b(X).\n\
         b(X).\n\
         c(3).\n\
         a2(X, Y) :- b(X), c(Y).\n\
         output a.\n",
    )
    .unwrap();
    let mut engine = bottom_up(&program);
    let snapshot: BTreeMap<_, _> = engine.facts().map(|(p, f)| (p, f.clone())).collect();
    engine.run_bottom_up();
    let again: BTreeMap<_, _> = engine.facts().map(|(p, f)| (p, f.clone())).collect();
    assert_eq!(snapshot, again);
}

#[test]
fn dump_lists_every_predicate_once() {
    let program = parse_program(
        "a(X, 3) :- b(X).\n\
         b(X).\n\
         output a.\n",
    )
    .unwrap();
    let up = bottom_up(&program);
    let dump = up.dump();
    assert_eq!(dump.matches("a -> ").count(), 1);
    assert_eq!(dump.matches("b -> ").count(), 1);
    assert!(dump.contains("a -> [-+]"));
    assert!(dump.contains("b -> [-]"));
}
