//! Tuple-set analysis tests.

use rulescope::dataflow::tuple_set::{TupleSet, TupleSetCtx};
use rulescope::dataflow::DataflowEngine;
use rulescope::parser::parse_program;
use rulescope::rules::PredId;
use rulescope::Program;
use std::collections::BTreeMap;

fn bottom_up_facts(program: &mut Program, cutoff: usize) -> BTreeMap<PredId, TupleSet> {
    let mut engine = DataflowEngine::<TupleSet>::new(
        TupleSetCtx::new(cutoff),
        &program.store,
        &program.syms,
        &program.rules,
    );
    engine.run_bottom_up();
    engine.into_facts()
}

fn top_down_facts(program: &mut Program, cutoff: usize) -> BTreeMap<PredId, TupleSet> {
    let mut engine = DataflowEngine::<TupleSet>::new(
        TupleSetCtx::new(cutoff),
        &program.store,
        &program.syms,
        &program.rules,
    );
    engine.run_top_down();
    engine.into_facts()
}

#[test]
fn base_facts_from_constants_and_equalities() {
    // p(1, X) :- X = 2.   q(A) :- p(A, 2).
    let mut program = parse_program(
        "p(1, X) :- X = 2.\n\
         q(A) :- p(A, 2).\n",
    )
    .unwrap();
    let p = program.syms.lookup("p").unwrap();
    let q = program.syms.lookup("q").unwrap();

    let facts = bottom_up_facts(&mut program, 5);

    let one = program.store.int(1);
    let two = program.store.int(2);
    let fp = &facts[&p];
    assert_eq!(fp.columns(), &[0, 1]);
    assert_eq!(fp.num_rows(), 1);
    assert_eq!(fp.row(0), &[one, two]);

    let fq = &facts[&q];
    assert_eq!(fq.columns(), &[0]);
    assert_eq!(fq.num_rows(), 1);
    assert_eq!(fq.row(0), &[one]);
}

#[test]
fn underivable_columns_are_dropped() {
    // The second argument of p is a free variable in one rule, so the
    // column cannot be tracked.
    let mut program = parse_program(
        "p(1, X).\n\
         p(2, 3).\n",
    )
    .unwrap();
    let p = program.syms.lookup("p").unwrap();

    let facts = bottom_up_facts(&mut program, 5);
    let one = program.store.int(1);
    let two = program.store.int(2);
    let fp = &facts[&p];
    assert_eq!(fp.columns(), &[0]);
    assert_eq!(fp.num_rows(), 2);
    let rows: Vec<_> = (0..fp.num_rows()).map(|r| fp.row(r)[0]).collect();
    assert!(rows.contains(&one));
    assert!(rows.contains(&two));
}

#[test]
fn join_deduction_binds_variables_across_tails() {
    let mut program = parse_program(
        "e(1, 2).\n\
         e(2, 3).\n\
         j(X, Z) :- e(X, Y), e(Y, Z).\n",
    )
    .unwrap();
    let j = program.syms.lookup("j").unwrap();

    let facts = bottom_up_facts(&mut program, 5);
    let one = program.store.int(1);
    let three = program.store.int(3);
    let fj = &facts[&j];
    // Only the combination e(1,2), e(2,3) is consistent.
    assert_eq!(fj.columns(), &[0, 1]);
    assert_eq!(fj.num_rows(), 1);
    assert_eq!(fj.row(0), &[one, three]);
}

#[test]
fn cutoff_prunes_noisy_columns() {
    let mut program = parse_program(
        "p(1, 0).\n\
         p(2, 0).\n\
         p(3, 0).\n",
    )
    .unwrap();
    let p = program.syms.lookup("p").unwrap();

    let facts = bottom_up_facts(&mut program, 2);
    let zero = program.store.int(0);
    let fp = &facts[&p];
    // Column 0 had three distinct values and got pruned away.
    assert_eq!(fp.columns(), &[1]);
    assert_eq!(fp.num_rows(), 1);
    assert_eq!(fp.row(0), &[zero]);
}

#[test]
fn outputs_seed_the_unit_query() {
    let mut program = parse_program(
        "q(X) :- p(X, 2).\n\
         output q.\n",
    )
    .unwrap();
    let p = program.syms.lookup("p").unwrap();
    let q = program.syms.lookup("q").unwrap();

    let facts = top_down_facts(&mut program, 5);
    let two = program.store.int(2);

    let fq = &facts[&q];
    assert_eq!(fq.num_cols(), 0);
    assert!(fq.has_tuples());

    // X is unconstrained by the query, so p's first column is dropped;
    // the constant 2 becomes a query value for the second.
    let fp = &facts[&p];
    assert_eq!(fp.columns(), &[1]);
    assert_eq!(fp.num_rows(), 1);
    assert_eq!(fp.row(0), &[two]);
}

#[test]
fn query_rows_distribute_head_bindings() {
    let mut program = parse_program(
        "sort node.\n\
         decl q(node).\n\
         decl out(node).\n\
         out(3) :- q(3).\n\
         q(X) :- p(X).\n\
         output out.\n",
    )
    .unwrap();
    let p = program.syms.lookup("p").unwrap();
    let q = program.syms.lookup("q").unwrap();

    let facts = top_down_facts(&mut program, 5);
    let three = program.store.int(3);

    // out's unit query reaches q with the constant 3, which flows on into
    // p through the second rule's head unification.
    let fq = &facts[&q];
    assert_eq!(fq.columns(), &[0]);
    assert_eq!(fq.num_rows(), 1);
    assert_eq!(fq.row(0), &[three]);

    let fp = &facts[&p];
    assert_eq!(fp.columns(), &[0]);
    assert_eq!(fp.row(0), &[three]);
}

#[test]
fn bottom_up_and_top_down_intersect() {
    let mut program = parse_program(
        "p(1).\n\
         p(2).\n\
         q(X) :- p(X).\n\
         output q.\n",
    )
    .unwrap();
    let p = program.syms.lookup("p").unwrap();

    let mut up = DataflowEngine::<TupleSet>::new(
        TupleSetCtx::new(5),
        &program.store,
        &program.syms,
        &program.rules,
    );
    up.run_bottom_up();
    let mut down = DataflowEngine::<TupleSet>::new(
        TupleSetCtx::new(5),
        &program.store,
        &program.syms,
        &program.rules,
    );
    down.run_top_down();
    up.intersect(&down);
    let facts = up.into_facts();

    let fp = &facts[&p];
    assert_eq!(fp.columns(), &[0]);
    assert_eq!(fp.num_rows(), 2);
}

#[test]
fn reruns_are_idempotent() {
    let mut program = parse_program(
        "e(1, 2).\n\
         e(2, 3).\n\
         j(X, Z) :- e(X, Y), e(Y, Z).\n",
    )
    .unwrap();
    let first = bottom_up_facts(&mut program, 5);
    let second = bottom_up_facts(&mut program, 5);
    assert_eq!(first, second);
}

#[test]
fn dump_shows_rows_with_wildcards() {
    let mut program = parse_program(
        "p(1, X).\n\
         p(2, X).\n",
    )
    .unwrap();
    let mut engine = DataflowEngine::<TupleSet>::new(
        TupleSetCtx::new(5),
        &program.store,
        &program.syms,
        &program.rules,
    );
    engine.run_bottom_up();
    let dump = engine.dump();
    assert!(dump.contains("p -> "));
    assert!(dump.contains('1'));
    assert!(dump.contains('2'));
}
