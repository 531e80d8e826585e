//! Rule exploder tests.

use rulescope::parser::parse_program;
use rulescope::transforms::{Pipeline, RuleExploder};
use rulescope::{Program, RuleSet};

fn explode(program: &mut Program, threshold: usize) -> RuleSet {
    let mut pipeline = Pipeline::new();
    let mut pass = RuleExploder::new(threshold);
    pipeline.apply(
        &mut pass,
        &mut program.store,
        &mut program.syms,
        &program.rules,
    )
}

#[test]
fn specializes_predicates_per_row() {
    // p's only column ranges over {1, 2}: p and q are cloned per row.
    let mut program = parse_program(
        "p(1).\n\
         p(2).\n\
         q(X) :- p(X).\n\
         output q.\n",
    )
    .unwrap();
    let result = explode(&mut program, 2);

    let p0 = program.syms.lookup("p_expl").unwrap();
    let p1 = program.syms.lookup("p_expl0").unwrap();
    let q0 = program.syms.lookup("q_expl").unwrap();
    let q1 = program.syms.lookup("q_expl0").unwrap();
    assert_eq!(program.syms.arity(p0), 0);
    assert_eq!(program.syms.arity(q0), 0);

    assert_eq!(result.len(), 4);
    assert!(result.is_output(q0));
    assert!(result.is_output(q1));

    // p_expl.  p_expl0.  q_expl :- p_expl.  q_expl0 :- p_expl0.
    assert_eq!(result.get(0).head.pred, p0);
    assert!(result.get(0).positive_tail().is_empty());
    assert_eq!(result.get(1).head.pred, p1);
    let r2 = result.get(2);
    assert_eq!(r2.head.pred, q0);
    assert_eq!(r2.positive_tail()[0].pred, p0);
    let r3 = result.get(3);
    assert_eq!(r3.head.pred, q1);
    assert_eq!(r3.positive_tail()[0].pred, p1);
}

#[test]
fn vacuous_negation_is_dropped() {
    // !p(3) can never hold a row of p's tuple set {1, 2}: the literal is
    // vacuously true and disappears from every clone.
    let mut program = parse_program(
        "p(1).\n\
         p(2).\n\
         q(X) :- p(X), !p(3).\n\
         output q.\n",
    )
    .unwrap();
    let result = explode(&mut program, 2);

    assert_eq!(result.len(), 4);
    for rule in result.iter() {
        assert!(rule.negative_tail().is_empty());
    }
    assert!(program.syms.lookup("p_neg").is_none());
}

#[test]
fn determined_negation_resolves_to_a_clone() {
    // !p(2) matches the second row: the clones carry !p_expl0.
    let mut program = parse_program(
        "p(1).\n\
         p(2).\n\
         q(X) :- p(X), !p(2).\n\
         output q.\n",
    )
    .unwrap();
    let result = explode(&mut program, 2);

    let p1 = program.syms.lookup("p_expl0").unwrap();
    let negs: Vec<_> = result
        .iter()
        .flat_map(|r| r.negative_tail().iter())
        .collect();
    assert!(!negs.is_empty());
    for atom in negs {
        assert_eq!(atom.pred, p1);
        assert!(atom.args.is_empty());
    }
}

#[test]
fn undetermined_negation_gets_an_auxiliary_predicate() {
    // X in !p(X) is not fixed by the case split, so an auxiliary
    // predicate enumerating p's rows is synthesized.
    let mut program = parse_program(
        "p(1).\n\
         p(2).\n\
         s(5).\n\
         r(X, Y) :- s(Y), !p(X).\n\
         output r.\n",
    )
    .unwrap();
    let result = explode(&mut program, 3);

    let p_neg = program.syms.lookup("p_neg").unwrap();
    assert_eq!(program.syms.arity(p_neg), 1);

    // p_neg(1) :- p_expl.   p_neg(2) :- p_expl0.
    let p0 = program.syms.lookup("p_expl").unwrap();
    let p1 = program.syms.lookup("p_expl0").unwrap();
    let aux_rules: Vec<_> = result
        .iter()
        .filter(|r| r.head.pred == p_neg)
        .collect();
    assert_eq!(aux_rules.len(), 2);
    assert_eq!(aux_rules[0].positive_tail()[0].pred, p0);
    assert_eq!(aux_rules[1].positive_tail()[0].pred, p1);

    // The translated rule negates the auxiliary predicate.
    let translated: Vec<_> = result
        .iter()
        .filter(|r| !r.negative_tail().is_empty())
        .collect();
    assert_eq!(translated.len(), 1);
    assert_eq!(translated[0].negative_tail()[0].pred, p_neg);
}

#[test]
fn infeasible_interpreted_literals_kill_the_clone() {
    // X = 1 contradicts the row X -> 2, so only one clone survives.
    let mut program = parse_program(
        "p(1).\n\
         p(2).\n\
         q(X) :- p(X), X = 1.\n\
         output q.\n",
    )
    .unwrap();
    let result = explode(&mut program, 2);

    let q_rules: Vec<_> = result
        .iter()
        .filter(|r| !r.positive_tail().is_empty())
        .collect();
    assert_eq!(q_rules.len(), 1);
    let p0 = program.syms.lookup("p_expl").unwrap();
    assert_eq!(q_rules[0].positive_tail()[0].pred, p0);
    // The substituted constraint 1 = 1 simplified away.
    assert!(q_rules[0].interpreted_tail().is_empty());
}

#[test]
fn common_tail_is_factored_once() {
    // Y < 10 involves no bounded variable: it moves into a shared
    // predicate instead of being copied into both clones.
    let mut program = parse_program(
        "p(1).\n\
         p(2).\n\
         q(X) :- p(X), r(Y), Y < 10.\n\
         output q.\n",
    )
    .unwrap();
    let result = explode(&mut program, 2);

    let q_common = program.syms.lookup("q_common").unwrap();
    assert_eq!(program.syms.arity(q_common), 1);

    let common_rules: Vec<_> = result
        .iter()
        .filter(|r| r.head.pred == q_common)
        .collect();
    assert_eq!(common_rules.len(), 1);
    assert!(common_rules[0].positive_tail().is_empty());
    assert_eq!(common_rules[0].interpreted_tail().len(), 1);

    // Both q clones call q_common and carry no inline copy of the
    // constraint.
    let clones: Vec<_> = result
        .iter()
        .filter(|r| {
            r.positive_tail()
                .iter()
                .any(|a| a.pred == q_common)
        })
        .collect();
    assert_eq!(clones.len(), 2);
    for clone in clones {
        assert!(clone.interpreted_tail().is_empty());
    }
    assert_eq!(result.len(), 5);
}

#[test]
fn threshold_one_disables_factoring() {
    let mut program = parse_program(
        "p(1).\n\
         q(X) :- p(X), r(Y), Y < 10.\n\
         output q.\n",
    )
    .unwrap();
    let _result = explode(&mut program, 1);
    assert!(program.syms.lookup("q_common").is_none());
}

#[test]
fn saturated_predicates_pass_through() {
    // p exceeds the cutoff, all of its columns are pruned away, and the
    // fully abstracted fact leaves every rule unchanged.
    let mut program = parse_program(
        "p(1).\n\
         p(2).\n\
         p(3).\n\
         q(X) :- p(X).\n\
         output q.\n",
    )
    .unwrap();
    let q = program.syms.lookup("q").unwrap();
    let p = program.syms.lookup("p").unwrap();
    let result = explode(&mut program, 2);

    assert_eq!(result.len(), 4);
    assert!(program.syms.lookup("p_expl").is_none());
    assert!(program.syms.lookup("q_expl").is_none());
    let last = result.get(3);
    assert_eq!(last.head.pred, q);
    assert_eq!(last.positive_tail()[0].pred, p);
    assert!(result.is_output(q));
}

#[test]
fn exploding_twice_adds_nothing() {
    let mut program = parse_program(
        "p(1).\n\
         p(2).\n\
         q(X) :- p(X).\n\
         output q.\n",
    )
    .unwrap();
    let once = explode(&mut program, 2);

    let mut pipeline = Pipeline::new();
    let mut pass = RuleExploder::new(2);
    let twice = pipeline.apply(
        &mut pass,
        &mut program.store,
        &mut program.syms,
        &once,
    );
    assert_eq!(once.len(), twice.len());
    assert!(program.syms.lookup("p_expl_expl").is_none());
}
