//! Fixpoint and transformation benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use rulescope::dataflow::reachability::{ArgReachability, ArgReachabilityCtx};
use rulescope::dataflow::tuple_set::{TupleSet, TupleSetCtx};
use rulescope::dataflow::DataflowEngine;
use rulescope::parser::parse_program;
use rulescope::transforms::{Pipeline, RuleExploder};

/// A chain of `n` predicates forwarding two base values.
fn chain_program(n: usize) -> String {
    let mut src = String::from("p0(1).\np0(2).\n");
    for i in 1..n {
        src.push_str(&format!("p{}(X) :- p{}(X).\n", i, i - 1));
    }
    src.push_str(&format!("output p{}.\n", n - 1));
    src
}

fn bench_reachability(c: &mut Criterion) {
    let src = chain_program(50);
    let program = parse_program(&src).unwrap();
    c.bench_function("reachability_bottom_up_chain50", |b| {
        b.iter(|| {
            let mut engine = DataflowEngine::<ArgReachability>::new(
                ArgReachabilityCtx::new(),
                &program.store,
                &program.syms,
                &program.rules,
            );
            engine.run_bottom_up();
            black_box(engine.dump().len())
        })
    });
}

fn bench_tuple_set(c: &mut Criterion) {
    let src = chain_program(50);
    let program = parse_program(&src).unwrap();
    c.bench_function("tuple_set_bottom_up_chain50", |b| {
        b.iter(|| {
            let mut engine = DataflowEngine::<TupleSet>::new(
                TupleSetCtx::new(5),
                &program.store,
                &program.syms,
                &program.rules,
            );
            engine.run_bottom_up();
            black_box(engine.dump().len())
        })
    });
}

fn bench_exploder(c: &mut Criterion) {
    let src = chain_program(20);
    c.bench_function("exploder_chain20", |b| {
        b.iter_batched(
            || parse_program(&src).unwrap(),
            |mut program| {
                let mut pipeline = Pipeline::new();
                let mut pass = RuleExploder::new(2);
                let result = pipeline.apply(
                    &mut pass,
                    &mut program.store,
                    &mut program.syms,
                    &program.rules,
                );
                black_box(result.len())
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_reachability, bench_tuple_set, bench_exploder);
criterion_main!(benches);
