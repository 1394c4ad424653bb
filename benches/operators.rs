use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ift::{ChainOperator, SandwichOperator, SumOperator};

mod common;
use common::{dense, positive_diagonal, random_field};

fn bench_apply(c: &mut Criterion) {
    let mut group = c.benchmark_group("apply");
    for n in [16, 128, 512] {
        let x = random_field(n, 1);
        let a = dense(n, 2);
        let diag = positive_diagonal(n);
        let chain = ChainOperator::make(vec![diag.clone(), a.clone(), diag.clone()]).unwrap();
        let sum = SumOperator::make(vec![a.clone(), diag.clone()], vec![false, true]).unwrap();
        let sandwich = SandwichOperator::make(a.clone(), Some(diag.clone())).unwrap();

        group.bench_with_input(BenchmarkId::new("dense", n), &x, |b, x| {
            b.iter(|| black_box(a.times(black_box(x)).unwrap()))
        });
        group.bench_with_input(BenchmarkId::new("chain", n), &x, |b, x| {
            b.iter(|| black_box(chain.times(black_box(x)).unwrap()))
        });
        group.bench_with_input(BenchmarkId::new("sum_adjoint", n), &x, |b, x| {
            b.iter(|| black_box(sum.adjoint_times(black_box(x)).unwrap()))
        });
        group.bench_with_input(BenchmarkId::new("sandwich", n), &x, |b, x| {
            b.iter(|| black_box(sandwich.times(black_box(x)).unwrap()))
        });
    }
    group.finish();
}

fn bench_simplify(c: &mut Criterion) {
    let mut group = c.benchmark_group("simplify");
    for len in [4, 32] {
        let ops: Vec<_> = (0..len).map(|_| positive_diagonal(256)).collect();
        group.bench_with_input(BenchmarkId::new("diagonal_chain", len), &ops, |b, ops| {
            b.iter(|| black_box(ChainOperator::make(black_box(ops.clone())).unwrap()))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_apply, bench_simplify);
criterion_main!(benches);
