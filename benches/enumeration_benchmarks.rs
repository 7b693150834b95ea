extern crate finite_algebra;

use std::rc::Rc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use finite_algebra::catalog;
use finite_algebra::congruence::congruence_lattice;
use finite_algebra::methods::{subuniverses, Strategy};
use finite_algebra::model::Model;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn congruences_of_chain(n: usize) -> usize {
    let chain = catalog::chain(n);
    congruence_lattice(chain.model())
        .expect("chains have congruence lattices")
        .len()
}

fn subuniverses_of_square(strategy: Strategy) -> usize {
    let c3 = catalog::chain(3).model().clone();
    let square = Model::power(&c3, 2).expect("powers of a chain are models");
    subuniverses(&square, square.signature(), true, strategy)
        .expect("the square has every symbol")
        .count()
}

fn criterion_bench_congruences(c: &mut Criterion) {
    init();
    let mut grp = c.benchmark_group("congruence lattices");
    for n in [4, 6, 8] {
        grp.bench_function(format!("chain-{}", n), |b| {
            b.iter(|| black_box(congruences_of_chain(n)))
        });
    }
    grp.finish();
}

fn criterion_bench_subuniverses(c: &mut Criterion) {
    init();
    let mut grp = c.benchmark_group("subuniverse enumeration");
    grp.sample_size(10);
    grp.bench_function("c3-squared-generator-join", |b| {
        b.iter(|| black_box(subuniverses_of_square(Strategy::GeneratorJoin)))
    });
    grp.bench_function("c3-squared-power-set", |b| {
        b.iter(|| black_box(subuniverses_of_square(Strategy::PowerSet)))
    });
    grp.finish();
}

fn criterion_bench_rhombus(c: &mut Criterion) {
    let rhombus = Rc::new(catalog::rhombus_poset());
    c.bench_function("rhombus-poset-subuniverses", |b| {
        b.iter(|| {
            black_box(
                subuniverses(&rhombus, rhombus.signature(), true, Strategy::GeneratorJoin)
                    .map(|s| s.count())
                    .unwrap_or(0),
            )
        })
    });
}

criterion_group!(
    enumeration,
    criterion_bench_congruences,
    criterion_bench_subuniverses,
    criterion_bench_rhombus
);
criterion_main!(enumeration);
