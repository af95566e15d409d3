use criterion::{criterion_group, criterion_main, Criterion};

fn criterion(criterion: &mut Criterion) {
    order_store::bench::main(criterion);
}

criterion_group!(benches, criterion);
criterion_main!(benches);
