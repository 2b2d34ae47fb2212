use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use runtime_host::checktx::{evaluate_batch, SentinelPolicy};
use runtime_host::commitment::{BlockHeader, CommitmentBuilder};
use runtime_host::context::CallContext;
use runtime_host::host::mock::default_tags;
use runtime_host::storage::MemoryTree;
use runtime_host::transaction::{Transaction, Tree};
use runtime_host::{Namespace, Root, RootKind};

fn batch(n: usize) -> Vec<Vec<u8>> {
    (0..n).map(|i| format!("transaction-{:08}", i).into_bytes()).collect()
}

fn batch_tree_benchmarks(c: &mut Criterion) {
    let ctx = CallContext::background();
    let tags = default_tags();
    let mut group = c.benchmark_group("batch_tree");

    for n in [10usize, 100, 1000] {
        let inputs = batch(n);
        group.bench_with_input(BenchmarkId::new("input_and_io_roots", n), &inputs, |b, inputs| {
            b.iter(|| {
                let root = Root::empty(Namespace::default(), 1, RootKind::Input);
                let mut tree = Tree::new(Box::new(MemoryTree::new()), root);
                for input in inputs {
                    tree.add_transaction(&ctx, &Transaction::input(input.clone()), &tags).unwrap();
                }
                tree.commit(&ctx).unwrap();
                let mut tree = tree.next_scope(RootKind::Output).unwrap();
                for input in inputs {
                    tree.add_transaction(&ctx, &Transaction::executed(input.clone(), input.clone()), &tags).unwrap();
                }
                tree.commit(&ctx).unwrap()
            })
        });
    }
    group.finish();
}

fn commitment_benchmarks(c: &mut Criterion) {
    let previous = BlockHeader::genesis(Namespace::default(), 0);
    c.bench_function("results_header_hash", |b| {
        b.iter(|| CommitmentBuilder::on_top_of(&previous).unwrap().build().encoded_hash())
    });
}

fn checktx_benchmarks(c: &mut Criterion) {
    let policy = SentinelPolicy::with_max_tx_size(Some(64));
    let inputs = batch(1000);
    c.bench_function("checktx_1000", |b| b.iter(|| evaluate_batch(&policy, &inputs)));
}

criterion_group!(benches, batch_tree_benchmarks, commitment_benchmarks, checktx_benchmarks);
criterion_main!(benches);
