//! Benchmarks for node selection and transport lookup.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use nodeproxy::proxy::{HyperTransportFactory, TransportPool};
use nodeproxy::selector::{self, DoneInfo, Node, Rebalancer, Scope, Selector, StaticSelector, filter};
use nodeproxy::util::{generate_request_id, generate_short_request_id};
use std::sync::Arc;

fn nodes(count: usize) -> Vec<Node> {
    (0..count)
        .map(|i| {
            Node::new("http", format!("127.0.0.1:{}", 9000 + i))
                .with_weight((i + 1) as u64)
                .with_version(if i % 2 == 0 { "v1" } else { "v2" })
        })
        .collect()
}

fn selectors() -> Vec<(&'static str, Arc<dyn Selector>)> {
    vec![
        ("random", Arc::new(selector::random()) as Arc<dyn Selector>),
        ("wrr", Arc::new(selector::wrr()) as Arc<dyn Selector>),
        ("p2c", Arc::new(selector::p2c()) as Arc<dyn Selector>),
        ("static", Arc::new(StaticSelector::new()) as Arc<dyn Selector>),
    ]
}

fn benchmark_select(c: &mut Criterion) {
    let mut group = c.benchmark_group("select");

    for size in [2, 10, 100] {
        for (name, selector) in selectors() {
            selector.apply(nodes(size));
            group.bench_with_input(BenchmarkId::new(name, size), &selector, |b, selector| {
                b.iter(|| {
                    let (node, done) = selector
                        .select(&mut Scope::new())
                        .map(|s| s.into_parts())
                        .unwrap();
                    done(DoneInfo::success());
                    black_box(node);
                })
            });
        }
    }

    group.finish();
}

fn benchmark_filtered_select(c: &mut Criterion) {
    let selector = selector::wrr();
    selector.apply(nodes(100));
    let version = filter::version("v2");

    c.bench_function("select_filtered_100", |b| {
        b.iter(|| {
            let mut scope = Scope::new().with_filter(Arc::clone(&version));
            black_box(selector.select(&mut scope).unwrap());
        })
    });
}

fn benchmark_apply(c: &mut Criterion) {
    let selector = selector::p2c();
    let a = nodes(100);
    let mut b_nodes = nodes(100);
    b_nodes.truncate(90);

    c.bench_function("apply_merge_100", |b| {
        let mut flip = false;
        b.iter(|| {
            flip = !flip;
            selector.apply(if flip { a.clone() } else { b_nodes.clone() });
        })
    });
}

fn benchmark_pool_lookup(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let _guard = runtime.enter();

    let pool = TransportPool::new(Arc::new(HyperTransportFactory::default()));
    let nodes = nodes(10);
    for node in &nodes {
        pool.get_or_create(node);
    }

    c.bench_function("pool_get_or_create_hit", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % nodes.len();
            black_box(pool.get_or_create(&nodes[i]));
        })
    });
}

fn benchmark_request_id(c: &mut Criterion) {
    c.bench_function("generate_request_id_uuid", |b| {
        b.iter(|| black_box(generate_request_id()))
    });

    c.bench_function("generate_request_id_short", |b| {
        b.iter(|| black_box(generate_short_request_id()))
    });
}

criterion_group!(
    benches,
    benchmark_select,
    benchmark_filtered_select,
    benchmark_apply,
    benchmark_pool_lookup,
    benchmark_request_id,
);
criterion_main!(benches);
