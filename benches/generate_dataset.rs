//! Dataset generation throughput.
//!
//! Run:
//! - cargo bench --bench generate_dataset

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use dpa_fakegen::config::GeneratorConfig;
use dpa_fakegen::sim::Generator;

const SUBJECT_COUNTS: [u32; 3] = [5, 20, 50];

fn config(n_subjs: u32) -> GeneratorConfig {
    let mut cfg = GeneratorConfig::default();
    cfg.dataset.n_subjs = n_subjs;
    cfg
}

fn bench_plain(c: &mut Criterion) {
    let mut group = c.benchmark_group("generate_plain");
    group.sample_size(10);
    for &n in &SUBJECT_COUNTS {
        let cfg = config(n);
        group.bench_with_input(BenchmarkId::new("subjs", n), &cfg, |b, cfg| {
            b.iter(|| {
                let out = Generator::new(cfg.clone(), 1).unwrap().run();
                black_box(out.dataset.len())
            })
        });
    }
    group.finish();
}

fn bench_forced(c: &mut Criterion) {
    let mut group = c.benchmark_group("generate_forced");
    group.sample_size(10);
    for memory_efficient in [false, true] {
        let mut cfg = config(20);
        cfg.correction.force_dpoint = true;
        cfg.correction.memory_efficient = memory_efficient;
        let id = BenchmarkId::new("memory_efficient", memory_efficient);
        group.bench_with_input(id, &cfg, |b, cfg| {
            b.iter(|| {
                let out = Generator::new(cfg.clone(), 1).unwrap().run();
                black_box(out.dataset.len())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_plain, bench_forced);
criterion_main!(benches);
