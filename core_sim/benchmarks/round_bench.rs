use core_sim::{
    build_app_from_scenario, random_connected_scenario, run_round, ParticleId, ParticleSeed,
    ProgramSeed, Scenario,
};
use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};

fn walker_line(count: usize) -> Scenario {
    Scenario {
        name: format!("walker-line-{count}"),
        anchor: Some(ParticleId(0)),
        particles: (0..count)
            .map(|i| ParticleSeed {
                x: i as i32,
                y: 0,
                head: None,
                chirality: Default::default(),
                compass: 0,
                program: ProgramSeed::Walker { direction: 0 },
            })
            .collect(),
        objects: Vec::new(),
    }
}

fn bench_round(c: &mut Criterion) {
    let mut group = c.benchmark_group("round");

    for size in [16usize, 64, 128] {
        group.bench_with_input(BenchmarkId::new("idle_blob", size), &size, |b, &size| {
            b.iter_batched(
                || build_app_from_scenario(random_connected_scenario(42, size)),
                |mut app| {
                    run_round(&mut app).expect("idle round commits");
                },
                BatchSize::SmallInput,
            )
        });
    }

    for size in [8usize, 32, 64] {
        group.bench_with_input(BenchmarkId::new("walker_line", size), &size, |b, &size| {
            b.iter_batched(
                || {
                    let mut app = build_app_from_scenario(walker_line(size));
                    // Warm up past the initial expansion so the steady-state
                    // handover chain is what gets measured.
                    for _ in 0..2 {
                        run_round(&mut app).expect("warmup round commits");
                    }
                    app
                },
                |mut app| {
                    run_round(&mut app).expect("walker round commits");
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

criterion_group!(round_benches, bench_round);
criterion_main!(round_benches);
