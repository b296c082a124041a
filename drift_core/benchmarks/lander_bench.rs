use chrono::{Duration, TimeZone, Utc};
use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use drift_core::{FinalizeOptions, GridBounds, RunConfig};
use drift_schema::ParticleSample;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

fn synthetic_samples(count: usize, bounds: GridBounds, hours: usize) -> Vec<ParticleSample> {
    let mut rng = SmallRng::seed_from_u64(0x5eed);
    let start = Utc.with_ymd_and_hms(2023, 4, 12, 15, 0, 0).unwrap();
    let minutes = (hours * 60) as i64;
    (0..count)
        .map(|_| {
            ParticleSample::new(
                rng.gen_range(bounds.min_lat..bounds.max_lat),
                rng.gen_range(bounds.min_lon..bounds.max_lon),
                start + Duration::minutes(rng.gen_range(0..minutes)),
            )
            .with_value("salinity", rng.gen_range(20.0..35.0))
            .with_value("temperature", rng.gen_range(4.0..12.0))
        })
        .collect()
}

fn bench_record_batch(c: &mut Criterion) {
    let config = RunConfig::builtin();
    let mut group = c.benchmark_group("lander_record");

    for &count in &[10_000usize, 100_000] {
        let samples = synthetic_samples(count, config.grid.bounds, config.run.length_hours);

        group.bench_with_input(BenchmarkId::new("sequential", count), &samples, |b, samples| {
            b.iter_batched(
                || config.lander_grid().unwrap(),
                |landers| {
                    for sample in samples {
                        landers.record(sample);
                    }
                    landers
                },
                BatchSize::LargeInput,
            );
        });

        group.bench_with_input(BenchmarkId::new("parallel", count), &samples, |b, samples| {
            b.iter_batched(
                || config.lander_grid().unwrap(),
                |landers| {
                    landers.record_batch(samples);
                    landers
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_finalize(c: &mut Criterion) {
    let config = RunConfig::builtin();
    let samples = synthetic_samples(20_000, config.grid.bounds, config.run.length_hours);

    c.bench_function("lander_finalize", |b| {
        b.iter_batched(
            || {
                let landers = config.lander_grid().unwrap();
                landers.record_batch(&samples);
                landers
            },
            |landers| landers.finalize(FinalizeOptions::default()),
            BatchSize::LargeInput,
        );
    });
}

criterion_group!(benches, bench_record_batch, bench_finalize);
criterion_main!(benches);
