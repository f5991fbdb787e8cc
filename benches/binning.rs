use chronofeat::grid::TimeGrid;
use chronofeat::impute::impute_values;
use chronofeat::mask::{delta_time, presence_mask};
use chronofeat::pivot::pivot_events;
use chronofeat::types::{Event, ImputeMethod, Value};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_events(n_events: usize, n_variables: usize, t_max: f64) -> Vec<Event> {
    let mut rng = StdRng::seed_from_u64(0xB1A5 + n_events as u64);
    (0..n_events)
        .map(|_| Event {
            entity: "p1".to_string(),
            t: rng.gen_range(0.0..t_max),
            variable: format!("var_{}", rng.gen_range(0..n_variables)),
            value: Some(Value::Num(rng.gen_range(0.0..200.0))),
        })
        .collect()
}

fn benchmark_entity_stages(c: &mut Criterion) {
    let t_max = 48.0;
    let grid = TimeGrid::new(t_max, 1.0).unwrap();
    let sizes = [100_usize, 1_000, 10_000];
    let streams: Vec<_> = sizes
        .iter()
        .map(|&n| (n, random_events(n, 20, t_max)))
        .collect();

    let mut group = c.benchmark_group("entity_stages");
    for (n, events) in streams.iter() {
        group.throughput(Throughput::Elements(*n as u64));

        group.bench_with_input(BenchmarkId::new("pivot", n), events, |b, input| {
            b.iter(|| {
                let table = pivot_events(black_box(input)).unwrap();
                black_box(table);
            });
        });

        let table = pivot_events(events).unwrap();
        let variables: Vec<String> = (0..20).map(|i| format!("var_{i}")).collect();

        group.bench_with_input(BenchmarkId::new("mask_and_delta", n), &table, |b, input| {
            b.iter(|| {
                let mask = presence_mask(black_box(input), &variables, &grid);
                let delta = delta_time(&mask);
                black_box(delta);
            });
        });

        group.bench_with_input(BenchmarkId::new("impute_ffill", n), &table, |b, input| {
            b.iter(|| {
                let imputed = impute_values(
                    black_box(input),
                    &variables,
                    &grid,
                    None,
                    ImputeMethod::Ffill,
                )
                .unwrap();
                black_box(imputed);
            });
        });
    }
    group.finish();
}

criterion_group!(binning, benchmark_entity_stages);
criterion_main!(binning);
