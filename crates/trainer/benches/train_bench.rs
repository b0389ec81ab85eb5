use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use taxi_duration_core::{CsrMatrix, DictVectorizer};
use taxi_duration_trainer::{
    BoosterParams, FeatureRecord, GbdtTrainer, LabeledMatrix, LcgRng, TrainerConfig,
};

const TRIPS: usize = 2_000;

/// Synthetic trips over 40 zone pairs; duration grows with distance
fn synthetic_trips() -> (CsrMatrix, Vec<f64>) {
    let mut rng = LcgRng::new(42);
    let mut records = Vec::with_capacity(TRIPS);
    let mut labels = Vec::with_capacity(TRIPS);

    for _ in 0..TRIPS {
        let pu = rng.next_i64() % 8;
        let dox = rng.next_i64() % 5;
        let distance = rng.next_unit_micro() as f64 / 50_000.0;
        records.push(
            FeatureRecord {
                pu_do: format!("{pu}_{dox}"),
                trip_distance: distance,
            }
            .to_dict(),
        );
        labels.push(3.0 + 2.5 * distance + pu as f64);
    }

    let (_, matrix) = DictVectorizer::new().fit_transform(&records);
    (matrix, labels)
}

fn bench_training(c: &mut Criterion) {
    let (matrix, labels) = synthetic_trips();
    let config = TrainerConfig {
        params: BoosterParams {
            max_depth: 6,
            ..BoosterParams::tuned()
        },
        num_boost_round: 10,
        early_stopping_rounds: None,
        quant_step: 10_000,
    };

    let mut group = c.benchmark_group("gbdt_training");
    group.throughput(Throughput::Elements(TRIPS as u64));
    group.sample_size(10);
    group.bench_function("sparse_trips_10_rounds", |b| {
        b.iter(|| {
            let data = LabeledMatrix::new(&matrix, &labels).unwrap();
            let trained = GbdtTrainer::new(config.clone()).train(data, data).unwrap();
            black_box(trained.model.num_trees());
        });
    });
    group.finish();
}

criterion_group!(trainer_benches, bench_training);
criterion_main!(trainer_benches);
