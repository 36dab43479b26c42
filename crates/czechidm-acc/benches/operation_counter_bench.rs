// Benchmarks for the provisioning break hot path
// Measures window recording under different window sizes and the full evaluation

use std::hint::black_box;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use uuid::Uuid;

use czechidm_acc::{
    NotificationLogService, OperationCounterCache, ProvisioningBreakConfigService,
    ProvisioningBreakEvaluator,
};
use czechidm_common::{IdmConfiguration, ProvisioningEventType, SystemClock};
use czechidm_persistence::{BreakConfigInfo, MemoryPersistService, SystemInfo, SystemPersistence};

fn bench_record_and_count(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_and_count");
    for period in [1_000i64, 60_000, 3_600_000] {
        let cache = OperationCounterCache::new(Arc::new(SystemClock));
        let system_id = Uuid::new_v4();
        group.bench_with_input(BenchmarkId::from_parameter(period), &period, |b, period| {
            b.iter(|| {
                black_box(cache.record_and_count(
                    system_id,
                    ProvisioningEventType::Update,
                    *period,
                ))
            })
        });
    }
    group.finish();
}

fn bench_record_many_systems(c: &mut Criterion) {
    let cache = OperationCounterCache::new(Arc::new(SystemClock));
    let systems: Vec<Uuid> = (0..64).map(|_| Uuid::new_v4()).collect();

    c.bench_function("record_and_count_64_systems", |b| {
        b.iter(|| {
            for system_id in &systems {
                black_box(cache.record_and_count(
                    *system_id,
                    ProvisioningEventType::Create,
                    1_000,
                ));
            }
        })
    });
}

fn bench_concurrent_record(c: &mut Criterion) {
    let cache = Arc::new(OperationCounterCache::new(Arc::new(SystemClock)));
    let system_id = Uuid::new_v4();

    c.bench_function("record_and_count_4_threads", |b| {
        b.iter(|| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let cache = cache.clone();
                    std::thread::spawn(move || {
                        for _ in 0..25 {
                            cache.record_and_count(system_id, ProvisioningEventType::Delete, 1_000);
                        }
                    })
                })
                .collect();

            for handle in handles {
                handle.join().unwrap();
            }
        })
    });
}

fn bench_evaluate(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = Arc::new(MemoryPersistService::new());
    let counter = Arc::new(OperationCounterCache::new(Arc::new(SystemClock)));
    let configs = Arc::new(ProvisioningBreakConfigService::new(
        store.clone(),
        Arc::new(IdmConfiguration::default()),
        counter,
    ));
    let evaluator = ProvisioningBreakEvaluator::new(
        store.clone(),
        configs.clone(),
        Arc::new(NotificationLogService::default()),
    );

    let system = rt.block_on(async {
        let system = store.system_save(&SystemInfo::new("bench")).await.unwrap();
        let mut config = BreakConfigInfo::new(system.id, ProvisioningEventType::Update);
        config.period = Some(1_000);
        config.warning_limit = Some(i64::MAX);
        configs.save(&config).await.unwrap();
        system
    });

    c.bench_function("evaluate_allowed", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(
                evaluator
                    .evaluate(&system, ProvisioningEventType::Update)
                    .await
                    .unwrap(),
            )
        })
    });
}

criterion_group!(
    benches,
    bench_record_and_count,
    bench_record_many_systems,
    bench_concurrent_record,
    bench_evaluate,
);
criterion_main!(benches);
