//! Anonymization benchmarks: full lattice search and local recoding.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use latticeveil::{
    AnonymizationConfig, Anonymizer, DataDefinition, Hierarchy, KAnonymity, MemoryDataManager,
    NoopListener,
};

/// Synthetic age/zip dataset: `size` rows over two quasi-identifiers with
/// three and four hierarchy levels. Row values are spread unevenly so the
/// optimum keeps outliers for the recoding benchmark to work on.
fn make_dataset(size: u32) -> (Vec<Vec<String>>, DataDefinition) {
    let ages: Vec<Vec<String>> = (0..60u32)
        .map(|a| {
            let age = 18 + a;
            vec![
                age.to_string(),
                format!("{}-{}", age / 10 * 10, age / 10 * 10 + 9),
                "*".to_string(),
            ]
        })
        .collect();
    let zips: Vec<Vec<String>> = (0..50u32)
        .map(|z| {
            let zip = 10_000 + z * 37;
            vec![
                zip.to_string(),
                format!("{}*", zip / 10),
                format!("{}**", zip / 100),
                "*".to_string(),
            ]
        })
        .collect();
    let table: Vec<Vec<String>> = (0..size)
        .map(|i| {
            let age = ages[(i * 13 % 60) as usize][0].clone();
            let zip = zips[(i * 7 % 50) as usize][0].clone();
            vec![age, zip]
        })
        .collect();
    let definition = DataDefinition::new()
        .quasi_identifier("age", Hierarchy::new(ages))
        .quasi_identifier("zip", Hierarchy::new(zips));
    (table, definition)
}

fn config() -> AnonymizationConfig {
    AnonymizationConfig::new()
        .with_model(KAnonymity::new(5))
        .with_suppression_limit(0.2)
        .with_gs_factor(0.3)
}

fn bench_anonymize(c: &mut Criterion) {
    let mut group = c.benchmark_group("anonymize");
    for size in [1_000u32, 10_000] {
        let (table, definition) = make_dataset(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let manager =
                    MemoryDataManager::from_table(&["age", "zip"], &table, &definition).unwrap();
                Anonymizer::new()
                    .anonymize(manager, definition.clone(), config())
                    .unwrap()
            });
        });
    }
    group.finish();
}

fn bench_local_recoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("local_recoding");
    for size in [1_000u32, 10_000] {
        let (table, definition) = make_dataset(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let manager =
                    MemoryDataManager::from_table(&["age", "zip"], &table, &definition).unwrap();
                let result = Anonymizer::new()
                    .anonymize(manager, definition.clone(), config())
                    .unwrap();
                let handle = result.output().unwrap();
                let mut listener = NoopListener;
                result
                    .optimize_with(&handle, Some(0.8), &mut listener)
                    .unwrap()
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_anonymize, bench_local_recoding);
criterion_main!(benches);
