use std::fs;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lmcal_io::{read_table, read_tensile_test_data, Delimiter};

fn synthetic_csv(rows: usize, orientations: usize) -> String {
    let mut text = String::new();
    let ids: Vec<String> = (0..orientations).map(|k| format!("{} deg,", k * 45)).collect();
    text.push_str(&ids.join(","));
    text.push('\n');
    for _ in 0..orientations {
        text.push_str("eng. strain,eng. stress /Mpa,");
    }
    text.pop();
    text.push('\n');
    for row in 0..rows {
        let strain = row as f64 * 1e-4;
        let fields: Vec<String> = (0..orientations)
            .flat_map(|k| [format!("{strain}"), format!("{}", 300.0 + k as f64 + strain * 1e3)])
            .collect();
        text.push_str(&fields.join(","));
        text.push('\n');
    }
    text
}

fn read_table_bench(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tensile.csv");
    fs::write(&path, synthetic_csv(5_000, 3)).unwrap();

    c.bench_function("read_table_5k_rows", |b| {
        b.iter(|| {
            let table = read_table(&path, Delimiter::Char(b','), 2, 1).unwrap();
            black_box(table);
        });
    });
    c.bench_function("read_tensile_test_data_5k_rows", |b| {
        b.iter(|| {
            let records = read_tensile_test_data(&path).unwrap();
            black_box(records);
        });
    });
}

criterion_group!(benches, read_table_bench);
criterion_main!(benches);
