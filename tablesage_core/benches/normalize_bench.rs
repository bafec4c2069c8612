use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use tablesage_core::normalize::{merge_tables, read_csv, split_text_lines};
use tablesage_core::RawTable;

fn generate_csv(num_rows: usize) -> Vec<u8> {
    let mut csv = String::from("id,product,qty,price,in_stock\n");
    for i in 0..num_rows {
        csv.push_str(&format!(
            "{},Product {},{},{:.2},{}\n",
            i,
            i % 97,
            i % 13,
            9.99 + (i % 50) as f64,
            i % 2 == 0
        ));
    }
    csv.into_bytes()
}

fn generate_text(num_lines: usize) -> String {
    (0..num_lines)
        .map(|i| match i % 3 {
            0 => format!("item {},{},{}", i, i * 2, i * 3),
            1 => format!("item {}\t{}", i, i * 2),
            _ => format!("note line {}", i),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn raw_table(columns: &[&str], num_rows: usize) -> RawTable {
    RawTable::new(
        columns.iter().map(|c| c.to_string()).collect(),
        (0..num_rows)
            .map(|i| columns.iter().map(|_| Some(i.to_string())).collect())
            .collect(),
    )
}

fn csv_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize_csv");

    for num_rows in [100, 1000, 10000].iter() {
        let data = generate_csv(*num_rows);
        group.throughput(Throughput::Bytes(data.len() as u64));

        group.bench_with_input(BenchmarkId::new("read_csv", num_rows), &data, |b, data| {
            b.iter(|| black_box(read_csv(data).unwrap()))
        });
    }

    group.finish();
}

fn pdf_fallback_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize_pdf");

    for num_lines in [100, 1000].iter() {
        let text = generate_text(*num_lines);
        group.throughput(Throughput::Elements(*num_lines as u64));

        group.bench_with_input(
            BenchmarkId::new("split_text_lines", num_lines),
            &text,
            |b, text| b.iter(|| black_box(split_text_lines(text))),
        );
    }

    group.bench_function("merge_tables_3x1000", |b| {
        b.iter_batched(
            || {
                vec![
                    raw_table(&["x", "y"], 1000),
                    raw_table(&["y", "z"], 1000),
                    raw_table(&["w", "x"], 1000),
                ]
            },
            |tables| black_box(merge_tables(tables).unwrap()),
            criterion::BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group!(benches, csv_benchmark, pdf_fallback_benchmark);
criterion_main!(benches);
