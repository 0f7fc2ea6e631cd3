use criterion::{black_box, criterion_group, criterion_main, Criterion};
use portfolio_shield::core::classify;

fn classifier_benchmark(c: &mut Criterion) {
    c.bench_function("classify_clean_request", |b| {
        b.iter(|| {
            classify(
                black_box("Mozilla/5.0 (X11; Linux x86_64) Gecko/20100101 Firefox/118.0"),
                black_box("/projects/"),
            )
        })
    });

    c.bench_function("classify_scanner_path", |b| {
        b.iter(|| classify(black_box("curl/8.4.0"), black_box("/wp-admin/setup-config.php")))
    });
}

criterion_group!(benches, classifier_benchmark);
criterion_main!(benches);
