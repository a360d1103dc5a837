use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use meeple_core::{Document, HashingEmbedder, IndexBuilder};
use meeple_search::normalize::z_normalize;
use meeple_search::{HybridRetriever, SearchParams};

const TIERS: &[(&str, usize)] = &[("small", 200), ("medium", 2_000), ("large", 10_000)];

const MECHANICS: &[&str] = &[
    "Deck Building",
    "Worker Placement",
    "Area Control",
    "Dice Rolling",
    "Tile Placement",
    "Set Collection",
    "Hidden Roles",
    "Cooperative",
    "Trading",
    "Engine Building",
];

const GENRES: &[&str] = &["family", "strategy", "party", "eurogame", "abstract"];

fn synthetic_corpus(size: usize) -> Vec<Document> {
    (0..size)
        .map(|i| {
            let a = MECHANICS[i % MECHANICS.len()];
            let b = MECHANICS[(i * 7 + 3) % MECHANICS.len()];
            let genre = GENRES[(i / 3) % GENRES.len()];
            Document::new(
                format!("G{i:05}"),
                format!("Game {i} blends {a}, {b} within a {genre} frame"),
            )
        })
        .collect()
}

fn retriever(size: usize) -> HybridRetriever {
    let embedder = HashingEmbedder::new(384).expect("embedder");
    let bundle = IndexBuilder::new(&embedder)
        .build(&synthetic_corpus(size))
        .expect("build");
    HybridRetriever::new(bundle.lexical, bundle.vector, Box::new(embedder), 0.5)
        .expect("retriever")
}

fn bench_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("fusion.search");
    let params = SearchParams::default();

    for &(name, size) in TIERS {
        let r = retriever(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("hybrid", name), &r, |b, r| {
            b.iter(|| black_box(r.search("cooperative deck building", &params)));
        });
    }

    group.finish();
}

fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("fusion.normalize");
    for pool in [10_usize, 100, 1_000] {
        let values: Vec<f64> = (0..pool).map(|i| (i as f64).sin()).collect();
        group.bench_with_input(BenchmarkId::from_parameter(pool), &values, |b, values| {
            b.iter(|| black_box(z_normalize(values)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_search, bench_normalize);
criterion_main!(benches);
