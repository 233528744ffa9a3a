use criterion::{criterion_group, criterion_main, Criterion};
use reel_core::search::{normalize, shadowed};
use reel_core::{DocumentStoreClient, MemoryStore, Patch, PrefixSearchIndex};
use std::sync::Arc;
use tokio::runtime::Runtime;

const WORDS: [&str; 8] = ["alpha", "Alpine", "beta", "Bravo", "café", "delta", "Echo", "alphabet"];

fn bench_normalize(c: &mut Criterion) {
    c.bench_function("normalize_title", |b| b.iter(|| normalize("Crème Brûlée at MIDNIGHT")));
}

fn bench_prefix_search(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let index = rt.block_on(async {
        let client = DocumentStoreClient::new(Arc::new(MemoryStore::new()));
        for n in 0..2_000 {
            let title = format!("{} {n}", WORDS[n % WORDS.len()]);
            client.add("posts", shadowed(Patch::new(), "title", "titleLower", &title), None).await.unwrap();
        }
        PrefixSearchIndex::new(client)
    });

    c.bench_function("prefix_search_2k", |b| {
        b.to_async(&rt).iter(|| async { index.search("posts", "titleLower", "alph").await.unwrap() })
    });
    c.bench_function("fan_out_search_2k", |b| {
        b.to_async(&rt)
            .iter(|| async { index.search_any("posts", &["titleLower", "creator.nameLower"], "al").await.unwrap() })
    });
}

criterion_group!(benches, bench_normalize, bench_prefix_search);
criterion_main!(benches);
