use criterion::{black_box, criterion_group, criterion_main, Criterion};
use imagepile::store::Store;
use imagepile::BLOCK_SIZE;
use tempfile::tempdir;

fn bench_resolve_or_insert(c: &mut Criterion) {
    let novel = vec![0xABu8; BLOCK_SIZE];

    c.bench_function("resolve_or_insert_novel_block", |b| {
        let dir = tempdir().unwrap();
        let mut store = Store::open(dir.path()).unwrap();
        let mut seed = 0u8;
        b.iter(|| {
            let mut block = [0u8; BLOCK_SIZE];
            block[0] = seed;
            seed = seed.wrapping_add(1);
            store.resolve_or_insert(black_box(&block)).unwrap()
        });
    });

    c.bench_function("resolve_or_insert_repeated_block", |b| {
        let dir = tempdir().unwrap();
        let mut store = Store::open(dir.path()).unwrap();
        let block: [u8; BLOCK_SIZE] = novel.clone().try_into().unwrap();
        store.resolve_or_insert(&block).unwrap();
        b.iter(|| store.resolve_or_insert(black_box(&block)).unwrap());
    });
}

criterion_group!(benches, bench_resolve_or_insert);
criterion_main!(benches);
