use std::sync::Arc;

use sealkit_crypto::{derive_material, CipherFactory, CipherMode, OsRandomSource};

fn make_data(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| (i.wrapping_mul(7) ^ (i >> 3)) as u8)
        .collect()
}

#[divan::bench]
fn bench_derive_material() {
    derive_material(divan::black_box(&OsRandomSource)).unwrap();
}

#[divan::bench]
fn bench_get_cipher_cached(bencher: divan::Bencher) {
    let factory = CipherFactory::with_source(Arc::new(OsRandomSource));
    factory.get_cipher(CipherMode::Encrypt).unwrap();
    bencher.bench(|| factory.get_cipher(divan::black_box(CipherMode::Encrypt)).unwrap());
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_seal(bencher: divan::Bencher, size: usize) {
    let factory = CipherFactory::with_source(Arc::new(OsRandomSource));
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            factory
                .get_cipher(CipherMode::Encrypt)
                .unwrap()
                .process(divan::black_box(&data))
                .unwrap()
        });
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_unseal(bencher: divan::Bencher, size: usize) {
    let factory = CipherFactory::with_source(Arc::new(OsRandomSource));
    let sealed = factory
        .get_cipher(CipherMode::Encrypt)
        .unwrap()
        .process(&make_data(size))
        .unwrap();
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            factory
                .get_cipher(CipherMode::Decrypt)
                .unwrap()
                .process(divan::black_box(&sealed))
                .unwrap()
        });
}

fn main() {
    divan::main();
}
