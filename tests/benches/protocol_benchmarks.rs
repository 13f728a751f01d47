//! # Wavelink Protocol Benchmarks
//!
//! Hot paths of the session protocol:
//!
//! | Group | Operation |
//! |-------|-----------|
//! | crypto | AEAD seal/open, Ed25519 sign/verify |
//! | chunking | split and reassemble a 20 KiB payload |
//! | dht | key derivation |

use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::RngCore;
use shared_crypto::{aead_decrypt, aead_encrypt, IdentityKeyPair, Nonce, SecretKey};
use shared_types::{MessageType, PeerId, SystemTimeSource};
use wl_01_dht::dht_key;
use wl_04_chunking::{ChunkConfig, ChunkManager, ChunkProgress};

// ============================================================================
// Crypto
// ============================================================================

fn bench_aead(c: &mut Criterion) {
    let mut group = c.benchmark_group("crypto-aead");
    group.measurement_time(Duration::from_secs(5));
    let key = SecretKey::generate();
    let aad = b"envelope header";

    for size in [256usize, 1024, 8192] {
        let mut plaintext = vec![0u8; size];
        rand::thread_rng().fill_bytes(&mut plaintext);
        let nonce = Nonce::generate();
        let sealed = aead_encrypt(&key, &nonce, &plaintext, aad).unwrap();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("seal", size), &plaintext, |b, p| {
            b.iter(|| aead_encrypt(&key, &Nonce::generate(), black_box(p), aad).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("open", size), &sealed, |b, s| {
            b.iter(|| aead_decrypt(&key, &nonce, black_box(s), aad).unwrap())
        });
    }
    group.finish();
}

fn bench_signatures(c: &mut Criterion) {
    let mut group = c.benchmark_group("crypto-ed25519");
    let keypair = IdentityKeyPair::generate();
    let public_key = keypair.public_key();
    let message = vec![0x5au8; 512];
    let signature = keypair.sign(&message);

    group.bench_function("sign", |b| b.iter(|| keypair.sign(black_box(&message))));
    group.bench_function("verify", |b| {
        b.iter(|| public_key.verify(black_box(&message), &signature))
    });
    group.finish();
}

// ============================================================================
// Chunking
// ============================================================================

fn bench_chunking(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunking");
    let payload: Vec<u8> = (0..20 * 1024).map(|i| (i % 251) as u8).collect();
    let manager = ChunkManager::new(ChunkConfig::default(), Arc::new(SystemTimeSource::new()));
    let sender = PeerId::from_public_key(&IdentityKeyPair::generate().public_key());

    group.throughput(Throughput::Bytes(payload.len() as u64));
    group.bench_function("split_20k", |b| {
        b.iter(|| manager.split(&MessageType::Data, black_box(&payload)).unwrap())
    });
    group.bench_function("reassemble_20k", |b| {
        b.iter(|| {
            let frames = manager.split(&MessageType::Data, &payload).unwrap();
            let mut last = None;
            for frame in frames.into_iter().rev() {
                last = Some(manager.accept(sender, frame).unwrap());
            }
            assert!(matches!(last, Some(ChunkProgress::Complete(_))));
        })
    });
    group.finish();
}

// ============================================================================
// DHT
// ============================================================================

fn bench_dht_key(c: &mut Criterion) {
    c.bench_function("dht-key", |b| {
        b.iter(|| dht_key(black_box("printer-3f"), black_box("print")))
    });
}

criterion_group!(benches, bench_aead, bench_signatures, bench_chunking, bench_dht_key);
criterion_main!(benches);
