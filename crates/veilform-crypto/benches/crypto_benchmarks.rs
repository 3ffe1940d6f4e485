//! Benchmarks for veilform-crypto

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;
use veilform_crypto::{
    bundle::{BundleConfig, KeyBundleExporter, KeyBundleImporter, KeyMap},
    encrypt_submission, generate_key_pair, hash_field,
    CryptoProvider, EnvelopeDecryptor, EnvelopeEncryptor, RustCryptoProvider,
};

fn bench_keygen(c: &mut Criterion) {
    let mut group = c.benchmark_group("keygen");
    group.sample_size(10);
    group.bench_function("rsa-oaep-2048", |b| b.iter(|| generate_key_pair().unwrap()));
    group.finish();
}

fn bench_symmetric(c: &mut Criterion) {
    let mut group = c.benchmark_group("symmetric");
    let provider = RustCryptoProvider;
    let key = provider.generate_data_key().unwrap();

    for size in [1024, 64 * 1024, 1024 * 1024].iter() {
        let data = vec![0u8; *size];
        group.throughput(Throughput::Bytes(*size as u64));

        group.bench_with_input(
            BenchmarkId::new("aes-256-gcm-encrypt", size),
            &data,
            |b, data| {
                b.iter(|| {
                    let nonce = provider.generate_nonce().unwrap();
                    provider.seal(&key, &nonce, data).unwrap()
                })
            },
        );

        let nonce = provider.generate_nonce().unwrap();
        let ciphertext = provider.seal(&key, &nonce, &data).unwrap();
        group.bench_with_input(
            BenchmarkId::new("aes-256-gcm-decrypt", size),
            &ciphertext,
            |b, ciphertext| b.iter(|| provider.open(&key, &nonce, ciphertext).unwrap()),
        );
    }

    group.finish();
}

fn bench_envelope(c: &mut Criterion) {
    let mut group = c.benchmark_group("envelope");
    let pair = generate_key_pair().unwrap();
    let encryptor = EnvelopeEncryptor::new(&pair.public_key).unwrap();
    let decryptor = EnvelopeDecryptor::new(&pair.private_key).unwrap();

    for fields in [4, 64, 1024].iter() {
        let submission: serde_json::Map<_, _> = (0..*fields)
            .map(|i| (format!("field_{i}"), json!(format!("answer number {i}"))))
            .collect();
        let submission = serde_json::Value::Object(submission);

        group.bench_with_input(BenchmarkId::new("encrypt", fields), &submission, |b, s| {
            b.iter(|| encryptor.encrypt(s).unwrap())
        });

        let envelope = encrypt_submission(&submission, &pair.public_key).unwrap();
        group.bench_with_input(BenchmarkId::new("decrypt", fields), &envelope, |b, e| {
            b.iter(|| decryptor.decrypt_envelope(e).unwrap())
        });
    }

    group.finish();
}

fn bench_bundle(c: &mut Criterion) {
    let mut group = c.benchmark_group("bundle");
    group.sample_size(10);
    let pair = generate_key_pair().unwrap();
    let keys = KeyMap::from([("form".to_string(), pair.private_key.clone())]);

    for iterations in [10_000u32, 100_000].iter() {
        let exporter =
            KeyBundleExporter::new(BundleConfig::default().with_iterations(*iterations));
        group.bench_with_input(BenchmarkId::new("export", iterations), &keys, |b, keys| {
            b.iter(|| exporter.export(keys, "benchmark-password").unwrap())
        });

        let bundle = exporter.export(&keys, "benchmark-password").unwrap();
        let importer = KeyBundleImporter::default();
        group.bench_with_input(BenchmarkId::new("import", iterations), &bundle, |b, bundle| {
            b.iter(|| importer.import(bundle, "benchmark-password").unwrap())
        });
    }

    group.finish();
}

fn bench_hashing(c: &mut Criterion) {
    c.bench_function("hash_field", |b| {
        b.iter(|| hash_field("  Alice@Example.com ", "c2FsdC1mb3ItYmVuY2htYXJr"))
    });
}

criterion_group!(
    benches,
    bench_keygen,
    bench_symmetric,
    bench_envelope,
    bench_bundle,
    bench_hashing
);
criterion_main!(benches);
