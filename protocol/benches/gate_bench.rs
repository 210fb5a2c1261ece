// Benchmarks for the signed request path.
//
// Covers envelope signing, signature verification through the gate, nonce
// window bookkeeping and atomic ledger postings.

use std::sync::Arc;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use chanswap_protocol::auth::{AuthGate, Envelope, NonceState};
use chanswap_protocol::crypto::{HashAlgorithm, Keypair};
use chanswap_protocol::identity::{Address, KeyRegistry};
use chanswap_protocol::ledger::{Amount, BalanceKey, Ledger, Posting};

fn transfer_args() -> Vec<String> {
    vec![
        "3yZe7d5ZdtJ9M1pHq5rVrPp3nQvzXb2Y4mqLmYtJ9aQn".to_string(),
        "1000".to_string(),
        "invoice-42".to_string(),
    ]
}

fn bench_envelope_sign(c: &mut Criterion) {
    let keypair = Keypair::generate();
    c.bench_function("envelope/sign", |b| {
        b.iter(|| Envelope::sign(&keypair, "fiat", "fiat", "transfer", transfer_args(), 42));
    });
}

fn bench_gate_admit(c: &mut Criterion) {
    let registry = Arc::new(KeyRegistry::new());
    let keypair = Keypair::generate();
    registry.add_user(&keypair.public_key()).unwrap();
    let gate = AuthGate::new(registry);

    let envelopes: Vec<Envelope> = (1..=4096u64)
        .map(|n| Envelope::sign(&keypair, "fiat", "fiat", "transfer", transfer_args(), n))
        .collect();
    let mut next = envelopes.iter().cycle();

    // Once the cycle wraps every nonce is a replay, rejected after the
    // signature check.
    c.bench_function("gate/admit", |b| {
        b.iter(|| {
            let envelope = next.next().unwrap();
            let _ = gate.admit(envelope, Duration::from_secs(3600));
        });
    });
}

fn bench_nonce_window(c: &mut Criterion) {
    let mut group = c.benchmark_group("nonce/window_accept");
    for ttl_ms in [0u64, 1_000, 60_000] {
        group.bench_with_input(BenchmarkId::from_parameter(ttl_ms), &ttl_ms, |b, &ttl| {
            let mut state = NonceState::new();
            let mut nonce = 0u64;
            b.iter(|| {
                nonce += 7;
                let _ = state.accept(nonce, ttl);
            });
        });
    }
    group.finish();
}

fn bench_ledger_apply(c: &mut Criterion) {
    let ledger = Ledger::new("fiat");
    let from = Address::from_public_key(&Keypair::generate().public_key());
    let to = Address::from_public_key(&Keypair::generate().public_key());
    ledger.credit(from, "FIAT", Amount::new(u64::MAX as u128));

    let mut group = c.benchmark_group("ledger/apply");
    group.throughput(Throughput::Elements(2));
    group.bench_function("transfer", |b| {
        b.iter(|| {
            ledger
                .apply(&[
                    Posting::Debit(BalanceKey::regular(from, "FIAT"), Amount::new(1)),
                    Posting::Credit(BalanceKey::regular(to, "FIAT"), Amount::new(1)),
                ])
                .unwrap();
        });
    });
    group.finish();
}

fn bench_hash_lock(c: &mut Criterion) {
    let mut group = c.benchmark_group("hash_lock");
    for algorithm in [HashAlgorithm::Sha3_256, HashAlgorithm::Sha256, HashAlgorithm::Blake3] {
        group.bench_with_input(
            BenchmarkId::from_parameter(algorithm),
            &algorithm,
            |b, alg| b.iter(|| alg.digest(b"12345")),
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_envelope_sign,
    bench_gate_admit,
    bench_nonce_window,
    bench_ledger_apply,
    bench_hash_lock,
);
criterion_main!(benches);
