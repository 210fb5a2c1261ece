//! Concurrent invokes against one network: no lost updates, no double
//! spends, no double credits.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use chanswap_contracts::ErrorKind;
use common::*;

#[test]
fn concurrent_swap_begins_never_overspend() {
    // A nonce window lets one signer's requests land in any order.
    let (network, issuer) = setup(Duration::from_secs(60));
    let user = Client::new(&network);
    issuer.invoke(&network, "fiat", "emit", &[&user.addr(), "5"]).unwrap();

    let requests: Vec<Vec<String>> = (0..16)
        .map(|_| user.sign("fiat", "swapBegin", &["FIAT", "cc", "1", KEY_HASH]))
        .collect();
    let ok = AtomicUsize::new(0);
    let short = AtomicUsize::new(0);

    thread::scope(|s| {
        for wire in &requests {
            let (network, ok, short) = (&network, &ok, &short);
            s.spawn(move || match network.invoke("fiat", "fiat", "swapBegin", wire) {
                Ok(_) => {
                    ok.fetch_add(1, Ordering::SeqCst);
                }
                Err(err) => {
                    assert_eq!(err.kind(), ErrorKind::InsufficientFunds, "{err}");
                    short.fetch_add(1, Ordering::SeqCst);
                }
            });
        }
    });

    assert_eq!(ok.load(Ordering::SeqCst), 5);
    assert_eq!(short.load(Ordering::SeqCst), 11);
    assert_eq!(balance(&network, "fiat", &user), "\"0\"");
    assert_eq!(network.channel("cc").unwrap().swaps().len(), 5);
    assert_eq!(network.total_supply("FIAT").to_string(), "5");
}

#[test]
fn replayed_request_applies_once() {
    let (network, issuer) = setup(Duration::from_secs(60));
    let user = Client::new(&network);
    let wire = issuer.sign("fiat", "emit", &[&user.addr(), "1"]);
    let ok = AtomicUsize::new(0);

    thread::scope(|s| {
        for _ in 0..8 {
            let (network, wire, ok) = (&network, &wire, &ok);
            s.spawn(move || {
                if network.invoke("fiat", "fiat", "emit", wire).is_ok() {
                    ok.fetch_add(1, Ordering::SeqCst);
                }
            });
        }
    });

    assert_eq!(ok.load(Ordering::SeqCst), 1);
    assert_eq!(balance(&network, "fiat", &user), "\"1\"");
}

#[test]
fn concurrent_swap_done_credits_once() {
    let (network, issuer) = setup(Duration::ZERO);
    let user = Client::new(&network);
    issuer.invoke(&network, "fiat", "emit", &[&user.addr(), "7"]).unwrap();
    let begun = user
        .invoke(&network, "fiat", "swapBegin", &["FIAT", "cc", "7", KEY_HASH])
        .unwrap();

    let ok = AtomicUsize::new(0);
    thread::scope(|s| {
        for _ in 0..8 {
            let (network, tx, ok) = (&network, begun.tx_id.as_str(), &ok);
            s.spawn(move || match invoke_unsigned(network, "cc", "swapDone", &[tx, KEY]) {
                Ok(_) => {
                    ok.fetch_add(1, Ordering::SeqCst);
                }
                Err(err) => assert_eq!(err.kind(), ErrorKind::InvalidState, "{err}"),
            });
        }
    });

    assert_eq!(ok.load(Ordering::SeqCst), 1);
    assert_eq!(allowed(&network, "cc", &user, "FIAT"), "\"7\"");
    assert_eq!(network.total_supply("FIAT").to_string(), "7");
}

#[test]
fn done_racing_expiry_sweep_settles_exactly_one_way() {
    let (network, issuer) = setup(Duration::ZERO);
    let user = Client::new(&network);
    issuer.invoke(&network, "fiat", "emit", &[&user.addr(), "1"]).unwrap();

    let t0 = chrono::Utc::now();
    let begun = user
        .invoke_at(&network, t0, "fiat", "swapBegin", &["FIAT", "cc", "1", KEY_HASH])
        .unwrap();
    let expiry = t0 + chrono::Duration::hours(3);
    let just_before = expiry - chrono::Duration::milliseconds(1);

    thread::scope(|s| {
        let (network, tx) = (&network, begun.tx_id.clone());
        s.spawn(move || {
            let _ = network.invoke_at(just_before, "cc", "cc", "swapDone", &[tx, KEY.to_string()]);
        });
        s.spawn(move || {
            network.expire_swaps(expiry);
        });
    });

    let fiat = balance(&network, "fiat", &user);
    let cc = allowed(&network, "cc", &user, "FIAT");
    assert!(
        (fiat == "\"1\"" && cc == "\"0\"") || (fiat == "\"0\"" && cc == "\"1\""),
        "fiat={fiat} cc={cc}"
    );
    assert_eq!(network.total_supply("FIAT").to_string(), "1");
}

#[test]
fn crossing_transfers_conserve_supply() {
    let (network, issuer) = setup(Duration::from_secs(60));
    let users: Vec<Client> = (0..6).map(|_| Client::new(&network)).collect();
    for user in &users {
        issuer.invoke(&network, "fiat", "emit", &[&user.addr(), "100"]).unwrap();
    }

    thread::scope(|s| {
        for (i, from) in users.iter().enumerate() {
            let to = &users[(i + 1) % users.len()];
            let network = &network;
            s.spawn(move || {
                for _ in 0..25 {
                    let _ = from.invoke(network, "fiat", "transfer", &[&to.addr(), "3", "x"]);
                }
            });
        }
    });

    assert_eq!(network.total_supply("FIAT").to_string(), "600");
}
