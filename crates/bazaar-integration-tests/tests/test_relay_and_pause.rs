//! # Relay, Pause and Concurrency
//!
//! Meta-transactions relayed by third parties, the pause circuit breaker,
//! and many threads driving one engine.

mod common;

use std::collections::BTreeSet;
use std::sync::{Arc, Weak};
use std::thread;

use bazaar_core::{AssetId, ExchangeId, OfferId, PausableRegion};
use bazaar_crypto::LocalSigner;
use bazaar_settlement::{
    CallOutput, EngineCall, ErrorKind, EventEnvelope, EventSubscriber, MetaTransaction,
    SettlementConfig, SettlementEngine, SettlementError,
};
use common::*;
use parking_lot::Mutex;

fn relayer() -> bazaar_core::Address {
    bazaar_core::Address::from_bytes([0x77; 20])
}

fn signed(m: &Market, signer: &LocalSigner, nonce: u64, call: EngineCall) -> MetaTransaction {
    MetaTransaction::sign(signer, m.engine.domain(), nonce, call).unwrap()
}

// ---------------------------------------------------------------------------
// 1. Meta-transactions
// ---------------------------------------------------------------------------

#[test]
fn relayed_lifecycle_runs_as_each_signer() {
    let m = Market::new();
    let commit = signed(&m, &m.buyer, 0, EngineCall::Commit { offer_id: OfferId::new(1) });
    let output = m.engine.execute_meta_transaction(relayer(), &commit).unwrap();
    let CallOutput::Exchange(id) = output else {
        panic!("commit returned {output:?}");
    };
    assert_eq!(m.engine.get_exchange(id).unwrap().buyer, m.buyer());
    assert_eq!(m.wallet(relayer()), 0);

    let redeem = signed(&m, &m.buyer, 1, EngineCall::RedeemVoucher { exchange_id: id });
    m.engine.execute_meta_transaction(relayer(), &redeem).unwrap();
    let raise = signed(&m, &m.buyer, 2, EngineCall::RaiseDispute { exchange_id: id });
    m.engine.execute_meta_transaction(relayer(), &raise).unwrap();

    let signature = m.sign_resolution(&m.seller, id, 2500);
    let resolve = signed(
        &m,
        &m.buyer,
        3,
        EngineCall::ResolveDispute {
            exchange_id: id,
            buyer_percent: 2500,
            signature,
        },
    );
    m.engine.execute_meta_transaction(relayer(), &resolve).unwrap();

    assert_eq!(m.available(m.buyer()), 30);
    assert_eq!(m.available(m.seller()), SELLER_FLOAT - SELLER_DEPOSIT + 90);
    for nonce in 0..4 {
        assert!(m.engine.is_nonce_used(&m.buyer(), nonce).unwrap());
    }
    let relayed = m
        .engine
        .events()
        .iter()
        .filter(|e| e.event.name() == "MetaTransactionExecuted")
        .count();
    assert_eq!(relayed, 4);
    m.assert_settled(id);
}

#[test]
fn nonces_are_per_signer() {
    let m = Market::new();
    let by_buyer = signed(&m, &m.buyer, 9, EngineCall::Commit { offer_id: OfferId::new(1) });
    m.engine.execute_meta_transaction(relayer(), &by_buyer).unwrap();
    let by_seller = signed(
        &m,
        &m.seller,
        9,
        EngineCall::WithdrawFunds {
            assets: vec![AssetId::NATIVE],
            amounts: vec![5],
        },
    );
    assert_eq!(
        m.engine.execute_meta_transaction(relayer(), &by_seller).unwrap(),
        CallOutput::Withdrawn(vec![(AssetId::NATIVE, 5)])
    );
    assert!(!m.engine.is_nonce_used(&m.resolver(), 9).unwrap());
}

#[test]
fn replayed_meta_transaction_is_rejected_without_effect() {
    let m = Market::new();
    let meta = signed(&m, &m.buyer, 0, EngineCall::Commit { offer_id: OfferId::new(1) });
    m.engine.execute_meta_transaction(relayer(), &meta).unwrap();
    let events = m.engine.events().len();
    let wallet = m.wallet(m.buyer());
    let err = m.engine.execute_meta_transaction(stranger(), &meta).unwrap_err();
    assert!(matches!(err, SettlementError::NonceUsedAlready { nonce: 0, .. }));
    assert_eq!(m.engine.events().len(), events);
    assert_eq!(m.wallet(m.buyer()), wallet);
    assert_eq!(
        m.engine.get_exchange(ExchangeId::new(2)),
        Err(SettlementError::NoSuchExchange(ExchangeId::new(2)))
    );
}

#[test]
fn rejected_call_can_be_resubmitted_with_the_same_nonce() {
    let m = Market::new();
    let id = m.commit();
    let complete = signed(&m, &m.seller, 0, EngineCall::CompleteExchange { exchange_id: id });
    assert!(matches!(
        m.engine.execute_meta_transaction(relayer(), &complete),
        Err(SettlementError::State(_))
    ));
    assert!(!m.engine.is_nonce_used(&m.seller(), 0).unwrap());

    m.engine.redeem_voucher(m.buyer(), id).unwrap();
    m.at(DISPUTE_PERIOD as i64 + 1);
    m.engine.execute_meta_transaction(relayer(), &complete).unwrap();
    assert!(m.engine.is_nonce_used(&m.seller(), 0).unwrap());
}

#[test]
fn signature_from_another_key_is_rejected() {
    let m = Market::new();
    let mut meta = signed(&m, &m.resolver, 0, EngineCall::Commit { offer_id: OfferId::new(1) });
    meta.from = m.buyer();
    let err = m.engine.execute_meta_transaction(relayer(), &meta).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidSignature);
    assert!(!m.engine.is_nonce_used(&m.buyer(), 0).unwrap());
}

#[test]
fn signature_under_another_domain_is_rejected() {
    let m = Market::new();
    let mut domain = m.engine.domain().clone();
    domain.chain_id = 1;
    let meta = MetaTransaction::sign(
        &m.buyer,
        &domain,
        0,
        EngineCall::Commit { offer_id: OfferId::new(1) },
    )
    .unwrap();
    let err = m.engine.execute_meta_transaction(relayer(), &meta).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidSignature);
}

#[test]
fn allowlist_limits_relayed_functions() {
    let m = Market::with_config(SettlementConfig {
        relay_allowlist: vec!["redeem_voucher".to_string(), "raise_dispute".to_string()],
        ..base_config()
    });
    let id = m.commit();
    let withdraw = signed(
        &m,
        &m.seller,
        0,
        EngineCall::WithdrawFunds {
            assets: vec![],
            amounts: vec![],
        },
    );
    assert_eq!(
        m.engine.execute_meta_transaction(relayer(), &withdraw),
        Err(SettlementError::FunctionNotAllowlisted("withdraw_funds".to_string()))
    );
    let redeem = signed(&m, &m.buyer, 0, EngineCall::RedeemVoucher { exchange_id: id });
    m.engine.execute_meta_transaction(relayer(), &redeem).unwrap();
}

// ---------------------------------------------------------------------------
// 2. Pause
// ---------------------------------------------------------------------------

#[test]
fn only_the_pauser_controls_regions() {
    let m = Market::new();
    let err = m.engine.pause(m.buyer(), &[]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
    assert!(m.engine.paused_regions().unwrap().is_empty());

    m.engine.pause(pauser(), &[PausableRegion::Disputes]).unwrap();
    assert!(matches!(
        m.engine.unpause(m.seller(), &[]),
        Err(SettlementError::Unauthorized { .. })
    ));
    assert!(m.engine.is_paused(PausableRegion::Disputes).unwrap());
}

#[test]
fn empty_pause_list_covers_every_region() {
    let m = Market::new();
    let paused = m.engine.pause(pauser(), &[]).unwrap();
    assert_eq!(paused, PausableRegion::all().to_vec());
    for region in PausableRegion::all() {
        assert!(m.engine.is_paused(*region).unwrap());
    }
    let unpaused = m.engine.unpause(pauser(), &[]).unwrap();
    assert_eq!(unpaused.len(), PausableRegion::all().len());
    assert!(m.engine.paused_regions().unwrap().is_empty());
    let names: Vec<&str> = m.engine.events().iter().map(|e| e.event.name()).collect();
    assert!(names.ends_with(&["RegionsPaused", "RegionsUnpaused"]));
}

#[test]
fn paused_relay_region_stops_every_meta_transaction() {
    let m = Market::new();
    m.engine
        .pause(pauser(), &[PausableRegion::MetaTransaction])
        .unwrap();
    let meta = signed(&m, &m.buyer, 0, EngineCall::Commit { offer_id: OfferId::new(1) });
    assert_eq!(
        m.engine.execute_meta_transaction(relayer(), &meta),
        Err(SettlementError::RegionPaused(PausableRegion::MetaTransaction))
    );
    // Direct calls are unaffected.
    m.commit();
    m.engine
        .unpause(pauser(), &[PausableRegion::MetaTransaction])
        .unwrap();
    m.engine.execute_meta_transaction(relayer(), &meta).unwrap();
}

#[test]
fn relayed_call_respects_its_own_region() {
    let m = Market::new();
    m.engine.pause(pauser(), &[PausableRegion::Exchanges]).unwrap();
    let meta = signed(&m, &m.buyer, 0, EngineCall::Commit { offer_id: OfferId::new(1) });
    assert_eq!(
        m.engine.execute_meta_transaction(relayer(), &meta),
        Err(SettlementError::RegionPaused(PausableRegion::Exchanges))
    );
    assert!(!m.engine.is_nonce_used(&m.buyer(), 0).unwrap());
}

#[test]
fn regions_paused_at_startup() {
    let m = Market::with_config(SettlementConfig {
        paused_regions: vec![PausableRegion::Disputes],
        ..base_config()
    });
    let id = m.redeemed();
    assert_eq!(
        m.engine.raise_dispute(m.buyer(), id),
        Err(SettlementError::RegionPaused(PausableRegion::Disputes))
    );
    m.engine.complete_exchange(m.buyer(), id).unwrap();
}

// ---------------------------------------------------------------------------
// 3. Concurrency and re-entry
// ---------------------------------------------------------------------------

#[test]
fn concurrent_commits_get_distinct_exchanges() {
    let m = Market::new();
    let threads = 8;
    let per_thread = 5;
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let engine = Arc::clone(&m.engine);
            let buyer = m.buyer();
            thread::spawn(move || {
                (0..per_thread)
                    .map(|_| engine.commit(buyer, OfferId::new(1)).unwrap())
                    .collect::<Vec<ExchangeId>>()
            })
        })
        .collect();

    let mut ids = BTreeSet::new();
    for handle in handles {
        for id in handle.join().unwrap() {
            assert!(ids.insert(id), "{id} handed out twice");
        }
    }
    assert_eq!(ids.len(), threads * per_thread);
    assert_eq!(ids.iter().next(), Some(&ExchangeId::new(1)));
    assert_eq!(
        m.engine.get_total_escrowed(&AssetId::NATIVE).unwrap(),
        (threads * per_thread) as u128 * (PRICE + SELLER_DEPOSIT)
    );
    m.assert_custody_matches();

    let sequences: Vec<u64> = m.engine.events().iter().map(|e| e.sequence).collect();
    assert!(sequences.windows(2).all(|pair| pair[1] == pair[0] + 1));
}

#[test]
fn concurrent_withdrawals_never_overdraw() {
    let m = Market::new();
    let handles: Vec<_> = (0..16)
        .map(|_| {
            let engine = Arc::clone(&m.engine);
            let seller = m.seller();
            thread::spawn(move || engine.withdraw_funds(seller, &[AssetId::NATIVE], &[100]).is_ok())
        })
        .collect();
    let succeeded = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .filter(|ok| *ok)
        .count();
    assert_eq!(succeeded as u128, SELLER_FLOAT / 100);
    assert_eq!(m.available(m.seller()), 0);
    assert_eq!(m.wallet(m.seller()), WALLET);
    m.assert_custody_matches();
}

/// Reads the engine back from inside event delivery.
struct Auditor {
    engine: Weak<SettlementEngine>,
    seen: Mutex<Vec<(u64, Result<u128, SettlementError>)>>,
}

impl EventSubscriber for Auditor {
    fn on_event(&self, envelope: &EventEnvelope) {
        if let Some(engine) = self.engine.upgrade() {
            let total = engine.get_total_escrowed(&AssetId::NATIVE);
            self.seen.lock().push((envelope.sequence, total));
        }
    }
}

#[test]
fn subscribers_may_query_the_engine_during_delivery() {
    let m = Market::new();
    let auditor = Arc::new(Auditor {
        engine: Arc::downgrade(&m.engine),
        seen: Mutex::new(Vec::new()),
    });
    m.engine.subscribe(auditor.clone());
    m.commit();

    let seen = auditor.seen.lock();
    assert_eq!(seen.len(), 2);
    for (_, total) in seen.iter() {
        assert_eq!(total, &Ok(PRICE + SELLER_DEPOSIT));
    }
}
