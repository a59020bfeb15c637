// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Ingestion integration tests.
//!
//! The fixtures reproduce two small histories: an account changing only its
//! inflation destination, and a path payment routed through a single offer.

use ledger_effects_rs::{
    AccountEntry, AccountId, Amount, Asset, Change, ClaimedOffer, Effect, EffectStore,
    EffectType, IngestCursor, IngestError, Ingester, Ledger, LedgerSequence, MemoryLedgerSource,
    MemoryStore, MemoryUnit, OfferEntry, OperationBody, OperationId, OperationRecord,
    PathPaymentOp, PaymentOp, Price, SetOptionsOp, StateDiff, StoreError, StoreUnit,
    TransactionRecord,
};
use std::sync::atomic::{AtomicBool, Ordering};

const SOURCE: &str = "GCXKG6RN4ONIEPCMNFB732A436Z5PNDSRLGWK7GBLCMQLIFO4S7EYWVU";
const DESTINATION: &str = "GA5WBPYA5Y4WAEHXWR2UKO2UO4BUGHUQ74EUPKON2QHV4WRHOIRNKKH2";
const OFFER_OWNER: &str = "GBXGQJWVLWOYHFLVTKWV5FGHA3LNYY2JQKM7OAJAUEQFU6LPCSEFVXON";
const EUR_ISSUER: &str = "GCQPYGH4K57XBDENKKX55KDTWOTK5WDWRQOH2LHEDX3EKVIQRLMESGBG";
const USD_ISSUER: &str = "GC23QF2HUE52AMXUFUH3AYJAXXGXXV2VHXYYR6EYXETPKDXZSAW67XO4";

fn id(address: &str) -> AccountId {
    AccountId::from(address)
}

fn units(n: i64) -> Amount {
    Amount::from_stroops(n * Amount::ONE)
}

fn eur() -> Asset {
    Asset::credit("EUR", id(EUR_ISSUER)).unwrap()
}

fn usd() -> Asset {
    Asset::credit("USD", id(USD_ISSUER)).unwrap()
}

fn transaction(source: &str, operations: Vec<OperationRecord>) -> TransactionRecord {
    TransactionRecord {
        hash: format!("{source}-tx"),
        source_account: id(source),
        successful: true,
        operations,
    }
}

fn ledger(sequence: u32, transactions: Vec<TransactionRecord>) -> Ledger {
    Ledger {
        sequence: LedgerSequence(sequence),
        transactions,
    }
}

/// Native payment of `n` units from `SOURCE` to `DESTINATION`.
fn payment(n: i64) -> OperationRecord {
    let balance = |address: &str, amount: Amount| AccountEntry::new(id(address), amount);
    OperationRecord {
        source_account: None,
        body: OperationBody::Payment(PaymentOp {
            destination: id(DESTINATION),
            asset: Asset::Native,
            amount: units(n),
        }),
        changes: StateDiff {
            accounts: vec![
                Change::updated(balance(SOURCE, units(100)), balance(SOURCE, units(100 - n))),
                Change::updated(balance(DESTINATION, units(0)), balance(DESTINATION, units(n))),
            ],
            ..StateDiff::default()
        },
    }
}

/// Ledger 3: the source only sets its inflation destination.
fn inflation_destination_ledger() -> Ledger {
    let before = AccountEntry::new(id(SOURCE), units(1000));
    let mut after = before.clone();
    after.inflation_dest = Some(id(DESTINATION));

    let op = OperationRecord {
        source_account: None,
        body: OperationBody::SetOptions(SetOptionsOp {
            inflation_dest: Some(id(DESTINATION)),
            ..SetOptionsOp::default()
        }),
        changes: StateDiff {
            accounts: vec![Change::updated(before, after)],
            ..StateDiff::default()
        },
    };
    ledger(3, vec![transaction(SOURCE, vec![op])])
}

fn path_payment(offer_after: Option<Amount>) -> OperationRecord {
    let offer = OfferEntry {
        offer_id: 1,
        seller_id: id(OFFER_OWNER),
        selling: eur(),
        buying: usd(),
        amount: units(10),
        price: Price { n: 1, d: 1 },
    };
    let change = match offer_after {
        Some(amount) => Change::updated(
            offer.clone(),
            OfferEntry {
                amount,
                ..offer.clone()
            },
        ),
        None => Change::removed(offer),
    };

    OperationRecord {
        source_account: None,
        body: OperationBody::PathPayment(PathPaymentOp {
            destination: id(DESTINATION),
            send_asset: usd(),
            send_max: units(10),
            dest_asset: eur(),
            dest_amount: units(10),
            path: Vec::new(),
            offers_claimed: vec![ClaimedOffer {
                seller_id: id(OFFER_OWNER),
                offer_id: 1,
                asset_sold: eur(),
                amount_sold: units(10),
                asset_bought: usd(),
                amount_bought: units(10),
            }],
        }),
        changes: StateDiff {
            offers: vec![change],
            ..StateDiff::default()
        },
    }
}

/// Ledger 6: a USD to EUR path payment that consumes offer 1 entirely.
fn path_payment_ledger() -> Ledger {
    ledger(6, vec![transaction(SOURCE, vec![path_payment(None)])])
}

/// Same ledger, but the offer diff disagrees with the claimed fill.
fn inconsistent_path_payment_ledger() -> Ledger {
    ledger(6, vec![transaction(SOURCE, vec![path_payment(Some(units(4)))])])
}

fn path_payment_operation() -> OperationId {
    OperationId::new(LedgerSequence(6), 1, 1).unwrap()
}

fn find(effects: &[Effect], effect_type: EffectType) -> &Effect {
    effects
        .iter()
        .find(|effect| effect.effect_type == effect_type)
        .unwrap()
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn inflation_destination_change_emits_no_signer_effect() {
    let ingester = Ingester::new(MemoryStore::new());
    ingester.ingest(&inflation_destination_ledger()).unwrap();

    let effects = ingester
        .store()
        .effects_for_ledger(LedgerSequence(3))
        .unwrap();
    assert_eq!(effects.len(), 1);
    assert_ne!(effects[0].effect_type, EffectType::SignerUpdated);
    assert_eq!(
        effects[0].effect_type,
        EffectType::AccountInflationDestinationUpdated
    );
    assert_eq!(effects[0].account, id(SOURCE));
    assert_eq!(effects[0].details["inflation_destination"], DESTINATION);
}

#[test]
fn path_payment_through_one_offer_emits_three_effects() {
    let ingester = Ingester::new(MemoryStore::new());
    ingester.ingest(&path_payment_ledger()).unwrap();

    let effects = ingester
        .store()
        .effects_for_operation(path_payment_operation())
        .unwrap();
    assert_eq!(effects.len(), 3);

    let trade = find(&effects, EffectType::Trade);
    assert_eq!(trade.account, id(OFFER_OWNER));
    assert_eq!(trade.details["seller"], SOURCE);
    assert_eq!(trade.details["sold_amount"], "10.0000000");
    assert_eq!(trade.details["bought_amount"], "10.0000000");
    assert_eq!(trade.details["sold_asset_type"], "credit_alphanum4");
    assert_eq!(trade.details["sold_asset_code"], "EUR");
    assert_eq!(trade.details["sold_asset_issuer"], EUR_ISSUER);
    assert_eq!(trade.details["bought_asset_type"], "credit_alphanum4");
    assert_eq!(trade.details["bought_asset_code"], "USD");
    assert_eq!(trade.details["bought_asset_issuer"], USD_ISSUER);

    let credit = find(&effects, EffectType::AccountCredited);
    assert_eq!(credit.account, id(DESTINATION));
    assert_eq!(credit.details["amount"], "10.0000000");
    assert_eq!(credit.details["asset_type"], "credit_alphanum4");
    assert_eq!(credit.details["asset_code"], "EUR");
    assert_eq!(credit.details["asset_issuer"], EUR_ISSUER);

    let debit = find(&effects, EffectType::AccountDebited);
    assert_eq!(debit.account, id(SOURCE));
    assert_eq!(debit.details["amount"], "10.0000000");
    assert_eq!(debit.details["asset_type"], "credit_alphanum4");
    assert_eq!(debit.details["asset_code"], "USD");
    assert_eq!(debit.details["asset_issuer"], USD_ISSUER);
}

#[test]
fn path_payment_effects_are_debit_trade_credit() {
    let ingester = Ingester::new(MemoryStore::new());
    ingester.ingest(&path_payment_ledger()).unwrap();

    let effects = ingester
        .store()
        .effects_for_operation(path_payment_operation())
        .unwrap();
    let types: Vec<_> = effects.iter().map(|e| e.effect_type).collect();
    assert_eq!(
        types,
        vec![
            EffectType::AccountDebited,
            EffectType::Trade,
            EffectType::AccountCredited
        ]
    );
    assert!(effects.windows(2).all(|w| w[0].id < w[1].id));
    assert!(
        effects
            .iter()
            .all(|e| e.operation_id == path_payment_operation())
    );
}

#[test]
fn stored_details_decode_to_typed_payloads() {
    let ingester = Ingester::new(MemoryStore::new());
    ingester.ingest(&inflation_destination_ledger()).unwrap();
    ingester.ingest(&path_payment_ledger()).unwrap();

    for ledger in ingester.store().ledgers() {
        for effect in ingester.store().effects_for_ledger(ledger).unwrap() {
            let details = effect.decode_details().unwrap();
            assert_eq!(details.effect_type(), effect.effect_type);
            assert_eq!(details.encode(), effect.details);
        }
    }
}

// =============================================================================
// Idempotence and Isolation
// =============================================================================

#[test]
fn reingesting_a_ledger_replaces_its_effects() {
    let ingester = Ingester::new(MemoryStore::new());
    let first = ingester.ingest(&path_payment_ledger()).unwrap();
    let before = ingester
        .store()
        .effects_for_ledger(LedgerSequence(6))
        .unwrap();

    let second = ingester.ingest(&path_payment_ledger()).unwrap();
    let after = ingester
        .store()
        .effects_for_ledger(LedgerSequence(6))
        .unwrap();

    assert_eq!(first.effects_replaced, 0);
    assert_eq!(second.effects_written, 3);
    assert_eq!(second.effects_replaced, 3);
    assert_eq!(before, after);
    assert_eq!(ingester.store().len(), 3);
}

#[test]
fn reingesting_one_ledger_leaves_others_untouched() {
    let ingester = Ingester::new(MemoryStore::new());
    ingester.ingest(&inflation_destination_ledger()).unwrap();
    ingester.ingest(&path_payment_ledger()).unwrap();
    let ledger_three = ingester
        .store()
        .effects_for_ledger(LedgerSequence(3))
        .unwrap();

    ingester.ingest(&path_payment_ledger()).unwrap();

    assert_eq!(
        ingester
            .store()
            .effects_for_ledger(LedgerSequence(3))
            .unwrap(),
        ledger_three
    );
    assert_eq!(
        ingester.store().ledgers(),
        vec![LedgerSequence(3), LedgerSequence(6)]
    );
}

#[test]
fn identifiers_increase_across_ledgers() {
    let ingester = Ingester::new(MemoryStore::new());
    ingester.ingest(&path_payment_ledger()).unwrap();
    ingester.ingest(&inflation_destination_ledger()).unwrap();

    let all: Vec<Effect> = ingester
        .store()
        .ledgers()
        .into_iter()
        .flat_map(|ledger| ingester.store().effects_for_ledger(ledger).unwrap())
        .collect();
    assert_eq!(all.len(), 4);
    assert_eq!(all[0].id.ledger(), LedgerSequence(3));
    assert!(all.windows(2).all(|w| w[0].id < w[1].id));
}

#[test]
fn unknown_ledger_and_operation_are_empty() {
    let ingester = Ingester::new(MemoryStore::new());
    ingester.ingest(&path_payment_ledger()).unwrap();

    assert!(
        ingester
            .store()
            .effects_for_ledger(LedgerSequence(7))
            .unwrap()
            .is_empty()
    );
    let other = OperationId::new(LedgerSequence(6), 1, 2).unwrap();
    assert!(ingester.store().effects_for_operation(other).unwrap().is_empty());
}

#[test]
fn operation_query_returns_only_that_operation() {
    let ingester = Ingester::new(MemoryStore::new());
    ingester
        .ingest(&ledger(
            9,
            vec![
                transaction(SOURCE, vec![payment(1), payment(2), payment(3)]),
                transaction(SOURCE, vec![payment(4)]),
            ],
        ))
        .unwrap();

    let second = OperationId::new(LedgerSequence(9), 1, 2).unwrap();
    let effects = ingester.store().effects_for_operation(second).unwrap();
    let types: Vec<_> = effects.iter().map(|e| e.effect_type).collect();
    assert_eq!(
        types,
        vec![EffectType::AccountDebited, EffectType::AccountCredited]
    );
    assert!(effects.iter().all(|e| e.operation_id == second));
    assert!(effects.iter().all(|e| e.details["amount"] == "2.0000000"));
    assert_eq!(effects[0].account, id(SOURCE));
    assert_eq!(effects[1].account, id(DESTINATION));
    assert_eq!(
        ingester
            .store()
            .effects_for_ledger(LedgerSequence(9))
            .unwrap()
            .len(),
        8
    );
}

// =============================================================================
// Failure Atomicity
// =============================================================================

#[test]
fn malformed_diff_keeps_previous_effects() {
    let ingester = Ingester::new(MemoryStore::new());
    ingester.ingest(&path_payment_ledger()).unwrap();
    let before = ingester
        .store()
        .effects_for_ledger(LedgerSequence(6))
        .unwrap();

    let result = ingester.ingest(&inconsistent_path_payment_ledger());
    assert!(matches!(
        result,
        Err(IngestError::MalformedStateDiff {
            ledger: LedgerSequence(6),
            transaction: 1,
            operation: 1,
            ..
        })
    ));
    assert_eq!(
        ingester
            .store()
            .effects_for_ledger(LedgerSequence(6))
            .unwrap(),
        before
    );
}

#[test]
fn malformed_first_ingestion_writes_nothing() {
    let ingester = Ingester::new(MemoryStore::new());
    assert!(
        ingester
            .ingest(&inconsistent_path_payment_ledger())
            .is_err()
    );
    assert!(ingester.store().is_empty());
}

/// Store whose next commit can be made to fail.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    fail_commit: AtomicBool,
}

struct FlakyUnit<'a> {
    inner: MemoryUnit<'a>,
    fail: bool,
}

impl EffectStore for FlakyStore {
    type Unit<'a> = FlakyUnit<'a>;

    fn begin(&self) -> Result<FlakyUnit<'_>, StoreError> {
        Ok(FlakyUnit {
            inner: self.inner.begin()?,
            fail: self.fail_commit.swap(false, Ordering::SeqCst),
        })
    }

    fn effects_for_ledger(&self, ledger: LedgerSequence) -> Result<Vec<Effect>, StoreError> {
        self.inner.effects_for_ledger(ledger)
    }

    fn effects_for_operation(&self, operation: OperationId) -> Result<Vec<Effect>, StoreError> {
        self.inner.effects_for_operation(operation)
    }
}

impl StoreUnit for FlakyUnit<'_> {
    fn contains_ledger(&self, ledger: LedgerSequence) -> Result<bool, StoreError> {
        self.inner.contains_ledger(ledger)
    }

    fn delete_ledger(&mut self, ledger: LedgerSequence) -> Result<usize, StoreError> {
        self.inner.delete_ledger(ledger)
    }

    fn insert_batch(&mut self, effects: Vec<Effect>) -> Result<(), StoreError> {
        self.inner.insert_batch(effects)
    }

    fn commit(self) -> Result<(), StoreError> {
        if self.fail {
            return Err(StoreError::Unavailable("connection reset".into()));
        }
        self.inner.commit()
    }
}

#[test]
fn store_failure_leaves_store_unchanged_and_retry_succeeds() {
    let ingester = Ingester::new(FlakyStore::default());
    ingester.ingest(&inflation_destination_ledger()).unwrap();

    ingester.store().fail_commit.store(true, Ordering::SeqCst);
    let result = ingester.ingest(&path_payment_ledger());
    assert_eq!(
        result,
        Err(IngestError::StoreUnavailable(StoreError::Unavailable(
            "connection reset".into()
        )))
    );
    assert!(
        ingester
            .store()
            .effects_for_ledger(LedgerSequence(6))
            .unwrap()
            .is_empty()
    );
    assert_eq!(ingester.store().inner.len(), 1);

    let report = ingester.ingest(&path_payment_ledger()).unwrap();
    assert_eq!(report.effects_written, 3);
    assert_eq!(ingester.store().inner.len(), 4);
}

// =============================================================================
// Sequential Ingestion
// =============================================================================

fn history() -> MemoryLedgerSource {
    (1..=6)
        .map(|sequence| match sequence {
            3 => inflation_destination_ledger(),
            6 => path_payment_ledger(),
            _ => ledger(sequence, Vec::new()),
        })
        .collect()
}

#[test]
fn ingest_range_walks_the_history() {
    let ingester = Ingester::new(MemoryStore::new());
    let mut cursor = IngestCursor::starting_at(LedgerSequence(1));

    let reports = ingester
        .ingest_range(&history(), &mut cursor, LedgerSequence(6))
        .unwrap();

    let written: Vec<_> = reports.iter().map(|r| r.effects_written).collect();
    assert_eq!(written, vec![0, 0, 1, 0, 0, 3]);
    assert_eq!(cursor.next(), LedgerSequence(7));
    assert_eq!(ingester.store().len(), 4);
}

#[test]
fn ingest_range_resumes_from_the_cursor() {
    let ingester = Ingester::new(MemoryStore::new());
    let source = history();
    let mut cursor = IngestCursor::starting_at(LedgerSequence(1));

    ingester
        .ingest_range(&source, &mut cursor, LedgerSequence(3))
        .unwrap();
    assert_eq!(cursor.next(), LedgerSequence(4));
    assert_eq!(ingester.store().ledgers(), vec![LedgerSequence(3)]);

    let reports = ingester
        .ingest_range(&source, &mut cursor, LedgerSequence(100))
        .unwrap();
    assert_eq!(reports.len(), 3);
    assert_eq!(cursor.next(), LedgerSequence(7));
}

#[test]
fn ingest_next_rejects_replayed_ledger() {
    let ingester = Ingester::new(MemoryStore::new());
    let mut cursor = IngestCursor::starting_at(LedgerSequence(3));
    ingester
        .ingest_next(&mut cursor, &inflation_destination_ledger())
        .unwrap();

    let result = ingester.ingest_next(&mut cursor, &inflation_destination_ledger());
    assert_eq!(
        result,
        Err(IngestError::OutOfOrder {
            expected: LedgerSequence(4),
            got: LedgerSequence(3),
        })
    );
}

#[test]
fn failed_ingestion_does_not_advance_the_cursor() {
    let ingester = Ingester::new(MemoryStore::new());
    let mut cursor = IngestCursor::starting_at(LedgerSequence(6));

    assert!(
        ingester
            .ingest_next(&mut cursor, &inconsistent_path_payment_ledger())
            .is_err()
    );
    assert_eq!(cursor.next(), LedgerSequence(6));
}
