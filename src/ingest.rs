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


//! Ledger ingestion.
//!
//! The [`Ingester`] is the central component that turns closed ledgers into
//! committed effects. For each ledger it:
//!
//! 1. resolves every operation, in transaction order then operation order,
//! 2. assigns each effect its identifier in emission order,
//! 3. opens a store unit, deletes the ledger's previous effects if any,
//!    writes the new batch and commits.
//!
//! Any failure drops the unit, so the store keeps exactly what it had
//! before the attempt. Re-ingesting a ledger replaces its effects with a
//! byte-identical set.
//!
//! # Example
//!
//! ```
//! use ledger_effects_rs::{
//!     AccountEntry, AccountId, Amount, Asset, Change, EffectStore, EffectType, Ingester, Ledger,
//!     LedgerSequence, MemoryStore, OperationBody, OperationRecord, PaymentOp, StateDiff,
//!     TransactionRecord,
//! };
//!
//! let ingester = Ingester::new(MemoryStore::new());
//! let balance =
//!     |id: &str, stroops| AccountEntry::new(AccountId::from(id), Amount::from_stroops(stroops));
//! let ledger = Ledger {
//!     sequence: LedgerSequence(2),
//!     transactions: vec![TransactionRecord {
//!         hash: "tx1".into(),
//!         source_account: AccountId::from("GSOURCE"),
//!         successful: true,
//!         operations: vec![OperationRecord {
//!             source_account: None,
//!             body: OperationBody::Payment(PaymentOp {
//!                 destination: AccountId::from("GDEST"),
//!                 asset: Asset::Native,
//!                 amount: Amount::from_stroops(50_000_000),
//!             }),
//!             changes: StateDiff {
//!                 accounts: vec![
//!                     Change::updated(balance("GSOURCE", 90_000_000), balance("GSOURCE", 40_000_000)),
//!                     Change::updated(balance("GDEST", 0), balance("GDEST", 50_000_000)),
//!                 ],
//!                 ..StateDiff::default()
//!             },
//!         }],
//!     }],
//! };
//!
//! let report = ingester.ingest(&ledger).unwrap();
//! assert_eq!(report.effects_written, 2);
//!
//! let effects = ingester.store().effects_for_ledger(LedgerSequence(2)).unwrap();
//! assert_eq!(effects[0].effect_type, EffectType::AccountDebited);
//! assert_eq!(effects[1].effect_type, EffectType::AccountCredited);
//! ```
//!
//! # Concurrency
//!
//! Ledgers are ingested one at a time. Within a ledger, resolution is pure
//! and can be spread over scoped worker threads ([`IngestConfig::workers`]);
//! results are re-joined in transaction order before identifiers are
//! assigned, so the output does not depend on the worker count.

use crate::base::LedgerSequence;
use crate::effect::{Effect, ResolvedEffect};
use crate::error::{IngestError, ResolveError};
use crate::ledger::{Ledger, TransactionRecord};
use crate::resolver::resolve;
use crate::store::{EffectStore, StoreUnit};
use crate::toid::OperationId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::panic;
use tracing::{debug, info, warn};

/// Ingestion tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Threads used to resolve one ledger. `1` resolves on the caller's thread.
    pub workers: usize,
    /// Ledgers with fewer transactions are always resolved sequentially.
    pub parallel_threshold: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            parallel_threshold: 64,
        }
    }
}

/// Outcome of ingesting one ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestReport {
    pub ledger: LedgerSequence,
    pub effects_written: usize,
    /// Effects deleted because the ledger had been ingested before.
    pub effects_replaced: usize,
}

/// Caller-owned position of sequential ingestion: the next ledger expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestCursor {
    next: LedgerSequence,
}

impl IngestCursor {
    pub fn starting_at(ledger: LedgerSequence) -> Self {
        Self { next: ledger }
    }

    pub fn next(&self) -> LedgerSequence {
        self.next
    }

    /// Position after the expected ledger, if the sequence has one.
    fn following(&self) -> Result<LedgerSequence, IngestError> {
        self.next.next().ok_or(IngestError::IdentifierOverflow {
            field: "ledger",
            value: u64::from(self.next.0) + 1,
        })
    }
}

/// Supplier of decoded ledgers.
pub trait LedgerSource {
    /// The ledger with this sequence, or `None` if it has not closed yet.
    fn ledger(&self, sequence: LedgerSequence) -> Result<Option<Ledger>, IngestError>;
}

/// Ledgers held in memory, keyed by sequence.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedgerSource {
    ledgers: BTreeMap<LedgerSequence, Ledger>,
}

impl MemoryLedgerSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, ledger: Ledger) {
        self.ledgers.insert(ledger.sequence, ledger);
    }

    pub fn first(&self) -> Option<LedgerSequence> {
        self.ledgers.keys().next().copied()
    }

    pub fn last(&self) -> Option<LedgerSequence> {
        self.ledgers.keys().next_back().copied()
    }
}

impl FromIterator<Ledger> for MemoryLedgerSource {
    fn from_iter<I: IntoIterator<Item = Ledger>>(iter: I) -> Self {
        let mut source = Self::new();
        for ledger in iter {
            source.insert(ledger);
        }
        source
    }
}

impl LedgerSource for MemoryLedgerSource {
    fn ledger(&self, sequence: LedgerSequence) -> Result<Option<Ledger>, IngestError> {
        Ok(self.ledgers.get(&sequence).cloned())
    }
}

/// Effects of one transaction, grouped by operation.
type TransactionEffects = Vec<Vec<ResolvedEffect>>;

/// Drives ledgers through resolution into an [`EffectStore`].
pub struct Ingester<S> {
    store: S,
    config: IngestConfig,
}

impl<S: EffectStore> Ingester<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, IngestConfig::default())
    }

    pub fn with_config(store: S, config: IngestConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Ingests one ledger, replacing its effects if it was ingested before.
    ///
    /// # Errors
    ///
    /// - [`IngestError::MalformedStateDiff`] - An operation's diff is inconsistent.
    /// - [`IngestError::Codec`] - An amount or asset cannot be represented.
    /// - [`IngestError::IdentifierOverflow`] - The ledger has more transactions,
    ///   operations or effects than identifiers can address.
    /// - [`IngestError::StoreUnavailable`] - The store failed; retrying is safe.
    pub fn ingest(&self, ledger: &Ledger) -> Result<IngestReport, IngestError> {
        let report = self
            .derive(ledger)
            .and_then(|effects| self.write(ledger.sequence, effects))
            .inspect_err(|error| warn!(ledger = %ledger.sequence, %error, "ledger ingestion failed"))?;

        info!(
            ledger = %report.ledger,
            effects_written = report.effects_written,
            effects_replaced = report.effects_replaced,
            "ingested ledger"
        );
        Ok(report)
    }

    /// Ingests the ledger the cursor expects and advances the cursor.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::OutOfOrder`] if `ledger` is not the cursor's next
    /// ledger, and [`IngestError::IdentifierOverflow`] if the cursor could not
    /// move past it, plus everything [`Ingester::ingest`] returns. Nothing is
    /// written and the cursor stays put on any error.
    pub fn ingest_next(
        &self,
        cursor: &mut IngestCursor,
        ledger: &Ledger,
    ) -> Result<IngestReport, IngestError> {
        if ledger.sequence != cursor.next() {
            return Err(IngestError::OutOfOrder {
                expected: cursor.next(),
                got: ledger.sequence,
            });
        }
        let following = cursor.following()?;
        let report = self.ingest(ledger)?;
        cursor.next = following;
        Ok(report)
    }

    /// Ingests ledgers from the cursor up to `until`, inclusive, stopping early
    /// at the first ledger the source does not have yet.
    pub fn ingest_range<L: LedgerSource>(
        &self,
        source: &L,
        cursor: &mut IngestCursor,
        until: LedgerSequence,
    ) -> Result<Vec<IngestReport>, IngestError> {
        let mut reports = Vec::new();
        while cursor.next() <= until {
            let Some(ledger) = source.ledger(cursor.next())? else {
                debug!(ledger = %cursor.next(), "ledger not available yet");
                break;
            };
            reports.push(self.ingest_next(cursor, &ledger)?);
        }
        Ok(reports)
    }

    /// Resolves a ledger and assigns identifiers, without touching the store.
    pub fn derive(&self, ledger: &Ledger) -> Result<Vec<Effect>, IngestError> {
        let resolved = self.resolve_ledger(ledger)?;
        assign_ids(ledger.sequence, resolved)
    }

    fn resolve_ledger(&self, ledger: &Ledger) -> Result<Vec<TransactionEffects>, IngestError> {
        let transactions = &ledger.transactions;
        let workers = self.config.workers.max(1);
        if workers == 1 || transactions.len() < self.config.parallel_threshold.max(2) {
            return transactions
                .iter()
                .enumerate()
                .map(|(index, tx)| resolve_transaction(ledger.sequence, index, tx))
                .collect();
        }

        let chunk_size = transactions.len().div_ceil(workers);
        debug!(
            ledger = %ledger.sequence,
            transactions = transactions.len(),
            workers,
            "resolving ledger in parallel"
        );
        let chunks = crossbeam::scope(|scope| {
            let handles: Vec<_> = transactions
                .chunks(chunk_size)
                .enumerate()
                .map(|(chunk_index, chunk)| {
                    scope.spawn(move |_| {
                        chunk
                            .iter()
                            .enumerate()
                            .map(|(offset, tx)| {
                                resolve_transaction(
                                    ledger.sequence,
                                    chunk_index * chunk_size + offset,
                                    tx,
                                )
                            })
                            .collect::<Result<Vec<_>, _>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap_or_else(|payload| panic::resume_unwind(payload)))
                .collect::<Vec<_>>()
        })
        .unwrap_or_else(|payload| panic::resume_unwind(payload));

        // First error in emission order wins, whichever worker finished first.
        let mut resolved = Vec::with_capacity(transactions.len());
        for chunk in chunks {
            resolved.extend(chunk?);
        }
        Ok(resolved)
    }

    fn write(&self, ledger: LedgerSequence, effects: Vec<Effect>) -> Result<IngestReport, IngestError> {
        let effects_written = effects.len();
        let mut unit = self.store.begin()?;
        let effects_replaced = if unit.contains_ledger(ledger)? {
            unit.delete_ledger(ledger)?
        } else {
            0
        };
        unit.insert_batch(effects)?;
        unit.commit()?;
        Ok(IngestReport {
            ledger,
            effects_written,
            effects_replaced,
        })
    }
}

fn resolve_transaction(
    ledger: LedgerSequence,
    index: usize,
    transaction: &TransactionRecord,
) -> Result<TransactionEffects, IngestError> {
    if !transaction.successful {
        return Ok(Vec::new());
    }
    transaction
        .operations
        .iter()
        .enumerate()
        .map(|(op_index, operation)| {
            resolve(operation, &transaction.source_account).map_err(|error| match error {
                ResolveError::MalformedStateDiff(reason) => IngestError::MalformedStateDiff {
                    ledger,
                    transaction: report_order(index),
                    operation: report_order(op_index),
                    reason,
                },
                ResolveError::Codec(codec) => IngestError::Codec(codec),
            })
        })
        .collect()
}

/// 1-based order for error reports.
fn report_order(index: usize) -> u32 {
    u32::try_from(index + 1).unwrap_or(u32::MAX)
}

/// 1-based identifier field for the element at `index`.
fn order(field: &'static str, index: usize) -> Result<u32, IngestError> {
    u32::try_from(index + 1).map_err(|_| IngestError::IdentifierOverflow {
        field,
        value: index as u64 + 1,
    })
}

fn assign_ids(
    ledger: LedgerSequence,
    resolved: Vec<TransactionEffects>,
) -> Result<Vec<Effect>, IngestError> {
    let mut effects = Vec::new();
    for (tx_index, operations) in resolved.into_iter().enumerate() {
        for (op_index, emitted) in operations.into_iter().enumerate() {
            if emitted.is_empty() {
                continue;
            }
            let operation_id = OperationId::new(
                ledger,
                order("transaction", tx_index)?,
                order("operation", op_index)?,
            )?;
            for (effect_index, effect) in emitted.into_iter().enumerate() {
                let id = operation_id.effect(order("effect", effect_index)?)?;
                effects.push(Effect::new(id, effect));
            }
        }
    }
    Ok(effects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::Amount;
    use crate::asset::Asset;
    use crate::base::AccountId;
    use crate::ledger::{AccountEntry, Change, OperationBody, OperationRecord, PaymentOp, StateDiff};
    use crate::store::MemoryStore;

    fn balance(id: &str, stroops: i64) -> AccountEntry {
        AccountEntry::new(AccountId::from(id), Amount::from_stroops(stroops))
    }

    fn payment(amount: i64) -> OperationRecord {
        OperationRecord {
            source_account: None,
            body: OperationBody::Payment(PaymentOp {
                destination: AccountId::from("GDST"),
                asset: Asset::Native,
                amount: Amount::from_stroops(amount),
            }),
            changes: StateDiff {
                accounts: vec![
                    Change::updated(
                        balance("GSRC", 1_000_000_000),
                        balance("GSRC", 1_000_000_000 - amount),
                    ),
                    Change::updated(balance("GDST", 0), balance("GDST", amount)),
                ],
                ..StateDiff::default()
            },
        }
    }

    fn transaction(operations: Vec<OperationRecord>) -> TransactionRecord {
        TransactionRecord {
            hash: "tx".into(),
            source_account: AccountId::from("GSRC"),
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

    #[test]
    fn failed_transactions_keep_their_slot() {
        let mut failed = transaction(vec![payment(1)]);
        failed.successful = false;
        let ledger = ledger(3, vec![failed, transaction(vec![payment(2)])]);

        let effects = Ingester::new(MemoryStore::new()).derive(&ledger).unwrap();
        assert_eq!(effects.len(), 2);
        assert!(effects.iter().all(|e| e.id.toid().transaction == 2));
    }

    #[test]
    fn effect_orders_start_at_one() {
        let ledger = ledger(3, vec![transaction(vec![payment(1)])]);
        let effects = Ingester::new(MemoryStore::new()).derive(&ledger).unwrap();
        let toid = effects[0].id.toid();
        assert_eq!(
            (toid.ledger, toid.transaction, toid.operation, toid.effect),
            (LedgerSequence(3), 1, 1, 1)
        );
        assert_eq!(effects[1].id.toid().effect, 2);
    }

    #[test]
    fn too_many_operations_overflow_the_identifier() {
        let operations = (0..=crate::toid::Toid::MAX_OPERATION as i64)
            .map(|i| payment(i + 1))
            .collect();
        let ledger = ledger(3, vec![transaction(operations)]);
        let result = Ingester::new(MemoryStore::new()).ingest(&ledger);
        assert!(matches!(
            result,
            Err(IngestError::IdentifierOverflow {
                field: "operation",
                ..
            })
        ));
    }

    #[test]
    fn parallel_resolution_matches_sequential() {
        let transactions = (0..40).map(|i| transaction(vec![payment(i + 1)])).collect();
        let ledger = ledger(9, transactions);

        let sequential = Ingester::new(MemoryStore::new()).derive(&ledger).unwrap();
        let parallel = Ingester::with_config(
            MemoryStore::new(),
            IngestConfig {
                workers: 3,
                parallel_threshold: 1,
            },
        )
        .derive(&ledger)
        .unwrap();
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn cursor_rejects_gaps() {
        let ingester = Ingester::new(MemoryStore::new());
        let mut cursor = IngestCursor::starting_at(LedgerSequence(2));
        let result = ingester.ingest_next(&mut cursor, &ledger(3, Vec::new()));
        assert_eq!(
            result,
            Err(IngestError::OutOfOrder {
                expected: LedgerSequence(2),
                got: LedgerSequence(3),
            })
        );
        assert_eq!(cursor.next(), LedgerSequence(2));
    }

    #[test]
    fn last_ledger_is_refused_before_anything_is_written() {
        let ingester = Ingester::new(MemoryStore::new());
        let mut cursor = IngestCursor::starting_at(LedgerSequence(u32::MAX));
        let last = ledger(u32::MAX, vec![transaction(vec![payment(1)])]);

        let result = ingester.ingest_next(&mut cursor, &last);
        assert_eq!(
            result,
            Err(IngestError::IdentifierOverflow {
                field: "ledger",
                value: u64::from(u32::MAX) + 1,
            })
        );
        assert!(ingester.store().is_empty());
        assert_eq!(cursor.next(), LedgerSequence(u32::MAX));
    }

    #[test]
    fn range_stops_at_missing_ledger() {
        let source: MemoryLedgerSource = vec![
            ledger(1, vec![transaction(vec![payment(1)])]),
            ledger(2, vec![transaction(vec![payment(2)])]),
        ]
        .into_iter()
        .collect();
        let ingester = Ingester::new(MemoryStore::new());
        let mut cursor = IngestCursor::starting_at(LedgerSequence(1));

        let reports = ingester
            .ingest_range(&source, &mut cursor, LedgerSequence(10))
            .unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(cursor.next(), LedgerSequence(3));
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: IngestConfig = serde_json::from_str(r#"{ "workers": 4 }"#).unwrap();
        assert_eq!(config.workers, 4);
        assert_eq!(config.parallel_threshold, 64);
    }
}
