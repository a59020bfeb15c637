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


//! Effect persistence.
//!
//! [`EffectStore`] is the contract ingestion writes through and queries read
//! from. Writes happen inside a [`StoreUnit`], which is all-or-nothing:
//! nothing staged in a unit is visible until [`StoreUnit::commit`], and a
//! unit dropped without committing leaves the store as it was.
//!
//! [`MemoryStore`] keeps each ledger's effects in one immutable slice and
//! publishes a ledger by swapping its slice, so readers never observe a
//! partially written ledger.

use crate::base::LedgerSequence;
use crate::effect::Effect;
use crate::error::StoreError;
use crate::toid::OperationId;
use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Persistence and query contract for effects.
///
/// Queries return effects ordered by identifier, ascending.
pub trait EffectStore: Send + Sync {
    type Unit<'a>: StoreUnit
    where
        Self: 'a;

    /// Opens an all-or-nothing write unit.
    fn begin(&self) -> Result<Self::Unit<'_>, StoreError>;

    fn effects_for_ledger(&self, ledger: LedgerSequence) -> Result<Vec<Effect>, StoreError>;

    /// # Errors
    ///
    /// Returns [`StoreError::InvalidQuery`] if `operation` does not address a
    /// single operation.
    fn effects_for_operation(&self, operation: OperationId) -> Result<Vec<Effect>, StoreError>;
}

/// Scoped write unit. Dropping it without [`commit`](StoreUnit::commit) rolls back.
pub trait StoreUnit {
    /// Whether the ledger has effects, as seen from inside this unit.
    fn contains_ledger(&self, ledger: LedgerSequence) -> Result<bool, StoreError>;

    /// Deletes every effect in the ledger's identifier range; returns how many.
    fn delete_ledger(&mut self, ledger: LedgerSequence) -> Result<usize, StoreError>;

    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateEffect`] if an identifier is already
    /// present in the store or repeated in the batch.
    fn insert_batch(&mut self, effects: Vec<Effect>) -> Result<(), StoreError>;

    fn commit(self) -> Result<(), StoreError>;
}

/// In-memory effect store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// Committed effects per ledger, sorted by identifier.
    ledgers: DashMap<LedgerSequence, Arc<[Effect]>>,
    /// Held by the open unit; one writer at a time.
    writer: Mutex<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledgers that currently have effects, ascending.
    pub fn ledgers(&self) -> Vec<LedgerSequence> {
        let mut ledgers: Vec<_> = self.ledgers.iter().map(|entry| *entry.key()).collect();
        ledgers.sort_unstable();
        ledgers
    }

    /// Total number of committed effects.
    pub fn len(&self) -> usize {
        self.ledgers.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.ledgers.is_empty()
    }

    fn snapshot(&self, ledger: LedgerSequence) -> Option<Arc<[Effect]>> {
        self.ledgers.get(&ledger).map(|entry| Arc::clone(entry.value()))
    }
}

impl EffectStore for MemoryStore {
    type Unit<'a> = MemoryUnit<'a>;

    fn begin(&self) -> Result<MemoryUnit<'_>, StoreError> {
        Ok(MemoryUnit {
            store: self,
            _writer: self.writer.lock(),
            staged: BTreeMap::new(),
        })
    }

    fn effects_for_ledger(&self, ledger: LedgerSequence) -> Result<Vec<Effect>, StoreError> {
        Ok(self
            .snapshot(ledger)
            .map(|rows| rows.to_vec())
            .unwrap_or_default())
    }

    fn effects_for_operation(&self, operation: OperationId) -> Result<Vec<Effect>, StoreError> {
        if !operation.is_valid() {
            return Err(StoreError::InvalidQuery(format!(
                "{operation} is not an operation identifier"
            )));
        }
        let Some(rows) = self.snapshot(operation.ledger()) else {
            return Ok(Vec::new());
        };
        let range = operation.effect_range();
        let start = rows.partition_point(|effect| effect.id < *range.start());
        let end = rows.partition_point(|effect| effect.id <= *range.end());
        Ok(rows[start..end].to_vec())
    }
}

/// Write unit of a [`MemoryStore`].
///
/// Holds the store's writer lock for its whole lifetime.
pub struct MemoryUnit<'a> {
    store: &'a MemoryStore,
    _writer: MutexGuard<'a, ()>,
    /// Full replacement contents of every ledger this unit touched.
    staged: BTreeMap<LedgerSequence, Vec<Effect>>,
}

impl MemoryUnit<'_> {
    fn rows_mut(&mut self, ledger: LedgerSequence) -> &mut Vec<Effect> {
        let store = self.store;
        self.staged.entry(ledger).or_insert_with(|| {
            store
                .snapshot(ledger)
                .map(|rows| rows.to_vec())
                .unwrap_or_default()
        })
    }
}

impl StoreUnit for MemoryUnit<'_> {
    fn contains_ledger(&self, ledger: LedgerSequence) -> Result<bool, StoreError> {
        Ok(match self.staged.get(&ledger) {
            Some(rows) => !rows.is_empty(),
            None => self.store.ledgers.contains_key(&ledger),
        })
    }

    fn delete_ledger(&mut self, ledger: LedgerSequence) -> Result<usize, StoreError> {
        let rows = self.rows_mut(ledger);
        let deleted = rows.len();
        rows.clear();
        Ok(deleted)
    }

    fn insert_batch(&mut self, effects: Vec<Effect>) -> Result<(), StoreError> {
        for effect in effects {
            let rows = self.rows_mut(effect.id.ledger());
            match rows.binary_search_by_key(&effect.id, |row| row.id) {
                Ok(_) => return Err(StoreError::DuplicateEffect(effect.id)),
                Err(position) => rows.insert(position, effect),
            }
        }
        Ok(())
    }

    fn commit(self) -> Result<(), StoreError> {
        let touched = self.staged.len();
        for (ledger, rows) in self.staged {
            if rows.is_empty() {
                self.store.ledgers.remove(&ledger);
            } else {
                self.store.ledgers.insert(ledger, Arc::from(rows));
            }
        }
        debug!(ledgers = touched, "committed effect store unit");
        Ok(())
    }
}
