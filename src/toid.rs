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


//! Total-order identifiers for effects, operations and transactions.
//!
//! An identifier packs a position in history into one sortable `u64`:
//!
//! ```text
//!  63            32 31          20 19       13 12           0
//! +----------------+--------------+-----------+--------------+
//! | ledger (32)    | tx order (12)| op (7)    | effect (13)  |
//! +----------------+--------------+-----------+--------------+
//! ```
//!
//! Transaction, operation and effect orders start at 1. A zero field stands
//! for the whole enclosing group, so an operation's identifier is the
//! identifier of its effects with the effect field cleared, and every effect
//! of a ledger or operation lies in one contiguous range.

use crate::base::LedgerSequence;
use crate::error::IngestError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;

const LEDGER_SHIFT: u32 = 32;
const TRANSACTION_BITS: u32 = 12;
const OPERATION_BITS: u32 = 7;
const EFFECT_BITS: u32 = 13;
const TRANSACTION_SHIFT: u32 = OPERATION_BITS + EFFECT_BITS;
const OPERATION_SHIFT: u32 = EFFECT_BITS;

const TRANSACTION_MASK: u64 = (1 << TRANSACTION_BITS) - 1;
const OPERATION_MASK: u64 = (1 << OPERATION_BITS) - 1;
const EFFECT_MASK: u64 = (1 << EFFECT_BITS) - 1;
const LEDGER_LOW_MASK: u64 = (1 << LEDGER_SHIFT) - 1;

/// Unpacked identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Toid {
    pub ledger: LedgerSequence,
    pub transaction: u32,
    pub operation: u32,
    pub effect: u32,
}

impl Toid {
    pub const MAX_TRANSACTION: u32 = TRANSACTION_MASK as u32;
    pub const MAX_OPERATION: u32 = OPERATION_MASK as u32;
    pub const MAX_EFFECT: u32 = EFFECT_MASK as u32;

    /// # Errors
    ///
    /// Returns [`IngestError::IdentifierOverflow`] if an order does not fit its field.
    pub fn new(
        ledger: LedgerSequence,
        transaction: u32,
        operation: u32,
        effect: u32,
    ) -> Result<Self, IngestError> {
        check_width("transaction", transaction, Self::MAX_TRANSACTION)?;
        check_width("operation", operation, Self::MAX_OPERATION)?;
        check_width("effect", effect, Self::MAX_EFFECT)?;
        Ok(Self {
            ledger,
            transaction,
            operation,
            effect,
        })
    }

    pub fn pack(self) -> u64 {
        (u64::from(self.ledger.0) << LEDGER_SHIFT)
            | (u64::from(self.transaction) << TRANSACTION_SHIFT)
            | (u64::from(self.operation) << OPERATION_SHIFT)
            | u64::from(self.effect)
    }

    pub fn unpack(id: u64) -> Self {
        Self {
            ledger: LedgerSequence((id >> LEDGER_SHIFT) as u32),
            transaction: ((id >> TRANSACTION_SHIFT) & TRANSACTION_MASK) as u32,
            operation: ((id >> OPERATION_SHIFT) & OPERATION_MASK) as u32,
            effect: (id & EFFECT_MASK) as u32,
        }
    }
}

fn check_width(field: &'static str, value: u32, max: u32) -> Result<(), IngestError> {
    if value > max {
        return Err(IngestError::IdentifierOverflow {
            field,
            value: u64::from(value),
        });
    }
    Ok(())
}

/// Identifier of one effect; primary key of the effect store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EffectId(pub u64);

impl EffectId {
    pub fn toid(self) -> Toid {
        Toid::unpack(self.0)
    }

    pub fn ledger(self) -> LedgerSequence {
        LedgerSequence((self.0 >> LEDGER_SHIFT) as u32)
    }

    pub fn operation_id(self) -> OperationId {
        OperationId(self.0 & !EFFECT_MASK)
    }
}

impl fmt::Display for EffectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one operation: an [`EffectId`] with the effect field cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(pub u64);

impl OperationId {
    /// # Errors
    ///
    /// Returns [`IngestError::IdentifierOverflow`] if an order does not fit its field.
    pub fn new(
        ledger: LedgerSequence,
        transaction: u32,
        operation: u32,
    ) -> Result<Self, IngestError> {
        Toid::new(ledger, transaction, operation, 0).map(|toid| Self(toid.pack()))
    }

    /// Identifier of the `effect`-th effect of this operation (1-based).
    pub fn effect(self, effect: u32) -> Result<EffectId, IngestError> {
        check_width("effect", effect, Toid::MAX_EFFECT)?;
        Ok(EffectId(self.0 | u64::from(effect)))
    }

    pub fn ledger(self) -> LedgerSequence {
        LedgerSequence((self.0 >> LEDGER_SHIFT) as u32)
    }

    pub fn toid(self) -> Toid {
        Toid::unpack(self.0)
    }

    /// True when the value addresses exactly one operation.
    pub fn is_valid(self) -> bool {
        let toid = self.toid();
        toid.effect == 0 && toid.operation != 0 && toid.transaction != 0
    }

    /// Every effect identifier this operation can own.
    pub fn effect_range(self) -> RangeInclusive<EffectId> {
        EffectId(self.0)..=EffectId(self.0 | EFFECT_MASK)
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Every effect identifier a ledger can own.
pub fn ledger_range(ledger: LedgerSequence) -> RangeInclusive<EffectId> {
    let start = u64::from(ledger.0) << LEDGER_SHIFT;
    EffectId(start)..=EffectId(start | LEDGER_LOW_MASK)
}
