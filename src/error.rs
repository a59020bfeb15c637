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


//! Error types for effect derivation, storage and ingestion.

use crate::base::LedgerSequence;
use crate::toid::EffectId;
use thiserror::Error;

/// Asset, amount and detail-map codec errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Asset type tag is not one of the canonical kinds
    #[error("invalid asset kind: {0}")]
    InvalidAssetKind(String),

    /// Asset code is empty, too long for its kind, or not alphanumeric
    #[error("invalid asset code: {0}")]
    InvalidAssetCode(String),

    /// Amount string is not a plain decimal with at most seven places
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Amount does not fit in a signed 64-bit fixed-point value
    #[error("amount out of range: {0}")]
    AmountOverflow(String),

    /// Required detail field is absent
    #[error("missing detail field: {0}")]
    MissingDetail(String),

    /// Detail field has the wrong shape for its schema
    #[error("invalid detail field {field}: {reason}")]
    InvalidDetail { field: String, reason: String },
}

/// Errors raised while resolving a single operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// State diff is missing or inconsistent for a field a rule needs
    #[error("malformed state diff: {0}")]
    MalformedStateDiff(String),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Effect store failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Backend could not read or commit
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Effect identifier already present in the store or the batch
    #[error("duplicate effect {0}")]
    DuplicateEffect(EffectId),

    /// Query arguments do not describe a valid identifier range
    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

/// Ledger ingestion failures. Any of these leaves the store untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IngestError {
    /// Decoder produced an inconsistent diff for one operation
    #[error("malformed state diff in ledger {ledger}, transaction {transaction}, operation {operation}: {reason}")]
    MalformedStateDiff {
        ledger: LedgerSequence,
        transaction: u32,
        operation: u32,
        reason: String,
    },

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Position does not fit its identifier bit field
    #[error("{field} order {value} does not fit the effect identifier")]
    IdentifierOverflow { field: &'static str, value: u64 },

    #[error("effect store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    /// Ledger is not the one the cursor expects next
    #[error("expected ledger {expected}, got ledger {got}")]
    OutOfOrder {
        expected: LedgerSequence,
        got: LedgerSequence,
    },
}
