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


//! # Ledger Effects
//!
//! This library derives the effects of closed ledgers: small typed records
//! describing how each operation changed account state (balances moved,
//! accounts created or merged, signers and trustlines changed, offers traded).
//!
//! ## Core Components
//!
//! - [`Ingester`]: Resolves a ledger and commits its effects atomically
//! - [`resolve`]: Per-operation derivation from the operation and its state diff
//! - [`EffectStore`]: Transactional persistence with ledger and operation queries
//! - [`MemoryStore`]: Concurrent in-memory store
//! - [`EffectDetails`]: Typed details, encoded to and decoded from a key/value map
//! - [`EffectId`] / [`OperationId`]: Ordered 64-bit identifiers
//!
//! ## Example
//!
//! ```
//! use ledger_effects_rs::{
//!     AccountEntry, AccountId, Amount, Asset, Change, EffectStore, EffectType, Ingester, Ledger,
//!     LedgerSequence, MemoryStore, OperationBody, OperationId, OperationRecord, PaymentOp,
//!     StateDiff, TransactionRecord,
//! };
//! use rust_decimal_macros::dec;
//!
//! let ingester = Ingester::new(MemoryStore::new());
//! let balance = |id: &str, value| {
//!     AccountEntry::new(AccountId::from(id), Amount::from_decimal(value).unwrap())
//! };
//!
//! // The payment and the balances it moved
//! let payment = OperationRecord {
//!     source_account: None,
//!     body: OperationBody::Payment(PaymentOp {
//!         destination: AccountId::from("GBOB"),
//!         asset: Asset::Native,
//!         amount: Amount::from_decimal(dec!(12.5)).unwrap(),
//!     }),
//!     changes: StateDiff {
//!         accounts: vec![
//!             Change::updated(balance("GALICE", dec!(100)), balance("GALICE", dec!(87.5))),
//!             Change::updated(balance("GBOB", dec!(0)), balance("GBOB", dec!(12.5))),
//!         ],
//!         ..StateDiff::default()
//!     },
//! };
//! let ledger = Ledger {
//!     sequence: LedgerSequence(7),
//!     transactions: vec![TransactionRecord {
//!         hash: "a1".into(),
//!         source_account: AccountId::from("GALICE"),
//!         successful: true,
//!         operations: vec![payment],
//!     }],
//! };
//! ingester.ingest(&ledger).unwrap();
//!
//! // Query the effects of transaction 1, operation 1
//! let operation = OperationId::new(LedgerSequence(7), 1, 1).unwrap();
//! let effects = ingester.store().effects_for_operation(operation).unwrap();
//! assert_eq!(effects.len(), 2);
//! assert_eq!(effects[0].effect_type, EffectType::AccountDebited);
//! assert_eq!(effects[0].details["amount"], "12.5000000");
//! ```
//!
//! ## Thread Safety
//!
//! Stores are shared across threads. Readers never observe a partially
//! ingested ledger; a single writer at a time commits whole ledgers.

mod amount;
mod asset;
mod base;
pub mod effect;
pub mod error;
mod ingest;
pub mod ledger;
mod resolver;
pub mod store;
mod toid;

pub use amount::Amount;
pub use asset::{Asset, AssetFields, AssetKind};
pub use base::{AccountId, LedgerSequence};
pub use effect::{
    Authorization, Details, Effect, EffectDetails, EffectType, Movement, ResolvedEffect,
    SignerChange, Trade, TrustlineChange,
};
pub use error::{CodecError, IngestError, ResolveError, StoreError};
pub use ingest::{
    IngestConfig, IngestCursor, IngestReport, Ingester, LedgerSource, MemoryLedgerSource,
};
pub use ledger::{
    AccountEntry, AccountFlags, AccountMergeOp, AllowTrustOp, Change, ChangeTrustOp,
    ClaimedOffer, CreateAccountOp, CreatePassiveOfferOp, Keyed, Ledger, ManageOfferOp,
    OfferEntry, OperationBody, OperationKind, OperationRecord, PathPaymentOp, PaymentOp, Price,
    SetOptionsOp, Signer, StateDiff, Thresholds, TransactionRecord, TrustLineEntry,
};
pub use resolver::resolve;
pub use store::{EffectStore, MemoryStore, MemoryUnit, StoreUnit};
pub use toid::{EffectId, OperationId, Toid, ledger_range};
