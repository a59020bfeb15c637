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


//! Decoded ledger input.
//!
//! These types are produced by the ledger decoder and are read-only here:
//! a [`Ledger`] holds ordered [`TransactionRecord`]s, each holding ordered
//! [`OperationRecord`]s. Every operation carries its parameters
//! ([`OperationBody`]) and the before/after snapshot of each account,
//! trustline and offer it touched ([`StateDiff`]).

use crate::amount::Amount;
use crate::asset::Asset;
use crate::base::{AccountId, LedgerSequence};
use crate::error::ResolveError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;

/// One closed ledger: the unit of ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    pub sequence: LedgerSequence,
    #[serde(default)]
    pub transactions: Vec<TransactionRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub hash: String,
    pub source_account: AccountId,
    /// Failed transactions keep their position but change no state.
    #[serde(default = "default_successful")]
    pub successful: bool,
    #[serde(default)]
    pub operations: Vec<OperationRecord>,
}

fn default_successful() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRecord {
    /// Overrides the transaction source when set.
    #[serde(default)]
    pub source_account: Option<AccountId>,
    pub body: OperationBody,
    #[serde(default)]
    pub changes: StateDiff,
}

/// Operation kinds, without their parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    CreateAccount,
    Payment,
    PathPayment,
    ManageOffer,
    CreatePassiveOffer,
    SetOptions,
    ChangeTrust,
    AllowTrust,
    AccountMerge,
    Inflation,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateAccount => "create_account",
            Self::Payment => "payment",
            Self::PathPayment => "path_payment",
            Self::ManageOffer => "manage_offer",
            Self::CreatePassiveOffer => "create_passive_offer",
            Self::SetOptions => "set_options",
            Self::ChangeTrust => "change_trust",
            Self::AllowTrust => "allow_trust",
            Self::AccountMerge => "account_merge",
            Self::Inflation => "inflation",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operation parameters, one variant per kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OperationBody {
    CreateAccount(CreateAccountOp),
    Payment(PaymentOp),
    PathPayment(PathPaymentOp),
    ManageOffer(ManageOfferOp),
    CreatePassiveOffer(CreatePassiveOfferOp),
    SetOptions(SetOptionsOp),
    ChangeTrust(ChangeTrustOp),
    AllowTrust(AllowTrustOp),
    AccountMerge(AccountMergeOp),
    Inflation,
}

impl OperationBody {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::CreateAccount(_) => OperationKind::CreateAccount,
            Self::Payment(_) => OperationKind::Payment,
            Self::PathPayment(_) => OperationKind::PathPayment,
            Self::ManageOffer(_) => OperationKind::ManageOffer,
            Self::CreatePassiveOffer(_) => OperationKind::CreatePassiveOffer,
            Self::SetOptions(_) => OperationKind::SetOptions,
            Self::ChangeTrust(_) => OperationKind::ChangeTrust,
            Self::AllowTrust(_) => OperationKind::AllowTrust,
            Self::AccountMerge(_) => OperationKind::AccountMerge,
            Self::Inflation => OperationKind::Inflation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateAccountOp {
    pub destination: AccountId,
    pub starting_balance: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentOp {
    pub destination: AccountId,
    pub asset: Asset,
    pub amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathPaymentOp {
    pub destination: AccountId,
    pub send_asset: Asset,
    pub send_max: Amount,
    pub dest_asset: Asset,
    pub dest_amount: Amount,
    #[serde(default)]
    pub path: Vec<Asset>,
    /// Offers crossed while routing, in the order they were crossed.
    #[serde(default)]
    pub offers_claimed: Vec<ClaimedOffer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManageOfferOp {
    pub selling: Asset,
    pub buying: Asset,
    pub amount: Amount,
    pub price: Price,
    #[serde(default)]
    pub offer_id: u64,
    #[serde(default)]
    pub offers_claimed: Vec<ClaimedOffer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePassiveOfferOp {
    pub selling: Asset,
    pub buying: Asset,
    pub amount: Amount,
    pub price: Price,
    #[serde(default)]
    pub offers_claimed: Vec<ClaimedOffer>,
}

/// Requested option changes. Effects come from the account diff, never from these.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SetOptionsOp {
    pub inflation_dest: Option<AccountId>,
    pub clear_flags: Option<u32>,
    pub set_flags: Option<u32>,
    pub master_weight: Option<u8>,
    pub low_threshold: Option<u8>,
    pub med_threshold: Option<u8>,
    pub high_threshold: Option<u8>,
    pub home_domain: Option<String>,
    pub signer: Option<Signer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeTrustOp {
    pub line: Asset,
    pub limit: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowTrustOp {
    pub trustor: AccountId,
    pub asset_code: String,
    pub authorize: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountMergeOp {
    pub destination: AccountId,
}

/// Fill of one standing offer, as reported by the decoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimedOffer {
    pub seller_id: AccountId,
    pub offer_id: u64,
    pub asset_sold: Asset,
    pub amount_sold: Amount,
    pub asset_bought: Asset,
    pub amount_bought: Amount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    pub n: i32,
    pub d: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signer {
    pub key: AccountId,
    pub weight: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub master_weight: u8,
    pub low: u8,
    pub medium: u8,
    pub high: u8,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            master_weight: 1,
            low: 0,
            medium: 0,
            high: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountFlags {
    pub auth_required: bool,
    pub auth_revocable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountEntry {
    pub account_id: AccountId,
    pub balance: Amount,
    #[serde(default)]
    pub inflation_dest: Option<AccountId>,
    #[serde(default)]
    pub home_domain: String,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub flags: AccountFlags,
    #[serde(default)]
    pub signers: Vec<Signer>,
}

impl AccountEntry {
    /// A fresh account with only its master key.
    pub fn new(account_id: AccountId, balance: Amount) -> Self {
        Self {
            account_id,
            balance,
            inflation_dest: None,
            home_domain: String::new(),
            thresholds: Thresholds::default(),
            flags: AccountFlags::default(),
            signers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustLineEntry {
    pub account_id: AccountId,
    pub asset: Asset,
    pub balance: Amount,
    pub limit: Amount,
    #[serde(default)]
    pub authorized: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferEntry {
    pub offer_id: u64,
    pub seller_id: AccountId,
    pub selling: Asset,
    pub buying: Asset,
    pub amount: Amount,
    pub price: Price,
}

/// Ledger entries that can appear in a [`StateDiff`].
pub trait Keyed {
    type Key: Eq + Hash + fmt::Debug;

    fn key(&self) -> Self::Key;
}

impl Keyed for AccountEntry {
    type Key = AccountId;

    fn key(&self) -> AccountId {
        self.account_id.clone()
    }
}

impl Keyed for TrustLineEntry {
    type Key = (AccountId, Asset);

    fn key(&self) -> (AccountId, Asset) {
        (self.account_id.clone(), self.asset.clone())
    }
}

impl Keyed for OfferEntry {
    type Key = u64;

    fn key(&self) -> u64 {
        self.offer_id
    }
}

/// Before/after snapshot of one entry. `None` means absent on that side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change<T> {
    pub before: Option<T>,
    pub after: Option<T>,
}

impl<T> Change<T> {
    pub fn created(after: T) -> Self {
        Self {
            before: None,
            after: Some(after),
        }
    }

    pub fn updated(before: T, after: T) -> Self {
        Self {
            before: Some(before),
            after: Some(after),
        }
    }

    pub fn removed(before: T) -> Self {
        Self {
            before: Some(before),
            after: None,
        }
    }
}

impl<T: Keyed> Change<T> {
    /// Key of the entry, once both sides agree on it.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::MalformedStateDiff`] if both sides are absent or
    /// they describe different entries.
    pub fn key(&self) -> Result<T::Key, ResolveError> {
        match (&self.before, &self.after) {
            (None, None) => Err(ResolveError::MalformedStateDiff(
                "change has neither a before nor an after snapshot".into(),
            )),
            (Some(before), Some(after)) => {
                let key = before.key();
                if key != after.key() {
                    return Err(ResolveError::MalformedStateDiff(format!(
                        "change snapshots disagree: {key:?} vs {:?}",
                        after.key()
                    )));
                }
                Ok(key)
            }
            (Some(entry), None) | (None, Some(entry)) => Ok(entry.key()),
        }
    }
}

/// Every entry an operation touched.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StateDiff {
    pub accounts: Vec<Change<AccountEntry>>,
    pub trustlines: Vec<Change<TrustLineEntry>>,
    pub offers: Vec<Change<OfferEntry>>,
}

impl StateDiff {
    /// Checks that every change is well formed and no entry appears twice.
    pub fn validate(&self) -> Result<(), ResolveError> {
        validate_changes(&self.accounts)?;
        validate_changes(&self.trustlines)?;
        validate_changes(&self.offers)
    }

    pub fn account(&self, id: &AccountId) -> Result<Option<&Change<AccountEntry>>, ResolveError> {
        find_change(&self.accounts, id)
    }

    pub fn trustline(
        &self,
        account: &AccountId,
        asset: &Asset,
    ) -> Result<Option<&Change<TrustLineEntry>>, ResolveError> {
        find_change(&self.trustlines, &(account.clone(), asset.clone()))
    }

    pub fn offer(&self, offer_id: u64) -> Result<Option<&Change<OfferEntry>>, ResolveError> {
        find_change(&self.offers, &offer_id)
    }
}

fn validate_changes<T: Keyed>(changes: &[Change<T>]) -> Result<(), ResolveError> {
    let mut keys = HashSet::with_capacity(changes.len());
    for change in changes {
        let key = change.key()?;
        if keys.contains(&key) {
            return Err(ResolveError::MalformedStateDiff(format!(
                "entry {key:?} changed twice"
            )));
        }
        keys.insert(key);
    }
    Ok(())
}

fn find_change<'a, T: Keyed>(
    changes: &'a [Change<T>],
    key: &T::Key,
) -> Result<Option<&'a Change<T>>, ResolveError> {
    for change in changes {
        if change.key()? == *key {
            return Ok(Some(change));
        }
    }
    Ok(None)
}
