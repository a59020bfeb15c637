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


//! Effect records and their detail payloads.
//!
//! Internally every effect carries a typed [`EffectDetails`]. The stored
//! shape is a flat, string-keyed [`Details`] map whose schema is fixed by
//! the [`EffectType`]; [`EffectDetails::encode`] and [`EffectDetails::decode`]
//! convert between the two.
//!
//! ```
//! use ledger_effects_rs::{AccountId, Amount, Asset, EffectDetails, EffectType, Movement};
//!
//! let details = EffectDetails::AccountCredited(Movement {
//!     asset: Asset::Native,
//!     amount: Amount::from_stroops(100_000_000),
//! });
//! let map = details.encode();
//! assert_eq!(map["amount"], "10.0000000");
//! assert_eq!(map["asset_type"], "native");
//! assert_eq!(EffectDetails::decode(EffectType::AccountCredited, &map).unwrap(), details);
//! ```

use crate::amount::Amount;
use crate::asset::{Asset, AssetKind};
use crate::base::AccountId;
use crate::error::CodecError;
use crate::toid::{EffectId, OperationId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Stored detail map. Keys are sorted, so encoding is deterministic.
pub type Details = serde_json::Map<String, Value>;

/// Closed set of effect types. Each has exactly one detail schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectType {
    AccountCreated,
    AccountRemoved,
    AccountCredited,
    AccountDebited,
    AccountThresholdsUpdated,
    AccountHomeDomainUpdated,
    AccountFlagsUpdated,
    AccountInflationDestinationUpdated,
    SignerCreated,
    SignerRemoved,
    SignerUpdated,
    TrustlineCreated,
    TrustlineRemoved,
    TrustlineUpdated,
    TrustlineAuthorized,
    TrustlineDeauthorized,
    Trade,
}

impl EffectType {
    /// Stable numeric code, grouped by the entity the effect concerns.
    pub fn code(self) -> i32 {
        match self {
            Self::AccountCreated => 0,
            Self::AccountRemoved => 1,
            Self::AccountCredited => 2,
            Self::AccountDebited => 3,
            Self::AccountThresholdsUpdated => 4,
            Self::AccountHomeDomainUpdated => 5,
            Self::AccountFlagsUpdated => 6,
            Self::AccountInflationDestinationUpdated => 7,
            Self::SignerCreated => 10,
            Self::SignerRemoved => 11,
            Self::SignerUpdated => 12,
            Self::TrustlineCreated => 20,
            Self::TrustlineRemoved => 21,
            Self::TrustlineUpdated => 22,
            Self::TrustlineAuthorized => 23,
            Self::TrustlineDeauthorized => 24,
            Self::Trade => 33,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::AccountCreated => "account_created",
            Self::AccountRemoved => "account_removed",
            Self::AccountCredited => "account_credited",
            Self::AccountDebited => "account_debited",
            Self::AccountThresholdsUpdated => "account_thresholds_updated",
            Self::AccountHomeDomainUpdated => "account_home_domain_updated",
            Self::AccountFlagsUpdated => "account_flags_updated",
            Self::AccountInflationDestinationUpdated => "account_inflation_destination_updated",
            Self::SignerCreated => "signer_created",
            Self::SignerRemoved => "signer_removed",
            Self::SignerUpdated => "signer_updated",
            Self::TrustlineCreated => "trustline_created",
            Self::TrustlineRemoved => "trustline_removed",
            Self::TrustlineUpdated => "trustline_updated",
            Self::TrustlineAuthorized => "trustline_authorized",
            Self::TrustlineDeauthorized => "trustline_deauthorized",
            Self::Trade => "trade",
        }
    }
}

impl fmt::Display for EffectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An asset amount moved into or out of an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Movement {
    pub asset: Asset,
    pub amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignerChange {
    pub public_key: AccountId,
    pub weight: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustlineChange {
    pub asset: Asset,
    pub limit: Amount,
}

/// Issuer-side authorization of a trustor's trustline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorization {
    pub trustor: AccountId,
    pub asset_kind: AssetKind,
    pub asset_code: String,
}

/// One offer fill, seen from the offer owner's side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trade {
    /// Counter-party of the offer owner.
    pub seller: AccountId,
    pub offer_id: u64,
    pub sold_asset: Asset,
    pub sold_amount: Amount,
    pub bought_asset: Asset,
    pub bought_amount: Amount,
}

/// Typed detail payload, one variant per [`EffectType`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EffectDetails {
    AccountCreated { starting_balance: Amount },
    AccountRemoved,
    AccountCredited(Movement),
    AccountDebited(Movement),
    AccountThresholdsUpdated { low: u8, medium: u8, high: u8 },
    AccountHomeDomainUpdated { home_domain: String },
    /// Only the flags that changed are set.
    AccountFlagsUpdated {
        auth_required: Option<bool>,
        auth_revocable: Option<bool>,
    },
    AccountInflationDestinationUpdated { inflation_destination: Option<AccountId> },
    SignerCreated(SignerChange),
    SignerRemoved(SignerChange),
    SignerUpdated(SignerChange),
    TrustlineCreated(TrustlineChange),
    TrustlineRemoved(TrustlineChange),
    TrustlineUpdated(TrustlineChange),
    TrustlineAuthorized(Authorization),
    TrustlineDeauthorized(Authorization),
    Trade(Trade),
}

impl EffectDetails {
    pub fn effect_type(&self) -> EffectType {
        match self {
            Self::AccountCreated { .. } => EffectType::AccountCreated,
            Self::AccountRemoved => EffectType::AccountRemoved,
            Self::AccountCredited(_) => EffectType::AccountCredited,
            Self::AccountDebited(_) => EffectType::AccountDebited,
            Self::AccountThresholdsUpdated { .. } => EffectType::AccountThresholdsUpdated,
            Self::AccountHomeDomainUpdated { .. } => EffectType::AccountHomeDomainUpdated,
            Self::AccountFlagsUpdated { .. } => EffectType::AccountFlagsUpdated,
            Self::AccountInflationDestinationUpdated { .. } => {
                EffectType::AccountInflationDestinationUpdated
            }
            Self::SignerCreated(_) => EffectType::SignerCreated,
            Self::SignerRemoved(_) => EffectType::SignerRemoved,
            Self::SignerUpdated(_) => EffectType::SignerUpdated,
            Self::TrustlineCreated(_) => EffectType::TrustlineCreated,
            Self::TrustlineRemoved(_) => EffectType::TrustlineRemoved,
            Self::TrustlineUpdated(_) => EffectType::TrustlineUpdated,
            Self::TrustlineAuthorized(_) => EffectType::TrustlineAuthorized,
            Self::TrustlineDeauthorized(_) => EffectType::TrustlineDeauthorized,
            Self::Trade(_) => EffectType::Trade,
        }
    }

    /// Flattens the payload into its stored map.
    pub fn encode(&self) -> Details {
        let mut w = DetailsWriter::default();
        match self {
            Self::AccountCreated { starting_balance } => {
                w.amount("starting_balance", *starting_balance);
            }
            Self::AccountRemoved => {}
            Self::AccountCredited(movement) | Self::AccountDebited(movement) => {
                w.amount("amount", movement.amount);
                w.asset("", &movement.asset);
            }
            Self::AccountThresholdsUpdated { low, medium, high } => {
                w.number("low_threshold", u64::from(*low));
                w.number("med_threshold", u64::from(*medium));
                w.number("high_threshold", u64::from(*high));
            }
            Self::AccountHomeDomainUpdated { home_domain } => {
                w.string("home_domain", home_domain);
            }
            Self::AccountFlagsUpdated {
                auth_required,
                auth_revocable,
            } => {
                if let Some(flag) = auth_required {
                    w.flag("auth_required_flag", *flag);
                }
                if let Some(flag) = auth_revocable {
                    w.flag("auth_revokable_flag", *flag);
                }
            }
            Self::AccountInflationDestinationUpdated {
                inflation_destination,
            } => {
                if let Some(destination) = inflation_destination {
                    w.string("inflation_destination", destination.as_str());
                }
            }
            Self::SignerCreated(signer) | Self::SignerRemoved(signer) | Self::SignerUpdated(signer) => {
                w.string("public_key", signer.public_key.as_str());
                w.number("weight", u64::from(signer.weight));
            }
            Self::TrustlineCreated(line) | Self::TrustlineRemoved(line) | Self::TrustlineUpdated(line) => {
                w.amount("limit", line.limit);
                w.asset("", &line.asset);
            }
            Self::TrustlineAuthorized(auth) | Self::TrustlineDeauthorized(auth) => {
                w.string("trustor", auth.trustor.as_str());
                w.string("asset_type", auth.asset_kind.as_str());
                w.string("asset_code", &auth.asset_code);
            }
            Self::Trade(trade) => {
                w.string("seller", trade.seller.as_str());
                w.number("offer_id", trade.offer_id);
                w.amount("sold_amount", trade.sold_amount);
                w.asset("sold_", &trade.sold_asset);
                w.amount("bought_amount", trade.bought_amount);
                w.asset("bought_", &trade.bought_asset);
            }
        }
        w.0
    }

    /// Rebuilds the typed payload from a stored map.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] if a required field is missing, has the wrong
    /// JSON type, or fails the asset/amount codec.
    pub fn decode(effect_type: EffectType, details: &Details) -> Result<Self, CodecError> {
        let r = DetailsReader(details);
        let decoded = match effect_type {
            EffectType::AccountCreated => Self::AccountCreated {
                starting_balance: r.amount("starting_balance")?,
            },
            EffectType::AccountRemoved => Self::AccountRemoved,
            EffectType::AccountCredited => Self::AccountCredited(r.movement()?),
            EffectType::AccountDebited => Self::AccountDebited(r.movement()?),
            EffectType::AccountThresholdsUpdated => Self::AccountThresholdsUpdated {
                low: r.weight("low_threshold")?,
                medium: r.weight("med_threshold")?,
                high: r.weight("high_threshold")?,
            },
            EffectType::AccountHomeDomainUpdated => Self::AccountHomeDomainUpdated {
                home_domain: r.string("home_domain")?.to_owned(),
            },
            EffectType::AccountFlagsUpdated => Self::AccountFlagsUpdated {
                auth_required: r.optional_flag("auth_required_flag")?,
                auth_revocable: r.optional_flag("auth_revokable_flag")?,
            },
            EffectType::AccountInflationDestinationUpdated => {
                Self::AccountInflationDestinationUpdated {
                    inflation_destination: r
                        .optional_string("inflation_destination")?
                        .map(AccountId::from),
                }
            }
            EffectType::SignerCreated => Self::SignerCreated(r.signer()?),
            EffectType::SignerRemoved => Self::SignerRemoved(r.signer()?),
            EffectType::SignerUpdated => Self::SignerUpdated(r.signer()?),
            EffectType::TrustlineCreated => Self::TrustlineCreated(r.trustline()?),
            EffectType::TrustlineRemoved => Self::TrustlineRemoved(r.trustline()?),
            EffectType::TrustlineUpdated => Self::TrustlineUpdated(r.trustline()?),
            EffectType::TrustlineAuthorized => Self::TrustlineAuthorized(r.authorization()?),
            EffectType::TrustlineDeauthorized => Self::TrustlineDeauthorized(r.authorization()?),
            EffectType::Trade => Self::Trade(Trade {
                seller: AccountId::from(r.string("seller")?),
                offer_id: r.number("offer_id")?,
                sold_asset: r.asset("sold_")?,
                sold_amount: r.amount("sold_amount")?,
                bought_asset: r.asset("bought_")?,
                bought_amount: r.amount("bought_amount")?,
            }),
        };
        Ok(decoded)
    }
}

#[derive(Default)]
struct DetailsWriter(Details);

impl DetailsWriter {
    fn string(&mut self, key: &str, value: &str) {
        self.0.insert(key.to_owned(), Value::String(value.to_owned()));
    }

    fn amount(&mut self, key: &str, amount: Amount) {
        self.0.insert(key.to_owned(), Value::String(amount.to_string()));
    }

    fn number(&mut self, key: &str, value: u64) {
        self.0.insert(key.to_owned(), Value::from(value));
    }

    fn flag(&mut self, key: &str, value: bool) {
        self.0.insert(key.to_owned(), Value::Bool(value));
    }

    /// Writes `{prefix}asset_type`, plus code and issuer for issued assets.
    fn asset(&mut self, prefix: &str, asset: &Asset) {
        let fields = asset.to_fields();
        self.string(&format!("{prefix}asset_type"), &fields.asset_type);
        if let Some(code) = fields.asset_code {
            self.string(&format!("{prefix}asset_code"), &code);
        }
        if let Some(issuer) = fields.asset_issuer {
            self.string(&format!("{prefix}asset_issuer"), &issuer);
        }
    }
}

struct DetailsReader<'a>(&'a Details);

impl<'a> DetailsReader<'a> {
    fn optional_string(&self, key: &str) -> Result<Option<&'a str>, CodecError> {
        match self.0.get(key) {
            None => Ok(None),
            Some(Value::String(value)) => Ok(Some(value.as_str())),
            Some(_) => Err(invalid(key, "expected a string")),
        }
    }

    fn string(&self, key: &str) -> Result<&'a str, CodecError> {
        self.optional_string(key)?
            .ok_or_else(|| CodecError::MissingDetail(key.to_owned()))
    }

    fn amount(&self, key: &str) -> Result<Amount, CodecError> {
        self.string(key)?.parse()
    }

    fn number(&self, key: &str) -> Result<u64, CodecError> {
        self.0
            .get(key)
            .ok_or_else(|| CodecError::MissingDetail(key.to_owned()))?
            .as_u64()
            .ok_or_else(|| invalid(key, "expected an unsigned integer"))
    }

    fn weight(&self, key: &str) -> Result<u8, CodecError> {
        u8::try_from(self.number(key)?).map_err(|_| invalid(key, "exceeds 255"))
    }

    fn optional_flag(&self, key: &str) -> Result<Option<bool>, CodecError> {
        match self.0.get(key) {
            None => Ok(None),
            Some(Value::Bool(flag)) => Ok(Some(*flag)),
            Some(_) => Err(invalid(key, "expected a boolean")),
        }
    }

    fn asset(&self, prefix: &str) -> Result<Asset, CodecError> {
        Asset::from_fields(
            self.string(&format!("{prefix}asset_type"))?,
            self.optional_string(&format!("{prefix}asset_code"))?,
            self.optional_string(&format!("{prefix}asset_issuer"))?,
        )
    }

    fn movement(&self) -> Result<Movement, CodecError> {
        Ok(Movement {
            asset: self.asset("")?,
            amount: self.amount("amount")?,
        })
    }

    fn signer(&self) -> Result<SignerChange, CodecError> {
        Ok(SignerChange {
            public_key: AccountId::from(self.string("public_key")?),
            weight: self.weight("weight")?,
        })
    }

    fn trustline(&self) -> Result<TrustlineChange, CodecError> {
        Ok(TrustlineChange {
            asset: self.asset("")?,
            limit: self.amount("limit")?,
        })
    }

    fn authorization(&self) -> Result<Authorization, CodecError> {
        Ok(Authorization {
            trustor: AccountId::from(self.string("trustor")?),
            asset_kind: self.string("asset_type")?.parse()?,
            asset_code: self.string("asset_code")?.to_owned(),
        })
    }
}

fn invalid(field: &str, reason: &str) -> CodecError {
    CodecError::InvalidDetail {
        field: field.to_owned(),
        reason: reason.to_owned(),
    }
}

/// Effect produced by resolving one operation, before it has an identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEffect {
    pub account: AccountId,
    pub details: EffectDetails,
}

impl ResolvedEffect {
    pub fn new(account: AccountId, details: EffectDetails) -> Self {
        Self { account, details }
    }

    pub fn effect_type(&self) -> EffectType {
        self.details.effect_type()
    }
}

/// A committed effect, as stored and queried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Effect {
    pub id: EffectId,
    pub operation_id: OperationId,
    pub account: AccountId,
    #[serde(rename = "type")]
    pub effect_type: EffectType,
    pub details: Details,
}

impl Effect {
    pub fn new(id: EffectId, resolved: ResolvedEffect) -> Self {
        Self {
            id,
            operation_id: id.operation_id(),
            account: resolved.account,
            effect_type: resolved.details.effect_type(),
            details: resolved.details.encode(),
        }
    }

    /// # Errors
    ///
    /// Returns a [`CodecError`] if the stored map does not match the schema of `effect_type`.
    pub fn decode_details(&self) -> Result<EffectDetails, CodecError> {
        EffectDetails::decode(self.effect_type, &self.details)
    }
}
