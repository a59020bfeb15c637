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


//! Asset descriptors and their canonical `asset_type`/`asset_code`/`asset_issuer` form.

use crate::base::AccountId;
use crate::error::CodecError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Canonical asset type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Native,
    CreditAlphanum4,
    CreditAlphanum12,
}

impl AssetKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::CreditAlphanum4 => "credit_alphanum4",
            Self::CreditAlphanum12 => "credit_alphanum12",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetKind {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "native" => Ok(Self::Native),
            "credit_alphanum4" => Ok(Self::CreditAlphanum4),
            "credit_alphanum12" => Ok(Self::CreditAlphanum12),
            other => Err(CodecError::InvalidAssetKind(other.to_owned())),
        }
    }
}

/// A monetary asset: the native currency or an issued credit.
///
/// Issued assets are only built through [`Asset::credit`], so the code
/// always matches its kind (1-4 characters for `credit_alphanum4`,
/// 5-12 for `credit_alphanum12`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "AssetFields", into = "AssetFields")]
pub enum Asset {
    Native,
    CreditAlphanum4 { code: String, issuer: AccountId },
    CreditAlphanum12 { code: String, issuer: AccountId },
}

impl Asset {
    /// Builds an issued asset, choosing the kind from the code length.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidAssetCode`] if the code is empty, longer than
    /// twelve characters or contains anything but ASCII letters and digits.
    pub fn credit(code: impl Into<String>, issuer: AccountId) -> Result<Self, CodecError> {
        let code = code.into();
        if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(CodecError::InvalidAssetCode(code));
        }
        match code.len() {
            1..=4 => Ok(Self::CreditAlphanum4 { code, issuer }),
            5..=12 => Ok(Self::CreditAlphanum12 { code, issuer }),
            _ => Err(CodecError::InvalidAssetCode(code)),
        }
    }

    pub fn kind(&self) -> AssetKind {
        match self {
            Self::Native => AssetKind::Native,
            Self::CreditAlphanum4 { .. } => AssetKind::CreditAlphanum4,
            Self::CreditAlphanum12 { .. } => AssetKind::CreditAlphanum12,
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Native => None,
            Self::CreditAlphanum4 { code, .. } | Self::CreditAlphanum12 { code, .. } => Some(code),
        }
    }

    pub fn issuer(&self) -> Option<&AccountId> {
        match self {
            Self::Native => None,
            Self::CreditAlphanum4 { issuer, .. } | Self::CreditAlphanum12 { issuer, .. } => {
                Some(issuer)
            }
        }
    }

    /// Splits the asset into its three canonical fields.
    pub fn to_fields(&self) -> AssetFields {
        AssetFields {
            asset_type: self.kind().as_str().to_owned(),
            asset_code: self.code().map(str::to_owned),
            asset_issuer: self.issuer().map(|issuer| issuer.0.clone()),
        }
    }

    /// Rebuilds an asset from its canonical fields.
    ///
    /// # Errors
    ///
    /// - [`CodecError::InvalidAssetKind`] for an unknown type tag.
    /// - [`CodecError::MissingDetail`] if an issued asset lacks its code or issuer.
    /// - [`CodecError::InvalidAssetCode`] if the code does not fit the declared kind.
    pub fn from_fields(
        asset_type: &str,
        asset_code: Option<&str>,
        asset_issuer: Option<&str>,
    ) -> Result<Self, CodecError> {
        let kind: AssetKind = asset_type.parse()?;
        if kind == AssetKind::Native {
            return Ok(Self::Native);
        }
        let code = asset_code.ok_or_else(|| CodecError::MissingDetail("asset_code".into()))?;
        let issuer =
            asset_issuer.ok_or_else(|| CodecError::MissingDetail("asset_issuer".into()))?;
        let asset = Self::credit(code, AccountId::from(issuer))?;
        if asset.kind() != kind {
            return Err(CodecError::InvalidAssetCode(code.to_owned()));
        }
        Ok(asset)
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code(), self.issuer()) {
            (Some(code), Some(issuer)) => write!(f, "{code}:{issuer}"),
            _ => f.write_str("native"),
        }
    }
}

/// Canonical three-field form of an [`Asset`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetFields {
    pub asset_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_issuer: Option<String>,
}

impl TryFrom<AssetFields> for Asset {
    type Error = CodecError;

    fn try_from(fields: AssetFields) -> Result<Self, Self::Error> {
        Asset::from_fields(
            &fields.asset_type,
            fields.asset_code.as_deref(),
            fields.asset_issuer.as_deref(),
        )
    }
}

impl From<Asset> for AssetFields {
    fn from(asset: Asset) -> Self {
        asset.to_fields()
    }
}
