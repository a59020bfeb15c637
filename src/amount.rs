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


//! Fixed-point amounts.
//!
//! Amounts are signed 64-bit integers counted in units of 10^-7 (stroops).
//! Their canonical text form always carries exactly seven decimal places:
//!
//! ```
//! use ledger_effects_rs::Amount;
//!
//! let amount = Amount::from_stroops(100_000_000);
//! assert_eq!(amount.to_string(), "10.0000000");
//! assert_eq!("10.0000000".parse::<Amount>().unwrap(), amount);
//! ```

use crate::error::CodecError;
use rust_decimal::Decimal;
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Signed fixed-point amount with seven decimal places.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(i64);

impl Amount {
    pub const DECIMAL_PLACES: u32 = 7;
    pub const ZERO: Amount = Amount(0);
    /// Stroops in one whole unit.
    pub const ONE: i64 = 10_000_000;

    pub const fn from_stroops(stroops: i64) -> Self {
        Self(stroops)
    }

    pub const fn stroops(self) -> i64 {
        self.0
    }

    /// Exact decimal value.
    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.0, Self::DECIMAL_PLACES)
    }

    /// Converts a decimal without rounding.
    ///
    /// # Errors
    ///
    /// - [`CodecError::InvalidAmount`] if `value` has more than seven decimal places.
    /// - [`CodecError::AmountOverflow`] if the value does not fit in 64 bits of stroops.
    pub fn from_decimal(value: Decimal) -> Result<Self, CodecError> {
        let scale = value.scale();
        if scale > Self::DECIMAL_PLACES {
            return Err(CodecError::InvalidAmount(value.to_string()));
        }
        // mantissa is below 2^96, so widening by at most 10^7 stays inside i128
        let stroops = value.mantissa() * 10i128.pow(Self::DECIMAL_PLACES - scale);
        i64::try_from(stroops)
            .map(Self)
            .map_err(|_| CodecError::AmountOverflow(value.to_string()))
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Self)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

impl FromStr for Amount {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value =
            Decimal::from_str_exact(s).map_err(|_| CodecError::InvalidAmount(s.to_owned()))?;
        Self::from_decimal(value)
    }
}

impl Serialize for Amount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(de::Error::custom)
    }
}
