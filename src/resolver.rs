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


//! Operation effect resolution.
//!
//! [`resolve`] turns one operation into the ordered list of effects it
//! actually caused. There is one rule per [`OperationBody`] variant. A rule
//! reads only its own parameters and the operation's [`StateDiff`], and an
//! effect fires only when the state it describes differs between the
//! before and after snapshots. A requested change that left the ledger as
//! it was emits nothing.
//!
//! | Operation | Effects, in order |
//! |-----------|-------------------|
//! | create account | created, debited (source), signer created |
//! | payment | debited (source), credited (destination); nothing when paying oneself |
//! | path payment | debited (source), one trade per crossed offer, credited (destination) |
//! | manage / passive offer | one trade per crossed offer |
//! | set options | home domain, thresholds, flags, inflation destination, signers |
//! | change trust | trustline created / removed / updated |
//! | allow trust | trustline authorized / deauthorized |
//! | account merge | debited (source), credited (destination), removed (source) |
//! | inflation | one credit per account whose native balance grew |

use crate::amount::Amount;
use crate::asset::Asset;
use crate::base::AccountId;
use crate::effect::{
    Authorization, EffectDetails, Movement, ResolvedEffect, SignerChange, Trade, TrustlineChange,
};
use crate::error::{CodecError, ResolveError};
use crate::ledger::{
    AccountEntry, AccountMergeOp, AllowTrustOp, ChangeTrustOp, ClaimedOffer, CreateAccountOp,
    OperationBody, OperationRecord, PathPaymentOp, PaymentOp, StateDiff,
};
use std::collections::BTreeMap;

/// Resolves the effects of one operation.
///
/// `transaction_source` is used when the operation has no source of its own.
///
/// # Errors
///
/// - [`ResolveError::MalformedStateDiff`] if the diff is inconsistent or lacks a
///   snapshot the rule needs.
/// - [`ResolveError::Codec`] if an amount or asset cannot be represented.
pub fn resolve(
    operation: &OperationRecord,
    transaction_source: &AccountId,
) -> Result<Vec<ResolvedEffect>, ResolveError> {
    let source = operation
        .source_account
        .as_ref()
        .unwrap_or(transaction_source);
    let diff = &operation.changes;
    diff.validate()?;

    let mut effects = Vec::new();
    match &operation.body {
        OperationBody::CreateAccount(op) => create_account(source, op, diff, &mut effects)?,
        OperationBody::Payment(op) => payment(source, op, diff, &mut effects)?,
        OperationBody::PathPayment(op) => path_payment(source, op, diff, &mut effects)?,
        OperationBody::ManageOffer(op) => {
            trades(source, &op.offers_claimed, diff, &mut effects)?;
        }
        OperationBody::CreatePassiveOffer(op) => {
            trades(source, &op.offers_claimed, diff, &mut effects)?;
        }
        OperationBody::SetOptions(_) => set_options(source, diff, &mut effects)?,
        OperationBody::ChangeTrust(op) => change_trust(source, op, diff, &mut effects)?,
        OperationBody::AllowTrust(op) => allow_trust(source, op, diff, &mut effects)?,
        OperationBody::AccountMerge(op) => account_merge(source, op, diff, &mut effects)?,
        OperationBody::Inflation => inflation(diff, &mut effects)?,
    }
    Ok(effects)
}

fn malformed(reason: impl Into<String>) -> ResolveError {
    ResolveError::MalformedStateDiff(reason.into())
}

fn emit(effects: &mut Vec<ResolvedEffect>, account: &AccountId, details: EffectDetails) {
    effects.push(ResolvedEffect::new(account.clone(), details));
}

fn create_account(
    source: &AccountId,
    op: &CreateAccountOp,
    diff: &StateDiff,
    effects: &mut Vec<ResolvedEffect>,
) -> Result<(), ResolveError> {
    let change = diff
        .account(&op.destination)?
        .ok_or_else(|| malformed(format!("created account {} not in diff", op.destination)))?;
    if change.before.is_some() {
        return Err(malformed(format!(
            "created account {} already existed",
            op.destination
        )));
    }
    let created = change
        .after
        .as_ref()
        .ok_or_else(|| malformed(format!("created account {} has no after snapshot", op.destination)))?;

    emit(
        effects,
        &op.destination,
        EffectDetails::AccountCreated {
            starting_balance: op.starting_balance,
        },
    );
    emit(
        effects,
        source,
        EffectDetails::AccountDebited(Movement {
            asset: Asset::Native,
            amount: op.starting_balance,
        }),
    );
    emit(
        effects,
        &op.destination,
        EffectDetails::SignerCreated(SignerChange {
            public_key: op.destination.clone(),
            weight: created.thresholds.master_weight,
        }),
    );
    Ok(())
}

fn payment(
    source: &AccountId,
    op: &PaymentOp,
    diff: &StateDiff,
    effects: &mut Vec<ResolvedEffect>,
) -> Result<(), ResolveError> {
    // Paying oneself moves nothing.
    if *source == op.destination {
        return Ok(());
    }
    let amount = i128::from(op.amount.stroops());
    check_balance_moved(diff, source, &op.asset, -amount)?;
    check_balance_moved(diff, &op.destination, &op.asset, amount)?;

    emit(
        effects,
        source,
        EffectDetails::AccountDebited(Movement {
            asset: op.asset.clone(),
            amount: op.amount,
        }),
    );
    emit(
        effects,
        &op.destination,
        EffectDetails::AccountCredited(Movement {
            asset: op.asset.clone(),
            amount: op.amount,
        }),
    );
    Ok(())
}

/// The diff must show `holder`'s balance in `asset` moving by exactly `delta`.
///
/// The issuer of a credit asset keeps no balance of it, so nothing is checked
/// for the issuer.
fn check_balance_moved(
    diff: &StateDiff,
    holder: &AccountId,
    asset: &Asset,
    delta: i128,
) -> Result<(), ResolveError> {
    let balances = match asset {
        Asset::Native => diff.account(holder)?.map(|change| {
            (
                change.before.as_ref().map(|entry| entry.balance),
                change.after.as_ref().map(|entry| entry.balance),
            )
        }),
        _ if asset.issuer() == Some(holder) => return Ok(()),
        _ => diff.trustline(holder, asset)?.map(|change| {
            (
                change.before.as_ref().map(|entry| entry.balance),
                change.after.as_ref().map(|entry| entry.balance),
            )
        }),
    };
    let Some((Some(before), Some(after))) = balances else {
        return Err(malformed(format!(
            "{asset} balance of {holder} needs both snapshots"
        )));
    };
    let moved = i128::from(after.stroops()) - i128::from(before.stroops());
    if moved != delta {
        return Err(malformed(format!(
            "{asset} balance of {holder} moved from {before} to {after}, expected a change of {}",
            Amount::from_stroops(i64::try_from(delta).unwrap_or(i64::MAX))
        )));
    }
    Ok(())
}

fn path_payment(
    source: &AccountId,
    op: &PathPaymentOp,
    diff: &StateDiff,
    effects: &mut Vec<ResolvedEffect>,
) -> Result<(), ResolveError> {
    let sent = amount_sent(op)?;
    if sent > op.send_max {
        return Err(malformed(format!(
            "path payment sent {sent}, above its send_max {}",
            op.send_max
        )));
    }

    emit(
        effects,
        source,
        EffectDetails::AccountDebited(Movement {
            asset: op.send_asset.clone(),
            amount: sent,
        }),
    );
    trades(source, &op.offers_claimed, diff, effects)?;
    emit(
        effects,
        &op.destination,
        EffectDetails::AccountCredited(Movement {
            asset: op.dest_asset.clone(),
            amount: op.dest_amount,
        }),
    );
    Ok(())
}

/// Amount the source actually paid: what the leading run of source-side offers bought.
fn amount_sent(op: &PathPaymentOp) -> Result<Amount, ResolveError> {
    let Some(first) = op.offers_claimed.first() else {
        return Ok(op.dest_amount);
    };
    let mut total = Amount::ZERO;
    // Fills past the first hop are paid for by intermediate assets, not the source.
    for claim in op
        .offers_claimed
        .iter()
        .take_while(|claim| claim.asset_bought == first.asset_bought)
    {
        total = total.checked_add(claim.amount_bought).ok_or_else(|| {
            CodecError::AmountOverflow(format!("{total} + {}", claim.amount_bought))
        })?;
    }
    Ok(total)
}

/// Emits one trade per claim, attributed to the offer owner.
fn trades(
    counterparty: &AccountId,
    claims: &[ClaimedOffer],
    diff: &StateDiff,
    effects: &mut Vec<ResolvedEffect>,
) -> Result<(), ResolveError> {
    for claim in claims {
        check_fill(claim, diff)?;
        emit(
            effects,
            &claim.seller_id,
            EffectDetails::Trade(Trade {
                seller: counterparty.clone(),
                offer_id: claim.offer_id,
                sold_asset: claim.asset_sold.clone(),
                sold_amount: claim.amount_sold,
                bought_asset: claim.asset_bought.clone(),
                bought_amount: claim.amount_bought,
            }),
        );
    }
    Ok(())
}

/// The offer diff must show exactly the claimed amount leaving the book.
fn check_fill(claim: &ClaimedOffer, diff: &StateDiff) -> Result<(), ResolveError> {
    let change = diff
        .offer(claim.offer_id)?
        .ok_or_else(|| malformed(format!("claimed offer {} not in diff", claim.offer_id)))?;
    let before = change.before.as_ref().ok_or_else(|| {
        malformed(format!(
            "claimed offer {} has no before snapshot",
            claim.offer_id
        ))
    })?;
    if before.seller_id != claim.seller_id {
        return Err(malformed(format!(
            "claimed offer {} belongs to {}, not {}",
            claim.offer_id, before.seller_id, claim.seller_id
        )));
    }
    let remaining = change
        .after
        .as_ref()
        .map_or(Amount::ZERO, |after| after.amount);
    let filled = before.amount.checked_sub(remaining);
    if filled != Some(claim.amount_sold) {
        return Err(malformed(format!(
            "claimed offer {} sold {}, but the book moved from {} to {remaining}",
            claim.offer_id, claim.amount_sold, before.amount
        )));
    }
    Ok(())
}

fn set_options(
    source: &AccountId,
    diff: &StateDiff,
    effects: &mut Vec<ResolvedEffect>,
) -> Result<(), ResolveError> {
    let change = diff
        .account(source)?
        .ok_or_else(|| malformed(format!("set options source {source} not in diff")))?;
    let (Some(before), Some(after)) = (&change.before, &change.after) else {
        return Err(malformed(format!(
            "set options source {source} needs both snapshots"
        )));
    };

    if before.home_domain != after.home_domain {
        emit(
            effects,
            source,
            EffectDetails::AccountHomeDomainUpdated {
                home_domain: after.home_domain.clone(),
            },
        );
    }

    let (old, new) = (before.thresholds, after.thresholds);
    if (old.low, old.medium, old.high) != (new.low, new.medium, new.high) {
        emit(
            effects,
            source,
            EffectDetails::AccountThresholdsUpdated {
                low: new.low,
                medium: new.medium,
                high: new.high,
            },
        );
    }

    let changed = |old: bool, new: bool| (old != new).then_some(new);
    let auth_required = changed(before.flags.auth_required, after.flags.auth_required);
    let auth_revocable = changed(before.flags.auth_revocable, after.flags.auth_revocable);
    if auth_required.is_some() || auth_revocable.is_some() {
        emit(
            effects,
            source,
            EffectDetails::AccountFlagsUpdated {
                auth_required,
                auth_revocable,
            },
        );
    }

    if before.inflation_dest != after.inflation_dest {
        emit(
            effects,
            source,
            EffectDetails::AccountInflationDestinationUpdated {
                inflation_destination: after.inflation_dest.clone(),
            },
        );
    }

    signer_changes(source, before, after, effects);
    Ok(())
}

/// Weights by key, master key included. Weight zero means no signer.
fn signer_weights(account: &AccountEntry) -> BTreeMap<&AccountId, u8> {
    let mut weights = BTreeMap::new();
    if account.thresholds.master_weight > 0 {
        weights.insert(&account.account_id, account.thresholds.master_weight);
    }
    for signer in account.signers.iter().filter(|s| s.weight > 0) {
        weights.insert(&signer.key, signer.weight);
    }
    weights
}

/// Removed, then updated, then created signers, each ordered by key.
fn signer_changes(
    source: &AccountId,
    before: &AccountEntry,
    after: &AccountEntry,
    effects: &mut Vec<ResolvedEffect>,
) {
    let old = signer_weights(before);
    let new = signer_weights(after);
    let signer = |key: &AccountId, weight: u8| SignerChange {
        public_key: key.clone(),
        weight,
    };

    for (key, weight) in &old {
        if !new.contains_key(key) {
            emit(effects, source, EffectDetails::SignerRemoved(signer(*key, *weight)));
        }
    }
    for (key, weight) in &new {
        if old.get(key).is_some_and(|previous| previous != weight) {
            emit(effects, source, EffectDetails::SignerUpdated(signer(*key, *weight)));
        }
    }
    for (key, weight) in &new {
        if !old.contains_key(key) {
            emit(effects, source, EffectDetails::SignerCreated(signer(*key, *weight)));
        }
    }
}

fn change_trust(
    source: &AccountId,
    op: &ChangeTrustOp,
    diff: &StateDiff,
    effects: &mut Vec<ResolvedEffect>,
) -> Result<(), ResolveError> {
    let Some(change) = diff.trustline(source, &op.line)? else {
        return Ok(());
    };
    let details = match (&change.before, &change.after) {
        (None, Some(after)) => EffectDetails::TrustlineCreated(TrustlineChange {
            asset: op.line.clone(),
            limit: after.limit,
        }),
        (Some(_), None) => EffectDetails::TrustlineRemoved(TrustlineChange {
            asset: op.line.clone(),
            limit: Amount::ZERO,
        }),
        (Some(before), Some(after)) if before.limit != after.limit => {
            EffectDetails::TrustlineUpdated(TrustlineChange {
                asset: op.line.clone(),
                limit: after.limit,
            })
        }
        _ => return Ok(()),
    };
    emit(effects, source, details);
    Ok(())
}

fn allow_trust(
    source: &AccountId,
    op: &AllowTrustOp,
    diff: &StateDiff,
    effects: &mut Vec<ResolvedEffect>,
) -> Result<(), ResolveError> {
    let asset = Asset::credit(op.asset_code.clone(), source.clone())?;
    let Some(change) = diff.trustline(&op.trustor, &asset)? else {
        return Ok(());
    };
    let (Some(before), Some(after)) = (&change.before, &change.after) else {
        return Err(malformed(format!(
            "allow trust cannot create or remove the {asset} trustline of {}",
            op.trustor
        )));
    };
    if before.authorized == after.authorized {
        return Ok(());
    }

    let authorization = Authorization {
        trustor: op.trustor.clone(),
        asset_kind: asset.kind(),
        asset_code: op.asset_code.clone(),
    };
    let details = if after.authorized {
        EffectDetails::TrustlineAuthorized(authorization)
    } else {
        EffectDetails::TrustlineDeauthorized(authorization)
    };
    emit(effects, source, details);
    Ok(())
}

fn account_merge(
    source: &AccountId,
    op: &AccountMergeOp,
    diff: &StateDiff,
    effects: &mut Vec<ResolvedEffect>,
) -> Result<(), ResolveError> {
    let change = diff
        .account(source)?
        .ok_or_else(|| malformed(format!("merged account {source} not in diff")))?;
    let merged = match (&change.before, &change.after) {
        (Some(before), None) => before,
        _ => {
            return Err(malformed(format!(
                "merged account {source} must exist before and be gone after"
            )));
        }
    };
    let movement = Movement {
        asset: Asset::Native,
        amount: merged.balance,
    };

    emit(effects, source, EffectDetails::AccountDebited(movement.clone()));
    emit(effects, &op.destination, EffectDetails::AccountCredited(movement));
    emit(effects, source, EffectDetails::AccountRemoved);
    Ok(())
}

fn inflation(diff: &StateDiff, effects: &mut Vec<ResolvedEffect>) -> Result<(), ResolveError> {
    for change in &diff.accounts {
        let (Some(before), Some(after)) = (&change.before, &change.after) else {
            return Err(malformed("inflation cannot create or remove accounts"));
        };
        if after.balance > before.balance {
            let payout = after.balance.checked_sub(before.balance).ok_or_else(|| {
                CodecError::AmountOverflow(format!("{} - {}", after.balance, before.balance))
            })?;
            emit(
                effects,
                &after.account_id,
                EffectDetails::AccountCredited(Movement {
                    asset: Asset::Native,
                    amount: payout,
                }),
            );
        }
    }
    Ok(())
}
