//! Balance operations
//!
//! The check-then-act sequences shared by every lock-based component. Each
//! function expects the caller to already hold the lock(s) guarding the
//! balances it receives, which is what makes the check and the act atomic.
//! Arithmetic is checked so a failing operation never leaves a balance
//! half-updated.

use crate::types::{AccountId, LedgerError, Outcome};
use rust_decimal::Decimal;

/// Reject negative amounts at the boundary
///
/// # Errors
///
/// Returns `NegativeAmount` if `amount < 0`.
pub fn ensure_non_negative(amount: Decimal, operation: &str) -> Result<(), LedgerError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(LedgerError::negative_amount(amount, operation));
    }
    Ok(())
}

/// Debit `amount` if the balance covers it
///
/// Returns `InsufficientFunds` and leaves the balance untouched otherwise.
///
/// # Errors
///
/// Returns `ArithmeticOverflow` if the subtraction cannot be represented.
pub fn apply_withdrawal(
    balance: &mut Decimal,
    amount: Decimal,
    account: AccountId,
) -> Result<Outcome, LedgerError> {
    if *balance < amount {
        return Ok(Outcome::InsufficientFunds);
    }

    *balance = balance
        .checked_sub(amount)
        .ok_or_else(|| LedgerError::arithmetic_overflow("withdraw", account))?;

    Ok(Outcome::Success)
}

/// Credit `amount`
///
/// # Errors
///
/// Returns `ArithmeticOverflow` if the addition cannot be represented; the
/// balance is unchanged in that case.
pub fn apply_deposit(
    balance: &mut Decimal,
    amount: Decimal,
    account: AccountId,
) -> Result<Outcome, LedgerError> {
    *balance = balance
        .checked_add(amount)
        .ok_or_else(|| LedgerError::arithmetic_overflow("deposit", account))?;

    Ok(Outcome::Success)
}

/// Move `amount` between two balances whose locks are both held
///
/// Both new values are computed before either balance is written, so the
/// debit is never applied without the matching credit.
///
/// # Errors
///
/// Returns `ArithmeticOverflow` if either side cannot be represented.
pub fn apply_transfer(
    from: (&mut Decimal, AccountId),
    to: (&mut Decimal, AccountId),
    amount: Decimal,
) -> Result<Outcome, LedgerError> {
    let (from_balance, from_id) = from;
    let (to_balance, to_id) = to;

    if *from_balance < amount {
        return Ok(Outcome::InsufficientFunds);
    }

    let new_from = from_balance
        .checked_sub(amount)
        .ok_or_else(|| LedgerError::arithmetic_overflow("transfer", from_id))?;
    let new_to = to_balance
        .checked_add(amount)
        .ok_or_else(|| LedgerError::arithmetic_overflow("transfer", to_id))?;

    *from_balance = new_from;
    *to_balance = new_to;

    Ok(Outcome::Success)
}
