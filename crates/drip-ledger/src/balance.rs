//! Balance algorithm.
//!
//! Pure functions of a stream record and an instant. Nothing here reads the
//! clock or touches the store, so the same inputs always give the same
//! answer.

use drip_types::{Address, Amount, Role, Stream, Timestamp};

use crate::error::LedgerError;

/// Amount of `streamed_deposit` the recipient has earned by `now`,
/// regardless of what has already been withdrawn.
///
/// Zero at or before `start_time`, the full streamed deposit at or after
/// `stop_time`, and `rate_per_second` per elapsed second in between.
pub fn elapsed_earned(stream: &Stream, now: Timestamp) -> Result<Amount, LedgerError> {
    if now <= stream.start_time {
        return Ok(0);
    }
    if now >= stream.stop_time {
        return Ok(stream.streamed_deposit);
    }
    stream
        .rate_per_second
        .checked_mul(Amount::from(now - stream.start_time))
        .ok_or(LedgerError::Overflow)
}

/// What the recipient could withdraw at `now`: earned so far minus what has
/// already been paid to them.
pub fn recipient_balance(stream: &Stream, now: Timestamp) -> Result<Amount, LedgerError> {
    let withdrawn = stream.withdrawn().ok_or(LedgerError::Overflow)?;
    elapsed_earned(stream, now)?
        .checked_sub(withdrawn)
        .ok_or(LedgerError::Overflow)
}

/// The still-unearned part of the remaining balance, which reverts to the
/// sender on cancellation.
pub fn sender_balance(stream: &Stream, now: Timestamp) -> Result<Amount, LedgerError> {
    stream
        .remaining_balance
        .checked_sub(recipient_balance(stream, now)?)
        .ok_or(LedgerError::Overflow)
}

/// Balance of `address` in `stream` at `now`. Zero for non-participants.
pub fn balance_for(
    stream: &Stream,
    address: &Address,
    now: Timestamp,
) -> Result<Amount, LedgerError> {
    match stream.role_of(address) {
        Role::Recipient => recipient_balance(stream, now),
        Role::Sender => sender_balance(stream, now),
        Role::Other => Ok(0),
    }
}
