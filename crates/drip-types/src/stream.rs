use std::fmt;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::error::TypeError;
use crate::{Amount, Timestamp};

/// Sequential stream identifier. Assigned from 1 upward and never reused,
/// even after the stream it named has been canceled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(pub u64);

impl StreamId {
    /// The first id handed out by an empty store.
    pub const FIRST: StreamId = StreamId(1);

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream#{}", self.0)
    }
}

/// How an address relates to one stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Sender,
    Recipient,
    Other,
}

/// A linear payment stream.
///
/// The sender locks `total_deposit` and the recipient earns
/// `rate_per_second` for every second in `(start_time, stop_time]`. Only
/// `streamed_deposit`, the largest multiple of the duration not exceeding
/// the deposit, is ever streamed; the remainder is excluded from the
/// stream's accounting at creation.
///
/// `remaining_balance` is the amount still held for this stream. It starts
/// at `streamed_deposit` and only ever decreases.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stream {
    pub id: StreamId,
    pub sender: Address,
    pub recipient: Address,
    pub start_time: Timestamp,
    pub stop_time: Timestamp,
    pub total_deposit: Amount,
    pub rate_per_second: Amount,
    pub streamed_deposit: Amount,
    pub remaining_balance: Amount,
}

impl Stream {
    /// Build a fresh stream record, deriving the rate and the streamed
    /// portion of the deposit from the schedule.
    pub fn new(
        id: StreamId,
        sender: Address,
        recipient: Address,
        start_time: Timestamp,
        stop_time: Timestamp,
        total_deposit: Amount,
    ) -> Result<Self, TypeError> {
        if start_time >= stop_time {
            return Err(TypeError::EmptySchedule {
                start: start_time,
                stop: stop_time,
            });
        }
        let duration = Amount::from(stop_time - start_time);
        let streamed_deposit = total_deposit - total_deposit % duration;
        Ok(Self {
            id,
            sender,
            recipient,
            start_time,
            stop_time,
            total_deposit,
            rate_per_second: total_deposit / duration,
            streamed_deposit,
            remaining_balance: streamed_deposit,
        })
    }

    /// Length of the schedule in seconds. Always positive.
    pub fn duration(&self) -> Timestamp {
        self.stop_time - self.start_time
    }

    /// Part of the deposit that does not divide evenly across the duration.
    /// `None` if the record claims to stream more than was deposited.
    pub fn remainder(&self) -> Option<Amount> {
        self.total_deposit.checked_sub(self.streamed_deposit)
    }

    /// Total already paid out to the recipient. `None` if the record holds
    /// more than it ever streamed.
    pub fn withdrawn(&self) -> Option<Amount> {
        self.streamed_deposit.checked_sub(self.remaining_balance)
    }

    /// Verify that the derived fields agree with the schedule and deposit,
    /// and that the remaining balance lies within the streamed deposit.
    pub fn check(&self) -> Result<(), TypeError> {
        if self.start_time >= self.stop_time {
            return Err(TypeError::EmptySchedule {
                start: self.start_time,
                stop: self.stop_time,
            });
        }
        let inconsistent = |reason: String| TypeError::InconsistentStream {
            id: self.id.0,
            reason,
        };
        let duration = Amount::from(self.duration());
        let streamed = self.total_deposit - self.total_deposit % duration;
        if self.streamed_deposit != streamed {
            return Err(inconsistent(format!(
                "streamed deposit {} should be {streamed}",
                self.streamed_deposit
            )));
        }
        if self.rate_per_second != streamed / duration {
            return Err(inconsistent(format!(
                "rate {} should be {}",
                self.rate_per_second,
                streamed / duration
            )));
        }
        if self.remaining_balance > self.streamed_deposit {
            return Err(inconsistent(format!(
                "remaining {} exceeds streamed deposit {}",
                self.remaining_balance, self.streamed_deposit
            )));
        }
        Ok(())
    }

    pub fn role_of(&self, address: &Address) -> Role {
        if *address == self.recipient {
            Role::Recipient
        } else if *address == self.sender {
            Role::Sender
        } else {
            Role::Other
        }
    }
}
