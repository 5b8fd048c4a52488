use std::fmt;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::stream::StreamId;
use crate::Amount;

/// Notification emitted after a ledger operation has fully committed.
///
/// Events are consumed by external indexers and are never read back by the
/// ledger itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerEvent {
    StreamCreated {
        id: StreamId,
        sender: Address,
        recipient: Address,
    },
    Withdrawal {
        id: StreamId,
        sender: Address,
        recipient: Address,
        amount: Amount,
    },
    StreamCanceled {
        id: StreamId,
        sender: Address,
        recipient: Address,
        sender_share: Amount,
        recipient_share: Amount,
    },
}

impl LedgerEvent {
    /// The stream the event refers to.
    pub fn stream_id(&self) -> StreamId {
        match self {
            Self::StreamCreated { id, .. }
            | Self::Withdrawal { id, .. }
            | Self::StreamCanceled { id, .. } => *id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::StreamCreated { .. } => "StreamCreated",
            Self::Withdrawal { .. } => "Withdrawal",
            Self::StreamCanceled { .. } => "StreamCanceled",
        }
    }
}

impl fmt::Display for LedgerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StreamCreated {
                id,
                sender,
                recipient,
            } => write!(
                f,
                "StreamCreated({id}, sender={}, recipient={})",
                sender.short_id(),
                recipient.short_id()
            ),
            Self::Withdrawal {
                id,
                recipient,
                amount,
                ..
            } => write!(
                f,
                "Withdrawal({id}, recipient={}, amount={amount})",
                recipient.short_id()
            ),
            Self::StreamCanceled {
                id,
                sender_share,
                recipient_share,
                ..
            } => write!(
                f,
                "StreamCanceled({id}, sender_share={sender_share}, recipient_share={recipient_share})"
            ),
        }
    }
}
