//! The coin: a self-contained value packet carrying its own identity,
//! owner, denomination, status, and hash-chained event history.
//!
//! Every sanctioned mutation recomputes the integrity hash; anything else
//! leaves the stored hash stale, which witnesses detect.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::canonical::coin_digest;
use crate::types::{now_ms, CoinId, Timestamp, WalletId};

/// Lifecycle state of a coin. Only `Active` coins are transferable; every
/// other state is terminal with respect to transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoinStatus {
    Active,
    Spent,
    Merged,
    Expired,
    Revoked,
    Frozen,
}

impl std::fmt::Display for CoinStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CoinStatus::Active => "active",
            CoinStatus::Spent => "spent",
            CoinStatus::Merged => "merged",
            CoinStatus::Expired => "expired",
            CoinStatus::Revoked => "revoked",
            CoinStatus::Frozen => "frozen",
        };
        f.write_str(s)
    }
}

/// One entry in a coin's history. `prev_hash` records the coin's integrity
/// hash immediately before the event, chaining each entry to the state the
/// previous entry committed to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum HistoryEvent {
    Transfer {
        from: WalletId,
        to: WalletId,
        timestamp: Timestamp,
        signature: String,
        witnesses: Vec<usize>,
        prev_hash: String,
        value: u64,
    },
    Split {
        /// The other coin produced or diminished by this split.
        counterpart: CoinId,
        amount: u64,
        timestamp: Timestamp,
        prev_hash: String,
    },
    Merge {
        /// The other coin participating in this merge.
        counterpart: CoinId,
        amount: u64,
        timestamp: Timestamp,
        prev_hash: String,
    },
}

impl HistoryEvent {
    pub fn prev_hash(&self) -> &str {
        match self {
            HistoryEvent::Transfer { prev_hash, .. }
            | HistoryEvent::Split { prev_hash, .. }
            | HistoryEvent::Merge { prev_hash, .. } => prev_hash,
        }
    }

    pub fn timestamp(&self) -> Timestamp {
        match self {
            HistoryEvent::Transfer { timestamp, .. }
            | HistoryEvent::Split { timestamp, .. }
            | HistoryEvent::Merge { timestamp, .. } => *timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoinError {
    #[error("coin value must be positive")]
    NonPositiveValue,

    #[error("invalid recipient")]
    InvalidRecipient,

    #[error("missing signature")]
    MissingSignature,

    #[error("coin status is {0}, not active")]
    InactiveStatus(CoinStatus),

    #[error("zero or negative value coin detected")]
    ZeroValue,

    #[error("coin has expired")]
    Expired,

    #[error("split value must be positive and below the coin value")]
    InvalidSplitValue,

    #[error("merge requires both coins to share an owner")]
    OwnerMismatch,
}

/// A self-contained value packet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coin {
    pub id: CoinId,
    pub owner_id: WalletId,
    pub value: u64,
    pub status: CoinStatus,
    pub history: Vec<HistoryEvent>,
    pub created: Timestamp,
    pub last_transferred: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<Timestamp>,
    #[serde(default)]
    pub metadata: Value,
    pub version: u32,
    pub hash: String,
}

impl Coin {
    /// Mint a coin with a fresh id. Fails on a zero denomination.
    pub fn new(owner_id: impl Into<WalletId>, value: u64) -> Result<Self, CoinError> {
        Self::with_id(owner_id, value, Uuid::new_v4().to_string(), Value::Null)
    }

    /// Mint a coin with a caller-supplied id and metadata.
    pub fn with_id(
        owner_id: impl Into<WalletId>,
        value: u64,
        id: impl Into<CoinId>,
        metadata: Value,
    ) -> Result<Self, CoinError> {
        if value == 0 {
            return Err(CoinError::NonPositiveValue);
        }
        let now = now_ms();
        let mut coin = Coin {
            id: id.into(),
            owner_id: owner_id.into(),
            value,
            status: CoinStatus::Active,
            history: Vec::new(),
            created: now,
            last_transferred: now,
            expiry_date: None,
            metadata,
            version: 1,
            hash: String::new(),
        };
        coin.recompute_hash();
        Ok(coin)
    }

    /// The integrity digest over the coin's current fields.
    pub fn compute_hash(&self) -> String {
        coin_digest(
            &self.id,
            &self.owner_id,
            self.value,
            self.created,
            self.last_transferred,
            self.history.len(),
            &self.status.to_string(),
            self.history.last().map(|e| e.prev_hash()),
        )
    }

    fn recompute_hash(&mut self) {
        self.hash = self.compute_hash();
    }

    /// Whether the stored hash matches the coin's current fields.
    pub fn verify_integrity(&self) -> bool {
        self.hash == self.compute_hash()
    }

    /// Whether the coin's expiry date has passed as of `now`.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expiry_date.map(|e| now >= e).unwrap_or(false)
    }

    /// Transition out of `Active`. All non-active states are terminal.
    pub fn transition(&mut self, to: CoinStatus) -> Result<(), CoinError> {
        if self.status != CoinStatus::Active {
            return Err(CoinError::InactiveStatus(self.status));
        }
        self.status = to;
        self.recompute_hash();
        Ok(())
    }

    /// Mark an expired-but-still-active coin as `Expired`. Returns whether
    /// a transition happened.
    pub fn touch(&mut self, now: Timestamp) -> bool {
        if self.status == CoinStatus::Active && self.is_expired(now) {
            self.status = CoinStatus::Expired;
            self.recompute_hash();
            true
        } else {
            false
        }
    }

    /// The canonical payload a sender signs and a witness verifies for a
    /// transfer of this coin.
    pub fn signature_data(&self, recipient_id: &str, timestamp: Timestamp) -> String {
        format!(
            "{}-{}-{}-{}-{}-{}-{}",
            self.id, self.owner_id, recipient_id, timestamp, self.value, self.hash, self.status
        )
    }

    /// Rewrite ownership after a quorum-confirmed transfer: appends one
    /// transfer event, moves the owner, bumps `last_transferred`, and
    /// recomputes the hash.
    pub fn transfer(
        &mut self,
        new_owner_id: &str,
        signature: &str,
        witnesses: Vec<usize>,
        now: Timestamp,
    ) -> Result<(), CoinError> {
        if self.status != CoinStatus::Active {
            return Err(CoinError::InactiveStatus(self.status));
        }
        if self.value == 0 {
            return Err(CoinError::ZeroValue);
        }
        if self.is_expired(now) {
            self.touch(now);
            return Err(CoinError::Expired);
        }
        if new_owner_id.is_empty() {
            return Err(CoinError::InvalidRecipient);
        }
        if signature.is_empty() {
            return Err(CoinError::MissingSignature);
        }

        let event = HistoryEvent::Transfer {
            from: self.owner_id.clone(),
            to: new_owner_id.to_string(),
            timestamp: now,
            signature: signature.to_string(),
            witnesses,
            prev_hash: self.hash.clone(),
            value: self.value,
        };
        self.owner_id = new_owner_id.to_string();
        self.last_transferred = now;
        self.history.push(event);
        self.recompute_hash();
        Ok(())
    }

    /// Carve `new_value` off this coin into a fresh coin with the same
    /// owner. Both coins record a split event referencing each other.
    pub fn split(&mut self, new_value: u64, now: Timestamp) -> Result<Coin, CoinError> {
        if self.status != CoinStatus::Active {
            return Err(CoinError::InactiveStatus(self.status));
        }
        if new_value == 0 || new_value >= self.value {
            return Err(CoinError::InvalidSplitValue);
        }

        let parent_hash = self.hash.clone();
        let child_id = Uuid::new_v4().to_string();

        self.value -= new_value;
        self.history.push(HistoryEvent::Split {
            counterpart: child_id.clone(),
            amount: new_value,
            timestamp: now,
            prev_hash: parent_hash.clone(),
        });
        self.recompute_hash();

        let mut child = Coin {
            id: child_id,
            owner_id: self.owner_id.clone(),
            value: new_value,
            status: CoinStatus::Active,
            history: vec![HistoryEvent::Split {
                counterpart: self.id.clone(),
                amount: new_value,
                timestamp: now,
                prev_hash: parent_hash,
            }],
            created: now,
            last_transferred: now,
            expiry_date: self.expiry_date,
            metadata: Value::Null,
            version: 1,
            hash: String::new(),
        };
        child.recompute_hash();
        Ok(child)
    }

    /// Absorb `other` into this coin. Both must be active and share an
    /// owner; `other` transitions to `Merged`.
    pub fn merge(&mut self, other: &mut Coin, now: Timestamp) -> Result<(), CoinError> {
        if self.owner_id != other.owner_id {
            return Err(CoinError::OwnerMismatch);
        }
        if self.status != CoinStatus::Active {
            return Err(CoinError::InactiveStatus(self.status));
        }
        if other.status != CoinStatus::Active {
            return Err(CoinError::InactiveStatus(other.status));
        }

        let amount = other.value;
        let self_hash = self.hash.clone();
        let other_hash = other.hash.clone();

        self.value += amount;
        self.history.push(HistoryEvent::Merge {
            counterpart: other.id.clone(),
            amount,
            timestamp: now,
            prev_hash: self_hash,
        });
        self.recompute_hash();

        other.status = CoinStatus::Merged;
        other.history.push(HistoryEvent::Merge {
            counterpart: self.id.clone(),
            amount,
            timestamp: now,
            prev_hash: other_hash,
        });
        other.recompute_hash();
        Ok(())
    }

    /// Serialize to the canonical JSON wire form.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON. The hash is recomputed and compared against
    /// the stored one; a mismatch is logged but the coin is returned with
    /// the stored hash intact so `verify_integrity` reports the tamper.
    pub fn from_json(data: &str) -> serde_json::Result<Coin> {
        let coin: Coin = serde_json::from_str(data)?;
        let expected = coin.compute_hash();
        if expected != coin.hash {
            warn!(
                coin_id = %coin.id,
                stored = %coin.hash,
                computed = %expected,
                "coin hash mismatch on deserialization"
            );
        }
        Ok(coin)
    }
}
