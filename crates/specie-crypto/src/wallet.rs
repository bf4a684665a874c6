//! The wallet: a keypair plus the multiset of coins it owns.
//!
//! A wallet never mutates a coin it does not hold, and signs exactly once
//! per transfer intent.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use specie_core::coin::Coin;
use specie_core::types::{CoinId, Timestamp, WalletId};

use crate::keys::{KeyError, WalletKeys};

#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    #[error("coin owner {coin_owner} does not match wallet {wallet}")]
    OwnerMismatch { coin_owner: WalletId, wallet: WalletId },

    #[error(transparent)]
    Key(#[from] KeyError),
}

/// Direction of a local transaction-log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Send,
    Receive,
}

/// One append-only entry in a wallet's local history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletRecord {
    pub kind: RecordKind,
    pub coin_id: CoinId,
    pub counterparty: WalletId,
    pub value: u64,
    pub timestamp: Timestamp,
}

/// The wire form of a transfer: the coin in flight, the sender's signature
/// over the coin's signing payload, and the endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferIntent {
    pub coin: Coin,
    /// Base64-encoded signature over `coin.signature_data(recipient, timestamp)`.
    pub signature: String,
    pub sender: WalletId,
    pub recipient: WalletId,
    pub timestamp: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<u64>,
}

/// A keypair holder owning a multiset of coins.
pub struct Wallet {
    keys: WalletKeys,
    id: WalletId,
    coins: Vec<Coin>,
    transactions: Vec<WalletRecord>,
}

impl Wallet {
    /// Create a wallet with a fresh keypair.
    pub fn new() -> Self {
        Self::from_keys(WalletKeys::generate())
    }

    /// Deterministic wallet from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self::from_keys(WalletKeys::from_seed(seed))
    }

    /// Load a wallet whose keypair seed is persisted at `path`.
    pub fn load(path: &Path) -> Result<Self, WalletError> {
        Ok(Self::from_keys(WalletKeys::load(path)?))
    }

    fn from_keys(keys: WalletKeys) -> Self {
        let id = keys.wallet_id();
        Self { keys, id, coins: Vec::new(), transactions: Vec::new() }
    }

    /// Persist the keypair seed to `path`.
    pub fn save_keys(&self, path: &Path) -> Result<(), WalletError> {
        Ok(self.keys.save(path)?)
    }

    pub fn id(&self) -> &WalletId {
        &self.id
    }

    pub fn public_key_hex(&self) -> String {
        self.keys.public_key_hex()
    }

    /// Sign an arbitrary payload with this wallet's key (base64 output).
    pub fn sign(&self, data: &[u8]) -> String {
        self.keys.sign(data)
    }

    pub fn coins(&self) -> &[Coin] {
        &self.coins
    }

    pub fn coin_count(&self) -> usize {
        self.coins.len()
    }

    pub fn coin_at(&self, index: usize) -> Option<&Coin> {
        self.coins.get(index)
    }

    pub fn coin_at_mut(&mut self, index: usize) -> Option<&mut Coin> {
        self.coins.get_mut(index)
    }

    /// Sum of the held coins' values.
    pub fn balance(&self) -> u64 {
        self.coins.iter().map(|c| c.value).sum()
    }

    pub fn transactions(&self) -> &[WalletRecord] {
        &self.transactions
    }

    /// Accept a coin into the wallet. Rejects a coin whose owner is not
    /// this wallet; records a receive entry on success.
    pub fn add_coin(&mut self, coin: Coin) -> Result<(), WalletError> {
        if coin.owner_id != self.id {
            return Err(WalletError::OwnerMismatch {
                coin_owner: coin.owner_id.clone(),
                wallet: self.id.clone(),
            });
        }
        self.transactions.push(WalletRecord {
            kind: RecordKind::Receive,
            coin_id: coin.id.clone(),
            counterparty: coin
                .history
                .last()
                .map(|e| match e {
                    specie_core::coin::HistoryEvent::Transfer { from, .. } => from.clone(),
                    _ => self.id.clone(),
                })
                .unwrap_or_else(|| self.id.clone()),
            value: coin.value,
            timestamp: specie_core::types::now_ms(),
        });
        debug!(wallet = %self.id, coin_id = %coin.id, value = coin.value, "coin received");
        self.coins.push(coin);
        Ok(())
    }

    /// Emit a transfer intent for the coin at `index`, removing it from the
    /// wallet and signing the coin's canonical transfer payload. Returns
    /// `None` if the index is out of range.
    pub fn transfer_coin(
        &mut self,
        index: usize,
        recipient_id: &str,
        now: Timestamp,
    ) -> Option<TransferIntent> {
        if index >= self.coins.len() {
            return None;
        }
        let coin = self.coins.remove(index);
        let signature = self.keys.sign(coin.signature_data(recipient_id, now).as_bytes());
        self.transactions.push(WalletRecord {
            kind: RecordKind::Send,
            coin_id: coin.id.clone(),
            counterparty: recipient_id.to_string(),
            value: coin.value,
            timestamp: now,
        });
        debug!(wallet = %self.id, coin_id = %coin.id, recipient = %recipient_id, "transfer intent signed");
        let value = coin.value;
        Some(TransferIntent {
            coin,
            signature,
            sender: self.id.clone(),
            recipient: recipient_id.to_string(),
            timestamp: now,
            value: Some(value),
        })
    }

    /// Remove a held coin by id (used by the double-spend harness to
    /// withdraw a forged copy).
    pub fn remove_coin_by_id(&mut self, coin_id: &str) -> Option<Coin> {
        let index = self.coins.iter().position(|c| c.id == coin_id)?;
        Some(self.coins.remove(index))
    }

    /// Index of a held coin by id.
    pub fn find_coin(&self, coin_id: &str) -> Option<usize> {
        self.coins.iter().position(|c| c.id == coin_id)
    }
}

impl Default for Wallet {
    fn default() -> Self {
        Self::new()
    }
}
