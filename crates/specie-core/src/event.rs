//! The typed event union emitted by the network orchestrator.
//!
//! Consumers subscribe to a channel of these instead of string-named
//! topics, so there is no way to listen on a misspelled channel.

use serde::{Deserialize, Serialize};

use crate::types::{CoinId, Timestamp, WalletId};

/// Aggregate counters reported by the periodic stats sweep.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkStatsReport {
    pub network_id: String,
    pub agents: usize,
    pub pending_transactions: usize,
    pub validations: u64,
    pub double_spends_prevented: u64,
    pub invalid_signatures: u64,
    pub zero_balance_prevented: u64,
    pub banned_wallets: u64,
    pub timestamp: Timestamp,
}

/// Everything the network reports to its observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NetworkEvent {
    PeerConnected {
        peer_id: String,
        address: String,
    },
    PeerUpdated {
        peer_id: String,
    },
    PeerDisconnect {
        peer_id: String,
    },
    TransactionNew {
        tx_id: String,
        sender: WalletId,
        recipient: WalletId,
        coin_id: CoinId,
        value: u64,
    },
    TransactionInvalid {
        tx_id: String,
        reason: String,
        witness_id: usize,
    },
    TransactionConfirmed {
        tx_id: String,
        coin_id: CoinId,
        witnesses: Vec<usize>,
    },
    TransactionFailed {
        tx_id: String,
        reason: String,
    },
    NetworkStats(NetworkStatsReport),
    NetworkInitialized {
        network_id: String,
        agents: usize,
        coins_per_agent: usize,
    },
    NetworkShutdown,
}
