//! The witness: a stateless validator peer with bounded local memory.
//!
//! Validation is ordered; the first failing stage short-circuits with a
//! specific reason. Fraud stages advance the sender's failure counter
//! toward a ban, while shape and directory failures do not.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use specie_core::canonical::replay_hash;
use specie_core::coin::CoinStatus;
use specie_core::types::{constants, iso_utc, CoinId, Timestamp, WalletId};
use specie_crypto::keys::verify_signature;
use specie_crypto::wallet::{TransferIntent, Wallet};

use crate::bloom::BloomFilter;
use crate::directory::DirectoryLookup;
use crate::recency::{CacheEntry, RecencyCache};
use crate::reputation::Reputation;

/// Why a witness rejected a transfer. `Display` renders the exact reason
/// string surfaced in verdicts and events.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RejectReason {
    #[error("missing required transfer data")]
    MissingTransferData,

    #[error("sender wallet is banned due to suspicious activity")]
    SenderBanned,

    #[error("coin integrity check failed")]
    IntegrityCheckFailed,

    #[error("coin status is {0}, not active")]
    NotActive(CoinStatus),

    #[error("zero or negative value coin detected")]
    ZeroOrNegativeValue,

    #[error("coin value has been inflated from {from} to {to}")]
    ValueInflated { from: u64, to: u64 },

    #[error("confirmed double-spend detected (previous transfer: {previous})")]
    ConfirmedDoubleSpend { previous: String },

    #[error("possible double-spend detected")]
    PossibleDoubleSpend,

    #[error("coin has expired")]
    CoinExpired,

    #[error("transaction replay detected")]
    ReplayDetected,

    #[error("unable to retrieve sender public key")]
    UnknownSenderKey,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("signature verification error: {0}")]
    SignatureVerification(String),

    #[error("validation error: {0}")]
    Internal(String),
}

impl RejectReason {
    /// Whether the rejection reflects a condition that may clear on retry
    /// (directory unavailable, internal fault) rather than sender fraud.
    pub fn is_transient(&self) -> bool {
        matches!(self, RejectReason::UnknownSenderKey | RejectReason::Internal(_))
    }

    /// Importance of the reputation penalty the orchestrator applies to
    /// the sender's agent for this rejection. Zero means no penalty.
    pub fn penalty_importance(&self) -> f64 {
        match self {
            RejectReason::ConfirmedDoubleSpend { .. } => 2.0,
            RejectReason::PossibleDoubleSpend => 1.5,
            RejectReason::IntegrityCheckFailed
            | RejectReason::NotActive(_)
            | RejectReason::ZeroOrNegativeValue
            | RejectReason::ValueInflated { .. }
            | RejectReason::ReplayDetected
            | RejectReason::InvalidSignature
            | RejectReason::SignatureVerification(_)
            | RejectReason::SenderBanned => 1.0,
            _ => 0.0,
        }
    }
}

/// A witness's answer to one transfer intent.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub valid: bool,
    pub reason: Option<RejectReason>,
    pub witness_id: usize,
    pub timestamp: Timestamp,
    pub reputation_score: f64,
    /// For confirmed double-spends: when this witness saw the coin before.
    pub previous_timestamp: Option<Timestamp>,
}

/// Observability counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WitnessStats {
    pub validations: u64,
    pub double_spends_prevented: u64,
    pub invalid_signatures: u64,
    pub zero_balance_prevented: u64,
    pub banned_wallets: u64,
}

/// Tunables for a witness's bounded memory and banning.
#[derive(Debug, Clone, Copy)]
pub struct WitnessConfig {
    pub max_failures_before_ban: u32,
    pub cache_capacity: usize,
    pub bloom_capacity: usize,
    pub bloom_hashes: usize,
}

impl Default for WitnessConfig {
    fn default() -> Self {
        Self {
            max_failures_before_ban: constants::MAX_FAILURES_BEFORE_BAN,
            cache_capacity: constants::RECENCY_CACHE_CAPACITY,
            bloom_capacity: constants::SEEN_COINS_CAPACITY,
            bloom_hashes: constants::SEEN_COINS_HASHES,
        }
    }
}

impl WitnessConfig {
    /// A small-memory configuration for tests and simulations.
    pub fn compact() -> Self {
        Self {
            max_failures_before_ban: constants::MAX_FAILURES_BEFORE_BAN,
            cache_capacity: 1024,
            bloom_capacity: 4096,
            bloom_hashes: 7,
        }
    }
}

/// Persisted witness state (the ephemeral failure counters are rebuilt
/// from live traffic).
#[derive(Debug, Serialize, Deserialize)]
pub struct WitnessSnapshot {
    pub id: usize,
    pub filter: BloomFilter,
    pub recent_transactions: Vec<(String, CacheEntry)>,
    pub validated_values: Vec<(CoinId, u64)>,
    pub banned_wallets: Vec<WalletId>,
    pub public_key_directory: Vec<(WalletId, String)>,
    pub reputation: Reputation,
    pub stats: WitnessStats,
    pub timestamp: Timestamp,
}

/// A validator peer: its wallet, its bounded memory of recent coins and
/// peers, and its reputation.
pub struct Witness {
    pub id: usize,
    pub wallet: Wallet,
    seen_coins: BloomFilter,
    recent: RecencyCache,
    validated_values: HashMap<CoinId, u64>,
    validation_failures: HashMap<WalletId, u32>,
    banned_wallets: HashSet<WalletId>,
    key_directory: HashMap<WalletId, String>,
    external_directory: Option<Arc<dyn DirectoryLookup>>,
    pub reputation: Reputation,
    pub stats: WitnessStats,
    config: WitnessConfig,
}

impl Witness {
    pub fn new(id: usize, wallet: Wallet, config: WitnessConfig) -> Self {
        // The witness's own key is always resolvable locally.
        let mut key_directory = HashMap::new();
        key_directory.insert(wallet.id().clone(), wallet.public_key_hex());
        Self {
            id,
            wallet,
            seen_coins: BloomFilter::for_capacity(config.bloom_capacity, config.bloom_hashes),
            recent: RecencyCache::new(config.cache_capacity),
            validated_values: HashMap::new(),
            validation_failures: HashMap::new(),
            banned_wallets: HashSet::new(),
            key_directory,
            external_directory: None,
            reputation: Reputation::new(),
            stats: WitnessStats::default(),
            config,
        }
    }

    /// Attach the external directory consulted on local cache misses.
    pub fn set_external_directory(&mut self, directory: Arc<dyn DirectoryLookup>) {
        self.external_directory = Some(directory);
    }

    /// Register a peer's public key in the local directory cache.
    pub fn register_public_key(&mut self, wallet_id: impl Into<WalletId>, key: impl Into<String>) {
        self.key_directory.insert(wallet_id.into(), key.into());
    }

    /// Drop a cached public key, forcing the next lookup through the
    /// external directory (used when a peer rotates keys).
    pub fn forget_public_key(&mut self, wallet_id: &str) {
        self.key_directory.remove(wallet_id);
    }

    /// Resolve a wallet's public key: local cache first, then the external
    /// directory (caching the answer).
    pub fn get_public_key_for_wallet(&mut self, wallet_id: &str) -> Option<String> {
        if let Some(key) = self.key_directory.get(wallet_id) {
            return Some(key.clone());
        }
        let fetched = self.external_directory.as_ref()?.lookup(wallet_id)?;
        self.key_directory.insert(wallet_id.to_string(), fetched.clone());
        Some(fetched)
    }

    pub fn is_banned(&self, wallet_id: &str) -> bool {
        self.banned_wallets.contains(wallet_id)
    }

    /// Lift a ban and clear the wallet's failure counter.
    pub fn unban(&mut self, wallet_id: &str) {
        self.banned_wallets.remove(wallet_id);
        self.validation_failures.remove(wallet_id);
    }

    pub fn failure_count(&self, wallet_id: &str) -> u32 {
        self.validation_failures.get(wallet_id).copied().unwrap_or(0)
    }

    /// Whether this witness has (probabilistically) seen a coin id.
    pub fn has_seen(&self, coin_id: &str) -> bool {
        self.seen_coins.contains(coin_id.as_bytes())
    }

    /// Last value this witness accepted for a coin id.
    pub fn last_validated_value(&self, coin_id: &str) -> Option<u64> {
        self.validated_values.get(coin_id).copied()
    }

    /// Run the ordered validation pipeline over one transfer intent.
    pub fn validate(&mut self, intent: &TransferIntent, now: Timestamp) -> Verdict {
        self.stats.validations += 1;
        match self.run_pipeline(intent, now) {
            Ok(verdict) => verdict,
            Err(err) => {
                // A fault in the witness itself, not sender fraud: report
                // it distinctly and self-penalize at low importance.
                warn!(witness = self.id, error = %err, "validation aborted by internal error");
                self.reputation.record_failure(0.5, now);
                self.reject(RejectReason::Internal(err.to_string()), now)
            }
        }
    }

    fn run_pipeline(&mut self, intent: &TransferIntent, now: Timestamp) -> anyhow::Result<Verdict> {
        let coin = &intent.coin;
        let sender = &intent.sender;

        // 1. Shape: everything the later stages dereference must be there.
        if coin.id.is_empty()
            || intent.signature.is_empty()
            || sender.is_empty()
            || intent.recipient.is_empty()
        {
            return Ok(self.reject(RejectReason::MissingTransferData, now));
        }

        // 2. Banned senders are refused outright, without advancing the
        // counter that got them banned.
        if self.banned_wallets.contains(sender) {
            return Ok(self.reject(RejectReason::SenderBanned, now));
        }

        // 3. Integrity: the stored hash must match the fields.
        if !coin.verify_integrity() {
            self.bump_failures(sender);
            return Ok(self.reject(RejectReason::IntegrityCheckFailed, now));
        }

        // 4. Only active coins move.
        if coin.status != CoinStatus::Active {
            self.bump_failures(sender);
            return Ok(self.reject(RejectReason::NotActive(coin.status), now));
        }

        // 5. Worthless coins never move.
        if coin.value == 0 {
            self.bump_failures(sender);
            self.stats.zero_balance_prevented += 1;
            return Ok(self.reject(RejectReason::ZeroOrNegativeValue, now));
        }

        // 6. A coin's value may only shrink across validations.
        if let Some(&last) = self.validated_values.get(&coin.id) {
            if coin.value > last {
                self.bump_failures(sender);
                return Ok(self.reject(
                    RejectReason::ValueInflated { from: last, to: coin.value },
                    now,
                ));
            }
        }

        // 7. Probabilistic double-spend, corroborated by the exact cache.
        if self.seen_coins.contains(coin.id.as_bytes()) {
            self.bump_failures(sender);
            self.stats.double_spends_prevented += 1;
            if let Some(entry) = self.recent.get(&coin.id) {
                let previous = entry.timestamp;
                let score = self.reputation.record_success(2.0, now);
                debug!(witness = self.id, coin_id = %coin.id, "confirmed double-spend caught");
                return Ok(Verdict {
                    valid: false,
                    reason: Some(RejectReason::ConfirmedDoubleSpend {
                        previous: iso_utc(previous),
                    }),
                    witness_id: self.id,
                    timestamp: now,
                    reputation_score: score,
                    previous_timestamp: Some(previous),
                });
            }
            // Bloom hit without cache corroboration: could be a false
            // positive, still refused.
            self.reputation.record_success(1.5, now);
            return Ok(self.reject(RejectReason::PossibleDoubleSpend, now));
        }

        // 8. Expiry.
        if coin.is_expired(now) {
            return Ok(self.reject(RejectReason::CoinExpired, now));
        }

        // 9. Verbatim replay of a previously accepted tuple.
        let tx_hash = replay_hash(
            &coin.id,
            sender,
            &intent.recipient,
            &intent.signature,
            intent.timestamp,
            coin.value,
        );
        if self.recent.contains(&tx_hash) {
            self.bump_failures(sender);
            return Ok(self.reject(RejectReason::ReplayDetected, now));
        }

        // 10. Signature over the coin's canonical transfer payload.
        let Some(public_key) = self.get_public_key_for_wallet(sender) else {
            return Ok(self.reject(RejectReason::UnknownSenderKey, now));
        };
        let payload = coin.signature_data(&intent.recipient, intent.timestamp);
        match verify_signature(payload.as_bytes(), &intent.signature, &public_key) {
            Ok(true) => {}
            Ok(false) => {
                self.bump_failures(sender);
                self.stats.invalid_signatures += 1;
                return Ok(self.reject(RejectReason::InvalidSignature, now));
            }
            Err(err) => {
                self.bump_failures(sender);
                return Ok(self.reject(
                    RejectReason::SignatureVerification(err.to_string()),
                    now,
                ));
            }
        }

        // 11. Accept: remember the coin and the tuple, reset the sender's
        // failure streak, and credit the validation.
        self.seen_coins.insert(coin.id.as_bytes());
        self.recent.insert(
            coin.id.clone(),
            CacheEntry {
                timestamp: now,
                hash: Some(tx_hash.clone()),
                sender: Some(sender.clone()),
                recipient: Some(intent.recipient.clone()),
                value: Some(coin.value),
                coin_id: None,
            },
        );
        self.recent.insert(
            tx_hash,
            CacheEntry { timestamp: now, coin_id: Some(coin.id.clone()), ..Default::default() },
        );
        self.validated_values.insert(coin.id.clone(), coin.value);
        self.validation_failures.remove(sender);
        let score = self.reputation.record_success(1.0, now);
        debug!(witness = self.id, coin_id = %coin.id, sender = %sender, "transfer validated");

        Ok(Verdict {
            valid: true,
            reason: None,
            witness_id: self.id,
            timestamp: now,
            reputation_score: score,
            previous_timestamp: None,
        })
    }

    fn reject(&self, reason: RejectReason, now: Timestamp) -> Verdict {
        Verdict {
            valid: false,
            reason: Some(reason),
            witness_id: self.id,
            timestamp: now,
            reputation_score: self.reputation.score,
            previous_timestamp: None,
        }
    }

    fn bump_failures(&mut self, sender: &str) {
        let count = self.validation_failures.entry(sender.to_string()).or_insert(0);
        *count += 1;
        if *count >= self.config.max_failures_before_ban
            && self.banned_wallets.insert(sender.to_string())
        {
            self.stats.banned_wallets += 1;
            warn!(
                witness = self.id,
                wallet = %sender,
                failures = *count,
                "wallet banned after repeated validation failures"
            );
        }
    }

    /// Capture the persisted state shape.
    pub fn snapshot(&self, now: Timestamp) -> WitnessSnapshot {
        WitnessSnapshot {
            id: self.id,
            filter: self.seen_coins.clone(),
            recent_transactions: self.recent.snapshot(),
            validated_values: self
                .validated_values
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
            banned_wallets: self.banned_wallets.iter().cloned().collect(),
            public_key_directory: self
                .key_directory
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            reputation: self.reputation.clone(),
            stats: self.stats,
            timestamp: now,
        }
    }

    /// Restore from a persisted snapshot. Failure counters restart empty.
    pub fn restore(&mut self, snapshot: WitnessSnapshot) {
        self.seen_coins = snapshot.filter;
        self.recent = RecencyCache::restore(self.config.cache_capacity, snapshot.recent_transactions);
        self.validated_values = snapshot.validated_values.into_iter().collect();
        self.banned_wallets = snapshot.banned_wallets.into_iter().collect();
        self.key_directory = snapshot.public_key_directory.into_iter().collect();
        self.reputation = snapshot.reputation;
        self.stats = snapshot.stats;
        self.validation_failures.clear();
    }
}
