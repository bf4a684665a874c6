//! The network orchestrator: holds the agent roster, drives transfers
//! through reputation-selected witness committees, retries inconclusive
//! transactions, and reports typed events.
//!
//! Custody rule: a coin lives in exactly one place — the sender's wallet,
//! the in-flight pending record, or the recipient's wallet. Fraud verdicts
//! return it to the sender immediately; inconclusive verdicts keep it in
//! flight until the retry budget runs out.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use specie_core::canonical::transaction_id;
use specie_core::coin::Coin;
use specie_core::event::{NetworkEvent, NetworkStatsReport};
use specie_core::types::{constants, now_ms, Timestamp};
use specie_crypto::wallet::{TransferIntent, Wallet};
use specie_protocol::directory::InMemoryDirectory;
use specie_protocol::reputation::Reputation;
use specie_protocol::witness::{RejectReason, Verdict, Witness, WitnessConfig};

use crate::peers::PeerTable;
use crate::selection::select_witnesses;
use crate::storage::AgentStateStore;

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct NetworkOptions {
    pub num_agents: usize,
    pub required_witnesses: usize,
    pub peer_timeout_ms: i64,
    pub max_retries: u32,
    pub network_id: String,
    pub data_dir: Option<PathBuf>,
    pub witness_config: WitnessConfig,
}

impl Default for NetworkOptions {
    fn default() -> Self {
        Self {
            num_agents: constants::DEFAULT_NUM_AGENTS,
            required_witnesses: constants::DEFAULT_REQUIRED_WITNESSES,
            peer_timeout_ms: constants::PEER_TIMEOUT_MS,
            max_retries: constants::MAX_RETRIES,
            network_id: constants::DEFAULT_NETWORK_ID.to_string(),
            data_dir: None,
            witness_config: WitnessConfig::default(),
        }
    }
}

/// Where a pending transaction stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingStatus {
    /// Awaiting quorum; eligible for retry.
    InFlight,
    /// Rejected by a witness; retained for stats, never re-driven.
    Failed,
}

/// One transaction being driven toward quorum.
#[derive(Debug)]
pub struct PendingTransaction {
    pub intent: TransferIntent,
    pub sender_agent: usize,
    pub recipient_agent: usize,
    pub witnesses_tried: Vec<usize>,
    pub validations: Vec<Verdict>,
    pub timestamp: Timestamp,
    pub retries: u32,
    pub status: PendingStatus,
    pub fail_reason: Option<String>,
}

/// Result handed back to a transfer caller.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferOutcome {
    pub success: bool,
    pub tx_id: Option<String>,
    pub reason: Option<String>,
}

impl TransferOutcome {
    fn rejected(reason: &str) -> Self {
        Self { success: false, tx_id: None, reason: Some(reason.to_string()) }
    }
}

/// Outcomes of the double-spend harness: the legitimate transfer and the
/// forged attempt.
#[derive(Debug, Clone)]
pub struct DoubleSpendReport {
    pub first: TransferOutcome,
    pub second: TransferOutcome,
}

/// The orchestrator.
pub struct Network {
    agents: Vec<Witness>,
    peers: PeerTable,
    pending: HashMap<String, PendingTransaction>,
    options: NetworkOptions,
    directory: Arc<InMemoryDirectory>,
    events: mpsc::UnboundedSender<NetworkEvent>,
    store: Option<AgentStateStore>,
    rng: StdRng,
    confirmed_count: u64,
    failed_count: u64,
}

impl Network {
    /// Build a network. Returns the orchestrator and the event stream.
    pub fn new(options: NetworkOptions) -> Result<(Self, mpsc::UnboundedReceiver<NetworkEvent>)> {
        Self::build(options, StdRng::from_entropy())
    }

    /// Build with a deterministic lottery (tests and reproducible runs).
    pub fn with_seed(
        options: NetworkOptions,
        seed: u64,
    ) -> Result<(Self, mpsc::UnboundedReceiver<NetworkEvent>)> {
        Self::build(options, StdRng::seed_from_u64(seed))
    }

    fn build(
        options: NetworkOptions,
        rng: StdRng,
    ) -> Result<(Self, mpsc::UnboundedReceiver<NetworkEvent>)> {
        let (events, event_rx) = mpsc::unbounded_channel();
        let store = match &options.data_dir {
            Some(dir) => Some(
                AgentStateStore::new(dir.clone())
                    .context("failed to open the agent state store")?,
            ),
            None => None,
        };
        let network = Self {
            agents: Vec::new(),
            peers: PeerTable::new(options.peer_timeout_ms),
            pending: HashMap::new(),
            options,
            directory: Arc::new(InMemoryDirectory::new()),
            events,
            store,
            rng,
            confirmed_count: 0,
            failed_count: 0,
        };
        Ok((network, event_rx))
    }

    /// Stand up the roster: agent 0 at full reputation, the rest with a
    /// plausible synthetic record; seed coins; cross-register every public
    /// key; register every agent as a peer.
    pub fn initialize(&mut self, coins_per_agent: usize) -> Result<()> {
        for i in 0..self.options.num_agents {
            let wallet = Wallet::new();
            let mut witness = Witness::new(i, wallet, self.options.witness_config);
            witness.set_external_directory(self.directory.clone());
            if i > 0 {
                let score: f64 = self.rng.gen_range(60.0..=100.0);
                let successful = (50.0 * score / 100.0).round() as u64;
                let failed = (50.0 * (1.0 - score / 100.0)).round() as u64;
                witness.reputation = Reputation::with_score(score, successful, failed);
            }
            self.agents.push(witness);
        }

        let keys: Vec<(String, String)> = self
            .agents
            .iter()
            .map(|a| (a.wallet.id().clone(), a.wallet.public_key_hex()))
            .collect();
        for (id, key) in &keys {
            self.directory.register(id.clone(), key.clone());
        }
        for agent in &mut self.agents {
            for (id, key) in &keys {
                agent.register_public_key(id.clone(), key.clone());
            }
        }

        for agent in &mut self.agents {
            let owner = agent.wallet.id().clone();
            for _ in 0..coins_per_agent {
                let value = self
                    .rng
                    .gen_range(constants::SEED_VALUE_MIN..=constants::SEED_VALUE_MAX);
                let coin = Coin::new(owner.clone(), value)
                    .context("failed to mint a seed coin")?;
                agent
                    .wallet
                    .add_coin(coin)
                    .context("failed to seed an agent wallet")?;
            }
        }

        let now = now_ms();
        for i in 0..self.agents.len() {
            let peer_id = format!("agent-{i}");
            let address = format!("local://agent/{i}");
            if self.peers.register(&peer_id, &address, now) {
                self.emit(NetworkEvent::PeerConnected { peer_id, address });
            }
        }

        info!(
            network_id = %self.options.network_id,
            agents = self.agents.len(),
            coins_per_agent,
            "network initialized"
        );
        self.emit(NetworkEvent::NetworkInitialized {
            network_id: self.options.network_id.clone(),
            agents: self.agents.len(),
            coins_per_agent,
        });
        Ok(())
    }

    pub fn options(&self) -> &NetworkOptions {
        &self.options
    }

    pub fn agent(&self, index: usize) -> Option<&Witness> {
        self.agents.get(index)
    }

    pub fn agent_mut(&mut self, index: usize) -> Option<&mut Witness> {
        self.agents.get_mut(index)
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn pending(&self, tx_id: &str) -> Option<&PendingTransaction> {
        self.pending.get(tx_id)
    }

    /// Record or refresh an external peer; emits connect/update events.
    pub fn register_peer(&mut self, peer_id: &str, address: &str, now: Timestamp) {
        if self.peers.register(peer_id, address, now) {
            self.emit(NetworkEvent::PeerConnected {
                peer_id: peer_id.to_string(),
                address: address.to_string(),
            });
        } else {
            self.emit(NetworkEvent::PeerUpdated { peer_id: peer_id.to_string() });
        }
    }

    /// Refresh a known peer's liveness.
    pub fn touch_peer(&mut self, peer_id: &str, now: Timestamp) {
        if self.peers.touch(peer_id, now) {
            self.emit(NetworkEvent::PeerUpdated { peer_id: peer_id.to_string() });
        }
    }

    /// Move the coin at `coin_index` from one agent's wallet to another,
    /// subject to the witness quorum.
    pub fn transfer_coin(&mut self, from: usize, to: usize, coin_index: usize) -> TransferOutcome {
        if from >= self.agents.len() || to >= self.agents.len() || from == to {
            return TransferOutcome::rejected("invalid agent IDs");
        }
        let recipient_id = self.agents[to].wallet.id().clone();
        let now = now_ms();
        let Some(intent) = self.agents[from].wallet.transfer_coin(coin_index, &recipient_id, now)
        else {
            return TransferOutcome::rejected("coin not found");
        };

        let tx_id = transaction_id(
            &intent.coin.id,
            &intent.sender,
            &intent.recipient,
            intent.timestamp,
        );
        if self.pending.contains_key(&tx_id) {
            // Duplicate submission: hand the coin back and report the
            // record already being driven.
            if let Err(err) = self.agents[from].wallet.add_coin(intent.coin) {
                warn!(%tx_id, error = %err, "could not return duplicate-submission coin");
            }
            return self.outcome_for(&tx_id);
        }

        self.emit(NetworkEvent::TransactionNew {
            tx_id: tx_id.clone(),
            sender: intent.sender.clone(),
            recipient: intent.recipient.clone(),
            coin_id: intent.coin.id.clone(),
            value: intent.coin.value,
        });
        self.pending.insert(
            tx_id.clone(),
            PendingTransaction {
                timestamp: intent.timestamp,
                intent,
                sender_agent: from,
                recipient_agent: to,
                witnesses_tried: Vec::new(),
                validations: Vec::new(),
                retries: 0,
                status: PendingStatus::InFlight,
                fail_reason: None,
            },
        );

        self.process_transaction(&tx_id, now);
        self.outcome_for(&tx_id)
    }

    fn outcome_for(&self, tx_id: &str) -> TransferOutcome {
        match self.pending.get(tx_id) {
            // Confirmed transactions leave the pending map.
            None => TransferOutcome {
                success: true,
                tx_id: Some(tx_id.to_string()),
                reason: None,
            },
            Some(record) if record.status == PendingStatus::Failed => TransferOutcome {
                success: false,
                tx_id: Some(tx_id.to_string()),
                reason: record.fail_reason.clone(),
            },
            Some(_) => TransferOutcome {
                success: false,
                tx_id: Some(tx_id.to_string()),
                reason: Some("transaction pending".to_string()),
            },
        }
    }

    /// Drive one pending transaction: solicit untried witnesses in
    /// selection order until a verdict settles it or the committee is
    /// exhausted.
    pub fn process_transaction(&mut self, tx_id: &str, now: Timestamp) {
        let required = self.options.required_witnesses;

        let (intent, exclude, have) = {
            let Some(record) = self.pending.get(tx_id) else { return };
            if record.status == PendingStatus::Failed {
                return;
            }
            let mut exclude: HashSet<usize> =
                record.witnesses_tried.iter().copied().collect();
            exclude.insert(record.sender_agent);
            exclude.insert(record.recipient_agent);
            (record.intent.clone(), exclude, record.validations.len())
        };

        if have >= required {
            self.confirm(tx_id, now);
            return;
        }

        let scores: Vec<(usize, f64)> = self
            .agents
            .iter()
            .map(|a| (a.id, a.reputation.score))
            .collect();
        let picks = select_witnesses(&mut self.rng, &scores, required - have, &exclude);
        if picks.is_empty() {
            debug!(%tx_id, "no untried witnesses available; leaving transaction pending");
            return;
        }

        let mut accepted: Vec<Verdict> = Vec::new();
        let mut rejection: Option<Verdict> = None;
        for witness_id in picks {
            if let Some(record) = self.pending.get_mut(tx_id) {
                record.witnesses_tried.push(witness_id);
            }
            let verdict = self.agents[witness_id].validate(&intent, now);
            if verdict.valid {
                accepted.push(verdict);
            } else {
                // First negative verdict: the rest of the committee is
                // not consulted.
                rejection = Some(verdict);
                break;
            }
        }

        if let Some(record) = self.pending.get_mut(tx_id) {
            record.validations.extend(accepted);
        }

        if let Some(verdict) = rejection {
            let reason = verdict
                .reason
                .clone()
                .unwrap_or_else(|| RejectReason::Internal("unspecified rejection".into()));
            if reason.is_transient() {
                debug!(%tx_id, witness = verdict.witness_id, reason = %reason,
                    "inconclusive verdict; transaction stays pending");
                return;
            }
            self.fail_transaction(tx_id, &reason, verdict.witness_id, now);
            return;
        }

        let have = self.pending.get(tx_id).map(|r| r.validations.len()).unwrap_or(0);
        if have >= required {
            self.confirm(tx_id, now);
        }
    }

    // A fraud verdict: mark failed, penalize the sender's agent, return
    // the coin, and report. The record stays in the map for stats.
    fn fail_transaction(
        &mut self,
        tx_id: &str,
        reason: &RejectReason,
        witness_id: usize,
        now: Timestamp,
    ) {
        let (sender_agent, coin) = {
            let Some(record) = self.pending.get_mut(tx_id) else { return };
            record.status = PendingStatus::Failed;
            record.fail_reason = Some(reason.to_string());
            (record.sender_agent, record.intent.coin.clone())
        };
        self.failed_count += 1;

        let importance = reason.penalty_importance();
        if importance > 0.0 {
            self.agents[sender_agent].reputation.record_failure(importance, now);
        }

        if let Err(err) = self.agents[sender_agent].wallet.add_coin(coin) {
            warn!(%tx_id, error = %err, "failed to roll a rejected coin back to its sender");
        }

        info!(%tx_id, witness = witness_id, reason = %reason, "transaction rejected");
        self.emit(NetworkEvent::TransactionInvalid {
            tx_id: tx_id.to_string(),
            reason: reason.to_string(),
            witness_id,
        });
    }

    // Quorum reached: rewrite ownership and deliver to the recipient.
    fn confirm(&mut self, tx_id: &str, now: Timestamp) {
        let Some(mut record) = self.pending.remove(tx_id) else { return };
        let witness_ids: Vec<usize> = record.validations.iter().map(|v| v.witness_id).collect();
        let mut coin = record.intent.coin.clone();

        match coin.transfer(&record.intent.recipient, &record.intent.signature, witness_ids.clone(), now) {
            Ok(()) => {
                let coin_id = coin.id.clone();
                if let Err(err) = self.agents[record.recipient_agent].wallet.add_coin(coin) {
                    warn!(%tx_id, error = %err, "recipient wallet refused a confirmed coin");
                }
                self.confirmed_count += 1;
                info!(%tx_id, coin_id = %coin_id, witnesses = ?witness_ids, "transaction confirmed");
                self.emit(NetworkEvent::TransactionConfirmed {
                    tx_id: tx_id.to_string(),
                    coin_id,
                    witnesses: witness_ids,
                });
            }
            Err(err) => {
                // The commit precondition slipped after validation (e.g.
                // the coin expired mid-flight). Refuse and roll back.
                let sender_agent = record.sender_agent;
                record.status = PendingStatus::Failed;
                record.fail_reason = Some(err.to_string());
                self.failed_count += 1;
                if let Err(e) = self.agents[sender_agent].wallet.add_coin(coin) {
                    warn!(%tx_id, error = %e, "failed to roll back after a commit error");
                }
                warn!(%tx_id, error = %err, "transfer commit failed");
                self.emit(NetworkEvent::TransactionFailed {
                    tx_id: tx_id.to_string(),
                    reason: err.to_string(),
                });
                self.pending.insert(tx_id.to_string(), record);
            }
        }
    }

    /// Test harness: complete one legitimate transfer, then forge a coin
    /// sharing the original id and value and attempt to spend it again.
    /// The forged copy is removed from the sender's wallet afterwards
    /// regardless of outcome.
    pub fn simulate_double_spend(&mut self, from: usize, coin_index: usize) -> DoubleSpendReport {
        let n = self.agents.len();
        if n < 3 || from >= n {
            let outcome = TransferOutcome::rejected("invalid agent IDs");
            return DoubleSpendReport { first: outcome.clone(), second: outcome };
        }
        let first_to = (from + 1) % n;
        let second_to = (from + 2) % n;

        let Some(original) = self.agents[from].wallet.coin_at(coin_index).cloned() else {
            let outcome = TransferOutcome::rejected("coin not found");
            return DoubleSpendReport { first: outcome.clone(), second: outcome };
        };

        let first = self.transfer_coin(from, first_to, coin_index);

        let owner = self.agents[from].wallet.id().clone();
        let second = match Coin::with_id(owner, original.value, original.id.clone(), serde_json::Value::Null)
        {
            Ok(forged) => match self.agents[from].wallet.add_coin(forged) {
                Ok(()) => {
                    let index = self.agents[from]
                        .wallet
                        .find_coin(&original.id)
                        .unwrap_or(self.agents[from].wallet.coin_count().saturating_sub(1));
                    self.transfer_coin(from, second_to, index)
                }
                Err(err) => TransferOutcome::rejected(&err.to_string()),
            },
            Err(err) => TransferOutcome::rejected(&err.to_string()),
        };

        self.agents[from].wallet.remove_coin_by_id(&original.id);
        DoubleSpendReport { first, second }
    }

    /// Drop peers that have been silent past the timeout.
    pub fn sweep_stale_peers(&mut self, now: Timestamp) {
        for peer_id in self.peers.sweep(now) {
            info!(peer = %peer_id, "peer timed out");
            self.emit(NetworkEvent::PeerDisconnect { peer_id });
        }
    }

    /// Re-drive pending transactions; drop the ones past the retry cap.
    /// In-flight records dropped here return their coin to the sender and
    /// report `max retries exceeded`.
    pub fn retry_pending(&mut self, now: Timestamp) {
        let tx_ids: Vec<String> = self.pending.keys().cloned().collect();
        let max_retries = self.options.max_retries;

        for tx_id in tx_ids {
            let (exhausted, in_flight) = {
                let Some(record) = self.pending.get_mut(&tx_id) else { continue };
                let exhausted = record.retries >= max_retries;
                if !exhausted {
                    record.retries += 1;
                }
                (exhausted, record.status == PendingStatus::InFlight)
            };

            if exhausted {
                if let Some(record) = self.pending.remove(&tx_id) {
                    if record.status == PendingStatus::InFlight {
                        self.failed_count += 1;
                        if let Err(err) =
                            self.agents[record.sender_agent].wallet.add_coin(record.intent.coin)
                        {
                            warn!(%tx_id, error = %err, "failed to return a coin after retry exhaustion");
                        }
                        info!(%tx_id, "transaction dropped after retry exhaustion");
                        self.emit(NetworkEvent::TransactionFailed {
                            tx_id: tx_id.clone(),
                            reason: "max retries exceeded".to_string(),
                        });
                    }
                }
            } else if in_flight {
                debug!(%tx_id, "retrying pending transaction");
                self.process_transaction(&tx_id, now);
            }
        }
    }

    /// Aggregate counters across the roster.
    pub fn stats_report(&self, now: Timestamp) -> NetworkStatsReport {
        let mut report = NetworkStatsReport {
            network_id: self.options.network_id.clone(),
            agents: self.agents.len(),
            pending_transactions: self.pending.len(),
            timestamp: now,
            ..Default::default()
        };
        for agent in &self.agents {
            report.validations += agent.stats.validations;
            report.double_spends_prevented += agent.stats.double_spends_prevented;
            report.invalid_signatures += agent.stats.invalid_signatures;
            report.zero_balance_prevented += agent.stats.zero_balance_prevented;
            report.banned_wallets += agent.stats.banned_wallets;
        }
        report
    }

    pub fn confirmed_count(&self) -> u64 {
        self.confirmed_count
    }

    pub fn failed_count(&self) -> u64 {
        self.failed_count
    }

    /// Emit a stats event and persist agent snapshots.
    pub fn publish_stats(&mut self, now: Timestamp) -> Result<()> {
        let report = self.stats_report(now);
        self.emit(NetworkEvent::NetworkStats(report));
        self.persist_agents(now)
    }

    /// Write every agent's snapshot through the state store, if configured.
    pub fn persist_agents(&self, now: Timestamp) -> Result<()> {
        if let Some(store) = &self.store {
            for agent in &self.agents {
                store.save(&agent.snapshot(now))?;
            }
        }
        Ok(())
    }

    /// Run the background sweeps until the shutdown signal flips.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut peer_interval =
            tokio::time::interval(Duration::from_millis(constants::PEER_SWEEP_INTERVAL_MS));
        let mut retry_interval =
            tokio::time::interval(Duration::from_millis(constants::RETRY_INTERVAL_MS));
        let mut stats_interval =
            tokio::time::interval(Duration::from_millis(constants::STATS_INTERVAL_MS));
        // Intervals fire immediately on first tick; consume those.
        peer_interval.tick().await;
        retry_interval.tick().await;
        stats_interval.tick().await;

        loop {
            tokio::select! {
                _ = peer_interval.tick() => self.sweep_stale_peers(now_ms()),
                _ = retry_interval.tick() => self.retry_pending(now_ms()),
                _ = stats_interval.tick() => {
                    if let Err(err) = self.publish_stats(now_ms()) {
                        warn!(error = %err, "stats publication failed");
                    }
                }
                _ = shutdown.changed() => {
                    self.shutdown()?;
                    return Ok(());
                }
            }
        }
    }

    /// Persist every agent and announce shutdown.
    pub fn shutdown(&mut self) -> Result<()> {
        self.persist_agents(now_ms())?;
        info!(network_id = %self.options.network_id, "network shut down");
        self.emit(NetworkEvent::NetworkShutdown);
        Ok(())
    }

    fn emit(&self, event: NetworkEvent) {
        // A dropped receiver only means nobody is listening.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_options() -> NetworkOptions {
        NetworkOptions {
            witness_config: WitnessConfig::compact(),
            ..Default::default()
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<NetworkEvent>) -> Vec<NetworkEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn initialize_seeds_roster_and_coins() {
        let (mut network, mut rx) = Network::with_seed(test_options(), 11).unwrap();
        network.initialize(3).unwrap();

        assert_eq!(network.agent_count(), 5);
        assert_eq!(network.agent(0).unwrap().reputation.score, 100.0);
        for i in 0..5 {
            let agent = network.agent(i).unwrap();
            assert_eq!(agent.wallet.coin_count(), 3);
            let score = agent.reputation.score;
            assert!((60.0..=100.0).contains(&score), "agent {i} score {score}");
            for coin in agent.wallet.coins() {
                assert!((1..=10).contains(&coin.value));
            }
        }

        let events = drain(&mut rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, NetworkEvent::NetworkInitialized { agents: 5, .. })));
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, NetworkEvent::PeerConnected { .. }))
                .count(),
            5
        );
    }

    #[test]
    fn transfer_between_agents_confirms() {
        let (mut network, mut rx) = Network::with_seed(test_options(), 7).unwrap();
        network.initialize(1).unwrap();

        let outcome = network.transfer_coin(0, 1, 0);
        assert!(outcome.success, "transfer failed: {:?}", outcome.reason);
        assert_eq!(network.pending_count(), 0);
        assert_eq!(network.agent(0).unwrap().wallet.coin_count(), 0);
        assert_eq!(network.agent(1).unwrap().wallet.coin_count(), 2);

        let events = drain(&mut rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, NetworkEvent::TransactionConfirmed { .. })));
    }

    #[test]
    fn invalid_indices_are_rejected() {
        let (mut network, _rx) = Network::with_seed(test_options(), 7).unwrap();
        network.initialize(1).unwrap();

        assert_eq!(
            network.transfer_coin(0, 9, 0).reason.as_deref(),
            Some("invalid agent IDs")
        );
        assert_eq!(
            network.transfer_coin(2, 2, 0).reason.as_deref(),
            Some("invalid agent IDs")
        );
        assert_eq!(
            network.transfer_coin(0, 1, 5).reason.as_deref(),
            Some("coin not found")
        );
    }

    #[test]
    fn peer_sweep_emits_disconnects() {
        let (mut network, mut rx) = Network::with_seed(test_options(), 7).unwrap();
        network.initialize(0).unwrap();
        drain(&mut rx);

        let far_future = now_ms() + constants::PEER_TIMEOUT_MS + 1;
        network.sweep_stale_peers(far_future);
        let events = drain(&mut rx);
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, NetworkEvent::PeerDisconnect { .. }))
                .count(),
            5
        );
    }

    #[test]
    fn peer_registration_emits_connect_then_update() {
        let (mut network, mut rx) = Network::with_seed(test_options(), 7).unwrap();
        network.initialize(0).unwrap();
        drain(&mut rx);

        let now = now_ms();
        network.register_peer("observer-1", "local://observer/1", now);
        network.register_peer("observer-1", "local://observer/1b", now + 1);
        network.touch_peer("observer-1", now + 2);
        network.touch_peer("nobody", now + 2);

        let events = drain(&mut rx);
        assert!(matches!(events[0], NetworkEvent::PeerConnected { .. }));
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, NetworkEvent::PeerUpdated { .. }))
                .count(),
            2
        );
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn stats_report_aggregates_roster() {
        let (mut network, _rx) = Network::with_seed(test_options(), 7).unwrap();
        network.initialize(1).unwrap();
        network.transfer_coin(0, 1, 0);

        let report = network.stats_report(now_ms());
        assert_eq!(report.agents, 5);
        // The confirming committee performed the validations.
        assert_eq!(report.validations, 3);
    }
}
