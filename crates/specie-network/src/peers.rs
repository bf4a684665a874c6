//! Peer liveness bookkeeping: who we know, when we last heard from them,
//! and which entries a sweep should drop.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use specie_core::types::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerStatus {
    Connected,
    /// Past half the timeout window without a touch.
    Idle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub address: String,
    pub last_seen: Timestamp,
    pub status: PeerStatus,
    pub connected_at: Timestamp,
}

/// Liveness table with a silence timeout.
#[derive(Debug)]
pub struct PeerTable {
    peers: HashMap<String, PeerInfo>,
    timeout_ms: i64,
}

impl PeerTable {
    pub fn new(timeout_ms: i64) -> Self {
        Self { peers: HashMap::new(), timeout_ms }
    }

    /// Record a peer. Returns true when the peer is new.
    pub fn register(&mut self, peer_id: &str, address: &str, now: Timestamp) -> bool {
        match self.peers.get_mut(peer_id) {
            Some(info) => {
                info.address = address.to_string();
                info.last_seen = now;
                info.status = PeerStatus::Connected;
                false
            }
            None => {
                self.peers.insert(
                    peer_id.to_string(),
                    PeerInfo {
                        address: address.to_string(),
                        last_seen: now,
                        status: PeerStatus::Connected,
                        connected_at: now,
                    },
                );
                true
            }
        }
    }

    /// Refresh a peer's liveness. Returns true when the peer is known.
    pub fn touch(&mut self, peer_id: &str, now: Timestamp) -> bool {
        match self.peers.get_mut(peer_id) {
            Some(info) => {
                info.last_seen = now;
                info.status = PeerStatus::Connected;
                true
            }
            None => false,
        }
    }

    /// Drop peers silent past the timeout, returning their ids. Peers past
    /// half the window are marked idle.
    pub fn sweep(&mut self, now: Timestamp) -> Vec<String> {
        let timeout = self.timeout_ms;
        let removed: Vec<String> = self
            .peers
            .iter()
            .filter(|(_, info)| now - info.last_seen > timeout)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &removed {
            self.peers.remove(id);
        }
        for info in self.peers.values_mut() {
            if now - info.last_seen > timeout / 2 {
                info.status = PeerStatus::Idle;
            }
        }
        removed
    }

    pub fn get(&self, peer_id: &str) -> Option<&PeerInfo> {
        self.peers.get(peer_id)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_touch() {
        let mut table = PeerTable::new(30_000);
        assert!(table.register("peer-1", "local://1", 1_000));
        assert!(!table.register("peer-1", "local://1b", 2_000));
        assert!(table.touch("peer-1", 3_000));
        assert!(!table.touch("peer-unknown", 3_000));
        assert_eq!(table.get("peer-1").unwrap().address, "local://1b");
        assert_eq!(table.get("peer-1").unwrap().last_seen, 3_000);
        assert_eq!(table.get("peer-1").unwrap().connected_at, 1_000);
    }

    #[test]
    fn sweep_drops_silent_peers() {
        let mut table = PeerTable::new(30_000);
        table.register("fresh", "a", 100_000);
        table.register("silent", "b", 1_000);

        let removed = table.sweep(100_001);
        assert_eq!(removed, vec!["silent".to_string()]);
        assert_eq!(table.len(), 1);
        assert!(table.get("fresh").is_some());
    }

    #[test]
    fn sweep_marks_idle_before_dropping() {
        let mut table = PeerTable::new(30_000);
        table.register("p", "a", 0);
        let removed = table.sweep(20_000);
        assert!(removed.is_empty());
        assert_eq!(table.get("p").unwrap().status, PeerStatus::Idle);

        assert!(table.touch("p", 21_000));
        assert_eq!(table.get("p").unwrap().status, PeerStatus::Connected);
    }
}
