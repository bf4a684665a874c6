//! Public-key directory: the seam between a witness and whatever service
//! resolves wallet ids to public keys. Tests inject failing
//! implementations; production wires the shared in-memory registry.

use std::collections::HashMap;
use std::sync::RwLock;

use specie_core::types::WalletId;

/// Resolve a wallet id to its hex-encoded public key.
pub trait DirectoryLookup: Send + Sync {
    fn lookup(&self, wallet_id: &str) -> Option<String>;
}

/// Process-wide registry backing every agent's directory misses.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    entries: RwLock<HashMap<WalletId, String>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, wallet_id: impl Into<WalletId>, public_key_hex: impl Into<String>) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(wallet_id.into(), public_key_hex.into());
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DirectoryLookup for InMemoryDirectory {
    fn lookup(&self, wallet_id: &str) -> Option<String> {
        self.entries.read().ok()?.get(wallet_id).cloned()
    }
}
