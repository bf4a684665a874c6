//! Wallet keypair management: Ed25519 signing keys, hex-encoded public
//! keys, base64 wire signatures, and the wallet-id derivation.

use std::path::Path;

use base64::Engine as _;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};

use specie_core::types::WalletId;

/// Number of hex chars of the public-key digest that form a wallet id.
pub const WALLET_ID_LEN: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("malformed public key: {0}")]
    MalformedKey(String),

    #[error("malformed signature: {0}")]
    MalformedSignature(String),

    #[error("key seed must be exactly 32 bytes")]
    BadSeedLength,

    #[error("key file {path} has insecure permissions {mode:04o}, expected 0600")]
    InsecureKeyFile { path: String, mode: u32 },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A wallet's signing keypair.
#[derive(Clone)]
pub struct WalletKeys {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl WalletKeys {
    /// Generate a fresh random keypair.
    pub fn generate() -> Self {
        let mut rng = rand::rngs::OsRng {};
        let signing_key = SigningKey::generate(&mut rng);
        let verifying_key = signing_key.verifying_key();
        Self { signing_key, verifying_key }
    }

    /// Deterministic keypair from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        let verifying_key = signing_key.verifying_key();
        Self { signing_key, verifying_key }
    }

    /// Hex encoding of the public key.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.verifying_key.as_bytes())
    }

    /// The wallet id derived from this keypair's public key.
    pub fn wallet_id(&self) -> WalletId {
        wallet_id_for(&self.public_key_hex())
    }

    /// Sign a payload, returning the base64-encoded signature.
    pub fn sign(&self, data: &[u8]) -> String {
        let signature = self.signing_key.sign(data);
        base64::engine::general_purpose::STANDARD.encode(signature.to_bytes())
    }

    /// Load a keypair from a 32-byte seed file, refusing world-readable
    /// files on Unix.
    pub fn load(path: &Path) -> Result<Self, KeyError> {
        check_seed_permissions(path)?;
        let bytes = std::fs::read(path)?;
        let seed: [u8; 32] = bytes.try_into().map_err(|_| KeyError::BadSeedLength)?;
        Ok(Self::from_seed(&seed))
    }

    /// Persist the 32-byte seed with owner-only permissions.
    pub fn save(&self, path: &Path) -> Result<(), KeyError> {
        std::fs::write(path, self.signing_key.to_bytes())?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for WalletKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletKeys")
            .field("public_key", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}

/// Derive a wallet id from a hex-encoded public key: the first 16 hex
/// chars of SHA-256 over the key's textual encoding.
pub fn wallet_id_for(public_key_hex: &str) -> WalletId {
    let mut hasher = Sha256::new();
    hasher.update(public_key_hex.as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..WALLET_ID_LEN].to_string()
}

/// Verify a base64 signature over `data` against a hex public key.
///
/// `Ok(false)` means the inputs were well-formed but the signature does not
/// match; `Err` means an input could not even be decoded, which the
/// validation pipeline reports as a verification error rather than a bad
/// signature.
pub fn verify_signature(
    data: &[u8],
    signature_b64: &str,
    public_key_hex: &str,
) -> Result<bool, KeyError> {
    let pk_bytes =
        hex::decode(public_key_hex).map_err(|e| KeyError::MalformedKey(e.to_string()))?;
    let pk_array: [u8; 32] = pk_bytes
        .try_into()
        .map_err(|_| KeyError::MalformedKey("expected 32 bytes".into()))?;
    let verifying_key = VerifyingKey::from_bytes(&pk_array)
        .map_err(|e| KeyError::MalformedKey(e.to_string()))?;

    let sig_bytes = base64::engine::general_purpose::STANDARD
        .decode(signature_b64)
        .map_err(|e| KeyError::MalformedSignature(e.to_string()))?;
    let sig_array: [u8; 64] = sig_bytes
        .try_into()
        .map_err(|_| KeyError::MalformedSignature("expected 64 bytes".into()))?;
    let signature = Signature::from_bytes(&sig_array);

    Ok(verifying_key.verify(data, &signature).is_ok())
}

fn check_seed_permissions(path: &Path) -> Result<(), KeyError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let metadata = std::fs::metadata(path)?;
        let mode = metadata.permissions().mode() & 0o777;
        if mode & 0o077 != 0 {
            return Err(KeyError::InsecureKeyFile {
                path: path.display().to_string(),
                mode,
            });
        }
    }
    let _ = path;
    Ok(())
}
