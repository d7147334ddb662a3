//! Crypto helpers: Ed25519 keypair generation, sign, verify, and content
//! hashing. Compatible with ed25519-dalek v2 + rand_core feature enabled.
//!
//! Combined key format (64 bytes):
//!   [0..32]  = private key bytes
//!   [32..64] = public key bytes

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use sha3::{Digest, Sha3_256};
use thiserror::Error;

use crate::types::RECORD_HASH_SIZE;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key length: expected {expected}, found {found}")]
    InvalidKeyLength { expected: usize, found: usize },

    #[error("invalid signature length: expected 64, found {0}")]
    InvalidSignatureLength(usize),

    #[error("signing failed")]
    SignFailed,
}

impl From<CryptoError> for crate::error::CoreError {
    fn from(e: CryptoError) -> Self {
        crate::error::CoreError::Other(e.to_string())
    }
}

/// SHA3-256 content hash used for record and blob addressing.
pub fn hash_bytes(data: &[u8]) -> [u8; RECORD_HASH_SIZE] {
    let mut hasher = Sha3_256::new();
    hasher.update(data);
    let digest = hasher.finalize();
    let mut out = [0u8; RECORD_HASH_SIZE];
    out.copy_from_slice(&digest);
    out
}

/// Generate a new Ed25519 keypair, returned as concatenated 64-byte
/// (private + public).
pub fn generate_keypair_bytes() -> Vec<u8> {
    let mut rng = OsRng;
    let sk = SigningKey::generate(&mut rng);
    let vk = sk.verifying_key();

    let mut combined = Vec::with_capacity(64);
    combined.extend_from_slice(&sk.to_bytes());
    combined.extend_from_slice(&vk.to_bytes());
    combined
}

/// Extract the public half of a combined keypair.
pub fn public_key_bytes(kp_bytes: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if kp_bytes.len() != 64 {
        return Err(CryptoError::InvalidKeyLength {
            expected: 64,
            found: kp_bytes.len(),
        });
    }
    Ok(kp_bytes[32..64].to_vec())
}

fn signing_key_from_bytes(bytes: &[u8]) -> Result<SigningKey, CryptoError> {
    if bytes.len() != 64 {
        return Err(CryptoError::InvalidKeyLength {
            expected: 64,
            found: bytes.len(),
        });
    }
    let mut sk_bytes = [0u8; 32];
    sk_bytes.copy_from_slice(&bytes[0..32]);
    Ok(SigningKey::from_bytes(&sk_bytes))
}

/// Opaque sign/verify service. Consensus, bus and token code never touch key
/// material directly.
pub trait CryptographyService: Send + Sync {
    /// Sign with this node's private key; returns a 64-byte signature.
    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError>;
    /// Verify a signature against an arbitrary 32-byte public key.
    fn verify(&self, public_key: &[u8], signature: &[u8], data: &[u8]) -> bool;
    /// This node's public key bytes.
    fn public_key(&self) -> Vec<u8>;
}

/// Ed25519-backed implementation holding the node keypair.
pub struct NodeCryptography {
    keypair: Vec<u8>,
}

impl NodeCryptography {
    pub fn new(keypair_bytes: Vec<u8>) -> Result<Self, CryptoError> {
        // Validate eagerly so later sign calls cannot fail on key shape.
        signing_key_from_bytes(&keypair_bytes)?;
        Ok(NodeCryptography {
            keypair: keypair_bytes,
        })
    }

    pub fn generate() -> Self {
        NodeCryptography {
            keypair: generate_keypair_bytes(),
        }
    }
}

impl CryptographyService for NodeCryptography {
    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let sk = signing_key_from_bytes(&self.keypair)?;
        Ok(sk.sign(data).to_bytes().to_vec())
    }

    fn verify(&self, public_key: &[u8], signature: &[u8], data: &[u8]) -> bool {
        if public_key.len() != 32 || signature.len() != 64 {
            return false;
        }
        let mut pk = [0u8; 32];
        pk.copy_from_slice(public_key);
        let vk = match VerifyingKey::from_bytes(&pk) {
            Ok(vk) => vk,
            Err(_) => return false,
        };
        let mut sig = [0u8; 64];
        sig.copy_from_slice(signature);
        vk.verify(data, &Signature::from_bytes(&sig)).is_ok()
    }

    fn public_key(&self) -> Vec<u8> {
        public_key_bytes(&self.keypair).unwrap_or_default()
    }
}
