//! # Invoice Signing
//!
//! ECDSA P-256 signatures over the invoice hash.
//!
//! ## Convention
//! ```text
//! current_invoice_hash (hex, 64 chars)
//!          │ hex-decode
//!          ▼
//!     32 raw bytes ──► ECDSA-SHA256 (RFC 6979) ──► DER ──► base64
//! ```
//! This is the only signing convention in the codebase. Verification decodes
//! the hash the same way, so a signature produced by any [`KeyProvider`]
//! verifies with [`verify_signature`] and the provider's public key.
//!
//! Signing is deterministic: the same key and hash always produce the same
//! signature bytes.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use p256::{PublicKey, SecretKey};
use rand::rngs::OsRng;

use crate::error::SigningError;

/// Source of the signing key.
///
/// The service only ever signs through this trait, so key storage (files,
/// memory, an HSM) stays outside the pipeline.
pub trait KeyProvider: Send + Sync {
    /// Signs the raw digest behind `invoice_hash_hex`, returning base64 DER.
    fn sign(&self, invoice_hash_hex: &str) -> Result<String, SigningError>;

    /// The SPKI PEM of the matching public key.
    fn public_key_pem(&self) -> Result<String, SigningError>;
}

/// Decodes a hex SHA-256 digest into its 32 bytes.
pub fn decode_hash(invoice_hash_hex: &str) -> Result<[u8; 32], SigningError> {
    let bytes = hex::decode(invoice_hash_hex)
        .map_err(|e| SigningError::InvalidHash(format!("not hex: {e}")))?;

    bytes
        .try_into()
        .map_err(|b: Vec<u8>| SigningError::InvalidHash(format!("expected 32 bytes, got {}", b.len())))
}

// =============================================================================
// In-memory key pair
// =============================================================================

/// A P-256 key pair held in memory.
///
/// Used directly in tests, and by the file-backed provider after it has read
/// the PEM files.
#[derive(Clone)]
pub struct EcdsaKeyPair {
    secret: SecretKey,
}

impl std::fmt::Debug for EcdsaKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EcdsaKeyPair").finish_non_exhaustive()
    }
}

impl EcdsaKeyPair {
    /// Generates a fresh key pair from the OS random source.
    pub fn generate() -> Self {
        EcdsaKeyPair {
            secret: SecretKey::random(&mut OsRng),
        }
    }

    /// Parses a PKCS#8 private key PEM.
    pub fn from_pkcs8_pem(pem: &str) -> Result<Self, SigningError> {
        let secret = SecretKey::from_pkcs8_pem(pem)
            .map_err(|e| SigningError::InvalidKey(format!("private key: {e}")))?;
        Ok(EcdsaKeyPair { secret })
    }

    /// PKCS#8 PEM of the private key.
    pub fn private_key_pem(&self) -> Result<String, SigningError> {
        self.secret
            .to_pkcs8_pem(LineEnding::LF)
            .map(|pem| pem.to_string())
            .map_err(|e| SigningError::InvalidKey(format!("private key encoding: {e}")))
    }

    /// SPKI PEM of the public key.
    pub fn spki_pem(&self) -> Result<String, SigningError> {
        self.secret
            .public_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| SigningError::InvalidKey(format!("public key encoding: {e}")))
    }
}

impl KeyProvider for EcdsaKeyPair {
    fn sign(&self, invoice_hash_hex: &str) -> Result<String, SigningError> {
        let digest = decode_hash(invoice_hash_hex)?;
        let signing_key = SigningKey::from(&self.secret);
        let signature: Signature = signing_key.sign(&digest);
        Ok(STANDARD.encode(signature.to_der().as_bytes()))
    }

    fn public_key_pem(&self) -> Result<String, SigningError> {
        self.spki_pem()
    }
}

// =============================================================================
// Verification
// =============================================================================

/// Checks a base64 DER signature against the hash and an SPKI public key.
///
/// ## Example
/// ```rust
/// use mizan_core::signing::{verify_signature, EcdsaKeyPair, KeyProvider};
///
/// let keys = EcdsaKeyPair::generate();
/// let hash = "ab".repeat(32);
/// let signature = keys.sign(&hash).unwrap();
///
/// let public = keys.public_key_pem().unwrap();
/// assert!(verify_signature(&public, &hash, &signature).is_ok());
/// ```
pub fn verify_signature(
    public_key_pem: &str,
    invoice_hash_hex: &str,
    signature_b64: &str,
) -> Result<(), SigningError> {
    let public = PublicKey::from_public_key_pem(public_key_pem)
        .map_err(|e| SigningError::InvalidKey(format!("public key: {e}")))?;
    let digest = decode_hash(invoice_hash_hex)?;

    let der = STANDARD
        .decode(signature_b64.trim())
        .map_err(|e| SigningError::MalformedSignature(format!("not base64: {e}")))?;
    let signature = Signature::from_der(&der)
        .map_err(|e| SigningError::MalformedSignature(format!("not DER: {e}")))?;

    VerifyingKey::from(&public)
        .verify(&digest, &signature)
        .map_err(|_| SigningError::VerificationFailed)
}

/// Strips the PEM armour and line breaks, leaving the base64 body.
///
/// This is the form carried in `ds:X509Certificate`.
pub fn pem_body(pem: &str) -> String {
    pem.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("-----"))
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================
