//! # Error Types
//!
//! Domain-specific error types for mizan-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  mizan-core errors (this file)                                         │
//! │  ├── CoreError        - Invoice/sale state and chain errors            │
//! │  ├── ValidationError  - Input validation failures                      │
//! │  └── SigningError     - Key material and ECDSA failures                │
//! │                                                                         │
//! │  mizan-core::xml                                                       │
//! │  └── XmlError         - UBL serialization failures                     │
//! │                                                                         │
//! │  mizan-db errors (separate crate)                                      │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  mizan-zatca errors (separate crate)                                   │
//! │  └── ZatcaError       - What callers of the pipeline see               │
//! │                                                                         │
//! │  Flow: ValidationError/SigningError → CoreError → ZatcaError           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Sale is not in a state that allows the requested operation.
    ///
    /// ## When This Occurs
    /// - Aggregating a CANCELLED sale into an invoice
    /// - Cancelling a sale that is already cancelled
    #[error("Sale {sale_id} is {current_status}, cannot perform operation")]
    InvalidSaleStatus {
        sale_id: String,
        current_status: String,
    },

    /// Sale already belongs to an invoice.
    #[error("Sale {sale_id} is already attached to invoice {invoice_id}")]
    SaleAlreadyInvoiced { sale_id: String, invoice_id: String },

    /// A stored invoice is in a state the pipeline can never produce.
    ///
    /// ## When This Occurs
    /// - Signature present without a hash
    /// - Predecessor still has no hash when its successor is created
    /// - Recomputed hash or signature does not match the stored value
    #[error("Invoice chain integrity violated at invoice {invoice_number}: {reason}")]
    ChainIntegrity { invoice_number: i64, reason: String },

    /// Canonical payload could not be serialized.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Signing error (wraps SigningError).
    #[error("Signing error: {0}")]
    Signing(#[from] SigningError),
}

impl CoreError {
    /// Creates a ChainIntegrity error for the given invoice number.
    pub fn chain(invoice_number: i64, reason: impl Into<String>) -> Self {
        CoreError::ChainIntegrity {
            invoice_number,
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur before any side effect takes place.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Encoded value exceeds a byte limit (TLV values are capped at 255 bytes).
    #[error("{field} is {len} bytes once encoded, limit is {max}")]
    EncodedTooLong { field: String, len: usize, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid UUID, invalid TRN).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Duplicate value (e.g., the same sale listed twice).
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },

    /// A referenced entity does not exist.
    #[error("{entity} '{id}' does not exist")]
    Unresolved { entity: String, id: String },

    /// A referenced entity exists but cannot be used.
    #[error("{entity} '{id}' cannot be used: {reason}")]
    Ineligible {
        entity: String,
        id: String,
        reason: String,
    },
}

// =============================================================================
// Signing Error
// =============================================================================

/// Errors from key handling, signing and verification.
#[derive(Debug, Error)]
pub enum SigningError {
    /// Key material is missing or unreadable.
    #[error("Signing key unavailable: {0}")]
    KeyUnavailable(String),

    /// Key material exists but does not parse.
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// The invoice hash is not a 32-byte hex digest.
    #[error("Invalid invoice hash: {0}")]
    InvalidHash(String),

    /// The signature is not base64 DER.
    #[error("Malformed signature: {0}")]
    MalformedSignature(String),

    /// The signature does not verify against the hash and public key.
    #[error("Signature verification failed")]
    VerificationFailed,
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
