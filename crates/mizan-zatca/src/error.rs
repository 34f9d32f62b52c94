//! # Invoice Service Error Types
//!
//! ## Error Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    ZatcaError Categories                                │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Caller input   │  │   Chain state   │  │     Environment         │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Validation     │  │  ChainIntegrity │  │  KeyStore, Config, Io   │ │
//! │  │  NotFound       │  │  Signing, Xml   │  │  Database               │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Mapping
//! - unresolved, cancelled or already invoiced sale ids → `Validation`
//! - missing invoice or seller settings → `NotFound`
//! - key files missing, unreadable or corrupt → `KeyStore`
//! - stored row in an impossible state, or an unhashed predecessor that
//!   could not be resumed → `ChainIntegrity`

use mizan_core::xml::XmlError;
use mizan_core::{CoreError, SigningError, ValidationError};
use mizan_db::DbError;
use thiserror::Error;

use crate::keystore::KeyStoreError;

/// Result type alias for invoice service operations.
pub type ZatcaResult<T> = Result<T, ZatcaError>;

/// Invoice service error type.
#[derive(Debug, Error)]
pub enum ZatcaError {
    /// Caller input rejected before any side effect.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Invoice, sale or settings row missing.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Key material missing, unreadable or corrupt.
    #[error("Key store error: {0}")]
    KeyStore(#[from] KeyStoreError),

    /// The stored chain is not in a state the pipeline can produce.
    #[error("Invoice chain integrity violated at invoice {invoice_number}: {reason}")]
    ChainIntegrity { invoice_number: i64, reason: String },

    /// Signing failed for a reason other than key availability.
    #[error("Signing error: {0}")]
    Signing(SigningError),

    /// UBL rendering failed.
    #[error("XML error: {0}")]
    Xml(#[from] XmlError),

    /// Storage failure.
    #[error("Database error: {0}")]
    Database(DbError),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ZatcaError {
    /// Creates a NotFound error.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        ZatcaError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Returns true if the caller can fix the request and retry.
    pub fn is_client_error(&self) -> bool {
        matches!(self, ZatcaError::Validation(_) | ZatcaError::NotFound { .. })
    }
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<SigningError> for ZatcaError {
    fn from(err: SigningError) -> Self {
        match err {
            SigningError::KeyUnavailable(reason) => {
                ZatcaError::KeyStore(KeyStoreError::Unavailable(reason))
            }
            other => ZatcaError::Signing(other),
        }
    }
}

impl From<CoreError> for ZatcaError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(e) => ZatcaError::Validation(e),
            CoreError::Signing(e) => e.into(),
            CoreError::ChainIntegrity {
                invoice_number,
                reason,
            } => ZatcaError::ChainIntegrity {
                invoice_number,
                reason,
            },
            CoreError::InvalidSaleStatus {
                sale_id,
                current_status,
            } => ZatcaError::Validation(ValidationError::Ineligible {
                entity: "Sale".to_string(),
                id: sale_id,
                reason: format!("sale is {current_status}"),
            }),
            CoreError::SaleAlreadyInvoiced {
                sale_id,
                invoice_id,
            } => ZatcaError::Validation(ValidationError::Ineligible {
                entity: "Sale".to_string(),
                id: sale_id,
                reason: format!("already attached to invoice {invoice_id}"),
            }),
            CoreError::Serialization(e) => ZatcaError::Internal(e),
        }
    }
}

impl From<DbError> for ZatcaError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => ZatcaError::NotFound { entity, id },
            DbError::Domain(e) => e.into(),
            other => ZatcaError::Database(other),
        }
    }
}

impl From<toml::de::Error> for ZatcaError {
    fn from(err: toml::de::Error) -> Self {
        ZatcaError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for ZatcaError {
    fn from(err: toml::ser::Error) -> Self {
        ZatcaError::Config(err.to_string())
    }
}
