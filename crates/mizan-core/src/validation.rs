//! # Validation Module
//!
//! Input validation utilities for Mizan POS.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: THIS MODULE (pure checks before any side effect)             │
//! │  ├── Field formats (UUID, TRN, prices, quantities)                     │
//! │  └── Invoice requests (non-empty, no duplicate sale ids)               │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Chain builder (mizan_core::chain)                            │
//! │  └── Sale eligibility (ACTIVE, not yet invoiced)                       │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── NOT NULL / CHECK constraints                                      │
//! │  ├── UNIQUE (invoice_number, uuid)                                     │
//! │  └── Foreign keys                                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use mizan_core::validation::{validate_trn, validate_sale_ids};
//!
//! assert!(validate_trn("300000000000003").is_ok());
//! assert!(validate_sale_ids(&[]).is_err());
//! ```

use std::collections::HashSet;

use crate::error::ValidationError;
use crate::types::Settings;
use crate::{MAX_INVOICE_SALES, MAX_ITEM_QUANTITY};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Length of a KSA VAT registration number.
pub const TRN_LENGTH: usize = 15;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a product name.
///
/// ## Rules
/// - Must not be empty
/// - At most 200 characters
pub fn validate_product_name(name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: "name".to_string(),
        });
    }

    if name.chars().count() > 200 {
        return Err(ValidationError::TooLong {
            field: "name".to_string(),
            max: 200,
        });
    }

    Ok(())
}

/// Validates a VAT registration number (TRN).
///
/// ## Rules
/// - Exactly 15 ASCII digits
///
/// ## Example
/// ```rust
/// use mizan_core::validation::validate_trn;
///
/// assert!(validate_trn("310122393500003").is_ok());
/// assert!(validate_trn("").is_err());
/// assert!(validate_trn("31012239350000X").is_err());
/// ```
pub fn validate_trn(trn: &str) -> ValidationResult<()> {
    let trn = trn.trim();

    if trn.is_empty() {
        return Err(ValidationError::Required {
            field: "trn".to_string(),
        });
    }

    if trn.len() != TRN_LENGTH || !trn.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidFormat {
            field: "trn".to_string(),
            reason: format!("must be {} digits", TRN_LENGTH),
        });
    }

    Ok(())
}

fn require(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validates the seller profile. Every field is mandatory.
pub fn validate_settings(settings: &Settings) -> ValidationResult<()> {
    require("shopName", &settings.shop_name)?;
    validate_trn(&settings.trn)?;
    require("address", &settings.address)?;
    require("phone", &settings.phone)?;
    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a sale quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a price in halalas. Zero is allowed (free items).
///
/// ## Example
/// ```rust
/// use mizan_core::validation::validate_price_halalas;
///
/// assert!(validate_price_halalas("price", 1099).is_ok());
/// assert!(validate_price_halalas("price", 0).is_ok());
/// assert!(validate_price_halalas("price", -100).is_err());
/// ```
pub fn validate_price_halalas(field: &str, halalas: i64) -> ValidationResult<()> {
    if halalas < 0 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

/// Validates a product weight in grams.
pub fn validate_weight_grams(grams: i64) -> ValidationResult<()> {
    if grams <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "weight".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Invoice Request Validators
// =============================================================================

/// Validates the sale id list of an invoice request.
///
/// ## Rules
/// - At least one sale
/// - At most MAX_INVOICE_SALES sales
/// - Every id is a UUID
/// - No id appears twice
pub fn validate_sale_ids(ids: &[String]) -> ValidationResult<()> {
    if ids.is_empty() {
        return Err(ValidationError::Required {
            field: "sales".to_string(),
        });
    }

    if ids.len() > MAX_INVOICE_SALES {
        return Err(ValidationError::OutOfRange {
            field: "sales".to_string(),
            min: 1,
            max: MAX_INVOICE_SALES as i64,
        });
    }

    let mut seen = HashSet::with_capacity(ids.len());
    for id in ids {
        validate_uuid(id)?;
        if !seen.insert(id.as_str()) {
            return Err(ValidationError::Duplicate {
                field: "sale".to_string(),
                value: id.clone(),
            });
        }
    }

    Ok(())
}

/// Validates a lower-case hex SHA-256 digest.
pub fn validate_hash_hex(field: &str, hash: &str) -> ValidationResult<()> {
    if hash.len() != 64 || !hash.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')) {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must be 64 lower-case hex characters".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// UUID Validators
// =============================================================================

/// Validates a UUID string format.
///
/// ## Example
/// ```rust
/// use mizan_core::validation::validate_uuid;
///
/// assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(validate_uuid("not-a-uuid").is_err());
/// ```
pub fn validate_uuid(id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "id".to_string(),
        });
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: "id".to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
