//! # mizan-core: Invoice Integrity Logic for Mizan POS
//!
//! Pure business logic for ZATCA Phase-2 invoicing: money arithmetic, the
//! canonical invoice hash, ECDSA signing, the TLV QR payload and the UBL 2.1
//! XML document. No database, no file system.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Mizan POS Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                mizan-zatca (pipeline service)                   │   │
//! │  │   create_invoice ──► finalize_phase2 ──► get_invoice_xml       │   │
//! │  │   KeyStore (PEM files) • ZatcaConfig • mizan-invoice binary    │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ mizan-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   money   │  │ canonical │  │  signing  │  │   │
//! │  │   │  Sale     │  │   Money   │  │  SHA-256  │  │ ECDSA P256│  │   │
//! │  │   │  Invoice  │  │  VAT split│  │  payload  │  │ KeyProvider│ │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐                  │   │
//! │  │   │    tlv    │  │    xml    │  │   chain   │                  │   │
//! │  │   │ QR base64 │  │  UBL 2.1  │  │  stages   │                  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘                  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • DETERMINISTIC OUTPUT                   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    mizan-db (Database Layer)                    │   │
//! │  │        SQLite: settings, products, sales, invoices, sequence    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Product, Sale, Invoice, Settings)
//! - [`money`] - Money in halalas, VAT-inclusive splitting
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//! - [`canonical`] - Canonical invoice payload and its SHA-256 hash
//! - [`signing`] - ECDSA P-256 signing behind the [`signing::KeyProvider`] trait
//! - [`tlv`] - ZATCA QR Tag-Length-Value payload
//! - [`xml`] - UBL 2.1 invoice document
//! - [`chain`] - Typed invoice stages: draft, persisted, hashed, signed, finalized
//!
//! ## Design Principles
//!
//! 1. **Integer Money**: amounts are halalas (i64), never floats
//! 2. **Deterministic**: same invoice in, same hash, XML and QR out
//! 3. **Explicit Errors**: every failure is a typed error
//!
//! ## Example Usage
//!
//! ```rust
//! use mizan_core::money::Money;
//! use mizan_core::types::TaxRate;
//!
//! // A 115.00 SAR shelf price includes 15% VAT
//! let total = Money::from_halalas(11500);
//! let (net, vat) = total.split_inclusive(TaxRate::standard());
//!
//! assert_eq!(net.to_string(), "100.00");
//! assert_eq!(vat.to_string(), "15.00");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod canonical;
pub mod chain;
pub mod error;
pub mod money;
pub mod signing;
pub mod tlv;
pub mod types;
pub mod validation;
pub mod xml;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, SigningError, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Number given to the first invoice of a fresh store.
pub const FIRST_INVOICE_NUMBER: i64 = 1000;

/// KSA standard VAT rate in basis points (15%).
pub const STANDARD_VAT_RATE_BPS: u32 = 1500;

/// Document currency when none is configured.
pub const DEFAULT_CURRENCY: &str = "SAR";

/// Maximum quantity of a single item in one sale.
pub const MAX_ITEM_QUANTITY: i64 = 9999;

/// Maximum number of sales aggregated into one invoice.
pub const MAX_INVOICE_SALES: usize = 500;
