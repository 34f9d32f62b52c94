//! # mizan-zatca: ZATCA Phase-2 Invoice Pipeline for Mizan POS
//!
//! Turns recorded sales into numbered, hash-chained, signed invoices with a
//! QR payload, and renders them as UBL 2.1 XML.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Invoice Pipeline                                 │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                 InvoiceService (orchestrator)                    │  │
//! │  │                                                                  │  │
//! │  │  create_invoice • finalize_invoice_phase2 • get_invoice_xml      │  │
//! │  │  get_invoice • list_invoices • verify_chain                      │  │
//! │  └───────┬─────────────────────────┬───────────────────────┬────────┘  │
//! │          ▼                         ▼                       ▼           │
//! │  ┌────────────────┐  ┌──────────────────────────┐  ┌───────────────┐  │
//! │  │  ZatcaConfig   │  │  KeyStore                │  │  mizan-db     │  │
//! │  │                │  │                          │  │               │  │
//! │  │ TOML + MIZAN_* │  │ ecc_private.pem (PKCS#8) │  │ sequence,     │  │
//! │  │ env overrides  │  │ ecc_public.pem  (SPKI)   │  │ invoices,     │  │
//! │  │                │  │ FileKeyProvider          │  │ sales         │  │
//! │  └────────────────┘  └──────────────────────────┘  └───────────────┘  │
//! │                                                                         │
//! │  Hashing, signing, TLV and XML are pure functions in mizan-core.       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`config`] - Service configuration (key directory, database, currency)
//! - [`error`] - Service error types
//! - [`keystore`] - Key pair provisioning and the file-backed key provider
//! - [`service`] - The `InvoiceService` pipeline and read side
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mizan_zatca::{InvoiceService, ZatcaConfig};
//!
//! let config = ZatcaConfig::load(None)?;
//! let service = InvoiceService::new(&config).await?;
//!
//! let invoice = service.create_invoice(&sale_ids, Some("Walk-in")).await?;
//! let xml = service.finalize_invoice_phase2(&invoice.id).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod keystore;
pub mod service;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::ZatcaConfig;
pub use error::{ZatcaError, ZatcaResult};
pub use keystore::{FileKeyProvider, KeyPaths, KeyStore, KeyStoreError};
pub use service::InvoiceService;
