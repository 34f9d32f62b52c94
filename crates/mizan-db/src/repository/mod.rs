//! # Repository Module
//!
//! Database repository implementations for Mizan POS.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern                                   │
//! │                                                                         │
//! │  InvoiceService (mizan-zatca)                                          │
//! │       │                                                                 │
//! │       │  db.invoices().allocate(draft)                                 │
//! │       ▼                                                                 │
//! │  InvoiceRepository                                                     │
//! │  ├── allocate(&self, draft)         one transaction                    │
//! │  ├── record_hash(&self, ...)        write-once guards                  │
//! │  ├── record_signature(&self, ...)                                      │
//! │  └── record_qr_code(&self, ...)                                        │
//! │       │                                                                 │
//! │       │  SQL Query                                                      │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`ProductRepository`](product::ProductRepository) - Product catalogue
//! - [`SaleRepository`](sale::SaleRepository) - Sale lines and cancellation
//! - [`InvoiceRepository`](invoice::InvoiceRepository) - The invoice chain
//! - [`SettingsRepository`](settings::SettingsRepository) - Seller profile

pub mod invoice;
pub mod product;
pub mod sale;
pub mod settings;
