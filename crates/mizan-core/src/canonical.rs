//! # Canonical Invoice Hash
//!
//! Every invoice in the chain is identified by the SHA-256 of a canonical
//! JSON payload built from its stored fields. The same function produces the
//! hash at finalization and recomputes it during verification.
//!
//! ## Payload
//! ```text
//! {"uuid":"…","invoiceNumber":1000,"sales":["…","…"],
//!  "totalNetAmount":"100.00","totalVatAmount":"15.00","totalAmount":"115.00",
//!  "totalProfit":"30.00","customerName":null,"createdAt":"2024-01-01T10:00:00.000Z"}
//! ```
//! Compact (no whitespace), keys in exactly this order. Amounts are strings
//! with two decimals, `createdAt` is UTC with millisecond precision.
//!
//! `previous_invoice_hash` is not part of the payload. Links are checked by
//! comparing stored hashes of adjacent invoices.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{CoreError, CoreResult};
use crate::types::Invoice;

/// The hashed view of an invoice.
///
/// Field order is the wire contract; do not reorder.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalInvoice<'a> {
    pub uuid: &'a str,
    pub invoice_number: i64,
    pub sales: &'a [String],
    pub total_net_amount: String,
    pub total_vat_amount: String,
    pub total_amount: String,
    pub total_profit: String,
    pub customer_name: Option<&'a str>,
    pub created_at: String,
}

impl<'a> CanonicalInvoice<'a> {
    /// Borrows the hashed fields of a stored invoice under the given UUID.
    pub fn from_invoice(invoice: &'a Invoice, uuid: &'a str) -> Self {
        CanonicalInvoice {
            uuid,
            invoice_number: invoice.invoice_number,
            sales: &invoice.sale_ids,
            total_net_amount: invoice.total_net_amount().to_string(),
            total_vat_amount: invoice.total_vat_amount().to_string(),
            total_amount: invoice.total_amount().to_string(),
            total_profit: invoice.total_profit().to_string(),
            customer_name: invoice.customer_name.as_deref(),
            created_at: canonical_timestamp(&invoice.created_at),
        }
    }

    /// The exact bytes fed to SHA-256.
    pub fn to_json(&self) -> CoreResult<String> {
        serde_json::to_string(self).map_err(|e| CoreError::Serialization(e.to_string()))
    }
}

/// Formats a timestamp as `2024-01-01T10:00:00.000Z`.
pub fn canonical_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Computes the lower-case hex SHA-256 of the canonical payload.
pub fn compute_invoice_hash(canonical: &CanonicalInvoice<'_>) -> CoreResult<String> {
    let payload = canonical.to_json()?;
    let digest = Sha256::digest(payload.as_bytes());
    Ok(hex::encode(digest))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const UUID: &str = "8d4f2f38-3b0c-4a43-9c59-2d5f8b8e7a11";

    fn invoice() -> Invoice {
        Invoice {
            id: "inv-1".to_string(),
            invoice_number: 1000,
            sale_ids: vec!["s-1".to_string(), "s-2".to_string()],
            total_net_amount_halalas: 10000,
            total_vat_amount_halalas: 1500,
            total_amount_halalas: 11500,
            total_profit_halalas: 3000,
            customer_name: None,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap(),
            uuid: None,
            previous_invoice_hash: None,
            current_invoice_hash: None,
            signature: None,
            public_key: None,
            qr_code: None,
        }
    }

    #[test]
    fn test_payload_layout() {
        let invoice = invoice();
        let json = CanonicalInvoice::from_invoice(&invoice, UUID).to_json().unwrap();

        assert_eq!(
            json,
            format!(
                "{{\"uuid\":\"{UUID}\",\"invoiceNumber\":1000,\"sales\":[\"s-1\",\"s-2\"],\
                 \"totalNetAmount\":\"100.00\",\"totalVatAmount\":\"15.00\",\
                 \"totalAmount\":\"115.00\",\"totalProfit\":\"30.00\",\
                 \"customerName\":null,\"createdAt\":\"2024-01-01T10:00:00.000Z\"}}"
            )
        );
    }

    #[test]
    fn test_hash_is_deterministic_hex() {
        let invoice = invoice();
        let a = compute_invoice_hash(&CanonicalInvoice::from_invoice(&invoice, UUID)).unwrap();
        let b = compute_invoice_hash(&CanonicalInvoice::from_invoice(&invoice, UUID)).unwrap();

        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));
    }

    #[test]
    fn test_hash_covers_every_field() {
        let base = invoice();
        let original = compute_invoice_hash(&CanonicalInvoice::from_invoice(&base, UUID)).unwrap();

        let mut renamed = base.clone();
        renamed.customer_name = Some("Acme".to_string());
        let mut reordered = base.clone();
        reordered.sale_ids.reverse();
        let mut repriced = base.clone();
        repriced.total_amount_halalas += 1;

        for changed in [renamed, reordered, repriced] {
            let hash = compute_invoice_hash(&CanonicalInvoice::from_invoice(&changed, UUID)).unwrap();
            assert_ne!(hash, original);
        }

        let other_uuid = "00000000-0000-4000-8000-000000000000";
        let hash = compute_invoice_hash(&CanonicalInvoice::from_invoice(&base, other_uuid)).unwrap();
        assert_ne!(hash, original);
    }

    #[test]
    fn test_hash_ignores_phase2_fields() {
        let base = invoice();
        let mut finalized = base.clone();
        finalized.previous_invoice_hash = Some("a".repeat(64));
        finalized.signature = Some("sig".to_string());
        finalized.qr_code = Some("qr".to_string());

        assert_eq!(
            compute_invoice_hash(&CanonicalInvoice::from_invoice(&base, UUID)).unwrap(),
            compute_invoice_hash(&CanonicalInvoice::from_invoice(&finalized, UUID)).unwrap()
        );
    }

    #[test]
    fn test_canonical_timestamp_millis() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap()
            + chrono::Duration::milliseconds(7);
        assert_eq!(canonical_timestamp(&at), "2024-01-01T10:00:00.007Z");
    }
}
