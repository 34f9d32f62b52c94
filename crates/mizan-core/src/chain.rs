//! # Invoice Chain Stages
//!
//! Typed stages of an invoice on its way into the hash chain. Each transition
//! consumes the previous stage, so a signed invoice cannot exist without a
//! hash and a QR code cannot be built for an unsigned one.
//!
//! ## Pipeline
//! ```text
//! ┌──────────────┐ allocate ┌──────────────────┐  hash   ┌───────────────┐
//! │ DraftInvoice │ ───────► │ PersistedInvoice │ ──────► │ HashedInvoice │
//! │ (no I/O)     │  (db tx) │ number, prev hash│  uuid   │ current hash  │
//! └──────────────┘          └──────────────────┘         └───────┬───────┘
//!                                                                │ sign
//!                           ┌──────────────────┐ finalize ┌──────▼────────┐
//!                           │ FinalizedInvoice │ ◄─────── │ SignedInvoice │
//!                           │ QR (TLV base64)  │ settings │ sig + pubkey  │
//!                           └──────────────────┘          └───────────────┘
//! ```
//!
//! Persistence is not done here. The service writes each stage's new
//! fields and reloads the row; [`Invoice::stage`] turns any stored row back
//! into its stage so an interrupted invoice can be resumed.

use std::collections::HashMap;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::canonical::{compute_invoice_hash, CanonicalInvoice};
use crate::error::{CoreError, CoreResult, SigningError, ValidationError};
use crate::money::Money;
use crate::signing::{pem_body, verify_signature, KeyProvider};
use crate::tlv::{decode_tlv, encode_tlv, qr_timestamp};
use crate::types::{Invoice, Sale, SaleStatus, Settings};
use crate::validation::{validate_hash_hex, validate_sale_ids, validate_uuid};
use crate::FIRST_INVOICE_NUMBER;

// =============================================================================
// Totals
// =============================================================================

/// Invoice totals, the exact sums of the sale fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InvoiceTotals {
    pub net: Money,
    pub vat: Money,
    pub total: Money,
    pub profit: Money,
}

impl InvoiceTotals {
    pub fn from_sales<'a>(sales: impl IntoIterator<Item = &'a Sale>) -> Self {
        sales
            .into_iter()
            .fold(InvoiceTotals::default(), |mut totals, sale| {
                totals.net += sale.net_amount();
                totals.vat += sale.vat_amount();
                totals.total += sale.total_with_vat();
                totals.profit += sale.profit();
                totals
            })
    }
}

// =============================================================================
// Draft
// =============================================================================

/// A validated invoice request. Nothing has been written yet.
#[derive(Debug, Clone)]
pub struct DraftInvoice {
    sale_ids: Vec<String>,
    totals: InvoiceTotals,
    customer_name: Option<String>,
    created_at: DateTime<Utc>,
}

impl DraftInvoice {
    /// Checks every requested sale against the resolved rows and sums them.
    ///
    /// `resolved` may be in any order and may be missing ids; the draft keeps
    /// the order of `requested`.
    ///
    /// ## Errors
    /// - empty, oversized or duplicated id list
    /// - an id with no matching sale (`Unresolved`)
    /// - a cancelled or already invoiced sale (`Ineligible`)
    pub fn build(
        requested: &[String],
        resolved: &[Sale],
        customer_name: Option<&str>,
        now: DateTime<Utc>,
    ) -> CoreResult<Self> {
        validate_sale_ids(requested)?;

        let by_id: HashMap<&str, &Sale> = resolved.iter().map(|s| (s.id.as_str(), s)).collect();
        let mut ordered = Vec::with_capacity(requested.len());

        for id in requested {
            let sale = by_id.get(id.as_str()).ok_or_else(|| ValidationError::Unresolved {
                entity: "Sale".to_string(),
                id: id.clone(),
            })?;

            if sale.status == SaleStatus::Cancelled {
                return Err(ValidationError::Ineligible {
                    entity: "Sale".to_string(),
                    id: id.clone(),
                    reason: "sale is cancelled".to_string(),
                }
                .into());
            }
            if let Some(invoice_id) = &sale.invoice_id {
                return Err(ValidationError::Ineligible {
                    entity: "Sale".to_string(),
                    id: id.clone(),
                    reason: format!("already attached to invoice {invoice_id}"),
                }
                .into());
            }

            ordered.push(*sale);
        }

        Ok(DraftInvoice {
            sale_ids: requested.to_vec(),
            totals: InvoiceTotals::from_sales(ordered),
            customer_name: customer_name
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string),
            created_at: now.trunc_subsecs(3),
        })
    }

    pub fn sale_ids(&self) -> &[String] {
        &self.sale_ids
    }

    pub fn totals(&self) -> InvoiceTotals {
        self.totals
    }

    pub fn customer_name(&self) -> Option<&str> {
        self.customer_name.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// The stored row for this draft once a number and predecessor hash are known.
    pub fn into_invoice(
        self,
        id: String,
        invoice_number: i64,
        previous_invoice_hash: Option<String>,
    ) -> Invoice {
        Invoice {
            id,
            invoice_number,
            sale_ids: self.sale_ids,
            total_net_amount_halalas: self.totals.net.halalas(),
            total_vat_amount_halalas: self.totals.vat.halalas(),
            total_amount_halalas: self.totals.total.halalas(),
            total_profit_halalas: self.totals.profit.halalas(),
            customer_name: self.customer_name,
            created_at: self.created_at,
            uuid: None,
            previous_invoice_hash,
            current_invoice_hash: None,
            signature: None,
            public_key: None,
            qr_code: None,
        }
    }
}

// =============================================================================
// Stored stages
// =============================================================================

/// Numbered and linked to its predecessor, not yet hashed.
#[derive(Debug, Clone)]
pub struct PersistedInvoice(Invoice);

/// Has a UUID and its canonical hash.
#[derive(Debug, Clone)]
pub struct HashedInvoice(Invoice);

/// Has a signature over its hash and the signer's public key.
#[derive(Debug, Clone)]
pub struct SignedInvoice(Invoice);

/// Has every Phase-2 field.
#[derive(Debug, Clone)]
pub struct FinalizedInvoice(Invoice);

/// The stage of a stored invoice row.
#[derive(Debug, Clone)]
pub enum InvoiceStage {
    Persisted(PersistedInvoice),
    Hashed(HashedInvoice),
    Signed(SignedInvoice),
    Finalized(FinalizedInvoice),
}

impl InvoiceStage {
    pub fn invoice(&self) -> &Invoice {
        match self {
            InvoiceStage::Persisted(s) => &s.0,
            InvoiceStage::Hashed(s) => &s.0,
            InvoiceStage::Signed(s) => &s.0,
            InvoiceStage::Finalized(s) => &s.0,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            InvoiceStage::Persisted(_) => "persisted",
            InvoiceStage::Hashed(_) => "hashed",
            InvoiceStage::Signed(_) => "signed",
            InvoiceStage::Finalized(_) => "finalized",
        }
    }
}

impl Invoice {
    /// Reconstructs the stage of a stored row.
    ///
    /// Fields are written in a fixed order (uuid with hash, signature with
    /// public key, then QR), so any other combination means the row was
    /// modified outside the pipeline.
    pub fn stage(self) -> CoreResult<InvoiceStage> {
        let n = self.invoice_number;
        let broken = |reason: &str| Err(CoreError::chain(n, reason));

        match (&self.uuid, &self.current_invoice_hash) {
            (None, Some(_)) => return broken("hash present without uuid"),
            (Some(_), None) => return broken("uuid present without hash"),
            (Some(uuid), Some(hash)) => {
                validate_uuid(uuid)?;
                validate_hash_hex("currentInvoiceHash", hash)?;
            }
            (None, None) => {}
        }
        if let Some(previous) = &self.previous_invoice_hash {
            validate_hash_hex("previousInvoiceHash", previous)?;
        }
        if self.signature.is_some() && self.current_invoice_hash.is_none() {
            return broken("signature present without hash");
        }
        if self.signature.is_some() != self.public_key.is_some() {
            return broken("signature and public key must be stored together");
        }
        if self.qr_code.is_some() && self.signature.is_none() {
            return broken("QR code present without signature");
        }

        Ok(if self.qr_code.is_some() {
            InvoiceStage::Finalized(FinalizedInvoice(self))
        } else if self.signature.is_some() {
            InvoiceStage::Signed(SignedInvoice(self))
        } else if self.current_invoice_hash.is_some() {
            InvoiceStage::Hashed(HashedInvoice(self))
        } else {
            InvoiceStage::Persisted(PersistedInvoice(self))
        })
    }
}

/// Fields set in [`Invoice::stage`] are `Some` in every stage past their own.
fn field<'a>(invoice: &'a Invoice, value: &'a Option<String>) -> &'a str {
    debug_assert!(value.is_some(), "invoice {} stage invariant", invoice.invoice_number);
    value.as_deref().unwrap_or_default()
}

impl PersistedInvoice {
    pub fn invoice(&self) -> &Invoice {
        &self.0
    }

    /// Assigns the UUID and computes the canonical hash.
    pub fn hash(self, uuid: String) -> CoreResult<HashedInvoice> {
        validate_uuid(&uuid)?;
        let hash = compute_invoice_hash(&CanonicalInvoice::from_invoice(&self.0, &uuid))?;

        let mut invoice = self.0;
        invoice.uuid = Some(uuid);
        invoice.current_invoice_hash = Some(hash);
        Ok(HashedInvoice(invoice))
    }
}

impl HashedInvoice {
    pub fn invoice(&self) -> &Invoice {
        &self.0
    }

    pub fn uuid(&self) -> &str {
        field(&self.0, &self.0.uuid)
    }

    pub fn current_hash(&self) -> &str {
        field(&self.0, &self.0.current_invoice_hash)
    }

    /// Recomputes the hash from the stored fields and compares.
    pub fn verify_hash(&self) -> CoreResult<()> {
        verify_hash(&self.0)
    }

    /// Signs the hash through the key provider.
    pub fn sign(self, provider: &dyn KeyProvider) -> CoreResult<SignedInvoice> {
        let signature = provider.sign(self.current_hash())?;
        let public_key = provider.public_key_pem()?;

        let mut invoice = self.0;
        invoice.signature = Some(signature);
        invoice.public_key = Some(public_key);
        Ok(SignedInvoice(invoice))
    }
}

impl SignedInvoice {
    pub fn invoice(&self) -> &Invoice {
        &self.0
    }

    pub fn signature(&self) -> &str {
        field(&self.0, &self.0.signature)
    }

    pub fn public_key(&self) -> &str {
        field(&self.0, &self.0.public_key)
    }

    /// Recomputes the hash from the stored fields and compares.
    pub fn verify_hash(&self) -> CoreResult<()> {
        verify_hash(&self.0)
    }

    /// Verifies the stored signature against the stored hash and public key.
    pub fn verify_signature(&self) -> CoreResult<()> {
        check_signature(&self.0, self.public_key())
    }

    /// Builds the TLV QR payload from the seller profile and the totals.
    pub fn finalize(self, settings: &Settings) -> CoreResult<FinalizedInvoice> {
        let qr = encode_tlv(
            &settings.shop_name,
            &settings.trn,
            &qr_timestamp(&self.0.created_at),
            self.0.total_amount(),
            self.0.total_vat_amount(),
        )?;

        let mut invoice = self.0;
        invoice.qr_code = Some(qr);
        Ok(FinalizedInvoice(invoice))
    }
}

/// The Phase-2 values embedded in the UBL extensions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Phase2Artifacts {
    pub uuid: String,
    pub previous_invoice_hash: Option<String>,
    pub current_invoice_hash: String,
    pub signature: String,
    pub public_key: String,
    pub qr_code: String,
}

impl FinalizedInvoice {
    pub fn invoice(&self) -> &Invoice {
        &self.0
    }

    pub fn into_invoice(self) -> Invoice {
        self.0
    }

    pub fn artifacts(&self) -> Phase2Artifacts {
        let invoice = &self.0;
        Phase2Artifacts {
            uuid: field(invoice, &invoice.uuid).to_string(),
            previous_invoice_hash: invoice.previous_invoice_hash.clone(),
            current_invoice_hash: field(invoice, &invoice.current_invoice_hash).to_string(),
            signature: field(invoice, &invoice.signature).to_string(),
            public_key: field(invoice, &invoice.public_key).to_string(),
            qr_code: field(invoice, &invoice.qr_code).to_string(),
        }
    }
}

fn verify_hash(invoice: &Invoice) -> CoreResult<()> {
    let uuid = field(invoice, &invoice.uuid);
    let stored = field(invoice, &invoice.current_invoice_hash);
    let recomputed = compute_invoice_hash(&CanonicalInvoice::from_invoice(invoice, uuid))?;

    if recomputed != stored {
        return Err(CoreError::chain(
            invoice.invoice_number,
            "stored hash does not match the invoice fields",
        ));
    }
    Ok(())
}

fn check_signature(invoice: &Invoice, public_key_pem: &str) -> CoreResult<()> {
    verify_signature(
        public_key_pem,
        field(invoice, &invoice.current_invoice_hash),
        field(invoice, &invoice.signature),
    )
    .map_err(|e| match e {
        SigningError::VerificationFailed => {
            CoreError::chain(invoice.invoice_number, "signature does not match the hash")
        }
        other => other.into(),
    })
}

/// The stored public key must be the trusted one, and the signature must
/// verify under it.
fn check_signer(invoice: &Invoice, trusted_public_key_pem: &str) -> CoreResult<()> {
    if pem_body(field(invoice, &invoice.public_key)) != pem_body(trusted_public_key_pem) {
        return Err(CoreError::chain(
            invoice.invoice_number,
            "signed with an untrusted public key",
        ));
    }
    check_signature(invoice, trusted_public_key_pem)
}

fn verify_qr(invoice: &Invoice) -> CoreResult<()> {
    let records = decode_tlv(field(invoice, &invoice.qr_code))?;
    let value = |tag: u8| records.iter().find(|r| r.tag == tag).map(|r| r.value.as_str());

    if value(4) != Some(invoice.total_amount().to_string().as_str())
        || value(5) != Some(invoice.total_vat_amount().to_string().as_str())
    {
        return Err(CoreError::chain(
            invoice.invoice_number,
            "QR totals do not match the invoice",
        ));
    }
    Ok(())
}

// =============================================================================
// Chain verification
// =============================================================================

/// The first invoice at which the chain does not hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ChainBreak {
    pub invoice_number: i64,
    pub reason: String,
}

/// Result of walking the whole chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ChainReport {
    /// Invoices examined before stopping.
    pub checked: usize,
    pub finalized: usize,
    /// Invoices still waiting for a Phase-2 stage.
    pub pending: usize,
    pub first_break: Option<ChainBreak>,
}

impl ChainReport {
    pub fn is_intact(&self) -> bool {
        self.first_break.is_none()
    }
}

fn check_invoice(
    previous: Option<&Invoice>,
    invoice: &Invoice,
    trusted_public_key_pem: &str,
) -> CoreResult<bool> {
    let n = invoice.invoice_number;

    match previous {
        None => {
            if n != FIRST_INVOICE_NUMBER {
                return Err(CoreError::chain(n, format!("chain must start at {FIRST_INVOICE_NUMBER}")));
            }
            if invoice.previous_invoice_hash.is_some() {
                return Err(CoreError::chain(n, "first invoice has a previous hash"));
            }
        }
        Some(prev) => {
            if n != prev.invoice_number + 1 {
                return Err(CoreError::chain(
                    n,
                    format!("gap after invoice {}", prev.invoice_number),
                ));
            }
            if prev.current_invoice_hash.is_none() {
                return Err(CoreError::chain(n, "predecessor was never hashed"));
            }
            if invoice.previous_invoice_hash != prev.current_invoice_hash {
                return Err(CoreError::chain(n, "previous hash does not match predecessor"));
            }
        }
    }

    match invoice.clone().stage()? {
        InvoiceStage::Persisted(_) => Ok(false),
        InvoiceStage::Hashed(hashed) => {
            hashed.verify_hash()?;
            Ok(false)
        }
        InvoiceStage::Signed(signed) => {
            verify_hash(&signed.0)?;
            check_signer(&signed.0, trusted_public_key_pem)?;
            Ok(false)
        }
        InvoiceStage::Finalized(finalized) => {
            let invoice = &finalized.0;
            verify_hash(invoice)?;
            check_signer(invoice, trusted_public_key_pem)?;
            verify_qr(invoice)?;
            Ok(true)
        }
    }
}

/// Walks invoices in `invoice_number` order and reports the first break.
///
/// Checks numbering (starts at 1000, no gaps), every link, every stored hash
/// against its recomputation, and the QR totals. Every signature must come
/// from `trusted_public_key_pem`; the key stored on a row is only compared
/// against it, never trusted on its own.
pub fn verify_chain(invoices: &[Invoice], trusted_public_key_pem: &str) -> ChainReport {
    let mut report = ChainReport::default();
    let mut previous: Option<&Invoice> = None;

    for invoice in invoices {
        report.checked += 1;
        match check_invoice(previous, invoice, trusted_public_key_pem) {
            Ok(true) => report.finalized += 1,
            Ok(false) => report.pending += 1,
            Err(err) => {
                let reason = match err {
                    CoreError::ChainIntegrity { reason, .. } => reason,
                    other => other.to_string(),
                };
                report.first_break = Some(ChainBreak {
                    invoice_number: invoice.invoice_number,
                    reason,
                });
                break;
            }
        }
        previous = Some(invoice);
    }

    report
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::EcdsaKeyPair;
    use crate::types::NewSale;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn sale(price: i64, quantity: i64) -> Sale {
        NewSale {
            product_id: Uuid::new_v4().to_string(),
            weight_grams: 0,
            quantity,
            selling_price_halalas: price,
            purchase_price_halalas: price / 2,
        }
        .into_sale()
        .unwrap()
    }

    fn settings() -> Settings {
        Settings {
            shop_name: "Acme".to_string(),
            trn: "300000000000003".to_string(),
            address: "Riyadh".to_string(),
            phone: "+966500000000".to_string(),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap()
    }

    fn draft(sales: &[Sale]) -> DraftInvoice {
        let ids: Vec<String> = sales.iter().map(|s| s.id.clone()).collect();
        DraftInvoice::build(&ids, sales, None, now()).unwrap()
    }

    fn finalize(invoice: Invoice, keys: &EcdsaKeyPair) -> Invoice {
        let InvoiceStage::Persisted(persisted) = invoice.stage().unwrap() else {
            panic!("expected a persisted invoice");
        };
        persisted
            .hash(Uuid::new_v4().to_string())
            .unwrap()
            .sign(keys)
            .unwrap()
            .finalize(&settings())
            .unwrap()
            .into_invoice()
    }

    fn chain(len: usize, keys: &EcdsaKeyPair) -> Vec<Invoice> {
        let mut out: Vec<Invoice> = Vec::new();
        for i in 0..len {
            let previous = out.last().and_then(|p| p.current_invoice_hash.clone());
            let invoice = draft(&[sale(11500, 1)]).into_invoice(
                format!("inv-{i}"),
                FIRST_INVOICE_NUMBER + i as i64,
                previous,
            );
            out.push(finalize(invoice, keys));
        }
        out
    }

    #[test]
    fn test_totals_are_exact_sums() {
        let sales = vec![sale(11500, 1), sale(1000, 3), sale(333, 7)];
        let totals = draft(&sales).totals();

        assert_eq!(totals.total.halalas(), 11500 + 3000 + 2331);
        assert_eq!(totals.net + totals.vat, totals.total);
        assert_eq!(totals.net, sales.iter().map(Sale::net_amount).sum::<Money>());
        let expected_vat = totals.net.calculate_tax(crate::types::TaxRate::standard());
        assert!((totals.vat.halalas() - expected_vat.halalas()).abs() <= sales.len() as i64);
    }

    #[test]
    fn test_draft_keeps_requested_order() {
        let a = sale(100, 1);
        let b = sale(200, 1);
        let ids = vec![b.id.clone(), a.id.clone()];
        let draft = DraftInvoice::build(&ids, &[a, b], Some("  Buyer  "), now()).unwrap();

        assert_eq!(draft.sale_ids(), ids.as_slice());
        assert_eq!(draft.customer_name(), Some("Buyer"));
    }

    #[test]
    fn test_draft_rejects_bad_sales() {
        let ok = sale(100, 1);
        let missing = Uuid::new_v4().to_string();
        let err = DraftInvoice::build(&[ok.id.clone(), missing], &[ok.clone()], None, now());
        assert!(matches!(
            err,
            Err(CoreError::Validation(ValidationError::Unresolved { .. }))
        ));

        let mut cancelled = sale(100, 1);
        cancelled.status = SaleStatus::Cancelled;
        let err = DraftInvoice::build(&[cancelled.id.clone()], &[cancelled], None, now());
        assert!(matches!(
            err,
            Err(CoreError::Validation(ValidationError::Ineligible { .. }))
        ));

        let mut invoiced = sale(100, 1);
        invoiced.invoice_id = Some("inv-0".to_string());
        let err = DraftInvoice::build(&[invoiced.id.clone()], &[invoiced], None, now());
        assert!(matches!(
            err,
            Err(CoreError::Validation(ValidationError::Ineligible { .. }))
        ));

        assert!(DraftInvoice::build(&[], &[], None, now()).is_err());
        assert!(DraftInvoice::build(&[ok.id.clone(), ok.id.clone()], &[ok], None, now()).is_err());
    }

    #[test]
    fn test_stage_transitions() {
        let keys = EcdsaKeyPair::generate();
        let invoice = draft(&[sale(11500, 1)]).into_invoice("inv-1".to_string(), 1000, None);

        let stage = invoice.clone().stage().unwrap();
        assert_eq!(stage.name(), "persisted");

        let finalized = finalize(invoice, &keys);
        assert!(finalized.is_finalized());
        let InvoiceStage::Finalized(stage) = finalized.stage().unwrap() else {
            panic!("expected a finalized invoice");
        };

        let artifacts = stage.artifacts();
        assert_eq!(artifacts.previous_invoice_hash, None);
        assert!(verify_signature(
            &artifacts.public_key,
            &artifacts.current_invoice_hash,
            &artifacts.signature
        )
        .is_ok());

        let records = decode_tlv(&artifacts.qr_code).unwrap();
        assert_eq!(records[0].value, "Acme");
        assert_eq!(records[2].value, "2024-01-01T10:00:00Z");
        assert_eq!(records[3].value, "115.00");
        assert_eq!(records[4].value, "15.00");
    }

    #[test]
    fn test_stage_rejects_impossible_rows() {
        let keys = EcdsaKeyPair::generate();
        let base = finalize(
            draft(&[sale(100, 1)]).into_invoice("inv-1".to_string(), 1000, None),
            &keys,
        );

        let mut no_hash = base.clone();
        no_hash.current_invoice_hash = None;
        assert!(matches!(no_hash.stage(), Err(CoreError::ChainIntegrity { .. })));

        let mut no_uuid = base.clone();
        no_uuid.uuid = None;
        assert!(no_uuid.stage().is_err());

        let mut no_key = base.clone();
        no_key.public_key = None;
        assert!(no_key.stage().is_err());

        let mut qr_only = base;
        qr_only.signature = None;
        qr_only.public_key = None;
        assert!(qr_only.stage().is_err());
    }

    #[test]
    fn test_hash_and_signature_are_deterministic() {
        let keys = EcdsaKeyPair::generate();
        let invoice = draft(&[sale(11500, 2)]).into_invoice("inv-1".to_string(), 1000, None);
        let uuid = Uuid::new_v4().to_string();

        let run = || {
            let InvoiceStage::Persisted(p) = invoice.clone().stage().unwrap() else {
                panic!("expected a persisted invoice");
            };
            let signed = p.hash(uuid.clone()).unwrap().sign(&keys).unwrap();
            (signed.invoice().current_invoice_hash.clone(), signed.signature().to_string())
        };

        assert_eq!(run(), run());
    }

    #[test]
    fn test_verify_chain_accepts_linked_chain() {
        let keys = EcdsaKeyPair::generate();
        let invoices = chain(4, &keys);

        for pair in invoices.windows(2) {
            assert_eq!(pair[1].previous_invoice_hash, pair[0].current_invoice_hash);
        }

        let report = verify_chain(&invoices, &keys.spki_pem().unwrap());
        assert!(report.is_intact(), "{report:?}");
        assert_eq!(report.checked, 4);
        assert_eq!(report.finalized, 4);
    }

    #[test]
    fn test_verify_chain_reports_first_break() {
        let keys = EcdsaKeyPair::generate();
        let mut invoices = chain(4, &keys);
        invoices[2].total_amount_halalas += 1;
        let trusted = keys.spki_pem().unwrap();

        let report = verify_chain(&invoices, &trusted);
        let broken = report.first_break.unwrap();
        assert_eq!(broken.invoice_number, 1002);
        assert_eq!(report.checked, 3);

        let mut relinked = chain(3, &keys);
        relinked[1].previous_invoice_hash = Some("0".repeat(64));
        assert_eq!(verify_chain(&relinked, &trusted).first_break.unwrap().invoice_number, 1001);
    }

    #[test]
    fn test_verify_chain_detects_forged_signature() {
        let keys = EcdsaKeyPair::generate();
        let mut invoices = chain(2, &keys);
        let other = EcdsaKeyPair::generate();
        invoices[1].public_key = Some(other.spki_pem().unwrap());

        let report = verify_chain(&invoices, &keys.spki_pem().unwrap());
        assert_eq!(report.first_break.unwrap().invoice_number, 1001);
    }

    #[test]
    fn test_verify_chain_rejects_resigned_tail() {
        let keys = EcdsaKeyPair::generate();
        let mut invoices = chain(2, &keys);

        // Rewrite the newest invoice and rebuild every Phase-2 field with another key
        let other = EcdsaKeyPair::generate();
        let mut forged = invoices[1].clone();
        forged.total_net_amount_halalas = 87;
        forged.total_vat_amount_halalas = 13;
        forged.total_amount_halalas = 100;
        forged.uuid = None;
        forged.current_invoice_hash = None;
        forged.signature = None;
        forged.public_key = None;
        forged.qr_code = None;
        invoices[1] = finalize(forged, &other);

        let self_consistent = verify_chain(&invoices, &other.spki_pem().unwrap());
        assert_eq!(self_consistent.first_break.unwrap().invoice_number, 1000);

        let report = verify_chain(&invoices, &keys.spki_pem().unwrap());
        let broken = report.first_break.unwrap();
        assert_eq!(broken.invoice_number, 1001);
        assert_eq!(broken.reason, "signed with an untrusted public key");
        assert_eq!(report.finalized, 1);
    }

    #[test]
    fn test_signed_stage_checks_hash() {
        let keys = EcdsaKeyPair::generate();
        let invoice = draft(&[sale(11500, 1)]).into_invoice("inv-1".to_string(), 1000, None);
        let InvoiceStage::Persisted(persisted) = invoice.stage().unwrap() else {
            panic!("expected a persisted invoice");
        };
        let mut row = persisted
            .hash(Uuid::new_v4().to_string())
            .unwrap()
            .sign(&keys)
            .unwrap()
            .invoice()
            .clone();
        row.total_amount_halalas = 100;

        let InvoiceStage::Signed(signed) = row.stage().unwrap() else {
            panic!("expected a signed invoice");
        };
        assert!(signed.verify_signature().is_ok());
        assert!(matches!(signed.verify_hash(), Err(CoreError::ChainIntegrity { .. })));
    }
}
