//! # Invoice Service
//!
//! Drives sales through the invoice pipeline and serves the read side.
//!
//! ## Pipeline
//! ```text
//! create_invoice(sale_ids)
//!   │ settings, sales, DraftInvoice::build          (no side effects)
//!   │
//!   ├── chain lock ─────────────────────────────────────────────────────┐
//!   │   resume predecessor if it was never hashed                       │
//!   │   InvoiceRepository::allocate    number + previous hash + sales   │
//!   │   hash ──► record_hash                                            │
//!   │   sign ──► record_signature                                       │
//!   │   TLV  ──► record_qr_code                                         │
//!   └───────────────────────────────────────────────────────────────────┘
//! ```
//! A failure after `allocate` leaves the invoice in its last recorded stage.
//! `finalize_invoice_phase2` picks it up from there.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use mizan_core::chain::{self, ChainReport, DraftInvoice, FinalizedInvoice, InvoiceStage};
use mizan_core::signing::KeyProvider;
use mizan_core::xml::{build_invoice_xml, build_invoice_xml_phase2};
use mizan_core::{Customer, Invoice, InvoiceDocument, InvoiceLine, Settings};
use mizan_db::Database;

use crate::config::ZatcaConfig;
use crate::error::{ZatcaError, ZatcaResult};
use crate::keystore::KeyStore;

/// Label used when a sale's product row no longer exists.
const UNKNOWN_PRODUCT: &str = "Unknown product";

/// Invoice pipeline over a database and a signing key.
pub struct InvoiceService {
    db: Database,
    keys: Arc<dyn KeyProvider>,
    currency: String,
    /// Held while allocating or advancing any invoice.
    chain_lock: Mutex<()>,
}

impl std::fmt::Debug for InvoiceService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvoiceService")
            .field("currency", &self.currency)
            .finish_non_exhaustive()
    }
}

impl InvoiceService {
    /// Opens the database and provisions the key pair.
    ///
    /// Fails if the key directory cannot be written or the stored pair is
    /// incomplete.
    pub async fn new(config: &ZatcaConfig) -> ZatcaResult<Self> {
        config.validate()?;

        let store = KeyStore::new(config.key_paths());
        let paths = store.ensure_key_pair()?;
        info!(private_key = %paths.private_key.display(), "Signing key ready");

        let db = Database::new(config.db_config()).await?;

        Ok(Self::with_provider(
            db,
            Arc::new(store.provider()),
            config.currency(),
        ))
    }

    /// Builds a service around an existing pool and key provider.
    pub fn with_provider(
        db: Database,
        keys: Arc<dyn KeyProvider>,
        currency: impl Into<String>,
    ) -> Self {
        InvoiceService {
            db,
            keys,
            currency: currency.into(),
            chain_lock: Mutex::new(()),
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    // =========================================================================
    // Write side
    // =========================================================================

    /// Creates a finalized invoice from uninvoiced sales.
    ///
    /// ## Errors
    /// - `Validation` for an empty list, unknown, duplicated, cancelled or
    ///   already invoiced sale
    /// - `NotFound` when the seller settings are missing
    /// - `KeyStore`/`Signing` when the invoice was stored but could not be
    ///   signed; it stays in the chain and can be finalized later
    pub async fn create_invoice(
        &self,
        sale_ids: &[String],
        customer_name: Option<&str>,
    ) -> ZatcaResult<Invoice> {
        let settings = self.settings().await?;
        let sales = self.db.sales().get_many(sale_ids).await?;
        let draft = DraftInvoice::build(sale_ids, &sales, customer_name, Utc::now())?;

        let _chain = self.chain_lock.lock().await;

        if let Some(predecessor) = self.db.invoices().find_predecessor().await? {
            if predecessor.current_invoice_hash.is_none() {
                warn!(
                    invoice_number = predecessor.invoice_number,
                    "Predecessor was never hashed, resuming it first"
                );
                self.advance(predecessor, &settings).await?;
            }
        }

        let persisted = self.db.invoices().allocate(draft).await?;
        info!(
            invoice_number = persisted.invoice_number,
            sales = persisted.sale_ids.len(),
            total = %persisted.total_amount(),
            "Invoice allocated"
        );

        let finalized = self.advance(persisted, &settings).await?;
        Ok(finalized.into_invoice())
    }

    /// Completes any missing Phase-2 stage and renders the Phase-2 XML.
    ///
    /// Calling this on a finalized invoice changes nothing and returns the
    /// same document.
    pub async fn finalize_invoice_phase2(&self, invoice_id: &str) -> ZatcaResult<String> {
        let settings = self.settings().await?;

        let finalized = {
            let _chain = self.chain_lock.lock().await;
            let invoice = self.load(invoice_id).await?;
            self.advance(invoice, &settings).await?
        };

        let artifacts = finalized.artifacts();
        let invoice = finalized.into_invoice();
        let customer = Customer::named(invoice.customer_name.as_deref());
        let document = self.document(invoice).await?;

        Ok(build_invoice_xml_phase2(
            &document,
            &artifacts,
            &settings,
            Some(&customer),
        )?)
    }

    /// Moves a stored invoice forward until it is finalized.
    ///
    /// Each stage is recorded before the next one starts. A stored hash is
    /// checked against the invoice fields before it is signed, and a stored
    /// signature is checked against hash and fields before the QR is built.
    async fn advance(&self, invoice: Invoice, settings: &Settings) -> ZatcaResult<FinalizedInvoice> {
        let invoices = self.db.invoices();
        let id = invoice.id.clone();
        let number = invoice.invoice_number;
        let mut stage = invoice.stage()?;

        loop {
            debug!(invoice_number = number, stage = stage.name(), "Advancing invoice");

            stage = match stage {
                InvoiceStage::Persisted(persisted) => {
                    let hashed = persisted.hash(Uuid::new_v4().to_string())?;
                    invoices
                        .record_hash(&id, hashed.uuid(), hashed.current_hash())
                        .await?;
                    InvoiceStage::Hashed(hashed)
                }
                InvoiceStage::Hashed(hashed) => {
                    hashed.verify_hash()?;
                    let signed = hashed.sign(self.keys.as_ref())?;
                    invoices
                        .record_signature(&id, signed.signature(), signed.public_key())
                        .await?;
                    InvoiceStage::Signed(signed)
                }
                InvoiceStage::Signed(signed) => {
                    signed.verify_hash()?;
                    signed.verify_signature()?;
                    let finalized = signed.finalize(settings)?;
                    invoices
                        .record_qr_code(&id, &finalized.artifacts().qr_code)
                        .await?;
                    info!(invoice_number = number, "Invoice finalized");
                    InvoiceStage::Finalized(finalized)
                }
                InvoiceStage::Finalized(finalized) => return Ok(finalized),
            };
        }
    }

    // =========================================================================
    // Read side
    // =========================================================================

    /// The invoice with its sale lines and product names.
    pub async fn get_invoice(&self, invoice_id: &str) -> ZatcaResult<InvoiceDocument> {
        let invoice = self.load(invoice_id).await?;
        self.document(invoice).await
    }

    /// All invoices in chain order.
    pub async fn list_invoices(&self) -> ZatcaResult<Vec<Invoice>> {
        Ok(self.db.invoices().list_by_number().await?)
    }

    /// Phase-1 UBL document, available at any stage.
    pub async fn get_invoice_xml(&self, invoice_id: &str) -> ZatcaResult<String> {
        let settings = self.settings().await?;
        let invoice = self.load(invoice_id).await?;
        let customer = Customer::named(invoice.customer_name.as_deref());
        let document = self.document(invoice).await?;

        Ok(build_invoice_xml(&document, &settings, Some(&customer))?)
    }

    /// Recomputes every hash and checks every link and every signature
    /// against the configured signing key.
    pub async fn verify_chain(&self) -> ZatcaResult<ChainReport> {
        let trusted = self.keys.public_key_pem()?;
        let invoices = self.db.invoices().list_by_number().await?;
        let report = chain::verify_chain(&invoices, &trusted);

        match &report.first_break {
            None => info!(
                checked = report.checked,
                finalized = report.finalized,
                pending = report.pending,
                "Invoice chain intact"
            ),
            Some(broken) => warn!(
                invoice_number = broken.invoice_number,
                reason = %broken.reason,
                "Invoice chain broken"
            ),
        }

        Ok(report)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn settings(&self) -> ZatcaResult<Settings> {
        self.db
            .settings()
            .get()
            .await?
            .ok_or_else(|| ZatcaError::not_found("Settings", "seller profile"))
    }

    async fn load(&self, invoice_id: &str) -> ZatcaResult<Invoice> {
        self.db
            .invoices()
            .get_by_id(invoice_id)
            .await?
            .ok_or_else(|| ZatcaError::not_found("Invoice", invoice_id))
    }

    async fn document(&self, invoice: Invoice) -> ZatcaResult<InvoiceDocument> {
        let sales = self.db.sales().get_many(&invoice.sale_ids).await?;
        if sales.len() != invoice.sale_ids.len() {
            return Err(ZatcaError::ChainIntegrity {
                invoice_number: invoice.invoice_number,
                reason: format!(
                    "{} of {} sales are missing",
                    invoice.sale_ids.len() - sales.len(),
                    invoice.sale_ids.len()
                ),
            });
        }

        let product_ids: Vec<String> = sales
            .iter()
            .map(|s| s.product_id.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let names = self.db.products().names_by_id(&product_ids).await?;

        let lines = sales
            .into_iter()
            .map(|sale| {
                let product_name = names
                    .get(&sale.product_id)
                    .cloned()
                    .unwrap_or_else(|| UNKNOWN_PRODUCT.to_string());
                InvoiceLine { sale, product_name }
            })
            .collect();

        Ok(InvoiceDocument {
            invoice,
            lines,
            currency: self.currency.clone(),
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use mizan_core::signing::{verify_signature, EcdsaKeyPair};
    use mizan_core::tlv::decode_tlv;
    use mizan_core::{Money, NewSale, Product, ProductUnit, SigningError, FIRST_INVOICE_NUMBER};
    use mizan_db::DbConfig;

    struct NoKey;

    impl KeyProvider for NoKey {
        fn sign(&self, _: &str) -> Result<String, SigningError> {
            Err(SigningError::KeyUnavailable("ecc_private.pem: missing".into()))
        }

        fn public_key_pem(&self) -> Result<String, SigningError> {
            Err(SigningError::KeyUnavailable("ecc_public.pem: missing".into()))
        }
    }

    fn seller() -> Settings {
        Settings {
            shop_name: "Acme".to_string(),
            trn: "310122393500003".to_string(),
            address: "King Fahd Road, Riyadh".to_string(),
            phone: "+966112345678".to_string(),
        }
    }

    async fn database(config: DbConfig, with_settings: bool) -> Database {
        let db = Database::new(config).await.unwrap();
        if with_settings {
            db.settings().upsert(&seller()).await.unwrap();
        }
        db
    }

    async fn record_sales(db: &Database, n: usize) -> Vec<String> {
        let product = Product::new(
            "Ajwa Dates 1kg",
            ProductUnit::Weight,
            Some(1000),
            Money::from_halalas(6000),
            Money::from_halalas(11500),
            100,
        )
        .unwrap();
        let product = db.products().insert(&product).await.unwrap();

        let mut ids = Vec::new();
        for i in 0..n {
            let sale = db
                .sales()
                .create(NewSale::for_product(&product, (i % 3) as i64 + 1))
                .await
                .unwrap();
            ids.push(sale.id);
        }
        ids
    }

    async fn service() -> (InvoiceService, Vec<String>) {
        let db = database(DbConfig::in_memory(), true).await;
        let sales = record_sales(&db, 6).await;
        let service = InvoiceService::with_provider(db, Arc::new(EcdsaKeyPair::generate()), "SAR");
        (service, sales)
    }

    #[tokio::test]
    async fn test_create_invoice_finalizes() {
        let (service, sales) = service().await;

        let invoice = service
            .create_invoice(&sales[..3], Some("Walk-in"))
            .await
            .unwrap();

        assert_eq!(invoice.invoice_number, FIRST_INVOICE_NUMBER);
        assert!(invoice.previous_invoice_hash.is_none());
        assert!(invoice.is_finalized());

        let hash = invoice.current_invoice_hash.as_deref().unwrap();
        let signature = invoice.signature.as_deref().unwrap();
        let public = invoice.public_key.as_deref().unwrap();
        assert!(verify_signature(public, hash, signature).is_ok());

        let records = decode_tlv(invoice.qr_code.as_deref().unwrap()).unwrap();
        assert_eq!(records[0].value, "Acme");
        assert_eq!(records[3].value, invoice.total_amount().to_string());
    }

    #[tokio::test]
    async fn test_totals_are_sums_of_sales() {
        let (service, sales) = service().await;
        let invoice = service.create_invoice(&sales, None).await.unwrap();

        let document = service.get_invoice(&invoice.id).await.unwrap();
        let net: i64 = document.lines.iter().map(|l| l.sale.net_amount_halalas).sum();
        let vat: i64 = document.lines.iter().map(|l| l.sale.vat_amount_halalas).sum();
        let total: i64 = document.lines.iter().map(|l| l.sale.total_with_vat_halalas).sum();

        assert_eq!(invoice.total_net_amount_halalas, net);
        assert_eq!(invoice.total_vat_amount_halalas, vat);
        assert_eq!(invoice.total_amount_halalas, total);
        assert_eq!(net + vat, total);

        let expected_vat = invoice.total_net_amount_halalas * 15 / 100;
        assert!((invoice.total_vat_amount_halalas - expected_vat).abs() <= sales.len() as i64 + 1);
        assert!(document.lines.iter().all(|l| l.product_name == "Ajwa Dates 1kg"));
    }

    #[tokio::test]
    async fn test_invoices_are_chained() {
        let (service, sales) = service().await;

        let first = service.create_invoice(&sales[..2], None).await.unwrap();
        let second = service.create_invoice(&sales[2..4], None).await.unwrap();
        let third = service.create_invoice(&sales[4..], None).await.unwrap();

        assert_eq!(second.invoice_number, first.invoice_number + 1);
        assert_eq!(third.invoice_number, second.invoice_number + 1);
        assert_eq!(second.previous_invoice_hash, first.current_invoice_hash);
        assert_eq!(third.previous_invoice_hash, second.current_invoice_hash);

        let report = service.verify_chain().await.unwrap();
        assert!(report.is_intact());
        assert_eq!(report.finalized, 3);
    }

    #[tokio::test]
    async fn test_finalize_twice_is_identical() {
        let (service, sales) = service().await;
        let invoice = service.create_invoice(&sales[..2], Some("Acme Trading")).await.unwrap();

        let first = service.finalize_invoice_phase2(&invoice.id).await.unwrap();
        let second = service.finalize_invoice_phase2(&invoice.id).await.unwrap();
        assert_eq!(first, second);

        let stored = service.get_invoice(&invoice.id).await.unwrap().invoice;
        assert_eq!(stored.current_invoice_hash, invoice.current_invoice_hash);
        assert_eq!(stored.signature, invoice.signature);
        assert_eq!(stored.qr_code, invoice.qr_code);

        assert!(first.contains("<ext:UBLExtensions>"));
        assert!(first.contains(invoice.uuid.as_deref().unwrap()));
        assert!(first.contains(invoice.current_invoice_hash.as_deref().unwrap()));
        assert_eq!(first.matches("<cac:InvoiceLine>").count(), 2);
    }

    #[tokio::test]
    async fn test_phase1_xml() {
        let (service, sales) = service().await;
        let invoice = service.create_invoice(&sales[..3], None).await.unwrap();

        let xml = service.get_invoice_xml(&invoice.id).await.unwrap();
        assert!(xml.contains("<cbc:ID>1000</cbc:ID>"));
        assert!(!xml.contains("<ext:UBLExtensions"));
        assert_eq!(xml.matches("<cac:InvoiceLine>").count(), 3);
    }

    #[tokio::test]
    async fn test_missing_key_leaves_invoice_resumable() {
        let db = database(DbConfig::in_memory(), true).await;
        let sales = record_sales(&db, 2).await;

        let broken = InvoiceService::with_provider(db.clone(), Arc::new(NoKey), "SAR");
        let err = broken.create_invoice(&sales[..1], None).await.unwrap_err();
        assert!(matches!(err, ZatcaError::KeyStore(_)));

        let stored = db.invoices().find_predecessor().await.unwrap().unwrap();
        assert!(stored.current_invoice_hash.is_some());
        assert!(stored.signature.is_none());

        let fixed = InvoiceService::with_provider(db.clone(), Arc::new(EcdsaKeyPair::generate()), "SAR");
        fixed.finalize_invoice_phase2(&stored.id).await.unwrap();

        let resumed = fixed.get_invoice(&stored.id).await.unwrap().invoice;
        assert!(resumed.is_finalized());
        assert_eq!(resumed.invoice_number, stored.invoice_number);
        assert_eq!(resumed.current_invoice_hash, stored.current_invoice_hash);

        let next = fixed.create_invoice(&sales[1..], None).await.unwrap();
        assert_eq!(next.previous_invoice_hash, resumed.current_invoice_hash);
    }

    #[tokio::test]
    async fn test_resumes_unhashed_predecessor() {
        let (service, sales) = service().await;

        let sales_for_draft = service.database().sales().get_many(&sales[..1]).await.unwrap();
        let draft = DraftInvoice::build(&sales[..1], &sales_for_draft, None, Utc::now()).unwrap();
        let stranded = service.database().invoices().allocate(draft).await.unwrap();
        assert!(stranded.current_invoice_hash.is_none());

        let next = service.create_invoice(&sales[1..2], None).await.unwrap();
        let resumed = service.get_invoice(&stranded.id).await.unwrap().invoice;

        assert!(resumed.is_finalized());
        assert_eq!(next.invoice_number, stranded.invoice_number + 1);
        assert_eq!(next.previous_invoice_hash, resumed.current_invoice_hash);
    }

    #[tokio::test]
    async fn test_unresumable_predecessor_blocks_creation() {
        let db = database(DbConfig::in_memory(), true).await;
        let sales = record_sales(&db, 2).await;

        let found = db.sales().get_many(&sales[..1]).await.unwrap();
        let draft = DraftInvoice::build(&sales[..1], &found, None, Utc::now()).unwrap();
        db.invoices().allocate(draft).await.unwrap();

        // Hashing succeeds, signing does not, so the resume stops there
        let broken = InvoiceService::with_provider(db.clone(), Arc::new(NoKey), "SAR");
        let err = broken.create_invoice(&sales[1..], None).await.unwrap_err();
        assert!(matches!(err, ZatcaError::KeyStore(_)));
        assert_eq!(db.invoices().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_signed_resume_rejects_edited_totals() {
        let db = database(DbConfig::in_memory(), true).await;
        let sales = record_sales(&db, 1).await;
        let keys = EcdsaKeyPair::generate();

        let found = db.sales().get_many(&sales).await.unwrap();
        let draft = DraftInvoice::build(&sales, &found, None, Utc::now()).unwrap();
        let stored = db.invoices().allocate(draft).await.unwrap();
        let InvoiceStage::Persisted(persisted) = stored.stage().unwrap() else {
            panic!("expected a persisted invoice");
        };
        let signed = persisted
            .hash(Uuid::new_v4().to_string())
            .unwrap()
            .sign(&keys)
            .unwrap();
        let hashed = signed.invoice();
        let id = hashed.id.clone();
        db.invoices()
            .record_hash(
                &id,
                hashed.uuid.as_deref().unwrap(),
                hashed.current_invoice_hash.as_deref().unwrap(),
            )
            .await
            .unwrap();
        db.invoices()
            .record_signature(&id, signed.signature(), signed.public_key())
            .await
            .unwrap();

        sqlx::query("UPDATE invoices SET total_amount_halalas = total_amount_halalas + 100 WHERE id = ?")
            .bind(&id)
            .execute(db.pool())
            .await
            .unwrap();

        let service = InvoiceService::with_provider(db.clone(), Arc::new(keys), "SAR");
        let err = service.finalize_invoice_phase2(&id).await.unwrap_err();
        assert!(matches!(err, ZatcaError::ChainIntegrity { .. }));

        let after = service.get_invoice(&id).await.unwrap().invoice;
        assert!(after.qr_code.is_none());
    }

    #[tokio::test]
    async fn test_verify_chain_rejects_foreign_signer() {
        let (service, sales) = service().await;
        service.create_invoice(&sales[..1], None).await.unwrap();
        let created = service.create_invoice(&sales[1..2], None).await.unwrap();
        let tail = service.get_invoice(&created.id).await.unwrap().invoice;

        // Rebuild the newest invoice with a different key and forged totals
        let forger = EcdsaKeyPair::generate();
        let mut forged = tail;
        forged.total_net_amount_halalas = 87;
        forged.total_vat_amount_halalas = 13;
        forged.total_amount_halalas = 100;
        forged.uuid = None;
        forged.current_invoice_hash = None;
        forged.signature = None;
        forged.public_key = None;
        forged.qr_code = None;
        let InvoiceStage::Persisted(persisted) = forged.stage().unwrap() else {
            panic!("expected a persisted invoice");
        };
        let forged = persisted
            .hash(Uuid::new_v4().to_string())
            .unwrap()
            .sign(&forger)
            .unwrap()
            .finalize(&seller())
            .unwrap()
            .into_invoice();

        sqlx::query(
            "UPDATE invoices SET total_net_amount_halalas = ?, total_vat_amount_halalas = ?, \
             total_amount_halalas = ?, uuid = ?, current_invoice_hash = ?, signature = ?, \
             public_key = ?, qr_code = ? WHERE id = ?",
        )
        .bind(forged.total_net_amount_halalas)
        .bind(forged.total_vat_amount_halalas)
        .bind(forged.total_amount_halalas)
        .bind(&forged.uuid)
        .bind(&forged.current_invoice_hash)
        .bind(&forged.signature)
        .bind(&forged.public_key)
        .bind(&forged.qr_code)
        .bind(&forged.id)
        .execute(service.database().pool())
        .await
        .unwrap();

        let report = service.verify_chain().await.unwrap();
        let broken = report.first_break.unwrap();
        assert_eq!(broken.invoice_number, created.invoice_number);
        assert_eq!(broken.reason, "signed with an untrusted public key");
    }

    #[tokio::test]
    async fn test_missing_settings() {
        let db = database(DbConfig::in_memory(), false).await;
        let sales = record_sales(&db, 1).await;
        let service = InvoiceService::with_provider(db, Arc::new(EcdsaKeyPair::generate()), "SAR");

        let err = service.create_invoice(&sales, None).await.unwrap_err();
        assert!(matches!(err, ZatcaError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_rejects_ineligible_sales() {
        let (service, sales) = service().await;

        let err = service.create_invoice(&[], None).await.unwrap_err();
        assert!(matches!(err, ZatcaError::Validation(_)));

        let unknown = vec![Uuid::new_v4().to_string()];
        let err = service.create_invoice(&unknown, None).await.unwrap_err();
        assert!(matches!(err, ZatcaError::Validation(_)));

        service.database().sales().cancel(&sales[0]).await.unwrap();
        let err = service.create_invoice(&sales[..1], None).await.unwrap_err();
        assert!(matches!(err, ZatcaError::Validation(_)));

        service.create_invoice(&sales[1..2], None).await.unwrap();
        let err = service.create_invoice(&sales[1..3], None).await.unwrap_err();
        assert!(matches!(err, ZatcaError::Validation(_)));

        assert_eq!(service.list_invoices().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_invoice() {
        let (service, _) = service().await;
        let err = service.get_invoice_xml("no-such-invoice").await.unwrap_err();
        assert!(matches!(err, ZatcaError::NotFound { .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creation_is_linear() {
        const N: usize = 8;

        let dir = tempfile::tempdir().unwrap();
        let db = database(DbConfig::new(dir.path().join("mizan.db")), true).await;
        let sales = record_sales(&db, N).await;
        let service = Arc::new(InvoiceService::with_provider(
            db,
            Arc::new(EcdsaKeyPair::generate()),
            "SAR",
        ));

        let handles: Vec<_> = sales
            .into_iter()
            .map(|id| {
                let service = Arc::clone(&service);
                tokio::spawn(async move { service.create_invoice(&[id], None).await })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let invoices = service.list_invoices().await.unwrap();
        let numbers: Vec<i64> = invoices.iter().map(|i| i.invoice_number).collect();
        let expected: Vec<i64> = (0..N as i64).map(|k| FIRST_INVOICE_NUMBER + k).collect();
        assert_eq!(numbers, expected);

        let report = service.verify_chain().await.unwrap();
        assert!(report.is_intact(), "{:?}", report.first_break);
        assert_eq!(report.finalized, N);
    }
}
