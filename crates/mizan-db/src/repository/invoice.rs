//! # Invoice Repository
//!
//! Storage for the invoice hash chain.
//!
//! ## Allocation Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │   1. UPDATE invoice_sequence ... RETURNING   ← takes the write lock     │
//! │   2. SELECT predecessor (highest number)     ← copy its current hash    │
//! │   3. INSERT invoices                                                    │
//! │   4. INSERT invoice_sales (ordered)                                     │
//! │   5. UPDATE sales SET invoice_id             ← guarded, all or nothing  │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//! Any failure rolls back the whole transaction, sequence increment included,
//! so numbers are never skipped.
//!
//! ## Write-Once Columns
//! `record_hash`, `record_signature` and `record_qr_code` only update rows
//! where the target column is still NULL and the previous stage is present.
//! A stored Phase-2 value is never replaced, and no method here changes
//! `invoice_number` or `previous_invoice_hash` after allocation.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::sale::SaleRepository;
use mizan_core::chain::DraftInvoice;
use mizan_core::{CoreError, Invoice, FIRST_INVOICE_NUMBER};

const INVOICE_COLUMNS: &str = r#"
    id, invoice_number,
    total_net_amount_halalas, total_vat_amount_halalas,
    total_amount_halalas, total_profit_halalas,
    customer_name, created_at,
    uuid, previous_invoice_hash, current_invoice_hash,
    signature, public_key, qr_code
"#;

/// An `invoices` row before its sale links are attached.
#[derive(Debug, FromRow)]
struct InvoiceRow {
    id: String,
    invoice_number: i64,
    total_net_amount_halalas: i64,
    total_vat_amount_halalas: i64,
    total_amount_halalas: i64,
    total_profit_halalas: i64,
    customer_name: Option<String>,
    created_at: DateTime<Utc>,
    uuid: Option<String>,
    previous_invoice_hash: Option<String>,
    current_invoice_hash: Option<String>,
    signature: Option<String>,
    public_key: Option<String>,
    qr_code: Option<String>,
}

impl InvoiceRow {
    fn into_invoice(self, sale_ids: Vec<String>) -> DbResult<Invoice> {
        if sale_ids.is_empty() {
            return Err(DbError::InvalidData(format!(
                "invoice {} has no sales",
                self.invoice_number
            )));
        }

        Ok(Invoice {
            id: self.id,
            invoice_number: self.invoice_number,
            sale_ids,
            total_net_amount_halalas: self.total_net_amount_halalas,
            total_vat_amount_halalas: self.total_vat_amount_halalas,
            total_amount_halalas: self.total_amount_halalas,
            total_profit_halalas: self.total_profit_halalas,
            customer_name: self.customer_name,
            created_at: self.created_at,
            uuid: self.uuid,
            previous_invoice_hash: self.previous_invoice_hash,
            current_invoice_hash: self.current_invoice_hash,
            signature: self.signature,
            public_key: self.public_key,
            qr_code: self.qr_code,
        })
    }
}

/// Repository for the invoice chain.
#[derive(Debug, Clone)]
pub struct InvoiceRepository {
    pool: SqlitePool,
}

impl InvoiceRepository {
    /// Creates a new InvoiceRepository.
    pub fn new(pool: SqlitePool) -> Self {
        InvoiceRepository { pool }
    }

    /// Numbers, links and stores a draft in one transaction.
    ///
    /// ## Errors
    /// - `Domain(ChainIntegrity)` when the predecessor has no hash yet, or
    ///   the sequence and the stored chain disagree
    /// - `Domain(Validation)` when a sale stopped being invoiceable after
    ///   the draft was built
    /// - `TransactionFailed` when the commit fails
    ///
    /// Nothing is written on error.
    pub async fn allocate(&self, draft: DraftInvoice) -> DbResult<Invoice> {
        let mut tx = self.pool.begin().await?;

        let invoice_number: i64 = sqlx::query_scalar(
            r#"
            UPDATE invoice_sequence
            SET next_value = next_value + 1
            WHERE id = 1
            RETURNING next_value - 1
            "#,
        )
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| DbError::InvalidData("invoice sequence row missing".to_string()))?;

        let previous_invoice_hash = predecessor_hash(&mut tx, invoice_number).await?;

        let id = Uuid::new_v4().to_string();
        let invoice = draft.into_invoice(id, invoice_number, previous_invoice_hash);

        debug!(
            id = %invoice.id,
            invoice_number = invoice.invoice_number,
            sales = invoice.sale_ids.len(),
            "Inserting invoice"
        );

        sqlx::query(
            r#"
            INSERT INTO invoices (
                id, invoice_number,
                total_net_amount_halalas, total_vat_amount_halalas,
                total_amount_halalas, total_profit_halalas,
                customer_name, created_at, previous_invoice_hash
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&invoice.id)
        .bind(invoice.invoice_number)
        .bind(invoice.total_net_amount_halalas)
        .bind(invoice.total_vat_amount_halalas)
        .bind(invoice.total_amount_halalas)
        .bind(invoice.total_profit_halalas)
        .bind(&invoice.customer_name)
        .bind(invoice.created_at)
        .bind(&invoice.previous_invoice_hash)
        .execute(&mut *tx)
        .await?;

        for (position, sale_id) in invoice.sale_ids.iter().enumerate() {
            sqlx::query(
                "INSERT INTO invoice_sales (invoice_id, sale_id, position) VALUES (?1, ?2, ?3)",
            )
            .bind(&invoice.id)
            .bind(sale_id)
            .bind(position as i64)
            .execute(&mut *tx)
            .await?;
        }

        SaleRepository::attach_to_invoice(&mut tx, &invoice.id, &invoice.sale_ids).await?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        info!(
            invoice_number = invoice.invoice_number,
            linked = invoice.previous_invoice_hash.is_some(),
            "Invoice allocated"
        );

        Ok(invoice)
    }

    /// Stores the UUID and canonical hash. Fails if either is already set.
    pub async fn record_hash(&self, id: &str, uuid: &str, current_hash: &str) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE invoices SET
                uuid = ?2,
                current_invoice_hash = ?3
            WHERE id = ?1 AND uuid IS NULL AND current_invoice_hash IS NULL
            "#,
        )
        .bind(id)
        .bind(uuid)
        .bind(current_hash)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Invoice (unhashed)", id));
        }

        debug!(id = %id, hash = %current_hash, "Invoice hash recorded");
        Ok(())
    }

    /// Stores the signature and signer public key of a hashed invoice.
    pub async fn record_signature(&self, id: &str, signature: &str, public_key: &str) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE invoices SET
                signature = ?2,
                public_key = ?3
            WHERE id = ?1
              AND current_invoice_hash IS NOT NULL
              AND signature IS NULL
              AND public_key IS NULL
            "#,
        )
        .bind(id)
        .bind(signature)
        .bind(public_key)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Invoice (hashed, unsigned)", id));
        }

        debug!(id = %id, "Invoice signature recorded");
        Ok(())
    }

    /// Stores the QR payload of a signed invoice.
    pub async fn record_qr_code(&self, id: &str, qr_code: &str) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE invoices SET qr_code = ?2
            WHERE id = ?1 AND signature IS NOT NULL AND qr_code IS NULL
            "#,
        )
        .bind(id)
        .bind(qr_code)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Invoice (signed, without QR)", id));
        }

        debug!(id = %id, "Invoice QR code recorded");
        Ok(())
    }

    /// Gets an invoice by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Invoice>> {
        let row = sqlx::query_as::<_, InvoiceRow>(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => self.with_sales(row).await.map(Some),
            None => Ok(None),
        }
    }

    /// Gets an invoice by its number.
    pub async fn get_by_number(&self, invoice_number: i64) -> DbResult<Option<Invoice>> {
        let row = sqlx::query_as::<_, InvoiceRow>(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE invoice_number = ?1"
        ))
        .bind(invoice_number)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => self.with_sales(row).await.map(Some),
            None => Ok(None),
        }
    }

    /// The invoice with the highest number, i.e. the next one's predecessor.
    pub async fn find_predecessor(&self) -> DbResult<Option<Invoice>> {
        let row = sqlx::query_as::<_, InvoiceRow>(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices ORDER BY invoice_number DESC LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => self.with_sales(row).await.map(Some),
            None => Ok(None),
        }
    }

    /// Every invoice in ascending number order.
    pub async fn list_by_number(&self) -> DbResult<Vec<Invoice>> {
        let rows = sqlx::query_as::<_, InvoiceRow>(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices ORDER BY invoice_number"
        ))
        .fetch_all(&self.pool)
        .await?;

        let links: Vec<(String, String)> = sqlx::query_as(
            "SELECT invoice_id, sale_id FROM invoice_sales ORDER BY invoice_id, position",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut sales_by_invoice: HashMap<String, Vec<String>> = HashMap::new();
        for (invoice_id, sale_id) in links {
            sales_by_invoice.entry(invoice_id).or_default().push(sale_id);
        }

        rows.into_iter()
            .map(|row| {
                let sale_ids = sales_by_invoice.remove(&row.id).unwrap_or_default();
                row.into_invoice(sale_ids)
            })
            .collect()
    }

    /// Counts invoices.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM invoices")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn with_sales(&self, row: InvoiceRow) -> DbResult<Invoice> {
        let sale_ids: Vec<String> = sqlx::query_scalar(
            "SELECT sale_id FROM invoice_sales WHERE invoice_id = ?1 ORDER BY position",
        )
        .bind(&row.id)
        .fetch_all(&self.pool)
        .await?;

        row.into_invoice(sale_ids)
    }
}

/// Reads the predecessor of `invoice_number` inside the allocation transaction.
async fn predecessor_hash(
    conn: &mut SqliteConnection,
    invoice_number: i64,
) -> DbResult<Option<String>> {
    let predecessor: Option<(i64, Option<String>)> = sqlx::query_as(
        r#"
        SELECT invoice_number, current_invoice_hash
        FROM invoices
        ORDER BY invoice_number DESC
        LIMIT 1
        "#,
    )
    .fetch_optional(&mut *conn)
    .await?;

    match predecessor {
        None if invoice_number == FIRST_INVOICE_NUMBER => Ok(None),
        None => Err(CoreError::chain(
            invoice_number,
            "sequence is past the first number but no invoice exists",
        )
        .into()),
        Some((number, _)) if number + 1 != invoice_number => Err(CoreError::chain(
            invoice_number,
            format!("sequence does not follow last stored invoice {number}"),
        )
        .into()),
        Some((number, None)) => {
            Err(CoreError::chain(number, "predecessor has no hash yet").into())
        }
        Some((_, Some(hash))) => Ok(Some(hash)),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
