//! # Sale Repository
//!
//! Database operations for sale lines.
//!
//! ## Sale Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sale Lifecycle                                    │
//! │                                                                         │
//! │  1. RECORD                                                             │
//! │     └── create(NewSale) → Sale { status: ACTIVE, invoice_id: None }    │
//! │                                                                         │
//! │  2a. INVOICE                                                           │
//! │     └── InvoiceRepository::allocate sets invoice_id (same tx)          │
//! │                                                                         │
//! │  2b. CANCEL (only while not invoiced)                                  │
//! │     └── cancel() → Sale { status: CANCELLED }                          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Invoiced sales are never modified again: no update here touches a row
//! whose `invoice_id` is set.

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use mizan_core::{CoreError, NewSale, Sale, SaleStatus, ValidationError};

const SALE_COLUMNS: &str = r#"
    id, product_id, weight_grams, quantity,
    selling_price_halalas, purchase_price_halalas,
    net_amount_halalas, vat_rate_bps, vat_amount_halalas,
    total_with_vat_halalas, profit_halalas,
    invoice_id, status, created_at, updated_at
"#;

/// Repository for sale database operations.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    /// Creates a new SaleRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Records a sale, deriving its VAT split and profit.
    ///
    /// ## Errors
    /// - `Domain` when the input fails validation
    /// - `ForeignKeyViolation` when the product does not exist
    pub async fn create(&self, new_sale: NewSale) -> DbResult<Sale> {
        let sale = new_sale.into_sale().map_err(CoreError::from)?;

        debug!(id = %sale.id, product_id = %sale.product_id, quantity = sale.quantity, "Recording sale");

        sqlx::query(
            r#"
            INSERT INTO sales (
                id, product_id, weight_grams, quantity,
                selling_price_halalas, purchase_price_halalas,
                net_amount_halalas, vat_rate_bps, vat_amount_halalas,
                total_with_vat_halalas, profit_halalas,
                invoice_id, status, created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4,
                ?5, ?6,
                ?7, ?8, ?9,
                ?10, ?11,
                ?12, ?13, ?14, ?15
            )
            "#,
        )
        .bind(&sale.id)
        .bind(&sale.product_id)
        .bind(sale.weight_grams)
        .bind(sale.quantity)
        .bind(sale.selling_price_halalas)
        .bind(sale.purchase_price_halalas)
        .bind(sale.net_amount_halalas)
        .bind(sale.vat_rate_bps)
        .bind(sale.vat_amount_halalas)
        .bind(sale.total_with_vat_halalas)
        .bind(sale.profit_halalas)
        .bind(&sale.invoice_id)
        .bind(sale.status)
        .bind(sale.created_at)
        .bind(sale.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(sale)
    }

    /// Gets a sale by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Sale>> {
        let sale = sqlx::query_as::<_, Sale>(&format!(
            "SELECT {SALE_COLUMNS} FROM sales WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(sale)
    }

    /// Loads the given sales in the order of `ids`.
    ///
    /// Ids with no matching row are skipped; callers compare lengths or
    /// look ids up to detect them.
    pub async fn get_many(&self, ids: &[String]) -> DbResult<Vec<Sale>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {SALE_COLUMNS} FROM sales WHERE id IN ("));
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(id.as_str());
        }
        separated.push_unseparated(")");

        let rows: Vec<Sale> = builder.build_query_as().fetch_all(&self.pool).await?;
        let mut by_id: HashMap<String, Sale> =
            rows.into_iter().map(|s| (s.id.clone(), s)).collect();

        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    /// Lists active sales, newest first. Cancelled sales are never listed.
    pub async fn list_active(&self) -> DbResult<Vec<Sale>> {
        let sales = sqlx::query_as::<_, Sale>(&format!(
            "SELECT {SALE_COLUMNS} FROM sales WHERE status = 'ACTIVE' ORDER BY created_at DESC, id"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(sales)
    }

    /// Lists active sales not yet attached to an invoice, oldest first.
    pub async fn list_uninvoiced(&self) -> DbResult<Vec<Sale>> {
        let sales = sqlx::query_as::<_, Sale>(&format!(
            r#"
            SELECT {SALE_COLUMNS} FROM sales
            WHERE status = 'ACTIVE' AND invoice_id IS NULL
            ORDER BY created_at, id
            "#
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(sales)
    }

    /// Soft-deletes a sale by flipping it to `CANCELLED`.
    ///
    /// ## Errors
    /// - `NotFound` for an unknown id
    /// - `Domain(SaleAlreadyInvoiced)` once the sale belongs to an invoice
    /// - `Domain(InvalidSaleStatus)` when it is already cancelled
    pub async fn cancel(&self, id: &str) -> DbResult<Sale> {
        let sale = self
            .get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Sale", id))?;

        if let Some(invoice_id) = sale.invoice_id {
            return Err(CoreError::SaleAlreadyInvoiced {
                sale_id: sale.id,
                invoice_id,
            }
            .into());
        }
        if sale.status == SaleStatus::Cancelled {
            return Err(CoreError::InvalidSaleStatus {
                sale_id: sale.id,
                current_status: sale.status.to_string(),
            }
            .into());
        }

        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE sales SET
                status = 'CANCELLED',
                updated_at = ?2
            WHERE id = ?1 AND status = 'ACTIVE' AND invoice_id IS NULL
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        // Invoiced or cancelled between the read and the update.
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Sale (active, uninvoiced)", id));
        }

        info!(sale_id = %id, "Sale cancelled");

        Ok(Sale {
            status: SaleStatus::Cancelled,
            updated_at: now,
            ..sale
        })
    }

    /// Links sales to an invoice inside the caller's transaction.
    ///
    /// Each update is guarded on `ACTIVE` and `invoice_id IS NULL`; a sale
    /// that was cancelled or invoiced after the draft was built fails the
    /// whole call, and the caller's transaction rolls back.
    pub async fn attach_to_invoice(
        conn: &mut SqliteConnection,
        invoice_id: &str,
        sale_ids: &[String],
    ) -> DbResult<()> {
        let now = Utc::now();

        for sale_id in sale_ids {
            let result = sqlx::query(
                r#"
                UPDATE sales SET
                    invoice_id = ?2,
                    updated_at = ?3
                WHERE id = ?1 AND status = 'ACTIVE' AND invoice_id IS NULL
                "#,
            )
            .bind(sale_id)
            .bind(invoice_id)
            .bind(now)
            .execute(&mut *conn)
            .await?;

            if result.rows_affected() == 0 {
                return Err(CoreError::from(ValidationError::Ineligible {
                    entity: "Sale".to_string(),
                    id: sale_id.clone(),
                    reason: "no longer active and uninvoiced".to_string(),
                })
                .into());
            }
        }

        debug!(invoice_id = %invoice_id, count = sale_ids.len(), "Sales attached");
        Ok(())
    }

    /// Counts sales in any status.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sales")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use mizan_core::{Money, Product, ProductUnit};

    async fn setup() -> (Database, Product) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = Product::new(
            "Arabic Coffee 250g",
            ProductUnit::Piece,
            None,
            Money::from_halalas(2000),
            Money::from_halalas(3450),
            40,
        )
        .unwrap();
        let product = db.products().insert(&product).await.unwrap();
        (db, product)
    }

    #[tokio::test]
    async fn test_create_derives_amounts() {
        let (db, product) = setup().await;
        let sale = db.sales().create(NewSale::for_product(&product, 2)).await.unwrap();

        let loaded = db.sales().get_by_id(&sale.id).await.unwrap().unwrap();
        assert_eq!(loaded.total_with_vat().to_string(), "69.00");
        assert_eq!(loaded.net_amount().to_string(), "60.00");
        assert_eq!(loaded.vat_amount().to_string(), "9.00");
        assert_eq!(loaded.profit().to_string(), "20.00");
        assert_eq!(loaded.status, SaleStatus::Active);
        assert_eq!(loaded.created_at, sale.created_at);
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_product() {
        let (db, product) = setup().await;
        let mut new_sale = NewSale::for_product(&product, 1);
        new_sale.product_id = uuid::Uuid::new_v4().to_string();

        assert!(matches!(
            db.sales().create(new_sale).await,
            Err(DbError::ForeignKeyViolation { .. })
        ));
    }

    #[tokio::test]
    async fn test_create_rejects_zero_quantity() {
        let (db, product) = setup().await;

        assert!(matches!(
            db.sales().create(NewSale::for_product(&product, 0)).await,
            Err(DbError::Domain(_))
        ));
        assert_eq!(db.sales().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_get_many_keeps_requested_order() {
        let (db, product) = setup().await;
        let a = db.sales().create(NewSale::for_product(&product, 1)).await.unwrap();
        let b = db.sales().create(NewSale::for_product(&product, 2)).await.unwrap();

        let ids = vec![b.id.clone(), "missing".to_string(), a.id.clone()];
        let sales = db.sales().get_many(&ids).await.unwrap();

        let loaded: Vec<&str> = sales.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(loaded, vec![b.id.as_str(), a.id.as_str()]);
    }

    #[tokio::test]
    async fn test_cancel_hides_sale_from_listing() {
        let (db, product) = setup().await;
        let keep = db.sales().create(NewSale::for_product(&product, 1)).await.unwrap();
        let unwanted = db.sales().create(NewSale::for_product(&product, 1)).await.unwrap();

        let cancelled = db.sales().cancel(&unwanted.id).await.unwrap();
        assert_eq!(cancelled.status, SaleStatus::Cancelled);

        let active = db.sales().list_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, keep.id);
        assert_eq!(db.sales().list_uninvoiced().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_twice_fails() {
        let (db, product) = setup().await;
        let sale = db.sales().create(NewSale::for_product(&product, 1)).await.unwrap();
        db.sales().cancel(&sale.id).await.unwrap();

        assert!(matches!(
            db.sales().cancel(&sale.id).await,
            Err(DbError::Domain(CoreError::InvalidSaleStatus { .. }))
        ));
        assert!(matches!(
            db.sales().cancel("missing").await,
            Err(DbError::NotFound { .. })
        ));
    }
}
