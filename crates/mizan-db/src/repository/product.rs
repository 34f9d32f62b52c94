//! # Product Repository
//!
//! The catalogue is only read by the invoice pipeline: sales carry their own
//! price snapshot, and the product name becomes the UBL item description.

use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::collections::HashMap;
use tracing::debug;

use crate::error::{DbError, DbResult};
use mizan_core::Product;

const PRODUCT_COLUMNS: &str = r#"
    id, name, unit, weight_grams,
    purchase_price_halalas, selling_price_halalas, stock,
    created_at, updated_at
"#;

/// Repository for product database operations.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Inserts a new product.
    pub async fn insert(&self, product: &Product) -> DbResult<Product> {
        debug!(id = %product.id, name = %product.name, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, name, unit, weight_grams,
                purchase_price_halalas, selling_price_halalas, stock,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(product.unit)
        .bind(product.weight_grams)
        .bind(product.purchase_price_halalas)
        .bind(product.selling_price_halalas)
        .bind(product.stock)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(product.clone())
    }

    /// Gets a product by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Gets a product by ID, failing when it does not exist.
    pub async fn get(&self, id: &str) -> DbResult<Product> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", id))
    }

    /// Maps product id to display name for the given ids.
    ///
    /// Unknown ids are simply absent from the map.
    pub async fn names_by_id(&self, ids: &[String]) -> DbResult<HashMap<String, String>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT id, name FROM products WHERE id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(id.as_str());
        }
        separated.push_unseparated(")");

        let rows: Vec<(String, String)> = builder.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().collect())
    }

    /// Lists every product ordered by name.
    pub async fn list(&self) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products ORDER BY name"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Counts products.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use mizan_core::{Money, ProductUnit};

    fn dates() -> Product {
        Product::new(
            "Ajwa Dates 1kg",
            ProductUnit::Weight,
            Some(1000),
            Money::from_halalas(3000),
            Money::from_halalas(4600),
            12,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db.products().insert(&dates()).await.unwrap();

        let loaded = db.products().get(&product.id).await.unwrap();
        assert_eq!(loaded.name, "Ajwa Dates 1kg");
        assert_eq!(loaded.unit, ProductUnit::Weight);
        assert_eq!(loaded.weight_grams, Some(1000));
        assert_eq!(loaded.selling_price().to_string(), "46.00");
        assert_eq!(db.products().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_get_missing_product() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        assert!(db.products().get_by_id("nope").await.unwrap().is_none());
        assert!(matches!(
            db.products().get("nope").await,
            Err(DbError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_names_by_id() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db.products().insert(&dates()).await.unwrap();

        let names = db
            .products()
            .names_by_id(&[product.id.clone(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(names.len(), 1);
        assert_eq!(names[&product.id], "Ajwa Dates 1kg");

        assert!(db.products().names_by_id(&[]).await.unwrap().is_empty());
    }
}
