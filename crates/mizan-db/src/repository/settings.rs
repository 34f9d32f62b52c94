//! # Settings Repository
//!
//! The seller profile lives in a single row (`id = 1`).

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::info;

use crate::error::DbResult;
use mizan_core::validation::validate_settings;
use mizan_core::{CoreError, Settings};

/// Repository for the seller profile.
#[derive(Debug, Clone)]
pub struct SettingsRepository {
    pool: SqlitePool,
}

impl SettingsRepository {
    /// Creates a new SettingsRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SettingsRepository { pool }
    }

    /// Returns the seller profile, if one has been saved.
    pub async fn get(&self) -> DbResult<Option<Settings>> {
        let settings = sqlx::query_as::<_, Settings>(
            "SELECT shop_name, trn, address, phone FROM settings WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(settings)
    }

    /// Creates the profile, or replaces it if one exists.
    ///
    /// Existing invoices are unaffected: their hash covers the invoice row
    /// only, and their QR code was fixed at finalization.
    pub async fn upsert(&self, settings: &Settings) -> DbResult<Settings> {
        validate_settings(settings).map_err(CoreError::from)?;

        sqlx::query(
            r#"
            INSERT INTO settings (id, shop_name, trn, address, phone, updated_at)
            VALUES (1, ?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                shop_name = excluded.shop_name,
                trn = excluded.trn,
                address = excluded.address,
                phone = excluded.phone,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(settings.shop_name.trim())
        .bind(settings.trn.trim())
        .bind(settings.address.trim())
        .bind(settings.phone.trim())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        info!(shop_name = %settings.shop_name, "Seller settings saved");

        Ok(Settings {
            shop_name: settings.shop_name.trim().to_string(),
            trn: settings.trn.trim().to_string(),
            address: settings.address.trim().to_string(),
            phone: settings.phone.trim().to_string(),
        })
    }
}
