//! # Domain Types
//!
//! Core domain types used throughout Mizan POS.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │      Sale       │   │    Invoice      │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │◄──│  product_id     │   │  invoice_number │       │
//! │  │  name, unit     │   │  quantity       │──►│  sale_ids[]     │       │
//! │  │  prices         │   │  net/vat/total  │   │  totals         │       │
//! │  └─────────────────┘   │  status         │   │  phase-2 fields │       │
//! │                        │  invoice_id     │   └─────────────────┘       │
//! │                        └─────────────────┘                              │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    TaxRate      │   │   SaleStatus    │   │    Settings     │       │
//! │  │  1500 = 15%     │   │  ACTIVE         │   │  shop_name, trn │       │
//! │  └─────────────────┘   │  CANCELLED      │   │  address, phone │       │
//! │                        └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! An invoice references its sales; it does not own them. Sales are recorded
//! first and attached to exactly one invoice when it is created.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::error::ValidationError;
use crate::money::Money;
use crate::validation::{
    validate_price_halalas, validate_product_name, validate_quantity, validate_uuid,
    validate_weight_grams, ValidationResult,
};
use crate::STANDARD_VAT_RATE_BPS;

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate represented in basis points (bps).
///
/// 1 basis point = 0.01%, so the Saudi standard rate of 15% is 1500 bps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    /// Creates a tax rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// The KSA standard VAT rate (15%).
    #[inline]
    pub const fn standard() -> Self {
        TaxRate(STANDARD_VAT_RATE_BPS)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::standard()
    }
}

// =============================================================================
// Product
// =============================================================================

/// How a product is sold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "UPPERCASE"))]
#[ts(export)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProductUnit {
    /// Sold by weight; `weight_grams` is mandatory.
    Weight,
    /// Sold per piece.
    Piece,
}

/// A product available for sale.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Display name, also used as the UBL item description.
    pub name: String,

    pub unit: ProductUnit,

    /// Weight in grams, required when `unit` is `WEIGHT`.
    pub weight_grams: Option<i64>,

    /// Purchase price per unit in halalas (pre-VAT).
    pub purchase_price_halalas: i64,

    /// Selling price per unit in halalas (VAT-inclusive).
    pub selling_price_halalas: i64,

    pub stock: i64,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Builds a new product with a fresh id, validating every field.
    pub fn new(
        name: impl Into<String>,
        unit: ProductUnit,
        weight_grams: Option<i64>,
        purchase_price: Money,
        selling_price: Money,
        stock: i64,
    ) -> ValidationResult<Self> {
        let name = name.into();
        validate_product_name(&name)?;
        validate_price_halalas("purchase_price", purchase_price.halalas())?;
        validate_price_halalas("selling_price", selling_price.halalas())?;

        match (unit, weight_grams) {
            (ProductUnit::Weight, None) => {
                return Err(ValidationError::Required {
                    field: "weight".to_string(),
                })
            }
            (_, Some(grams)) => validate_weight_grams(grams)?,
            (ProductUnit::Piece, None) => {}
        }

        let now = Utc::now();
        Ok(Product {
            id: Uuid::new_v4().to_string(),
            name: name.trim().to_string(),
            unit,
            weight_grams,
            purchase_price_halalas: purchase_price.halalas(),
            selling_price_halalas: selling_price.halalas(),
            stock,
            created_at: now,
            updated_at: now,
        })
    }

    #[inline]
    pub fn purchase_price(&self) -> Money {
        Money::from_halalas(self.purchase_price_halalas)
    }

    #[inline]
    pub fn selling_price(&self) -> Money {
        Money::from_halalas(self.selling_price_halalas)
    }
}

// =============================================================================
// Sale Status
// =============================================================================

/// The status of a recorded sale.
///
/// Deleting a sale is a soft flip to `Cancelled`; cancelled sales are
/// excluded from listings and can never be aggregated into an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "UPPERCASE"))]
#[ts(export)]
#[serde(rename_all = "UPPERCASE")]
pub enum SaleStatus {
    Active,
    Cancelled,
}

impl Default for SaleStatus {
    fn default() -> Self {
        SaleStatus::Active
    }
}

impl std::fmt::Display for SaleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SaleStatus::Active => write!(f, "ACTIVE"),
            SaleStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

// =============================================================================
// Sale Amounts
// =============================================================================

/// Amounts derived from price, quantity and VAT rate.
///
/// ## Derivation
/// ```text
/// total_with_vat = selling_price × quantity
/// net_amount     = round_half_up(total_with_vat / (1 + rate))
/// vat_amount     = total_with_vat - net_amount
/// profit         = net_amount - purchase_price × quantity
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaleAmounts {
    pub net_amount: Money,
    pub vat_amount: Money,
    pub total_with_vat: Money,
    pub profit: Money,
}

impl SaleAmounts {
    pub fn compute(
        selling_price: Money,
        purchase_price: Money,
        quantity: i64,
        rate: TaxRate,
    ) -> Self {
        let total_with_vat = selling_price.multiply_quantity(quantity);
        let (net_amount, vat_amount) = total_with_vat.split_inclusive(rate);
        let profit = net_amount - purchase_price.multiply_quantity(quantity);

        SaleAmounts {
            net_amount,
            vat_amount,
            total_with_vat,
            profit,
        }
    }
}

// =============================================================================
// Sale
// =============================================================================

/// Input for recording a sale.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct NewSale {
    pub product_id: String,
    pub weight_grams: i64,
    pub quantity: i64,
    /// VAT-inclusive unit price in halalas.
    pub selling_price_halalas: i64,
    /// Pre-VAT unit cost in halalas.
    pub purchase_price_halalas: i64,
}

impl NewSale {
    /// Builds a sale for `product` using its current prices.
    pub fn for_product(product: &Product, quantity: i64) -> Self {
        NewSale {
            product_id: product.id.clone(),
            weight_grams: product.weight_grams.unwrap_or(0) * quantity,
            quantity,
            selling_price_halalas: product.selling_price_halalas,
            purchase_price_halalas: product.purchase_price_halalas,
        }
    }

    /// Validates the input and derives every amount at the standard rate.
    pub fn into_sale(self) -> ValidationResult<Sale> {
        validate_uuid(&self.product_id)?;
        validate_quantity(self.quantity)?;
        validate_price_halalas("selling_price", self.selling_price_halalas)?;
        validate_price_halalas("purchase_price", self.purchase_price_halalas)?;
        if self.weight_grams < 0 {
            return Err(ValidationError::OutOfRange {
                field: "weight".to_string(),
                min: 0,
                max: i64::MAX,
            });
        }

        let rate = TaxRate::standard();
        let amounts = SaleAmounts::compute(
            Money::from_halalas(self.selling_price_halalas),
            Money::from_halalas(self.purchase_price_halalas),
            self.quantity,
            rate,
        );

        let now = Utc::now().trunc_subsecs(3);
        Ok(Sale {
            id: Uuid::new_v4().to_string(),
            product_id: self.product_id,
            weight_grams: self.weight_grams,
            quantity: self.quantity,
            selling_price_halalas: self.selling_price_halalas,
            purchase_price_halalas: self.purchase_price_halalas,
            net_amount_halalas: amounts.net_amount.halalas(),
            vat_rate_bps: rate.bps(),
            vat_amount_halalas: amounts.vat_amount.halalas(),
            total_with_vat_halalas: amounts.total_with_vat.halalas(),
            profit_halalas: amounts.profit.halalas(),
            invoice_id: None,
            status: SaleStatus::Active,
            created_at: now,
            updated_at: now,
        })
    }
}

/// A recorded sale line.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Sale {
    pub id: String,
    pub product_id: String,
    pub weight_grams: i64,
    pub quantity: i64,
    pub selling_price_halalas: i64,
    pub purchase_price_halalas: i64,
    pub net_amount_halalas: i64,
    pub vat_rate_bps: u32,
    pub vat_amount_halalas: i64,
    pub total_with_vat_halalas: i64,
    pub profit_halalas: i64,
    /// Set once the sale is aggregated into an invoice.
    pub invoice_id: Option<String>,
    pub status: SaleStatus,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Sale {
    #[inline]
    pub fn net_amount(&self) -> Money {
        Money::from_halalas(self.net_amount_halalas)
    }

    #[inline]
    pub fn vat_amount(&self) -> Money {
        Money::from_halalas(self.vat_amount_halalas)
    }

    #[inline]
    pub fn total_with_vat(&self) -> Money {
        Money::from_halalas(self.total_with_vat_halalas)
    }

    #[inline]
    pub fn profit(&self) -> Money {
        Money::from_halalas(self.profit_halalas)
    }

    #[inline]
    pub fn vat_rate(&self) -> TaxRate {
        TaxRate::from_bps(self.vat_rate_bps)
    }

    /// A sale can join a new invoice only while it is active and unattached.
    pub fn is_invoiceable(&self) -> bool {
        self.status == SaleStatus::Active && self.invoice_id.is_none()
    }
}

// =============================================================================
// Settings
// =============================================================================

/// The seller profile. There is exactly one per deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub shop_name: String,
    /// 15-digit VAT registration number.
    pub trn: String,
    pub address: String,
    pub phone: String,
}

// =============================================================================
// Customer
// =============================================================================

/// Optional buyer details rendered as `cac:AccountingCustomerParty`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Customer {
    pub name: Option<String>,
    pub trn: Option<String>,
    pub address: Option<String>,
}

impl Customer {
    /// A customer known only by name, as captured at invoice creation.
    pub fn named(name: Option<&str>) -> Self {
        Customer {
            name: name
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string),
            ..Customer::default()
        }
    }

    /// The customer party is rendered only when a name or TRN is known.
    pub fn is_renderable(&self) -> bool {
        self.name.is_some() || self.trn.is_some()
    }
}

// =============================================================================
// Invoice
// =============================================================================

/// A stored invoice in the chain.
///
/// ## Field Lifecycle
/// ```text
/// created (one transaction)   hashed          signed           finalized
/// ─────────────────────────   ─────────────   ──────────────   ─────────
/// invoice_number              uuid            signature        qr_code
/// sale_ids, totals            current_hash    public_key
/// customer_name, created_at
/// previous_invoice_hash
/// ```
/// Every field is written at most once. See [`crate::chain`] for the typed
/// stages built on top of this row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: String,
    pub invoice_number: i64,
    /// Sale ids in invoice order.
    pub sale_ids: Vec<String>,
    pub total_net_amount_halalas: i64,
    pub total_vat_amount_halalas: i64,
    pub total_amount_halalas: i64,
    pub total_profit_halalas: i64,
    pub customer_name: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    pub uuid: Option<String>,
    pub previous_invoice_hash: Option<String>,
    pub current_invoice_hash: Option<String>,
    pub signature: Option<String>,
    pub public_key: Option<String>,
    pub qr_code: Option<String>,
}

impl Invoice {
    #[inline]
    pub fn total_net_amount(&self) -> Money {
        Money::from_halalas(self.total_net_amount_halalas)
    }

    #[inline]
    pub fn total_vat_amount(&self) -> Money {
        Money::from_halalas(self.total_vat_amount_halalas)
    }

    #[inline]
    pub fn total_amount(&self) -> Money {
        Money::from_halalas(self.total_amount_halalas)
    }

    #[inline]
    pub fn total_profit(&self) -> Money {
        Money::from_halalas(self.total_profit_halalas)
    }

    /// True once hash, signature and QR code are all present.
    pub fn is_finalized(&self) -> bool {
        self.current_invoice_hash.is_some() && self.signature.is_some() && self.qr_code.is_some()
    }
}

/// One rendered line: the sale plus the product label.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InvoiceLine {
    pub sale: Sale,
    pub product_name: String,
}

/// An invoice with its sale lines populated, ready for XML rendering.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InvoiceDocument {
    pub invoice: Invoice,
    pub lines: Vec<InvoiceLine>,
    /// ISO 4217 code, `SAR` unless configured otherwise.
    pub currency: String,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn product_id() -> String {
        Uuid::new_v4().to_string()
    }

    #[test]
    fn test_tax_rate_standard() {
        let rate = TaxRate::standard();
        assert_eq!(rate.bps(), 1500);
        assert!((rate.percentage() - 15.0).abs() < 0.001);
    }

    #[test]
    fn test_sale_status_default() {
        assert_eq!(SaleStatus::default(), SaleStatus::Active);
        assert_eq!(SaleStatus::Cancelled.to_string(), "CANCELLED");
    }

    #[test]
    fn test_sale_amounts_derivation() {
        let amounts = SaleAmounts::compute(
            Money::from_halalas(11500),
            Money::from_halalas(6000),
            2,
            TaxRate::standard(),
        );
        assert_eq!(amounts.total_with_vat.halalas(), 23000);
        assert_eq!(amounts.net_amount.halalas(), 20000);
        assert_eq!(amounts.vat_amount.halalas(), 3000);
        assert_eq!(amounts.profit.halalas(), 8000);
    }

    #[test]
    fn test_new_sale_into_sale() {
        let sale = NewSale {
            product_id: product_id(),
            weight_grams: 0,
            quantity: 1,
            selling_price_halalas: 11500,
            purchase_price_halalas: 7000,
        }
        .into_sale()
        .unwrap();

        assert_eq!(sale.status, SaleStatus::Active);
        assert!(sale.invoice_id.is_none());
        assert!(sale.is_invoiceable());
        assert_eq!(sale.net_amount().to_string(), "100.00");
        assert_eq!(sale.vat_amount().to_string(), "15.00");
        assert_eq!(sale.profit().to_string(), "30.00");
        assert_eq!(sale.vat_rate_bps, 1500);
    }

    #[test]
    fn test_new_sale_rejects_bad_input() {
        let base = NewSale {
            product_id: product_id(),
            weight_grams: 0,
            quantity: 1,
            selling_price_halalas: 100,
            purchase_price_halalas: 50,
        };

        let mut zero_qty = base.clone();
        zero_qty.quantity = 0;
        assert!(zero_qty.into_sale().is_err());

        let mut negative_price = base.clone();
        negative_price.selling_price_halalas = -1;
        assert!(negative_price.into_sale().is_err());

        let mut bad_product = base;
        bad_product.product_id = "not-a-uuid".to_string();
        assert!(bad_product.into_sale().is_err());
    }

    #[test]
    fn test_product_weight_rule() {
        assert!(Product::new(
            "Dates 1kg",
            ProductUnit::Weight,
            None,
            Money::from_halalas(1000),
            Money::from_halalas(2000),
            0
        )
        .is_err());

        let product = Product::new(
            "Dates 1kg",
            ProductUnit::Weight,
            Some(1000),
            Money::from_halalas(1000),
            Money::from_halalas(2000),
            5,
        )
        .unwrap();
        let new_sale = NewSale::for_product(&product, 3);
        assert_eq!(new_sale.weight_grams, 3000);
        assert_eq!(new_sale.selling_price_halalas, 2000);
    }

    #[test]
    fn test_customer_named() {
        assert!(Customer::named(Some("Acme")).is_renderable());
        assert!(!Customer::named(Some("   ")).is_renderable());
        assert!(!Customer::named(None).is_renderable());
    }
}
