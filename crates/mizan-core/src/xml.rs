//! # UBL 2.1 Invoice XML
//!
//! Renders a populated invoice as a UBL 2.1 `Invoice` document, with or
//! without the Phase-2 security extensions.
//!
//! ## Document Shape
//! ```text
//! <Invoice xmlns=… xmlns:cac=… xmlns:cbc=… xmlns:ext=… [xmlns:ds=… xmlns:sac=…]>
//!   [ext:UBLExtensions]                  Phase-2 only, always the first child
//!     ext:UBLExtension  → sac:SignedProperties/sac:SigningTime
//!     ext:UBLExtension  → ds:Signature (SignedInfo, SignatureValue, KeyInfo)
//!     ext:UBLExtension  → sac:InvoiceReference (UUID, hashes, Signature, QRCode)
//!   cbc:UBLVersionID … cbc:DocumentCurrencyCode
//!   cac:AccountingSupplierParty
//!   [cac:AccountingCustomerParty]        only when a name or TRN is known
//!   cac:TaxTotal                         one Standard-rate subtotal
//!   cac:LegalMonetaryTotal
//!   cac:InvoiceLine × N                  one per sale, invoice order
//! </Invoice>
//! ```
//!
//! Every amount is rendered from [`Money`] with two decimals and a
//! `currencyID` attribute. Text and attribute values are escaped by the
//! serializer.

use chrono::SecondsFormat;
use quick_xml::se::{SeError, Serializer as QuickXmlSerializer};
use serde::ser::{Serialize, SerializeStruct, Serializer};
use thiserror::Error;

use crate::chain::Phase2Artifacts;
use crate::money::Money;
use crate::signing::pem_body;
use crate::types::{Customer, InvoiceDocument, Settings};

pub const INVOICE_NS: &str = "urn:oasis:names:specification:ubl:schema:xsd:Invoice-2";
pub const CAC_NS: &str =
    "urn:oasis:names:specification:ubl:schema:xsd:CommonAggregateComponents-2";
pub const CBC_NS: &str = "urn:oasis:names:specification:ubl:schema:xsd:CommonBasicComponents-2";
pub const EXT_NS: &str =
    "urn:oasis:names:specification:ubl:schema:xsd:CommonExtensionComponents-2";
pub const DS_NS: &str = "http://www.w3.org/2000/09/xmldsig#";
pub const SAC_NS: &str =
    "urn:oasis:names:specification:ubl:schema:xsd:AdditionalAggregateComponents-2";

pub const C14N_ALGORITHM: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
pub const ECDSA_SHA256_ALGORITHM: &str = "http://www.w3.org/2001/04/xmldsig-more#ecdsa-sha256";

/// UN/ECE rec 20 unit code used on every line.
pub const UNIT_CODE: &str = "EA";

/// VAT category of every line (Standard rate).
const STANDARD_CATEGORY: &str = "S";

/// XML rendering error.
#[derive(Debug, Error)]
pub enum XmlError {
    #[error("failed to serialize invoice to XML: {source}")]
    Serialize {
        #[from]
        source: SeError,
    },

    #[error("sale {sale_id} on invoice {invoice_number} has quantity {quantity}")]
    InvalidQuantity {
        invoice_number: i64,
        sale_id: String,
        quantity: i64,
    },
}

/// Renders the Phase-1 document (no extensions).
pub fn build_invoice_xml(
    document: &InvoiceDocument,
    settings: &Settings,
    customer: Option<&Customer>,
) -> Result<String, XmlError> {
    render(InvoiceXml::new(document, settings, customer, None)?)
}

/// Renders the Phase-2 document with the signing, signature and
/// invoice-reference extensions.
pub fn build_invoice_xml_phase2(
    document: &InvoiceDocument,
    artifacts: &Phase2Artifacts,
    settings: &Settings,
    customer: Option<&Customer>,
) -> Result<String, XmlError> {
    render(InvoiceXml::new(document, settings, customer, Some(artifacts))?)
}

fn render(invoice: InvoiceXml<'_>) -> Result<String, XmlError> {
    let mut buffer = String::with_capacity(4096);
    buffer.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    buffer.push('\n');

    {
        let mut serializer = QuickXmlSerializer::new(&mut buffer);
        serializer.indent(' ', 2);
        invoice.serialize(serializer)?;
    }

    Ok(buffer)
}

// =============================================================================
// Leaf helpers
// =============================================================================

struct CurrencyAmount<'a> {
    currency: &'a str,
    amount: Money,
}

fn amount(currency: &str, amount: Money) -> CurrencyAmount<'_> {
    CurrencyAmount { currency, amount }
}

impl Serialize for CurrencyAmount<'_> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("amount", 2)?;
        st.serialize_field("@currencyID", self.currency)?;
        st.serialize_field("$text", &self.amount.to_string())?;
        st.end()
    }
}

struct Quantity(i64);

impl Serialize for Quantity {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("cbc:InvoicedQuantity", 2)?;
        st.serialize_field("@unitCode", UNIT_CODE)?;
        st.serialize_field("$text", &self.0.to_string())?;
        st.end()
    }
}

/// An element whose only content is an `Algorithm` attribute.
struct Algorithm(&'static str);

impl Serialize for Algorithm {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("algorithm", 1)?;
        st.serialize_field("@Algorithm", self.0)?;
        st.end()
    }
}

/// An element with a single named child.
struct Wrap<T> {
    child: &'static str,
    value: T,
}

fn wrap<T: Serialize>(child: &'static str, value: T) -> Wrap<T> {
    Wrap { child, value }
}

impl<T: Serialize> Serialize for Wrap<T> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("wrap", 1)?;
        st.serialize_field(self.child, &self.value)?;
        st.end()
    }
}

// =============================================================================
// Parties
// =============================================================================

struct TaxSchemeXml;

impl Serialize for TaxSchemeXml {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("cac:TaxScheme", 1)?;
        st.serialize_field("cbc:ID", "VAT")?;
        st.end()
    }
}

struct PartyTaxSchemeXml<'a>(&'a str);

impl Serialize for PartyTaxSchemeXml<'_> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("cac:PartyTaxScheme", 2)?;
        st.serialize_field("cbc:CompanyID", self.0)?;
        st.serialize_field("cac:TaxScheme", &TaxSchemeXml)?;
        st.end()
    }
}

struct PostalAddressXml<'a> {
    street: Option<&'a str>,
    telephone: Option<&'a str>,
}

impl Serialize for PostalAddressXml<'_> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("cac:PostalAddress", 2)?;
        if let Some(street) = self.street {
            st.serialize_field("cbc:StreetName", street)?;
        }
        if let Some(telephone) = self.telephone {
            st.serialize_field("cbc:Telephone", telephone)?;
        }
        st.end()
    }
}

fn non_empty(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

struct SupplierPartyXml<'a>(&'a Settings);

impl Serialize for SupplierPartyXml<'_> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let seller = self.0;
        let mut st = s.serialize_struct("cac:Party", 3)?;
        st.serialize_field("cac:PartyName", &wrap("cbc:Name", seller.shop_name.as_str()))?;
        st.serialize_field("cac:PartyTaxScheme", &PartyTaxSchemeXml(&seller.trn))?;
        st.serialize_field(
            "cac:PostalAddress",
            &PostalAddressXml {
                street: non_empty(&seller.address),
                telephone: non_empty(&seller.phone),
            },
        )?;
        st.end()
    }
}

struct CustomerPartyXml<'a>(&'a Customer);

impl Serialize for CustomerPartyXml<'_> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let customer = self.0;
        let mut st = s.serialize_struct("cac:Party", 3)?;
        if let Some(name) = customer.name.as_deref() {
            st.serialize_field("cac:PartyName", &wrap("cbc:Name", name))?;
        }
        if let Some(trn) = customer.trn.as_deref() {
            st.serialize_field("cac:PartyTaxScheme", &PartyTaxSchemeXml(trn))?;
        }
        if let Some(address) = customer.address.as_deref().and_then(non_empty) {
            st.serialize_field(
                "cac:PostalAddress",
                &PostalAddressXml {
                    street: Some(address),
                    telephone: None,
                },
            )?;
        }
        st.end()
    }
}

// =============================================================================
// Totals
// =============================================================================

struct TaxTotalXml<'a> {
    currency: &'a str,
    taxable: Money,
    tax: Money,
}

impl Serialize for TaxTotalXml<'_> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("cac:TaxTotal", 2)?;
        st.serialize_field("cbc:TaxAmount", &amount(self.currency, self.tax))?;
        st.serialize_field("cac:TaxSubtotal", &TaxSubtotalXml(self))?;
        st.end()
    }
}

struct TaxSubtotalXml<'a, 'b>(&'b TaxTotalXml<'a>);

impl Serialize for TaxSubtotalXml<'_, '_> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let total = self.0;
        let mut st = s.serialize_struct("cac:TaxSubtotal", 3)?;
        st.serialize_field("cbc:TaxableAmount", &amount(total.currency, total.taxable))?;
        st.serialize_field("cbc:TaxAmount", &amount(total.currency, total.tax))?;
        st.serialize_field("cac:TaxCategory", &TaxCategoryXml)?;
        st.end()
    }
}

struct TaxCategoryXml;

impl Serialize for TaxCategoryXml {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("cac:TaxCategory", 2)?;
        st.serialize_field("cbc:ID", STANDARD_CATEGORY)?;
        st.serialize_field("cac:TaxScheme", &TaxSchemeXml)?;
        st.end()
    }
}

struct LegalMonetaryTotalXml<'a> {
    currency: &'a str,
    net: Money,
    total: Money,
}

impl Serialize for LegalMonetaryTotalXml<'_> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("cac:LegalMonetaryTotal", 4)?;
        st.serialize_field("cbc:LineExtensionAmount", &amount(self.currency, self.net))?;
        st.serialize_field("cbc:TaxExclusiveAmount", &amount(self.currency, self.net))?;
        st.serialize_field("cbc:TaxInclusiveAmount", &amount(self.currency, self.total))?;
        st.serialize_field("cbc:PayableAmount", &amount(self.currency, self.total))?;
        st.end()
    }
}

// =============================================================================
// Lines
// =============================================================================

struct LineXml<'a> {
    position: usize,
    currency: &'a str,
    quantity: i64,
    net: Money,
    vat: Money,
    unit_price: Money,
    description: &'a str,
    item_id: &'a str,
}

struct ItemXml<'a> {
    description: &'a str,
    item_id: &'a str,
}

impl Serialize for ItemXml<'_> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("cac:Item", 2)?;
        st.serialize_field("cbc:Description", self.description)?;
        st.serialize_field("cac:SellersItemIdentification", &wrap("cbc:ID", self.item_id))?;
        st.end()
    }
}

impl Serialize for LineXml<'_> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("cac:InvoiceLine", 6)?;
        st.serialize_field("cbc:ID", &self.position.to_string())?;
        st.serialize_field("cbc:InvoicedQuantity", &Quantity(self.quantity))?;
        st.serialize_field("cbc:LineExtensionAmount", &amount(self.currency, self.net))?;
        st.serialize_field(
            "cac:Item",
            &ItemXml {
                description: self.description,
                item_id: self.item_id,
            },
        )?;
        st.serialize_field(
            "cac:Price",
            &wrap("cbc:PriceAmount", amount(self.currency, self.unit_price)),
        )?;
        st.serialize_field(
            "cac:TaxTotal",
            &TaxTotalXml {
                currency: self.currency,
                taxable: self.net,
                tax: self.vat,
            },
        )?;
        st.end()
    }
}

// =============================================================================
// Phase-2 extensions
// =============================================================================

struct SignedInfoXml;

impl Serialize for SignedInfoXml {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("ds:SignedInfo", 2)?;
        st.serialize_field("ds:CanonicalizationMethod", &Algorithm(C14N_ALGORITHM))?;
        st.serialize_field("ds:SignatureMethod", &Algorithm(ECDSA_SHA256_ALGORITHM))?;
        st.end()
    }
}

struct SignatureXml<'a> {
    signature: &'a str,
    certificate: String,
}

impl Serialize for SignatureXml<'_> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("ds:Signature", 3)?;
        st.serialize_field("ds:SignedInfo", &SignedInfoXml)?;
        st.serialize_field("ds:SignatureValue", self.signature)?;
        st.serialize_field(
            "ds:KeyInfo",
            &wrap(
                "ds:X509Data",
                wrap("ds:X509Certificate", self.certificate.as_str()),
            ),
        )?;
        st.end()
    }
}

struct InvoiceReferenceXml<'a>(&'a Phase2Artifacts);

impl Serialize for InvoiceReferenceXml<'_> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let artifacts = self.0;
        let mut st = s.serialize_struct("sac:InvoiceReference", 5)?;
        st.serialize_field("sac:UUID", artifacts.uuid.as_str())?;
        st.serialize_field(
            "sac:PreviousInvoiceHash",
            artifacts.previous_invoice_hash.as_deref().unwrap_or(""),
        )?;
        st.serialize_field("sac:CurrentInvoiceHash", artifacts.current_invoice_hash.as_str())?;
        st.serialize_field("sac:Signature", artifacts.signature.as_str())?;
        st.serialize_field("sac:QRCode", artifacts.qr_code.as_str())?;
        st.end()
    }
}

struct ExtensionsXml<'a> {
    signing_time: String,
    artifacts: &'a Phase2Artifacts,
}

impl Serialize for ExtensionsXml<'_> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let content = "ext:ExtensionContent";
        let mut st = s.serialize_struct("ext:UBLExtensions", 3)?;
        st.serialize_field(
            "ext:UBLExtension",
            &wrap(
                content,
                wrap(
                    "sac:SignedProperties",
                    wrap("sac:SigningTime", self.signing_time.as_str()),
                ),
            ),
        )?;
        st.serialize_field(
            "ext:UBLExtension",
            &wrap(
                content,
                wrap(
                    "ds:Signature",
                    SignatureXml {
                        signature: &self.artifacts.signature,
                        certificate: pem_body(&self.artifacts.public_key),
                    },
                ),
            ),
        )?;
        st.serialize_field(
            "ext:UBLExtension",
            &wrap(
                content,
                wrap("sac:InvoiceReference", InvoiceReferenceXml(self.artifacts)),
            ),
        )?;
        st.end()
    }
}

// =============================================================================
// Document
// =============================================================================

struct InvoiceXml<'a> {
    document: &'a InvoiceDocument,
    settings: &'a Settings,
    customer: Option<&'a Customer>,
    phase2: Option<&'a Phase2Artifacts>,
    lines: Vec<LineXml<'a>>,
}

impl<'a> InvoiceXml<'a> {
    fn new(
        document: &'a InvoiceDocument,
        settings: &'a Settings,
        customer: Option<&'a Customer>,
        phase2: Option<&'a Phase2Artifacts>,
    ) -> Result<Self, XmlError> {
        let currency = document.currency.as_str();
        let lines = document
            .lines
            .iter()
            .enumerate()
            .map(|(index, line)| {
                let sale = &line.sale;
                let unit_price = sale.total_with_vat().divide_rounded(sale.quantity).ok_or_else(|| {
                    XmlError::InvalidQuantity {
                        invoice_number: document.invoice.invoice_number,
                        sale_id: sale.id.clone(),
                        quantity: sale.quantity,
                    }
                })?;

                Ok(LineXml {
                    position: index + 1,
                    currency,
                    quantity: sale.quantity,
                    net: sale.net_amount(),
                    vat: sale.vat_amount(),
                    unit_price,
                    description: non_empty(&line.product_name).unwrap_or("Item"),
                    item_id: &sale.product_id,
                })
            })
            .collect::<Result<Vec<_>, XmlError>>()?;

        Ok(InvoiceXml {
            document,
            settings,
            customer: customer.filter(|c| c.is_renderable()),
            phase2,
            lines,
        })
    }
}

impl Serialize for InvoiceXml<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let invoice = &self.document.invoice;
        let currency = self.document.currency.as_str();
        let issue_date = invoice.created_at.format("%Y-%m-%d").to_string();
        let issue_time = invoice.created_at.format("%H:%M:%S").to_string();

        let mut root = serializer.serialize_struct("Invoice", 0)?;

        // ---- namespaces ----
        root.serialize_field("@xmlns", INVOICE_NS)?;
        root.serialize_field("@xmlns:cac", CAC_NS)?;
        root.serialize_field("@xmlns:cbc", CBC_NS)?;
        root.serialize_field("@xmlns:ext", EXT_NS)?;
        if self.phase2.is_some() {
            root.serialize_field("@xmlns:ds", DS_NS)?;
            root.serialize_field("@xmlns:sac", SAC_NS)?;
        }

        // ---- security extensions ----
        if let Some(artifacts) = self.phase2 {
            root.serialize_field(
                "ext:UBLExtensions",
                &ExtensionsXml {
                    signing_time: invoice.created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
                    artifacts,
                },
            )?;
        }

        // ---- header ----
        root.serialize_field("cbc:UBLVersionID", "2.1")?;
        root.serialize_field("cbc:CustomizationID", "urn:cen.eu:en16931:2017")?;
        root.serialize_field("cbc:ProfileID", "SaudiInvoice")?;
        root.serialize_field("cbc:ID", &invoice.invoice_number.to_string())?;
        root.serialize_field("cbc:CopyIndicator", &false)?;
        root.serialize_field("cbc:IssueDate", &issue_date)?;
        root.serialize_field("cbc:IssueTime", &issue_time)?;
        root.serialize_field("cbc:InvoiceTypeCode", "380")?;
        root.serialize_field("cbc:DocumentCurrencyCode", currency)?;

        // ---- parties ----
        root.serialize_field(
            "cac:AccountingSupplierParty",
            &wrap("cac:Party", SupplierPartyXml(self.settings)),
        )?;
        if let Some(customer) = self.customer {
            root.serialize_field(
                "cac:AccountingCustomerParty",
                &wrap("cac:Party", CustomerPartyXml(customer)),
            )?;
        }

        // ---- totals ----
        root.serialize_field(
            "cac:TaxTotal",
            &TaxTotalXml {
                currency,
                taxable: invoice.total_net_amount(),
                tax: invoice.total_vat_amount(),
            },
        )?;
        root.serialize_field(
            "cac:LegalMonetaryTotal",
            &LegalMonetaryTotalXml {
                currency,
                net: invoice.total_net_amount(),
                total: invoice.total_amount(),
            },
        )?;

        // ---- lines ----
        for line in &self.lines {
            root.serialize_field("cac:InvoiceLine", line)?;
        }

        root.end()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
