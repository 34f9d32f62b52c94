//! # TLV QR Payload
//!
//! Encodes the five mandatory ZATCA QR fields as Tag-Length-Value records,
//! base64-encoded for embedding in a QR code.
//!
//! ## Wire Format
//! ```text
//! ┌──────┬────────┬───────────────────────┐
//! │ tag  │ length │ value (UTF-8 bytes)   │   repeated for tags 1..5
//! │ 1 B  │ 1 B    │ 0..=255 bytes         │
//! └──────┴────────┴───────────────────────┘
//!
//! tag 1  seller name           "Acme"
//! tag 2  VAT number (TRN)      "300000000000003"
//! tag 3  invoice timestamp     "2024-01-01T10:00:00Z"
//! tag 4  total incl. VAT       "115.00"
//! tag 5  VAT total             "15.00"
//! ```
//!
//! A value longer than 255 bytes cannot be length-prefixed in one byte and is
//! rejected before anything is encoded.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::ValidationError;
use crate::money::Money;
use crate::validation::ValidationResult;

/// Largest value a single TLV record can carry.
pub const MAX_TLV_VALUE_LEN: usize = u8::MAX as usize;

/// Field names per tag, used in validation errors.
const TAG_FIELDS: [&str; 5] = ["sellerName", "vatNumber", "timestamp", "totalAmount", "vatAmount"];

/// One decoded TLV record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlvRecord {
    pub tag: u8,
    pub value: String,
}

struct TlvBuilder {
    bytes: Vec<u8>,
}

impl TlvBuilder {
    fn with_capacity(capacity: usize) -> Self {
        TlvBuilder {
            bytes: Vec::with_capacity(capacity),
        }
    }

    fn push(&mut self, tag: u8, value: &str) {
        self.bytes.push(tag);
        self.bytes.push(value.len() as u8);
        self.bytes.extend_from_slice(value.as_bytes());
    }

    fn finish(self) -> String {
        STANDARD.encode(self.bytes)
    }
}

/// Formats an invoice timestamp for tag 3 (RFC 3339, seconds, `Z`).
pub fn qr_timestamp(created_at: &DateTime<Utc>) -> String {
    created_at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Builds the base64 TLV payload for tags 1 to 5.
///
/// ## Example
/// ```rust
/// use mizan_core::money::Money;
/// use mizan_core::tlv::{decode_tlv, encode_tlv};
///
/// let qr = encode_tlv(
///     "Acme",
///     "300000000000003",
///     "2024-01-01T10:00:00Z",
///     Money::from_halalas(11500),
///     Money::from_halalas(1500),
/// )
/// .unwrap();
///
/// let records = decode_tlv(&qr).unwrap();
/// assert_eq!(records[0].value, "Acme");
/// assert_eq!(records[3].value, "115.00");
/// ```
pub fn encode_tlv(
    seller_name: &str,
    trn: &str,
    timestamp_iso: &str,
    total_amount: Money,
    vat_amount: Money,
) -> ValidationResult<String> {
    let total = total_amount.to_string();
    let vat = vat_amount.to_string();
    let values: [&str; 5] = [seller_name, trn, timestamp_iso, &total, &vat];

    // Reject before encoding anything so a bad value never yields a partial payload.
    for (index, value) in values.iter().enumerate() {
        if value.len() > MAX_TLV_VALUE_LEN {
            return Err(ValidationError::EncodedTooLong {
                field: TAG_FIELDS[index].to_string(),
                len: value.len(),
                max: MAX_TLV_VALUE_LEN,
            });
        }
    }

    let capacity = values.iter().map(|v| v.len() + 2).sum();
    let mut tlv = TlvBuilder::with_capacity(capacity);
    for (index, value) in values.iter().enumerate() {
        tlv.push(index as u8 + 1, value);
    }

    Ok(tlv.finish())
}

/// Parses a base64 TLV payload back into its records.
///
/// Fails on invalid base64, truncated records or non-UTF-8 values.
pub fn decode_tlv(payload: &str) -> ValidationResult<Vec<TlvRecord>> {
    let invalid = |reason: String| ValidationError::InvalidFormat {
        field: "qrCode".to_string(),
        reason,
    };

    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| invalid(format!("not base64: {e}")))?;

    let mut records = Vec::new();
    let mut cursor = 0;
    while cursor < bytes.len() {
        if cursor + 2 > bytes.len() {
            return Err(invalid(format!("truncated record header at byte {cursor}")));
        }
        let tag = bytes[cursor];
        let len = bytes[cursor + 1] as usize;
        let start = cursor + 2;
        let end = start + len;
        if end > bytes.len() {
            return Err(invalid(format!("record {tag} declares {len} bytes past the end")));
        }

        let value = std::str::from_utf8(&bytes[start..end])
            .map_err(|e| invalid(format!("record {tag} is not UTF-8: {e}")))?
            .to_string();
        records.push(TlvRecord { tag, value });
        cursor = end;
    }

    Ok(records)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn acme() -> String {
        encode_tlv(
            "Acme",
            "300000000000003",
            "2024-01-01T10:00:00Z",
            Money::from_halalas(11500),
            Money::from_halalas(1500),
        )
        .unwrap()
    }

    #[test]
    fn test_round_trip_recovers_all_tags() {
        let records = decode_tlv(&acme()).unwrap();

        let tags: Vec<u8> = records.iter().map(|r| r.tag).collect();
        assert_eq!(tags, vec![1, 2, 3, 4, 5]);
        assert_eq!(records[0].value, "Acme");
        assert_eq!(records[1].value, "300000000000003");
        assert_eq!(records[2].value, "2024-01-01T10:00:00Z");
        assert_eq!(records[3].value, "115.00");
        assert_eq!(records[4].value, "15.00");
    }

    #[test]
    fn test_raw_layout() {
        let bytes = STANDARD.decode(acme()).unwrap();
        assert_eq!(&bytes[..6], &[1, 4, b'A', b'c', b'm', b'e']);
        assert_eq!(bytes[6], 2);
        assert_eq!(bytes[7], 15);
    }

    #[test]
    fn test_length_is_utf8_bytes() {
        let qr = encode_tlv(
            "متجر",
            "300000000000003",
            "2024-01-01T10:00:00Z",
            Money::zero(),
            Money::zero(),
        )
        .unwrap();
        let bytes = STANDARD.decode(&qr).unwrap();
        // four Arabic letters, two bytes each
        assert_eq!(bytes[1], 8);
        assert_eq!(decode_tlv(&qr).unwrap()[0].value, "متجر");
    }

    #[test]
    fn test_value_over_255_bytes_is_rejected() {
        let long_name = "x".repeat(256);
        let err = encode_tlv(
            &long_name,
            "300000000000003",
            "2024-01-01T10:00:00Z",
            Money::zero(),
            Money::zero(),
        )
        .unwrap_err();

        assert!(matches!(
            err,
            ValidationError::EncodedTooLong { len: 256, max: 255, .. }
        ));
    }

    #[test]
    fn test_value_of_exactly_255_bytes_is_accepted() {
        let name = "x".repeat(255);
        let qr = encode_tlv(&name, "1", "t", Money::zero(), Money::zero()).unwrap();
        assert_eq!(decode_tlv(&qr).unwrap()[0].value.len(), 255);
    }

    #[test]
    fn test_decode_rejects_truncated_payload() {
        let bytes = vec![1u8, 10, b'a', b'b'];
        assert!(decode_tlv(&STANDARD.encode(bytes)).is_err());
        assert!(decode_tlv("!!!not base64").is_err());
    }

    #[test]
    fn test_qr_timestamp_format() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        assert_eq!(qr_timestamp(&at), "2024-01-01T10:00:00Z");
    }
}
