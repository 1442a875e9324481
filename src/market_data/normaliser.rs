// Convert raw fixed-width column text into typed values.
// Numeric columns are zero-padded unsigned integers; prices carry implied decimals.

use std::borrow::Cow;

use chrono::NaiveDate;

use crate::market_data::decoder::DecodeError;
use crate::market_data::layout::Field;

/// COTAHIST prices carry two implied fraction digits: `1050` means `10.50`.
pub const COTAHIST_PRICE_DECIMALS: u32 = 2;

pub struct Normaliser {
    pub price_scale: u64, // e.g. 100 => 2 implied decimal places
}

impl Normaliser {
    pub fn new(price_decimals: u32) -> Self {
        let price_scale = 10u64.saturating_pow(price_decimals);
        Self { price_scale }
    }

    /// Unsigned integer column divided by the price scale.
    pub fn price(&self, field: Field, raw: &str) -> Result<f64, DecodeError> {
        let cents = unsigned(field, raw)?;
        Ok(cents as f64 / self.price_scale as f64)
    }

    pub fn quantity(&self, field: Field, raw: &str) -> Result<i64, DecodeError> {
        let value = unsigned(field, raw)?;
        i64::try_from(value).map_err(|_| malformed_numeric(field, raw))
    }

    /// Monetary total, kept in the file's own units (no implied decimals applied).
    pub fn volume(&self, field: Field, raw: &str) -> Result<f64, DecodeError> {
        Ok(unsigned(field, raw)? as f64)
    }

    /// Exactly eight digits, `YYYYMMDD`, naming a real calendar day.
    pub fn date(&self, field: Field, raw: &str) -> Result<NaiveDate, DecodeError> {
        let bad = || DecodeError::MalformedDate {
            field,
            raw: raw.to_string(),
        };
        if raw.len() != 8 || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(bad());
        }
        let year: i32 = raw[0..4].parse().map_err(|_| bad())?;
        let month: u32 = raw[4..6].parse().map_err(|_| bad())?;
        let day: u32 = raw[6..8].parse().map_err(|_| bad())?;
        NaiveDate::from_ymd_opt(year, month, day).ok_or_else(bad)
    }

    pub fn text(&self, raw: &str) -> String {
        raw.trim().to_string()
    }
}

impl Default for Normaliser {
    fn default() -> Self {
        Self::new(COTAHIST_PRICE_DECIMALS)
    }
}

/// Decode a column's bytes. Legacy exchange files are Latin-1; anything that
/// is not valid UTF-8 is read byte-for-char.
pub fn column_text(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(s) => Cow::Borrowed(s),
        Err(_) => Cow::Owned(bytes.iter().map(|&b| char::from(b)).collect()),
    }
}

fn unsigned(field: Field, raw: &str) -> Result<u64, DecodeError> {
    let digits = raw.trim();
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed_numeric(field, raw));
    }
    digits.parse::<u64>().map_err(|_| malformed_numeric(field, raw))
}

fn malformed_numeric(field: Field, raw: &str) -> DecodeError {
    DecodeError::MalformedNumeric {
        field,
        raw: raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_price_applies_implied_decimals() {
        let n = Normaliser::default();
        assert_eq!(n.price(Field::Close, "000000001050").unwrap(), 10.50);
        assert_eq!(n.price(Field::Open, "0000000000000").unwrap(), 0.0);
        assert_eq!(n.price(Field::High, "0000000003855").unwrap(), 38.55);
    }

    #[test]
    fn test_price_rejects_non_digits() {
        let n = Normaliser::default();
        for raw in ["", "   ", "00000000-1050", "0000000010.50", "00000000ABCD"] {
            let err = n.price(Field::Close, raw).unwrap_err();
            assert_eq!(
                err,
                DecodeError::MalformedNumeric {
                    field: Field::Close,
                    raw: raw.to_string()
                }
            );
        }
    }

    #[test]
    fn test_quantity_and_volume() {
        let n = Normaliser::default();
        assert_eq!(n.quantity(Field::TradedQuantity, "000000000000012300").unwrap(), 12_300);
        assert_eq!(n.volume(Field::FinancialVolume, "000000000150000000").unwrap(), 150_000_000.0);
        assert!(n.quantity(Field::TradedQuantity, "999999999999999999999").is_err());
    }

    #[test]
    fn test_date_parses_yyyymmdd() {
        let n = Normaliser::default();
        assert_eq!(
            n.date(Field::TradeDate, "20250102").unwrap(),
            NaiveDate::from_ymd_opt(2025, 1, 2).unwrap()
        );
    }

    #[test]
    fn test_date_rejects_wrong_shape_and_impossible_days() {
        let n = Normaliser::default();
        for raw in ["2025-01-02", "2025012", "202501021", "20250230", "20251301", "2025O102"] {
            assert!(
                matches!(n.date(Field::TradeDate, raw), Err(DecodeError::MalformedDate { .. })),
                "{raw} should not parse"
            );
        }
    }

    #[test]
    fn test_column_text_falls_back_to_latin1() {
        assert_eq!(column_text(b"PETROBRAS"), "PETROBRAS");
        // "SÃO" in ISO-8859-1
        assert_eq!(column_text(&[b'S', 0xC3, b'O']), "S\u{C3}O");
    }

    proptest! {
        #[test]
        fn prop_price_is_integer_over_scale(cents in 0u64..10_000_000_000_000) {
            let n = Normaliser::default();
            let raw = format!("{cents:013}");
            let price = n.price(Field::Close, &raw).unwrap();
            prop_assert!(price >= 0.0);
            prop_assert_eq!(price, cents as f64 / 100.0);
        }
    }
}
