//! Row validation
//!
//! Turns one raw CSV record into a [`ValidatedCandidate`] or a [`RowError`].
//! Header names are matched through a small alias table so that exports from
//! different tools (`sku`/`SKU`, `stock`/`stock_count`, ...) all load.

use bigdecimal::{BigDecimal, RoundingMode};
use std::str::FromStr;

use super::models::{RawRow, RowError, ValidatedCandidate};

/// Maximum SKU length accepted by the `products` table
pub const MAX_SKU_LEN: usize = 110;

/// Maximum product name length accepted by the `products` table
pub const MAX_NAME_LEN: usize = 255;

/// Values of the active flag that mean `true` (compared lowercase)
const TRUTHY: [&str; 5] = ["1", "true", "yes", "y", "t"];

/// Prices must fit NUMERIC(12,2)
const PRICE_INTEGER_LIMIT: i64 = 10_000_000_000;

/// Integer digits allowed by NUMERIC(12,2)
const PRICE_INTEGER_DIGITS: i64 = 10;

/// Catalog fields read from a CSV row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Sku,
    Name,
    Price,
    StockCount,
    IsActive,
}

impl Field {
    /// Accepted headers in priority order
    pub const fn headers(self) -> &'static [&'static str] {
        match self {
            Field::Sku => &["sku", "SKU"],
            Field::Name => &["name", "Name"],
            Field::Price => &["price", "Price"],
            Field::StockCount => &["stock_count", "stock", "Stock"],
            Field::IsActive => &["is_active", "isActive"],
        }
    }

    /// First non-empty value under any of the accepted headers
    fn lookup(self, raw: &RawRow) -> Option<&str> {
        self.headers()
            .iter()
            .find_map(|header| raw.get(*header).filter(|value| !value.is_empty()))
            .map(String::as_str)
    }
}

/// Validation switches
#[derive(Debug, Clone, Copy, Default)]
pub struct RowValidator {
    pub allow_negative_stock: bool,
}

impl RowValidator {
    pub fn new(allow_negative_stock: bool) -> Self {
        Self { allow_negative_stock }
    }

    /// Validate one record. Checks short-circuit in order: SKU, name, price,
    /// quantity. The record is moved into the error on rejection.
    pub fn validate(&self, raw: RawRow) -> Result<ValidatedCandidate, RowError> {
        let sku = Field::Sku.lookup(&raw).map(str::trim).unwrap_or_default();
        if sku.is_empty() {
            return Err(reject(None, "Missing SKU".to_string(), raw));
        }
        let sku = sku.to_string();
        if sku.chars().count() > MAX_SKU_LEN {
            return Err(reject(
                Some(sku),
                format!("SKU exceeds {MAX_SKU_LEN} characters"),
                raw,
            ));
        }

        let name = Field::Name.lookup(&raw).map(str::trim).unwrap_or_default();
        if name.is_empty() {
            return Err(reject(Some(sku), "Missing name".to_string(), raw));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(reject(
                Some(sku),
                format!("Name exceeds {MAX_NAME_LEN} characters"),
                raw,
            ));
        }
        let name = name.to_string();

        let price_raw = Field::Price.lookup(&raw).map(str::trim).unwrap_or_default();
        let price = match parse_price(price_raw) {
            Some(price) => price,
            None => {
                let message = format!("Invalid price: {price_raw}");
                return Err(reject(Some(sku), message, raw));
            },
        };

        let stock_count = match Field::StockCount.lookup(&raw).map(str::trim) {
            None | Some("") => 0,
            Some(quantity) => match self.parse_quantity(quantity) {
                Some(value) => value,
                None => {
                    let message = format!("Invalid quantity: {quantity}");
                    return Err(reject(Some(sku), message, raw));
                },
            },
        };

        let is_active = Field::IsActive
            .lookup(&raw)
            .map(|value| TRUTHY.contains(&value.trim().to_lowercase().as_str()))
            .unwrap_or(false);

        Ok(ValidatedCandidate {
            sku,
            name,
            price,
            stock_count,
            is_active,
        })
    }

    /// Split a batch into candidates and row errors, keeping input order
    pub fn partition(&self, rows: Vec<RawRow>) -> (Vec<ValidatedCandidate>, Vec<RowError>) {
        let mut candidates = Vec::with_capacity(rows.len());
        let mut errors = Vec::new();

        for row in rows {
            match self.validate(row) {
                Ok(candidate) => candidates.push(candidate),
                Err(error) => errors.push(error),
            }
        }

        (candidates, errors)
    }

    fn parse_quantity(&self, value: &str) -> Option<i32> {
        let quantity = value.parse::<i32>().ok()?;
        (self.allow_negative_stock || quantity >= 0).then_some(quantity)
    }
}

/// Fixed-point price rounded to cents; `None` when it cannot be stored
fn parse_price(value: &str) -> Option<BigDecimal> {
    if value.is_empty() {
        return None;
    }
    let parsed = BigDecimal::from_str(value).ok()?;

    // Bound the magnitude before rescaling; an exponent like `1e50000000`
    // would otherwise expand to millions of digits
    let (_, scale) = parsed.as_bigint_and_exponent();
    let integer_digits = parsed.digits() as i64 - scale;
    if integer_digits > PRICE_INTEGER_DIGITS {
        return None;
    }
    if integer_digits < -2 {
        // Below a tenth of a cent, rounds to zero
        return Some(BigDecimal::from(0).with_scale(2));
    }

    let price = parsed.with_scale_round(2, RoundingMode::HalfEven);
    if price < BigDecimal::from(0) || price.abs() >= BigDecimal::from(PRICE_INTEGER_LIMIT) {
        return None;
    }
    Some(price)
}

fn reject(sku: Option<String>, error: String, raw: RawRow) -> RowError {
    RowError {
        sku,
        error,
        raw: Some(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> RawRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn price(value: &str) -> BigDecimal {
        BigDecimal::from_str(value).unwrap()
    }

    #[test]
    fn test_valid_row_with_primary_headers() {
        let candidate = RowValidator::default()
            .validate(row(&[
                ("sku", " A1 "),
                ("name", "Widget"),
                ("price", "9.99"),
                ("stock_count", "5"),
                ("is_active", "true"),
            ]))
            .unwrap();

        assert_eq!(candidate.sku, "A1");
        assert_eq!(candidate.name, "Widget");
        assert_eq!(candidate.price, price("9.99"));
        assert_eq!(candidate.stock_count, 5);
        assert!(candidate.is_active);
    }

    #[test]
    fn test_alias_headers() {
        let candidate = RowValidator::default()
            .validate(row(&[
                ("SKU", "B2"),
                ("Name", "Gadget"),
                ("Price", "3"),
                ("Stock", "7"),
                ("isActive", "Y"),
            ]))
            .unwrap();

        assert_eq!(candidate.sku, "B2");
        assert_eq!(candidate.stock_count, 7);
        assert_eq!(candidate.price, price("3.00"));
        assert!(candidate.is_active);
    }

    #[test]
    fn test_empty_primary_header_falls_through_to_alias() {
        let candidate = RowValidator::default()
            .validate(row(&[("sku", ""), ("SKU", "C3"), ("name", "x"), ("price", "1")]))
            .unwrap();
        assert_eq!(candidate.sku, "C3");
    }

    #[test]
    fn test_whitespace_primary_header_does_not_fall_through() {
        let error = RowValidator::default()
            .validate(row(&[("sku", "   "), ("SKU", "C3"), ("name", "x"), ("price", "1")]))
            .unwrap_err();
        assert_eq!(error.error, "Missing SKU");
    }

    #[test]
    fn test_missing_sku() {
        let error = RowValidator::default()
            .validate(row(&[("name", "Widget"), ("price", "1")]))
            .unwrap_err();

        assert_eq!(error.error, "Missing SKU");
        assert_eq!(error.sku, None);
        assert_eq!(error.raw.unwrap().get("name").map(String::as_str), Some("Widget"));
    }

    #[test]
    fn test_missing_name_keeps_sku() {
        let error = RowValidator::default()
            .validate(row(&[("sku", "A1"), ("name", " "), ("price", "1")]))
            .unwrap_err();

        assert_eq!(error.error, "Missing name");
        assert_eq!(error.sku.as_deref(), Some("A1"));
    }

    #[test]
    fn test_invalid_price() {
        let validator = RowValidator::default();

        for bad in ["abc", "", "-1", "NaN", "12345678901"] {
            let error = validator
                .validate(row(&[("sku", "A1"), ("name", "W"), ("price", bad)]))
                .unwrap_err();
            assert_eq!(error.error, format!("Invalid price: {bad}"));
        }

        let error = validator.validate(row(&[("sku", "A1"), ("name", "W")])).unwrap_err();
        assert_eq!(error.error, "Invalid price: ");
    }

    #[test]
    fn test_price_rounds_to_cents() {
        let candidate = RowValidator::default()
            .validate(row(&[("sku", "A1"), ("name", "W"), ("price", "1.004")]))
            .unwrap();
        assert_eq!(candidate.price, price("1.00"));

        let candidate = RowValidator::default()
            .validate(row(&[("sku", "A1"), ("name", "W"), ("price", "2.676")]))
            .unwrap();
        assert_eq!(candidate.price, price("2.68"));

        let candidate = RowValidator::default()
            .validate(row(&[("sku", "A1"), ("name", "W"), ("price", "0.125")]))
            .unwrap();
        assert_eq!(candidate.price, price("0.12"));
    }

    #[test]
    fn test_extreme_exponents_are_cheap() {
        let validator = RowValidator::default();
        let started = std::time::Instant::now();

        for bad in ["1e50000000", "-1e50000000", "1e11", "99999999999.5"] {
            let error = validator
                .validate(row(&[("sku", "A1"), ("name", "W"), ("price", bad)]))
                .unwrap_err();
            assert_eq!(error.error, format!("Invalid price: {bad}"));
        }

        let tiny = validator
            .validate(row(&[("sku", "A1"), ("name", "W"), ("price", "1e-50000000")]))
            .unwrap();
        assert_eq!(tiny.price, price("0.00"));

        assert!(started.elapsed() < std::time::Duration::from_secs(1));
    }

    #[test]
    fn test_price_near_limits() {
        let validator = RowValidator::default();
        let accept = |value: &str| {
            validator
                .validate(row(&[("sku", "A1"), ("name", "W"), ("price", value)]))
                .map(|candidate| candidate.price)
        };

        assert_eq!(accept("9999999999.99").unwrap(), price("9999999999.99"));
        assert_eq!(accept("1e9").unwrap(), price("1000000000.00"));
        assert_eq!(accept("0.006").unwrap(), price("0.01"));
        assert_eq!(accept("0.0004").unwrap(), price("0.00"));
        assert!(accept("9999999999.999").is_err());
    }

    #[test]
    fn test_quantity_rules() {
        let validator = RowValidator::default();
        let base = |qty: &str| row(&[("sku", "A1"), ("name", "W"), ("price", "1"), ("stock", qty)]);

        assert_eq!(validator.validate(base("")).unwrap().stock_count, 0);
        assert_eq!(validator.validate(base(" 12 ")).unwrap().stock_count, 12);
        assert_eq!(validator.validate(base("x")).unwrap_err().error, "Invalid quantity: x");
        assert_eq!(validator.validate(base("1.5")).unwrap_err().error, "Invalid quantity: 1.5");
        assert_eq!(validator.validate(base("-3")).unwrap_err().error, "Invalid quantity: -3");
        assert_eq!(
            validator.validate(base("99999999999")).unwrap_err().error,
            "Invalid quantity: 99999999999"
        );

        let lenient = RowValidator::new(true);
        assert_eq!(lenient.validate(base("-3")).unwrap().stock_count, -3);
    }

    #[test]
    fn test_absent_quantity_defaults_to_zero() {
        let candidate = RowValidator::default()
            .validate(row(&[("sku", "A1"), ("name", "W"), ("price", "1")]))
            .unwrap();
        assert_eq!(candidate.stock_count, 0);
    }

    #[test]
    fn test_active_flag_never_fails() {
        let validator = RowValidator::default();
        let active = |flag: &str| {
            validator
                .validate(row(&[("sku", "A1"), ("name", "W"), ("price", "1"), ("is_active", flag)]))
                .unwrap()
                .is_active
        };

        assert!(active("1"));
        assert!(active(" TRUE "));
        assert!(active("t"));
        assert!(!active("0"));
        assert!(!active("no"));
        assert!(!active("maybe"));
    }

    #[test]
    fn test_length_limits() {
        let validator = RowValidator::default();
        let long_sku = "S".repeat(MAX_SKU_LEN + 1);
        let error = validator
            .validate(row(&[("sku", &long_sku), ("name", "W"), ("price", "1")]))
            .unwrap_err();
        assert_eq!(error.error, "SKU exceeds 110 characters");

        let long_name = "N".repeat(MAX_NAME_LEN + 1);
        let error = validator
            .validate(row(&[("sku", "A1"), ("name", &long_name), ("price", "1")]))
            .unwrap_err();
        assert_eq!(error.error, "Name exceeds 255 characters");
        assert_eq!(error.sku.as_deref(), Some("A1"));
    }

    #[test]
    fn test_partition_keeps_order() {
        let (candidates, errors) = RowValidator::default().partition(vec![
            row(&[("sku", "A"), ("name", "a"), ("price", "1")]),
            row(&[("sku", "B"), ("name", "b"), ("price", "bad")]),
            row(&[("sku", "C"), ("name", "c"), ("price", "2")]),
        ]);

        let skus: Vec<_> = candidates.iter().map(|c| c.sku.as_str()).collect();
        assert_eq!(skus, ["A", "C"]);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].sku.as_deref(), Some("B"));
    }
}
