//! Rule-based expense field extraction from document text.

use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::Decimal;
use tracing::warn;

lazy_static! {
    pub static ref VENDOR_LABEL: Regex = Regex::new(concat!(
        r"(?im)^[ \t]*",
        r"(?:vendor(?:[ \t]+name)?|seller|supplier|bill[ \t]+from|from",
        r"|sprzedawca|wystawca|dostawca)",
        r"[ \t]*:[ \t]*(\S.*?)[ \t]*$",
    ))
    .unwrap();

    pub static ref TOTAL_LABEL: Regex = Regex::new(concat!(
        r"(?im)^[ \t]*",
        r"(?:grand[ \t]+total|total[ \t]+due|amount[ \t]+due|balance[ \t]+due|invoice[ \t]+total",
        r"|total|razem[ \t]+do[ \t]+zap[łl]aty|do[ \t]+zap[łl]aty)",
        r"\b[ \t]*(?:\([^)\n]*\))?[ \t]*[:=]?[ \t]*(\S.*?)[ \t]*$",
    ))
    .unwrap();
}

/// Vendor reported when no vendor field is found.
pub const UNKNOWN_VENDOR: &str = "Unknown Vendor";

/// Summary field types understood by [`summarize_expense`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpenseFieldType {
    VendorName,
    Total,
}

impl ExpenseFieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpenseFieldType::VendorName => "VENDOR_NAME",
            ExpenseFieldType::Total => "TOTAL",
        }
    }
}

/// One labeled summary field found in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpenseField {
    pub field_type: ExpenseFieldType,
    pub value: String,
}

/// Vendor and total reduced from a document's summary fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpenseSummary {
    pub vendor: String,
    pub total: Decimal,
}

/// Find labeled vendor and total fields, in document order.
pub fn expense_fields(text: &str) -> Vec<ExpenseField> {
    let mut fields: Vec<(usize, ExpenseField)> = Vec::new();

    for caps in VENDOR_LABEL.captures_iter(text) {
        let value = &caps[1];
        fields.push((
            caps.get(0).map(|m| m.start()).unwrap_or(0),
            ExpenseField {
                field_type: ExpenseFieldType::VendorName,
                value: value.to_string(),
            },
        ));
    }

    for caps in TOTAL_LABEL.captures_iter(text) {
        fields.push((
            caps.get(0).map(|m| m.start()).unwrap_or(0),
            ExpenseField {
                field_type: ExpenseFieldType::Total,
                value: caps[1].to_string(),
            },
        ));
    }

    fields.sort_by_key(|(pos, _)| *pos);
    fields.into_iter().map(|(_, field)| field).collect()
}

/// Reduce summary fields to a vendor and a total.
///
/// Later fields win over earlier ones of the same type. Returns `None`
/// when there is no `TOTAL` field at all. A `TOTAL` whose value cannot be
/// parsed is logged and counted as zero.
pub fn summarize_expense(fields: &[ExpenseField]) -> Option<ExpenseSummary> {
    let mut vendor = UNKNOWN_VENDOR.to_string();
    let mut total = None;

    for field in fields {
        match field.field_type {
            ExpenseFieldType::VendorName => vendor = field.value.clone(),
            ExpenseFieldType::Total => match parse_amount(&field.value) {
                Some(amount) => total = Some(amount),
                None => {
                    warn!("Could not parse total amount: {}", field.value);
                    total = Some(Decimal::ZERO);
                }
            },
        }
    }

    total.map(|total| ExpenseSummary { vendor, total })
}

/// Parse a monetary amount such as `$1,299.99`, `1 234,56 zł` or `1.234,56`.
///
/// Currency symbols and whitespace are ignored. The last separator is the
/// decimal point unless it groups thousands: a separator that repeats with
/// no other kind present (`1.234.567`), or a lone comma followed by exactly
/// three digits after a non-zero integer part (`1,299`).
pub fn parse_amount(s: &str) -> Option<Decimal> {
    let cleaned: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .collect();

    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let separators: Vec<(usize, char)> = cleaned
        .char_indices()
        .filter(|(_, c)| *c == ',' || *c == '.')
        .collect();

    let normalized = match separators.last() {
        Some(&(pos, sep)) => {
            let integer: String = cleaned[..pos].chars().filter(char::is_ascii_digit).collect();
            let fraction = &cleaned[pos + 1..];

            let mixed = separators.iter().any(|(_, c)| *c != sep);
            let repeated = separators.len() > 1;
            let grouped_comma = sep == ','
                && fraction.len() == 3
                && !integer.trim_start_matches('0').is_empty();

            if !mixed && (repeated || grouped_comma) {
                format!("{}{}", integer, fraction)
            } else {
                let integer = if integer.is_empty() { "0" } else { integer.as_str() };
                format!("{}.{}", integer, fraction)
            }
        }
        None => cleaned,
    };

    Decimal::from_str(&normalized).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("$1,299.99"), Some(dec("1299.99")));
        assert_eq!(parse_amount("1 234,56 zł"), Some(dec("1234.56")));
        assert_eq!(parse_amount("1.234,56"), Some(dec("1234.56")));
        assert_eq!(parse_amount("12 345 678,90"), Some(dec("12345678.90")));
        assert_eq!(parse_amount("1,299"), Some(dec("1299")));
        assert_eq!(parse_amount("1500"), Some(dec("1500")));
        assert_eq!(parse_amount("0.5"), Some(dec("0.5")));
        assert_eq!(parse_amount("1.234.567"), Some(dec("1234567")));
        assert_eq!(parse_amount("1,234,567.89"), Some(dec("1234567.89")));
        assert_eq!(parse_amount("USD"), None);
    }

    #[test]
    fn test_parse_amount_short_or_leading_zero_fractions() {
        assert_eq!(parse_amount("1,5"), Some(dec("1.5")));
        assert_eq!(parse_amount("0.123"), Some(dec("0.123")));
        assert_eq!(parse_amount("0,123"), Some(dec("0.123")));
        assert_eq!(parse_amount("1.234"), Some(dec("1.234")));
        assert_eq!(parse_amount(",50"), Some(dec("0.50")));
    }

    #[test]
    fn test_parse_amount_keeps_scale() {
        assert_eq!(parse_amount("1299.90").unwrap().to_string(), "1299.90");
    }

    #[test]
    fn test_expense_fields() {
        let text = "ACME INVOICE\nVendor: Acme Supplies Ltd.\n\
                    Subtotal: 1,000.00\nTax: 299.99\nTotal: $1,299.99\n";

        let fields = expense_fields(text);
        assert_eq!(
            fields,
            vec![
                ExpenseField {
                    field_type: ExpenseFieldType::VendorName,
                    value: "Acme Supplies Ltd.".to_string(),
                },
                ExpenseField {
                    field_type: ExpenseFieldType::Total,
                    value: "$1,299.99".to_string(),
                },
            ]
        );

        let summary = summarize_expense(&fields).unwrap();
        assert_eq!(summary.vendor, "Acme Supplies Ltd.");
        assert_eq!(summary.total, dec("1299.99"));
    }

    #[test]
    fn test_polish_labels() {
        let text = "Sprzedawca: ABC Sp. z o.o.\nRazem do zapłaty: 1 230,00 zł";
        let summary = summarize_expense(&expense_fields(text)).unwrap();
        assert_eq!(summary.vendor, "ABC Sp. z o.o.");
        assert_eq!(summary.total, dec("1230.00"));
    }

    #[test]
    fn test_missing_total() {
        let fields = expense_fields("Vendor: Acme\nTotally unrelated text");
        assert_eq!(summarize_expense(&fields), None);
    }

    #[test]
    fn test_unparseable_total_falls_back_to_zero() {
        let summary = summarize_expense(&expense_fields("Total: see attached")).unwrap();
        assert_eq!(summary.total, Decimal::ZERO);
        assert_eq!(summary.vendor, UNKNOWN_VENDOR);
    }
}
