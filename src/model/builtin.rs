//! Declarations every schema provides.

use super::{Declaration, Property};

pub const MONETARY_AMOUNT: &str = "MonetaryAmount";
pub const CURRENCY_CODE: &str = "CurrencyCode";

/// ISO 4217 codes and their unique symbols. No symbol maps to two codes.
pub const CURRENCY_SYMBOLS: &[(&str, &str)] = &[
    ("USD", "$"),
    ("EUR", "€"),
    ("GBP", "£"),
    ("JPY", "¥"),
    ("INR", "₹"),
    ("KRW", "₩"),
    ("NGN", "₦"),
    ("ILS", "₪"),
    ("VND", "₫"),
    ("UAH", "₴"),
    ("PHP", "₱"),
    ("TRY", "₺"),
    ("RUB", "₽"),
];

/// Codes without a symbol of their own.
const OTHER_CURRENCIES: &[&str] = &[
    "AUD", "BRL", "CAD", "CHF", "CNY", "CZK", "DKK", "HKD", "MXN", "NOK", "NZD", "PLN", "SEK",
    "SGD", "ZAR",
];

pub fn currency_codes() -> impl Iterator<Item = &'static str> {
    CURRENCY_SYMBOLS
        .iter()
        .map(|(code, _)| *code)
        .chain(OTHER_CURRENCIES.iter().copied())
}

pub fn symbol_for(code: &str) -> Option<&'static str> {
    CURRENCY_SYMBOLS
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, symbol)| *symbol)
}

pub(crate) fn declarations() -> Vec<Declaration> {
    let codes: Vec<&str> = currency_codes().collect();
    vec![
        Declaration::concept(
            MONETARY_AMOUNT,
            vec![
                Property::new("doubleValue", "Double"),
                Property::new("currencyCode", CURRENCY_CODE),
            ],
        ),
        Declaration::enumeration(CURRENCY_CODE, &codes),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn symbol_table_is_a_bijection() {
        let codes: HashSet<_> = CURRENCY_SYMBOLS.iter().map(|(c, _)| c).collect();
        let symbols: HashSet<_> = CURRENCY_SYMBOLS.iter().map(|(_, s)| s).collect();
        assert_eq!(codes.len(), CURRENCY_SYMBOLS.len());
        assert_eq!(symbols.len(), CURRENCY_SYMBOLS.len());
        for (code, symbol) in CURRENCY_SYMBOLS {
            assert_eq!(symbol_for(code), Some(*symbol));
        }
    }

    #[test]
    fn codes_are_unique() {
        let codes: Vec<_> = currency_codes().collect();
        let unique: HashSet<_> = codes.iter().collect();
        assert_eq!(unique.len(), codes.len());
    }
}
