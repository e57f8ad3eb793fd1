//! # Money
//!
//! Currency handling for licensed-cart. Amounts are exact decimals in major
//! units; the payment processor speaks in minor units.
//!
//! A [`Currency`] is the processor's lowercase ISO 4217 code, kept as given.
//! Any code is accepted; the minor-unit scale is looked up for display and
//! conversion and defaults to two decimals.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::str::FromStr;

/// Currencies without a minor unit
const ZERO_DECIMAL: &[&str] = &[
    "bif", "clp", "djf", "gnf", "jpy", "kmf", "krw", "mga", "pyg", "rwf", "ugx", "vnd", "vuv",
    "xaf", "xof", "xpf",
];

/// Currencies with three decimal places
const THREE_DECIMAL: &[&str] = &["bhd", "jod", "kwd", "omr", "tnd"];

/// Lowercase ISO 4217 currency code
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(Cow<'static, str>);

impl Currency {
    pub const USD: Currency = Currency(Cow::Borrowed("usd"));
    pub const EUR: Currency = Currency(Cow::Borrowed("eur"));
    pub const GBP: Currency = Currency(Cow::Borrowed("gbp"));
    pub const JPY: Currency = Currency(Cow::Borrowed("jpy"));

    /// Wrap a processor-reported code, normalised to lowercase.
    /// A blank code falls back to USD.
    pub fn new(code: &str) -> Self {
        let code = code.trim();
        if code.is_empty() {
            return Self::USD;
        }
        Currency(Cow::Owned(code.to_ascii_lowercase()))
    }

    /// Returns the lowercase code used on the wire
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of decimal places in the minor unit
    pub fn decimal_places(&self) -> u32 {
        let code = self.as_str();
        if ZERO_DECIMAL.contains(&code) {
            0
        } else if THREE_DECIMAL.contains(&code) {
            3
        } else {
            2
        }
    }

    /// Convert an amount in minor units (cents) to major units
    pub fn from_minor_units(&self, amount: i64) -> Decimal {
        Decimal::new(amount, self.decimal_places())
    }

    /// Format an amount for display (e.g. "$10.00", "INR 499.00")
    pub fn display(&self, amount: Decimal) -> String {
        let symbol = match self.as_str() {
            "usd" => Cow::Borrowed("$"),
            "eur" => Cow::Borrowed("€"),
            "gbp" => Cow::Borrowed("£"),
            "jpy" => Cow::Borrowed("¥"),
            "cad" => Cow::Borrowed("C$"),
            "aud" => Cow::Borrowed("A$"),
            "mxn" => Cow::Borrowed("MX$"),
            other => Cow::Owned(format!("{} ", other.to_ascii_uppercase())),
        };
        let places = self.decimal_places();
        format!("{}{:.*}", symbol, places as usize, amount.round_dp(places))
    }
}

impl Default for Currency {
    fn default() -> Self {
        Self::USD
    }
}

impl FromStr for Currency {
    type Err = String;

    /// Strict parse for configuration input: three ASCII letters
    fn from_str(code: &str) -> Result<Self, Self::Err> {
        let trimmed = code.trim();
        if trimmed.len() != 3 || !trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(format!("invalid currency code: {:?}", code));
        }
        Ok(Self::new(trimmed))
    }
}

impl TryFrom<String> for Currency {
    type Error = String;

    fn try_from(code: String) -> Result<Self, Self::Error> {
        if code.trim().is_empty() {
            return Err("currency code is empty".to_string());
        }
        Ok(Self::new(&code))
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.0.into_owned()
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str().to_uppercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_minor_unit_conversion() {
        assert_eq!(Currency::USD.from_minor_units(1099), dec!(10.99));
        assert_eq!(Currency::USD.from_minor_units(500), dec!(5));
        assert_eq!(Currency::JPY.from_minor_units(1000), dec!(1000));
        assert_eq!(Currency::new("krw").from_minor_units(5000), dec!(5000));
        assert_eq!(Currency::new("kwd").from_minor_units(1250), dec!(1.250));
    }

    #[test]
    fn test_any_processor_code_is_kept() {
        let inr = Currency::new("INR");
        assert_eq!(inr.as_str(), "inr");
        assert_eq!(inr.decimal_places(), 2);
        assert_eq!(inr.from_minor_units(49900), dec!(499));
        assert_eq!(Currency::new(" "), Currency::USD);
    }

    #[test]
    fn test_parse_currency() {
        assert_eq!("usd".parse::<Currency>().unwrap(), Currency::USD);
        assert_eq!("EUR".parse::<Currency>().unwrap(), Currency::EUR);
        assert_eq!("sek".parse::<Currency>().unwrap().as_str(), "sek");
        assert!("".parse::<Currency>().is_err());
        assert!("us dollars".parse::<Currency>().is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Currency::USD.display(dec!(29.99)), "$29.99");
        assert_eq!(Currency::USD.display(dec!(10)), "$10.00");
        assert_eq!(Currency::JPY.display(dec!(1000)), "¥1000");
        assert_eq!(Currency::new("inr").display(dec!(499)), "INR 499.00");
    }

    #[test]
    fn test_serde_lowercase_code() {
        let json = serde_json::to_string(&Currency::new("BRL")).unwrap();
        assert_eq!(json, "\"brl\"");
        let back: Currency = serde_json::from_str("\"SEK\"").unwrap();
        assert_eq!(back.as_str(), "sek");
        assert!(serde_json::from_str::<Currency>("\"\"").is_err());
    }
}
