//! Monetary amounts, rounding, and currency conversion.
//!
//! Billing math elsewhere in the crate keeps amounts at full [`Decimal`]
//! precision; rounding happens only at presentation and aggregation
//! boundaries through [`round_money`]. Conversion rates come from an
//! injected [`RateProvider`] so computations stay reproducible — there is
//! no global rate source or hidden rounding mode.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::ValidationError;

/// Currency conversion errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CurrencyError {
    /// No rate path exists between the two currencies.
    #[error("no conversion rate from {from} to {to}")]
    UnsupportedCurrency { from: CurrencyCode, to: CurrencyCode },
}

/// ISO 4217 currency code, uppercase-normalized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    /// Creates a code after validation (three ASCII letters).
    pub fn new(code: impl Into<String>) -> Result<Self, ValidationError> {
        let code: String = code.into();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ValidationError::InvalidCurrencyCode { value: code });
        }
        Ok(Self(code.to_ascii_uppercase()))
    }

    /// Returns the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.0
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Rounds a monetary amount to `precision` decimal places.
///
/// Uses round-half-away-from-zero: 2.5 rounds to 3, -2.5 rounds to -3.
/// Total and pure; safe to call anywhere an amount crosses a presentation
/// boundary.
#[must_use]
pub fn round_money(amount: Decimal, precision: u32) -> Decimal {
    amount.round_dp_with_strategy(precision, RoundingStrategy::MidpointAwayFromZero)
}

/// Fixed identifier of the settings singleton.
pub const SETTINGS_ID: &str = "app-settings";

/// Organization-wide currency configuration.
///
/// Created once, updated by administrative action, and passed explicitly
/// into every conversion call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Currency amounts are stored against.
    pub base_currency: CurrencyCode,
    /// Currency reports are rendered in.
    pub display_currency: CurrencyCode,
    /// Decimal places for displayed amounts.
    pub money_precision: u32,
}

impl Settings {
    pub fn new(
        base_currency: CurrencyCode,
        display_currency: CurrencyCode,
        money_precision: u32,
    ) -> Self {
        Self {
            base_currency,
            display_currency,
            money_precision,
        }
    }
}

/// Source of conversion rates.
///
/// Rate lookup is an external collaborator; implementations may be backed
/// by a remote feed, a database, or the in-memory [`FxTable`].
pub trait RateProvider {
    /// Returns the rate converting one unit of `from` into `to`, effective
    /// at `as_of`, or `None` when no rate is known.
    fn rate(
        &self,
        from: &CurrencyCode,
        to: &CurrencyCode,
        as_of: DateTime<Utc>,
    ) -> Option<Decimal>;
}

/// Converts `amount` from one currency to another at full precision.
///
/// Identical currencies convert at parity without consulting the provider.
/// Fails when the provider knows no rate for the pair.
pub fn convert(
    amount: Decimal,
    from: &CurrencyCode,
    to: &CurrencyCode,
    as_of: DateTime<Utc>,
    rates: &dyn RateProvider,
) -> Result<Decimal, CurrencyError> {
    if from == to {
        return Ok(amount);
    }
    rates
        .rate(from, to, as_of)
        .map(|rate| amount * rate)
        .ok_or_else(|| CurrencyError::UnsupportedCurrency {
            from: from.clone(),
            to: to.clone(),
        })
}

/// In-memory rate table keyed by currency pair and effective date.
///
/// Lookup takes the most recent rate at or before `as_of`; when only the
/// inverse pair is known, its reciprocal is used.
#[derive(Debug, Clone, Default)]
pub struct FxTable {
    rates: HashMap<(CurrencyCode, CurrencyCode), BTreeMap<DateTime<Utc>, Decimal>>,
}

impl FxTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a rate effective from `as_of` onward.
    pub fn insert(
        &mut self,
        from: CurrencyCode,
        to: CurrencyCode,
        as_of: DateTime<Utc>,
        rate: Decimal,
    ) {
        self.rates
            .entry((from, to))
            .or_default()
            .insert(as_of, rate);
    }

    fn direct(
        &self,
        from: &CurrencyCode,
        to: &CurrencyCode,
        as_of: DateTime<Utc>,
    ) -> Option<Decimal> {
        self.rates
            .get(&(from.clone(), to.clone()))
            .and_then(|series| series.range(..=as_of).next_back())
            .map(|(_, rate)| *rate)
    }
}

impl RateProvider for FxTable {
    fn rate(
        &self,
        from: &CurrencyCode,
        to: &CurrencyCode,
        as_of: DateTime<Utc>,
    ) -> Option<Decimal> {
        if let Some(rate) = self.direct(from, to, as_of) {
            return Some(rate);
        }
        self.direct(to, from, as_of)
            .filter(|rate| !rate.is_zero())
            .map(|rate| Decimal::ONE / rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn rub() -> CurrencyCode {
        CurrencyCode::new("RUB").unwrap()
    }

    fn usd() -> CurrencyCode {
        CurrencyCode::new("USD").unwrap()
    }

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, day, 12, 0, 0)
            .single()
            .expect("valid test timestamp")
    }

    #[test]
    fn currency_code_normalizes_case() {
        assert_eq!(CurrencyCode::new("rub").unwrap().as_str(), "RUB");
    }

    #[test]
    fn currency_code_rejects_malformed() {
        assert!(CurrencyCode::new("").is_err());
        assert!(CurrencyCode::new("RU").is_err());
        assert!(CurrencyCode::new("RUBL").is_err());
        assert!(CurrencyCode::new("R1B").is_err());
    }

    #[test]
    fn round_money_half_away_from_zero() {
        assert_eq!(round_money(dec!(2.5), 0), dec!(3));
        assert_eq!(round_money(dec!(-2.5), 0), dec!(-3));
        assert_eq!(round_money(dec!(1.005), 2), dec!(1.01));
        assert_eq!(round_money(dec!(-1.005), 2), dec!(-1.01));
        assert_eq!(round_money(dec!(1.004), 2), dec!(1.00));
    }

    #[test]
    fn round_money_is_stable_at_precision() {
        let rounded = round_money(dec!(3000.00), 2);
        assert_eq!(round_money(rounded, 2), rounded);
    }

    #[test]
    fn convert_same_currency_is_parity() {
        // Empty table: parity must not consult the provider.
        let table = FxTable::new();
        let amount = convert(dec!(1234.56), &rub(), &rub(), ts(1), &table).unwrap();
        assert_eq!(amount, dec!(1234.56));
    }

    #[test]
    fn convert_missing_rate_fails() {
        let table = FxTable::new();
        let err = convert(dec!(10), &rub(), &usd(), ts(1), &table).unwrap_err();
        assert_eq!(
            err,
            CurrencyError::UnsupportedCurrency {
                from: rub(),
                to: usd()
            }
        );
    }

    #[test]
    fn fx_table_uses_most_recent_rate_at_or_before() {
        let mut table = FxTable::new();
        table.insert(usd(), rub(), ts(1), dec!(80));
        table.insert(usd(), rub(), ts(10), dec!(90));

        assert_eq!(table.rate(&usd(), &rub(), ts(5)), Some(dec!(80)));
        assert_eq!(table.rate(&usd(), &rub(), ts(10)), Some(dec!(90)));
        assert_eq!(table.rate(&usd(), &rub(), ts(20)), Some(dec!(90)));
    }

    #[test]
    fn fx_table_has_no_rate_before_first_entry() {
        let mut table = FxTable::new();
        table.insert(usd(), rub(), ts(10), dec!(90));
        assert_eq!(table.rate(&usd(), &rub(), ts(1)), None);
    }

    #[test]
    fn fx_table_falls_back_to_inverse_pair() {
        let mut table = FxTable::new();
        table.insert(usd(), rub(), ts(1), dec!(80));

        let rate = table.rate(&rub(), &usd(), ts(1)).unwrap();
        assert_eq!(rate, Decimal::ONE / dec!(80));

        let amount = convert(dec!(160), &rub(), &usd(), ts(1), &table).unwrap();
        assert_eq!(round_money(amount, 2), dec!(2.00));
    }

    #[test]
    fn settings_serde_roundtrip() {
        let settings = Settings::new(rub(), rub(), 2);
        let json = serde_json::to_string(&settings).unwrap();
        let parsed: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, settings);
    }
}
