//! Clients, projects, and billing schemes.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::billing::FixedAllocation;
use crate::money::CurrencyCode;
use crate::types::{ClientId, ProjectId, ValidationError};

/// A billable customer. Owns zero or more projects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    /// Unique across all clients.
    pub name: String,
    pub default_currency: CurrencyCode,
}

impl Client {
    pub fn new(
        id: ClientId,
        name: impl Into<String>,
        default_currency: CurrencyCode,
    ) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ValidationError::Empty {
                field: "client name",
            });
        }
        Ok(Self {
            id,
            name,
            default_currency,
        })
    }
}

/// The rule by which a project's worked time converts to money.
///
/// A tagged variant rather than a billing-type flag with nullable rate and
/// amount columns: a project cannot carry both an hourly rate and a fixed
/// fee, or neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillingScheme {
    /// Bill each entry by its duration.
    Hourly { rate: Decimal },
    /// One fee for the project, optionally distributed across entries.
    Fixed {
        amount: Decimal,
        allocation: FixedAllocation,
    },
}

impl BillingScheme {
    /// Hourly billing at a strictly positive rate.
    pub fn hourly(rate: Decimal) -> Result<Self, ValidationError> {
        if rate <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveAmount {
                field: "hourly rate",
                value: rate,
            });
        }
        Ok(Self::Hourly { rate })
    }

    /// Fixed-fee billing with a strictly positive amount.
    pub fn fixed(amount: Decimal, allocation: FixedAllocation) -> Result<Self, ValidationError> {
        if amount <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveAmount {
                field: "fixed amount",
                value: amount,
            });
        }
        Ok(Self::Fixed { amount, allocation })
    }
}

/// A unit of work billed under one scheme and currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub client_id: ClientId,
    /// Unique per client.
    pub name: String,
    pub currency: CurrencyCode,
    pub scheme: BillingScheme,
}

impl Project {
    pub fn new(
        id: ProjectId,
        client_id: ClientId,
        name: impl Into<String>,
        currency: CurrencyCode,
        scheme: BillingScheme,
    ) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ValidationError::Empty {
                field: "project name",
            });
        }
        Ok(Self {
            id,
            client_id,
            name,
            currency,
            scheme,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn rub() -> CurrencyCode {
        CurrencyCode::new("RUB").unwrap()
    }

    #[test]
    fn hourly_scheme_requires_positive_rate() {
        assert!(BillingScheme::hourly(dec!(2000)).is_ok());
        assert!(matches!(
            BillingScheme::hourly(dec!(0)),
            Err(ValidationError::NonPositiveAmount {
                field: "hourly rate",
                ..
            })
        ));
        assert!(BillingScheme::hourly(dec!(-5)).is_err());
    }

    #[test]
    fn fixed_scheme_requires_positive_amount() {
        assert!(BillingScheme::fixed(dec!(100000), FixedAllocation::None).is_ok());
        assert!(BillingScheme::fixed(dec!(0), FixedAllocation::Equal).is_err());
    }

    #[test]
    fn client_and_project_reject_empty_names() {
        let client = Client::new(ClientId::generate(), "", rub());
        assert!(matches!(client, Err(ValidationError::Empty { .. })));

        let project = Project::new(
            ProjectId::generate(),
            ClientId::generate(),
            "",
            rub(),
            BillingScheme::hourly(dec!(1800)).unwrap(),
        );
        assert!(project.is_err());
    }

    #[test]
    fn scheme_serde_uses_billing_type_tags() {
        let hourly = BillingScheme::hourly(dec!(2000)).unwrap();
        let json = serde_json::to_string(&hourly).unwrap();
        assert!(json.contains("\"type\":\"HOURLY\""));

        let fixed = BillingScheme::fixed(dec!(100000), FixedAllocation::None).unwrap();
        let json = serde_json::to_string(&fixed).unwrap();
        assert!(json.contains("\"type\":\"FIXED\""));
        assert!(json.contains("\"allocation\":\"NONE\""));

        let parsed: BillingScheme = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, fixed);
    }
}
