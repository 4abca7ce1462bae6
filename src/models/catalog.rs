use crate::error::{LedgerError, Result};
use crate::models::transaction::{validate_amount, NewTransaction, TransactionCategory};
use chrono::{Days, NaiveDate, NaiveDateTime};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogKind {
    Tax,
    Form,
    Rental,
}

impl CatalogKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tax => "tax",
            Self::Form => "form",
            Self::Rental => "rental",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "tax" => Some(Self::Tax),
            "form" => Some(Self::Form),
            "rental" => Some(Self::Rental),
            _ => None,
        }
    }

    fn type_prefix(&self) -> &'static str {
        match self {
            Self::Tax => "TAXE",
            Self::Form => "ACTE",
            Self::Rental => "LOCATION",
        }
    }
}

/// Reference tariff: a tax, an administrative form fee or a rental rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: i64,
    pub kind: CatalogKind,
    pub name: String,
    pub variant: Option<String>,
    pub fixed_amount: Option<Decimal>,
    pub rate_percent: Option<f64>,
    pub unit: Option<String>, // "Annuel" | "Jour" | "Mois" | ...
    pub description: Option<String>,
    pub active: bool,
}

/// Inputs some tariffs need to produce an amount.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingParams {
    /// Base for percentage taxes (e.g. a monthly rent).
    pub base_amount: Option<Decimal>,
    /// Number of units for rentals.
    pub duration: Option<u32>,
    /// First day of a rental. Defaults to the payment day.
    pub start_date: Option<NaiveDate>,
}

/// Booking written alongside every rental payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: i64,
    pub catalog_id: i64,
    pub transaction_id: i64,
    pub citizen_id: Option<i64>,
    pub requester: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub duration: u32,
    pub total_amount: Decimal,
    pub created_at: NaiveDateTime,
}

impl CatalogEntry {
    /// Amount the catalog expects for this entry, if it defines one.
    /// An amount that overflows has no reference.
    pub fn expected_amount(&self, params: &PricingParams) -> Option<Decimal> {
        match self.kind {
            CatalogKind::Tax => {
                if let Some(fixed) = self.fixed_amount.filter(|v| *v > Decimal::ZERO) {
                    return Some(fixed);
                }
                let rate = Decimal::from_f64(self.rate_percent?)?;
                let base = params.base_amount?;
                base.checked_mul(rate)?.checked_div(Decimal::ONE_HUNDRED)
            }
            CatalogKind::Form => self.fixed_amount.filter(|v| *v > Decimal::ZERO),
            CatalogKind::Rental => {
                let price = self.fixed_amount.filter(|v| *v > Decimal::ZERO)?;
                price.checked_mul(Decimal::from(params.duration.unwrap_or(1)))
            }
        }
    }

    /// Last day of a rental booked for `duration` units from `start`.
    /// Daily tariffs count one day per unit, every other unit thirty.
    pub fn rental_end_date(&self, start: NaiveDate, duration: u32) -> Option<NaiveDate> {
        let daily = self.unit.as_deref().is_some_and(|unit| unit.contains("Jour"));
        let days = if daily { u64::from(duration) } else { u64::from(duration) * 30 };
        start.checked_add_days(Days::new(days))
    }

    /// Reject amounts the ledger cannot store exactly.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(LedgerError::Invalid("catalog name is required".to_string()));
        }
        if let Some(fixed) = self.fixed_amount {
            if fixed < Decimal::ZERO {
                return Err(LedgerError::Invalid(format!("fixed amount must not be negative, got {fixed}")));
            }
            validate_amount(fixed)?;
        }
        if let Some(rate) = self.rate_percent {
            if !rate.is_finite() || rate < 0.0 {
                return Err(LedgerError::Invalid(format!("rate must be a non-negative number, got {rate}")));
            }
        }
        Ok(())
    }

    /// Ledger type code, e.g. `TAXE_TAXE_DE_PROPRETE`. Name truncated to 20 characters.
    pub fn type_code(&self) -> String {
        let normalized: String = self
            .name
            .chars()
            .take(20)
            .map(|c| if c.is_alphanumeric() { c } else { '_' })
            .collect::<String>()
            .to_uppercase();
        format!("{}_{}", self.kind.type_prefix(), normalized.trim_end_matches('_'))
    }

    pub fn label(&self) -> String {
        match self.variant.as_deref().filter(|v| !v.is_empty()) {
            Some(variant) => format!("{} - {}", self.name, variant),
            None => self.name.clone(),
        }
    }

    pub fn transaction_category(&self) -> TransactionCategory {
        match self.kind {
            CatalogKind::Tax => TransactionCategory::Tax,
            CatalogKind::Form => TransactionCategory::Fee,
            CatalogKind::Rental => TransactionCategory::Rental,
        }
    }
}

/// A payment against a catalog entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub catalog_id: i64,
    pub amount: Decimal,
    #[serde(default)]
    pub pricing: PricingParams,
    #[serde(default)]
    pub payer_name: Option<String>,
    #[serde(default)]
    pub payer_number: Option<String>,
    #[serde(default)]
    pub citizen_id: Option<i64>,
    #[serde(default)]
    pub agent_id: Option<i64>,
    #[serde(default)]
    pub payment_mode: Option<String>,
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,
}

impl PaymentRequest {
    pub fn new(catalog_id: i64, amount: Decimal) -> Self {
        Self {
            catalog_id,
            amount,
            pricing: PricingParams::default(),
            payer_name: None,
            payer_number: None,
            citizen_id: None,
            agent_id: None,
            payment_mode: None,
            created_at: None,
        }
    }

    /// Ledger input for this payment against `entry`.
    pub fn to_transaction(&self, entry: &CatalogEntry) -> NewTransaction {
        let mut tx = NewTransaction::new(&entry.type_code(), &entry.label(), self.amount);
        tx.category = entry.transaction_category();
        tx.payer_name = self.payer_name.clone();
        tx.payer_number = self.payer_number.clone();
        tx.citizen_id = self.citizen_id;
        tx.agent_id = self.agent_id;
        if let Some(mode) = self.payment_mode.as_ref().filter(|m| !m.is_empty()) {
            tx.payment_mode = mode.clone();
        }
        tx.created_at = self.created_at;
        tx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(kind: CatalogKind, fixed: Option<i64>, rate: Option<f64>) -> CatalogEntry {
        CatalogEntry {
            id: 1,
            kind,
            name: "Taxe foncière".to_string(),
            variant: Some("Standard".to_string()),
            fixed_amount: fixed.map(Decimal::from),
            rate_percent: rate,
            unit: Some("Annuel".to_string()),
            description: None,
            active: true,
        }
    }

    #[test]
    fn fixed_tax_ignores_parameters() {
        let tax = entry(CatalogKind::Tax, Some(50_000), None);
        assert_eq!(tax.expected_amount(&PricingParams::default()), Some(Decimal::from(50_000)));
    }

    #[test]
    fn percentage_tax_needs_a_base_amount() {
        let tax = entry(CatalogKind::Tax, None, Some(10.0));
        assert_eq!(tax.expected_amount(&PricingParams::default()), None);

        let params = PricingParams {
            base_amount: Some(Decimal::from(120_000)),
            ..PricingParams::default()
        };
        assert_eq!(tax.expected_amount(&params), Some(Decimal::from(12_000)));
    }

    #[test]
    fn rental_scales_with_duration() {
        let rental = entry(CatalogKind::Rental, Some(25_000), None);
        let params = PricingParams {
            duration: Some(3),
            ..PricingParams::default()
        };
        assert_eq!(rental.expected_amount(&params), Some(Decimal::from(75_000)));
    }

    #[test]
    fn overflowing_tariff_has_no_reference() {
        let mut rental = entry(CatalogKind::Rental, None, None);
        rental.fixed_amount = Some(Decimal::MAX);
        let params = PricingParams {
            duration: Some(10),
            ..PricingParams::default()
        };
        assert_eq!(rental.expected_amount(&params), None);

        let tax = entry(CatalogKind::Tax, None, Some(250.0));
        let params = PricingParams {
            base_amount: Some(Decimal::MAX),
            ..PricingParams::default()
        };
        assert_eq!(tax.expected_amount(&params), None);
    }

    #[test]
    fn rental_period_follows_the_tariff_unit() {
        let start = NaiveDate::from_ymd_opt(2026, 6, 10).expect("valid date");
        let mut rental = entry(CatalogKind::Rental, Some(25_000), None);

        rental.unit = Some("Jour".to_string());
        assert_eq!(rental.rental_end_date(start, 3), NaiveDate::from_ymd_opt(2026, 6, 13));

        rental.unit = Some("Mois".to_string());
        assert_eq!(rental.rental_end_date(start, 2), NaiveDate::from_ymd_opt(2026, 8, 9));
        assert_eq!(rental.rental_end_date(start, u32::MAX), None);
    }

    #[test]
    fn validate_rejects_unstorable_amounts() {
        assert!(entry(CatalogKind::Tax, Some(50_000), None).validate().is_ok());

        let mut huge = entry(CatalogKind::Rental, None, None);
        huge.fixed_amount = Some(Decimal::from_i128_with_scale(10_i128.pow(28), 0));
        assert!(matches!(huge.validate(), Err(LedgerError::Invalid(_))));

        let negative_rate = entry(CatalogKind::Tax, None, Some(-5.0));
        assert!(negative_rate.validate().is_err());
    }

    #[test]
    fn zero_amount_means_no_reference() {
        let form = entry(CatalogKind::Form, Some(0), None);
        assert_eq!(form.expected_amount(&PricingParams::default()), None);
    }

    #[test]
    fn type_code_is_prefixed_and_normalized() {
        let tax = entry(CatalogKind::Tax, Some(1), None);
        assert_eq!(tax.type_code(), "TAXE_TAXE_FONCIÈRE");
        assert_eq!(tax.label(), "Taxe foncière - Standard");
    }
}
