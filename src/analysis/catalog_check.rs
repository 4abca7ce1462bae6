use crate::analysis::rules::relative_deviation_pct;
use crate::models::alert::{AlertPriority, NewAlert};
use crate::models::assessment::CatalogDeviation;
use crate::models::thresholds::Thresholds;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

pub const CATALOG_ALERT_CATEGORY: &str = "ANOMALIE_TAXE";

/// Compare a paid amount with the catalog's expected amount.
/// A missing or zero reference disables the check.
pub fn check_catalog_deviation(
    paid: Decimal,
    expected: Option<Decimal>,
    thresholds: &Thresholds,
) -> Option<CatalogDeviation> {
    let expected = expected?.to_f64()?;
    let paid = paid.to_f64()?;
    let deviation_pct = relative_deviation_pct(paid, expected)?;

    if deviation_pct <= thresholds.deviation_pct {
        return None;
    }

    Some(CatalogDeviation {
        expected,
        paid,
        deviation_pct,
        critical: deviation_pct > thresholds.critical_deviation_pct,
    })
}

pub fn catalog_alert(
    deviation: &CatalogDeviation,
    label: &str,
    reference: &str,
    paid: Decimal,
) -> NewAlert {
    let priority = if deviation.critical {
        AlertPriority::Critical
    } else {
        AlertPriority::Normal
    };

    NewAlert::new(
        "Amount anomaly detected",
        format!(
            "{label}: paid {:.0} vs expected {:.0} (deviation {:.1}%)\nRef: {reference}",
            deviation.paid, deviation.expected, deviation.deviation_pct
        ),
        CATALOG_ALERT_CATEGORY,
    )
    .amount(paid)
    .priority(priority)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_or_zero_reference_disables_check() {
        let thresholds = Thresholds::default();
        assert!(check_catalog_deviation(Decimal::from(10_000), None, &thresholds).is_none());
        assert!(check_catalog_deviation(Decimal::from(10_000), Some(Decimal::ZERO), &thresholds).is_none());
    }

    #[test]
    fn eighty_percent_short_payment_is_critical() {
        let deviation = check_catalog_deviation(
            Decimal::from(10_000),
            Some(Decimal::from(50_000)),
            &Thresholds::default(),
        )
        .expect("deviation detected");

        assert!((deviation.deviation_pct - 80.0).abs() < 1e-9);
        assert!(deviation.critical);

        let alert = catalog_alert(&deviation, "TAXE_FONCIERE", "REC-1 - Kone", Decimal::from(10_000));
        assert_eq!(alert.category, CATALOG_ALERT_CATEGORY);
        assert_eq!(alert.priority, AlertPriority::Critical);
        assert!(alert.description.contains("Ref: REC-1 - Kone"));
    }

    #[test]
    fn moderate_overpayment_is_normal_priority() {
        let deviation = check_catalog_deviation(
            Decimal::from(6_500),
            Some(Decimal::from(5_000)),
            &Thresholds::default(),
        )
        .expect("deviation detected");
        assert!(!deviation.critical);
    }

    #[test]
    fn exact_payment_passes() {
        assert!(check_catalog_deviation(
            Decimal::from(5_000),
            Some(Decimal::from(5_000)),
            &Thresholds::default()
        )
        .is_none());
    }
}
