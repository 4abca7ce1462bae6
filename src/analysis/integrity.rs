use crate::models::surveillance::{IntegrityLevel, IntegrityReport, IntegritySignals};
use chrono::NaiveDateTime;

/// Composite 0–100 health score
/// - unresolved critical alerts: >5 → −30, 1..=5 → −10
/// - coefficient of variation of recent amounts >50% → −15 (needs more than 5 samples)
/// - off-hours transactions: >5 → −25, 1..=5 → −10
pub fn compute_integrity(signals: &IntegritySignals, computed_at: NaiveDateTime) -> IntegrityReport {
    let mut score = 100;
    let mut factors = Vec::new();

    match signals.unresolved_critical {
        0 => factors.push("No critical alert".to_string()),
        n if n > 5 => {
            score -= 30;
            factors.push(format!("{n} unresolved critical alerts"));
        }
        n => {
            score -= 10;
            factors.push(format!("{n} critical alerts"));
        }
    }

    if signals.recent_amounts.len() > 5 {
        if let Some(cv) = coefficient_of_variation(&signals.recent_amounts) {
            if cv > 50.0 {
                score -= 15;
                factors.push(format!("High transaction variability ({cv:.1}%)"));
            } else {
                factors.push("Regular transactions".to_string());
            }
        }
    }

    match signals.off_hours_count {
        0 => factors.push("All transactions within business hours".to_string()),
        n if n > 5 => {
            score -= 25;
            factors.push(format!("{n} off-hours transactions"));
        }
        n => {
            score -= 10;
            factors.push(format!("{n} off-hours transactions"));
        }
    }

    let score = score.max(0);
    IntegrityReport {
        score,
        level: integrity_level(score),
        factors,
        computed_at,
    }
}

pub fn integrity_level(score: i32) -> IntegrityLevel {
    if score >= 90 {
        IntegrityLevel::Excellent
    } else if score >= 75 {
        IntegrityLevel::Bon
    } else if score >= 60 {
        IntegrityLevel::Moyen
    } else if score >= 40 {
        IntegrityLevel::Faible
    } else {
        IntegrityLevel::Critique
    }
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (n − 1). None with fewer than two values.
pub fn sample_std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(variance.sqrt())
}

/// Standard deviation as a percentage of the mean. None for a non-positive mean.
pub fn coefficient_of_variation(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    if m <= 0.0 {
        return None;
    }
    Some(sample_std_dev(values)? / m * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 6, 10)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .expect("valid timestamp")
    }

    #[test]
    fn level_boundaries_are_inclusive() {
        assert_eq!(integrity_level(100), IntegrityLevel::Excellent);
        assert_eq!(integrity_level(90), IntegrityLevel::Excellent);
        assert_eq!(integrity_level(89), IntegrityLevel::Bon);
        assert_eq!(integrity_level(75), IntegrityLevel::Bon);
        assert_eq!(integrity_level(74), IntegrityLevel::Moyen);
        assert_eq!(integrity_level(60), IntegrityLevel::Moyen);
        assert_eq!(integrity_level(59), IntegrityLevel::Faible);
        assert_eq!(integrity_level(40), IntegrityLevel::Faible);
        assert_eq!(integrity_level(39), IntegrityLevel::Critique);
    }

    #[test]
    fn single_critical_alert_scores_exactly_ninety() {
        let signals = IntegritySignals {
            unresolved_critical: 1,
            ..Default::default()
        };
        let report = compute_integrity(&signals, now());
        assert_eq!(report.score, 90);
        assert_eq!(report.level, IntegrityLevel::Excellent);
    }

    #[test]
    fn clean_ledger_scores_hundred() {
        let signals = IntegritySignals {
            unresolved_critical: 0,
            recent_amounts: vec![5_000.0; 8],
            off_hours_count: 0,
        };
        let report = compute_integrity(&signals, now());
        assert_eq!(report.score, 100);
        assert_eq!(report.factors.len(), 3);
    }

    #[test]
    fn worst_case_combines_all_penalties() {
        let signals = IntegritySignals {
            unresolved_critical: 6,
            recent_amounts: vec![100.0, 100.0, 100.0, 100.0, 100.0, 100_000.0],
            off_hours_count: 6,
        };
        let report = compute_integrity(&signals, now());
        assert_eq!(report.score, 30);
        assert_eq!(report.level, IntegrityLevel::Critique);
    }

    #[test]
    fn variability_needs_more_than_five_samples() {
        let signals = IntegritySignals {
            recent_amounts: vec![1.0, 1_000.0, 1.0, 1_000.0, 1.0],
            ..Default::default()
        };
        assert_eq!(compute_integrity(&signals, now()).score, 100);
    }

    #[test]
    fn coefficient_of_variation_matches_hand_computation() {
        // mean 5, sample std dev sqrt(10/3)
        let cv = coefficient_of_variation(&[3.0, 4.0, 6.0, 7.0]).expect("cv");
        let expected = (10.0f64 / 3.0).sqrt() / 5.0 * 100.0;
        assert!((cv - expected).abs() < 1e-9);
        assert!(coefficient_of_variation(&[0.0, 0.0]).is_none());
    }
}
