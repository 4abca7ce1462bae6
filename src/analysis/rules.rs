use crate::models::alert::{AlertPriority, NewAlert};
use crate::models::assessment::{
    AggregateSnapshot, Anomaly, AnomalyKind, Assessment, AssessmentStatus, Severity,
};
use crate::models::thresholds::Thresholds;
use crate::models::transaction::Transaction;
use chrono::Timelike;
use rust_decimal::prelude::ToPrimitive;

const START_SCORE: i32 = 100;
const CRITICAL_BELOW: i32 = 50;
const ALERT_BELOW: i32 = 75;

const MAX_DEVIATION_PENALTY: i32 = 30;
const LARGE_AMOUNT_PENALTY: i32 = 25;
const AGENT_COUNT_PENALTY: i32 = 15;
const AGENT_TOTAL_PENALTY: i32 = 10;
const OFF_HOURS_PENALTY: i32 = 30;
const DUPLICATE_PENALTY: i32 = 40;

/// Run every rule against one transaction. Deterministic in (transaction, snapshot, thresholds).
pub fn evaluate_transaction(
    tx: &Transaction,
    snapshot: &AggregateSnapshot,
    thresholds: &Thresholds,
) -> Assessment {
    let amount = tx.amount.to_f64().unwrap_or(0.0);
    let mut anomalies = Vec::new();

    anomalies.extend(check_category_deviation(amount, snapshot.category_mean, thresholds));
    anomalies.extend(check_large_amount(amount, thresholds));
    if let Some(agent_id) = tx.agent_id {
        anomalies.extend(check_agent_activity(agent_id, snapshot, thresholds));
    }
    anomalies.extend(check_business_hours(tx.created_at.hour(), thresholds));
    anomalies.extend(check_duplicates(snapshot.similar_recent, thresholds));

    let score = anomalies
        .iter()
        .fold(START_SCORE, |score, anomaly| score - anomaly.penalty);

    let mut status = status_for_score(score);
    if status == AssessmentStatus::Ok && anomalies.iter().any(|a| a.requires_validation) {
        status = AssessmentStatus::Alert;
    }

    Assessment {
        transaction_id: tx.id,
        status,
        score,
        anomalies,
    }
}

pub fn status_for_score(score: i32) -> AssessmentStatus {
    if score < CRITICAL_BELOW {
        AssessmentStatus::Critical
    } else if score < ALERT_BELOW {
        AssessmentStatus::Alert
    } else {
        AssessmentStatus::Ok
    }
}

/// Absolute deviation of `amount` from `reference`, in percent. None for a zero reference.
pub fn relative_deviation_pct(amount: f64, reference: f64) -> Option<f64> {
    if reference.abs() < f64::EPSILON {
        return None;
    }
    Some((amount - reference).abs() / reference.abs() * 100.0)
}

fn check_category_deviation(
    amount: f64,
    category_mean: Option<f64>,
    thresholds: &Thresholds,
) -> Option<Anomaly> {
    let mean = category_mean?;
    let deviation = relative_deviation_pct(amount, mean)?;
    if deviation <= thresholds.deviation_pct {
        return None;
    }

    let severity = if deviation > thresholds.critical_deviation_pct {
        Severity::Critical
    } else {
        Severity::Medium
    };

    Some(Anomaly {
        kind: AnomalyKind::MontantAnormal,
        severity,
        details: format!("Deviation of {deviation:.1}% from the category mean ({mean:.0})"),
        penalty: (deviation.floor() as i32).min(MAX_DEVIATION_PENALTY),
        requires_validation: false,
        recommendation: "Check the justification for this gap with the agent".to_string(),
    })
}

fn check_large_amount(amount: f64, thresholds: &Thresholds) -> Option<Anomaly> {
    if amount <= thresholds.large_amount {
        return None;
    }

    Some(Anomaly {
        kind: AnomalyKind::MontantEleveSuspect,
        severity: Severity::Critical,
        details: format!("Unusually large amount: {amount:.0}"),
        penalty: LARGE_AMOUNT_PENALTY,
        requires_validation: true,
        recommendation: "Manager validation required; request supporting documents".to_string(),
    })
}

fn check_agent_activity(
    agent_id: i64,
    snapshot: &AggregateSnapshot,
    thresholds: &Thresholds,
) -> Vec<Anomaly> {
    let mut anomalies = Vec::new();

    if snapshot.agent_day_count > thresholds.agent_daily_count {
        anomalies.push(Anomaly {
            kind: AnomalyKind::ActiviteAgentSuspecte,
            severity: Severity::Medium,
            details: format!(
                "Agent #{agent_id} recorded {} transactions today",
                snapshot.agent_day_count
            ),
            penalty: AGENT_COUNT_PENALTY,
            requires_validation: false,
            recommendation: format!("Audit the transactions of agent #{agent_id}"),
        });
    }

    if snapshot.agent_day_total > thresholds.agent_daily_total {
        anomalies.push(Anomaly {
            kind: AnomalyKind::RecettesAgentElevees,
            severity: Severity::Medium,
            details: format!(
                "Agent #{agent_id} collected {:.0} today",
                snapshot.agent_day_total
            ),
            penalty: AGENT_TOTAL_PENALTY,
            requires_validation: false,
            recommendation: "Verify the integrity of the agent's register".to_string(),
        });
    }

    anomalies
}

fn check_business_hours(hour: u32, thresholds: &Thresholds) -> Option<Anomaly> {
    if thresholds.is_business_hour(hour) {
        return None;
    }

    Some(Anomaly {
        kind: AnomalyKind::HoraireSuspect,
        severity: Severity::Critical,
        details: format!("Transaction recorded at {hour}h, outside business hours"),
        penalty: OFF_HOURS_PENALTY,
        requires_validation: false,
        recommendation: "Off-hours transaction: urgent verification required".to_string(),
    })
}

fn check_duplicates(similar_recent: u32, thresholds: &Thresholds) -> Option<Anomaly> {
    if similar_recent == 0 {
        return None;
    }

    Some(Anomaly {
        kind: AnomalyKind::DoublonSuspect,
        severity: Severity::Critical,
        details: format!(
            "{} identical transactions within {} minutes",
            similar_recent + 1,
            thresholds.duplicate_window_minutes
        ),
        penalty: DUPLICATE_PENALTY,
        requires_validation: false,
        recommendation: "Duplicate detected: cancel if needed".to_string(),
    })
}

/// Alert to persist for a non-OK assessment, referencing the top anomaly.
pub fn alert_for_assessment(tx: &Transaction, assessment: &Assessment) -> Option<NewAlert> {
    if assessment.status == AssessmentStatus::Ok {
        return None;
    }
    let top = assessment.top_anomaly()?;

    let details: Vec<&str> = assessment
        .anomalies
        .iter()
        .take(2)
        .map(|a| a.details.as_str())
        .collect();
    let priority = if assessment.status == AssessmentStatus::Critical {
        AlertPriority::Critical
    } else {
        AlertPriority::Normal
    };

    Some(
        NewAlert::new(
            format!("IA: {}", top.kind.as_str()),
            format!("Transaction #{}: {}", tx.id, details.join(", ")),
            top.kind.as_str(),
        )
        .amount(tx.amount)
        .priority(priority),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::transaction::{TransactionCategory, TransactionStatus};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn tx_at(amount: i64, hour: u32, minute: u32) -> Transaction {
        Transaction {
            id: 7,
            type_code: "TAXE_FONCIERE".to_string(),
            category: TransactionCategory::Tax,
            label: "Taxe foncière".to_string(),
            amount: Decimal::from(amount),
            payer_name: None,
            payer_number: None,
            citizen_id: None,
            agent_id: Some(3),
            payment_mode: "Espèces".to_string(),
            status: TransactionStatus::Completed,
            receipt_number: "REC-1".to_string(),
            reference: "REC-1".to_string(),
            created_at: NaiveDate::from_ymd_opt(2026, 5, 4)
                .and_then(|d| d.and_hms_opt(hour, minute, 0))
                .expect("valid timestamp"),
        }
    }

    #[test]
    fn no_category_history_never_fires_deviation() {
        let thresholds = Thresholds::default();
        for amount in [1, 5_000, 50_000, 99_999] {
            let assessment = evaluate_transaction(
                &tx_at(amount, 10, 0),
                &AggregateSnapshot::default(),
                &thresholds,
            );
            assert!(!assessment.has(AnomalyKind::MontantAnormal));
            assert_eq!(assessment.status, AssessmentStatus::Ok);
            assert_eq!(assessment.score, 100);
        }
    }

    #[test]
    fn zero_mean_disables_deviation_check() {
        let snapshot = AggregateSnapshot {
            category_mean: Some(0.0),
            ..Default::default()
        };
        let assessment = evaluate_transaction(&tx_at(10_000, 10, 0), &snapshot, &Thresholds::default());
        assert!(!assessment.has(AnomalyKind::MontantAnormal));
    }

    #[test]
    fn deviation_severity_scales_and_penalty_is_capped() {
        let thresholds = Thresholds::default();
        let mild = AggregateSnapshot {
            category_mean: Some(10_000.0),
            ..Default::default()
        };
        let assessment = evaluate_transaction(&tx_at(12_500, 10, 0), &mild, &thresholds);
        let anomaly = assessment.top_anomaly().expect("deviation flagged");
        assert_eq!(anomaly.kind, AnomalyKind::MontantAnormal);
        assert_eq!(anomaly.severity, Severity::Medium);
        assert_eq!(assessment.score, 75);
        assert_eq!(assessment.status, AssessmentStatus::Ok);

        let wild = AggregateSnapshot {
            category_mean: Some(50_000.0),
            ..Default::default()
        };
        let assessment = evaluate_transaction(&tx_at(10_000, 10, 0), &wild, &thresholds);
        let anomaly = assessment.top_anomaly().expect("deviation flagged");
        assert_eq!(anomaly.severity, Severity::Critical);
        assert_eq!(anomaly.penalty, 30);
        assert_eq!(assessment.status, AssessmentStatus::Alert);
    }

    #[test]
    fn deviation_within_threshold_is_not_flagged() {
        let snapshot = AggregateSnapshot {
            category_mean: Some(10_000.0),
            ..Default::default()
        };
        let assessment = evaluate_transaction(&tx_at(11_900, 10, 0), &snapshot, &Thresholds::default());
        assert!(!assessment.has(AnomalyKind::MontantAnormal));
    }

    #[test]
    fn large_amounts_are_never_ok() {
        let thresholds = Thresholds::default();
        for amount in [100_001, 150_000, 1_000_000] {
            let snapshot = AggregateSnapshot {
                category_mean: Some(amount as f64),
                ..Default::default()
            };
            let assessment = evaluate_transaction(&tx_at(amount, 11, 0), &snapshot, &thresholds);
            assert!(assessment.has(AnomalyKind::MontantEleveSuspect));
            assert_ne!(assessment.status, AssessmentStatus::Ok, "amount {amount}");
        }

        let at_threshold = evaluate_transaction(
            &tx_at(100_000, 11, 0),
            &AggregateSnapshot::default(),
            &thresholds,
        );
        assert!(!at_threshold.has(AnomalyKind::MontantEleveSuspect));
    }

    #[test]
    fn business_hours_window_is_half_open() {
        let thresholds = Thresholds::default();
        let flagged = |hour: u32, minute: u32| {
            evaluate_transaction(&tx_at(5_000, hour, minute), &AggregateSnapshot::default(), &thresholds)
                .has(AnomalyKind::HoraireSuspect)
        };

        assert!(flagged(6, 59));
        assert!(!flagged(7, 0));
        assert!(!flagged(18, 59));
        assert!(flagged(19, 0));
        assert!(flagged(23, 30));
    }

    #[test]
    fn agent_over_activity_raises_both_flags() {
        let snapshot = AggregateSnapshot {
            category_mean: None,
            agent_day_count: 21,
            agent_day_total: 600_000.0,
            similar_recent: 0,
        };
        let assessment = evaluate_transaction(&tx_at(5_000, 9, 0), &snapshot, &Thresholds::default());
        assert!(assessment.has(AnomalyKind::ActiviteAgentSuspecte));
        assert!(assessment.has(AnomalyKind::RecettesAgentElevees));
        assert_eq!(assessment.score, 75);
    }

    #[test]
    fn agent_checks_are_skipped_without_agent() {
        let snapshot = AggregateSnapshot {
            agent_day_count: 50,
            agent_day_total: 1_000_000.0,
            ..Default::default()
        };
        let mut tx = tx_at(5_000, 9, 0);
        tx.agent_id = None;
        let assessment = evaluate_transaction(&tx, &snapshot, &Thresholds::default());
        assert!(assessment.anomalies.is_empty());
    }

    #[test]
    fn duplicate_with_off_hours_is_critical_and_builds_alert() {
        let snapshot = AggregateSnapshot {
            similar_recent: 1,
            ..Default::default()
        };
        let tx = tx_at(5_000, 21, 0);
        let assessment = evaluate_transaction(&tx, &snapshot, &Thresholds::default());
        assert!(assessment.has(AnomalyKind::DoublonSuspect));
        assert_eq!(assessment.score, 30);
        assert_eq!(assessment.status, AssessmentStatus::Critical);
        assert_eq!(assessment.recommendations().len(), 2);

        let alert = alert_for_assessment(&tx, &assessment).expect("alert for critical status");
        assert_eq!(alert.category, "HORAIRE_SUSPECT");
        assert_eq!(alert.priority, AlertPriority::Critical);
        assert_eq!(alert.amount, Some(Decimal::from(5_000)));
        assert!(alert.description.starts_with("Transaction #7: "));
    }

    #[test]
    fn ok_assessment_builds_no_alert() {
        let tx = tx_at(5_000, 10, 0);
        let assessment = evaluate_transaction(&tx, &AggregateSnapshot::default(), &Thresholds::default());
        assert!(alert_for_assessment(&tx, &assessment).is_none());
    }

    #[test]
    fn score_bands() {
        assert_eq!(status_for_score(100), AssessmentStatus::Ok);
        assert_eq!(status_for_score(75), AssessmentStatus::Ok);
        assert_eq!(status_for_score(74), AssessmentStatus::Alert);
        assert_eq!(status_for_score(50), AssessmentStatus::Alert);
        assert_eq!(status_for_score(49), AssessmentStatus::Critical);
    }
}
