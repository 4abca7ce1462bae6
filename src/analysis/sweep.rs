use crate::models::alert::{AlertPriority, NewAlert};
use crate::models::assessment::Severity;
use crate::models::surveillance::{
    DailyAggregates, FraudPattern, PatternKind, SweepFlag, SweepFlagKind, SweepStatus,
};
use crate::models::thresholds::Thresholds;
use crate::models::transaction::{Transaction, TransactionStatus, DATE_FORMAT};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Compare today's totals with the trailing-window means.
pub fn evaluate_daily(aggregates: &DailyAggregates, thresholds: &Thresholds) -> (Vec<SweepFlag>, SweepStatus) {
    let mut flags = Vec::new();
    let mean = aggregates.trailing_mean_revenue;
    let today = aggregates.today_revenue;

    if mean > 0.0 {
        if today < mean * thresholds.low_revenue_ratio {
            let drop_pct = (mean - today) / mean * 100.0;
            flags.push(SweepFlag {
                kind: SweepFlagKind::RecettesAnormalementFaibles,
                severity: Severity::Medium,
                details: format!(
                    "Today's revenue {today:.0} is {drop_pct:.1}% below the weekly mean ({mean:.0})"
                ),
            });
        }

        if today > mean * thresholds.high_revenue_ratio {
            let rise_pct = (today - mean) / mean * 100.0;
            flags.push(SweepFlag {
                kind: SweepFlagKind::RecettesAnormalementElevees,
                severity: Severity::Critical,
                details: format!(
                    "Today's revenue {today:.0} is {rise_pct:.1}% above the weekly mean ({mean:.0})"
                ),
            });
        }
    }

    let mean_count = aggregates.trailing_mean_count;
    if mean_count > 0.0 && (aggregates.today_count as f64) < mean_count * thresholds.low_revenue_ratio {
        flags.push(SweepFlag {
            kind: SweepFlagKind::ActiviteFaible,
            severity: Severity::Info,
            details: format!(
                "Only {} transactions today vs {mean_count:.0} on average",
                aggregates.today_count
            ),
        });
    }

    let status = if flags.iter().any(|f| f.severity == Severity::Critical) {
        SweepStatus::Critical
    } else {
        SweepStatus::Ok
    };

    (flags, status)
}

pub fn dedup_key(category: &str, agent_id: Option<i64>, date: NaiveDate) -> String {
    let agent = agent_id.map_or_else(|| "-".to_string(), |id| id.to_string());
    format!("{category}:{agent}:{}", date.format(DATE_FORMAT))
}

/// Alerts for the persistable flags of one sweep. One alert per flag.
pub fn sweep_alerts(
    flags: &[SweepFlag],
    aggregates: &DailyAggregates,
    date: NaiveDate,
    dedupe: bool,
) -> Vec<NewAlert> {
    let amount = Decimal::from_f64_retain(aggregates.today_revenue)
        .unwrap_or_default()
        .round_dp(2);

    flags
        .iter()
        .filter(|flag| flag.kind.persists_alert())
        .map(|flag| {
            let (title, priority) = match flag.kind {
                SweepFlagKind::RecettesAnormalementElevees => {
                    ("IA: Abnormal revenue spike", AlertPriority::Critical)
                }
                _ => ("IA: Abnormally low revenue", AlertPriority::Normal),
            };
            let key = dedupe.then(|| dedup_key(flag.kind.as_str(), None, date));
            NewAlert::new(title, flag.details.clone(), flag.kind.as_str())
                .amount(amount)
                .priority(priority)
                .dedup_key(key)
        })
        .collect()
}

/// Per-agent fraud patterns.
///
/// `window` covers the configurable lookback; `recent` and `prior` are the two
/// consecutive fixed 7-day windows used for activity surges.
pub fn detect_patterns(
    window: &[Transaction],
    recent: &[Transaction],
    prior: &[Transaction],
    thresholds: &Thresholds,
) -> Vec<FraudPattern> {
    let mut patterns = Vec::new();
    let unit = Decimal::from(thresholds.round_amount_unit.max(1));

    let mut round_amounts: BTreeMap<i64, (u32, Decimal)> = BTreeMap::new();
    let mut repeated: BTreeMap<(i64, Decimal), u32> = BTreeMap::new();

    for (agent_id, tx) in completed_by_agent(window) {
        if tx.amount > Decimal::ZERO && (tx.amount % unit).is_zero() {
            let entry = round_amounts.entry(agent_id).or_insert((0, Decimal::ZERO));
            entry.0 += 1;
            entry.1 = entry.1.checked_add(tx.amount).unwrap_or(Decimal::MAX);
        }
        *repeated.entry((agent_id, tx.amount.normalize())).or_insert(0) += 1;
    }

    for (agent_id, (count, total)) in round_amounts {
        if count > thresholds.round_amount_max {
            patterns.push(FraudPattern {
                kind: PatternKind::MontantsRondsSuspects,
                agent_id,
                count,
                total: Some(total),
                amount: None,
                details: format!("Agent #{agent_id}: {count} round-amount transactions ({total})"),
            });
        }
    }

    for ((agent_id, amount), count) in repeated {
        if count > thresholds.repeated_amount_max {
            patterns.push(FraudPattern {
                kind: PatternKind::RepetitionSuspecte,
                agent_id,
                count,
                total: amount.checked_mul(Decimal::from(count)),
                amount: Some(amount),
                details: format!("Agent #{agent_id}: amount {amount} repeated {count} times"),
            });
        }
    }

    let prior_counts = count_by_agent(prior);
    for (agent_id, recent_count) in count_by_agent(recent) {
        let prior_count = prior_counts.get(&agent_id).copied().unwrap_or(0);
        if prior_count > 0 && recent_count > prior_count * thresholds.surge_factor {
            patterns.push(FraudPattern {
                kind: PatternKind::AugmentationActivite,
                agent_id,
                count: recent_count,
                total: None,
                amount: None,
                details: format!(
                    "Agent #{agent_id}: activity x{:.1} over 7 days ({recent_count} vs {prior_count})",
                    recent_count as f64 / prior_count as f64
                ),
            });
        }
    }

    patterns
}

/// One CRITICAL alert per pattern. Repetition keys also carry the repeated amount,
/// so one agent repeating two different amounts on a day keeps two alerts.
pub fn pattern_alert(pattern: &FraudPattern, date: NaiveDate, dedupe: bool) -> NewAlert {
    let category = pattern.kind.alert_category();
    let key = dedupe.then(|| {
        let key = dedup_key(&category, Some(pattern.agent_id), date);
        match pattern.amount {
            Some(amount) => format!("{key}:{}", amount.normalize()),
            None => key,
        }
    });

    NewAlert::new(
        format!("IA: Suspicious pattern - {}", pattern.kind.as_str()),
        pattern.details.clone(),
        category,
    )
    .amount(pattern.total.unwrap_or(Decimal::ZERO))
    .priority(AlertPriority::Critical)
    .dedup_key(key)
}

fn completed_by_agent(transactions: &[Transaction]) -> impl Iterator<Item = (i64, &Transaction)> {
    transactions
        .iter()
        .filter(|tx| tx.status == TransactionStatus::Completed)
        .filter_map(|tx| tx.agent_id.map(|agent| (agent, tx)))
}

fn count_by_agent(transactions: &[Transaction]) -> BTreeMap<i64, u32> {
    let mut counts = BTreeMap::new();
    for (agent_id, _) in completed_by_agent(transactions) {
        *counts.entry(agent_id).or_insert(0) += 1;
    }
    counts
}
