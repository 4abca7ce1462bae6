use crate::models::assessment::Severity;
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SweepFlagKind {
    RecettesAnormalementFaibles,
    RecettesAnormalementElevees,
    ActiviteFaible,
}

impl SweepFlagKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RecettesAnormalementFaibles => "RECETTES_ANORMALEMENT_FAIBLES",
            Self::RecettesAnormalementElevees => "RECETTES_ANORMALEMENT_ELEVEES",
            Self::ActiviteFaible => "ACTIVITE_FAIBLE",
        }
    }

    /// Informational flags are reported but never persisted as alerts.
    pub fn persists_alert(&self) -> bool {
        !matches!(self, Self::ActiviteFaible)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepFlag {
    pub kind: SweepFlagKind,
    pub severity: Severity,
    pub details: String,
}

/// Today's completed totals and the trailing-window means they are compared against.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyAggregates {
    pub today_revenue: f64,
    pub today_count: u32,
    pub trailing_mean_revenue: f64,
    pub trailing_mean_count: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SweepStatus {
    Ok,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailySweepReport {
    pub date: NaiveDate,
    pub aggregates: DailyAggregates,
    pub flags: Vec<SweepFlag>,
    pub status: SweepStatus,
    pub alerts_created: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PatternKind {
    MontantsRondsSuspects,
    RepetitionSuspecte,
    AugmentationActivite,
}

impl PatternKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MontantsRondsSuspects => "MONTANTS_RONDS_SUSPECTS",
            Self::RepetitionSuspecte => "REPETITION_SUSPECTE",
            Self::AugmentationActivite => "AUGMENTATION_ACTIVITE",
        }
    }

    pub fn alert_category(&self) -> String {
        format!("PATTERN_{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudPattern {
    pub kind: PatternKind,
    pub agent_id: i64,
    pub count: u32,
    pub total: Option<Decimal>,
    /// The repeated amount, for `REPETITION_SUSPECTE` only.
    #[serde(default)]
    pub amount: Option<Decimal>,
    pub details: String,
}

/// Outcome of one sweep + pattern pass. Failed steps leave a note instead of an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SurveillanceCycle {
    pub daily: Option<DailySweepReport>,
    pub patterns: Vec<FraudPattern>,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IntegrityLevel {
    Excellent,
    Bon,
    Moyen,
    Faible,
    Critique,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntegritySignals {
    pub unresolved_critical: u32,
    pub recent_amounts: Vec<f64>,
    pub off_hours_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub score: i32,
    pub level: IntegrityLevel,
    pub factors: Vec<String>,
    pub computed_at: NaiveDateTime,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DashboardStats {
    pub revenue_today: f64,
    pub revenue_month: f64,
    pub revenue_year: f64,
    pub pending_alerts: u32,
    pub critical_incidents: u32,
    pub transactions_today: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryTotals {
    pub count: u32,
    pub total: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyReport {
    pub date: NaiveDate,
    pub total_transactions: u32,
    pub total_revenue: f64,
    pub by_category: BTreeMap<String, CategoryTotals>,
}
