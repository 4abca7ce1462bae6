use crate::models::catalog::Reservation;
use crate::models::transaction::Transaction;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Medium,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnomalyKind {
    MontantAnormal,
    MontantEleveSuspect,
    ActiviteAgentSuspecte,
    RecettesAgentElevees,
    HoraireSuspect,
    DoublonSuspect,
}

impl AnomalyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MontantAnormal => "MONTANT_ANORMAL",
            Self::MontantEleveSuspect => "MONTANT_ELEVE_SUSPECT",
            Self::ActiviteAgentSuspecte => "ACTIVITE_AGENT_SUSPECTE",
            Self::RecettesAgentElevees => "RECETTES_AGENT_ELEVEES",
            Self::HoraireSuspect => "HORAIRE_SUSPECT",
            Self::DoublonSuspect => "DOUBLON_SUSPECT",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    pub kind: AnomalyKind,
    pub severity: Severity,
    pub details: String,
    pub penalty: i32,
    pub requires_validation: bool,
    pub recommendation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AssessmentStatus {
    Ok,
    Alert,
    Critical,
}

/// Aggregates read from the ledger for a single transaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateSnapshot {
    /// Mean amount of completed transactions sharing the type code; None without history.
    pub category_mean: Option<f64>,
    pub agent_day_count: u32,
    pub agent_day_total: f64,
    /// Other identical transactions (agent, type code, amount) in the duplicate window.
    pub similar_recent: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assessment {
    pub transaction_id: i64,
    pub status: AssessmentStatus,
    pub score: i32,
    pub anomalies: Vec<Anomaly>,
}

impl Assessment {
    pub fn top_anomaly(&self) -> Option<&Anomaly> {
        self.anomalies.first()
    }

    pub fn has(&self, kind: AnomalyKind) -> bool {
        self.anomalies.iter().any(|a| a.kind == kind)
    }

    pub fn recommendations(&self) -> Vec<&str> {
        self.anomalies.iter().map(|a| a.recommendation.as_str()).collect()
    }
}

/// Paid amount versus the catalog's expected amount.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogDeviation {
    pub expected: f64,
    pub paid: f64,
    pub deviation_pct: f64,
    pub critical: bool,
}

/// Outcome of recording one transaction: the stored row, its rule assessment,
/// the optional catalog comparison and the alerts persisted for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedTransaction {
    pub transaction: Transaction,
    pub status: AssessmentStatus,
    pub assessment: Assessment,
    pub expected_amount: Option<Decimal>,
    pub catalog_deviation: Option<CatalogDeviation>,
    pub alert_ids: Vec<i64>,
    /// Booking written for a rental payment.
    pub reservation: Option<Reservation>,
}

impl RecordedTransaction {
    /// Combined status: the rule assessment, raised by a catalog deviation.
    pub fn combined_status(assessment: &Assessment, deviation: Option<&CatalogDeviation>) -> AssessmentStatus {
        let from_catalog = match deviation {
            Some(d) if d.critical => AssessmentStatus::Critical,
            Some(_) => AssessmentStatus::Alert,
            None => AssessmentStatus::Ok,
        };
        assessment.status.max(from_catalog)
    }
}
