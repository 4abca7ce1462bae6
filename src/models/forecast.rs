use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearFit {
    pub fn predict(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Trend {
    Haussiere,
    Baissiere,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PointKind {
    Historique,
    Prediction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevenuePoint {
    pub date: NaiveDate,
    pub revenue: f64,
    pub kind: PointKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevenueForecast {
    pub history: Vec<RevenuePoint>,
    pub forecast: Vec<RevenuePoint>,
    pub trend: Trend,
    pub slope: f64,
    pub intercept: f64,
    pub expected_revenue_30d: f64,
    pub synthetic: bool, // history padded with the fallback series
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DepletionStatus {
    Stable,
    Ok,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepletionEstimate {
    pub status: DepletionStatus,
    pub days_until_empty: Option<f64>,
    pub predicted_date: Option<NaiveDate>,
    pub slope: f64,
}
