use serde::{Deserialize, Serialize};

/// Effective surveillance thresholds, resolved from `settings.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub deviation_pct: f64,
    pub critical_deviation_pct: f64,
    pub large_amount: f64,
    pub agent_daily_count: u32,
    pub agent_daily_total: f64,
    pub business_hours_start: u32,
    pub business_hours_end: u32, // exclusive
    pub duplicate_window_minutes: i64,
    pub low_revenue_ratio: f64,
    pub high_revenue_ratio: f64,
    pub pattern_lookback_days: i64,
    pub round_amount_unit: i64,
    pub round_amount_max: u32,
    pub repeated_amount_max: u32,
    pub surge_factor: u32,
    pub forecast_history_days: i64,
    pub forecast_horizon_days: i64,
    pub refresh_interval_secs: u64,
    pub dedupe_daily_alerts: bool,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            deviation_pct: 20.0,
            critical_deviation_pct: 50.0,
            large_amount: 100_000.0,
            agent_daily_count: 20,
            agent_daily_total: 500_000.0,
            business_hours_start: 7,
            business_hours_end: 19,
            duplicate_window_minutes: 5,
            low_revenue_ratio: 0.5,
            high_revenue_ratio: 2.0,
            pattern_lookback_days: 7,
            round_amount_unit: 10_000,
            round_amount_max: 10,
            repeated_amount_max: 5,
            surge_factor: 3,
            forecast_history_days: 90,
            forecast_horizon_days: 30,
            refresh_interval_secs: 30,
            dedupe_daily_alerts: false,
        }
    }
}

impl Thresholds {
    pub fn is_business_hour(&self, hour: u32) -> bool {
        hour >= self.business_hours_start && hour < self.business_hours_end
    }
}
