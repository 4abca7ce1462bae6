use crate::analysis::forecast::{build_history, estimate_depletion, forecast_revenue};
use crate::commands::db::{self, get_db_connection, local_now};
use crate::commands::settings::load_thresholds;
use crate::error::{LedgerError, Result};
use crate::models::forecast::{DepletionEstimate, RevenueForecast};
use crate::models::thresholds::Thresholds;
use chrono::{Duration, NaiveDate};
use rusqlite::Connection;

pub async fn get_revenue_forecast(data_dir: String) -> std::result::Result<RevenueForecast, String> {
    let conn = get_db_connection(&data_dir).map_err(|e| format!("DB error: {e}"))?;
    let thresholds = load_thresholds(&data_dir)?;
    revenue_forecast_internal(&conn, local_now().date(), &thresholds).map_err(|e| e.to_string())
}

/// Days until a declining level series (one value per day, oldest first) reaches zero.
pub async fn get_depletion_estimate(levels: Vec<f64>) -> std::result::Result<DepletionEstimate, String> {
    depletion_internal(&levels, local_now().date()).map_err(|e| e.to_string())
}

pub fn revenue_forecast_internal(
    conn: &Connection,
    today: NaiveDate,
    thresholds: &Thresholds,
) -> Result<RevenueForecast> {
    let days = thresholds.forecast_history_days.max(2);
    let real = db::daily_revenue(conn, today - Duration::days(days - 1), today)?;
    let (history, synthetic) = build_history(&real, today, days);
    if synthetic {
        log::info!("only {} days of revenue history, padding with the fallback series", real.len());
    }

    forecast_revenue(&history, thresholds.forecast_horizon_days, synthetic)
        .ok_or_else(|| LedgerError::Invalid("revenue history has no spread in time".to_string()))
}

pub fn depletion_internal(levels: &[f64], today: NaiveDate) -> Result<DepletionEstimate> {
    let points: Vec<(f64, f64)> = levels
        .iter()
        .enumerate()
        .map(|(day, level)| (day as f64, *level))
        .collect();

    estimate_depletion(&points, today)
        .ok_or_else(|| LedgerError::Invalid("at least two levels are required".to_string()))
}
