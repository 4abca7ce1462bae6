use crate::analysis::integrity::compute_integrity;
use crate::analysis::sweep::{detect_patterns, evaluate_daily, pattern_alert, sweep_alerts};
use crate::commands::db::{self, get_db_connection, local_now};
use crate::commands::settings::load_thresholds;
use crate::error::{LedgerError, Result};
use crate::events::{emit, EventLevel, EventSink, LogSink};
use crate::models::surveillance::{
    DailyReport, DailySweepReport, DashboardStats, FraudPattern, IntegrityReport, IntegritySignals,
    SurveillanceCycle,
};
use crate::models::thresholds::Thresholds;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use rusqlite::Connection;

/// Trailing window of the daily sweep and of the activity-surge comparison.
const SWEEP_WINDOW_DAYS: i64 = 7;
const INTEGRITY_WINDOW_DAYS: i64 = 7;

pub async fn run_daily_sweep(data_dir: String) -> std::result::Result<DailySweepReport, String> {
    let conn = get_db_connection(&data_dir).map_err(|e| format!("DB error: {e}"))?;
    let thresholds = load_thresholds(&data_dir)?;
    run_daily_sweep_internal(&conn, local_now(), &thresholds, &LogSink).map_err(|e| e.to_string())
}

pub async fn detect_fraud_patterns(data_dir: String) -> std::result::Result<Vec<FraudPattern>, String> {
    let conn = get_db_connection(&data_dir).map_err(|e| format!("DB error: {e}"))?;
    let thresholds = load_thresholds(&data_dir)?;
    detect_fraud_patterns_internal(&conn, local_now(), &thresholds, &LogSink).map_err(|e| e.to_string())
}

/// Sweep plus pattern detection. Step failures become notes; the cycle itself never fails.
pub async fn run_surveillance_cycle(data_dir: String) -> std::result::Result<SurveillanceCycle, String> {
    let setup = get_db_connection(&data_dir)
        .and_then(|conn| load_thresholds(&data_dir).map(|t| (conn, t)).map_err(LedgerError::Settings));

    match setup {
        Ok((conn, thresholds)) => Ok(run_surveillance_cycle_internal(
            &conn,
            local_now(),
            &thresholds,
            &LogSink,
        )),
        Err(e) => {
            log::warn!("surveillance cycle skipped: {e}");
            emit(&LogSink, EventLevel::Error, "cycle", format!("no anomalies computed this cycle: {e}"));
            Ok(SurveillanceCycle {
                notes: vec![format!("setup failed: {e}")],
                ..Default::default()
            })
        }
    }
}

pub async fn get_integrity_score(data_dir: String) -> std::result::Result<IntegrityReport, String> {
    let conn = get_db_connection(&data_dir).map_err(|e| format!("DB error: {e}"))?;
    let thresholds = load_thresholds(&data_dir)?;
    integrity_internal(&conn, local_now(), &thresholds).map_err(|e| e.to_string())
}

pub async fn get_dashboard_stats(data_dir: String) -> std::result::Result<DashboardStats, String> {
    let conn = get_db_connection(&data_dir).map_err(|e| format!("DB error: {e}"))?;
    db::dashboard_stats(&conn, local_now().date()).map_err(|e| format!("Query error: {e}"))
}

pub async fn get_daily_report(
    data_dir: String,
    date: Option<NaiveDate>,
) -> std::result::Result<DailyReport, String> {
    let conn = get_db_connection(&data_dir).map_err(|e| format!("DB error: {e}"))?;
    let date = date.unwrap_or_else(|| local_now().date());
    db::daily_report(&conn, date).map_err(|e| format!("Query error: {e}"))
}

pub fn run_daily_sweep_internal(
    conn: &Connection,
    now: NaiveDateTime,
    thresholds: &Thresholds,
    sink: &dyn EventSink,
) -> Result<DailySweepReport> {
    let today = now.date();
    let aggregates = db::daily_aggregates(conn, today, SWEEP_WINDOW_DAYS)?;
    log::debug!("daily aggregates for {today}: {aggregates:?}");

    let (flags, status) = evaluate_daily(&aggregates, thresholds);

    let mut alerts_created = 0;
    for alert in sweep_alerts(&flags, &aggregates, today, thresholds.dedupe_daily_alerts) {
        if db::insert_alert(conn, &alert, now)?.is_some() {
            alerts_created += 1;
            emit(sink, EventLevel::Warning, "sweep", format!("{}: {}", alert.title, alert.description));
        }
    }

    for flag in &flags {
        log::warn!("daily sweep {}: {}", flag.kind.as_str(), flag.details);
    }
    if flags.is_empty() {
        emit(sink, EventLevel::Info, "sweep", format!("daily sweep {today}: nothing to report"));
    }

    Ok(DailySweepReport {
        date: today,
        aggregates,
        flags,
        status,
        alerts_created,
    })
}

pub fn detect_fraud_patterns_internal(
    conn: &Connection,
    now: NaiveDateTime,
    thresholds: &Thresholds,
    sink: &dyn EventSink,
) -> Result<Vec<FraudPattern>> {
    let today = now.date();
    let end = start_of(today + Duration::days(1));
    let recent_start = end - Duration::days(SWEEP_WINDOW_DAYS);
    let prior_start = recent_start - Duration::days(SWEEP_WINDOW_DAYS);
    let window_start = end - Duration::days(thresholds.pattern_lookback_days.max(1));

    let window = db::fetch_completed_between(conn, window_start, end)?;
    let recent = db::fetch_completed_between(conn, recent_start, end)?;
    let prior = db::fetch_completed_between(conn, prior_start, recent_start)?;

    let patterns = detect_patterns(&window, &recent, &prior, thresholds);
    for pattern in &patterns {
        let alert = pattern_alert(pattern, today, thresholds.dedupe_daily_alerts);
        if db::insert_alert(conn, &alert, now)?.is_some() {
            log::warn!("fraud pattern {}: {}", pattern.kind.as_str(), pattern.details);
            emit(sink, EventLevel::Warning, "patterns", pattern.details.clone());
        }
    }

    Ok(patterns)
}

pub fn run_surveillance_cycle_internal(
    conn: &Connection,
    now: NaiveDateTime,
    thresholds: &Thresholds,
    sink: &dyn EventSink,
) -> SurveillanceCycle {
    let mut cycle = SurveillanceCycle::default();

    match run_daily_sweep_internal(conn, now, thresholds, sink) {
        Ok(report) => cycle.daily = Some(report),
        Err(e) => {
            log::warn!("daily sweep failed: {e}");
            emit(sink, EventLevel::Error, "sweep", format!("no anomalies computed this cycle: {e}"));
            cycle.notes.push(format!("daily sweep failed: {e}"));
        }
    }

    match detect_fraud_patterns_internal(conn, now, thresholds, sink) {
        Ok(patterns) => cycle.patterns = patterns,
        Err(e) => {
            log::warn!("pattern detection failed: {e}");
            emit(sink, EventLevel::Error, "patterns", format!("no patterns computed this cycle: {e}"));
            cycle.notes.push(format!("pattern detection failed: {e}"));
        }
    }

    cycle
}

pub fn integrity_internal(conn: &Connection, now: NaiveDateTime, thresholds: &Thresholds) -> Result<IntegrityReport> {
    let since = now - Duration::days(INTEGRITY_WINDOW_DAYS);
    let signals = IntegritySignals {
        unresolved_critical: db::count_unresolved_critical(conn)?,
        recent_amounts: db::completed_amounts_since(conn, since)?,
        off_hours_count: db::count_off_hours_since(conn, since, thresholds)?,
    };
    Ok(compute_integrity(&signals, now))
}

fn start_of(date: NaiveDate) -> NaiveDateTime {
    date.and_time(chrono::NaiveTime::MIN)
}
