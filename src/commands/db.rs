use crate::error::LedgerError;
use crate::models::alert::{Alert, AlertPriority, NewAlert};
use crate::models::assessment::AggregateSnapshot;
use crate::models::catalog::{CatalogEntry, CatalogKind, Reservation};
use crate::models::surveillance::{CategoryTotals, DailyAggregates, DailyReport, DashboardStats};
use crate::models::thresholds::Thresholds;
use crate::models::transaction::{
    build_reference, generate_receipt_number, NewTransaction, Transaction, TransactionCategory,
    TransactionStatus, DATE_FORMAT, TIMESTAMP_FORMAT,
};
use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Result, Row};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

const DB_SCHEMA_VERSION: i64 = 3;
pub const DATA_DIR_NAME: &str = ".revenuelens";

const TRANSACTION_COLUMNS: &str = "id, type_code, category, label, amount, payer_name, payer_number, citizen_id, agent_id, payment_mode, status, receipt_number, reference, created_at";
const ALERT_COLUMNS: &str =
    "id, title, description, category, amount, priority, resolved, created_at, resolved_at, dedup_key";
const CATALOG_COLUMNS: &str =
    "id, kind, name, variant, fixed_amount, rate_percent, unit, description, active";
const RESERVATION_COLUMNS: &str = "id, catalog_id, transaction_id, citizen_id, requester, start_date, end_date, duration, total_amount, created_at";

pub fn initialize_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;",
    )?;

    let mut version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if version < 1 {
        apply_migration_1(conn)?;
        version = 1;
        conn.pragma_update(None, "user_version", version)?;
    }

    if version < 2 {
        apply_migration_2(conn)?;
        version = 2;
        conn.pragma_update(None, "user_version", version)?;
    }

    if version < 3 {
        apply_migration_3(conn)?;
        version = 3;
        conn.pragma_update(None, "user_version", version)?;
    }

    if version > DB_SCHEMA_VERSION {
        log::warn!("ledger schema version {version} is newer than {DB_SCHEMA_VERSION}");
    }

    Ok(())
}

fn apply_migration_1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            type_code TEXT NOT NULL,
            category TEXT NOT NULL CHECK(category IN ('tax', 'fee', 'rental', 'misc')),
            label TEXT NOT NULL,
            amount REAL NOT NULL,
            payer_name TEXT,
            payer_number TEXT,
            citizen_id INTEGER,
            agent_id INTEGER,
            payment_mode TEXT NOT NULL DEFAULT 'Espèces',
            status TEXT NOT NULL DEFAULT 'completed' CHECK(status IN ('completed', 'failed')),
            receipt_number TEXT NOT NULL UNIQUE,
            reference TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS alerts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            description TEXT NOT NULL,
            category TEXT NOT NULL,
            amount REAL,
            priority TEXT NOT NULL DEFAULT 'NORMAL' CHECK(priority IN ('NORMAL', 'CRITICAL')),
            resolved INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            resolved_at TEXT
        );

        CREATE TABLE IF NOT EXISTS catalog (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL CHECK(kind IN ('tax', 'form', 'rental')),
            name TEXT NOT NULL,
            variant TEXT,
            fixed_amount REAL,
            rate_percent REAL,
            unit TEXT,
            description TEXT,
            active INTEGER NOT NULL DEFAULT 1
        );
        ",
    )
}

fn apply_migration_2(conn: &Connection) -> Result<()> {
    add_column_if_missing(conn, "alerts", "dedup_key TEXT")?;

    conn.execute_batch(
        "
        CREATE INDEX IF NOT EXISTS idx_transactions_created_at ON transactions(created_at);
        CREATE INDEX IF NOT EXISTS idx_transactions_type_code ON transactions(type_code, status);
        CREATE INDEX IF NOT EXISTS idx_transactions_agent ON transactions(agent_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_alerts_pending ON alerts(resolved, priority);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_alerts_dedup_key ON alerts(dedup_key) WHERE dedup_key IS NOT NULL;
        ",
    )
}

fn apply_migration_3(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS reservations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            catalog_id INTEGER NOT NULL REFERENCES catalog(id),
            transaction_id INTEGER NOT NULL REFERENCES transactions(id),
            citizen_id INTEGER,
            requester TEXT,
            start_date TEXT NOT NULL,
            end_date TEXT NOT NULL,
            duration INTEGER NOT NULL CHECK(duration > 0),
            total_amount REAL NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_reservations_catalog ON reservations(catalog_id, start_date);
        ",
    )
}

fn add_column_if_missing(conn: &Connection, table: &str, column_def: &str) -> Result<()> {
    let column_name = column_def
        .split_whitespace()
        .next()
        .unwrap_or(column_def)
        .to_string();

    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let exists = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .filter_map(|res| res.ok())
        .any(|name| name == column_name);

    if !exists {
        conn.execute(&format!("ALTER TABLE {table} ADD COLUMN {column_def}"), [])?;
    }

    Ok(())
}

/// Open `<data_dir>/.revenuelens/ledger.db`, creating the directory and schema as needed.
pub fn get_db_connection(data_dir: &str) -> std::result::Result<Connection, LedgerError> {
    let dir = Path::new(data_dir).join(DATA_DIR_NAME);
    std::fs::create_dir_all(&dir)?;
    let conn = Connection::open(dir.join("ledger.db"))?;
    initialize_schema(&conn)?;
    Ok(conn)
}

/// Local wall-clock time truncated to whole seconds.
pub fn local_now() -> NaiveDateTime {
    let now = chrono::Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}

fn format_timestamp(at: &NaiveDateTime) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn timestamp_column(row: &Row, idx: usize) -> Result<NaiveDateTime> {
    let raw: String = row.get(idx)?;
    NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT)
        .map_err(|e| conversion_error(idx, format!("bad timestamp {raw:?}: {e}")))
}

fn date_column(row: &Row, idx: usize) -> Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, DATE_FORMAT)
        .map_err(|e| conversion_error(idx, format!("bad date {raw:?}: {e}")))
}

fn to_real(amount: Decimal) -> f64 {
    amount.to_f64().unwrap_or_default()
}

fn from_real(idx: usize, value: f64) -> Result<Decimal> {
    match Decimal::from_f64(value) {
        Some(amount) => Ok(amount.round_dp(2)),
        None => {
            log::warn!("amount column {idx} holds {value}, which is not a valid amount");
            Err(rusqlite::Error::FromSqlConversionFailure(
                idx,
                Type::Real,
                format!("bad amount {value}").into(),
            ))
        }
    }
}

fn decimal_column(row: &Row, idx: usize) -> Result<Decimal> {
    from_real(idx, row.get::<_, f64>(idx)?)
}

fn optional_decimal_column(row: &Row, idx: usize) -> Result<Option<Decimal>> {
    row.get::<_, Option<f64>>(idx)?
        .map(|value| from_real(idx, value))
        .transpose()
}

fn to_json<T: Serialize>(value: T) -> std::result::Result<serde_json::Value, String> {
    serde_json::to_value(value).map_err(|e| LedgerError::from(e).to_string())
}

// --- transactions ---------------------------------------------------------

fn transaction_from_row(row: &Row) -> Result<Transaction> {
    let category: String = row.get(2)?;
    let status: String = row.get(10)?;

    Ok(Transaction {
        id: row.get(0)?,
        type_code: row.get(1)?,
        category: TransactionCategory::parse(&category)
            .ok_or_else(|| conversion_error(2, format!("unknown category {category:?}")))?,
        label: row.get(3)?,
        amount: decimal_column(row, 4)?,
        payer_name: row.get(5)?,
        payer_number: row.get(6)?,
        citizen_id: row.get(7)?,
        agent_id: row.get(8)?,
        payment_mode: row.get(9)?,
        status: TransactionStatus::parse(&status)
            .ok_or_else(|| conversion_error(10, format!("unknown status {status:?}")))?,
        receipt_number: row.get(11)?,
        reference: row.get(12)?,
        created_at: timestamp_column(row, 13)?,
    })
}

/// Insert a transaction, issuing its receipt number and reference.
pub fn insert_transaction(conn: &Connection, new: &NewTransaction) -> Result<Transaction> {
    let created_at = new.created_at.unwrap_or_else(local_now);
    let receipt_number = generate_receipt_number(&created_at);
    let reference = build_reference(
        &receipt_number,
        new.payer_name.as_deref(),
        new.payer_number.as_deref(),
    );

    conn.execute(
        "
        INSERT INTO transactions (
            type_code,
            category,
            label,
            amount,
            payer_name,
            payer_number,
            citizen_id,
            agent_id,
            payment_mode,
            status,
            receipt_number,
            reference,
            created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
        ",
        params![
            new.type_code,
            new.category.as_str(),
            new.label,
            to_real(new.amount),
            new.payer_name,
            new.payer_number,
            new.citizen_id,
            new.agent_id,
            new.payment_mode,
            new.status.as_str(),
            receipt_number,
            reference,
            format_timestamp(&created_at),
        ],
    )?;

    Ok(Transaction {
        id: conn.last_insert_rowid(),
        type_code: new.type_code.clone(),
        category: new.category,
        label: new.label.clone(),
        amount: new.amount.round_dp(2),
        payer_name: new.payer_name.clone(),
        payer_number: new.payer_number.clone(),
        citizen_id: new.citizen_id,
        agent_id: new.agent_id,
        payment_mode: new.payment_mode.clone(),
        status: new.status,
        receipt_number,
        reference,
        created_at: created_at.with_nanosecond(0).unwrap_or(created_at),
    })
}

pub fn load_transaction(conn: &Connection, id: i64) -> Result<Option<Transaction>> {
    conn.query_row(
        &format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?1"),
        params![id],
        transaction_from_row,
    )
    .optional()
}

/// Completed transactions with `from <= created_at < to`, oldest first.
pub fn fetch_completed_between(
    conn: &Connection,
    from: NaiveDateTime,
    to: NaiveDateTime,
) -> Result<Vec<Transaction>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TRANSACTION_COLUMNS} FROM transactions
         WHERE status = 'completed' AND created_at >= ?1 AND created_at < ?2
         ORDER BY created_at ASC, id ASC"
    ))?;

    let rows = stmt.query_map(
        params![format_timestamp(&from), format_timestamp(&to)],
        transaction_from_row,
    )?;
    rows.collect()
}

/// Mean amount of completed transactions sharing a type code.
pub fn type_code_mean(conn: &Connection, type_code: &str) -> Result<Option<f64>> {
    conn.query_row(
        "SELECT AVG(amount) FROM transactions WHERE status = 'completed' AND type_code = ?1",
        params![type_code],
        |row| row.get(0),
    )
}

/// Ledger aggregates the rule evaluator needs for one transaction.
pub fn load_rule_snapshot(
    conn: &Connection,
    tx: &Transaction,
    thresholds: &Thresholds,
) -> Result<AggregateSnapshot> {
    let category_mean = type_code_mean(conn, &tx.type_code)?;
    let day = format_date(tx.created_at.date());

    let (agent_day_count, agent_day_total) = match tx.agent_id {
        Some(agent_id) => conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(amount), 0) FROM transactions
             WHERE status = 'completed' AND agent_id = ?1 AND date(created_at) = ?2",
            params![agent_id, day],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?)),
        )?,
        None => (0, 0.0),
    };

    let window_start = tx.created_at - Duration::minutes(thresholds.duplicate_window_minutes);
    let similar_recent: i64 = conn.query_row(
        "SELECT COUNT(*) FROM transactions
         WHERE id != ?1
           AND agent_id IS ?2
           AND type_code = ?3
           AND ABS(amount - ?4) < 0.005
           AND created_at > ?5
           AND created_at <= ?6",
        params![
            tx.id,
            tx.agent_id,
            tx.type_code,
            to_real(tx.amount),
            format_timestamp(&window_start),
            format_timestamp(&tx.created_at),
        ],
        |row| row.get(0),
    )?;

    let snapshot = AggregateSnapshot {
        category_mean,
        agent_day_count: agent_day_count.max(0) as u32,
        agent_day_total,
        similar_recent: similar_recent.max(0) as u32,
    };
    log::debug!("rule snapshot for transaction #{}: {snapshot:?}", tx.id);
    Ok(snapshot)
}

/// Today's completed totals plus the means over the trailing `lookback_days`
/// days that had completed activity (today excluded).
pub fn daily_aggregates(conn: &Connection, today: NaiveDate, lookback_days: i64) -> Result<DailyAggregates> {
    let (today_revenue, today_count) = conn.query_row(
        "SELECT COALESCE(SUM(amount), 0), COUNT(*) FROM transactions
         WHERE status = 'completed' AND date(created_at) = ?1",
        params![format_date(today)],
        |row| Ok((row.get::<_, f64>(0)?, row.get::<_, i64>(1)?)),
    )?;

    let (trailing_mean_revenue, trailing_mean_count) = conn.query_row(
        "SELECT COALESCE(AVG(day_total), 0), COALESCE(AVG(day_count), 0) FROM (
            SELECT SUM(amount) AS day_total, COUNT(*) AS day_count FROM transactions
            WHERE status = 'completed' AND date(created_at) >= ?1 AND date(created_at) < ?2
            GROUP BY date(created_at)
         )",
        params![
            format_date(today - Duration::days(lookback_days.max(1))),
            format_date(today)
        ],
        |row| Ok((row.get::<_, f64>(0)?, row.get::<_, f64>(1)?)),
    )?;

    Ok(DailyAggregates {
        today_revenue,
        today_count: today_count.max(0) as u32,
        trailing_mean_revenue,
        trailing_mean_count,
    })
}

/// Completed tax and fee revenue per day in `[from, to]`, days without activity omitted.
pub fn daily_revenue(conn: &Connection, from: NaiveDate, to: NaiveDate) -> Result<Vec<(NaiveDate, f64)>> {
    let mut stmt = conn.prepare(
        "SELECT date(created_at) AS day, SUM(amount) FROM transactions
         WHERE status = 'completed'
           AND category IN ('tax', 'fee')
           AND date(created_at) BETWEEN ?1 AND ?2
         GROUP BY day
         ORDER BY day ASC",
    )?;

    let rows = stmt.query_map(params![format_date(from), format_date(to)], |row| {
        Ok((date_column(row, 0)?, row.get::<_, f64>(1)?))
    })?;
    rows.collect()
}

pub fn completed_amounts_since(conn: &Connection, since: NaiveDateTime) -> Result<Vec<f64>> {
    let mut stmt = conn.prepare(
        "SELECT amount FROM transactions WHERE status = 'completed' AND created_at >= ?1",
    )?;
    let rows = stmt.query_map(params![format_timestamp(&since)], |row| row.get(0))?;
    rows.collect()
}

/// Transactions since `since` whose hour falls outside business hours.
pub fn count_off_hours_since(
    conn: &Connection,
    since: NaiveDateTime,
    thresholds: &Thresholds,
) -> Result<u32> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM transactions
         WHERE created_at >= ?1
           AND (CAST(strftime('%H', created_at) AS INTEGER) < ?2
                OR CAST(strftime('%H', created_at) AS INTEGER) >= ?3)",
        params![
            format_timestamp(&since),
            thresholds.business_hours_start,
            thresholds.business_hours_end
        ],
        |row| row.get(0),
    )?;
    Ok(count.max(0) as u32)
}

// --- alerts ---------------------------------------------------------------

fn alert_from_row(row: &Row) -> Result<Alert> {
    let priority: String = row.get(5)?;
    let resolved_at = match row.get::<_, Option<String>>(8)? {
        Some(_) => Some(timestamp_column(row, 8)?),
        None => None,
    };

    Ok(Alert {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        category: row.get(3)?,
        amount: optional_decimal_column(row, 4)?,
        priority: AlertPriority::parse(&priority)
            .ok_or_else(|| conversion_error(5, format!("unknown priority {priority:?}")))?,
        resolved: row.get::<_, i32>(6)? != 0,
        created_at: timestamp_column(row, 7)?,
        resolved_at,
        dedup_key: row.get(9)?,
    })
}

/// Persist an alert. Returns None when its dedup key already exists.
pub fn insert_alert(conn: &Connection, alert: &NewAlert, at: NaiveDateTime) -> Result<Option<i64>> {
    let changed = conn.execute(
        "
        INSERT INTO alerts (title, description, category, amount, priority, resolved, created_at, dedup_key)
        VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7)
        ON CONFLICT DO NOTHING
        ",
        params![
            alert.title,
            alert.description,
            alert.category,
            alert.amount.map(to_real),
            alert.priority.as_str(),
            format_timestamp(&at),
            alert.dedup_key,
        ],
    )?;

    if changed == 0 {
        log::debug!("alert {:?} already raised", alert.dedup_key);
        return Ok(None);
    }
    Ok(Some(conn.last_insert_rowid()))
}

pub fn load_alert(conn: &Connection, id: i64) -> Result<Option<Alert>> {
    conn.query_row(
        &format!("SELECT {ALERT_COLUMNS} FROM alerts WHERE id = ?1"),
        params![id],
        alert_from_row,
    )
    .optional()
}

/// Unresolved alerts, critical first, then newest first.
pub fn pending_alerts(conn: &Connection) -> Result<Vec<Alert>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ALERT_COLUMNS} FROM alerts
         WHERE resolved = 0
         ORDER BY CASE priority WHEN 'CRITICAL' THEN 0 ELSE 1 END, created_at DESC, id DESC"
    ))?;
    let rows = stmt.query_map([], alert_from_row)?;
    rows.collect()
}

pub fn alert_history(conn: &Connection, limit: usize) -> Result<Vec<Alert>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ALERT_COLUMNS} FROM alerts ORDER BY created_at DESC, id DESC LIMIT ?1"
    ))?;
    let rows = stmt.query_map(params![limit as i64], alert_from_row)?;
    rows.collect()
}

/// Mark one alert resolved. False when it does not exist or was already resolved.
pub fn resolve_alert(conn: &Connection, id: i64, at: NaiveDateTime) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE alerts SET resolved = 1, resolved_at = ?2 WHERE id = ?1 AND resolved = 0",
        params![id, format_timestamp(&at)],
    )?;
    Ok(changed > 0)
}

pub fn resolve_all_alerts(conn: &Connection, at: NaiveDateTime) -> Result<usize> {
    conn.execute(
        "UPDATE alerts SET resolved = 1, resolved_at = ?1 WHERE resolved = 0",
        params![format_timestamp(&at)],
    )
}

pub fn count_pending_alerts(conn: &Connection) -> Result<u32> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM alerts WHERE resolved = 0", [], |row| {
        row.get(0)
    })?;
    Ok(count.max(0) as u32)
}

pub fn count_unresolved_critical(conn: &Connection) -> Result<u32> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM alerts WHERE resolved = 0 AND priority = 'CRITICAL'",
        [],
        |row| row.get(0),
    )?;
    Ok(count.max(0) as u32)
}

// --- catalog --------------------------------------------------------------

fn catalog_from_row(row: &Row) -> Result<CatalogEntry> {
    let kind: String = row.get(1)?;
    Ok(CatalogEntry {
        id: row.get(0)?,
        kind: CatalogKind::parse(&kind)
            .ok_or_else(|| conversion_error(1, format!("unknown catalog kind {kind:?}")))?,
        name: row.get(2)?,
        variant: row.get(3)?,
        fixed_amount: optional_decimal_column(row, 4)?,
        rate_percent: row.get(5)?,
        unit: row.get(6)?,
        description: row.get(7)?,
        active: row.get::<_, i32>(8)? != 0,
    })
}

pub fn insert_catalog_entry(conn: &Connection, entry: &CatalogEntry) -> Result<i64> {
    conn.execute(
        "INSERT INTO catalog (kind, name, variant, fixed_amount, rate_percent, unit, description, active) VALUES (?1,?2,?3,?4,?5,?6,?7,?8)",
        params![
            entry.kind.as_str(),
            entry.name,
            entry.variant,
            entry.fixed_amount.map(to_real),
            entry.rate_percent,
            entry.unit,
            entry.description,
            entry.active as i32
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update_catalog_entry(conn: &Connection, entry: &CatalogEntry) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE catalog SET kind=?2, name=?3, variant=?4, fixed_amount=?5, rate_percent=?6, unit=?7, description=?8, active=?9 WHERE id=?1",
        params![
            entry.id,
            entry.kind.as_str(),
            entry.name,
            entry.variant,
            entry.fixed_amount.map(to_real),
            entry.rate_percent,
            entry.unit,
            entry.description,
            entry.active as i32
        ],
    )?;
    Ok(changed > 0)
}

pub fn load_catalog_entry(conn: &Connection, id: i64) -> Result<Option<CatalogEntry>> {
    conn.query_row(
        &format!("SELECT {CATALOG_COLUMNS} FROM catalog WHERE id = ?1"),
        params![id],
        catalog_from_row,
    )
    .optional()
}

pub fn list_catalog(conn: &Connection, kind: Option<CatalogKind>) -> Result<Vec<CatalogEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CATALOG_COLUMNS} FROM catalog
         WHERE active = 1 AND (?1 IS NULL OR kind = ?1)
         ORDER BY kind ASC, name ASC, id ASC"
    ))?;
    let rows = stmt.query_map(params![kind.map(|k| k.as_str())], catalog_from_row)?;
    rows.collect()
}

// --- reservations ---------------------------------------------------------

fn reservation_from_row(row: &Row) -> Result<Reservation> {
    Ok(Reservation {
        id: row.get(0)?,
        catalog_id: row.get(1)?,
        transaction_id: row.get(2)?,
        citizen_id: row.get(3)?,
        requester: row.get(4)?,
        start_date: date_column(row, 5)?,
        end_date: date_column(row, 6)?,
        duration: row.get(7)?,
        total_amount: decimal_column(row, 8)?,
        created_at: timestamp_column(row, 9)?,
    })
}

pub fn insert_reservation(conn: &Connection, reservation: &Reservation) -> Result<i64> {
    conn.execute(
        "INSERT INTO reservations (catalog_id, transaction_id, citizen_id, requester, start_date, end_date, duration, total_amount, created_at) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
        params![
            reservation.catalog_id,
            reservation.transaction_id,
            reservation.citizen_id,
            reservation.requester,
            format_date(reservation.start_date),
            format_date(reservation.end_date),
            reservation.duration,
            to_real(reservation.total_amount),
            format_timestamp(&reservation.created_at),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Reservations, latest start first, optionally for one catalog entry.
pub fn list_reservations(conn: &Connection, catalog_id: Option<i64>) -> Result<Vec<Reservation>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RESERVATION_COLUMNS} FROM reservations
         WHERE ?1 IS NULL OR catalog_id = ?1
         ORDER BY start_date DESC, id DESC"
    ))?;
    let rows = stmt.query_map(params![catalog_id], reservation_from_row)?;
    rows.collect()
}

// --- reporting ------------------------------------------------------------

pub fn dashboard_stats(conn: &Connection, today: NaiveDate) -> Result<DashboardStats> {
    let revenue = |filter: &str, value: String| -> Result<f64> {
        conn.query_row(
            &format!(
                "SELECT COALESCE(SUM(amount), 0) FROM transactions WHERE status = 'completed' AND {filter} = ?1"
            ),
            params![value],
            |row| row.get(0),
        )
    };

    let revenue_today = revenue("date(created_at)", format_date(today))?;
    let revenue_month = revenue("strftime('%Y-%m', created_at)", today.format("%Y-%m").to_string())?;
    let revenue_year = revenue("strftime('%Y', created_at)", today.format("%Y").to_string())?;

    let transactions_today: i64 = conn.query_row(
        "SELECT COUNT(*) FROM transactions WHERE date(created_at) = ?1",
        params![format_date(today)],
        |row| row.get(0),
    )?;

    Ok(DashboardStats {
        revenue_today,
        revenue_month,
        revenue_year,
        pending_alerts: count_pending_alerts(conn)?,
        critical_incidents: count_unresolved_critical(conn)?,
        transactions_today: transactions_today.max(0) as u32,
    })
}

pub fn daily_report(conn: &Connection, date: NaiveDate) -> Result<DailyReport> {
    let mut stmt = conn.prepare(
        "SELECT category, COUNT(*), COALESCE(SUM(amount), 0) FROM transactions
         WHERE status = 'completed' AND date(created_at) = ?1
         GROUP BY category",
    )?;

    let mut by_category = BTreeMap::new();
    let rows = stmt.query_map(params![format_date(date)], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, f64>(2)?,
        ))
    })?;

    for row in rows {
        let (category, count, total) = row?;
        by_category.insert(
            category,
            CategoryTotals {
                count: count.max(0) as u32,
                total,
            },
        );
    }

    Ok(DailyReport {
        date,
        total_transactions: by_category.values().map(|c| c.count).sum(),
        total_revenue: by_category.values().map(|c| c.total).sum(),
        by_category,
    })
}

// --- commands -------------------------------------------------------------

pub async fn alerts_crud(
    data_dir: String,
    operation: String,
    id: Option<i64>,
) -> std::result::Result<serde_json::Value, String> {
    let conn = get_db_connection(&data_dir).map_err(|e| format!("DB error: {e}"))?;

    match operation.as_str() {
        "list" => {
            let alerts = pending_alerts(&conn).map_err(|e| format!("Query error: {e}"))?;
            to_json(alerts)
        }
        "history" => {
            let alerts = alert_history(&conn, 200).map_err(|e| format!("Query error: {e}"))?;
            to_json(alerts)
        }
        "read" => {
            let id = id.ok_or("ID required for read")?;
            let alert = load_alert(&conn, id).map_err(|e| format!("Read error: {e}"))?;
            to_json(alert)
        }
        "resolve" => {
            let id = id.ok_or("ID required for resolve")?;
            let resolved =
                resolve_alert(&conn, id, local_now()).map_err(|e| format!("Update error: {e}"))?;
            if !resolved {
                return Err(format!("Alert #{id} not found or already resolved"));
            }
            log::info!("alert #{id} resolved");
            Ok(serde_json::json!({"status": "resolved", "id": id}))
        }
        "resolve_all" => {
            let count = resolve_all_alerts(&conn, local_now()).map_err(|e| format!("Update error: {e}"))?;
            log::info!("{count} alerts resolved");
            Ok(serde_json::json!({"status": "resolved", "count": count}))
        }
        _ => Err(format!("Unknown operation: {operation}")),
    }
}

pub async fn catalog_crud(
    data_dir: String,
    operation: String,
    item: Option<CatalogEntry>,
    id: Option<i64>,
) -> std::result::Result<serde_json::Value, String> {
    let conn = get_db_connection(&data_dir).map_err(|e| format!("DB error: {e}"))?;

    match operation.as_str() {
        "create" => {
            let item = item.ok_or("Item required for create")?;
            item.validate().map_err(|e| e.to_string())?;
            let id = insert_catalog_entry(&conn, &item).map_err(|e| format!("Insert error: {e}"))?;
            Ok(serde_json::json!({"status": "created", "id": id}))
        }
        "update" => {
            let item = item.ok_or("Item required for update")?;
            item.validate().map_err(|e| e.to_string())?;
            let updated = update_catalog_entry(&conn, &item).map_err(|e| format!("Update error: {e}"))?;
            if !updated {
                return Err(format!("Catalog entry #{} not found", item.id));
            }
            Ok(serde_json::json!({"status": "updated", "id": item.id}))
        }
        "read" => {
            let id = id.ok_or("ID required for read")?;
            let entry = load_catalog_entry(&conn, id).map_err(|e| format!("Read error: {e}"))?;
            to_json(entry)
        }
        "list" => {
            let entries = list_catalog(&conn, None).map_err(|e| format!("Query error: {e}"))?;
            to_json(entries)
        }
        "delete" => {
            let id = id.ok_or("ID required for delete")?;
            // Soft delete: past transactions keep resolving their label.
            conn.execute("UPDATE catalog SET active = 0 WHERE id = ?1", params![id])
                .map_err(|e| format!("Delete error: {e}"))?;
            Ok(serde_json::json!({"status": "deleted"}))
        }
        _ => Err(format!("Unknown operation: {operation}")),
    }
}
