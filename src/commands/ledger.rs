use crate::analysis::catalog_check::{catalog_alert, check_catalog_deviation};
use crate::analysis::rules::{alert_for_assessment, evaluate_transaction};
use crate::commands::db::{self, get_db_connection, local_now};
use crate::commands::settings::load_thresholds;
use crate::error::{LedgerError, Result};
use crate::events::{emit, EventLevel, EventSink, LogSink};
use crate::models::assessment::{Assessment, RecordedTransaction};
use crate::models::catalog::{CatalogKind, PaymentRequest, Reservation};
use crate::models::thresholds::Thresholds;
use crate::models::transaction::{validate_amount, NewTransaction, Transaction};
use rusqlite::Connection;
use rust_decimal::Decimal;

pub async fn record_transaction(
    data_dir: String,
    transaction: NewTransaction,
) -> std::result::Result<RecordedTransaction, String> {
    let conn = get_db_connection(&data_dir).map_err(|e| format!("DB error: {e}"))?;
    let thresholds = load_thresholds(&data_dir)?;
    record_transaction_internal(&conn, &transaction, &thresholds, &LogSink).map_err(|e| e.to_string())
}

pub async fn record_payment(
    data_dir: String,
    payment: PaymentRequest,
) -> std::result::Result<RecordedTransaction, String> {
    let conn = get_db_connection(&data_dir).map_err(|e| format!("DB error: {e}"))?;
    let thresholds = load_thresholds(&data_dir)?;
    record_payment_internal(&conn, &payment, &thresholds, &LogSink).map_err(|e| e.to_string())
}

/// Rental bookings, latest start first.
pub async fn get_reservations(
    data_dir: String,
    catalog_id: Option<i64>,
) -> std::result::Result<Vec<Reservation>, String> {
    let conn = get_db_connection(&data_dir).map_err(|e| format!("DB error: {e}"))?;
    db::list_reservations(&conn, catalog_id).map_err(|e| format!("Query error: {e}"))
}

/// Re-run the rules against a stored transaction. Read-only.
pub async fn assess_transaction(data_dir: String, id: i64) -> std::result::Result<Assessment, String> {
    let conn = get_db_connection(&data_dir).map_err(|e| format!("DB error: {e}"))?;
    let thresholds = load_thresholds(&data_dir)?;
    assess_transaction_internal(&conn, id, &thresholds).map_err(|e| e.to_string())
}

pub fn record_transaction_internal(
    conn: &Connection,
    new: &NewTransaction,
    thresholds: &Thresholds,
    sink: &dyn EventSink,
) -> Result<RecordedTransaction> {
    validate(new)?;
    let tx = db::insert_transaction(conn, new)?;
    log::info!(
        "recorded transaction #{} {} {} ({})",
        tx.id,
        tx.type_code,
        tx.amount,
        tx.receipt_number
    );
    assess_and_alert(conn, tx, None, None, thresholds, sink)
}

/// Record a payment against a catalog entry, comparing it with the catalog's expected amount.
/// Rental payments also book the rented item from `pricing.start_date` (default: payment day).
pub fn record_payment_internal(
    conn: &Connection,
    payment: &PaymentRequest,
    thresholds: &Thresholds,
    sink: &dyn EventSink,
) -> Result<RecordedTransaction> {
    let entry = db::load_catalog_entry(conn, payment.catalog_id)?
        .filter(|entry| entry.active)
        .ok_or_else(|| LedgerError::NotFound(format!("catalog entry #{}", payment.catalog_id)))?;

    let new = payment.to_transaction(&entry);
    validate(&new)?;

    let booking = match entry.kind {
        CatalogKind::Rental => {
            let duration = payment.pricing.duration.unwrap_or(1);
            if duration == 0 {
                return Err(LedgerError::Invalid("rental duration must be at least 1".to_string()));
            }
            let start = payment
                .pricing
                .start_date
                .unwrap_or_else(|| new.created_at.unwrap_or_else(local_now).date());
            let end = entry
                .rental_end_date(start, duration)
                .ok_or_else(|| LedgerError::Invalid(format!("rental of {duration} units from {start} is out of range")))?;
            Some((start, end, duration))
        }
        CatalogKind::Tax | CatalogKind::Form => None,
    };

    let expected = entry.expected_amount(&payment.pricing);
    if expected.is_none() && entry.fixed_amount.is_some_and(|v| v > Decimal::ZERO) {
        log::warn!("catalog entry #{} has no usable expected amount for {:?}", entry.id, payment.pricing);
    }

    let tx = db::insert_transaction(conn, &new)?;
    log::info!(
        "recorded payment #{} for {} ({} paid, {:?} expected)",
        tx.id,
        entry.label(),
        tx.amount,
        expected
    );

    let reservation = match booking {
        Some((start_date, end_date, duration)) => {
            let mut reservation = Reservation {
                id: 0,
                catalog_id: entry.id,
                transaction_id: tx.id,
                citizen_id: tx.citizen_id,
                requester: tx.payer_name.clone(),
                start_date,
                end_date,
                duration,
                total_amount: tx.amount,
                created_at: tx.created_at,
            };
            reservation.id = db::insert_reservation(conn, &reservation)?;
            log::info!("reserved {} from {start_date} to {end_date}", entry.label());
            Some(reservation)
        }
        None => None,
    };

    let mut recorded = assess_and_alert(conn, tx, Some(&entry.label()), expected, thresholds, sink)?;
    recorded.reservation = reservation;
    Ok(recorded)
}

pub fn assess_transaction_internal(conn: &Connection, id: i64, thresholds: &Thresholds) -> Result<Assessment> {
    let tx = db::load_transaction(conn, id)?
        .ok_or_else(|| LedgerError::NotFound(format!("transaction #{id}")))?;
    let snapshot = db::load_rule_snapshot(conn, &tx, thresholds)?;
    Ok(evaluate_transaction(&tx, &snapshot, thresholds))
}

fn validate(new: &NewTransaction) -> Result<()> {
    if new.type_code.trim().is_empty() {
        return Err(LedgerError::Invalid("type code is required".to_string()));
    }
    if new.amount <= Decimal::ZERO {
        return Err(LedgerError::Invalid(format!("amount must be positive, got {}", new.amount)));
    }
    validate_amount(new.amount)
}

fn assess_and_alert(
    conn: &Connection,
    tx: Transaction,
    catalog_label: Option<&str>,
    expected_amount: Option<Decimal>,
    thresholds: &Thresholds,
    sink: &dyn EventSink,
) -> Result<RecordedTransaction> {
    let mut alert_ids = Vec::new();
    let now = local_now();

    let catalog_deviation = check_catalog_deviation(tx.amount, expected_amount, thresholds);
    if let Some(deviation) = &catalog_deviation {
        let label = catalog_label.unwrap_or(&tx.label);
        let alert = catalog_alert(deviation, label, &tx.reference, tx.amount);
        if let Some(id) = db::insert_alert(conn, &alert, now)? {
            alert_ids.push(id);
        }
        log::warn!(
            "transaction #{}: paid {:.0} vs expected {:.0} ({:.1}%)",
            tx.id,
            deviation.paid,
            deviation.expected,
            deviation.deviation_pct
        );
        emit(sink, EventLevel::Warning, "catalog", alert.description.clone());
    }

    let snapshot = db::load_rule_snapshot(conn, &tx, thresholds)?;
    let assessment = evaluate_transaction(&tx, &snapshot, thresholds);

    if let Some(alert) = alert_for_assessment(&tx, &assessment) {
        if let Some(id) = db::insert_alert(conn, &alert, now)? {
            alert_ids.push(id);
        }
        log::warn!("transaction #{} assessed {:?} (score {})", tx.id, assessment.status, assessment.score);
        emit(sink, EventLevel::Warning, "rules", format!("{}: {}", alert.title, alert.description));
    }

    Ok(RecordedTransaction {
        status: RecordedTransaction::combined_status(&assessment, catalog_deviation.as_ref()),
        transaction: tx,
        assessment,
        expected_amount,
        catalog_deviation,
        alert_ids,
        reservation: None,
    })
}
