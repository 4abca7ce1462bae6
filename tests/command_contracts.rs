use chrono::{Duration, NaiveDate, NaiveDateTime};
use revenuelens_lib::commands::db::{alerts_crud, catalog_crud};
use revenuelens_lib::commands::forecast::get_revenue_forecast;
use revenuelens_lib::commands::ledger::{assess_transaction, get_reservations, record_payment, record_transaction};
use revenuelens_lib::commands::settings::{get_settings, save_settings};
use revenuelens_lib::commands::surveillance::{
    get_daily_report, get_dashboard_stats, get_integrity_score, run_daily_sweep, run_surveillance_cycle,
};
use revenuelens_lib::commands::watcher::start_refresh_loop;
use revenuelens_lib::models::assessment::{AnomalyKind, AssessmentStatus};
use revenuelens_lib::models::catalog::{CatalogEntry, CatalogKind, PaymentRequest};
use revenuelens_lib::models::surveillance::{IntegrityLevel, SweepFlagKind};
use revenuelens_lib::models::transaction::NewTransaction;
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

fn create_data_dir() -> (TempDir, String) {
    let temp_dir = tempfile::tempdir().expect("create temp dir");
    let data_dir = temp_dir.path().to_string_lossy().to_string();
    (temp_dir, data_dir)
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

fn at(date: NaiveDate, hour: u32, minute: u32) -> NaiveDateTime {
    date.and_hms_opt(hour, minute, 0).expect("valid timestamp")
}

fn property_tax() -> CatalogEntry {
    CatalogEntry {
        id: 0,
        kind: CatalogKind::Tax,
        name: "Taxe foncière".to_string(),
        variant: Some("Standard".to_string()),
        fixed_amount: Some(Decimal::from(50_000)),
        rate_percent: None,
        unit: Some("Annuel".to_string()),
        description: Some("Taxe annuelle sur les propriétés bâties".to_string()),
        active: true,
    }
}

#[tokio::test]
async fn settings_commands_round_trip_and_merge_partial_updates() {
    let (_tmp, data_dir) = create_data_dir();

    let initial = get_settings(data_dir.clone()).await.expect("load settings");
    assert_eq!(initial["deviationThresholdPct"], json!(20.0));
    assert_eq!(initial["dedupeDailyAlerts"], json!(false));

    let saved = save_settings(
        data_dir.clone(),
        json!({
            "largeAmountThreshold": 250000.0,
            "dedupeDailyAlerts": true
        }),
    )
    .await
    .expect("save settings");

    assert_eq!(saved["largeAmountThreshold"], json!(250000.0));
    assert_eq!(saved["dedupeDailyAlerts"], json!(true));
    assert_eq!(saved["businessHoursEnd"], initial["businessHoursEnd"]);

    let reloaded = get_settings(data_dir).await.expect("reload settings");
    assert_eq!(reloaded, saved);
}

#[tokio::test]
async fn short_payment_against_catalog_raises_one_critical_tax_alert() {
    let (_tmp, data_dir) = create_data_dir();

    let created = catalog_crud(data_dir.clone(), "create".to_string(), Some(property_tax()), None)
        .await
        .expect("create catalog entry");
    assert_eq!(created["status"], json!("created"));
    let catalog_id = created["id"].as_i64().expect("catalog id");

    let payment = PaymentRequest {
        payer_name: Some("Kone".to_string()),
        payer_number: Some("C-42".to_string()),
        created_at: Some(at(today(), 10, 0)),
        ..PaymentRequest::new(catalog_id, Decimal::from(10_000))
    };
    let recorded = record_payment(data_dir.clone(), payment).await.expect("record payment");

    assert_eq!(recorded.status, AssessmentStatus::Critical);
    let deviation = recorded.catalog_deviation.as_ref().expect("deviation");
    assert!((deviation.deviation_pct - 80.0).abs() < 1e-9);
    assert!(recorded.transaction.reference.ends_with("Kone (C-42)"));

    let pending = alerts_crud(data_dir.clone(), "list".to_string(), None)
        .await
        .expect("list alerts");
    let alerts = pending.as_array().expect("alert array");
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["category"], json!("ANOMALIE_TAXE"));
    assert_eq!(alerts[0]["priority"], json!("CRITICAL"));

    let id = alerts[0]["id"].as_i64().expect("alert id");
    let resolved = alerts_crud(data_dir.clone(), "resolve".to_string(), Some(id))
        .await
        .expect("resolve alert");
    assert_eq!(resolved["status"], json!("resolved"));
    assert!(alerts_crud(data_dir.clone(), "resolve".to_string(), Some(id)).await.is_err());

    let after = alerts_crud(data_dir, "list".to_string(), None).await.expect("list alerts");
    assert!(after.as_array().expect("alert array").is_empty());
}

#[tokio::test]
async fn rental_payment_creates_a_reservation() {
    let (_tmp, data_dir) = create_data_dir();
    let bus = CatalogEntry {
        id: 0,
        kind: CatalogKind::Rental,
        name: "Bus municipal".to_string(),
        variant: None,
        fixed_amount: Some(Decimal::from(40_000)),
        rate_percent: None,
        unit: Some("Jour".to_string()),
        description: None,
        active: true,
    };
    let created = catalog_crud(data_dir.clone(), "create".to_string(), Some(bus), None)
        .await
        .expect("create catalog entry");
    let catalog_id = created["id"].as_i64().expect("catalog id");

    let mut payment = PaymentRequest::new(catalog_id, Decimal::from(80_000));
    payment.pricing.duration = Some(2);
    payment.created_at = Some(at(today(), 10, 0));
    let recorded = record_payment(data_dir.clone(), payment).await.expect("record payment");
    assert!(recorded.catalog_deviation.is_none());

    let reservations = get_reservations(data_dir, Some(catalog_id)).await.expect("reservations");
    assert_eq!(reservations.len(), 1);
    assert_eq!(reservations[0].start_date, today());
    assert_eq!(reservations[0].end_date, today() + Duration::days(2));
    assert_eq!(reservations[0].transaction_id, recorded.transaction.id);
}

#[tokio::test]
async fn catalog_rejects_amounts_beyond_the_ledger_limit() {
    let (_tmp, data_dir) = create_data_dir();
    let entry = CatalogEntry {
        fixed_amount: Some(Decimal::from_i128_with_scale(10_i128.pow(28), 0)),
        ..property_tax()
    };
    let err = catalog_crud(data_dir.clone(), "create".to_string(), Some(entry), None)
        .await
        .expect_err("oversized tariff rejected");
    assert!(err.contains("ledger limit"));

    let listed = catalog_crud(data_dir, "list".to_string(), None, None).await.expect("list");
    assert!(listed.as_array().expect("catalog array").is_empty());
}

#[tokio::test]
async fn identical_transaction_within_five_minutes_is_a_duplicate() {
    let (_tmp, data_dir) = create_data_dir();
    let base = NewTransaction::new("ACTE_NAISSANCE", "Extrait d'acte de naissance", Decimal::from(3_000))
        .with_agent(12);

    let first = record_transaction(data_dir.clone(), base.clone().at(at(today(), 9, 0)))
        .await
        .expect("first");
    assert!(!first.assessment.has(AnomalyKind::DoublonSuspect));

    let second = record_transaction(data_dir.clone(), base.clone().at(at(today(), 9, 4)))
        .await
        .expect("second");
    assert!(second.assessment.has(AnomalyKind::DoublonSuspect));
    assert_ne!(second.status, AssessmentStatus::Ok);

    let later = record_transaction(data_dir.clone(), base.at(at(today(), 9, 30)))
        .await
        .expect("later");
    assert!(!later.assessment.has(AnomalyKind::DoublonSuspect));

    let reassessed = assess_transaction(data_dir, second.transaction.id)
        .await
        .expect("reassess");
    assert!(reassessed.has(AnomalyKind::DoublonSuspect));
}

#[tokio::test]
async fn large_amount_is_never_ok() {
    let (_tmp, data_dir) = create_data_dir();
    let new = NewTransaction::new("TAXE_PYLONE", "Pylône", Decimal::from(500_000)).at(at(today(), 11, 0));

    let recorded = record_transaction(data_dir, new).await.expect("record");
    assert!(recorded.assessment.has(AnomalyKind::MontantEleveSuspect));
    assert_ne!(recorded.status, AssessmentStatus::Ok);
    assert_eq!(recorded.alert_ids.len(), 1);
}

#[tokio::test]
async fn low_revenue_sweep_alerts_once_per_run_unless_deduplicated() {
    let (_tmp, data_dir) = create_data_dir();

    for offset in 1..=7 {
        let day = today() - Duration::days(offset);
        let tx = NewTransaction::new("TAXE_MARCHE", "Étal", Decimal::from(40_000)).at(at(day, 10, 0));
        record_transaction(data_dir.clone(), tx).await.expect("history");
    }
    let tx = NewTransaction::new("TAXE_MARCHE", "Étal", Decimal::from(5_000)).at(at(today(), 10, 0));
    record_transaction(data_dir.clone(), tx).await.expect("today");

    let first = run_daily_sweep(data_dir.clone()).await.expect("sweep");
    assert!(first
        .flags
        .iter()
        .any(|flag| flag.kind == SweepFlagKind::RecettesAnormalementFaibles));
    assert_eq!(first.alerts_created, 1);

    let second = run_daily_sweep(data_dir.clone()).await.expect("sweep");
    assert_eq!(second.alerts_created, 1);

    save_settings(data_dir.clone(), json!({ "dedupeDailyAlerts": true }))
        .await
        .expect("enable dedupe");
    let keyed = run_daily_sweep(data_dir.clone()).await.expect("sweep");
    assert_eq!(keyed.alerts_created, 1);
    let repeated = run_daily_sweep(data_dir.clone()).await.expect("sweep");
    assert_eq!(repeated.alerts_created, 0);

    let pending = alerts_crud(data_dir.clone(), "list".to_string(), None)
        .await
        .expect("list alerts");
    let sweep_alerts = pending
        .as_array()
        .expect("alert array")
        .iter()
        .filter(|alert| alert["category"] == json!("RECETTES_ANORMALEMENT_FAIBLES"))
        .count();
    assert_eq!(sweep_alerts, 3);

    let cycle = run_surveillance_cycle(data_dir).await.expect("cycle");
    assert!(cycle.daily.is_some());
    assert!(cycle.notes.is_empty());
}

#[tokio::test]
async fn integrity_drops_to_ninety_with_one_critical_alert() {
    let (_tmp, data_dir) = create_data_dir();

    let clean = get_integrity_score(data_dir.clone()).await.expect("integrity");
    assert_eq!(clean.score, 100);

    let created = catalog_crud(data_dir.clone(), "create".to_string(), Some(property_tax()), None)
        .await
        .expect("create catalog entry");
    let payment = PaymentRequest {
        created_at: Some(at(today(), 10, 0)),
        ..PaymentRequest::new(created["id"].as_i64().expect("id"), Decimal::from(10_000))
    };
    record_payment(data_dir.clone(), payment).await.expect("record payment");

    let report = get_integrity_score(data_dir).await.expect("integrity");
    assert_eq!(report.score, 90);
    assert_eq!(report.level, IntegrityLevel::Excellent);
}

#[tokio::test]
async fn reporting_commands_summarize_today() {
    let (_tmp, data_dir) = create_data_dir();
    for (type_code, amount) in [("TAXE_MARCHE", 2_000), ("ACTE_NAISSANCE", 3_000), ("LOCATION_BUS", 80_000)] {
        let tx = NewTransaction::new(type_code, "Test", Decimal::from(amount)).at(at(today(), 10, 0));
        record_transaction(data_dir.clone(), tx).await.expect("record");
    }

    let report = get_daily_report(data_dir.clone(), None).await.expect("report");
    assert_eq!(report.total_transactions, 3);
    assert!((report.total_revenue - 85_000.0).abs() < 1e-6);
    assert_eq!(report.by_category.len(), 3);

    let stats = get_dashboard_stats(data_dir.clone()).await.expect("stats");
    assert_eq!(stats.transactions_today, 3);
    assert!((stats.revenue_today - 85_000.0).abs() < 1e-6);
    assert!(stats.revenue_year >= stats.revenue_month);

    let forecast = get_revenue_forecast(data_dir).await.expect("forecast");
    assert!(forecast.synthetic);
    assert_eq!(forecast.forecast.len(), 30);
}

#[tokio::test]
async fn refresh_loop_delivers_dashboard_stats() {
    let (_tmp, data_dir) = create_data_dir();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);

    let handle = start_refresh_loop(data_dir, Some(1), move |stats| {
        sink.lock().expect("lock").push(stats);
    })
    .await
    .expect("start loop");
    handle.await.expect("loop finished");

    let seen = seen.lock().expect("lock");
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].pending_alerts, 0);
}
