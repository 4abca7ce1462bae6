use crate::commands::db::DATA_DIR_NAME;
use crate::models::thresholds::Thresholds;
use serde_json::{json, Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

const SETTINGS_SCHEMA_VERSION: i64 = 2;

pub async fn get_settings(data_dir: String) -> Result<Value, String> {
    load_settings_from_disk(&data_dir)
}

pub async fn save_settings(data_dir: String, settings: Value) -> Result<Value, String> {
    save_settings_to_disk(&data_dir, settings)
}

/// Surveillance thresholds resolved from the sanitized settings file.
pub fn load_thresholds(data_dir: &str) -> Result<Thresholds, String> {
    let settings = load_settings_from_disk(data_dir)?;
    Ok(thresholds_from_settings(&settings))
}

pub fn thresholds_from_settings(settings: &Value) -> Thresholds {
    let defaults = Thresholds::default();
    let f64_of = |key: &str, default: f64| settings.get(key).and_then(Value::as_f64).unwrap_or(default);
    let u64_of = |key: &str, default: u64| settings.get(key).and_then(Value::as_u64).unwrap_or(default);

    Thresholds {
        deviation_pct: f64_of("deviationThresholdPct", defaults.deviation_pct),
        critical_deviation_pct: f64_of("criticalDeviationPct", defaults.critical_deviation_pct),
        large_amount: f64_of("largeAmountThreshold", defaults.large_amount),
        agent_daily_count: u64_of("agentDailyCountLimit", defaults.agent_daily_count as u64) as u32,
        agent_daily_total: f64_of("agentDailyTotalLimit", defaults.agent_daily_total),
        business_hours_start: u64_of("businessHoursStart", defaults.business_hours_start as u64) as u32,
        business_hours_end: u64_of("businessHoursEnd", defaults.business_hours_end as u64) as u32,
        duplicate_window_minutes: u64_of(
            "duplicateWindowMinutes",
            defaults.duplicate_window_minutes as u64,
        ) as i64,
        low_revenue_ratio: f64_of("lowRevenueRatio", defaults.low_revenue_ratio),
        high_revenue_ratio: f64_of("highRevenueRatio", defaults.high_revenue_ratio),
        pattern_lookback_days: u64_of("patternLookbackDays", defaults.pattern_lookback_days as u64) as i64,
        forecast_history_days: u64_of("forecastHistoryDays", defaults.forecast_history_days as u64) as i64,
        forecast_horizon_days: u64_of("forecastHorizonDays", defaults.forecast_horizon_days as u64) as i64,
        refresh_interval_secs: u64_of("refreshIntervalSecs", defaults.refresh_interval_secs),
        dedupe_daily_alerts: settings
            .get("dedupeDailyAlerts")
            .and_then(Value::as_bool)
            .unwrap_or(defaults.dedupe_daily_alerts),
        ..defaults
    }
}

pub fn load_settings_from_disk(data_dir: &str) -> Result<Value, String> {
    let path = settings_path(data_dir);
    ensure_data_dir(data_dir)?;

    let original = if path.exists() {
        let raw = fs::read_to_string(&path)
            .map_err(|e| format!("Failed to read settings.json: {e}"))?;
        serde_json::from_str::<Value>(&raw).unwrap_or_else(|e| {
            log::warn!("settings.json is not valid JSON, using defaults: {e}");
            json!({})
        })
    } else {
        json!({})
    };

    let migrated = migrate_settings(original.clone());
    if migrated != original || !path.exists() {
        write_settings_file(&path, &migrated)?;
    }

    Ok(migrated)
}

pub fn save_settings_to_disk(data_dir: &str, settings: Value) -> Result<Value, String> {
    let path = settings_path(data_dir);
    ensure_data_dir(data_dir)?;

    let mut merged = load_settings_from_disk(data_dir).unwrap_or_else(|_| default_settings());
    merge_settings(&mut merged, &settings);

    let migrated = migrate_settings(merged);
    write_settings_file(&path, &migrated)?;
    log::info!("settings saved to {}", path.display());
    Ok(migrated)
}

fn settings_path(data_dir: &str) -> PathBuf {
    Path::new(data_dir).join(DATA_DIR_NAME).join("settings.json")
}

fn ensure_data_dir(data_dir: &str) -> Result<(), String> {
    let dir = Path::new(data_dir).join(DATA_DIR_NAME);
    fs::create_dir_all(&dir)
        .map_err(|e| format!("Failed to create {DATA_DIR_NAME} directory: {e}"))
}

fn write_settings_file(path: &Path, settings: &Value) -> Result<(), String> {
    let raw = serde_json::to_string_pretty(settings)
        .map_err(|e| format!("Failed to serialize settings: {e}"))?;
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write settings.json: {e}"))
}

fn migrate_settings(input: Value) -> Value {
    let defaults = default_settings();
    let mut out = match input {
        Value::Object(map) => Value::Object(map),
        _ => Value::Object(Map::new()),
    };

    let version = out
        .get("schema_version")
        .and_then(Value::as_i64)
        .unwrap_or(0);

    if version < 2 {
        // V1 stored revenue ratios as percentages (50 instead of 0.5).
        migrate_ratios_from_percentages(&mut out);
        ensure_key(&mut out, "dedupeDailyAlerts", json!(false));
    }

    deep_merge_defaults(&mut out, &defaults);
    sanitize_settings(&mut out);
    if let Some(obj) = out.as_object_mut() {
        obj.insert("schema_version".to_string(), json!(SETTINGS_SCHEMA_VERSION));
    }

    out
}

fn default_settings() -> Value {
    json!({
        "schema_version": SETTINGS_SCHEMA_VERSION,
        "deviationThresholdPct": 20.0,
        "criticalDeviationPct": 50.0,
        "largeAmountThreshold": 100000.0,
        "agentDailyCountLimit": 20,
        "agentDailyTotalLimit": 500000.0,
        "businessHoursStart": 7,
        "businessHoursEnd": 19,
        "duplicateWindowMinutes": 5,
        "lowRevenueRatio": 0.5,
        "highRevenueRatio": 2.0,
        "patternLookbackDays": 7,
        "forecastHistoryDays": 90,
        "forecastHorizonDays": 30,
        "refreshIntervalSecs": 30,
        "dedupeDailyAlerts": false
    })
}

fn deep_merge_defaults(target: &mut Value, defaults: &Value) {
    let (Some(target_obj), Some(default_obj)) = (target.as_object_mut(), defaults.as_object()) else {
        return;
    };

    for (key, default_value) in default_obj {
        match target_obj.get_mut(key) {
            Some(existing) => {
                if existing.is_object() && default_value.is_object() {
                    deep_merge_defaults(existing, default_value);
                }
            }
            None => {
                target_obj.insert(key.clone(), default_value.clone());
            }
        }
    }
}

fn ensure_key(target: &mut Value, key: &str, value: Value) {
    if let Some(obj) = target.as_object_mut() {
        obj.entry(key.to_string()).or_insert(value);
    }
}

fn merge_settings(target: &mut Value, incoming: &Value) {
    match (target, incoming) {
        (Value::Object(target_obj), Value::Object(incoming_obj)) => {
            for (key, value) in incoming_obj {
                if let Some(existing) = target_obj.get_mut(key) {
                    merge_settings(existing, value);
                } else {
                    target_obj.insert(key.clone(), value.clone());
                }
            }
        }
        (target_slot, incoming_value) => {
            *target_slot = incoming_value.clone();
        }
    }
}

fn migrate_ratios_from_percentages(settings: &mut Value) {
    let Some(obj) = settings.as_object_mut() else {
        return;
    };

    for key in ["lowRevenueRatio", "highRevenueRatio"] {
        if let Some(v) = obj.get(key).and_then(Value::as_f64).filter(|v| *v > 10.0) {
            obj.insert(key.to_string(), json!(v / 100.0));
        }
    }
}

fn sanitize_settings(settings: &mut Value) {
    let Some(obj) = settings.as_object_mut() else {
        return;
    };

    clamp_f64(obj, "deviationThresholdPct", 1.0, 100.0, 20.0);
    clamp_f64(obj, "criticalDeviationPct", 1.0, 1000.0, 50.0);
    clamp_f64(obj, "largeAmountThreshold", 1.0, 1e12, 100_000.0);
    clamp_u64(obj, "agentDailyCountLimit", 1, 1000, 20);
    clamp_f64(obj, "agentDailyTotalLimit", 1.0, 1e12, 500_000.0);
    clamp_u64(obj, "businessHoursStart", 0, 23, 7);
    clamp_u64(obj, "businessHoursEnd", 1, 24, 19);
    clamp_u64(obj, "duplicateWindowMinutes", 1, 1440, 5);
    clamp_f64(obj, "lowRevenueRatio", 0.01, 1.0, 0.5);
    clamp_f64(obj, "highRevenueRatio", 1.0, 100.0, 2.0);
    clamp_u64(obj, "patternLookbackDays", 1, 90, 7);
    clamp_u64(obj, "forecastHistoryDays", 7, 365, 90);
    clamp_u64(obj, "forecastHorizonDays", 1, 365, 30);
    clamp_u64(obj, "refreshIntervalSecs", 5, 3600, 30);

    ensure_bool(obj, "dedupeDailyAlerts", false);

    // The critical band sits above the plain deviation band.
    let deviation = obj.get("deviationThresholdPct").and_then(Value::as_f64).unwrap_or(20.0);
    let critical = obj.get("criticalDeviationPct").and_then(Value::as_f64).unwrap_or(50.0);
    if critical < deviation {
        obj.insert("criticalDeviationPct".to_string(), json!(deviation));
    }

    let start = obj.get("businessHoursStart").and_then(Value::as_u64).unwrap_or(7);
    let end = obj.get("businessHoursEnd").and_then(Value::as_u64).unwrap_or(19);
    if end <= start {
        obj.insert("businessHoursStart".to_string(), json!(7));
        obj.insert("businessHoursEnd".to_string(), json!(19));
    }
}

fn clamp_u64(map: &mut Map<String, Value>, key: &str, min: u64, max: u64, default: u64) {
    let raw = map.get(key).and_then(Value::as_u64).unwrap_or(default);
    map.insert(key.to_string(), json!(raw.clamp(min, max)));
}

fn clamp_f64(map: &mut Map<String, Value>, key: &str, min: f64, max: f64, default: f64) {
    let raw = map
        .get(key)
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite())
        .unwrap_or(default);
    map.insert(key.to_string(), json!(raw.clamp(min, max)));
}

fn ensure_bool(map: &mut Map<String, Value>, key: &str, default: bool) {
    let value = map.get(key).and_then(Value::as_bool).unwrap_or(default);
    map.insert(key.to_string(), json!(value));
}
