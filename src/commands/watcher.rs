use crate::commands::db::{dashboard_stats, get_db_connection, local_now};
use crate::commands::settings::load_thresholds;
use crate::error::LedgerError;
use crate::models::surveillance::DashboardStats;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Re-read the dashboard statistics every `refreshIntervalSecs` and hand them to `on_refresh`.
/// Stops after `max_ticks` refreshes when given, otherwise runs until the handle is aborted.
pub async fn start_refresh_loop<F>(
    data_dir: String,
    max_ticks: Option<u64>,
    mut on_refresh: F,
) -> Result<JoinHandle<()>, String>
where
    F: FnMut(DashboardStats) + Send + 'static,
{
    let thresholds = load_thresholds(&data_dir)?;
    let period = Duration::from_secs(thresholds.refresh_interval_secs.max(1));
    log::info!("refreshing dashboard every {}s", period.as_secs());

    let handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut ticks = 0u64;

        loop {
            interval.tick().await;

            let refreshed = get_db_connection(&data_dir)
                .and_then(|conn| dashboard_stats(&conn, local_now().date()).map_err(LedgerError::from));
            match refreshed {
                Ok(stats) => on_refresh(stats),
                Err(e) => log::warn!("dashboard refresh failed: {e}"),
            }

            ticks += 1;
            if max_ticks.is_some_and(|max| ticks >= max) {
                break;
            }
        }
    });

    Ok(handle)
}
