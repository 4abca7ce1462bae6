use crate::models::forecast::{
    DepletionEstimate, DepletionStatus, LinearFit, PointKind, RevenueForecast, RevenuePoint, Trend,
};
use chrono::{Duration, NaiveDate};
use std::collections::BTreeMap;

/// Real days required before the synthetic fallback is dropped.
pub const MIN_REAL_DAYS: usize = 3;
const SLOPE_EPSILON: f64 = 1e-9;
const DEPLETION_CRITICAL_DAYS: f64 = 7.0;

/// Ordinary least squares over `(x, y)` pairs.
pub fn fit_linear(points: &[(f64, f64)]) -> Option<LinearFit> {
    if points.len() < 2 {
        return None;
    }

    let n = points.len() as f64;
    let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;

    let (sxy, sxx) = points.iter().fold((0.0, 0.0), |(sxy, sxx), (x, y)| {
        let dx = x - mean_x;
        (sxy + dx * (y - mean_y), sxx + dx * dx)
    });

    if sxx.abs() < f64::EPSILON {
        return None;
    }

    let slope = sxy / sxx;
    Some(LinearFit {
        slope,
        intercept: mean_y - slope * mean_x,
    })
}

/// Predicted values for `last_x + 1 ..= last_x + horizon`.
pub fn project(fit: &LinearFit, last_x: f64, horizon: usize) -> Vec<f64> {
    (1..=horizon).map(|step| fit.predict(last_x + step as f64)).collect()
}

pub fn classify_trend(slope: f64) -> Trend {
    if slope > 0.0 {
        Trend::Haussiere
    } else {
        Trend::Baissiere
    }
}

/// Deterministic fallback covering `days` days ending at `today`.
pub fn synthetic_series(today: NaiveDate, days: i64) -> Vec<(NaiveDate, f64)> {
    (0..days)
        .map(|i| {
            let date = today - Duration::days(days - 1 - i);
            let revenue = (15_000.0 + ((days - i) * 50) as f64).max(2_000.0);
            (date, revenue)
        })
        .collect()
}

/// Daily revenue history used for fitting. Fewer than [`MIN_REAL_DAYS`] real
/// days are merged over the synthetic series (real days win).
pub fn build_history(
    real: &[(NaiveDate, f64)],
    today: NaiveDate,
    days: i64,
) -> (Vec<(NaiveDate, f64)>, bool) {
    if real.len() >= MIN_REAL_DAYS {
        let mut sorted = real.to_vec();
        sorted.sort_by_key(|(date, _)| *date);
        return (sorted, false);
    }

    let mut merged: BTreeMap<NaiveDate, f64> = synthetic_series(today, days).into_iter().collect();
    for (date, revenue) in real {
        merged.insert(*date, *revenue);
    }
    (merged.into_iter().collect(), true)
}

/// Fit the history and project `horizon` days past its last date.
pub fn forecast_revenue(
    history: &[(NaiveDate, f64)],
    horizon: i64,
    synthetic: bool,
) -> Option<RevenueForecast> {
    let first = history.first()?.0;
    let points: Vec<(f64, f64)> = history
        .iter()
        .map(|(date, revenue)| ((*date - first).num_days() as f64, *revenue))
        .collect();

    let fit = fit_linear(&points)?;
    let (last_date, _) = *history.last()?;
    let last_x = (last_date - first).num_days() as f64;
    let horizon = horizon.max(0);
    let projected = project(&fit, last_x, horizon as usize);

    let forecast: Vec<RevenuePoint> = projected
        .iter()
        .enumerate()
        .map(|(i, revenue)| RevenuePoint {
            date: last_date + Duration::days(i as i64 + 1),
            revenue: *revenue,
            kind: PointKind::Prediction,
        })
        .collect();

    Some(RevenueForecast {
        history: history
            .iter()
            .map(|(date, revenue)| RevenuePoint {
                date: *date,
                revenue: *revenue,
                kind: PointKind::Historique,
            })
            .collect(),
        expected_revenue_30d: projected.iter().sum(),
        forecast,
        trend: classify_trend(fit.slope),
        slope: fit.slope,
        intercept: fit.intercept,
        synthetic,
    })
}

/// Days until a declining level series reaches zero, counted from its last point.
pub fn estimate_depletion(levels: &[(f64, f64)], today: NaiveDate) -> Option<DepletionEstimate> {
    let fit = fit_linear(levels)?;
    let last_x = levels.iter().map(|(x, _)| *x).fold(f64::MIN, f64::max);

    if fit.slope >= -SLOPE_EPSILON {
        return Some(DepletionEstimate {
            status: DepletionStatus::Stable,
            days_until_empty: None,
            predicted_date: None,
            slope: fit.slope,
        });
    }

    let zero_at = -fit.intercept / fit.slope;
    let remaining = zero_at - last_x;
    let clamped = remaining.max(0.0);

    Some(DepletionEstimate {
        status: if remaining < DEPLETION_CRITICAL_DAYS {
            DepletionStatus::Critical
        } else {
            DepletionStatus::Ok
        },
        days_until_empty: Some((clamped * 10.0).round() / 10.0),
        predicted_date: Some(today + Duration::days(clamped.round() as i64)),
        slope: fit.slope,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, 10).expect("valid date")
    }

    #[test]
    fn recovers_perfect_line() {
        let points: Vec<(f64, f64)> = (0..30).map(|x| (x as f64, 250.0 * x as f64 + 1_200.0)).collect();
        let fit = fit_linear(&points).expect("fit");
        assert!((fit.slope - 250.0).abs() < 1e-6);
        assert!((fit.intercept - 1_200.0).abs() < 1e-6);
    }

    #[test]
    fn recovers_negative_slope() {
        let points: Vec<(f64, f64)> = (0..10).map(|x| (x as f64, -3.5 * x as f64 + 40.0)).collect();
        let fit = fit_linear(&points).expect("fit");
        assert!((fit.slope + 3.5).abs() < 1e-9);
        assert!((fit.intercept - 40.0).abs() < 1e-9);
        assert_eq!(classify_trend(fit.slope), Trend::Baissiere);
    }

    #[test]
    fn degenerate_inputs_have_no_fit() {
        assert!(fit_linear(&[]).is_none());
        assert!(fit_linear(&[(1.0, 2.0)]).is_none());
        assert!(fit_linear(&[(1.0, 2.0), (1.0, 5.0)]).is_none());
    }

    #[test]
    fn projection_continues_the_line() {
        let fit = LinearFit {
            slope: 2.0,
            intercept: 1.0,
        };
        assert_eq!(project(&fit, 9.0, 3), vec![21.0, 23.0, 25.0]);
    }

    #[test]
    fn sparse_history_falls_back_to_synthetic_series() {
        let real = vec![(today(), 42_000.0)];
        let (history, synthetic) = build_history(&real, today(), 90);
        assert!(synthetic);
        assert_eq!(history.len(), 90);
        assert_eq!(history.last(), Some(&(today(), 42_000.0)));
        assert_eq!(history.first().map(|(_, r)| *r), Some(15_000.0 + 90.0 * 50.0));
    }

    #[test]
    fn enough_real_days_are_used_as_is() {
        let real = vec![
            (today() - Duration::days(1), 20_000.0),
            (today() - Duration::days(3), 10_000.0),
            (today() - Duration::days(2), 15_000.0),
        ];
        let (history, synthetic) = build_history(&real, today(), 90);
        assert!(!synthetic);
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].1, 10_000.0);
    }

    #[test]
    fn forecast_projects_thirty_days_with_rising_trend() {
        let history: Vec<(NaiveDate, f64)> = (0..10)
            .map(|i| (today() - Duration::days(9 - i), 1_000.0 + 100.0 * i as f64))
            .collect();
        let forecast = forecast_revenue(&history, 30, false).expect("forecast");
        assert_eq!(forecast.forecast.len(), 30);
        assert_eq!(forecast.trend, Trend::Haussiere);
        assert_eq!(forecast.forecast[0].date, today() + Duration::days(1));
        assert!((forecast.forecast[0].revenue - 2_000.0).abs() < 1e-6);
        let expected_total: f64 = (10..40).map(|x| 1_000.0 + 100.0 * x as f64).sum();
        assert!((forecast.expected_revenue_30d - expected_total).abs() < 1e-6);
    }

    #[test]
    fn depletion_guards_flat_and_rising_series() {
        let flat = vec![(0.0, 50.0), (1.0, 50.0), (2.0, 50.0)];
        let estimate = estimate_depletion(&flat, today()).expect("estimate");
        assert_eq!(estimate.status, DepletionStatus::Stable);
        assert!(estimate.days_until_empty.is_none());
    }

    #[test]
    fn depletion_counts_days_after_last_point() {
        // 100 - 5x reaches zero at x = 20, i.e. 11 days after x = 9.
        let levels: Vec<(f64, f64)> = (0..10).map(|x| (x as f64, 100.0 - 5.0 * x as f64)).collect();
        let estimate = estimate_depletion(&levels, today()).expect("estimate");
        assert_eq!(estimate.status, DepletionStatus::Ok);
        assert_eq!(estimate.days_until_empty, Some(11.0));
        assert_eq!(estimate.predicted_date, Some(today() + Duration::days(11)));

        let steep: Vec<(f64, f64)> = (0..10).map(|x| (x as f64, 60.0 - 5.0 * x as f64)).collect();
        let estimate = estimate_depletion(&steep, today()).expect("estimate");
        assert_eq!(estimate.status, DepletionStatus::Critical);
    }
}
