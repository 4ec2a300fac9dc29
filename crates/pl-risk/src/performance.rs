//! Portfolio-level composition and trailing performance figures.

use pl_types::TrailingReturns;

/// One minus the Herfindahl index of the value shares in `values`.
///
/// 0 for an empty or single-holding portfolio, `1 - 1/n` for `n` equal
/// holdings. Non-positive totals yield 0.
pub fn diversification_score(values: &[f64]) -> f64 {
    let total: f64 = values.iter().sum();
    if values.is_empty() || !(total > 0.0) {
        return 0.0;
    }
    let hhi: f64 = values.iter().map(|v| (v / total).powi(2)).sum();
    (1.0 - hhi).max(0.0)
}

/// Value of fixed holdings through time.
///
/// Each entry is a quantity and its closes, oldest first. Histories are
/// aligned on their most recent bars and cut to the shortest one.
pub fn holdings_value_series(holdings: &[(f64, Vec<f64>)]) -> Vec<f64> {
    let Some(len) = holdings.iter().map(|(_, closes)| closes.len()).min() else {
        return Vec::new();
    };
    (0..len)
        .map(|t| {
            holdings
                .iter()
                .map(|(quantity, closes)| quantity * closes[closes.len() - len + t])
                .sum()
        })
        .collect()
}

/// Simple returns of `values` (oldest first) over each trailing horizon.
pub fn trailing_returns(values: &[f64]) -> TrailingReturns {
    let over = |bars: usize| -> Option<f64> {
        let last = *values.last()?;
        let base = *values.get(values.len().checked_sub(bars + 1)?)?;
        (base > 0.0).then(|| last / base - 1.0).filter(|r| r.is_finite())
    };
    let [daily, weekly, monthly, yearly] = TrailingReturns::HORIZONS;
    TrailingReturns {
        daily: over(daily),
        weekly: over(weekly),
        monthly: over(monthly),
        yearly: over(yearly),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_weights_score_one_minus_one_over_n() {
        assert!((diversification_score(&[250.0; 4]) - 0.75).abs() < 1e-12);
        assert!((diversification_score(&[10.0, 10.0]) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn concentrated_or_empty_scores_zero() {
        assert_eq!(diversification_score(&[1600.0]), 0.0);
        assert_eq!(diversification_score(&[]), 0.0);
        assert_eq!(diversification_score(&[0.0, 0.0]), 0.0);
    }

    #[test]
    fn uneven_weights_score_between() {
        // shares 0.75 / 0.25
        let score = diversification_score(&[300.0, 100.0]);
        assert!((score - (1.0 - 0.5625 - 0.0625)).abs() < 1e-12);
    }

    #[test]
    fn value_series_aligns_on_latest_bars() {
        let series = holdings_value_series(&[
            (2.0, vec![1.0, 2.0, 3.0, 4.0]),
            (1.0, vec![10.0, 20.0]),
        ]);
        assert_eq!(series, vec![16.0, 28.0]);
        assert!(holdings_value_series(&[]).is_empty());
    }

    #[test]
    fn horizons_need_enough_history() {
        let values: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let r = trailing_returns(&values);

        assert!((r.daily.unwrap() - (129.0 / 128.0 - 1.0)).abs() < 1e-12);
        assert!((r.weekly.unwrap() - (129.0 / 124.0 - 1.0)).abs() < 1e-12);
        assert!((r.monthly.unwrap() - (129.0 / 108.0 - 1.0)).abs() < 1e-12);
        assert_eq!(r.yearly, None);

        assert_eq!(trailing_returns(&[100.0]), TrailingReturns::default());
        assert_eq!(trailing_returns(&[]), TrailingReturns::default());
        assert_eq!(trailing_returns(&[0.0, 5.0]).daily, None);
    }
}
