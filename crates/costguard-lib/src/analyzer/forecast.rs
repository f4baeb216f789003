//! Linear trend fitting and projection over period cost totals

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroUsize;
use thiserror::Error;

/// Longest projection a forecaster accepts unless configured otherwise
pub const DEFAULT_MAX_HORIZON: usize = 24;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ForecastError {
    #[error("insufficient history: need at least 2 periods, got {0}")]
    InsufficientHistory(usize),

    #[error("horizon {requested} exceeds the maximum of {max} periods")]
    HorizonTooLong { requested: usize, max: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

impl ConfidenceTier {
    /// Tier for a projection `steps_ahead` periods past the last observation
    pub fn for_step(steps_ahead: NonZeroUsize) -> Self {
        match steps_ahead.get() {
            1 => ConfidenceTier::High,
            2 => ConfidenceTier::Medium,
            _ => ConfidenceTier::Low,
        }
    }
}

impl fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConfidenceTier::High => "high",
            ConfidenceTier::Medium => "medium",
            ConfidenceTier::Low => "low",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TrendDirection::Increasing => "increasing",
            TrendDirection::Decreasing => "decreasing",
            TrendDirection::Stable => "stable",
        })
    }
}

/// Ordinary least squares fit over `(index, value)` pairs
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearTrend {
    pub slope: f64,
    pub intercept: f64,
    /// Number of observations the fit was computed from
    pub observations: usize,
}

impl LinearTrend {
    /// Direction from the sign of the slope
    pub fn direction(&self) -> TrendDirection {
        if self.slope > 0.0 {
            TrendDirection::Increasing
        } else if self.slope < 0.0 {
            TrendDirection::Decreasing
        } else {
            TrendDirection::Stable
        }
    }

    /// Projected value `steps_ahead` periods after the last observation, floored at 0
    pub fn project(&self, steps_ahead: usize) -> f64 {
        let x = self.observations.saturating_add(steps_ahead).saturating_sub(1) as f64;
        (self.slope * x + self.intercept).max(0.0)
    }
}

/// Labelled observation or projection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalPoint {
    pub period: String,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub period: String,
    pub predicted_cost: f64,
    pub confidence: ConfidenceTier,
}

/// Fitted trend with its history and projections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendForecast {
    pub cluster: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub historical: Vec<HistoricalPoint>,
    pub forecast: Vec<ForecastPoint>,
    pub slope: f64,
    pub intercept: f64,
    pub trend: TrendDirection,
}

#[derive(Debug, Clone, Copy)]
pub struct TrendForecaster {
    max_horizon: usize,
}

impl Default for TrendForecaster {
    fn default() -> Self {
        Self {
            max_horizon: DEFAULT_MAX_HORIZON,
        }
    }
}

impl TrendForecaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_horizon(mut self, max_horizon: usize) -> Self {
        self.max_horizon = max_horizon;
        self
    }

    /// Fit a line through `values` indexed 0..n
    pub fn fit(&self, values: &[f64]) -> Result<LinearTrend, ForecastError> {
        if values.len() < 2 {
            return Err(ForecastError::InsufficientHistory(values.len()));
        }
        let n = values.len() as f64;
        let sum_x: f64 = (0..values.len()).map(|i| i as f64).sum();
        let sum_y: f64 = values.iter().sum();
        let sum_xy: f64 = values.iter().enumerate().map(|(i, y)| i as f64 * y).sum();
        let sum_x2: f64 = (0..values.len()).map(|i| (i as f64).powi(2)).sum();
        let denom = n * sum_x2 - sum_x.powi(2);
        let slope = if denom.abs() < f64::EPSILON {
            0.0
        } else {
            (n * sum_xy - sum_x * sum_y) / denom
        };
        let intercept = (sum_y - slope * sum_x) / n;

        Ok(LinearTrend {
            slope,
            intercept,
            observations: values.len(),
        })
    }

    /// Fit `history` and project `horizon` future periods
    ///
    /// `labels` yields the label of the k-th future period (k starting at 1).
    /// Horizons above the configured maximum are refused before any work.
    pub fn forecast<F>(
        &self,
        cluster: &str,
        namespace: Option<&str>,
        history: Vec<HistoricalPoint>,
        horizon: usize,
        labels: F,
    ) -> Result<TrendForecast, ForecastError>
    where
        F: Fn(NonZeroUsize) -> String,
    {
        if horizon > self.max_horizon {
            return Err(ForecastError::HorizonTooLong {
                requested: horizon,
                max: self.max_horizon,
            });
        }
        let values: Vec<f64> = history.iter().map(|p| p.cost).collect();
        let trend = self.fit(&values)?;

        let forecast = (1..=horizon)
            .filter_map(NonZeroUsize::new)
            .map(|k| ForecastPoint {
                period: labels(k),
                predicted_cost: trend.project(k.get()),
                confidence: ConfidenceTier::for_step(k),
            })
            .collect();

        Ok(TrendForecast {
            cluster: cluster.to_string(),
            namespace: namespace.map(str::to_string),
            historical: history,
            forecast,
            slope: trend.slope,
            intercept: trend.intercept,
            trend: trend.direction(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(values: &[f64]) -> Vec<HistoricalPoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, cost)| HistoricalPoint {
                period: format!("p{}", i),
                cost: *cost,
            })
            .collect()
    }

    #[test]
    fn test_fit_linear_series() {
        let trend = TrendForecaster::new().fit(&[10.0, 20.0, 30.0, 40.0]).unwrap();
        assert!((trend.slope - 10.0).abs() < 1e-9);
        assert!((trend.intercept - 10.0).abs() < 1e-9);
        assert!((trend.project(1) - 50.0).abs() < 1e-9);
        assert_eq!(trend.direction(), TrendDirection::Increasing);
    }

    #[test]
    fn test_refuses_short_series() {
        let forecaster = TrendForecaster::new();
        assert_eq!(forecaster.fit(&[]), Err(ForecastError::InsufficientHistory(0)));
        assert_eq!(forecaster.fit(&[5.0]), Err(ForecastError::InsufficientHistory(1)));
    }

    #[test]
    fn test_projection_clamped_at_zero() {
        let trend = TrendForecaster::new().fit(&[30.0, 20.0, 10.0]).unwrap();
        assert_eq!(trend.direction(), TrendDirection::Decreasing);
        assert_eq!(trend.project(1), 0.0);
        assert_eq!(trend.project(5), 0.0);
    }

    #[test]
    fn test_flat_series_is_stable() {
        let trend = TrendForecaster::new().fit(&[7.0, 7.0, 7.0]).unwrap();
        assert_eq!(trend.direction(), TrendDirection::Stable);
        assert!((trend.project(2) - 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_forecast_confidence_tiers() {
        let forecast = TrendForecaster::new()
            .forecast("prod", Some("web"), history(&[10.0, 20.0, 30.0, 40.0]), 4, |k| format!("f{}", k.get()))
            .unwrap();

        assert_eq!(forecast.namespace.as_deref(), Some("web"));
        assert_eq!(forecast.historical.len(), 4);
        let tiers: Vec<_> = forecast.forecast.iter().map(|p| p.confidence).collect();
        assert_eq!(
            tiers,
            vec![ConfidenceTier::High, ConfidenceTier::Medium, ConfidenceTier::Low, ConfidenceTier::Low]
        );
        assert_eq!(forecast.forecast[0].period, "f1");
        assert!((forecast.forecast[0].predicted_cost - 50.0).abs() < 1e-9);
        assert!((forecast.forecast[2].predicted_cost - 70.0).abs() < 1e-9);
        assert_eq!(forecast.trend, TrendDirection::Increasing);
    }

    #[test]
    fn test_horizon_above_maximum_is_refused() {
        let forecaster = TrendForecaster::new();
        let err = forecaster
            .forecast("prod", None, history(&[10.0, 20.0]), usize::MAX, |k| k.to_string())
            .unwrap_err();
        assert_eq!(
            err,
            ForecastError::HorizonTooLong {
                requested: usize::MAX,
                max: DEFAULT_MAX_HORIZON
            }
        );

        let forecast = forecaster
            .with_max_horizon(2)
            .forecast("prod", None, history(&[10.0, 20.0]), 2, |k| k.to_string())
            .unwrap();
        assert_eq!(forecast.forecast.len(), 2);
    }

    #[test]
    fn test_projection_saturates_far_ahead() {
        let trend = TrendForecaster::new().fit(&[10.0, 20.0]).unwrap();
        let far = trend.project(usize::MAX);
        assert!(far.is_finite());
        assert!(far > 0.0);
    }

    #[test]
    fn test_direction_follows_slope_sign() {
        let up = LinearTrend { slope: 1e-18, intercept: 0.0, observations: 2 };
        let down = LinearTrend { slope: -1e-18, intercept: 0.0, observations: 2 };
        let flat = LinearTrend { slope: 0.0, intercept: 0.0, observations: 2 };
        assert_eq!(up.direction(), TrendDirection::Increasing);
        assert_eq!(down.direction(), TrendDirection::Decreasing);
        assert_eq!(flat.direction(), TrendDirection::Stable);
    }

    #[test]
    fn test_confidence_for_first_steps() {
        let step = |k: usize| NonZeroUsize::new(k).unwrap();
        assert_eq!(ConfidenceTier::for_step(step(1)), ConfidenceTier::High);
        assert_eq!(ConfidenceTier::for_step(step(2)), ConfidenceTier::Medium);
        assert_eq!(ConfidenceTier::for_step(step(3)), ConfidenceTier::Low);
    }
}
