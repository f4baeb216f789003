//! Analytics engines
//!
//! Pure, synchronous computations over telemetry and stored allocations.
//! Data flows aggregator -> allocator -> (stored allocations) -> comparison,
//! forecast and recommendation.

mod aggregator;
mod allocator;
mod comparison;
mod forecast;
pub mod insights;
mod recommendation;

pub use aggregator::{AggregatedUsage, ResourceUsage, UsageAggregator};
pub use allocator::CostAllocator;
pub use comparison::{namespace_totals, ComparisonEngine};
pub use forecast::{
    ConfidenceTier, ForecastError, DEFAULT_MAX_HORIZON, ForecastPoint, HistoricalPoint, LinearTrend, TrendDirection,
    TrendForecast, TrendForecaster,
};
pub use recommendation::RecommendationEngine;
