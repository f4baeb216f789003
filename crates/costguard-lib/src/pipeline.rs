//! Scheduler entry points wiring the stores to the analytics engines
//!
//! Each `run_*` call validates its input, reads from the stores, runs one
//! engine and writes the derived records back. Empty telemetry is reported
//! as [`Analysis::InsufficientData`]; store failures propagate as
//! [`PipelineError`] so the scheduler can decide whether to retry.

use crate::analyzer::insights::{
    self, CostOverview, CostTrendPoint, NamespaceEfficiency, RecommendationSummary, TopSpenders,
};
use crate::analyzer::{
    namespace_totals, ComparisonEngine, CostAllocator, ForecastError, HistoricalPoint, RecommendationEngine,
    TrendForecast, TrendForecaster, UsageAggregator,
};
use crate::config::AnalyticsConfig;
use crate::error::{Analysis, ConfigError, PipelineError};
use crate::models::{
    ComparisonKind, NamespaceAllocation, Period, PeriodComparison, Recommendation,
    RecommendationStatus,
};
use crate::observability::{PipelineMetrics, StructuredLogger};
use crate::period::{comparison_windows, month_label, shift_months, trailing_months};
use crate::store::{ComparisonFilter, DerivedKind, DerivedStore, RecommendationFilter, TelemetryStore};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationRequest {
    pub cluster: String,
    pub period: Period,
    /// Restrict the bill to one resource group
    #[serde(default)]
    pub resource_group: Option<String>,
    /// Restrict the bill to one service category
    #[serde(default)]
    pub service: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRequest {
    pub cluster: String,
    pub kind: ComparisonKind,
    pub reference: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRequest {
    pub cluster: String,
    #[serde(default)]
    pub namespace: Option<String>,
    /// Complete calendar months of history to fit
    pub history_months: usize,
    /// Months to project
    pub horizon: usize,
    pub reference: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationRequest {
    pub cluster: String,
    /// Length of the analysis window ending at `reference`
    pub days_back: u32,
    pub reference: DateTime<Utc>,
}

pub struct Pipeline {
    telemetry: Arc<dyn TelemetryStore>,
    derived: Arc<dyn DerivedStore>,
    config: AnalyticsConfig,
    metrics: PipelineMetrics,
    logger: StructuredLogger,
}

impl Pipeline {
    pub fn new(
        telemetry: Arc<dyn TelemetryStore>,
        derived: Arc<dyn DerivedStore>,
        config: AnalyticsConfig,
    ) -> Self {
        Self {
            telemetry,
            derived,
            config,
            metrics: PipelineMetrics::new(),
            logger: StructuredLogger::new("costguard"),
        }
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    pub fn logger(&self) -> &StructuredLogger {
        &self.logger
    }

    pub fn telemetry(&self) -> &Arc<dyn TelemetryStore> {
        &self.telemetry
    }

    pub fn derived(&self) -> &Arc<dyn DerivedStore> {
        &self.derived
    }

    fn validate(&self, cluster: &str) -> Result<(), PipelineError> {
        self.config.validate()?;
        if cluster.trim().is_empty() {
            return Err(ConfigError::new("cluster", "must not be empty").into());
        }
        Ok(())
    }

    /// Allocate the bill for `request.period` across the cluster's namespaces
    pub async fn run_allocation(
        &self,
        request: &AllocationRequest,
    ) -> Result<Analysis<Vec<NamespaceAllocation>>, PipelineError> {
        self.validate(&request.cluster)?;
        let period = request.period;
        if period.end <= period.start {
            return Err(ConfigError::new("period", "end must be after start").into());
        }

        let samples = self
            .telemetry
            .fetch_usage_samples(&request.cluster, None, period)
            .await?;
        let usage = UsageAggregator::new(self.config.usage_reduction).by_namespace(&samples, period);
        if usage.is_empty() {
            return Ok(Analysis::insufficient(format!(
                "no usage samples for cluster {} between {} and {}",
                request.cluster, period.start, period.end
            )));
        }

        let bills = self
            .telemetry
            .fetch_bill_records(period, request.resource_group.as_deref(), request.service.as_deref())
            .await?;
        let total_bill: f64 = bills.iter().map(|b| b.cost).sum();

        let allocator = CostAllocator::new(self.config.rates.clone(), self.config.allocation.weighting);
        let allocations = allocator.allocate(&request.cluster, period, total_bill, &usage, Utc::now());

        let written = self
            .derived
            .upsert_allocations(allocations.clone(), self.config.allocation.rerun_policy)
            .await?;
        self.metrics.add_records_written("allocations", written);
        self.metrics.set_allocated_cost(&request.cluster, total_bill.max(0.0));
        self.logger.log_allocation_computed(
            &request.cluster,
            &format!("{}..{}", period.start.to_rfc3339(), period.end.to_rfc3339()),
            total_bill,
            allocations.len(),
        );

        Ok(Analysis::computed(allocations))
    }

    /// Compare namespace totals between the two windows of `request.kind`
    pub async fn run_comparison(
        &self,
        request: &ComparisonRequest,
    ) -> Result<Analysis<Vec<PeriodComparison>>, PipelineError> {
        self.validate(&request.cluster)?;
        let windows = comparison_windows(request.kind, request.reference);
        let span = Period::new(windows.previous.start, windows.current.end);

        let allocations = self.derived.fetch_allocations(&request.cluster, None, span).await?;
        let current = namespace_totals(&allocations, &windows.current);
        let previous = namespace_totals(&allocations, &windows.previous);
        if current.is_empty() && previous.is_empty() {
            return Ok(Analysis::insufficient(format!(
                "no allocations for cluster {} in either {} window",
                request.cluster, request.kind
            )));
        }

        let comparisons = ComparisonEngine::new().compare(
            &request.cluster,
            request.kind,
            windows,
            &current,
            &previous,
            Utc::now(),
        );
        let written = self.derived.upsert_comparisons(comparisons.clone()).await?;
        self.derived
            .mark_computed(DerivedKind::Comparisons, &request.cluster, Utc::now())
            .await?;
        self.metrics.add_records_written("comparisons", written);
        self.logger
            .log_comparison_computed(&request.cluster, request.kind.as_str(), comparisons.len());

        Ok(Analysis::computed(comparisons))
    }

    /// Fit a trend over calendar-month allocation totals and project it
    pub async fn run_forecast(
        &self,
        request: &ForecastRequest,
    ) -> Result<Analysis<TrendForecast>, PipelineError> {
        self.validate(&request.cluster)?;
        let limits = &self.config.forecast;
        if request.history_months == 0 || request.history_months > limits.max_history_months {
            return Err(ConfigError::new(
                "history_months",
                format!("must be between 1 and {}", limits.max_history_months),
            )
            .into());
        }
        if request.horizon == 0 || request.horizon > limits.max_horizon {
            return Err(ConfigError::new(
                "horizon",
                format!("must be between 1 and {}", limits.max_horizon),
            )
            .into());
        }

        let months = trailing_months(request.reference, request.history_months);
        let (first, last) = match (months.first(), months.last()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => return Ok(Analysis::insufficient("no history window")),
        };
        let allocations = self
            .derived
            .fetch_allocations(
                &request.cluster,
                request.namespace.as_deref(),
                Period::new(first.start, last.end),
            )
            .await?;

        let history: Vec<HistoricalPoint> = months
            .iter()
            .map(|month| {
                let in_month: Vec<&NamespaceAllocation> =
                    allocations.iter().filter(|a| month.encloses(&a.period)).collect();
                (month, in_month)
            })
            .skip_while(|(_, in_month)| in_month.is_empty())
            .map(|(month, in_month)| HistoricalPoint {
                period: month_label(month.start),
                cost: in_month.iter().map(|a| a.total_cost).sum(),
            })
            .collect();

        if history.len() < 2 {
            return Ok(Analysis::insufficient(format!(
                "need at least 2 months of allocations, found {}",
                history.len()
            )));
        }

        let observed = history.len();
        let forecast = TrendForecaster::new().with_max_horizon(limits.max_horizon).forecast(
            &request.cluster,
            request.namespace.as_deref(),
            history,
            request.horizon,
            |k| month_label(shift_months(last.start, i32::try_from(k.get()).unwrap_or(i32::MAX))),
        );
        match forecast {
            Ok(forecast) => {
                self.logger.log_forecast_computed(
                    &request.cluster,
                    request.namespace.as_deref(),
                    observed,
                    &forecast.trend.to_string(),
                );
                Ok(Analysis::computed(forecast))
            }
            Err(e @ ForecastError::InsufficientHistory(_)) => Ok(Analysis::insufficient(e.to_string())),
            Err(e @ ForecastError::HorizonTooLong { .. }) => {
                Err(ConfigError::new("horizon", e.to_string()).into())
            }
        }
    }

    /// Generate recommendations from workload usage over the last `days_back` days
    pub async fn run_recommendations(
        &self,
        request: &RecommendationRequest,
    ) -> Result<Analysis<Vec<Recommendation>>, PipelineError> {
        self.validate(&request.cluster)?;
        if request.days_back == 0 {
            return Err(ConfigError::new("days_back", "must be at least 1").into());
        }

        let period = Period::new(
            request.reference - Duration::days(request.days_back as i64),
            request.reference,
        );
        let samples = self
            .telemetry
            .fetch_usage_samples(&request.cluster, None, period)
            .await?;
        let usage = UsageAggregator::new(self.config.usage_reduction).by_workload(&samples, period);
        if usage.is_empty() {
            return Ok(Analysis::insufficient(format!(
                "no workload usage for cluster {} in the last {} days",
                request.cluster, request.days_back
            )));
        }

        let engine = RecommendationEngine::new(self.config.rates.clone(), self.config.recommendations.clone());
        let generated = engine.generate(&request.cluster, &usage, Utc::now());
        let stored = self.derived.upsert_recommendations(generated).await?;
        self.derived
            .mark_computed(DerivedKind::Recommendations, &request.cluster, Utc::now())
            .await?;
        self.metrics.add_records_written("recommendations", stored.len());

        let pending = self
            .derived
            .fetch_recommendations(&RecommendationFilter {
                cluster: Some(request.cluster.clone()),
                status: Some(RecommendationStatus::Pending),
                limit: Some(usize::MAX),
                ..Default::default()
            })
            .await?;
        let pending_savings: f64 = pending.iter().map(|r| r.potential_savings).sum();
        self.metrics.set_pending_savings(&request.cluster, pending_savings);
        self.logger.log_recommendations_generated(
            &request.cluster,
            stored.len(),
            stored.iter().map(|r| r.potential_savings).sum(),
        );

        Ok(Analysis::computed(stored))
    }

    /// Stored comparisons matching `filter`
    ///
    /// An empty match is reported as computed only once a comparison run has
    /// completed for the filtered cluster.
    pub async fn comparisons(
        &self,
        filter: &ComparisonFilter,
    ) -> Result<Analysis<Vec<PeriodComparison>>, PipelineError> {
        let found = self.derived.fetch_comparisons(filter).await?;
        self.stored_outcome(DerivedKind::Comparisons, filter.cluster.as_deref(), found)
            .await
    }

    /// Stored recommendations matching `filter`, with the same empty-result
    /// rule as [`Pipeline::comparisons`]
    pub async fn recommendations(
        &self,
        filter: &RecommendationFilter,
    ) -> Result<Analysis<Vec<Recommendation>>, PipelineError> {
        let found = self.derived.fetch_recommendations(filter).await?;
        self.stored_outcome(DerivedKind::Recommendations, filter.cluster.as_deref(), found)
            .await
    }

    async fn stored_outcome<T>(
        &self,
        kind: DerivedKind,
        cluster: Option<&str>,
        found: Vec<T>,
    ) -> Result<Analysis<Vec<T>>, PipelineError> {
        if !found.is_empty() || self.derived.last_computed(kind, cluster).await?.is_some() {
            return Ok(Analysis::computed(found));
        }
        let kind = match kind {
            DerivedKind::Comparisons => "comparison",
            DerivedKind::Recommendations => "recommendation",
        };
        Ok(Analysis::insufficient(match cluster {
            Some(cluster) => format!("no {} run has completed for cluster {}", kind, cluster),
            None => format!("no {} run has completed", kind),
        }))
    }

    /// Per-namespace efficiency over the last `days_back` days
    pub async fn efficiency(
        &self,
        cluster: &str,
        namespace: Option<&str>,
        days_back: u32,
        reference: DateTime<Utc>,
    ) -> Result<Analysis<Vec<NamespaceEfficiency>>, PipelineError> {
        self.validate(cluster)?;
        let period = Period::new(reference - Duration::days(days_back.max(1) as i64), reference);
        let samples = self.telemetry.fetch_usage_samples(cluster, namespace, period).await?;
        if samples.is_empty() {
            return Ok(Analysis::insufficient("no usage samples in the requested window"));
        }
        Ok(Analysis::computed(insights::efficiency(&samples)))
    }

    pub async fn recommendation_summary(
        &self,
        cluster: Option<&str>,
        namespace: Option<&str>,
    ) -> Result<RecommendationSummary, PipelineError> {
        let recommendations = self
            .derived
            .fetch_recommendations(&RecommendationFilter {
                cluster: cluster.map(str::to_string),
                namespace: namespace.map(str::to_string),
                limit: Some(usize::MAX),
                ..Default::default()
            })
            .await?;
        Ok(insights::summarize_recommendations(&recommendations))
    }

    /// Top namespaces and bill services over the last `months` x 30 days
    pub async fn top_spenders(
        &self,
        cluster: &str,
        months: u32,
        limit: usize,
        reference: DateTime<Utc>,
    ) -> Result<TopSpenders, PipelineError> {
        self.validate(cluster)?;
        let months = months.max(1);
        let period = Period::new(reference - Duration::days(months as i64 * 30), reference);
        let allocations = self.derived.fetch_allocations(cluster, None, period).await?;
        let bills = self.telemetry.fetch_bill_records(period, None, None).await?;
        Ok(insights::top_spenders(&allocations, &bills, months, limit))
    }

    /// Billed cost for `period` against the allocations stored inside it
    pub async fn cost_overview(
        &self,
        cluster: &str,
        period: Period,
        resource_group: Option<&str>,
    ) -> Result<Analysis<CostOverview>, PipelineError> {
        self.validate(cluster)?;
        if period.end <= period.start {
            return Err(ConfigError::new("period", "end must be after start").into());
        }
        let bills = self.telemetry.fetch_bill_records(period, resource_group, None).await?;
        let allocations = self.derived.fetch_allocations(cluster, None, period).await?;
        if bills.is_empty() && allocations.is_empty() {
            return Ok(Analysis::insufficient(format!(
                "no bill records or allocations for cluster {} between {} and {}",
                cluster, period.start, period.end
            )));
        }
        Ok(Analysis::computed(insights::cost_overview(cluster, period, &bills, &allocations)))
    }

    /// Allocated cost per complete calendar month before `reference`, oldest first
    pub async fn cost_trends(
        &self,
        cluster: &str,
        namespace: Option<&str>,
        months: usize,
        reference: DateTime<Utc>,
    ) -> Result<Analysis<Vec<CostTrendPoint>>, PipelineError> {
        self.validate(cluster)?;
        let max = self.config.forecast.max_history_months;
        if months == 0 || months > max {
            return Err(ConfigError::new("months", format!("must be between 1 and {}", max)).into());
        }

        let window = trailing_months(reference, months);
        let (first, last) = match (window.first(), window.last()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => return Ok(Analysis::insufficient("no trend window")),
        };
        let allocations = self
            .derived
            .fetch_allocations(cluster, namespace, Period::new(first.start, last.end))
            .await?;
        if allocations.is_empty() {
            return Ok(Analysis::insufficient(format!(
                "no allocations for cluster {} in the last {} months",
                cluster, months
            )));
        }
        Ok(Analysis::computed(insights::cost_trends(&window, &allocations)))
    }

    pub async fn update_recommendation_status(
        &self,
        id: Uuid,
        status: RecommendationStatus,
    ) -> Result<Recommendation, PipelineError> {
        let before = self.derived.get_recommendation(id).await?;
        let updated = self
            .derived
            .update_recommendation_status(id, status, Utc::now())
            .await?;
        self.logger
            .log_status_changed(&id.to_string(), before.status.as_str(), updated.status.as_str());
        Ok(updated)
    }
}
