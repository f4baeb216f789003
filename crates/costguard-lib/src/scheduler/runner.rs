//! Runs one job for one cluster with serialization and bounded retries

use super::{AllocationGranularity, JobKind, ScheduleConfig};
use crate::error::{Analysis, PipelineError};
use crate::health::HealthRegistry;
use crate::models::Period;
use crate::observability::PipelineMetrics;
use crate::period::calendar_month;
use crate::pipeline::{
    AllocationRequest, ComparisonRequest, ForecastRequest, Pipeline, RecommendationRequest,
};
use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    Succeeded { records: usize },
    InsufficientData { reason: String },
    Failed { error: String, retryable: bool },
}

impl JobOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            JobOutcome::Succeeded { .. } => "success",
            JobOutcome::InsufficientData { .. } => "insufficient_data",
            JobOutcome::Failed { .. } => "failed",
        }
    }
}

/// Result of a scheduled or manually triggered run
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub job: JobKind,
    pub cluster: String,
    pub attempts: u32,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    #[serde(flatten)]
    pub outcome: JobOutcome,
}

pub struct JobRunner {
    pipeline: Arc<Pipeline>,
    config: ScheduleConfig,
    health: HealthRegistry,
    metrics: PipelineMetrics,
    locks: DashMap<(JobKind, String), Arc<Mutex<()>>>,
}

impl JobRunner {
    pub fn new(pipeline: Arc<Pipeline>, config: ScheduleConfig, health: HealthRegistry) -> Self {
        Self {
            pipeline,
            config,
            health,
            metrics: PipelineMetrics::new(),
            locks: DashMap::new(),
        }
    }

    pub fn config(&self) -> &ScheduleConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }

    /// Run `kind` for `cluster`, waiting for any in-flight run of the same
    /// pair. Transient failures are retried up to `max_retries` times.
    pub async fn run(&self, kind: JobKind, cluster: &str) -> JobReport {
        let lock = self
            .locks
            .entry((kind, cluster.to_string()))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let logger = self.pipeline.logger();
        let started_at = Utc::now();
        let start = Instant::now();
        let mut attempt = 0u32;

        let outcome = loop {
            attempt += 1;
            logger.log_job_started(kind.as_str(), cluster, attempt);

            match self.execute_once(kind, cluster, Utc::now()).await {
                Ok(Analysis::Computed { result }) => break JobOutcome::Succeeded { records: result },
                Ok(Analysis::InsufficientData { reason }) => {
                    logger.log_insufficient_data(kind.as_str(), cluster, &reason);
                    break JobOutcome::InsufficientData { reason };
                }
                Err(e) => {
                    let retryable = e.is_retryable();
                    let will_retry = retryable && attempt <= self.config.max_retries;
                    logger.log_job_failed(kind.as_str(), cluster, attempt, &e.to_string(), will_retry);
                    if !will_retry {
                        break JobOutcome::Failed {
                            error: e.to_string(),
                            retryable,
                        };
                    }
                    self.metrics.inc_job_retry(kind.as_str());
                    tokio::time::sleep(self.config.retry_backoff()).await;
                }
            }
        };

        let elapsed = start.elapsed();
        self.metrics.observe_job_duration(kind.as_str(), elapsed.as_secs_f64());
        self.metrics.inc_job_run(kind.as_str(), outcome.label());

        match &outcome {
            JobOutcome::Failed { error, .. } => {
                self.health
                    .record_failure(kind.component(), error.clone(), self.config.unhealthy_after)
                    .await;
            }
            JobOutcome::Succeeded { records } => {
                self.health.record_success(kind.component()).await;
                logger.log_job_completed(kind.as_str(), cluster, *records, elapsed.as_millis() as u64);
            }
            JobOutcome::InsufficientData { .. } => {
                self.health.record_success(kind.component()).await;
            }
        }

        JobReport {
            job: kind,
            cluster: cluster.to_string(),
            attempts: attempt,
            started_at,
            duration_ms: elapsed.as_millis() as u64,
            outcome,
        }
    }

    /// Single attempt; returns the number of records produced
    async fn execute_once(
        &self,
        kind: JobKind,
        cluster: &str,
        now: DateTime<Utc>,
    ) -> Result<Analysis<usize>, PipelineError> {
        match kind {
            JobKind::Allocation => {
                let request = AllocationRequest {
                    cluster: cluster.to_string(),
                    period: allocation_period(self.config.allocation_granularity, now),
                    resource_group: self.config.resource_groups.get(cluster).cloned(),
                    service: None,
                };
                Ok(self.pipeline.run_allocation(&request).await?.map(|a| a.len()))
            }
            JobKind::Comparison => {
                let mut records = 0;
                let mut reasons = Vec::new();
                for comparison_kind in &self.config.comparison_kinds {
                    let request = ComparisonRequest {
                        cluster: cluster.to_string(),
                        kind: *comparison_kind,
                        reference: now,
                    };
                    match self.pipeline.run_comparison(&request).await? {
                        Analysis::Computed { result } => records += result.len(),
                        Analysis::InsufficientData { reason } => reasons.push(reason),
                    }
                }
                if records == 0 && !reasons.is_empty() {
                    Ok(Analysis::insufficient(reasons.join("; ")))
                } else {
                    Ok(Analysis::computed(records))
                }
            }
            JobKind::Forecast => {
                let request = ForecastRequest {
                    cluster: cluster.to_string(),
                    namespace: None,
                    history_months: self.config.forecast_history_months,
                    horizon: self.config.forecast_horizon,
                    reference: now,
                };
                Ok(self.pipeline.run_forecast(&request).await?.map(|f| f.forecast.len()))
            }
            JobKind::Recommendations => {
                let request = RecommendationRequest {
                    cluster: cluster.to_string(),
                    days_back: self.config.recommendation_days_back,
                    reference: now,
                };
                Ok(self.pipeline.run_recommendations(&request).await?.map(|r| r.len()))
            }
        }
    }
}

/// Period the scheduled allocation job covers at `now`
pub fn allocation_period(granularity: AllocationGranularity, now: DateTime<Utc>) -> Period {
    match granularity {
        AllocationGranularity::Month => calendar_month(now),
        AllocationGranularity::Day => {
            let today = now.date_naive().and_time(NaiveTime::MIN).and_utc();
            Period::new(today - ChronoDuration::days(1), today)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalyticsConfig;
    use crate::error::StoreError;
    use crate::health::ComponentStatus;
    use crate::models::{BillRecord, ResourceKind, UsageSample};
    use crate::period::month_start;
    use crate::store::{DerivedStore, MemoryStore, TelemetryStore};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Telemetry store that fails a fixed number of reads before delegating
    struct FlakyTelemetry {
        inner: Arc<MemoryStore>,
        failures_left: AtomicU32,
        calls: AtomicU32,
    }

    impl FlakyTelemetry {
        fn new(inner: Arc<MemoryStore>, failures: u32) -> Self {
            Self {
                inner,
                failures_left: AtomicU32::new(failures),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl TelemetryStore for FlakyTelemetry {
        async fn fetch_usage_samples(
            &self,
            cluster: &str,
            namespace: Option<&str>,
            period: Period,
        ) -> Result<Vec<UsageSample>, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(StoreError::Unavailable("connection reset".to_string()));
            }
            self.inner.fetch_usage_samples(cluster, namespace, period).await
        }

        async fn fetch_bill_records(
            &self,
            period: Period,
            resource_group: Option<&str>,
            service: Option<&str>,
        ) -> Result<Vec<BillRecord>, StoreError> {
            self.inner.fetch_bill_records(period, resource_group, service).await
        }

        async fn record_usage_samples(&self, samples: Vec<UsageSample>) -> Result<usize, StoreError> {
            self.inner.record_usage_samples(samples).await
        }

        async fn record_bill_records(&self, records: Vec<BillRecord>) -> Result<usize, StoreError> {
            self.inner.record_bill_records(records).await
        }
    }

    fn test_config(max_retries: u32) -> ScheduleConfig {
        ScheduleConfig {
            clusters: vec!["prod".to_string()],
            max_retries,
            retry_backoff_secs: 0,
            unhealthy_after: 2,
            ..Default::default()
        }
    }

    async fn seeded_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let at = month_start(Utc::now());
        store
            .record_usage_samples(vec![UsageSample {
                cluster: "prod".to_string(),
                namespace: "web".to_string(),
                workload: "api".to_string(),
                resource: ResourceKind::Cpu,
                requested: 2.0,
                limit: 2.0,
                used: 1.0,
                timestamp: at,
            }])
            .await
            .unwrap();
        store
            .record_bill_records(vec![BillRecord {
                cost: 42.0,
                currency: "USD".to_string(),
                service: "compute".to_string(),
                resource_group: None,
                timestamp: at,
            }])
            .await
            .unwrap();
        store
    }

    fn runner(telemetry: Arc<FlakyTelemetry>, store: Arc<MemoryStore>, config: ScheduleConfig) -> (JobRunner, HealthRegistry) {
        let pipeline = Arc::new(Pipeline::new(telemetry, store, AnalyticsConfig::default()));
        let health = HealthRegistry::new();
        (JobRunner::new(pipeline, config, health.clone()), health)
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let store = seeded_store().await;
        let telemetry = Arc::new(FlakyTelemetry::new(store.clone(), 2));
        let (runner, health) = runner(telemetry.clone(), store, test_config(3));

        let report = runner.run(JobKind::Allocation, "prod").await;
        assert_eq!(report.attempts, 3);
        assert_eq!(report.outcome, JobOutcome::Succeeded { records: 1 });
        assert_eq!(telemetry.calls.load(Ordering::SeqCst), 3);
        assert_eq!(health.health().await.status, ComponentStatus::Healthy);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let store = seeded_store().await;
        let telemetry = Arc::new(FlakyTelemetry::new(store.clone(), 10));
        let (runner, health) = runner(telemetry.clone(), store, test_config(3));

        let report = runner.run(JobKind::Allocation, "prod").await;
        assert_eq!(report.attempts, 4);
        assert!(matches!(report.outcome, JobOutcome::Failed { retryable: true, .. }));
        let health = health.health().await;
        assert_eq!(health.components["allocation"].status, ComponentStatus::Degraded);
    }

    #[tokio::test]
    async fn test_configuration_errors_are_not_retried() {
        let store = seeded_store().await;
        let telemetry = Arc::new(FlakyTelemetry::new(store.clone(), 0));
        let (runner, _health) = runner(telemetry.clone(), store, test_config(3));

        let report = runner.run(JobKind::Recommendations, "").await;
        assert_eq!(report.attempts, 1);
        assert!(matches!(report.outcome, JobOutcome::Failed { retryable: false, .. }));
        assert_eq!(telemetry.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_repeated_failures_turn_unhealthy() {
        let store = seeded_store().await;
        let telemetry = Arc::new(FlakyTelemetry::new(store.clone(), 10));
        let (runner, health) = runner(telemetry, store, test_config(0));

        runner.run(JobKind::Allocation, "prod").await;
        runner.run(JobKind::Allocation, "prod").await;
        assert_eq!(health.health().await.status, ComponentStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_insufficient_data_is_not_a_failure() {
        let store = Arc::new(MemoryStore::new());
        let telemetry = Arc::new(FlakyTelemetry::new(store.clone(), 0));
        let (runner, _health) = runner(telemetry, store, test_config(3));

        let report = runner.run(JobKind::Forecast, "prod").await;
        assert_eq!(report.attempts, 1);
        assert_eq!(report.outcome.label(), "insufficient_data");
    }

    #[tokio::test]
    async fn test_same_pair_runs_are_serialized() {
        let store = seeded_store().await;
        let telemetry = Arc::new(FlakyTelemetry::new(store.clone(), 0));
        let (runner, _health) = runner(telemetry, store.clone(), test_config(0));
        let runner = Arc::new(runner);

        let a = tokio::spawn({
            let runner = runner.clone();
            async move { runner.run(JobKind::Allocation, "prod").await }
        });
        let b = tokio::spawn({
            let runner = runner.clone();
            async move { runner.run(JobKind::Allocation, "prod").await }
        });
        let (a, b) = (a.await.unwrap(), b.await.unwrap());
        assert_eq!(a.outcome, JobOutcome::Succeeded { records: 1 });
        assert_eq!(b.outcome, JobOutcome::Succeeded { records: 1 });

        // replace policy keeps exactly one row per namespace for the month
        let stored = store
            .fetch_allocations("prod", None, calendar_month(Utc::now()))
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[test]
    fn test_allocation_period() {
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 10, 30, 0).unwrap();
        let month = allocation_period(AllocationGranularity::Month, now);
        assert_eq!(month.start, Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
        let day = allocation_period(AllocationGranularity::Day, now);
        assert_eq!(day.start, Utc.with_ymd_and_hms(2024, 3, 14, 0, 0, 0).unwrap());
        assert_eq!(day.end, Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap());
    }
}
