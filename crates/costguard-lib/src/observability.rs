//! Observability infrastructure for the cost pipeline
//!
//! Provides:
//! - Prometheus metrics (job latency, run outcomes, retries, allocated cost, pending savings)
//! - Structured JSON logging with tracing

use prometheus::{
    register_gauge_vec, register_histogram_vec, register_int_counter_vec, GaugeVec, HistogramVec,
    IntCounterVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for job latency (in seconds)
const JOB_LATENCY_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<PipelineMetricsInner> = OnceLock::new();

struct PipelineMetricsInner {
    job_duration_seconds: HistogramVec,
    job_runs: IntCounterVec,
    job_retries: IntCounterVec,
    allocated_cost: GaugeVec,
    pending_savings: GaugeVec,
    records_written: IntCounterVec,
    telemetry_ingested: IntCounterVec,
}

impl PipelineMetricsInner {
    fn new() -> Self {
        Self {
            job_duration_seconds: register_histogram_vec!(
                "costguard_job_duration_seconds",
                "Wall time of pipeline job runs",
                &["job"],
                JOB_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register job_duration_seconds"),

            job_runs: register_int_counter_vec!(
                "costguard_job_runs_total",
                "Pipeline job runs by outcome",
                &["job", "outcome"]
            )
            .expect("Failed to register job_runs_total"),

            job_retries: register_int_counter_vec!(
                "costguard_job_retries_total",
                "Retries of failed pipeline job runs",
                &["job"]
            )
            .expect("Failed to register job_retries_total"),

            allocated_cost: register_gauge_vec!(
                "costguard_allocated_cost_dollars",
                "Cost allocated to namespaces by the latest allocation run",
                &["cluster"]
            )
            .expect("Failed to register allocated_cost_dollars"),

            pending_savings: register_gauge_vec!(
                "costguard_pending_savings_dollars",
                "Monthly savings available from the latest recommendation run",
                &["cluster"]
            )
            .expect("Failed to register pending_savings_dollars"),

            records_written: register_int_counter_vec!(
                "costguard_records_written_total",
                "Derived records written to the store",
                &["kind"]
            )
            .expect("Failed to register records_written_total"),

            telemetry_ingested: register_int_counter_vec!(
                "costguard_telemetry_ingested_total",
                "Telemetry records accepted for ingestion",
                &["stream"]
            )
            .expect("Failed to register telemetry_ingested_total"),
        }
    }
}

/// Pipeline metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share it.
#[derive(Clone)]
pub struct PipelineMetrics {
    _private: (),
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMetrics {
    /// Create a metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(PipelineMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &PipelineMetricsInner {
        GLOBAL_METRICS.get_or_init(PipelineMetricsInner::new)
    }

    pub fn observe_job_duration(&self, job: &str, duration_secs: f64) {
        self.inner()
            .job_duration_seconds
            .with_label_values(&[job])
            .observe(duration_secs);
    }

    /// Count a finished run; `outcome` is one of success, insufficient_data, failed
    pub fn inc_job_run(&self, job: &str, outcome: &str) {
        self.inner().job_runs.with_label_values(&[job, outcome]).inc();
    }

    pub fn inc_job_retry(&self, job: &str) {
        self.inner().job_retries.with_label_values(&[job]).inc();
    }

    pub fn set_allocated_cost(&self, cluster: &str, dollars: f64) {
        self.inner().allocated_cost.with_label_values(&[cluster]).set(dollars);
    }

    pub fn set_pending_savings(&self, cluster: &str, dollars: f64) {
        self.inner().pending_savings.with_label_values(&[cluster]).set(dollars);
    }

    pub fn add_records_written(&self, kind: &str, count: usize) {
        self.inner()
            .records_written
            .with_label_values(&[kind])
            .inc_by(count as u64);
    }

    pub fn add_telemetry_ingested(&self, stream: &str, count: usize) {
        self.inner()
            .telemetry_ingested
            .with_label_values(&[stream])
            .inc_by(count as u64);
    }
}

/// Structured logger for pipeline events
///
/// Every event carries an `event` field and the service name so JSON logs
/// can be filtered without parsing messages.
#[derive(Clone)]
pub struct StructuredLogger {
    service: String,
}

impl StructuredLogger {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn log_job_started(&self, job: &str, cluster: &str, attempt: u32) {
        info!(
            event = "job_started",
            service = %self.service,
            job = %job,
            cluster = %cluster,
            attempt = attempt,
            "Pipeline job started"
        );
    }

    pub fn log_job_completed(&self, job: &str, cluster: &str, records: usize, duration_ms: u64) {
        info!(
            event = "job_completed",
            service = %self.service,
            job = %job,
            cluster = %cluster,
            records = records,
            duration_ms = duration_ms,
            "Pipeline job completed"
        );
    }

    pub fn log_job_failed(&self, job: &str, cluster: &str, attempt: u32, error: &str, will_retry: bool) {
        warn!(
            event = "job_failed",
            service = %self.service,
            job = %job,
            cluster = %cluster,
            attempt = attempt,
            error = %error,
            will_retry = will_retry,
            "Pipeline job failed"
        );
    }

    /// Log a run that had nothing to compute
    pub fn log_insufficient_data(&self, job: &str, cluster: &str, reason: &str) {
        info!(
            event = "insufficient_data",
            service = %self.service,
            job = %job,
            cluster = %cluster,
            reason = %reason,
            "Not enough data to compute"
        );
    }

    pub fn log_allocation_computed(&self, cluster: &str, period: &str, bill: f64, namespaces: usize) {
        info!(
            event = "allocation_computed",
            service = %self.service,
            cluster = %cluster,
            period = %period,
            total_bill = bill,
            namespaces = namespaces,
            "Allocated bill across namespaces"
        );
    }

    pub fn log_comparison_computed(&self, cluster: &str, kind: &str, namespaces: usize) {
        info!(
            event = "comparison_computed",
            service = %self.service,
            cluster = %cluster,
            comparison_kind = %kind,
            namespaces = namespaces,
            "Compared namespace costs between periods"
        );
    }

    pub fn log_forecast_computed(&self, cluster: &str, namespace: Option<&str>, history: usize, trend: &str) {
        info!(
            event = "forecast_computed",
            service = %self.service,
            cluster = %cluster,
            namespace = ?namespace,
            history_periods = history,
            trend = %trend,
            "Fitted cost trend"
        );
    }

    pub fn log_recommendations_generated(&self, cluster: &str, count: usize, potential_savings: f64) {
        info!(
            event = "recommendations_generated",
            service = %self.service,
            cluster = %cluster,
            count = count,
            potential_savings = potential_savings,
            "Generated optimization recommendations"
        );
    }

    pub fn log_status_changed(&self, id: &str, from: &str, to: &str) {
        info!(
            event = "recommendation_status_changed",
            service = %self.service,
            recommendation_id = %id,
            from = %from,
            to = %to,
            "Recommendation status updated"
        );
    }

    pub fn log_startup(&self, version: &str, clusters: &[String]) {
        info!(
            event = "service_started",
            service = %self.service,
            version = %version,
            clusters = ?clusters,
            "Cost analytics service started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "service_shutdown",
            service = %self.service,
            reason = %reason,
            "Cost analytics service shutting down"
        );
    }
}
