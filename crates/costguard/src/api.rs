//! HTTP API for health checks, Prometheus metrics, telemetry ingestion and
//! the analytics queries

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use costguard_lib::{
    analyzer::insights::{
        CostOverview, CostTrendPoint, NamespaceEfficiency, RecommendationSummary, TopSpenders,
    },
    analyzer::TrendForecast,
    health::{ComponentStatus, HealthRegistry},
    period::calendar_month,
    pipeline::ForecastRequest,
    scheduler::{JobKind, JobReport, JobRunner},
    store::{ComparisonFilter, RecommendationFilter},
    Analysis, BillRecord, NamespaceAllocation, Period, PeriodComparison, Pipeline, PipelineError,
    PipelineMetrics, Recommendation, RecommendationStatus, StoreError, UsageSample,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub pipeline: Arc<Pipeline>,
    pub runner: Arc<JobRunner>,
    pub metrics: PipelineMetrics,
}

impl AppState {
    pub fn new(health_registry: HealthRegistry, pipeline: Arc<Pipeline>, runner: Arc<JobRunner>) -> Self {
        Self {
            health_registry,
            pipeline,
            runner,
            metrics: PipelineMetrics::new(),
        }
    }
}

/// Error body returned by every API route
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Pipeline(PipelineError),
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        ApiError::Pipeline(e)
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Pipeline(e.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Pipeline(e) => {
                let status = match &e {
                    PipelineError::Configuration(_) => StatusCode::BAD_REQUEST,
                    PipelineError::Store(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
                    PipelineError::Store(StoreError::InvalidTransition { .. }) => StatusCode::CONFLICT,
                    PipelineError::Store(StoreError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
                };
                (status, e.to_string())
            }
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Health check response - returns 200 if healthy or degraded, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IngestResponse {
    pub accepted: usize,
}

async fn ingest_usage(
    State(state): State<Arc<AppState>>,
    Json(samples): Json<Vec<UsageSample>>,
) -> ApiResult<IngestResponse> {
    let accepted = state.pipeline.telemetry().record_usage_samples(samples).await?;
    state.metrics.add_telemetry_ingested("usage", accepted);
    Ok(Json(IngestResponse { accepted }))
}

async fn ingest_bills(
    State(state): State<Arc<AppState>>,
    Json(records): Json<Vec<BillRecord>>,
) -> ApiResult<IngestResponse> {
    let accepted = state.pipeline.telemetry().record_bill_records(records).await?;
    state.metrics.add_telemetry_ingested("bills", accepted);
    Ok(Json(IngestResponse { accepted }))
}

#[derive(Debug, Deserialize)]
pub struct AllocationQuery {
    pub cluster: String,
    pub namespace: Option<String>,
    /// Defaults to the start of the current calendar month
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

async fn list_allocations(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AllocationQuery>,
) -> ApiResult<Vec<NamespaceAllocation>> {
    let month = calendar_month(Utc::now());
    let period = Period::new(query.start.unwrap_or(month.start), query.end.unwrap_or(month.end));
    if period.end <= period.start {
        return Err(ApiError::BadRequest("end must be after start".to_string()));
    }
    let allocations = state
        .pipeline
        .derived()
        .fetch_allocations(&query.cluster, query.namespace.as_deref(), period)
        .await?;
    Ok(Json(allocations))
}

async fn list_comparisons(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<ComparisonFilter>,
) -> ApiResult<Analysis<Vec<PeriodComparison>>> {
    Ok(Json(state.pipeline.comparisons(&filter).await?))
}

#[derive(Debug, Deserialize)]
pub struct ForecastQuery {
    pub cluster: String,
    pub namespace: Option<String>,
    pub months: Option<usize>,
    pub horizon: Option<usize>,
}

async fn forecast(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ForecastQuery>,
) -> ApiResult<Analysis<TrendForecast>> {
    let schedule = state.runner.config();
    let request = ForecastRequest {
        cluster: query.cluster,
        namespace: query.namespace,
        history_months: query.months.unwrap_or(schedule.forecast_history_months),
        horizon: query.horizon.unwrap_or(schedule.forecast_horizon),
        reference: Utc::now(),
    };
    Ok(Json(state.pipeline.run_forecast(&request).await?))
}

async fn list_recommendations(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<RecommendationFilter>,
) -> ApiResult<Analysis<Vec<Recommendation>>> {
    Ok(Json(state.pipeline.recommendations(&filter).await?))
}

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub cluster: Option<String>,
    pub namespace: Option<String>,
}

async fn recommendation_summary(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SummaryQuery>,
) -> ApiResult<RecommendationSummary> {
    let summary = state
        .pipeline
        .recommendation_summary(query.cluster.as_deref(), query.namespace.as_deref())
        .await?;
    Ok(Json(summary))
}

async fn get_recommendation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Recommendation> {
    Ok(Json(state.pipeline.derived().get_recommendation(id).await?))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: RecommendationStatus,
}

async fn update_recommendation_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(update): Json<StatusUpdate>,
) -> ApiResult<Recommendation> {
    let updated = state
        .pipeline
        .update_recommendation_status(id, update.status)
        .await?;
    Ok(Json(updated))
}

#[derive(Debug, Deserialize)]
pub struct EfficiencyQuery {
    pub cluster: String,
    pub namespace: Option<String>,
    pub days: Option<u32>,
}

async fn efficiency(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EfficiencyQuery>,
) -> ApiResult<Analysis<Vec<NamespaceEfficiency>>> {
    let result = state
        .pipeline
        .efficiency(
            &query.cluster,
            query.namespace.as_deref(),
            query.days.unwrap_or(7),
            Utc::now(),
        )
        .await?;
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
pub struct TopSpendersQuery {
    pub cluster: String,
    pub months: Option<u32>,
    pub limit: Option<usize>,
}

async fn top_spenders(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TopSpendersQuery>,
) -> ApiResult<TopSpenders> {
    let result = state
        .pipeline
        .top_spenders(
            &query.cluster,
            query.months.unwrap_or(3),
            query.limit.unwrap_or(10),
            Utc::now(),
        )
        .await?;
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
pub struct OverviewQuery {
    pub cluster: String,
    /// Defaults to the start of the current calendar month
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

async fn cost_overview(
    State(state): State<Arc<AppState>>,
    Query(query): Query<OverviewQuery>,
) -> ApiResult<Analysis<CostOverview>> {
    let month = calendar_month(Utc::now());
    let period = Period::new(query.start.unwrap_or(month.start), query.end.unwrap_or(month.end));
    let resource_group = state.runner.config().resource_groups.get(&query.cluster).cloned();
    let overview = state
        .pipeline
        .cost_overview(&query.cluster, period, resource_group.as_deref())
        .await?;
    Ok(Json(overview))
}

#[derive(Debug, Deserialize)]
pub struct TrendsQuery {
    pub cluster: String,
    pub namespace: Option<String>,
    pub months: Option<usize>,
}

async fn cost_trends(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TrendsQuery>,
) -> ApiResult<Analysis<Vec<CostTrendPoint>>> {
    let trends = state
        .pipeline
        .cost_trends(
            &query.cluster,
            query.namespace.as_deref(),
            query.months.unwrap_or(12),
            Utc::now(),
        )
        .await?;
    Ok(Json(trends))
}

#[derive(Debug, Deserialize)]
pub struct JobQuery {
    /// Run for one cluster instead of every configured cluster
    pub cluster: Option<String>,
}

/// Run a job now, outside its schedule
async fn trigger_job(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    Query(query): Query<JobQuery>,
) -> ApiResult<Vec<JobReport>> {
    let kind: JobKind = kind.parse().map_err(ApiError::BadRequest)?;
    let clusters = match query.cluster {
        Some(cluster) => vec![cluster],
        None => state.runner.config().clusters.clone(),
    };

    info!(job = %kind, clusters = ?clusters, "Manual job run requested");
    let mut reports = Vec::with_capacity(clusters.len());
    for cluster in &clusters {
        reports.push(state.runner.run(kind, cluster).await);
    }
    Ok(Json(reports))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/telemetry/usage", post(ingest_usage))
        .route("/api/v1/telemetry/bills", post(ingest_bills))
        .route("/api/v1/allocations", get(list_allocations))
        .route("/api/v1/comparisons", get(list_comparisons))
        .route("/api/v1/forecast", get(forecast))
        .route("/api/v1/overview", get(cost_overview))
        .route("/api/v1/trends", get(cost_trends))
        .route("/api/v1/recommendations", get(list_recommendations))
        .route("/api/v1/recommendations/summary", get(recommendation_summary))
        .route("/api/v1/recommendations/:id", get(get_recommendation))
        .route("/api/v1/recommendations/:id/status", put(update_recommendation_status))
        .route("/api/v1/efficiency", get(efficiency))
        .route("/api/v1/top-spenders", get(top_spenders))
        .route("/api/v1/jobs/:kind", post(trigger_job))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
