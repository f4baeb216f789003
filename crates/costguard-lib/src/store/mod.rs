//! Storage interfaces for telemetry and derived records
//!
//! The pipeline only talks to these traits. [`MemoryStore`] implements both
//! and backs the service binary and the tests.

mod memory;

pub use memory::{MemoryStore, SeedData, SeedSummary};

use crate::config::RerunPolicy;
use crate::error::StoreError;
use crate::models::{
    BillRecord, ComparisonKind, NamespaceAllocation, Period, PeriodComparison, Priority,
    Recommendation, RecommendationStatus, ResourceKind, UsageSample,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use async_trait::async_trait;

/// Default cap on query results
pub const DEFAULT_QUERY_LIMIT: usize = 100;

/// Raw telemetry produced by the collectors
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    /// Usage samples for `cluster` with timestamps in `period`
    async fn fetch_usage_samples(
        &self,
        cluster: &str,
        namespace: Option<&str>,
        period: Period,
    ) -> Result<Vec<UsageSample>, StoreError>;

    /// Bill records with timestamps in `period`
    async fn fetch_bill_records(
        &self,
        period: Period,
        resource_group: Option<&str>,
        service: Option<&str>,
    ) -> Result<Vec<BillRecord>, StoreError>;

    async fn record_usage_samples(&self, samples: Vec<UsageSample>) -> Result<usize, StoreError>;

    async fn record_bill_records(&self, records: Vec<BillRecord>) -> Result<usize, StoreError>;
}

/// Allocations, comparisons and recommendations produced by the pipeline
#[async_trait]
pub trait DerivedStore: Send + Sync {
    /// Store allocations; with [`RerunPolicy::Replace`] any earlier rows for
    /// the same (cluster, period) are dropped first
    async fn upsert_allocations(
        &self,
        allocations: Vec<NamespaceAllocation>,
        policy: RerunPolicy,
    ) -> Result<usize, StoreError>;

    /// Allocations whose period lies inside `period`
    async fn fetch_allocations(
        &self,
        cluster: &str,
        namespace: Option<&str>,
        period: Period,
    ) -> Result<Vec<NamespaceAllocation>, StoreError>;

    /// Store comparisons, replacing rows for the same namespace, kind and
    /// current period
    async fn upsert_comparisons(&self, comparisons: Vec<PeriodComparison>) -> Result<usize, StoreError>;

    async fn fetch_comparisons(&self, filter: &ComparisonFilter) -> Result<Vec<PeriodComparison>, StoreError>;

    /// Store new findings. A finding whose (cluster, namespace, workload,
    /// resource) already has a pending recommendation resolves to that stored
    /// record unchanged; one matching a dismissed recommendation is dropped.
    /// Returns the stored record for every finding kept.
    async fn upsert_recommendations(
        &self,
        recommendations: Vec<Recommendation>,
    ) -> Result<Vec<Recommendation>, StoreError>;

    async fn fetch_recommendations(
        &self,
        filter: &RecommendationFilter,
    ) -> Result<Vec<Recommendation>, StoreError>;

    async fn get_recommendation(&self, id: Uuid) -> Result<Recommendation, StoreError>;

    /// Move a recommendation to `status`, stamping `implemented_at` with `at`
    /// on the pending -> implemented transition
    async fn update_recommendation_status(
        &self,
        id: Uuid,
        status: RecommendationStatus,
        at: DateTime<Utc>,
    ) -> Result<Recommendation, StoreError>;

    /// Record that a run producing `kind` completed for `cluster`, including
    /// runs that stored nothing
    async fn mark_computed(&self, kind: DerivedKind, cluster: &str, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Latest completed run of `kind` for `cluster`, or for any cluster
    async fn last_computed(
        &self,
        kind: DerivedKind,
        cluster: Option<&str>,
    ) -> Result<Option<DateTime<Utc>>, StoreError>;
}

/// Derived outputs whose completed runs are tracked per cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DerivedKind {
    Comparisons,
    Recommendations,
}

/// Query filter for recommendations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendationFilter {
    pub cluster: Option<String>,
    pub namespace: Option<String>,
    pub status: Option<RecommendationStatus>,
    pub priority: Option<Priority>,
    pub resource: Option<ResourceKind>,
    pub limit: Option<usize>,
}

impl RecommendationFilter {
    pub fn matches(&self, rec: &Recommendation) -> bool {
        self.cluster.as_ref().map_or(true, |c| *c == rec.cluster)
            && self.namespace.as_ref().map_or(true, |n| *n == rec.namespace)
            && self.status.map_or(true, |s| s == rec.status)
            && self.priority.map_or(true, |p| p == rec.priority)
            && self.resource.map_or(true, |r| r == rec.resource)
    }

    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_QUERY_LIMIT)
    }
}

/// Query filter for comparisons
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparisonFilter {
    pub cluster: Option<String>,
    pub namespace: Option<String>,
    pub kind: Option<ComparisonKind>,
    pub limit: Option<usize>,
}

impl ComparisonFilter {
    pub fn matches(&self, comparison: &PeriodComparison) -> bool {
        self.cluster.as_ref().map_or(true, |c| *c == comparison.cluster)
            && self.namespace.as_ref().map_or(true, |n| *n == comparison.namespace)
            && self.kind.map_or(true, |k| k == comparison.comparison_kind)
    }

    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_QUERY_LIMIT)
    }
}
