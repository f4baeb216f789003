//! In-memory implementation of both store traits

use super::{ComparisonFilter, DerivedKind, DerivedStore, RecommendationFilter, TelemetryStore};
use crate::config::RerunPolicy;
use crate::error::StoreError;
use crate::models::{
    BillRecord, NamespaceAllocation, Period, PeriodComparison, Recommendation,
    RecommendationStatus, UsageSample,
};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

/// Telemetry fixture loaded at startup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedData {
    pub usage: Vec<UsageSample>,
    pub bills: Vec<BillRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SeedSummary {
    pub usage_samples: usize,
    pub bill_records: usize,
}

#[derive(Default)]
pub struct MemoryStore {
    usage: RwLock<Vec<UsageSample>>,
    bills: RwLock<Vec<BillRecord>>,
    allocations: RwLock<Vec<NamespaceAllocation>>,
    comparisons: RwLock<Vec<PeriodComparison>>,
    recommendations: RwLock<Vec<Recommendation>>,
    runs: RwLock<HashMap<(DerivedKind, String), DateTime<Utc>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON telemetry fixture into the store
    pub async fn load_seed(&self, path: &Path) -> anyhow::Result<SeedSummary> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read seed file {}", path.display()))?;
        let seed: SeedData = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse seed file {}", path.display()))?;

        let summary = SeedSummary {
            usage_samples: self.record_usage_samples(seed.usage).await?,
            bill_records: self.record_bill_records(seed.bills).await?,
        };
        info!(
            event = "seed_loaded",
            path = %path.display(),
            usage_samples = summary.usage_samples,
            bill_records = summary.bill_records,
            "Loaded telemetry seed"
        );
        Ok(summary)
    }
}

#[async_trait]
impl TelemetryStore for MemoryStore {
    async fn fetch_usage_samples(
        &self,
        cluster: &str,
        namespace: Option<&str>,
        period: Period,
    ) -> Result<Vec<UsageSample>, StoreError> {
        let usage = self.usage.read().await;
        Ok(usage
            .iter()
            .filter(|s| s.cluster == cluster)
            .filter(|s| namespace.map_or(true, |ns| s.namespace == ns))
            .filter(|s| period.contains(s.timestamp))
            .cloned()
            .collect())
    }

    async fn fetch_bill_records(
        &self,
        period: Period,
        resource_group: Option<&str>,
        service: Option<&str>,
    ) -> Result<Vec<BillRecord>, StoreError> {
        let bills = self.bills.read().await;
        Ok(bills
            .iter()
            .filter(|b| period.contains(b.timestamp))
            .filter(|b| resource_group.map_or(true, |rg| b.resource_group.as_deref() == Some(rg)))
            .filter(|b| service.map_or(true, |svc| b.service == svc))
            .cloned()
            .collect())
    }

    async fn record_usage_samples(&self, samples: Vec<UsageSample>) -> Result<usize, StoreError> {
        let count = samples.len();
        self.usage.write().await.extend(samples);
        Ok(count)
    }

    async fn record_bill_records(&self, records: Vec<BillRecord>) -> Result<usize, StoreError> {
        let count = records.len();
        self.bills.write().await.extend(records);
        Ok(count)
    }
}

#[async_trait]
impl DerivedStore for MemoryStore {
    async fn upsert_allocations(
        &self,
        allocations: Vec<NamespaceAllocation>,
        policy: RerunPolicy,
    ) -> Result<usize, StoreError> {
        let count = allocations.len();
        let mut stored = self.allocations.write().await;
        if policy == RerunPolicy::Replace {
            let replaced: HashSet<(String, Period)> = allocations
                .iter()
                .map(|a| (a.cluster.clone(), a.period))
                .collect();
            stored.retain(|a| !replaced.contains(&(a.cluster.clone(), a.period)));
        }
        stored.extend(allocations);
        Ok(count)
    }

    async fn fetch_allocations(
        &self,
        cluster: &str,
        namespace: Option<&str>,
        period: Period,
    ) -> Result<Vec<NamespaceAllocation>, StoreError> {
        let stored = self.allocations.read().await;
        let mut found: Vec<NamespaceAllocation> = stored
            .iter()
            .filter(|a| a.cluster == cluster)
            .filter(|a| namespace.map_or(true, |ns| a.namespace == ns))
            .filter(|a| period.encloses(&a.period))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.period.start.cmp(&b.period.start).then_with(|| a.namespace.cmp(&b.namespace)));
        Ok(found)
    }

    async fn upsert_comparisons(&self, comparisons: Vec<PeriodComparison>) -> Result<usize, StoreError> {
        let count = comparisons.len();
        let mut stored = self.comparisons.write().await;
        for comparison in comparisons {
            stored.retain(|c| {
                !(c.cluster == comparison.cluster
                    && c.namespace == comparison.namespace
                    && c.comparison_kind == comparison.comparison_kind
                    && c.current_period == comparison.current_period)
            });
            stored.push(comparison);
        }
        Ok(count)
    }

    async fn fetch_comparisons(&self, filter: &ComparisonFilter) -> Result<Vec<PeriodComparison>, StoreError> {
        let stored = self.comparisons.read().await;
        let mut found: Vec<PeriodComparison> = stored.iter().filter(|c| filter.matches(c)).cloned().collect();
        found.sort_by(|a, b| {
            b.current_period
                .start
                .cmp(&a.current_period.start)
                .then_with(|| a.namespace.cmp(&b.namespace))
        });
        found.truncate(filter.limit());
        Ok(found)
    }

    async fn upsert_recommendations(
        &self,
        recommendations: Vec<Recommendation>,
    ) -> Result<Vec<Recommendation>, StoreError> {
        let mut stored = self.recommendations.write().await;
        let mut written = Vec::with_capacity(recommendations.len());

        for rec in recommendations {
            let suppressed = stored
                .iter()
                .any(|r| r.status == RecommendationStatus::Dismissed && r.dedup_key() == rec.dedup_key());
            if suppressed {
                continue;
            }

            // a pending record is immutable apart from its status
            match stored
                .iter()
                .find(|r| r.status == RecommendationStatus::Pending && r.dedup_key() == rec.dedup_key())
            {
                Some(existing) => written.push(existing.clone()),
                None => {
                    stored.push(rec.clone());
                    written.push(rec);
                }
            }
        }
        Ok(written)
    }

    async fn fetch_recommendations(
        &self,
        filter: &RecommendationFilter,
    ) -> Result<Vec<Recommendation>, StoreError> {
        let stored = self.recommendations.read().await;
        let mut found: Vec<Recommendation> = stored.iter().filter(|r| filter.matches(r)).cloned().collect();
        found.sort_by(|a, b| {
            a.priority
                .rank()
                .cmp(&b.priority.rank())
                .then(b.potential_savings.total_cmp(&a.potential_savings))
        });
        found.truncate(filter.limit());
        Ok(found)
    }

    async fn get_recommendation(&self, id: Uuid) -> Result<Recommendation, StoreError> {
        let stored = self.recommendations.read().await;
        stored
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                entity: "recommendation",
                id: id.to_string(),
            })
    }

    async fn update_recommendation_status(
        &self,
        id: Uuid,
        status: RecommendationStatus,
        at: DateTime<Utc>,
    ) -> Result<Recommendation, StoreError> {
        let mut stored = self.recommendations.write().await;
        let rec = stored
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "recommendation",
                id: id.to_string(),
            })?;

        if !rec.status.can_transition_to(status) {
            return Err(StoreError::InvalidTransition {
                from: rec.status.to_string(),
                to: status.to_string(),
            });
        }
        if rec.status == RecommendationStatus::Pending
            && status == RecommendationStatus::Implemented
            && rec.implemented_at.is_none()
        {
            rec.implemented_at = Some(at);
        }
        rec.status = status;
        Ok(rec.clone())
    }

    async fn mark_computed(&self, kind: DerivedKind, cluster: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut runs = self.runs.write().await;
        let last = runs.entry((kind, cluster.to_string())).or_insert(at);
        *last = (*last).max(at);
        Ok(())
    }

    async fn last_computed(
        &self,
        kind: DerivedKind,
        cluster: Option<&str>,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let runs = self.runs.read().await;
        Ok(runs
            .iter()
            .filter(|((k, c), _)| *k == kind && cluster.map_or(true, |cluster| c == cluster))
            .map(|(_, at)| *at)
            .max())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AllocationMethod, Priority, RecommendationKind, ResourceKind};
    use chrono::{Duration, TimeZone};
    use std::io::Write;

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 0, 0, 0).unwrap()
    }

    fn allocation(ns: &str, period: Period, cost: f64) -> NamespaceAllocation {
        NamespaceAllocation {
            id: Uuid::new_v4(),
            namespace: ns.to_string(),
            cluster: "prod".to_string(),
            period,
            total_cost: cost,
            cpu_cost: cost,
            memory_cost: 0.0,
            storage_cost: 0.0,
            network_cost: 0.0,
            other_cost: 0.0,
            allocation_method: AllocationMethod::ResourceUsage,
            created_at: period.start,
        }
    }

    fn rec(workload: &str, savings: f64) -> Recommendation {
        Recommendation {
            id: Uuid::new_v4(),
            namespace: "web".to_string(),
            cluster: "prod".to_string(),
            resource: ResourceKind::Cpu,
            workload: workload.to_string(),
            kind: RecommendationKind::RightSize,
            current_value: 4.0,
            recommended_value: 2.0,
            potential_savings: savings,
            confidence_score: 0.8,
            priority: Priority::Medium,
            status: RecommendationStatus::Pending,
            description: "test".to_string(),
            remediation_steps: vec![],
            created_at: ts(1),
            implemented_at: None,
        }
    }

    #[tokio::test]
    async fn test_usage_filtered_by_cluster_namespace_and_window() {
        let store = MemoryStore::new();
        let sample = |cluster: &str, ns: &str, day: u32| UsageSample {
            cluster: cluster.to_string(),
            namespace: ns.to_string(),
            workload: "w".to_string(),
            resource: ResourceKind::Cpu,
            requested: 1.0,
            limit: 1.0,
            used: 0.5,
            timestamp: ts(day),
        };
        store
            .record_usage_samples(vec![sample("prod", "web", 2), sample("prod", "db", 2), sample("dev", "web", 2), sample("prod", "web", 9)])
            .await
            .unwrap();

        let window = Period::new(ts(1), ts(5));
        assert_eq!(store.fetch_usage_samples("prod", None, window).await.unwrap().len(), 2);
        assert_eq!(store.fetch_usage_samples("prod", Some("web"), window).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_bill_filters() {
        let store = MemoryStore::new();
        let bill = |service: &str, rg: Option<&str>| BillRecord {
            cost: 10.0,
            currency: "USD".to_string(),
            service: service.to_string(),
            resource_group: rg.map(str::to_string),
            timestamp: ts(3),
        };
        store
            .record_bill_records(vec![bill("compute", Some("aks")), bill("storage", Some("aks")), bill("compute", None)])
            .await
            .unwrap();
        let window = Period::new(ts(1), ts(5));
        assert_eq!(store.fetch_bill_records(window, None, None).await.unwrap().len(), 3);
        assert_eq!(store.fetch_bill_records(window, Some("aks"), None).await.unwrap().len(), 2);
        assert_eq!(store.fetch_bill_records(window, Some("aks"), Some("compute")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_replace_policy_drops_previous_run() {
        let store = MemoryStore::new();
        let march = Period::new(ts(1), Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap());
        store
            .upsert_allocations(vec![allocation("web", march, 60.0), allocation("stale", march, 40.0)], RerunPolicy::Replace)
            .await
            .unwrap();
        store
            .upsert_allocations(vec![allocation("web", march, 100.0)], RerunPolicy::Replace)
            .await
            .unwrap();

        let stored = store.fetch_allocations("prod", None, march).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].total_cost, 100.0);
    }

    #[tokio::test]
    async fn test_append_policy_keeps_rows() {
        let store = MemoryStore::new();
        let march = Period::new(ts(1), Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap());
        store.upsert_allocations(vec![allocation("web", march, 1.0)], RerunPolicy::Append).await.unwrap();
        store.upsert_allocations(vec![allocation("web", march, 2.0)], RerunPolicy::Append).await.unwrap();
        assert_eq!(store.fetch_allocations("prod", Some("web"), march).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_allocations_requires_enclosure() {
        let store = MemoryStore::new();
        let day = Period::new(ts(3), ts(4));
        store.upsert_allocations(vec![allocation("web", day, 5.0)], RerunPolicy::Replace).await.unwrap();
        assert_eq!(store.fetch_allocations("prod", None, Period::new(ts(1), ts(10))).await.unwrap().len(), 1);
        assert!(store.fetch_allocations("prod", None, Period::new(ts(3), ts(3) + Duration::hours(12))).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pending_recommendations_are_deduplicated() {
        let store = MemoryStore::new();
        let first = store.upsert_recommendations(vec![rec("api", 20.0)]).await.unwrap();

        let mut changed = rec("api", 300.0);
        changed.current_value = 40.0;
        changed.recommended_value = 10.0;
        changed.description = "changed".to_string();
        changed.created_at = ts(9);
        let second = store.upsert_recommendations(vec![changed]).await.unwrap();

        assert_eq!(second, first);
        let all = store.fetch_recommendations(&RecommendationFilter::default()).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0], first[0]);
        assert_eq!(all[0].potential_savings, 20.0);
        assert_eq!(all[0].current_value, 4.0);
        assert_eq!(all[0].description, "test");
        assert_eq!(all[0].created_at, ts(1));
    }

    #[tokio::test]
    async fn test_implemented_recommendation_allows_new_finding() {
        let store = MemoryStore::new();
        let first = store.upsert_recommendations(vec![rec("api", 20.0)]).await.unwrap();
        store
            .update_recommendation_status(first[0].id, RecommendationStatus::Implemented, ts(2))
            .await
            .unwrap();

        let second = store.upsert_recommendations(vec![rec("api", 15.0)]).await.unwrap();
        assert_ne!(second[0].id, first[0].id);
        let implemented = store.get_recommendation(first[0].id).await.unwrap();
        assert_eq!(implemented.potential_savings, 20.0);
        assert_eq!(implemented.status, RecommendationStatus::Implemented);
    }

    #[tokio::test]
    async fn test_dismissed_findings_are_not_raised_again() {
        let store = MemoryStore::new();
        let stored = store.upsert_recommendations(vec![rec("api", 20.0)]).await.unwrap();
        store
            .update_recommendation_status(stored[0].id, RecommendationStatus::Dismissed, ts(2))
            .await
            .unwrap();

        let written = store.upsert_recommendations(vec![rec("api", 25.0), rec("worker", 30.0)]).await.unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].workload, "worker");
    }

    #[tokio::test]
    async fn test_implemented_at_set_once() {
        let store = MemoryStore::new();
        let stored = store.upsert_recommendations(vec![rec("api", 20.0)]).await.unwrap();
        let id = stored[0].id;

        let implemented = store
            .update_recommendation_status(id, RecommendationStatus::Implemented, ts(5))
            .await
            .unwrap();
        assert_eq!(implemented.implemented_at, Some(ts(5)));

        // idempotent repeat keeps the original stamp
        let again = store
            .update_recommendation_status(id, RecommendationStatus::Implemented, ts(9))
            .await
            .unwrap();
        assert_eq!(again.implemented_at, Some(ts(5)));

        let err = store
            .update_recommendation_status(id, RecommendationStatus::Pending, ts(9))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_unknown_recommendation_is_not_found() {
        let store = MemoryStore::new();
        let err = store.get_recommendation(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_recommendation_filter_and_limit() {
        let store = MemoryStore::new();
        let mut high = rec("api", 100.0);
        high.priority = Priority::High;
        store
            .upsert_recommendations(vec![rec("a", 10.0), high, rec("b", 50.0)])
            .await
            .unwrap();

        let filter = RecommendationFilter {
            priority: Some(Priority::Medium),
            ..Default::default()
        };
        let medium = store.fetch_recommendations(&filter).await.unwrap();
        assert_eq!(medium.len(), 2);
        assert_eq!(medium[0].workload, "b");

        let filter = RecommendationFilter {
            limit: Some(1),
            ..Default::default()
        };
        let top = store.fetch_recommendations(&filter).await.unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].priority, Priority::High);
    }

    #[tokio::test]
    async fn test_completed_runs_are_tracked_per_cluster() {
        let store = MemoryStore::new();
        assert_eq!(store.last_computed(DerivedKind::Comparisons, None).await.unwrap(), None);

        store.mark_computed(DerivedKind::Comparisons, "prod", ts(3)).await.unwrap();
        store.mark_computed(DerivedKind::Comparisons, "prod", ts(2)).await.unwrap();
        store.mark_computed(DerivedKind::Comparisons, "dev", ts(5)).await.unwrap();

        assert_eq!(store.last_computed(DerivedKind::Comparisons, Some("prod")).await.unwrap(), Some(ts(3)));
        assert_eq!(store.last_computed(DerivedKind::Comparisons, None).await.unwrap(), Some(ts(5)));
        assert_eq!(store.last_computed(DerivedKind::Comparisons, Some("qa")).await.unwrap(), None);
        assert_eq!(store.last_computed(DerivedKind::Recommendations, Some("prod")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_load_seed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "usage": [{{"cluster":"prod","namespace":"web","workload":"api","resource":"cpu",
                           "requested":2.0,"limit":4.0,"used":0.5,"timestamp":"2024-03-02T00:00:00Z"}}],
                "bills": [{{"cost":12.5,"service":"compute","timestamp":"2024-03-02T00:00:00Z"}}]
            }}"#
        )
        .unwrap();

        let store = MemoryStore::new();
        let summary = store.load_seed(file.path()).await.unwrap();
        assert_eq!(summary, SeedSummary { usage_samples: 1, bill_records: 1 });

        let bills = store.fetch_bill_records(Period::new(ts(1), ts(5)), None, None).await.unwrap();
        assert_eq!(bills[0].currency, "USD");
    }

    #[tokio::test]
    async fn test_load_seed_reports_bad_file() {
        let store = MemoryStore::new();
        let err = store.load_seed(Path::new("/nonexistent/seed.json")).await.unwrap_err();
        assert!(err.to_string().contains("Failed to read seed file"));
    }
}
