//! Rule-based right-sizing recommendations
//!
//! Each workload's utilization per dimension is checked against a fixed
//! threshold. Under-used dimensions get a reduced request, a monthly savings
//! estimate at the rate card price and a confidence score. Findings that
//! would save too little are dropped.

use super::aggregator::{AggregatedUsage, ResourceUsage};
use crate::config::{RateCard, RecommendationConfig};
use crate::models::{
    Priority, Recommendation, RecommendationKind, RecommendationStatus, ResourceKind, BYTES_PER_GB,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct RecommendationEngine {
    rates: RateCard,
    config: RecommendationConfig,
}

impl RecommendationEngine {
    pub fn new(rates: RateCard, config: RecommendationConfig) -> Self {
        Self { rates, config }
    }

    /// Findings for every workload, most urgent and most valuable first
    pub fn generate(
        &self,
        cluster: &str,
        usage: &BTreeMap<(String, String), AggregatedUsage>,
        now: DateTime<Utc>,
    ) -> Vec<Recommendation> {
        let mut recommendations: Vec<Recommendation> = usage
            .values()
            .flat_map(|workload| self.analyze(cluster, workload, now))
            .collect();

        recommendations.sort_by(|a, b| {
            a.priority
                .rank()
                .cmp(&b.priority.rank())
                .then(b.potential_savings.total_cmp(&a.potential_savings))
        });
        recommendations
    }

    /// Findings for a single workload, in cpu, memory, storage order
    pub fn analyze(&self, cluster: &str, usage: &AggregatedUsage, now: DateTime<Utc>) -> Vec<Recommendation> {
        let workload = usage.workload.as_deref().unwrap_or("");
        ResourceKind::ALL
            .iter()
            .filter_map(|kind| {
                let resource = usage.resource(*kind)?;
                self.evaluate(*kind, resource).map(|finding| Recommendation {
                    id: Uuid::new_v4(),
                    namespace: usage.namespace.clone(),
                    cluster: cluster.to_string(),
                    resource: *kind,
                    workload: workload.to_string(),
                    kind: finding.kind,
                    current_value: resource.mean_requested,
                    recommended_value: finding.recommended,
                    potential_savings: finding.savings,
                    confidence_score: finding.confidence,
                    priority: finding.priority,
                    status: RecommendationStatus::Pending,
                    description: describe(*kind, finding.kind, workload, &usage.namespace, resource, finding.recommended, finding.utilization),
                    remediation_steps: remediation_steps(*kind, finding.kind, workload, &usage.namespace),
                    created_at: now,
                    implemented_at: None,
                })
            })
            .collect()
    }

    fn evaluate(&self, kind: ResourceKind, resource: &ResourceUsage) -> Option<Finding> {
        let rule = self.config.rule_for(kind);
        let utilization = resource.utilization();
        if utilization >= rule.utilization_threshold {
            return None;
        }
        if kind == ResourceKind::Storage && resource.mean_requested <= 0.0 {
            return None;
        }

        let recommended = resource.mean_requested * rule.reduction_factor;
        let savings = kind.billable_units(resource.mean_requested - recommended)
            * self.rates.rate_for(kind)
            * self.config.hours_per_month;
        if savings <= self.config.min_monthly_savings {
            return None;
        }

        let priority = match kind {
            ResourceKind::Cpu if savings > self.config.high_priority_savings => Priority::High,
            ResourceKind::Cpu | ResourceKind::Memory => Priority::Medium,
            ResourceKind::Storage => Priority::Low,
        };
        let kind_of_change = match kind {
            ResourceKind::Cpu if utilization < self.config.idle_cpu_threshold => RecommendationKind::ScaleDown,
            ResourceKind::Storage if resource.mean_used <= 0.0 => RecommendationKind::DeleteUnused,
            _ => RecommendationKind::RightSize,
        };

        Some(Finding {
            kind: kind_of_change,
            recommended,
            savings,
            confidence: rule.confidence_cap.min(1.0 - utilization).max(0.0),
            priority,
            utilization,
        })
    }
}

struct Finding {
    kind: RecommendationKind,
    recommended: f64,
    savings: f64,
    confidence: f64,
    priority: Priority,
    utilization: f64,
}

fn describe(
    resource: ResourceKind,
    kind: RecommendationKind,
    workload: &str,
    namespace: &str,
    usage: &ResourceUsage,
    recommended: f64,
    utilization: f64,
) -> String {
    let pct = utilization * 100.0;
    match (resource, kind) {
        (ResourceKind::Cpu, RecommendationKind::ScaleDown) => format!(
            "CPU is nearly idle at {:.1}% utilization. Consider scaling down {} or reducing CPU requests from {:.2} to {:.2} cores.",
            pct, workload, usage.mean_requested, recommended
        ),
        (ResourceKind::Cpu, _) => format!(
            "CPU utilization is only {:.1}%. Consider reducing CPU requests from {:.2} to {:.2} cores.",
            pct, usage.mean_requested, recommended
        ),
        (ResourceKind::Memory, _) => format!(
            "Memory utilization is only {:.1}%. Consider reducing memory requests from {:.2}GB to {:.2}GB.",
            pct,
            usage.mean_requested / BYTES_PER_GB,
            recommended / BYTES_PER_GB
        ),
        (ResourceKind::Storage, RecommendationKind::DeleteUnused) => format!(
            "Storage of {:.2}GB in namespace {} shows no usage. Consider deleting unused volumes.",
            usage.mean_requested / BYTES_PER_GB,
            namespace
        ),
        (ResourceKind::Storage, _) => format!(
            "Storage utilization is only {:.1}%. Consider reducing PVC size.",
            pct
        ),
    }
}

fn remediation_steps(resource: ResourceKind, kind: RecommendationKind, workload: &str, namespace: &str) -> Vec<String> {
    match (resource, kind) {
        (ResourceKind::Cpu, RecommendationKind::ScaleDown) => vec![
            format!("Confirm deployment {} still serves traffic", workload),
            "Scale down replicas or reduce CPU requests".to_string(),
            "Monitor performance after change".to_string(),
        ],
        (ResourceKind::Cpu, _) => vec![
            format!("Update deployment {} CPU requests", workload),
            "Monitor performance after change".to_string(),
            "Adjust further if needed".to_string(),
        ],
        (ResourceKind::Memory, _) => vec![
            format!("Update deployment {} memory requests", workload),
            "Monitor for OOM errors".to_string(),
            "Adjust further if needed".to_string(),
        ],
        (ResourceKind::Storage, RecommendationKind::DeleteUnused) => vec![
            format!("Confirm no workload in namespace {} mounts the volumes", namespace),
            "Snapshot data worth keeping".to_string(),
            "Delete unused volumes".to_string(),
        ],
        (ResourceKind::Storage, _) => vec![
            format!("Review PVC usage in namespace {}", namespace),
            "Resize PVCs if possible".to_string(),
            "Delete unused volumes".to_string(),
        ],
    }
}
