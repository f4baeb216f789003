//! Read-side aggregates: efficiency scores, recommendation summary, top
//! spenders, the bill overview and monthly cost trends

use crate::models::{
    BillRecord, NamespaceAllocation, Period, Priority, Recommendation, RecommendationStatus, ResourceKind,
    UsageSample,
};
use crate::period::month_label;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EfficiencyScore {
    Good,
    Moderate,
    Poor,
}

impl EfficiencyScore {
    /// Score a mean utilization ratio for `kind`
    pub fn rate(kind: ResourceKind, utilization: f64) -> Self {
        let (good, poor) = match kind {
            ResourceKind::Cpu => (0.3, 0.1),
            ResourceKind::Memory => (0.4, 0.1),
            ResourceKind::Storage => (0.2, 0.05),
        };
        if utilization > good {
            EfficiencyScore::Good
        } else if utilization < poor {
            EfficiencyScore::Poor
        } else {
            EfficiencyScore::Moderate
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EfficiencyScore::Good => "good",
            EfficiencyScore::Moderate => "moderate",
            EfficiencyScore::Poor => "poor",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionEfficiency {
    pub avg_utilization: f64,
    pub score: EfficiencyScore,
    pub sample_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamespaceEfficiency {
    pub namespace: String,
    pub dimensions: BTreeMap<ResourceKind, DimensionEfficiency>,
}

/// Per-namespace mean of per-sample utilization ratios
///
/// A sample with no request counts as zero utilization.
pub fn efficiency(samples: &[UsageSample]) -> Vec<NamespaceEfficiency> {
    let mut ratios: BTreeMap<&str, BTreeMap<ResourceKind, (f64, usize)>> = BTreeMap::new();
    for sample in samples {
        let ratio = if sample.requested > 0.0 {
            sample.used / sample.requested
        } else {
            0.0
        };
        let entry = ratios
            .entry(sample.namespace.as_str())
            .or_default()
            .entry(sample.resource)
            .or_insert((0.0, 0));
        entry.0 += ratio;
        entry.1 += 1;
    }

    ratios
        .into_iter()
        .map(|(namespace, by_kind)| NamespaceEfficiency {
            namespace: namespace.to_string(),
            dimensions: by_kind
                .into_iter()
                .map(|(kind, (sum, count))| {
                    let avg = sum / count as f64;
                    (
                        kind,
                        DimensionEfficiency {
                            avg_utilization: (avg * 1000.0).round() / 1000.0,
                            score: EfficiencyScore::rate(kind, avg),
                            sample_count: count,
                        },
                    )
                })
                .collect(),
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriorityBreakdown {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecommendationSummary {
    pub total: usize,
    pub pending: usize,
    pub implemented: usize,
    pub dismissed: usize,
    /// Savings still available from pending recommendations
    pub pending_savings: f64,
    pub implemented_savings: f64,
    /// Pending recommendations only
    pub by_priority: PriorityBreakdown,
    pub by_kind: BTreeMap<String, usize>,
}

pub fn summarize_recommendations(recommendations: &[Recommendation]) -> RecommendationSummary {
    let mut summary = RecommendationSummary {
        total: recommendations.len(),
        ..Default::default()
    };

    for rec in recommendations {
        *summary.by_kind.entry(rec.kind.as_str().to_string()).or_insert(0) += 1;
        match rec.status {
            RecommendationStatus::Pending => {
                summary.pending += 1;
                summary.pending_savings += rec.potential_savings;
                match rec.priority {
                    Priority::High => summary.by_priority.high += 1,
                    Priority::Medium => summary.by_priority.medium += 1,
                    Priority::Low => summary.by_priority.low += 1,
                }
            }
            RecommendationStatus::Implemented => {
                summary.implemented += 1;
                summary.implemented_savings += rec.potential_savings;
            }
            RecommendationStatus::Dismissed => summary.dismissed += 1,
        }
    }
    summary
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spender {
    pub name: String,
    pub total_cost: f64,
    pub record_count: usize,
    pub average_monthly_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopSpenders {
    pub months: u32,
    pub namespaces: Vec<Spender>,
    pub services: Vec<Spender>,
}

/// Rank namespaces by allocated cost and bill services by billed cost
pub fn top_spenders(
    allocations: &[NamespaceAllocation],
    bills: &[BillRecord],
    months: u32,
    limit: usize,
) -> TopSpenders {
    let months = months.max(1);
    let namespaces = rank(allocations.iter().map(|a| (a.namespace.as_str(), a.total_cost)), months, limit);
    let services = rank(bills.iter().map(|b| (b.service.as_str(), b.cost)), months, limit);
    TopSpenders {
        months,
        namespaces,
        services,
    }
}

fn rank<'a>(entries: impl Iterator<Item = (&'a str, f64)>, months: u32, limit: usize) -> Vec<Spender> {
    let mut totals: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for (name, cost) in entries {
        let entry = totals.entry(name).or_insert((0.0, 0));
        entry.0 += cost;
        entry.1 += 1;
    }

    let mut ranked: Vec<Spender> = totals
        .into_iter()
        .map(|(name, (total_cost, record_count))| Spender {
            name: name.to_string(),
            total_cost,
            record_count,
            average_monthly_cost: total_cost / months as f64,
        })
        .collect();
    ranked.sort_by(|a, b| b.total_cost.total_cmp(&a.total_cost));
    ranked.truncate(limit);
    ranked
}

/// Billed cost for a window against what the allocator attributed to namespaces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostOverview {
    pub cluster: String,
    pub period: Period,
    pub total_bill: f64,
    pub allocated_cost: f64,
    /// `total_bill - allocated_cost`; negative when allocations outrun the bill
    pub unallocated_cost: f64,
    pub namespace_count: usize,
    pub by_service: BTreeMap<String, f64>,
}

pub fn cost_overview(
    cluster: &str,
    period: Period,
    bills: &[BillRecord],
    allocations: &[NamespaceAllocation],
) -> CostOverview {
    let mut by_service: BTreeMap<String, f64> = BTreeMap::new();
    for bill in bills {
        *by_service.entry(bill.service.clone()).or_insert(0.0) += bill.cost;
    }
    let total_bill: f64 = bills.iter().map(|b| b.cost).sum();
    let allocated_cost: f64 = allocations.iter().map(|a| a.total_cost).sum();
    let namespace_count = allocations
        .iter()
        .map(|a| a.namespace.as_str())
        .collect::<std::collections::BTreeSet<_>>()
        .len();

    CostOverview {
        cluster: cluster.to_string(),
        period,
        total_bill,
        allocated_cost,
        unallocated_cost: total_bill - allocated_cost,
        namespace_count,
        by_service,
    }
}

/// Allocated cost of one calendar month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostTrendPoint {
    /// `YYYY-MM`
    pub period: String,
    pub cost: f64,
    pub namespace_costs: BTreeMap<String, f64>,
}

/// Per-month totals over `months`, in the order given
///
/// Allocations count toward the month that encloses their period. Months
/// without allocations are kept with zero cost.
pub fn cost_trends(months: &[Period], allocations: &[NamespaceAllocation]) -> Vec<CostTrendPoint> {
    months
        .iter()
        .map(|month| {
            let mut namespace_costs: BTreeMap<String, f64> = BTreeMap::new();
            for allocation in allocations.iter().filter(|a| month.encloses(&a.period)) {
                *namespace_costs.entry(allocation.namespace.clone()).or_insert(0.0) += allocation.total_cost;
            }
            CostTrendPoint {
                period: month_label(month.start),
                cost: namespace_costs.values().sum(),
                namespace_costs,
            }
        })
        .collect()
}
