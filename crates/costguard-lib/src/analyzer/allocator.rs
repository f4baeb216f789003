//! Distribute a cluster bill across namespaces by resource usage
//!
//! The bill is first split between cpu, memory and storage (weighted by
//! rated cost, or equally), then each dimension's portion is shared out in
//! proportion to namespace resource-hours. Whatever is left over lands in
//! `other_cost` so that the allocations for a period add up to the bill.

use super::aggregator::AggregatedUsage;
use crate::config::{DimensionWeighting, RateCard};
use crate::models::{AllocationMethod, NamespaceAllocation, Period, ResourceKind};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct CostAllocator {
    rates: RateCard,
    weighting: DimensionWeighting,
}

impl CostAllocator {
    pub fn new(rates: RateCard, weighting: DimensionWeighting) -> Self {
        Self { rates, weighting }
    }

    /// One allocation per namespace present in `usage`
    ///
    /// A non-positive bill yields all-zero allocations. The function is pure
    /// apart from fresh ids, so recomputing a period is safe.
    pub fn allocate(
        &self,
        cluster: &str,
        period: Period,
        total_bill: f64,
        usage: &BTreeMap<String, AggregatedUsage>,
        now: DateTime<Utc>,
    ) -> Vec<NamespaceAllocation> {
        if usage.is_empty() {
            return Vec::new();
        }
        let bill = if total_bill.is_finite() { total_bill.max(0.0) } else { 0.0 };

        let mut dimension_totals: BTreeMap<ResourceKind, f64> = BTreeMap::new();
        for ns in usage.values() {
            for kind in ResourceKind::ALL {
                *dimension_totals.entry(kind).or_default() += ns.resource_hours(kind);
            }
        }
        let portions = self.dimension_portions(bill, &dimension_totals);

        let mut components: Vec<(&str, [f64; 3])> = usage
            .iter()
            .map(|(namespace, ns)| {
                let mut costs = [0.0; 3];
                for (slot, kind) in ResourceKind::ALL.iter().enumerate() {
                    let total = dimension_totals.get(kind).copied().unwrap_or(0.0);
                    if total > 0.0 {
                        let share = ns.resource_hours(*kind) / total;
                        costs[slot] = share * portions.get(kind).copied().unwrap_or(0.0);
                    }
                }
                (namespace.as_str(), costs)
            })
            .collect();

        let subtotal_sum: f64 = components.iter().map(|(_, c)| c.iter().sum::<f64>()).sum();
        let remainder = (bill - subtotal_sum).max(0.0);
        let namespace_count = components.len() as f64;

        components
            .drain(..)
            .map(|(namespace, [cpu_cost, memory_cost, storage_cost])| {
                let subtotal = cpu_cost + memory_cost + storage_cost;
                let other_cost = if subtotal_sum > 0.0 {
                    remainder * subtotal / subtotal_sum
                } else {
                    remainder / namespace_count
                };
                NamespaceAllocation {
                    id: Uuid::new_v4(),
                    namespace: namespace.to_string(),
                    cluster: cluster.to_string(),
                    period,
                    total_cost: subtotal + other_cost,
                    cpu_cost,
                    memory_cost,
                    storage_cost,
                    network_cost: 0.0,
                    other_cost,
                    allocation_method: AllocationMethod::ResourceUsage,
                    created_at: now,
                }
            })
            .collect()
    }

    /// Portion of the bill assigned to each dimension that carries usage
    fn dimension_portions(
        &self,
        bill: f64,
        totals: &BTreeMap<ResourceKind, f64>,
    ) -> BTreeMap<ResourceKind, f64> {
        let active: Vec<(ResourceKind, f64)> = totals
            .iter()
            .filter(|(_, total)| **total > 0.0)
            .map(|(kind, total)| (*kind, *total))
            .collect();
        if active.is_empty() || bill <= 0.0 {
            return BTreeMap::new();
        }

        let mut weights: Vec<(ResourceKind, f64)> = match self.weighting {
            DimensionWeighting::RateCard => active
                .iter()
                .map(|(kind, total)| (*kind, total * self.rates.rate_for(*kind)))
                .collect(),
            DimensionWeighting::Equal => active.iter().map(|(kind, _)| (*kind, 1.0)).collect(),
        };
        let mut weight_sum: f64 = weights.iter().map(|(_, w)| w).sum();
        if weight_sum <= 0.0 {
            // every active dimension is unpriced
            weights = active.iter().map(|(kind, _)| (*kind, 1.0)).collect();
            weight_sum = weights.len() as f64;
        }

        weights
            .into_iter()
            .map(|(kind, weight)| (kind, bill * weight / weight_sum))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::aggregator::{ResourceUsage, UsageAggregator};
    use crate::models::{UsageSample, BYTES_PER_GB};
    use chrono::TimeZone;

    fn day() -> Period {
        Period::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap(),
        )
    }

    fn usage(ns: &str, entries: &[(ResourceKind, f64)]) -> (String, AggregatedUsage) {
        let resources = entries
            .iter()
            .map(|(kind, used)| {
                (
                    *kind,
                    ResourceUsage {
                        mean_requested: *used,
                        mean_used: *used,
                        mean_limit: *used,
                        sample_count: 1,
                    },
                )
            })
            .collect();
        (
            ns.to_string(),
            AggregatedUsage {
                namespace: ns.to_string(),
                workload: None,
                period: day(),
                resources,
            },
        )
    }

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-6, "{} != {}", a, b);
    }

    #[test]
    fn test_sum_equals_bill() {
        let usage: BTreeMap<_, _> = vec![
            usage("web", &[(ResourceKind::Cpu, 3.0), (ResourceKind::Memory, 8.0 * BYTES_PER_GB)]),
            usage("batch", &[(ResourceKind::Cpu, 1.0), (ResourceKind::Storage, 100.0 * BYTES_PER_GB)]),
        ]
        .into_iter()
        .collect();
        let allocations = CostAllocator::default().allocate("prod", day(), 1234.56, &usage, Utc::now());

        assert_eq!(allocations.len(), 2);
        let sum: f64 = allocations.iter().map(|a| a.total_cost).sum();
        assert_close(sum, 1234.56);
        for allocation in &allocations {
            assert_close(allocation.total_cost, allocation.component_sum());
            assert_eq!(allocation.network_cost, 0.0);
            assert_eq!(allocation.allocation_method, AllocationMethod::ResourceUsage);
        }
    }

    #[test]
    fn test_cpu_only_split_by_core_hours() {
        let usage: BTreeMap<_, _> = vec![
            usage("web", &[(ResourceKind::Cpu, 3.0)]),
            usage("batch", &[(ResourceKind::Cpu, 1.0)]),
        ]
        .into_iter()
        .collect();
        let allocations = CostAllocator::default().allocate("prod", day(), 100.0, &usage, Utc::now());
        let web = allocations.iter().find(|a| a.namespace == "web").unwrap();
        let batch = allocations.iter().find(|a| a.namespace == "batch").unwrap();
        assert_close(web.cpu_cost, 75.0);
        assert_close(batch.cpu_cost, 25.0);
        assert_close(web.other_cost, 0.0);
    }

    #[test]
    fn test_zero_bill_gives_zero_costs() {
        let usage: BTreeMap<_, _> = vec![usage("web", &[(ResourceKind::Cpu, 3.0)])].into_iter().collect();
        let allocations = CostAllocator::default().allocate("prod", day(), 0.0, &usage, Utc::now());
        assert_eq!(allocations.len(), 1);
        assert_eq!(allocations[0].total_cost, 0.0);
        assert_eq!(allocations[0].cpu_cost, 0.0);
        assert_eq!(allocations[0].other_cost, 0.0);
    }

    #[test]
    fn test_idle_namespaces_share_bill_as_other() {
        let usage: BTreeMap<_, _> = vec![
            usage("web", &[(ResourceKind::Cpu, 0.0)]),
            usage("batch", &[(ResourceKind::Memory, 0.0)]),
        ]
        .into_iter()
        .collect();
        let allocations = CostAllocator::default().allocate("prod", day(), 50.0, &usage, Utc::now());
        for allocation in &allocations {
            assert_close(allocation.other_cost, 25.0);
            assert_close(allocation.total_cost, 25.0);
        }
    }

    #[test]
    fn test_equal_weighting() {
        let usage: BTreeMap<_, _> = vec![
            usage("web", &[(ResourceKind::Cpu, 1.0)]),
            usage("db", &[(ResourceKind::Storage, 1.0 * BYTES_PER_GB)]),
        ]
        .into_iter()
        .collect();
        let allocator = CostAllocator::new(RateCard::default(), DimensionWeighting::Equal);
        let allocations = allocator.allocate("prod", day(), 90.0, &usage, Utc::now());
        let web = allocations.iter().find(|a| a.namespace == "web").unwrap();
        let db = allocations.iter().find(|a| a.namespace == "db").unwrap();
        assert_close(web.cpu_cost, 45.0);
        assert_close(db.storage_cost, 45.0);
    }

    #[test]
    fn test_allocates_aggregated_samples() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 6, 0, 0).unwrap();
        let samples: Vec<UsageSample> = ["web", "batch"]
            .iter()
            .map(|ns| UsageSample {
                cluster: "prod".to_string(),
                namespace: ns.to_string(),
                workload: "w".to_string(),
                resource: ResourceKind::Cpu,
                requested: 2.0,
                limit: 4.0,
                used: 1.0,
                timestamp: ts,
            })
            .collect();
        let usage = UsageAggregator::default().by_namespace(&samples, day());
        let allocations = CostAllocator::default().allocate("prod", day(), 10.0, &usage, ts);
        assert_eq!(allocations.len(), 2);
        assert!(allocations.iter().all(|a| (a.total_cost - 5.0).abs() < 1e-9));
        assert!(allocations.iter().all(|a| a.cluster == "prod" && a.created_at == ts));
    }

    #[test]
    fn test_empty_usage_allocates_nothing() {
        let allocations = CostAllocator::default().allocate("prod", day(), 10.0, &BTreeMap::new(), Utc::now());
        assert!(allocations.is_empty());
    }
}
