//! Period-over-period cost deltas per namespace

use crate::models::{ComparisonKind, NamespaceAllocation, PercentChange, Period, PeriodComparison};
use crate::period::ComparisonWindows;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Sum allocation cost per namespace for allocations lying inside `window`
pub fn namespace_totals(allocations: &[NamespaceAllocation], window: &Period) -> BTreeMap<String, f64> {
    let mut totals = BTreeMap::new();
    for allocation in allocations.iter().filter(|a| window.encloses(&a.period)) {
        *totals.entry(allocation.namespace.clone()).or_insert(0.0) += allocation.total_cost;
    }
    totals
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ComparisonEngine;

impl ComparisonEngine {
    pub fn new() -> Self {
        Self
    }

    /// One comparison per namespace seen in either period; a namespace
    /// missing from one side counts as zero there
    pub fn compare(
        &self,
        cluster: &str,
        kind: ComparisonKind,
        windows: ComparisonWindows,
        current: &BTreeMap<String, f64>,
        previous: &BTreeMap<String, f64>,
        now: DateTime<Utc>,
    ) -> Vec<PeriodComparison> {
        let namespaces: BTreeSet<&String> = current.keys().chain(previous.keys()).collect();

        namespaces
            .into_iter()
            .map(|namespace| {
                let current_cost = current.get(namespace).copied().unwrap_or(0.0);
                let previous_cost = previous.get(namespace).copied().unwrap_or(0.0);
                PeriodComparison {
                    id: Uuid::new_v4(),
                    namespace: namespace.clone(),
                    cluster: cluster.to_string(),
                    comparison_kind: kind,
                    current_period: windows.current,
                    previous_period: windows.previous,
                    current_cost,
                    previous_cost,
                    percentage_change: PercentChange::between(previous_cost, current_cost),
                    absolute_change: current_cost - previous_cost,
                    created_at: now,
                }
            })
            .collect()
    }

    /// Totals both windows from one allocation set, then compares them
    pub fn compare_allocations(
        &self,
        cluster: &str,
        kind: ComparisonKind,
        windows: ComparisonWindows,
        allocations: &[NamespaceAllocation],
        now: DateTime<Utc>,
    ) -> Vec<PeriodComparison> {
        let current = namespace_totals(allocations, &windows.current);
        let previous = namespace_totals(allocations, &windows.previous);
        self.compare(cluster, kind, windows, &current, &previous, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AllocationMethod;
    use crate::period::{calendar_month, comparison_windows};
    use chrono::TimeZone;

    fn allocation(ns: &str, month: u32, cost: f64) -> NamespaceAllocation {
        let ts = Utc.with_ymd_and_hms(2024, month, 10, 0, 0, 0).unwrap();
        NamespaceAllocation {
            id: Uuid::new_v4(),
            namespace: ns.to_string(),
            cluster: "prod".to_string(),
            period: calendar_month(ts),
            total_cost: cost,
            cpu_cost: cost,
            memory_cost: 0.0,
            storage_cost: 0.0,
            network_cost: 0.0,
            other_cost: 0.0,
            allocation_method: AllocationMethod::ResourceUsage,
            created_at: ts,
        }
    }

    fn reference() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_month_over_month_deltas() {
        let allocations = vec![
            allocation("web", 1, 100.0),
            allocation("web", 2, 150.0),
            allocation("batch", 1, 80.0),
            allocation("batch", 2, 40.0),
        ];
        let windows = comparison_windows(ComparisonKind::MonthOverMonth, reference());
        let results = ComparisonEngine::new().compare_allocations(
            "prod",
            ComparisonKind::MonthOverMonth,
            windows,
            &allocations,
            reference(),
        );

        assert_eq!(results.len(), 2);
        let web = results.iter().find(|c| c.namespace == "web").unwrap();
        assert_eq!(web.current_cost, 150.0);
        assert_eq!(web.previous_cost, 100.0);
        assert_eq!(web.absolute_change, 50.0);
        assert_eq!(web.percentage_change, PercentChange::Finite(50.0));

        let batch = results.iter().find(|c| c.namespace == "batch").unwrap();
        assert_eq!(batch.percentage_change, PercentChange::Finite(-50.0));
    }

    #[test]
    fn test_new_and_vanished_namespaces() {
        let allocations = vec![allocation("fresh", 2, 30.0), allocation("gone", 1, 20.0)];
        let windows = comparison_windows(ComparisonKind::MonthOverMonth, reference());
        let results = ComparisonEngine::new().compare_allocations(
            "prod",
            ComparisonKind::MonthOverMonth,
            windows,
            &allocations,
            reference(),
        );

        let fresh = results.iter().find(|c| c.namespace == "fresh").unwrap();
        assert_eq!(fresh.previous_cost, 0.0);
        assert_eq!(fresh.percentage_change, PercentChange::Unbounded);

        let gone = results.iter().find(|c| c.namespace == "gone").unwrap();
        assert_eq!(gone.current_cost, 0.0);
        assert_eq!(gone.absolute_change, -20.0);
        assert_eq!(gone.percentage_change, PercentChange::Finite(-100.0));
    }

    #[test]
    fn test_zero_on_both_sides() {
        let current = BTreeMap::from([("idle".to_string(), 0.0)]);
        let previous = BTreeMap::from([("idle".to_string(), 0.0)]);
        let windows = comparison_windows(ComparisonKind::WeekOverWeek, reference());
        let results = ComparisonEngine::new().compare(
            "prod",
            ComparisonKind::WeekOverWeek,
            windows,
            &current,
            &previous,
            reference(),
        );
        assert_eq!(results[0].percentage_change, PercentChange::Finite(0.0));
        assert_eq!(results[0].comparison_kind, ComparisonKind::WeekOverWeek);
    }

    #[test]
    fn test_allocations_outside_windows_are_ignored() {
        // March is still open at the reference instant
        let allocations = vec![allocation("web", 3, 999.0)];
        let windows = comparison_windows(ComparisonKind::MonthOverMonth, reference());
        let results = ComparisonEngine::new().compare_allocations(
            "prod",
            ComparisonKind::MonthOverMonth,
            windows,
            &allocations,
            reference(),
        );
        assert!(results.is_empty());
    }
}
