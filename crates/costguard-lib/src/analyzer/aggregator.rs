//! Collapse raw usage samples into per-window usage figures

use crate::config::UsageReduction;
use crate::models::{Period, ResourceKind, UsageSample};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reduced requested/used/limit figures for one resource dimension
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub mean_requested: f64,
    pub mean_used: f64,
    pub mean_limit: f64,
    pub sample_count: usize,
}

impl ResourceUsage {
    /// used / requested, 0 when nothing was requested
    pub fn utilization(&self) -> f64 {
        if self.mean_requested > 0.0 {
            self.mean_used / self.mean_requested
        } else {
            0.0
        }
    }
}

/// Usage of one namespace (or one workload within it) over a window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedUsage {
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workload: Option<String>,
    pub period: Period,
    pub resources: BTreeMap<ResourceKind, ResourceUsage>,
}

impl AggregatedUsage {
    pub fn resource(&self, kind: ResourceKind) -> Option<&ResourceUsage> {
        self.resources.get(&kind)
    }

    pub fn sample_count(&self) -> usize {
        self.resources.values().map(|r| r.sample_count).sum()
    }

    /// Used amount over the window in billable units: core-hours for cpu,
    /// GB-hours for memory and storage
    pub fn resource_hours(&self, kind: ResourceKind) -> f64 {
        self.resource(kind)
            .map(|r| kind.billable_units(r.mean_used) * self.period.hours())
            .unwrap_or(0.0)
    }
}

#[derive(Default)]
struct Accumulator {
    requested: f64,
    used: f64,
    limit: f64,
    count: usize,
}

impl Accumulator {
    fn push(&mut self, sample: &UsageSample) {
        self.requested += sample.requested;
        self.used += sample.used;
        self.limit += sample.limit;
        self.count += 1;
    }

    fn reduce(&self, reduction: UsageReduction) -> ResourceUsage {
        let divisor = match reduction {
            UsageReduction::Mean => self.count.max(1) as f64,
            UsageReduction::Sum => 1.0,
        };
        ResourceUsage {
            mean_requested: self.requested / divisor,
            mean_used: self.used / divisor,
            mean_limit: self.limit / divisor,
            sample_count: self.count,
        }
    }
}

/// Groups samples by namespace or workload and reduces each resource
/// dimension. Keys without samples never appear in the output.
#[derive(Debug, Clone, Copy, Default)]
pub struct UsageAggregator {
    reduction: UsageReduction,
}

impl UsageAggregator {
    pub fn new(reduction: UsageReduction) -> Self {
        Self { reduction }
    }

    /// Per-namespace usage for samples inside `period`
    pub fn by_namespace(
        &self,
        samples: &[UsageSample],
        period: Period,
    ) -> BTreeMap<String, AggregatedUsage> {
        let grouped = self.group(samples, period, |s| s.namespace.clone());
        grouped
            .into_iter()
            .map(|(namespace, resources)| {
                let usage = AggregatedUsage {
                    namespace: namespace.clone(),
                    workload: None,
                    period,
                    resources,
                };
                (namespace, usage)
            })
            .collect()
    }

    /// Per-(namespace, workload) usage for samples inside `period`
    pub fn by_workload(
        &self,
        samples: &[UsageSample],
        period: Period,
    ) -> BTreeMap<(String, String), AggregatedUsage> {
        let grouped = self.group(samples, period, |s| (s.namespace.clone(), s.workload.clone()));
        grouped
            .into_iter()
            .map(|((namespace, workload), resources)| {
                let usage = AggregatedUsage {
                    namespace: namespace.clone(),
                    workload: Some(workload.clone()),
                    period,
                    resources,
                };
                ((namespace, workload), usage)
            })
            .collect()
    }

    fn group<K, F>(
        &self,
        samples: &[UsageSample],
        period: Period,
        key: F,
    ) -> BTreeMap<K, BTreeMap<ResourceKind, ResourceUsage>>
    where
        K: Ord,
        F: Fn(&UsageSample) -> K,
    {
        let mut acc: BTreeMap<K, BTreeMap<ResourceKind, Accumulator>> = BTreeMap::new();
        for sample in samples.iter().filter(|s| period.contains(s.timestamp)) {
            acc.entry(key(sample))
                .or_default()
                .entry(sample.resource)
                .or_default()
                .push(sample);
        }

        acc.into_iter()
            .map(|(k, by_kind)| {
                let reduced = by_kind
                    .into_iter()
                    .map(|(kind, a)| (kind, a.reduce(self.reduction)))
                    .collect();
                (k, reduced)
            })
            .collect()
    }
}
