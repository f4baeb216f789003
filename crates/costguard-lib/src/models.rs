//! Core data models for the cost analytics pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Bytes per GiB, used to turn memory/storage byte amounts into GB-hours
pub const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Half-open time window `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Period {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Period {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Window length in hours (0 for empty or inverted windows)
    pub fn hours(&self) -> f64 {
        let secs = (self.end - self.start).num_seconds().max(0);
        secs as f64 / 3600.0
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }

    /// True when `other` lies entirely inside this window
    pub fn encloses(&self, other: &Period) -> bool {
        other.start >= self.start && other.end <= self.end
    }
}

/// Resource dimension tracked by usage samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Cpu,
    Memory,
    Storage,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 3] = [ResourceKind::Cpu, ResourceKind::Memory, ResourceKind::Storage];

    /// Convert a raw amount (cores or bytes) to the unit the rate card prices
    pub fn billable_units(&self, amount: f64) -> f64 {
        match self {
            ResourceKind::Cpu => amount,
            ResourceKind::Memory | ResourceKind::Storage => amount / BYTES_PER_GB,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Cpu => "cpu",
            ResourceKind::Memory => "memory",
            ResourceKind::Storage => "storage",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One resource-usage observation for a workload
///
/// CPU amounts are in cores, memory and storage amounts in bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSample {
    pub cluster: String,
    pub namespace: String,
    pub workload: String,
    pub resource: ResourceKind,
    pub requested: f64,
    pub limit: f64,
    pub used: f64,
    pub timestamp: DateTime<Utc>,
}

/// Provider billing line item for one time bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillRecord {
    pub cost: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub service: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_group: Option<String>,
    pub timestamp: DateTime<Utc>,
}

fn default_currency() -> String {
    "USD".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationMethod {
    ResourceUsage,
}

/// Cost allocated to one namespace for one period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamespaceAllocation {
    pub id: Uuid,
    pub namespace: String,
    pub cluster: String,
    pub period: Period,
    pub total_cost: f64,
    pub cpu_cost: f64,
    pub memory_cost: f64,
    pub storage_cost: f64,
    pub network_cost: f64,
    pub other_cost: f64,
    pub allocation_method: AllocationMethod,
    pub created_at: DateTime<Utc>,
}

impl NamespaceAllocation {
    /// Sum of the component costs; equals `total_cost` within float tolerance
    pub fn component_sum(&self) -> f64 {
        self.cpu_cost + self.memory_cost + self.storage_cost + self.network_cost + self.other_cost
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonKind {
    #[serde(rename = "month-over-month")]
    MonthOverMonth,
    #[serde(rename = "week-over-week")]
    WeekOverWeek,
}

impl ComparisonKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonKind::MonthOverMonth => "month-over-month",
            ComparisonKind::WeekOverWeek => "week-over-week",
        }
    }
}

impl fmt::Display for ComparisonKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComparisonKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "month-over-month" | "mom" | "monthly" => Ok(ComparisonKind::MonthOverMonth),
            "week-over-week" | "wow" | "weekly" => Ok(ComparisonKind::WeekOverWeek),
            other => Err(format!("unsupported comparison kind: {}", other)),
        }
    }
}

/// Relative change between two periods
///
/// A rise from zero has no finite percentage and is reported as `Unbounded`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PercentChange {
    Finite(f64),
    Unbounded,
}

impl PercentChange {
    pub fn between(previous: f64, current: f64) -> Self {
        if previous > 0.0 {
            PercentChange::Finite((current - previous) / previous * 100.0)
        } else if current > 0.0 {
            PercentChange::Unbounded
        } else {
            PercentChange::Finite(0.0)
        }
    }

    pub fn finite(&self) -> Option<f64> {
        match self {
            PercentChange::Finite(pct) => Some(*pct),
            PercentChange::Unbounded => None,
        }
    }
}

impl fmt::Display for PercentChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PercentChange::Finite(pct) => write!(f, "{:+.1}%", pct),
            PercentChange::Unbounded => f.write_str("new"),
        }
    }
}

/// Cost delta for one namespace between two periods
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodComparison {
    pub id: Uuid,
    pub namespace: String,
    pub cluster: String,
    pub comparison_kind: ComparisonKind,
    pub current_period: Period,
    pub previous_period: Period,
    pub current_cost: f64,
    pub previous_cost: f64,
    pub percentage_change: PercentChange,
    pub absolute_change: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    RightSize,
    ScaleDown,
    DeleteUnused,
}

impl RecommendationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendationKind::RightSize => "right_size",
            RecommendationKind::ScaleDown => "scale_down",
            RecommendationKind::DeleteUnused => "delete_unused",
        }
    }
}

impl fmt::Display for RecommendationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    /// Sort key, most urgent first
    pub fn rank(&self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            other => Err(format!("unknown priority: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationStatus {
    Pending,
    Implemented,
    Dismissed,
}

impl RecommendationStatus {
    /// Allowed operator transitions. Implemented is terminal; a dismissed
    /// recommendation may be reopened.
    pub fn can_transition_to(&self, next: RecommendationStatus) -> bool {
        use RecommendationStatus::*;
        match (self, next) {
            (from, to) if *from == to => true,
            (Pending, Implemented) | (Pending, Dismissed) | (Dismissed, Pending) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendationStatus::Pending => "pending",
            RecommendationStatus::Implemented => "implemented",
            RecommendationStatus::Dismissed => "dismissed",
        }
    }
}

impl fmt::Display for RecommendationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecommendationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(RecommendationStatus::Pending),
            "implemented" => Ok(RecommendationStatus::Implemented),
            "dismissed" => Ok(RecommendationStatus::Dismissed),
            other => Err(format!("unknown status: {}", other)),
        }
    }
}

/// Cost-optimization recommendation for one workload and resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: Uuid,
    pub namespace: String,
    pub cluster: String,
    pub resource: ResourceKind,
    pub workload: String,
    pub kind: RecommendationKind,
    pub current_value: f64,
    pub recommended_value: f64,
    pub potential_savings: f64,
    pub confidence_score: f64,
    pub priority: Priority,
    pub status: RecommendationStatus,
    pub description: String,
    pub remediation_steps: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implemented_at: Option<DateTime<Utc>>,
}

impl Recommendation {
    /// Key used to match a fresh finding against an earlier pending one
    pub fn dedup_key(&self) -> (&str, &str, &str, ResourceKind) {
        (&self.cluster, &self.namespace, &self.workload, self.resource)
    }
}
