//! Scheduler loop
//!
//! Ticks one interval per job kind and spawns a run per configured cluster
//! on each tick. Runs for different clusters overlap freely; the runner
//! serializes runs for the same (job kind, cluster). The `scheduler` health
//! component is healthy while the loop runs and degraded once it stops.

use super::{JobKind, JobRunner};
use crate::health::components;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info};

pub struct SchedulerLoop {
    runner: Arc<JobRunner>,
}

impl SchedulerLoop {
    pub fn new(runner: Arc<JobRunner>) -> Self {
        Self { runner }
    }

    fn ticker(&self, kind: JobKind) -> Interval {
        let mut ticker = interval(self.runner.config().interval(kind));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker
    }

    /// Run until `shutdown` fires. Every job runs once at startup.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let config = self.runner.config();
        info!(
            clusters = ?config.clusters,
            allocation_secs = config.allocation_interval_secs,
            comparison_secs = config.comparison_interval_secs,
            recommendation_secs = config.recommendation_interval_secs,
            forecast_secs = config.forecast_interval_secs,
            "Starting job scheduler"
        );

        let health = self.runner.health().clone();
        health.set_healthy(components::SCHEDULER).await;

        let mut allocation = self.ticker(JobKind::Allocation);
        let mut comparison = self.ticker(JobKind::Comparison);
        let mut forecast = self.ticker(JobKind::Forecast);
        let mut recommendations = self.ticker(JobKind::Recommendations);

        loop {
            tokio::select! {
                _ = allocation.tick() => self.dispatch(JobKind::Allocation),
                _ = comparison.tick() => self.dispatch(JobKind::Comparison),
                _ = forecast.tick() => self.dispatch(JobKind::Forecast),
                _ = recommendations.tick() => self.dispatch(JobKind::Recommendations),
                _ = shutdown.recv() => {
                    info!("Shutting down job scheduler");
                    break;
                }
            }
        }
        health.set_degraded(components::SCHEDULER, "Scheduler stopped").await;
    }

    fn dispatch(&self, kind: JobKind) {
        for cluster in &self.runner.config().clusters {
            let runner = self.runner.clone();
            let cluster = cluster.clone();
            debug!(job = %kind, cluster = %cluster, "Dispatching scheduled run");
            tokio::spawn(async move {
                runner.run(kind, &cluster).await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalyticsConfig;
    use crate::health::{ComponentStatus, HealthRegistry};
    use crate::pipeline::Pipeline;
    use crate::scheduler::ScheduleConfig;
    use crate::store::MemoryStore;
    use std::time::Duration;

    #[tokio::test]
    async fn test_scheduler_stops_on_shutdown() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = Arc::new(Pipeline::new(store.clone(), store, AnalyticsConfig::default()));
        let health = HealthRegistry::new();
        let runner = Arc::new(JobRunner::new(pipeline, ScheduleConfig::default(), health.clone()));

        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(SchedulerLoop::new(runner).run(rx));

        // startup ticks fire immediately; give the spawned runs a moment
        tokio::time::sleep(Duration::from_millis(50)).await;
        let running = health.health().await;
        assert_eq!(running.components["scheduler"].status, ComponentStatus::Healthy);

        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("scheduler did not stop")
            .unwrap();

        let stopped = health.health().await;
        assert!(stopped.components.contains_key("forecast"));
        assert_eq!(stopped.components["scheduler"].status, ComponentStatus::Degraded);
    }
}
