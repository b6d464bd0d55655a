//! Batch runner: one pipeline run per event on the blocking thread pool.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::CalRulesResult;
use crate::evaluator::{CompileError, Evaluator};
use crate::event::Event;
use crate::pipeline::{Decision, Pipeline, RunMode};
use crate::report::BatchReport;
use crate::rule::Rule;
use crate::store::RuleStore;

/// Number of workers when none is configured.
pub fn default_workers() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

/// Runs a compiled rule snapshot over many events. Rule edits made after the
/// runner is built do not affect it.
pub struct BatchRunner {
    pipeline: Arc<Pipeline>,
    compile_errors: Vec<CompileError>,
    workers: usize,
    run_timeout: Option<Duration>,
}

impl BatchRunner {
    pub fn new(pipeline: Pipeline, compile_errors: Vec<CompileError>) -> Self {
        BatchRunner {
            pipeline: Arc::new(pipeline),
            compile_errors,
            workers: default_workers(),
            run_timeout: None,
        }
    }

    pub fn from_rules(evaluator: Evaluator, rules: &[Rule], mode: RunMode) -> Self {
        let (pipeline, compile_errors) = Pipeline::compile(evaluator, rules, mode);
        Self::new(pipeline, compile_errors)
    }

    /// Snapshot the store's active rules.
    pub fn from_store(store: &dyn RuleStore, evaluator: Evaluator, mode: RunMode) -> CalRulesResult<Self> {
        let rules = store.active_rules()?;
        Ok(Self::from_rules(evaluator, &rules, mode))
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Limit the total time spent on each event.
    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = Some(timeout);
        self
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn compile_errors(&self) -> &[CompileError] {
        &self.compile_errors
    }

    /// Evaluate every event. Decisions come back in input order.
    pub async fn run(&self, events: Vec<Event>) -> BatchReport {
        let started_at = Utc::now();
        let started = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();

        info!(
            events = events.len(),
            rules = self.pipeline.rules().len(),
            workers = self.workers,
            "Starting batch"
        );

        for (index, event) in events.iter().cloned().enumerate() {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            let pipeline = Arc::clone(&self.pipeline);
            let run_timeout = self.run_timeout;

            tasks.spawn_blocking(move || {
                let _permit = permit;
                let deadline = run_timeout.and_then(|t| Instant::now().checked_add(t));
                (index, pipeline.run_with_deadline(&event, deadline))
            });
        }

        let mut slots: Vec<Option<Decision>> = vec![None; events.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, decision)) => slots[index] = Some(decision),
                Err(e) => warn!("Pipeline worker failed: {}", e),
            }
        }

        // A worker that died leaves its event excluded rather than silently synced
        let decisions: Vec<Decision> = slots
            .into_iter()
            .zip(events)
            .map(|(slot, event)| {
                slot.unwrap_or_else(|| Decision {
                    included: false,
                    event,
                    rule_errors: Vec::new(),
                    steps: Vec::new(),
                })
            })
            .collect();

        debug!(elapsed_ms = started.elapsed().as_millis() as u64, "Batch finished");
        BatchReport::build(started_at, self.pipeline.rules(), decisions, self.compile_errors.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventTime;
    use crate::rule::{RuleKind, RuleStatus};
    use crate::store::MemoryRuleStore;

    fn events(n: usize) -> Vec<Event> {
        (0..n)
            .map(|i| {
                let hour = 6 + (i % 12);
                Event::new(
                    format!("e{}", i),
                    format!("Event {}", i),
                    EventTime::parse(&format!("2025-01-15T{:02}:00:00Z", hour)).unwrap(),
                    EventTime::parse(&format!("2025-01-15T{:02}:30:00Z", hour)).unwrap(),
                )
            })
            .collect()
    }

    fn store() -> MemoryRuleStore {
        let mut work = Rule::new("work-hours", "Work Hours", RuleKind::Filter, "startHour >= 9 && endHour <= 18");
        work.status = RuleStatus::Active;
        let mut tag = Rule::new(
            "tag",
            "Tag",
            RuleKind::Transform,
            "event.title = '[WORK] ' + event.title; event",
        );
        tag.status = RuleStatus::Active;
        MemoryRuleStore::with_rules(vec![work, tag])
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_results_keep_input_order() {
        let runner = BatchRunner::from_store(&store(), Evaluator::default(), RunMode::Continue)
            .unwrap()
            .with_workers(3);
        let input = events(40);
        let report = runner.run(input.clone()).await;

        let ids: Vec<&str> = report.decisions.iter().map(|d| d.event.id.as_str()).collect();
        let expected: Vec<&str> = input.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, expected);
        assert!(report.decisions.iter().all(|d| d.event.title.starts_with("[WORK] ")));
    }

    #[tokio::test]
    async fn test_matches_sequential_pipeline() {
        let runner = BatchRunner::from_store(&store(), Evaluator::default(), RunMode::Continue).unwrap();
        let input = events(12);
        let report = runner.run(input.clone()).await;

        for (event, decision) in input.iter().zip(&report.decisions) {
            assert_eq!(&runner.pipeline().run(event), decision);
        }
    }

    #[tokio::test]
    async fn test_snapshot_ignores_later_edits() {
        let store = store();
        let runner = BatchRunner::from_store(&store, Evaluator::default(), RunMode::Continue).unwrap();
        store.pause("tag").unwrap();

        let report = runner.run(events(1)).await;
        assert!(report.decisions[0].event.title.starts_with("[WORK] "));
    }

    #[tokio::test]
    async fn test_compile_errors_reported_once() {
        let mut broken = Rule::new("broken", "Broken", RuleKind::Filter, "(");
        broken.status = RuleStatus::Active;
        let runner = BatchRunner::from_rules(Evaluator::default(), &[broken], RunMode::Continue);

        let report = runner.run(events(5)).await;
        assert_eq!(report.compile_errors.len(), 1);
        assert!(report.decisions.iter().all(|d| d.included && d.rule_errors.is_empty()));
    }

    #[tokio::test]
    async fn test_huge_timeouts_still_produce_decisions() {
        let evaluator = Evaluator::new(crate::evaluator::EvaluatorConfig {
            timeout: Duration::from_secs(u64::MAX / 2),
            ..Default::default()
        });
        let runner = BatchRunner::from_store(&store(), evaluator, RunMode::Continue)
            .unwrap()
            .with_run_timeout(Duration::from_secs(u64::MAX / 2));

        let report = runner.run(events(3)).await;
        assert!(report.decisions.iter().all(|d| d.rule_errors.is_empty() && !d.steps.is_empty()));
    }
}
