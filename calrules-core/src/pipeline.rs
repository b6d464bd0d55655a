//! Pipeline runner: folds a fixed, ordered list of rules over one event.
//!
//! A rule that fails is recorded in the decision and otherwise ignored, so a
//! run always produces a [`Decision`].

use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::evaluator::{CompileError, CompiledRule, EvaluationError, Evaluator, Outcome};
use crate::event::Event;
use crate::rule::{Rule, RuleKind, order_rules};

/// What happens to the remaining rules once an event is excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Keep evaluating so every rule's result is reported.
    #[default]
    Continue,
    /// Stop at the first exclusion; later rules are marked skipped.
    ShortCircuit,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Continue => "continue",
            RunMode::ShortCircuit => "short_circuit",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "continue" => Ok(RunMode::Continue),
            "short_circuit" | "short-circuit" => Ok(RunMode::ShortCircuit),
            other => Err(format!("Unknown run mode '{}'. Expected continue or short_circuit", other)),
        }
    }
}

/// A rule that failed on the event, in evaluation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleError {
    pub rule_id: String,
    pub error: EvaluationError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepResult {
    /// Filter/condition returned true, or a transform left the event as is.
    Passed,
    Rejected,
    Transformed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleStep {
    pub rule_id: String,
    #[serde(rename = "type")]
    pub kind: RuleKind,
    pub result: StepResult,
}

/// Final verdict for one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub included: bool,
    /// The event after every successful transform.
    pub event: Event,
    pub rule_errors: Vec<RuleError>,
    pub steps: Vec<RuleStep>,
}

impl Decision {
    /// The first rule that excluded the event, if any.
    pub fn rejected_by(&self) -> Option<&str> {
        self.steps
            .iter()
            .find(|s| s.result == StepResult::Rejected)
            .map(|s| s.rule_id.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    evaluator: Evaluator,
    rules: Vec<CompiledRule>,
    mode: RunMode,
}

impl Pipeline {
    /// Build a pipeline from rules that are already compiled and ordered.
    pub fn new(evaluator: Evaluator, rules: Vec<CompiledRule>, mode: RunMode) -> Self {
        Pipeline { evaluator, rules, mode }
    }

    /// Compile the active rules of `rules` in priority order. Rules that do
    /// not compile are left out and returned alongside the pipeline.
    pub fn compile(evaluator: Evaluator, rules: &[Rule], mode: RunMode) -> (Self, Vec<CompileError>) {
        let mut active: Vec<Rule> = rules.iter().filter(|r| r.is_active()).cloned().collect();
        order_rules(&mut active);

        let mut compiled = Vec::with_capacity(active.len());
        let mut errors = Vec::new();
        for rule in &active {
            match evaluator.compile(rule) {
                Ok(c) => compiled.push(c),
                Err(e) => errors.push(e),
            }
        }

        (Pipeline::new(evaluator, compiled, mode), errors)
    }

    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn run(&self, event: &Event) -> Decision {
        self.run_with_deadline(event, None)
    }

    /// Run with an overall deadline for this event. Rules reached after the
    /// deadline fail with a timeout.
    pub fn run_with_deadline(&self, event: &Event, deadline: Option<Instant>) -> Decision {
        let mut included = true;
        let mut current = event.clone();
        let mut rule_errors = Vec::new();
        let mut steps = Vec::with_capacity(self.rules.len());

        for rule in &self.rules {
            let step = |result| RuleStep {
                rule_id: rule.id.clone(),
                kind: rule.kind,
                result,
            };

            if !included && self.mode == RunMode::ShortCircuit {
                steps.push(step(StepResult::Skipped));
                continue;
            }

            let result = match self.evaluator.evaluate_until(rule, &current, deadline) {
                Ok(Outcome::Filter(keep)) | Ok(Outcome::Condition(keep)) => {
                    if keep {
                        StepResult::Passed
                    } else {
                        included = false;
                        StepResult::Rejected
                    }
                }
                Ok(Outcome::Transform(next)) => {
                    if next == current {
                        StepResult::Passed
                    } else {
                        current = next;
                        StepResult::Transformed
                    }
                }
                Err(error) => {
                    rule_errors.push(RuleError {
                        rule_id: rule.id.clone(),
                        error,
                    });
                    StepResult::Failed
                }
            };
            steps.push(step(result));
        }

        Decision {
            included,
            event: current,
            rule_errors,
            steps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::{EvaluationErrorKind, EvaluatorConfig};
    use crate::event::EventTime;
    use crate::rule::RuleStatus;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn meeting(start: &str, end: &str) -> Event {
        Event::new(
            "1",
            "Team Meeting",
            EventTime::parse(start).unwrap(),
            EventTime::parse(end).unwrap(),
        )
    }

    fn active(id: &str, kind: RuleKind, code: &str) -> Rule {
        let mut rule = Rule::new(id, id, kind, code);
        rule.status = RuleStatus::Active;
        rule
    }

    fn pipeline(rules: &[Rule], mode: RunMode) -> Pipeline {
        let (pipeline, errors) = Pipeline::compile(Evaluator::default(), rules, mode);
        assert!(errors.is_empty(), "unexpected compile errors: {:?}", errors);
        pipeline
    }

    #[test]
    fn test_empty_rule_set_keeps_event_unchanged() {
        let event = meeting("2025-01-15T09:00:00Z", "2025-01-15T10:30:00Z");
        let decision = pipeline(&[], RunMode::Continue).run(&event);
        assert!(decision.included);
        assert_eq!(decision.event, event);
        assert!(decision.rule_errors.is_empty());
    }

    #[test]
    fn test_always_false_excludes_event() {
        let event = meeting("2025-01-15T09:00:00Z", "2025-01-15T10:30:00Z");
        let decision = pipeline(&[active("never", RuleKind::Filter, "false")], RunMode::Continue).run(&event);
        assert!(!decision.included);
        assert_eq!(decision.rejected_by(), Some("never"));
    }

    #[test]
    fn test_work_hours_examples() {
        let rules = [active("work-hours", RuleKind::Filter, "startHour >= 9 && endHour <= 18")];
        let p = pipeline(&rules, RunMode::Continue);

        assert!(!p.run(&meeting("2025-01-15T08:00:00Z", "2025-01-15T09:00:00Z")).included);
        assert!(p.run(&meeting("2025-01-15T09:00:00Z", "2025-01-15T10:30:00Z")).included);
    }

    #[test]
    fn test_throwing_rule_is_recorded_and_ignored() {
        let rules = [
            active("boom", RuleKind::Filter, "throw 'boom'"),
            active("prefix", RuleKind::Transform, "event.title = '[WORK] ' + event.title; event"),
        ];
        let event = meeting("2025-01-15T09:00:00Z", "2025-01-15T10:30:00Z");
        let decision = pipeline(&rules, RunMode::Continue).run(&event);

        assert!(decision.included);
        assert_eq!(decision.event.title, "[WORK] Team Meeting");
        assert_eq!(decision.rule_errors.len(), 1);
        assert_eq!(decision.rule_errors[0].rule_id, "boom");
        assert_eq!(decision.rule_errors[0].error.kind, EvaluationErrorKind::RuntimeThrow);
    }

    #[test]
    fn test_identity_violation_leaves_event_untouched() {
        let rules = [active("rename", RuleKind::Transform, "event.id = 'x'; event")];
        let event = meeting("2025-01-15T09:00:00Z", "2025-01-15T10:30:00Z");
        let decision = pipeline(&rules, RunMode::Continue).run(&event);

        assert!(decision.included);
        assert_eq!(decision.event, event);
        assert_eq!(decision.rule_errors[0].error.kind, EvaluationErrorKind::IdentityViolation);
    }

    #[test]
    fn test_runs_are_idempotent() {
        let rules = [
            active("weekend", RuleKind::Filter, "dayOfWeek != 0 && dayOfWeek != 6"),
            active(
                "prefix",
                RuleKind::Transform,
                "if (!event.title.startsWith('[WORK]')) { event.title = '[WORK] ' + event.title } event",
            ),
            active("private", RuleKind::Condition, "event.visibility !== 'private'"),
        ];
        let p = pipeline(&rules, RunMode::Continue);
        let event = meeting("2025-01-15T09:00:00Z", "2025-01-15T10:30:00Z");

        assert_eq!(p.run(&event), p.run(&event));
    }

    #[test]
    fn test_short_circuit_skips_remaining_rules() {
        let rules = [
            active("never", RuleKind::Filter, "false"),
            active("boom", RuleKind::Condition, "throw 'unreached'"),
        ];
        let event = meeting("2025-01-15T09:00:00Z", "2025-01-15T10:30:00Z");

        let decision = pipeline(&rules, RunMode::ShortCircuit).run(&event);
        assert!(decision.rule_errors.is_empty());
        assert_eq!(decision.steps[1].result, StepResult::Skipped);

        let decision = pipeline(&rules, RunMode::Continue).run(&event);
        assert_eq!(decision.rule_errors.len(), 1);
        assert_eq!(decision.steps[1].result, StepResult::Failed);
    }

    #[test]
    fn test_inactive_rules_take_no_part() {
        let mut paused = active("never", RuleKind::Filter, "false");
        paused.status = RuleStatus::Paused;
        let draft = Rule::new("draft", "Draft", RuleKind::Filter, "false");

        let p = pipeline(&[paused, draft], RunMode::Continue);
        assert!(p.rules().is_empty());
    }

    #[test]
    fn test_priority_orders_rules() {
        let mut late = active("late", RuleKind::Transform, "event.title = event.title + ' B'; event");
        late.priority = 10;
        let early = active("early", RuleKind::Transform, "event.title = event.title + ' A'; event");

        let p = pipeline(&[late, early], RunMode::Continue);
        let event = meeting("2025-01-15T09:00:00Z", "2025-01-15T10:30:00Z");
        assert_eq!(p.run(&event).event.title, "Team Meeting A B");
    }

    #[test]
    fn test_compile_errors_are_reported_not_run() {
        let rules = [
            active("bad", RuleKind::Filter, "startHour >="),
            active("good", RuleKind::Filter, "true"),
        ];
        let (p, errors) = Pipeline::compile(Evaluator::default(), &rules, RunMode::Continue);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].rule_id, "bad");
        assert_eq!(p.rules().len(), 1);
    }

    #[test]
    fn test_infinite_loop_times_out_without_aborting_run() {
        let evaluator = Evaluator::new(EvaluatorConfig {
            timeout: Duration::from_millis(10),
            ..EvaluatorConfig::default()
        });
        let rules = [
            active("spin", RuleKind::Filter, "while (true) {}"),
            active("ok", RuleKind::Filter, "true"),
        ];
        let (p, _) = Pipeline::compile(evaluator, &rules, RunMode::Continue);
        let decision = p.run(&meeting("2025-01-15T09:00:00Z", "2025-01-15T10:30:00Z"));

        assert!(decision.included);
        assert_eq!(decision.rule_errors[0].error.kind, EvaluationErrorKind::Timeout);
        assert_eq!(decision.steps[1].result, StepResult::Passed);
    }
}
