//! Rule evaluator: compiles rule code once and runs it against single events.
//!
//! Each evaluation gets its own interpreter with the event bound as
//! globals, so rules can neither see nor mutate the caller's event. The
//! result is checked against the rule kind and turned into an [`Outcome`].

mod bindings;

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::event::Event;
use crate::rule::{Rule, RuleKind};
use crate::script::{self, Fault, Limits, Program, Value};

/// Default wall-clock budget for one rule evaluation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(50);

/// A rule whose code does not parse.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[error("rule '{rule_id}' does not compile: {message} at line {line}, column {column}")]
pub struct CompileError {
    pub rule_id: String,
    pub message: String,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EvaluationErrorKind {
    Timeout,
    InvalidReturnType,
    IdentityViolation,
    RuntimeThrow,
}

impl EvaluationErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvaluationErrorKind::Timeout => "timeout",
            EvaluationErrorKind::InvalidReturnType => "invalid return type",
            EvaluationErrorKind::IdentityViolation => "identity violation",
            EvaluationErrorKind::RuntimeThrow => "runtime error",
        }
    }
}

impl fmt::Display for EvaluationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rule failed on one event.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct EvaluationError {
    pub kind: EvaluationErrorKind,
    pub message: String,
}

impl EvaluationError {
    pub fn new(kind: EvaluationErrorKind, message: impl Into<String>) -> Self {
        EvaluationError {
            kind,
            message: message.into(),
        }
    }
}

/// The typed result of a successful evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Filter(bool),
    Condition(bool),
    /// Always carries the input event's id.
    Transform(Event),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluatorConfig {
    pub timeout: Duration,
    /// Treat non-boolean filter/condition results as `false` instead of
    /// failing with [`EvaluationErrorKind::InvalidReturnType`].
    pub coerce_non_boolean: bool,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        EvaluatorConfig {
            timeout: DEFAULT_TIMEOUT,
            coerce_non_boolean: false,
        }
    }
}

/// A rule parsed and ready to run.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub id: String,
    pub name: String,
    pub kind: RuleKind,
    program: Program,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Evaluator {
    config: EvaluatorConfig,
}

impl Evaluator {
    pub fn new(config: EvaluatorConfig) -> Self {
        Evaluator { config }
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    pub fn compile(&self, rule: &Rule) -> Result<CompiledRule, CompileError> {
        match script::compile(&rule.code) {
            Ok(program) => Ok(CompiledRule {
                id: rule.id.clone(),
                name: rule.name.clone(),
                kind: rule.kind,
                program,
            }),
            Err(e) => {
                warn!(rule_id = %rule.id, line = e.line, column = e.column, "Rule does not compile: {}", e.message);
                Err(CompileError {
                    rule_id: rule.id.clone(),
                    message: e.message,
                    line: e.line,
                    column: e.column,
                })
            }
        }
    }

    pub fn evaluate(&self, rule: &CompiledRule, event: &Event) -> Result<Outcome, EvaluationError> {
        self.evaluate_until(rule, event, None)
    }

    /// Like [`Evaluator::evaluate`], but never runs past `deadline` even if
    /// the rule's own timeout has not elapsed.
    pub fn evaluate_until(
        &self,
        rule: &CompiledRule,
        event: &Event,
        deadline: Option<Instant>,
    ) -> Result<Outcome, EvaluationError> {
        let started = Instant::now();
        // A timeout past the end of representable time leaves only `deadline`.
        let deadline = match (deadline, started.checked_add(self.config.timeout)) {
            (Some(run), Some(rule)) => Some(run.min(rule)),
            (run, rule) => run.or(rule),
        };

        let result = script::run(&rule.program, bindings::globals(event), Limits::until(deadline))
            .map_err(|fault| match fault {
                Fault::Timeout => EvaluationError::new(
                    EvaluationErrorKind::Timeout,
                    format!(
                        "rule did not finish within {:?}",
                        deadline.map_or(self.config.timeout, |d| d.saturating_duration_since(started))
                    ),
                ),
                Fault::Throw(message) => EvaluationError::new(EvaluationErrorKind::RuntimeThrow, message),
            })
            .and_then(|value| self.interpret(rule.kind, event, value));

        match &result {
            Ok(outcome) => debug!(
                rule_id = %rule.id,
                event_id = %event.id,
                elapsed_us = started.elapsed().as_micros() as u64,
                "Rule evaluated: {:?}",
                OutcomeSummary(outcome)
            ),
            Err(e) => warn!(rule_id = %rule.id, event_id = %event.id, "Rule failed: {}", e),
        }
        result
    }

    fn interpret(&self, kind: RuleKind, event: &Event, value: Value) -> Result<Outcome, EvaluationError> {
        match kind {
            RuleKind::Filter => self.boolean(kind, value).map(Outcome::Filter),
            RuleKind::Condition => self.boolean(kind, value).map(Outcome::Condition),
            RuleKind::Transform => match value {
                Value::Object(fields) => bindings::overlay(event, fields).map(Outcome::Transform),
                other => Err(EvaluationError::new(
                    EvaluationErrorKind::InvalidReturnType,
                    format!("transform rules must return an event object, got {}", other.type_name()),
                )),
            },
        }
    }

    fn boolean(&self, kind: RuleKind, value: Value) -> Result<bool, EvaluationError> {
        match value {
            Value::Bool(b) => Ok(b),
            _ if self.config.coerce_non_boolean => Ok(false),
            other => Err(EvaluationError::new(
                EvaluationErrorKind::InvalidReturnType,
                format!("{} rules must return a boolean, got {}", kind, other.type_name()),
            )),
        }
    }
}

/// Short debug form of an outcome that skips the event body.
struct OutcomeSummary<'a>(&'a Outcome);

impl fmt::Debug for OutcomeSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.0 {
            Outcome::Filter(b) => write!(f, "filter({})", b),
            Outcome::Condition(b) => write!(f, "condition({})", b),
            Outcome::Transform(e) => write!(f, "transform({})", e.title),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventTime;
    use rstest::rstest;

    fn event(start: &str, end: &str) -> Event {
        Event::new(
            "1",
            "Team Meeting",
            EventTime::parse(start).unwrap(),
            EventTime::parse(end).unwrap(),
        )
    }

    fn meeting() -> Event {
        event("2025-01-15T09:00:00Z", "2025-01-15T10:30:00Z")
    }

    fn compiled(kind: RuleKind, code: &str) -> CompiledRule {
        Evaluator::default()
            .compile(&Rule::new("r", "Rule", kind, code))
            .unwrap()
    }

    const WORK_HOURS: &str = "startHour >= 9 && endHour <= 18";

    #[rstest]
    #[case("2025-01-15T08:00:00Z", "2025-01-15T09:00:00Z", false)]
    #[case("2025-01-15T09:00:00Z", "2025-01-15T10:30:00Z", true)]
    #[case("2025-01-15T17:00:00Z", "2025-01-15T18:00:00Z", true)]
    #[case("2025-01-15T17:00:00Z", "2025-01-15T19:00:00Z", false)]
    fn test_work_hours_filter(#[case] start: &str, #[case] end: &str, #[case] keep: bool) {
        let rule = compiled(RuleKind::Filter, WORK_HOURS);
        let outcome = Evaluator::default().evaluate(&rule, &event(start, end)).unwrap();
        assert_eq!(outcome, Outcome::Filter(keep));
    }

    #[test]
    fn test_work_prefix_transform() {
        let code = "
            if (!event.title.startsWith('[WORK]')) {
                event.title = '[WORK] ' + event.title;
            }
            return event;
        ";
        let rule = compiled(RuleKind::Transform, code);
        let evaluator = Evaluator::default();

        let input = meeting();
        let Outcome::Transform(once) = evaluator.evaluate(&rule, &input).unwrap() else {
            panic!("expected a transform outcome");
        };
        assert_eq!(once.title, "[WORK] Team Meeting");
        assert_eq!(input.title, "Team Meeting");

        let Outcome::Transform(twice) = evaluator.evaluate(&rule, &once).unwrap() else {
            panic!("expected a transform outcome");
        };
        assert_eq!(twice, once);
    }

    #[test]
    fn test_partial_transform_object_is_overlaid() {
        let rule = compiled(RuleKind::Transform, "({ location: 'Room 42' })");
        let Outcome::Transform(out) = Evaluator::default().evaluate(&rule, &meeting()).unwrap() else {
            panic!("expected a transform outcome");
        };
        assert_eq!(out.location.as_deref(), Some("Room 42"));
        assert_eq!(out.title, "Team Meeting");
    }

    #[test]
    fn test_identity_violation() {
        let rule = compiled(RuleKind::Transform, "event.id = 'other'; event");
        let err = Evaluator::default().evaluate(&rule, &meeting()).unwrap_err();
        assert_eq!(err.kind, EvaluationErrorKind::IdentityViolation);
    }

    #[test]
    fn test_non_boolean_filter_result() {
        let rule = compiled(RuleKind::Condition, "event.title");
        let err = Evaluator::default().evaluate(&rule, &meeting()).unwrap_err();
        assert_eq!(err.kind, EvaluationErrorKind::InvalidReturnType);

        let lenient = Evaluator::new(EvaluatorConfig {
            coerce_non_boolean: true,
            ..EvaluatorConfig::default()
        });
        assert_eq!(lenient.evaluate(&rule, &meeting()).unwrap(), Outcome::Condition(false));
    }

    #[test]
    fn test_transform_must_return_object() {
        let rule = compiled(RuleKind::Transform, "true");
        let err = Evaluator::default().evaluate(&rule, &meeting()).unwrap_err();
        assert_eq!(err.kind, EvaluationErrorKind::InvalidReturnType);
    }

    #[test]
    fn test_infinite_loop_times_out() {
        let evaluator = Evaluator::new(EvaluatorConfig {
            timeout: Duration::from_millis(10),
            ..EvaluatorConfig::default()
        });
        let rule = evaluator
            .compile(&Rule::new("loop", "Loop", RuleKind::Filter, "while (true) {} true"))
            .unwrap();
        let err = evaluator.evaluate(&rule, &meeting()).unwrap_err();
        assert_eq!(err.kind, EvaluationErrorKind::Timeout);
    }

    #[test]
    fn test_past_deadline_times_out_immediately() {
        let rule = compiled(RuleKind::Filter, "true");
        let err = Evaluator::default()
            .evaluate_until(&rule, &meeting(), Some(Instant::now()))
            .unwrap_err();
        assert_eq!(err.kind, EvaluationErrorKind::Timeout);
    }

    #[test]
    fn test_unrepresentable_timeout_does_not_panic() {
        let evaluator = Evaluator::new(EvaluatorConfig {
            timeout: Duration::from_secs(u64::MAX / 2),
            ..EvaluatorConfig::default()
        });
        let rule = evaluator
            .compile(&Rule::new("ok", "Ok", RuleKind::Filter, "true"))
            .unwrap();
        assert_eq!(evaluator.evaluate(&rule, &meeting()).unwrap(), Outcome::Filter(true));

        let err = evaluator
            .evaluate_until(&rule, &meeting(), Some(Instant::now()))
            .unwrap_err();
        assert_eq!(err.kind, EvaluationErrorKind::Timeout);
    }

    #[test]
    fn test_throw_is_runtime_error() {
        let rule = compiled(RuleKind::Filter, "throw 'boom'");
        let err = Evaluator::default().evaluate(&rule, &meeting()).unwrap_err();
        assert_eq!(err, EvaluationError::new(EvaluationErrorKind::RuntimeThrow, "boom"));
    }

    #[test]
    fn test_compile_error_has_position() {
        let err = Evaluator::default()
            .compile(&Rule::new("bad", "Bad", RuleKind::Filter, "startHour >= "))
            .unwrap_err();
        assert_eq!(err.rule_id, "bad");
        assert_eq!(err.line, 1);
    }

    #[test]
    fn test_private_event_condition() {
        let rule = compiled(RuleKind::Condition, "return event.visibility !== 'private';");
        let mut private = meeting();
        private.visibility = crate::event::Visibility::Private;
        let evaluator = Evaluator::default();
        assert_eq!(evaluator.evaluate(&rule, &private).unwrap(), Outcome::Condition(false));
        assert_eq!(evaluator.evaluate(&rule, &meeting()).unwrap(), Outcome::Condition(true));
    }
}
