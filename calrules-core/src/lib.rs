//! Rule evaluation engine for calendar sync.
//!
//! Users write small scripts (sync rules) that filter, transform or gate
//! calendar events. This crate provides:
//! - `Rule` and `Event`, the data model shared by the CLI and the server
//! - the `script` language rules are written in and its sandboxed interpreter
//! - the `evaluator` and `pipeline` that turn rules into a sync decision
//! - `BatchRunner` for evaluating many events in parallel
//! - rule stores, event sources, sync reports and configuration

pub mod batch;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod event;
pub mod pipeline;
pub mod report;
pub mod rule;
pub mod script;
pub mod source;
pub mod store;

pub use batch::BatchRunner;
pub use config::CalrulesConfig;
pub use error::{CalRulesError, CalRulesResult};
pub use evaluator::{
    CompileError, CompiledRule, EvaluationError, EvaluationErrorKind, Evaluator, EvaluatorConfig, Outcome,
};
pub use event::{Event, EventStatus, EventTime, Visibility};
pub use pipeline::{Decision, Pipeline, RuleError, RuleStep, RunMode, StepResult};
pub use report::{BatchReport, LogPage, LogStatus, RuleStats, Stat, SyncLogEntry};
pub use rule::{Rule, RuleKind, RuleStatus};
pub use source::{EventSource, IcsDirSource, JsonFileSource, MemoryEventSource, fetch_with_retries};
pub use store::{DirRuleStore, MemoryRuleStore, RuleStore};
