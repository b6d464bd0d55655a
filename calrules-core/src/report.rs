//! Sync report: what a batch did, as log entries, per-rule counters and
//! dashboard stat cards.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CalRulesError, CalRulesResult};
use crate::evaluator::{CompileError, CompiledRule};
use crate::pipeline::{Decision, StepResult};

const LAST_RUN_FILE: &str = "last_run.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Success,
    Warning,
    Error,
}

impl LogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogStatus::Success => "success",
            LogStatus::Warning => "warning",
            LogStatus::Error => "error",
        }
    }
}

impl fmt::Display for LogStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(LogStatus::Success),
            "warning" => Ok(LogStatus::Warning),
            "error" => Ok(LogStatus::Error),
            other => Err(format!("Unknown log status '{}'. Expected success, warning or error", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncLogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    /// Rule the entry is about, if any.
    pub rule: Option<String>,
    pub status: LogStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
}

impl SyncLogEntry {
    fn new(timestamp: DateTime<Utc>, status: LogStatus, message: String) -> Self {
        SyncLogEntry {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp,
            rule: None,
            status,
            message,
            details: None,
            event_id: None,
        }
    }
}

/// Counters for one rule over a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleStats {
    pub rule_id: String,
    pub name: String,
    pub evaluated: usize,
    pub passed: usize,
    pub rejected: usize,
    pub transformed: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// A dashboard stat card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stat {
    pub title: String,
    pub value: String,
}

impl Stat {
    fn new(title: &str, value: impl ToString) -> Self {
        Stat {
            title: title.to_string(),
            value: value.to_string(),
        }
    }
}

/// One page of log entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogPage {
    pub total: usize,
    pub offset: usize,
    pub entries: Vec<SyncLogEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Active rules in the snapshot, including those that did not compile.
    pub active_rules: usize,
    pub decisions: Vec<Decision>,
    pub compile_errors: Vec<CompileError>,
    pub rule_stats: Vec<RuleStats>,
    pub log: Vec<SyncLogEntry>,
}

impl BatchReport {
    pub fn build(
        started_at: DateTime<Utc>,
        rules: &[CompiledRule],
        decisions: Vec<Decision>,
        compile_errors: Vec<CompileError>,
    ) -> Self {
        let finished_at = Utc::now();
        let names: HashMap<&str, &str> = rules.iter().map(|r| (r.id.as_str(), r.name.as_str())).collect();
        let name_of = |id: &str| names.get(id).copied().unwrap_or(id).to_string();

        let mut rule_stats: Vec<RuleStats> = rules
            .iter()
            .map(|r| RuleStats {
                rule_id: r.id.clone(),
                name: r.name.clone(),
                ..RuleStats::default()
            })
            .collect();
        let index: HashMap<String, usize> = rules.iter().enumerate().map(|(i, r)| (r.id.clone(), i)).collect();

        let mut log = Vec::new();

        for error in &compile_errors {
            let mut entry = SyncLogEntry::new(finished_at, LogStatus::Error, format!("Rule '{}' does not compile", error.rule_id));
            entry.rule = Some(error.rule_id.clone());
            entry.details = Some(format!("{} at line {}, column {}", error.message, error.line, error.column));
            log.push(entry);
        }

        for decision in &decisions {
            let event = &decision.event;

            for step in &decision.steps {
                let Some(stats) = index.get(&step.rule_id).map(|&i| &mut rule_stats[i]) else {
                    continue;
                };
                match step.result {
                    StepResult::Passed => stats.passed += 1,
                    StepResult::Rejected => stats.rejected += 1,
                    StepResult::Transformed => stats.transformed += 1,
                    StepResult::Failed => stats.failed += 1,
                    StepResult::Skipped => stats.skipped += 1,
                }
                if step.result != StepResult::Skipped {
                    stats.evaluated += 1;
                }
            }

            for rule_error in &decision.rule_errors {
                let mut entry = SyncLogEntry::new(
                    finished_at,
                    LogStatus::Error,
                    format!("{} failed on \"{}\"", name_of(&rule_error.rule_id), event.title),
                );
                entry.rule = Some(rule_error.rule_id.clone());
                entry.details = Some(rule_error.error.to_string());
                entry.event_id = Some(event.id.clone());
                log.push(entry);
            }

            let mut entry = if decision.included {
                SyncLogEntry::new(finished_at, LogStatus::Success, format!("Synced \"{}\"", event.title))
            } else {
                let mut entry = SyncLogEntry::new(finished_at, LogStatus::Warning, format!("Excluded \"{}\"", event.title));
                if let Some(rule_id) = decision.rejected_by() {
                    entry.rule = Some(rule_id.to_string());
                    entry.details = Some(format!("Rejected by {}", name_of(rule_id)));
                }
                entry
            };
            entry.event_id = Some(event.id.clone());
            log.push(entry);
        }

        BatchReport {
            started_at,
            finished_at,
            active_rules: rules.len() + compile_errors.len(),
            decisions,
            compile_errors,
            rule_stats,
            log,
        }
    }

    pub fn included(&self) -> impl Iterator<Item = &Decision> {
        self.decisions.iter().filter(|d| d.included)
    }

    pub fn excluded_count(&self) -> usize {
        self.decisions.iter().filter(|d| !d.included).count()
    }

    /// Events that went through every rule without an error.
    pub fn clean_count(&self) -> usize {
        self.decisions.iter().filter(|d| d.rule_errors.is_empty()).count()
    }

    /// Share of events without rule errors, or `None` for an empty batch.
    pub fn success_rate(&self) -> Option<f64> {
        if self.decisions.is_empty() {
            None
        } else {
            Some(self.clean_count() as f64 / self.decisions.len() as f64)
        }
    }

    /// Rules that failed at least once or did not compile.
    pub fn rules_needing_attention(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.compile_errors.iter().map(|e| e.rule_id.clone()).collect();
        ids.extend(self.rule_stats.iter().filter(|s| s.failed > 0).map(|s| s.rule_id.clone()));
        ids
    }

    pub fn stats(&self) -> Vec<Stat> {
        let success_rate = match self.success_rate() {
            Some(rate) => format!("{:.0}%", rate * 100.0),
            None => "n/a".to_string(),
        };
        vec![
            Stat::new("Active Rules", self.active_rules),
            Stat::new("Events Synced", self.included().count()),
            Stat::new("Success Rate", success_rate),
            Stat::new("Need Attention", self.rules_needing_attention().len()),
        ]
    }

    /// Log entries, optionally filtered by status, paged.
    pub fn logs(&self, status: Option<LogStatus>, offset: usize, limit: usize) -> LogPage {
        let matching: Vec<&SyncLogEntry> = self
            .log
            .iter()
            .filter(|e| status.is_none_or(|s| e.status == s))
            .collect();

        LogPage {
            total: matching.len(),
            offset,
            entries: matching.into_iter().skip(offset).take(limit).cloned().collect(),
        }
    }

    pub fn path_in(state_dir: &Path) -> PathBuf {
        state_dir.join(LAST_RUN_FILE)
    }

    /// Persist as the last run in `state_dir`.
    pub fn save(&self, state_dir: &Path) -> CalRulesResult<()> {
        std::fs::create_dir_all(state_dir)?;
        let path = Self::path_in(state_dir);
        let temp = state_dir.join(format!("{}.tmp", LAST_RUN_FILE));

        let content =
            serde_json::to_string_pretty(self).map_err(|e| CalRulesError::Serialization(e.to_string()))?;
        std::fs::write(&temp, content)?;
        std::fs::rename(&temp, &path)?;
        Ok(())
    }

    /// The last saved run, or `None` if nothing has run yet.
    pub fn load_last(state_dir: &Path) -> CalRulesResult<Option<Self>> {
        let path = Self::path_in(state_dir);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| CalRulesError::Serialization(format!("{}: {}", path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::Evaluator;
    use crate::event::{Event, EventTime};
    use crate::pipeline::{Pipeline, RunMode};
    use crate::rule::{Rule, RuleKind, RuleStatus};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn event(id: &str, start: &str, end: &str) -> Event {
        Event::new(
            id,
            format!("Event {}", id),
            EventTime::parse(start).unwrap(),
            EventTime::parse(end).unwrap(),
        )
    }

    fn active(id: &str, kind: RuleKind, code: &str) -> Rule {
        let mut rule = Rule::new(id, id, kind, code);
        rule.status = RuleStatus::Active;
        rule
    }

    fn report() -> BatchReport {
        let rules = [
            active("work-hours", RuleKind::Filter, "startHour >= 9 && endHour <= 18"),
            active("flaky", RuleKind::Condition, "if (event.id == '3') { throw 'bad event' } true"),
            active("broken", RuleKind::Filter, "startHour >="),
        ];
        let (pipeline, compile_errors) = Pipeline::compile(Evaluator::default(), &rules, RunMode::Continue);
        let events = [
            event("1", "2025-01-15T09:00:00Z", "2025-01-15T10:00:00Z"),
            event("2", "2025-01-15T07:00:00Z", "2025-01-15T08:00:00Z"),
            event("3", "2025-01-15T11:00:00Z", "2025-01-15T12:00:00Z"),
        ];
        let decisions = events.iter().map(|e| pipeline.run(e)).collect();
        BatchReport::build(Utc::now(), pipeline.rules(), decisions, compile_errors)
    }

    #[test]
    fn test_rule_stats_separate_failures_from_exclusions() {
        let report = report();
        let work = &report.rule_stats[0];
        assert_eq!((work.evaluated, work.passed, work.rejected, work.failed), (3, 2, 1, 0));
        let flaky = &report.rule_stats[1];
        assert_eq!((flaky.evaluated, flaky.passed, flaky.failed), (3, 2, 1));
    }

    #[test]
    fn test_log_statuses() {
        let report = report();
        let count = |s| report.log.iter().filter(|e| e.status == s).count();
        assert_eq!(count(LogStatus::Success), 2);
        assert_eq!(count(LogStatus::Warning), 1);
        // one compile error, one runtime failure
        assert_eq!(count(LogStatus::Error), 2);

        let warning = report.log.iter().find(|e| e.status == LogStatus::Warning).unwrap();
        assert_eq!(warning.rule.as_deref(), Some("work-hours"));
        assert_eq!(warning.event_id.as_deref(), Some("2"));
    }

    #[test]
    fn test_stat_cards() {
        let stats = report().stats();
        let values: Vec<(&str, &str)> = stats.iter().map(|s| (s.title.as_str(), s.value.as_str())).collect();
        assert_eq!(
            values,
            vec![
                ("Active Rules", "3"),
                ("Events Synced", "2"),
                ("Success Rate", "67%"),
                ("Need Attention", "2"),
            ]
        );
    }

    #[test]
    fn test_log_paging_and_filter() {
        let report = report();
        let page = report.logs(None, 1, 2);
        assert_eq!(page.total, 5);
        assert_eq!(page.entries.len(), 2);

        let errors = report.logs(Some(LogStatus::Error), 0, 10);
        assert_eq!(errors.total, 2);
    }

    #[test]
    fn test_save_and_load_last_run() {
        let dir = TempDir::new().unwrap();
        assert!(BatchReport::load_last(dir.path()).unwrap().is_none());

        let report = report();
        report.save(dir.path()).unwrap();
        assert_eq!(BatchReport::load_last(dir.path()).unwrap(), Some(report));
    }
}
