//! Colored terminal rendering for calrules types.

use calrules_core::evaluator::CompileError;
use calrules_core::pipeline::StepResult;
use calrules_core::report::{LogStatus, Stat, SyncLogEntry};
use calrules_core::rule::{Rule, RuleStatus};
use calrules_core::{Decision, Event, EventTime};
use owo_colors::OwoColorize;

pub trait Render {
    fn render(&self) -> String;
}

impl Render for RuleStatus {
    fn render(&self) -> String {
        match self {
            RuleStatus::Active => "● active".green().to_string(),
            RuleStatus::Paused => "◐ paused".yellow().to_string(),
            RuleStatus::Draft => "○ draft".dimmed().to_string(),
        }
    }
}

impl Render for Rule {
    fn render(&self) -> String {
        format!(
            "{} {} {} {}",
            self.status.render(),
            self.name.bold(),
            format!("({})", self.id).dimmed(),
            format!("[{} · priority {}]", self.kind, self.priority).dimmed()
        )
    }
}

impl Render for EventTime {
    fn render(&self) -> String {
        match self {
            EventTime::Date(d) => d.format("%a %b %-d").to_string(),
            EventTime::DateTime(dt) => dt.format("%a %b %-d %H:%M").to_string(),
        }
    }
}

impl Render for Event {
    fn render(&self) -> String {
        let time = if self.is_all_day() {
            format!("{} (all day)", self.start.render())
        } else {
            format!("{} - {}", self.start.render(), end_time(&self.end))
        };
        format!("{} {}", self.title, time.dimmed())
    }
}

/// End times on the same line only need the clock part.
fn end_time(t: &EventTime) -> String {
    match t {
        EventTime::Date(_) => t.render(),
        EventTime::DateTime(dt) => dt.format("%H:%M").to_string(),
    }
}

impl Render for Decision {
    fn render(&self) -> String {
        let mut line = if self.included {
            format!("{} {}", "+".green(), self.event.render())
        } else {
            format!("{} {}", "-".red(), self.event.render())
        };

        if let Some(rule) = self.rejected_by() {
            line.push_str(&format!(" {}", format!("excluded by {}", rule).red()));
        }
        let transformed = self.steps.iter().filter(|s| s.result == StepResult::Transformed).count();
        if transformed > 0 {
            line.push_str(&format!(" {}", format!("~{} transform", transformed).yellow()));
        }
        for err in &self.rule_errors {
            line.push_str(&format!("\n     {} {}: {}", "!".red(), err.rule_id, err.error));
        }
        line
    }
}

impl Render for LogStatus {
    fn render(&self) -> String {
        match self {
            LogStatus::Success => "✓".green().to_string(),
            LogStatus::Warning => "!".yellow().to_string(),
            LogStatus::Error => "✗".red().to_string(),
        }
    }
}

impl Render for SyncLogEntry {
    fn render(&self) -> String {
        let mut line = format!(
            "{} {} {}",
            self.status.render(),
            self.timestamp.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
            self.message
        );
        if let Some(rule) = &self.rule {
            line.push_str(&format!(" {}", format!("[{}]", rule).dimmed()));
        }
        if let Some(details) = &self.details {
            line.push_str(&format!("\n     {}", details.dimmed()));
        }
        line
    }
}

impl Render for Stat {
    fn render(&self) -> String {
        format!("{:<16} {}", self.title.dimmed(), self.value.bold())
    }
}

impl Render for CompileError {
    fn render(&self) -> String {
        format!(
            "{} {} {} {}",
            "✗".red(),
            self.rule_id.bold(),
            format!("line {}, column {}:", self.line, self.column).dimmed(),
            self.message.red()
        )
    }
}

pub fn pluralize(word: &str, count: usize) -> String {
    if count == 1 { word.to_string() } else { format!("{}s", word) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calrules_core::rule::RuleKind;

    #[test]
    fn test_rule_render_shows_id_and_kind() {
        let rule = Rule::new("work-hours", "Work Hours", RuleKind::Filter, "true");
        let out = rule.render();
        assert!(out.contains("Work Hours"));
        assert!(out.contains("(work-hours)"));
        assert!(out.contains("filter"));
        assert!(out.contains("draft"));
    }

    #[test]
    fn test_compile_error_render_has_position() {
        let err = CompileError {
            rule_id: "broken".into(),
            message: "Unexpected token".into(),
            line: 2,
            column: 7,
        };
        assert!(err.render().contains("line 2, column 7"));
    }

    #[test]
    fn test_decision_render_names_rejecting_rule() {
        use calrules_core::pipeline::RuleStep;

        let start = EventTime::parse("2025-01-15T08:00:00Z").unwrap();
        let end = EventTime::parse("2025-01-15T09:00:00Z").unwrap();
        let decision = Decision {
            included: false,
            event: Event::new("e1", "Standup", start, end),
            rule_errors: Vec::new(),
            steps: vec![RuleStep {
                rule_id: "work-hours".into(),
                kind: RuleKind::Filter,
                result: StepResult::Rejected,
            }],
        };
        let out = decision.render();
        assert!(out.contains("Standup"));
        assert!(out.contains("excluded by work-hours"));
    }

    #[test]
    fn test_pluralize() {
        assert_eq!(pluralize("rule", 1), "rule");
        assert_eq!(pluralize("rule", 3), "rules");
    }
}
