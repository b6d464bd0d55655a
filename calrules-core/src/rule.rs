//! Sync rule definitions.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user-defined sync rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub kind: RuleKind,
    #[serde(default)]
    pub status: RuleStatus,
    /// Lower runs first. Rules with equal priority keep store order.
    #[serde(default)]
    pub priority: i32,
    pub last_modified: DateTime<Utc>,
    pub code: String,
}

impl Rule {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: RuleKind, code: impl Into<String>) -> Self {
        Rule {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            kind,
            status: RuleStatus::Draft,
            priority: 0,
            last_modified: Utc::now(),
            code: code.into(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == RuleStatus::Active
    }

    /// Starter code shown for a freshly created rule.
    pub fn template_code(name: &str, kind: RuleKind) -> String {
        match kind {
            RuleKind::Filter => format!(
                "// {name}\n\
                 // Return true to keep the event, false to drop it.\n\
                 return startHour >= 9 && endHour <= 18;\n"
            ),
            RuleKind::Condition => format!(
                "// {name}\n\
                 // Return false to skip synchronization of this event.\n\
                 return event.visibility !== 'private';\n"
            ),
            RuleKind::Transform => format!(
                "// {name}\n\
                 // Modify the event and return it.\n\
                 return event;\n"
            ),
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// How a rule's result is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    /// Boolean: keep (true) or drop (false) the event.
    Filter,
    /// Returns a (possibly modified) event.
    Transform,
    /// Boolean gate, same effect as a filter but reported separately.
    Condition,
}

impl RuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleKind::Filter => "filter",
            RuleKind::Transform => "transform",
            RuleKind::Condition => "condition",
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "filter" => Ok(RuleKind::Filter),
            "transform" => Ok(RuleKind::Transform),
            "condition" => Ok(RuleKind::Condition),
            other => Err(format!(
                "Unknown rule type '{}'. Expected filter, transform or condition",
                other
            )),
        }
    }
}

/// Lifecycle status. Only active rules take part in a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleStatus {
    Active,
    Paused,
    #[default]
    Draft,
}

impl RuleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleStatus::Active => "active",
            RuleStatus::Paused => "paused",
            RuleStatus::Draft => "draft",
        }
    }
}

impl fmt::Display for RuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable ordering used for every pipeline run: ascending priority, ties in
/// the order they were given.
pub fn order_rules(rules: &mut [Rule]) {
    rules.sort_by_key(|r| r.priority);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_json_matches_dashboard_shape() {
        let json = r#"{
            "id": "1",
            "name": "Work Hours Filter",
            "description": "Only sync events during work hours (9 AM - 6 PM)",
            "status": "active",
            "lastModified": "2025-01-15T14:30:00Z",
            "type": "filter",
            "code": "startHour >= 9 && endHour <= 18"
        }"#;

        let rule: Rule = serde_json::from_str(json).unwrap();
        assert_eq!(rule.kind, RuleKind::Filter);
        assert!(rule.is_active());
        assert_eq!(rule.priority, 0);
    }

    #[test]
    fn test_order_rules_is_stable() {
        let mut a = Rule::new("a", "A", RuleKind::Filter, "true");
        a.priority = 1;
        let b = Rule::new("b", "B", RuleKind::Filter, "true");
        let c = Rule::new("c", "C", RuleKind::Filter, "true");

        let mut rules = vec![a, b, c];
        order_rules(&mut rules);

        let ids: Vec<_> = rules.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        assert!("mapper".parse::<RuleKind>().is_err());
    }
}
