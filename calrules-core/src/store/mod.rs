//! Rule storage.
//!
//! A [`RuleStore`] only needs to list, read, write and delete rules; the
//! lifecycle operations (enable, pause, duplicate…) are provided on top.

mod dir;
mod memory;

pub use dir::DirRuleStore;
pub use memory::MemoryRuleStore;

use std::collections::HashSet;

use chrono::Utc;

use crate::error::{CalRulesError, CalRulesResult};
use crate::rule::{Rule, RuleKind, RuleStatus, order_rules};

pub trait RuleStore: Send + Sync {
    /// All rules in store order.
    fn list_rules(&self) -> CalRulesResult<Vec<Rule>>;

    /// Fails with [`CalRulesError::RuleNotFound`] for unknown ids.
    fn get_rule(&self, id: &str) -> CalRulesResult<Rule>;

    /// Insert or replace a rule exactly as given.
    fn put_rule(&self, rule: &Rule) -> CalRulesResult<()>;

    fn delete_rule(&self, id: &str) -> CalRulesResult<()>;

    /// Insert or replace a rule, stamping `last_modified`.
    fn save_rule(&self, mut rule: Rule) -> CalRulesResult<Rule> {
        if rule.id.trim().is_empty() {
            return Err(CalRulesError::InvalidRule("Rule id must not be empty".into()));
        }
        rule.last_modified = Utc::now();
        self.put_rule(&rule)?;
        Ok(rule)
    }

    fn get_rule_code(&self, id: &str) -> CalRulesResult<String> {
        Ok(self.get_rule(id)?.code)
    }

    fn save_rule_code(&self, id: &str, code: &str) -> CalRulesResult<Rule> {
        let mut rule = self.get_rule(id)?;
        rule.code = code.to_string();
        self.save_rule(rule)
    }

    fn set_status(&self, id: &str, status: RuleStatus) -> CalRulesResult<Rule> {
        let mut rule = self.get_rule(id)?;
        rule.status = status;
        self.save_rule(rule)
    }

    fn enable(&self, id: &str) -> CalRulesResult<Rule> {
        self.set_status(id, RuleStatus::Active)
    }

    /// Disabled rules go back to draft.
    fn disable(&self, id: &str) -> CalRulesResult<Rule> {
        self.set_status(id, RuleStatus::Draft)
    }

    fn pause(&self, id: &str) -> CalRulesResult<Rule> {
        self.set_status(id, RuleStatus::Paused)
    }

    /// Active becomes paused; paused and draft become active.
    fn toggle(&self, id: &str) -> CalRulesResult<Rule> {
        let status = match self.get_rule(id)?.status {
            RuleStatus::Active => RuleStatus::Paused,
            RuleStatus::Paused | RuleStatus::Draft => RuleStatus::Active,
        };
        self.set_status(id, status)
    }

    /// Copy a rule under a new id. The copy starts as a draft.
    fn duplicate(&self, id: &str) -> CalRulesResult<Rule> {
        let mut copy = self.get_rule(id)?;
        copy.name = format!("{} (Copy)", copy.name);
        copy.id = self.unique_id(&copy.name)?;
        copy.status = RuleStatus::Draft;
        self.save_rule(copy)
    }

    /// Create a draft rule with starter code for its kind.
    fn create_rule(&self, name: &str, kind: RuleKind) -> CalRulesResult<Rule> {
        let id = self.unique_id(name)?;
        let rule = Rule::new(id, name, kind, Rule::template_code(name, kind));
        self.save_rule(rule)
    }

    /// Snapshot of active rules in evaluation order.
    fn active_rules(&self) -> CalRulesResult<Vec<Rule>> {
        let mut rules: Vec<Rule> = self.list_rules()?.into_iter().filter(|r| r.is_active()).collect();
        order_rules(&mut rules);
        Ok(rules)
    }

    /// A slug of `name` that no stored rule uses yet. Collisions get `-2`,
    /// `-3`… suffixes.
    fn unique_id(&self, name: &str) -> CalRulesResult<String> {
        let taken: HashSet<String> = self.list_rules()?.into_iter().map(|r| r.id).collect();
        let base = match slug::slugify(name) {
            s if s.is_empty() => "rule".to_string(),
            s => s,
        };

        if !taken.contains(&base) {
            return Ok(base);
        }
        for n in 2..=100 {
            let suffixed = format!("{}-{}", base, n);
            if !taken.contains(&suffixed) {
                return Ok(suffixed);
            }
        }

        Err(CalRulesError::InvalidRule(format!(
            "Too many rules named '{}'. Please choose a different name.",
            name
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(rule: Rule) -> MemoryRuleStore {
        let store = MemoryRuleStore::new();
        store.put_rule(&rule).unwrap();
        store
    }

    #[test]
    fn test_status_transitions() {
        let store = store_with(Rule::new("r", "R", RuleKind::Filter, "true"));

        assert_eq!(store.enable("r").unwrap().status, RuleStatus::Active);
        assert_eq!(store.toggle("r").unwrap().status, RuleStatus::Paused);
        assert_eq!(store.toggle("r").unwrap().status, RuleStatus::Active);
        assert_eq!(store.pause("r").unwrap().status, RuleStatus::Paused);
        assert_eq!(store.disable("r").unwrap().status, RuleStatus::Draft);
    }

    #[test]
    fn test_save_stamps_last_modified() {
        let mut rule = Rule::new("r", "R", RuleKind::Filter, "true");
        rule.last_modified = "2020-01-01T00:00:00Z".parse().unwrap();
        let store = store_with(rule.clone());

        let saved = store.save_rule_code("r", "false").unwrap();
        assert!(saved.last_modified > rule.last_modified);
        assert_eq!(store.get_rule_code("r").unwrap(), "false");
    }

    #[test]
    fn test_duplicate_gets_new_id_and_draft_status() {
        let mut rule = Rule::new("work-hours", "Work Hours", RuleKind::Filter, "true");
        rule.status = RuleStatus::Active;
        let store = store_with(rule);

        let copy = store.duplicate("work-hours").unwrap();
        assert_eq!(copy.id, "work-hours-copy");
        assert_eq!(copy.name, "Work Hours (Copy)");
        assert_eq!(copy.status, RuleStatus::Draft);
        assert_eq!(store.list_rules().unwrap().len(), 2);
    }

    #[test]
    fn test_create_rule_picks_unique_slug() {
        let store = MemoryRuleStore::new();
        let first = store.create_rule("Weekend Filter", RuleKind::Filter).unwrap();
        let second = store.create_rule("Weekend Filter", RuleKind::Filter).unwrap();

        assert_eq!(first.id, "weekend-filter");
        assert_eq!(second.id, "weekend-filter-2");
        assert_eq!(first.status, RuleStatus::Draft);
    }

    #[test]
    fn test_active_rules_are_ordered_by_priority() {
        let store = MemoryRuleStore::new();
        for (id, priority) in [("a", 5), ("b", 0), ("c", 5)] {
            let mut rule = Rule::new(id, id, RuleKind::Filter, "true");
            rule.status = RuleStatus::Active;
            rule.priority = priority;
            store.put_rule(&rule).unwrap();
        }
        store.put_rule(&Rule::new("d", "d", RuleKind::Filter, "true")).unwrap();

        let ids: Vec<String> = store.active_rules().unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_unknown_rule_is_not_found() {
        let store = MemoryRuleStore::new();
        assert!(matches!(store.enable("nope"), Err(CalRulesError::RuleNotFound(_))));
    }
}
