use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::RuleStore;
use crate::error::{CalRulesError, CalRulesResult};
use crate::rule::Rule;

/// Rules held in memory, in insertion order.
#[derive(Debug, Default)]
pub struct MemoryRuleStore {
    rules: RwLock<Vec<Rule>>,
}

impl MemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(rules: Vec<Rule>) -> Self {
        MemoryRuleStore {
            rules: RwLock::new(rules),
        }
    }

    fn read(&self) -> CalRulesResult<RwLockReadGuard<'_, Vec<Rule>>> {
        self.rules
            .read()
            .map_err(|_| CalRulesError::Store("rule store lock poisoned".into()))
    }

    fn write(&self) -> CalRulesResult<RwLockWriteGuard<'_, Vec<Rule>>> {
        self.rules
            .write()
            .map_err(|_| CalRulesError::Store("rule store lock poisoned".into()))
    }
}

impl RuleStore for MemoryRuleStore {
    fn list_rules(&self) -> CalRulesResult<Vec<Rule>> {
        Ok(self.read()?.clone())
    }

    fn get_rule(&self, id: &str) -> CalRulesResult<Rule> {
        self.read()?
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| CalRulesError::RuleNotFound(id.to_string()))
    }

    fn put_rule(&self, rule: &Rule) -> CalRulesResult<()> {
        let mut rules = self.write()?;
        match rules.iter_mut().find(|r| r.id == rule.id) {
            Some(existing) => *existing = rule.clone(),
            None => rules.push(rule.clone()),
        }
        Ok(())
    }

    fn delete_rule(&self, id: &str) -> CalRulesResult<()> {
        let mut rules = self.write()?;
        let before = rules.len();
        rules.retain(|r| r.id != id);
        if rules.len() == before {
            return Err(CalRulesError::RuleNotFound(id.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::RuleKind;

    #[test]
    fn test_put_replaces_in_place() {
        let store = MemoryRuleStore::with_rules(vec![
            Rule::new("a", "A", RuleKind::Filter, "true"),
            Rule::new("b", "B", RuleKind::Filter, "true"),
        ]);
        store.put_rule(&Rule::new("a", "A2", RuleKind::Filter, "false")).unwrap();

        let rules = store.list_rules().unwrap();
        assert_eq!(rules[0].name, "A2");
        assert_eq!(rules.len(), 2);
    }

    #[test]
    fn test_delete_unknown_rule_fails() {
        let store = MemoryRuleStore::new();
        assert!(matches!(store.delete_rule("x"), Err(CalRulesError::RuleNotFound(_))));
    }
}
