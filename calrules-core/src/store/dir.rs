use std::path::{Path, PathBuf};

use tracing::warn;

use super::RuleStore;
use crate::error::{CalRulesError, CalRulesResult};
use crate::rule::Rule;

const RULE_EXTENSION: &str = "toml";

/// One TOML file per rule (`<id>.toml`) in a directory. Rules are listed in
/// id order. The file name is the rule's id; an `id` inside the file that
/// disagrees with it is ignored.
#[derive(Debug, Clone)]
pub struct DirRuleStore {
    dir: PathBuf,
}

impl DirRuleStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        DirRuleStore { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> CalRulesResult<PathBuf> {
        if !is_valid_id(id) {
            return Err(CalRulesError::InvalidRule(format!(
                "Invalid rule id '{}'. Use letters, digits, '-' and '_' only",
                id
            )));
        }
        Ok(self.dir.join(format!("{}.{}", id, RULE_EXTENSION)))
    }

    fn read_rule(id: &str, path: &Path) -> CalRulesResult<Rule> {
        let content = std::fs::read_to_string(path)?;
        let mut rule: Rule = toml::from_str(&content)
            .map_err(|e| CalRulesError::Serialization(format!("{}: {}", path.display(), e)))?;

        if rule.id != id {
            warn!(path = %path.display(), stored_id = %rule.id, "Rule file names a different id, using the file name");
            rule.id = id.to_string();
        }
        Ok(rule)
    }
}

fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

impl RuleStore for DirRuleStore {
    fn list_rules(&self) -> CalRulesResult<Vec<Rule>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut paths: Vec<PathBuf> = std::fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == RULE_EXTENSION))
            .collect();
        paths.sort();

        let mut rules = Vec::with_capacity(paths.len());
        for path in &paths {
            let Some(id) = path.file_stem().and_then(|s| s.to_str()).filter(|id| is_valid_id(id)) else {
                warn!(path = %path.display(), "Skipping rule file whose name is not a valid rule id");
                continue;
            };
            rules.push(Self::read_rule(id, path)?);
        }
        Ok(rules)
    }

    fn get_rule(&self, id: &str) -> CalRulesResult<Rule> {
        let path = self.path_for(id)?;
        if !path.exists() {
            return Err(CalRulesError::RuleNotFound(id.to_string()));
        }
        Self::read_rule(id, &path)
    }

    fn put_rule(&self, rule: &Rule) -> CalRulesResult<()> {
        let path = self.path_for(&rule.id)?;
        std::fs::create_dir_all(&self.dir)?;

        let content = toml::to_string_pretty(rule).map_err(|e| CalRulesError::Serialization(e.to_string()))?;
        let temp = path.with_extension("toml.tmp");
        std::fs::write(&temp, content)?;
        std::fs::rename(&temp, &path)?;
        Ok(())
    }

    fn delete_rule(&self, id: &str) -> CalRulesResult<()> {
        let path = self.path_for(id)?;
        if !path.exists() {
            return Err(CalRulesError::RuleNotFound(id.to_string()));
        }
        std::fs::remove_file(path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{RuleKind, RuleStatus};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_rules_survive_reload() {
        let dir = TempDir::new().unwrap();
        let store = DirRuleStore::new(dir.path());

        let mut rule = Rule::new(
            "work-hours",
            "Work Hours Filter",
            RuleKind::Filter,
            "// keep office hours\nstartHour >= 9 && endHour <= 18\n",
        );
        rule.status = RuleStatus::Active;
        let saved = store.save_rule(rule).unwrap();

        let reopened = DirRuleStore::new(dir.path());
        assert_eq!(reopened.get_rule("work-hours").unwrap(), saved);
        assert!(dir.path().join("work-hours.toml").exists());
    }

    #[test]
    fn test_list_is_sorted_by_id() {
        let dir = TempDir::new().unwrap();
        let store = DirRuleStore::new(dir.path());
        for id in ["weekend", "alpha", "private"] {
            store.save_rule(Rule::new(id, id, RuleKind::Filter, "true")).unwrap();
        }

        let ids: Vec<String> = store.list_rules().unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["alpha", "private", "weekend"]);
    }

    #[test]
    fn test_missing_directory_lists_nothing() {
        let dir = TempDir::new().unwrap();
        let store = DirRuleStore::new(dir.path().join("nope"));
        assert!(store.list_rules().unwrap().is_empty());
    }

    #[test]
    fn test_path_traversal_ids_are_rejected() {
        let dir = TempDir::new().unwrap();
        let store = DirRuleStore::new(dir.path());
        let rule = Rule::new("../escape", "x", RuleKind::Filter, "true");
        assert!(matches!(store.save_rule(rule), Err(CalRulesError::InvalidRule(_))));
    }

    #[test]
    fn test_delete_removes_file() {
        let dir = TempDir::new().unwrap();
        let store = DirRuleStore::new(dir.path());
        store.save_rule(Rule::new("r", "R", RuleKind::Filter, "true")).unwrap();

        store.delete_rule("r").unwrap();
        assert!(matches!(store.get_rule("r"), Err(CalRulesError::RuleNotFound(_))));
    }

    #[test]
    fn test_file_name_decides_the_id() {
        let dir = TempDir::new().unwrap();
        let store = DirRuleStore::new(dir.path());
        store.save_rule(Rule::new("focus", "Focus", RuleKind::Condition, "true")).unwrap();
        std::fs::rename(dir.path().join("focus.toml"), dir.path().join("deep-work.toml")).unwrap();
        std::fs::write(dir.path().join("not a rule id.toml"), "garbage").unwrap();

        let rules = store.list_rules().unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].id, "deep-work");
        assert_eq!(store.get_rule("deep-work").unwrap().name, "Focus");

        store.delete_rule(&rules[0].id).unwrap();
        assert!(store.list_rules().unwrap().is_empty());
    }
}
