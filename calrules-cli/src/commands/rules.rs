use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use calrules_core::rule::{Rule, RuleKind, order_rules};
use calrules_core::{Evaluator, RuleStore};
use dialoguer::{Confirm, Editor};
use owo_colors::OwoColorize;

use crate::render::Render;

pub fn list(store: &dyn RuleStore) -> Result<()> {
    let mut rules = store.list_rules()?;
    if rules.is_empty() {
        println!("{}", "No rules yet. Create one with `calrules rules new <name>`".dimmed());
        return Ok(());
    }

    order_rules(&mut rules);
    for rule in &rules {
        println!("{}", rule.render());
        if !rule.description.is_empty() {
            println!("   {}", rule.description.dimmed());
        }
    }

    Ok(())
}

pub fn show(store: &dyn RuleStore, id: &str) -> Result<()> {
    let rule = store.get_rule(id)?;

    println!("{}", rule.render());
    if !rule.description.is_empty() {
        println!("   {}", rule.description.dimmed());
    }
    println!(
        "   {}",
        format!("Last modified {}", rule.last_modified.format("%Y-%m-%d %H:%M")).dimmed()
    );
    println!();
    for line in rule.code.lines() {
        println!("   {}", line);
    }

    Ok(())
}

pub fn new(
    store: &dyn RuleStore,
    name: &str,
    kind: RuleKind,
    description: Option<String>,
    priority: Option<i32>,
    code_file: Option<PathBuf>,
) -> Result<()> {
    let mut rule = store.create_rule(name, kind)?;

    if description.is_some() || priority.is_some() || code_file.is_some() {
        if let Some(description) = description {
            rule.description = description;
        }
        if let Some(priority) = priority {
            rule.priority = priority;
        }
        if let Some(path) = code_file {
            rule.code = read_code(&path)?;
        }
        rule = store.save_rule(rule)?;
    }

    println!("{} {}", "Created".green(), rule.render());
    warn_if_broken(&rule);

    Ok(())
}

/// Changes requested on the command line. All `None` means "open the editor".
pub struct RuleChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub priority: Option<i32>,
    pub code_file: Option<PathBuf>,
}

impl RuleChanges {
    fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.priority.is_none() && self.code_file.is_none()
    }
}

pub fn edit(store: &dyn RuleStore, id: &str, changes: RuleChanges) -> Result<()> {
    let mut rule = store.get_rule(id)?;

    if changes.is_empty() {
        let Some(code) = Editor::new().extension(".js").edit(&rule.code)? else {
            println!("{}", "Editor closed without saving, rule unchanged".dimmed());
            return Ok(());
        };
        if code == rule.code {
            println!("{}", "No changes".dimmed());
            return Ok(());
        }
        rule.code = code;
    } else {
        if let Some(name) = changes.name {
            rule.name = name;
        }
        if let Some(description) = changes.description {
            rule.description = description;
        }
        if let Some(priority) = changes.priority {
            rule.priority = priority;
        }
        if let Some(path) = changes.code_file {
            rule.code = read_code(&path)?;
        }
    }

    let rule = store.save_rule(rule)?;
    println!("{} {}", "Saved".green(), rule.render());
    warn_if_broken(&rule);

    Ok(())
}

pub fn delete(store: &dyn RuleStore, id: &str, force: bool) -> Result<()> {
    let rule = store.get_rule(id)?;

    if !force {
        let confirmed = Confirm::new()
            .with_prompt(format!("Delete rule \"{}\"?", rule.name))
            .default(false)
            .interact()?;

        if !confirmed {
            return Ok(());
        }
    }

    store.delete_rule(id)?;
    println!("{} {}", "Deleted".red(), rule.name);

    Ok(())
}

pub fn duplicate(store: &dyn RuleStore, id: &str) -> Result<()> {
    let copy = store.duplicate(id)?;
    println!("{} {}", "Created".green(), copy.render());
    Ok(())
}

#[derive(Debug, Clone, Copy)]
pub enum StatusChange {
    Enable,
    Disable,
    Pause,
    Toggle,
}

pub fn set_status(store: &dyn RuleStore, id: &str, change: StatusChange) -> Result<()> {
    let rule = match change {
        StatusChange::Enable => store.enable(id)?,
        StatusChange::Disable => store.disable(id)?,
        StatusChange::Pause => store.pause(id)?,
        StatusChange::Toggle => store.toggle(id)?,
    };

    println!("{}", rule.render());
    if rule.is_active() {
        warn_if_broken(&rule);
    }

    Ok(())
}

fn read_code(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Could not read {}", path.display()))
}

/// Saving never rejects code, but say so when it will not run.
fn warn_if_broken(rule: &Rule) {
    if let Err(e) = Evaluator::default().compile(rule) {
        println!("   {}", e.render());
    }
}
