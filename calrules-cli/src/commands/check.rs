use anyhow::Result;
use calrules_core::rule::order_rules;
use calrules_core::{CalrulesConfig, RuleStore};
use owo_colors::OwoColorize;

use crate::render::{Render, pluralize};

/// Compile every stored rule, active or not.
pub fn run(config: &CalrulesConfig) -> Result<()> {
    let store = config.rule_store();
    let failures = check(&store, config)?;

    if failures > 0 {
        anyhow::bail!("{} {} failed to compile", failures, pluralize("rule", failures));
    }
    Ok(())
}

fn check(store: &dyn RuleStore, config: &CalrulesConfig) -> Result<usize> {
    let evaluator = config.evaluator();
    let mut rules = store.list_rules()?;
    order_rules(&mut rules);

    let mut failures = 0;
    for rule in &rules {
        match evaluator.compile(rule) {
            Ok(_) => println!("{} {}", "✓".green(), rule.render()),
            Err(e) => {
                failures += 1;
                println!("{}", e.render());
            }
        }
    }

    if rules.is_empty() {
        println!("{}", "No rules to check".dimmed());
    }
    Ok(failures)
}
