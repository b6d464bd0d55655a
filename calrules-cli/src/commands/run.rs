use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use calrules_core::report::BatchReport;
use calrules_core::{BatchRunner, CalrulesConfig, RunMode, fetch_with_retries};
use owo_colors::OwoColorize;

use crate::render::{Render, pluralize};
use crate::utils::tui;

/// Above this many events only excluded or failing ones are listed.
const COMPACT_THRESHOLD: usize = 20;

pub struct RunOptions {
    pub source: Option<PathBuf>,
    pub short_circuit: bool,
    pub verbose: bool,
}

impl RunOptions {
    fn mode(&self, config: &CalrulesConfig) -> RunMode {
        if self.short_circuit { RunMode::ShortCircuit } else { config.engine.mode }
    }
}

pub async fn run(config: &CalrulesConfig, options: &RunOptions) -> Result<()> {
    let report = sync_once(config, options).await?;
    println!("{}", render_report(&report, options.verbose));
    Ok(())
}

/// Fetch events, run the active rules over them and save the report.
pub async fn sync_once(config: &CalrulesConfig, options: &RunOptions) -> Result<BatchReport> {
    let source = config.event_source(options.source.as_deref())?;

    let spinner = tui::create_spinner(format!("Fetching {}", source.describe()));
    let events = fetch_with_retries(&*source, config.fetch_retries()).await;
    spinner.finish_and_clear();
    let events = events?;

    let store = config.rule_store();
    let runner =
        BatchRunner::from_store(&store, config.evaluator(), options.mode(config))?.with_workers(config.workers());

    let started = Instant::now();
    let spinner = tui::create_spinner(format!(
        "Evaluating {} {}",
        events.len(),
        pluralize("event", events.len())
    ));
    let report = runner.run(events).await;
    spinner.finish_and_clear();

    tracing::debug!(
        events = report.decisions.len(),
        rules = report.active_rules,
        elapsed = ?started.elapsed(),
        "Sync pass finished"
    );

    report.save(&config.state_path())?;
    Ok(report)
}

pub fn render_report(report: &BatchReport, verbose: bool) -> String {
    let mut lines = Vec::new();

    for error in &report.compile_errors {
        lines.push(error.render());
    }

    let compact = !verbose && report.decisions.len() > COMPACT_THRESHOLD;
    for decision in &report.decisions {
        if compact && decision.included && decision.rule_errors.is_empty() {
            continue;
        }
        lines.push(decision.render());
    }

    if report.decisions.is_empty() {
        lines.push("No events".dimmed().to_string());
    }

    let included = report.included().count();
    let excluded = report.excluded_count();
    lines.push(String::new());
    lines.push(format!(
        "Synced: {} {}, excluded {}",
        included,
        pluralize("event", included),
        excluded
    ));

    let attention = report.rules_needing_attention();
    if !attention.is_empty() {
        lines.push(format!(
            "{} {}",
            format!("{} {} need attention:", attention.len(), pluralize("rule", attention.len())).red(),
            attention.join(", ")
        ));
    }

    lines.join("\n")
}
