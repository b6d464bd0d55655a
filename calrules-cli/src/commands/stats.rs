use anyhow::Result;
use calrules_core::CalrulesConfig;
use calrules_core::report::BatchReport;
use owo_colors::OwoColorize;

use crate::render::Render;

pub fn run(config: &CalrulesConfig) -> Result<()> {
    let Some(report) = BatchReport::load_last(&config.state_path())? else {
        println!("{}", "No sync has run yet. Try `calrules run`".dimmed());
        return Ok(());
    };

    println!(
        "{}",
        format!("Last sync {}", report.finished_at.format("%Y-%m-%d %H:%M:%S UTC")).dimmed()
    );
    for stat in report.stats() {
        println!("{}", stat.render());
    }

    let mut stats: Vec<_> = report.rule_stats.iter().filter(|s| s.evaluated > 0).collect();
    if !stats.is_empty() {
        println!();
        stats.sort_by_key(|s| std::cmp::Reverse(s.failed));
        for s in stats {
            println!(
                "{} {}",
                s.name.bold(),
                format!(
                    "{} evaluated · {} passed · {} rejected · {} transformed · {} failed",
                    s.evaluated, s.passed, s.rejected, s.transformed, s.failed
                )
                .dimmed()
            );
        }
    }

    Ok(())
}
