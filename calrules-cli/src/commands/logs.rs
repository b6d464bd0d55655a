use anyhow::Result;
use calrules_core::CalrulesConfig;
use calrules_core::report::{BatchReport, LogPage, LogStatus};
use owo_colors::OwoColorize;

use crate::render::Render;

pub fn run(config: &CalrulesConfig, status: Option<LogStatus>, offset: usize, limit: usize) -> Result<()> {
    let Some(report) = BatchReport::load_last(&config.state_path())? else {
        println!("{}", "No sync has run yet. Try `calrules run`".dimmed());
        return Ok(());
    };

    println!("{}", render_page(&report.logs(status, offset, limit)));
    Ok(())
}

fn render_page(page: &LogPage) -> String {
    if page.entries.is_empty() {
        return "No log entries".dimmed().to_string();
    }

    let mut lines: Vec<String> = page.entries.iter().map(|e| e.render()).collect();
    let shown_to = page.offset + page.entries.len();
    if shown_to < page.total || page.offset > 0 {
        lines.push(
            format!("Showing {}-{} of {}", page.offset + 1, shown_to, page.total)
                .dimmed()
                .to_string(),
        );
    }
    lines.join("\n")
}
