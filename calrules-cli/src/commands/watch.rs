use std::time::Duration;

use anyhow::Result;
use calrules_core::CalrulesConfig;
use owo_colors::OwoColorize;

use super::run::{RunOptions, render_report, sync_once};

/// Run a sync pass every `interval` until interrupted. A failed pass is
/// reported and the loop carries on.
pub async fn run(config: &CalrulesConfig, options: &RunOptions, interval: Duration) -> Result<()> {
    println!(
        "{}",
        format!("Syncing every {}, press Ctrl-C to stop", humantime::format_duration(interval)).dimmed()
    );

    loop {
        println!(
            "\n{}",
            chrono::Local::now().format("%H:%M:%S").to_string().bold()
        );
        match sync_once(config, options).await {
            Ok(report) => println!("{}", render_report(&report, options.verbose)),
            Err(e) => {
                tracing::warn!("Sync pass failed: {:#}", e);
                println!("{}", e.to_string().red());
            }
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("{}", "Stopped".dimmed());
                return Ok(());
            }
            _ = tokio::time::sleep(interval) => {}
        }
    }
}
