mod commands;
mod render;
mod utils;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use calrules_core::report::LogStatus;
use calrules_core::rule::RuleKind;
use calrules_core::CalrulesConfig;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "calrules")]
#[command(about = "Manage calendar sync rules and run them against your events")]
#[command(version)]
struct Cli {
    /// Show debug logs (rule evaluations, timings)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create, edit and toggle rules
    Rules {
        #[command(subcommand)]
        command: RulesCommand,
    },
    /// Compile every rule and report syntax errors
    Check,
    /// Evaluate one rule against a single event
    Test {
        /// Rule id
        rule: String,

        /// Event as JSON, or @path to a JSON file
        #[arg(short, long)]
        event: String,
    },
    /// Run active rules over all events once
    Run {
        /// A .json file of events or a directory of .ics files (overrides config)
        #[arg(short, long)]
        source: Option<PathBuf>,

        /// Stop evaluating an event once a rule excludes it
        #[arg(long)]
        short_circuit: bool,
    },
    /// Run a sync pass repeatedly
    Watch {
        /// Time between passes, e.g. "30s" or "15min" (default: sync.frequency)
        #[arg(short, long, value_parser = humantime::parse_duration)]
        interval: Option<Duration>,

        #[arg(short, long)]
        source: Option<PathBuf>,

        #[arg(long)]
        short_circuit: bool,
    },
    /// Show the sync log of the last run
    Logs {
        /// Only show entries with this status (success, warning, error)
        #[arg(long)]
        status: Option<LogStatus>,

        #[arg(long, default_value_t = 0)]
        offset: usize,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Show dashboard statistics for the last run
    Stats,
}

#[derive(Subcommand)]
enum RulesCommand {
    /// List all rules in evaluation order
    List,
    /// Show a rule and its code
    Show { id: String },
    /// Create a draft rule
    New {
        name: String,

        /// filter, transform or condition
        #[arg(short = 't', long = "type", default_value = "filter")]
        kind: RuleKind,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(short, long)]
        priority: Option<i32>,

        /// Read the code from this file instead of using a template
        #[arg(long)]
        code_file: Option<PathBuf>,
    },
    /// Edit a rule's metadata or code (opens $EDITOR when no code is given)
    Edit {
        id: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(short, long)]
        priority: Option<i32>,

        #[arg(long)]
        code_file: Option<PathBuf>,
    },
    /// Delete a rule
    Delete {
        id: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
    /// Copy a rule under a new id (as a draft)
    Duplicate { id: String },
    /// Make a rule active
    Enable { id: String },
    /// Return a rule to draft
    Disable { id: String },
    /// Pause an active rule
    Pause { id: String },
    /// Switch between active and paused
    Toggle { id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    utils::logging::init(cli.verbose);

    let config = CalrulesConfig::load()?;

    match cli.command {
        Commands::Rules { command } => run_rules(&config, command),
        Commands::Check => commands::check::run(&config),
        Commands::Test { rule, event } => commands::test::run(&config, &rule, &event),
        Commands::Run { source, short_circuit } => {
            let options = commands::run::RunOptions {
                source,
                short_circuit,
                verbose: cli.verbose,
            };
            commands::run::run(&config, &options).await
        }
        Commands::Watch {
            interval,
            source,
            short_circuit,
        } => {
            let options = commands::run::RunOptions {
                source,
                short_circuit,
                verbose: cli.verbose,
            };
            let interval = interval.unwrap_or(config.sync.frequency);
            commands::watch::run(&config, &options, interval).await
        }
        Commands::Logs { status, offset, limit } => commands::logs::run(&config, status, offset, limit),
        Commands::Stats => commands::stats::run(&config),
    }
}

fn run_rules(config: &CalrulesConfig, command: RulesCommand) -> Result<()> {
    use commands::rules;

    let store = config.rule_store();
    match command {
        RulesCommand::List => rules::list(&store),
        RulesCommand::Show { id } => rules::show(&store, &id),
        RulesCommand::New {
            name,
            kind,
            description,
            priority,
            code_file,
        } => rules::new(&store, &name, kind, description, priority, code_file),
        RulesCommand::Edit {
            id,
            name,
            description,
            priority,
            code_file,
        } => {
            let changes = rules::RuleChanges {
                name,
                description,
                priority,
                code_file,
            };
            rules::edit(&store, &id, changes)
        }
        RulesCommand::Delete { id, force } => rules::delete(&store, &id, force),
        RulesCommand::Duplicate { id } => rules::duplicate(&store, &id),
        RulesCommand::Enable { id } => rules::set_status(&store, &id, rules::StatusChange::Enable),
        RulesCommand::Disable { id } => rules::set_status(&store, &id, rules::StatusChange::Disable),
        RulesCommand::Pause { id } => rules::set_status(&store, &id, rules::StatusChange::Pause),
        RulesCommand::Toggle { id } => rules::set_status(&store, &id, rules::StatusChange::Toggle),
    }
}
