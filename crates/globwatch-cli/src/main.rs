//! when - run a command when matching files change
//!
//! Watches a directory, classifies every entry with ordered include and
//! exclude globs, and runs the given command (debounced) whenever an
//! included entry changes.

use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser};
use colored::Colorize;
use globwatch_watcher::WatchError;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;
mod debounce;

use config::{Config, RuleEntry};

const DEFAULT_RATE_LIMIT_MS: u64 = 250;

#[derive(Parser, Debug)]
#[command(name = "when")]
#[command(author = "globwatch Contributors")]
#[command(version)]
#[command(about = "Run a command when matching files change", long_about = None)]
struct Cli {
    /// Include entries matching this glob (repeatable)
    #[arg(short = 'i', long, value_name = "GLOB")]
    include: Vec<String>,

    /// Exclude entries matching this glob (repeatable)
    #[arg(short = 'x', long, value_name = "GLOB")]
    exclude: Vec<String>,

    /// Milliseconds to wait for changes to settle before running
    #[arg(short, long, value_name = "MS")]
    rate_limit: Option<u64>,

    /// JSON config file (defaults to .when.json in the watched directory)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory to watch
    #[arg(short = 'C', long, value_name = "DIR", default_value = ".")]
    directory: PathBuf,

    /// Print the tree with included entries marked, then exit
    #[arg(short, long)]
    list: bool,

    /// With --list, print JSON instead of a tree
    #[arg(long, requires = "list")]
    json: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Command to run, followed by its arguments
    #[arg(
        value_name = "COMMAND",
        trailing_var_arg = true,
        required_unless_present = "list"
    )]
    command: Vec<String>,
}

#[tokio::main]
async fn main() {
    let matches = Cli::command().get_matches();
    let cli = match Cli::from_arg_matches(&matches) {
        Ok(cli) => cli,
        Err(e) => e.exit(),
    };

    // Set up logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(tracing_subscriber::EnvFilter::new(filter))
        .init();

    let flags = ordered_rules(&matches);

    if let Err(e) = run(cli, flags).await {
        for line in error_report(e.as_ref()) {
            eprintln!("{}", line);
        }
        std::process::exit(1);
    }
}

/// `error: <message>`, then one line per cause when the message only
/// counts them.
fn error_report(e: &(dyn std::error::Error + 'static)) -> Vec<String> {
    let mut lines = vec![format!("{} {}", "error:".red().bold(), e)];
    if let Some(causes) = e.downcast_ref::<WatchError>().and_then(WatchError::causes) {
        for failure in causes.failures() {
            lines.push(format!("  {} {}", "-".red(), failure));
        }
    }
    lines
}

async fn run(cli: Cli, flags: Vec<RuleEntry>) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load(cli.config.as_deref(), &cli.directory)?;

    // File rules first, then flags in command-line order.
    let mut rules = config.rules;
    rules.extend(flags);

    if cli.list {
        return commands::list(&cli.directory, &rules, cli.json).await;
    }

    let rate_limit = cli
        .rate_limit
        .or(config.rate_limit_ms)
        .unwrap_or(DEFAULT_RATE_LIMIT_MS);

    let mut words = cli.command.into_iter();
    let Some(command) = words.next() else {
        return Err("no command given".into());
    };

    commands::watch(commands::WatchOptions {
        directory: cli.directory,
        rules,
        rate_limit: Duration::from_millis(rate_limit),
        command,
        args: words.collect(),
    })
    .await
}

/// Includes and excludes interleaved the way they appeared on the
/// command line.
fn ordered_rules(matches: &ArgMatches) -> Vec<RuleEntry> {
    let mut indexed: Vec<(usize, RuleEntry)> = Vec::new();

    if let (Some(indices), Some(values)) = (
        matches.indices_of("include"),
        matches.get_many::<String>("include"),
    ) {
        indexed.extend(indices.zip(values.cloned().map(RuleEntry::Include)));
    }
    if let (Some(indices), Some(values)) = (
        matches.indices_of("exclude"),
        matches.get_many::<String>("exclude"),
    ) {
        indexed.extend(indices.zip(values.cloned().map(RuleEntry::Exclude)));
    }

    indexed.sort_by_key(|(index, _)| *index);
    indexed.into_iter().map(|(_, rule)| rule).collect()
}
