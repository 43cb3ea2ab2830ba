//! CLI command implementations.

use crate::config::RuleEntry;
use crate::debounce::Debouncer;
use colored::Colorize;
use globwatch_watcher::{Node, NodeKind, Session};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Mutex;
use tracing::{debug, info};

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// Everything `watch` needs, already merged from flags and config.
#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub directory: PathBuf,
    pub rules: Vec<RuleEntry>,
    pub rate_limit: Duration,
    pub command: String,
    pub args: Vec<String>,
}

/// Runs the command whenever included files change, until Ctrl+C.
pub async fn watch(options: WatchOptions) -> Result<()> {
    let session = open(&options.directory, &options.rules).await?;
    let mut changes = session.subscribe();

    println!(
        "{} Watching {} ({} included), running {} on change",
        "✓".green(),
        session.root().display(),
        session.tree().stats().included.to_string().cyan(),
        command_line(&options.command, &options.args).cyan()
    );

    let runner = Arc::new(Runner {
        session: Arc::clone(&session),
        command: options.command,
        args: options.args,
        running: Mutex::new(()),
    });
    let debouncer = Debouncer::new(options.rate_limit);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            signal = &mut shutdown => {
                signal?;
                info!("Interrupted, shutting down");
                break;
            }
            change = changes.recv() => match change {
                Ok(event) => {
                    debug!("Change notification: {:?}", event);
                    schedule(&debouncer, &runner);
                }
                // Missed some; one run covers them all.
                Err(RecvError::Lagged(skipped)) => {
                    debug!("Skipped {} change notifications", skipped);
                    schedule(&debouncer, &runner);
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    debouncer.cancel();
    session.dispose();
    Ok(())
}

fn schedule(debouncer: &Debouncer, runner: &Arc<Runner>) {
    let runner = Arc::clone(runner);
    debouncer.trigger(move || async move { runner.run().await });
}

struct Runner {
    session: Arc<Session>,
    command: String,
    args: Vec<String>,

    /// Held while the command runs so runs never overlap.
    running: Mutex<()>,
}

impl Runner {
    async fn run(&self) {
        let _running = self.running.lock().await;
        let line = command_line(&self.command, &self.args);
        debug!("Running {}", line);

        // Dropped with the run, e.g. when Ctrl+C shuts the runtime down.
        let status = tokio::process::Command::new(&self.command)
            .args(&self.args)
            .kill_on_drop(true)
            .status()
            .await;

        match status {
            Ok(status) if status.success() => {}
            Ok(status) => println!("{}", failure_message(&line, status.code()).red().bold()),
            Err(e) => println!("{}", format!("{} failed to start: {}", line, e).red().bold()),
        }

        self.session.clean();
    }
}

fn command_line(command: &str, args: &[String]) -> String {
    std::iter::once(command)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

fn failure_message(line: &str, code: Option<i32>) -> String {
    match code {
        Some(code) => format!("{} exited with code {}", line, code),
        None => format!("{} was terminated by a signal", line),
    }
}

/// Prints which entries the rules include, then exits.
pub async fn list(directory: &Path, rules: &[RuleEntry], json: bool) -> Result<()> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner.set_message(format!("Scanning {}...", directory.display()));

    let opened = open(directory, rules).await;
    spinner.finish_and_clear();
    let session = opened?;

    let Some(root) = session.root_node() else {
        session.dispose();
        return Err("session has no root".into());
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&ListEntry::from_node(&root))?);
    } else {
        for line in render(&root) {
            println!("{}", line);
        }

        let stats = session.tree().stats();
        println!(
            "\n{} {} entries, {} included",
            "✓".green(),
            stats.nodes.to_string().cyan(),
            stats.included.to_string().green()
        );
    }

    session.dispose();
    Ok(())
}

async fn open(directory: &Path, rules: &[RuleEntry]) -> Result<Arc<Session>> {
    let session = Session::open(directory).await?;
    for rule in rules {
        if let Err(e) = session.add_rule(rule.kind(), rule.pattern()).await {
            session.dispose();
            return Err(e.into());
        }
    }
    Ok(session)
}

/// JSON shape of `--list --json`.
#[derive(Debug, Serialize)]
pub struct ListEntry {
    pub name: String,
    pub path: String,
    pub kind: NodeKind,
    pub included: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ListEntry>,
}

impl ListEntry {
    fn from_node(node: &Node) -> Self {
        Self {
            name: node.name().to_string(),
            path: node.rel_path().to_string(),
            kind: node.kind(),
            included: node.is_included(),
            rule: node.matched_rule().map(|rule| rule.to_string()),
            children: node
                .children()
                .iter()
                .map(|child| ListEntry::from_node(child))
                .collect(),
        }
    }
}

/// Renders `root` and its descendants as an indented tree.
fn render(root: &Node) -> Vec<String> {
    let mut lines = vec![format!("{}/", root.full_path().display()).bold().to_string()];
    let children = root.children();
    let last = children.len().saturating_sub(1);
    for (i, child) in children.iter().enumerate() {
        render_into(child, "", i == last, &mut lines);
    }
    lines
}

fn render_into(node: &Node, prefix: &str, last: bool, lines: &mut Vec<String>) {
    let branch = if last { "└── " } else { "├── " };
    let mut name = node.name().to_string();
    if node.kind() == NodeKind::Directory {
        name.push('/');
    }

    let label = match node.matched_rule() {
        Some(rule) if node.is_included() => {
            format!("{}  {}", name.green(), format!("({})", rule).dimmed())
        }
        _ => name.dimmed().to_string(),
    };
    lines.push(format!("{}{}{}", prefix, branch, label));

    let nested = format!("{}{}", prefix, if last { "    " } else { "│   " });
    let children = node.children();
    let end = children.len().saturating_sub(1);
    for (i, child) in children.iter().enumerate() {
        render_into(child, &nested, i == end, lines);
    }
}
