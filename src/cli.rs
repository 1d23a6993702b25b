//! CLI struct definitions for the `starlog` command-line interface.
//!
//! Command groups owned by a plugin (`rules`, `diary`, `session`, `flight`)
//! define their own clap types next to their implementation; dispatch lives in `lib.rs`.

use crate::plugins::{diary, flight, rules, sessions};

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[clap(
    name = "starlog",
    version = env!("CARGO_PKG_VERSION"),
    about = "Project logbook for agents: rules, debug diary, sessions and assembled context."
)]
pub(crate) struct Cli {
    /// Data directory holding registry.db (default: $STARLOG_DATA_DIR or ~/.starlog/data).
    #[clap(long, global = true)]
    pub data_dir: Option<PathBuf>,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(clap::Args, Debug)]
pub(crate) struct InitCli {
    /// Project directory (created if missing).
    #[clap(default_value = ".")]
    pub path: PathBuf,
    /// Project name; defaults to the directory name.
    #[clap(long)]
    pub name: Option<String>,
    #[clap(long, default_value = "")]
    pub description: String,
    #[clap(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(clap::Args, Debug)]
pub(crate) struct PathCli {
    /// Project directory.
    #[clap(default_value = ".")]
    pub path: PathBuf,
    #[clap(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(clap::Args, Debug)]
pub(crate) struct RegistryCli {
    /// Project directory.
    #[clap(long, global = true, default_value = ".")]
    pub path: PathBuf,
    #[clap(long, global = true, value_enum, default_value = "text")]
    pub format: OutputFormat,
    #[clap(subcommand)]
    pub command: RegistryCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum RegistryCommand {
    /// Show each registry of the project: name, database, document count.
    Paths,
    /// List the project's registries, including custom categories.
    List,
    /// Create a custom registry.
    Create {
        #[clap(long)]
        category: String,
    },
    /// Fetch one raw document.
    Get {
        #[clap(long)]
        category: String,
        #[clap(long)]
        id: String,
    },
    /// Store a raw JSON document (upsert).
    Put {
        #[clap(long)]
        category: String,
        #[clap(long)]
        id: String,
        #[clap(long)]
        json: String,
    },
    /// Delete one document.
    Delete {
        #[clap(long)]
        category: String,
        #[clap(long)]
        id: String,
    },
    /// Resolve a pointer expression against the project.
    Resolve {
        #[clap(value_name = "EXPRESSION")]
        expression: String,
    },
}

#[derive(clap::Args, Debug)]
pub(crate) struct TemplateCli {
    /// Project directory.
    #[clap(long, global = true, default_value = ".")]
    pub path: PathBuf,
    #[clap(subcommand)]
    pub command: TemplateCommand,
}

#[derive(Subcommand, Debug)]
pub(crate) enum TemplateCommand {
    /// Print the project template as JSON.
    Show,
    /// Replace the template with the JSON file at FILE; metadata is kept.
    Replace {
        #[clap(long)]
        file: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Create a project: registries plus the starlog.hpi marker.
    Init(InitCli),
    /// Report whether a directory is a project.
    Check(PathCli),
    /// Assemble the project context.
    Orient(PathCli),
    /// Print the workflow guide.
    Guide,
    /// Project rules.
    Rules(rules::RulesCli),
    /// Debug diary and actionable queue.
    Diary(diary::DiaryCli),
    /// Work sessions.
    Session(sessions::SessionCli),
    /// Flight configs shared across projects.
    Flight(flight::FlightCli),
    /// Raw registry access.
    Registry(RegistryCli),
    /// Project template.
    Template(TemplateCli),
}
