//! STARLOG: a per-project logbook for agents.
//!
//! Each project owns three registries in one local SQLite database:
//!
//! - `rules`: coding standards and conventions
//! - `debug_diary`: the running status log, scheduled AUTO-first
//! - `starlog`: work sessions, at most one open at a time
//!
//! `orient` renders the project's block template (stored in the `starlog.hpi`
//! marker) against those registries into one context string.
//!
//! # Architecture
//!
//! - Every mutation goes through [`core::store::DocumentStore::transact`]:
//!   a per-registry write lock, one SQLite transaction, one audit line in
//!   `broker.events.jsonl`.
//! - Pointer blocks are parsed into [`core::expr::Expression`] once, when
//!   the template is loaded. [`core::resolver::Resolver`] resolves them with
//!   cycle and depth control; anything unresolvable renders as a
//!   `[[starlog:unresolved ...]]` placeholder.
//! - Files and external modules are reached only through
//!   [`core::collaborators`], under a timeout.
//!
//! # Examples
//!
//! ```bash
//! starlog init ./demo --name demo
//! starlog rules add "Write tests" --category testing --path ./demo
//! starlog session start "Parser work" --start "Fix the lexer" --path ./demo
//! starlog diary add "Lexer drops CRLF" --auto --path ./demo
//! starlog orient ./demo
//! ```

pub mod core;
pub mod plugins;

mod cli;

pub use crate::core::error::{ErrorKind, StarlogError};
pub use crate::core::store::DocumentStore;

use crate::cli::{
    Cli, Command, InitCli, OutputFormat, PathCli, RegistryCli, RegistryCommand, TemplateCli,
    TemplateCommand,
};
use crate::core::collaborators::{CommandCodeLoader, FsFileReader};
use crate::core::config::{self, StarlogConfig};
use crate::core::expr::Expression;
use crate::core::store::{DIARY, RULES, SESSIONS};
use crate::core::project::{self, Project};
use crate::core::resolver::Resolver;
use crate::core::template::Template;
use crate::core::{assets, time};
use crate::plugins::orient::{self, OrientOptions};
use crate::plugins::{diary, flight, rules, sessions};

use clap::Parser;
use colored::Colorize;
use serde_json::Value as JsonValue;
use std::fs;
use std::path::Path;
use std::sync::Arc;

fn emit(format: OutputFormat, out: &JsonValue, text: &str) -> Result<(), StarlogError> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(out)?),
        OutputFormat::Text => println!("{}", text),
    }
    Ok(())
}

fn default_project_name(path: &Path) -> Result<String, StarlogError> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    absolute
        .components()
        .next_back()
        .and_then(|c| c.as_os_str().to_str())
        .filter(|n| *n != "." && *n != "/")
        .map(str::to_string)
        .ok_or_else(|| {
            StarlogError::InvalidArgument(format!(
                "cannot derive a project name from {}; pass --name",
                path.display()
            ))
        })
}

fn run_init(store: &DocumentStore, cli: InitCli) -> Result<(), StarlogError> {
    let name = match cli.name {
        Some(name) => name,
        None => default_project_name(&cli.path)?,
    };
    let init = project::init_project(store, &cli.path, &name, &cli.description)?;
    let text = format!(
        "{} {}\n  marker: {}\n  registries: {}",
        "Initialized STARLOG project".green().bold(),
        init.project.bold(),
        init.marker.display(),
        init.registries.join(", ")
    );
    emit(
        cli.format,
        &time::command_envelope("init", "ok", serde_json::json!({ "project": init })),
        &text,
    )
}

fn run_check(store: &DocumentStore, cli: PathCli) -> Result<(), StarlogError> {
    let status = project::check(store, &cli.path)?;
    let text = match (&status.project_name, status.is_starlog_project) {
        (Some(name), true) => {
            let counts = status
                .registries
                .iter()
                .map(|(category, n)| format!("{}={}", category, n))
                .collect::<Vec<_>>()
                .join(" ");
            format!("{} {} ({})", "STARLOG project:".green().bold(), name, counts)
        }
        (Some(name), false) => format!(
            "{} {} has a marker but is missing registries",
            "Incomplete project:".yellow().bold(),
            name
        ),
        (None, _) => format!(
            "{} {} (run `starlog init`)",
            "Not a STARLOG project:".red().bold(),
            cli.path.display()
        ),
    };
    emit(
        cli.format,
        &time::command_envelope("check", "ok", serde_json::to_value(&status)?),
        &text,
    )
}

fn run_orient(store: &DocumentStore, config: &StarlogConfig, cli: PathCli) -> Result<(), StarlogError> {
    let options = OrientOptions {
        recent_diary_entries: config.context.recent_diary_entries,
        resolver: config.resolver_options(),
    };
    let report = orient::orient(store, &cli.path, &options)?;
    emit(
        cli.format,
        &time::command_envelope("orient", "ok", serde_json::to_value(&report)?),
        &report.context,
    )
}

/// Raw writes are limited to free-form registries; the project registries
/// only change through their validating commands.
fn untyped_category(category: &str) -> Result<(), StarlogError> {
    let command = match category {
        RULES => "rules",
        DIARY => "diary",
        SESSIONS => "session",
        _ => return Ok(()),
    };
    Err(StarlogError::InvalidArgument(format!(
        "registry '{}' is managed by `starlog {}`",
        category, command
    )))
}

fn run_registry(
    store: &DocumentStore,
    config: &StarlogConfig,
    cli: RegistryCli,
) -> Result<(), StarlogError> {
    let project = Project::open(&cli.path)?;
    let name = project.name.as_str();
    let (out, text) = match cli.command {
        RegistryCommand::Paths => {
            let paths = project::registry_paths(store, &cli.path)?;
            let text = paths
                .iter()
                .map(|p| {
                    let state = if p.exists {
                        format!("{} documents", p.documents).normal()
                    } else {
                        "missing".red()
                    };
                    format!("{} ({}) {}", p.name.bold(), p.database.display(), state)
                })
                .collect::<Vec<_>>()
                .join("\n");
            (
                time::command_envelope("registry.paths", "ok", serde_json::json!({ "registries": paths })),
                text,
            )
        }
        RegistryCommand::List => {
            let registries = store.list_registries(name)?;
            let text = registries
                .iter()
                .map(|r| format!("{} [{}] {} documents", r.name, r.category, r.documents))
                .collect::<Vec<_>>()
                .join("\n");
            (
                time::command_envelope("registry.list", "ok", serde_json::json!({ "registries": registries })),
                text,
            )
        }
        RegistryCommand::Create { category } => {
            let created = store.create_registry(name, &category)?;
            (
                time::command_envelope(
                    "registry.create",
                    "ok",
                    serde_json::json!({ "category": category, "created": created }),
                ),
                if created {
                    format!("Created registry {}", category)
                } else {
                    format!("Registry {} already exists", category)
                },
            )
        }
        RegistryCommand::Get { category, id } => {
            let doc = store.get(name, &category, &id)?;
            let text = serde_json::to_string_pretty(&doc.body)?;
            (
                time::command_envelope("registry.get", "ok", serde_json::json!({ "document": doc })),
                text,
            )
        }
        RegistryCommand::Put { category, id, json } => {
            untyped_category(&category)?;
            let body: JsonValue = serde_json::from_str(&json)
                .map_err(|e| StarlogError::InvalidArgument(format!("--json: {}", e)))?;
            let doc = store.put(name, &category, &id, &body)?;
            (
                time::command_envelope("registry.put", "ok", serde_json::json!({ "document": doc })),
                format!("Stored {}/{}", category, id),
            )
        }
        RegistryCommand::Delete { category, id } => {
            untyped_category(&category)?;
            store.delete(name, &category, &id)?;
            (
                time::command_envelope(
                    "registry.delete",
                    "ok",
                    serde_json::json!({ "category": category, "id": id }),
                ),
                format!("Deleted {}/{}", category, id),
            )
        }
        RegistryCommand::Resolve { expression } => {
            let expr: Expression = expression.parse()?;
            let resolver = Resolver::new(
                store,
                name,
                Arc::new(FsFileReader::new(&project.dir)),
                Arc::new(CommandCodeLoader::new(&project.dir)),
            )
            .with_options(config.resolver_options());
            let text = resolver.resolve(&expr);
            (
                time::command_envelope(
                    "registry.resolve",
                    "ok",
                    serde_json::json!({ "expression": expr.to_string(), "text": text }),
                ),
                text,
            )
        }
    };
    emit(cli.format, &out, &text)
}

fn run_template(cli: TemplateCli) -> Result<(), StarlogError> {
    match cli.command {
        TemplateCommand::Show => {
            let project = Project::open(&cli.path)?;
            println!("{}", project.template.to_json_pretty()?);
        }
        TemplateCommand::Replace { file } => {
            let template = Template::from_json(&fs::read_to_string(&file)?)?;
            let template = project::replace_template(&cli.path, template)?;
            println!(
                "Replaced template with '{}' ({} blocks)",
                template.name,
                template.blocks.len()
            );
        }
    }
    Ok(())
}

pub fn run() -> Result<(), StarlogError> {
    let cli = Cli::parse();

    if let Command::Guide = cli.command {
        println!("{}", assets::GUIDE_MD);
        return Ok(());
    }

    let data_dir = cli.data_dir.clone().unwrap_or_else(config::default_data_dir);
    let config = config::load_config(&data_dir)?;
    let store = DocumentStore::open(&data_dir, &config.actor())?;
    tracing::debug!(data_dir = %data_dir.display(), "store opened");

    match cli.command {
        Command::Init(c) => run_init(&store, c),
        Command::Check(c) => run_check(&store, c),
        Command::Orient(c) => run_orient(&store, &config, c),
        Command::Guide => Ok(()),
        Command::Rules(c) => rules::run_rules_cli(&store, c),
        Command::Diary(c) => diary::run_diary_cli(&store, c),
        Command::Session(c) => sessions::run_session_cli(&store, c),
        Command::Flight(c) => flight::run_flight_cli(&store, c),
        Command::Registry(c) => run_registry(&store, &config, c),
        Command::Template(c) => run_template(c),
    }
}
