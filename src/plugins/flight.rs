//! Flight configs: named, categorized session workflows shared across projects.
//!
//! Configs live in the global `_global/flight_configs` registry. Each records
//! the directory it was saved from, so browsing is scoped to one project
//! unless asked to span all of them. With nothing to show, `fly` falls back
//! to the standard workflow and writes it to `starlog_flight.json`.

use crate::core::error::StarlogError;
use crate::core::models::title_case;
use crate::core::project::Project;
use crate::core::store::{DocumentStore, FLIGHTS, GLOBAL_SCOPE};
use crate::core::time;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

pub const FLIGHT_FILE: &str = "starlog_flight.json";
pub const PAGE_SIZE: usize = 5;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Waypoint {
    pub filename: String,
    pub title: String,
    pub content: String,
    pub sequence_number: u32,
}

impl Waypoint {
    fn new(sequence_number: u32, filename: &str, title: &str, content: &str) -> Self {
        Self {
            filename: filename.to_string(),
            title: title.to_string(),
            content: content.to_string(),
            sequence_number,
        }
    }
}

/// An ordered walk through a session, starting at `entry_point`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FlightPlan {
    pub domain: String,
    pub version: String,
    pub entry_point: String,
    pub root_files: Vec<Waypoint>,
    #[serde(default)]
    pub directories: BTreeMap<String, JsonValue>,
}

impl FlightPlan {
    /// The standard session workflow: check, init or orient, start, work, end.
    pub fn starlog_default() -> Self {
        let root_files = vec![
            Waypoint::new(
                1,
                "01_check.md",
                "Check STARLOG Project",
                "Step 1: check whether the directory is a STARLOG project.\n\
                 Run: starlog check <path>",
            ),
            Waypoint::new(
                2,
                "02_init_or_orient.md",
                "Initialize or Orient",
                "Step 2: set up the project context.\n\n\
                 Not a project yet: starlog init <path> --name NAME --description TEXT\n\
                 Existing project: starlog orient <path>",
            ),
            Waypoint::new(
                3,
                "03_start_session.md",
                "Start STARLOG Session",
                "Step 3: open a tracked session with its goals.\n\
                 Run: starlog session start TITLE --start TEXT --goal GOAL --path <path>",
            ),
            Waypoint::new(
                4,
                "04_work_loop.md",
                "Work Loop",
                "Step 4: use these while working.\n\n\
                 - starlog diary add TEXT: log discoveries, bugs and insights\n\
                 - starlog diary next: the next actionable entry\n\
                 - starlog session history: past sessions\n\
                 - starlog rules list: project standards\n\
                 - starlog rules add TEXT: record a new standard",
            ),
            Waypoint::new(
                5,
                "05_end_session.md",
                "End STARLOG Session",
                "Step 5: close the open session with a summary.\n\
                 Run: starlog session end SUMMARY --path <path>",
            ),
        ];
        Self {
            domain: "starlog_session".to_string(),
            version: "v1".to_string(),
            entry_point: "01_check.md".to_string(),
            root_files,
            directories: BTreeMap::new(),
        }
    }

    pub fn validate(&self) -> Result<(), StarlogError> {
        if self.domain.trim().is_empty() {
            return Err(StarlogError::InvalidArgument("flight plan needs a domain".into()));
        }
        if self.root_files.is_empty() {
            return Err(StarlogError::InvalidArgument(
                "flight plan needs at least one waypoint".into(),
            ));
        }
        let mut files = BTreeSet::new();
        let mut steps = BTreeSet::new();
        for w in &self.root_files {
            if !files.insert(w.filename.as_str()) {
                return Err(StarlogError::InvalidArgument(format!(
                    "duplicate waypoint {}",
                    w.filename
                )));
            }
            if !steps.insert(w.sequence_number) {
                return Err(StarlogError::InvalidArgument(format!(
                    "duplicate sequence number {}",
                    w.sequence_number
                )));
            }
        }
        if !files.contains(self.entry_point.as_str()) {
            return Err(StarlogError::InvalidArgument(format!(
                "entry point {} is not a waypoint",
                self.entry_point
            )));
        }
        Ok(())
    }

    /// Waypoints in sequence order.
    pub fn waypoints(&self) -> Vec<&Waypoint> {
        let mut out: Vec<&Waypoint> = self.root_files.iter().collect();
        out.sort_by_key(|w| w.sequence_number);
        out
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FlightConfig {
    pub id: String,
    pub name: String,
    pub original_project_path: String,
    pub category: String,
    pub description: String,
    pub flight_config: FlightPlan,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A flight config as supplied by a caller.
#[derive(Debug, Clone)]
pub struct NewFlight {
    pub name: String,
    pub description: String,
    pub category: String,
    pub project_path: PathBuf,
    pub plan: Option<FlightPlan>,
}

impl NewFlight {
    pub fn new(name: &str, description: &str, project_path: &Path) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            category: "general".to_string(),
            project_path: project_path.to_path_buf(),
            plan: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FlyQuery {
    pub page: Option<usize>,
    pub category: Option<String>,
    pub all_projects: bool,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct FlightListing {
    pub number: usize,
    pub id: String,
    pub name: String,
    pub category: String,
    pub description: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum FlightView {
    /// No saved config matched; the standard plan was written to `flight_path`.
    Default { flight_path: PathBuf },
    Categories {
        total: usize,
        counts: BTreeMap<String, usize>,
    },
    Page {
        category: Option<String>,
        page: usize,
        total_pages: usize,
        total: usize,
        items: Vec<FlightListing>,
    },
}

impl FlightView {
    pub fn render(&self) -> String {
        match self {
            FlightView::Default { flight_path } => format!(
                "No custom flight configs found. Using default: {}",
                flight_path.display()
            ),
            FlightView::Categories { total, counts } => {
                let mut out = format!("Available Flight Categories ({} total configs):\n", total);
                for (category, n) in counts {
                    out.push_str(&format!("- {} ({} configs)\n", category, n));
                }
                out.push_str("\nUse `starlog flight browse --category NAME` to browse a category");
                out
            }
            FlightView::Page {
                category,
                page,
                total_pages,
                total,
                items,
            } => {
                let mut out = match category {
                    Some(c) => format!(
                        "{} Flight Configs ({} configs, page {}/{}):\n",
                        title_case(c),
                        total,
                        page,
                        total_pages
                    ),
                    None => format!("All Flight Configs (page {}/{}):\n", page, total_pages),
                };
                for item in items {
                    out.push_str(&format!(
                        "{}. {} - {} ({})\n",
                        item.number, item.name, item.description, item.id
                    ));
                }
                if page < total_pages {
                    out.push_str(&format!("\nUse `starlog flight browse --page {}", page + 1));
                    if let Some(c) = category {
                        out.push_str(&format!(" --category {}", c));
                    }
                    out.push_str("` for more");
                }
                out.trim_end().to_string()
            }
        }
    }
}

/// Directories are compared in canonical form; a path that cannot be
/// canonicalized is compared as given.
fn project_key(path: &Path) -> String {
    fs::canonicalize(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .display()
        .to_string()
}

fn write_default_plan(dir: &Path) -> Result<PathBuf, StarlogError> {
    let file = dir.join(FLIGHT_FILE);
    if !file.exists() {
        fs::write(
            &file,
            serde_json::to_string_pretty(&FlightPlan::starlog_default())?,
        )?;
        tracing::info!(path = %file.display(), "default flight plan written");
    }
    Ok(file)
}

pub struct FlightDeck<'s> {
    store: &'s DocumentStore,
}

impl<'s> FlightDeck<'s> {
    pub fn new(store: &'s DocumentStore) -> Self {
        Self { store }
    }

    pub fn save(&self, new: NewFlight) -> Result<FlightConfig, StarlogError> {
        let name = new.name.trim();
        let category = new.category.trim();
        if name.is_empty() {
            return Err(StarlogError::InvalidArgument("flight name is empty".into()));
        }
        if category.is_empty() {
            return Err(StarlogError::InvalidArgument("flight category is empty".into()));
        }
        let plan = new.plan.unwrap_or_else(FlightPlan::starlog_default);
        plan.validate()?;

        let now = time::now();
        let flight = FlightConfig {
            id: time::new_document_id("flight"),
            name: name.to_string(),
            original_project_path: project_key(&new.project_path),
            category: category.to_string(),
            description: new.description,
            flight_config: plan,
            created_at: now,
            updated_at: now,
        };
        self.store.create_registry(GLOBAL_SCOPE, FLIGHTS)?;
        self.store.transact(GLOBAL_SCOPE, FLIGHTS, "flight.add", |tx| {
            tx.insert(&flight.id, &serde_json::to_value(&flight)?)
        })?;
        tracing::info!(id = %flight.id, category = %flight.category, "flight config saved");
        Ok(flight)
    }

    pub fn get(&self, id: &str) -> Result<FlightConfig, StarlogError> {
        self.store.get_as(GLOBAL_SCOPE, FLIGHTS, id)
    }

    pub fn delete(&self, id: &str) -> Result<(), StarlogError> {
        self.store
            .transact(GLOBAL_SCOPE, FLIGHTS, "flight.delete", |tx| tx.delete(id))
    }

    /// Every saved config, oldest first.
    pub fn all(&self) -> Result<Vec<FlightConfig>, StarlogError> {
        if !self.store.registry_exists(GLOBAL_SCOPE, FLIGHTS)? {
            return Ok(Vec::new());
        }
        let mut flights: Vec<FlightConfig> = self.store.get_all_as(GLOBAL_SCOPE, FLIGHTS)?;
        flights.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(flights)
    }

    /// Browse configs for `dir`. Without a page or category this is the
    /// category overview; otherwise a page of [`PAGE_SIZE`] configs.
    pub fn fly(&self, dir: &Path, query: &FlyQuery) -> Result<FlightView, StarlogError> {
        if query.page == Some(0) {
            return Err(StarlogError::InvalidArgument("pages start at 1".into()));
        }
        let here = project_key(dir);
        let flights: Vec<FlightConfig> = self
            .all()?
            .into_iter()
            .filter(|f| query.all_projects || f.original_project_path == here)
            .filter(|f| query.category.as_deref().is_none_or(|c| f.category == c))
            .collect();

        if flights.is_empty() {
            let flight_path = write_default_plan(dir)?;
            return Ok(FlightView::Default { flight_path });
        }

        if query.page.is_none() && query.category.is_none() {
            let mut counts = BTreeMap::new();
            for f in &flights {
                *counts.entry(f.category.clone()).or_insert(0) += 1;
            }
            return Ok(FlightView::Categories {
                total: flights.len(),
                counts,
            });
        }

        let page = query.page.unwrap_or(1);
        let total = flights.len();
        let total_pages = total.div_ceil(PAGE_SIZE);
        if page > total_pages {
            return Err(StarlogError::InvalidArgument(format!(
                "page {} is past the last page ({})",
                page, total_pages
            )));
        }
        let items = flights
            .into_iter()
            .enumerate()
            .skip((page - 1) * PAGE_SIZE)
            .take(PAGE_SIZE)
            .map(|(i, f)| FlightListing {
                number: i + 1,
                id: f.id,
                name: f.name,
                category: f.category,
                description: f.description,
            })
            .collect();
        Ok(FlightView::Page {
            category: query.category.clone(),
            page,
            total_pages,
            total,
            items,
        })
    }
}

pub fn format_flight(flight: &FlightConfig) -> String {
    let mut out = format!(
        "{} [{}] ({})\n{}\nfrom: {}\n",
        flight.name, flight.category, flight.id, flight.description, flight.original_project_path
    );
    for w in flight.flight_config.waypoints() {
        out.push_str(&format!("{}. {} ({})\n", w.sequence_number, w.title, w.filename));
    }
    out.trim_end().to_string()
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[clap(name = "flight", about = "Browse and save flight configs.")]
pub struct FlightCli {
    /// Output format for this command group.
    #[clap(long, global = true, value_enum, default_value = "text")]
    format: OutputFormat,
    /// Project directory.
    #[clap(long, global = true, default_value = ".")]
    path: PathBuf,
    #[clap(subcommand)]
    command: FlightCommand,
}

#[derive(Subcommand, Debug)]
pub enum FlightCommand {
    /// Browse configs: categories first, then pages of five.
    Browse {
        #[clap(long)]
        page: Option<usize>,
        #[clap(long)]
        category: Option<String>,
        /// Include configs saved from other projects.
        #[clap(long)]
        all_projects: bool,
    },
    /// Save a flight config for this project.
    Add {
        #[clap(value_name = "NAME")]
        name: String,
        #[clap(long)]
        description: String,
        #[clap(long, default_value = "general")]
        category: String,
        /// JSON flight plan; defaults to the standard session workflow.
        #[clap(long)]
        plan: Option<PathBuf>,
    },
    /// Show one config with its waypoints.
    Show {
        #[clap(long)]
        id: String,
    },
    /// Delete a config.
    Delete {
        #[clap(long)]
        id: String,
    },
}

pub fn run_flight_cli(store: &DocumentStore, cli: FlightCli) -> Result<(), StarlogError> {
    let deck = FlightDeck::new(store);
    let (out, text) = match cli.command {
        FlightCommand::Browse {
            page,
            category,
            all_projects,
        } => {
            let view = deck.fly(
                &cli.path,
                &FlyQuery {
                    page,
                    category,
                    all_projects,
                },
            )?;
            (
                time::command_envelope("flight.browse", "ok", serde_json::json!({ "flights": view })),
                view.render(),
            )
        }
        FlightCommand::Add {
            name,
            description,
            category,
            plan,
        } => {
            let project = Project::open(&cli.path)?;
            let plan = match plan {
                Some(file) => Some(serde_json::from_str::<FlightPlan>(&fs::read_to_string(&file)?)?),
                None => None,
            };
            let flight = deck.save(NewFlight {
                category,
                plan,
                ..NewFlight::new(&name, &description, &project.dir)
            })?;
            let text = format!("Saved flight {}: {}", flight.id, flight.name);
            (
                time::command_envelope("flight.add", "ok", serde_json::json!({ "flight": flight })),
                text,
            )
        }
        FlightCommand::Show { id } => {
            let flight = deck.get(&id)?;
            let text = format_flight(&flight);
            (
                time::command_envelope("flight.show", "ok", serde_json::json!({ "flight": flight })),
                text,
            )
        }
        FlightCommand::Delete { id } => {
            deck.delete(&id)?;
            (
                time::command_envelope("flight.delete", "ok", serde_json::json!({ "id": id })),
                format!("Deleted flight {}", id),
            )
        }
    };
    match cli.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&out)?),
        OutputFormat::Text => println!("{}", text),
    }
    Ok(())
}
