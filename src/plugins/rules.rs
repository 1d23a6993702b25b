//! Project rules: coding standards and conventions kept in the `rules` registry.

use crate::core::error::StarlogError;
use crate::core::models::{
    DEFAULT_RULE_PRIORITY, EnforcementLevel, Rule, title_case,
};
use crate::core::project::Project;
use crate::core::store::{DocumentStore, RULES};
use crate::core::time;
use clap::{Parser, Subcommand, ValueEnum};
use globset::{Glob, GlobMatcher};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;

/// A rule as supplied by a caller. Missing fields take the rule defaults;
/// `id` is generated unless given.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct RuleDraft {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(alias = "rule")]
    pub text: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub priority: Option<u8>,
    #[serde(default)]
    pub enforcement_level: Option<EnforcementLevel>,
    #[serde(default)]
    pub applies_to: BTreeSet<String>,
    #[serde(default)]
    pub violation_examples: Vec<String>,
    #[serde(default)]
    pub related_rules: Vec<String>,
}

impl RuleDraft {
    pub fn new(text: &str, category: &str) -> Self {
        Self {
            text: text.to_string(),
            category: Some(category.to_string()),
            ..Self::default()
        }
    }

    fn into_rule(self) -> Result<Rule, StarlogError> {
        let mut rule = Rule::new(&self.text, self.category.as_deref().unwrap_or("general"));
        if let Some(id) = self.id {
            rule.id = id;
        }
        rule.priority = self.priority.unwrap_or(DEFAULT_RULE_PRIORITY);
        rule.enforcement_level = self.enforcement_level.unwrap_or_default();
        rule.applies_to = self.applies_to;
        rule.violation_examples = self.violation_examples;
        rule.related_rules = self.related_rules;
        rule.validate()?;
        for pattern in &rule.applies_to {
            compile_glob(pattern)?;
        }
        Ok(rule)
    }
}

fn compile_glob(pattern: &str) -> Result<GlobMatcher, StarlogError> {
    Glob::new(pattern)
        .map(|g| g.compile_matcher())
        .map_err(|e| StarlogError::InvalidArgument(format!("invalid applies_to '{}': {}", pattern, e)))
}

pub struct RuleBook<'s> {
    store: &'s DocumentStore,
    project: String,
}

impl<'s> RuleBook<'s> {
    pub fn new(store: &'s DocumentStore, project: &str) -> Self {
        Self {
            store,
            project: project.to_string(),
        }
    }

    pub fn add(&self, draft: RuleDraft) -> Result<Rule, StarlogError> {
        let rule = draft.into_rule()?;
        self.store
            .transact(&self.project, RULES, "rules.add", |tx| {
                tx.insert(&rule.id, &serde_json::to_value(&rule)?)
            })?;
        tracing::info!(project = %self.project, id = %rule.id, "rule added");
        Ok(rule)
    }

    /// Rules grouped by category, highest priority first within a category.
    pub fn list(&self) -> Result<Vec<Rule>, StarlogError> {
        let mut rules: Vec<Rule> = self.store.get_all_as(&self.project, RULES)?;
        rules.sort_by(|a, b| {
            a.category
                .cmp(&b.category)
                .then(b.priority.cmp(&a.priority))
                .then(a.id.cmp(&b.id))
        });
        Ok(rules)
    }

    pub fn get(&self, id: &str) -> Result<Rule, StarlogError> {
        self.store.get_as(&self.project, RULES, id)
    }

    /// Replace the whole rule set. Every draft is validated before anything
    /// is written; rules keeping an existing id keep its `created_at`.
    pub fn replace(&self, drafts: Vec<RuleDraft>) -> Result<Vec<Rule>, StarlogError> {
        let mut rules = Vec::with_capacity(drafts.len());
        let mut seen = BTreeSet::new();
        for draft in drafts {
            let rule = draft.into_rule()?;
            if !seen.insert(rule.id.clone()) {
                return Err(StarlogError::InvalidArgument(format!(
                    "duplicate rule id {}",
                    rule.id
                )));
            }
            rules.push(rule);
        }

        let rules = self
            .store
            .transact(&self.project, RULES, "rules.replace", |tx| {
                let previous: BTreeMap<String, Rule> = tx
                    .get_all_as::<Rule>()?
                    .into_iter()
                    .map(|r| (r.id.clone(), r))
                    .collect();
                tx.clear()?;
                let now = time::now();
                let mut stored = Vec::with_capacity(rules.len());
                for mut rule in rules {
                    if let Some(old) = previous.get(&rule.id) {
                        rule.created_at = old.created_at;
                    }
                    rule.updated_at = now;
                    tx.put_as(&rule.id, &rule)?;
                    stored.push(rule);
                }
                Ok(stored)
            })?;
        tracing::info!(project = %self.project, count = rules.len(), "rules replaced");
        Ok(rules)
    }

    pub fn delete(&self, id: &str) -> Result<(), StarlogError> {
        self.store.delete(&self.project, RULES, id)?;
        tracing::info!(project = %self.project, %id, "rule deleted");
        Ok(())
    }

    /// Rules that apply to `path`, highest priority first. Rules without
    /// `applies_to` apply everywhere.
    pub fn for_path(&self, path: &str) -> Result<Vec<Rule>, StarlogError> {
        let mut matching = Vec::new();
        for rule in self.list()? {
            let applies = rule.applies_to.is_empty()
                || rule
                    .applies_to
                    .iter()
                    .map(|p| compile_glob(p))
                    .collect::<Result<Vec<_>, _>>()?
                    .iter()
                    .any(|m| m.is_match(path));
            if applies {
                matching.push(rule);
            }
        }
        matching.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));
        Ok(matching)
    }
}

pub fn format_rules(rules: &[Rule]) -> String {
    if rules.is_empty() {
        return "No project rules found.".to_string();
    }
    let mut by_category: BTreeMap<&str, Vec<&Rule>> = BTreeMap::new();
    for rule in rules {
        by_category.entry(rule.category.as_str()).or_default().push(rule);
    }
    let mut out = String::from("Project Rules\n");
    for (category, rules) in by_category {
        out.push_str(&format!("\n**{}**\n", title_case(category)));
        for rule in rules {
            out.push_str(&format!("- [{}] {} ({})\n", rule.priority, rule.text, rule.id));
        }
    }
    out.trim_end().to_string()
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[clap(name = "rules", about = "Manage project rules.")]
pub struct RulesCli {
    /// Output format for this command group.
    #[clap(long, global = true, value_enum, default_value = "text")]
    format: OutputFormat,
    /// Project directory.
    #[clap(long, global = true, default_value = ".")]
    path: PathBuf,
    #[clap(subcommand)]
    command: RulesCommand,
}

#[derive(Subcommand, Debug)]
pub enum RulesCommand {
    /// List rules, optionally only those applying to a file path.
    List {
        #[clap(long)]
        for_path: Option<String>,
    },
    /// Add a rule.
    Add {
        #[clap(value_name = "TEXT")]
        text: String,
        #[clap(long, default_value = "general")]
        category: String,
        #[clap(long, default_value_t = DEFAULT_RULE_PRIORITY)]
        priority: u8,
        #[clap(long, default_value = "warning")]
        enforcement: EnforcementLevel,
        /// Path glob the rule applies to (repeatable).
        #[clap(long = "applies-to")]
        applies_to: Vec<String>,
    },
    /// Replace every rule with the JSON array in FILE.
    Replace {
        #[clap(long)]
        file: PathBuf,
    },
    /// Delete a rule.
    Delete {
        #[clap(long)]
        id: String,
    },
}

pub fn run_rules_cli(store: &DocumentStore, cli: RulesCli) -> Result<(), StarlogError> {
    let project = Project::open(&cli.path)?;
    let book = RuleBook::new(store, &project.name);
    let (out, text) = match cli.command {
        RulesCommand::List { for_path } => {
            let rules = match for_path {
                Some(p) => book.for_path(&p)?,
                None => book.list()?,
            };
            let text = format_rules(&rules);
            (
                time::command_envelope("rules.list", "ok", serde_json::json!({ "rules": rules })),
                text,
            )
        }
        RulesCommand::Add {
            text,
            category,
            priority,
            enforcement,
            applies_to,
        } => {
            let rule = book.add(RuleDraft {
                priority: Some(priority),
                enforcement_level: Some(enforcement),
                applies_to: applies_to.into_iter().collect(),
                ..RuleDraft::new(&text, &category)
            })?;
            let text = format!("Added rule {}: {}", rule.id, rule.render_line());
            (
                time::command_envelope("rules.add", "ok", serde_json::json!({ "rule": rule })),
                text,
            )
        }
        RulesCommand::Replace { file } => {
            let drafts: Vec<RuleDraft> = serde_json::from_str(&fs::read_to_string(&file)?)?;
            let rules = book.replace(drafts)?;
            let text = format!("Replaced rules ({} total)", rules.len());
            (
                time::command_envelope("rules.replace", "ok", serde_json::json!({ "rules": rules })),
                text,
            )
        }
        RulesCommand::Delete { id } => {
            book.delete(&id)?;
            (
                time::command_envelope("rules.delete", "ok", serde_json::json!({ "id": id })),
                format!("Deleted rule {}", id),
            )
        }
    };
    match cli.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&out)?),
        OutputFormat::Text => println!("{}", text),
    }
    Ok(())
}
