//! Project directories and their `starlog.hpi` marker.
//!
//! A directory is a project when it holds the marker and its three registries
//! exist in the store. The marker is the project's template; its
//! `metadata.project_name` names the registries.

use crate::core::error::StarlogError;
use crate::core::store::{self, DocumentStore, PROJECT_CATEGORIES, RegistryName};
use crate::core::template::Template;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const MARKER_FILE: &str = "starlog.hpi";

pub fn marker_path(dir: &Path) -> PathBuf {
    dir.join(MARKER_FILE)
}

/// A loaded project: its directory, registry name and template.
#[derive(Debug, Clone)]
pub struct Project {
    pub dir: PathBuf,
    pub name: String,
    pub template: Template,
}

impl Project {
    pub fn open(dir: &Path) -> Result<Self, StarlogError> {
        let template = load_marker(dir)?;
        let name = project_name_for(dir, &template)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            name,
            template,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectInit {
    pub project: String,
    pub marker: PathBuf,
    pub registries: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectStatus {
    pub is_starlog_project: bool,
    pub project_name: Option<String>,
    pub hpi_file_exists: bool,
    /// Document count per category; absent registries are omitted.
    pub registries: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistryPath {
    pub name: String,
    pub category: String,
    pub database: PathBuf,
    pub exists: bool,
    pub documents: usize,
}

pub fn load_marker(dir: &Path) -> Result<Template, StarlogError> {
    let path = marker_path(dir);
    let text = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(StarlogError::NotAProject(dir.display().to_string()));
        }
        Err(e) => return Err(e.into()),
    };
    Template::from_json(&text)
}

fn project_name_for(dir: &Path, template: &Template) -> Result<String, StarlogError> {
    let name = if template.metadata.project_name.trim().is_empty() {
        dir_name(dir)?
    } else {
        template.metadata.project_name.clone()
    };
    store::validate_project_name(&name)?;
    Ok(name)
}

fn dir_name(dir: &Path) -> Result<String, StarlogError> {
    dir.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            StarlogError::InvalidArgument(format!(
                "cannot derive a project name from {}",
                dir.display()
            ))
        })
}

fn write_marker(dir: &Path, template: &Template) -> Result<PathBuf, StarlogError> {
    let path = marker_path(dir);
    let tmp = dir.join(format!(".{}.tmp", MARKER_FILE));
    fs::write(&tmp, template.to_json_pretty()?)?;
    fs::rename(&tmp, &path)?;
    Ok(path)
}

pub fn init_project(
    store: &DocumentStore,
    dir: &Path,
    name: &str,
    description: &str,
) -> Result<ProjectInit, StarlogError> {
    store::validate_project_name(name)?;
    if name == store::GLOBAL_SCOPE {
        return Err(StarlogError::InvalidArgument(format!(
            "project name '{}' is reserved",
            name
        )));
    }
    if marker_path(dir).exists() {
        return Err(StarlogError::AlreadyExists(format!(
            "{} already holds {}",
            dir.display(),
            MARKER_FILE
        )));
    }
    fs::create_dir_all(dir)?;

    let mut registries = Vec::with_capacity(PROJECT_CATEGORIES.len());
    for category in PROJECT_CATEGORIES {
        if store.create_registry(name, category)? {
            tracing::debug!(project = name, category, "registry created");
        }
        registries.push(RegistryName::new(name, category)?.to_string());
    }

    let template = Template::default_for(name, description)?;
    let marker = write_marker(dir, &template)?;
    tracing::info!(project = name, dir = %dir.display(), "project initialized");
    Ok(ProjectInit {
        project: name.to_string(),
        marker,
        registries,
    })
}

pub fn check(store: &DocumentStore, dir: &Path) -> Result<ProjectStatus, StarlogError> {
    let hpi_file_exists = marker_path(dir).exists();
    let project_name = if hpi_file_exists {
        let template = load_marker(dir)?;
        Some(project_name_for(dir, &template)?)
    } else {
        None
    };

    let mut registries = BTreeMap::new();
    if let Some(name) = &project_name {
        for category in PROJECT_CATEGORIES {
            if store.registry_exists(name, category)? {
                registries.insert(category.to_string(), store.get_all(name, category)?.len());
            }
        }
    }
    Ok(ProjectStatus {
        is_starlog_project: hpi_file_exists && registries.len() == PROJECT_CATEGORIES.len(),
        project_name,
        hpi_file_exists,
        registries,
    })
}

pub fn registry_paths(store: &DocumentStore, dir: &Path) -> Result<Vec<RegistryPath>, StarlogError> {
    let project = Project::open(dir)?;
    let known: BTreeMap<String, usize> = store
        .list_registries(&project.name)?
        .into_iter()
        .map(|r| (r.category, r.documents))
        .collect();

    let mut out: Vec<RegistryPath> = PROJECT_CATEGORIES
        .iter()
        .map(|category| -> Result<RegistryPath, StarlogError> {
            Ok(RegistryPath {
                name: RegistryName::new(&project.name, category)?.to_string(),
                category: category.to_string(),
                database: store.db_path().to_path_buf(),
                exists: known.contains_key(*category),
                documents: known.get(*category).copied().unwrap_or(0),
            })
        })
        .collect::<Result<_, _>>()?;

    for (category, documents) in &known {
        if !PROJECT_CATEGORIES.contains(&category.as_str()) {
            out.push(RegistryPath {
                name: RegistryName::new(&project.name, category)?.to_string(),
                category: category.clone(),
                database: store.db_path().to_path_buf(),
                exists: true,
                documents: *documents,
            });
        }
    }
    Ok(out)
}

/// Swap the project's template, keeping its metadata.
pub fn replace_template(dir: &Path, mut template: Template) -> Result<Template, StarlogError> {
    let current = load_marker(dir)?;
    template.metadata = current.metadata;
    write_marker(dir, &template)?;
    tracing::info!(dir = %dir.display(), template = %template.name, "template replaced");
    Ok(template)
}
