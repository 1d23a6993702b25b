//! Block templates and their rendering.
//!
//! On disk a template is `{"name", "metadata"?, "blocks": [{"type", "content"}]}`
//! where `type` is `static` (older markers say `freestyle`) or `pointer`.
//! Pointer contents are parsed into [`Expression`]s when the template is
//! loaded, so a malformed template is rejected before anything renders.

use crate::core::assets;
use crate::core::error::StarlogError;
use crate::core::expr::Expression;
use crate::core::resolver::Resolver;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

static VARIABLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([a-z_][a-z0-9_]*)\}").expect("static regex"));

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateMetadata {
    #[serde(default)]
    pub project_name: String,
    #[serde(default)]
    pub project_description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Static(String),
    Pointer(Expression),
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct RawBlock {
    #[serde(rename = "type")]
    kind: String,
    content: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct RawTemplate {
    name: String,
    #[serde(default)]
    metadata: TemplateMetadata,
    blocks: Vec<RawBlock>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(try_from = "RawTemplate", into = "RawTemplate")]
pub struct Template {
    pub name: String,
    pub metadata: TemplateMetadata,
    pub blocks: Vec<Block>,
}

impl TryFrom<RawTemplate> for Template {
    type Error = StarlogError;

    fn try_from(raw: RawTemplate) -> Result<Self, Self::Error> {
        let blocks = raw
            .blocks
            .into_iter()
            .enumerate()
            .map(|(i, b)| match b.kind.as_str() {
                "static" | "freestyle" => Ok(Block::Static(b.content)),
                "pointer" => b.content.parse().map(Block::Pointer).map_err(|e| {
                    StarlogError::InvalidArgument(format!("block {}: {}", i, e))
                }),
                other => Err(StarlogError::InvalidArgument(format!(
                    "block {}: unknown block type '{}'",
                    i, other
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Template {
            name: raw.name,
            metadata: raw.metadata,
            blocks,
        })
    }
}

impl From<Template> for RawTemplate {
    fn from(t: Template) -> Self {
        RawTemplate {
            name: t.name,
            metadata: t.metadata,
            blocks: t
                .blocks
                .into_iter()
                .map(|b| match b {
                    Block::Static(text) => RawBlock {
                        kind: "static".to_string(),
                        content: text,
                    },
                    Block::Pointer(expr) => RawBlock {
                        kind: "pointer".to_string(),
                        content: expr.to_string(),
                    },
                })
                .collect(),
        }
    }
}

impl Template {
    pub fn from_json(text: &str) -> Result<Self, StarlogError> {
        serde_json::from_str(text).map_err(|e| {
            StarlogError::InvalidArgument(format!("invalid template: {}", e))
        })
    }

    pub fn to_json_pretty(&self) -> Result<String, StarlogError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// The embedded default template, stamped with project metadata.
    pub fn default_for(project_name: &str, project_description: &str) -> Result<Self, StarlogError> {
        let mut template = Self::from_json(assets::DEFAULT_TEMPLATE_JSON)?;
        template.metadata = TemplateMetadata {
            project_name: project_name.to_string(),
            project_description: project_description.to_string(),
        };
        Ok(template)
    }

    pub fn pointers(&self) -> impl Iterator<Item = &Expression> {
        self.blocks.iter().filter_map(|b| match b {
            Block::Pointer(e) => Some(e),
            Block::Static(_) => None,
        })
    }
}

/// Replace `{name}` with `vars[name]`; unknown names stay as written.
pub fn substitute(text: &str, vars: &BTreeMap<String, String>) -> String {
    VARIABLE_RE
        .replace_all(text, |caps: &Captures<'_>| match vars.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Render blocks in declared order, joined with newlines.
pub fn render(template: &Template, resolver: &Resolver<'_>, vars: &BTreeMap<String, String>) -> String {
    template
        .blocks
        .iter()
        .map(|block| match block {
            Block::Static(text) => substitute(text, vars),
            Block::Pointer(expr) => resolver.resolve(expr),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
