//! Reference resolution.
//!
//! A [`Resolver`] turns an [`Expression`] into text by reading the document
//! store or delegating to the external collaborators. It holds no cache and
//! never writes.
//!
//! Failures never abort a render. The innermost pointer that cannot be
//! resolved is replaced by a placeholder,
//! `[[starlog:unresolved kind=<error_kind> ref=<expression>]]`, and everything
//! around it still renders. [`placeholders`] finds them again.
//!
//! Each resolution chain tracks the documents it is currently inside; entering
//! one twice is a [`CyclicReference`](StarlogError::CyclicReference). The chain
//! is also capped in depth (`max_depth`, 16 by default).

use crate::core::collaborators::{CodeLoader, FileReader, run_with_timeout};
use crate::core::error::{ErrorKind, StarlogError};
use crate::core::expr::{Expression, REF_KEY};
use crate::core::models::{DiaryEntry, Rule, Session};
use crate::core::store::{self, Document, DocumentStore, WHOLE_REGISTRY};
use regex::Regex;
use rustc_hash::FxHashSet;
use serde_json::Value as JsonValue;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

pub const DEFAULT_MAX_DEPTH: usize = 16;
pub const DEFAULT_EXTERNAL_TIMEOUT_MS: u64 = 2_000;

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\[starlog:unresolved kind=([a-z_]+) ref=(.*?)\]\]").expect("static regex")
});

#[derive(Debug, Clone, Copy)]
pub struct ResolverOptions {
    pub max_depth: usize,
    pub external_timeout: Duration,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            external_timeout: Duration::from_millis(DEFAULT_EXTERNAL_TIMEOUT_MS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub kind: String,
    pub reference: String,
}

/// Render a placeholder. A `]]` inside `reference` (only possible for a raw,
/// unparseable `$ref`) is written as `]\]` so the placeholder stays one token.
pub fn placeholder(kind: ErrorKind, reference: &str) -> String {
    format!(
        "[[starlog:unresolved kind={} ref={}]]",
        kind,
        reference.replace("]]", "]\\]")
    )
}

/// Every unresolved-reference placeholder in `text`, in order of appearance.
pub fn placeholders(text: &str) -> Vec<Placeholder> {
    PLACEHOLDER_RE
        .captures_iter(text)
        .map(|c| Placeholder {
            kind: c[1].to_string(),
            reference: c[2].to_string(),
        })
        .collect()
}

type Chain = FxHashSet<(String, String)>;

pub struct Resolver<'s> {
    store: &'s DocumentStore,
    project: String,
    files: Arc<dyn FileReader>,
    code: Arc<dyn CodeLoader>,
    options: ResolverOptions,
}

impl<'s> Resolver<'s> {
    pub fn new(
        store: &'s DocumentStore,
        project: &str,
        files: Arc<dyn FileReader>,
        code: Arc<dyn CodeLoader>,
    ) -> Self {
        Self {
            store,
            project: project.to_string(),
            files,
            code,
            options: ResolverOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ResolverOptions) -> Self {
        self.options = options;
        self
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    /// Resolve to text; a failing expression becomes a placeholder.
    pub fn resolve(&self, expr: &Expression) -> String {
        match self.try_resolve(expr) {
            Ok(text) => text,
            Err(e) => {
                tracing::debug!(expr = %expr, error = %e, "unresolved reference");
                placeholder(e.kind(), &expr.to_string())
            }
        }
    }

    /// Resolve, surfacing a failure of `expr` itself as an error. Failures of
    /// nested pointers are still rendered inline.
    pub fn try_resolve(&self, expr: &Expression) -> Result<String, StarlogError> {
        let mut chain = Chain::default();
        self.resolve_in(expr, &mut chain, 1)
    }

    fn resolve_in(
        &self,
        expr: &Expression,
        chain: &mut Chain,
        depth: usize,
    ) -> Result<String, StarlogError> {
        if depth > self.options.max_depth {
            return Err(StarlogError::ResolutionDepthExceeded {
                max: self.options.max_depth,
                at: expr.to_string(),
            });
        }
        match expr {
            Expression::Literal(text) => Ok(text.clone()),
            Expression::RegistryKey { registry, key } => Ok(format!("@{}/{}", registry, key)),
            Expression::RegistryObject { registry, key } => {
                let doc = self.store.get(&self.project, registry, key)?;
                self.render_document(registry, doc, chain, depth)
            }
            Expression::RegistryAll { registry } => {
                let marker = (registry.clone(), WHOLE_REGISTRY.to_string());
                if chain.contains(&marker) {
                    return Err(StarlogError::CyclicReference(expr.to_string()));
                }
                let docs = self.store.get_all(&self.project, registry)?;
                chain.insert(marker.clone());
                let mut rendered = Vec::with_capacity(docs.len());
                let mut outcome = Ok(());
                for doc in docs.into_values() {
                    match self.render_document(registry, doc, chain, depth) {
                        Ok(text) => rendered.push(text),
                        Err(e) => {
                            outcome = Err(e);
                            break;
                        }
                    }
                }
                chain.remove(&marker);
                outcome.map(|_| rendered.join("\n"))
            }
            Expression::File { path } => {
                let files = Arc::clone(&self.files);
                let path = path.clone();
                let bytes = run_with_timeout(
                    self.options.external_timeout,
                    &format!("file:{}", path),
                    move || files.read(&path),
                )?;
                Ok(String::from_utf8_lossy(&bytes).into_owned())
            }
            Expression::ExternalVariable { module, name } => {
                let code = Arc::clone(&self.code);
                let (module, name) = (module.clone(), name.clone());
                run_with_timeout(self.options.external_timeout, &expr.to_string(), move || {
                    code.get_variable(&module, &name)
                })
            }
            Expression::ExternalCall { module, func } => {
                let code = Arc::clone(&self.code);
                let (module, func) = (module.clone(), func.clone());
                run_with_timeout(self.options.external_timeout, &expr.to_string(), move || {
                    code.call(&module, &func)
                })
            }
        }
    }

    fn render_document(
        &self,
        registry: &str,
        doc: Document,
        chain: &mut Chain,
        depth: usize,
    ) -> Result<String, StarlogError> {
        let link = (registry.to_string(), doc.id.clone());
        if chain.contains(&link) {
            return Err(StarlogError::CyclicReference(format!(
                "{}/{}",
                registry, doc.id
            )));
        }
        chain.insert(link.clone());
        let body = self.substitute_refs(doc.body, chain, depth);
        chain.remove(&link);
        Ok(render_body(registry, &doc.id, body))
    }

    /// Replace every `{"$ref": ...}` node with its resolved text.
    fn substitute_refs(&self, value: JsonValue, chain: &mut Chain, depth: usize) -> JsonValue {
        if let Some(parsed) = Expression::from_json_ref(&value) {
            let text = match parsed {
                Ok(nested) => match self.resolve_in(&nested, chain, depth + 1) {
                    Ok(text) => text,
                    Err(e) => placeholder(e.kind(), &nested.to_string()),
                },
                Err(e) => {
                    let raw = value
                        .get(REF_KEY)
                        .map(|v| v.to_string())
                        .unwrap_or_default();
                    placeholder(e.kind(), &raw)
                }
            };
            return JsonValue::String(text);
        }
        match value {
            JsonValue::Array(items) => JsonValue::Array(
                items
                    .into_iter()
                    .map(|v| self.substitute_refs(v, chain, depth))
                    .collect(),
            ),
            JsonValue::Object(map) => JsonValue::Object(
                map.into_iter()
                    .map(|(k, v)| {
                        let v = self.substitute_refs(v, chain, depth);
                        (k, v)
                    })
                    .collect(),
            ),
            other => other,
        }
    }
}

fn render_body(registry: &str, id: &str, body: JsonValue) -> String {
    let typed = match registry {
        store::RULES => serde_json::from_value::<Rule>(body.clone())
            .ok()
            .map(|r| r.render_line()),
        store::DIARY => serde_json::from_value::<DiaryEntry>(body.clone())
            .ok()
            .map(|e| e.render_line()),
        store::SESSIONS => serde_json::from_value::<Session>(body.clone())
            .ok()
            .map(|s| s.to_markdown()),
        _ => None,
    };
    if let Some(text) = typed {
        return text;
    }
    if registry == store::RULES || registry == store::DIARY || registry == store::SESSIONS {
        tracing::debug!(%registry, %id, "document does not match its category shape");
    }
    render_fields(body)
}

fn render_fields(body: JsonValue) -> String {
    match body {
        JsonValue::Object(map) => {
            let mut fields: Vec<_> = map
                .into_iter()
                .filter(|(k, _)| !matches!(k.as_str(), "id" | "created_at" | "updated_at"))
                .collect();
            fields.sort_by(|a, b| a.0.cmp(&b.0));
            fields
                .into_iter()
                .map(|(k, v)| format!("{}: {}", k, scalar_text(&v)))
                .collect::<Vec<_>>()
                .join("\n")
        }
        other => scalar_text(&other),
    }
}

fn scalar_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}
