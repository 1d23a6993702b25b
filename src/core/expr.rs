//! Pointer expressions: the typed form of a template pointer block.
//!
//! Expressions are parsed once, when a template is loaded, and never
//! re-parsed during rendering. String forms:
//!
//! ```text
//! literal:TEXT
//! registry_key:REGISTRY/KEY
//! registry_object:REGISTRY/KEY
//! registry_all:REGISTRY
//! file:PATH
//! var:MODULE#NAME
//! call:MODULE#FUNC
//! ```
//!
//! Inside stored documents a nested pointer is a JSON object
//! `{"$ref": "<expression>"}`.
//!
//! No expression may contain `]]`, the terminator of an unresolved-reference
//! placeholder.

use crate::core::error::StarlogError;
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;

pub const REF_KEY: &str = "$ref";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    Literal(String),
    RegistryKey { registry: String, key: String },
    RegistryObject { registry: String, key: String },
    RegistryAll { registry: String },
    File { path: String },
    ExternalVariable { module: String, name: String },
    ExternalCall { module: String, func: String },
}

impl Expression {
    /// `(registry, key)` when the expression addresses one stored document.
    pub fn document_address(&self) -> Option<(&str, &str)> {
        match self {
            Expression::RegistryObject { registry, key } => Some((registry, key)),
            _ => None,
        }
    }

    /// Nested pointer embedded in a document body, if `value` is one.
    pub fn from_json_ref(value: &JsonValue) -> Option<Result<Expression, StarlogError>> {
        let obj = value.as_object()?;
        if obj.len() != 1 {
            return None;
        }
        let raw = obj.get(REF_KEY)?;
        Some(match raw.as_str() {
            Some(s) => s.parse(),
            None => Err(StarlogError::InvalidArgument(format!(
                "{} must be a string, got {}",
                REF_KEY, raw
            ))),
        })
    }

    pub fn to_json_ref(&self) -> JsonValue {
        serde_json::json!({ REF_KEY: self.to_string() })
    }
}

fn invalid(input: &str, why: &str) -> StarlogError {
    StarlogError::InvalidArgument(format!("invalid expression '{}': {}", input, why))
}

fn validate_registry(input: &str, registry: &str) -> Result<String, StarlogError> {
    if registry.is_empty()
        || !registry
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return Err(invalid(input, "registry must match [a-z0-9_]+"));
    }
    Ok(registry.to_string())
}

fn split_registry_key(input: &str, rest: &str) -> Result<(String, String), StarlogError> {
    let (registry, key) = rest
        .split_once('/')
        .ok_or_else(|| invalid(input, "expected REGISTRY/KEY"))?;
    let registry = validate_registry(input, registry)?;
    if key.is_empty() || key.contains('/') {
        return Err(invalid(input, "key must be non-empty and contain no '/'"));
    }
    Ok((registry, key.to_string()))
}

fn split_module_item(input: &str, rest: &str) -> Result<(String, String), StarlogError> {
    let (module, item) = rest
        .rsplit_once('#')
        .ok_or_else(|| invalid(input, "expected MODULE#NAME"))?;
    if module.trim().is_empty() || item.trim().is_empty() {
        return Err(invalid(input, "module and name must be non-empty"));
    }
    Ok((module.to_string(), item.to_string()))
}

impl FromStr for Expression {
    type Err = StarlogError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        if input.contains("]]") {
            return Err(invalid(input, "']]' is not allowed"));
        }
        let (kind, rest) = input
            .split_once(':')
            .ok_or_else(|| invalid(input, "missing '<kind>:' prefix"))?;
        match kind.trim() {
            "literal" => Ok(Expression::Literal(rest.to_string())),
            "registry_key" => {
                let (registry, key) = split_registry_key(input, rest.trim())?;
                Ok(Expression::RegistryKey { registry, key })
            }
            "registry_object" => {
                let (registry, key) = split_registry_key(input, rest.trim())?;
                Ok(Expression::RegistryObject { registry, key })
            }
            "registry_all" => Ok(Expression::RegistryAll {
                registry: validate_registry(input, rest.trim())?,
            }),
            "file" => {
                let path = rest.trim();
                if path.is_empty() {
                    return Err(invalid(input, "file path cannot be empty"));
                }
                Ok(Expression::File {
                    path: path.to_string(),
                })
            }
            "var" => {
                let (module, name) = split_module_item(input, rest.trim())?;
                Ok(Expression::ExternalVariable { module, name })
            }
            "call" => {
                let (module, func) = split_module_item(input, rest.trim())?;
                Ok(Expression::ExternalCall { module, func })
            }
            other => Err(invalid(input, &format!("unknown kind '{}'", other))),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Literal(text) => write!(f, "literal:{}", text),
            Expression::RegistryKey { registry, key } => {
                write!(f, "registry_key:{}/{}", registry, key)
            }
            Expression::RegistryObject { registry, key } => {
                write!(f, "registry_object:{}/{}", registry, key)
            }
            Expression::RegistryAll { registry } => write!(f, "registry_all:{}", registry),
            Expression::File { path } => write!(f, "file:{}", path),
            Expression::ExternalVariable { module, name } => write!(f, "var:{}#{}", module, name),
            Expression::ExternalCall { module, func } => write!(f, "call:{}#{}", module, func),
        }
    }
}
