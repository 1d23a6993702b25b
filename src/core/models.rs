//! Typed documents stored in the three project registries.
//!
//! Each model validates its own invariants; the store only sees JSON.

use crate::core::error::StarlogError;
use crate::core::time;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EnforcementLevel {
    Error,
    #[default]
    Warning,
    Suggestion,
}

impl FromStr for EnforcementLevel {
    type Err = StarlogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(EnforcementLevel::Error),
            "warning" => Ok(EnforcementLevel::Warning),
            "suggestion" => Ok(EnforcementLevel::Suggestion),
            other => Err(StarlogError::InvalidArgument(format!(
                "invalid enforcement level '{}': expected error|warning|suggestion",
                other
            ))),
        }
    }
}

impl fmt::Display for EnforcementLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EnforcementLevel::Error => "error",
            EnforcementLevel::Warning => "warning",
            EnforcementLevel::Suggestion => "suggestion",
        })
    }
}

pub const MIN_RULE_PRIORITY: u8 = 1;
pub const MAX_RULE_PRIORITY: u8 = 10;
pub const DEFAULT_RULE_PRIORITY: u8 = 5;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Rule {
    pub id: String,
    #[serde(alias = "rule")]
    pub text: String,
    #[serde(default = "default_rule_category")]
    pub category: String,
    #[serde(default = "default_rule_priority")]
    pub priority: u8,
    #[serde(default)]
    pub enforcement_level: EnforcementLevel,
    /// Path globs (`*.rs`, `src/api/**`); empty applies everywhere.
    #[serde(default)]
    pub applies_to: BTreeSet<String>,
    #[serde(default)]
    pub violation_examples: Vec<String>,
    #[serde(default)]
    pub related_rules: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_rule_category() -> String {
    "general".to_string()
}

fn default_rule_priority() -> u8 {
    DEFAULT_RULE_PRIORITY
}

impl Rule {
    pub fn new(text: &str, category: &str) -> Self {
        let now = time::now();
        Self {
            id: time::new_document_id("rule"),
            text: text.to_string(),
            category: category.to_string(),
            priority: DEFAULT_RULE_PRIORITY,
            enforcement_level: EnforcementLevel::default(),
            applies_to: BTreeSet::new(),
            violation_examples: Vec::new(),
            related_rules: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn validate(&self) -> Result<(), StarlogError> {
        if self.text.trim().is_empty() {
            return Err(StarlogError::InvalidArgument(
                "rule text cannot be empty".to_string(),
            ));
        }
        if self.category.trim().is_empty() {
            return Err(StarlogError::InvalidArgument(
                "rule category cannot be empty".to_string(),
            ));
        }
        if !(MIN_RULE_PRIORITY..=MAX_RULE_PRIORITY).contains(&self.priority) {
            return Err(StarlogError::InvalidArgument(format!(
                "rule priority {} out of range [{}, {}]",
                self.priority, MIN_RULE_PRIORITY, MAX_RULE_PRIORITY
            )));
        }
        Ok(())
    }

    /// One-line form used in assembled context: `**Category**: text`.
    pub fn render_line(&self) -> String {
        format!("**{}**: {}", title_case(&self.category), self.text)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PriorityLevel {
    Auto,
    #[default]
    Normal,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DiaryEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub content: String,
    #[serde(default)]
    pub insights: Option<String>,
    #[serde(default)]
    pub file_context: Option<String>,
    #[serde(default)]
    pub is_bug_report: bool,
    #[serde(default)]
    pub is_bug_fix: bool,
    #[serde(default)]
    pub external_issue_id: Option<String>,
    #[serde(default)]
    pub auto_tagged: bool,
    #[serde(default)]
    pub priority_level: PriorityLevel,
}

impl DiaryEntry {
    pub fn new(content: &str) -> Self {
        Self {
            id: time::new_document_id("diary"),
            timestamp: time::now(),
            content: content.to_string(),
            insights: None,
            file_context: None,
            is_bug_report: false,
            is_bug_fix: false,
            external_issue_id: None,
            auto_tagged: false,
            priority_level: PriorityLevel::Normal,
        }
    }

    pub fn validate(&self) -> Result<(), StarlogError> {
        if self.content.trim().is_empty() {
            return Err(StarlogError::InvalidArgument(
                "diary content cannot be empty".to_string(),
            ));
        }
        if self.is_bug_report && self.is_bug_fix {
            return Err(StarlogError::InvalidArgument(
                "an entry is either a bug report or a bug fix, not both".to_string(),
            ));
        }
        if self.is_bug_fix && self.external_issue_id.is_none() {
            return Err(StarlogError::InvalidArgument(
                "a bug fix requires external_issue_id".to_string(),
            ));
        }
        if self.auto_tagged && self.priority_level != PriorityLevel::Auto {
            return Err(StarlogError::InvalidArgument(
                "auto_tagged entries must have priority_level auto".to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_auto(&self) -> bool {
        self.auto_tagged || self.priority_level == PriorityLevel::Auto
    }

    /// Tag as AUTO. Returns `false` when the entry already was.
    pub fn promote(&mut self) -> bool {
        let changed = !(self.auto_tagged && self.priority_level == PriorityLevel::Auto);
        self.auto_tagged = true;
        self.priority_level = PriorityLevel::Auto;
        changed
    }

    pub fn render_line(&self) -> String {
        format!(
            "**{}**: {}",
            time::short_minute(&self.timestamp),
            self.content
        )
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Session {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub date: NaiveDate,
    pub title: String,
    pub start_content: String,
    #[serde(default)]
    pub context_snapshot: String,
    #[serde(default)]
    pub relevant_docs: Vec<String>,
    #[serde(default)]
    pub goals: Vec<String>,
    #[serde(default)]
    pub discoveries: Vec<String>,
    #[serde(default)]
    pub challenges: Vec<String>,
    #[serde(default)]
    pub files_touched: BTreeSet<String>,
    #[serde(default)]
    pub end_content: Option<String>,
    #[serde(default)]
    pub end_timestamp: Option<DateTime<Utc>>,
}

impl Session {
    pub fn is_open(&self) -> bool {
        self.end_content.is_none() && self.end_timestamp.is_none()
    }

    pub fn duration_minutes(&self) -> Option<i64> {
        self.end_timestamp
            .map(|end| (end - self.timestamp).num_minutes())
    }

    pub fn validate(&self) -> Result<(), StarlogError> {
        if self.title.trim().is_empty() {
            return Err(StarlogError::InvalidArgument(
                "session title cannot be empty".to_string(),
            ));
        }
        match (&self.end_content, &self.end_timestamp) {
            (Some(_), Some(end)) if *end < self.timestamp => Err(StarlogError::InvalidArgument(
                format!("session {} ends before it starts", self.id),
            )),
            (Some(_), None) | (None, Some(_)) => Err(StarlogError::InvalidArgument(format!(
                "session {} must set end_content and end_timestamp together",
                self.id
            ))),
            _ => Ok(()),
        }
    }

    /// Full session markdown. A session without END is marked as incomplete.
    pub fn to_markdown(&self) -> String {
        let mut md = format!("## {} - {}\n\n", self.date, self.title);
        md.push_str(&format!("**START**: {}\n\n", self.start_content));
        if !self.relevant_docs.is_empty() {
            md.push_str(&format!(
                "**Relevant docs**: {}\n\n",
                self.relevant_docs.join(", ")
            ));
        }
        if !self.context_snapshot.trim().is_empty() {
            md.push_str(&format!("**Context**: {}\n\n", self.context_snapshot));
        }

        md.push_str("**Session goals**:\n");
        for goal in &self.goals {
            md.push_str(&format!("- {}\n", goal));
        }
        md.push('\n');

        if !self.discoveries.is_empty() {
            md.push_str("**Key discoveries**:\n");
            for (i, d) in self.discoveries.iter().enumerate() {
                md.push_str(&format!("{}. {}\n", i + 1, d));
            }
            md.push('\n');
        }
        if !self.files_touched.is_empty() {
            md.push_str("**Files updated during session**:\n");
            for f in &self.files_touched {
                md.push_str(&format!("- `{}`\n", f));
            }
            md.push('\n');
        }
        if !self.challenges.is_empty() {
            md.push_str("**Challenges faced**:\n");
            for (i, c) in self.challenges.iter().enumerate() {
                md.push_str(&format!("{}. {}\n", i + 1, c));
            }
            md.push('\n');
        }

        match &self.end_content {
            Some(end) => md.push_str(&format!("**END**: {}\n\n---\n\n", end)),
            None => md.push_str(INCOMPLETE_SESSION_MARKER),
        }
        md
    }
}

/// Footer of a rendered session that never received its END marker.
pub const INCOMPLETE_SESSION_MARKER: &str =
    "**Note**: Session in progress (END marker missing)\n\n---\n\n";

/// `code_style` → `Code_Style`, `general` → `General`.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut boundary = true;
    for ch in s.chars() {
        if ch.is_alphabetic() {
            if boundary {
                out.extend(ch.to_uppercase());
            } else {
                out.extend(ch.to_lowercase());
            }
            boundary = false;
        } else {
            out.push(ch);
            boundary = true;
        }
    }
    out
}
