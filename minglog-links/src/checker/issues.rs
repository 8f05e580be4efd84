use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::NodeKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueType {
    BrokenLink,
    OrphanedPage,
    CircularReference,
    DuplicateLink,
    InvalidSyntax,
    MissingMirror,
    /// Mirror edge whose owning reference is gone or no longer mirrored.
    StrayMirror,
}

impl IssueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BrokenLink => "broken-link",
            Self::OrphanedPage => "orphaned-page",
            Self::CircularReference => "circular-reference",
            Self::DuplicateLink => "duplicate-link",
            Self::InvalidSyntax => "invalid-syntax",
            Self::MissingMirror => "missing-mirror",
            Self::StrayMirror => "stray-mirror",
        }
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }
}

/// A repair the store can apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum RepairAction {
    Remove { link_id: String },
    Replace { link_id: String, new_target: NodeKey },
    CreateMirror { link_id: String },
    /// Keep the oldest edge of a duplicate group.
    RemoveDuplicates { keep: String, remove: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairSuggestion {
    pub action: RepairAction,
    pub description: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyIssue {
    /// Deterministic, `<type>:<subject>`.
    pub id: String,
    pub issue_type: IssueType,
    pub severity: Severity,
    pub source: Option<NodeKey>,
    pub target: Option<NodeKey>,
    pub link_id: Option<String>,
    pub message: String,
    /// Highest confidence first.
    pub suggestions: Vec<RepairSuggestion>,
    pub auto_fixable: bool,
}

impl ConsistencyIssue {
    pub fn best_suggestion(&self) -> Option<&RepairSuggestion> {
        self.suggestions.first()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportStats {
    pub total_pages: usize,
    pub total_blocks: usize,
    pub total_links: usize,
    pub broken_links: usize,
    pub orphaned_pages: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsistencyReport {
    pub timestamp: DateTime<Utc>,
    pub total_issues: usize,
    pub issues_by_type: BTreeMap<String, usize>,
    pub issues_by_severity: BTreeMap<String, usize>,
    pub auto_fixable_count: usize,
    pub stats: ReportStats,
    pub issues: Vec<ConsistencyIssue>,
}

impl ConsistencyReport {
    pub fn new(issues: Vec<ConsistencyIssue>, stats: ReportStats) -> Self {
        let mut issues_by_type = BTreeMap::new();
        let mut issues_by_severity = BTreeMap::new();
        for issue in &issues {
            *issues_by_type
                .entry(issue.issue_type.as_str().to_string())
                .or_insert(0) += 1;
            *issues_by_severity
                .entry(issue.severity.as_str().to_string())
                .or_insert(0) += 1;
        }

        Self {
            timestamp: Utc::now(),
            total_issues: issues.len(),
            auto_fixable_count: issues.iter().filter(|issue| issue.auto_fixable).count(),
            issues_by_type,
            issues_by_severity,
            stats,
            issues,
        }
    }

    pub fn count(&self, issue_type: IssueType) -> usize {
        self.issues_by_type
            .get(issue_type.as_str())
            .copied()
            .unwrap_or(0)
    }

    pub fn issues_of(&self, issue_type: IssueType) -> impl Iterator<Item = &ConsistencyIssue> {
        self.issues
            .iter()
            .filter(move |issue| issue.issue_type == issue_type)
    }

    pub fn auto_fixable_ids(&self) -> Vec<String> {
        self.issues
            .iter()
            .filter(|issue| issue.auto_fixable)
            .map(|issue| issue.id.clone())
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutoFixResult {
    pub fixed: usize,
    pub errors: Vec<String>,
}
