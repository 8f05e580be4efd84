use std::fmt;

use serde::{Deserialize, Serialize};

/// Which end of an edge failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointSide {
    Source,
    Target,
}

impl fmt::Display for EndpointSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => f.write_str("source"),
            Self::Target => f.write_str("target"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("{side} endpoint not found: {module}:{id}")]
    EndpointNotFound {
        side: EndpointSide,
        module: String,
        id: String,
    },
    #[error("link store write failed: {0}")]
    StoreWrite(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unknown issue id: {0}")]
    UnknownIssueId(String),
    #[error("unknown module: {0}")]
    UnknownModule(String),
    #[error("link not found: {0}")]
    LinkNotFound(String),
    #[error("link strength must be within [0, 1], got {0}")]
    InvalidStrength(f64),
    #[error("invalid link metadata: {0}")]
    Metadata(#[from] serde_json::Error),
}

impl LinkError {
    pub(crate) fn endpoint(side: EndpointSide, module: &str, id: &str) -> Self {
        Self::EndpointNotFound {
            side,
            module: module.to_string(),
            id: id.to_string(),
        }
    }
}

pub type LinkResult<T> = Result<T, LinkError>;
