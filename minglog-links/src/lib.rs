//! minglog-links: cross-module bidirectional link graph for MingLog.
//!
//! This crate provides:
//! - Typed edge storage with mirrored reverse edges and an adjacency cache
//! - Reference parsing of `[[note:id]]`, `{{file:id}}`, `((block))`, `@task:id`
//!   and `[[Page Title]]` syntax
//! - Whole-graph consistency checks with ranked repairs and auto-fix
//! - Event-driven synchronization with periodic drift repair

pub mod cache;
pub mod checker;
pub mod errors;
pub mod events;
pub mod models;
pub mod oracle;
pub mod parser;
pub mod registry;
pub mod storage;
pub mod store;
pub mod sync;

pub use minglog_core::{CheckerSettings, LinkGraphSettings, SyncSettings};

pub use cache::AdjacencyCache;
pub use checker::{
    AutoFixResult, ConsistencyChecker, ConsistencyIssue, ConsistencyReport, GraphSnapshot,
    IssueType, RepairAction, RepairSuggestion, ReportStats, Severity,
};
pub use errors::{EndpointSide, LinkError, LinkResult};
pub use events::{ContentEvent, EventBus, LinkEvent, LinkProposal, content_channel};
pub use models::{
    CreateLinkRequest, ItemLinks, LinkEdge, LinkMetadata, LinkOrigin, LinkStats, LinkType,
    LinkUpdate, LinkedItemCount, NodeKey,
};
pub use oracle::{ContentItem, ContentOracle, SqliteContentOracle};
pub use parser::{ParsedReference, ReferenceParser, ResolutionFailure};
pub use registry::{ModuleDescriptor, ModuleRegistry};
pub use storage::LinkDatabase;
pub use store::LinkStore;
pub use sync::{ReconcileSummary, SyncHandle, SyncOrchestrator};

// Re-export test helpers when running tests or when test-helpers feature is enabled
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;
