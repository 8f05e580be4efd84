//! Reference parser: extracts embedded reference syntax from content and
//! resolves it against the content oracle.
//!
//! Supported syntaxes, in table order:
//!
//! ```text
//! [[note:123]]  [[task:9|display]]   typed-link
//! {{file:42}}                        typed-embed
//! ((block-id))                       block-ref
//! @task:9                            mention
//! [[Page Title]]  [[Title|display]]  page-link (title lookup in notes)
//! ```
//!
//! Offsets are byte offsets into the parsed text.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::errors::LinkResult;
use crate::models::{CreateLinkRequest, LinkMetadata, LinkOrigin, LinkType, NodeKey};
use crate::oracle::ContentItem;
use crate::registry::{BLOCKS, ModuleRegistry, NOTES};
use crate::store::LinkStore;

/// Why a reference did not resolve to a single existing item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ResolutionFailure {
    NotFound,
    /// A title matched more than one item.
    Ambiguous { candidates: Vec<String> },
    UnknownPrefix,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedReference {
    /// Name of the pattern that matched.
    pub pattern: String,
    /// Reference type as written, e.g. `note` or `task`.
    pub ref_type: String,
    pub target_module: Option<String>,
    /// Resolved id; empty when resolution failed.
    pub id: String,
    pub display_text: Option<String>,
    pub start_index: usize,
    pub end_index: usize,
    pub raw_text: String,
    pub is_valid: bool,
    pub target_data: Option<ContentItem>,
    pub resolution: Option<ResolutionFailure>,
}

impl ParsedReference {
    pub fn target(&self) -> Option<NodeKey> {
        match (&self.target_module, self.id.is_empty()) {
            (Some(module), false) => Some(NodeKey::new(module, &self.id)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Extractor {
    /// `prefix`, `id`, optional `display` captures.
    Typed,
    /// `id` capture, fixed module.
    BlockRef,
    /// `title`, optional `display` captures.
    PageLink,
}

#[derive(Debug)]
struct ReferencePattern {
    name: &'static str,
    regex: Regex,
    extractor: Extractor,
}

/// Reference before resolution.
#[derive(Debug)]
struct RawReference {
    pattern: &'static str,
    ref_type: String,
    target: Target,
    display_text: Option<String>,
    start_index: usize,
    end_index: usize,
    raw_text: String,
}

#[derive(Debug)]
enum Target {
    Id { module: Option<String>, id: String },
    Title(String),
}

type MemoKey = (String, String, String);

pub struct ReferenceParser {
    store: LinkStore,
    registry: ModuleRegistry,
    patterns: Vec<ReferencePattern>,
    memo: Mutex<HashMap<MemoKey, Vec<ParsedReference>>>,
}

impl ReferenceParser {
    pub fn new(store: LinkStore, registry: ModuleRegistry) -> Self {
        let patterns = build_patterns(&registry);
        Self {
            store,
            registry,
            patterns,
            memo: Mutex::new(HashMap::new()),
        }
    }

    pub fn pattern_names(&self) -> Vec<&'static str> {
        self.patterns.iter().map(|pattern| pattern.name).collect()
    }

    /// Parse `text`, sorted by start offset. Overlapping matches from
    /// different patterns are all kept.
    ///
    /// With a `source`, every valid reference is also created as a parser
    /// `reference` edge; existing edges and creation failures are ignored.
    pub async fn parse_references(
        &self,
        text: &str,
        source: Option<&NodeKey>,
    ) -> LinkResult<Vec<ParsedReference>> {
        let key = memo_key(source, text);
        let references = match self.memo_get(&key) {
            Some(references) => {
                debug!("reference memo hit ({} references)", references.len());
                references
            }
            None => {
                let references = self.resolve_all(self.extract(text)).await?;
                self.lock_memo().insert(key, references.clone());
                references
            }
        };

        if let Some(source) = source {
            self.materialize(source, &references).await;
        }
        Ok(references)
    }

    pub fn clear_cache(&self) {
        self.lock_memo().clear();
    }

    /// Forget memoized results that a change to `changed` could alter: any
    /// with an unresolved reference, and any resolving to `changed`.
    pub fn invalidate_for(&self, changed: &NodeKey) {
        self.lock_memo().retain(|_, references| {
            references.iter().all(|reference| {
                reference.is_valid && reference.target().as_ref() != Some(changed)
            })
        });
    }

    pub fn cached_entries(&self) -> usize {
        self.lock_memo().len()
    }

    fn lock_memo(&self) -> MutexGuard<'_, HashMap<MemoKey, Vec<ParsedReference>>> {
        self.memo.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn memo_get(&self, key: &MemoKey) -> Option<Vec<ParsedReference>> {
        self.lock_memo().get(key).cloned()
    }

    fn extract(&self, text: &str) -> Vec<RawReference> {
        let mut found = Vec::new();
        for pattern in &self.patterns {
            for caps in pattern.regex.captures_iter(text) {
                if let Some(raw) = self.extract_one(pattern, &caps) {
                    found.push(raw);
                }
            }
        }
        // Stable: equal offsets keep table order.
        found.sort_by_key(|raw| raw.start_index);
        found
    }

    fn extract_one(&self, pattern: &ReferencePattern, caps: &Captures<'_>) -> Option<RawReference> {
        let whole = caps.get(0)?;
        let display_text = caps
            .name("display")
            .map(|m| m.as_str().trim().to_string())
            .filter(|display| !display.is_empty());

        let (ref_type, target) = match pattern.extractor {
            Extractor::Typed => {
                let prefix = caps.name("prefix")?.as_str().to_ascii_lowercase();
                let module = self
                    .registry
                    .module_for_prefix(&prefix)
                    .map(|descriptor| descriptor.name.to_string());
                let id = caps.name("id")?.as_str().trim().to_string();
                (prefix, Target::Id { module, id })
            }
            Extractor::BlockRef => (
                "block".to_string(),
                Target::Id {
                    module: Some(BLOCKS.to_string()),
                    id: caps.name("id")?.as_str().to_string(),
                },
            ),
            Extractor::PageLink => (
                "page".to_string(),
                Target::Title(caps.name("title")?.as_str().trim().to_string()),
            ),
        };

        Some(RawReference {
            pattern: pattern.name,
            ref_type,
            target,
            display_text,
            start_index: whole.start(),
            end_index: whole.end(),
            raw_text: whole.as_str().to_string(),
        })
    }

    async fn resolve_all(&self, raws: Vec<RawReference>) -> LinkResult<Vec<ParsedReference>> {
        let mut references = Vec::with_capacity(raws.len());
        for raw in raws {
            references.push(self.resolve(raw).await?);
        }
        Ok(references)
    }

    async fn resolve(&self, raw: RawReference) -> LinkResult<ParsedReference> {
        let oracle = self.store.oracle();
        let mut display_text = raw.display_text;

        let (target_module, id, target_data, resolution) = match raw.target {
            Target::Id { module: None, id } => {
                (None, id, None, Some(ResolutionFailure::UnknownPrefix))
            }
            Target::Id {
                module: Some(module),
                id,
            } => {
                if id.is_empty() {
                    (Some(module), id, None, Some(ResolutionFailure::NotFound))
                } else {
                    match oracle.get(&module, &id).await? {
                        Some(item) => (Some(module), id, Some(item), None),
                        None => (Some(module), id, None, Some(ResolutionFailure::NotFound)),
                    }
                }
            }
            Target::Title(title) => {
                if display_text.is_none() {
                    display_text = Some(title.clone());
                }
                let mut matches = if title.is_empty() {
                    Vec::new()
                } else {
                    oracle.find_by_title(NOTES, &title).await?
                };
                let module = Some(NOTES.to_string());
                match matches.len() {
                    0 => (module, String::new(), None, Some(ResolutionFailure::NotFound)),
                    1 => {
                        let item = matches.remove(0);
                        (module, item.id.clone(), Some(item), None)
                    }
                    _ => {
                        let candidates = matches.into_iter().map(|item| item.id).collect();
                        debug!(title = %title, "ambiguous page title");
                        (
                            module,
                            String::new(),
                            None,
                            Some(ResolutionFailure::Ambiguous { candidates }),
                        )
                    }
                }
            }
        };

        Ok(ParsedReference {
            pattern: raw.pattern.to_string(),
            ref_type: raw.ref_type,
            target_module,
            is_valid: target_data.is_some(),
            id,
            display_text,
            start_index: raw.start_index,
            end_index: raw.end_index,
            raw_text: raw.raw_text,
            target_data,
            resolution,
        })
    }

    async fn materialize(&self, source: &NodeKey, references: &[ParsedReference]) {
        for reference in references.iter().filter(|reference| reference.is_valid) {
            let Some(target) = reference.target() else {
                continue;
            };
            if &target == source {
                continue;
            }

            let request = CreateLinkRequest::new(source.clone(), target, LinkType::Reference)
                .with_origin(LinkOrigin::Parser)
                .with_metadata(reference_metadata(reference));
            if let Err(err) = self.store.create_link(request).await {
                warn!(
                    source = %source,
                    raw = %reference.raw_text,
                    "could not materialize reference: {err}"
                );
            }
        }
    }
}

fn reference_metadata(reference: &ParsedReference) -> LinkMetadata {
    let mut metadata = LinkMetadata::new();
    if let Some(display) = &reference.display_text {
        metadata.insert("display_text".to_string(), display.clone().into());
    }
    metadata.insert("raw_text".to_string(), reference.raw_text.clone().into());
    metadata.insert("start_index".to_string(), reference.start_index.into());
    metadata.insert("end_index".to_string(), reference.end_index.into());
    metadata.insert("syntax".to_string(), reference.pattern.clone().into());
    metadata
}

fn memo_key(source: Option<&NodeKey>, text: &str) -> MemoKey {
    let (module, id) = source
        .map(|node| (node.module.clone(), node.id.clone()))
        .unwrap_or_default();
    (module, id, compute_hash(text))
}

fn compute_hash(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

fn build_patterns(registry: &ModuleRegistry) -> Vec<ReferencePattern> {
    let prefixes = registry
        .all_prefixes()
        .into_iter()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join("|");

    vec![
        ReferencePattern {
            name: "typed-link",
            regex: Regex::new(
                r"\[\[(?P<prefix>[A-Za-z][A-Za-z0-9_-]*):(?P<id>[^\]|]*)(?:\|(?P<display>[^\]]*))?\]\]",
            )
            .expect("regex"),
            extractor: Extractor::Typed,
        },
        ReferencePattern {
            name: "typed-embed",
            regex: Regex::new(
                r"\{\{(?P<prefix>[A-Za-z][A-Za-z0-9_-]*):(?P<id>[^}|]*)(?:\|(?P<display>[^}]*))?\}\}",
            )
            .expect("regex"),
            extractor: Extractor::Typed,
        },
        ReferencePattern {
            name: "block-ref",
            regex: Regex::new(r"\(\((?P<id>[A-Za-z0-9_-]+)\)\)").expect("regex"),
            extractor: Extractor::BlockRef,
        },
        ReferencePattern {
            name: "mention",
            regex: Regex::new(&format!(r"(?i)\B@(?P<prefix>{prefixes}):(?P<id>[A-Za-z0-9_-]+)"))
                .expect("regex"),
            extractor: Extractor::Typed,
        },
        ReferencePattern {
            name: "page-link",
            regex: Regex::new(r"\[\[(?P<title>[^\]|:]+)(?:\|(?P<display>[^\]]*))?\]\]")
                .expect("regex"),
            extractor: Extractor::PageLink,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{create_test_database, insert_item, test_store};

    #[tokio::test]
    async fn test_valid_and_missing_targets() {
        let db = create_test_database().await.unwrap();
        insert_item(db.pool(), "notes", "123", "Meeting notes").await;
        let parser = ReferenceParser::new(test_store(&db, true), ModuleRegistry::default());

        let refs = parser
            .parse_references("See [[note:123]] and {{task:456}}", None)
            .await
            .unwrap();

        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].pattern, "typed-link");
        assert!(refs[0].is_valid);
        assert_eq!(refs[0].target_data.as_ref().unwrap().title, "Meeting notes");
        assert_eq!(refs[0].start_index, 4);
        assert_eq!(refs[0].raw_text, "[[note:123]]");
        assert_eq!(refs[1].pattern, "typed-embed");
        assert_eq!(refs[1].target_module.as_deref(), Some("tasks"));
        assert!(!refs[1].is_valid);
        assert_eq!(refs[1].resolution, Some(ResolutionFailure::NotFound));
    }

    #[tokio::test]
    async fn test_page_title_resolution() {
        let db = create_test_database().await.unwrap();
        insert_item(db.pool(), "notes", "p1", "Intro").await;
        insert_item(db.pool(), "notes", "p2", "Twin").await;
        insert_item(db.pool(), "notes", "p3", "twin").await;
        let parser = ReferenceParser::new(test_store(&db, true), ModuleRegistry::default());

        let refs = parser
            .parse_references("[[intro|start here]] [[Twin]] [[Nowhere]]", None)
            .await
            .unwrap();

        assert_eq!(refs.len(), 3);
        assert!(refs[0].is_valid);
        assert_eq!(refs[0].id, "p1");
        assert_eq!(refs[0].display_text.as_deref(), Some("start here"));

        assert!(!refs[1].is_valid);
        assert!(refs[1].id.is_empty());
        assert_eq!(
            refs[1].resolution,
            Some(ResolutionFailure::Ambiguous {
                candidates: vec!["p2".to_string(), "p3".to_string()]
            })
        );

        assert!(!refs[2].is_valid);
        assert_eq!(refs[2].resolution, Some(ResolutionFailure::NotFound));
    }

    #[tokio::test]
    async fn test_block_refs_mentions_and_unknown_prefix() {
        let db = create_test_database().await.unwrap();
        insert_item(db.pool(), "blocks", "b-1", "A block").await;
        insert_item(db.pool(), "mindmap", "m1", "Root").await;
        let parser = ReferenceParser::new(test_store(&db, true), ModuleRegistry::default());

        let refs = parser
            .parse_references("((b-1)) ping @mindmap:m1, mail me@task:1 [[calendar:7]]", None)
            .await
            .unwrap();

        assert_eq!(refs.len(), 3);
        assert_eq!(refs[0].pattern, "block-ref");
        assert!(refs[0].is_valid);
        assert_eq!(refs[1].pattern, "mention");
        assert_eq!(refs[1].target_module.as_deref(), Some("mindmap"));
        assert!(refs[1].is_valid);
        assert_eq!(refs[2].resolution, Some(ResolutionFailure::UnknownPrefix));
        assert!(refs[2].target_module.is_none());
    }

    #[tokio::test]
    async fn test_empty_id_is_invalid() {
        let db = create_test_database().await.unwrap();
        let parser = ReferenceParser::new(test_store(&db, true), ModuleRegistry::default());

        let refs = parser.parse_references("[[task:]]", None).await.unwrap();
        assert_eq!(refs.len(), 1);
        assert!(refs[0].id.is_empty());
        assert!(!refs[0].is_valid);
    }

    #[tokio::test]
    async fn test_materializes_valid_references_once() {
        let db = create_test_database().await.unwrap();
        insert_item(db.pool(), "notes", "src", "Source").await;
        insert_item(db.pool(), "tasks", "t1", "Task").await;
        let store = test_store(&db, false);
        let parser = ReferenceParser::new(store.clone(), ModuleRegistry::default());
        let source = NodeKey::new("notes", "src");

        let text = "[[task:t1|the task]] [[note:src]] {{task:nope}}";
        parser.parse_references(text, Some(&source)).await.unwrap();
        parser.parse_references(text, Some(&source)).await.unwrap();

        let links = store.list_links().await.unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].origin, LinkOrigin::Parser);
        assert_eq!(links[0].link_type, LinkType::Reference);
        assert_eq!(links[0].metadata_str("display_text"), Some("the task"));
        assert_eq!(links[0].metadata_str("syntax"), Some("typed-link"));
        assert_eq!(parser.cached_entries(), 1);
    }

    #[tokio::test]
    async fn test_memo_hit_still_materializes() {
        let db = create_test_database().await.unwrap();
        insert_item(db.pool(), "notes", "src", "Source").await;
        insert_item(db.pool(), "tasks", "t1", "Task").await;
        let store = test_store(&db, false);
        let parser = ReferenceParser::new(store.clone(), ModuleRegistry::default());
        let source = NodeKey::new("notes", "src");

        parser
            .parse_references("[[task:t1]]", Some(&source))
            .await
            .unwrap();
        store.delete_derived_links("notes", "src").await.unwrap();
        assert!(store.list_links().await.unwrap().is_empty());

        parser
            .parse_references("[[task:t1]]", Some(&source))
            .await
            .unwrap();
        assert_eq!(store.list_links().await.unwrap().len(), 1);

        parser.clear_cache();
        assert_eq!(parser.cached_entries(), 0);
    }

    #[tokio::test]
    async fn test_unresolved_memo_entries_drop_on_change() {
        let db = create_test_database().await.unwrap();
        insert_item(db.pool(), "notes", "p1", "Intro").await;
        let parser = ReferenceParser::new(test_store(&db, false), ModuleRegistry::default());

        let refs = parser.parse_references("[[Roadmap]]", None).await.unwrap();
        assert!(!refs[0].is_valid);
        parser.parse_references("[[Intro]]", None).await.unwrap();
        assert_eq!(parser.cached_entries(), 2);

        insert_item(db.pool(), "notes", "p2", "Roadmap").await;
        parser.invalidate_for(&NodeKey::new("notes", "p2"));
        assert_eq!(parser.cached_entries(), 1);

        let refs = parser.parse_references("[[Roadmap]]", None).await.unwrap();
        assert!(refs[0].is_valid);
        assert_eq!(refs[0].id, "p2");

        parser.invalidate_for(&NodeKey::new("notes", "p1"));
        assert_eq!(parser.cached_entries(), 1);
    }
}
