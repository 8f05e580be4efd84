use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Free-form edge annotations (display text, position in source text, provenance).
pub type LinkMetadata = BTreeMap<String, serde_json::Value>;

/// An item identified by its owning module and module-local id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeKey {
    pub module: String,
    pub id: String,
}

impl NodeKey {
    pub fn new(module: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            id: id.into(),
        }
    }

    /// Cache key form, `module:id`.
    pub fn cache_key(&self) -> String {
        format!("{}:{}", self.module, self.id)
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module, self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkType {
    Reference,
    Embed,
    Mention,
    Dependency,
}

impl LinkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reference => "reference",
            Self::Embed => "embed",
            Self::Mention => "mention",
            Self::Dependency => "dependency",
        }
    }

    pub fn all() -> [Self; 4] {
        [Self::Reference, Self::Embed, Self::Mention, Self::Dependency]
    }
}

impl FromStr for LinkType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reference" => Ok(Self::Reference),
            "embed" => Ok(Self::Embed),
            "mention" => Ok(Self::Mention),
            "dependency" => Ok(Self::Dependency),
            _ => Err(()),
        }
    }
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an edge came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkOrigin {
    /// Created through the API.
    #[default]
    Manual,
    /// Derived from reference syntax in content.
    Parser,
    /// Reverse edge of a bidirectional reference.
    Mirror,
    /// Accepted from a content-analysis proposal.
    Auto,
}

impl LinkOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Parser => "parser",
            Self::Mirror => "mirror",
            Self::Auto => "auto",
        }
    }
}

impl FromStr for LinkOrigin {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(Self::Manual),
            "parser" => Ok(Self::Parser),
            "mirror" => Ok(Self::Mirror),
            "auto" => Ok(Self::Auto),
            _ => Err(()),
        }
    }
}

/// A typed, directed edge between two items. The only persisted entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkEdge {
    pub id: String,
    pub source_module: String,
    pub source_id: String,
    pub target_module: String,
    pub target_id: String,
    pub link_type: LinkType,
    pub bidirectional: bool,
    pub strength: f64,
    pub metadata: LinkMetadata,
    pub origin: LinkOrigin,
    /// Id of the edge this one mirrors, for mirror edges.
    pub mirror_of: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl LinkEdge {
    pub fn source(&self) -> NodeKey {
        NodeKey::new(&self.source_module, &self.source_id)
    }

    pub fn target(&self) -> NodeKey {
        NodeKey::new(&self.target_module, &self.target_id)
    }

    /// Uniqueness key `(source, target, type)`.
    pub fn edge_key(&self) -> (NodeKey, NodeKey, LinkType) {
        (self.source(), self.target(), self.link_type)
    }

    /// Whether this edge requires a reverse counterpart. Mirrors never do.
    pub fn needs_mirror(&self) -> bool {
        self.bidirectional
            && self.link_type == LinkType::Reference
            && self.origin != LinkOrigin::Mirror
    }

    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|value| value.as_str())
    }
}

/// Input for [`crate::LinkStore::create_link`].
#[derive(Debug, Clone)]
pub struct CreateLinkRequest {
    pub source: NodeKey,
    pub target: NodeKey,
    pub link_type: LinkType,
    pub metadata: LinkMetadata,
    pub strength: Option<f64>,
    pub origin: LinkOrigin,
}

impl CreateLinkRequest {
    pub fn new(source: NodeKey, target: NodeKey, link_type: LinkType) -> Self {
        Self {
            source,
            target,
            link_type,
            metadata: LinkMetadata::new(),
            strength: None,
            origin: LinkOrigin::Manual,
        }
    }

    pub fn with_metadata(mut self, metadata: LinkMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_strength(mut self, strength: f64) -> Self {
        self.strength = Some(strength);
        self
    }

    pub fn with_origin(mut self, origin: LinkOrigin) -> Self {
        self.origin = origin;
        self
    }
}

/// Mutable fields of an edge. Endpoints never change; that is delete + create.
#[derive(Debug, Clone, Default)]
pub struct LinkUpdate {
    pub link_type: Option<LinkType>,
    pub strength: Option<f64>,
    pub metadata: Option<LinkMetadata>,
}

/// Adjacency of one item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemLinks {
    pub outgoing: Vec<LinkEdge>,
    pub incoming: Vec<LinkEdge>,
}

impl ItemLinks {
    pub fn is_empty(&self) -> bool {
        self.outgoing.is_empty() && self.incoming.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedItemCount {
    pub module: String,
    pub id: String,
    pub link_count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkStats {
    pub total_links: i64,
    /// Edge count keyed by source module.
    pub links_by_module: BTreeMap<String, i64>,
    pub links_by_type: BTreeMap<String, i64>,
    pub top_linked_items: Vec<LinkedItemCount>,
}
