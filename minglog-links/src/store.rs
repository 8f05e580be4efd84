//! Link store: typed-edge persistence with mirrored reverse edges and a
//! bounded adjacency cache.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use minglog_core::LinkGraphSettings;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::AdjacencyCache;
use crate::errors::{EndpointSide, LinkError, LinkResult};
use crate::events::{EventBus, LinkEvent};
use crate::models::{
    CreateLinkRequest, ItemLinks, LinkEdge, LinkMetadata, LinkOrigin, LinkStats, LinkType,
    LinkUpdate, LinkedItemCount, NodeKey,
};
use crate::oracle::ContentOracle;

const LINK_COLUMNS: &str = "id, source_module, source_id, target_module, target_id, link_type, \
     bidirectional, strength, metadata_json, origin, mirror_of, created_at, updated_at";

const TOP_LINKED_LIMIT: i64 = 10;

/// Handle to the link store. Cloning shares the pool, cache and event bus.
#[derive(Clone)]
pub struct LinkStore {
    pool: SqlitePool,
    oracle: Arc<dyn ContentOracle>,
    cache: Arc<AdjacencyCache>,
    events: EventBus,
    bidirectional: bool,
}

impl LinkStore {
    pub fn new(
        pool: SqlitePool,
        oracle: Arc<dyn ContentOracle>,
        cache: AdjacencyCache,
        events: EventBus,
        bidirectional: bool,
    ) -> Self {
        Self {
            pool,
            oracle,
            cache: Arc::new(cache),
            events,
            bidirectional,
        }
    }

    pub fn from_settings(
        pool: SqlitePool,
        oracle: Arc<dyn ContentOracle>,
        events: EventBus,
        settings: &LinkGraphSettings,
    ) -> Self {
        Self::new(
            pool,
            oracle,
            AdjacencyCache::new(settings.cache_capacity),
            events,
            settings.bidirectional,
        )
    }

    pub fn oracle(&self) -> &Arc<dyn ContentOracle> {
        &self.oracle
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub(crate) fn cache(&self) -> &AdjacencyCache {
        &self.cache
    }

    pub fn bidirectional(&self) -> bool {
        self.bidirectional
    }

    /// Create an edge after validating both endpoints.
    ///
    /// Creating an edge that already exists returns the stored edge.
    /// Reference edges get a mirror when bidirectional mode is on; a failed
    /// mirror write is logged and left for the consistency checker.
    pub async fn create_link(&self, request: CreateLinkRequest) -> LinkResult<LinkEdge> {
        let strength = validate_strength(request.strength.unwrap_or(1.0))?;
        self.ensure_endpoint(EndpointSide::Source, &request.source)
            .await?;
        self.ensure_endpoint(EndpointSide::Target, &request.target)
            .await?;

        let now = Utc::now().timestamp();
        let candidate = LinkEdge {
            id: Uuid::new_v4().to_string(),
            source_module: request.source.module,
            source_id: request.source.id,
            target_module: request.target.module,
            target_id: request.target.id,
            link_type: request.link_type,
            bidirectional: self.bidirectional && request.link_type == LinkType::Reference,
            strength,
            metadata: request.metadata,
            origin: request.origin,
            mirror_of: None,
            created_at: now,
            updated_at: now,
        };

        let inserted = insert_if_absent(&self.pool, &candidate).await?;
        let link = if inserted {
            self.invalidate_edge(&candidate);
            info!(
                link_id = %candidate.id,
                "Created {} link {} -> {}",
                candidate.link_type,
                candidate.source(),
                candidate.target()
            );
            self.events.emit(LinkEvent::LinkCreated {
                source_module: candidate.source_module.clone(),
                target_module: candidate.target_module.clone(),
                link: candidate.clone(),
            });
            candidate
        } else {
            debug!(
                "Link {} -> {} ({}) already exists",
                candidate.source(),
                candidate.target(),
                candidate.link_type
            );
            let existing = self
                .find_by_key(&candidate.source(), &candidate.target(), candidate.link_type)
                .await?
                .ok_or_else(|| LinkError::LinkNotFound(candidate.id.clone()))?;
            if existing.origin == LinkOrigin::Mirror && candidate.origin != LinkOrigin::Mirror {
                self.adopt_mirror(existing, candidate).await?
            } else {
                existing
            }
        };

        if link.needs_mirror() {
            if let Err(err) = self.insert_mirror(&link).await {
                warn!(link_id = %link.id, "mirror link write failed: {err}");
            }
        }

        Ok(link)
    }

    /// Outgoing and incoming edges of an item, cache first.
    pub async fn get_links_for_item(&self, module: &str, id: &str) -> LinkResult<ItemLinks> {
        let key = NodeKey::new(module, id).cache_key();
        if let Some(links) = self.cache.get(&key) {
            debug!(key = %key, "adjacency cache hit");
            return Ok(links);
        }

        let generation = self.cache.generation();
        let outgoing = fetch_links(
            &self.pool,
            "WHERE source_module = ? AND source_id = ? ORDER BY created_at, id",
            &[module, id],
        )
        .await?;
        let incoming = fetch_links(
            &self.pool,
            "WHERE target_module = ? AND target_id = ? ORDER BY created_at, id",
            &[module, id],
        )
        .await?;
        let links = ItemLinks { outgoing, incoming };
        self.cache
            .insert_if_current(key, links.clone(), generation);
        Ok(links)
    }

    pub async fn get_link(&self, id: &str) -> LinkResult<Option<LinkEdge>> {
        let mut links = fetch_links(&self.pool, "WHERE id = ?", &[id]).await?;
        Ok(links.pop())
    }

    /// Every stored edge, oldest first.
    pub async fn list_links(&self) -> LinkResult<Vec<LinkEdge>> {
        fetch_links(&self.pool, "ORDER BY created_at, id", &[]).await
    }

    /// Update the mutable fields of an edge.
    ///
    /// A type change detaches the edge from its mirror pairing: the old
    /// mirror is removed, a retyped mirror becomes a manual edge, and an edge
    /// retyped to `reference` gets a fresh mirror in bidirectional mode.
    pub async fn update_link(&self, id: &str, update: LinkUpdate) -> LinkResult<LinkEdge> {
        let mut link = self
            .get_link(id)
            .await?
            .ok_or_else(|| LinkError::LinkNotFound(id.to_string()))?;

        let retyped = update
            .link_type
            .is_some_and(|link_type| link_type != link.link_type);
        if let Some(link_type) = update.link_type {
            link.link_type = link_type;
        }
        if retyped {
            if link.origin == LinkOrigin::Mirror {
                link.origin = LinkOrigin::Manual;
                link.mirror_of = None;
            }
            link.bidirectional = self.bidirectional && link.link_type == LinkType::Reference;
        }
        if let Some(strength) = update.strength {
            link.strength = validate_strength(strength)?;
        }
        if let Some(metadata) = update.metadata {
            link.metadata = metadata;
        }
        link.updated_at = Utc::now().timestamp();

        write_edge(&self.pool, &link).await?;
        self.invalidate_edge(&link);
        self.events.emit(LinkEvent::LinkUpdated { link: link.clone() });

        if retyped {
            let stale = fetch_links(&self.pool, "WHERE mirror_of = ?", &[link.id.as_str()]).await?;
            self.delete_edges(&stale).await?;
            for edge in &stale {
                debug!(link_id = %edge.id, "Removed mirror of retyped link {}", link.id);
                self.events.emit(LinkEvent::LinkDeleted { link: edge.clone() });
            }
            if link.needs_mirror() {
                if let Err(err) = self.insert_mirror(&link).await {
                    warn!(link_id = %link.id, "mirror link write failed: {err}");
                }
            }
        }
        Ok(link)
    }

    /// Delete an edge together with its mirror counterpart.
    ///
    /// Returns the removed edges, the requested one first.
    pub async fn delete_link(&self, id: &str) -> LinkResult<Vec<LinkEdge>> {
        let link = self
            .get_link(id)
            .await?
            .ok_or_else(|| LinkError::LinkNotFound(id.to_string()))?;

        let mut removed = vec![link.clone()];
        let partner_id = link.mirror_of.clone().unwrap_or_default();
        let partners = fetch_links(
            &self.pool,
            "WHERE mirror_of = ? OR id = ?",
            &[link.id.as_str(), partner_id.as_str()],
        )
        .await?;
        removed.extend(partners.into_iter().filter(|partner| {
            partner.id != link.id
                && (partner.mirror_of.as_deref() == Some(link.id.as_str())
                    || (partner.needs_mirror() && partner.source() == link.target()))
        }));

        self.delete_edges(&removed).await?;
        for edge in &removed {
            info!(link_id = %edge.id, "Deleted link {} -> {}", edge.source(), edge.target());
            self.events.emit(LinkEvent::LinkDeleted { link: edge.clone() });
        }
        Ok(removed)
    }

    /// Delete every edge touching an item, in either direction.
    pub async fn delete_links_for_item(&self, module: &str, id: &str) -> LinkResult<usize> {
        let affected = fetch_links(
            &self.pool,
            "WHERE (source_module = ? AND source_id = ?) OR (target_module = ? AND target_id = ?)",
            &[module, id, module, id],
        )
        .await?;

        let result = sqlx::query(
            "DELETE FROM link_edges
             WHERE (source_module = ? AND source_id = ?) OR (target_module = ? AND target_id = ?)",
        )
        .bind(module)
        .bind(id)
        .bind(module)
        .bind(id)
        .execute(&self.pool)
        .await?;

        let mut keys: BTreeSet<String> = BTreeSet::new();
        keys.insert(NodeKey::new(module, id).cache_key());
        for edge in &affected {
            keys.insert(edge.source().cache_key());
            keys.insert(edge.target().cache_key());
        }
        self.cache.invalidate(keys.iter().map(String::as_str));

        let count = result.rows_affected() as usize;
        info!("Deleted {count} links for {module}:{id}");
        self.events.emit(LinkEvent::LinksDeleted {
            module: module.to_string(),
            item_id: id.to_string(),
            count,
        });
        Ok(count)
    }

    /// Remove the parser-derived outgoing edges of an item and their mirrors.
    pub async fn delete_derived_links(&self, module: &str, id: &str) -> LinkResult<usize> {
        let derived = fetch_links(
            &self.pool,
            "WHERE source_module = ? AND source_id = ? AND origin = ?",
            &[module, id, LinkOrigin::Parser.as_str()],
        )
        .await?;
        if derived.is_empty() {
            return Ok(0);
        }

        let mut removed = derived.clone();
        for edge in &derived {
            let mirrors = fetch_links(&self.pool, "WHERE mirror_of = ?", &[edge.id.as_str()]).await?;
            removed.extend(mirrors);
        }

        self.delete_edges(&removed).await?;
        for edge in &removed {
            self.events.emit(LinkEvent::LinkDeleted { link: edge.clone() });
        }

        // A reverse reference owned by the other item still wants its mirror.
        for edge in &derived {
            let reverse = self
                .find_by_key(&edge.target(), &edge.source(), edge.link_type)
                .await?;
            if let Some(reverse) = reverse.filter(LinkEdge::needs_mirror) {
                if let Err(err) = self.insert_mirror(&reverse).await {
                    warn!(link_id = %reverse.id, "mirror link write failed: {err}");
                }
            }
        }
        debug!("Removed {} derived links for {module}:{id}", removed.len());
        Ok(removed.len())
    }

    /// Point an edge at a different target: create the new edge, then drop the old one.
    pub async fn retarget_link(&self, id: &str, new_target: NodeKey) -> LinkResult<LinkEdge> {
        let link = self
            .get_link(id)
            .await?
            .ok_or_else(|| LinkError::LinkNotFound(id.to_string()))?;

        let request = CreateLinkRequest::new(link.source(), new_target, link.link_type)
            .with_metadata(link.metadata.clone())
            .with_strength(link.strength)
            .with_origin(link.origin);
        let replacement = self.create_link(request).await?;
        self.delete_link(&link.id).await?;
        Ok(replacement)
    }

    /// Create the missing reverse edge of a bidirectional reference.
    pub async fn create_mirror(&self, id: &str) -> LinkResult<Option<LinkEdge>> {
        let link = self
            .get_link(id)
            .await?
            .ok_or_else(|| LinkError::LinkNotFound(id.to_string()))?;
        self.ensure_endpoint(EndpointSide::Source, &link.source())
            .await?;
        self.ensure_endpoint(EndpointSide::Target, &link.target())
            .await?;
        self.insert_mirror(&link).await
    }

    pub async fn get_link_stats(&self) -> LinkResult<LinkStats> {
        let (total_links,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM link_edges")
            .fetch_one(&self.pool)
            .await?;

        let by_module: Vec<(String, i64)> = sqlx::query_as(
            "SELECT source_module, COUNT(*) FROM link_edges GROUP BY source_module",
        )
        .fetch_all(&self.pool)
        .await?;

        let by_type: Vec<(String, i64)> =
            sqlx::query_as("SELECT link_type, COUNT(*) FROM link_edges GROUP BY link_type")
                .fetch_all(&self.pool)
                .await?;

        let top: Vec<(String, String, i64)> = sqlx::query_as(
            r#"SELECT module, id, COUNT(*) AS link_count
               FROM (
                   SELECT source_module AS module, source_id AS id FROM link_edges
                   UNION ALL
                   SELECT target_module AS module, target_id AS id FROM link_edges
               )
               GROUP BY module, id
               ORDER BY link_count DESC, module ASC, id ASC
               LIMIT ?"#,
        )
        .bind(TOP_LINKED_LIMIT)
        .fetch_all(&self.pool)
        .await?;

        Ok(LinkStats {
            total_links,
            links_by_module: by_module.into_iter().collect::<BTreeMap<_, _>>(),
            links_by_type: by_type.into_iter().collect::<BTreeMap<_, _>>(),
            top_linked_items: top
                .into_iter()
                .map(|(module, id, link_count)| LinkedItemCount {
                    module,
                    id,
                    link_count,
                })
                .collect(),
        })
    }

    /// Items reachable from `root` within `depth` hops, in either direction.
    pub async fn related_items(
        &self,
        root: &NodeKey,
        depth: u8,
        limit: usize,
    ) -> LinkResult<Vec<NodeKey>> {
        let mut visited: HashSet<NodeKey> = HashSet::new();
        visited.insert(root.clone());
        let mut queue: VecDeque<(NodeKey, u8)> = VecDeque::new();
        queue.push_back((root.clone(), 0));
        let mut results = Vec::new();

        while let Some((node, level)) = queue.pop_front() {
            if level >= depth || results.len() >= limit {
                continue;
            }
            let links = self.get_links_for_item(&node.module, &node.id).await?;
            let neighbours = links
                .outgoing
                .iter()
                .map(LinkEdge::target)
                .chain(links.incoming.iter().map(LinkEdge::source));
            for neighbour in neighbours {
                if results.len() >= limit {
                    break;
                }
                if visited.insert(neighbour.clone()) {
                    results.push(neighbour.clone());
                    queue.push_back((neighbour, level + 1));
                }
            }
        }

        Ok(results)
    }

    async fn ensure_endpoint(&self, side: EndpointSide, node: &NodeKey) -> LinkResult<()> {
        if node.module.trim().is_empty() || node.id.trim().is_empty() {
            return Err(LinkError::endpoint(side, &node.module, &node.id));
        }
        if self.oracle.exists(&node.module, &node.id).await? {
            Ok(())
        } else {
            Err(LinkError::endpoint(side, &node.module, &node.id))
        }
    }

    async fn find_by_key(
        &self,
        source: &NodeKey,
        target: &NodeKey,
        link_type: LinkType,
    ) -> LinkResult<Option<LinkEdge>> {
        let mut links = fetch_links(
            &self.pool,
            "WHERE source_module = ? AND source_id = ? AND target_module = ? AND target_id = ?
               AND link_type = ?",
            &[
                source.module.as_str(),
                source.id.as_str(),
                target.module.as_str(),
                target.id.as_str(),
                link_type.as_str(),
            ],
        )
        .await?;
        Ok(links.pop())
    }

    /// Take ownership of a mirror edge on behalf of `request`: it stops
    /// following its partner and keeps the request's origin and metadata.
    async fn adopt_mirror(&self, mirror: LinkEdge, request: LinkEdge) -> LinkResult<LinkEdge> {
        let adopted = LinkEdge {
            id: mirror.id,
            mirror_of: None,
            created_at: mirror.created_at,
            updated_at: Utc::now().timestamp(),
            ..request
        };
        write_edge(&self.pool, &adopted).await?;
        self.invalidate_edge(&adopted);
        info!(
            link_id = %adopted.id,
            "Adopted mirror link {} -> {} as {}",
            adopted.source(),
            adopted.target(),
            adopted.origin.as_str()
        );
        self.events.emit(LinkEvent::LinkUpdated {
            link: adopted.clone(),
        });
        Ok(adopted)
    }

    /// Insert-if-absent of the reverse edge. `None` when it already existed.
    async fn insert_mirror(&self, link: &LinkEdge) -> LinkResult<Option<LinkEdge>> {
        if link.source() == link.target() {
            return Ok(None);
        }
        let now = Utc::now().timestamp();
        let mirror = LinkEdge {
            id: Uuid::new_v4().to_string(),
            source_module: link.target_module.clone(),
            source_id: link.target_id.clone(),
            target_module: link.source_module.clone(),
            target_id: link.source_id.clone(),
            link_type: link.link_type,
            bidirectional: true,
            strength: link.strength,
            metadata: LinkMetadata::new(),
            origin: LinkOrigin::Mirror,
            mirror_of: Some(link.id.clone()),
            created_at: now,
            updated_at: now,
        };

        if insert_if_absent(&self.pool, &mirror).await? {
            self.invalidate_edge(&mirror);
            debug!(link_id = %mirror.id, mirror_of = %link.id, "Created mirror link");
            Ok(Some(mirror))
        } else {
            Ok(None)
        }
    }

    async fn delete_edges(&self, edges: &[LinkEdge]) -> LinkResult<()> {
        if edges.is_empty() {
            return Ok(());
        }
        let placeholders = edges.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        let sql = format!("DELETE FROM link_edges WHERE id IN ({placeholders})");
        let mut query = sqlx::query(&sql);
        for edge in edges {
            query = query.bind(&edge.id);
        }
        query.execute(&self.pool).await?;

        for edge in edges {
            self.invalidate_edge(edge);
        }
        Ok(())
    }

    fn invalidate_edge(&self, edge: &LinkEdge) {
        let source = edge.source().cache_key();
        let target = edge.target().cache_key();
        self.cache.invalidate([source.as_str(), target.as_str()]);
    }
}

fn validate_strength(strength: f64) -> LinkResult<f64> {
    if (0.0..=1.0).contains(&strength) {
        Ok(strength)
    } else {
        Err(LinkError::InvalidStrength(strength))
    }
}

/// `true` when the row was written, `false` when the edge key already existed.
async fn insert_if_absent(pool: &SqlitePool, link: &LinkEdge) -> LinkResult<bool> {
    let result = sqlx::query(
        r#"INSERT INTO link_edges (
            id, source_module, source_id, target_module, target_id, link_type,
            bidirectional, strength, metadata_json, origin, mirror_of, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(source_module, source_id, target_module, target_id, link_type) DO NOTHING"#,
    )
    .bind(&link.id)
    .bind(&link.source_module)
    .bind(&link.source_id)
    .bind(&link.target_module)
    .bind(&link.target_id)
    .bind(link.link_type.as_str())
    .bind(link.bidirectional)
    .bind(link.strength)
    .bind(serde_json::to_string(&link.metadata)?)
    .bind(link.origin.as_str())
    .bind(&link.mirror_of)
    .bind(link.created_at)
    .bind(link.updated_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Overwrite every mutable column of a stored edge.
async fn write_edge(pool: &SqlitePool, link: &LinkEdge) -> LinkResult<()> {
    sqlx::query(
        "UPDATE link_edges
         SET link_type = ?, bidirectional = ?, strength = ?, metadata_json = ?, origin = ?,
             mirror_of = ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(link.link_type.as_str())
    .bind(link.bidirectional)
    .bind(link.strength)
    .bind(serde_json::to_string(&link.metadata)?)
    .bind(link.origin.as_str())
    .bind(&link.mirror_of)
    .bind(link.updated_at)
    .bind(&link.id)
    .execute(pool)
    .await?;
    Ok(())
}

async fn fetch_links(pool: &SqlitePool, clause: &str, binds: &[&str]) -> LinkResult<Vec<LinkEdge>> {
    let sql = format!("SELECT {LINK_COLUMNS} FROM link_edges {clause}");
    let mut query = sqlx::query_as::<_, LinkRow>(&sql);
    for value in binds {
        query = query.bind(*value);
    }
    let rows = query.fetch_all(pool).await?;
    Ok(rows.into_iter().map(LinkEdge::from).collect())
}

#[derive(Debug, sqlx::FromRow)]
struct LinkRow {
    id: String,
    source_module: String,
    source_id: String,
    target_module: String,
    target_id: String,
    link_type: String,
    bidirectional: bool,
    strength: f64,
    metadata_json: String,
    origin: String,
    mirror_of: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl From<LinkRow> for LinkEdge {
    fn from(row: LinkRow) -> Self {
        let metadata = serde_json::from_str(&row.metadata_json).unwrap_or_else(|err| {
            warn!(link_id = %row.id, "unreadable link metadata: {err}");
            LinkMetadata::new()
        });
        LinkEdge {
            link_type: row.link_type.parse().unwrap_or(LinkType::Reference),
            origin: row.origin.parse().unwrap_or(LinkOrigin::Manual),
            id: row.id,
            source_module: row.source_module,
            source_id: row.source_id,
            target_module: row.target_module,
            target_id: row.target_id,
            bidirectional: row.bidirectional,
            strength: row.strength,
            metadata,
            mirror_of: row.mirror_of,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
