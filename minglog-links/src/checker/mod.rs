//! Consistency checker: whole-graph scan, issue classification, ranked
//! repair suggestions and best-effort auto-fix.
//!
//! A run collects a [`GraphSnapshot`] (every edge plus every module's item
//! list), then [`analyze`] classifies issues without further I/O. The latest
//! run's issues are kept so [`ConsistencyChecker::auto_fix`] can look them up
//! by id.

mod cycles;
mod issues;
mod similarity;

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use minglog_core::CheckerSettings;
use tracing::{debug, info, warn};

pub use cycles::{Cycle, find_cycles};
pub use issues::{
    AutoFixResult, ConsistencyIssue, ConsistencyReport, IssueType, RepairAction,
    RepairSuggestion, ReportStats, Severity,
};
pub use similarity::title_similarity;

use crate::errors::{LinkError, LinkResult};
use crate::models::{LinkEdge, LinkOrigin, LinkType, NodeKey};
use crate::oracle::ContentItem;
use crate::registry::{BLOCKS, ModuleRegistry, NOTES};
use crate::store::LinkStore;

/// Everything a run looks at, collected up front.
#[derive(Debug, Clone, Default)]
pub struct GraphSnapshot {
    pub links: Vec<LinkEdge>,
    /// Items per module name.
    pub items: BTreeMap<String, Vec<ContentItem>>,
}

impl GraphSnapshot {
    pub fn contains(&self, node: &NodeKey) -> bool {
        self.items
            .get(&node.module)
            .is_some_and(|items| items.iter().any(|item| item.id == node.id))
    }

    fn item_count(&self, module: &str) -> usize {
        self.items.get(module).map_or(0, Vec::len)
    }
}

pub struct ConsistencyChecker {
    store: LinkStore,
    registry: ModuleRegistry,
    settings: CheckerSettings,
    latest: RwLock<HashMap<String, ConsistencyIssue>>,
}

impl ConsistencyChecker {
    pub fn new(store: LinkStore, registry: ModuleRegistry, settings: CheckerSettings) -> Self {
        Self {
            store,
            registry,
            settings,
            latest: RwLock::new(HashMap::new()),
        }
    }

    pub async fn collect_snapshot(&self) -> LinkResult<GraphSnapshot> {
        let links = self.store.list_links().await?;
        let mut items = BTreeMap::new();
        for module in self.registry.module_names() {
            let module_items = self.store.oracle().list_items(module).await?;
            items.insert(module.to_string(), module_items);
        }
        Ok(GraphSnapshot { links, items })
    }

    pub async fn check_consistency(&self) -> LinkResult<ConsistencyReport> {
        let snapshot = self.collect_snapshot().await?;
        let issues = analyze(&snapshot, &self.settings);

        let stats = ReportStats {
            total_pages: snapshot.item_count(NOTES),
            total_blocks: snapshot.item_count(BLOCKS),
            total_links: snapshot.links.len(),
            broken_links: count_type(&issues, IssueType::BrokenLink),
            orphaned_pages: count_type(&issues, IssueType::OrphanedPage),
        };

        *self.write_latest() = issues
            .iter()
            .map(|issue| (issue.id.clone(), issue.clone()))
            .collect();

        let report = ConsistencyReport::new(issues, stats);
        info!(
            "Consistency check found {} issues ({} auto-fixable)",
            report.total_issues, report.auto_fixable_count
        );
        Ok(report)
    }

    /// Apply the best suggestion of each named issue from the latest report.
    ///
    /// Every id is attempted; failures are collected, never raised.
    pub async fn auto_fix(&self, issue_ids: &[String]) -> AutoFixResult {
        let mut result = AutoFixResult::default();

        for issue_id in issue_ids {
            let issue = self.read_latest().get(issue_id).cloned();
            let Some(issue) = issue else {
                result
                    .errors
                    .push(LinkError::UnknownIssueId(issue_id.clone()).to_string());
                continue;
            };
            if !issue.auto_fixable {
                result
                    .errors
                    .push(format!("issue {issue_id} is not auto-fixable"));
                continue;
            }
            let Some(suggestion) = issue.best_suggestion() else {
                result
                    .errors
                    .push(format!("issue {issue_id} has no repair suggestion"));
                continue;
            };

            match self.apply(&suggestion.action).await {
                Ok(()) => {
                    debug!(issue_id = %issue_id, "applied {}", suggestion.description);
                    self.write_latest().remove(issue_id);
                    result.fixed += 1;
                }
                Err(err) => {
                    warn!(issue_id = %issue_id, "auto-fix failed: {err}");
                    result.errors.push(format!("{issue_id}: {err}"));
                }
            }
        }

        if result.fixed > 0 || !result.errors.is_empty() {
            info!(
                "Auto-fix repaired {} issues, {} errors",
                result.fixed,
                result.errors.len()
            );
        }
        result
    }

    async fn apply(&self, action: &RepairAction) -> LinkResult<()> {
        let outcome = match action {
            RepairAction::Remove { link_id } => self.store.delete_link(link_id).await.map(|_| ()),
            RepairAction::Replace {
                link_id,
                new_target,
            } => self
                .store
                .retarget_link(link_id, new_target.clone())
                .await
                .map(|_| ()),
            RepairAction::CreateMirror { link_id } => {
                self.store.create_mirror(link_id).await.map(|_| ())
            }
            RepairAction::RemoveDuplicates { remove, .. } => {
                for link_id in remove {
                    ignore_missing(self.store.delete_link(link_id).await.map(|_| ()))?;
                }
                Ok(())
            }
        };
        ignore_missing(outcome)
    }

    fn read_latest(&self) -> RwLockReadGuard<'_, HashMap<String, ConsistencyIssue>> {
        self.latest
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_latest(&self) -> RwLockWriteGuard<'_, HashMap<String, ConsistencyIssue>> {
        self.latest
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// An edge that is already gone needs no repair.
fn ignore_missing(outcome: LinkResult<()>) -> LinkResult<()> {
    match outcome {
        Err(LinkError::LinkNotFound(id)) => {
            debug!(link_id = %id, "link already removed");
            Ok(())
        }
        other => other,
    }
}

fn count_type(issues: &[ConsistencyIssue], issue_type: IssueType) -> usize {
    issues
        .iter()
        .filter(|issue| issue.issue_type == issue_type)
        .count()
}

/// Classify every issue in `snapshot`. Deterministic for a given snapshot.
pub fn analyze(snapshot: &GraphSnapshot, settings: &CheckerSettings) -> Vec<ConsistencyIssue> {
    let mut issues = Vec::new();

    let (malformed, valid): (Vec<&LinkEdge>, Vec<&LinkEdge>) =
        snapshot.links.iter().partition(|link| is_malformed(link));
    for link in malformed {
        issues.push(invalid_syntax_issue(link, settings));
    }

    issues.extend(duplicate_issues(&valid));

    let mut broken: HashSet<&str> = HashSet::new();
    for link in &valid {
        if let Some(issue) = broken_link_issue(link, snapshot, settings) {
            broken.insert(link.id.as_str());
            issues.push(issue);
        }
    }

    let keys: HashSet<(NodeKey, NodeKey, LinkType)> =
        valid.iter().map(|link| link.edge_key()).collect();
    for link in &valid {
        if broken.contains(link.id.as_str()) || !link.needs_mirror() {
            continue;
        }
        if link.source() == link.target() {
            continue;
        }
        if !keys.contains(&(link.target(), link.source(), link.link_type)) {
            issues.push(missing_mirror_issue(link));
        }
    }

    let by_id: HashMap<&str, &LinkEdge> =
        valid.iter().map(|link| (link.id.as_str(), *link)).collect();
    for link in &valid {
        if link.origin != LinkOrigin::Mirror || broken.contains(link.id.as_str()) {
            continue;
        }
        let owned = link
            .mirror_of
            .as_deref()
            .and_then(|owner_id| by_id.get(owner_id))
            .is_some_and(|owner| owner.needs_mirror());
        if !owned {
            issues.push(stray_mirror_issue(link));
        }
    }

    issues.extend(orphan_issues(snapshot, &valid));
    issues.extend(cycle_issues(&valid, settings));

    issues
}

fn is_malformed(link: &LinkEdge) -> bool {
    [
        &link.source_module,
        &link.source_id,
        &link.target_module,
        &link.target_id,
    ]
    .iter()
    .any(|field| field.trim().is_empty())
        || !(0.0..=1.0).contains(&link.strength)
}

fn remove_suggestion(link: &LinkEdge, confidence: f64) -> RepairSuggestion {
    RepairSuggestion {
        action: RepairAction::Remove {
            link_id: link.id.clone(),
        },
        description: format!("Remove link {} -> {}", link.source(), link.target()),
        confidence,
    }
}

fn invalid_syntax_issue(link: &LinkEdge, settings: &CheckerSettings) -> ConsistencyIssue {
    ConsistencyIssue {
        id: format!("{}:{}", IssueType::InvalidSyntax, link.id),
        issue_type: IssueType::InvalidSyntax,
        severity: Severity::Error,
        source: Some(link.source()),
        target: Some(link.target()),
        link_id: Some(link.id.clone()),
        message: format!(
            "Malformed link {} -> {} (strength {})",
            link.source(),
            link.target(),
            link.strength
        ),
        suggestions: vec![remove_suggestion(link, settings.remove_confidence)],
        auto_fixable: true,
    }
}

fn duplicate_issues(links: &[&LinkEdge]) -> Vec<ConsistencyIssue> {
    let mut groups: BTreeMap<(NodeKey, NodeKey, LinkType), Vec<&LinkEdge>> = BTreeMap::new();
    for link in links {
        groups.entry(link.edge_key()).or_default().push(*link);
    }

    groups
        .into_iter()
        .filter(|(_, group)| group.len() > 1)
        .map(|((source, target, link_type), mut group)| {
            group.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
            let keep = group[0].id.clone();
            let remove: Vec<String> = group[1..].iter().map(|link| link.id.clone()).collect();
            ConsistencyIssue {
                id: format!(
                    "{}:{source}->{target}:{link_type}",
                    IssueType::DuplicateLink
                ),
                issue_type: IssueType::DuplicateLink,
                severity: Severity::Warning,
                message: format!(
                    "{} {link_type} links from {source} to {target}",
                    group.len()
                ),
                suggestions: vec![RepairSuggestion {
                    description: format!("Keep {keep}, remove {} duplicates", remove.len()),
                    action: RepairAction::RemoveDuplicates { keep, remove },
                    confidence: 1.0,
                }],
                source: Some(source),
                target: Some(target),
                link_id: None,
                auto_fixable: true,
            }
        })
        .collect()
}

fn broken_link_issue(
    link: &LinkEdge,
    snapshot: &GraphSnapshot,
    settings: &CheckerSettings,
) -> Option<ConsistencyIssue> {
    let source_exists = snapshot.contains(&link.source());
    let target_exists = snapshot.contains(&link.target());
    if source_exists && target_exists {
        return None;
    }

    let mut suggestions = vec![remove_suggestion(link, settings.remove_confidence)];
    let message = if !source_exists {
        format!("Link {} has a missing source {}", link.id, link.source())
    } else {
        suggestions.extend(replace_suggestions(link, snapshot, settings));
        format!("Link {} points to missing target {}", link.id, link.target())
    };
    suggestions.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
    });

    Some(ConsistencyIssue {
        id: format!("{}:{}", IssueType::BrokenLink, link.id),
        issue_type: IssueType::BrokenLink,
        severity: Severity::Error,
        source: Some(link.source()),
        target: Some(link.target()),
        link_id: Some(link.id.clone()),
        message,
        suggestions,
        auto_fixable: true,
    })
}

/// Items of the target module whose title resembles what the link pointed at.
fn replace_suggestions(
    link: &LinkEdge,
    snapshot: &GraphSnapshot,
    settings: &CheckerSettings,
) -> Vec<RepairSuggestion> {
    let Some(candidates) = snapshot.items.get(&link.target_module) else {
        return Vec::new();
    };
    let wanted = link.metadata_str("display_text").unwrap_or(&link.target_id);
    let source = link.source();

    let mut scored: Vec<(f64, &ContentItem)> = candidates
        .iter()
        .filter(|item| !(item.module == source.module && item.id == source.id))
        .map(|item| (title_similarity(wanted, &item.title), item))
        .filter(|(similarity, _)| *similarity >= settings.similarity_threshold)
        .collect();
    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.1.id.cmp(&b.1.id))
    });

    scored
        .into_iter()
        .take(settings.max_suggestions)
        .map(|(similarity, item)| RepairSuggestion {
            action: RepairAction::Replace {
                link_id: link.id.clone(),
                new_target: NodeKey::new(&item.module, &item.id),
            },
            description: format!(
                "Point link at \"{}\" ({}:{}, similarity {:.2})",
                item.title, item.module, item.id, similarity
            ),
            confidence: 0.9 * similarity,
        })
        .collect()
}

fn missing_mirror_issue(link: &LinkEdge) -> ConsistencyIssue {
    ConsistencyIssue {
        id: format!("{}:{}", IssueType::MissingMirror, link.id),
        issue_type: IssueType::MissingMirror,
        severity: Severity::Warning,
        source: Some(link.source()),
        target: Some(link.target()),
        link_id: Some(link.id.clone()),
        message: format!(
            "Bidirectional link {} -> {} has no reverse edge",
            link.source(),
            link.target()
        ),
        suggestions: vec![RepairSuggestion {
            action: RepairAction::CreateMirror {
                link_id: link.id.clone(),
            },
            description: format!("Create {} -> {}", link.target(), link.source()),
            confidence: 1.0,
        }],
        auto_fixable: true,
    }
}

fn stray_mirror_issue(link: &LinkEdge) -> ConsistencyIssue {
    ConsistencyIssue {
        id: format!("{}:{}", IssueType::StrayMirror, link.id),
        issue_type: IssueType::StrayMirror,
        severity: Severity::Warning,
        source: Some(link.source()),
        target: Some(link.target()),
        link_id: Some(link.id.clone()),
        message: format!(
            "Mirror link {} -> {} has no bidirectional reference behind it",
            link.source(),
            link.target()
        ),
        suggestions: vec![RepairSuggestion {
            action: RepairAction::Remove {
                link_id: link.id.clone(),
            },
            description: format!("Remove mirror {} -> {}", link.source(), link.target()),
            confidence: 1.0,
        }],
        auto_fixable: true,
    }
}

fn orphan_issues(snapshot: &GraphSnapshot, links: &[&LinkEdge]) -> Vec<ConsistencyIssue> {
    let Some(pages) = snapshot.items.get(NOTES) else {
        return Vec::new();
    };
    let targeted: BTreeSet<&str> = links
        .iter()
        .filter(|link| link.target_module == NOTES)
        .map(|link| link.target_id.as_str())
        .collect();

    pages
        .iter()
        .filter(|page| !targeted.contains(page.id.as_str()))
        .map(|page| {
            let node = NodeKey::new(NOTES, &page.id);
            ConsistencyIssue {
                id: format!("{}:{node}", IssueType::OrphanedPage),
                issue_type: IssueType::OrphanedPage,
                severity: Severity::Warning,
                message: format!("Page \"{}\" has no incoming links", page.title),
                source: None,
                target: Some(node),
                link_id: None,
                suggestions: Vec::new(),
                auto_fixable: false,
            }
        })
        .collect()
}

fn cycle_issues(links: &[&LinkEdge], settings: &CheckerSettings) -> Vec<ConsistencyIssue> {
    find_cycles(links.iter().copied(), NOTES)
        .into_iter()
        .map(|cycle| {
            let path = cycle
                .path
                .iter()
                .map(NodeKey::to_string)
                .collect::<Vec<_>>()
                .join(" -> ");
            ConsistencyIssue {
                id: format!("{}:{}:{path}", IssueType::CircularReference, cycle.root),
                issue_type: IssueType::CircularReference,
                severity: Severity::Warning,
                source: cycle.path.first().cloned(),
                target: cycle.path.last().cloned(),
                link_id: Some(cycle.closing_link_id.clone()),
                message: format!("Circular reference: {path}"),
                suggestions: vec![RepairSuggestion {
                    action: RepairAction::Remove {
                        link_id: cycle.closing_link_id,
                    },
                    description: "Remove the edge that closes the cycle".to_string(),
                    confidence: settings.remove_confidence / 2.0,
                }],
                auto_fixable: false,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CreateLinkRequest, LinkMetadata, LinkUpdate};
    use crate::test_helpers::{create_test_database, insert_item, remove_item, test_store};

    fn settings() -> CheckerSettings {
        CheckerSettings::default()
    }

    fn item(module: &str, id: &str, title: &str) -> ContentItem {
        ContentItem {
            module: module.to_string(),
            id: id.to_string(),
            title: title.to_string(),
            updated_at: 0,
        }
    }

    fn edge(id: &str, source: (&str, &str), target: (&str, &str)) -> LinkEdge {
        LinkEdge {
            id: id.to_string(),
            source_module: source.0.to_string(),
            source_id: source.1.to_string(),
            target_module: target.0.to_string(),
            target_id: target.1.to_string(),
            link_type: LinkType::Reference,
            bidirectional: false,
            strength: 1.0,
            metadata: LinkMetadata::new(),
            origin: LinkOrigin::Manual,
            mirror_of: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    fn snapshot(links: Vec<LinkEdge>, items: Vec<ContentItem>) -> GraphSnapshot {
        let mut grouped: BTreeMap<String, Vec<ContentItem>> = BTreeMap::new();
        for item in items {
            grouped.entry(item.module.clone()).or_default().push(item);
        }
        GraphSnapshot {
            links,
            items: grouped,
        }
    }

    #[test]
    fn duplicate_groups_keep_the_oldest() {
        let mut newer = edge("b-dup", ("notes", "a"), ("notes", "b"));
        newer.created_at = 10;
        let snap = snapshot(
            vec![edge("a-orig", ("notes", "a"), ("notes", "b")), newer],
            vec![item("notes", "a", "A"), item("notes", "b", "B")],
        );

        let issues = analyze(&snap, &settings());
        let duplicate = issues
            .iter()
            .find(|issue| issue.issue_type == IssueType::DuplicateLink)
            .unwrap();
        assert!(duplicate.auto_fixable);
        assert_eq!(
            duplicate.best_suggestion().unwrap().action,
            RepairAction::RemoveDuplicates {
                keep: "a-orig".to_string(),
                remove: vec!["b-dup".to_string()],
            }
        );
    }

    #[test]
    fn broken_link_prefers_close_title_match() {
        let mut dangling = edge("l1", ("notes", "a"), ("notes", "gone"));
        dangling
            .metadata
            .insert("display_text".to_string(), "Project Plan".into());
        let snap = snapshot(
            vec![dangling],
            vec![
                item("notes", "a", "Source"),
                item("notes", "p2", "Project Plans"),
                item("notes", "p3", "Groceries"),
            ],
        );

        let issues = analyze(&snap, &settings());
        let broken = issues
            .iter()
            .find(|issue| issue.issue_type == IssueType::BrokenLink)
            .unwrap();
        assert_eq!(broken.id, "broken-link:l1");
        assert_eq!(broken.severity, Severity::Error);
        assert_eq!(broken.suggestions.len(), 2);
        assert_eq!(
            broken.suggestions[0].action,
            RepairAction::Replace {
                link_id: "l1".to_string(),
                new_target: NodeKey::new("notes", "p2"),
            }
        );
        assert!(broken.suggestions[0].confidence > broken.suggestions[1].confidence);
        assert!(matches!(
            broken.suggestions[1].action,
            RepairAction::Remove { .. }
        ));
    }

    #[test]
    fn malformed_edges_are_reported_once() {
        let mut weak = edge("l1", ("notes", "a"), ("notes", ""));
        weak.strength = 2.0;
        let snap = snapshot(vec![weak], vec![item("notes", "a", "A")]);

        let issues = analyze(&snap, &settings());
        let linked: Vec<_> = issues
            .iter()
            .filter(|issue| issue.link_id.as_deref() == Some("l1"))
            .collect();
        assert_eq!(linked.len(), 1);
        assert_eq!(linked[0].issue_type, IssueType::InvalidSyntax);
    }

    #[test]
    fn missing_mirror_detected_for_bidirectional_references() {
        let mut link = edge("l1", ("notes", "a"), ("tasks", "t"));
        link.bidirectional = true;
        let snap = snapshot(
            vec![link],
            vec![item("notes", "a", "A"), item("tasks", "t", "T")],
        );

        let issues = analyze(&snap, &settings());
        assert!(issues.iter().any(|issue| issue.id == "missing-mirror:l1"));
    }

    #[test]
    fn mirrors_are_never_mirrored_and_strays_are_removable() {
        let mut owner = edge("l1", ("notes", "a"), ("tasks", "t"));
        owner.link_type = LinkType::Embed;
        let mut mirror = edge("m1", ("tasks", "t"), ("notes", "a"));
        mirror.bidirectional = true;
        mirror.origin = LinkOrigin::Mirror;
        mirror.mirror_of = Some("l1".to_string());
        let snap = snapshot(
            vec![owner, mirror],
            vec![item("notes", "a", "A"), item("tasks", "t", "T")],
        );

        let issues = analyze(&snap, &settings());
        assert!(
            issues
                .iter()
                .all(|issue| issue.issue_type != IssueType::MissingMirror)
        );
        let stray = issues
            .iter()
            .find(|issue| issue.issue_type == IssueType::StrayMirror)
            .unwrap();
        assert_eq!(stray.id, "stray-mirror:m1");
        assert_eq!(
            stray.best_suggestion().unwrap().action,
            RepairAction::Remove {
                link_id: "m1".to_string()
            }
        );
    }

    #[test]
    fn analysis_is_deterministic() {
        let snap = snapshot(
            vec![
                edge("e1", ("notes", "p1"), ("notes", "p2")),
                edge("e2", ("notes", "p2"), ("notes", "p3")),
                edge("e3", ("notes", "p3"), ("notes", "p1")),
                edge("e4", ("notes", "p1"), ("notes", "missing")),
            ],
            vec![
                item("notes", "p1", "One"),
                item("notes", "p2", "Two"),
                item("notes", "p3", "Three"),
                item("notes", "p4", "Intro"),
            ],
        );
        assert_eq!(analyze(&snap, &settings()), analyze(&snap, &settings()));
    }

    #[tokio::test]
    async fn test_unknown_issue_id_is_reported() {
        let db = create_test_database().await.unwrap();
        let store = test_store(&db, true);
        let checker = ConsistencyChecker::new(store, ModuleRegistry::default(), settings());

        let result = checker
            .auto_fix(&["nonexistent-issue".to_string()])
            .await;
        assert_eq!(result.fixed, 0);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("nonexistent-issue"));
    }

    #[tokio::test]
    async fn test_auto_fix_removes_broken_link_and_mirror() {
        let db = create_test_database().await.unwrap();
        insert_item(db.pool(), "notes", "a", "Alpha").await;
        insert_item(db.pool(), "tasks", "t", "Zzz").await;
        let store = test_store(&db, true);
        store
            .create_link(CreateLinkRequest::new(
                NodeKey::new("notes", "a"),
                NodeKey::new("tasks", "t"),
                LinkType::Reference,
            ))
            .await
            .unwrap();
        remove_item(db.pool(), "tasks", "t").await;

        let checker = ConsistencyChecker::new(store.clone(), ModuleRegistry::default(), settings());
        let report = checker.check_consistency().await.unwrap();
        assert_eq!(report.count(IssueType::BrokenLink), 2);
        assert_eq!(report.stats.broken_links, 2);

        let ids: Vec<String> = report
            .issues_of(IssueType::BrokenLink)
            .map(|issue| issue.id.clone())
            .collect();
        let result = checker.auto_fix(&ids).await;
        assert_eq!(result.fixed, 2, "errors: {:?}", result.errors);
        assert!(store.list_links().await.unwrap().is_empty());

        let again = checker.check_consistency().await.unwrap();
        assert_eq!(again.count(IssueType::BrokenLink), 0);
    }

    #[tokio::test]
    async fn test_retyped_reference_stays_retyped_after_repair() {
        let db = create_test_database().await.unwrap();
        insert_item(db.pool(), "notes", "a", "Alpha").await;
        insert_item(db.pool(), "tasks", "t", "Chores").await;
        let store = test_store(&db, true);
        let link = store
            .create_link(CreateLinkRequest::new(
                NodeKey::new("notes", "a"),
                NodeKey::new("tasks", "t"),
                LinkType::Reference,
            ))
            .await
            .unwrap();
        store
            .update_link(
                &link.id,
                LinkUpdate {
                    link_type: Some(LinkType::Embed),
                    ..LinkUpdate::default()
                },
            )
            .await
            .unwrap();

        let checker = ConsistencyChecker::new(store.clone(), ModuleRegistry::default(), settings());
        let report = checker.check_consistency().await.unwrap();
        let result = checker.auto_fix(&report.auto_fixable_ids()).await;
        assert!(result.errors.is_empty(), "errors: {:?}", result.errors);

        let links = store.list_links().await.unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].id, link.id);
        assert_eq!(links[0].link_type, LinkType::Embed);
    }

    #[tokio::test]
    async fn test_stray_mirror_removal_keeps_its_old_owner() {
        let db = create_test_database().await.unwrap();
        insert_item(db.pool(), "notes", "a", "Alpha").await;
        insert_item(db.pool(), "tasks", "t", "Chores").await;
        let store = test_store(&db, true);
        let link = store
            .create_link(CreateLinkRequest::new(
                NodeKey::new("notes", "a"),
                NodeKey::new("tasks", "t"),
                LinkType::Reference,
            ))
            .await
            .unwrap();
        // Retype the owner behind the store's back, leaving its mirror stranded.
        sqlx::query("UPDATE link_edges SET link_type = 'embed', bidirectional = 0 WHERE id = ?")
            .bind(&link.id)
            .execute(db.pool())
            .await
            .unwrap();

        let checker = ConsistencyChecker::new(store.clone(), ModuleRegistry::default(), settings());
        let report = checker.check_consistency().await.unwrap();
        assert_eq!(report.count(IssueType::StrayMirror), 1);
        assert_eq!(report.count(IssueType::MissingMirror), 0);

        let result = checker.auto_fix(&report.auto_fixable_ids()).await;
        assert_eq!(result.fixed, 1, "errors: {:?}", result.errors);
        let links = store.list_links().await.unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].id, link.id);
    }

    #[tokio::test]
    async fn test_advisory_issues_are_not_fixed() {
        let db = create_test_database().await.unwrap();
        insert_item(db.pool(), "notes", "intro", "Intro").await;
        let store = test_store(&db, true);
        let checker = ConsistencyChecker::new(store, ModuleRegistry::default(), settings());

        let report = checker.check_consistency().await.unwrap();
        let orphan = report.issues_of(IssueType::OrphanedPage).next().unwrap();
        assert!(!orphan.auto_fixable);

        let result = checker.auto_fix(&[orphan.id.clone()]).await;
        assert_eq!(result.fixed, 0);
        assert_eq!(result.errors.len(), 1);
    }
}
