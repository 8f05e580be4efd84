//! Synchronization orchestrator: keeps derived edges in step with content
//! lifecycle events and runs periodic drift repair.

use std::sync::Arc;

use minglog_core::{LinkGraphSettings, SyncSettings};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tracing::{debug, info, warn};

use crate::checker::ConsistencyChecker;
use crate::errors::LinkResult;
use crate::events::{ContentEvent, LinkEvent, LinkProposal};
use crate::models::{CreateLinkRequest, LinkMetadata, LinkOrigin, NodeKey};
use crate::parser::ReferenceParser;
use crate::registry::ModuleRegistry;
use crate::store::LinkStore;

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcileSummary {
    pub issues: usize,
    pub auto_fixable: usize,
    pub fixed: usize,
    pub errors: Vec<String>,
}

pub struct SyncOrchestrator {
    store: LinkStore,
    parser: ReferenceParser,
    checker: ConsistencyChecker,
    settings: SyncSettings,
}

impl SyncOrchestrator {
    pub fn new(store: LinkStore, registry: ModuleRegistry, settings: &LinkGraphSettings) -> Self {
        Self {
            parser: ReferenceParser::new(store.clone(), registry.clone()),
            checker: ConsistencyChecker::new(store.clone(), registry, settings.checker.clone()),
            settings: settings.sync.clone(),
            store,
        }
    }

    pub fn store(&self) -> &LinkStore {
        &self.store
    }

    pub fn parser(&self) -> &ReferenceParser {
        &self.parser
    }

    pub fn checker(&self) -> &ConsistencyChecker {
        &self.checker
    }

    pub async fn handle_event(&self, event: ContentEvent) -> LinkResult<()> {
        debug!(event = event.name(), "handling content event");
        match event {
            ContentEvent::Updated {
                entity_type,
                entity_id,
                content,
            } => {
                self.on_content_updated(&entity_type, &entity_id, &content)
                    .await?;
            }
            ContentEvent::Deleted {
                entity_type,
                entity_id,
            } => {
                self.on_content_deleted(&entity_type, &entity_id).await?;
            }
            ContentEvent::Analyzed {
                entity_type,
                entity_id,
                proposals,
            } => {
                self.on_content_analyzed(&entity_type, &entity_id, &proposals)
                    .await;
            }
        }
        Ok(())
    }

    /// Replace the item's parser-derived edges with those found in `content`.
    ///
    /// Delete and recreate are separate writes; readers in between see the
    /// item without derived edges.
    pub async fn on_content_updated(
        &self,
        entity_type: &str,
        entity_id: &str,
        content: &str,
    ) -> LinkResult<usize> {
        let source = NodeKey::new(entity_type, entity_id);
        // The item may be new or retitled; memoized resolutions can be stale.
        self.parser.invalidate_for(&source);
        let removed = self.store.delete_derived_links(entity_type, entity_id).await?;
        let references = self.parser.parse_references(content, Some(&source)).await?;

        let links = self.store.get_links_for_item(entity_type, entity_id).await?;
        let link_count = links.outgoing.len();
        info!(
            "Synced links for {source}: {} references parsed, {removed} derived links replaced",
            references.len()
        );
        self.store
            .events()
            .emit(LinkEvent::BidirectionalLinksUpdated {
                entity_type: entity_type.to_string(),
                entity_id: entity_id.to_string(),
                link_count,
            });
        Ok(link_count)
    }

    pub async fn on_content_deleted(&self, entity_type: &str, entity_id: &str) -> LinkResult<usize> {
        let count = self
            .store
            .delete_links_for_item(entity_type, entity_id)
            .await?;
        // Memoized results may still resolve to the deleted item.
        self.parser.clear_cache();
        self.store
            .events()
            .emit(LinkEvent::BidirectionalLinksEntityDeleted {
                entity_type: entity_type.to_string(),
                entity_id: entity_id.to_string(),
            });
        Ok(count)
    }

    /// Create proposed edges strong enough to accept. Returns how many were created.
    pub async fn on_content_analyzed(
        &self,
        entity_type: &str,
        entity_id: &str,
        proposals: &[LinkProposal],
    ) -> usize {
        if !self.settings.auto_link_enabled {
            debug!("auto-linking disabled, ignoring {} proposals", proposals.len());
            return 0;
        }

        let source = NodeKey::new(entity_type, entity_id);
        let mut created = 0;
        for proposal in proposals {
            if proposal.strength < self.settings.auto_link_min_strength {
                continue;
            }
            let mut metadata = LinkMetadata::new();
            if let Some(reason) = &proposal.reason {
                metadata.insert("reason".to_string(), reason.clone().into());
            }
            let request = CreateLinkRequest::new(
                source.clone(),
                NodeKey::new(&proposal.target_module, &proposal.target_id),
                proposal.link_type,
            )
            .with_strength(proposal.strength)
            .with_origin(LinkOrigin::Auto)
            .with_metadata(metadata);

            match self.store.create_link(request).await {
                Ok(_) => created += 1,
                Err(err) => warn!(source = %source, "rejected link proposal: {err}"),
            }
        }
        created
    }

    /// One drift-repair pass: check, then fix what is safe to fix.
    pub async fn reconcile(&self) -> LinkResult<ReconcileSummary> {
        let report = self.checker.check_consistency().await?;
        let mut summary = ReconcileSummary {
            issues: report.total_issues,
            auto_fixable: report.auto_fixable_count,
            ..ReconcileSummary::default()
        };

        if self.settings.auto_fix && report.auto_fixable_count > 0 {
            let result = self.checker.auto_fix(&report.auto_fixable_ids()).await;
            summary.fixed = result.fixed;
            summary.errors = result.errors;
        }

        info!(
            "Reconciliation: {} issues, {} fixed, {} errors",
            summary.issues,
            summary.fixed,
            summary.errors.len()
        );
        Ok(summary)
    }

    /// Spawn the event loop and periodic reconciliation.
    pub fn start(self: Arc<Self>, mut events: broadcast::Receiver<ContentEvent>) -> SyncHandle {
        let period = self.settings.interval();
        let mut interval = interval_at(Instant::now() + period, period);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut events_open = true;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(err) = self.reconcile().await {
                            warn!("reconciliation failed: {err}");
                        }
                    }
                    event = events.recv(), if events_open => match event {
                        Ok(event) => {
                            let name = event.name();
                            if let Err(err) = self.handle_event(event).await {
                                warn!(event = name, "content event failed: {err}");
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!("skipped {skipped} content events, next reconciliation will repair");
                        }
                        Err(RecvError::Closed) => {
                            info!("content event channel closed");
                            events_open = false;
                        }
                    },
                    _ = shutdown_rx.changed() => break,
                }
            }
            info!("sync orchestrator stopped");
        });

        info!(
            "sync orchestrator started (interval_seconds={})",
            period.as_secs()
        );
        SyncHandle { shutdown_tx, task }
    }
}

/// Running orchestrator loop.
pub struct SyncHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SyncHandle {
    /// Stop the loop after any in-flight work completes.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(err) = self.task.await {
            warn!("sync orchestrator task failed: {err}");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
