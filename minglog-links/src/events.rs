//! In-process notifications, fire-and-forget over `tokio::sync::broadcast`.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::models::{LinkEdge, LinkType};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Notifications emitted by the link store and the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum LinkEvent {
    LinkCreated {
        link: LinkEdge,
        source_module: String,
        target_module: String,
    },
    LinkUpdated {
        link: LinkEdge,
    },
    LinkDeleted {
        link: LinkEdge,
    },
    LinksDeleted {
        module: String,
        item_id: String,
        count: usize,
    },
    #[serde(rename = "bidirectional-links:updated")]
    BidirectionalLinksUpdated {
        entity_type: String,
        entity_id: String,
        link_count: usize,
    },
    #[serde(rename = "bidirectional-links:entity-deleted")]
    BidirectionalLinksEntityDeleted {
        entity_type: String,
        entity_id: String,
    },
}

impl LinkEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::LinkCreated { .. } => "link-created",
            Self::LinkUpdated { .. } => "link-updated",
            Self::LinkDeleted { .. } => "link-deleted",
            Self::LinksDeleted { .. } => "links-deleted",
            Self::BidirectionalLinksUpdated { .. } => "bidirectional-links:updated",
            Self::BidirectionalLinksEntityDeleted { .. } => "bidirectional-links:entity-deleted",
        }
    }
}

/// An edge suggested by content analysis performed elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkProposal {
    pub target_module: String,
    pub target_id: String,
    pub link_type: LinkType,
    pub strength: f64,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Content lifecycle events consumed by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum ContentEvent {
    #[serde(rename = "content:updated")]
    Updated {
        entity_type: String,
        entity_id: String,
        content: String,
    },
    #[serde(rename = "content:deleted")]
    Deleted {
        entity_type: String,
        entity_id: String,
    },
    #[serde(rename = "content:analyzed")]
    Analyzed {
        entity_type: String,
        entity_id: String,
        proposals: Vec<LinkProposal>,
    },
}

impl ContentEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Updated { .. } => "content:updated",
            Self::Deleted { .. } => "content:deleted",
            Self::Analyzed { .. } => "content:analyzed",
        }
    }
}

/// Publisher for [`LinkEvent`]s. Cloning shares the channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<LinkEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }
}

impl EventBus {
    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.tx.subscribe()
    }

    /// Publish an event; no subscribers is not an error.
    pub fn emit(&self, event: LinkEvent) {
        let _ = self.tx.send(event);
    }
}

/// Channel for content lifecycle events; module stores hold the sender.
pub fn content_channel() -> broadcast::Sender<ContentEvent> {
    let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    tx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_events_use_colon_names_on_the_wire() {
        let event = ContentEvent::Deleted {
            entity_type: "notes".to_string(),
            entity_id: "n1".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "content:deleted");
        assert_eq!(event.name(), "content:deleted");
    }

    #[test]
    fn link_events_serialize_with_their_names() {
        let event = LinkEvent::LinksDeleted {
            module: "notes".to_string(),
            item_id: "n1".to_string(),
            count: 2,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], event.name());

        let event = LinkEvent::BidirectionalLinksUpdated {
            entity_type: "notes".to_string(),
            entity_id: "n1".to_string(),
            link_count: 1,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "bidirectional-links:updated");
    }

    #[tokio::test]
    async fn emit_without_subscribers_is_silent() {
        let bus = EventBus::default();
        bus.emit(LinkEvent::BidirectionalLinksEntityDeleted {
            entity_type: "notes".to_string(),
            entity_id: "n1".to_string(),
        });

        let mut rx = bus.subscribe();
        bus.emit(LinkEvent::BidirectionalLinksEntityDeleted {
            entity_type: "tasks".to_string(),
            entity_id: "t1".to_string(),
        });
        let received = rx.recv().await.unwrap();
        assert_eq!(received.name(), "bidirectional-links:entity-deleted");
    }
}
