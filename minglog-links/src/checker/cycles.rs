//! Cycle search over reference edges with an explicit DFS stack.

use std::collections::{BTreeMap, HashSet};

use crate::models::{LinkEdge, LinkOrigin, LinkType, NodeKey};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cycle {
    pub root: NodeKey,
    /// Nodes along the cycle, first node repeated at the end.
    pub path: Vec<NodeKey>,
    /// Edge that closed the cycle.
    pub closing_link_id: String,
}

/// Every cycle reachable from each root, roots in sorted order.
///
/// Only `reference` edges between items of `module` are walked; mirror edges
/// are skipped. The same cycle is reported once per root that reaches it.
pub fn find_cycles<'a>(edges: impl IntoIterator<Item = &'a LinkEdge>, module: &str) -> Vec<Cycle> {
    let mut adjacency: BTreeMap<NodeKey, Vec<(NodeKey, String)>> = BTreeMap::new();
    for edge in edges {
        if edge.link_type != LinkType::Reference
            || edge.origin == LinkOrigin::Mirror
            || edge.source_module != module
            || edge.target_module != module
        {
            continue;
        }
        adjacency
            .entry(edge.source())
            .or_default()
            .push((edge.target(), edge.id.clone()));
    }
    for targets in adjacency.values_mut() {
        targets.sort();
    }

    let mut cycles = Vec::new();
    for root in adjacency.keys() {
        walk_from(root, &adjacency, &mut cycles);
    }
    cycles
}

fn walk_from(
    root: &NodeKey,
    adjacency: &BTreeMap<NodeKey, Vec<(NodeKey, String)>>,
    cycles: &mut Vec<Cycle>,
) {
    let mut visited: HashSet<NodeKey> = HashSet::new();
    let mut on_path: HashSet<NodeKey> = HashSet::new();
    // (node, index of the next outgoing edge to try)
    let mut stack: Vec<(NodeKey, usize)> = vec![(root.clone(), 0)];
    visited.insert(root.clone());
    on_path.insert(root.clone());

    loop {
        let Some(frame) = stack.last_mut() else {
            break;
        };
        let node = frame.0.clone();
        let index = frame.1;
        frame.1 += 1;

        let next = adjacency.get(&node).and_then(|targets| targets.get(index));
        let Some((next, link_id)) = next else {
            stack.pop();
            on_path.remove(&node);
            continue;
        };

        if on_path.contains(next) {
            let start = stack
                .iter()
                .position(|(on_stack, _)| on_stack == next)
                .unwrap_or(0);
            let mut path: Vec<NodeKey> = stack[start..]
                .iter()
                .map(|(on_stack, _)| on_stack.clone())
                .collect();
            path.push(next.clone());
            cycles.push(Cycle {
                root: root.clone(),
                path,
                closing_link_id: link_id.clone(),
            });
        } else if visited.insert(next.clone()) {
            on_path.insert(next.clone());
            stack.push((next.clone(), 0));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LinkMetadata;

    fn edge(id: &str, source: &str, target: &str) -> LinkEdge {
        LinkEdge {
            id: id.to_string(),
            source_module: "notes".to_string(),
            source_id: source.to_string(),
            target_module: "notes".to_string(),
            target_id: target.to_string(),
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

    #[test]
    fn finds_three_node_cycle_from_each_root() {
        let edges = vec![edge("e1", "p1", "p2"), edge("e2", "p2", "p3"), edge("e3", "p3", "p1")];
        let cycles = find_cycles(&edges, "notes");

        // Not deduplicated across roots.
        assert_eq!(cycles.len(), 3);
        assert_eq!(cycles[0].root, NodeKey::new("notes", "p1"));
        assert_eq!(cycles[0].path.len(), 4);
        assert_eq!(cycles[0].closing_link_id, "e3");
    }

    #[test]
    fn acyclic_graph_has_no_cycles() {
        let edges = vec![edge("e1", "a", "b"), edge("e2", "a", "c"), edge("e3", "b", "c")];
        assert!(find_cycles(&edges, "notes").is_empty());
    }

    #[test]
    fn mirror_and_non_reference_edges_are_ignored() {
        let mut mirror = edge("e2", "b", "a");
        mirror.origin = LinkOrigin::Mirror;
        let mut embed = edge("e3", "b", "a");
        embed.link_type = LinkType::Embed;
        let edges = vec![edge("e1", "a", "b"), mirror, embed];
        assert!(find_cycles(&edges, "notes").is_empty());
    }

    #[test]
    fn other_modules_are_ignored() {
        let mut back = edge("e2", "b", "a");
        back.source_module = "tasks".to_string();
        let edges = vec![edge("e1", "a", "b"), back];
        assert!(find_cycles(&edges, "notes").is_empty());
    }
}
