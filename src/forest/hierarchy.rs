use std::collections::{BTreeMap, BTreeSet};

use super::{Level, OrgNode};

/// Collects the ids of every node transitively parented by `node_id`.
///
/// Walks one generation at a time with an explicit worklist; the visited set
/// guarantees termination even if the input contains a parent cycle, which
/// well-formed forests never do.
pub fn descendant_ids(node_id: &str, nodes: &[OrgNode]) -> BTreeSet<String> {
    let mut collected = BTreeSet::new();
    let mut visited = BTreeSet::new();
    let mut pending = vec![node_id.to_owned()];

    while let Some(current) = pending.pop() {
        if !visited.insert(current.clone()) {
            continue;
        }
        for node in nodes {
            if node.parent_id.as_deref() == Some(current.as_str()) {
                collected.insert(node.id.clone());
                pending.push(node.id.clone());
            }
        }
    }

    collected.remove(node_id);
    collected
}

/// Sets the `children` cache of the node with id `parent_id` to exactly the
/// ids of the nodes whose `parent_id` matches, in collection order.
pub fn recompute_children(parent_id: &str, nodes: &mut [OrgNode]) {
    let child_ids = nodes
        .iter()
        .filter(|node| node.parent_id.as_deref() == Some(parent_id))
        .map(|node| node.id.clone())
        .collect::<Vec<_>>();

    if let Some(parent) = nodes.iter_mut().find(|node| node.id == parent_id) {
        parent.children = child_ids;
    }
}

/// Rebuilds every node's `children` cache from the flat node collection in
/// one pass, so the caches never disagree with the parent links.
pub fn rebuild_children_index(nodes: &mut [OrgNode]) {
    let mut children_by_parent = BTreeMap::<String, Vec<String>>::new();
    for node in nodes.iter() {
        if let Some(parent_id) = &node.parent_id {
            children_by_parent
                .entry(parent_id.clone())
                .or_default()
                .push(node.id.clone());
        }
    }

    for node in nodes.iter_mut() {
        node.children = children_by_parent.remove(&node.id).unwrap_or_default();
    }
}

/// Replaces each level's `nodes` view with the filter of the node collection
/// by that level's number.
pub fn rebuild_level_views(nodes: &[OrgNode], levels: &mut [Level]) {
    for level in levels.iter_mut() {
        level.nodes = nodes
            .iter()
            .filter(|node| node.level == level.level_number)
            .cloned()
            .collect();
    }
}
