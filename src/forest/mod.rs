use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::debug;

use crate::snapshot::OrgChartSnapshot;

pub mod hierarchy;

/// A reusable job-title template. Immutable once created; many nodes may
/// reference one position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub id: String,
    pub name: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_thai: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_chinese: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_vietnamese: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salary_type: Option<String>,
}

/// A placed instance of a position in the hierarchy.
///
/// `position_name` is a copy taken at creation time and is not kept in sync
/// with later position edits. `children` is a derived cache, rebuilt from the
/// flat node collection inside every store commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgNode {
    pub id: String,
    pub position_id: String,
    pub position_name: String,
    pub level: u32,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub children: Vec<String>,
}

/// A generation bucket. `nodes` is a denormalized view over the node
/// collection, always equal to the filter by `level_number`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Level {
    pub level_number: u32,
    #[serde(default)]
    pub nodes: Vec<OrgNode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForestChange {
    Subscribed,
    PositionAdded,
    LevelAdded,
    LevelRemoved,
    NodeAdded,
    NodeRemoved,
}

impl ForestChange {
    pub fn label(self) -> &'static str {
        match self {
            Self::Subscribed => "subscribed",
            Self::PositionAdded => "position_added",
            Self::LevelAdded => "level_added",
            Self::LevelRemoved => "level_removed",
            Self::NodeAdded => "node_added",
            Self::NodeRemoved => "node_removed",
        }
    }
}

/// A full, internally consistent copy of the forest, published to every
/// subscriber after a mutation has committed. Subscribers never observe a
/// state where the level views and the node collection disagree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForestUpdate {
    pub positions: Vec<Position>,
    pub levels: Vec<Level>,
    pub nodes: Vec<OrgNode>,
    pub revision: u64,
    pub change: ForestChange,
}

/// The authoritative in-memory representation of positions, levels, and
/// nodes. All derived structure (children caches, level views) is rebuilt
/// inside the same commit as the mutation that invalidated it.
#[derive(Debug)]
pub struct ForestStore {
    positions: Vec<Position>,
    levels: Vec<Level>,
    nodes: Vec<OrgNode>,
    revision: u64,
    subscribers: Vec<UnboundedSender<ForestUpdate>>,
}

impl Default for ForestStore {
    fn default() -> Self {
        Self {
            positions: Vec::new(),
            levels: vec![Level {
                level_number: 1,
                nodes: Vec::new(),
            }],
            nodes: Vec::new(),
            revision: 0,
            subscribers: Vec::new(),
        }
    }
}

impl ForestStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a store from persisted data. The node collection is the
    /// source of truth: children caches and level views are recomputed from
    /// it, and the level range is normalized to a contiguous `1..=max` so a
    /// gap in stored level numbers cannot survive a reload.
    pub fn from_snapshot(snapshot: OrgChartSnapshot) -> Self {
        let mut nodes = snapshot.org_nodes;
        hierarchy::rebuild_children_index(&mut nodes);

        let max_level = snapshot
            .levels
            .iter()
            .map(|level| level.level_number)
            .chain(nodes.iter().map(|node| node.level))
            .max()
            .unwrap_or(1)
            .max(1);
        let mut levels = (1..=max_level)
            .map(|level_number| Level {
                level_number,
                nodes: Vec::new(),
            })
            .collect::<Vec<_>>();
        hierarchy::rebuild_level_views(&nodes, &mut levels);

        Self {
            positions: snapshot.positions,
            levels,
            nodes,
            revision: 0,
            subscribers: Vec::new(),
        }
    }

    pub fn snapshot(&self) -> OrgChartSnapshot {
        OrgChartSnapshot {
            positions: self.positions.clone(),
            levels: self.levels.clone(),
            org_nodes: self.nodes.clone(),
        }
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    pub fn org_nodes(&self) -> &[OrgNode] {
        &self.nodes
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Registers a subscriber. The receiver immediately gets the current
    /// state, then one update per committed mutation.
    pub fn subscribe(&mut self) -> UnboundedReceiver<ForestUpdate> {
        let (update_tx, update_rx) = unbounded_channel();
        let _ = update_tx.send(self.build_update(ForestChange::Subscribed));
        self.subscribers.push(update_tx);
        update_rx
    }

    pub fn add_position(&mut self, position: Position) {
        self.positions.push(position);
        self.commit(ForestChange::PositionAdded);
    }

    /// Appends a level numbered one past the current maximum.
    pub fn add_level(&mut self) {
        let next = self
            .levels
            .iter()
            .map(|level| level.level_number)
            .max()
            .unwrap_or(0)
            + 1;
        self.levels.push(Level {
            level_number: next,
            nodes: Vec::new(),
        });
        self.commit(ForestChange::LevelAdded);
    }

    /// Removes a level together with every node on it and their descendant
    /// subtrees, then renumbers the higher levels down by one. Level 1 is
    /// protected; removing it (or a level that does not exist) returns
    /// `false` and mutates nothing.
    pub fn remove_level(&mut self, level_number: u32) -> bool {
        if level_number == 1 {
            return false;
        }
        if !self
            .levels
            .iter()
            .any(|level| level.level_number == level_number)
        {
            return false;
        }

        let doomed_roots = self
            .nodes
            .iter()
            .filter(|node| node.level == level_number)
            .map(|node| node.id.clone())
            .collect::<Vec<_>>();
        let mut doomed = BTreeSet::new();
        for root in doomed_roots {
            doomed.extend(hierarchy::descendant_ids(&root, &self.nodes));
            doomed.insert(root);
        }
        self.nodes.retain(|node| !doomed.contains(&node.id));

        self.levels.retain(|level| level.level_number != level_number);
        for level in &mut self.levels {
            if level.level_number > level_number {
                level.level_number -= 1;
            }
        }
        for node in &mut self.nodes {
            if node.level > level_number {
                node.level -= 1;
            }
        }

        self.commit(ForestChange::LevelRemoved);
        true
    }

    /// Appends a node carrying a pre-assigned id, position, level, and
    /// parent. The parent's level is not validated here; callers are
    /// expected to choose from `get_possible_parents`.
    pub fn add_node(&mut self, node: OrgNode) {
        let parent_id = node.parent_id.clone();
        self.nodes.push(node);
        if let Some(parent_id) = parent_id {
            hierarchy::recompute_children(&parent_id, &mut self.nodes);
        }
        self.commit(ForestChange::NodeAdded);
    }

    /// Removes a node. With `move_children_up` and an existing parent, the
    /// direct children take the removed node's parent and level; their own
    /// subtrees keep their old levels. Otherwise the node's entire
    /// descendant subtree goes with it. An unknown id is a silent no-op.
    pub fn remove_node(&mut self, node_id: &str, move_children_up: bool) {
        let Some(removed) = self.nodes.iter().find(|node| node.id == node_id).cloned() else {
            return;
        };

        if move_children_up && removed.parent_id.is_some() {
            for node in &mut self.nodes {
                if node.parent_id.as_deref() == Some(node_id) {
                    node.parent_id = removed.parent_id.clone();
                    node.level = removed.level;
                }
            }
            self.nodes.retain(|node| node.id != node_id);
        } else {
            let doomed = hierarchy::descendant_ids(node_id, &self.nodes);
            self.nodes
                .retain(|node| node.id != node_id && !doomed.contains(&node.id));
        }

        self.commit(ForestChange::NodeRemoved);
    }

    /// All nodes on the level directly above; empty for level 1 (whose
    /// nodes never have a parent-selection step) and for levels that do not
    /// exist yet.
    pub fn get_possible_parents(&self, level: u32) -> Vec<&OrgNode> {
        if level <= 1
            || !self
                .levels
                .iter()
                .any(|candidate| candidate.level_number == level)
        {
            return Vec::new();
        }
        self.nodes
            .iter()
            .filter(|node| node.level == level - 1)
            .collect()
    }

    pub fn get_node_by_id(&self, id: &str) -> Option<&OrgNode> {
        self.nodes.iter().find(|node| node.id == id)
    }

    /// Rebuilds every derived view, bumps the revision, and publishes one
    /// atomic update. Every mutation funnels through here so no observer
    /// can see the node collection and the level views disagree.
    fn commit(&mut self, change: ForestChange) {
        hierarchy::rebuild_children_index(&mut self.nodes);
        hierarchy::rebuild_level_views(&self.nodes, &mut self.levels);
        self.revision += 1;

        let update = self.build_update(change);
        self.subscribers
            .retain(|update_tx| update_tx.send(update.clone()).is_ok());
        debug!(
            revision = self.revision,
            change = change.label(),
            node_count = self.nodes.len(),
            level_count = self.levels.len(),
            "forest updated"
        );
    }

    fn build_update(&self, change: ForestChange) -> ForestUpdate {
        ForestUpdate {
            positions: self.positions.clone(),
            levels: self.levels.clone(),
            nodes: self.nodes.clone(),
            revision: self.revision,
            change,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::snapshot::OrgChartSnapshot;

    use super::{ForestChange, ForestStore, Level, OrgNode, Position};

    #[test]
    fn new_store_starts_with_a_single_empty_level() {
        let store = ForestStore::new();
        assert_eq!(store.levels().len(), 1);
        assert_eq!(store.levels()[0].level_number, 1);
        assert!(store.org_nodes().is_empty());
    }

    #[test]
    fn add_level_appends_the_next_number() {
        let mut store = ForestStore::new();
        store.add_level();
        store.add_level();

        let numbers = store
            .levels()
            .iter()
            .map(|level| level.level_number)
            .collect::<Vec<_>>();
        assert_eq!(numbers, [1, 2, 3]);
    }

    #[test]
    fn remove_level_one_fails_and_leaves_the_forest_unchanged() {
        let mut store = ForestStore::new();
        store.add_node(node("n1", 1, None));
        let before = store.snapshot();
        let revision_before = store.revision();

        assert!(!store.remove_level(1));
        assert_eq!(store.snapshot(), before);
        assert_eq!(store.revision(), revision_before);
    }

    #[test]
    fn remove_level_of_an_unknown_number_is_rejected() {
        let mut store = ForestStore::new();
        assert!(!store.remove_level(7));
        assert_eq!(store.levels().len(), 1);
    }

    #[test]
    fn remove_level_deletes_its_nodes_with_descendants_and_renumbers() {
        let mut store = ForestStore::new();
        store.add_level();
        store.add_level();
        store.add_level();
        store.add_node(node("n1", 1, None));
        store.add_node(node("n2", 2, Some("n1")));
        store.add_node(node("n3", 3, Some("n2")));
        store.add_node(node("n4", 4, Some("n3")));
        store.add_node(node("other", 4, None));

        assert!(store.remove_level(2));

        let numbers = store
            .levels()
            .iter()
            .map(|level| level.level_number)
            .collect::<Vec<_>>();
        assert_eq!(numbers, [1, 2, 3]);

        let ids = store
            .org_nodes()
            .iter()
            .map(|node| node.id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ids, ["n1", "other"]);
        assert_eq!(
            store.get_node_by_id("other").map(|node| node.level),
            Some(3)
        );
        assert_levels_consistent(&store);
    }

    #[test]
    fn level_views_always_equal_the_node_collection_filter() {
        let mut store = ForestStore::new();
        store.add_level();
        store.add_level();
        store.add_node(node("n1", 1, None));
        store.add_node(node("n2", 2, Some("n1")));
        store.add_node(node("n3", 3, Some("n2")));
        assert_levels_consistent(&store);

        store.remove_node("n2", true);
        assert_levels_consistent(&store);

        store.remove_level(3);
        assert_levels_consistent(&store);

        store.remove_node("n1", false);
        assert_levels_consistent(&store);
    }

    #[test]
    fn remove_node_without_promotion_deletes_the_whole_subtree() {
        let mut store = ForestStore::new();
        store.add_level();
        store.add_level();
        store.add_node(node("n1", 1, None));
        store.add_node(node("n2", 2, Some("n1")));
        store.add_node(node("n3", 3, Some("n2")));
        store.add_node(node("bystander", 1, None));
        store.add_node(node("bystander-child", 2, Some("bystander")));

        let before = store.org_nodes().len();
        store.remove_node("n1", false);

        // Exactly the node and its two descendants are gone; the unrelated
        // tree is untouched.
        assert_eq!(store.org_nodes().len(), before - 3);
        assert!(store.get_node_by_id("bystander").is_some());
        assert!(store.get_node_by_id("bystander-child").is_some());
        assert!(store.get_node_by_id("n1").is_none());
    }

    #[test]
    fn scenario_removing_the_root_without_promotion_empties_the_chain() {
        let mut store = ForestStore::new();
        store.add_level();
        store.add_level();
        store.add_node(node("n1", 1, None));
        store.add_node(node("n2", 2, Some("n1")));
        store.add_node(node("n3", 3, Some("n2")));

        store.remove_node("n1", false);
        assert!(store.org_nodes().is_empty());
    }

    #[test]
    fn promotion_without_a_parent_degrades_to_a_subtree_delete() {
        let mut store = ForestStore::new();
        store.add_level();
        store.add_level();
        store.add_node(node("n1", 1, None));
        store.add_node(node("n2", 2, Some("n1")));
        store.add_node(node("n3", 3, Some("n2")));

        store.remove_node("n1", true);

        // n1 has no parent, so the promotion request degrades to a subtree
        // delete per the observed behavior of the original system.
        assert!(store.org_nodes().is_empty());
    }

    #[test]
    fn promotion_reassigns_children_and_leaves_grandchildren_untouched() {
        let mut store = ForestStore::new();
        store.add_level();
        store.add_level();
        store.add_node(node("n1", 1, None));
        store.add_node(node("n2", 2, Some("n1")));
        store.add_node(node("n3", 3, Some("n2")));

        store.remove_node("n2", true);

        let n3 = store.get_node_by_id("n3").expect("n3 should survive");
        assert_eq!(n3.parent_id.as_deref(), Some("n1"));
        assert_eq!(n3.level, 2);

        store.remove_node("n3", false);
        store.add_level();
        store.add_node(node("n2", 2, Some("n1")));
        store.add_node(node("n3", 3, Some("n2")));
        store.add_node(node("n4", 4, Some("n3")));
        store.remove_node("n2", true);

        // Direct child moves up; the grandchild keeps its old parent and
        // level, the literal non-cascading promotion semantics.
        let n3 = store.get_node_by_id("n3").expect("n3 should survive");
        assert_eq!(n3.parent_id.as_deref(), Some("n1"));
        assert_eq!(n3.level, 2);
        let n4 = store.get_node_by_id("n4").expect("n4 should survive");
        assert_eq!(n4.parent_id.as_deref(), Some("n3"));
        assert_eq!(n4.level, 4);
    }

    #[test]
    fn promotion_decreases_the_node_count_by_exactly_one() {
        let mut store = ForestStore::new();
        store.add_level();
        store.add_level();
        store.add_node(node("n1", 1, None));
        store.add_node(node("n2", 2, Some("n1")));
        store.add_node(node("n3a", 3, Some("n2")));
        store.add_node(node("n3b", 3, Some("n2")));

        let before = store.org_nodes().len();
        store.remove_node("n2", true);
        assert_eq!(store.org_nodes().len(), before - 1);
    }

    #[test]
    fn remove_node_recomputes_the_former_parents_children_cache() {
        let mut store = ForestStore::new();
        store.add_level();
        store.add_node(node("n1", 1, None));
        store.add_node(node("n2", 2, Some("n1")));

        assert_eq!(
            store.get_node_by_id("n1").map(|node| node.children.clone()),
            Some(vec!["n2".to_owned()])
        );

        store.remove_node("n2", false);
        assert_eq!(
            store.get_node_by_id("n1").map(|node| node.children.len()),
            Some(0)
        );
    }

    #[test]
    fn remove_node_with_unknown_id_is_a_silent_no_op() {
        let mut store = ForestStore::new();
        store.add_node(node("n1", 1, None));
        let revision_before = store.revision();

        store.remove_node("missing", false);
        assert_eq!(store.org_nodes().len(), 1);
        assert_eq!(store.revision(), revision_before);
    }

    #[test]
    fn possible_parents_track_the_predecessor_level() {
        let mut store = ForestStore::new();
        assert!(store.get_possible_parents(1).is_empty());
        assert!(store.get_possible_parents(2).is_empty());

        store.add_node(node("n1", 1, None));
        store.add_level();
        store.add_level();
        store.add_node(node("n2", 2, Some("n1")));

        let parents = store.get_possible_parents(3);
        assert_eq!(parents.len(), 1);
        assert_eq!(parents[0].id, "n2");
        assert!(store.get_possible_parents(1).is_empty());
    }

    #[test]
    fn subscribers_receive_the_current_state_then_consistent_updates() {
        let mut store = ForestStore::new();
        store.add_node(node("n1", 1, None));

        let mut update_rx = store.subscribe();
        let initial = update_rx
            .try_recv()
            .expect("subscription should deliver the current state");
        assert_eq!(initial.change, ForestChange::Subscribed);
        assert_eq!(initial.nodes.len(), 1);

        store.add_level();
        store.add_node(node("n2", 2, Some("n1")));

        let mut last = None;
        while let Ok(update) = update_rx.try_recv() {
            for level in &update.levels {
                let expected = update
                    .nodes
                    .iter()
                    .filter(|node| node.level == level.level_number)
                    .cloned()
                    .collect::<Vec<_>>();
                assert_eq!(level.nodes, expected);
            }
            last = Some(update);
        }

        let last = last.expect("mutations should publish updates");
        assert_eq!(last.change, ForestChange::NodeAdded);
        assert_eq!(last.revision, store.revision());
    }

    #[test]
    fn from_snapshot_rebuilds_derived_state_from_the_node_collection() {
        let snapshot = OrgChartSnapshot {
            positions: vec![position("p1", "CEO")],
            // Stored level views are stale on purpose; only the numbers
            // matter, the node lists are recomputed.
            levels: vec![
                Level {
                    level_number: 1,
                    nodes: Vec::new(),
                },
                Level {
                    level_number: 3,
                    nodes: Vec::new(),
                },
            ],
            org_nodes: vec![node("n1", 1, None), node("n2", 2, Some("n1"))],
        };

        let store = ForestStore::from_snapshot(snapshot);
        let numbers = store
            .levels()
            .iter()
            .map(|level| level.level_number)
            .collect::<Vec<_>>();
        assert_eq!(numbers, [1, 2, 3]);
        assert_levels_consistent(&store);
        assert_eq!(
            store.get_node_by_id("n1").map(|node| node.children.clone()),
            Some(vec!["n2".to_owned()])
        );
    }

    #[test]
    fn scenario_possible_parents_appear_once_the_level_exists() {
        let mut store = ForestStore::new();
        store.add_position(position("p1", "CEO"));
        store.add_node(OrgNode {
            id: "n1".to_owned(),
            position_id: "p1".to_owned(),
            position_name: "CEO".to_owned(),
            level: 1,
            parent_id: None,
            children: Vec::new(),
        });

        // Level 2 does not exist yet, so there is nowhere to drop and no
        // parent selection to offer.
        assert!(store.get_possible_parents(2).is_empty());

        store.add_level();
        let parents = store.get_possible_parents(2);
        assert_eq!(parents.len(), 1);
        assert_eq!(parents[0].id, "n1");
    }

    fn assert_levels_consistent(store: &ForestStore) {
        let numbers = store
            .levels()
            .iter()
            .map(|level| level.level_number)
            .collect::<Vec<_>>();
        let expected_numbers = (1..=store.levels().len() as u32).collect::<Vec<_>>();
        assert_eq!(numbers, expected_numbers, "level numbers must be 1..N");

        for level in store.levels() {
            let expected = store
                .org_nodes()
                .iter()
                .filter(|node| node.level == level.level_number)
                .cloned()
                .collect::<Vec<_>>();
            assert_eq!(level.nodes, expected, "level view must equal the filter");
        }
    }

    fn node(id: &str, level: u32, parent_id: Option<&str>) -> OrgNode {
        OrgNode {
            id: id.to_owned(),
            position_id: format!("pos-{id}"),
            position_name: id.to_owned(),
            level,
            parent_id: parent_id.map(str::to_owned),
            children: Vec::new(),
        }
    }

    fn position(id: &str, name: &str) -> Position {
        Position {
            id: id.to_owned(),
            name: name.to_owned(),
            code: name.chars().take(3).collect::<String>().to_uppercase(),
            name_thai: None,
            name_chinese: None,
            name_vietnamese: None,
            section: None,
            salary_type: None,
        }
    }
}
