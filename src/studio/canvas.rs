use std::collections::BTreeSet;

use crate::forest::OrgNode;

use super::connectors::{
    CanvasRect, ConnectorColorAssigner, ConnectorLayout, SurfaceGeometry, layout_connectors,
};

#[derive(Debug, Clone, PartialEq)]
pub enum CanvasOp {
    /// Replace the node collection after a forest mutation. Resets the
    /// connector color assignments and prunes geometry and hover references
    /// to nodes that no longer exist.
    SetForest { nodes: Vec<OrgNode> },
    SetHoveredNode { node_id: Option<String> },
    RecordNodeRect { node_id: String, rect: CanvasRect },
    SetSurfaceRect { rect: CanvasRect },
}

/// Connector drawing state for the rendering surface.
///
/// The surface applies ops as events arrive (forest mutations, hover moves,
/// rectangle measurements from its layout pass) and reads `layout()` once
/// per draw; the layout is recomputed from scratch only when something
/// actually changed since the last draw, so bursts of ops coalesce into a
/// single recompute.
#[derive(Debug, Default)]
pub struct ConnectorCanvas {
    nodes: Vec<OrgNode>,
    geometry: SurfaceGeometry,
    hovered_node_id: Option<String>,
    colors: ConnectorColorAssigner,
    layout: ConnectorLayout,
    dirty: bool,
}

impl ConnectorCanvas {
    pub fn apply(&mut self, op: CanvasOp) {
        match op {
            CanvasOp::SetForest { nodes } => {
                self.nodes = nodes;
                self.colors.reset();
                self.prune_unknown_node_references();
                self.dirty = true;
            }
            CanvasOp::SetHoveredNode { node_id } => {
                let node_id = node_id.filter(|candidate| self.contains_node(candidate));
                if self.hovered_node_id != node_id {
                    self.hovered_node_id = node_id;
                    self.dirty = true;
                }
            }
            CanvasOp::RecordNodeRect { node_id, rect } => {
                if !self.contains_node(&node_id) {
                    return;
                }
                if self.geometry.node_rects.get(&node_id) != Some(&rect) {
                    self.geometry.node_rects.insert(node_id, rect);
                    self.dirty = true;
                }
            }
            CanvasOp::SetSurfaceRect { rect } => {
                if self.geometry.surface != rect {
                    self.geometry.surface = rect;
                    self.dirty = true;
                }
            }
        }
    }

    /// The connector layout for the current draw pass, recomputed in full
    /// if any op changed the inputs since the last call.
    pub fn layout(&mut self) -> &ConnectorLayout {
        if self.dirty {
            self.layout = layout_connectors(
                &self.nodes,
                &self.geometry,
                self.hovered_node_id.as_deref(),
                &mut self.colors,
            );
            self.dirty = false;
        }
        &self.layout
    }

    pub fn nodes(&self) -> &[OrgNode] {
        &self.nodes
    }

    pub fn hovered_node_id(&self) -> Option<&str> {
        self.hovered_node_id.as_deref()
    }

    fn contains_node(&self, node_id: &str) -> bool {
        self.nodes.iter().any(|node| node.id == node_id)
    }

    fn prune_unknown_node_references(&mut self) {
        let known_node_ids = self
            .nodes
            .iter()
            .map(|node| node.id.as_str())
            .collect::<BTreeSet<_>>();

        self.geometry
            .node_rects
            .retain(|node_id, _| known_node_ids.contains(node_id.as_str()));

        if self
            .hovered_node_id
            .as_ref()
            .is_some_and(|node_id| !known_node_ids.contains(node_id.as_str()))
        {
            self.hovered_node_id = None;
        }
    }
}
