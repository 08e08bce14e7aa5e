use std::collections::BTreeMap;

use crate::forest::OrgNode;

/// Fixed connector palette, cycled round-robin as edges first appear.
/// Colors repeat once more edges exist than palette entries.
pub const CONNECTOR_PALETTE: [&str; 8] = [
    "#e57373", "#64b5f6", "#81c784", "#ffd54f", "#ba68c8", "#4db6ac", "#ffb74d", "#90a4ae",
];

pub const HIGHLIGHT_COLOR: &str = "#1976d2";
pub const FALLBACK_NODE_BORDER_COLOR: &str = "#e91e63";
pub const CONNECTOR_STROKE_WIDTH: f32 = 2.5;
pub const HIGHLIGHT_STROKE_WIDTH: f32 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CanvasPoint {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CanvasRect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl CanvasRect {
    pub fn bottom_center(&self) -> CanvasPoint {
        CanvasPoint {
            x: self.left + self.width / 2.0,
            y: self.top + self.height,
        }
    }

    pub fn top_center(&self) -> CanvasPoint {
        CanvasPoint {
            x: self.left + self.width / 2.0,
            y: self.top,
        }
    }
}

/// Screen-space rectangles supplied by the rendering surface after its
/// layout pass: one per rendered node, plus the surface itself.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SurfaceGeometry {
    pub surface: CanvasRect,
    pub node_rects: BTreeMap<String, CanvasRect>,
}

/// One parent-to-child connector: a three-segment orthogonal polyline in
/// surface-local coordinates, from the parent's bottom-center anchor to the
/// child's top-center anchor.
#[derive(Debug, Clone, PartialEq)]
pub struct Connector {
    pub parent_id: String,
    pub child_id: String,
    pub points: [CanvasPoint; 4],
    pub color: &'static str,
    pub highlighted: bool,
}

impl Connector {
    pub fn stroke_color(&self) -> &'static str {
        if self.highlighted {
            HIGHLIGHT_COLOR
        } else {
            self.color
        }
    }

    pub fn stroke_width(&self) -> f32 {
        if self.highlighted {
            HIGHLIGHT_STROKE_WIDTH
        } else {
            CONNECTOR_STROKE_WIDTH
        }
    }
}

/// Assigns each `(parent, child)` edge a palette color the first time it is
/// drawn and keeps that assignment across redraws. Hover highlighting never
/// touches the memoized assignment. `reset` clears everything; the studio
/// calls it when the node collection itself changes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectorColorAssigner {
    assigned: BTreeMap<(String, String), usize>,
}

impl ConnectorColorAssigner {
    pub fn color_for(&mut self, parent_id: &str, child_id: &str) -> &'static str {
        let key = (parent_id.to_owned(), child_id.to_owned());
        let next_index = self.assigned.len() % CONNECTOR_PALETTE.len();
        let index = *self.assigned.entry(key).or_insert(next_index);
        CONNECTOR_PALETTE[index]
    }

    pub fn reset(&mut self) {
        self.assigned.clear();
    }

    pub fn assigned_count(&self) -> usize {
        self.assigned.len()
    }
}

/// The full recomputed connector set for one draw pass, plus the per-node
/// border colors derived from each child's incoming edge.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConnectorLayout {
    pub connectors: Vec<Connector>,
    pub node_border_colors: BTreeMap<String, &'static str>,
}

impl ConnectorLayout {
    pub fn node_border_color(&self, node_id: &str) -> &'static str {
        self.node_border_colors
            .get(node_id)
            .copied()
            .unwrap_or(FALLBACK_NODE_BORDER_COLOR)
    }
}

/// Computes every drawable connector from scratch. Edges whose parent or
/// child rectangle is missing are skipped without error; freshly added nodes
/// race the rendering surface's layout pass and pick up their connector on
/// the next draw.
pub fn layout_connectors(
    nodes: &[OrgNode],
    geometry: &SurfaceGeometry,
    hovered_node_id: Option<&str>,
    colors: &mut ConnectorColorAssigner,
) -> ConnectorLayout {
    let mut layout = ConnectorLayout::default();

    for node in nodes {
        let Some(parent_id) = node.parent_id.as_deref() else {
            continue;
        };
        let (Some(parent_rect), Some(child_rect)) = (
            geometry.node_rects.get(parent_id),
            geometry.node_rects.get(&node.id),
        ) else {
            continue;
        };

        let start = to_surface_local(parent_rect.bottom_center(), geometry.surface);
        let end = to_surface_local(child_rect.top_center(), geometry.surface);
        let mid_y = start.y + (end.y - start.y) / 2.0;

        let color = colors.color_for(parent_id, &node.id);
        layout.node_border_colors.insert(node.id.clone(), color);

        let highlighted =
            hovered_node_id.is_some_and(|hovered| hovered == parent_id || hovered == node.id);

        layout.connectors.push(Connector {
            parent_id: parent_id.to_owned(),
            child_id: node.id.clone(),
            points: [
                start,
                CanvasPoint {
                    x: start.x,
                    y: mid_y,
                },
                CanvasPoint { x: end.x, y: mid_y },
                end,
            ],
            color,
            highlighted,
        });
    }

    layout
}

fn to_surface_local(point: CanvasPoint, surface: CanvasRect) -> CanvasPoint {
    CanvasPoint {
        x: point.x - surface.left,
        y: point.y - surface.top,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeHighlightRole {
    Hovered,
    ParentOfHovered,
    ChildOfHovered,
    None,
}

/// Classifies a node relative to the hovered one for card styling: the
/// hovered node itself, its parent, one of its direct children, or nothing.
pub fn node_highlight_role(
    node: &OrgNode,
    hovered_node_id: Option<&str>,
    nodes: &[OrgNode],
) -> NodeHighlightRole {
    let Some(hovered) = hovered_node_id else {
        return NodeHighlightRole::None;
    };
    if node.id == hovered {
        return NodeHighlightRole::Hovered;
    }
    if node.parent_id.as_deref() == Some(hovered) {
        return NodeHighlightRole::ChildOfHovered;
    }
    if nodes
        .iter()
        .find(|candidate| candidate.id == hovered)
        .is_some_and(|candidate| candidate.parent_id.as_deref() == Some(node.id.as_str()))
    {
        return NodeHighlightRole::ParentOfHovered;
    }
    NodeHighlightRole::None
}
