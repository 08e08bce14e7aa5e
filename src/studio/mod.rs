use std::time::Duration;

use anyhow::{Context, Result};
use eframe::egui;
use tokio::runtime::Handle;
use tracing::{info, warn};

use crate::config::StudioSettings;
use crate::forest::{ForestStore, OrgNode, Position};
use crate::ident::{IdGenerator, IdKind};
use crate::snapshot::autosave::{AutosaveConfig, AutosaveHandle, spawn_autosave_worker};
use crate::snapshot::{FileStorage, load_or_default, save_to_storage};

pub mod canvas;
pub mod connectors;

use self::canvas::{CanvasOp, ConnectorCanvas};
use self::connectors::{CanvasRect, NodeHighlightRole, node_highlight_role};

const APP_TITLE: &str = "orgweave studio";
const SECTION_OPTIONS: [&str; 5] = ["IT", "HR", "Finance", "Marketing", "Operations"];

pub fn run_studio(settings: &StudioSettings) -> Result<()> {
    let runtime_handle = Handle::try_current().context("studio requires a tokio runtime")?;

    let storage = FileStorage::new(&settings.storage_path);
    let mut store = load_or_default(&storage);

    let autosave_handle = if settings.autosave {
        let update_rx = store.subscribe();
        Some(spawn_autosave_worker(
            &runtime_handle,
            storage.clone(),
            update_rx,
            AutosaveConfig {
                debounce_interval: Duration::from_millis(settings.autosave_debounce_ms),
                ..AutosaveConfig::default()
            },
        ))
    } else {
        None
    };

    info!(
        storage_path = %settings.storage_path.display(),
        autosave = settings.autosave,
        position_count = store.positions().len(),
        node_count = store.org_nodes().len(),
        "starting org chart studio shell"
    );

    let app = StudioApp::new(store, storage, autosave_handle);
    eframe::run_native(
        APP_TITLE,
        eframe::NativeOptions::default(),
        Box::new(move |_cc| Ok(Box::new(app))),
    )
    .map_err(|error| anyhow::anyhow!("studio UI exited with error: {error}"))
}

/// Payload carried by a position card while it is being dragged.
#[derive(Debug, Clone)]
struct PositionDragPayload {
    position_id: String,
}

#[derive(Debug, Clone, Default)]
struct PositionForm {
    name: String,
    name_thai: String,
    name_chinese: String,
    name_vietnamese: String,
    section: String,
    salary_type: String,
}

impl PositionForm {
    fn new() -> Self {
        Self {
            salary_type: "normal".to_owned(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
struct ParentChoicePrompt {
    position: Position,
    level_number: u32,
}

#[derive(Debug, Clone)]
struct NodeRemovalPrompt {
    node_id: String,
    position_name: String,
    child_count: usize,
    has_parent: bool,
    promote_children: bool,
}

#[derive(Debug, Clone, Copy)]
struct LevelRemovalPrompt {
    level_number: u32,
    node_count: usize,
}

/// Deferred mutations collected while rendering a frame. Applying them
/// after the panels are drawn keeps the store borrow out of the closures
/// and means each frame renders one consistent forest state.
#[derive(Debug, Clone)]
enum StudioAction {
    CreatePosition(Position),
    AddLevel,
    RequestRemoveLevel(u32),
    ConfirmRemoveLevel(u32),
    CancelLevelRemoval,
    DropPosition {
        position_id: String,
        level_number: u32,
    },
    ChooseParent {
        parent_id: String,
    },
    CancelParentChoice,
    RequestRemoveNode(String),
    ConfirmRemoveNode {
        node_id: String,
        move_children_up: bool,
    },
    CancelNodeRemoval,
    SaveAll,
}

struct StudioApp {
    store: ForestStore,
    storage: FileStorage,
    ids: IdGenerator,
    canvas: ConnectorCanvas,
    autosave_handle: Option<AutosaveHandle>,
    position_form: PositionForm,
    pending_parent_choice: Option<ParentChoicePrompt>,
    pending_node_removal: Option<NodeRemovalPrompt>,
    pending_level_removal: Option<LevelRemovalPrompt>,
    status_line: String,
    synced_revision: Option<u64>,
}

impl StudioApp {
    fn new(
        store: ForestStore,
        storage: FileStorage,
        autosave_handle: Option<AutosaveHandle>,
    ) -> Self {
        Self {
            store,
            storage,
            ids: IdGenerator::new(),
            canvas: ConnectorCanvas::default(),
            autosave_handle,
            position_form: PositionForm::new(),
            pending_parent_choice: None,
            pending_node_removal: None,
            pending_level_removal: None,
            status_line: "Studio ready. Drag a position onto a level.".to_owned(),
            synced_revision: None,
        }
    }

    /// Pushes the node collection into the canvas whenever the store has
    /// committed a mutation since the last frame.
    fn sync_canvas_with_store(&mut self) {
        if self.synced_revision != Some(self.store.revision()) {
            self.canvas.apply(CanvasOp::SetForest {
                nodes: self.store.org_nodes().to_vec(),
            });
            self.synced_revision = Some(self.store.revision());
        }
    }

    fn render_palette_pane(&mut self, ui: &mut egui::Ui, actions: &mut Vec<StudioAction>) {
        ui.heading("Positions");
        ui.label("Drag a position onto a level to place it.");
        ui.separator();

        let positions = self.store.positions().to_vec();
        egui::ScrollArea::vertical()
            .max_height((ui.available_height() - 420.0).max(140.0))
            .show(ui, |ui| {
                for position in &positions {
                    let payload = PositionDragPayload {
                        position_id: position.id.clone(),
                    };
                    ui.dnd_drag_source(
                        egui::Id::new(("position-card", &position.id)),
                        payload,
                        |ui| {
                            egui::Frame::group(ui.style()).show(ui, |ui| {
                                ui.label(egui::RichText::new(&position.name).strong());
                                ui.label(
                                    egui::RichText::new(&position.code)
                                        .small()
                                        .color(egui::Color32::GRAY),
                                );
                                if let Some(section) = &position.section {
                                    ui.label(egui::RichText::new(section).small());
                                }
                            });
                        },
                    );
                    ui.add_space(4.0);
                }
            });

        ui.separator();
        self.render_position_form(ui, actions);

        ui.separator();
        ui.horizontal(|ui| {
            if ui.button("Add Level").clicked() {
                actions.push(StudioAction::AddLevel);
            }
            if ui.button("Save").clicked() {
                actions.push(StudioAction::SaveAll);
            }
        });
        ui.add_space(6.0);
        ui.label(format!("Status: {}", self.status_line));
    }

    fn render_position_form(&mut self, ui: &mut egui::Ui, actions: &mut Vec<StudioAction>) {
        ui.label(egui::RichText::new("New Position").strong());
        let form = &mut self.position_form;

        ui.add(egui::TextEdit::singleline(&mut form.name).hint_text("Name (required)"));
        ui.add(egui::TextEdit::singleline(&mut form.name_thai).hint_text("Name (Thai)"));
        ui.add(egui::TextEdit::singleline(&mut form.name_chinese).hint_text("Name (Chinese)"));
        ui.add(
            egui::TextEdit::singleline(&mut form.name_vietnamese).hint_text("Name (Vietnamese)"),
        );

        egui::ComboBox::from_id_salt("position-section")
            .selected_text(if form.section.is_empty() {
                "Select section"
            } else {
                form.section.as_str()
            })
            .show_ui(ui, |ui| {
                ui.selectable_value(&mut form.section, String::new(), "None");
                for section in SECTION_OPTIONS {
                    ui.selectable_value(&mut form.section, section.to_owned(), section);
                }
            });

        ui.horizontal(|ui| {
            ui.label("Salary:");
            ui.radio_value(&mut form.salary_type, "normal".to_owned(), "Normal");
            ui.radio_value(&mut form.salary_type, "commission".to_owned(), "Commission");
        });

        let can_create = !form.name.trim().is_empty();
        if ui
            .add_enabled(can_create, egui::Button::new("Create Position"))
            .clicked()
        {
            let position = self.build_position_from_form();
            self.position_form = PositionForm::new();
            actions.push(StudioAction::CreatePosition(position));
        }
    }

    fn build_position_from_form(&self) -> Position {
        let form = &self.position_form;
        let name = form.name.trim().to_owned();
        Position {
            id: self.ids.new_id(IdKind::Position),
            code: position_code_from_name(&name),
            name,
            name_thai: optional_field(&form.name_thai),
            name_chinese: optional_field(&form.name_chinese),
            name_vietnamese: optional_field(&form.name_vietnamese),
            section: optional_field(&form.section),
            salary_type: Some(form.salary_type.clone()),
        }
    }

    fn render_chart_pane(&mut self, ui: &mut egui::Ui, actions: &mut Vec<StudioAction>) {
        ui.heading("Organization Chart");
        ui.separator();

        // Connectors are painted from the rectangles measured on the
        // previous frame, after that frame's layout settled. Painting
        // before the cards keeps the lines underneath them.
        let surface = ui.max_rect();
        self.canvas.apply(CanvasOp::SetSurfaceRect {
            rect: canvas_rect_from_egui(surface),
        });
        let layout = self.canvas.layout().clone();
        paint_connectors(ui.painter(), surface, &layout);

        let levels = self.store.levels().to_vec();
        let nodes = self.store.org_nodes().to_vec();
        let hovered_before = self.canvas.hovered_node_id().map(str::to_owned);
        let mut frame_hovered: Option<String> = None;

        egui::ScrollArea::vertical().auto_shrink(false).show(ui, |ui| {
            for level in &levels {
                ui.horizontal(|ui| {
                    ui.label(
                        egui::RichText::new(format!("Level {}", level.level_number)).strong(),
                    );
                    ui.label(format!("({} nodes)", level.nodes.len()));
                    if ui.small_button("Delete Level").clicked() {
                        actions.push(StudioAction::RequestRemoveLevel(level.level_number));
                    }
                });

                let frame = egui::Frame::group(ui.style());
                let (_, dropped) =
                    ui.dnd_drop_zone::<PositionDragPayload, ()>(frame, |ui| {
                        if level.nodes.is_empty() {
                            ui.label(
                                egui::RichText::new("Drop a position here")
                                    .italics()
                                    .color(egui::Color32::GRAY),
                            );
                        }
                        ui.horizontal_wrapped(|ui| {
                            for node in &level.nodes {
                                self.render_node_card(
                                    ui,
                                    node,
                                    &nodes,
                                    hovered_before.as_deref(),
                                    &layout,
                                    &mut frame_hovered,
                                    actions,
                                );
                            }
                        });
                    });
                if let Some(payload) = dropped {
                    actions.push(StudioAction::DropPosition {
                        position_id: payload.position_id.clone(),
                        level_number: level.level_number,
                    });
                }
                ui.add_space(28.0);
            }
        });

        self.canvas.apply(CanvasOp::SetHoveredNode {
            node_id: frame_hovered,
        });
    }

    #[allow(clippy::too_many_arguments)]
    fn render_node_card(
        &mut self,
        ui: &mut egui::Ui,
        node: &OrgNode,
        all_nodes: &[OrgNode],
        hovered: Option<&str>,
        layout: &connectors::ConnectorLayout,
        frame_hovered: &mut Option<String>,
        actions: &mut Vec<StudioAction>,
    ) {
        let border_color = parse_hex_color(layout.node_border_color(&node.id));
        let fill = match node_highlight_role(node, hovered, all_nodes) {
            NodeHighlightRole::Hovered => egui::Color32::from_rgb(225, 238, 250),
            NodeHighlightRole::ParentOfHovered => egui::Color32::from_rgb(228, 244, 231),
            NodeHighlightRole::ChildOfHovered => egui::Color32::from_rgb(252, 242, 226),
            NodeHighlightRole::None => ui.style().visuals.extreme_bg_color,
        };

        let response = egui::Frame::group(ui.style())
            .stroke(egui::Stroke::new(1.5, border_color))
            .fill(fill)
            .show(ui, |ui| {
                ui.vertical(|ui| {
                    ui.label(egui::RichText::new(&node.position_name).strong());
                    ui.label(
                        egui::RichText::new(format!("{} children", node.children.len()))
                            .small()
                            .color(egui::Color32::GRAY),
                    );
                    if ui.small_button("Delete").clicked() {
                        actions.push(StudioAction::RequestRemoveNode(node.id.clone()));
                    }
                });
            })
            .response;

        let response = response.interact(egui::Sense::hover());
        if response.hovered() {
            *frame_hovered = Some(node.id.clone());
        }
        self.canvas.apply(CanvasOp::RecordNodeRect {
            node_id: node.id.clone(),
            rect: canvas_rect_from_egui(response.rect),
        });
    }

    fn render_parent_selector(&mut self, ctx: &egui::Context, actions: &mut Vec<StudioAction>) {
        let Some(prompt) = &self.pending_parent_choice else {
            return;
        };
        let possible_parents = self
            .store
            .get_possible_parents(prompt.level_number)
            .iter()
            .map(|node| (node.id.clone(), node.position_name.clone()))
            .collect::<Vec<_>>();

        egui::Window::new("Select Parent")
            .collapsible(false)
            .resizable(false)
            .show(ctx, |ui| {
                ui.label(format!(
                    "Select a parent from Level {} for \"{}\".",
                    prompt.level_number - 1,
                    prompt.position.name
                ));
                ui.add_space(6.0);
                for (parent_id, parent_name) in &possible_parents {
                    if ui.button(parent_name).clicked() {
                        actions.push(StudioAction::ChooseParent {
                            parent_id: parent_id.clone(),
                        });
                    }
                }
                ui.separator();
                if ui.button("Cancel").clicked() {
                    actions.push(StudioAction::CancelParentChoice);
                }
            });
    }

    fn render_node_removal_confirm(
        &mut self,
        ctx: &egui::Context,
        actions: &mut Vec<StudioAction>,
    ) {
        let Some(prompt) = &mut self.pending_node_removal else {
            return;
        };

        egui::Window::new("Delete Node")
            .collapsible(false)
            .resizable(false)
            .show(ctx, |ui| {
                ui.label(format!(
                    "Are you sure you want to delete \"{}\"?",
                    prompt.position_name
                ));
                if prompt.child_count > 0 {
                    ui.label(format!(
                        "This node has {} direct child node(s).",
                        prompt.child_count
                    ));
                    if prompt.has_parent {
                        ui.checkbox(
                            &mut prompt.promote_children,
                            "Move children up to this node's parent",
                        );
                    } else {
                        ui.label("The entire subtree will be deleted.");
                    }
                }
                ui.separator();
                ui.horizontal(|ui| {
                    if ui.button("Delete").clicked() {
                        actions.push(StudioAction::ConfirmRemoveNode {
                            node_id: prompt.node_id.clone(),
                            move_children_up: prompt.promote_children && prompt.has_parent,
                        });
                    }
                    if ui.button("Cancel").clicked() {
                        actions.push(StudioAction::CancelNodeRemoval);
                    }
                });
            });
    }

    fn render_level_removal_confirm(
        &mut self,
        ctx: &egui::Context,
        actions: &mut Vec<StudioAction>,
    ) {
        let Some(prompt) = self.pending_level_removal else {
            return;
        };

        egui::Window::new("Delete Level")
            .collapsible(false)
            .resizable(false)
            .show(ctx, |ui| {
                if prompt.node_count > 0 {
                    ui.label(format!(
                        "Delete Level {}? Its {} node(s) and all of their descendants will be removed.",
                        prompt.level_number, prompt.node_count
                    ));
                } else {
                    ui.label(format!("Delete Level {}?", prompt.level_number));
                }
                ui.separator();
                ui.horizontal(|ui| {
                    if ui.button("Delete").clicked() {
                        actions.push(StudioAction::ConfirmRemoveLevel(prompt.level_number));
                    }
                    if ui.button("Cancel").clicked() {
                        actions.push(StudioAction::CancelLevelRemoval);
                    }
                });
            });
    }

    fn apply_action(&mut self, action: StudioAction) {
        match action {
            StudioAction::CreatePosition(position) => {
                let name = position.name.clone();
                self.store.add_position(position);
                self.status_line = format!("Position \"{name}\" created");
            }
            StudioAction::AddLevel => {
                self.store.add_level();
                let level_count = self.store.levels().len();
                self.status_line = format!("Level {level_count} added");
            }
            StudioAction::RequestRemoveLevel(level_number) => {
                if level_number == 1 {
                    self.status_line = "Level 1 cannot be removed".to_owned();
                } else {
                    let node_count = self
                        .store
                        .org_nodes()
                        .iter()
                        .filter(|node| node.level == level_number)
                        .count();
                    self.pending_level_removal = Some(LevelRemovalPrompt {
                        level_number,
                        node_count,
                    });
                }
            }
            StudioAction::ConfirmRemoveLevel(level_number) => {
                self.pending_level_removal = None;
                if self.store.remove_level(level_number) {
                    self.status_line = format!("Level {level_number} removed");
                } else {
                    self.status_line = format!("Level {level_number} cannot be removed");
                }
            }
            StudioAction::CancelLevelRemoval => self.pending_level_removal = None,
            StudioAction::DropPosition {
                position_id,
                level_number,
            } => self.handle_drop(&position_id, level_number),
            StudioAction::ChooseParent { parent_id } => {
                if let Some(prompt) = self.pending_parent_choice.take() {
                    self.create_node(prompt.position, prompt.level_number, Some(parent_id));
                }
            }
            StudioAction::CancelParentChoice => self.pending_parent_choice = None,
            StudioAction::RequestRemoveNode(node_id) => {
                if let Some(node) = self.store.get_node_by_id(&node_id) {
                    self.pending_node_removal = Some(NodeRemovalPrompt {
                        node_id: node.id.clone(),
                        position_name: node.position_name.clone(),
                        child_count: node.children.len(),
                        has_parent: node.parent_id.is_some(),
                        promote_children: false,
                    });
                }
            }
            StudioAction::ConfirmRemoveNode {
                node_id,
                move_children_up,
            } => {
                self.pending_node_removal = None;
                self.store.remove_node(&node_id, move_children_up);
                self.status_line = "Node deleted".to_owned();
            }
            StudioAction::CancelNodeRemoval => self.pending_node_removal = None,
            StudioAction::SaveAll => match save_to_storage(&mut self.storage, &self.store) {
                Ok(()) => self.status_line = "Chart saved".to_owned(),
                Err(error) => {
                    warn!(error = %error, "manual save failed");
                    self.status_line = format!("Save failed: {error}");
                }
            },
        }
    }

    fn handle_drop(&mut self, position_id: &str, level_number: u32) {
        let Some(position) = self
            .store
            .positions()
            .iter()
            .find(|position| position.id == position_id)
            .cloned()
        else {
            self.status_line = "Dropped position no longer exists".to_owned();
            return;
        };

        if level_number > 1 {
            if self.store.get_possible_parents(level_number).is_empty() {
                self.status_line = format!(
                    "Cannot drop here. Level {} must have nodes first.",
                    level_number - 1
                );
                return;
            }
            self.pending_parent_choice = Some(ParentChoicePrompt {
                position,
                level_number,
            });
        } else {
            self.create_node(position, 1, None);
        }
    }

    fn create_node(&mut self, position: Position, level: u32, parent_id: Option<String>) {
        let node = OrgNode {
            id: self.ids.new_id(IdKind::Node),
            position_id: position.id.clone(),
            position_name: position.name.clone(),
            level,
            parent_id,
            children: Vec::new(),
        };
        self.store.add_node(node);
        self.status_line = format!("{} added to Level {level}", position.name);
    }
}

impl Drop for StudioApp {
    fn drop(&mut self) {
        if let Some(handle) = &self.autosave_handle {
            handle.shutdown();
        }
    }
}

impl eframe::App for StudioApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.sync_canvas_with_store();

        let mut actions = Vec::new();

        egui::SidePanel::left("palette_pane")
            .resizable(true)
            .default_width(300.0)
            .show(ctx, |ui| self.render_palette_pane(ui, &mut actions));

        egui::CentralPanel::default().show(ctx, |ui| self.render_chart_pane(ui, &mut actions));

        self.render_parent_selector(ctx, &mut actions);
        self.render_node_removal_confirm(ctx, &mut actions);
        self.render_level_removal_confirm(ctx, &mut actions);

        for action in actions {
            self.apply_action(action);
        }

        ctx.request_repaint_after(Duration::from_millis(120));
    }
}

fn paint_connectors(
    painter: &egui::Painter,
    surface: egui::Rect,
    layout: &connectors::ConnectorLayout,
) {
    for connector in &layout.connectors {
        let color = parse_hex_color(connector.stroke_color());
        let stroke = egui::Stroke::new(connector.stroke_width(), color);
        let points = connector
            .points
            .map(|point| egui::pos2(surface.left() + point.x, surface.top() + point.y));

        painter.line_segment([points[0], points[1]], stroke);
        painter.line_segment([points[1], points[2]], stroke);
        painter.line_segment([points[2], points[3]], stroke);

        // Arrowhead at the child anchor.
        let tip = points[3];
        painter.add(egui::Shape::convex_polygon(
            vec![
                tip,
                egui::pos2(tip.x - 4.0, tip.y - 7.0),
                egui::pos2(tip.x + 4.0, tip.y - 7.0),
            ],
            color,
            egui::Stroke::NONE,
        ));
    }
}

fn canvas_rect_from_egui(rect: egui::Rect) -> CanvasRect {
    CanvasRect {
        left: rect.left(),
        top: rect.top(),
        width: rect.width(),
        height: rect.height(),
    }
}

fn position_code_from_name(name: &str) -> String {
    name.chars().take(3).collect::<String>().to_uppercase()
}

fn optional_field(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_owned())
    }
}

fn parse_hex_color(hex: &str) -> egui::Color32 {
    let raw = hex.trim_start_matches('#');
    if raw.len() != 6 || !raw.is_ascii() {
        return egui::Color32::GRAY;
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&raw[range], 16);
    match (channel(0..2), channel(2..4), channel(4..6)) {
        (Ok(red), Ok(green), Ok(blue)) => egui::Color32::from_rgb(red, green, blue),
        _ => egui::Color32::GRAY,
    }
}

#[cfg(test)]
mod tests {
    use eframe::egui;

    use super::{optional_field, parse_hex_color, position_code_from_name};

    #[test]
    fn position_code_takes_the_first_three_characters_uppercased() {
        assert_eq!(position_code_from_name("Financer"), "FIN");
        assert_eq!(position_code_from_name("it"), "IT");
        assert_eq!(position_code_from_name(""), "");
    }

    #[test]
    fn position_code_respects_multibyte_names() {
        assert_eq!(position_code_from_name("Ärzte"), "ÄRZ");
    }

    #[test]
    fn optional_field_drops_blank_input() {
        assert_eq!(optional_field("  "), None);
        assert_eq!(optional_field(""), None);
        assert_eq!(optional_field(" IT "), Some("IT".to_owned()));
    }

    #[test]
    fn hex_colors_parse_into_rgb() {
        assert_eq!(
            parse_hex_color("#e57373"),
            egui::Color32::from_rgb(229, 115, 115)
        );
        assert_eq!(
            parse_hex_color("#1976d2"),
            egui::Color32::from_rgb(25, 118, 210)
        );
        assert_eq!(parse_hex_color("not-a-color"), egui::Color32::GRAY);
    }
}
