//! Editor tool-mode state.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::context::NodesContext;
use crate::error::{CoreError, CoreResult};
use crate::node::{NodeId, NodeKind, NodeType};

/// Active editor tool; gates which handlers run on rendered nodes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolMode {
    /// Select elements and open their settings.
    #[default]
    Default,
    /// Drag new elements into markdown.
    Insert,
    /// Edit copy in place.
    TextEdit,
    /// Remove elements on click.
    Eraser,
    /// A settings panel is open.
    Settings,
    /// Insert panes between panes.
    PaneAdd,
    /// Remove panes on click.
    PaneErase,
    /// Edit pane layout.
    PaneLayout,
}

impl ToolMode {
    /// Whether node click handlers are active.
    #[must_use]
    pub const fn handles_click(self) -> bool {
        !matches!(self, Self::Insert | Self::PaneAdd)
    }

    /// Whether blur handlers (committing edited copy) are active.
    #[must_use]
    pub const fn handles_blur(self) -> bool {
        matches!(self, Self::TextEdit)
    }
}

/// What a click did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    /// The current tool does not handle clicks, or the node is gone.
    Ignored,
    /// Settings opened for this node.
    Selected(NodeId),
    /// This node received text focus.
    Focused(NodeId),
    /// This node was deleted.
    Erased(NodeId),
}

/// Tool mode plus the open settings panel, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditorState {
    mode: ToolMode,
    settings_target: Option<NodeId>,
}

impl EditorState {
    /// Editor in the default tool with no panel open.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Active tool.
    #[must_use]
    pub const fn mode(&self) -> ToolMode {
        self.mode
    }

    /// Node whose settings panel is open.
    #[must_use]
    pub const fn settings_target(&self) -> Option<&NodeId> {
        self.settings_target.as_ref()
    }

    /// Switch tools. Leaving settings closes the panel.
    pub fn select_tool(&mut self, mode: ToolMode) {
        if mode != ToolMode::Settings {
            self.settings_target = None;
        }
        debug!(from = ?self.mode, to = ?mode, "Tool selected");
        self.mode = mode;
    }

    /// Open the settings panel for a node.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NodeNotFound`] if the node is gone.
    pub fn open_settings(&mut self, ctx: &NodesContext, id: &NodeId) -> CoreResult<()> {
        ctx.require(id)?;
        self.mode = ToolMode::Settings;
        self.settings_target = Some(id.clone());
        ctx.notify(id);
        Ok(())
    }

    /// Return to the default tool, close settings and refresh everything.
    pub fn escape(&mut self, ctx: &NodesContext) {
        self.mode = ToolMode::Default;
        self.settings_target = None;
        ctx.notify_root();
    }

    /// Whether a node's copy is editable in place right now.
    #[must_use]
    pub fn is_content_editable(&self, ctx: &NodesContext, id: &NodeId) -> bool {
        self.mode == ToolMode::TextEdit
            && ctx
                .get_by_id(id)
                .and_then(|n| n.tag_name())
                .is_some_and(|t| t.is_text_bearing())
    }

    /// Dispatch a click on a rendered node according to the active tool.
    ///
    /// # Errors
    ///
    /// Propagates failures from opening settings.
    pub fn click(&mut self, ctx: &mut NodesContext, id: &NodeId) -> CoreResult<ClickOutcome> {
        if !self.mode.handles_click() {
            return Ok(ClickOutcome::Ignored);
        }
        let Some(target) = ctx.store().clicked_target(id) else {
            return Ok(ClickOutcome::Ignored);
        };
        let pane = ctx
            .get_by_id(&target)
            .filter(|n| n.node_type() == NodeType::Pane)
            .or_else(|| ctx.store().closest_of_kind(&target, NodeType::Pane))
            .map(|n| n.id.clone());

        match self.mode {
            ToolMode::Default | ToolMode::Settings => {
                self.open_settings(ctx, &target)?;
                Ok(ClickOutcome::Selected(target))
            }
            ToolMode::TextEdit => Ok(ClickOutcome::Focused(target)),
            ToolMode::Eraser => {
                let erasable = ctx
                    .get_by_id(&target)
                    .is_some_and(|n| matches!(n.kind, NodeKind::TagElement(_)));
                if !erasable {
                    return Ok(ClickOutcome::Ignored);
                }
                ctx.delete_node(&target);
                if let Some(pane) = &pane {
                    ctx.notify(pane);
                }
                Ok(ClickOutcome::Erased(target))
            }
            ToolMode::PaneErase => {
                let pane = pane.ok_or_else(|| {
                    CoreError::InvalidOperation(format!("{target} is not inside a pane"))
                })?;
                ctx.delete_node(&pane);
                Ok(ClickOutcome::Erased(pane))
            }
            ToolMode::PaneLayout => {
                let pane = pane.ok_or_else(|| {
                    CoreError::InvalidOperation(format!("{target} is not inside a pane"))
                })?;
                self.open_settings(ctx, &pane)?;
                Ok(ClickOutcome::Selected(pane))
            }
            ToolMode::Insert | ToolMode::PaneAdd => Ok(ClickOutcome::Ignored),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Node, PaneData, TagElementData};
    use std::cell::Cell;
    use std::rc::Rc;

    fn ctx() -> NodesContext {
        let mut ctx = NodesContext::default();
        ctx.add_nodes(vec![
            Node::new(&NodeId::root(), NodeKind::Pane(PaneData::default())).with_id("pane"),
            Node::new(
                &"pane".into(),
                NodeKind::TagElement(TagElementData::new("p").with_copy("hi")),
            )
            .with_id("p"),
            Node::new(&"p".into(), NodeKind::TagElement(TagElementData::new("em")))
                .with_id("em"),
        ])
        .expect("nodes");
        ctx
    }

    #[test]
    fn test_tool_mode_capabilities() {
        assert!(ToolMode::Default.handles_click());
        assert!(!ToolMode::Insert.handles_click());
        assert!(ToolMode::TextEdit.handles_blur());
        assert!(!ToolMode::Eraser.handles_blur());
    }

    #[test]
    fn test_tool_mode_serde() {
        let json = serde_json::to_string(&ToolMode::PaneLayout).expect("serialize");
        assert_eq!(json, "\"pane-layout\"");
    }

    #[test]
    fn test_escape_resets_and_notifies_root() {
        let ctx = ctx();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let _sub = ctx.subscribe(NodeId::root(), move |_, _| h.set(h.get() + 1));

        let mut state = EditorState::new();
        state.open_settings(&ctx, &"p".into()).expect("open");
        assert_eq!(state.mode(), ToolMode::Settings);

        state.escape(&ctx);
        assert_eq!(state.mode(), ToolMode::Default);
        assert!(state.settings_target().is_none());
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_content_editable_only_in_text_edit() {
        let ctx = ctx();
        let mut state = EditorState::new();
        assert!(!state.is_content_editable(&ctx, &"p".into()));
        state.select_tool(ToolMode::TextEdit);
        assert!(state.is_content_editable(&ctx, &"p".into()));
        assert!(!state.is_content_editable(&ctx, &"em".into()));
    }

    #[test]
    fn test_click_dispatch() {
        let mut ctx = ctx();
        let mut state = EditorState::new();
        assert_eq!(
            state.click(&mut ctx, &"em".into()).expect("click"),
            ClickOutcome::Selected("p".into())
        );

        state.select_tool(ToolMode::Eraser);
        assert_eq!(
            state.click(&mut ctx, &"em".into()).expect("click"),
            ClickOutcome::Erased("p".into())
        );
        assert!(ctx.get_by_id(&"p".into()).is_none());

        state.select_tool(ToolMode::Insert);
        assert_eq!(
            state.click(&mut ctx, &"pane".into()).expect("click"),
            ClickOutcome::Ignored
        );
    }
}
