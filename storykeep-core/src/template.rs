//! Template payloads and their instantiation into fresh nodes.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::context::NodesContext;
use crate::error::{CoreError, CoreResult};
use crate::node::{MarkdownData, Node, NodeId, NodeKind, NodeType, PaneData, TagElementData};

/// A nested node payload without ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateNode {
    /// Kind and payload of this node.
    pub kind: NodeKind,
    /// Children in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TemplateNode>,
}

impl TemplateNode {
    /// Leaf template.
    #[must_use]
    pub const fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            children: Vec::new(),
        }
    }

    /// Append a child template.
    #[must_use]
    pub fn with_child(mut self, child: Self) -> Self {
        self.children.push(child);
        self
    }

    /// A tag element with copy.
    #[must_use]
    pub fn tag(tag_name: &str, copy: &str) -> Self {
        Self::new(NodeKind::TagElement(
            TagElementData::new(tag_name).with_copy(copy),
        ))
    }

    /// Pane → markdown → heading + paragraph.
    #[must_use]
    pub fn basic_pane(title: &str) -> Self {
        let pane = PaneData {
            title: title.to_string(),
            slug: slugify(title),
            ..PaneData::default()
        };
        Self::new(NodeKind::Pane(pane)).with_child(
            Self::new(NodeKind::Markdown(MarkdownData::default()))
                .with_child(Self::tag("h2", title))
                .with_child(Self::tag("p", "")),
        )
    }

    /// Number of nodes in this template.
    #[must_use]
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(Self::size).sum::<usize>()
    }
}

fn slugify(title: &str) -> String {
    let slug: String = title
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    slug.split('-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Flatten a template depth-first under `parent_id`, assigning fresh ids.
///
/// Markdown fragments without a body id get a fresh one.
#[must_use]
pub fn instantiate(template: &TemplateNode, parent_id: &NodeId) -> Vec<Node> {
    let mut out = Vec::with_capacity(template.size());
    let mut stack = vec![(template, parent_id.clone())];
    while let Some((current, parent)) = stack.pop() {
        let mut kind = current.kind.clone();
        if let NodeKind::Markdown(data) = &mut kind {
            if data.markdown_id.is_empty() {
                data.markdown_id = NodeId::generate().to_string();
            }
        }
        let node = Node::new(&parent, kind);
        for child in current.children.iter().rev() {
            stack.push((child, node.id.clone()));
        }
        out.push(node);
    }
    out
}

/// Where to put an inserted element among a markdown fragment's children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertPosition {
    /// After the last child.
    End,
    /// Immediately before an existing child.
    Before(NodeId),
    /// Immediately after an existing child.
    After(NodeId),
}

impl NodesContext {
    /// Instantiate a pane design under a page, or under the root as a
    /// context pane.
    ///
    /// `index` places the pane among the owner's children; `None` appends.
    /// Undoable; notifies the owner.
    ///
    /// # Errors
    ///
    /// Fails if the owner is missing or cannot hold panes, or if the
    /// template is not a pane.
    pub fn add_template_pane(
        &mut self,
        owner_id: &NodeId,
        template: &TemplateNode,
        index: Option<usize>,
    ) -> CoreResult<NodeId> {
        let owner = self.require(owner_id)?;
        if !matches!(
            owner.node_type(),
            NodeType::StoryFragment | NodeType::Root
        ) {
            return Err(CoreError::InvalidOperation(format!(
                "{} cannot hold panes",
                owner.node_type()
            )));
        }
        if !matches!(template.kind, NodeKind::Pane(_)) {
            return Err(CoreError::InvalidOperation(
                "pane template must start with a pane".to_string(),
            ));
        }
        let nodes = instantiate(template, owner_id);
        let pane_id = nodes
            .first()
            .map(|n| n.id.clone())
            .ok_or_else(|| CoreError::InvalidOperation("empty template".to_string()))?;
        match index {
            Some(i) => self.add_nodes_at(nodes, i)?,
            None => self.add_nodes(nodes)?,
        };
        debug!(%pane_id, %owner_id, "Added template pane");
        Ok(pane_id)
    }

    /// Instantiate an element subtree inside a markdown fragment.
    ///
    /// Undoable; notifies the fragment and its enclosing pane.
    ///
    /// # Errors
    ///
    /// Fails if `markdown_id` is not a markdown fragment or the anchor of
    /// `position` is not one of its children.
    pub fn add_template_node(
        &mut self,
        markdown_id: &NodeId,
        template: &TemplateNode,
        position: &InsertPosition,
    ) -> CoreResult<NodeId> {
        let markdown = self.require(markdown_id)?;
        if markdown.node_type() != NodeType::Markdown {
            return Err(CoreError::InvalidOperation(format!(
                "{markdown_id} is not a markdown fragment"
            )));
        }
        let siblings = self.get_child_ids(markdown_id)?;
        let index = match position {
            InsertPosition::End => siblings.len(),
            InsertPosition::Before(anchor) | InsertPosition::After(anchor) => {
                let pos = siblings
                    .iter()
                    .position(|s| s == anchor)
                    .ok_or_else(|| CoreError::NodeNotFound(anchor.to_string()))?;
                if matches!(position, InsertPosition::After(_)) {
                    pos + 1
                } else {
                    pos
                }
            }
        };
        let nodes = instantiate(template, markdown_id);
        let new_id = nodes
            .first()
            .map(|n| n.id.clone())
            .ok_or_else(|| CoreError::InvalidOperation("empty template".to_string()))?;
        self.add_nodes_at(nodes, index)?;
        if let Some(pane) = self
            .store()
            .closest_of_kind(markdown_id, NodeType::Pane)
            .map(|p| p.id.clone())
        {
            self.notify(&pane);
        }
        Ok(new_id)
    }
}
