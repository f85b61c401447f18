//! The node store: flat id → node map plus ordered parent → children lists.
//!
//! The store is the document model only. It never notifies and never
//! records history; [`crate::NodesContext`] layers both on top.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CoreError, CoreResult};
use crate::node::{Node, NodeId, NodeKind, NodeType, TagName};

/// Sibling reorder direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// One position towards the start.
    Before,
    /// One position towards the end.
    After,
}

impl Direction {
    /// The opposite direction.
    #[must_use]
    pub const fn reverse(self) -> Self {
        match self {
            Self::Before => Self::After,
            Self::After => Self::Before,
        }
    }
}

/// Result of a lookup that may hit a dangling id.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeLookup<'a> {
    /// The node exists.
    Found(&'a Node),
    /// No node with this id; render a "missing node" fallback.
    Missing(&'a NodeId),
}

/// A subtree removed by [`NodeStore::delete_node`], enough to put it back.
#[derive(Debug, Clone, PartialEq)]
pub struct Removal {
    /// Former parent; `None` when the root itself was removed.
    pub parent: Option<NodeId>,
    /// Former position in the parent's child list.
    pub index: usize,
    /// Removed nodes, subtree root first, depth-first.
    pub nodes: Vec<Node>,
}

/// Where a relocated node used to live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relocation {
    /// Previous parent.
    pub from_parent: NodeId,
    /// Previous index under that parent.
    pub from_index: usize,
    /// New parent.
    pub to_parent: NodeId,
    /// Actual index under the new parent after clamping.
    pub to_index: usize,
}

/// Flat map of nodes plus ordered adjacency.
#[derive(Debug, Clone, Default)]
pub struct NodeStore {
    /// All nodes, indexed by ID.
    nodes: HashMap<NodeId, Node>,
    /// Ordered child ids per node. Every stored node has an entry.
    children: HashMap<NodeId, Vec<NodeId>>,
}

impl NodeStore {
    /// Create an empty store without a root.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding only the bootstrap root.
    #[must_use]
    pub fn with_root() -> Self {
        let mut store = Self::new();
        store.insert_unchecked(Node::root(), None);
        store
    }

    /// Number of nodes, root included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the store holds no nodes at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether the store contains a node.
    #[must_use]
    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// The root node, if bootstrapped.
    #[must_use]
    pub fn root(&self) -> Option<&Node> {
        self.nodes.get(&NodeId::root())
    }

    /// Id of the root node, if bootstrapped.
    #[must_use]
    pub fn root_id(&self) -> Option<&NodeId> {
        self.root().map(|n| &n.id)
    }

    /// Get a node by ID.
    #[must_use]
    pub fn get_by_id(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Look a node up, keeping the dangling id for fallback rendering.
    #[must_use]
    pub fn lookup<'a>(&'a self, id: &'a NodeId) -> NodeLookup<'a> {
        self.nodes
            .get(id)
            .map_or(NodeLookup::Missing(id), NodeLookup::Found)
    }

    /// All nodes in unspecified order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Ordered child ids of a node.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NodeNotFound`] if `parent_id` is not in the store.
    pub fn get_child_ids(&self, parent_id: &NodeId) -> CoreResult<&[NodeId]> {
        self.children
            .get(parent_id)
            .map(Vec::as_slice)
            .ok_or_else(|| CoreError::NodeNotFound(parent_id.to_string()))
    }

    /// Children of a node, empty for unknown ids.
    fn child_ids(&self, id: &NodeId) -> &[NodeId] {
        self.children.get(id).map_or(&[][..], Vec::as_slice)
    }

    /// Position of a node in its parent's child list.
    #[must_use]
    pub fn index_in_parent(&self, id: &NodeId) -> Option<usize> {
        let parent = self.nodes.get(id)?.parent_id.as_ref()?;
        self.child_ids(parent).iter().position(|c| c == id)
    }

    /// Ids of a subtree in depth-first pre-order, excluding `id` itself.
    #[must_use]
    pub fn descendant_ids(&self, id: &NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<&NodeId> = self.child_ids(id).iter().rev().collect();
        while let Some(next) = stack.pop() {
            out.push(next.clone());
            stack.extend(self.child_ids(next).iter().rev());
        }
        out
    }

    /// Depth-first flattened subtree, excluding the node itself.
    #[must_use]
    pub fn get_descendants(&self, id: &NodeId) -> Vec<&Node> {
        self.descendant_ids(id)
            .iter()
            .filter_map(|d| self.nodes.get(d))
            .collect()
    }

    /// Whole tree in depth-first pre-order starting at the root.
    #[must_use]
    pub fn walk(&self) -> Vec<&Node> {
        let Some(root) = self.root() else {
            return Vec::new();
        };
        let mut out = vec![root];
        out.extend(self.get_descendants(&root.id));
        out
    }

    /// Direct children whose tag is one of `tags`.
    #[must_use]
    pub fn get_by_tag_names(&self, id: &NodeId, tags: &[TagName]) -> Vec<&Node> {
        self.child_ids(id)
            .iter()
            .filter_map(|c| self.nodes.get(c))
            .filter(|n| n.tag_name().is_some_and(|t| tags.contains(t)))
            .collect()
    }

    /// Nearest strict ancestor of the given kind.
    #[must_use]
    pub fn closest_of_kind(&self, id: &NodeId, kind: NodeType) -> Option<&Node> {
        let mut current = self.nodes.get(id)?.parent_id.as_ref();
        while let Some(parent_id) = current {
            let parent = self.nodes.get(parent_id)?;
            if parent.node_type() == kind {
                return Some(parent);
            }
            current = parent.parent_id.as_ref();
        }
        None
    }

    /// Nearest ancestor-or-self that is not an inline decorator.
    #[must_use]
    pub fn clicked_target(&self, id: &NodeId) -> Option<NodeId> {
        let mut node = self.nodes.get(id)?;
        while node.tag_name().is_some_and(TagName::is_decorator)
            || node.node_type() == NodeType::Text
        {
            node = self.nodes.get(node.parent_id.as_ref()?)?;
        }
        Some(node.id.clone())
    }

    /// Pane children of a page, in order.
    #[must_use]
    pub fn pane_ids(&self, story_fragment_id: &NodeId) -> Vec<NodeId> {
        self.child_ids(story_fragment_id)
            .iter()
            .filter(|c| {
                self.nodes
                    .get(*c)
                    .is_some_and(|n| n.node_type() == NodeType::Pane)
            })
            .cloned()
            .collect()
    }

    /// Page with the given slug.
    #[must_use]
    pub fn story_fragment_by_slug(&self, slug: &str) -> Option<&Node> {
        self.nodes
            .values()
            .find(|n| matches!(&n.kind, NodeKind::StoryFragment(data) if data.slug == slug))
    }

    /// Context pane with the given slug. Page panes never match.
    #[must_use]
    pub fn context_pane_by_slug(&self, slug: &str) -> Option<&Node> {
        self.nodes.values().find(|n| {
            matches!(&n.kind, NodeKind::Pane(data) if data.is_context_pane && data.slug == slug)
        })
    }

    /// Impressions attached directly to any of the given panes, grouped by
    /// pane in the order given.
    #[must_use]
    pub fn impressions_for_panes(&self, pane_ids: &[NodeId]) -> Vec<&Node> {
        pane_ids
            .iter()
            .flat_map(|pane| self.child_ids(pane).iter())
            .filter_map(|c| self.nodes.get(c))
            .filter(|n| n.node_type() == NodeType::Impression)
            .collect()
    }

    /// Whether `ancestor` is `id` or one of its ancestors.
    #[must_use]
    pub fn is_ancestor_or_self(&self, ancestor: &NodeId, id: &NodeId) -> bool {
        let mut current = Some(id);
        while let Some(cur) = current {
            if cur == ancestor {
                return true;
            }
            current = self.nodes.get(cur).and_then(|n| n.parent_id.as_ref());
        }
        false
    }

    fn insert_unchecked(&mut self, node: Node, index: Option<usize>) {
        if let Some(parent) = &node.parent_id {
            let siblings = self.children.entry(parent.clone()).or_default();
            match index {
                Some(i) => siblings.insert(i.min(siblings.len()), node.id.clone()),
                None => siblings.push(node.id.clone()),
            }
        }
        self.children.entry(node.id.clone()).or_default();
        self.nodes.insert(node.id.clone(), node);
    }

    fn validate_batch(&self, nodes: &mut [Node]) -> CoreResult<()> {
        let mut batch: HashSet<NodeId> = HashSet::new();
        for node in nodes.iter_mut() {
            if matches!(node.kind, NodeKind::Root) {
                node.id = NodeId::root();
                node.parent_id = None;
            } else if node.id.is_root() {
                return Err(CoreError::InvalidOperation(
                    "reserved root id used by a non-root node".to_string(),
                ));
            }
            if self.nodes.contains_key(&node.id) || batch.contains(&node.id) {
                if node.id.is_root() {
                    return Err(CoreError::InvalidOperation(
                        "store already has a root".to_string(),
                    ));
                }
                return Err(CoreError::DuplicateNode(node.id.to_string()));
            }
            match &node.parent_id {
                None if !node.id.is_root() => {
                    return Err(CoreError::InvalidOperation(format!(
                        "node {} has no parent",
                        node.id
                    )));
                }
                Some(parent) if !self.nodes.contains_key(parent) && !batch.contains(parent) => {
                    return Err(CoreError::NodeNotFound(parent.to_string()));
                }
                _ => {}
            }
            batch.insert(node.id.clone());
        }
        Ok(())
    }

    /// Insert nodes, appending each to its parent's child list.
    ///
    /// The batch is validated as a whole before anything is inserted: a
    /// parent may be an existing node or an earlier node in the batch. A
    /// `Root` node is always stored under the reserved root id.
    ///
    /// # Errors
    ///
    /// Returns an error for duplicate ids, missing parents or a second root;
    /// the store is left untouched.
    pub fn add_nodes(&mut self, nodes: Vec<Node>) -> CoreResult<Vec<NodeId>> {
        self.insert_batch(nodes, None)
    }

    /// Insert nodes at a position.
    ///
    /// Nodes sharing the first node's parent are placed consecutively from
    /// `index` (clamped to the child count); the rest are appended to their
    /// own parents.
    ///
    /// # Errors
    ///
    /// Same as [`NodeStore::add_nodes`].
    pub fn add_nodes_at(&mut self, nodes: Vec<Node>, index: usize) -> CoreResult<Vec<NodeId>> {
        self.insert_batch(nodes, Some(index))
    }

    fn insert_batch(
        &mut self,
        mut nodes: Vec<Node>,
        index: Option<usize>,
    ) -> CoreResult<Vec<NodeId>> {
        self.validate_batch(&mut nodes)?;
        let anchor = nodes.first().and_then(|n| n.parent_id.clone());
        let mut next_index = index;
        let mut ids = Vec::with_capacity(nodes.len());
        for node in nodes {
            ids.push(node.id.clone());
            let at = match (&anchor, next_index) {
                (Some(anchor), Some(i)) if node.parent_id.as_ref() == Some(anchor) => {
                    let len = self.child_ids(anchor).len();
                    next_index = Some(i.min(len) + 1);
                    Some(i.min(len))
                }
                _ => None,
            };
            self.insert_unchecked(node, at);
        }
        debug!(count = ids.len(), "Added nodes");
        Ok(ids)
    }

    /// Replace existing nodes by id.
    ///
    /// Linkage is preserved: the stored `parent_id` wins over the incoming
    /// one. Ids no longer in the store are skipped. Returns the replaced
    /// versions.
    pub fn modify_nodes(&mut self, nodes: Vec<Node>) -> Vec<Node> {
        let mut previous = Vec::with_capacity(nodes.len());
        for mut node in nodes {
            let Some(existing) = self.nodes.get_mut(&node.id) else {
                warn!(id = %node.id, "Skipping modify of missing node");
                continue;
            };
            node.parent_id.clone_from(&existing.parent_id);
            previous.push(std::mem::replace(existing, node));
        }
        previous
    }

    /// Set a node's dirty flag, returning the previous value.
    pub fn set_changed(&mut self, id: &NodeId, changed: bool) -> Option<bool> {
        let node = self.nodes.get_mut(id)?;
        Some(std::mem::replace(&mut node.is_changed, changed))
    }

    /// Clear every dirty flag, typically after a successful save.
    pub fn mark_all_saved(&mut self) {
        for node in self.nodes.values_mut() {
            node.is_changed = false;
        }
    }

    /// Whether a node may move one step in `direction` among its siblings.
    ///
    /// False at either boundary, and for an `li` holding a `code` child
    /// whose container is not a `ul`/`ol`.
    #[must_use]
    pub fn can_move(&self, id: &NodeId, direction: Direction) -> bool {
        let Some(node) = self.nodes.get(id) else {
            return false;
        };
        let Some(parent_id) = node.parent_id.as_ref() else {
            return false;
        };
        if node.tag_name() == Some(&TagName::Li)
            && !self.get_by_tag_names(id, &[TagName::Code]).is_empty()
        {
            let container_is_list = self
                .nodes
                .get(parent_id)
                .and_then(Node::tag_name)
                .is_some_and(TagName::is_list_container);
            if !container_is_list {
                return false;
            }
        }
        let siblings = self.child_ids(parent_id);
        let Some(pos) = siblings.iter().position(|s| s == id) else {
            return false;
        };
        match direction {
            Direction::Before => pos > 0,
            Direction::After => pos + 1 < siblings.len(),
        }
    }

    /// Swap a node with its neighbour in `direction`.
    ///
    /// Returns false without changes when [`NodeStore::can_move`] refuses.
    pub fn move_node(&mut self, id: &NodeId, direction: Direction) -> bool {
        if !self.can_move(id, direction) {
            warn!(%id, ?direction, "Move refused");
            return false;
        }
        let Some(parent_id) = self.nodes.get(id).and_then(|n| n.parent_id.clone()) else {
            return false;
        };
        let Some(siblings) = self.children.get_mut(&parent_id) else {
            return false;
        };
        let Some(pos) = siblings.iter().position(|s| s == id) else {
            return false;
        };
        let other = match direction {
            Direction::Before => pos - 1,
            Direction::After => pos + 1,
        };
        siblings.swap(pos, other);
        debug!(%id, ?direction, "Moved node");
        true
    }

    /// Move a node and its subtree under another parent.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NodeNotFound`] for a missing node or parent, and
    /// [`CoreError::InvalidOperation`] when moving the root or moving a node
    /// into its own subtree.
    pub fn relocate_node(
        &mut self,
        id: &NodeId,
        new_parent: &NodeId,
        index: usize,
    ) -> CoreResult<Relocation> {
        let node = self
            .nodes
            .get(id)
            .ok_or_else(|| CoreError::NodeNotFound(id.to_string()))?;
        let Some(from_parent) = node.parent_id.clone() else {
            return Err(CoreError::InvalidOperation("cannot relocate the root".to_string()));
        };
        if !self.nodes.contains_key(new_parent) {
            return Err(CoreError::NodeNotFound(new_parent.to_string()));
        }
        if self.is_ancestor_or_self(id, new_parent) {
            return Err(CoreError::InvalidOperation(format!(
                "cannot move {id} into its own subtree"
            )));
        }
        let from_index = self.index_in_parent(id).unwrap_or(0);
        if let Some(siblings) = self.children.get_mut(&from_parent) {
            siblings.retain(|s| s != id);
        }
        let targets = self.children.entry(new_parent.clone()).or_default();
        let to_index = index.min(targets.len());
        targets.insert(to_index, id.clone());
        if let Some(node) = self.nodes.get_mut(id) {
            node.parent_id = Some(new_parent.clone());
        }
        debug!(%id, %new_parent, to_index, "Relocated node");
        Ok(Relocation {
            from_parent,
            from_index,
            to_parent: new_parent.clone(),
            to_index,
        })
    }

    fn remove_ids(&mut self, ids: &[NodeId]) -> Vec<Node> {
        ids.iter()
            .filter_map(|d| {
                self.children.remove(d);
                self.nodes.remove(d)
            })
            .collect()
    }

    /// Remove a node and its whole subtree.
    ///
    /// Missing ids are a no-op returning `None`.
    pub fn delete_node(&mut self, id: &NodeId) -> Option<Removal> {
        let node = self.nodes.get(id)?;
        let parent = node.parent_id.clone();
        let index = self.index_in_parent(id).unwrap_or(0);
        if let Some(siblings) = parent.as_ref().and_then(|p| self.children.get_mut(p)) {
            siblings.retain(|s| s != id);
        }
        let mut ids = vec![id.clone()];
        ids.extend(self.descendant_ids(id));
        let nodes = self.remove_ids(&ids);
        debug!(%id, removed = nodes.len(), "Deleted node");
        Some(Removal {
            parent,
            index,
            nodes,
        })
    }

    /// Remove every descendant of a node, keeping the node itself.
    ///
    /// Returns the removed nodes depth-first; empty for missing ids.
    pub fn delete_children(&mut self, id: &NodeId) -> Vec<Node> {
        if !self.nodes.contains_key(id) {
            return Vec::new();
        }
        let ids = self.descendant_ids(id);
        let nodes = self.remove_ids(&ids);
        if let Some(children) = self.children.get_mut(id) {
            children.clear();
        }
        debug!(%id, removed = nodes.len(), "Deleted children");
        nodes
    }

    /// Put back a subtree taken by [`NodeStore::delete_node`].
    ///
    /// # Errors
    ///
    /// Fails if the former parent is gone or any id has been reused.
    pub fn restore(&mut self, removal: &Removal) -> CoreResult<()> {
        self.insert_batch(removal.nodes.clone(), Some(removal.index)).map(|_| ())
    }
}
