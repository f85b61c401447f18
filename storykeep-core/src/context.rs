//! The editing-session handle: store + history + notifications.
//!
//! Every public mutation applies the store operation, records an inverse
//! patch and then notifies the affected ids. Callers hold a
//! `NodesContext` explicitly; there is no ambient current context.

use tracing::debug;

use crate::config::EngineConfig;
use crate::error::{CoreError, CoreResult};
use crate::history::{History, Patch, PatchKind};
use crate::node::{Node, NodeId};
use crate::notify::{NotificationBus, Subscription};
use crate::store::{Direction, NodeStore};
use crate::style::StyleResolver;

/// Explicit handle threaded through every call site of an editing session.
#[derive(Debug)]
pub struct NodesContext {
    store: NodeStore,
    history: History,
    notifications: NotificationBus<Node>,
    config: EngineConfig,
}

impl Default for NodesContext {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

fn set_flag(store: &mut NodeStore, id: Option<&NodeId>, flag: Option<bool>) {
    if let (Some(id), Some(flag)) = (id, flag) {
        store.set_changed(id, flag);
    }
}

impl NodesContext {
    /// Create a context around a store holding only the root.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self::from_store(NodeStore::with_root(), config)
    }

    /// Wrap an existing store.
    #[must_use]
    pub fn from_store(store: NodeStore, config: EngineConfig) -> Self {
        Self {
            store,
            history: History::with_max_size(config.history_max_size),
            notifications: NotificationBus::new(),
            config,
        }
    }

    /// Read access to the store.
    #[must_use]
    pub const fn store(&self) -> &NodeStore {
        &self.store
    }

    /// Mutable store access for bulk paths that bypass history.
    pub fn store_mut(&mut self) -> &mut NodeStore {
        &mut self.store
    }

    /// The undo buffer.
    #[must_use]
    pub const fn history(&self) -> &History {
        &self.history
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The notification bus.
    #[must_use]
    pub const fn notifications(&self) -> &NotificationBus<Node> {
        &self.notifications
    }

    /// Style resolver over the current store.
    #[must_use]
    pub const fn styles(&self) -> StyleResolver<'_> {
        StyleResolver::new(&self.store)
    }

    /// Get a node by ID.
    #[must_use]
    pub fn get_by_id(&self, id: &NodeId) -> Option<&Node> {
        self.store.get_by_id(id)
    }

    /// Ordered child ids of a node.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NodeNotFound`] if `id` is not in the store.
    pub fn get_child_ids(&self, id: &NodeId) -> CoreResult<&[NodeId]> {
        self.store.get_child_ids(id)
    }

    /// Subscribe to notifications for one node.
    pub fn subscribe(
        &self,
        key: NodeId,
        callback: impl Fn(&NodeId, Option<&Node>) + 'static,
    ) -> Subscription<Node> {
        self.notifications.subscribe(key, callback)
    }

    /// Notify subscribers of `id`, passing the node's current state.
    pub fn notify(&self, id: &NodeId) {
        self.notifications.notify(id, self.store.get_by_id(id));
    }

    /// Notify the root, refreshing every root-level subscriber.
    pub fn notify_root(&self) {
        self.notify(&NodeId::root());
    }

    fn notify_all(&self, ids: &[NodeId]) {
        let mut seen = Vec::with_capacity(ids.len());
        for id in ids {
            if !seen.contains(&id) {
                seen.push(id);
                self.notify(id);
            }
        }
    }

    /// Insert nodes, appending under their parents.
    ///
    /// New nodes are marked changed. Notifies each distinct parent.
    ///
    /// # Errors
    ///
    /// See [`NodeStore::add_nodes`]; nothing is recorded on failure.
    pub fn add_nodes(&mut self, nodes: Vec<Node>) -> CoreResult<Vec<NodeId>> {
        self.insert(nodes, None)
    }

    /// Insert nodes at a position under the first node's parent.
    ///
    /// # Errors
    ///
    /// See [`NodeStore::add_nodes_at`].
    pub fn add_nodes_at(&mut self, nodes: Vec<Node>, index: usize) -> CoreResult<Vec<NodeId>> {
        self.insert(nodes, Some(index))
    }

    fn insert(&mut self, mut nodes: Vec<Node>, index: Option<usize>) -> CoreResult<Vec<NodeId>> {
        for node in &mut nodes {
            node.is_changed = true;
        }
        let ids = match index {
            Some(i) => self.store.add_nodes_at(nodes, i)?,
            None => self.store.add_nodes(nodes)?,
        };
        // Snapshot what was actually stored (root ids are rewritten on insert).
        let inserted: Vec<Node> = ids
            .iter()
            .filter_map(|id| self.store.get_by_id(id).cloned())
            .collect();
        let tops: Vec<NodeId> = inserted
            .iter()
            .filter(|n| n.parent_id.as_ref().map_or(true, |p| !ids.contains(p)))
            .map(|n| n.id.clone())
            .collect();
        let parents: Vec<NodeId> = inserted
            .iter()
            .filter(|n| tops.contains(&n.id))
            .map(|n| n.parent_id.clone().unwrap_or_else(NodeId::root))
            .collect();

        let undo_tops = tops.clone();
        let undo_parents = parents.clone();
        let redo_parents = parents.clone();
        self.history.record(Patch::new(
            PatchKind::Add,
            move |store| {
                for id in undo_tops.iter().rev() {
                    store.delete_node(id);
                }
                Ok(undo_parents.clone())
            },
            move |store| {
                match index {
                    Some(i) => store.add_nodes_at(inserted.clone(), i)?,
                    None => store.add_nodes(inserted.clone())?,
                };
                Ok(redo_parents.clone())
            },
        ));
        self.notify_all(&parents);
        Ok(ids)
    }

    /// Replace nodes in place, keeping their linkage.
    ///
    /// Missing ids are skipped. Replaced nodes are marked changed and each
    /// is notified with its new state.
    pub fn modify_nodes(&mut self, mut nodes: Vec<Node>) {
        for node in &mut nodes {
            node.is_changed = true;
        }
        let previous = self.store.modify_nodes(nodes);
        if previous.is_empty() {
            return;
        }
        let ids: Vec<NodeId> = previous.iter().map(|n| n.id.clone()).collect();
        let current: Vec<Node> = ids
            .iter()
            .filter_map(|id| self.store.get_by_id(id).cloned())
            .collect();

        let undo_ids = ids.clone();
        let redo_ids = ids.clone();
        self.history.record(Patch::new(
            PatchKind::Modify,
            move |store| {
                store.modify_nodes(previous.clone());
                Ok(undo_ids.clone())
            },
            move |store| {
                store.modify_nodes(current.clone());
                Ok(redo_ids.clone())
            },
        ));
        self.notify_all(&ids);
    }

    /// Reorder a node one step among its siblings.
    ///
    /// Returns false (nothing recorded, nothing notified) when the move is
    /// refused by [`NodeStore::can_move`].
    pub fn move_node(&mut self, id: &NodeId, direction: Direction) -> bool {
        if !self.store.move_node(id, direction) {
            return false;
        }
        let parent = self.store.get_by_id(id).and_then(|n| n.parent_id.clone());
        let was_changed = parent
            .as_ref()
            .and_then(|p| self.store.set_changed(p, true));

        let target = id.clone();
        let redo_target = id.clone();
        let undo_parent = parent.clone();
        let redo_parent = parent.clone();
        self.history.record(Patch::new(
            PatchKind::Move,
            move |store| {
                store.move_node(&target, direction.reverse());
                set_flag(store, undo_parent.as_ref(), was_changed);
                Ok(undo_parent.iter().cloned().collect())
            },
            move |store| {
                store.move_node(&redo_target, direction);
                set_flag(store, redo_parent.as_ref(), Some(true));
                Ok(redo_parent.iter().cloned().collect())
            },
        ));
        if let Some(parent) = &parent {
            self.notify(parent);
        }
        true
    }

    /// Move a node and its subtree under another parent.
    ///
    /// # Errors
    ///
    /// See [`NodeStore::relocate_node`].
    pub fn relocate_node(
        &mut self,
        id: &NodeId,
        new_parent: &NodeId,
        index: usize,
    ) -> CoreResult<()> {
        let relocation = self.store.relocate_node(id, new_parent, index)?;
        let from_flag = self.store.set_changed(&relocation.from_parent, true);
        let to_flag = self.store.set_changed(&relocation.to_parent, true);
        let parents = vec![relocation.from_parent.clone(), relocation.to_parent.clone()];

        let target = id.clone();
        let redo_target = id.clone();
        let undo_parents = parents.clone();
        let redo_parents = parents.clone();
        let undo_move = relocation.clone();
        self.history.record(Patch::new(
            PatchKind::Relocate,
            move |store| {
                store.relocate_node(&target, &undo_move.from_parent, undo_move.from_index)?;
                set_flag(store, Some(&undo_move.to_parent), to_flag);
                set_flag(store, Some(&undo_move.from_parent), from_flag);
                Ok(undo_parents.clone())
            },
            move |store| {
                store.relocate_node(&redo_target, &relocation.to_parent, relocation.to_index)?;
                set_flag(store, Some(&relocation.from_parent), Some(true));
                set_flag(store, Some(&relocation.to_parent), Some(true));
                Ok(redo_parents.clone())
            },
        ));
        self.notify_all(&parents);
        Ok(())
    }

    /// Delete a node and its subtree.
    ///
    /// Missing ids are a no-op returning false. The surviving parent is
    /// notified; deleting the root notifies the root key.
    pub fn delete_node(&mut self, id: &NodeId) -> bool {
        let Some(removal) = self.store.delete_node(id) else {
            return false;
        };
        let notify_id = removal.parent.clone().unwrap_or_else(NodeId::root);
        let was_changed = removal
            .parent
            .as_ref()
            .and_then(|p| self.store.set_changed(p, true));

        let target = id.clone();
        let undo_notify = notify_id.clone();
        let redo_notify = notify_id.clone();
        self.history.record(Patch::new(
            PatchKind::Delete,
            move |store| {
                store.restore(&removal)?;
                set_flag(store, removal.parent.as_ref(), was_changed);
                Ok(vec![undo_notify.clone()])
            },
            move |store| {
                let parent = store.delete_node(&target).and_then(|r| r.parent);
                set_flag(store, parent.as_ref(), Some(true));
                Ok(vec![redo_notify.clone()])
            },
        ));
        self.notify(&notify_id);
        true
    }

    /// Delete every descendant of a node, keeping the node.
    ///
    /// Returns the number of nodes removed. The node itself is notified.
    pub fn delete_children(&mut self, id: &NodeId) -> usize {
        let removed = self.store.delete_children(id);
        if removed.is_empty() {
            return 0;
        }
        let count = removed.len();
        let was_changed = self.store.set_changed(id, true);

        let target = id.clone();
        let redo_target = id.clone();
        self.history.record(Patch::new(
            PatchKind::DeleteChildren,
            move |store| {
                store.add_nodes(removed.clone())?;
                set_flag(store, Some(&target), was_changed);
                Ok(vec![target.clone()])
            },
            move |store| {
                store.delete_children(&redo_target);
                set_flag(store, Some(&redo_target), Some(true));
                Ok(vec![redo_target.clone()])
            },
        ));
        self.notify(id);
        count
    }

    /// Record a caller-built patch for an edit already applied to the store.
    pub fn record(&mut self, patch: Patch) {
        self.history.record(patch);
    }

    /// Undo one patch and notify what it touched.
    ///
    /// Returns false at the oldest boundary.
    ///
    /// # Errors
    ///
    /// Propagates a patch that can no longer be applied.
    pub fn undo(&mut self) -> CoreResult<bool> {
        if !self.history.can_undo() {
            return Ok(false);
        }
        let touched = self.history.undo(&mut self.store)?;
        self.notify_all(&touched);
        Ok(true)
    }

    /// Redo one patch and notify what it touched.
    ///
    /// Returns false at the newest boundary.
    ///
    /// # Errors
    ///
    /// Propagates a patch that can no longer be applied.
    pub fn redo(&mut self) -> CoreResult<bool> {
        if !self.history.can_redo() {
            return Ok(false);
        }
        let touched = self.history.redo(&mut self.store)?;
        self.notify_all(&touched);
        Ok(true)
    }

    /// Tear the session down: fresh root-only store, empty history, no
    /// subscribers.
    pub fn reset(&mut self) {
        self.store = NodeStore::with_root();
        self.history.clear();
        self.notifications.clear();
        debug!("Context reset");
    }

    /// Require a node to exist.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NodeNotFound`] when it does not.
    pub fn require(&self, id: &NodeId) -> CoreResult<&Node> {
        self.store
            .get_by_id(id)
            .ok_or_else(|| CoreError::NodeNotFound(id.to_string()))
    }
}
