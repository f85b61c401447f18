//! Flattening the node tree to row data and rebuilding it.
//!
//! ## Shape
//!
//! ```text
//! root
//! ├── TractStack ──► StoryFragment ──► Pane ──► (payload nodes)
//! ├── Menu / File / Resource
//! ├── StoryFragment (no container)
//! └── Pane (context pane)
//! ```
//!
//! Pane descendants travel inside the pane row's `options_payload`; pages
//! and panes are linked through weighted `storyfragment_panes` rows.

use std::collections::{HashMap, HashSet};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::de::IgnoredAny;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::context::NodesContext;
use crate::error::{CoreError, CoreResult};
use crate::node::{
    BackgroundSource, FileData, MenuData, Node, NodeId, NodeKind, NodeType, ResourceData,
    StoryFragmentData, TagName, TagPayload, TractStackData,
};
use crate::rows::{
    join_id, FileMarkdownRow, FilePaneRow, FileRow, MarkdownRow, MenuRow, PanePayload, PaneRow,
    ResourceRow, RootOrderRow, RowData, StoryFragmentPaneRow, StoryFragmentRow, TractStackRow,
    SCHEMA_VERSION,
};
use crate::store::NodeStore;

/// Current time in milliseconds since epoch.
#[must_use]
#[allow(clippy::cast_possible_truncation)] // Timestamps won't exceed u64 for billions of years
pub fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Validated nodes ready for [`load`], in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadData {
    nodes: Vec<Node>,
}

impl LoadData {
    /// The nodes, parents before children.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether there is nothing to load.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

struct Writer<'a> {
    store: &'a NodeStore,
    changed_only: bool,
    stamp: Option<u64>,
    rows: RowData,
}

impl<'a> Writer<'a> {
    fn new(store: &'a NodeStore, changed_only: bool, stamp: Option<u64>) -> Self {
        Self {
            store,
            changed_only,
            stamp,
            rows: RowData::default(),
        }
    }

    fn include(&self, node: &Node) -> bool {
        !self.changed_only || node.is_changed
    }

    fn fill(&self, value: Option<u64>) -> Option<u64> {
        value.or(self.stamp)
    }

    fn children(&self, id: &NodeId) -> CoreResult<Vec<&'a Node>> {
        Ok(self
            .store
            .get_child_ids(id)?
            .iter()
            .filter_map(|c| self.store.get_by_id(c))
            .collect())
    }

    fn run(mut self) -> CoreResult<RowData> {
        let Some(root) = self.store.root() else {
            return Ok(self.rows);
        };
        let top = self.children(&root.id)?;
        if !self.changed_only || root.is_changed || top.iter().any(|n| n.is_changed) {
            self.rows.root_order = top
                .iter()
                .enumerate()
                .map(|(weight, node)| RootOrderRow {
                    node_id: node.id.to_string(),
                    weight: u32::try_from(weight).unwrap_or(u32::MAX),
                })
                .collect();
        }
        for node in top {
            match &node.kind {
                NodeKind::TractStack(data) => self.tractstack(node, data)?,
                NodeKind::StoryFragment(data) => self.story_fragment(node, data, None)?,
                NodeKind::Pane(_) => {
                    self.pane(node)?;
                }
                NodeKind::Menu(data) => self.menu(node, data),
                NodeKind::File(data) => self.file(node, data),
                NodeKind::Resource(data) => self.resource(node, data),
                _ => {
                    return Err(CoreError::InvalidOperation(format!(
                        "{} {} cannot be persisted under the root",
                        node.node_type(),
                        node.id
                    )))
                }
            }
        }
        Ok(self.rows)
    }

    fn tractstack(&mut self, node: &Node, data: &TractStackData) -> CoreResult<()> {
        if self.include(node) {
            self.rows.tractstacks.push(TractStackRow {
                id: node.id.to_string(),
                title: data.title.clone(),
                slug: data.slug.clone(),
                social_image_path: data.social_image_path.clone(),
            });
        }
        for child in self.children(&node.id)? {
            match &child.kind {
                NodeKind::StoryFragment(sf) => self.story_fragment(child, sf, Some(&node.id))?,
                _ => {
                    return Err(CoreError::InvalidOperation(format!(
                        "{} {} cannot be persisted under a tractstack",
                        child.node_type(),
                        child.id
                    )))
                }
            }
        }
        Ok(())
    }

    fn story_fragment(
        &mut self,
        node: &Node,
        data: &StoryFragmentData,
        tractstack: Option<&NodeId>,
    ) -> CoreResult<()> {
        let page_included = self.include(node);
        if page_included {
            self.rows.storyfragments.push(StoryFragmentRow {
                id: node.id.to_string(),
                tractstack_id: tractstack.map(ToString::to_string),
                title: data.title.clone(),
                slug: data.slug.clone(),
                tailwind_bg_colour: data.tailwind_bg_colour.clone(),
                menu_id: data.menu_id.as_ref().map(ToString::to_string),
                social_image_path: data.social_image_path.clone(),
                created: self.fill(data.created),
                changed: self.fill(data.changed),
            });
        }
        for (weight, pane) in self.children(&node.id)?.into_iter().enumerate() {
            if pane.node_type() != NodeType::Pane {
                return Err(CoreError::InvalidOperation(format!(
                    "{} {} cannot be persisted on a page",
                    pane.node_type(),
                    pane.id
                )));
            }
            let pane_included = self.pane(pane)?;
            if page_included || pane_included {
                self.rows.storyfragment_panes.push(StoryFragmentPaneRow {
                    id: join_id(node.id.as_str(), pane.id.as_str()),
                    storyfragment_id: node.id.to_string(),
                    pane_id: pane.id.to_string(),
                    weight: u32::try_from(weight).unwrap_or(u32::MAX),
                });
            }
        }
        Ok(())
    }

    /// Emits the pane and its payload; returns whether it was emitted.
    fn pane(&mut self, node: &Node) -> CoreResult<bool> {
        let NodeKind::Pane(data) = &node.kind else {
            return Ok(false);
        };
        let store = self.store;
        let descendants = store.get_descendants(&node.id);
        if self.changed_only && !node.is_changed && !descendants.iter().any(|d| d.is_changed) {
            return Ok(false);
        }

        let mut pane = data.clone();
        pane.created = self.fill(pane.created);
        pane.changed = self.fill(pane.changed);
        let nodes: Vec<Node> = descendants
            .iter()
            .map(|d| {
                let mut d = (*d).clone();
                d.is_changed = false;
                d
            })
            .collect();

        let mut markdown_id = None;
        let mut file_ids: Vec<String> = Vec::new();
        for child in &descendants {
            if let NodeKind::Markdown(md) = &child.kind {
                if child.parent_id.as_ref() == Some(&node.id) && markdown_id.is_none() {
                    markdown_id = Some(md.markdown_id.clone());
                }
                self.rows.markdowns.push(MarkdownRow {
                    id: md.markdown_id.clone(),
                    body: render_markdown(store, &child.id),
                });
            }
            let Some(file_id) = image_file_id(child) else {
                continue;
            };
            if !store.contains(file_id) {
                warn!(%file_id, pane = %node.id, "Image references unknown file");
                continue;
            }
            let file = file_id.to_string();
            if !file_ids.contains(&file) {
                file_ids.push(file.clone());
                self.rows.file_panes.push(FilePaneRow {
                    id: join_id(&file, node.id.as_str()),
                    file_id: file.clone(),
                    pane_id: node.id.to_string(),
                });
            }
            if let Some(md) = store.closest_of_kind(&child.id, NodeType::Markdown) {
                if let NodeKind::Markdown(md) = &md.kind {
                    let row_id = join_id(&file, &md.markdown_id);
                    if !self.rows.file_markdowns.iter().any(|r| r.id == row_id) {
                        self.rows.file_markdowns.push(FileMarkdownRow {
                            id: row_id,
                            file_id: file,
                            markdown_id: md.markdown_id.clone(),
                        });
                    }
                }
            }
        }

        let payload = serde_json::to_string(&PanePayload {
            pane: pane.clone(),
            nodes,
        })?;
        self.rows.panes.push(PaneRow {
            id: node.id.to_string(),
            title: pane.title,
            slug: pane.slug,
            is_context_pane: pane.is_context_pane,
            markdown_id,
            created: pane.created,
            changed: pane.changed,
            options_payload: payload,
        });
        Ok(true)
    }

    fn menu(&mut self, node: &Node, data: &MenuData) {
        if self.include(node) {
            self.rows.menus.push(MenuRow {
                id: node.id.to_string(),
                title: data.title.clone(),
                theme: data.theme.clone(),
                options_payload: data.options_payload.clone(),
            });
        }
    }

    fn file(&mut self, node: &Node, data: &FileData) {
        if self.include(node) {
            self.rows.files.push(FileRow {
                id: node.id.to_string(),
                filename: data.filename.clone(),
                alt_description: data.alt_description.clone(),
                src: data.src.clone(),
                src_set: data.src_set.clone(),
            });
        }
    }

    fn resource(&mut self, node: &Node, data: &ResourceData) {
        if self.include(node) {
            self.rows.resources.push(ResourceRow {
                id: node.id.to_string(),
                title: data.title.clone(),
                slug: data.slug.clone(),
                oneliner: data.oneliner.clone(),
                category: data.category.clone(),
                action_lisp: data.action_lisp.clone(),
                options_payload: data.options_payload.clone(),
            });
        }
    }
}

fn image_file_id(node: &Node) -> Option<&NodeId> {
    match &node.kind {
        NodeKind::TagElement(data) => match &data.payload {
            TagPayload::Image { file_id, .. } => file_id.as_ref(),
            _ => None,
        },
        NodeKind::BackgroundElement(data) => match &data.source {
            BackgroundSource::Image { file_id, .. } => Some(file_id),
            _ => None,
        },
        _ => None,
    }
}

/// Full snapshot of the store.
///
/// # Errors
///
/// Fails if a node sits where no row can hold it, or a payload cannot be
/// encoded.
pub fn serialize(store: &NodeStore) -> CoreResult<RowData> {
    let rows = Writer::new(store, false, None).run()?;
    debug!(rows = rows.row_count(), "Serialized store");
    Ok(rows)
}

/// Rows for dirty entities only.
///
/// A pane counts as dirty when it or any descendant is. Ordering rows are
/// emitted for every pane of a dirty page and for every dirty pane.
///
/// # Errors
///
/// Same as [`serialize`].
pub fn serialize_changed(store: &NodeStore) -> CoreResult<RowData> {
    let rows = Writer::new(store, true, None).run()?;
    debug!(rows = rows.row_count(), "Serialized changed entities");
    Ok(rows)
}

/// Full snapshot for forward migration, filling missing timestamps now.
///
/// # Errors
///
/// Same as [`serialize`].
pub fn migrate_all(store: &NodeStore) -> CoreResult<RowData> {
    migrate_all_at(store, now())
}

/// [`migrate_all`] with an explicit timestamp.
///
/// # Errors
///
/// Same as [`serialize`].
pub fn migrate_all_at(store: &NodeStore, now: u64) -> CoreResult<RowData> {
    let rows = Writer::new(store, false, Some(now)).run()?;
    debug!(rows = rows.row_count(), "Migrated store");
    Ok(rows)
}

fn malformed(message: String) -> CoreError {
    CoreError::MalformedRow(message)
}

/// Check an opaque payload is JSON without re-encoding it. Empty means none.
fn opaque_payload(entity: &str, id: &str, payload: &str) -> CoreResult<String> {
    if !payload.is_empty() {
        serde_json::from_str::<IgnoredAny>(payload)
            .map_err(|e| malformed(format!("{entity} {id} payload: {e}")))?;
    }
    Ok(payload.to_string())
}

/// Move the root's children to the front in stored order.
///
/// Everything else keeps its relative order, so parents still precede
/// their children.
fn order_root_children(nodes: Vec<Node>, order: &[RootOrderRow]) -> CoreResult<Vec<Node>> {
    if order.is_empty() {
        return Ok(nodes);
    }
    let mut weights: HashMap<&str, u32> = HashMap::with_capacity(order.len());
    let mut used: HashSet<u32> = HashSet::with_capacity(order.len());
    for row in order {
        if weights.insert(row.node_id.as_str(), row.weight).is_some() {
            return Err(malformed(format!("root order lists {} twice", row.node_id)));
        }
        if !used.insert(row.weight) {
            return Err(malformed(format!("root order reuses weight {}", row.weight)));
        }
    }
    let (mut top, rest): (Vec<Node>, Vec<Node>) = nodes
        .into_iter()
        .partition(|n| n.parent_id.as_ref().is_some_and(NodeId::is_root));
    if let Some(node) = top.iter().find(|n| !weights.contains_key(n.id.as_str())) {
        return Err(malformed(format!("root order is missing {}", node.id)));
    }
    if top.len() != weights.len() {
        return Err(malformed(
            "root order lists ids that are not under the root".to_string(),
        ));
    }
    top.sort_by_key(|n| weights.get(n.id.as_str()).copied().unwrap_or(u32::MAX));
    top.extend(rest);
    Ok(top)
}

fn check_version(rows: &RowData, config: &EngineConfig) -> CoreResult<()> {
    let found = rows.schema_version;
    if found > SCHEMA_VERSION || (config.strict_schema_version && found != SCHEMA_VERSION) {
        return Err(CoreError::SchemaVersion {
            found,
            expected: SCHEMA_VERSION,
        });
    }
    if found != SCHEMA_VERSION {
        warn!(found, expected = SCHEMA_VERSION, "Reading rows from an older schema");
    }
    Ok(())
}

struct Reader<'a> {
    rows: &'a RowData,
    seen: HashSet<String>,
    nodes: Vec<Node>,
}

impl<'a> Reader<'a> {
    fn push(&mut self, node: Node) -> CoreResult<()> {
        if !self.seen.insert(node.id.to_string()) {
            return Err(malformed(format!("duplicate id {}", node.id)));
        }
        self.nodes.push(node);
        Ok(())
    }

    fn root_child(id: &str, kind: NodeKind) -> Node {
        Node::new(&NodeId::root(), kind).with_id(id)
    }

    fn pane(
        &mut self,
        row: &PaneRow,
        parent: &NodeId,
        markdowns: &HashSet<&str>,
    ) -> CoreResult<()> {
        let payload: PanePayload = serde_json::from_str(&row.options_payload)
            .map_err(|e| malformed(format!("pane {} payload: {e}", row.id)))?;
        if let Some(markdown_id) = &row.markdown_id {
            if !markdowns.contains(markdown_id.as_str()) {
                return Err(malformed(format!(
                    "pane {} references unknown markdown {markdown_id}",
                    row.id
                )));
            }
        }
        let mut pane = payload.pane;
        pane.title.clone_from(&row.title);
        pane.slug.clone_from(&row.slug);
        pane.is_context_pane = row.is_context_pane;
        pane.created = row.created;
        pane.changed = row.changed;
        let pane_id = NodeId::from(row.id.as_str());
        self.push(Node::new(parent, NodeKind::Pane(pane)).with_id(pane_id.clone()))?;

        let mut subtree: HashSet<NodeId> = HashSet::from([pane_id]);
        for mut node in payload.nodes {
            if matches!(node.kind, NodeKind::Root) || node.id.is_root() {
                return Err(malformed(format!("pane {} payload holds a root", row.id)));
            }
            let parent_ok = node.parent_id.as_ref().is_some_and(|p| subtree.contains(p));
            if !parent_ok {
                return Err(malformed(format!(
                    "node {} in pane {} has a parent outside the pane",
                    node.id, row.id
                )));
            }
            node.is_changed = false;
            subtree.insert(node.id.clone());
            self.push(node)?;
        }
        Ok(())
    }

    fn run(mut self) -> CoreResult<LoadData> {
        let rows = self.rows;
        let tractstacks: HashSet<&str> = rows.tractstacks.iter().map(|r| r.id.as_str()).collect();
        let menus: HashSet<&str> = rows.menus.iter().map(|r| r.id.as_str()).collect();
        let files: HashSet<&str> = rows.files.iter().map(|r| r.id.as_str()).collect();
        let markdowns: HashSet<&str> = rows.markdowns.iter().map(|r| r.id.as_str()).collect();
        let panes: HashMap<&str, &PaneRow> =
            rows.panes.iter().map(|r| (r.id.as_str(), r)).collect();
        let pages: HashSet<&str> = rows.storyfragments.iter().map(|r| r.id.as_str()).collect();

        for row in &rows.tractstacks {
            self.push(Self::root_child(
                &row.id,
                NodeKind::TractStack(TractStackData {
                    title: row.title.clone(),
                    slug: row.slug.clone(),
                    social_image_path: row.social_image_path.clone(),
                }),
            ))?;
        }
        for row in &rows.menus {
            let options_payload = opaque_payload("menu", &row.id, &row.options_payload)?;
            self.push(Self::root_child(
                &row.id,
                NodeKind::Menu(MenuData {
                    title: row.title.clone(),
                    theme: row.theme.clone(),
                    options_payload,
                }),
            ))?;
        }
        for row in &rows.files {
            self.push(Self::root_child(
                &row.id,
                NodeKind::File(FileData {
                    filename: row.filename.clone(),
                    alt_description: row.alt_description.clone(),
                    src: row.src.clone(),
                    src_set: row.src_set.clone(),
                }),
            ))?;
        }
        for row in &rows.resources {
            let options_payload = opaque_payload("resource", &row.id, &row.options_payload)?;
            self.push(Self::root_child(
                &row.id,
                NodeKind::Resource(ResourceData {
                    title: row.title.clone(),
                    slug: row.slug.clone(),
                    oneliner: row.oneliner.clone(),
                    category: row.category.clone(),
                    action_lisp: row.action_lisp.clone(),
                    options_payload,
                }),
            ))?;
        }
        for row in &rows.storyfragments {
            let parent = match &row.tractstack_id {
                Some(ts) if tractstacks.contains(ts.as_str()) => NodeId::from(ts.as_str()),
                Some(ts) => {
                    return Err(malformed(format!(
                        "storyfragment {} references unknown tractstack {ts}",
                        row.id
                    )))
                }
                None => NodeId::root(),
            };
            if let Some(menu) = &row.menu_id {
                if !menus.contains(menu.as_str()) {
                    return Err(malformed(format!(
                        "storyfragment {} references unknown menu {menu}",
                        row.id
                    )));
                }
            }
            let data = StoryFragmentData {
                title: row.title.clone(),
                slug: row.slug.clone(),
                tailwind_bg_colour: row.tailwind_bg_colour.clone(),
                menu_id: row.menu_id.as_deref().map(NodeId::from),
                social_image_path: row.social_image_path.clone(),
                created: row.created,
                changed: row.changed,
            };
            self.push(Node::new(&parent, NodeKind::StoryFragment(data)).with_id(row.id.as_str()))?;
        }

        let mut placements: HashMap<&str, Vec<&StoryFragmentPaneRow>> = HashMap::new();
        let mut placed: HashSet<&str> = HashSet::new();
        for row in &rows.storyfragment_panes {
            if !pages.contains(row.storyfragment_id.as_str()) {
                return Err(malformed(format!(
                    "ordering row {} references unknown storyfragment {}",
                    row.id, row.storyfragment_id
                )));
            }
            if !panes.contains_key(row.pane_id.as_str()) {
                return Err(malformed(format!(
                    "ordering row {} references unknown pane {}",
                    row.id, row.pane_id
                )));
            }
            if !placed.insert(row.pane_id.as_str()) {
                return Err(malformed(format!("pane {} placed twice", row.pane_id)));
            }
            placements
                .entry(row.storyfragment_id.as_str())
                .or_default()
                .push(row);
        }
        for page in &rows.storyfragments {
            let Some(list) = placements.get_mut(page.id.as_str()) else {
                continue;
            };
            list.sort_by_key(|r| r.weight);
            let parent = NodeId::from(page.id.as_str());
            for placement in list.iter() {
                if let Some(row) = panes.get(placement.pane_id.as_str()) {
                    self.pane(row, &parent, &markdowns)?;
                }
            }
        }
        for row in &rows.panes {
            if !placed.contains(row.id.as_str()) {
                self.pane(row, &NodeId::root(), &markdowns)?;
            }
        }

        for row in &rows.file_panes {
            if !files.contains(row.file_id.as_str()) || !panes.contains_key(row.pane_id.as_str()) {
                return Err(malformed(format!("file/pane row {} is dangling", row.id)));
            }
        }
        for row in &rows.file_markdowns {
            if !files.contains(row.file_id.as_str())
                || !markdowns.contains(row.markdown_id.as_str())
            {
                return Err(malformed(format!("file/markdown row {} is dangling", row.id)));
            }
        }

        let nodes = order_root_children(self.nodes, &rows.root_order)?;
        Ok(LoadData { nodes })
    }
}

/// Validate row data and rebuild loadable nodes.
///
/// # Errors
///
/// Returns [`CoreError::SchemaVersion`] for a version mismatch and
/// [`CoreError::MalformedRow`] for bad payloads, dangling references or
/// duplicate ids. Nothing is silently dropped.
pub fn deserialize(rows: &RowData, config: &EngineConfig) -> CoreResult<LoadData> {
    check_version(rows, config)?;
    let data = Reader {
        rows,
        seen: HashSet::new(),
        nodes: Vec::new(),
    }
    .run()?;
    debug!(nodes = data.len(), "Deserialized rows");
    Ok(data)
}

/// Insert loaded nodes, creating the root first if the store has none.
///
/// Returns the number of nodes inserted, root excluded.
///
/// # Errors
///
/// Fails atomically if any id already exists in the store.
pub fn load(store: &mut NodeStore, data: LoadData) -> CoreResult<usize> {
    if store.root().is_none() {
        store.add_nodes(vec![Node::root()])?;
    }
    let ids = store.add_nodes(data.nodes)?;
    Ok(ids.len())
}

fn inline_text(store: &NodeStore, node: &Node) -> String {
    let mut text = match &node.kind {
        NodeKind::TagElement(data) => data.copy.clone().unwrap_or_default(),
        NodeKind::Text(data) => data.copy.clone(),
        _ => String::new(),
    };
    let children = store.get_child_ids(&node.id).unwrap_or_default();
    for child in children.iter().filter_map(|c| store.get_by_id(c)) {
        text.push_str(&inline_element(store, child));
    }
    text
}

fn inline_element(store: &NodeStore, node: &Node) -> String {
    let inner = inline_text(store, node);
    let NodeKind::TagElement(data) = &node.kind else {
        return inner;
    };
    match (&data.tag_name, &data.payload) {
        (TagName::Em, _) => format!("*{inner}*"),
        (TagName::Strong, _) => format!("**{inner}**"),
        (TagName::A | TagName::Button, TagPayload::Link { href, .. }) => {
            format!("[{inner}]({href})")
        }
        (TagName::Img, TagPayload::Image { src, alt, .. }) => format!("![{alt}]({src})"),
        (TagName::Code, _) => format!("`{inner}`"),
        _ => inner,
    }
}

/// Plain markdown rendering of a markdown fragment's children.
#[must_use]
pub fn render_markdown(store: &NodeStore, markdown_id: &NodeId) -> String {
    let Ok(children) = store.get_child_ids(markdown_id) else {
        return String::new();
    };
    let mut blocks = Vec::new();
    for node in children.iter().filter_map(|c| store.get_by_id(c)) {
        let block = match node.tag_name() {
            Some(TagName::H2) => format!("## {}", inline_text(store, node)),
            Some(TagName::H3) => format!("### {}", inline_text(store, node)),
            Some(TagName::H4) => format!("#### {}", inline_text(store, node)),
            Some(TagName::H5) => format!("##### {}", inline_text(store, node)),
            Some(tag @ (TagName::Ul | TagName::Ol)) => {
                let marker = if *tag == TagName::Ul { "-" } else { "1." };
                store
                    .get_child_ids(&node.id)
                    .unwrap_or_default()
                    .iter()
                    .filter_map(|c| store.get_by_id(c))
                    .map(|li| format!("{marker} {}", inline_text(store, li)))
                    .collect::<Vec<_>>()
                    .join("\n")
            }
            Some(_) => inline_element(store, node),
            None => inline_text(store, node),
        };
        if !block.is_empty() {
            blocks.push(block);
        }
    }
    blocks.join("\n\n")
}

impl NodesContext {
    /// Deserialize and bulk-load row data, then notify the root.
    ///
    /// Loading is not recorded in history.
    ///
    /// # Errors
    ///
    /// See [`deserialize`] and [`load`].
    pub fn load_rows(&mut self, rows: &RowData) -> CoreResult<usize> {
        let data = deserialize(rows, self.config())?;
        let count = load(self.store_mut(), data)?;
        self.notify_root();
        Ok(count)
    }

    /// Full snapshot of this session's store.
    ///
    /// # Errors
    ///
    /// See [`serialize`].
    pub fn serialize(&self) -> CoreResult<RowData> {
        serialize(self.store())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{PaneData, TagElementData, TextData};

    fn sample_store() -> NodeStore {
        let mut store = NodeStore::with_root();
        let root = NodeId::root();
        store
            .add_nodes(vec![
                Node::new(&root, NodeKind::TractStack(TractStackData::default())).with_id("ts"),
                Node::new(
                    &root,
                    NodeKind::File(FileData {
                        filename: "cat.png".to_string(),
                        src: "/cat.png".to_string(),
                        ..FileData::default()
                    }),
                )
                .with_id("file"),
                Node::new(&"ts".into(), NodeKind::StoryFragment(StoryFragmentData::default()))
                    .with_id("page"),
                Node::new(&"page".into(), NodeKind::Pane(PaneData::default())).with_id("pane"),
                Node::new(
                    &"pane".into(),
                    NodeKind::Markdown(crate::node::MarkdownData {
                        markdown_id: "md-body".to_string(),
                        ..Default::default()
                    }),
                )
                .with_id("md"),
                Node::new(
                    &"md".into(),
                    NodeKind::TagElement(TagElementData::new("h2").with_copy("Title")),
                )
                .with_id("h2"),
                Node::new(&"md".into(), NodeKind::TagElement(TagElementData::new("p")))
                    .with_id("p"),
                Node::new(&"p".into(), NodeKind::Text(TextData { copy: "Hi ".to_string() }))
                    .with_id("t"),
                Node::new(
                    &"p".into(),
                    NodeKind::TagElement(TagElementData::new("strong").with_copy("there")),
                )
                .with_id("s"),
                Node::new(
                    &"md".into(),
                    NodeKind::TagElement(TagElementData::new("img").with_payload(
                        TagPayload::Image {
                            src: "/cat.png".to_string(),
                            src_set: None,
                            alt: "cat".to_string(),
                            file_id: Some("file".into()),
                        },
                    )),
                )
                .with_id("img"),
            ])
            .expect("sample");
        store.mark_all_saved();
        store
    }

    #[test]
    fn test_serialize_shapes_rows() {
        let rows = serialize(&sample_store()).expect("serialize");
        assert_eq!(rows.schema_version, SCHEMA_VERSION);
        assert_eq!(rows.tractstacks.len(), 1);
        assert_eq!(rows.storyfragments[0].tractstack_id.as_deref(), Some("ts"));
        assert_eq!(rows.panes[0].markdown_id.as_deref(), Some("md-body"));
        assert_eq!(rows.storyfragment_panes[0].weight, 0);
        assert_eq!(rows.file_panes.len(), 1);
        assert_eq!(rows.file_markdowns[0].markdown_id, "md-body");
        assert_eq!(rows.markdowns[0].body, "## Title\n\nHi **there**\n\n![cat](/cat.png)");
    }

    #[test]
    fn test_round_trip_reproduces_tree() {
        let store = sample_store();
        let rows = serialize(&store).expect("serialize");
        let data = deserialize(&rows, &EngineConfig::default()).expect("deserialize");
        let mut rebuilt = NodeStore::new();
        load(&mut rebuilt, data).expect("load");

        let before: Vec<Node> = store.walk().into_iter().cloned().collect();
        let after: Vec<Node> = rebuilt.walk().into_iter().cloned().collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_serialize_changed_only_dirty() {
        let mut store = sample_store();
        assert!(serialize_changed(&store).expect("rows").is_empty());

        store.set_changed(&"s".into(), true);
        let rows = serialize_changed(&store).expect("rows");
        assert_eq!(rows.panes.len(), 1);
        assert_eq!(rows.storyfragment_panes.len(), 1);
        assert!(rows.storyfragments.is_empty());
        assert!(rows.tractstacks.is_empty());
    }

    #[test]
    fn test_migrate_fills_timestamps() {
        let rows = migrate_all_at(&sample_store(), 42).expect("rows");
        assert_eq!(rows.storyfragments[0].created, Some(42));
        assert_eq!(rows.panes[0].changed, Some(42));
    }

    #[test]
    fn test_version_mismatch_fails_loudly() {
        let mut rows = serialize(&sample_store()).expect("serialize");
        rows.schema_version = 1;
        let err = deserialize(&rows, &EngineConfig::default()).unwrap_err();
        assert!(matches!(err, CoreError::SchemaVersion { found: 1, expected: 2 }));

        let lenient = EngineConfig {
            strict_schema_version: false,
            ..EngineConfig::default()
        };
        assert!(deserialize(&rows, &lenient).is_ok());
        rows.schema_version = 3;
        assert!(deserialize(&rows, &lenient).is_err());
    }

    #[test]
    fn test_dangling_references_fail() {
        let mut rows = serialize(&sample_store()).expect("serialize");
        rows.storyfragment_panes[0].pane_id = "ghost".to_string();
        assert!(matches!(
            deserialize(&rows, &EngineConfig::default()),
            Err(CoreError::MalformedRow(_))
        ));

        let mut rows = serialize(&sample_store()).expect("serialize");
        rows.files.clear();
        assert!(matches!(
            deserialize(&rows, &EngineConfig::default()),
            Err(CoreError::MalformedRow(_))
        ));

        let mut rows = serialize(&sample_store()).expect("serialize");
        rows.panes[0].options_payload = "{not json".to_string();
        assert!(matches!(
            deserialize(&rows, &EngineConfig::default()),
            Err(CoreError::MalformedRow(_))
        ));
    }

    #[test]
    fn test_unplaced_pane_loads_under_root() {
        let mut rows = serialize(&sample_store()).expect("serialize");
        rows.storyfragment_panes.clear();
        rows.root_order.clear();
        let data = deserialize(&rows, &EngineConfig::default()).expect("deserialize");
        let mut store = NodeStore::new();
        load(&mut store, data).expect("load");
        assert_eq!(
            store.get_by_id(&"pane".into()).and_then(|n| n.parent_id.clone()),
            Some(NodeId::root())
        );
    }

    fn reload(rows: &RowData) -> NodeStore {
        let data = deserialize(rows, &EngineConfig::default()).expect("deserialize");
        let mut store = NodeStore::new();
        load(&mut store, data).expect("load");
        store
    }

    #[test]
    fn test_root_child_order_survives_round_trip() {
        let mut store = NodeStore::with_root();
        let root = NodeId::root();
        store
            .add_nodes(vec![
                Node::new(&root, NodeKind::StoryFragment(StoryFragmentData::default()))
                    .with_id("page"),
                Node::new(&root, NodeKind::File(FileData::default())).with_id("file"),
                Node::new(&root, NodeKind::TractStack(TractStackData::default())).with_id("ts"),
                Node::new(&"ts".into(), NodeKind::StoryFragment(StoryFragmentData::default()))
                    .with_id("inner"),
            ])
            .expect("store");

        let rebuilt = reload(&serialize(&store).expect("serialize"));
        assert_eq!(
            rebuilt.get_child_ids(&root).expect("root"),
            store.get_child_ids(&root).expect("root")
        );
        assert_eq!(
            rebuilt.get_child_ids(&"ts".into()).expect("ts"),
            &[NodeId::from("inner")][..]
        );
    }

    #[test]
    fn test_inconsistent_root_order_fails() {
        let rows = serialize(&sample_store()).expect("serialize");

        let mut missing = rows.clone();
        missing.root_order.pop();
        let mut unknown = rows.clone();
        unknown.root_order.push(RootOrderRow {
            node_id: "ghost".to_string(),
            weight: 99,
        });
        let mut repeated = rows.clone();
        repeated.root_order[1].weight = repeated.root_order[0].weight;

        for broken in [missing, unknown, repeated] {
            assert!(matches!(
                deserialize(&broken, &EngineConfig::default()),
                Err(CoreError::MalformedRow(_))
            ));
        }
    }

    #[test]
    fn test_rows_without_root_order_load_in_kind_order() {
        let mut store = NodeStore::with_root();
        let root = NodeId::root();
        store
            .add_nodes(vec![
                Node::new(&root, NodeKind::File(FileData::default())).with_id("file"),
                Node::new(&root, NodeKind::TractStack(TractStackData::default())).with_id("ts"),
            ])
            .expect("store");
        let mut rows = serialize(&store).expect("serialize");
        rows.root_order.clear();

        assert_eq!(
            reload(&rows).get_child_ids(&root).expect("root"),
            &[NodeId::from("ts"), NodeId::from("file")][..]
        );
    }

    #[test]
    fn test_opaque_payloads_are_kept_verbatim() {
        let raw = r#"{"zeta":1,"alpha":[1.50,2]}"#;
        let mut rows = RowData::default();
        rows.menus.push(MenuRow {
            id: "menu".to_string(),
            title: "Main".to_string(),
            theme: "default".to_string(),
            options_payload: raw.to_string(),
        });
        rows.resources.push(ResourceRow {
            id: "res".to_string(),
            title: "Res".to_string(),
            slug: "res".to_string(),
            oneliner: String::new(),
            category: None,
            action_lisp: None,
            options_payload: raw.to_string(),
        });

        let written = serialize(&reload(&rows)).expect("serialize");
        assert_eq!(written.menus[0].options_payload, raw);
        assert_eq!(written.resources[0].options_payload, raw);

        rows.menus[0].options_payload = "{\"zeta\":".to_string();
        assert!(matches!(
            deserialize(&rows, &EngineConfig::default()),
            Err(CoreError::MalformedRow(_))
        ));
    }

    #[test]
    fn test_context_load_rows_notifies_root() {
        let rows = serialize(&sample_store()).expect("serialize");
        let mut ctx = NodesContext::default();
        let hits = std::rc::Rc::new(std::cell::Cell::new(0));
        let h = std::rc::Rc::clone(&hits);
        let _sub = ctx.subscribe(NodeId::root(), move |_, _| h.set(h.get() + 1));
        let count = ctx.load_rows(&rows).expect("load");
        assert_eq!(count, sample_store().len() - 1);
        assert_eq!(hits.get(), 1);
        assert!(!ctx.history().can_undo());
    }
}
