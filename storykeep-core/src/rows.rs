//! Relational row shapes exchanged with the persistence layer.
//!
//! Row columns are `snake_case`; structured payloads are JSON strings the
//! storage side treats as opaque.

use serde::{Deserialize, Serialize};

use crate::node::{Node, PaneData};

/// Schema version written by this engine.
pub const SCHEMA_VERSION: u32 = 2;

/// Top-level container row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TractStackRow {
    /// Node id.
    pub id: String,
    /// Title.
    pub title: String,
    /// URL slug.
    pub slug: String,
    /// Social sharing image.
    #[serde(default)]
    pub social_image_path: Option<String>,
}

/// Page row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryFragmentRow {
    /// Node id.
    pub id: String,
    /// Owning container; `None` for pages directly under the root.
    #[serde(default)]
    pub tractstack_id: Option<String>,
    /// Title.
    pub title: String,
    /// URL slug.
    pub slug: String,
    /// Tailwind background colour.
    #[serde(default)]
    pub tailwind_bg_colour: Option<String>,
    /// Menu shown on the page.
    #[serde(default)]
    pub menu_id: Option<String>,
    /// Social sharing image.
    #[serde(default)]
    pub social_image_path: Option<String>,
    /// Creation time, ms since epoch.
    #[serde(default)]
    pub created: Option<u64>,
    /// Last change time, ms since epoch.
    #[serde(default)]
    pub changed: Option<u64>,
}

/// Content block row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaneRow {
    /// Node id.
    pub id: String,
    /// Title.
    pub title: String,
    /// URL slug.
    pub slug: String,
    /// Context panes are not placed on any page.
    #[serde(default)]
    pub is_context_pane: bool,
    /// Markdown body row of the pane's fragment.
    #[serde(default)]
    pub markdown_id: Option<String>,
    /// Creation time, ms since epoch.
    #[serde(default)]
    pub created: Option<u64>,
    /// Last change time, ms since epoch.
    #[serde(default)]
    pub changed: Option<u64>,
    /// JSON text of a [`PanePayload`].
    pub options_payload: String,
}

/// Structured payload stored in [`PaneRow::options_payload`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanePayload {
    /// Pane metadata beyond the row columns.
    pub pane: PaneData,
    /// The pane's descendants, depth-first.
    #[serde(default)]
    pub nodes: Vec<Node>,
}

/// Markdown body row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkdownRow {
    /// Markdown id.
    pub id: String,
    /// Plain markdown rendering of the fragment.
    pub body: String,
}

/// Image file row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRow {
    /// Node id.
    pub id: String,
    /// Stored filename.
    pub filename: String,
    /// Alt description.
    pub alt_description: String,
    /// Public URL.
    pub src: String,
    /// Responsive source set.
    #[serde(default)]
    pub src_set: Option<String>,
}

/// Menu row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuRow {
    /// Node id.
    pub id: String,
    /// Title.
    pub title: String,
    /// Theme.
    pub theme: String,
    /// JSON text of the link payload.
    pub options_payload: String,
}

/// Resource row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRow {
    /// Node id.
    pub id: String,
    /// Title.
    pub title: String,
    /// URL slug.
    pub slug: String,
    /// Short description.
    pub oneliner: String,
    /// Category slug.
    #[serde(default)]
    pub category: Option<String>,
    /// Opaque action payload.
    #[serde(default)]
    pub action_lisp: Option<String>,
    /// JSON text of the options payload.
    pub options_payload: String,
}

/// Pane placement on a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryFragmentPaneRow {
    /// Join row id.
    pub id: String,
    /// Page id.
    pub storyfragment_id: String,
    /// Pane id.
    pub pane_id: String,
    /// Position on the page, ascending.
    pub weight: u32,
}

/// Position of a node directly under the root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootOrderRow {
    /// Node id of a tractstack, page, context pane, menu, file or resource.
    pub node_id: String,
    /// Position under the root, ascending.
    pub weight: u32,
}

/// Image used by a pane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePaneRow {
    /// Join row id.
    pub id: String,
    /// File id.
    pub file_id: String,
    /// Pane id.
    pub pane_id: String,
}

/// Image used by a markdown body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMarkdownRow {
    /// Join row id.
    pub id: String,
    /// File id.
    pub file_id: String,
    /// Markdown id.
    pub markdown_id: String,
}

/// All row collections of one snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowData {
    /// Version the rows were written under.
    pub schema_version: u32,
    /// Containers.
    #[serde(default)]
    pub tractstacks: Vec<TractStackRow>,
    /// Pages.
    #[serde(default)]
    pub storyfragments: Vec<StoryFragmentRow>,
    /// Content blocks.
    #[serde(default)]
    pub panes: Vec<PaneRow>,
    /// Markdown bodies.
    #[serde(default)]
    pub markdowns: Vec<MarkdownRow>,
    /// Image files.
    #[serde(default)]
    pub files: Vec<FileRow>,
    /// Menus.
    #[serde(default)]
    pub menus: Vec<MenuRow>,
    /// Resources.
    #[serde(default)]
    pub resources: Vec<ResourceRow>,
    /// Page → pane ordering.
    #[serde(default)]
    pub storyfragment_panes: Vec<StoryFragmentPaneRow>,
    /// Order of the root's children. Empty in rows written before it
    /// existed; such rows load in kind order.
    #[serde(default)]
    pub root_order: Vec<RootOrderRow>,
    /// File → pane associations.
    #[serde(default)]
    pub file_panes: Vec<FilePaneRow>,
    /// File → markdown associations.
    #[serde(default)]
    pub file_markdowns: Vec<FileMarkdownRow>,
}

impl Default for RowData {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            tractstacks: Vec::new(),
            storyfragments: Vec::new(),
            panes: Vec::new(),
            markdowns: Vec::new(),
            files: Vec::new(),
            menus: Vec::new(),
            resources: Vec::new(),
            storyfragment_panes: Vec::new(),
            root_order: Vec::new(),
            file_panes: Vec::new(),
            file_markdowns: Vec::new(),
        }
    }
}

impl RowData {
    /// Total number of rows across all collections.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.tractstacks.len()
            + self.storyfragments.len()
            + self.panes.len()
            + self.markdowns.len()
            + self.files.len()
            + self.menus.len()
            + self.resources.len()
            + self.storyfragment_panes.len()
            + self.root_order.len()
            + self.file_panes.len()
            + self.file_markdowns.len()
    }

    /// Whether there are no rows at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }

    /// Serialize to pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parse from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Join row id for a page/pane pair.
#[must_use]
pub fn join_id(left: &str, right: &str) -> String {
    format!("{left}:{right}")
}
