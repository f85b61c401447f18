//! # StoryKeep Core
//!
//! Node-tree content engine for the StoryKeep visual CMS.
//! Holds a site's content as a tree of typed nodes and keeps it consistent
//! under editing. Performs no I/O.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                NodesContext                 │
//! ├─────────────────────────────────────────────┤
//! │  Node Store      │  Notification Bus        │
//! │  - Node map      │  - Per-id subscribers    │
//! │  - Child order   │  - No bubbling           │
//! │  - Mutations     │                          │
//! ├─────────────────────────────────────────────┤
//! │  History         │  Style Resolver          │
//! │  - Patches       │  - Layers + local        │
//! │  - Linear undo   │  - Responsive classes    │
//! ├─────────────────────────────────────────────┤
//! │  Serializer: NodeStore ⇄ RowData            │
//! └─────────────────────────────────────────────┘
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod context;
pub mod error;
pub mod history;
pub mod node;
pub mod notify;
pub mod rows;
pub mod serializer;
pub mod state;
pub mod store;
pub mod style;
pub mod template;

pub use config::EngineConfig;
pub use context::NodesContext;
pub use error::{CoreError, CoreResult};
pub use history::{History, Patch, PatchKind, DEFAULT_HISTORY_SIZE};
pub use node::{
    BackgroundData, BackgroundSource, ButtonPayload, CodeHookPayload, FileData, ImpressionData,
    MarkdownData, MenuData, Node, NodeId, NodeKind, NodeType, PaneData, PerViewport, ResourceData,
    StoryFragmentData, TagElementData, TagName, TagPayload, TextData, TractStackData, WidgetData,
    ROOT_ID,
};
pub use notify::{NotificationBus, Subscription};
pub use rows::{RowData, SCHEMA_VERSION};
pub use serializer::{
    deserialize, load, migrate_all, migrate_all_at, render_markdown, serialize,
    serialize_changed, LoadData,
};
pub use state::{ClickOutcome, EditorState, ToolMode};
pub use store::{Direction, NodeLookup, NodeStore, Relocation, Removal};
pub use style::{ElementStyle, StyleRecord, StyleResolver, Viewport, ViewportStyles};
pub use template::{instantiate, InsertPosition, TemplateNode};

/// Engine version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
