//! Content nodes - the building blocks of a site's content tree.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::style::{ElementStyle, ViewportStyles};

/// Reserved identifier of the singleton root node.
pub const ROOT_ID: &str = "root";

/// Unique identifier for a node.
///
/// Ids are unique across the whole store, not only within a subtree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Generate a fresh, globally unique node ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// The reserved root ID.
    #[must_use]
    pub fn root() -> Self {
        Self(ROOT_ID.to_string())
    }

    /// Whether this is the reserved root ID.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0 == ROOT_ID
    }

    /// Borrow the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Discriminant of [`NodeKind`], used for kind queries such as
/// "nearest enclosing pane".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    /// Singleton root of the store.
    Root,
    /// Top-level container grouping pages.
    TractStack,
    /// An addressable page.
    StoryFragment,
    /// A renderable content block on a page.
    Pane,
    /// Markdown body of a pane.
    Markdown,
    /// A block or inline markup element.
    TagElement,
    /// Background image or visual break inside a pane.
    BackgroundElement,
    /// A raw text run.
    Text,
    /// Pane-level code hook.
    CodeHook,
    /// Embedded interactive widget.
    Widget,
    /// Navigation menu.
    Menu,
    /// Image file.
    File,
    /// Generic resource record.
    Resource,
    /// Call-to-action attached to a pane.
    Impression,
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// HTML-ish tag of a [`NodeKind::TagElement`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TagName {
    /// Paragraph.
    P,
    /// Heading level 2.
    H2,
    /// Heading level 3.
    H3,
    /// Heading level 4.
    H4,
    /// Heading level 5.
    H5,
    /// Unordered list.
    Ul,
    /// Ordered list.
    Ol,
    /// List item.
    Li,
    /// Anchor.
    A,
    /// Button.
    Button,
    /// Image.
    Img,
    /// Emphasis decorator.
    Em,
    /// Strong decorator.
    Strong,
    /// Inline code, used for widget invocations.
    Code,
    /// Any other tag.
    Custom(String),
}

impl TagName {
    /// Tag name as written in markup.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::P => "p",
            Self::H2 => "h2",
            Self::H3 => "h3",
            Self::H4 => "h4",
            Self::H5 => "h5",
            Self::Ul => "ul",
            Self::Ol => "ol",
            Self::Li => "li",
            Self::A => "a",
            Self::Button => "button",
            Self::Img => "img",
            Self::Em => "em",
            Self::Strong => "strong",
            Self::Code => "code",
            Self::Custom(name) => name,
        }
    }

    /// Inline decorators are never the target of a click.
    #[must_use]
    pub fn is_decorator(&self) -> bool {
        matches!(self, Self::Em | Self::Strong)
    }

    /// `ul` / `ol`.
    #[must_use]
    pub fn is_list_container(&self) -> bool {
        matches!(self, Self::Ul | Self::Ol)
    }

    /// Block tags whose copy can be edited in place.
    #[must_use]
    pub fn is_text_bearing(&self) -> bool {
        matches!(
            self,
            Self::P | Self::H2 | Self::H3 | Self::H4 | Self::H5 | Self::Li
        )
    }
}

impl From<String> for TagName {
    fn from(value: String) -> Self {
        match value.as_str() {
            "p" => Self::P,
            "h2" => Self::H2,
            "h3" => Self::H3,
            "h4" => Self::H4,
            "h5" => Self::H5,
            "ul" => Self::Ul,
            "ol" => Self::Ol,
            "li" => Self::Li,
            "a" => Self::A,
            "button" => Self::Button,
            "img" => Self::Img,
            "em" => Self::Em,
            "strong" => Self::Strong,
            "code" => Self::Code,
            _ => Self::Custom(value),
        }
    }
}

impl From<&str> for TagName {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<TagName> for String {
    fn from(value: TagName) -> Self {
        match value {
            TagName::Custom(name) => name,
            other => other.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for TagName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Code-hook target plus parameters carried by a pane.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeHookPayload {
    /// Hook identifier.
    pub target: String,
    /// Hook parameters.
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

/// Button styling and callback attached to a link.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ButtonPayload {
    /// Button classes keyed by selector.
    #[serde(default)]
    pub button_classes: BTreeMap<String, Vec<String>>,
    /// Hover classes keyed by selector.
    #[serde(default)]
    pub button_hover_classes: BTreeMap<String, Vec<String>>,
    /// Opaque action payload run on click.
    #[serde(default)]
    pub callback_payload: String,
    /// Whether the link leaves the site.
    #[serde(default)]
    pub is_external_url: bool,
}

/// Tag-specific payload of a [`TagElementData`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TagPayload {
    /// No extra payload.
    #[default]
    Plain,
    /// Anchor or button target.
    #[serde(rename_all = "camelCase")]
    Link {
        /// Link target.
        href: String,
        /// Button styling when rendered as a button.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        button: Option<ButtonPayload>,
    },
    /// Image source.
    #[serde(rename_all = "camelCase")]
    Image {
        /// Image URL.
        src: String,
        /// Responsive source set.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        src_set: Option<String>,
        /// Alt text.
        #[serde(default)]
        alt: String,
        /// Backing image file node, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_id: Option<NodeId>,
    },
    /// Widget invocation parameters of a `code` tag.
    Code {
        /// Ordered widget parameters.
        #[serde(default)]
        params: Vec<String>,
    },
}

/// Identity metadata of a top-level container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TractStackData {
    /// Title.
    pub title: String,
    /// URL slug.
    pub slug: String,
    /// Social sharing image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub social_image_path: Option<String>,
}

/// Identity metadata of a page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryFragmentData {
    /// Title.
    pub title: String,
    /// URL slug.
    pub slug: String,
    /// Tailwind background colour name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tailwind_bg_colour: Option<String>,
    /// Menu shown on this page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub menu_id: Option<NodeId>,
    /// Social sharing image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub social_image_path: Option<String>,
    /// Creation time in milliseconds since epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<u64>,
    /// Last change time in milliseconds since epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changed: Option<u64>,
}

/// Per-viewport value triple.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerViewport<T> {
    /// Mobile value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobile: Option<T>,
    /// Tablet value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tablet: Option<T>,
    /// Desktop value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desktop: Option<T>,
}

/// Content metadata of a pane.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaneData {
    /// Title.
    pub title: String,
    /// URL slug.
    pub slug: String,
    /// Context panes live outside any page.
    #[serde(default)]
    pub is_context_pane: bool,
    /// Decorative panes carry no copy.
    #[serde(default)]
    pub is_decorative: bool,
    /// Background colour as a CSS value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bg_colour: Option<String>,
    /// Height offsets per viewport.
    #[serde(default)]
    pub height_offset: PerViewport<i64>,
    /// Height ratios per viewport.
    #[serde(default)]
    pub height_ratio: PerViewport<String>,
    /// Code hook rendered in place of markdown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_hook: Option<CodeHookPayload>,
    /// Beliefs a visitor must hold to see the pane.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub held_beliefs: BTreeMap<String, Vec<String>>,
    /// Beliefs that hide the pane.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub withheld_beliefs: BTreeMap<String, Vec<String>>,
    /// Creation time in milliseconds since epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<u64>,
    /// Last change time in milliseconds since epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changed: Option<u64>,
}

/// Markdown body of a pane.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkdownData {
    /// Id of the persisted markdown body row.
    pub markdown_id: String,
    /// Viewports on which the fragment is hidden.
    #[serde(default)]
    pub hidden: PerViewport<bool>,
    /// Default styles applied to each tag inside this fragment.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tag_defaults: BTreeMap<String, ViewportStyles>,
    /// Wrapper style layers.
    #[serde(default)]
    pub style: ElementStyle,
}

/// A block or inline markup element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagElementData {
    /// Element tag.
    pub tag_name: TagName,
    /// Literal copy for leaf elements.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copy: Option<String>,
    /// Tag-specific payload.
    #[serde(default)]
    pub payload: TagPayload,
    /// Local style overrides and wrapper layers.
    #[serde(default)]
    pub style: ElementStyle,
}

impl TagElementData {
    /// Element with no copy, payload or style.
    #[must_use]
    pub fn new(tag_name: impl Into<TagName>) -> Self {
        Self {
            tag_name: tag_name.into(),
            copy: None,
            payload: TagPayload::Plain,
            style: ElementStyle::default(),
        }
    }

    /// Set the literal copy.
    #[must_use]
    pub fn with_copy(mut self, copy: impl Into<String>) -> Self {
        self.copy = Some(copy.into());
        self
    }

    /// Set the tag payload.
    #[must_use]
    pub fn with_payload(mut self, payload: TagPayload) -> Self {
        self.payload = payload;
        self
    }

    /// Set the style data.
    #[must_use]
    pub fn with_style(mut self, style: ElementStyle) -> Self {
        self.style = style;
        self
    }
}

/// What a background element shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum BackgroundSource {
    /// An uploaded image file.
    #[serde(rename_all = "camelCase")]
    Image {
        /// Backing image file node.
        file_id: NodeId,
        /// Image URL.
        src: String,
        /// Responsive source set.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        src_set: Option<String>,
        /// Alt text.
        #[serde(default)]
        alt: String,
    },
    /// An artpack image referenced by collection.
    Artpack {
        /// Artpack collection.
        collection: String,
        /// Image name in the collection.
        image: String,
    },
    /// A shaped SVG break per viewport.
    #[serde(rename_all = "camelCase")]
    VisualBreak {
        /// Break shape per viewport.
        #[serde(default)]
        shape: PerViewport<String>,
        /// Fill colour.
        #[serde(default)]
        svg_fill: String,
    },
}

/// Background image or visual break.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundData {
    /// Image source.
    pub source: BackgroundSource,
    /// CSS object-fit.
    #[serde(default = "BackgroundData::default_object_fit")]
    pub object_fit: String,
    /// Wrapper style layers.
    #[serde(default)]
    pub style: ElementStyle,
}

impl BackgroundData {
    fn default_object_fit() -> String {
        "cover".to_string()
    }
}

/// A raw text run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextData {
    /// Text content.
    pub copy: String,
}

/// Embedded interactive widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetData {
    /// Widget identifier (`youtube`, `signup`, `belief`, ...).
    pub hook: String,
    /// Ordered widget parameters.
    #[serde(default)]
    pub params: Vec<String>,
    /// Wrapper style layers.
    #[serde(default)]
    pub style: ElementStyle,
}

/// Call-to-action shown alongside a pane.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpressionData {
    /// Headline.
    pub title: String,
    /// Body copy.
    pub body: String,
    /// Button label.
    pub button_text: String,
    /// Action expression run on click.
    #[serde(default)]
    pub actions_lisp: String,
}

/// Navigation menu.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuData {
    /// Title.
    pub title: String,
    /// Menu theme.
    pub theme: String,
    /// Opaque link payload as JSON text, kept verbatim.
    #[serde(default)]
    pub options_payload: String,
}

/// Uploaded image file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileData {
    /// Stored filename.
    pub filename: String,
    /// Alt description.
    pub alt_description: String,
    /// Public URL.
    pub src: String,
    /// Responsive source set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_set: Option<String>,
}

/// Generic resource record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceData {
    /// Title.
    pub title: String,
    /// URL slug.
    pub slug: String,
    /// Short description.
    pub oneliner: String,
    /// Category slug.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Opaque action payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_lisp: Option<String>,
    /// Opaque options payload as JSON text, kept verbatim.
    #[serde(default)]
    pub options_payload: String,
}

/// The kind of a node together with its kind-specific payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "nodeType")]
pub enum NodeKind {
    /// Singleton root.
    Root,
    /// Top-level container.
    TractStack(TractStackData),
    /// Page.
    StoryFragment(StoryFragmentData),
    /// Content block.
    Pane(PaneData),
    /// Markdown body.
    Markdown(MarkdownData),
    /// Markup element.
    TagElement(TagElementData),
    /// Background element.
    BackgroundElement(BackgroundData),
    /// Text run.
    Text(TextData),
    /// Pane-level code hook.
    CodeHook(CodeHookPayload),
    /// Widget.
    Widget(WidgetData),
    /// Menu.
    Menu(MenuData),
    /// Image file.
    File(FileData),
    /// Resource.
    Resource(ResourceData),
    /// Impression.
    Impression(ImpressionData),
}

impl NodeKind {
    /// The discriminant of this kind.
    #[must_use]
    pub const fn node_type(&self) -> NodeType {
        match self {
            Self::Root => NodeType::Root,
            Self::TractStack(_) => NodeType::TractStack,
            Self::StoryFragment(_) => NodeType::StoryFragment,
            Self::Pane(_) => NodeType::Pane,
            Self::Markdown(_) => NodeType::Markdown,
            Self::TagElement(_) => NodeType::TagElement,
            Self::BackgroundElement(_) => NodeType::BackgroundElement,
            Self::Text(_) => NodeType::Text,
            Self::CodeHook(_) => NodeType::CodeHook,
            Self::Widget(_) => NodeType::Widget,
            Self::Menu(_) => NodeType::Menu,
            Self::File(_) => NodeType::File,
            Self::Resource(_) => NodeType::Resource,
            Self::Impression(_) => NodeType::Impression,
        }
    }
}

/// A node in the content tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Unique identifier.
    pub id: NodeId,
    /// Containing node; `None` only for the root.
    pub parent_id: Option<NodeId>,
    /// Kind and payload.
    #[serde(flatten)]
    pub kind: NodeKind,
    /// Dirty flag consulted by incremental saves.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_changed: bool,
}

impl Node {
    /// Create a node with a fresh id under the given parent.
    #[must_use]
    pub fn new(parent_id: &NodeId, kind: NodeKind) -> Self {
        Self {
            id: NodeId::generate(),
            parent_id: Some(parent_id.clone()),
            kind,
            is_changed: false,
        }
    }

    /// The bootstrap root node.
    #[must_use]
    pub fn root() -> Self {
        Self {
            id: NodeId::root(),
            parent_id: None,
            kind: NodeKind::Root,
            is_changed: false,
        }
    }

    /// Replace the generated id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<NodeId>) -> Self {
        self.id = id.into();
        self
    }

    /// Mark the node dirty.
    #[must_use]
    pub fn changed(mut self) -> Self {
        self.is_changed = true;
        self
    }

    /// Discriminant of this node's kind.
    #[must_use]
    pub const fn node_type(&self) -> NodeType {
        self.kind.node_type()
    }

    /// Tag of a tag element.
    #[must_use]
    pub fn tag_name(&self) -> Option<&TagName> {
        match &self.kind {
            NodeKind::TagElement(data) => Some(&data.tag_name),
            _ => None,
        }
    }

    /// Style data of kinds that carry it.
    #[must_use]
    pub fn style(&self) -> Option<&ElementStyle> {
        match &self.kind {
            NodeKind::Markdown(data) => Some(&data.style),
            NodeKind::TagElement(data) => Some(&data.style),
            NodeKind::BackgroundElement(data) => Some(&data.style),
            NodeKind::Widget(data) => Some(&data.style),
            NodeKind::Root
            | NodeKind::TractStack(_)
            | NodeKind::StoryFragment(_)
            | NodeKind::Pane(_)
            | NodeKind::Text(_)
            | NodeKind::CodeHook(_)
            | NodeKind::Menu(_)
            | NodeKind::File(_)
            | NodeKind::Resource(_)
            | NodeKind::Impression(_) => None,
        }
    }

    /// Mutable style data of kinds that carry it.
    pub fn style_mut(&mut self) -> Option<&mut ElementStyle> {
        match &mut self.kind {
            NodeKind::Markdown(data) => Some(&mut data.style),
            NodeKind::TagElement(data) => Some(&mut data.style),
            NodeKind::BackgroundElement(data) => Some(&mut data.style),
            NodeKind::Widget(data) => Some(&mut data.style),
            _ => None,
        }
    }

    /// Title of kinds that carry one.
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::TractStack(data) => Some(&data.title),
            NodeKind::StoryFragment(data) => Some(&data.title),
            NodeKind::Pane(data) => Some(&data.title),
            NodeKind::Menu(data) => Some(&data.title),
            NodeKind::Resource(data) => Some(&data.title),
            NodeKind::Impression(data) => Some(&data.title),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        let a = NodeId::generate();
        let b = NodeId::generate();
        assert_ne!(a, b);
        assert!(!a.is_root());
        assert!(NodeId::root().is_root());
    }

    #[test]
    fn test_tag_name_round_trips_through_string() {
        for raw in ["p", "h3", "li", "code", "aside"] {
            let tag = TagName::from(raw);
            assert_eq!(String::from(tag.clone()), raw);
            assert_eq!(tag.as_str(), raw);
        }
        assert_eq!(TagName::from("aside"), TagName::Custom("aside".to_string()));
    }

    #[test]
    fn test_node_json_uses_node_type_tag() {
        let parent = NodeId::from("md");
        let node = Node::new(
            &parent,
            NodeKind::TagElement(TagElementData::new("p").with_copy("Hello")),
        )
        .with_id("p1");

        let json = serde_json::to_value(&node).expect("serialize");
        assert_eq!(json["nodeType"], "TagElement");
        assert_eq!(json["tagName"], "p");
        assert_eq!(json["parentId"], "md");

        let back: Node = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, node);
    }

    #[test]
    fn test_style_only_on_wrapping_kinds() {
        let parent = NodeId::root();
        let pane = Node::new(&parent, NodeKind::Pane(PaneData::default()));
        assert!(pane.style().is_none());

        let tag = Node::new(&parent, NodeKind::TagElement(TagElementData::new("p")));
        assert!(tag.style().is_some());
        assert_eq!(tag.tag_name(), Some(&TagName::P));
    }
}
