//! Viewport-scoped style records and the class/property resolver.
//!
//! A node carries a local record per viewport and, when it stands in for
//! several nested wrapper elements, an ordered list of layers (outermost
//! first). Resolution merges layers left to right and the local record last;
//! tag elements inside a markdown fragment start from the fragment's
//! per-tag defaults.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::node::{NodeId, NodeKind, NodeType};
use crate::store::NodeStore;

/// Style property → value. Ordered so resolved output is stable.
pub type StyleRecord = BTreeMap<String, String>;

/// Breakpoint target used in style resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Viewport {
    /// Narrow screens; unprefixed classes.
    Mobile,
    /// Medium screens; `md:` classes.
    Tablet,
    /// Wide screens; `xl:` classes.
    Desktop,
}

impl Viewport {
    /// All viewports, narrowest first.
    pub const ALL: [Self; 3] = [Self::Mobile, Self::Tablet, Self::Desktop];

    /// Class prefix used in responsive output.
    #[must_use]
    pub const fn responsive_prefix(self) -> &'static str {
        match self {
            Self::Mobile => "",
            Self::Tablet => "md:",
            Self::Desktop => "xl:",
        }
    }
}

impl std::str::FromStr for Viewport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mobile" => Ok(Self::Mobile),
            "tablet" => Ok(Self::Tablet),
            "desktop" => Ok(Self::Desktop),
            other => Err(format!("unknown viewport: {other}")),
        }
    }
}

/// One style record per viewport.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewportStyles {
    /// Mobile record.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub mobile: StyleRecord,
    /// Tablet record.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tablet: StyleRecord,
    /// Desktop record.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub desktop: StyleRecord,
}

impl ViewportStyles {
    /// Record for a viewport.
    #[must_use]
    pub fn get(&self, viewport: Viewport) -> &StyleRecord {
        match viewport {
            Viewport::Mobile => &self.mobile,
            Viewport::Tablet => &self.tablet,
            Viewport::Desktop => &self.desktop,
        }
    }

    /// Mutable record for a viewport.
    pub fn get_mut(&mut self, viewport: Viewport) -> &mut StyleRecord {
        match viewport {
            Viewport::Mobile => &mut self.mobile,
            Viewport::Tablet => &mut self.tablet,
            Viewport::Desktop => &mut self.desktop,
        }
    }

    /// Builder-style setter.
    #[must_use]
    pub fn with(mut self, viewport: Viewport, key: &str, value: &str) -> Self {
        self.get_mut(viewport)
            .insert(key.to_string(), value.to_string());
        self
    }

    /// Set a value on every viewport.
    #[must_use]
    pub fn with_all(mut self, key: &str, value: &str) -> Self {
        for viewport in Viewport::ALL {
            self = self.with(viewport, key, value);
        }
        self
    }

    /// Whether all three records are empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mobile.is_empty() && self.tablet.is_empty() && self.desktop.is_empty()
    }
}

/// Local record plus wrapper layers of a styled node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementStyle {
    /// The node's own record; highest precedence.
    #[serde(default)]
    pub local: ViewportStyles,
    /// Wrapper layers, outermost first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub layers: Vec<ViewportStyles>,
}

impl ElementStyle {
    /// Style with only a local record.
    #[must_use]
    pub fn local(local: ViewportStyles) -> Self {
        Self {
            local,
            layers: Vec::new(),
        }
    }

    /// Append an inner wrapper layer.
    #[must_use]
    pub fn with_layer(mut self, layer: ViewportStyles) -> Self {
        self.layers.push(layer);
        self
    }
}

/// Utility-class name for known selector keys.
const SELECTOR_CLASSES: &[(&str, &str)] = &[
    ("textCOLOR", "text"),
    ("bgCOLOR", "bg"),
    ("borderCOLOR", "border"),
    ("textSIZE", "text"),
    ("fontWEIGHT", "font"),
    ("fontFAMILY", "font"),
    ("textALIGN", "text"),
    ("maxW", "max-w"),
    ("minH", "min-h"),
    ("gridCols", "grid-cols"),
    ("colSpan", "col-span"),
    ("rowSpan", "row-span"),
    ("borderSTYLE", "border"),
    ("borderWIDTH", "border"),
    ("objectFIT", "object"),
];

fn class_name_for(selector: &str) -> &str {
    SELECTOR_CLASSES
        .iter()
        .find(|(key, _)| *key == selector)
        .map_or(selector, |(_, class)| *class)
}

/// Reduce one `selector: value` pair to a utility class.
///
/// Returns `None` for values that produce no class (`"false"`, empty).
#[must_use]
pub fn reduce_class_name(selector: &str, value: &str) -> Option<String> {
    if selector.is_empty() || value.is_empty() || value == "false" {
        return None;
    }
    let class = class_name_for(selector);
    let reduced = if value == "true" {
        class.to_string()
    } else if let Some(rest) = value.strip_prefix('!') {
        format!("-{class}-{rest}")
    } else if selector == "animate" {
        format!("motion-safe:{class}-{value}")
    } else if value.starts_with('-') {
        format!("-{class}{value}")
    } else {
        format!("{class}-{value}")
    };
    Some(reduced)
}

/// Reduce a whole record to a space-separated class string, key order.
#[must_use]
pub fn reduce_record(record: &StyleRecord) -> String {
    record
        .iter()
        .filter_map(|(selector, value)| reduce_class_name(selector, value))
        .collect::<Vec<_>>()
        .join(" ")
}

fn strip_viewport_prefix(class: &str) -> &str {
    ["xs:", "md:", "xl:"]
        .iter()
        .find_map(|p| class.strip_prefix(p))
        .unwrap_or(class)
}

/// Combine per-viewport class strings into one breakpoint-scoped string.
///
/// Mobile classes are kept bare. A tablet class is emitted with `md:` unless
/// mobile already has it; a desktop class with `xl:` unless mobile or tablet
/// already has it.
#[must_use]
pub fn combine_responsive(mobile: &str, tablet: &str, desktop: &str) -> String {
    let mobile: Vec<&str> = mobile.split_whitespace().collect();
    let tablet: Vec<&str> = tablet.split_whitespace().map(strip_viewport_prefix).collect();
    let desktop: Vec<&str> = desktop.split_whitespace().map(strip_viewport_prefix).collect();

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for class in &mobile {
        if seen.insert((*class).to_string()) {
            out.push((*class).to_string());
        }
    }
    for class in &tablet {
        if !mobile.contains(class) {
            let scoped = format!("md:{class}");
            if seen.insert(scoped.clone()) {
                out.push(scoped);
            }
        }
    }
    for class in &desktop {
        if !mobile.contains(class) && !tablet.contains(class) {
            let scoped = format!("xl:{class}");
            if seen.insert(scoped.clone()) {
                out.push(scoped);
            }
        }
    }
    out.join(" ")
}

fn merge_into(target: &mut StyleRecord, source: &StyleRecord) {
    for (key, value) in source {
        target.insert(key.clone(), value.clone());
    }
}

/// Read-only style resolution over a [`NodeStore`].
#[derive(Debug, Clone, Copy)]
pub struct StyleResolver<'a> {
    store: &'a NodeStore,
}

impl<'a> StyleResolver<'a> {
    /// Resolver over a store.
    #[must_use]
    pub const fn new(store: &'a NodeStore) -> Self {
        Self { store }
    }

    /// Merged record for a node on one viewport.
    ///
    /// Order, lowest precedence first: enclosing markdown's tag defaults,
    /// layers 0..N, local record. `None` for unknown or unstyled nodes.
    #[must_use]
    pub fn merged_record(&self, id: &NodeId, viewport: Viewport) -> Option<StyleRecord> {
        let node = self.store.get_by_id(id)?;
        let style = node.style()?;

        let mut merged = StyleRecord::new();
        if let Some(tag) = node.tag_name() {
            let defaults = self
                .store
                .closest_of_kind(id, NodeType::Markdown)
                .and_then(|md| match &md.kind {
                    NodeKind::Markdown(data) => data.tag_defaults.get(tag.as_str()),
                    _ => None,
                });
            if let Some(defaults) = defaults {
                merge_into(&mut merged, defaults.get(viewport));
            }
        }
        for layer in &style.layers {
            merge_into(&mut merged, layer.get(viewport));
        }
        merge_into(&mut merged, style.local.get(viewport));
        Some(merged)
    }

    /// Class string for a node on one viewport.
    ///
    /// With `layer_index`, only that layer is resolved in isolation; an
    /// out-of-range index resolves to an empty string.
    #[must_use]
    pub fn resolve_classes(
        &self,
        id: &NodeId,
        viewport: Viewport,
        layer_index: Option<usize>,
    ) -> String {
        let Some(node) = self.store.get_by_id(id) else {
            return String::new();
        };
        if let NodeKind::StoryFragment(data) = &node.kind {
            return data
                .tailwind_bg_colour
                .as_ref()
                .map(|colour| format!("bg-{colour}"))
                .unwrap_or_default();
        }
        match layer_index {
            Some(index) => node
                .style()
                .and_then(|style| style.layers.get(index))
                .map(|layer| reduce_record(layer.get(viewport)))
                .unwrap_or_default(),
            None => self
                .merged_record(id, viewport)
                .map(|record| reduce_record(&record))
                .unwrap_or_default(),
        }
    }

    /// One class string valid across all viewports.
    #[must_use]
    pub fn resolve_responsive(&self, id: &NodeId, layer_index: Option<usize>) -> String {
        let [mobile, tablet, desktop] =
            Viewport::ALL.map(|viewport| self.resolve_classes(id, viewport, layer_index));
        combine_responsive(&mobile, &tablet, &desktop)
    }

    /// Literal property/value pairs for a node on one viewport.
    #[must_use]
    pub fn resolve_properties(&self, id: &NodeId, viewport: Viewport) -> StyleRecord {
        let Some(node) = self.store.get_by_id(id) else {
            return StyleRecord::new();
        };
        if let NodeKind::Pane(data) = &node.kind {
            let mut props = StyleRecord::new();
            if let Some(colour) = &data.bg_colour {
                props.insert("background-color".to_string(), colour.clone());
            }
            return props;
        }
        self.merged_record(id, viewport).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reduce_class_name_rules() {
        assert_eq!(reduce_class_name("italic", "true").as_deref(), Some("italic"));
        assert_eq!(reduce_class_name("italic", "false"), None);
        assert_eq!(reduce_class_name("textCOLOR", "red-500").as_deref(), Some("text-red-500"));
        assert_eq!(reduce_class_name("mt", "-4").as_deref(), Some("-mt-4"));
        assert_eq!(reduce_class_name("mt", "!4").as_deref(), Some("-mt-4"));
        assert_eq!(
            reduce_class_name("animate", "spin").as_deref(),
            Some("motion-safe:animate-spin")
        );
        assert_eq!(reduce_class_name("px", "8").as_deref(), Some("px-8"));
    }

    #[test]
    fn test_combine_responsive_dedups_against_narrower() {
        let out = combine_responsive("px-4 text-lg", "px-4 text-xl", "text-xl py-2");
        assert_eq!(out, "px-4 text-lg md:text-xl xl:py-2");
    }

    #[test]
    fn test_combine_responsive_strips_existing_prefixes() {
        let out = combine_responsive("", "md:px-2", "xl:px-2");
        assert_eq!(out, "md:px-2");
    }

    #[test]
    fn test_viewport_styles_builder() {
        let styles = ViewportStyles::default()
            .with(Viewport::Mobile, "px", "4")
            .with_all("font", "bold");
        assert_eq!(styles.get(Viewport::Mobile).len(), 2);
        assert_eq!(styles.get(Viewport::Desktop).len(), 1);
        assert!(!styles.is_empty());
    }

    fn styled_store() -> NodeStore {
        use crate::node::{MarkdownData, Node, PaneData, StoryFragmentData, TagElementData};

        let mut tag_defaults = BTreeMap::new();
        tag_defaults.insert(
            "p".to_string(),
            ViewportStyles::default()
                .with(Viewport::Mobile, "textSIZE", "base")
                .with(Viewport::Mobile, "px", "2"),
        );
        let style = ElementStyle::local(ViewportStyles::default().with(Viewport::Mobile, "px", "4"))
            .with_layer(ViewportStyles::default().with(Viewport::Mobile, "maxW", "3xl"))
            .with_layer(
                ViewportStyles::default()
                    .with(Viewport::Mobile, "px", "8")
                    .with(Viewport::Desktop, "py", "12"),
            );

        let mut store = NodeStore::with_root();
        store
            .add_nodes(vec![
                Node::new(
                    &NodeId::root(),
                    NodeKind::StoryFragment(StoryFragmentData {
                        tailwind_bg_colour: Some("slate-100".to_string()),
                        ..StoryFragmentData::default()
                    }),
                )
                .with_id("page"),
                Node::new(
                    &"page".into(),
                    NodeKind::Pane(PaneData {
                        bg_colour: Some("#fff".to_string()),
                        ..PaneData::default()
                    }),
                )
                .with_id("pane"),
                Node::new(
                    &"pane".into(),
                    NodeKind::Markdown(MarkdownData {
                        tag_defaults,
                        ..MarkdownData::default()
                    }),
                )
                .with_id("md"),
                Node::new(
                    &"md".into(),
                    NodeKind::TagElement(TagElementData::new("p").with_style(style)),
                )
                .with_id("p"),
            ])
            .expect("styled store");
        store
    }

    #[test]
    fn test_local_wins_over_layers_and_defaults() {
        let store = styled_store();
        let resolver = StyleResolver::new(&store);
        assert_eq!(
            resolver.resolve_classes(&"p".into(), Viewport::Mobile, None),
            "max-w-3xl px-4 text-base"
        );
        assert_eq!(
            resolver.resolve_classes(&"p".into(), Viewport::Desktop, None),
            "py-12"
        );
    }

    #[test]
    fn test_single_layer_in_isolation() {
        let store = styled_store();
        let resolver = StyleResolver::new(&store);
        assert_eq!(
            resolver.resolve_classes(&"p".into(), Viewport::Mobile, Some(1)),
            "px-8"
        );
        assert_eq!(
            resolver.resolve_classes(&"p".into(), Viewport::Mobile, Some(7)),
            ""
        );
    }

    #[test]
    fn test_responsive_and_container_output() {
        let store = styled_store();
        let resolver = StyleResolver::new(&store);
        assert_eq!(
            resolver.resolve_responsive(&"p".into(), None),
            "max-w-3xl px-4 text-base xl:py-12"
        );
        assert_eq!(
            resolver.resolve_classes(&"page".into(), Viewport::Tablet, None),
            "bg-slate-100"
        );
        let props = resolver.resolve_properties(&"pane".into(), Viewport::Mobile);
        assert_eq!(props.get("background-color").map(String::as_str), Some("#fff"));
        assert_eq!(
            resolver
                .resolve_properties(&"p".into(), Viewport::Mobile)
                .get("px")
                .map(String::as_str),
            Some("4")
        );
        assert_eq!(resolver.resolve_classes(&"ghost".into(), Viewport::Mobile, None), "");
    }

    #[test]
    fn test_viewport_from_str() {
        assert_eq!("tablet".parse::<Viewport>(), Ok(Viewport::Tablet));
        assert!("watch".parse::<Viewport>().is_err());
    }
}
