use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Type of a snapshot instance: a template id, or the raw text type.
///
/// On the wire the text type is `null` and template ids are plain strings.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum NodeType {
    Text,
    Template(Arc<str>),
}

impl NodeType {
    pub const ROOT: &'static str = "root";
    pub const WRAPPER: &'static str = "wrapper";

    pub fn template(name: &str) -> Self {
        NodeType::Template(Arc::from(name))
    }

    pub fn root() -> Self {
        Self::template(Self::ROOT)
    }

    pub fn wrapper() -> Self {
        Self::template(Self::WRAPPER)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            NodeType::Text => None,
            NodeType::Template(name) => Some(&**name),
        }
    }
}

impl From<Option<String>> for NodeType {
    fn from(value: Option<String>) -> Self {
        match value {
            None => NodeType::Text,
            Some(name) => NodeType::Template(Arc::from(name)),
        }
    }
}

impl From<NodeType> for Option<String> {
    fn from(value: NodeType) -> Self {
        value.as_str().map(str::to_owned)
    }
}

impl From<&str> for NodeType {
    fn from(value: &str) -> Self {
        NodeType::template(value)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeType::Text => f.write_str("#text"),
            NodeType::Template(name) => f.write_str(name),
        }
    }
}

/// How a template exposes one of its dynamic child positions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SlotKind {
    /// Exactly one child replacing the anchor element.
    Slot,
    /// Compat form of `Slot`: replaces a `wrapper` anchor, otherwise appends.
    MultiChildren,
    /// A homogeneous dynamic run appended under the anchor.
    Children,
    /// Like `Children`, but the anchor is a list element managed elsewhere.
    ListChildren,
}

impl SlotKind {
    /// Whether children in this slot are reconciled with the array diff.
    pub fn is_dynamic_run(self) -> bool {
        matches!(self, SlotKind::Children | SlotKind::ListChildren)
    }
}
