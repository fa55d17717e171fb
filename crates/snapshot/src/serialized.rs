use core_types::InstanceId;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::list_diff::Typed;
use crate::types::NodeType;

/// JSON form of an instance subtree: `{id, type, values?, children?}`.
///
/// This is what the main thread hands to the background runtime for
/// hydration, and what both trees produce for inspection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SerializedSnapshot {
    pub id: InstanceId,
    #[serde(rename = "type")]
    pub ty: NodeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<JsonValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<SerializedSnapshot>>,
}

impl SerializedSnapshot {
    pub fn new(id: InstanceId, ty: impl Into<NodeType>) -> Self {
        Self {
            id,
            ty: ty.into(),
            values: None,
            children: None,
        }
    }

    pub fn with_values(mut self, values: Vec<JsonValue>) -> Self {
        self.values = Some(values);
        self
    }

    pub fn with_children(mut self, children: Vec<SerializedSnapshot>) -> Self {
        self.children = Some(children);
        self
    }

    pub fn children(&self) -> &[SerializedSnapshot] {
        self.children.as_deref().unwrap_or(&[])
    }

    pub fn value(&self, index: usize) -> Option<&JsonValue> {
        self.values.as_ref().and_then(|values| values.get(index))
    }

    /// Number of instances in this subtree, including `self`.
    pub fn count(&self) -> usize {
        1 + self.children().iter().map(Self::count).sum::<usize>()
    }

    pub fn find(&self, id: InstanceId) -> Option<&SerializedSnapshot> {
        if self.id == id {
            return Some(self);
        }
        self.children().iter().find_map(|child| child.find(id))
    }
}

impl Typed for SerializedSnapshot {
    fn node_type(&self) -> &NodeType {
        &self.ty
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_type_serializes_as_null() {
        let snapshot = SerializedSnapshot::new(InstanceId(-1), NodeType::root()).with_children(vec![
            SerializedSnapshot::new(InstanceId(-2), NodeType::Text).with_values(vec![json!("hi")]),
        ]);
        let json = serde_json::to_value(&snapshot).expect("serialize");
        assert_eq!(
            json,
            json!({
                "id": -1,
                "type": "root",
                "children": [{"id": -2, "type": null, "values": ["hi"]}]
            })
        );
        let back: SerializedSnapshot = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, snapshot);
        assert_eq!(back.count(), 2);
        assert_eq!(back.find(InstanceId(-2)).map(|s| &s.ty), Some(&NodeType::Text));
    }
}
