//! Fixture templates and builders turning tree notation into instance trees.

use core_types::InstanceId;
use snapshot::template::update;
use snapshot::{
    BackgroundTree, NodeType, SerializedSnapshot, SlotKind, SnapshotTemplate, TemplateRegistry,
    TreeError, Value,
};

use crate::notation::TreeSpec;

/// Built-ins plus the templates the corpus is written against:
///
/// - `view`: one element, value 0 is `class`, dynamic children.
/// - `item`: leaf element, value 0 is `key`.
/// - `list`: list holder.
/// - `card`: element 0 with two single-child slots on elements 1 and 2.
/// - `button`: value 0 is a tap handler, value 1 a spread.
pub fn fixture_registry() -> TemplateRegistry {
    let mut registry = TemplateRegistry::new();
    registry.register(
        SnapshotTemplate::new("view")
            .create(|host| vec![host.create_element("view")])
            .update(0, update::attribute(0, "class"))
            .slot(SlotKind::Children, 0),
    );
    registry.register(
        SnapshotTemplate::new("item")
            .create(|host| vec![host.create_element("item")])
            .update(0, update::attribute(0, "key")),
    );
    registry.register(
        SnapshotTemplate::new("list")
            .create(|host| vec![host.create_element("list")])
            .slot(SlotKind::ListChildren, 0),
    );
    registry.register(
        SnapshotTemplate::new("card")
            .create(|host| {
                let card = host.create_element("card");
                let header = host.create_element("header");
                let body = host.create_element("body");
                host.append_element(card, header);
                host.append_element(card, body);
                vec![card, header, body]
            })
            .update(0, update::attribute(0, "class"))
            .slot(SlotKind::Slot, 1)
            .slot(SlotKind::Slot, 2),
    );
    registry.register(
        SnapshotTemplate::new("button")
            .create(|host| vec![host.create_element("button")])
            .update(0, update::event(0, "bindEvent", "tap"))
            .update(1, update::spread(0)),
    );
    registry
}

pub fn node_type(spec: &TreeSpec) -> NodeType {
    spec.ty.as_deref().map_or(NodeType::Text, NodeType::template)
}

/// Serialized main-thread form of `spec`, numbering ids `-1, -2, ...` in
/// pre-order.
pub fn serialized_from_spec(spec: &TreeSpec) -> SerializedSnapshot {
    fn build(spec: &TreeSpec, next: &mut i32) -> SerializedSnapshot {
        let id = InstanceId(*next);
        *next -= 1;
        let mut node = SerializedSnapshot::new(id, node_type(spec));
        node.values = spec.values.clone();
        if !spec.children.is_empty() {
            let children = spec.children.iter().map(|child| build(child, next)).collect();
            node.children = Some(children);
        }
        node
    }
    let mut next = -1;
    build(spec, &mut next)
}

pub fn spec_from_serialized(node: &SerializedSnapshot) -> TreeSpec {
    TreeSpec {
        ty: node.ty.as_str().map(str::to_owned),
        values: node.values.clone(),
        children: node.children().iter().map(spec_from_serialized).collect(),
    }
}

/// Creates `spec` in the background tree, pre-order, and returns the root.
pub fn build_background(tree: &mut BackgroundTree, spec: &TreeSpec) -> Result<InstanceId, TreeError> {
    let id = tree.create(node_type(spec))?;
    if let Some(values) = &spec.values {
        tree.set_values(id, values.iter().map(Value::from_json).collect())?;
    }
    for child in &spec.children {
        let child = build_background(tree, child)?;
        tree.append_child(id, child)?;
    }
    Ok(id)
}

/// Rendered notation of the background subtree at `id`, empty when the id
/// is unknown.
pub fn render_background(tree: &BackgroundTree, id: InstanceId) -> Vec<String> {
    tree.serialize(id)
        .map(|node| spec_from_serialized(&node).render())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notation::parse_tree;

    #[test]
    fn serialized_ids_are_pre_order_negative() {
        let spec = parse_tree("root\n  view [\"a\"]\n    #text [\"t\"]\n  item").expect("parse");
        let node = serialized_from_spec(&spec);
        assert_eq!(node.id, InstanceId(-1));
        assert_eq!(node.children()[0].children()[0].id, InstanceId(-3));
        assert_eq!(node.children()[1].id, InstanceId(-4));
        assert_eq!(spec_from_serialized(&node), spec);
    }

    #[test]
    fn background_build_round_trips() {
        let spec = parse_tree("root\n  view [\"a\"]\n    #text [\"t\"]").expect("parse");
        let mut tree = BackgroundTree::new(fixture_registry());
        let root = build_background(&mut tree, &spec).expect("build");
        assert_eq!(root, InstanceId(1));
        assert_eq!(render_background(&tree, root), spec.render());
    }
}
