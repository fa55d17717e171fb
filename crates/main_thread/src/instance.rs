//! Native-backed instance tree.
//!
//! Instances are created unmaterialised. `ensure_elements` runs the template
//! factory and attaches children per slot kind; from then on every structural
//! or value change on the instance is mirrored on the host immediately.

use core_types::{ElementRef, InstanceId};
use serde_json::Value as JsonValue;
use snapshot::value::json_equal;
use snapshot::{
    ElementHost, InstanceTree, NodeType, SerializedSnapshot, SlotKind, SnapshotTemplate,
    TemplateRegistry, TreeError, UpdateContext,
};
use std::sync::Arc;

const FALLBACK_EVENT_TYPE: &str = "bindEvent";

#[derive(Debug)]
pub struct MainInstance {
    ty: NodeType,
    values: Option<Vec<JsonValue>>,
    elements: Option<Vec<ElementRef>>,
    current_slot_index: usize,
}

impl MainInstance {
    pub fn ty(&self) -> &NodeType {
        &self.ty
    }

    pub fn values(&self) -> Option<&[JsonValue]> {
        self.values.as_deref()
    }

    pub fn elements(&self) -> Option<&[ElementRef]> {
        self.elements.as_deref()
    }

    pub fn element_root(&self) -> Option<ElementRef> {
        self.elements.as_ref().and_then(|elements| elements.first().copied())
    }
}

pub struct MainThreadTree<H> {
    registry: TemplateRegistry,
    tree: InstanceTree<MainInstance>,
    next_id: i32,
    host: H,
}

impl<H: ElementHost> MainThreadTree<H> {
    pub fn new(registry: TemplateRegistry, host: H) -> Self {
        Self {
            registry,
            tree: InstanceTree::new(),
            next_id: 0,
            host,
        }
    }

    pub fn registry(&self) -> &TemplateRegistry {
        &self.registry
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub fn contains(&self, id: InstanceId) -> bool {
        self.tree.contains(id)
    }

    pub fn get(&self, id: InstanceId) -> Option<&MainInstance> {
        self.tree.get(id)
    }

    pub fn parent_node(&self, id: InstanceId) -> Option<InstanceId> {
        self.tree.parent(id)
    }

    pub fn first_child(&self, id: InstanceId) -> Option<InstanceId> {
        self.tree.first_child(id)
    }

    pub fn next_sibling(&self, id: InstanceId) -> Option<InstanceId> {
        self.tree.next_sibling(id)
    }

    pub fn child_nodes(&self, id: InstanceId) -> Vec<InstanceId> {
        self.tree.child_ids(id)
    }

    /// Registers a new instance. Without an explicit id the next main-thread
    /// id is allocated.
    pub fn create(
        &mut self,
        ty: impl Into<NodeType>,
        id: Option<InstanceId>,
    ) -> Result<InstanceId, TreeError> {
        let id = match id {
            Some(id) => id,
            None => {
                self.next_id -= 1;
                InstanceId(self.next_id)
            }
        };
        self.tree.insert(
            id,
            MainInstance {
                ty: ty.into(),
                values: None,
                elements: None,
                current_slot_index: 0,
            },
        )?;
        Ok(id)
    }

    /// Builds instances for a serialized tree, keeping its ids, and
    /// materialises it. Used for the first screen.
    pub fn mount(&mut self, snapshot: &SerializedSnapshot) -> Result<InstanceId, TreeError> {
        let id = self.mount_unrendered(snapshot)?;
        self.ensure_elements(id)?;
        Ok(id)
    }

    fn mount_unrendered(&mut self, snapshot: &SerializedSnapshot) -> Result<InstanceId, TreeError> {
        let id = self.create(snapshot.ty.clone(), Some(snapshot.id))?;
        if let Some(values) = &snapshot.values {
            self.tree.try_get_mut(id)?.values = Some(values.clone());
        }
        for child in snapshot.children() {
            let child = self.mount_unrendered(child)?;
            self.tree.append_child(id, child)?;
        }
        Ok(id)
    }

    fn template(&self, id: InstanceId) -> Result<Option<Arc<SnapshotTemplate>>, TreeError> {
        let ty = &self.tree.try_get(id)?.ty;
        Ok(self.registry.get(ty).cloned())
    }

    /// Runs the template factory for `id`, applies pending values and, unless
    /// the instance is a list holder, materialises and attaches its children.
    pub fn ensure_elements(&mut self, id: InstanceId) -> Result<(), TreeError> {
        let template = self.template(id)?;
        let elements = match template.as_ref().and_then(|t| t.create_fn()) {
            Some(create) => create(&mut self.host),
            None => {
                log::warn!(target: "main_thread.instance", "no factory for instance {id}");
                Vec::new()
            }
        };
        let instance = self.tree.try_get_mut(id)?;
        instance.elements = Some(elements);
        if let Some(values) = instance.values.take() {
            self.set_values(id, values)?;
        }

        let Some(template) = template else {
            return Ok(());
        };
        if template.is_list_holder() {
            return Ok(());
        }

        let mut slot_index = 0;
        for child in self.tree.child_ids(id) {
            self.ensure_elements(child)?;
            let Some(&(kind, element_index)) = template.slots().get(slot_index) else {
                log::warn!(
                    target: "main_thread.instance",
                    "instance {id} has more children than slots"
                );
                break;
            };
            self.attach(id, child, kind, element_index);
            if !kind.is_dynamic_run() {
                slot_index += 1;
            }
        }
        Ok(())
    }

    fn attach(&mut self, parent: InstanceId, child: InstanceId, kind: SlotKind, element_index: usize) {
        let Some(child_root) = self.tree.get(child).and_then(MainInstance::element_root) else {
            return;
        };
        let Some(anchor) = self
            .tree
            .get(parent)
            .and_then(|p| p.elements.as_ref())
            .and_then(|elements| elements.get(element_index).copied())
        else {
            log::warn!(
                target: "main_thread.instance",
                "instance {parent} has no element {element_index}"
            );
            return;
        };
        match kind {
            SlotKind::Slot => self.replace_anchor(parent, element_index, child_root, anchor),
            SlotKind::MultiChildren => {
                if self.host.tag(anchor) == Some("wrapper") {
                    self.host.replace_element(child_root, anchor);
                } else {
                    self.host.append_element(anchor, child_root);
                }
            }
            SlotKind::Children | SlotKind::ListChildren => {
                self.host.append_element(anchor, child_root);
            }
        }
    }

    fn replace_anchor(
        &mut self,
        parent: InstanceId,
        element_index: usize,
        child_root: ElementRef,
        anchor: ElementRef,
    ) {
        self.host.replace_element(child_root, anchor);
        if let Some(slot) = self
            .tree
            .get_mut(parent)
            .and_then(|p| p.elements.as_mut())
            .and_then(|elements| elements.get_mut(element_index))
        {
            *slot = child_root;
        }
    }

    /// Moves or inserts `node` under `parent` before `before` (or last) and
    /// mirrors the change on the host when `parent` is materialised.
    pub fn insert_before(
        &mut self,
        parent: InstanceId,
        node: InstanceId,
        before: Option<InstanceId>,
    ) -> Result<(), TreeError> {
        let template = self.template(parent)?;
        if template.as_ref().is_some_and(|t| t.is_list_holder()) {
            return self.tree.insert_before(parent, node, before);
        }

        let should_remove = self.tree.parent(node) == Some(parent);
        self.tree.insert_before(parent, node, before)?;

        let Some(parent_elements) = self.tree.get(parent).and_then(|p| p.elements.clone()) else {
            return Ok(());
        };
        if self.tree.get(node).is_some_and(|n| n.elements.is_none()) {
            self.ensure_elements(node)?;
        }
        let Some(template) = template else {
            return Ok(());
        };
        let Some(node_root) = self.tree.get(node).and_then(MainInstance::element_root) else {
            return Ok(());
        };

        match template.slots() {
            [] => {}
            [(_, element_index)] => {
                let Some(&anchor) = parent_elements.get(*element_index) else {
                    return Ok(());
                };
                if should_remove {
                    self.host.remove_element(anchor, node_root);
                }
                match before.and_then(|b| self.tree.get(b)).and_then(MainInstance::element_root) {
                    Some(before_root) => {
                        self.host.insert_element_before(anchor, node_root, Some(before_root))
                    }
                    None => self.host.append_element(anchor, node_root),
                }
            }
            slots => {
                let Some(instance) = self.tree.get_mut(parent) else {
                    return Ok(());
                };
                let index = instance.current_slot_index;
                instance.current_slot_index += 1;
                let Some(&(kind, element_index)) = slots.get(index) else {
                    log::warn!(
                        target: "main_thread.instance",
                        "instance {parent} has no slot {index}"
                    );
                    return Ok(());
                };
                let Some(&anchor) = parent_elements.get(element_index) else {
                    return Ok(());
                };
                match kind {
                    SlotKind::Slot => self.replace_anchor(parent, element_index, node_root, anchor),
                    SlotKind::MultiChildren => {
                        if self.host.tag(anchor) == Some("wrapper") {
                            self.host.replace_element(node_root, anchor);
                        } else {
                            self.host.append_element(anchor, node_root);
                        }
                    }
                    SlotKind::Children | SlotKind::ListChildren => {}
                }
            }
        }
        Ok(())
    }

    pub fn append_child(&mut self, parent: InstanceId, node: InstanceId) -> Result<(), TreeError> {
        self.insert_before(parent, node, None)
    }

    /// Detaches `node` from `parent` and drops its whole subtree from the
    /// lookup table. Returns the dropped ids in pre-order.
    pub fn remove_child(
        &mut self,
        parent: InstanceId,
        node: InstanceId,
    ) -> Result<Vec<InstanceId>, TreeError> {
        let template = self.template(parent)?;
        let node_root = self.tree.get(node).and_then(MainInstance::element_root);
        self.tree.remove_child(parent, node)?;

        let removed = self.tree.subtree_ids(node);
        for &id in &removed {
            self.tree.forget(id);
        }

        let Some(template) = template.filter(|t| !t.is_list_holder()) else {
            return Ok(removed);
        };
        let anchor = template.slots().first().and_then(|&(_, element_index)| {
            self.tree
                .get(parent)
                .and_then(|p| p.elements.as_ref())
                .and_then(|elements| elements.get(element_index).copied())
        });
        if let (Some(anchor), Some(node_root)) = (anchor, node_root) {
            self.host.remove_element(anchor, node_root);
        }
        Ok(removed)
    }

    /// Bulk value write. Update functions run only for indices whose value
    /// changed.
    pub fn set_values(&mut self, id: InstanceId, values: Vec<JsonValue>) -> Result<(), TreeError> {
        let instance = self.tree.try_get_mut(id)?;
        let old = instance.values.replace(values.clone());
        for (index, value) in values.iter().enumerate() {
            let old = old.as_ref().and_then(|old| old.get(index));
            if old.is_some_and(|old| json_equal(old, value)) {
                continue;
            }
            self.run_update(id, index, value, old)?;
        }
        Ok(())
    }

    /// Single-index write. The update function always runs.
    pub fn set_attribute(&mut self, id: InstanceId, index: usize, value: JsonValue) -> Result<(), TreeError> {
        let instance = self.tree.try_get_mut(id)?;
        let values = instance.values.get_or_insert_with(Vec::new);
        if values.len() <= index {
            values.resize(index + 1, JsonValue::Null);
        }
        let old = std::mem::replace(&mut values[index], value.clone());
        self.run_update(id, index, &value, Some(&old))
    }

    fn run_update(
        &mut self,
        id: InstanceId,
        index: usize,
        value: &JsonValue,
        old: Option<&JsonValue>,
    ) -> Result<(), TreeError> {
        let template = self.template(id)?;
        let Some(elements) = self.tree.try_get(id)?.elements.clone() else {
            return Ok(());
        };
        match template.as_ref().and_then(|t| t.update_fn(index)) {
            Some(update) => {
                let ctx = UpdateContext {
                    id,
                    index,
                    elements: &elements,
                    value,
                    old,
                };
                update(&mut self.host, &ctx);
            }
            None => {
                if let Some(&root) = elements.first() {
                    self.fallback_update(root, id, index, value, old);
                }
            }
        }
        Ok(())
    }

    /// Value with no update function: this instance's own handler key
    /// `"{id}:{index}:"` binds an event named after the index, anything else
    /// lands in an attribute of the same name.
    fn fallback_update(
        &mut self,
        root: ElementRef,
        id: InstanceId,
        index: usize,
        value: &JsonValue,
        old: Option<&JsonValue>,
    ) {
        let name = index.to_string();
        let key = format!("{id}:{index}:");
        let is_handler = |value: Option<&JsonValue>| value.and_then(JsonValue::as_str) == Some(key.as_str());
        if is_handler(Some(value)) {
            self.host.set_event(root, FALLBACK_EVENT_TYPE, &name, Some(&key));
            return;
        }
        if is_handler(old) {
            self.host.set_event(root, FALLBACK_EVENT_TYPE, &name, None);
        }
        self.host.set_attribute(root, &name, value);
    }

    /// The `{id, type, values?, children?}` form of the subtree at `id`.
    pub fn serialize(&self, id: InstanceId) -> Option<SerializedSnapshot> {
        let instance = self.tree.get(id)?;
        let children = self.tree.child_ids(id);
        let children = (!children.is_empty())
            .then(|| children.into_iter().filter_map(|c| self.serialize(c)).collect());
        Some(SerializedSnapshot {
            id,
            ty: instance.ty.clone(),
            values: instance.values.clone(),
            children,
        })
    }

    /// Drops every instance; ids keep counting down.
    pub fn clear(&mut self) {
        self.tree.clear();
    }

    pub fn reset(&mut self) {
        self.clear();
        self.next_id = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_host::MemoryHost;
    use serde_json::json;
    use snapshot::template::update;

    fn registry() -> TemplateRegistry {
        let mut registry = TemplateRegistry::new();
        registry.register(
            SnapshotTemplate::new("view")
                .create(|host| vec![host.create_element("view")])
                .update(0, update::attribute(0, "class"))
                .slot(SlotKind::Children, 0),
        );
        registry.register(
            SnapshotTemplate::new("pair")
                .create(|host| {
                    let pair = host.create_element("pair");
                    let left = host.create_element("left");
                    let right = host.create_element("right");
                    host.append_element(pair, left);
                    host.append_element(pair, right);
                    vec![pair, left, right]
                })
                .slot(SlotKind::Slot, 1)
                .slot(SlotKind::Slot, 2),
        );
        registry.register(SnapshotTemplate::new("bare").create(|host| vec![host.create_element("bare")]));
        registry
    }

    fn page_tree() -> (MainThreadTree<MemoryHost>, InstanceId) {
        let mut tree = MainThreadTree::new(registry(), MemoryHost::new());
        let root = tree.create(NodeType::root(), None).expect("root");
        tree.ensure_elements(root).expect("render");
        (tree, root)
    }

    #[test]
    fn ids_count_down() {
        let (mut tree, root) = page_tree();
        assert_eq!(root, InstanceId(-1));
        assert_eq!(tree.create("view", None).expect("create"), InstanceId(-2));
        assert_eq!(tree.create("view", Some(InstanceId(7))).expect("create"), InstanceId(7));
        assert_eq!(
            tree.create("view", Some(InstanceId(7))),
            Err(TreeError::DuplicateInstance(InstanceId(7)))
        );
    }

    #[test]
    fn insert_before_orders_children_and_elements() {
        let (mut tree, root) = page_tree();
        let a = tree.create("view", None).expect("a");
        let b = tree.create("view", None).expect("b");
        tree.set_values(a, vec![json!("a")]).expect("values");
        tree.set_values(b, vec![json!("b")]).expect("values");
        tree.insert_before(root, a, None).expect("insert a");
        tree.insert_before(root, b, Some(a)).expect("insert b");

        assert_eq!(tree.child_nodes(root), vec![b, a]);
        assert_eq!(
            tree.host().render(),
            vec!["<page>", "  <view class=\"b\">", "  <view class=\"a\">"]
        );

        tree.insert_before(root, b, None).expect("move b");
        assert_eq!(tree.child_nodes(root), vec![a, b]);
        assert_eq!(
            tree.host().render(),
            vec!["<page>", "  <view class=\"a\">", "  <view class=\"b\">"]
        );
    }

    #[test]
    fn removing_a_non_child_fails() {
        let (mut tree, root) = page_tree();
        let a = tree.create("view", None).expect("a");
        let b = tree.create("view", None).expect("b");
        tree.append_child(root, a).expect("append");
        assert_eq!(
            tree.remove_child(root, b),
            Err(TreeError::NotAChild {
                parent: root,
                child: b
            })
        );
        assert_eq!(tree.child_nodes(root), vec![a]);
    }

    #[test]
    fn remove_child_drops_subtree() {
        let (mut tree, root) = page_tree();
        let a = tree.create("view", None).expect("a");
        let inner = tree.create(NodeType::Text, None).expect("text");
        tree.append_child(a, inner).expect("append");
        tree.append_child(root, a).expect("append");
        tree.set_values(inner, vec![json!("x")]).expect("values");
        assert_eq!(tree.host().render().len(), 3);

        assert_eq!(tree.remove_child(root, a).expect("remove"), vec![a, inner]);
        assert!(!tree.contains(a) && !tree.contains(inner));
        assert_eq!(tree.host().render(), vec!["<page>"]);
    }

    #[test]
    fn slots_replace_their_anchor() {
        let (mut tree, root) = page_tree();
        let pair = tree.create("pair", None).expect("pair");
        let left = tree.create("view", None).expect("left");
        let right = tree.create(NodeType::Text, None).expect("right");
        tree.set_values(right, vec![json!("r")]).expect("values");
        tree.append_child(pair, left).expect("left");
        tree.append_child(pair, right).expect("right");
        tree.append_child(root, pair).expect("pair");

        assert_eq!(
            tree.host().render(),
            vec!["<page>", "  <pair>", "    <view>", "    \"r\""]
        );
    }

    #[test]
    fn multi_slot_parent_consumes_slots_in_order() {
        let (mut tree, root) = page_tree();
        let pair = tree.create("pair", None).expect("pair");
        tree.append_child(root, pair).expect("pair");
        let left = tree.create("bare", None).expect("left");
        let right = tree.create("view", None).expect("right");
        tree.append_child(pair, left).expect("left");
        tree.append_child(pair, right).expect("right");
        assert_eq!(
            tree.host().render(),
            vec!["<page>", "  <pair>", "    <bare>", "    <view>"]
        );
    }

    #[test]
    fn values_apply_only_changed_indices() {
        let (mut tree, root) = page_tree();
        let a = tree.create("view", None).expect("a");
        tree.append_child(root, a).expect("append");
        tree.set_values(a, vec![json!("x"), json!(2)]).expect("values");
        let calls = tree.host().calls();
        tree.set_values(a, vec![json!("x"), json!(2.0)]).expect("same");
        assert_eq!(tree.host().calls(), calls);

        tree.set_values(a, vec![json!("y"), json!(3)]).expect("changed");
        assert_eq!(tree.host().calls(), calls + 2);
        let element = tree.get(a).and_then(MainInstance::element_root).expect("element");
        assert_eq!(tree.host().attribute(element, "class"), Some(&json!("y")));
        // No update function for index 1: generic attribute on the root element.
        assert_eq!(tree.host().attribute(element, "1"), Some(&json!(3)));

        tree.set_attribute(a, 0, json!("y")).expect("single");
        assert_eq!(tree.host().calls(), calls + 3);
    }

    #[test]
    fn handler_keys_without_update_bind_events() {
        let (mut tree, root) = page_tree();
        let a = tree.create("view", None).expect("a");
        tree.append_child(root, a).expect("append");
        let key = format!("{a}:1:");
        tree.set_values(a, vec![json!("c"), json!(key)]).expect("bind");
        let element = tree.get(a).and_then(MainInstance::element_root).expect("element");
        let record = tree.host().element(element).expect("record");
        assert_eq!(
            record.events.get(&("bindEvent".to_string(), "1".to_string())),
            Some(&key)
        );
        assert_eq!(tree.host().attribute(element, "1"), None);

        // Another instance's key is just a string.
        tree.set_attribute(a, 1, json!("-99:1:")).expect("foreign");
        let record = tree.host().element(element).expect("record");
        assert!(record.events.is_empty());
        assert_eq!(tree.host().attribute(element, "1"), Some(&json!("-99:1:")));

        tree.set_attribute(a, 1, json!(key)).expect("rebind");
        tree.set_attribute(a, 1, JsonValue::Null).expect("unbind");
        let record = tree.host().element(element).expect("record");
        assert!(record.events.is_empty());
        assert_eq!(tree.host().attribute(element, "1"), None);
    }

    #[test]
    fn unrendered_instances_make_no_host_calls() {
        let mut tree = MainThreadTree::new(registry(), MemoryHost::new());
        let a = tree.create("view", None).expect("a");
        tree.set_values(a, vec![json!("x")]).expect("values");
        tree.set_attribute(a, 0, json!("y")).expect("single");
        assert_eq!(tree.host().calls(), 0);
        assert_eq!(tree.get(a).and_then(MainInstance::values), Some(&[json!("y")][..]));
    }

    #[test]
    fn mount_keeps_ids_and_serializes_back() {
        let snapshot = SerializedSnapshot::new(InstanceId(-1), NodeType::root()).with_children(vec![
            SerializedSnapshot::new(InstanceId(-2), "view")
                .with_values(vec![json!("c")])
                .with_children(vec![
                    SerializedSnapshot::new(InstanceId(-3), NodeType::Text).with_values(vec![json!("t")]),
                ]),
        ]);
        let mut tree = MainThreadTree::new(registry(), MemoryHost::new());
        let root = tree.mount(&snapshot).expect("mount");
        assert_eq!(tree.serialize(root), Some(snapshot));
        assert_eq!(
            tree.host().render(),
            vec!["<page>", "  <view class=\"c\">", "    \"t\""]
        );
    }
}
