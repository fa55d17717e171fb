//! Hydration: reconcile a serialized main-thread tree with the background
//! tree rendered from the same output.
//!
//! Ids are not assumed equal up front. Everything outside a template's
//! dynamic child runs is paired positionally; runs are reconciled with the
//! array diff. The operations are emitted through the background tree's own
//! recorder, so the patch is exactly what gets recorded between `init` and
//! `take`.

use core_types::InstanceId;
use serde_json::Value as JsonValue;
use std::fmt;

use crate::background::BackgroundTree;
use crate::list_diff::{ArrayAction, Typed, diff_array_action, try_diff_array};
use crate::serialized::SerializedSnapshot;
use crate::snapshot_patch::{SnapshotOperation, SnapshotPatch};
use crate::spread::transform_spread;
use crate::tree::TreeError;
use crate::types::{NodeType, SlotKind};
use crate::value::{Value, is_truthy_json, json_equal, map_to_json};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HydrateError {
    Tree(TreeError),
    /// A positional slot has no counterpart on one side.
    ShapeMismatch { id: InstanceId, slot: usize },
}

impl fmt::Display for HydrateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HydrateError::Tree(err) => write!(f, "hydration failed: {err}"),
            HydrateError::ShapeMismatch { id, slot } => {
                write!(f, "slot {slot} of instance {id} has no counterpart")
            }
        }
    }
}

impl std::error::Error for HydrateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HydrateError::Tree(err) => Some(err),
            HydrateError::ShapeMismatch { .. } => None,
        }
    }
}

impl From<TreeError> for HydrateError {
    fn from(err: TreeError) -> Self {
        HydrateError::Tree(err)
    }
}

/// Background child as seen by the array diff.
#[derive(Clone, Debug)]
struct AfterChild {
    id: InstanceId,
    ty: NodeType,
}

impl Typed for AfterChild {
    fn node_type(&self) -> &NodeType {
        &self.ty
    }
}

/// Computes the patch turning `before` into the background subtree rooted at
/// `after`, remapping background ids onto main-thread ids as nodes pair up.
///
/// Recording is (re)started before the walk and the log is taken after it.
pub fn hydrate(
    before: &SerializedSnapshot,
    tree: &mut BackgroundTree,
    after: InstanceId,
) -> Result<SnapshotPatch, HydrateError> {
    tree.recorder_mut().init();
    let walked = Hydration { tree: &mut *tree }.node(before, after);
    let patch = tree.recorder_mut().take().unwrap_or_default();
    walked?;
    log::debug!(target: "snapshot.hydrate", "hydrated {} into {} ops", before.id, patch.len());
    Ok(patch)
}

struct Hydration<'t> {
    tree: &'t mut BackgroundTree,
}

impl Hydration<'_> {
    fn node(&mut self, before: &SerializedSnapshot, after: InstanceId) -> Result<(), HydrateError> {
        let id = before.id;
        self.tree.update_id(after, id)?;
        log::trace!(target: "snapshot.hydrate", "pair {after} -> {id}");

        self.values(before, id);

        let Some(ty) = self.tree.type_of(id).cloned() else {
            return Err(TreeError::UnknownInstance(id).into());
        };
        let Some(template) = self.tree.registry().get(&ty).cloned() else {
            log::trace!(target: "snapshot.hydrate", "no template for {ty}, leaf");
            return Ok(());
        };

        let before_children = before.children();
        for (slot, (kind, _)) in template.slots().iter().enumerate() {
            // Earlier slots may have remapped some of these children.
            let after_children = self.after_children(id);
            match kind {
                SlotKind::Slot | SlotKind::MultiChildren => {
                    match (before_children.get(slot), after_children.get(slot)) {
                        (Some(b), Some(a)) => self.node(b, a.id)?,
                        _ => return Err(HydrateError::ShapeMismatch { id, slot }),
                    }
                }
                SlotKind::Children | SlotKind::ListChildren => {
                    self.children(id, before_children, &after_children)?;
                }
            }
        }
        Ok(())
    }

    fn after_children(&self, id: InstanceId) -> Vec<AfterChild> {
        self.tree
            .child_nodes(id)
            .into_iter()
            .filter_map(|child| {
                let ty = self.tree.type_of(child)?.clone();
                Some(AfterChild { id: child, ty })
            })
            .collect()
    }

    /// Resolves each background value the way the main thread would have
    /// stored it and records a `SetAttribute` where the two sides differ.
    fn values(&mut self, before: &SerializedSnapshot, id: InstanceId) {
        let Some(mut values) = self.tree.take_values(id) else {
            return;
        };
        for (index, value) in values.iter_mut().enumerate() {
            let old = before.value(index);
            let resolved = self.resolve(id, index, value, old);
            if old.is_some_and(|old| json_equal(&resolved, old)) {
                continue;
            }
            self.tree.record(SnapshotOperation::SetAttribute {
                id,
                index,
                value: resolved,
            });
        }
        self.tree.restore_values(id, values);
    }

    fn resolve(
        &mut self,
        id: InstanceId,
        index: usize,
        value: &mut Value,
        old: Option<&JsonValue>,
    ) -> JsonValue {
        if !value.is_truthy() {
            return value.to_json();
        }
        match value {
            Value::Spread(spread) => {
                // The cached expansion carries handler keys built from the
                // pre-hydration id.
                let expanded = transform_spread(id, index, &spread.props);
                for entry in expanded.values().filter(|entry| entry.is_truthy()) {
                    self.tree.resolve_worklet(entry);
                }
                let json = JsonValue::Object(map_to_json(&expanded));
                spread.expanded = Some(expanded);
                json
            }
            Value::Ref(r) => match old {
                Some(old) if is_truthy_json(old) => old.clone(),
                _ => r.handle.clone(),
            },
            Value::Function(_) => JsonValue::String(format!("{id}:{index}:")),
            Value::Worklet(_) | Value::Gesture(_) => {
                self.tree.resolve_worklet(value).unwrap_or(JsonValue::Null)
            }
            _ => value.to_json(),
        }
    }

    fn children(
        &mut self,
        parent: InstanceId,
        before: &[SerializedSnapshot],
        after: &[AfterChild],
    ) -> Result<(), HydrateError> {
        let diff = try_diff_array(
            before,
            after,
            |b, a| b.ty == a.ty,
            |b, a, _, _| self.node(b, a.id),
        )?;
        diff_array_action(before, &diff, |action| {
            match action {
                ArrayAction::Insert { item, target } => {
                    self.insert_subtree(parent, item.id, target.map(|t| t.id))?;
                }
                ArrayAction::Remove { node } => {
                    self.tree.record(SnapshotOperation::RemoveChild {
                        parent,
                        child: node.id,
                    });
                }
                ArrayAction::Move { node, target } => {
                    self.tree.record(SnapshotOperation::InsertBefore {
                        parent,
                        child: node.id,
                        before: target.map(|t| t.id),
                    });
                }
            }
            Ok::<(), HydrateError>(())
        })?;
        Ok(())
    }

    /// Emits a background subtree that has no main-thread counterpart:
    /// create, children, values, then the insertion itself.
    fn insert_subtree(
        &mut self,
        parent: InstanceId,
        node: InstanceId,
        before: Option<InstanceId>,
    ) -> Result<(), HydrateError> {
        self.create(node)?;
        self.descendants(node)?;
        self.tree.replay_values(node)?;
        self.tree.record(SnapshotOperation::InsertBefore {
            parent,
            child: node,
            before,
        });
        Ok(())
    }

    fn descendants(&mut self, parent: InstanceId) -> Result<(), HydrateError> {
        for child in self.tree.child_nodes(parent) {
            self.create(child)?;
            self.tree.replay_values(child)?;
            self.descendants(child)?;
            self.tree.record(SnapshotOperation::InsertBefore {
                parent,
                child,
                before: None,
            });
        }
        Ok(())
    }

    fn create(&mut self, id: InstanceId) -> Result<(), HydrateError> {
        let ty = self
            .tree
            .type_of(id)
            .cloned()
            .ok_or(TreeError::UnknownInstance(id))?;
        self.tree.record(SnapshotOperation::CreateElement { ty, id });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{SnapshotTemplate, TemplateRegistry};
    use serde_json::json;

    /// `mixed` has a positional slot followed by a dynamic run.
    fn registry() -> TemplateRegistry {
        let mut registry = TemplateRegistry::new();
        registry.register(SnapshotTemplate::new("view").slot(SlotKind::Children, 0));
        registry.register(
            SnapshotTemplate::new("mixed")
                .slot(SlotKind::Slot, 1)
                .slot(SlotKind::Children, 2),
        );
        registry
    }

    #[test]
    fn later_slots_see_children_remapped_by_earlier_ones() {
        let mut tree = BackgroundTree::new(registry());
        let root = tree.create("mixed").expect("root");
        let head = tree.create("view").expect("head");
        tree.append_child(root, head).expect("append");
        for text in ["a", "b"] {
            let id = tree.create(NodeType::Text).expect("text");
            tree.set_values(id, vec![Value::from(text)]).expect("values");
            tree.append_child(root, id).expect("append");
        }
        let before = SerializedSnapshot::new(InstanceId(-1), "mixed").with_children(vec![
            SerializedSnapshot::new(InstanceId(-2), "view"),
            SerializedSnapshot::new(InstanceId(-3), NodeType::Text).with_values(vec![json!("a")]),
            SerializedSnapshot::new(InstanceId(-4), NodeType::Text).with_values(vec![json!("c")]),
        ]);

        let patch = hydrate(&before, &mut tree, root).expect("hydrate");
        let ops: Vec<SnapshotOperation> = patch.into_iter().collect();
        assert_eq!(
            ops,
            vec![SnapshotOperation::SetAttribute {
                id: InstanceId(-4),
                index: 0,
                value: json!("b"),
            }]
        );
        assert_eq!(
            tree.child_nodes(InstanceId(-1)),
            vec![InstanceId(-2), InstanceId(-3), InstanceId(-4)]
        );
    }
}
