//! Background-side instance tree.
//!
//! A pure shadow of the main-thread tree: same shape, no native elements.
//! While its recorder is active, every structural and attribute mutation is
//! also appended to the operation log that the commit layer ships to the main
//! thread.

use core_types::InstanceId;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;

use crate::envelope::PipelineOptions;
use crate::recorder::PatchRecorder;
use crate::serialized::SerializedSnapshot;
use crate::snapshot_patch::SnapshotOperation;
use crate::spread::transform_spread;
use crate::template::TemplateRegistry;
use crate::tree::{InstanceTree, TreeError};
use crate::types::NodeType;
use crate::value::{Spread, Value, ValueKind, map_to_json};
use crate::worklet::WorkletRegistry;

const TIMING_FLAG_KEY: &str = "__lynx_timing_flag";

/// Direct-or-deep inequality against a possibly absent old value.
fn changed(old: Option<&Value>, new: &Value) -> bool {
    old != Some(new)
}

#[derive(Debug)]
pub struct BackgroundInstance {
    ty: NodeType,
    values: Option<Vec<Value>>,
}

impl BackgroundInstance {
    pub fn ty(&self) -> &NodeType {
        &self.ty
    }

    pub fn values(&self) -> Option<&[Value]> {
        self.values.as_deref()
    }
}

/// A ref that has to be detached on the main thread once the commit that
/// replaced it lands.
#[derive(Clone, Debug, PartialEq)]
pub struct RefRemoval {
    pub sign: String,
    pub previous: Value,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SignError {
    Malformed(String),
    UnknownInstance(InstanceId),
    MissingValue(String),
    NotCallable(String),
}

impl fmt::Display for SignError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignError::Malformed(sign) => write!(f, "malformed handler key {sign:?}"),
            SignError::UnknownInstance(id) => write!(f, "handler key names unknown instance {id}"),
            SignError::MissingValue(sign) => write!(f, "no value behind handler key {sign:?}"),
            SignError::NotCallable(sign) => write!(f, "value behind {sign:?} is not a function"),
        }
    }
}

impl std::error::Error for SignError {}

/// Outcome of classifying one attribute write.
pub(crate) struct ValueCommit {
    pub(crate) need_update: bool,
    pub(crate) value: JsonValue,
}

#[derive(Debug)]
pub struct BackgroundTree {
    registry: TemplateRegistry,
    tree: InstanceTree<BackgroundInstance>,
    next_id: i32,
    recorder: PatchRecorder,
    worklets: WorkletRegistry,
    refs_to_remove: Vec<RefRemoval>,
    to_remove: Vec<InstanceId>,
    pipeline: Option<PipelineOptions>,
}

impl BackgroundTree {
    pub fn new(registry: TemplateRegistry) -> Self {
        Self {
            registry,
            tree: InstanceTree::new(),
            next_id: 0,
            recorder: PatchRecorder::new(),
            worklets: WorkletRegistry::new(),
            refs_to_remove: Vec::new(),
            to_remove: Vec::new(),
            pipeline: None,
        }
    }

    pub fn registry(&self) -> &TemplateRegistry {
        &self.registry
    }

    pub fn recorder(&self) -> &PatchRecorder {
        &self.recorder
    }

    pub fn recorder_mut(&mut self) -> &mut PatchRecorder {
        &mut self.recorder
    }

    pub fn worklets(&self) -> &WorkletRegistry {
        &self.worklets
    }

    pub fn worklets_mut(&mut self) -> &mut WorkletRegistry {
        &mut self.worklets
    }

    pub fn set_pipeline_options(&mut self, options: Option<PipelineOptions>) {
        self.pipeline = options;
    }

    pub fn pipeline_options(&self) -> Option<&PipelineOptions> {
        self.pipeline.as_ref()
    }

    pub fn take_pipeline_options(&mut self) -> Option<PipelineOptions> {
        self.pipeline.take()
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

    pub fn get(&self, id: InstanceId) -> Option<&BackgroundInstance> {
        self.tree.get(id)
    }

    pub fn values(&self, id: InstanceId) -> Option<&[Value]> {
        self.tree.get(id).and_then(BackgroundInstance::values)
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

    pub fn contains_child(&self, parent: InstanceId, child: InstanceId) -> bool {
        self.tree.contains_child(parent, child)
    }

    /// Creates an instance of `ty` with the next background id.
    pub fn create(&mut self, ty: impl Into<NodeType>) -> Result<InstanceId, TreeError> {
        let ty = ty.into();
        self.next_id += 1;
        let id = InstanceId(self.next_id);
        self.tree.insert(
            id,
            BackgroundInstance {
                ty: ty.clone(),
                values: None,
            },
        )?;
        self.recorder.push(SnapshotOperation::CreateElement { ty, id });
        Ok(id)
    }

    pub fn insert_before(
        &mut self,
        parent: InstanceId,
        node: InstanceId,
        before: Option<InstanceId>,
    ) -> Result<(), TreeError> {
        self.tree.insert_before(parent, node, before)?;
        self.recorder.push(SnapshotOperation::InsertBefore {
            parent,
            child: node,
            before,
        });
        Ok(())
    }

    pub fn append_child(&mut self, parent: InstanceId, node: InstanceId) -> Result<(), TreeError> {
        self.insert_before(parent, node, None)
    }

    /// Detaches `node` from `parent`. Its whole subtree is queued for
    /// deferred removal from the lookup table.
    pub fn remove_child(&mut self, parent: InstanceId, node: InstanceId) -> Result<(), TreeError> {
        self.tree.remove_child(parent, node)?;
        self.recorder.push(SnapshotOperation::RemoveChild {
            parent,
            child: node,
        });
        self.to_remove.extend(self.tree.subtree_ids(node));
        Ok(())
    }

    /// Bulk value write. Only changed indices are recorded; an instance with
    /// no previous values records a single `SetAttributes`.
    pub fn set_values(&mut self, id: InstanceId, mut values: Vec<Value>) -> Result<(), TreeError> {
        let instance = self.tree.try_get_mut(id)?;
        if !self.recorder.is_recording() {
            instance.values = Some(values);
            return Ok(());
        }
        let old = instance.values.take();

        match old {
            Some(old) => {
                for (index, value) in values.iter_mut().enumerate() {
                    let commit = self.resolve_write(id, index, value, old.get(index));
                    if commit.need_update {
                        self.recorder.push(SnapshotOperation::SetAttribute {
                            id,
                            index,
                            value: commit.value,
                        });
                    }
                }
            }
            None => {
                let committed = values
                    .iter_mut()
                    .enumerate()
                    .map(|(index, value)| self.resolve_write(id, index, value, None).value)
                    .collect();
                self.recorder.push(SnapshotOperation::SetAttributes {
                    id,
                    values: committed,
                });
            }
        }

        if let Some(instance) = self.tree.get_mut(id) {
            instance.values = Some(values);
        }
        Ok(())
    }

    /// Single-index write. Always recorded.
    pub fn set_attribute(&mut self, id: InstanceId, index: usize, value: Value) -> Result<(), TreeError> {
        let json = value.to_json();
        let instance = self.tree.try_get_mut(id)?;
        let values = instance.values.get_or_insert_with(Vec::new);
        if values.len() <= index {
            values.resize(index + 1, Value::Null);
        }
        values[index] = value;
        self.recorder.push(SnapshotOperation::SetAttribute {
            id,
            index,
            value: json,
        });
        Ok(())
    }

    /// Resolves a handler key `"id:index[:key]"` to the stored value.
    pub fn value_by_sign(&self, sign: &str) -> Result<&Value, SignError> {
        let mut parts = sign.split(':');
        let (Some(id), Some(index), key, None) = (parts.next(), parts.next(), parts.next(), parts.next()) else {
            return Err(SignError::Malformed(sign.to_owned()));
        };
        let id = id
            .parse::<i32>()
            .map(InstanceId)
            .map_err(|_| SignError::Malformed(sign.to_owned()))?;
        let index = index
            .parse::<usize>()
            .map_err(|_| SignError::Malformed(sign.to_owned()))?;
        let values = self
            .tree
            .get(id)
            .ok_or(SignError::UnknownInstance(id))?
            .values()
            .unwrap_or_default();
        let value = values
            .get(index)
            .ok_or_else(|| SignError::MissingValue(sign.to_owned()))?;
        match key.filter(|key| !key.is_empty()) {
            None => Ok(value),
            Some(key) => match value {
                Value::Spread(spread) => spread
                    .props
                    .get(key)
                    .ok_or_else(|| SignError::MissingValue(sign.to_owned())),
                _ => Err(SignError::MissingValue(sign.to_owned())),
            },
        }
    }

    /// Invokes the handler registered under `sign`.
    pub fn dispatch_event(&self, sign: &str, payload: &JsonValue) -> Result<(), SignError> {
        match self.value_by_sign(sign)? {
            Value::Function(callback) => {
                log::trace!(target: "snapshot.background", "dispatch {sign}");
                callback.call(payload);
                Ok(())
            }
            _ => Err(SignError::NotCallable(sign.to_owned())),
        }
    }

    pub fn update_id(&mut self, old: InstanceId, new: InstanceId) -> Result<(), TreeError> {
        self.tree.update_id(old, new)
    }

    /// Drops every instance. The id counter keeps running so ids are never
    /// reused across a restart.
    pub fn clear(&mut self) {
        self.tree.clear();
        self.to_remove.clear();
    }

    /// Drops every instance and restarts id allocation.
    pub fn reset(&mut self) {
        self.clear();
        self.next_id = 0;
    }

    pub fn take_instances_to_remove(&mut self) -> Vec<InstanceId> {
        std::mem::take(&mut self.to_remove)
    }

    pub fn take_refs_to_remove(&mut self) -> Vec<RefRemoval> {
        std::mem::take(&mut self.refs_to_remove)
    }

    /// Forgets instances whose removal has been acknowledged. `ids` come in
    /// subtree pre-order, so descendants are detached by the time they are
    /// visited; an instance that still has a parent was reattached and is kept.
    pub fn remove_instances(&mut self, ids: &[InstanceId]) -> usize {
        let mut removed = 0;
        for &id in ids {
            if self.tree.parent(id).is_some() {
                log::debug!(target: "snapshot.background", "keep reattached instance {id}");
                continue;
            }
            if self.tree.forget(id).is_some() {
                removed += 1;
            }
        }
        removed
    }

    pub fn serialize(&self, id: InstanceId) -> Option<SerializedSnapshot> {
        let instance = self.tree.get(id)?;
        let values = instance
            .values
            .as_ref()
            .map(|values| values.iter().map(Value::to_json).collect());
        let children = self.tree.child_ids(id);
        let children = (!children.is_empty()).then(|| {
            children
                .into_iter()
                .filter_map(|child| self.serialize(child))
                .collect()
        });
        Some(SerializedSnapshot {
            id,
            ty: instance.ty.clone(),
            values,
            children,
        })
    }

    pub(crate) fn record(&mut self, op: SnapshotOperation) {
        self.recorder.push(op);
    }

    pub(crate) fn type_of(&self, id: InstanceId) -> Option<&NodeType> {
        self.tree.get(id).map(BackgroundInstance::ty)
    }

    pub(crate) fn take_values(&mut self, id: InstanceId) -> Option<Vec<Value>> {
        self.tree.get_mut(id).and_then(|instance| instance.values.take())
    }

    pub(crate) fn restore_values(&mut self, id: InstanceId, values: Vec<Value>) {
        if let Some(instance) = self.tree.get_mut(id) {
            instance.values = Some(values);
        }
    }

    /// Writes the stored values again as if the instance had none, which
    /// records one `SetAttributes`.
    pub(crate) fn replay_values(&mut self, id: InstanceId) -> Result<(), TreeError> {
        match self.take_values(id) {
            Some(values) => self.set_values(id, values),
            None => Ok(()),
        }
    }

    pub(crate) fn resolve_worklet(&mut self, value: &Value) -> Option<JsonValue> {
        match value {
            Value::Worklet(worklet) => Some(self.worklets.resolve(worklet)),
            Value::Gesture(gesture) => Some(self.worklets.process_gesture(gesture)),
            _ => None,
        }
    }

    fn queue_ref_removal(&mut self, sign: String, previous: &Value) {
        if previous.is_truthy() {
            self.refs_to_remove.push(RefRemoval {
                sign,
                previous: previous.clone(),
            });
        }
    }

    fn mark_timestamps(&mut self) {
        if let Some(pipeline) = self.pipeline.as_mut() {
            pipeline.need_timestamps = true;
        }
    }

    /// Classifies one write of `new` over `old` at `index`.
    pub(crate) fn resolve_write(
        &mut self,
        id: InstanceId,
        index: usize,
        new: &mut Value,
        old: Option<&Value>,
    ) -> ValueCommit {
        match new.kind() {
            ValueKind::Falsy => {
                if let Some(old) = old.filter(|old| old.is_ref()) {
                    self.queue_ref_removal(format!("{id}:{index}:"), old);
                }
                ValueCommit {
                    need_update: changed(old, new),
                    value: new.to_json(),
                }
            }
            ValueKind::Spread => match new {
                Value::Spread(spread) => self.resolve_spread(id, index, spread, old),
                _ => ValueCommit {
                    need_update: true,
                    value: JsonValue::Null,
                },
            },
            ValueKind::Ref => {
                if let Some(old) = old {
                    self.queue_ref_removal(format!("{id}:{index}:"), old);
                }
                ValueCommit {
                    need_update: true,
                    value: new.to_json(),
                }
            }
            ValueKind::Worklet | ValueKind::Gesture => {
                let value = self.resolve_worklet(new).unwrap_or(JsonValue::Null);
                ValueCommit {
                    need_update: true,
                    value,
                }
            }
            ValueKind::TimingFlag => {
                let flag_changed = match (old, &*new) {
                    (Some(Value::TimingFlag(old)), Value::TimingFlag(new)) => old != new,
                    _ => true,
                };
                let need_update = self.pipeline.is_some() && flag_changed;
                if need_update {
                    self.mark_timestamps();
                }
                ValueCommit {
                    need_update,
                    value: new.to_json(),
                }
            }
            ValueKind::Event => ValueCommit {
                need_update: !old.is_some_and(Value::is_truthy),
                value: JsonValue::from(1),
            },
            ValueKind::Plain => ValueCommit {
                need_update: changed(old, new),
                value: new.to_json(),
            },
        }
    }

    /// Expands `spread` against `id`, diffs it with the previous expansion
    /// and caches the new one on the value.
    fn resolve_spread(
        &mut self,
        id: InstanceId,
        index: usize,
        spread: &mut Spread,
        old: Option<&Value>,
    ) -> ValueCommit {
        let old_spread = match old {
            Some(Value::Spread(old)) => Some(old),
            _ => None,
        };
        let expanded = transform_spread(id, index, &spread.props);
        let old_expanded = old_spread.and_then(|old| old.expanded.as_ref());
        let need_update = old_expanded != Some(&expanded);
        if need_update {
            let old_ref = old_expanded
                .and_then(|old| old.get("ref"))
                .filter(|handle| handle.is_truthy());
            if let (Some(_), Some(old)) = (old_ref, old_spread) {
                let previous = old.props.get("ref").cloned().unwrap_or_default();
                self.queue_ref_removal(format!("{id}:{index}:ref"), &previous);
            }
            self.resolve_spread_entries(&expanded, old_expanded);
        }
        let value = JsonValue::Object(map_to_json(&expanded));
        spread.expanded = Some(expanded);
        ValueCommit { need_update, value }
    }

    fn resolve_spread_entries(
        &mut self,
        expanded: &BTreeMap<String, Value>,
        old_expanded: Option<&BTreeMap<String, Value>>,
    ) {
        for (key, value) in expanded {
            if !value.is_truthy() {
                continue;
            }
            if self.resolve_worklet(value).is_some() {
                continue;
            }
            if key == TIMING_FLAG_KEY && old_expanded.and_then(|old| old.get(key)) != Some(value) {
                self.mark_timestamps();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Callback, RefValue, Spread, Worklet};
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recording_tree() -> BackgroundTree {
        let mut tree = BackgroundTree::new(TemplateRegistry::new());
        tree.recorder_mut().init();
        tree
    }

    fn take(tree: &mut BackgroundTree) -> Vec<SnapshotOperation> {
        tree.recorder_mut().take().expect("recording").into_iter().collect()
    }

    #[test]
    fn mutations_are_recorded() {
        let mut tree = recording_tree();
        let root = tree.create("root").expect("create");
        let a = tree.create("view").expect("create");
        let b = tree.create(NodeType::Text).expect("create");
        tree.insert_before(root, a, None).expect("insert");
        tree.insert_before(root, b, Some(a)).expect("insert");
        assert_eq!(tree.child_nodes(root), vec![b, a]);
        tree.remove_child(root, a).expect("remove");

        let ops = take(&mut tree);
        assert_eq!(ops.len(), 6);
        assert_eq!(
            ops[4],
            SnapshotOperation::InsertBefore {
                parent: root,
                child: b,
                before: Some(a)
            }
        );
        assert_eq!(ops[5], SnapshotOperation::RemoveChild { parent: root, child: a });
        assert_eq!(tree.take_instances_to_remove(), vec![a]);
    }

    #[test]
    fn removing_a_non_child_fails_and_records_nothing() {
        let mut tree = recording_tree();
        let root = tree.create("root").expect("create");
        let stray = tree.create("view").expect("create");
        take(&mut tree);
        assert_eq!(
            tree.remove_child(root, stray),
            Err(TreeError::NotAChild {
                parent: root,
                child: stray
            })
        );
        assert!(take(&mut tree).is_empty());
        assert!(tree.take_instances_to_remove().is_empty());
    }

    #[test]
    fn first_write_records_set_attributes() {
        let mut tree = recording_tree();
        let id = tree.create("view").expect("create");
        take(&mut tree);
        tree.set_values(id, vec![Value::from("a"), Value::function(|_| {}), Value::Null])
            .expect("set");
        assert_eq!(
            take(&mut tree),
            vec![SnapshotOperation::SetAttributes {
                id,
                values: vec![json!("a"), json!(1), json!(null)]
            }]
        );
    }

    #[test]
    fn later_writes_record_only_changes() {
        let mut tree = recording_tree();
        let id = tree.create("view").expect("create");
        let handler = Callback::new(|_| {});
        tree.set_values(
            id,
            vec![Value::from("a"), Value::object([("x", 1)]), Value::from(handler.clone())],
        )
        .expect("set");
        take(&mut tree);

        tree.set_values(
            id,
            vec![
                Value::from("a"),
                Value::object([("x", 1)]),
                Value::function(|_| {}),
            ],
        )
        .expect("set");
        assert!(take(&mut tree).is_empty(), "equal object and rebound event are no-ops");

        tree.set_values(
            id,
            vec![Value::from("b"), Value::object([("x", 2)]), Value::Null],
        )
        .expect("set");
        let indices: Vec<usize> = take(&mut tree)
            .into_iter()
            .map(|op| match op {
                SnapshotOperation::SetAttribute { index, .. } => index,
                other => panic!("unexpected {other}"),
            })
            .collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn event_goes_from_absent_to_present() {
        let mut tree = recording_tree();
        let id = tree.create("view").expect("create");
        tree.set_values(id, vec![Value::Null]).expect("set");
        take(&mut tree);
        tree.set_values(id, vec![Value::function(|_| {})]).expect("set");
        assert_eq!(
            take(&mut tree),
            vec![SnapshotOperation::SetAttribute {
                id,
                index: 0,
                value: json!(1)
            }]
        );
    }

    #[test]
    fn writes_outside_recording_only_store() {
        let mut tree = BackgroundTree::new(TemplateRegistry::new());
        let id = tree.create("view").expect("create");
        tree.set_values(id, vec![Value::from(3)]).expect("set");
        assert_eq!(tree.values(id), Some(&[Value::from(3)][..]));
        assert!(!tree.recorder().is_recording());
    }

    #[test]
    fn refs_always_update_and_queue_cleanup() {
        let mut tree = recording_tree();
        let id = tree.create("view").expect("create");
        tree.set_values(id, vec![Value::from(RefValue::new("r1"))]).expect("set");
        take(&mut tree);
        tree.set_values(id, vec![Value::from(RefValue::new("r1"))]).expect("set");
        assert_eq!(take(&mut tree).len(), 1);
        tree.set_values(id, vec![Value::Null]).expect("set");
        let removals = tree.take_refs_to_remove();
        assert_eq!(removals.len(), 2);
        assert_eq!(removals[1].sign, format!("{id}:0:"));
    }

    #[test]
    fn spreads_diff_against_cached_expansion() {
        let mut tree = recording_tree();
        let id = tree.create("view").expect("create");
        let spread = || {
            Spread::new()
                .with("class", "a")
                .with("bindtap", Value::function(|_| {}))
        };
        tree.set_values(id, vec![Value::from(spread())]).expect("set");
        assert_eq!(
            take(&mut tree),
            vec![SnapshotOperation::SetAttributes {
                id,
                values: vec![json!({"className": "a", "bindtap": format!("{id}:0:bindtap")})]
            }]
        );
        tree.set_values(id, vec![Value::from(spread())]).expect("set");
        assert!(take(&mut tree).is_empty());
        tree.set_values(id, vec![Value::from(spread().with("title", "t"))])
            .expect("set");
        assert_eq!(take(&mut tree).len(), 1);
    }

    #[test]
    fn worklets_commit_with_stable_exec_id() {
        let mut tree = recording_tree();
        let id = tree.create("view").expect("create");
        let worklet = Worklet::new("w");
        tree.set_values(id, vec![Value::from(worklet.clone())]).expect("set");
        tree.set_values(id, vec![Value::from(worklet)]).expect("set");
        let ops = take(&mut tree);
        assert_eq!(ops.len(), 2);
        assert_eq!(
            ops[1],
            SnapshotOperation::SetAttribute {
                id,
                index: 0,
                value: json!({"_wkltId": "w", "_execId": 1})
            }
        );
    }

    #[test]
    fn timing_flags_need_pipeline_options() {
        let mut tree = recording_tree();
        let id = tree.create("view").expect("create");
        tree.set_values(id, vec![Value::Null]).expect("set");
        take(&mut tree);
        tree.set_values(id, vec![Value::TimingFlag("t1".into())]).expect("set");
        assert!(take(&mut tree).is_empty());

        tree.set_pipeline_options(Some(PipelineOptions {
            pipeline_id: "p".into(),
            need_timestamps: false,
        }));
        tree.set_values(id, vec![Value::TimingFlag("t2".into())]).expect("set");
        assert_eq!(take(&mut tree).len(), 1);
        assert!(tree.pipeline_options().is_some_and(|p| p.need_timestamps));
    }

    #[test]
    fn single_index_write_always_records() {
        let mut tree = recording_tree();
        let id = tree.create("view").expect("create");
        tree.set_attribute(id, 2, Value::from("x")).expect("set");
        tree.set_attribute(id, 2, Value::from("x")).expect("set");
        let ops = take(&mut tree);
        assert_eq!(ops.len(), 3);
        assert_eq!(tree.values(id).map(<[Value]>::len), Some(3));
    }

    #[test]
    fn handler_keys_resolve_and_dispatch() {
        let mut tree = BackgroundTree::new(TemplateRegistry::new());
        let id = tree.create("view").expect("create");
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let spread_seen = seen.clone();
        tree.set_values(
            id,
            vec![
                Value::function(move |payload| sink.borrow_mut().push(payload.clone())),
                Value::from(Spread::new().with(
                    "bindtap",
                    Value::function(move |_| spread_seen.borrow_mut().push(json!("spread"))),
                )),
            ],
        )
        .expect("set");

        tree.dispatch_event(&format!("{id}:0:"), &json!({"x": 1})).expect("dispatch");
        tree.dispatch_event(&format!("{id}:1:bindtap"), &json!(null)).expect("dispatch");
        assert_eq!(*seen.borrow(), vec![json!({"x": 1}), json!("spread")]);

        assert_eq!(
            tree.value_by_sign("nope"),
            Err(SignError::Malformed("nope".into()))
        );
        assert_eq!(
            tree.value_by_sign("99:0:"),
            Err(SignError::UnknownInstance(InstanceId(99)))
        );
        assert!(matches!(
            tree.dispatch_event(&format!("{id}:1:"), &json!(null)),
            Err(SignError::NotCallable(_))
        ));
    }

    #[test]
    fn clear_keeps_counter_reset_restarts_it() {
        let mut tree = BackgroundTree::new(TemplateRegistry::new());
        tree.create("view").expect("create");
        tree.clear();
        assert!(tree.is_empty());
        assert_eq!(tree.create("view").expect("create"), InstanceId(2));
        tree.reset();
        assert_eq!(tree.create("view").expect("create"), InstanceId(1));
    }

    #[test]
    fn garbage_collection_skips_reattached() {
        let mut tree = BackgroundTree::new(TemplateRegistry::new());
        let root = tree.create("root").expect("create");
        let a = tree.create("view").expect("create");
        let b = tree.create("view").expect("create");
        tree.append_child(root, a).expect("append");
        tree.append_child(a, b).expect("append");
        tree.remove_child(root, a).expect("remove");
        let pending = tree.take_instances_to_remove();
        assert_eq!(pending, vec![a, b]);
        assert_eq!(tree.remove_instances(&pending), 2);
        assert!(!tree.contains(a));
        assert!(!tree.contains(b));

        let c = tree.create("view").expect("create");
        tree.append_child(root, c).expect("append");
        tree.remove_child(root, c).expect("remove");
        tree.append_child(root, c).expect("reattach");
        let pending = tree.take_instances_to_remove();
        assert_eq!(tree.remove_instances(&pending), 0);
        assert_eq!(tree.child_nodes(root), vec![c]);
    }
}
