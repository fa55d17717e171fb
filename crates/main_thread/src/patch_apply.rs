use core_types::InstanceId;
use serde_json::Value as JsonValue;
use snapshot::{ElementHost, SnapshotOperation, SnapshotPatch, TreeError, WireError};
use std::fmt;

use crate::instance::MainThreadTree;

#[derive(Debug)]
pub enum PatchApplyError {
    Wire(WireError),
    Tree(TreeError),
    Envelope(serde_json::Error),
}

impl fmt::Display for PatchApplyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchApplyError::Wire(err) => write!(f, "malformed patch: {err}"),
            PatchApplyError::Tree(err) => write!(f, "patch violates tree structure: {err}"),
            PatchApplyError::Envelope(err) => write!(f, "malformed update envelope: {err}"),
        }
    }
}

impl std::error::Error for PatchApplyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PatchApplyError::Wire(err) => Some(err),
            PatchApplyError::Tree(err) => Some(err),
            PatchApplyError::Envelope(err) => Some(err),
        }
    }
}

impl From<WireError> for PatchApplyError {
    fn from(err: WireError) -> Self {
        PatchApplyError::Wire(err)
    }
}

impl From<TreeError> for PatchApplyError {
    fn from(err: TreeError) -> Self {
        PatchApplyError::Tree(err)
    }
}

impl From<serde_json::Error> for PatchApplyError {
    fn from(err: serde_json::Error) -> Self {
        PatchApplyError::Envelope(err)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ApplyStats {
    pub applied: usize,
    /// Operations skipped because an instance they name does not exist.
    pub missing: usize,
}

impl std::ops::AddAssign for ApplyStats {
    fn add_assign(&mut self, rhs: Self) {
        self.applied += rhs.applied;
        self.missing += rhs.missing;
    }
}

/// Replays `patch` in order. An operation naming an unknown instance is
/// reported and skipped; structural violations abort the replay.
pub fn snapshot_patch_apply<H: ElementHost>(
    tree: &mut MainThreadTree<H>,
    patch: &SnapshotPatch,
) -> Result<ApplyStats, PatchApplyError> {
    let mut stats = ApplyStats::default();
    for (index, op) in patch.iter().enumerate() {
        log::trace!(target: "main_thread.apply", "#{index} {op}");
        let applied = apply_one(tree, op)?;
        if applied {
            stats.applied += 1;
        } else {
            stats.missing += 1;
            log::error!(
                target: "main_thread.apply",
                "snapshot instance not found for operation #{index}: {op}"
            );
        }
    }
    Ok(stats)
}

/// Decodes a flat wire array and applies it.
pub fn apply_wire<H: ElementHost>(
    tree: &mut MainThreadTree<H>,
    wire: &JsonValue,
) -> Result<ApplyStats, PatchApplyError> {
    let patch = SnapshotPatch::from_wire_value(wire)?;
    snapshot_patch_apply(tree, &patch)
}

fn apply_one<H: ElementHost>(
    tree: &mut MainThreadTree<H>,
    op: &SnapshotOperation,
) -> Result<bool, TreeError> {
    let known = |tree: &MainThreadTree<H>, ids: &[InstanceId]| ids.iter().all(|&id| tree.contains(id));
    match op {
        SnapshotOperation::CreateElement { ty, id } => {
            tree.create(ty.clone(), Some(*id))?;
        }
        SnapshotOperation::InsertBefore {
            parent,
            child,
            before,
        } => {
            if !known(tree, &[*parent, *child]) {
                return Ok(false);
            }
            let before = before.filter(|&before| {
                let exists = tree.contains(before);
                if !exists {
                    log::warn!(target: "main_thread.apply", "unknown sibling {before}, appending");
                }
                exists
            });
            tree.insert_before(*parent, *child, before)?;
        }
        SnapshotOperation::RemoveChild { parent, child } => {
            if !known(tree, &[*parent, *child]) {
                return Ok(false);
            }
            tree.remove_child(*parent, *child)?;
        }
        SnapshotOperation::SetAttribute { id, index, value } => {
            if !tree.contains(*id) {
                return Ok(false);
            }
            tree.set_attribute(*id, *index, value.clone())?;
        }
        SnapshotOperation::SetAttributes { id, values } => {
            if !tree.contains(*id) {
                return Ok(false);
            }
            tree.set_values(*id, values.clone())?;
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_host::MemoryHost;
    use serde_json::json;
    use snapshot::{NodeType, TemplateRegistry};

    fn page() -> MainThreadTree<MemoryHost> {
        let mut tree = MainThreadTree::new(TemplateRegistry::new(), MemoryHost::new());
        let root = tree.create(NodeType::root(), None).expect("root");
        tree.ensure_elements(root).expect("render");
        tree
    }

    #[test]
    fn wire_patch_builds_text() {
        let mut tree = page();
        let stats = apply_wire(
            &mut tree,
            &json!([0, null, 2, 4, 2, ["hi"], 1, -1, 2, null]),
        )
        .expect("apply");
        assert_eq!(stats, ApplyStats { applied: 3, missing: 0 });
        assert_eq!(tree.host().render(), vec!["<page>", "  \"hi\""]);
    }

    #[test]
    fn unknown_instances_are_counted_not_fatal() {
        let mut tree = page();
        let patch: SnapshotPatch = [
            SnapshotOperation::SetAttribute {
                id: InstanceId(9),
                index: 0,
                value: json!(1),
            },
            SnapshotOperation::RemoveChild {
                parent: InstanceId(-1),
                child: InstanceId(9),
            },
        ]
        .into_iter()
        .collect();
        let stats = snapshot_patch_apply(&mut tree, &patch).expect("apply");
        assert_eq!(stats, ApplyStats { applied: 0, missing: 2 });
    }

    #[test]
    fn structural_violations_abort() {
        let mut tree = page();
        let err = apply_wire(&mut tree, &json!([0, null, 2, 0, null, 3, 2, -1, 2]))
            .expect_err("not a child");
        assert!(matches!(
            err,
            PatchApplyError::Tree(TreeError::NotAChild { .. })
        ));
        let err = apply_wire(&mut tree, &json!([0, null])).expect_err("truncated");
        assert!(matches!(err, PatchApplyError::Wire(_)));
    }
}
