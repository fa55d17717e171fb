pub mod background;
pub mod debug;
pub mod envelope;
pub mod hydrate;
pub mod list_diff;
pub mod spread;
pub mod template;
#[cfg(any(test, feature = "tree-snapshot"))]
pub mod tree_snapshot;
pub mod value;
pub mod worklet;

mod host;
mod recorder;
mod serialized;
mod snapshot_patch;
mod tree;
mod types;

pub use crate::background::{BackgroundInstance, BackgroundTree, RefRemoval, SignError};
pub use crate::envelope::{FlushOptions, Patch, PatchList, PatchOptions, PatchUpdate, PipelineOptions};
pub use crate::host::ElementHost;
pub use crate::hydrate::{HydrateError, hydrate};
pub use crate::list_diff::{DiffResult, Typed, diff_array, diff_array_action};
pub use crate::recorder::PatchRecorder;
pub use crate::serialized::SerializedSnapshot;
pub use crate::snapshot_patch::{SnapshotOperation, SnapshotPatch, WireError, opcode};
pub use crate::template::{SnapshotTemplate, TemplateRegistry, UpdateContext};
pub use crate::tree::{InstanceTree, TreeError};
pub use crate::types::{NodeType, SlotKind};
pub use crate::value::{JsonMap, Value, ValueKind};
