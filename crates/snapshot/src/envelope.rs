//! Update envelope exchanged between the runtimes.
//!
//! The patch list travels JSON-encoded in `data`; `patch_options` stays
//! structured so the receiver can drop stale updates before decoding.

use core_types::{CommitTaskId, ReloadVersion};
use serde::{Deserialize, Serialize};

use crate::snapshot_patch::SnapshotPatch;
use crate::value::JsonMap;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patch {
    pub id: CommitTaskId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_patch: Option<SnapshotPatch>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlushOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_options: Option<PipelineOptions>,
    #[serde(flatten)]
    pub extra: JsonMap,
}

impl FlushOptions {
    pub fn is_empty(&self) -> bool {
        self.pipeline_options.is_none() && self.extra.is_empty()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchList {
    pub patch_list: Vec<Patch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flush_options: Option<FlushOptions>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineOptions {
    pub pipeline_id: String,
    #[serde(default)]
    pub need_timestamps: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchOptions {
    pub reload_version: ReloadVersion,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_hydration: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_options: Option<PipelineOptions>,
}

/// What crosses the runtime boundary for one commit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchUpdate {
    pub data: String,
    pub patch_options: PatchOptions,
}

impl PatchUpdate {
    pub fn pack(list: &PatchList, patch_options: PatchOptions) -> Result<Self, serde_json::Error> {
        Ok(Self {
            data: serde_json::to_string(list)?,
            patch_options,
        })
    }

    pub fn unpack(&self) -> Result<PatchList, serde_json::Error> {
        serde_json::from_str(&self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot_patch::SnapshotOperation;
    use core_types::InstanceId;
    use serde_json::json;

    #[test]
    fn envelope_uses_camel_case_and_flat_patches() {
        let patch: SnapshotPatch = [SnapshotOperation::RemoveChild {
            parent: InstanceId(-1),
            child: InstanceId(-2),
        }]
        .into_iter()
        .collect();
        let list = PatchList {
            patch_list: vec![Patch {
                id: CommitTaskId(3),
                snapshot_patch: Some(patch),
            }],
            flush_options: None,
        };
        let update = PatchUpdate::pack(
            &list,
            PatchOptions {
                reload_version: ReloadVersion(2),
                is_hydration: true,
                pipeline_options: None,
            },
        )
        .expect("pack");
        let data: serde_json::Value = serde_json::from_str(&update.data).expect("json");
        assert_eq!(data, json!({"patchList": [{"id": 3, "snapshotPatch": [2, -1, -2]}]}));
        assert_eq!(
            serde_json::to_value(&update.patch_options).expect("json"),
            json!({"reloadVersion": 2, "isHydration": true})
        );
        assert_eq!(update.unpack().expect("unpack"), list);
    }
}
