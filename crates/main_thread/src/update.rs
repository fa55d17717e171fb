use core_types::{CommitTaskId, ReloadVersion};
use snapshot::{ElementHost, FlushOptions, PatchUpdate};

use crate::instance::MainThreadTree;
use crate::patch_apply::{ApplyStats, PatchApplyError, snapshot_patch_apply};

#[derive(Debug, PartialEq)]
pub enum UpdateOutcome {
    /// The envelope was produced before the last reload and was dropped
    /// without decoding.
    Stale,
    Applied {
        /// Commit task ids in the order their patches were applied.
        commits: Vec<CommitTaskId>,
        stats: ApplyStats,
        flush_options: FlushOptions,
    },
}

/// Applies one update envelope. Envelopes stamped with a reload version
/// older than `current` are discarded.
pub fn update_main_thread<H: ElementHost>(
    tree: &mut MainThreadTree<H>,
    update: &PatchUpdate,
    current: ReloadVersion,
) -> Result<UpdateOutcome, PatchApplyError> {
    let options = &update.patch_options;
    if options.reload_version < current {
        log::debug!(
            target: "main_thread.apply",
            "drop update for reload {:?}, current is {:?}",
            options.reload_version,
            current
        );
        return Ok(UpdateOutcome::Stale);
    }

    let list = update.unpack()?;
    let mut commits = Vec::with_capacity(list.patch_list.len());
    let mut stats = ApplyStats::default();
    for patch in &list.patch_list {
        if let Some(snapshot_patch) = &patch.snapshot_patch {
            stats += snapshot_patch_apply(tree, snapshot_patch)?;
        }
        commits.push(patch.id);
    }

    let mut flush_options = list.flush_options.unwrap_or_default();
    if let Some(pipeline) = &options.pipeline_options {
        flush_options.pipeline_options = Some(pipeline.clone());
    }
    log::debug!(
        target: "main_thread.apply",
        "applied {} commits ({} ops, {} missing){}",
        commits.len(),
        stats.applied,
        stats.missing,
        if options.is_hydration { " [hydration]" } else { "" }
    );
    Ok(UpdateOutcome::Applied {
        commits,
        stats,
        flush_options,
    })
}
