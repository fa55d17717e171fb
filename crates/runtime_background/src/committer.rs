//! Background commit layer.
//!
//! One commit ships everything recorded since the previous one as a single
//! envelope. The bookkeeping that must wait for the main thread (clearing
//! replaced refs, dropping removed instances) is parked under the commit's
//! task id until the acknowledgement comes back.

use core_types::{CommitTaskId, InstanceId, ReloadVersion};
use snapshot::{
    BackgroundTree, HydrateError, Patch, PatchList, PatchOptions, PatchUpdate, RefRemoval,
    SerializedSnapshot, SnapshotPatch, hydrate,
};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug)]
pub struct CommitConfig {
    /// How long removed instances stay resolvable after their removal was
    /// acknowledged. Late events may still name them.
    pub gc_delay: Duration,
    pub reload_version: ReloadVersion,
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            gc_delay: Duration::from_secs(10),
            reload_version: ReloadVersion::INITIAL,
        }
    }
}

#[derive(Debug)]
pub enum CommitError {
    Hydrate(HydrateError),
    Encode(serde_json::Error),
}

impl fmt::Display for CommitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommitError::Hydrate(err) => write!(f, "{err}"),
            CommitError::Encode(err) => write!(f, "failed to encode patch list: {err}"),
        }
    }
}

impl std::error::Error for CommitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CommitError::Hydrate(err) => Some(err),
            CommitError::Encode(err) => Some(err),
        }
    }
}

impl From<HydrateError> for CommitError {
    fn from(err: HydrateError) -> Self {
        CommitError::Hydrate(err)
    }
}

impl From<serde_json::Error> for CommitError {
    fn from(err: serde_json::Error) -> Self {
        CommitError::Encode(err)
    }
}

/// A packed envelope ready to cross to the main thread.
#[derive(Clone, Debug, PartialEq)]
pub struct Commit {
    pub id: CommitTaskId,
    pub update: PatchUpdate,
}

#[derive(Debug, Default)]
struct CommitTask {
    to_remove: Vec<InstanceId>,
    refs: Vec<RefRemoval>,
}

#[derive(Debug)]
pub struct Committer {
    config: CommitConfig,
    next_task: CommitTaskId,
    pending: BTreeMap<CommitTaskId, CommitTask>,
    gc_queue: VecDeque<(Instant, Vec<InstanceId>)>,
    reload_version: ReloadVersion,
}

impl Committer {
    pub fn new(config: CommitConfig) -> Self {
        Self {
            config,
            next_task: CommitTaskId::FIRST,
            pending: BTreeMap::new(),
            gc_queue: VecDeque::new(),
            reload_version: config.reload_version,
        }
    }

    pub fn reload_version(&self) -> ReloadVersion {
        self.reload_version
    }

    /// Commits still waiting for the main thread.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Instances acknowledged as removed but not yet collected.
    pub fn scheduled_for_gc(&self) -> usize {
        self.gc_queue.iter().map(|(_, ids)| ids.len()).sum()
    }

    /// Packs everything recorded since the last commit. Returns `None` when
    /// there is nothing to ship and nothing to clean up.
    pub fn commit(&mut self, tree: &mut BackgroundTree) -> Result<Option<Commit>, CommitError> {
        let patch = tree.recorder_mut().take().unwrap_or_default();
        self.pack(tree, patch, false)
    }

    /// Hydrates `root` against the main thread's first screen and packs the
    /// resulting patch. The envelope is sent even when the patch is empty so
    /// the main thread learns hydration has finished.
    pub fn commit_hydration(
        &mut self,
        tree: &mut BackgroundTree,
        before: &SerializedSnapshot,
        root: InstanceId,
    ) -> Result<Option<Commit>, CommitError> {
        let patch = hydrate(before, tree, root)?;
        self.pack(tree, patch, true)
    }

    fn pack(
        &mut self,
        tree: &mut BackgroundTree,
        patch: SnapshotPatch,
        is_hydration: bool,
    ) -> Result<Option<Commit>, CommitError> {
        let task = CommitTask {
            to_remove: tree.take_instances_to_remove(),
            refs: tree.take_refs_to_remove(),
        };
        if patch.is_empty() && !is_hydration && task.to_remove.is_empty() && task.refs.is_empty() {
            log::trace!(target: "commit", "nothing to commit");
            return Ok(None);
        }

        let id = self.next_task;
        let list = PatchList {
            patch_list: vec![Patch {
                id,
                snapshot_patch: (!patch.is_empty()).then_some(patch),
            }],
            flush_options: None,
        };
        let update = PatchUpdate::pack(
            &list,
            PatchOptions {
                reload_version: self.reload_version,
                is_hydration,
                pipeline_options: tree.take_pipeline_options(),
            },
        )?;
        self.next_task = id.next();

        log::debug!(
            target: "commit",
            "commit {id}: {} bytes, {} removals, {} refs{}",
            update.data.len(),
            task.to_remove.len(),
            task.refs.len(),
            if is_hydration { " [hydration]" } else { "" }
        );
        self.pending.insert(id, task);
        Ok(Some(Commit { id, update }))
    }

    /// Runs the task parked under `id`, at most once. The returned refs can
    /// be detached now; removed instances become collectable after
    /// `gc_delay`.
    pub fn on_commit_done(&mut self, id: CommitTaskId, now: Instant) -> Vec<RefRemoval> {
        let Some(task) = self.pending.remove(&id) else {
            log::warn!(target: "commit", "acknowledgement for unknown commit {id}");
            return Vec::new();
        };
        if !task.to_remove.is_empty() {
            self.gc_queue
                .push_back((now + self.config.gc_delay, task.to_remove));
        }
        task.refs
    }

    /// Drops every instance whose grace period ended at or before `now`.
    /// Returns how many were dropped.
    pub fn collect_garbage(&mut self, tree: &mut BackgroundTree, now: Instant) -> usize {
        let mut removed = 0;
        while let Some((deadline, _)) = self.gc_queue.front() {
            if *deadline > now {
                break;
            }
            if let Some((_, ids)) = self.gc_queue.pop_front() {
                removed += tree.remove_instances(&ids);
            }
        }
        if removed > 0 {
            log::debug!(target: "commit", "collected {removed} instances");
        }
        removed
    }

    /// Starts a new reload generation. Unacknowledged commits are dropped;
    /// their envelopes will be discarded as stale.
    pub fn reload(&mut self) -> ReloadVersion {
        self.reload_version = self.reload_version.next();
        let dropped = self.pending.len();
        self.pending.clear();
        log::debug!(
            target: "commit",
            "reload {:?}, dropped {dropped} pending commits",
            self.reload_version
        );
        self.reload_version
    }
}

impl Default for Committer {
    fn default() -> Self {
        Self::new(CommitConfig::default())
    }
}
