use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of one snapshot instance within a runtime's instance manager.
///
/// The main thread allocates negative ids and the background runtime positive
/// ones, so references that cross the runtime boundary never collide. Zero is
/// never allocated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(pub i32);

impl InstanceId {
    pub const INVALID: InstanceId = InstanceId(0);

    pub fn is_main_thread(self) -> bool {
        self.0 < 0
    }

    pub fn is_background(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque handle of a native element owned by an element host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementRef(pub u32);

/// Monotonic id of one background commit, echoed back by the main thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitTaskId(pub u64);

impl CommitTaskId {
    pub const FIRST: CommitTaskId = CommitTaskId(1);

    pub fn next(self) -> Self {
        CommitTaskId(self.0 + 1)
    }
}

impl fmt::Display for CommitTaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Version stamp bumped on every page reload; envelopes carrying an older
/// stamp are stale.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ReloadVersion(pub u32);

impl ReloadVersion {
    pub const INITIAL: ReloadVersion = ReloadVersion(0);

    pub fn next(self) -> Self {
        ReloadVersion(self.0 + 1)
    }
}
