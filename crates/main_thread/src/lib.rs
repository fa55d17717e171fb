pub mod instance;
pub mod memory_host;
pub mod patch_apply;
pub mod update;

pub use crate::instance::{MainInstance, MainThreadTree};
pub use crate::memory_host::{ElementRecord, MemoryHost};
pub use crate::patch_apply::{ApplyStats, PatchApplyError, apply_wire, snapshot_patch_apply};
pub use crate::update::{UpdateOutcome, update_main_thread};
