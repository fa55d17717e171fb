use core_types::{CommitTaskId, ReloadVersion};
use snapshot::{PatchUpdate, SerializedSnapshot};
use std::sync::mpsc::{self, Receiver, Sender};

#[derive(Debug)]
pub enum MainCommand {
    // Background -> main thread
    PatchUpdate(PatchUpdate),
    /// Ask for the serialized tree under the page root.
    Inspect,
    /// A reload happened; envelopes older than `reload_version` are stale.
    Reload {
        reload_version: ReloadVersion,
    },
    Shutdown,
}

#[derive(Debug)]
pub enum MainEvent {
    /// First screen rendered; this is what the background hydrates against.
    FirstScreen {
        tree: SerializedSnapshot,
    },
    CommitDone {
        ids: Vec<CommitTaskId>,
        is_hydration: bool,
    },
    PatchFailed {
        ids: Vec<CommitTaskId>,
        error: String,
    },
    /// Reply to `MainCommand::Inspect`.
    Tree {
        tree: Option<SerializedSnapshot>,
    },
}

pub struct Bus {
    pub cmd_tx: Sender<MainCommand>,
    pub cmd_rx: Receiver<MainCommand>,
    pub evt_tx: Sender<MainEvent>, // shareable for runtimes
    pub evt_rx: Receiver<MainEvent>,
}

impl Bus {
    pub fn new() -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (evt_tx, evt_rx) = mpsc::channel();
        Self {
            cmd_tx,
            cmd_rx,
            evt_tx,
            evt_rx,
        }
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}
