use std::sync::mpsc::{Receiver, Sender};
use std::thread::{self, JoinHandle};

use bus::{MainCommand, MainEvent};
use core_types::{InstanceId, ReloadVersion};
use main_thread::{MainThreadTree, UpdateOutcome, update_main_thread};
use snapshot::debug::outline_from_snapshot;
use snapshot::{ElementHost, SerializedSnapshot, TemplateRegistry};

/// Id of the page root instance on the main thread.
pub const PAGE_ROOT: InstanceId = InstanceId(-1);

const OUTLINE_CAP: usize = 200;

#[derive(Clone, Copy, Debug)]
pub struct MainRuntimeConfig {
    pub reload_version: ReloadVersion,
    /// Log every applied envelope at `info` instead of `debug`.
    pub log_patches: bool,
}

impl Default for MainRuntimeConfig {
    fn default() -> Self {
        Self {
            reload_version: ReloadVersion::INITIAL,
            log_patches: false,
        }
    }
}

/// Spawns the main-thread runtime: renders `first_screen`, publishes it,
/// then applies patch updates in arrival order until `Shutdown` or until
/// every command sender is gone. The tree is handed back on exit.
pub fn start_main_runtime<H>(
    config: MainRuntimeConfig,
    registry: TemplateRegistry,
    host: H,
    first_screen: SerializedSnapshot,
    cmd_rx: Receiver<MainCommand>,
    evt_tx: Sender<MainEvent>,
) -> JoinHandle<MainThreadTree<H>>
where
    H: ElementHost + Send + 'static,
{
    thread::spawn(move || {
        let mut tree = MainThreadTree::new(registry, host);
        let mut reload_version = config.reload_version;

        let root = match tree.mount(&first_screen) {
            Ok(root) => root,
            Err(err) => {
                log::error!(target: "runtime_main", "first screen failed: {err}");
                return tree;
            }
        };
        if let Some(serialized) = tree.serialize(root) {
            if log::log_enabled!(target: "runtime_main", log::Level::Trace) {
                for line in outline_from_snapshot(&serialized, OUTLINE_CAP) {
                    log::trace!(target: "runtime_main", "{line}");
                }
            }
            let _ = evt_tx.send(MainEvent::FirstScreen { tree: serialized });
        }

        while let Ok(cmd) = cmd_rx.recv() {
            match cmd {
                MainCommand::PatchUpdate(update) => {
                    let is_hydration = update.patch_options.is_hydration;
                    match update_main_thread(&mut tree, &update, reload_version) {
                        Ok(UpdateOutcome::Applied { commits, stats, .. }) => {
                            let level = if config.log_patches {
                                log::Level::Info
                            } else {
                                log::Level::Debug
                            };
                            log::log!(
                                target: "runtime_main",
                                level,
                                "applied {commits:?}: {} ops, {} missing",
                                stats.applied,
                                stats.missing
                            );
                            let _ = evt_tx.send(MainEvent::CommitDone {
                                ids: commits,
                                is_hydration,
                            });
                        }
                        Ok(UpdateOutcome::Stale) => {}
                        Err(err) => {
                            log::error!(target: "runtime_main", "patch update failed: {err}");
                            let ids = update
                                .unpack()
                                .map(|list| list.patch_list.iter().map(|p| p.id).collect())
                                .unwrap_or_default();
                            let _ = evt_tx.send(MainEvent::PatchFailed {
                                ids,
                                error: err.to_string(),
                            });
                        }
                    }
                }
                MainCommand::Inspect => {
                    let _ = evt_tx.send(MainEvent::Tree {
                        tree: tree.serialize(root),
                    });
                }
                MainCommand::Reload {
                    reload_version: next,
                } => {
                    reload_version = reload_version.max(next);
                }
                MainCommand::Shutdown => break,
            }
        }
        log::debug!(target: "runtime_main", "runtime stopped with {} instances", tree.len());
        tree
    })
}
