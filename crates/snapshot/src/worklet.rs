//! Execution ids for worklets sent to the main thread.
//!
//! A worklet keeps its background-side state alive for as long as the main
//! thread may call back into it. Each worklet gets one execution id the first
//! time it is committed; the main thread releases ids when it drops them.

use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

use crate::value::{Gesture, Worklet};

#[derive(Debug)]
pub struct WorkletRegistry {
    next_exec_id: u64,
    live: BTreeMap<u64, Worklet>,
}

impl WorkletRegistry {
    pub fn new() -> Self {
        Self {
            next_exec_id: 1,
            live: BTreeMap::new(),
        }
    }

    /// Assigns an execution id on first use and returns the committed form.
    pub fn resolve(&mut self, worklet: &Worklet) -> JsonValue {
        if worklet.exec_id().is_none() {
            let exec_id = self.next_exec_id;
            self.next_exec_id += 1;
            worklet.assign_exec_id(exec_id);
            self.live.insert(exec_id, worklet.clone());
        }
        worklet.to_json()
    }

    /// Resolves every callback of `gesture` and returns its committed form.
    pub fn process_gesture(&mut self, gesture: &Gesture) -> JsonValue {
        for worklet in gesture.callbacks.values() {
            self.resolve(worklet);
        }
        gesture.to_json()
    }

    pub fn get(&self, exec_id: u64) -> Option<&Worklet> {
        self.live.get(&exec_id)
    }

    pub fn release(&mut self, exec_ids: impl IntoIterator<Item = u64>) {
        for exec_id in exec_ids {
            if self.live.remove(&exec_id).is_none() {
                log::warn!(target: "snapshot.worklet", "release of unknown exec id {exec_id}");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}

impl Default for WorkletRegistry {
    fn default() -> Self {
        Self::new()
    }
}
