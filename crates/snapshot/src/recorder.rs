use crate::snapshot_patch::{SnapshotOperation, SnapshotPatch};

/// Operation log of one background tree.
///
/// Recording is opt-in: pushes outside an `init()`/`deinit()` window are
/// dropped silently.
#[derive(Debug, Default)]
pub struct PatchRecorder {
    log: Option<SnapshotPatch>,
}

impl PatchRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts recording with an empty log, discarding anything pending.
    pub fn init(&mut self) {
        self.log = Some(SnapshotPatch::new());
    }

    pub fn deinit(&mut self) {
        self.log = None;
    }

    pub fn is_recording(&self) -> bool {
        self.log.is_some()
    }

    /// Returns the accumulated log and clears it. Recording stays active.
    /// `None` when not recording.
    pub fn take(&mut self) -> Option<SnapshotPatch> {
        self.log.as_mut().map(std::mem::take)
    }

    pub fn pending(&self) -> usize {
        self.log.as_ref().map_or(0, SnapshotPatch::len)
    }

    pub fn push(&mut self, op: SnapshotOperation) {
        if let Some(log) = self.log.as_mut() {
            log::trace!(target: "snapshot.recorder", "{op}");
            log.push(op);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::InstanceId;

    fn remove(n: i32) -> SnapshotOperation {
        SnapshotOperation::RemoveChild {
            parent: InstanceId(1),
            child: InstanceId(n),
        }
    }

    #[test]
    fn pushes_outside_recording_are_dropped() {
        let mut recorder = PatchRecorder::new();
        recorder.push(remove(2));
        assert!(!recorder.is_recording());
        assert_eq!(recorder.take(), None);
    }

    #[test]
    fn take_clears_and_keeps_recording() {
        let mut recorder = PatchRecorder::new();
        recorder.init();
        recorder.push(remove(2));
        recorder.push(remove(3));
        let patch = recorder.take().expect("recording");
        assert_eq!(patch.ops(), &[remove(2), remove(3)]);
        assert!(recorder.is_recording());
        assert_eq!(recorder.pending(), 0);
        recorder.push(remove(4));
        assert_eq!(recorder.take().expect("recording").len(), 1);
    }

    #[test]
    fn deinit_stops_recording() {
        let mut recorder = PatchRecorder::new();
        recorder.init();
        recorder.push(remove(2));
        recorder.deinit();
        recorder.push(remove(3));
        assert_eq!(recorder.take(), None);
    }
}
