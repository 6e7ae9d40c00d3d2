use crate::domain::snapshot::{ChangeSet, DirectorySnapshot};

/// Remembers the last observed listing of a directory and reports what
/// changed since.
///
/// Changes are the symmetric difference of two listings, so a rename shows up
/// as two names and a file removed and re-created between two polls is not
/// seen at all.
#[derive(Debug, Clone)]
pub struct ChangeDetector {
    baseline: DirectorySnapshot,
}

impl ChangeDetector {
    /// Start from `initial`, usually the listing taken at process start, so
    /// the first poll only reports files that arrived afterwards.
    pub fn new(initial: DirectorySnapshot) -> Self {
        Self { baseline: initial }
    }

    pub fn baseline(&self) -> &DirectorySnapshot {
        &self.baseline
    }

    /// Names that differ between the held baseline and `current`.
    pub fn diff(&self, current: &DirectorySnapshot) -> ChangeSet {
        current.symmetric_difference(&self.baseline)
    }

    /// Replace the baseline.
    pub fn commit(&mut self, current: DirectorySnapshot) {
        self.baseline = current;
    }

    /// Diff against the baseline, then make `current` the new baseline.
    pub fn detect_changes(&mut self, current: DirectorySnapshot) -> ChangeSet {
        let changes = self.diff(&current);
        self.commit(current);
        changes
    }
}
