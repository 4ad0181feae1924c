//! EV-014: Classify differences between two source snapshots.

use super::hasher::Snapshot;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Changed,
    Removed,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added => write!(f, "added"),
            Self::Changed => write!(f, "changed"),
            Self::Removed => write!(f, "removed"),
        }
    }
}

/// One file that differs between snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

/// Changes from `old` to `new`, ordered by path.
pub fn diff(old: &Snapshot, new: &Snapshot) -> Vec<Change> {
    let mut changes: Vec<Change> = new
        .iter()
        .filter_map(|(path, hash)| {
            let kind = match old.get(path) {
                None => ChangeKind::Added,
                Some(prev) if prev != hash => ChangeKind::Changed,
                Some(_) => return None,
            };
            Some(Change {
                path: path.clone(),
                kind,
            })
        })
        .collect();

    changes.extend(
        old.keys()
            .filter(|path| !new.contains_key(*path))
            .map(|path| Change {
                path: path.clone(),
                kind: ChangeKind::Removed,
            }),
    );
    changes.sort_by(|a, b| a.path.cmp(&b.path));
    changes
}
