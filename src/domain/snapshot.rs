use std::collections::BTreeSet;
use std::io;
use std::path::Path;

use tracing::warn;

/// Names of the regular files present in a directory at one polling instant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectorySnapshot(BTreeSet<String>);

impl DirectorySnapshot {
    /// List the regular files directly inside `dir`.
    ///
    /// Subdirectories are excluded and symlinks are followed. Any read error,
    /// on the directory itself or on one of its entries, fails the whole
    /// capture so a partial listing is never treated as authoritative.
    pub async fn capture(dir: &Path) -> io::Result<Self> {
        let mut names = BTreeSet::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            // follows symlinks, unlike DirEntry::file_type
            let metadata = match tokio::fs::metadata(entry.path()).await {
                Ok(m) => m,
                // entry vanished between readdir and stat
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            };
            if !metadata.is_file() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => {
                    names.insert(name);
                }
                Err(raw) => {
                    warn!(name = ?raw, dir = %dir.display(), "skipping file with non UTF-8 name");
                }
            }
        }
        Ok(Self(names))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Names present in exactly one of `self` and `other`.
    pub fn symmetric_difference(&self, other: &DirectorySnapshot) -> ChangeSet {
        ChangeSet(self.0.symmetric_difference(&other.0).cloned().collect())
    }
}

impl<S: Into<String>> FromIterator<S> for DirectorySnapshot {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Names that appeared or disappeared between two consecutive snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet(BTreeSet<String>);

impl ChangeSet {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for ChangeSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl IntoIterator for ChangeSet {
    type Item = String;
    type IntoIter = std::collections::btree_set::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
