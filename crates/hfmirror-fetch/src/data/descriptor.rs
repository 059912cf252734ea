use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Suffix appended to a final path to name its staging file.
pub const STAGING_SUFFIX: &str = ".incomplete";

/// Kind of an entry returned by the tree listing API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
    #[serde(other)]
    Other,
}

/// One raw entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    #[serde(default)]
    pub size: u64,
    #[serde(rename = "type")]
    pub kind: EntryKind,
}

/// A remote file selected for download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    /// Path relative to the repository root.
    pub path: String,
    /// Path relative to the local root, with the subfolder prefix removed.
    pub local_path: String,
    /// Expected size in bytes.
    pub size: u64,
    /// Download URL, without proxy prefix.
    pub url: String,
}

impl FileDescriptor {
    pub fn new(
        path: impl Into<String>,
        local_path: impl Into<String>,
        size: u64,
        url: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            local_path: local_path.into(),
            size,
            url: url.into(),
        }
    }

    /// Where the committed file lives under `root`.
    pub fn final_path(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        path.extend(self.local_path.split('/').filter(|s| !s.is_empty()));
        path
    }

    /// Where bytes accumulate before the atomic commit.
    pub fn staging_path(&self, root: &Path) -> PathBuf {
        staging_path_for(&self.final_path(root))
    }

    /// File name used for progress display.
    pub fn display_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

pub fn staging_path_for(final_path: &Path) -> PathBuf {
    let mut name = final_path.as_os_str().to_os_string();
    name.push(STAGING_SUFFIX);
    PathBuf::from(name)
}

/// Sum of all descriptor sizes.
pub fn total_size(descriptors: &[FileDescriptor]) -> u64 {
    descriptors.iter().map(|d| d.size).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_listing_entries() {
        let json = r#"[
            {"type": "file", "oid": "abc", "size": 10, "path": "config.json"},
            {"type": "directory", "oid": "def", "size": 0, "path": "unet"},
            {"type": "symlink", "path": "weird"},
            {"type": "file", "path": "empty"}
        ]"#;
        let entries: Vec<TreeEntry> = serde_json::from_str(json).unwrap();
        assert_eq!(entries[0].kind, EntryKind::File);
        assert_eq!(entries[0].size, 10);
        assert_eq!(entries[1].kind, EntryKind::Directory);
        assert_eq!(entries[2].kind, EntryKind::Other);
        assert_eq!(entries[3].size, 0);
    }

    #[test]
    fn staging_path_appends_suffix() {
        let d = FileDescriptor::new("unet/model.bin", "unet/model.bin", 1, "u");
        let root = Path::new("/models/sd");
        assert_eq!(d.final_path(root), PathBuf::from("/models/sd/unet/model.bin"));
        assert_eq!(
            d.staging_path(root),
            PathBuf::from("/models/sd/unet/model.bin.incomplete")
        );
        assert_eq!(d.display_name(), "model.bin");
    }
}
