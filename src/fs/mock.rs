// src/fs/mock.rs

use super::FileSystem;
use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone)]
pub enum MockEntry {
    File(Vec<u8>),
    Dir,
}

/// In-memory filesystem. Clones share the same underlying tree.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    entries: Arc<Mutex<BTreeMap<PathBuf, MockEntry>>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let path = path.as_ref().to_path_buf();
        let mut entries = self.lock();
        if let Some(parent) = path.parent() {
            Self::ensure_dirs(&mut entries, parent);
        }
        entries.insert(path, MockEntry::File(content.into()));
    }

    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let mut entries = self.lock();
        Self::ensure_dirs(&mut entries, path.as_ref());
    }

    /// Append bytes to a file, creating it if needed. Handy for simulating a
    /// growing dump file.
    pub fn append(&self, path: impl AsRef<Path>, content: &[u8]) {
        let path = path.as_ref();
        let existing = match self.lock().get(path) {
            Some(MockEntry::File(bytes)) => bytes.clone(),
            _ => Vec::new(),
        };
        let mut bytes = existing;
        bytes.extend_from_slice(content);
        self.add_file(path, bytes);
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.lock().keys().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<PathBuf, MockEntry>> {
        // A poisoned lock only means another test thread panicked.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn ensure_dirs(entries: &mut BTreeMap<PathBuf, MockEntry>, path: &Path) {
        for ancestor in path.ancestors() {
            if ancestor.as_os_str().is_empty() {
                continue;
            }
            entries
                .entry(ancestor.to_path_buf())
                .or_insert(MockEntry::Dir);
        }
    }
}

impl FileSystem for MockFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        match self.lock().get(path) {
            Some(MockEntry::File(content)) => {
                String::from_utf8(content.clone()).map_err(|e| anyhow!("Invalid UTF-8: {}", e))
            }
            Some(MockEntry::Dir) => Err(anyhow!("Is a directory: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.add_file(path, contents);
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.lock().contains_key(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        matches!(self.lock().get(path), Some(MockEntry::Dir))
    }

    fn file_size(&self, path: &Path) -> Result<Option<u64>> {
        match self.lock().get(path) {
            Some(MockEntry::File(content)) => Ok(Some(content.len() as u64)),
            Some(MockEntry::Dir) => Err(anyhow!("Is a directory: {:?}", path)),
            None => Ok(None),
        }
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        self.add_dir(path);
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let mut entries = self.lock();
        if !entries.contains_key(from) {
            return Err(anyhow!("File not found: {:?}", from));
        }
        if entries.contains_key(to) {
            return Err(anyhow!("Destination exists: {:?}", to));
        }

        let moved: Vec<(PathBuf, MockEntry)> = entries
            .iter()
            .filter(|(p, _)| p.starts_with(from))
            .map(|(p, e)| (p.clone(), e.clone()))
            .collect();

        for (old, entry) in moved {
            entries.remove(&old);
            let rest = old.strip_prefix(from).map(Path::to_path_buf).unwrap_or_default();
            let new = if rest.as_os_str().is_empty() {
                to.to_path_buf()
            } else {
                to.join(rest)
            };
            entries.insert(new, entry);
        }

        if let Some(parent) = to.parent() {
            Self::ensure_dirs(&mut entries, parent);
        }
        Ok(())
    }

    fn copy_file(&self, from: &Path, to: &Path) -> Result<()> {
        let content = match self.lock().get(from) {
            Some(MockEntry::File(content)) => content.clone(),
            Some(MockEntry::Dir) => return Err(anyhow!("Is a directory: {:?}", from)),
            None => return Err(anyhow!("File not found: {:?}", from)),
        };
        self.add_file(to, content);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rename_moves_whole_subtree() {
        let fs = MockFileSystem::new();
        fs.add_file("/srv/moodle/version.php", "<?php");
        fs.add_file("/srv/moodle/admin/cli/upgrade.php", "<?php");

        fs.rename(Path::new("/srv/moodle"), Path::new("/srv/moodle_previous"))
            .unwrap();

        assert!(!fs.exists(Path::new("/srv/moodle")));
        assert!(fs.is_dir(Path::new("/srv/moodle_previous/admin/cli")));
        assert!(fs.exists(Path::new("/srv/moodle_previous/admin/cli/upgrade.php")));
    }

    #[test]
    fn copy_file_keeps_source() {
        let fs = MockFileSystem::new();
        fs.add_file("/srv/moodle/config.php", "<?php $CFG = 1;");
        fs.copy_file(
            Path::new("/srv/moodle/config.php"),
            Path::new("/srv/moodle_incoming/config.php"),
        )
        .unwrap();
        assert!(fs.exists(Path::new("/srv/moodle/config.php")));
        assert_eq!(
            fs.read_to_string(Path::new("/srv/moodle_incoming/config.php")).unwrap(),
            "<?php $CFG = 1;"
        );
        assert!(fs.copy_file(Path::new("/nope"), Path::new("/x")).is_err());
    }

    #[test]
    fn append_grows_file() {
        let fs = MockFileSystem::new();
        let dump = Path::new("/backups/moodle.sql");
        assert_eq!(fs.file_size(dump).unwrap(), None);
        fs.append(dump, b"abc");
        fs.append(dump, b"de");
        assert_eq!(fs.file_size(dump).unwrap(), Some(5));
    }
}
