use std::path::{Path, PathBuf};
use anyhow::{Context, Result};

/// Abstraction over where project files live.
/// Lets the patcher run against an in-memory store in tests instead of the disk.
pub trait ProjectStore {
    /// Read the whole project file as UTF-8 text.
    fn read_project(&self, path: &Path) -> Result<String>;

    /// Replace the project file's content.
    fn write_project(&self, path: &Path, content: &str) -> Result<()>;

    /// Write a copy of the original content next to the project.
    fn write_backup(&self, path: &Path, content: &str) -> Result<()>;
}

/// `<project>.bak`, keeping the original extension (`app.ewp` -> `app.ewp.bak`).
pub fn backup_path(project: &Path) -> PathBuf {
    let mut name = project.as_os_str().to_owned();
    name.push(".bak");
    PathBuf::from(name)
}

/// The real filesystem (Production).
pub struct FsStore;

impl ProjectStore for FsStore {
    fn read_project(&self, path: &Path) -> Result<String> {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read project file {:?}", path))
    }

    fn write_project(&self, path: &Path, content: &str) -> Result<()> {
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write project file {:?}", path))
    }

    fn write_backup(&self, path: &Path, content: &str) -> Result<()> {
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write backup {:?}", path))
    }
}

/// An in-memory store for testing.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockStore {
    pub files: std::sync::Mutex<std::collections::HashMap<PathBuf, String>>,
    pub writes: std::sync::Mutex<Vec<PathBuf>>,
}

#[cfg(test)]
impl MockStore {
    pub fn with_file(path: &str, content: &str) -> Self {
        let mut files = std::collections::HashMap::new();
        files.insert(PathBuf::from(path), content.to_string());
        Self {
            files: std::sync::Mutex::new(files),
            ..Default::default()
        }
    }

    pub fn content(&self, path: &str) -> Option<String> {
        self.files.lock().unwrap().get(Path::new(path)).cloned()
    }
}

#[cfg(test)]
impl ProjectStore for MockStore {
    fn read_project(&self, path: &Path) -> Result<String> {
        let files = self.files.lock().unwrap();
        files.get(path)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("{:?} not found in mock store", path))
    }

    fn write_project(&self, path: &Path, content: &str) -> Result<()> {
        self.files.lock().unwrap().insert(path.to_path_buf(), content.to_string());
        self.writes.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }

    fn write_backup(&self, path: &Path, content: &str) -> Result<()> {
        self.write_project(path, content)
    }
}
