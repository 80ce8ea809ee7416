use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::time_utils::current_unix_timestamp_ms;

/// Writes `content` to a synced sibling temp file, then renames it over `path`.
///
/// The temp file never outlives a failed call.
pub fn write_text_atomic(path: &Path, content: &str) -> Result<()> {
    if path.as_os_str().is_empty() {
        bail!("destination path cannot be empty");
    }
    if path.is_dir() {
        bail!("destination path '{}' is a directory", path.display());
    }

    let parent_dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent_dir)
        .with_context(|| format!("failed to create {}", parent_dir.display()))?;

    let (pending, mut file) = PendingFile::create(parent_dir, path)?;
    file.write_all(content.as_bytes())
        .and_then(|()| file.sync_all())
        .with_context(|| format!("failed to write temporary file {}", pending.path.display()))?;
    drop(file);
    pending.persist(path)
}

/// Sibling temp file that is removed on drop unless `persist` moved it into place.
pub(crate) struct PendingFile {
    pub(crate) path: PathBuf,
    armed: bool,
}

impl PendingFile {
    pub(crate) fn create(parent_dir: &Path, destination: &Path) -> Result<(Self, File)> {
        let temp_name = format!(
            ".{}.tmp-{}-{}",
            destination
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or("state"),
            std::process::id(),
            current_unix_timestamp_ms()
        );
        let path = parent_dir.join(temp_name);
        let file = File::create(&path)
            .with_context(|| format!("failed to create temporary file {}", path.display()))?;
        Ok((Self { path, armed: true }, file))
    }

    pub(crate) fn persist(mut self, destination: &Path) -> Result<()> {
        std::fs::rename(&self.path, destination).with_context(|| {
            format!(
                "failed to rename temporary file {} to {}",
                self.path.display(),
                destination.display()
            )
        })?;
        self.armed = false;
        Ok(())
    }
}

impl Drop for PendingFile {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(error) = std::fs::remove_file(&self.path) {
            tracing::debug!(path = %self.path.display(), %error, "failed to remove temporary file");
        }
    }
}
