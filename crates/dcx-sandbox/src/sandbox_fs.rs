use std::fs::Metadata;
use std::path::Path;

use serde::Serialize;
use serde_json::{json, Map, Value};

use dcx_core::system_time_to_rfc3339;

use crate::{PathOperation, PathValidator, SandboxError, SandboxPath};

/// Largest file `read` will load, in bytes.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1_048_576;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
/// One level of a directory, names only, sorted.
pub struct DirectoryListing {
    pub files: Vec<String>,
    pub directories: Vec<String>,
}

#[derive(Debug, Clone)]
/// Filesystem operations confined to a sandbox root.
///
/// Stateless beyond its configuration. Concurrent callers touching the same
/// path race with last-write-wins semantics; no locking is performed.
pub struct SandboxFs {
    validator: PathValidator,
    max_file_size: u64,
}

impl SandboxFs {
    pub fn new(validator: PathValidator, max_file_size: u64) -> Self {
        Self {
            validator,
            max_file_size,
        }
    }

    pub fn validator(&self) -> &PathValidator {
        &self.validator
    }

    pub fn read(&self, path: &str) -> Result<String, SandboxError> {
        let target = self.validator.validate(path, PathOperation::Read)?;
        let metadata = existing_metadata(&target)?;
        if metadata.is_dir() {
            return Err(SandboxError::IsADirectory {
                path: target.display_relative(),
                hint: "use list_dir to inspect directories",
            });
        }
        if metadata.len() > self.max_file_size {
            return Err(SandboxError::TooLarge {
                path: target.display_relative(),
                size: metadata.len(),
                limit: self.max_file_size,
            });
        }
        let bytes = std::fs::read(target.as_path())
            .map_err(|error| SandboxError::io(target.display_relative(), error))?;
        String::from_utf8(bytes).map_err(|_| {
            SandboxError::validation(format!(
                "file '{}' is not valid UTF-8 text",
                target.display_relative()
            ))
        })
    }

    pub fn write(&self, path: &str, content: &str) -> Result<(), SandboxError> {
        let target = self.validator.validate(path, PathOperation::Write)?;
        if target.as_path().is_dir() {
            return Err(SandboxError::IsADirectory {
                path: target.display_relative(),
                hint: "cannot overwrite a directory with file content",
            });
        }
        let size = content.len() as u64;
        if size > self.max_file_size {
            return Err(SandboxError::TooLarge {
                path: target.display_relative(),
                size,
                limit: self.max_file_size,
            });
        }
        if let Some(parent) = target.as_path().parent() {
            std::fs::create_dir_all(parent)
                .map_err(|error| SandboxError::io(target.display_relative(), error))?;
        }
        std::fs::write(target.as_path(), content)
            .map_err(|error| SandboxError::io(target.display_relative(), error))
    }

    pub fn list(&self, path: &str) -> Result<DirectoryListing, SandboxError> {
        let target = self.validator.validate(path, PathOperation::List)?;
        let metadata = existing_metadata(&target)?;
        if !metadata.is_dir() {
            return Err(SandboxError::NotADirectory {
                path: target.display_relative(),
            });
        }

        let mut listing = DirectoryListing::default();
        let entries = std::fs::read_dir(target.as_path())
            .map_err(|error| SandboxError::io(target.display_relative(), error))?;
        for entry in entries {
            let entry = entry.map_err(|error| SandboxError::io(target.display_relative(), error))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if entry.path().is_dir() {
                listing.directories.push(name);
            } else {
                listing.files.push(name);
            }
        }
        listing.files.sort();
        listing.directories.sort();
        Ok(listing)
    }

    pub fn delete(&self, path: &str, recursive: bool) -> Result<(), SandboxError> {
        let target = self.validator.validate(path, PathOperation::Delete)?;
        if target.is_root() {
            return Err(SandboxError::validation("refusing to delete the sandbox root"));
        }
        let metadata = std::fs::symlink_metadata(target.as_path()).map_err(|error| {
            not_found_or_io(&target, error)
        })?;

        let result = if metadata.is_dir() {
            if recursive {
                std::fs::remove_dir_all(target.as_path())
            } else if directory_is_empty(target.as_path())
                .map_err(|error| SandboxError::io(target.display_relative(), error))?
            {
                std::fs::remove_dir(target.as_path())
            } else {
                return Err(SandboxError::IsADirectory {
                    path: target.display_relative(),
                    hint: "set recursive=true to delete a non-empty directory",
                });
            }
        } else {
            std::fs::remove_file(target.as_path())
        };
        result.map_err(|error| SandboxError::io(target.display_relative(), error))
    }

    /// Moves `source` to `destination`, refusing to replace an existing target
    /// unless `overwrite` is set. The source is untouched on every error path.
    pub fn move_path(
        &self,
        source: &str,
        destination: &str,
        overwrite: bool,
    ) -> Result<String, SandboxError> {
        let from = self.validator.validate(source, PathOperation::Move)?;
        let to = self.validator.validate(destination, PathOperation::Move)?;
        if from.is_root() || to.is_root() {
            return Err(SandboxError::validation("cannot move the sandbox root"));
        }
        if std::fs::symlink_metadata(from.as_path()).is_err() {
            return Err(SandboxError::NotFound {
                path: from.display_relative(),
            });
        }
        if from == to {
            return Err(SandboxError::validation(format!(
                "source and destination are the same path '{}'",
                from.display_relative()
            )));
        }
        if to.as_path().starts_with(from.as_path()) {
            return Err(SandboxError::validation(format!(
                "cannot move '{}' into itself",
                from.display_relative()
            )));
        }

        let replaced_dir = match std::fs::symlink_metadata(to.as_path()) {
            Ok(_) if !overwrite => {
                return Err(SandboxError::AlreadyExists {
                    path: to.display_relative(),
                });
            }
            Ok(existing) => {
                let source_is_dir = from.as_path().is_dir();
                if existing.is_dir() != source_is_dir {
                    return Err(SandboxError::validation(format!(
                        "cannot replace '{}' with '{}': one is a directory and the other is not",
                        to.display_relative(),
                        from.display_relative()
                    )));
                }
                existing.is_dir()
            }
            Err(_) => false,
        };

        if let Some(parent) = to.as_path().parent() {
            std::fs::create_dir_all(parent)
                .map_err(|error| SandboxError::io(to.display_relative(), error))?;
        }
        // rename replaces a file target atomically; a directory target must be gone first.
        if replaced_dir {
            std::fs::remove_dir_all(to.as_path())
                .map_err(|error| SandboxError::io(to.display_relative(), error))?;
        }
        std::fs::rename(from.as_path(), to.as_path())
            .map_err(|error| SandboxError::io(from.display_relative(), error))?;
        Ok(format!(
            "Moved '{}' to '{}'",
            from.display_relative(),
            to.display_relative()
        ))
    }

    pub fn mkdir(&self, path: &str, parents: bool, exist_ok: bool) -> Result<String, SandboxError> {
        let target = self.validator.validate(path, PathOperation::Mkdir)?;
        if let Ok(existing) = std::fs::metadata(target.as_path()) {
            if existing.is_dir() && exist_ok {
                return Ok(format!(
                    "Directory '{}' already exists",
                    target.display_relative()
                ));
            }
            return Err(SandboxError::AlreadyExists {
                path: target.display_relative(),
            });
        }

        let created = if parents {
            std::fs::create_dir_all(target.as_path())
        } else {
            std::fs::create_dir(target.as_path())
        };
        created.map_err(|error| match error.kind() {
            std::io::ErrorKind::NotFound => SandboxError::NotFound {
                path: target
                    .relative()
                    .parent()
                    .map(|parent| parent.display().to_string())
                    .filter(|parent| !parent.is_empty())
                    .unwrap_or_else(|| ".".to_string()),
            },
            _ => SandboxError::io(target.display_relative(), error),
        })?;
        Ok(format!("Created directory '{}'", target.display_relative()))
    }

    pub fn stat(&self, path: &str) -> Result<Value, SandboxError> {
        let target = self.validator.validate(path, PathOperation::Stat)?;
        let metadata = existing_metadata(&target)?;
        let name = target
            .as_path()
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let kind = if metadata.is_dir() {
            "directory"
        } else if metadata.is_file() {
            "file"
        } else {
            "other"
        };
        let mode = permission_bits(&metadata);
        let (owner_uid, group_gid) = ownership(&metadata);

        let mut result = Map::new();
        result.insert("name".to_string(), json!(name));
        result.insert("path".to_string(), json!(target.display_relative()));
        result.insert("type".to_string(), json!(kind));
        result.insert("size".to_string(), json!(metadata.len()));
        result.insert("permissions".to_string(), json!(render_permissions(mode)));
        result.insert(
            "permissions_octal".to_string(),
            json!(format!("{:o}", mode & 0o7777)),
        );
        result.insert("owner_uid".to_string(), json!(owner_uid));
        result.insert("group_gid".to_string(), json!(group_gid));
        result.insert(
            "created_time".to_string(),
            json!(metadata.created().ok().map(system_time_to_rfc3339)),
        );
        result.insert(
            "modified_time".to_string(),
            json!(metadata.modified().ok().map(system_time_to_rfc3339)),
        );
        result.insert(
            "accessed_time".to_string(),
            json!(metadata.accessed().ok().map(system_time_to_rfc3339)),
        );
        result.insert(
            "is_readable".to_string(),
            json!(is_openable(target.as_path(), metadata.is_dir())),
        );
        result.insert(
            "is_writable".to_string(),
            json!(!metadata.permissions().readonly() && mode & 0o222 != 0),
        );
        result.insert("is_executable".to_string(), json!(mode & 0o111 != 0));

        if metadata.is_dir() {
            let (files, dirs, items) = count_children(target.as_path())
                .map_err(|error| SandboxError::io(target.display_relative(), error))?;
            result.insert("item_count".to_string(), json!(items));
            result.insert("file_count".to_string(), json!(files));
            result.insert("dir_count".to_string(), json!(dirs));
        } else {
            let extension = target
                .as_path()
                .extension()
                .map(|extension| format!(".{}", extension.to_string_lossy()))
                .unwrap_or_default();
            let stem = target
                .as_path()
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default();
            result.insert("extension".to_string(), json!(extension));
            result.insert("stem".to_string(), json!(stem));
        }
        Ok(Value::Object(result))
    }
}

fn existing_metadata(target: &SandboxPath) -> Result<Metadata, SandboxError> {
    std::fs::metadata(target.as_path()).map_err(|error| not_found_or_io(target, error))
}

fn not_found_or_io(target: &SandboxPath, error: std::io::Error) -> SandboxError {
    if error.kind() == std::io::ErrorKind::NotFound {
        SandboxError::NotFound {
            path: target.display_relative(),
        }
    } else {
        SandboxError::io(target.display_relative(), error)
    }
}

fn directory_is_empty(path: &Path) -> std::io::Result<bool> {
    Ok(std::fs::read_dir(path)?.next().is_none())
}

fn count_children(path: &Path) -> std::io::Result<(u64, u64, u64)> {
    let (mut files, mut dirs, mut items) = (0_u64, 0_u64, 0_u64);
    for entry in std::fs::read_dir(path)? {
        let file_type = entry?.file_type()?;
        items += 1;
        if file_type.is_dir() {
            dirs += 1;
        } else if file_type.is_file() {
            files += 1;
        }
    }
    Ok((files, dirs, items))
}

fn is_openable(path: &Path, is_dir: bool) -> bool {
    if is_dir {
        std::fs::read_dir(path).is_ok()
    } else {
        std::fs::File::open(path).is_ok()
    }
}

#[cfg(unix)]
fn permission_bits(metadata: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode()
}

#[cfg(not(unix))]
fn permission_bits(metadata: &Metadata) -> u32 {
    if metadata.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}

#[cfg(unix)]
fn ownership(metadata: &Metadata) -> (Option<u32>, Option<u32>) {
    use std::os::unix::fs::MetadataExt;
    (Some(metadata.uid()), Some(metadata.gid()))
}

#[cfg(not(unix))]
fn ownership(_metadata: &Metadata) -> (Option<u32>, Option<u32>) {
    (None, None)
}

fn render_permissions(mode: u32) -> String {
    const FLAGS: [(u32, char); 9] = [
        (0o400, 'r'),
        (0o200, 'w'),
        (0o100, 'x'),
        (0o040, 'r'),
        (0o020, 'w'),
        (0o010, 'x'),
        (0o004, 'r'),
        (0o002, 'w'),
        (0o001, 'x'),
    ];
    FLAGS
        .iter()
        .map(|(bit, flag)| if mode & bit != 0 { *flag } else { '-' })
        .collect()
}
