use std::path::{Component, Path, PathBuf};

use crate::SandboxError;

/// Extensions accepted for file-targeting operations when no override is configured.
pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] = &[
    ".py", ".js", ".ts", ".go", ".rs", ".java", ".txt", ".md", ".json", ".yml", ".yaml", ".html",
    ".css", ".sh",
];

const MAX_SYMLINK_HOPS: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Enumerates sandbox operations that require a validated path.
pub enum PathOperation {
    Read,
    Write,
    List,
    Delete,
    Move,
    Mkdir,
    Stat,
}

impl PathOperation {
    /// Whether `resolved` names file content for this operation, and so must
    /// pass the extension allow-list.
    fn targets_file(self, resolved: &Path) -> bool {
        match self {
            Self::Read | Self::Write => true,
            Self::Delete => !resolved.is_dir(),
            Self::List | Self::Move | Self::Mkdir | Self::Stat => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Absolute, resolved path proven to sit at or below the sandbox root.
///
/// Only `PathValidator::validate` constructs these.
pub struct SandboxPath {
    absolute: PathBuf,
    relative: PathBuf,
}

impl SandboxPath {
    pub fn as_path(&self) -> &Path {
        &self.absolute
    }

    /// Path relative to the sandbox root, `.` for the root itself.
    pub fn relative(&self) -> &Path {
        &self.relative
    }

    pub fn display_relative(&self) -> String {
        if self.relative.as_os_str().is_empty() {
            ".".to_string()
        } else {
            self.relative.display().to_string()
        }
    }

    pub fn is_root(&self) -> bool {
        self.relative.as_os_str().is_empty()
    }
}

#[derive(Debug, Clone)]
/// Resolves caller-supplied paths against a fixed sandbox root.
pub struct PathValidator {
    root: PathBuf,
    allowed_extensions: Vec<String>,
}

impl PathValidator {
    /// Canonicalizes `root` once; it must exist and be a directory.
    pub fn new<I, S>(root: &Path, allowed_extensions: I) -> Result<Self, SandboxError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let root = std::fs::canonicalize(root)
            .map_err(|error| SandboxError::io(root.display().to_string(), error))?;
        if !root.is_dir() {
            return Err(SandboxError::NotADirectory {
                path: root.display().to_string(),
            });
        }
        let allowed_extensions = allowed_extensions
            .into_iter()
            .map(|extension| normalize_extension(extension.as_ref()))
            .filter(|extension| extension.len() > 1)
            .collect();
        Ok(Self {
            root,
            allowed_extensions,
        })
    }

    pub fn with_default_extensions(root: &Path) -> Result<Self, SandboxError> {
        Self::new(root, DEFAULT_ALLOWED_EXTENSIONS.iter().copied())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn allowed_extensions(&self) -> &[String] {
        &self.allowed_extensions
    }

    /// Validates `user_path` for `operation` without issuing any mutating syscall.
    ///
    /// `.` and `..` are folded lexically first, then the nearest existing ancestor
    /// is canonicalized so symlinks cannot smuggle the result outside the root.
    pub fn validate(
        &self,
        user_path: &str,
        operation: PathOperation,
    ) -> Result<SandboxPath, SandboxError> {
        let trimmed = user_path.trim();
        if trimmed.is_empty() {
            return Err(SandboxError::validation("path must not be empty"));
        }
        if trimmed.contains('\0') {
            return Err(SandboxError::validation("path must not contain NUL bytes"));
        }

        let candidate = Path::new(trimmed);
        let joined = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.root.join(candidate)
        };
        let normalized = normalize_lexically(&joined);
        if !normalized.starts_with(&self.root) {
            return Err(SandboxError::PathSecurity {
                path: trimmed.to_string(),
            });
        }

        let canonical = canonicalize_best_effort(&normalized)
            .map_err(|error| SandboxError::io(trimmed, error))?;
        let Ok(relative) = canonical.strip_prefix(&self.root) else {
            return Err(SandboxError::PathSecurity {
                path: trimmed.to_string(),
            });
        };
        let relative = relative.to_path_buf();

        if operation.targets_file(&canonical) {
            self.check_extension(&canonical)?;
        }

        Ok(SandboxPath {
            absolute: canonical,
            relative,
        })
    }

    fn check_extension(&self, path: &Path) -> Result<(), SandboxError> {
        let Some(extension) = path.extension() else {
            return Ok(());
        };
        let extension = normalize_extension(&extension.to_string_lossy());
        if self.allowed_extensions.iter().any(|allowed| *allowed == extension) {
            return Ok(());
        }
        Err(SandboxError::UnsupportedFileType { extension })
    }
}

fn normalize_extension(raw: &str) -> String {
    let lowered = raw.trim().to_ascii_lowercase();
    if lowered.starts_with('.') {
        lowered
    } else {
        format!(".{lowered}")
    }
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => normalized.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            Component::Normal(part) => normalized.push(part),
        }
    }
    normalized
}

/// Resolves `path` one component at a time, following every symlink it meets,
/// including dangling ones, so the result names what a syscall would touch.
fn canonicalize_best_effort(path: &Path) -> std::io::Result<PathBuf> {
    resolve_components(path, 0)
}

fn resolve_components(path: &Path, hops: usize) -> std::io::Result<PathBuf> {
    let mut resolved = PathBuf::new();
    let mut components = path.components();
    while let Some(component) = components.next() {
        match component {
            Component::Prefix(_) | Component::RootDir => resolved.push(component.as_os_str()),
            Component::CurDir => {}
            // `resolved` never holds a symlink, so popping is exact.
            Component::ParentDir => {
                resolved.pop();
            }
            Component::Normal(part) => {
                let next = resolved.join(part);
                let is_symlink = std::fs::symlink_metadata(&next)
                    .map(|metadata| metadata.file_type().is_symlink())
                    .unwrap_or(false);
                if !is_symlink {
                    resolved = next;
                    continue;
                }
                if hops >= MAX_SYMLINK_HOPS {
                    return Err(std::io::Error::other("too many levels of symbolic links"));
                }
                let target = std::fs::read_link(&next)?;
                let mut redirected = if target.is_absolute() {
                    target
                } else {
                    resolved.join(target)
                };
                redirected.extend(components);
                return resolve_components(&redirected, hops + 1);
            }
        }
    }
    Ok(resolved)
}
