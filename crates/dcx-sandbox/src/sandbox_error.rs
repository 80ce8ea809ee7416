use thiserror::Error;

#[derive(Debug, Error)]
/// Failures raised by path validation and sandboxed file operations.
pub enum SandboxError {
    #[error("{0}")]
    Validation(String),
    #[error("path '{path}' resolves outside the sandbox root")]
    PathSecurity { path: String },
    #[error("unsupported file type '{extension}'")]
    UnsupportedFileType { extension: String },
    #[error("path '{path}' does not exist")]
    NotFound { path: String },
    #[error("path '{path}' already exists")]
    AlreadyExists { path: String },
    #[error("file '{path}' is {size} bytes which exceeds the {limit} byte limit")]
    TooLarge { path: String, size: u64, limit: u64 },
    #[error("'{path}' is a directory; {hint}")]
    IsADirectory { path: String, hint: &'static str },
    #[error("'{path}' is not a directory")]
    NotADirectory { path: String },
    #[error("missing or invalid API key")]
    Authentication,
    #[error("i/o error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl SandboxError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Stable machine-readable code used in error envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::PathSecurity { .. } => "path_security_error",
            Self::UnsupportedFileType { .. } => "unsupported_file_type",
            Self::NotFound { .. } => "not_found",
            Self::AlreadyExists { .. } => "already_exists",
            Self::TooLarge { .. } => "file_too_large",
            Self::IsADirectory { .. } => "is_a_directory",
            Self::NotADirectory { .. } => "not_a_directory",
            Self::Authentication => "authentication_error",
            Self::Io { .. } => "internal_error",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::NotADirectory { .. } => 400,
            Self::Authentication => 401,
            Self::PathSecurity { .. } => 403,
            Self::NotFound { .. } => 404,
            Self::AlreadyExists { .. } | Self::IsADirectory { .. } => 409,
            Self::TooLarge { .. } => 413,
            Self::UnsupportedFileType { .. } => 415,
            Self::Io { .. } => 500,
        }
    }
}
