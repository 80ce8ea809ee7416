//! Sandboxed file service for dcx.
//!
//! `PathValidator` is the only way to obtain a `SandboxPath`; every operation in
//! `SandboxFs` takes one, so nothing touches disk before validation has passed.
//! `SandboxService` exposes those operations over authenticated HTTP and
//! `SandboxGateway` is the client the agent uses to reach it.

mod path_validator;
mod sandbox_error;
mod sandbox_fs;
mod sandbox_gateway;
mod sandbox_service;

pub use path_validator::{PathOperation, PathValidator, SandboxPath, DEFAULT_ALLOWED_EXTENSIONS};
pub use sandbox_error::SandboxError;
pub use sandbox_fs::{DirectoryListing, SandboxFs, DEFAULT_MAX_FILE_SIZE};
pub use sandbox_gateway::{SandboxGateway, SandboxGatewayConfig};
pub use sandbox_service::{
    build_sandbox_router, run_sandbox_service, spawn_sandbox_service, SandboxServiceConfig,
    SandboxServiceHandle, API_KEY_HEADER,
};
