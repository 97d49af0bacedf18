//! Marklight Core Library
//!
//! Core library for Marklight - a browser highlighter whose highlights
//! are backed up to a GitHub repository. Provides the following
//! capabilities:
//! - Persist the highlights payload to a repository file via the GitHub
//!   REST Contents API (SHA-based optimistic concurrency, no merging)
//! - Fetch remote highlights, falling back to local data on any failure
//! - Validate sync credentials against the target repository
//! - Load and persist sync settings through a pluggable config store
//!
//! The highlights payload itself is opaque to this layer: any JSON value
//! round-trips through write/read unchanged.

pub mod config;
pub mod error;
pub mod sync;

// Re-export main types
pub use config::{ConfigStore, FileConfigStore, MemoryConfigStore, SyncConfig};
pub use error::SyncError;
pub use sync::{
    AuthScheme, GithubHighlightStore, HttpResponse, HttpTransport, ReqwestTransport,
    UpdateResponse,
};
