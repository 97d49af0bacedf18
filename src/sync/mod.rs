//! Sync module - Remote persistence for highlight data.

pub mod github;
pub mod http;

pub use github::{AuthScheme, CommitRef, GithubHighlightStore, UpdateResponse, UpdatedFile};
pub use http::{HttpResponse, HttpTransport, ReqwestTransport};
