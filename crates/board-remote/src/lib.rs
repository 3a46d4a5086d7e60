//! Board-Remote: clients for the systems the board mirrors
//!
//! ## Layer 0 - Remote systems
//!
//! - `SourceControlClient` / `BitbucketClient`: projects, repositories,
//!   branches, pull requests, merge status, branch creation
//! - `BuildClient` / `JenkinsClient`: per-branch and per-PR build runs,
//!   build triggering, console links
//! - `BuildClients`: build clients keyed by project
//!
//! The clients are thin request/response mappings; all reconciliation
//! logic lives in `board-core`.

pub mod build;
mod error;
pub mod fakes;
mod http;
pub mod models;
pub mod source_control;

pub use build::{pull_request_job, BuildClient, BuildClients, JenkinsClient};
pub use error::{RemoteError, RemoteResult};
pub use http::ServerConfig;
pub use models::*;
pub use source_control::{BitbucketClient, SourceControlClient};
