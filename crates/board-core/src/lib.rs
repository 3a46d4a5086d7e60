//! Board-Core: the devops board's domain layer
//!
//! Keeps the local record store converged onto the source-control and build
//! servers, and drives multi-repository releases through their stages.
//!
//! ## Layer 1 - Domain
//!
//! - `reconcile`: one reconciler per collection (projects, repos, branches,
//!   pull requests) over a shared paginate/upsert/delete pass
//! - `build_tracker`: build ids, statuses and links of branches and pull
//!   requests, plus manual retries
//! - `release`: the stage registry, the stages and the orchestrator
//! - `actions`: named operations callable by the API layer
//! - `scheduler` / `dispatcher`: interval jobs and change-feed handlers
//! - `board`: wires all of the above from a `BoardConfig`

pub mod actions;
pub mod board;
pub mod build_tracker;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod obs;
pub mod reconcile;
pub mod release;
pub mod scheduler;
pub mod telemetry;

pub use actions::{board_actions, ActionRegistry};
pub use board::Board;
pub use build_tracker::{build_status, BuildTracker};
pub use config::{BoardConfig, DEFAULT_CONFIG_FILE};
pub use dispatcher::Dispatcher;
pub use error::{BoardError, BoardResult};
pub use reconcile::{
    BranchReconciler, PageSettings, ProjectReconciler, PullRequestReconciler, Reconciler,
    RepoReconciler, SyncContext, SyncStats,
};
pub use release::{NewRelease, ReleaseOrchestrator, StageContext, StageRegistry, StageRunner};
pub use scheduler::{job, Job, Scheduler};
