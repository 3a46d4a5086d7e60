//! Named server-side actions on collections
//!
//! Each action takes JSON parameters and returns the record it produced.
//! The HTTP layer dispatches `POST` action routes through the registry.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use board_state::Collection;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::build_tracker::BuildTracker;
use crate::error::{BoardError, BoardResult};
use crate::reconcile::BranchReconciler;

pub const BUILD: &str = "build";
pub const CREATE_BRANCH: &str = "createBranch";

pub type ActionHandler =
    Arc<dyn Fn(Value) -> BoxFuture<'static, BoardResult<Value>> + Send + Sync>;

#[derive(Clone, Default)]
pub struct ActionRegistry {
    handlers: HashMap<(Collection, String), ActionHandler>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F, Fut>(&mut self, collection: Collection, name: &str, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = BoardResult<Value>> + Send + 'static,
    {
        let handler: ActionHandler = Arc::new(move |params| handler(params).boxed());
        self.handlers.insert((collection, name.to_string()), handler);
    }

    pub fn contains(&self, collection: Collection, name: &str) -> bool {
        self.handlers.contains_key(&(collection, name.to_string()))
    }

    pub async fn invoke(&self, collection: Collection, name: &str, params: Value) -> BoardResult<Value> {
        let handler = self
            .handlers
            .get(&(collection, name.to_string()))
            .cloned()
            .ok_or_else(|| BoardError::NotFound(format!("Unknown action {collection}/{name}")))?;
        debug!(collection = %collection, action = %name, "Invoking action");
        handler(params).await
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BranchParams {
    project_id: String,
    repo_id: String,
    branch_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateBranchParams {
    project_id: String,
    repo_id: String,
    branch_id: String,
    #[serde(rename = "ref")]
    from_ref: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullRequestParams {
    project_id: String,
    repo_id: String,
    pull_request_id: String,
}

/// The board's actions: build retries and branch creation.
pub fn board_actions(tracker: BuildTracker, branches: Arc<BranchReconciler>) -> ActionRegistry {
    let mut registry = ActionRegistry::new();

    let branch_tracker = tracker.clone();
    registry.register(Collection::Branches, BUILD, move |params| {
        let tracker = branch_tracker.clone();
        async move {
            let p: BranchParams = serde_json::from_value(params)?;
            let branch = tracker
                .retry_branch_build(&p.project_id, &p.repo_id, &p.branch_id)
                .await?;
            Ok::<_, BoardError>(serde_json::to_value(branch)?)
        }
    });

    registry.register(Collection::Branches, CREATE_BRANCH, move |params| {
        let branches = branches.clone();
        async move {
            let p: CreateBranchParams = serde_json::from_value(params)?;
            let branch = branches
                .create_branch(&p.project_id, &p.repo_id, &p.branch_id, &p.from_ref)
                .await?;
            Ok::<_, BoardError>(serde_json::to_value(branch)?)
        }
    });

    registry.register(Collection::PullRequests, BUILD, move |params| {
        let tracker = tracker.clone();
        async move {
            let p: PullRequestParams = serde_json::from_value(params)?;
            let pr = tracker
                .retry_pull_request_build(&p.project_id, &p.repo_id, &p.pull_request_id)
                .await?;
            Ok::<_, BoardError>(serde_json::to_value(pr)?)
        }
    });

    registry
}
