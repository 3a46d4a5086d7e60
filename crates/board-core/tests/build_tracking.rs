//! Build tracker behaviour: commit-guarded status updates, listing seed,
//! manual retries and the change-feed triggers.

mod common;

use std::time::Duration;

use board_core::reconcile::Reconciler;
use board_core::{BoardConfig, BoardError, BuildTracker};
use board_remote::fakes::*;
use board_remote::{BranchBuild, BranchBuildLinks, BuildClients, JenkinsLink};
use board_state::{
    Branch, BranchType, BuildStatus, Buildable, Collection, PullRequest, Repo, RepoLinks,
};
use common::*;
use serde_json::json;
use tokio::sync::broadcast;

fn tracker(fx: &Fixture) -> BuildTracker {
    BuildTracker::new(fx.records.clone(), fx.build_clients())
}

fn listing_entry(job: &str, run: board_remote::Run) -> BranchBuild {
    BranchBuild {
        display_name: job.to_string(),
        latest_run: Some(run),
        links: BranchBuildLinks {
            self_link: None,
            runs: Some(JenkinsLink {
                href: format!("https://ci.fake/{job}/runs"),
            }),
        },
    }
}

#[tokio::test]
async fn status_follows_run_of_current_commit() {
    let fx = Fixture::new();
    fx.save_branch("develop", "d1", built(3, BuildStatus::Progress)).await;
    fx.ci.set_run(PROJECT, REPO, "develop", finished_run(3, "d1", true));

    let key = Branch::key_of(PROJECT, REPO, "develop");
    assert!(tracker(&fx).refresh_branch(&key).await.unwrap());
    assert_eq!(
        fx.branch("develop").await.unwrap().build.build_status,
        Some(BuildStatus::Succeed)
    );

    // Nothing changed remotely: no write.
    let writes = fx.store.writes();
    assert!(!tracker(&fx).refresh_branch(&key).await.unwrap());
    assert_eq!(fx.store.writes(), writes);
}

#[tokio::test]
async fn stale_run_does_not_touch_new_commit() {
    let fx = Fixture::new();
    fx.save_branch("develop", "d2", built(3, BuildStatus::Progress)).await;
    fx.ci.set_run(PROJECT, REPO, "develop", finished_run(3, "d1", false));

    let key = Branch::key_of(PROJECT, REPO, "develop");
    assert!(!tracker(&fx).refresh_branch(&key).await.unwrap());
    assert_eq!(
        fx.branch("develop").await.unwrap().build.build_status,
        Some(BuildStatus::Progress)
    );
}

#[tokio::test]
async fn unfinished_refresh_skips_green_records() {
    let fx = Fixture::new();
    fx.save_branch("develop", "d1", built(3, BuildStatus::Succeed)).await;
    fx.save_branch("feature/x", "f1", built(5, BuildStatus::Pending)).await;
    fx.ci.set_run(PROJECT, REPO, "develop", finished_run(3, "d1", true));
    fx.ci.set_run(PROJECT, REPO, "feature/x", finished_run(5, "f1", false));

    let updated = tracker(&fx).refresh_all(true).await.unwrap();
    assert_eq!(updated, 1);
    assert_eq!(fx.ci.calls(Operation::GetRun), 1);
    assert_eq!(
        fx.branch("feature/x").await.unwrap().build.build_status,
        Some(BuildStatus::Failed)
    );

    tracker(&fx).refresh_all(false).await.unwrap();
    assert_eq!(fx.ci.calls(Operation::GetRun), 3);
}

#[tokio::test]
async fn listing_seed_attributes_branch_and_pull_request_jobs() {
    let fx = Fixture::new();
    fx.remote_org();
    fx.scm
        .set_branches(PROJECT, REPO, vec![remote_branch("develop", "d1")]);
    fx.scm.set_pull_requests(
        PROJECT,
        REPO,
        vec![remote_pull_request(1, "feature/x", "develop", "f1")],
    );
    fx.projects(None).refresh_all().await.unwrap();
    fx.repos().refresh_all().await.unwrap();
    fx.branches().refresh_all().await.unwrap();
    fx.pull_requests().refresh_all().await.unwrap();

    fx.ci.set_listing(
        PROJECT,
        REPO,
        vec![
            listing_entry("develop", finished_run(12, "d1", true)),
            listing_entry("PR-1", finished_run(4, "f1", true)),
            listing_entry("gone", finished_run(1, "x", true)),
        ],
    );

    let seeded = tracker(&fx).seed_repo(PROJECT, REPO).await.unwrap();
    assert_eq!(seeded, 2);

    let develop = fx.branch("develop").await.unwrap();
    assert_eq!(develop.build.build_id, Some(12));
    let links = develop.build.build_links.unwrap();
    assert_eq!(
        links.open.as_deref(),
        Some("https://ci.fake/job/mxts/job/api/job/develop/12/console")
    );
    assert_eq!(links.retry.as_deref(), Some("https://ci.fake/develop/runs"));

    let pr: PullRequest = fx
        .records
        .get(&PullRequest::key_of(PROJECT, REPO, "1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pr.build.build_id, Some(4));

    // Same ids again: nothing to adopt.
    assert_eq!(tracker(&fx).seed_repo(PROJECT, REPO).await.unwrap(), 0);
}

#[tokio::test]
async fn retry_reports_missing_preconditions() {
    let fx = Fixture::new();
    let tracker = tracker(&fx);

    let err = tracker
        .retry_branch_build(PROJECT, REPO, "nope")
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.to_string(), "not found: Branch not found");

    fx.save_branch("develop", "d1", Buildable::default()).await;
    let err = tracker
        .retry_branch_build(PROJECT, REPO, "develop")
        .await
        .unwrap_err();
    assert!(err.is_bad_request());
    assert!(err.to_string().contains("No Build exists for this branch"));

    // Without a build, that is reported before the missing build server.
    let mut other = Branch {
        project_id: "ops".to_string(),
        repo_id: "tools".to_string(),
        branch_id: "develop".to_string(),
        commit: "o1".to_string(),
        is_default: true,
        branch_type: BranchType::Develop,
        links: RepoLinks::default(),
        build: Buildable::default(),
    };
    fx.records.save(&other).await.unwrap();
    let err = tracker
        .retry_branch_build("ops", "tools", "develop")
        .await
        .unwrap_err();
    assert!(matches!(err, BoardError::BadRequest(ref m) if m == "No Build exists for this branch"));

    other.build = built(1, BuildStatus::Failed);
    fx.records.save(&other).await.unwrap();
    let err = tracker
        .retry_branch_build("ops", "tools", "develop")
        .await
        .unwrap_err();
    assert!(matches!(err, BoardError::BadRequest(ref m) if m == "No build server configured for this project"));
    assert!(fx.ci.triggered().is_empty());
}

#[tokio::test]
async fn retry_records_new_run_immediately() {
    let fx = Fixture::new();
    let mut build = built(3, BuildStatus::Failed);
    build.build_links = Some(board_state::BuildLinks {
        open: Some("old".to_string()),
        retry: Some("https://ci.fake/develop/runs".to_string()),
    });
    fx.save_branch("develop", "d1", build).await;
    fx.ci.set_run(PROJECT, REPO, "develop", finished_run(3, "d1", false));

    let branch = tracker(&fx)
        .retry_branch_build("MXTS", "API", "develop")
        .await
        .unwrap();
    assert_eq!(branch.build.build_id, Some(4));
    assert_eq!(branch.build.build_status, Some(BuildStatus::Pending));
    let links = branch.build.build_links.unwrap();
    assert_eq!(
        links.open.as_deref(),
        Some("https://ci.fake/job/mxts/job/api/job/develop/4/console")
    );
    assert_eq!(links.retry.as_deref(), Some("https://ci.fake/develop/runs"));
    assert_eq!(fx.branch("develop").await.unwrap().build.build_id, Some(4));
    assert_eq!(
        fx.ci.triggered(),
        vec![("mxts".to_string(), "api".to_string(), "develop".to_string())]
    );
}

#[tokio::test]
async fn build_actions_dispatch_through_registry() {
    let fx = Fixture::new();
    fx.save_branch("develop", "d1", built(3, BuildStatus::Failed)).await;
    let board = fx.board(BoardConfig::default());
    let actions = board.actions();

    let result = actions
        .invoke(
            Collection::Branches,
            "build",
            json!({"projectId": PROJECT, "repoId": REPO, "branchId": "develop"}),
        )
        .await
        .unwrap();
    assert_eq!(result["buildId"], json!(1));
    assert_eq!(result["buildStatus"], json!("Pending"));

    let err = actions
        .invoke(
            Collection::PullRequests,
            "build",
            json!({"projectId": PROJECT, "repoId": REPO, "pullRequestId": "9"}),
        )
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let err = actions
        .invoke(Collection::Repos, "build", json!({}))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn new_build_id_triggers_status_refresh() {
    let fx = Fixture::new();
    let board = fx.board(BoardConfig::default());
    let dispatcher = board.dispatcher();
    let mut events = fx.records.watch();

    fx.save_branch("develop", "d1", Buildable::default()).await;
    let created = events.recv().await.unwrap();
    dispatcher.handle(&created).await.unwrap();
    assert_eq!(fx.ci.calls(Operation::GetRun), 0);

    fx.ci.set_run(PROJECT, REPO, "develop", finished_run(8, "d1", true));
    fx.save_branch("develop", "d1", built(8, BuildStatus::Pending)).await;
    let updated = events.recv().await.unwrap();
    dispatcher.handle(&updated).await.unwrap();
    assert_eq!(fx.ci.calls(Operation::GetRun), 1);

    // The status write itself does not trigger another fetch.
    let status_write = events.recv().await.unwrap();
    dispatcher.handle(&status_write).await.unwrap();
    assert_eq!(fx.ci.calls(Operation::GetRun), 1);
    assert_eq!(
        fx.branch("develop").await.unwrap().build.build_status,
        Some(BuildStatus::Succeed)
    );
}

#[tokio::test]
async fn new_repository_syncs_pull_requests_when_branch_listing_fails() {
    let fx = Fixture::new();
    fx.scm.fail(Operation::ListBranches);
    fx.scm.set_pull_requests(
        PROJECT,
        REPO,
        vec![remote_pull_request(1, "feature/x", "develop", "f1")],
    );
    fx.ci.set_listing(
        PROJECT,
        REPO,
        vec![listing_entry("PR-1", finished_run(4, "f1", true))],
    );
    let board = fx.board(BoardConfig::default());
    let mut events = fx.records.watch();

    fx.local_org().await;
    let _project_created = events.recv().await.unwrap();
    let repo_created = events.recv().await.unwrap();
    assert_eq!(repo_created.collection, Collection::Repos);
    board.dispatcher().handle(&repo_created).await.unwrap();

    assert_eq!(fx.scm.calls(Operation::ListBranches), 1);
    let pr: PullRequest = fx
        .records
        .get(&PullRequest::key_of(PROJECT, REPO, "1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pr.build.build_id, Some(4));
}

#[tokio::test]
async fn new_project_cascades_to_branches_and_builds() {
    let fx = Fixture::new();
    fx.remote_org();
    fx.scm
        .set_branches(PROJECT, REPO, vec![remote_branch("develop", "d1")]);
    fx.ci.set_listing(
        PROJECT,
        REPO,
        vec![listing_entry("develop", finished_run(2, "d1", true))],
    );
    fx.ci.set_run(PROJECT, REPO, "develop", finished_run(2, "d1", true));

    let board = fx.board(BoardConfig::default());
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let dispatcher = tokio::spawn(board.dispatcher().run(fx.records.watch(), shutdown_rx));

    fx.projects(None).refresh_all().await.unwrap();

    let key = Branch::key_of(PROJECT, REPO, "develop");
    let settled = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let branch: Option<Branch> = fx.records.get(&key).await.unwrap();
            if branch.is_some_and(|b| b.build.is_succeeded()) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(settled.is_ok(), "develop never reached Succeed");

    let repo: Option<Repo> = fx.records.get(&Repo::key_of(PROJECT, REPO)).await.unwrap();
    assert!(repo.is_some());

    shutdown_tx.send(()).unwrap();
    dispatcher.await.unwrap();
}

#[tokio::test]
async fn project_without_build_server_is_not_an_error() {
    let fx = Fixture::new();
    let tracker = BuildTracker::new(fx.records.clone(), BuildClients::new());
    fx.save_branch("develop", "d1", built(3, BuildStatus::Pending)).await;

    let key = Branch::key_of(PROJECT, REPO, "develop");
    assert!(!tracker.refresh_branch(&key).await.unwrap());
    assert_eq!(tracker.seed_repo(PROJECT, REPO).await.unwrap(), 0);
}
