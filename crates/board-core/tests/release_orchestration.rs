//! Release orchestration end to end: Init validation, the retry ceiling,
//! DeployAcceptance progression and build restarts.

mod common;

use std::collections::BTreeMap;

use board_core::{Board, BoardConfig, NewRelease};
use board_remote::fakes::*;
use board_state::{
    BuildStatus, Buildable, EventLevel, Release, ReleaseStageId, RepoSelection, StageStatus,
};
use common::*;

fn selection(repos: &[&str]) -> RepoSelection {
    let mut selection = BTreeMap::new();
    selection.insert(
        PROJECT.to_string(),
        repos.iter().map(|r| r.to_string()).collect(),
    );
    selection
}

async fn create(board: &Board, id: &str, repos: &[&str]) -> Release {
    board
        .create_release(NewRelease {
            release_id: Some(id.to_string()),
            repos: selection(repos),
            ..Default::default()
        })
        .await
        .unwrap()
}

fn sub_stage(release: &Release, repo_id: &str) -> Option<u8> {
    release
        .current_stage_entry()?
        .repos
        .iter()
        .find(|s| s.project_id == PROJECT && s.repo_id == repo_id)
        .map(|s| s.sub_stage)
}

fn messages(release: &Release, level: EventLevel) -> Vec<String> {
    release
        .status
        .as_ref()
        .map(|s| {
            s.events
                .iter()
                .filter(|e| e.level == level)
                .map(|e| e.message.clone())
                .collect()
        })
        .unwrap_or_default()
}

#[tokio::test]
async fn init_failure_fails_release_after_exactly_five_retries() {
    let fx = Fixture::new();
    let board = fx.board(BoardConfig::default());
    let orchestrator = board.orchestrator();
    create(&board, "r1", &["api"]).await;

    for attempt in 1..=4 {
        let release = orchestrator.tick("r1").await.unwrap();
        assert_eq!(release.current_stage(), ReleaseStageId::Init, "attempt {attempt}");
        assert_eq!(release.current_stage_entry().unwrap().retries, attempt);
    }

    let release = orchestrator.tick("r1").await.unwrap();
    assert_eq!(release.current_stage(), ReleaseStageId::Failed);
    let status = release.status.as_ref().unwrap();
    assert_eq!(status.stages.len(), 1);
    assert_eq!(status.stages[0].retries, 5);
    assert_eq!(status.stages[0].status, StageStatus::Failed);
    let fatal = messages(&release, EventLevel::Fatal);
    assert_eq!(fatal.len(), 1);
    assert!(fatal[0].contains("Unknown project: mxts"));

    // Terminal: further ticks change nothing.
    let writes = fx.store.writes();
    let again = orchestrator.tick("r1").await.unwrap();
    assert_eq!(again, release);
    assert_eq!(orchestrator.tick_all().await.unwrap(), 0);
    assert_eq!(fx.store.writes(), writes);
}

#[tokio::test]
async fn init_requires_develop_branch() {
    let fx = Fixture::new();
    fx.local_org().await;
    let board = fx.board(BoardConfig::default());
    create(&board, "r1", &["api"]).await;

    board.orchestrator().tick("r1").await.unwrap();
    let release = board.release("r1").await.unwrap();
    assert_eq!(release.current_stage(), ReleaseStageId::Init);
    assert_eq!(release.current_stage_entry().unwrap().retries, 1);
}

#[tokio::test]
async fn release_progresses_through_deploy_acceptance() {
    let fx = Fixture::new();
    fx.local_org().await;
    fx.save_branch("develop", "d1", Buildable::default()).await;
    let board = fx.board(BoardConfig::default());
    let orchestrator = board.orchestrator();
    let created = create(&board, "R1", &["api"]).await;
    assert!(created.status.is_none());

    let release = orchestrator.tick("R1").await.unwrap();
    assert_eq!(release.current_stage(), ReleaseStageId::CreateRelease);
    assert_eq!(release.name, "R1");
    let release = orchestrator.tick("R1").await.unwrap();
    assert_eq!(release.current_stage(), ReleaseStageId::DeployAcceptance);
    assert_eq!(
        messages(&release, EventLevel::Info),
        vec!["Stage: Create Release", "Stage: Deploy to Acceptance"]
    );

    // Develop has no build yet: a warning, no branch.
    let release = orchestrator.tick("R1").await.unwrap();
    assert_eq!(sub_stage(&release, REPO), Some(0));
    assert!(messages(&release, EventLevel::Warning)
        .iter()
        .any(|m| m.contains("No build found for the develop branch")));
    assert!(fx.scm.created_branches().is_empty());

    // Green develop: the release branch is cut from its commit.
    fx.save_branch("develop", "d1", built(3, BuildStatus::Succeed)).await;
    let release = orchestrator.tick("R1").await.unwrap();
    assert_eq!(sub_stage(&release, REPO), Some(1));
    assert_eq!(
        fx.scm.created_branches(),
        vec![(
            "mxts".to_string(),
            "api".to_string(),
            "release/r1".to_string(),
            "d1".to_string()
        )]
    );
    assert!(messages(&release, EventLevel::Info).contains(&"Create branch release/r1".to_string()));

    let release = orchestrator.tick("R1").await.unwrap();
    assert_eq!(sub_stage(&release, REPO), Some(2));
    assert_eq!(release.current_stage(), ReleaseStageId::DeployAcceptance);

    let mut branch = fx.branch("release/r1").await.unwrap();
    branch.build = built(1, BuildStatus::Succeed);
    fx.records.save(&branch).await.unwrap();

    let release = orchestrator.tick("R1").await.unwrap();
    assert_eq!(release.current_stage(), ReleaseStageId::ScheduleProduction);
    let stored = board.release("R1").await.unwrap();
    assert_eq!(stored, release);
    let closed: Vec<_> = stored
        .status
        .as_ref()
        .unwrap()
        .stages
        .iter()
        .map(|s| (s.stage_id, s.status))
        .collect();
    assert_eq!(
        closed,
        vec![
            (ReleaseStageId::Init, StageStatus::Succeed),
            (ReleaseStageId::CreateRelease, StageStatus::Succeed),
            (ReleaseStageId::DeployAcceptance, StageStatus::Succeed),
            (ReleaseStageId::ScheduleProduction, StageStatus::Running),
        ]
    );

    // The next stage has no implementation: it burns the retry budget.
    for _ in 0..5 {
        orchestrator.tick("R1").await.unwrap();
    }
    let failed = board.release("R1").await.unwrap();
    assert_eq!(failed.current_stage(), ReleaseStageId::Failed);
    let fatal = messages(&failed, EventLevel::Fatal);
    assert_eq!(fatal.len(), 1);
    assert!(fatal[0].contains("Schedule Production Release"));
}

#[tokio::test]
async fn one_repository_failing_does_not_block_siblings() {
    let fx = Fixture::new();
    fx.local_org().await;
    fx.save_branch("develop", "d1", built(3, BuildStatus::Succeed)).await;
    let board = fx.board(BoardConfig::default());
    let orchestrator = board.orchestrator();

    // `web` has a red develop build and the restart call fails.
    fx.records
        .save(&board_state::Repo {
            project_id: PROJECT.to_string(),
            repo_id: "web".to_string(),
            name: None,
            links: Default::default(),
        })
        .await
        .unwrap();
    fx.records
        .save(&board_state::Branch {
            repo_id: "web".to_string(),
            build: built(6, BuildStatus::Failed),
            ..fx.branch("develop").await.unwrap()
        })
        .await
        .unwrap();
    fx.ci.fail(Operation::TriggerBuild);

    create(&board, "r2", &["api", "web"]).await;
    for _ in 0..3 {
        orchestrator.tick("r2").await.unwrap();
    }
    let release = board.release("r2").await.unwrap();
    assert_eq!(release.current_stage(), ReleaseStageId::DeployAcceptance);
    assert_eq!(release.current_stage_entry().unwrap().retries, 0);
    assert_eq!(sub_stage(&release, REPO), Some(1));
    assert_eq!(sub_stage(&release, "web"), Some(0));
    assert_eq!(fx.scm.created_branches().len(), 1);

    let web = release
        .current_stage_entry()
        .unwrap()
        .repos
        .iter()
        .find(|s| s.repo_id == "web")
        .unwrap();
    assert_eq!(web.retries, 1);
    let warnings: Vec<_> = release
        .status
        .as_ref()
        .unwrap()
        .events
        .iter()
        .filter(|e| e.level == EventLevel::Warning)
        .collect();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].repo_id.as_deref(), Some("web"));
    assert!(warnings[0].message.starts_with("remote call failed"));
}

#[tokio::test]
async fn excluded_repositories_are_not_tracked() {
    let fx = Fixture::new();
    fx.local_org().await;
    fx.save_branch("develop", "d1", built(3, BuildStatus::Succeed)).await;
    let board = fx.board(BoardConfig::default());
    let orchestrator = board.orchestrator();

    board
        .create_release(NewRelease {
            release_id: Some("r3".to_string()),
            repos: selection(&["api", "legacy"]),
            exclude_repos: Some(selection(&["legacy"])),
            ..Default::default()
        })
        .await
        .unwrap();

    for _ in 0..3 {
        orchestrator.tick("r3").await.unwrap();
    }
    let release = board.release("r3").await.unwrap();
    assert_eq!(release.current_stage(), ReleaseStageId::DeployAcceptance);
    assert_eq!(sub_stage(&release, REPO), Some(1));
    assert_eq!(sub_stage(&release, "legacy"), None);
}

#[tokio::test]
async fn failed_builds_are_restarted_a_bounded_number_of_times() {
    let fx = Fixture::new();
    fx.local_org().await;
    fx.save_branch("develop", "d1", built(3, BuildStatus::Failed)).await;
    fx.ci.set_run(PROJECT, REPO, "develop", finished_run(3, "d1", false));
    let board = fx.board(BoardConfig::default());
    let orchestrator = board.orchestrator();
    create(&board, "r4", &["api"]).await;

    orchestrator.tick("r4").await.unwrap();
    orchestrator.tick("r4").await.unwrap();
    for _ in 0..7 {
        orchestrator.tick("r4").await.unwrap();
        // Every restart fails again.
        let mut develop = fx.branch("develop").await.unwrap();
        develop.build.build_status = Some(BuildStatus::Failed);
        fx.records.save(&develop).await.unwrap();
    }

    assert_eq!(fx.ci.triggered().len(), 5);
    let release = board.release("r4").await.unwrap();
    let status = &release.current_stage_entry().unwrap().repos[0];
    assert_eq!(status.build_restarts, 5);
    assert_eq!(status.sub_stage, 0);
    let restart_warnings = messages(&release, EventLevel::Warning)
        .into_iter()
        .filter(|m| m.starts_with("Restart failed build"))
        .count();
    assert_eq!(restart_warnings, 3);
    assert_eq!(release.current_stage(), ReleaseStageId::DeployAcceptance);
}

#[tokio::test]
async fn failed_release_branch_builds_are_restarted_a_bounded_number_of_times() {
    let fx = Fixture::new();
    fx.local_org().await;
    fx.save_branch("develop", "d1", built(3, BuildStatus::Succeed)).await;
    fx.save_branch("release/r9", "d1", built(2, BuildStatus::Failed)).await;
    let board = fx.board(BoardConfig::default());
    let orchestrator = board.orchestrator();
    create(&board, "r9", &["api"]).await;

    orchestrator.tick("r9").await.unwrap();
    orchestrator.tick("r9").await.unwrap();
    for _ in 0..20 {
        orchestrator.tick("r9").await.unwrap();
        let mut branch = fx.branch("release/r9").await.unwrap();
        branch.build.build_status = Some(BuildStatus::Failed);
        fx.records.save(&branch).await.unwrap();
    }

    let triggered = fx.ci.triggered();
    assert_eq!(triggered.len(), 5);
    assert!(triggered.iter().all(|(_, _, job)| job == "release/r9"));
    let release = board.release("r9").await.unwrap();
    let status = &release.current_stage_entry().unwrap().repos[0];
    assert_eq!(status.build_restarts, 5);
    assert!(status.release_branch_seen);
    assert!(fx.scm.created_branches().is_empty());
    assert_eq!(release.current_stage(), ReleaseStageId::DeployAcceptance);
}

#[tokio::test]
async fn duplicate_release_id_is_rejected() {
    let fx = Fixture::new();
    let board = fx.board(BoardConfig::default());
    create(&board, "r5", &["api"]).await;

    let err = board
        .create_release(NewRelease {
            release_id: Some("r5".to_string()),
            repos: selection(&["api"]),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(err.is_bad_request());
    assert!(board.release("nope").await.unwrap_err().is_not_found());
    assert_eq!(board.releases().await.unwrap().len(), 1);
}
