//! Pull-request reconciler
//!
//! Besides the listing, every pull request costs one merge-status call.
//! That call may fail on its own; the pull request is then still synced and
//! keeps its previously known merge eligibility.

use async_trait::async_trait;
use board_remote::{
    MergeOutcome, MergeStatus, RemoteParticipant, RemotePullRequest, RemotePullRequestState,
    RemoteReviewerStatus,
};
use board_state::{
    PullRequest, PullRequestLinks, PullRequestState, PullRequestType, PullRequestUser, RecordKey,
    ReviewerStatus,
};
use tracing::{instrument, warn};

use super::repo::{repo_of, repo_scopes};
use super::sync::{collect_pages, converge, Convert, SyncStats};
use super::{timed_pass, Reconciler, SyncContext};
use crate::error::BoardResult;

/// Pull-request type from its target and source branch names.
pub fn pull_request_type(to_branch: &str, from_branch: &str) -> PullRequestType {
    let to = to_branch.to_lowercase();
    if to.starts_with("release/") {
        PullRequestType::Bugfix
    } else if to == "master" {
        if from_branch.to_lowercase().starts_with("release/") {
            PullRequestType::Release
        } else {
            PullRequestType::Hotfix
        }
    } else if to == "develop" {
        PullRequestType::Feature
    } else {
        PullRequestType::Other
    }
}

fn state(remote: RemotePullRequestState) -> Option<PullRequestState> {
    match remote {
        RemotePullRequestState::Open => Some(PullRequestState::Open),
        RemotePullRequestState::Merged => Some(PullRequestState::Merged),
        RemotePullRequestState::Superseded => Some(PullRequestState::Superseded),
        RemotePullRequestState::Declined => Some(PullRequestState::Declined),
        RemotePullRequestState::Unknown => None,
    }
}

fn reviewer_status(remote: Option<RemoteReviewerStatus>) -> Option<ReviewerStatus> {
    match remote? {
        RemoteReviewerStatus::Approved => Some(ReviewerStatus::Approved),
        RemoteReviewerStatus::Unapproved => Some(ReviewerStatus::Unapproved),
        RemoteReviewerStatus::NeedsWork => Some(ReviewerStatus::NeedsWork),
        RemoteReviewerStatus::Unknown => None,
    }
}

fn user(participant: RemoteParticipant) -> PullRequestUser {
    let picture = participant
        .user
        .links
        .self_href()
        .map(|href| format!("{href}/avatar.png"));
    PullRequestUser {
        user_id: participant.user.name,
        name: participant.user.display_name,
        email: participant.user.email_address,
        picture,
        status: reviewer_status(participant.status),
    }
}

/// A listed pull request and its merge status, when that call succeeded.
type ListedPullRequest = (RemotePullRequest, Option<MergeStatus>);

struct PullRequestConverter<'a> {
    project_id: &'a str,
    repo_id: &'a str,
}

impl Convert for PullRequestConverter<'_> {
    type Remote = ListedPullRequest;
    type Output = PullRequest;

    fn key(&self, (remote, _): &ListedPullRequest) -> RecordKey {
        PullRequest::key_of(self.project_id, self.repo_id, &remote.id.to_string())
    }

    fn convert(&self, (remote, merge): ListedPullRequest, existing: Option<&PullRequest>) -> PullRequest {
        let (mergable, problems) = match merge {
            Some(merge) => (
                merge.can_merge,
                merge.vetoes.into_iter().map(|v| v.summary_message).collect(),
            ),
            None => existing
                .map(|pr| (pr.mergable, pr.problems.clone()))
                .unwrap_or_default(),
        };
        let conflict = remote
            .properties
            .merge_result
            .as_ref()
            .map_or(true, |m| m.outcome != MergeOutcome::Clean);
        let target_repo = remote.to_ref.repository.as_ref();
        let links = PullRequestLinks {
            project: target_repo
                .and_then(|r| r.project.as_ref())
                .and_then(|p| p.links.self_href())
                .map(str::to_string),
            repo: target_repo
                .and_then(|r| r.links.self_href())
                .map(str::to_string),
            pull_request: remote.links.self_href().map(str::to_string),
        };
        let commit = remote.from_ref.latest_commit;
        let build = existing
            .filter(|pr| pr.commit == commit)
            .map(|pr| pr.build.clone())
            .unwrap_or_default();

        PullRequest {
            project_id: self.project_id.to_string(),
            repo_id: self.repo_id.to_string(),
            pull_request_id: remote.id.to_string(),
            title: remote.title,
            state: state(remote.state),
            pull_request_type: pull_request_type(
                &remote.to_ref.display_id,
                &remote.from_ref.display_id,
            ),
            commit,
            from_branch: remote.from_ref.display_id,
            to_branch: remote.to_ref.display_id,
            version: remote.version,
            open_tasks: remote.properties.open_task_count,
            conflict,
            mergable,
            problems,
            author: remote.author.map(user),
            reviewers: remote.reviewers.into_iter().map(user).collect(),
            links,
            build,
        }
    }
}

/// Syncs the pull requests of every known repository.
pub struct PullRequestReconciler {
    ctx: SyncContext,
}

impl PullRequestReconciler {
    pub fn new(ctx: SyncContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Reconciler for PullRequestReconciler {
    fn name(&self) -> &'static str {
        "pull-requests"
    }

    async fn scopes(&self) -> BoardResult<Vec<RecordKey>> {
        repo_scopes(&self.ctx).await
    }

    #[instrument(skip_all, fields(scope = %scope))]
    async fn refresh(&self, scope: &RecordKey) -> BoardResult<SyncStats> {
        let (project_id, repo_id) = repo_of(scope)?;
        timed_pass(self.name(), scope, async {
            let source = &self.ctx.source;
            let listed = collect_pages(self.ctx.pages, |page| {
                source.list_pull_requests(project_id, repo_id, page)
            })
            .await?;

            let mut items = Vec::with_capacity(listed.len());
            for pr in listed {
                let id = pr.id.to_string();
                let merge = match source.pull_request_merge_status(project_id, repo_id, &id).await {
                    Ok(merge) => Some(merge),
                    Err(e) => {
                        warn!(pull_request_id = %id, error = %e, "Merge status unavailable");
                        None
                    }
                };
                items.push((pr, merge));
            }

            let converter = PullRequestConverter { project_id, repo_id };
            Ok(converge(&self.ctx.records, scope, items, &converter).await?)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use board_remote::fakes::{remote_pull_request, remote_user};
    use board_remote::Veto;
    use board_state::{BuildStatus, Buildable};

    fn converter() -> PullRequestConverter<'static> {
        PullRequestConverter {
            project_id: "mxts",
            repo_id: "api",
        }
    }

    #[test]
    fn test_pull_request_types() {
        assert_eq!(pull_request_type("release/v1.0.0", "feature/a"), PullRequestType::Bugfix);
        assert_eq!(pull_request_type("master", "release/v1.0.0"), PullRequestType::Release);
        assert_eq!(pull_request_type("master", "hotfix/a"), PullRequestType::Hotfix);
        assert_eq!(pull_request_type("develop", "feature/a"), PullRequestType::Feature);
        assert_eq!(pull_request_type("feature/b", "feature/a"), PullRequestType::Other);
    }

    #[test]
    fn test_convert_maps_users_and_merge_status() {
        let mut remote = remote_pull_request(7, "feature/a", "develop", "c1");
        remote.reviewers.push(RemoteParticipant {
            user: remote_user("rev"),
            status: Some(RemoteReviewerStatus::NeedsWork),
        });
        let merge = MergeStatus {
            can_merge: false,
            conflicted: false,
            outcome: None,
            vetoes: vec![Veto {
                summary_message: "Needs approval".to_string(),
                detailed_message: String::new(),
            }],
        };

        let pr = converter().convert((remote, Some(merge)), None);
        assert_eq!(pr.pull_request_id, "7");
        assert_eq!(pr.pull_request_type, PullRequestType::Feature);
        assert_eq!(pr.state, Some(PullRequestState::Open));
        assert!(!pr.conflict);
        assert!(!pr.mergable);
        assert_eq!(pr.problems, vec!["Needs approval".to_string()]);
        let reviewer = &pr.reviewers[0];
        assert_eq!(reviewer.status, Some(ReviewerStatus::NeedsWork));
        assert_eq!(
            reviewer.picture.as_deref(),
            Some("https://scm.fake/users/rev/avatar.png")
        );
    }

    #[test]
    fn test_build_fields_follow_commit() {
        let mut existing = converter().convert(
            (remote_pull_request(7, "feature/a", "develop", "c1"), None),
            None,
        );
        existing.build = Buildable {
            build_id: Some(3),
            build_status: Some(BuildStatus::Succeed),
            build_links: None,
        };
        existing.mergable = true;

        let same = converter().convert(
            (remote_pull_request(7, "feature/a", "develop", "c1"), None),
            Some(&existing),
        );
        assert_eq!(same.build.build_id, Some(3));
        assert!(same.mergable, "merge state kept when the merge call failed");

        let moved = converter().convert(
            (remote_pull_request(7, "feature/a", "develop", "c2"), None),
            Some(&existing),
        );
        assert_eq!(moved.build, Buildable::default());
    }

    #[test]
    fn test_missing_merge_result_is_conflict() {
        let mut remote = remote_pull_request(1, "a", "b", "c");
        remote.properties.merge_result = None;
        assert!(converter().convert((remote, None), None).conflict);
    }
}
