//! Branch reconciler, branch classification and branch creation
//!
//! Branch ids are the lower-cased display ids. The reconciler owns the
//! identity fields of a branch; the build fields belong to the build
//! tracker and are carried over on every write.

use std::cmp::Ordering;

use async_trait::async_trait;
use board_remote::RemoteBranch;
use board_state::{Branch, BranchType, RecordKey, Repo, RepoLinks};
use tracing::{info, instrument, warn};

use super::repo::{repo_of, repo_scopes};
use super::sync::{collect_pages, converge, Convert, SyncStats};
use super::{timed_pass, Reconciler, SyncContext};
use crate::error::BoardResult;

const RELEASE_VERSION_PREFIX: &str = "release/v";

fn version_segments(branch_id: &str) -> Option<Vec<&str>> {
    branch_id
        .strip_prefix(RELEASE_VERSION_PREFIX)
        .map(|version| version.split('.').collect())
}

fn compare_segment(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

/// Segment-wise version comparison; numeric where both segments are numbers.
/// A version that extends an equal prefix is the greater one.
pub fn compare_versions(a: &[&str], b: &[&str]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        match compare_segment(x, y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    a.len().cmp(&b.len())
}

/// The `release/v<version>` branch with the highest version, if any.
pub fn latest_release<'a, I>(branch_ids: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut latest: Option<(&str, Vec<&str>)> = None;
    for id in branch_ids {
        let Some(segments) = version_segments(id) else {
            continue;
        };
        let newer = match &latest {
            Some((_, current)) => compare_versions(&segments, current) == Ordering::Greater,
            None => true,
        };
        if newer {
            latest = Some((id, segments));
        }
    }
    latest.map(|(id, _)| id.to_string())
}

/// Branch type by priority: latest release, `master`, `develop`, then the
/// prefix before the first `/`.
pub fn classify_branch(branch_id: &str, latest_release: Option<&str>) -> BranchType {
    if latest_release.is_some_and(|latest| latest.eq_ignore_ascii_case(branch_id)) {
        return BranchType::Release;
    }
    match branch_id {
        "master" => return BranchType::Master,
        "develop" => return BranchType::Develop,
        _ => {}
    }
    let Some((prefix, _)) = branch_id.split_once('/') else {
        return BranchType::Other;
    };
    match prefix.to_lowercase().as_str() {
        "release" => BranchType::OldRelease,
        "feature" => BranchType::Feature,
        "bugfix" => BranchType::Bugfix,
        "hotfix" => BranchType::Hotfix,
        _ => BranchType::Other,
    }
}

struct BranchConverter<'a> {
    project_id: &'a str,
    repo_id: &'a str,
    latest_release: Option<String>,
    links: RepoLinks,
}

impl Convert for BranchConverter<'_> {
    type Remote = RemoteBranch;
    type Output = Branch;

    fn key(&self, remote: &RemoteBranch) -> RecordKey {
        Branch::key_of(self.project_id, self.repo_id, &remote.display_id.to_lowercase())
    }

    fn convert(&self, remote: RemoteBranch, existing: Option<&Branch>) -> Branch {
        let branch_id = remote.display_id.to_lowercase();
        Branch {
            project_id: self.project_id.to_string(),
            repo_id: self.repo_id.to_string(),
            branch_type: classify_branch(&branch_id, self.latest_release.as_deref()),
            branch_id,
            commit: remote.latest_commit,
            is_default: remote.is_default,
            links: self.links.clone(),
            build: existing.map(|b| b.build.clone()).unwrap_or_default(),
        }
    }
}

/// Syncs the branches of every known repository.
pub struct BranchReconciler {
    ctx: SyncContext,
}

impl BranchReconciler {
    pub fn new(ctx: SyncContext) -> Self {
        Self { ctx }
    }

    async fn remote_branches(&self, project_id: &str, repo_id: &str) -> BoardResult<Vec<RemoteBranch>> {
        let source = &self.ctx.source;
        Ok(collect_pages(self.ctx.pages, |page| {
            source.list_branches(project_id, repo_id, page)
        })
        .await?)
    }

    async fn repo_links(&self, project_id: &str, repo_id: &str) -> BoardResult<RepoLinks> {
        let repo: Option<Repo> = self.ctx.records.get(&Repo::key_of(project_id, repo_id)).await?;
        Ok(repo.map(|r| r.links).unwrap_or_default())
    }

    /// Create `branch_id` remotely from `from_ref` and record it.
    ///
    /// A branch classified as the new latest release demotes every other
    /// release branch of the repository to `OldRelease`.
    #[instrument(skip(self))]
    pub async fn create_branch(
        &self,
        project_id: &str,
        repo_id: &str,
        branch_id: &str,
        from_ref: &str,
    ) -> BoardResult<Branch> {
        let project_id = project_id.to_lowercase();
        let repo_id = repo_id.to_lowercase();
        let branch_id = branch_id.to_lowercase();

        self.ctx
            .source
            .create_branch(&project_id, &repo_id, &branch_id, from_ref)
            .await?;

        let remote = self.remote_branches(&project_id, &repo_id).await?;
        let ids: Vec<String> = remote.iter().map(|b| b.display_id.to_lowercase()).collect();
        let latest = latest_release(ids.iter().map(String::as_str));

        let key = Branch::key_of(&project_id, &repo_id, &branch_id);
        let existing: Option<Branch> = self.ctx.records.get(&key).await?;
        let branch = Branch {
            branch_type: classify_branch(&branch_id, latest.as_deref()),
            links: self.repo_links(&project_id, &repo_id).await?,
            build: existing.map(|b| b.build).unwrap_or_default(),
            project_id: project_id.clone(),
            repo_id: repo_id.clone(),
            branch_id: branch_id.clone(),
            commit: from_ref.to_string(),
            is_default: false,
        };
        self.ctx.records.save(&branch).await?;
        info!(project_id = %project_id, repo_id = %repo_id, branch_id = %branch_id, branch_type = ?branch.branch_type, "Branch created");

        if branch.branch_type == BranchType::Release {
            let siblings: Vec<Branch> = self.ctx.records.list(&branch.repo_key()).await?;
            for mut other in siblings {
                if other.branch_type == BranchType::Release && other.branch_id != branch_id {
                    other.branch_type = BranchType::OldRelease;
                    if let Err(e) = self.ctx.records.save(&other).await {
                        warn!(branch_id = %other.branch_id, error = %e, "Failed to demote release branch");
                    }
                }
            }
        }
        Ok(branch)
    }
}

#[async_trait]
impl Reconciler for BranchReconciler {
    fn name(&self) -> &'static str {
        "branches"
    }

    async fn scopes(&self) -> BoardResult<Vec<RecordKey>> {
        repo_scopes(&self.ctx).await
    }

    #[instrument(skip_all, fields(scope = %scope))]
    async fn refresh(&self, scope: &RecordKey) -> BoardResult<SyncStats> {
        let (project_id, repo_id) = repo_of(scope)?;
        timed_pass(self.name(), scope, async {
            let branches = self.remote_branches(project_id, repo_id).await?;
            let ids: Vec<String> = branches.iter().map(|b| b.display_id.to_lowercase()).collect();
            let converter = BranchConverter {
                project_id,
                repo_id,
                latest_release: latest_release(ids.iter().map(String::as_str)),
                links: self.repo_links(project_id, repo_id).await?,
            };
            Ok(converge(&self.ctx.records, scope, branches, &converter).await?)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_chain() {
        let ids = [
            "develop",
            "master",
            "release/v2.1.0",
            "release/v2.2.0",
            "feature/x",
            "bugfix/y",
            "randomname",
        ];
        let latest = latest_release(ids);
        assert_eq!(latest.as_deref(), Some("release/v2.2.0"));

        let types: Vec<BranchType> = ids
            .iter()
            .map(|id| classify_branch(id, latest.as_deref()))
            .collect();
        assert_eq!(
            types,
            vec![
                BranchType::Develop,
                BranchType::Master,
                BranchType::OldRelease,
                BranchType::Release,
                BranchType::Feature,
                BranchType::Bugfix,
                BranchType::Other,
            ]
        );
    }

    #[test]
    fn test_versions_compare_numerically() {
        let latest = latest_release(["release/v1.9.0", "release/v1.10.0"]);
        assert_eq!(latest.as_deref(), Some("release/v1.10.0"));

        let latest = latest_release(["release/v1.10.0", "release/v1.9.0"]);
        assert_eq!(latest.as_deref(), Some("release/v1.10.0"));
    }

    #[test]
    fn test_longer_version_wins_on_equal_prefix() {
        assert_eq!(
            compare_versions(&["2", "1", "1"], &["2", "1"]),
            Ordering::Greater
        );
        assert_eq!(compare_versions(&["2", "1"], &["2", "1"]), Ordering::Equal);
    }

    #[test]
    fn test_non_numeric_segments_compare_as_tokens() {
        assert_eq!(compare_versions(&["2", "rc2"], &["2", "rc1"]), Ordering::Greater);
        let latest = latest_release(["release/v3.0.beta", "release/v3.0.alpha"]);
        assert_eq!(latest.as_deref(), Some("release/v3.0.beta"));
    }

    #[test]
    fn test_plain_release_branches_are_old_releases() {
        assert_eq!(latest_release(["release/2024-01", "develop"]), None);
        assert_eq!(classify_branch("release/2024-01", None), BranchType::OldRelease);
        assert_eq!(classify_branch("Hotfix/urgent", None), BranchType::Hotfix);
        assert_eq!(classify_branch("team/feature", None), BranchType::Other);
    }
}
