//! Branch and pull request watching against an in-memory catalog.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use fontwatch_core::{FamilyDispatcher, LicenseDir, Source, SourceError, SourceMode, SourceRecord};
use fontwatch_git::{
    BranchWatchSource, MemoryRepository, Mergeable, Oid, PullRequest, PullRequestProvider, PullRequestSource,
    RemoteRef,
};

mod common;

use common::{CATALOG_REMOTE, CATALOG_URL, RecordingDispatcher, StaticProvider, fetcher};

fn branch_source(repo: &Arc<MemoryRepository>, dispatcher: &Arc<RecordingDispatcher>) -> BranchWatchSource {
    BranchWatchSource::new(
        SourceRecord::new("google/fonts:main", SourceMode::GitBranch),
        fetcher(repo),
        CATALOG_REMOTE,
        CATALOG_URL,
        "main",
        Arc::clone(dispatcher) as Arc<dyn FamilyDispatcher>,
    )
}

fn publish_main(repo: &MemoryRepository, commit: &Oid) {
    repo.publish(CATALOG_URL, &RemoteRef::branch("main"), commit);
}

fn catalog_files(beta: &str) -> Vec<(&'static str, String)> {
    vec![
        ("ofl/alpha/Alpha-Regular.ttf", "alpha".to_string()),
        ("ofl/alpha/OFL.txt", "ofl".to_string()),
        ("apache/beta/Beta-Regular.ttf", beta.to_string()),
        ("apache/beta/LICENSE.txt", "apache".to_string()),
        ("ufl/gamma/Gamma-Regular.ttf", "gamma".to_string()),
        ("README.md", "catalog".to_string()),
    ]
}

#[tokio::test]
async fn test_first_run_dispatches_everything_then_nothing() {
    let repo = Arc::new(MemoryRepository::new("/mem/fonts"));
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let commit = repo.commit_files(&[], &catalog_files("beta v1"));
    publish_main(&repo, &commit);

    let source = branch_source(&repo, &dispatcher);
    source.init().await.unwrap();

    let summary = source.update(false).await.unwrap();
    assert_eq!(summary.dispatched.len(), 3);
    assert_eq!(dispatcher.names(), vec!["Alpha", "Beta", "Gamma"]);
    assert_eq!(source.state().last_seen_commit(), Some(commit.clone()));

    let beta = dispatcher
        .dispatched
        .lock()
        .iter()
        .find(|f| f.family_name == "Beta")
        .cloned()
        .unwrap();
    assert_eq!(beta.license_dir, LicenseDir::Apache);
    assert_eq!(beta.metadata.branch, "main");
    assert_eq!(beta.metadata.repository, CATALOG_URL);

    dispatcher.clear();
    let summary = source.update(false).await.unwrap();
    assert_eq!(summary.total(), 0);
    assert!(dispatcher.names().is_empty());
}

#[tokio::test]
async fn test_incremental_run_dispatches_only_changed_family() {
    let repo = Arc::new(MemoryRepository::new("/mem/fonts"));
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let first = repo.commit_files(&[], &catalog_files("beta v1"));
    publish_main(&repo, &first);

    let source = branch_source(&repo, &dispatcher);
    source.update(false).await.unwrap();
    dispatcher.clear();

    let second = repo.commit_files(&[first], &catalog_files("beta v2"));
    publish_main(&repo, &second);

    let summary = source.update(false).await.unwrap();
    assert_eq!(summary.dispatched, vec!["Beta"]);
    let beta = dispatcher.dispatched.lock()[0].clone();
    assert!(beta.metadata.is_update);
    assert_eq!(beta.metadata.commit, second.as_str());

    // Forcing re-dispatches every family.
    dispatcher.clear();
    let summary = source.update(true).await.unwrap();
    assert_eq!(summary.dispatched.len(), 3);
}

#[tokio::test]
async fn test_failed_family_keeps_cursor_and_others_dispatch() {
    let repo = Arc::new(MemoryRepository::new("/mem/fonts"));
    let dispatcher = Arc::new(RecordingDispatcher::default());
    dispatcher.failing.lock().push("Beta".into());
    let commit = repo.commit_files(&[], &catalog_files("beta v1"));
    publish_main(&repo, &commit);

    let source = branch_source(&repo, &dispatcher);
    let err = source.update(false).await.unwrap_err();
    assert!(matches!(err, SourceError::PartialFailure { failed: 1, total: 3, .. }));
    assert_eq!(dispatcher.names(), vec!["Alpha", "Gamma"]);
    assert_eq!(source.state().last_seen_commit(), None);

    // The retry only picks up the family that failed.
    dispatcher.failing.lock().clear();
    dispatcher.clear();
    let summary = source.update(false).await.unwrap();
    assert_eq!(summary.dispatched, vec!["Beta"]);
    assert_eq!(summary.skipped, vec!["Alpha", "Gamma"]);
    assert_eq!(source.state().last_seen_commit(), Some(commit));
}

#[tokio::test]
async fn test_get_marks_updates_against_the_previous_commit() {
    let repo = Arc::new(MemoryRepository::new("/mem/fonts"));
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let first = repo.commit_files(&[], &catalog_files("beta v1"));
    publish_main(&repo, &first);

    let source = branch_source(&repo, &dispatcher);
    source.update(false).await.unwrap();
    assert!(!source.get("Beta").await.unwrap().metadata.is_update);

    let mut files = catalog_files("beta v2");
    files.push(("ofl/delta/Delta-Regular.ttf", "delta".to_string()));
    let second = repo.commit_files(&[first], &files);
    publish_main(&repo, &second);
    source.update(false).await.unwrap();
    assert_eq!(source.state().last_seen_commit(), Some(second));

    // The head is settled, so its parent is the baseline.
    assert!(source.get("Beta").await.unwrap().metadata.is_update);
    assert!(!source.get("Delta").await.unwrap().metadata.is_update);
}

#[tokio::test]
async fn test_whitelist_filters_update_but_not_get() {
    let repo = Arc::new(MemoryRepository::new("/mem/fonts"));
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let commit = repo.commit_files(&[], &catalog_files("beta v1"));
    publish_main(&repo, &commit);

    let source = BranchWatchSource::new(
        SourceRecord::new("google/fonts:main", SourceMode::GitBranch).with_whitelist(["Alpha"]),
        fetcher(&repo),
        CATALOG_REMOTE,
        CATALOG_URL,
        "main",
        Arc::clone(&dispatcher) as Arc<dyn FamilyDispatcher>,
    );

    let summary = source.update(false).await.unwrap();
    assert_eq!(summary.dispatched, vec!["Alpha"]);
    assert_eq!(summary.skipped.len(), 2);

    assert_eq!(source.list().await.unwrap(), vec!["Alpha", "Beta", "Gamma"]);
    let gamma = source.get("Gamma").await.unwrap();
    assert_eq!(gamma.license_dir, LicenseDir::Ufl);
    assert!(source.get("Delta").await.unwrap_err().is_not_found());

    let details = source.source_details("Beta").await.unwrap();
    assert_eq!(details["familyPath"], "apache/beta");
    assert_eq!(details["reference"]["remoteUrl"], CATALOG_URL);
}

fn pull_request(number: u64, head: &Oid, age_days: i64) -> PullRequest {
    PullRequest {
        number,
        url: format!("https://github.com/google/fonts/pull/{number}"),
        created_at: Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap() - Duration::days(age_days),
        mergeable: Mergeable::Mergeable,
        head_ref: format!("pr-{number}"),
        head_commit: head.clone(),
        head_repository_url: Some("https://github.com/contributor/fonts".into()),
    }
}

fn pull_request_source(
    repo: &Arc<MemoryRepository>,
    provider: &Arc<StaticProvider>,
    dispatcher: &Arc<RecordingDispatcher>,
) -> PullRequestSource {
    PullRequestSource::new(
        SourceRecord::new("google/fonts:pulls", SourceMode::GitPrs),
        fetcher(repo),
        CATALOG_REMOTE,
        CATALOG_URL,
        "main",
        Arc::clone(provider) as Arc<dyn PullRequestProvider>,
        Arc::clone(dispatcher) as Arc<dyn FamilyDispatcher>,
    )
}

#[tokio::test]
async fn test_pull_request_diffs_from_merge_base() {
    let repo = Arc::new(MemoryRepository::new("/mem/fonts"));
    let dispatcher = Arc::new(RecordingDispatcher::default());

    let root = repo.commit_files(
        &[],
        &[("ofl/alpha/Alpha-Regular.ttf", "a1"), ("ofl/charlie/Charlie-Regular.ttf", "c1")],
    );
    // The fork point itself changed Charlie.
    let fork = repo.commit_files(
        &[root],
        &[("ofl/alpha/Alpha-Regular.ttf", "a1"), ("ofl/charlie/Charlie-Regular.ttf", "c2")],
    );
    // Base moves on and changes Charlie again.
    let base_tip = repo.commit_files(
        &[fork.clone()],
        &[("ofl/alpha/Alpha-Regular.ttf", "a1"), ("ofl/charlie/Charlie-Regular.ttf", "c3")],
    );
    // The pull request only touches Alpha.
    let head = repo.commit_files(
        &[fork],
        &[("ofl/alpha/Alpha-Regular.ttf", "a2"), ("ofl/charlie/Charlie-Regular.ttf", "c2")],
    );
    publish_main(&repo, &base_tip);
    repo.publish(CATALOG_URL, &RemoteRef::PullRequest(7), &head);

    let provider = Arc::new(StaticProvider::default());
    provider.pull_requests.lock().push(pull_request(7, &head, 1));

    let source = pull_request_source(&repo, &provider, &dispatcher);
    let summary = source.update(false).await.unwrap();

    assert_eq!(summary.dispatched, vec!["Alpha"]);
    let alpha = dispatcher.dispatched.lock()[0].clone();
    assert_eq!(alpha.metadata.pr_url.as_deref(), Some("https://github.com/google/fonts/pull/7"));
    assert_eq!(alpha.metadata.commit, head.as_str());
    assert!(alpha.metadata.is_update);
    assert_eq!(source.list().await.unwrap(), vec!["Alpha"]);
}

#[tokio::test]
async fn test_newest_pull_request_wins_and_unwatchable_are_dropped() {
    let repo = Arc::new(MemoryRepository::new("/mem/fonts"));
    let dispatcher = Arc::new(RecordingDispatcher::default());

    let base = repo.commit_files(&[], &[("ofl/alpha/Alpha-Regular.ttf", "a1")]);
    let older = repo.commit_files(&[base.clone()], &[("ofl/alpha/Alpha-Regular.ttf", "older")]);
    let newer = repo.commit_files(&[base.clone()], &[("ofl/alpha/Alpha-Regular.ttf", "newer")]);
    let conflicting = repo.commit_files(&[base.clone()], &[("ofl/delta/Delta-Regular.ttf", "d")]);
    let orphan = repo.commit_files(&[base.clone()], &[("ofl/echo/Echo-Regular.ttf", "e")]);
    publish_main(&repo, &base);
    for (number, head) in [(1, &older), (2, &newer), (3, &conflicting), (4, &orphan)] {
        repo.publish(CATALOG_URL, &RemoteRef::PullRequest(number), head);
    }

    let provider = Arc::new(StaticProvider::default());
    {
        let mut prs = provider.pull_requests.lock();
        prs.push(pull_request(1, &older, 10));
        prs.push(pull_request(2, &newer, 2));
        let mut pr = pull_request(3, &conflicting, 1);
        pr.mergeable = Mergeable::Conflicting;
        prs.push(pr);
        let mut pr = pull_request(4, &orphan, 1);
        pr.head_repository_url = None;
        prs.push(pr);
    }

    let source = pull_request_source(&repo, &provider, &dispatcher);
    let summary = source.update(false).await.unwrap();

    assert_eq!(*provider.pages_served.lock(), 2);
    assert_eq!(summary.dispatched, vec!["Alpha"]);
    let alpha = dispatcher.dispatched.lock()[0].clone();
    assert_eq!(alpha.metadata.commit, newer.as_str());
    assert_eq!(alpha.file("Alpha-Regular.ttf").unwrap().data, b"newer");

    // The mirror already holds both heads, so the second pass fetches only the base.
    let fetches_before = repo.fetch_log().len();
    dispatcher.clear();
    let summary = source.update(false).await.unwrap();
    assert_eq!(repo.fetch_log().len(), fetches_before + 1);
    assert_eq!(summary.skipped, vec!["Alpha"]);
    assert!(dispatcher.names().is_empty());
}

#[tokio::test]
async fn test_claims_follow_open_pull_requests() {
    let repo = Arc::new(MemoryRepository::new("/mem/fonts"));
    let dispatcher = Arc::new(RecordingDispatcher::default());

    let base = repo.commit_files(
        &[],
        &[("ofl/alpha/Alpha-Regular.ttf", "a1"), ("ofl/charlie/Charlie-Regular.ttf", "c1")],
    );
    let alpha_change = repo.commit_files(
        &[base.clone()],
        &[("ofl/alpha/Alpha-Regular.ttf", "a2"), ("ofl/charlie/Charlie-Regular.ttf", "c1")],
    );
    let charlie_change = repo.commit_files(
        &[base.clone()],
        &[("ofl/alpha/Alpha-Regular.ttf", "a1"), ("ofl/charlie/Charlie-Regular.ttf", "c2")],
    );
    publish_main(&repo, &base);
    repo.publish(CATALOG_URL, &RemoteRef::PullRequest(7), &alpha_change);

    let provider = Arc::new(StaticProvider::default());
    provider.pull_requests.lock().push(pull_request(7, &alpha_change, 1));

    let source = pull_request_source(&repo, &provider, &dispatcher);
    source.update(false).await.unwrap();
    assert_eq!(source.list().await.unwrap(), vec!["Alpha"]);

    // Force-pushed so it only touches Charlie now.
    repo.publish(CATALOG_URL, &RemoteRef::PullRequest(7), &charlie_change);
    provider.pull_requests.lock()[0] = pull_request(7, &charlie_change, 1);
    let summary = source.update(false).await.unwrap();
    assert_eq!(summary.dispatched, vec!["Charlie"]);
    assert_eq!(source.list().await.unwrap(), vec!["Charlie"]);
    assert!(source.get("Alpha").await.unwrap_err().is_not_found());

    // Closed.
    provider.pull_requests.lock().clear();
    source.update(false).await.unwrap();
    assert!(source.list().await.unwrap().is_empty());
}
