//! Wiring of settings into running components.

use std::sync::Arc;

use fontwatch_core::{FamilyDispatcher, JobQueue, Reporter, Source, SourceMode, SourceRecord};
use fontwatch_git::{BranchWatchSource, FetcherPool, GitError, GithubClient, PullRequestSource};
use fontwatch_process::{ProcessEngine, ProcessStore};
use fontwatch_sources::{ApiSource, CsvSource};
use thiserror::Error;
use tracing::info;

use crate::cache::{CacheClient, MemoryCache};
use crate::dispatch::Dispatcher;
use crate::publish::FilePublisher;
use crate::report::{ReportCommitHook, TracingReporter};
use crate::review::{self, ReviewEngine};
use crate::service::{CacheSink, SourceService};
use crate::settings::{Settings, SourceKind, SourceSettings};
use crate::state::AppState;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("invalid {component} settings: {message}")]
    Settings {
        component: &'static str,
        message: String,
    },

    #[error("source '{id}': {source}")]
    Source {
        id: String,
        #[source]
        source: GitError,
    },

    #[error("process.secret is required")]
    MissingSecret,
}

fn invalid(component: &'static str) -> impl FnOnce(&'static str) -> BootstrapError {
    move |message| BootstrapError::Settings {
        component,
        message: message.to_string(),
    }
}

/// Everything `main` needs to serve.
pub struct App {
    pub state: AppState,
    pub cache: Arc<MemoryCache>,
}

/// Builds the components described by `settings`. Nothing touches the
/// network until the sources are initialized.
pub fn build(settings: &Settings, store: Arc<dyn ProcessStore>) -> Result<App, BootstrapError> {
    let queue = JobQueue::new();
    let reporter: Arc<dyn Reporter> = Arc::new(TracingReporter);
    let cache = Arc::new(MemoryCache::new(settings.cache.clone()));
    let publisher = Arc::new(FilePublisher::new(settings.jobs_dir()));
    let dispatcher: Arc<dyn FamilyDispatcher> = Arc::new(Dispatcher::new(
        settings.dispatch.clone(),
        Arc::clone(&cache) as Arc<dyn CacheClient>,
        publisher,
        queue.clone(),
    ));
    let pool = FetcherPool::new(queue.clone(), settings.fetch_config().map_err(invalid("fetch"))?);

    let sink = Arc::new(CacheSink::new(
        Arc::clone(&cache) as Arc<dyn CacheClient>,
        settings.replies_dir(),
    ));
    let mut service = SourceService::new(queue.clone(), sink);
    for source in &settings.sources {
        let built = build_source(source, &pool, &dispatcher, &reporter)?;
        info!(source = %source.id, mode = %built.1, "source configured");
        service = service.with_source(built.0);
    }

    let secret = settings.process.secret.clone().ok_or(BootstrapError::MissingSecret)?;
    let reviews: ReviewEngine = ProcessEngine::builder(review::review_task().map_err(invalid("review task"))?)
        .secret(secret)
        .store(store)
        .queue(queue)
        .commit_hook(Arc::new(ReportCommitHook::new(review::TASK_NAME, reporter)))
        .build()
        .map_err(invalid("process"))?;

    Ok(App {
        state: AppState::new(service, reviews, Arc::clone(&cache) as Arc<dyn CacheClient>),
        cache,
    })
}

fn build_source(
    settings: &SourceSettings,
    pool: &FetcherPool,
    dispatcher: &Arc<dyn FamilyDispatcher>,
    reporter: &Arc<dyn Reporter>,
) -> Result<(Arc<dyn Source>, SourceMode), BootstrapError> {
    let git_error = |source| BootstrapError::Source {
        id: settings.id.clone(),
        source,
    };
    let record = |mode| SourceRecord {
        id: settings.id.clone(),
        mode,
        whitelist: settings.whitelist.clone(),
    };
    let dispatcher = Arc::clone(dispatcher);

    let source: (Arc<dyn Source>, SourceMode) = match &settings.kind {
        SourceKind::GitBranch {
            remote_name,
            remote_url,
            branch,
        } => {
            let fetcher = pool.fetcher(remote_url).map_err(git_error)?;
            let source = BranchWatchSource::new(
                record(SourceMode::GitBranch),
                fetcher,
                remote_name.as_str(),
                remote_url.as_str(),
                branch.as_str(),
                dispatcher,
            );
            (Arc::new(source), SourceMode::GitBranch)
        },
        SourceKind::GitPrs {
            remote_name,
            remote_url,
            base_branch,
            github_token,
        } => {
            let fetcher = pool.fetcher(remote_url).map_err(git_error)?;
            let mut client = GithubClient::from_url(remote_url).map_err(git_error)?;
            if let Some(token) = github_token {
                client = client.with_token(token.as_str());
            }
            let source = PullRequestSource::new(
                record(SourceMode::GitPrs),
                fetcher,
                remote_name.as_str(),
                remote_url.as_str(),
                base_branch.as_str(),
                Arc::new(client),
                dispatcher,
            );
            (Arc::new(source), SourceMode::GitPrs)
        },
        SourceKind::Csv(config) => {
            let source = CsvSource::new(record(SourceMode::Csv), config.clone(), pool.clone(), dispatcher)
                .with_reporter(Arc::clone(reporter));
            (Arc::new(source), SourceMode::Csv)
        },
        SourceKind::Api(config) => {
            let source =
                ApiSource::new(record(SourceMode::Api), config.clone(), dispatcher).with_reporter(Arc::clone(reporter));
            (Arc::new(source), SourceMode::Api)
        },
    };
    Ok(source)
}

#[cfg(test)]
mod tests {
    use fontwatch_process::{MemoryProcessStore, Secret};
    use fontwatch_sources::CsvSourceConfig;

    use super::*;
    use crate::settings::{ProcessSettings, ServerSettings};

    fn settings(dir: &std::path::Path, secret: Option<&str>) -> Settings {
        Settings {
            server: ServerSettings::default(),
            data_dir: dir.to_path_buf(),
            dispatch: Default::default(),
            cache: Default::default(),
            fetch: None,
            poll: Default::default(),
            process: ProcessSettings {
                secret: secret.map(Secret::new),
            },
            sources: vec![
                SourceSettings {
                    id: "fonts".into(),
                    whitelist: None,
                    kind: SourceKind::GitBranch {
                        remote_name: "google/fonts".into(),
                        remote_url: "https://github.com/google/fonts.git".into(),
                        branch: "main".into(),
                    },
                },
                SourceSettings {
                    id: "upstream".into(),
                    whitelist: Some(vec!["Test Sans".into()]),
                    kind: SourceKind::Csv(
                        CsvSourceConfig::builder()
                            .sheet_url("file:///tmp/families.csv")
                            .build()
                            .unwrap(),
                    ),
                },
            ],
        }
    }

    #[tokio::test]
    async fn test_build_registers_sources() {
        let dir = tempfile::tempdir().unwrap();
        let app = build(&settings(dir.path(), Some("s3cr3t")), Arc::new(MemoryProcessStore::new())).unwrap();
        assert_eq!(app.state.service().source_ids(), vec!["fonts", "upstream"]);
    }

    #[tokio::test]
    async fn test_build_serves_the_dispatch_cache() {
        let dir = tempfile::tempdir().unwrap();
        let app = build(&settings(dir.path(), Some("s3cr3t")), Arc::new(MemoryProcessStore::new())).unwrap();

        let key = app.cache.put(b"test sans".to_vec()).await.unwrap();
        let served = app.state.cache().get(&key).await.unwrap().unwrap();
        assert_eq!(served.as_slice(), b"test sans");
    }

    #[tokio::test]
    async fn test_build_requires_secret() {
        let dir = tempfile::tempdir().unwrap();
        let err = build(&settings(dir.path(), None), Arc::new(MemoryProcessStore::new())).err().unwrap();
        assert!(matches!(err, BootstrapError::MissingSecret));
    }
}
