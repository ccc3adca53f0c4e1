use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use fontwatch_core::{
    CacheKey, FamilyDescriptor, FamilyDispatcher, FamilyOutcome, JobQueue, Result, Source,
    SourceError, SourceRecord, SourceMode, UpdateSummary, flatten, map_parallel, settle_all,
};
use parking_lot::Mutex;

mod common;

/// Records dispatched family names and fails for names starting with `!`.
#[derive(Default)]
struct RecordingDispatcher {
    seen: Mutex<Vec<String>>,
}

#[async_trait]
impl FamilyDispatcher for RecordingDispatcher {
    async fn dispatch(&self, _source_id: &str, family: FamilyDescriptor) -> Result<CacheKey> {
        if family.family_name.starts_with('!') {
            return Err(SourceError::dispatch("cache unavailable"));
        }
        self.seen.lock().push(family.family_name.clone());
        Ok(CacheKey::new(format!("key-{}", family.family_name)))
    }
}

struct StaticSource {
    record: SourceRecord,
    families: BTreeMap<String, FamilyDescriptor>,
    dispatcher: Arc<RecordingDispatcher>,
}

#[async_trait]
impl Source for StaticSource {
    fn id(&self) -> &str {
        &self.record.id
    }

    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn update(&self, _force: bool) -> Result<UpdateSummary> {
        let families: Vec<FamilyDescriptor> = self
            .families
            .values()
            .filter(|f| self.record.allows(&f.family_name))
            .cloned()
            .collect();
        let names: Vec<String> = families.iter().map(|f| f.family_name.clone()).collect();

        let dispatcher = Arc::clone(&self.dispatcher);
        let source_id = self.record.id.clone();
        let handles = map_parallel(
            move |family: FamilyDescriptor| {
                let dispatcher = Arc::clone(&dispatcher);
                let source_id = source_id.clone();
                async move {
                    dispatcher
                        .dispatch(&source_id, family)
                        .await
                        .map(FamilyOutcome::Dispatched)
                }
            },
            families,
            2,
        );
        let outcomes = settle_all(handles).await.into_iter().map(flatten);
        UpdateSummary::settle(self.id(), names.into_iter().zip(outcomes))
    }

    async fn list(&self) -> Result<Vec<String>> {
        Ok(self.families.keys().cloned().collect())
    }

    async fn get(&self, family: &str) -> Result<FamilyDescriptor> {
        self.families
            .get(family)
            .cloned()
            .ok_or_else(|| SourceError::family_not_found(self.id(), family))
    }

    async fn source_details(&self, family: &str) -> Result<serde_json::Value> {
        let descriptor = self.get(family).await?;
        serde_json::to_value(&descriptor.metadata).map_err(|e| SourceError::internal(e.to_string()))
    }
}

fn source(names: &[&str], whitelist: Option<&[&str]>) -> (StaticSource, Arc<RecordingDispatcher>) {
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let mut record = SourceRecord::new("static", SourceMode::GitBranch);
    if let Some(list) = whitelist {
        record = record.with_whitelist(list.iter().copied());
    }
    let families = names
        .iter()
        .map(|n| (n.to_string(), common::family(n)))
        .collect();
    (
        StaticSource {
            record,
            families,
            dispatcher: Arc::clone(&dispatcher),
        },
        dispatcher,
    )
}

#[tokio::test]
async fn test_update_dispatches_whitelisted_families() {
    let (source, dispatcher) = source(&["Alpha Sans", "Beta Serif"], Some(&["Beta Serif"]));

    let summary = source.update(false).await.unwrap();

    assert_eq!(summary.dispatched, vec!["Beta Serif"]);
    assert_eq!(*dispatcher.seen.lock(), vec!["Beta Serif"]);
}

#[tokio::test]
async fn test_get_bypasses_whitelist() {
    let (source, _) = source(&["Alpha Sans", "Beta Serif"], Some(&["Beta Serif"]));

    let family = source.get("Alpha Sans").await.unwrap();
    assert_eq!(family.family_name, "Alpha Sans");

    let err = source.get("Gamma Mono").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_one_failing_family_does_not_abort_the_pass() {
    let (source, dispatcher) = source(&["!Broken", "Alpha Sans", "Beta Serif"], None);

    let err = source.update(false).await.unwrap_err();

    let mut seen = dispatcher.seen.lock().clone();
    seen.sort();
    assert_eq!(seen, vec!["Alpha Sans", "Beta Serif"]);
    assert!(matches!(
        err,
        SourceError::PartialFailure { failed: 1, total: 3, .. }
    ));
}

#[tokio::test]
async fn test_source_details_is_metadata_json() {
    let (source, _) = source(&["Alpha Sans"], None);
    let details = source.source_details("Alpha Sans").await.unwrap();
    assert_eq!(details["commit"], "c0ffee");
    assert_eq!(details["isUpdate"], false);
}

#[tokio::test]
async fn test_repository_keys_serialize_fetches_per_path() {
    let queue = JobQueue::new();
    let log = Arc::new(Mutex::new(Vec::new()));

    let mut handles = Vec::new();
    for (path, step) in [("/a", 1), ("/b", 1), ("/a", 2), ("/b", 2)] {
        let log = Arc::clone(&log);
        handles.push(queue.schedule(format!("git.lock {path}"), move || async move {
            log.lock().push(format!("{path}:{step}"));
        }));
    }
    settle_all(handles).await;

    let log = log.lock();
    let pos = |s: &str| log.iter().position(|e| e == s).unwrap();
    assert!(pos("/a:1") < pos("/a:2"));
    assert!(pos("/b:1") < pos("/b:2"));
}
