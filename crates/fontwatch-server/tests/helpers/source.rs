//! In-memory source.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use fontwatch_core::{
    FamilyDescriptor, FamilyFile, FamilyMetadata, LicenseDir, Result, Source, SourceError, UpdateSummary,
};
use serde_json::json;

pub fn family(name: &str) -> FamilyDescriptor {
    let file_stem = name.replace(' ', "");
    let date = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    FamilyDescriptor::new(
        name,
        vec![
            FamilyFile::new(format!("{file_stem}-Regular.ttf"), b"regular".to_vec()),
            FamilyFile::new("OFL.txt", b"license".to_vec()),
        ],
        LicenseDir::Ofl,
        FamilyMetadata::new("c0ffee", date, "https://github.com/acme/fonts", "main"),
    )
}

pub struct FakeSource {
    id: String,
    families: BTreeMap<String, FamilyDescriptor>,
    updates: AtomicUsize,
    forced: AtomicUsize,
    failing: AtomicBool,
}

impl FakeSource {
    pub fn new<I, S>(id: &str, families: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            id: id.to_string(),
            families: families
                .into_iter()
                .map(|name| (name.as_ref().to_string(), family(name.as_ref())))
                .collect(),
            updates: AtomicUsize::new(0),
            forced: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn forced(&self) -> usize {
        self.forced.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Source for FakeSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn update(&self, force: bool) -> Result<UpdateSummary> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        if force {
            self.forced.fetch_add(1, Ordering::SeqCst);
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(SourceError::transport("upstream unreachable"));
        }
        Ok(UpdateSummary {
            dispatched: self.families.keys().cloned().collect(),
            ..UpdateSummary::default()
        })
    }

    async fn list(&self) -> Result<Vec<String>> {
        Ok(self.families.keys().cloned().collect())
    }

    async fn get(&self, family: &str) -> Result<FamilyDescriptor> {
        self.families
            .get(family)
            .cloned()
            .ok_or_else(|| SourceError::family_not_found(&self.id, family))
    }

    async fn source_details(&self, family: &str) -> Result<serde_json::Value> {
        let found = self.get(family).await?;
        Ok(json!({ "repository": found.metadata.repository, "family": family }))
    }
}
