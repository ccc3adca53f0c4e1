//! CSV catalog source against in-memory upstreams and a sheet on disk.

use std::sync::Arc;

use async_trait::async_trait;
use fontwatch_core::{FamilyDispatcher, FamilyFile, LicenseDir, Reporter, Source, SourceError, SourceMode, SourceRecord};
use fontwatch_git::{MemoryRepository, Oid, RemoteRef};
use fontwatch_sources::metadata::{MetadataError, MetadataGenerator};
use fontwatch_sources::{CsvSource, CsvSourceConfig};
use tempfile::NamedTempFile;

mod common;

use common::{RecordingDispatcher, RecordingReporter, file_url, memory_pool, rewrite};

const CATALOG_URL: &str = "https://github.com/google/fonts.git";
const TEST_SANS_URL: &str = "https://github.com/acme/testsans.git";
const BETA_URL: &str = "https://gitlab.example.com/acme/beta.git";

const SHEET: &str = "\
Status,family,feature branch key,family name is confirmed as good?,upstream,branch,fontfiles prefix,genre,designer
OK,Test Sans,,Passed,https://github.com/acme/testsans/,,fonts/ttf/TestSans-,Sans Serif,Jane Doe
NOTE,Beta Serif,,Passed,https://gitlab.example.com/acme/beta.git,main,BetaSerif-,Serif,
OK,Test Sans,wip,Passed,https://github.com/acme/testsans,wip,fonts/ttf/TestSans-,Sans Serif,
ok,Zip Font,,Passed,https://example.com/zipfont.zip,,Zip-,Display,
ZIP,Archived Sans,,Passed,https://example.com/archived.zip,,Archived-,Sans Serif,
";

struct Fixture {
    repo: Arc<MemoryRepository>,
    dispatcher: Arc<RecordingDispatcher>,
    reporter: Arc<RecordingReporter>,
    sheet: NamedTempFile,
    sheet_url: String,
}

impl Fixture {
    fn new(sheet: &str) -> Self {
        let repo = Arc::new(MemoryRepository::new("/mem/mirrors"));
        let (sheet, sheet_url) = file_url(sheet);
        Self {
            repo,
            dispatcher: Arc::new(RecordingDispatcher::default()),
            reporter: Arc::new(RecordingReporter::default()),
            sheet,
            sheet_url,
        }
    }

    fn source(&self, record: SourceRecord) -> CsvSource {
        let config = CsvSourceConfig::builder()
            .sheet_url(&self.sheet_url)
            .max_parallel_fetches(2)
            .build()
            .unwrap();
        CsvSource::new(
            record,
            config,
            memory_pool(&self.repo),
            Arc::clone(&self.dispatcher) as Arc<dyn FamilyDispatcher>,
        )
        .with_reporter(Arc::clone(&self.reporter) as Arc<dyn Reporter>)
    }

    fn publish(&self, url: &str, files: &[(&str, &str)]) -> Oid {
        let commit = self.repo.commit_files(&[], files);
        self.repo.publish(url, &RemoteRef::branch("main"), &commit);
        commit
    }

    fn publish_all(&self) -> Oid {
        self.publish(
            CATALOG_URL,
            &[
                ("apache/betaserif/BetaSerif-Regular.ttf", "beta released"),
                ("apache/betaserif/METADATA.pb", "name: \"Beta Serif\""),
                ("apache/betaserif/DESCRIPTION.en_us.html", "<p>Beta</p>"),
                ("ofl/other/Other-Regular.ttf", "other"),
            ],
        );
        self.publish(
            BETA_URL,
            &[
                ("BetaSerif-Regular.ttf", "beta upstream"),
                ("LICENSE.txt", "apache license"),
                ("README.md", "beta readme"),
            ],
        );
        self.publish(TEST_SANS_URL, &test_sans_files("regular v1"))
    }
}

fn record() -> SourceRecord {
    SourceRecord::new("upstream", SourceMode::Csv)
}

fn test_sans_files(regular: &str) -> Vec<(&'static str, &str)> {
    vec![
        ("fonts/ttf/TestSans-Regular.ttf", regular),
        ("fonts/ttf/TestSans-Bold.ttf", "bold v1"),
        ("fonts/ttf/Other-Regular.ttf", "not ours"),
        ("fonts/ttf/notes.txt", "build notes"),
        ("OFL.txt", "open font license"),
        ("README.md", "test sans"),
    ]
}

fn file_names(files: &[FamilyFile]) -> Vec<&str> {
    files.iter().map(|f| f.name.as_str()).collect()
}

#[tokio::test]
async fn test_update_dispatches_git_upstreams() {
    let fixture = Fixture::new(SHEET);
    let commit = fixture.publish_all();
    let source = fixture.source(record());
    source.init().await.unwrap();

    let summary = source.update(false).await.unwrap();
    assert_eq!(fixture.dispatcher.names(), vec!["Beta Serif", "Test Sans"]);
    assert_eq!(summary.dispatched.len(), 2);
    let mut skipped = summary.skipped.clone();
    skipped.sort();
    assert_eq!(skipped, vec!["Test Sans:wip", "Zip Font"]);

    let test_sans = fixture.dispatcher.family("Test Sans");
    assert_eq!(
        file_names(&test_sans.files),
        vec!["OFL.txt", "TestSans-Bold.ttf", "TestSans-Regular.ttf"]
    );
    assert_eq!(test_sans.license_dir, LicenseDir::Ofl);
    assert!(!test_sans.metadata.is_update);
    assert_eq!(test_sans.metadata.commit, commit.as_str());
    assert_eq!(test_sans.metadata.repository, "https://github.com/acme/testsans/");
    assert_eq!(test_sans.metadata.branch, "main");
    assert_eq!(test_sans.metadata.target_directory.as_deref(), Some("ofl/testsans"));
    assert_eq!(test_sans.metadata.family_path.as_deref(), Some("fonts/ttf"));
    let details = test_sans.metadata.source_details.unwrap();
    assert_eq!(details["designer"], "Jane Doe");

    let beta = fixture.dispatcher.family("Beta Serif");
    assert_eq!(
        file_names(&beta.files),
        vec!["BetaSerif-Regular.ttf", "DESCRIPTION.en_us.html", "LICENSE.txt", "METADATA.pb"]
    );
    assert_eq!(beta.file("BetaSerif-Regular.ttf").unwrap().data, b"beta upstream");
    assert_eq!(beta.license_dir, LicenseDir::Apache);
    assert!(beta.metadata.is_update);
    assert_eq!(beta.metadata.target_directory.as_deref(), Some("apache/betaserif"));
}

#[tokio::test]
async fn test_unchanged_upstreams_are_skipped_unless_forced() {
    let fixture = Fixture::new(SHEET);
    fixture.publish_all();
    let source = fixture.source(record());

    source.update(false).await.unwrap();
    fixture.dispatcher.clear();

    let summary = source.update(false).await.unwrap();
    assert!(summary.dispatched.is_empty());
    assert!(fixture.dispatcher.names().is_empty());

    fixture.publish(TEST_SANS_URL, &test_sans_files("regular v2"));
    let summary = source.update(false).await.unwrap();
    assert_eq!(summary.dispatched, vec!["Test Sans"]);
    let test_sans = fixture.dispatcher.family("Test Sans");
    assert_eq!(test_sans.file("TestSans-Regular.ttf").unwrap().data, b"regular v2");

    fixture.dispatcher.clear();
    let summary = source.update(true).await.unwrap();
    assert_eq!(summary.dispatched.len(), 2);
}

#[tokio::test]
async fn test_whitelist_limits_update_but_not_get() {
    let fixture = Fixture::new(SHEET);
    fixture.publish_all();
    let source = fixture.source(record().with_whitelist(["Test Sans"]));

    source.update(false).await.unwrap();
    assert_eq!(fixture.dispatcher.names(), vec!["Test Sans"]);

    let beta = source.get("Beta Serif").await.unwrap();
    assert_eq!(beta.family_name, "Beta Serif");
    assert!(beta.metadata.is_update);
}

#[tokio::test]
async fn test_bad_prefix_fails_only_that_family() {
    let sheet = SHEET.replace("fonts/ttf/TestSans-,Sans Serif,Jane Doe", "fonts/otf/TestSans-,Sans Serif,Jane Doe");
    let fixture = Fixture::new(&sheet);
    fixture.publish_all();
    let source = fixture.source(record());

    let err = source.update(false).await.unwrap_err();
    match err {
        SourceError::PartialFailure { failed, first, .. } => {
            assert_eq!(failed, 1);
            assert!(first.contains("fonts/otf"), "{first}");
        },
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(fixture.dispatcher.names(), vec!["Beta Serif"]);

    let reports = fixture.reporter.reports.lock();
    let tables = &reports[0].data["tables"];
    let updates = tables[1]["rows"].as_array().unwrap();
    assert!(updates.iter().any(|row| row[0] == "Test Sans" && row[1] == "failed"));
}

#[tokio::test]
async fn test_fetch_failure_is_isolated() {
    let fixture = Fixture::new(SHEET);
    fixture.publish_all();
    fixture.repo.fail_fetches(BETA_URL, "connection reset");
    let source = fixture.source(record());

    let err = source.update(false).await.unwrap_err();
    assert!(matches!(err, SourceError::PartialFailure { failed: 1, .. }));
    assert_eq!(fixture.dispatcher.names(), vec!["Test Sans"]);
}

#[tokio::test]
async fn test_report_lists_import_and_update_tables() {
    let fixture = Fixture::new(SHEET);
    fixture.publish_all();
    let source = fixture.source(record());
    source.update(false).await.unwrap();

    let reports = fixture.reporter.reports.lock();
    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report.report_type, "source");
    assert_eq!(report.method, "update");

    let import = &report.data["tables"][0];
    assert_eq!(import["caption"], "CSV Data Import");
    let rows = import["rows"].as_array().unwrap();
    assert!(rows.iter().any(|row| row[0] == "Archived Sans" && row[1] == "skipped"));
    assert!(rows.iter().any(|row| row[0] == "Zip Font" && row[1] == "warning"));

    let updates = &report.data["tables"][1];
    let rows = updates["rows"].as_array().unwrap();
    assert!(rows.iter().any(|row| row[0] == "Test Sans" && row[2] == "feature branch entry wip"));
    assert!(rows.iter().any(|row| row[0] == "Beta Serif" && row[1] == "dispatched"));
}

#[tokio::test]
async fn test_list_get_and_details() {
    let fixture = Fixture::new(SHEET);
    fixture.publish_all();
    let source = fixture.source(record());

    assert_eq!(
        source.list().await.unwrap(),
        vec!["Beta Serif", "Test Sans", "Test Sans:wip", "Zip Font"]
    );

    let family = source.get("Test Sans").await.unwrap();
    assert_eq!(family.font_count(), 2);
    assert!(fixture.dispatcher.names().is_empty());

    let err = source.get("Zip Font").await.unwrap_err();
    assert!(matches!(err, SourceError::Validation(_)));
    assert!(source.get("Nope").await.unwrap_err().is_not_found());

    let details = source.source_details("Beta Serif").await.unwrap();
    assert_eq!(details["upstream"], BETA_URL);
    assert_eq!(details["branch"], "main");
}

#[tokio::test]
async fn test_list_uses_cached_sheet() {
    let fixture = Fixture::new(SHEET);
    let source = fixture.source(record());
    assert_eq!(source.list().await.unwrap().len(), 4);

    rewrite(&fixture.sheet, "Status,family,family name is confirmed as good?,upstream,fontfiles prefix,genre\n");
    assert_eq!(source.list().await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_missing_sheet_fails_update() {
    let fixture = Fixture::new(SHEET);
    let config = CsvSourceConfig::builder()
        .sheet_url("file:///nonexistent/fontwatch/sheet.csv")
        .build()
        .unwrap();
    let source = CsvSource::new(
        record(),
        config,
        memory_pool(&fixture.repo),
        Arc::clone(&fixture.dispatcher) as Arc<dyn FamilyDispatcher>,
    );

    let err = source.update(false).await.unwrap_err();
    assert!(matches!(err, SourceError::Validation(_)));
}

struct StubMetadata;

#[async_trait]
impl MetadataGenerator for StubMetadata {
    async fn generate(&self, files: &[FamilyFile], license_dir: LicenseDir, is_update: bool) -> Result<Vec<u8>, MetadataError> {
        let fonts = files.iter().filter(|f| f.is_font_binary()).count();
        Ok(format!(
            "name: \"Testsans\"\nlicense: \"{}\"\ncategory: \"DISPLAY\"\n# fonts: {fonts} update: {is_update}\n",
            license_dir.as_str().to_uppercase()
        )
        .into_bytes())
    }
}

#[tokio::test]
async fn test_metadata_generated_with_row_overrides() {
    let fixture = Fixture::new(SHEET);
    fixture.publish_all();
    let source = fixture
        .source(record().with_whitelist(["Test Sans"]))
        .with_metadata_generator(Arc::new(StubMetadata));

    source.update(false).await.unwrap();
    let test_sans = fixture.dispatcher.family("Test Sans");
    let metadata = String::from_utf8(test_sans.file("METADATA.pb").unwrap().data.clone()).unwrap();
    assert_eq!(
        metadata,
        "designer: \"Jane Doe\"\nname: \"Test Sans\"\nlicense: \"OFL\"\ncategory: \"SANS_SERIF\"\n# fonts: 2 update: false\n"
    );
}
