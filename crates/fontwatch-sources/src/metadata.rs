//! `METADATA.pb` generation through an external tool.
//!
//! The tool is run against a temporary directory holding the family files
//! and writes `METADATA.pb` next to them. The catalog row then overrides
//! the fields the tool can only guess.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use fontwatch_core::{FamilyFile, LicenseDir};
use fontwatch_git::naming::METADATA_FILE;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, warn};

/// Why metadata generation failed.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("metadata tool exited with {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },

    #[error("metadata tool timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("metadata tool did not write METADATA.pb")]
    Missing,
}

/// Produces `METADATA.pb` contents for a family's files.
#[async_trait]
pub trait MetadataGenerator: Send + Sync {
    async fn generate(
        &self,
        files: &[FamilyFile],
        license_dir: LicenseDir,
        is_update: bool,
    ) -> Result<Vec<u8>, MetadataError>;
}

/// Runs `<program> <args...> [--update] <dir>` where `dir` is
/// `<tmp>/<licenseDir>` populated with the family files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataTool {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    #[serde(default = "default_timeout", with = "fontwatch_core::serde_secs")]
    pub timeout: Duration,
}

fn default_timeout() -> Duration {
    Duration::from_secs(120)
}

impl MetadataTool {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            timeout: default_timeout(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

#[async_trait]
impl MetadataGenerator for MetadataTool {
    async fn generate(
        &self,
        files: &[FamilyFile],
        license_dir: LicenseDir,
        is_update: bool,
    ) -> Result<Vec<u8>, MetadataError> {
        let tmp = tempfile::tempdir()?;
        let fonts_dir = tmp.path().join(license_dir.as_str());
        tokio::fs::create_dir(&fonts_dir).await?;
        for file in files {
            tokio::fs::write(fonts_dir.join(&file.name), &file.data).await?;
        }

        let mut command = Command::new(&self.program);
        command.args(&self.args);
        if is_update {
            command.arg("--update");
        }
        command
            .arg(&fonts_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        debug!(program = %self.program.display(), dir = %fonts_dir.display(), "running metadata tool");
        let child = command.spawn()?;
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                return Err(MetadataError::Timeout {
                    seconds: self.timeout.as_secs(),
                });
            },
        };
        if !output.status.success() {
            return Err(MetadataError::Failed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        match tokio::fs::read(fonts_dir.join(METADATA_FILE)).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(MetadataError::Missing),
            Err(e) => Err(e.into()),
        }
    }
}

/// Catalog values forced into the generated metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataOverrides {
    pub name: String,
    pub category: String,
    pub designer: Option<String>,
}

impl MetadataOverrides {
    pub fn new(name: impl Into<String>, genre: &str, designer: Option<String>) -> Self {
        Self {
            name: name.into(),
            category: genre_to_category(genre),
            designer,
        }
    }

    /// Rewrites the family `name`, `category` and `designer` fields and the
    /// `name` of every font entry. Fields the text lacks are appended.
    pub fn apply(&self, text: &str) -> String {
        let mut seen_name = false;
        let mut seen_category = false;
        let mut seen_designer = false;
        let mut lines = Vec::new();

        for line in text.lines() {
            let Some(caps) = field_line().captures(line) else {
                lines.push(line.to_string());
                continue;
            };
            let indent = &caps[1];
            let value = match (&caps[2], indent.is_empty()) {
                ("name", true) => {
                    seen_name = true;
                    Some(self.name.as_str())
                },
                ("name", false) => Some(self.name.as_str()),
                ("category", true) => {
                    seen_category = true;
                    Some(self.category.as_str())
                },
                ("designer", true) => {
                    seen_designer = true;
                    self.designer.as_deref()
                },
                _ => None,
            };
            match value {
                Some(value) => lines.push(format!("{}{}: {}", indent, &caps[2], quote(value))),
                None => lines.push(line.to_string()),
            }
        }

        let mut head = Vec::new();
        if !seen_name {
            head.push(format!("name: {}", quote(&self.name)));
        }
        if let (false, Some(designer)) = (seen_designer, &self.designer) {
            head.push(format!("designer: {}", quote(designer)));
        }
        if !seen_category {
            head.push(format!("category: {}", quote(&self.category)));
        }

        let mut out = head;
        out.extend(lines);
        let mut text = out.join("\n");
        text.push('\n');
        text
    }
}

/// `Sans Serif` → `SANS_SERIF`, `Handwriting` → `HANDWRITING`.
pub fn genre_to_category(genre: &str) -> String {
    genre.trim().to_uppercase().replace([' ', '-'], "_")
}

/// Replaces (or adds) `METADATA.pb` in `files`.
///
/// Any generation failure leaves `files` untouched and is only logged.
pub async fn augment(
    generator: &dyn MetadataGenerator,
    files: Vec<FamilyFile>,
    license_dir: LicenseDir,
    is_update: bool,
    overrides: &MetadataOverrides,
) -> Vec<FamilyFile> {
    let generated = match generator.generate(&files, license_dir, is_update).await {
        Ok(data) => data,
        Err(e) => {
            warn!(family = %overrides.name, error = %e, "can't create {}", METADATA_FILE);
            return files;
        },
    };

    let text = overrides.apply(&String::from_utf8_lossy(&generated));
    let mut files: Vec<FamilyFile> = files.into_iter().filter(|f| f.name != METADATA_FILE).collect();
    files.push(FamilyFile::new(METADATA_FILE, text.into_bytes()));
    files
}

fn field_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"^(\s*)(name|category|designer):\s*"(?:[^"\\]|\\.)*"\s*$"#).expect("valid regex"))
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}
