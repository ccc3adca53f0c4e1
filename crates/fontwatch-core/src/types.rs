//! Domain types shared by every fontwatch crate.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// License directory a family ships under.
///
/// The directory names double as the top-level roots of a font catalog
/// repository, which is why tree walking code matches on them.
///
/// # Example
///
/// ```
/// use fontwatch_core::LicenseDir;
///
/// assert_eq!(LicenseDir::Ofl.as_str(), "ofl");
/// assert_eq!("apache".parse::<LicenseDir>().unwrap(), LicenseDir::Apache);
/// assert_eq!(LicenseDir::from_license_file("UFL.txt"), Some(LicenseDir::Ufl));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseDir {
    /// SIL Open Font License.
    #[default]
    Ofl,
    /// Apache License 2.0.
    Apache,
    /// Ubuntu Font License.
    Ufl,
}

impl LicenseDir {
    /// Every known license root.
    pub const ALL: [LicenseDir; 3] = [LicenseDir::Ofl, LicenseDir::Apache, LicenseDir::Ufl];

    /// License file names in lookup priority order.
    pub const LICENSE_FILES: [&'static str; 3] = ["UFL.txt", "OFL.txt", "LICENSE.txt"];

    /// Returns the directory name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ofl => "ofl",
            Self::Apache => "apache",
            Self::Ufl => "ufl",
        }
    }

    /// Maps a license file name to the directory it implies.
    pub fn from_license_file(file_name: &str) -> Option<Self> {
        match file_name {
            "UFL.txt" => Some(Self::Ufl),
            "OFL.txt" => Some(Self::Ofl),
            "LICENSE.txt" => Some(Self::Apache),
            _ => None,
        }
    }

    /// Returns true if `segment` names a license root.
    pub fn is_root(segment: &str) -> bool {
        segment.parse::<Self>().is_ok()
    }
}

impl fmt::Display for LicenseDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LicenseDir {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ofl" => Ok(Self::Ofl),
            "apache" => Ok(Self::Apache),
            "ufl" => Ok(Self::Ufl),
            other => Err(format!("unknown license directory '{other}'")),
        }
    }
}

/// One file of a family bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilyFile {
    /// File name relative to the family directory.
    pub name: String,
    /// Raw file contents.
    pub data: Vec<u8>,
}

impl FamilyFile {
    /// Creates a new file entry.
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }

    /// Returns true for font binaries (`.ttf`, `.otf`).
    pub fn is_font_binary(&self) -> bool {
        is_font_binary(&self.name)
    }
}

/// Returns true if the file name denotes a font binary.
pub fn is_font_binary(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".ttf") || lower.ends_with(".otf")
}

/// Structured metadata attached to a detected family change.
///
/// Serialized as camelCase JSON; optional fields are omitted when unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FamilyMetadata {
    /// Commit id the family was read from.
    pub commit: String,
    /// Commit timestamp.
    pub commit_date: DateTime<Utc>,
    /// Remote URL of the repository.
    pub repository: String,
    /// Branch or reference name.
    pub branch: String,
    /// True when the family already exists in the reference catalog.
    pub is_update: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_tree: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_directory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_details: Option<serde_json::Value>,
}

impl FamilyMetadata {
    /// Creates metadata with the mandatory fields set.
    pub fn new(
        commit: impl Into<String>,
        commit_date: DateTime<Utc>,
        repository: impl Into<String>,
        branch: impl Into<String>,
    ) -> Self {
        Self {
            commit: commit.into(),
            commit_date,
            repository: repository.into(),
            branch: branch.into(),
            is_update: false,
            pr_url: None,
            family_tree: None,
            family_path: None,
            target_directory: None,
            source_details: None,
        }
    }

    pub fn with_update(mut self, is_update: bool) -> Self {
        self.is_update = is_update;
        self
    }

    pub fn with_pr_url(mut self, url: impl Into<String>) -> Self {
        self.pr_url = Some(url.into());
        self
    }

    /// Records the tree id and path the family was materialized from.
    pub fn with_tree(mut self, tree: impl Into<String>, path: impl Into<String>) -> Self {
        self.family_tree = Some(tree.into());
        self.family_path = Some(path.into());
        self
    }

    pub fn with_target_directory(mut self, dir: impl Into<String>) -> Self {
        self.target_directory = Some(dir.into());
        self
    }

    pub fn with_source_details(mut self, details: serde_json::Value) -> Self {
        self.source_details = Some(details);
        self
    }
}

/// One detected family change, ready for dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FamilyDescriptor {
    pub family_name: String,
    pub files: Vec<FamilyFile>,
    pub license_dir: LicenseDir,
    pub metadata: FamilyMetadata,
}

impl FamilyDescriptor {
    /// Creates a descriptor.
    pub fn new(
        family_name: impl Into<String>,
        files: Vec<FamilyFile>,
        license_dir: LicenseDir,
        metadata: FamilyMetadata,
    ) -> Self {
        Self {
            family_name: family_name.into(),
            files,
            license_dir,
            metadata,
        }
    }

    /// Returns the files ordered by name.
    pub fn sorted_files(&self) -> Vec<&FamilyFile> {
        let mut files: Vec<&FamilyFile> = self.files.iter().collect();
        files.sort_by(|a, b| a.name.cmp(&b.name));
        files
    }

    /// Looks up a file by name.
    pub fn file(&self, name: &str) -> Option<&FamilyFile> {
        self.files.iter().find(|f| f.name == name)
    }

    /// Number of font binaries in the bundle.
    pub fn font_count(&self) -> usize {
        self.files.iter().filter(|f| f.is_font_binary()).count()
    }
}

/// How a source discovers families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceMode {
    /// Watch one branch and diff successive commits.
    GitBranch,
    /// Watch the open pull requests against a base branch.
    GitPrs,
    /// A CSV catalog of upstream repositories.
    Csv,
    /// A vendor web-fonts API.
    Api,
}

impl fmt::Display for SourceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::GitBranch => "git-branch",
            Self::GitPrs => "git-prs",
            Self::Csv => "csv",
            Self::Api => "api",
        };
        f.write_str(s)
    }
}

/// A configured family catalog.
///
/// # Example
///
/// ```
/// use fontwatch_core::{SourceMode, SourceRecord};
///
/// let record = SourceRecord::new("upstream", SourceMode::Csv)
///     .with_whitelist(["Test Sans"]);
/// assert!(record.allows("Test Sans"));
/// assert!(!record.allows("Other Serif"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub id: String,
    pub mode: SourceMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whitelist: Option<Vec<String>>,
}

impl SourceRecord {
    pub fn new(id: impl Into<String>, mode: SourceMode) -> Self {
        Self {
            id: id.into(),
            mode,
            whitelist: None,
        }
    }

    pub fn with_whitelist<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.whitelist = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Returns true if the family passes the whitelist (always, without one).
    pub fn allows(&self, family_name: &str) -> bool {
        match &self.whitelist {
            Some(names) => names.iter().any(|n| n == family_name),
            None => true,
        }
    }
}

/// Content address of a cached family bundle (hex sha256).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for CacheKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Durable job message referencing a cached bundle.
///
/// Delivery is at-least-once; consumers deduplicate on
/// `(family_name, metadata.commit)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchJob {
    pub collection_id: String,
    pub family_name: String,
    pub cache_key: CacheKey,
    pub timestamp: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

impl DispatchJob {
    /// Builds the collection id `<serverId>/<sourceId>`.
    pub fn collection_id(server_id: &str, source_id: &str) -> String {
        format!("{server_id}/{source_id}")
    }

    /// Returns the commit the job was detected at, if recorded.
    pub fn commit(&self) -> Option<&str> {
        self.metadata.get("commit").and_then(|c| c.as_str())
    }
}
