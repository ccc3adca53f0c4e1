//! Turns a family directory in a commit into a file bundle.

use std::collections::BTreeMap;

use fontwatch_core::{FamilyFile, LicenseDir, is_font_binary};

use crate::diff::tree_at_path;
use crate::error::GitError;
use crate::naming::family_dir_name;
use crate::repository::{GitRepository, Oid};

/// Description file picked up next to license files when searching parents.
pub const DESCRIPTION_FILE: &str = "DESCRIPTION.en_us.html";

/// A tree and the path it was found at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FamilyTree {
    pub id: Oid,
    pub path: String,
}

impl FamilyTree {
    pub fn new(id: Oid, path: impl Into<String>) -> Self {
        Self {
            id,
            path: path.into(),
        }
    }

    /// License root the path lives under, if any.
    pub fn license_root(&self) -> Option<LicenseDir> {
        self.path.split('/').next()?.parse().ok()
    }
}

/// What to collect for one family.
#[derive(Debug, Clone)]
pub struct FamilyRequest {
    /// Directory holding the candidate font binaries.
    pub candidate: FamilyTree,
    /// Root tree of the candidate commit.
    pub root: Oid,
    /// Only binaries whose file name starts with this are taken.
    pub prefix: Option<String>,
    /// Same family in a reference catalog; its non-binary files are kept.
    pub reference: Option<FamilyTree>,
    /// Keep non-binary files of the candidate directory too.
    pub candidate_ancillary: bool,
    /// Look for license and description files in the candidate's parents.
    pub search_parents: bool,
}

impl FamilyRequest {
    /// A catalog family directory: everything in it is taken as-is.
    pub fn catalog(candidate: FamilyTree, root: Oid) -> Self {
        Self {
            candidate,
            root,
            prefix: None,
            reference: None,
            candidate_ancillary: true,
            search_parents: false,
        }
    }

    /// An upstream repository: prefixed binaries only, license files from
    /// anywhere up the path, ancillary files from the reference family.
    pub fn upstream(candidate: FamilyTree, root: Oid, prefix: Option<String>, reference: Option<FamilyTree>) -> Self {
        Self {
            candidate,
            root,
            prefix,
            reference,
            candidate_ancillary: false,
            search_parents: true,
        }
    }
}

/// The collected file set of one family.
#[derive(Debug, Clone)]
pub struct MaterializedFamily {
    pub files: Vec<FamilyFile>,
    pub license_dir: LicenseDir,
    /// Where the family already lives in the reference catalog.
    pub reference_path: Option<String>,
    pub candidate: FamilyTree,
}

impl MaterializedFamily {
    /// Directory the family belongs to in the catalog.
    pub fn target_directory(&self, family_name: &str) -> String {
        if let Some(path) = &self.reference_path {
            return path.clone();
        }
        if self.candidate.license_root().is_some() {
            return self.candidate.path.clone();
        }
        format!("{}/{}", self.license_dir, family_dir_name(family_name))
    }

    pub fn is_update(&self) -> bool {
        self.reference_path.is_some()
    }

    /// Layers this family over files read from a reference catalog that
    /// lives in another repository.
    ///
    /// Same-named files of this family win. The reference's license root
    /// replaces the detected license directory.
    pub fn with_reference(mut self, reference: &FamilyTree, reference_files: Vec<FamilyFile>) -> Self {
        let mut files: BTreeMap<String, Vec<u8>> = reference_files
            .into_iter()
            .filter(|f| !f.is_font_binary())
            .map(|f| (f.name, f.data))
            .collect();
        for file in self.files {
            files.insert(file.name, file.data);
        }

        self.files = files
            .into_iter()
            .map(|(name, data)| FamilyFile::new(name, data))
            .collect();
        if let Some(root) = reference.license_root() {
            self.license_dir = root;
        }
        self.reference_path = Some(reference.path.clone());
        self
    }
}

/// Direct blob children of a tree, filtered by name.
pub fn tree_files<F>(repo: &dyn GitRepository, tree: &Oid, filter: F) -> Result<Vec<FamilyFile>, GitError>
where
    F: Fn(&str) -> bool,
{
    let mut files = Vec::new();
    for entry in repo.tree(tree)? {
        if entry.is_blob() && filter(&entry.name) {
            files.push(FamilyFile::new(entry.name, repo.blob(&entry.id)?));
        }
    }
    Ok(files)
}

/// Collects binaries, ancillary files and the license for a family.
///
/// Later sources override earlier ones by file name: reference ancillary
/// files first, then the candidate directory, then parent license files.
pub fn materialize(repo: &dyn GitRepository, request: &FamilyRequest) -> Result<MaterializedFamily, GitError> {
    let mut files: BTreeMap<String, Vec<u8>> = BTreeMap::new();

    if let Some(reference) = &request.reference {
        for file in tree_files(repo, &reference.id, |name| !is_font_binary(name))? {
            files.insert(file.name, file.data);
        }
    }

    let prefix = request.prefix.as_deref().unwrap_or("");
    let candidate = tree_files(repo, &request.candidate.id, |name| {
        if is_font_binary(name) {
            name.starts_with(prefix)
        } else {
            request.candidate_ancillary
        }
    })?;
    if !candidate.iter().any(FamilyFile::is_font_binary) {
        return Err(GitError::EmptyFamily {
            path: format!("{}/{}", request.candidate.path, prefix),
        });
    }
    for file in candidate {
        files.insert(file.name, file.data);
    }

    if request.search_parents {
        for file in parent_license_files(repo, &request.root, &request.candidate.path)? {
            files.insert(file.name, file.data);
        }
    }

    let license_dir = request
        .reference
        .as_ref()
        .and_then(FamilyTree::license_root)
        .or_else(|| request.candidate.license_root())
        .or_else(|| {
            LicenseDir::LICENSE_FILES
                .iter()
                .find(|name| files.contains_key(**name))
                .and_then(|name| LicenseDir::from_license_file(name))
        })
        .unwrap_or_default();

    Ok(MaterializedFamily {
        files: files
            .into_iter()
            .map(|(name, data)| FamilyFile::new(name, data))
            .collect(),
        license_dir,
        reference_path: request.reference.as_ref().map(|r| r.path.clone()),
        candidate: request.candidate.clone(),
    })
}

/// License and description files from `path` and each of its parents.
///
/// The most specific directory wins when a name occurs more than once.
fn parent_license_files(repo: &dyn GitRepository, root: &Oid, path: &str) -> Result<Vec<FamilyFile>, GitError> {
    let wanted = |name: &str| LicenseDir::LICENSE_FILES.contains(&name) || name == DESCRIPTION_FILE;

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let mut found: Vec<FamilyFile> = Vec::new();

    for depth in (0..=segments.len()).rev() {
        let dir = segments[..depth].join("/");
        let Some(tree) = tree_at_path(repo, root, &dir)? else {
            continue;
        };
        for file in tree_files(repo, &tree, wanted)? {
            if !found.iter().any(|f| f.name == file.name) {
                found.push(file);
            }
        }
    }

    Ok(found)
}

/// Finds a family's directory in a catalog tree by its display name.
pub fn find_catalog_family(repo: &dyn GitRepository, root: &Oid, family_name: &str) -> Result<Option<FamilyTree>, GitError> {
    let dir = family_dir_name(family_name);
    for license in LicenseDir::ALL {
        let path = format!("{license}/{dir}");
        if let Some(id) = tree_at_path(repo, root, &path)? {
            return Ok(Some(FamilyTree::new(id, path)));
        }
    }
    Ok(None)
}
