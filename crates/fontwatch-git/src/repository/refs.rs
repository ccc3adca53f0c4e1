//! Remote reference types.

use std::fmt;

use crate::error::GitError;

/// A reference fetched from a remote.
///
/// Each remote reference is mirrored under `refs/remotes/<remote>/...`
/// in the local repository, so fetches of different remotes never touch
/// each other's refs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RemoteRef {
    /// A branch reference (e.g., "main").
    Branch(String),

    /// The head of a pull request.
    PullRequest(u64),
}

impl RemoteRef {
    /// Creates a branch reference.
    pub fn branch(name: impl Into<String>) -> Self {
        Self::Branch(name.into())
    }

    /// Parses a reference name.
    ///
    /// - `refs/pull/<n>/head` or `pull/<n>` → PullRequest
    /// - `refs/heads/<name>` or anything else → Branch
    pub fn parse(label: &str) -> Self {
        let label = label.trim();

        let pull = label
            .strip_prefix("refs/pull/")
            .and_then(|rest| rest.strip_suffix("/head"))
            .or_else(|| label.strip_prefix("pull/"));
        if let Some(number) = pull.and_then(|n| n.parse().ok()) {
            return Self::PullRequest(number);
        }

        if let Some(branch_name) = label.strip_prefix("refs/heads/") {
            return Self::Branch(branch_name.to_string());
        }

        Self::Branch(label.to_string())
    }

    /// The reference path at the remote.
    pub fn remote_ref(&self) -> String {
        match self {
            Self::Branch(name) => format!("refs/heads/{name}"),
            Self::PullRequest(number) => format!("refs/pull/{number}/head"),
        }
    }

    /// The local mirror of this reference for `remote_name`.
    pub fn local_ref(&self, remote_name: &str) -> String {
        match self {
            Self::Branch(name) => format!("refs/remotes/{remote_name}/{name}"),
            Self::PullRequest(number) => format!("refs/remotes/{remote_name}/pull/{number}"),
        }
    }

    /// Forced fetch refspec mapping the remote reference onto its mirror.
    pub fn fetch_refspec(&self, remote_name: &str) -> String {
        format!("+{}:{}", self.remote_ref(), self.local_ref(remote_name))
    }

    /// Validates the reference name.
    pub fn validate(&self) -> Result<(), GitError> {
        let Self::Branch(name) = self else {
            return Ok(());
        };
        validate_name(name).map_err(|reason| GitError::InvalidReference {
            name: name.clone(),
            reason,
        })
    }
}

/// Checks a branch or remote name against the git ref-name rules fontwatch
/// relies on.
pub fn validate_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("reference name cannot be empty");
    }

    if name.starts_with('/') || name.ends_with('/') {
        return Err("reference name cannot start or end with '/'");
    }

    if name.contains("..") {
        return Err("reference name cannot contain '..'");
    }

    if name.contains("//") {
        return Err("reference name cannot contain '//'");
    }

    if name
        .chars()
        .any(|c| c.is_control() || matches!(c, ' ' | '~' | '^' | ':' | '?' | '*' | '[' | '\\'))
    {
        return Err("reference name contains invalid characters");
    }

    Ok(())
}

impl fmt::Display for RemoteRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Branch(name) => write!(f, "{name}"),
            Self::PullRequest(number) => write!(f, "pull/{number}"),
        }
    }
}

impl From<&str> for RemoteRef {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}
