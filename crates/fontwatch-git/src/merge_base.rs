//! Merge base lookup.

use std::collections::{HashSet, VecDeque};

use crate::error::GitError;
use crate::repository::{GitRepository, Oid};

/// Nearest common ancestor of `a` and `b`.
///
/// Walks both ancestries breadth-first in lockstep and stops at the first
/// commit reached from both sides, so only the history between the tips
/// and their fork point is read. Returns `None` for unrelated histories.
pub fn merge_base(repo: &dyn GitRepository, a: &Oid, b: &Oid) -> Result<Option<Oid>, GitError> {
    if a == b {
        return Ok(Some(a.clone()));
    }

    let mut seen = [HashSet::from([a.clone()]), HashSet::from([b.clone()])];
    let mut frontier = [VecDeque::from([a.clone()]), VecDeque::from([b.clone()])];

    while !frontier[0].is_empty() || !frontier[1].is_empty() {
        for side in 0..2 {
            let other = 1 - side;
            let Some(commit) = frontier[side].pop_front() else {
                continue;
            };
            for parent in repo.commit(&commit)?.parents {
                if seen[other].contains(&parent) {
                    return Ok(Some(parent));
                }
                if seen[side].insert(parent.clone()) {
                    frontier[side].push_back(parent);
                }
            }
        }
    }

    Ok(None)
}
