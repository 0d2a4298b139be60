//! Fork relationships between repositories.
//!
//! Records only point upward (`origin_repository`) and downward (`forks`)
//! by name. The functions here walk those pointers over any [`RecordSource`]
//! and build ephemeral trees; nothing is persisted.

use crate::names::{repository_key, PersonalNamespace};
use crate::record::RepositoryRecord;
use serde::Serialize;
use std::collections::HashSet;
use tracing::warn;

/// Read access to records by name.
pub trait RecordSource {
    fn record(&self, name: &str) -> Option<RepositoryRecord>;
    /// Every known repository name, in catalog order.
    fn names(&self) -> Vec<String>;
}

/// One repository in a fork network and the forks made from it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForkNode {
    pub record: RepositoryRecord,
    pub forks: Vec<ForkNode>,
}

impl ForkNode {
    pub fn is_root(&self) -> bool {
        !self.record.is_fork()
    }

    pub fn is_leaf(&self) -> bool {
        self.forks.is_empty()
    }

    pub fn is_node(&self) -> bool {
        !self.is_root() && !self.is_leaf()
    }

    /// Names of every repository in this subtree, depth first.
    pub fn names(&self) -> Vec<String> {
        let mut names = vec![self.record.name.clone()];
        for fork in &self.forks {
            names.extend(fork.names());
        }
        names
    }

    /// Number of repositories in this subtree.
    pub fn count(&self) -> usize {
        1 + self.forks.iter().map(ForkNode::count).sum::<usize>()
    }
}

/// Name of the user's fork within the network of `origin`, if any.
///
/// Any fork in the user's personal project whose origin is `origin`, one of
/// its ancestors, or one of their forks outside the user's project counts.
pub fn fork_of(
    source: &dyn RecordSource,
    username: &str,
    origin: &str,
    ns: &PersonalNamespace,
) -> Option<String> {
    if username.is_empty() {
        return None;
    }
    let user_path = format!("{}/", ns.personal_path(username)).to_lowercase();

    let mut roots = HashSet::new();
    roots.insert(repository_key(origin));
    let mut visited = HashSet::new();
    let mut current = source.record(origin);
    while let Some(record) = current {
        if !visited.insert(repository_key(&record.name)) {
            warn!(repository = %record.name, "fork cycle detected");
            break;
        }
        for fork in &record.forks {
            if !fork.to_lowercase().starts_with(&user_path) {
                roots.insert(repository_key(fork));
            }
        }
        current = match record.origin_repository.as_deref().filter(|o| !o.is_empty()) {
            Some(parent) => {
                roots.insert(repository_key(parent));
                source.record(parent)
            }
            None => None,
        };
    }

    source
        .names()
        .into_iter()
        .filter(|name| name.to_lowercase().starts_with(&user_path))
        .filter_map(|name| source.record(&name))
        .find(|record| {
            record
                .origin_repository
                .as_deref()
                .map(|o| !o.is_empty() && roots.contains(&repository_key(o)))
                .unwrap_or(false)
        })
        .map(|record| record.name)
}

/// True if the user already forked something in the network of `origin`.
pub fn has_fork(
    source: &dyn RecordSource,
    username: &str,
    origin: &str,
    ns: &PersonalNamespace,
) -> bool {
    fork_of(source, username, origin, ns).is_some()
}

/// The whole fork network containing `name`, rooted at its top ancestor.
///
/// Returns `None` if `name` or one of its ancestors does not resolve.
pub fn network(source: &dyn RecordSource, name: &str) -> Option<ForkNode> {
    let mut record = source.record(name)?;
    let mut visited = HashSet::new();
    visited.insert(repository_key(&record.name));
    while let Some(parent) = record.origin_repository.clone().filter(|o| !o.is_empty()) {
        if !visited.insert(repository_key(&parent)) {
            warn!(repository = %record.name, origin = %parent, "fork cycle detected");
            break;
        }
        record = source.record(&parent)?;
    }

    let mut seen = HashSet::new();
    Some(build_node(source, record, &mut seen))
}

fn build_node(
    source: &dyn RecordSource,
    record: RepositoryRecord,
    seen: &mut HashSet<String>,
) -> ForkNode {
    seen.insert(repository_key(&record.name));
    let mut forks = Vec::new();
    for fork in &record.forks {
        if seen.contains(&repository_key(fork)) {
            warn!(repository = %record.name, fork = %fork, "fork cycle detected");
            continue;
        }
        if let Some(child) = source.record(fork) {
            forks.push(build_node(source, child, seen));
        }
    }
    ForkNode { record, forks }
}
