//! Repository name normalization, keying and personal-namespace rules.

use crate::error::{CatalogError, Result};
use std::cmp::Ordering;

/// Suffix conventionally carried by bare repository names.
pub const DOT_GIT: &str = ".git";

/// Fixes illegal character patterns in a requested repository name.
///
/// Decodes url-encoded `~` and `/`, turns backslashes into slashes, drops
/// leading, trailing and duplicate slashes. Case is preserved.
pub fn fix_name(name: &str) -> String {
    let decoded = name
        .replace("%7E", "~")
        .replace("%7e", "~")
        .replace("%2F", "/")
        .replace("%2f", "/")
        .replace('\\', "/");

    let mut fixed = String::with_capacity(decoded.len());
    // Treat the start as a slash so leading slashes are dropped too.
    let mut last = '/';
    for c in decoded.chars() {
        if c == '/' && last == '/' {
            continue;
        }
        fixed.push(c);
        last = c;
    }
    while fixed.ends_with('/') {
        fixed.pop();
    }
    fixed
}

/// Removes a trailing `.git` (any case) from a name.
pub fn strip_dot_git(name: &str) -> &str {
    let Some(split) = name.len().checked_sub(DOT_GIT.len()) else {
        return name;
    };
    match (name.get(..split), name.get(split..)) {
        (Some(stem), Some(suffix)) if suffix.eq_ignore_ascii_case(DOT_GIT) => stem,
        _ => name,
    }
}

/// Returns the case-insensitive cache key for a repository name.
///
/// The key is idempotent: `repository_key(&repository_key(x)) == repository_key(x)`.
pub fn repository_key(name: &str) -> String {
    let mut key = fix_name(name).to_lowercase();
    loop {
        let stripped = strip_dot_git(&key).trim_end_matches('/').to_string();
        if stripped == key {
            return key;
        }
        key = stripped;
    }
}

/// Ensures a name carries the `.git` suffix used for created repositories.
pub fn with_dot_git(name: &str) -> String {
    if name.to_lowercase().ends_with(DOT_GIT) {
        name.to_string()
    } else {
        format!("{}{}", name, DOT_GIT)
    }
}

/// Returns the first path element of a name, or "" for top-level names.
pub fn first_path_element(name: &str) -> &str {
    match name.find('/') {
        Some(idx) => &name[..idx],
        None => "",
    }
}

/// Orders repository names case-insensitively, ignoring the `.git` suffix.
pub fn compare_repository_names(a: &str, b: &str) -> Ordering {
    let ka = strip_dot_git(a).to_lowercase();
    let kb = strip_dot_git(b).to_lowercase();
    ka.cmp(&kb).then_with(|| a.cmp(b))
}

/// Sorts repository names in catalog order.
pub fn sort_repository_names(names: &mut [String]) {
    names.sort_by(|a, b| compare_repository_names(a, b));
}

/// Rejects names that are empty, could escape the repositories folder or
/// carry a doubled `.git` suffix that would share a key with another name.
pub fn validate_name(name: &str) -> Result<()> {
    let fixed = fix_name(name);
    let stem = strip_dot_git(&fixed);
    if fixed.is_empty() || stem.is_empty() || strip_dot_git(stem) != stem {
        return Err(CatalogError::InvalidName(name.to_string()));
    }
    if fixed.split('/').any(|part| part == ".." || part == ".") || fixed.contains(':') {
        return Err(CatalogError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Personal repository namespace rules.
///
/// Built once from settings and passed by reference to everything that needs
/// to tell personal repositories apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonalNamespace {
    prefix: String,
}

impl PersonalNamespace {
    /// Default project prefix for personal repositories.
    pub const DEFAULT_PREFIX: &'static str = "~";

    /// Creates the namespace from a configured prefix.
    pub fn new(prefix: &str) -> Self {
        let mut prefix = prefix.replace('\\', "/");
        while prefix.starts_with('/') {
            prefix.remove(0);
        }
        if prefix.is_empty() {
            prefix = Self::DEFAULT_PREFIX.to_string();
        }
        Self { prefix }
    }

    /// Returns the active prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Project path holding a user's personal repositories, e.g. `~alice`.
    pub fn personal_path(&self, username: &str) -> String {
        format!("{}{}", self.prefix, username.to_lowercase())
    }

    /// True if the project path is any user's personal project.
    pub fn is_personal(&self, project_path: &str) -> bool {
        !project_path.is_empty() && project_path.starts_with(&self.prefix)
    }

    /// True if the project path is this user's personal project.
    pub fn is_users_personal(&self, username: &str, project_path: &str) -> bool {
        !username.is_empty()
            && !project_path.is_empty()
            && project_path.eq_ignore_ascii_case(&self.personal_path(username))
    }

    /// Extracts the username from a personal project path, or "".
    pub fn username_from_path<'a>(&self, project_path: &'a str) -> &'a str {
        if self.is_personal(project_path) {
            &project_path[self.prefix.len()..]
        } else {
            ""
        }
    }
}

impl Default for PersonalNamespace {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PREFIX)
    }
}
