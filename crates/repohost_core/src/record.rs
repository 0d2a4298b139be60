//! In-memory representation of one hosted repository.

use crate::names::{first_path_element, strip_dot_git, PersonalNamespace};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// How much of a repository is closed to anonymous users.
///
/// Ordered from least to most restrictive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessRestriction {
    /// Anonymous view, clone and push.
    None,
    /// Anonymous view and clone.
    Push,
    /// Anonymous view.
    Clone,
    /// Authenticated access only.
    View,
}

impl AccessRestriction {
    /// Parses a persisted name, falling back to `default`.
    pub fn from_name(name: &str, default: Self) -> Self {
        match name.trim().to_uppercase().as_str() {
            "NONE" => Self::None,
            "PUSH" => Self::Push,
            "CLONE" => Self::Clone,
            "VIEW" => Self::View,
            _ => default,
        }
    }

    /// Persisted name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Push => "PUSH",
            Self::Clone => "CLONE",
            Self::View => "VIEW",
        }
    }

    /// True if this restriction is at least as strict as `other`.
    pub fn at_least(&self, other: Self) -> bool {
        *self >= other
    }
}

/// Who is granted access to a restricted repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthorizationControl {
    /// Only explicitly named users and teams.
    Named,
    /// Every authenticated user.
    Authenticated,
}

impl AuthorizationControl {
    /// Parses a persisted name, falling back to `default`.
    pub fn from_name(name: &str, default: Self) -> Self {
        match name.trim().to_uppercase().as_str() {
            "NAMED" => Self::Named,
            "AUTHENTICATED" => Self::Authenticated,
            _ => default,
        }
    }

    /// Persisted name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Named => "NAMED",
            Self::Authenticated => "AUTHENTICATED",
        }
    }
}

/// Merge policy for ticket patchsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MergeType {
    /// Always create a merge commit.
    #[default]
    MergeAlways,
    /// Fast-forward when possible.
    MergeIfNecessary,
    /// Refuse anything but fast-forwards.
    FastForwardOnly,
}

impl MergeType {
    /// Parses a persisted name, falling back to `default`.
    pub fn from_name(name: &str, default: Self) -> Self {
        match name.trim().to_uppercase().as_str() {
            "MERGE_ALWAYS" => Self::MergeAlways,
            "MERGE_IF_NECESSARY" => Self::MergeIfNecessary,
            "FAST_FORWARD_ONLY" => Self::FastForwardOnly,
            _ => default,
        }
    }

    /// Persisted name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::MergeAlways => "MERGE_ALWAYS",
            Self::MergeIfNecessary => "MERGE_IF_NECESSARY",
            Self::FastForwardOnly => "FAST_FORWARD_ONLY",
        }
    }
}

/// Cached configuration and derived state of one repository.
///
/// Values handed out by the catalog are always independent clones, so
/// mutating a record never affects the catalog or other callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryRecord {
    /// Display name relative to the repositories folder, `.git` retained.
    pub name: String,
    pub description: String,
    /// Lower-cased, unique, in insertion order.
    pub owners: Vec<String>,
    pub last_change: DateTime<Utc>,
    pub last_change_author: Option<String>,
    pub has_commits: bool,
    pub is_bare: bool,
    pub is_mirror: bool,
    /// URL of the `origin` remote, if any.
    pub origin: Option<String>,
    pub access_restriction: AccessRestriction,
    pub authorization_control: AuthorizationControl,
    /// Names of repositories forked from this one.
    pub forks: BTreeSet<String>,
    /// Name of the repository this one was forked from.
    pub origin_repository: Option<String>,
    pub gc_threshold: String,
    /// Days between garbage collections.
    pub gc_period: i64,
    pub last_gc: DateTime<Utc>,
    pub merge_to: Option<String>,
    pub merge_type: MergeType,
    pub accept_new_tickets: bool,
    pub accept_new_patchsets: bool,
    pub require_approval: bool,
    pub use_incremental_push_tags: bool,
    pub incremental_push_tag_prefix: Option<String>,
    pub allow_forks: bool,
    pub verify_committer: bool,
    pub show_remote_branches: bool,
    pub is_frozen: bool,
    pub skip_size_calculation: bool,
    pub skip_summary_metrics: bool,
    pub max_activity_commits: i32,
    /// Symbolic target of HEAD, e.g. `refs/heads/main`.
    pub head: Option<String>,
    /// First path element of the name; "" for top-level repositories.
    pub project_path: String,
    /// Formatted on-disk size, present only when sizes are shown.
    pub size: Option<String>,
    pub custom_fields: BTreeMap<String, String>,
    pub pre_receive_scripts: Vec<String>,
    pub post_receive_scripts: Vec<String>,
    pub mailing_lists: Vec<String>,
    pub indexed_branches: Vec<String>,
    pub metric_author_exclusions: Vec<String>,
    /// Set on copies handed out while the garbage collector owns the repository.
    #[serde(skip)]
    pub is_collecting_garbage: bool,
}

impl RepositoryRecord {
    /// Creates a record with default settings for `name`.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: String::new(),
            owners: Vec::new(),
            last_change: DateTime::<Utc>::UNIX_EPOCH,
            last_change_author: None,
            has_commits: false,
            is_bare: true,
            is_mirror: false,
            origin: None,
            access_restriction: AccessRestriction::None,
            authorization_control: AuthorizationControl::Named,
            forks: BTreeSet::new(),
            origin_repository: None,
            gc_threshold: "500KB".to_string(),
            gc_period: 7,
            last_gc: DateTime::<Utc>::UNIX_EPOCH,
            merge_to: None,
            merge_type: MergeType::default(),
            accept_new_tickets: true,
            accept_new_patchsets: true,
            require_approval: false,
            use_incremental_push_tags: false,
            incremental_push_tag_prefix: None,
            allow_forks: true,
            verify_committer: false,
            show_remote_branches: false,
            is_frozen: false,
            skip_size_calculation: false,
            skip_summary_metrics: false,
            max_activity_commits: 0,
            head: None,
            project_path: first_path_element(name).to_string(),
            size: None,
            custom_fields: BTreeMap::new(),
            pre_receive_scripts: Vec::new(),
            post_receive_scripts: Vec::new(),
            mailing_lists: Vec::new(),
            indexed_branches: Vec::new(),
            metric_author_exclusions: Vec::new(),
            is_collecting_garbage: false,
        }
    }

    /// Changes the name and recomputes the project path.
    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
        self.project_path = first_path_element(name).to_string();
    }

    /// Name without the `.git` suffix.
    pub fn display_name(&self) -> &str {
        strip_dot_git(&self.name)
    }

    pub fn add_fork(&mut self, name: &str) {
        self.forks.insert(name.to_string());
    }

    pub fn remove_fork(&mut self, name: &str) -> bool {
        self.forks.remove(name)
    }

    /// True if this repository was forked from another.
    pub fn is_fork(&self) -> bool {
        self.origin_repository
            .as_deref()
            .map(|o| !o.is_empty())
            .unwrap_or(false)
    }

    /// Adds an owner, lower-cased, ignoring duplicates and blanks.
    pub fn add_owner(&mut self, username: &str) {
        let name = username.trim().to_lowercase();
        if !name.is_empty() && !self.owners.contains(&name) {
            self.owners.push(name);
        }
    }

    pub fn add_owners<'a>(&mut self, usernames: impl IntoIterator<Item = &'a str>) {
        for username in usernames {
            self.add_owner(username);
        }
    }

    pub fn remove_owner(&mut self, username: &str) {
        let name = username.to_lowercase();
        self.owners.retain(|o| *o != name);
    }

    /// True if the user is a listed owner or this is their personal repository.
    pub fn is_owner(&self, username: &str, ns: &PersonalNamespace) -> bool {
        if username.is_empty() {
            return false;
        }
        self.owners.contains(&username.to_lowercase()) || self.is_users_personal(username, ns)
    }

    /// True if the repository lives in any user's personal project.
    pub fn is_personal(&self, ns: &PersonalNamespace) -> bool {
        ns.is_personal(&self.project_path)
    }

    /// True if the repository lives in this user's personal project.
    pub fn is_users_personal(&self, username: &str, ns: &PersonalNamespace) -> bool {
        ns.is_users_personal(username, &self.project_path)
    }

    /// True if anonymous users may see the repository.
    pub fn allow_anonymous_view(&self) -> bool {
        !self.access_restriction.at_least(AccessRestriction::View)
    }

    /// Template for a fork of this repository named `clone_name`.
    pub fn clone_as(&self, clone_name: &str) -> RepositoryRecord {
        let mut clone = RepositoryRecord::new(clone_name);
        clone.origin_repository = Some(self.name.clone());
        clone.description = self.description.clone();
        clone.access_restriction = AccessRestriction::Push;
        clone.authorization_control = AuthorizationControl::Named;
        clone.show_remote_branches = false;
        clone.allow_forks = false;
        clone.accept_new_patchsets = false;
        clone.accept_new_tickets = false;
        clone.skip_size_calculation = self.skip_size_calculation;
        clone.skip_summary_metrics = self.skip_summary_metrics;
        clone
    }
}

impl fmt::Display for RepositoryRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}
