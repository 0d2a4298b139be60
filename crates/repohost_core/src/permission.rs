//! Access permission levels and registrant permission entries.

use crate::names::compare_repository_names;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Access level, totally ordered from `None` (lowest) to `Rewind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessPermission {
    None,
    Exclude,
    View,
    Clone,
    Push,
    Create,
    Delete,
    Rewind,
}

impl AccessPermission {
    /// Every level in ascending order.
    pub const ALL: [AccessPermission; 8] = [
        Self::None,
        Self::Exclude,
        Self::View,
        Self::Clone,
        Self::Push,
        Self::Create,
        Self::Delete,
        Self::Rewind,
    ];

    /// Short code used in role strings.
    pub fn code(&self) -> &'static str {
        match self {
            Self::None => "N",
            Self::Exclude => "X",
            Self::View => "V",
            Self::Clone => "R",
            Self::Push => "RW",
            Self::Create => "RWC",
            Self::Delete => "RWD",
            Self::Rewind => "RW+",
        }
    }

    /// Parses a short code, returning `None` for unknown codes.
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.code() == code)
    }

    /// Parses a level name such as `push`, case-insensitively.
    pub fn from_name(name: &str) -> Option<Self> {
        let upper = name.trim().to_uppercase();
        Self::ALL.into_iter().find(|p| p.name() == upper)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Exclude => "EXCLUDE",
            Self::View => "VIEW",
            Self::Clone => "CLONE",
            Self::Push => "PUSH",
            Self::Create => "CREATE",
            Self::Delete => "DELETE",
            Self::Rewind => "REWIND",
        }
    }

    /// Strictly greater than `other`.
    pub fn exceeds(&self, other: AccessPermission) -> bool {
        *self > other
    }

    /// Greater than or equal to `other`.
    pub fn at_least(&self, other: AccessPermission) -> bool {
        *self >= other
    }

    /// Role string of the form `CODE:registrant`.
    pub fn as_role(&self, registrant: &str) -> String {
        format!("{}:{}", self.code(), registrant)
    }
}

impl fmt::Display for AccessPermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a resolved permission came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PermissionType {
    Administrator,
    Owner,
    Explicit,
    Regex,
    Team,
    /// Explicit entry naming a repository that no longer exists.
    Missing,
    /// Implied by the repository's anonymous access restriction.
    Anonymous,
    /// Implied by authenticated authorization control.
    Authenticated,
}

/// Kind of the `registrant` named by a permission entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegistrantType {
    User,
    Team,
    Repository,
}

/// One registrant's access to a repository, or one repository's entry in a
/// user's permission list.
///
/// Equality and hashing use the registrant only, so a set holds at most one
/// entry per registrant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrantAccessPermission {
    pub registrant: String,
    pub permission: AccessPermission,
    pub permission_type: PermissionType,
    pub registrant_type: RegistrantType,
    /// False for synthesized entries that cannot be edited.
    pub mutable: bool,
    /// Provenance, e.g. the team or regex granting the permission.
    pub source: Option<String>,
}

impl RegistrantAccessPermission {
    pub fn new(
        registrant: impl Into<String>,
        permission: AccessPermission,
        permission_type: PermissionType,
        registrant_type: RegistrantType,
        source: Option<String>,
        mutable: bool,
    ) -> Self {
        Self {
            registrant: registrant.into(),
            permission,
            permission_type,
            registrant_type,
            mutable,
            source,
        }
    }

    /// Editable entry set directly on a user or team.
    pub fn explicit(
        registrant: impl Into<String>,
        permission: AccessPermission,
        registrant_type: RegistrantType,
    ) -> Self {
        Self::new(
            registrant,
            permission,
            PermissionType::Explicit,
            registrant_type,
            None,
            true,
        )
    }

    /// Synthesized ownership entry for a repository.
    pub fn owner(repository: impl Into<String>) -> Self {
        Self::new(
            repository,
            AccessPermission::Rewind,
            PermissionType::Owner,
            RegistrantType::Repository,
            None,
            false,
        )
    }

    pub fn is_admin(&self) -> bool {
        self.permission_type == PermissionType::Administrator
    }

    pub fn is_owner(&self) -> bool {
        self.permission_type == PermissionType::Owner
    }

    pub fn is_explicit(&self) -> bool {
        self.permission_type == PermissionType::Explicit
    }

    pub fn is_regex(&self) -> bool {
        self.permission_type == PermissionType::Regex
    }

    pub fn is_team(&self) -> bool {
        self.permission_type == PermissionType::Team
    }

    pub fn is_missing(&self) -> bool {
        self.permission_type == PermissionType::Missing
    }

    /// Order in which repository permissions are tested; lower first.
    pub fn score(&self) -> u8 {
        if self.registrant_type != RegistrantType::Repository {
            return 0;
        }
        match self.permission_type {
            PermissionType::Administrator => 0,
            PermissionType::Owner => 1,
            PermissionType::Explicit => 2,
            PermissionType::Regex => 3,
            PermissionType::Team => 4,
            _ => 0,
        }
    }

    /// Display ordering.
    ///
    /// Repository entries sort by tier: administrator, owner and explicit
    /// entries interleave by name, then regex entries, then team entries.
    /// User and team entries sort by registrant, ignoring case.
    pub fn compare(&self, other: &Self) -> Ordering {
        match self.registrant_type {
            RegistrantType::Repository => {
                let tier = |score: u8| if score <= 2 { 0 } else { score };
                tier(self.score())
                    .cmp(&tier(other.score()))
                    .then_with(|| compare_repository_names(&self.registrant, &other.registrant))
            }
            RegistrantType::User | RegistrantType::Team => self
                .registrant
                .to_lowercase()
                .cmp(&other.registrant.to_lowercase()),
        }
    }
}

impl PartialEq for RegistrantAccessPermission {
    fn eq(&self, other: &Self) -> bool {
        self.registrant == other.registrant
    }
}

impl Eq for RegistrantAccessPermission {}

impl Hash for RegistrantAccessPermission {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.registrant.hash(state);
    }
}

impl fmt::Display for RegistrantAccessPermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.permission.as_role(&self.registrant))
    }
}

/// Sorts entries into display order.
pub fn sort_permissions(entries: &mut [RegistrantAccessPermission]) {
    entries.sort_by(|a, b| a.compare(b));
}
