//! Users, teams and the directory that stores their repository roles.

use crate::error::{CatalogError, Result};
use crate::names::PersonalNamespace;
use crate::permission::{AccessPermission, PermissionType, RegistrantAccessPermission, RegistrantType};
use crate::record::{AccessRestriction, AuthorizationControl, RepositoryRecord};
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// True if a permission key is a pattern rather than a repository name.
fn is_regex_key(key: &str) -> bool {
    key.chars()
        .any(|c| !(c.is_alphanumeric() || matches!(c, '/' | '.' | '-' | '_' | '~' | '@' | ' ')))
}

/// Full, case-insensitive match of `name` against a permission pattern.
fn regex_matches(pattern: &str, name: &str) -> bool {
    match RegexBuilder::new(&format!("^(?:{})$", pattern))
        .case_insensitive(true)
        .build()
    {
        Ok(re) => re.is_match(name),
        Err(e) => {
            debug!(pattern, error = %e, "ignoring invalid permission pattern");
            false
        }
    }
}

/// First pattern key matching the repository, with its permission.
fn first_regex_match<'a>(
    permissions: &'a BTreeMap<String, AccessPermission>,
    repository: &str,
) -> Option<(&'a String, AccessPermission)> {
    permissions
        .iter()
        .filter(|(key, _)| is_regex_key(key))
        .find(|(key, _)| regex_matches(key, repository))
        .map(|(key, p)| (key, *p))
}

/// Permission implied by a repository's anonymous access restriction.
fn implicit_permission(record: &RepositoryRecord) -> AccessPermission {
    match record.access_restriction {
        AccessRestriction::None => AccessPermission::Rewind,
        AccessRestriction::Push => AccessPermission::Clone,
        AccessRestriction::Clone => AccessPermission::View,
        AccessRestriction::View => AccessPermission::None,
    }
}

/// A server account and its repository permissions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserModel {
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
    /// Keyed by lower-cased repository name or pattern.
    #[serde(default)]
    pub permissions: BTreeMap<String, AccessPermission>,
    /// Lower-cased names of starred repositories.
    #[serde(default)]
    pub starred: BTreeSet<String>,
    /// Teams the user belongs to, attached by the directory.
    #[serde(skip)]
    pub teams: Vec<TeamModel>,
}

impl UserModel {
    pub fn new(username: &str) -> Self {
        Self {
            username: username.to_lowercase(),
            display_name: None,
            is_admin: false,
            permissions: BTreeMap::new(),
            starred: BTreeSet::new(),
            teams: Vec::new(),
        }
    }

    /// The unauthenticated caller.
    pub fn anonymous() -> Self {
        Self::new("")
    }

    pub fn is_authenticated(&self) -> bool {
        !self.username.is_empty()
    }

    /// Grants `permission` on a repository or pattern. `None` revokes.
    pub fn set_repository_permission(&mut self, repository: &str, permission: AccessPermission) {
        let key = repository.to_lowercase();
        if permission == AccessPermission::None {
            self.permissions.remove(&key);
        } else {
            self.permissions.insert(key, permission);
        }
    }

    pub fn has_repository_permission(&self, repository: &str) -> bool {
        self.permissions.contains_key(&repository.to_lowercase())
    }

    pub fn is_starred(&self, repository: &str) -> bool {
        self.starred.contains(&repository.to_lowercase())
    }

    pub fn set_starred(&mut self, repository: &str, starred: bool) {
        let key = repository.to_lowercase();
        if starred {
            self.starred.insert(key);
        } else {
            self.starred.remove(&key);
        }
    }

    /// Stored permission entries: the user's own, then inherited team entries.
    pub fn repository_permissions(&self) -> Vec<RegistrantAccessPermission> {
        let mut list: Vec<RegistrantAccessPermission> = self
            .permissions
            .iter()
            .map(|(key, permission)| {
                let permission_type = if is_regex_key(key) {
                    PermissionType::Regex
                } else {
                    PermissionType::Explicit
                };
                RegistrantAccessPermission::new(
                    key.clone(),
                    *permission,
                    permission_type,
                    RegistrantType::Repository,
                    None,
                    true,
                )
            })
            .collect();

        for team in &self.teams {
            for (key, permission) in &team.permissions {
                let entry = RegistrantAccessPermission::new(
                    key.clone(),
                    *permission,
                    PermissionType::Team,
                    RegistrantType::Repository,
                    Some(team.name.clone()),
                    false,
                );
                if !list.contains(&entry) {
                    list.push(entry);
                }
            }
        }
        list
    }

    /// Resolves this user's permission for one repository.
    pub fn repository_permission(
        &self,
        record: &RepositoryRecord,
        ns: &PersonalNamespace,
    ) -> RegistrantAccessPermission {
        let mut ap = RegistrantAccessPermission::new(
            self.username.clone(),
            AccessPermission::None,
            PermissionType::Anonymous,
            RegistrantType::User,
            None,
            false,
        );

        if record.access_restriction == AccessRestriction::None {
            ap.permission = AccessPermission::Rewind;
            return ap;
        }
        if self.is_admin {
            ap.permission_type = PermissionType::Administrator;
            ap.permission = AccessPermission::Rewind;
            return ap;
        }
        if record.is_owner(&self.username, ns) {
            ap.permission_type = PermissionType::Owner;
            ap.permission = AccessPermission::Rewind;
            return ap;
        }
        if record.authorization_control == AuthorizationControl::Authenticated
            && self.is_authenticated()
        {
            ap.permission_type = PermissionType::Authenticated;
            ap.permission = AccessPermission::Rewind;
            return ap;
        }

        let repository = record.name.to_lowercase();
        if let Some(permission) = self.permissions.get(&repository) {
            ap.permission_type = PermissionType::Explicit;
            ap.permission = *permission;
            ap.mutable = true;
            return ap;
        }
        if let Some((key, permission)) = first_regex_match(&self.permissions, &repository) {
            ap.permission_type = PermissionType::Regex;
            ap.permission = permission;
            ap.source = Some(key.clone());
            return ap;
        }

        for team in &self.teams {
            let tp = team.repository_permission(record);
            if tp.permission_type != PermissionType::Anonymous && tp.permission.exceeds(ap.permission)
            {
                ap.permission_type = PermissionType::Team;
                ap.permission = tp.permission;
                ap.source = Some(team.name.clone());
            }
        }

        if ap.permission == AccessPermission::None {
            ap.permission = implicit_permission(record);
        }
        ap
    }

    pub fn can_view(&self, record: &RepositoryRecord, ns: &PersonalNamespace) -> bool {
        self.repository_permission(record, ns)
            .permission
            .at_least(AccessPermission::View)
    }

    pub fn can_clone(&self, record: &RepositoryRecord, ns: &PersonalNamespace) -> bool {
        self.repository_permission(record, ns)
            .permission
            .at_least(AccessPermission::Clone)
    }

    pub fn can_push(&self, record: &RepositoryRecord, ns: &PersonalNamespace) -> bool {
        !record.is_frozen
            && self
                .repository_permission(record, ns)
                .permission
                .at_least(AccessPermission::Push)
    }
}

/// A named group of users sharing repository permissions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamModel {
    pub name: String,
    #[serde(default)]
    pub can_admin: bool,
    /// Lower-cased member usernames.
    #[serde(default)]
    pub users: BTreeSet<String>,
    #[serde(default)]
    pub permissions: BTreeMap<String, AccessPermission>,
}

impl TeamModel {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_lowercase(),
            can_admin: false,
            users: BTreeSet::new(),
            permissions: BTreeMap::new(),
        }
    }

    pub fn add_user(&mut self, username: &str) {
        self.users.insert(username.to_lowercase());
    }

    pub fn has_user(&self, username: &str) -> bool {
        self.users.contains(&username.to_lowercase())
    }

    pub fn set_repository_permission(&mut self, repository: &str, permission: AccessPermission) {
        let key = repository.to_lowercase();
        if permission == AccessPermission::None {
            self.permissions.remove(&key);
        } else {
            self.permissions.insert(key, permission);
        }
    }

    /// Resolves this team's permission for one repository.
    pub fn repository_permission(&self, record: &RepositoryRecord) -> RegistrantAccessPermission {
        let mut ap = RegistrantAccessPermission::new(
            self.name.clone(),
            AccessPermission::None,
            PermissionType::Anonymous,
            RegistrantType::Team,
            None,
            false,
        );

        if record.access_restriction == AccessRestriction::None {
            ap.permission = AccessPermission::Rewind;
            return ap;
        }
        if self.can_admin {
            ap.permission_type = PermissionType::Administrator;
            ap.permission = AccessPermission::Rewind;
            return ap;
        }

        let repository = record.name.to_lowercase();
        if let Some(permission) = self.permissions.get(&repository) {
            ap.permission_type = PermissionType::Explicit;
            ap.permission = *permission;
            ap.mutable = true;
            return ap;
        }
        if let Some((key, permission)) = first_regex_match(&self.permissions, &repository) {
            ap.permission_type = PermissionType::Regex;
            ap.permission = permission;
            ap.source = Some(key.clone());
            return ap;
        }

        ap.permission = implicit_permission(record);
        ap
    }
}

/// Store of users, teams and their repository roles.
pub trait IdentityDirectory: Send + Sync {
    fn all_users(&self) -> Vec<UserModel>;
    fn all_teams(&self) -> Vec<TeamModel>;
    fn user_by_name(&self, username: &str) -> Option<UserModel>;
    fn team_by_name(&self, name: &str) -> Option<TeamModel>;
    fn update_users(&self, users: Vec<UserModel>) -> Result<()>;
    fn update_teams(&self, teams: Vec<TeamModel>) -> Result<()>;
    /// Users holding an explicit permission on the repository.
    fn usernames_with_repository_role(&self, repository: &str) -> Vec<String>;
    /// Teams holding an explicit permission on the repository.
    fn teamnames_with_repository_role(&self, repository: &str) -> Vec<String>;
    fn rename_repository_role(&self, old_name: &str, new_name: &str) -> Result<()>;
    fn delete_repository_role(&self, name: &str) -> Result<()>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct DirectoryFile {
    #[serde(default)]
    users: Vec<UserModel>,
    #[serde(default)]
    teams: Vec<TeamModel>,
}

/// In-memory identity directory, optionally backed by a TOML file.
///
/// Every update is written back to the file when one is set.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    users: RwLock<BTreeMap<String, UserModel>>,
    teams: RwLock<BTreeMap<String, TeamModel>>,
    path: Option<PathBuf>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a directory from models without a backing file.
    pub fn from_models(users: Vec<UserModel>, teams: Vec<TeamModel>) -> Self {
        Self {
            users: RwLock::new(
                users
                    .into_iter()
                    .map(|u| (u.username.to_lowercase(), u))
                    .collect(),
            ),
            teams: RwLock::new(teams.into_iter().map(|t| (t.name.to_lowercase(), t)).collect()),
            path: None,
        }
    }

    /// Loads users and teams from a TOML file. A missing file gives an empty
    /// directory that is created on the first update.
    pub fn load(path: &Path) -> Result<Self> {
        let file: DirectoryFile = if path.exists() {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content).map_err(|e| CatalogError::InvalidConfig {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
        } else {
            DirectoryFile::default()
        };
        let mut directory = Self::from_models(file.users, file.teams);
        directory.path = Some(path.to_path_buf());
        Ok(directory)
    }

    fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let file = DirectoryFile {
            users: self.read_users().values().cloned().collect(),
            teams: self.read_teams().values().cloned().collect(),
        };
        let content = toml::to_string_pretty(&file)
            .map_err(|e| CatalogError::Identity(format!("failed to serialize directory: {}", e)))?;
        fs::write(path, content)
            .map_err(|e| CatalogError::Identity(format!("failed to write {}: {}", path.display(), e)))
    }

    fn read_users(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, UserModel>> {
        self.users.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_teams(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, TeamModel>> {
        self.teams.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_teams(&self, mut user: UserModel) -> UserModel {
        user.teams = self
            .read_teams()
            .values()
            .filter(|t| t.has_user(&user.username))
            .cloned()
            .collect();
        user
    }

    fn rewrite_roles(&self, rewrite: impl Fn(&mut BTreeMap<String, AccessPermission>, &mut BTreeSet<String>)) {
        {
            let mut users = self.users.write().unwrap_or_else(PoisonError::into_inner);
            for user in users.values_mut() {
                rewrite(&mut user.permissions, &mut user.starred);
            }
        }
        let mut teams = self.teams.write().unwrap_or_else(PoisonError::into_inner);
        let mut unused = BTreeSet::new();
        for team in teams.values_mut() {
            rewrite(&mut team.permissions, &mut unused);
        }
    }
}

impl IdentityDirectory for MemoryDirectory {
    fn all_users(&self) -> Vec<UserModel> {
        let users: Vec<UserModel> = self.read_users().values().cloned().collect();
        users.into_iter().map(|u| self.with_teams(u)).collect()
    }

    fn all_teams(&self) -> Vec<TeamModel> {
        self.read_teams().values().cloned().collect()
    }

    fn user_by_name(&self, username: &str) -> Option<UserModel> {
        let user = self.read_users().get(&username.to_lowercase()).cloned();
        user.map(|u| self.with_teams(u))
    }

    fn team_by_name(&self, name: &str) -> Option<TeamModel> {
        self.read_teams().get(&name.to_lowercase()).cloned()
    }

    fn update_users(&self, users: Vec<UserModel>) -> Result<()> {
        {
            let mut stored = self.users.write().unwrap_or_else(PoisonError::into_inner);
            for mut user in users {
                user.teams.clear();
                stored.insert(user.username.to_lowercase(), user);
            }
        }
        self.save()
    }

    fn update_teams(&self, teams: Vec<TeamModel>) -> Result<()> {
        {
            let mut stored = self.teams.write().unwrap_or_else(PoisonError::into_inner);
            for team in teams {
                stored.insert(team.name.to_lowercase(), team);
            }
        }
        self.save()
    }

    fn usernames_with_repository_role(&self, repository: &str) -> Vec<String> {
        let key = repository.to_lowercase();
        self.read_users()
            .values()
            .filter(|u| u.permissions.contains_key(&key))
            .map(|u| u.username.clone())
            .collect()
    }

    fn teamnames_with_repository_role(&self, repository: &str) -> Vec<String> {
        let key = repository.to_lowercase();
        self.read_teams()
            .values()
            .filter(|t| t.permissions.contains_key(&key))
            .map(|t| t.name.clone())
            .collect()
    }

    fn rename_repository_role(&self, old_name: &str, new_name: &str) -> Result<()> {
        let old_key = old_name.to_lowercase();
        let new_key = new_name.to_lowercase();
        self.rewrite_roles(|permissions, starred| {
            if let Some(permission) = permissions.remove(&old_key) {
                permissions.insert(new_key.clone(), permission);
            }
            if starred.remove(&old_key) {
                starred.insert(new_key.clone());
            }
        });
        self.save()
    }

    fn delete_repository_role(&self, name: &str) -> Result<()> {
        let key = name.to_lowercase();
        self.rewrite_roles(|permissions, starred| {
            permissions.remove(&key);
            starred.remove(&key);
        });
        self.save()
    }
}
