//! Effective permission lists for users and repositories.

use crate::error::Result;
use crate::identity::{IdentityDirectory, UserModel};
use crate::names::PersonalNamespace;
use crate::permission::{
    sort_permissions, AccessPermission, PermissionType, RegistrantAccessPermission,
};
use crate::record::{AccessRestriction, AuthorizationControl, RepositoryRecord};
use std::sync::Arc;
use tracing::warn;

/// Resolves permission lists against the identity directory.
#[derive(Clone)]
pub struct PermissionResolver {
    directory: Arc<dyn IdentityDirectory>,
    namespace: PersonalNamespace,
}

impl PermissionResolver {
    pub fn new(directory: Arc<dyn IdentityDirectory>, namespace: PersonalNamespace) -> Self {
        Self {
            directory,
            namespace,
        }
    }

    pub fn directory(&self) -> &Arc<dyn IdentityDirectory> {
        &self.directory
    }

    pub fn namespace(&self) -> &PersonalNamespace {
        &self.namespace
    }

    /// Every repository permission a user holds.
    ///
    /// Explicit entries for repositories that no longer exist are marked
    /// missing. Owned and personal repositories get an owner entry that
    /// replaces any other entry for the same repository.
    pub fn effective_permissions(
        &self,
        user: &UserModel,
        records: &[RepositoryRecord],
        exists: impl Fn(&str) -> bool,
    ) -> Vec<RegistrantAccessPermission> {
        if user.username.is_empty() {
            return Vec::new();
        }

        let mut list = user.repository_permissions();
        for entry in list.iter_mut() {
            if entry.mutable && entry.is_explicit() && !exists(&entry.registrant) {
                entry.permission_type = PermissionType::Missing;
                entry.mutable = false;
            }
        }

        for record in records {
            if record.is_owner(&user.username, &self.namespace) {
                list.retain(|e| !e.registrant.eq_ignore_ascii_case(&record.name));
                list.push(RegistrantAccessPermission::owner(record.name.clone()));
            }
        }

        sort_permissions(&mut list);
        list
    }

    /// Users whose access to the repository exceeds none.
    ///
    /// Unrestricted repositories and repositories open to any authenticated
    /// user have no registrants.
    pub fn registrants_for(&self, record: &RepositoryRecord) -> Vec<RegistrantAccessPermission> {
        if !Self::needs_registrants(record) {
            return Vec::new();
        }
        let mut list: Vec<_> = self
            .directory
            .all_users()
            .iter()
            .map(|user| user.repository_permission(record, &self.namespace))
            .filter(|ap| ap.permission.exceeds(AccessPermission::None))
            .collect();
        sort_permissions(&mut list);
        list
    }

    /// Teams whose access to the repository exceeds none.
    pub fn team_registrants_for(
        &self,
        record: &RepositoryRecord,
    ) -> Vec<RegistrantAccessPermission> {
        if !Self::needs_registrants(record) {
            return Vec::new();
        }
        let mut list: Vec<_> = self
            .directory
            .all_teams()
            .iter()
            .map(|team| team.repository_permission(record))
            .filter(|ap| ap.permission.exceeds(AccessPermission::None))
            .collect();
        sort_permissions(&mut list);
        list
    }

    fn needs_registrants(record: &RepositoryRecord) -> bool {
        record.access_restriction != AccessRestriction::None
            && record.authorization_control != AuthorizationControl::Authenticated
    }

    /// Stores the mutable user entries for a repository.
    pub fn set_user_permissions(
        &self,
        record: &RepositoryRecord,
        entries: &[RegistrantAccessPermission],
    ) -> Result<()> {
        let mut users = Vec::new();
        for entry in entries.iter().filter(|e| e.mutable) {
            match self.directory.user_by_name(&entry.registrant) {
                Some(mut user) => {
                    user.set_repository_permission(&record.name, entry.permission);
                    users.push(user);
                }
                None => warn!(user = %entry.registrant, repository = %record.name, "unknown user"),
            }
        }
        self.directory.update_users(users)
    }

    /// Stores the mutable team entries for a repository.
    pub fn set_team_permissions(
        &self,
        record: &RepositoryRecord,
        entries: &[RegistrantAccessPermission],
    ) -> Result<()> {
        let mut teams = Vec::new();
        for entry in entries.iter().filter(|e| e.mutable) {
            match self.directory.team_by_name(&entry.registrant) {
                Some(mut team) => {
                    team.set_repository_permission(&record.name, entry.permission);
                    teams.push(team);
                }
                None => warn!(team = %entry.registrant, repository = %record.name, "unknown team"),
            }
        }
        self.directory.update_teams(teams)
    }

    pub fn users_with_role(&self, record: &RepositoryRecord) -> Vec<String> {
        self.directory.usernames_with_repository_role(&record.name)
    }

    pub fn teams_with_role(&self, record: &RepositoryRecord) -> Vec<String> {
        self.directory.teamnames_with_repository_role(&record.name)
    }

    /// Number of users who starred the repository.
    pub fn star_count(&self, record: &RepositoryRecord) -> usize {
        self.directory
            .all_users()
            .iter()
            .filter(|u| u.is_starred(&record.name))
            .count()
    }
}
