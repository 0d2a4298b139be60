use super::assertions::Assertion;
use super::doubles::RecordingSink;
use super::steps::ScenarioStep;
use super::workspace::TestWorkspace;
use anyhow::{anyhow, bail, ensure, Context, Result};
use repohost_core::{
    AccessPermission, IdentityDirectory, MirrorSyncScheduler, OpenRepository, RemoteConfig,
    RepositoryCatalog, RepositoryRecord, Settings, StorageHandle, UserModel,
};
use std::sync::{Arc, PoisonError};

/// Executes scenarios against a real catalog over a temporary folder
pub struct ScenarioRunner {
    workspace: TestWorkspace,
    catalog: Arc<RepositoryCatalog>,
    sink: RecordingSink,
    held: Vec<StorageHandle>,
    current_step: usize,
}

impl ScenarioRunner {
    pub fn new() -> Result<Self> {
        let workspace = TestWorkspace::empty()?;
        let catalog = workspace.open_catalog()?;
        Ok(Self {
            workspace,
            catalog,
            sink: RecordingSink::default(),
            held: Vec::new(),
            current_step: 0,
        })
    }

    /// Get current step number
    pub fn current_step(&self) -> usize {
        self.current_step
    }

    /// Execute all steps in sequence
    pub fn execute(&mut self, steps: &[ScenarioStep]) -> Result<()> {
        for (i, step) in steps.iter().enumerate() {
            self.current_step = i;
            self.execute_step(step)
                .with_context(|| format!("Step {}: {:?}", i, step))?;
        }
        Ok(())
    }

    /// Execute a single step
    fn execute_step(&mut self, step: &ScenarioStep) -> Result<()> {
        match step {
            ScenarioStep::Create { name, owners } => self.handle_create(name, owners),
            ScenarioStep::Describe { name, description } => {
                self.handle_describe(name, description)
            }
            ScenarioStep::Rename { from, to } => self.handle_rename(from, to),
            ScenarioStep::Delete { name } => Ok(self.catalog.delete(name)?),
            ScenarioStep::Fork { origin, user } => self.handle_fork(origin, user),
            ScenarioStep::Grant {
                user,
                repository,
                permission,
            } => self.handle_grant(user, repository, *permission),

            ScenarioStep::CreateOnDisk { name } => {
                Ok(self.catalog.storage().create(name, false)?)
            }
            ScenarioStep::Push { name } => self.handle_push(name),
            ScenarioStep::HoldOpen { name } => self.handle_hold_open(name),
            ScenarioStep::AddMirrorRemote { name, url } => self.handle_add_mirror(name, url),

            ScenarioStep::ScriptFetch { name, updates } => {
                self.workspace.fetcher().script(name, updates.clone());
                Ok(())
            }
            ScenarioStep::MirrorSweep => self.handle_mirror_sweep(),
            ScenarioStep::WhileCollecting { name, steps } => {
                let gc = self.workspace.gc().clone();
                let _collecting = gc.begin(name);
                for step in steps {
                    self.execute_step(step)
                        .with_context(|| format!("While collecting {}: {:?}", name, step))?;
                }
                Ok(())
            }

            ScenarioStep::CacheRepositoryList(enabled) => {
                self.update_settings(|s| s.catalog.cache_repository_list = *enabled)
            }
            ScenarioStep::AllowDeletingNonEmpty(allowed) => {
                self.update_settings(|s| s.catalog.allow_deleting_non_empty_repositories = *allowed)
            }

            ScenarioStep::Restart => self.handle_restart(),

            ScenarioStep::Fails { step, message } => match self.execute_step(step) {
                Ok(()) => bail!("expected failure containing {:?}", message),
                Err(e) => {
                    let text = format!("{:#}", e);
                    ensure!(
                        text.contains(message.as_str()),
                        "expected failure containing {:?}, got {:?}",
                        message,
                        text
                    );
                    Ok(())
                }
            },

            ScenarioStep::Assert { assertion } => self.handle_assertion(assertion),
        }
    }

    fn record(&self, name: &str) -> Result<RepositoryRecord> {
        self.catalog
            .get(name)
            .ok_or_else(|| anyhow!("Repository not in catalog: {}", name))
    }

    // ===== Administrator action handlers =====

    fn handle_create(&mut self, name: &str, owners: &[String]) -> Result<()> {
        let mut record = RepositoryRecord::new(name);
        record.add_owners(owners.iter().map(String::as_str));
        self.catalog.update_record("", record, true)?;
        Ok(())
    }

    fn handle_describe(&mut self, name: &str, description: &str) -> Result<()> {
        let mut record = self.record(name)?;
        record.description = description.to_string();
        let current = record.name.clone();
        self.catalog.update_record(&current, record, false)?;
        Ok(())
    }

    fn handle_rename(&mut self, from: &str, to: &str) -> Result<()> {
        let mut record = self.record(from)?;
        let current = record.name.clone();
        record.set_name(to);
        self.catalog.update_record(&current, record, false)?;
        Ok(())
    }

    fn handle_fork(&mut self, origin: &str, user: &str) -> Result<()> {
        let source = self.record(origin)?;
        let leaf = source.name.rsplit('/').next().unwrap_or(&source.name);
        let name = format!("{}/{}", self.catalog.namespace().personal_path(user), leaf);
        let mut template = source.clone_as(&name);
        template.add_owner(user);
        self.catalog.update_record("", template, true)?;
        Ok(())
    }

    fn handle_grant(
        &mut self,
        username: &str,
        repository: &str,
        permission: AccessPermission,
    ) -> Result<()> {
        let directory = self.workspace.directory();
        let mut user = directory
            .user_by_name(username)
            .unwrap_or_else(|| UserModel::new(username));
        user.set_repository_permission(repository, permission);
        directory.update_users(vec![user])?;
        Ok(())
    }

    // ===== Git activity handlers =====

    fn handle_push(&mut self, name: &str) -> Result<()> {
        let record = self.record(name)?;
        self.workspace.write_file(
            &format!("{}/refs/heads/master", record.name),
            b"3333333333333333333333333333333333333333\n",
        )
    }

    fn handle_hold_open(&mut self, name: &str) -> Result<()> {
        let handle = self
            .catalog
            .storage()
            .open(name)
            .ok_or_else(|| anyhow!("Failed to open {}", name))?;
        self.held.push(handle);
        Ok(())
    }

    fn handle_add_mirror(&mut self, name: &str, url: &str) -> Result<()> {
        let storage = self.catalog.storage().as_ref();
        let repo = OpenRepository::open(storage, name)
            .ok_or_else(|| anyhow!("Failed to open {}", name))?;
        let mut config = storage.config(&repo)?;
        config.set_remote(&RemoteConfig {
            name: "origin".to_string(),
            url: url.to_string(),
            mirror: true,
            fetch: Vec::new(),
        });
        config.save()?;
        Ok(())
    }

    // ===== Service handlers =====

    fn handle_mirror_sweep(&mut self) -> Result<()> {
        let mirror = MirrorSyncScheduler::new(self.catalog.clone(), Arc::new(self.sink.clone()));
        let report = mirror.run();
        ensure!(report.failed == 0, "mirror sweep failed: {:?}", report);
        Ok(())
    }

    fn update_settings(&mut self, change: impl FnOnce(&mut Settings)) -> Result<()> {
        let mut settings = self
            .workspace
            .settings()
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        change(&mut settings);
        Ok(())
    }

    // ===== Failure simulation handlers =====

    fn handle_restart(&mut self) -> Result<()> {
        // Handles held by the old process die with it.
        self.held.clear();
        self.catalog = self.workspace.open_catalog()?;
        Ok(())
    }

    // ===== Assertion handlers =====

    fn handle_assertion(&mut self, assertion: &Assertion) -> Result<()> {
        match assertion {
            Assertion::Listed(expected) => {
                let listed = self.catalog.list();
                ensure!(&listed == expected, "expected {:?}, listed {:?}", expected, listed);
            }
            Assertion::Exists(name) => {
                ensure!(self.catalog.get(name).is_some(), "{} is not in the catalog", name);
                ensure!(self.catalog.has_repository(name, false), "{} does not exist", name);
            }
            Assertion::Missing(name) => {
                ensure!(self.catalog.get(name).is_none(), "{} is still in the catalog", name);
                ensure!(!self.catalog.has_repository(name, false), "{} still exists", name);
            }
            Assertion::DescriptionIs { name, description } => {
                let record = self.record(name)?;
                ensure!(
                    &record.description == description,
                    "expected description {:?}, got {:?}",
                    description,
                    record.description
                );
            }
            Assertion::HasCommits(name) => {
                ensure!(self.record(name)?.has_commits, "{} has no commits", name);
            }
            Assertion::OriginIs { name, origin } => {
                let record = self.record(name)?;
                ensure!(
                    &record.origin_repository == origin,
                    "expected origin {:?}, got {:?}",
                    origin,
                    record.origin_repository
                );
            }
            Assertion::ForksAre { name, forks } => {
                let record = self.record(name)?;
                let actual: Vec<String> = record.forks.iter().cloned().collect();
                ensure!(&actual == forks, "expected forks {:?}, got {:?}", forks, actual);
            }
            Assertion::ForkOf { user, origin, fork } => {
                let actual = self.catalog.fork_of(user, origin);
                ensure!(&actual == fork, "expected fork {:?}, got {:?}", fork, actual);
            }
            Assertion::NetworkSize { name, count } => {
                let network = self
                    .catalog
                    .network(name)
                    .ok_or_else(|| anyhow!("No network for {}", name))?;
                ensure!(
                    network.count() == *count,
                    "expected {} repositories in the network, got {:?}",
                    count,
                    network.names()
                );
            }
            Assertion::EffectivePermission {
                user,
                repository,
                permission,
            } => {
                let model = self
                    .workspace
                    .directory()
                    .user_by_name(user)
                    .unwrap_or_else(|| UserModel::new(user));
                let actual = self
                    .catalog
                    .effective_permissions(&model)
                    .into_iter()
                    .find(|p| p.registrant.eq_ignore_ascii_case(repository))
                    .map(|p| p.permission);
                ensure!(
                    &actual == permission,
                    "expected {:?} for {} on {}, got {:?}",
                    permission,
                    user,
                    repository,
                    actual
                );
            }
            Assertion::UseCount { name, count } => {
                let actual = self.catalog.storage().use_count(name);
                ensure!(actual == *count, "expected {} opens of {}, got {}", count, name, actual);
            }
            Assertion::FetchCount(count) => {
                let calls = self.workspace.fetcher().calls();
                ensure!(calls.len() == *count, "expected {} fetches, got {:?}", count, calls);
            }
            Assertion::Notified(expected) => {
                let published = self.sink.published();
                ensure!(
                    &published == expected,
                    "expected notifications for {:?}, got {:?}",
                    expected,
                    published
                );
            }
            Assertion::Custom(check) => check(self.catalog.as_ref())?,
        }
        Ok(())
    }
}
