use super::assertions::Assertion;
use super::runner::ScenarioRunner;
use super::steps::ScenarioStep;
use repohost_core::{AccessPermission, RefUpdateResult, TrackingRefUpdate};

/// Fluent DSL for building test scenarios
pub struct Scenario {
    name: String,
    steps: Vec<ScenarioStep>,
}

impl Scenario {
    /// Create a new scenario with the given name
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            steps: Vec::new(),
        }
    }

    fn push(mut self, step: ScenarioStep) -> Self {
        self.steps.push(step);
        self
    }

    // ===== Administrator actions =====

    /// Create an empty repository
    pub fn create(self, name: &str) -> Self {
        self.push(ScenarioStep::Create {
            name: name.to_string(),
            owners: Vec::new(),
        })
    }

    /// Create an empty repository owned by `owner`
    pub fn create_owned(self, name: &str, owner: &str) -> Self {
        self.push(ScenarioStep::Create {
            name: name.to_string(),
            owners: vec![owner.to_string()],
        })
    }

    /// Edit a repository's description through the catalog
    pub fn describe(self, name: &str, description: &str) -> Self {
        self.push(ScenarioStep::Describe {
            name: name.to_string(),
            description: description.to_string(),
        })
    }

    pub fn rename(self, from: &str, to: &str) -> Self {
        self.push(ScenarioStep::Rename {
            from: from.to_string(),
            to: to.to_string(),
        })
    }

    pub fn delete(self, name: &str) -> Self {
        self.push(ScenarioStep::Delete {
            name: name.to_string(),
        })
    }

    /// Fork `origin` into the personal project of `user`
    pub fn fork(self, origin: &str, user: &str) -> Self {
        self.push(ScenarioStep::Fork {
            origin: origin.to_string(),
            user: user.to_string(),
        })
    }

    /// Give `user` an explicit permission on a repository
    pub fn grant(self, user: &str, repository: &str, permission: AccessPermission) -> Self {
        self.push(ScenarioStep::Grant {
            user: user.to_string(),
            repository: repository.to_string(),
            permission,
        })
    }

    // ===== Git activity =====

    /// A repository appears in the folder without going through the catalog
    pub fn create_on_disk(self, name: &str) -> Self {
        self.push(ScenarioStep::CreateOnDisk {
            name: name.to_string(),
        })
    }

    /// A branch appears in the repository
    pub fn push_branch(self, name: &str) -> Self {
        self.push(ScenarioStep::Push {
            name: name.to_string(),
        })
    }

    /// Open a repository and never close it
    pub fn hold_open(self, name: &str) -> Self {
        self.push(ScenarioStep::HoldOpen {
            name: name.to_string(),
        })
    }

    /// Configure a mirror remote on a repository
    pub fn mirror_of(self, name: &str, url: &str) -> Self {
        self.push(ScenarioStep::AddMirrorRemote {
            name: name.to_string(),
            url: url.to_string(),
        })
    }

    // ===== Services =====

    /// The next fetch of `dir_name` moves `ref_name` with `result`
    pub fn remote_moves(self, dir_name: &str, ref_name: &str, result: RefUpdateResult) -> Self {
        self.push(ScenarioStep::ScriptFetch {
            name: dir_name.to_string(),
            updates: vec![TrackingRefUpdate {
                remote_name: ref_name.to_string(),
                local_name: ref_name.to_string(),
                old_id: Some("1111111111111111111111111111111111111111".to_string()),
                new_id: Some("2222222222222222222222222222222222222222".to_string()),
                result,
            }],
        })
    }

    /// Run one mirror sweep
    pub fn mirror_sweep(self) -> Self {
        self.push(ScenarioStep::MirrorSweep)
    }

    /// Run the steps built by `build` while `name` is collecting garbage
    pub fn while_collecting(self, name: &str, build: impl FnOnce(Scenario) -> Scenario) -> Self {
        let inner = build(Scenario::new(name));
        self.push(ScenarioStep::WhileCollecting {
            name: name.to_string(),
            steps: inner.steps,
        })
    }

    // ===== Settings =====

    pub fn cache_repository_list(self, enabled: bool) -> Self {
        self.push(ScenarioStep::CacheRepositoryList(enabled))
    }

    pub fn allow_deleting_non_empty(self, allowed: bool) -> Self {
        self.push(ScenarioStep::AllowDeletingNonEmpty(allowed))
    }

    // ===== Failure simulation =====

    /// Drop the catalog and build a new one over the same folder
    pub fn restart(self) -> Self {
        self.push(ScenarioStep::Restart)
    }

    /// The previous step must fail with an error containing `message`
    pub fn fails_with(mut self, message: &str) -> Self {
        if let Some(step) = self.steps.pop() {
            self.steps.push(ScenarioStep::Fails {
                step: Box::new(step),
                message: message.to_string(),
            });
        }
        self
    }

    // ===== Assertions =====

    /// Add a general assertion
    pub fn assert(self, assertion: Assertion) -> Self {
        self.push(ScenarioStep::Assert { assertion })
    }

    /// Assert the exact list, in catalog order
    pub fn assert_listed(self, names: &[&str]) -> Self {
        self.assert(Assertion::Listed(
            names.iter().map(|n| n.to_string()).collect(),
        ))
    }

    pub fn assert_exists(self, name: &str) -> Self {
        self.assert(Assertion::Exists(name.to_string()))
    }

    pub fn assert_missing(self, name: &str) -> Self {
        self.assert(Assertion::Missing(name.to_string()))
    }

    pub fn assert_description(self, name: &str, description: &str) -> Self {
        self.assert(Assertion::DescriptionIs {
            name: name.to_string(),
            description: description.to_string(),
        })
    }

    pub fn assert_has_commits(self, name: &str) -> Self {
        self.assert(Assertion::HasCommits(name.to_string()))
    }

    pub fn assert_origin(self, name: &str, origin: Option<&str>) -> Self {
        self.assert(Assertion::OriginIs {
            name: name.to_string(),
            origin: origin.map(str::to_string),
        })
    }

    pub fn assert_forks(self, name: &str, forks: &[&str]) -> Self {
        self.assert(Assertion::ForksAre {
            name: name.to_string(),
            forks: forks.iter().map(|n| n.to_string()).collect(),
        })
    }

    pub fn assert_fork_of(self, user: &str, origin: &str, fork: Option<&str>) -> Self {
        self.assert(Assertion::ForkOf {
            user: user.to_string(),
            origin: origin.to_string(),
            fork: fork.map(str::to_string),
        })
    }

    pub fn assert_network_size(self, name: &str, count: usize) -> Self {
        self.assert(Assertion::NetworkSize {
            name: name.to_string(),
            count,
        })
    }

    pub fn assert_permission(
        self,
        user: &str,
        repository: &str,
        permission: Option<AccessPermission>,
    ) -> Self {
        self.assert(Assertion::EffectivePermission {
            user: user.to_string(),
            repository: repository.to_string(),
            permission,
        })
    }

    pub fn assert_use_count(self, name: &str, count: usize) -> Self {
        self.assert(Assertion::UseCount {
            name: name.to_string(),
            count,
        })
    }

    pub fn assert_fetch_count(self, count: usize) -> Self {
        self.assert(Assertion::FetchCount(count))
    }

    pub fn assert_notified(self, names: &[&str]) -> Self {
        self.assert(Assertion::Notified(
            names.iter().map(|n| n.to_string()).collect(),
        ))
    }

    // ===== Execution =====

    /// Execute the scenario and return results
    pub fn run(self) -> ScenarioResult {
        let mut runner = match ScenarioRunner::new() {
            Ok(r) => r,
            Err(e) => {
                return ScenarioResult {
                    name: self.name.clone(),
                    success: false,
                    steps_executed: 0,
                    failure_step: Some(0),
                    error: Some(format!("Failed to create runner: {}", e)),
                }
            }
        };

        match runner.execute(&self.steps) {
            Ok(()) => ScenarioResult {
                name: self.name,
                success: true,
                steps_executed: self.steps.len(),
                failure_step: None,
                error: None,
            },
            Err(e) => {
                let failure_step = runner.current_step();
                ScenarioResult {
                    name: self.name,
                    success: false,
                    steps_executed: failure_step,
                    failure_step: Some(failure_step),
                    error: Some(format!("{:?}", e)),
                }
            }
        }
    }
}

/// Result of running a scenario
#[derive(Debug)]
pub struct ScenarioResult {
    pub name: String,
    pub success: bool,
    pub steps_executed: usize,
    pub failure_step: Option<usize>,
    pub error: Option<String>,
}

impl ScenarioResult {
    /// Unwrap the result, panicking if it failed
    pub fn unwrap(self) {
        if !self.success {
            panic!(
                "Scenario '{}' failed at step {}: {}",
                self.name,
                self.failure_step.unwrap_or(0),
                self.error.unwrap_or_else(|| "unknown error".to_string())
            );
        }
    }

    /// Expect the result to be successful
    pub fn expect(self, msg: &str) {
        if !self.success {
            panic!(
                "{}: Scenario '{}' failed at step {}: {}",
                msg,
                self.name,
                self.failure_step.unwrap_or(0),
                self.error.unwrap_or_else(|| "unknown error".to_string())
            );
        }
    }
}
