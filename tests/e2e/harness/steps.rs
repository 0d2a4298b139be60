use super::assertions::Assertion;
use repohost_core::{AccessPermission, TrackingRefUpdate};

/// All possible actions in a test scenario
#[derive(Debug)]
pub enum ScenarioStep {
    // Administrator actions
    Create {
        name: String,
        owners: Vec<String>,
    },
    Describe {
        name: String,
        description: String,
    },
    Rename {
        from: String,
        to: String,
    },
    Delete {
        name: String,
    },
    Fork {
        origin: String,
        user: String,
    },
    Grant {
        user: String,
        repository: String,
        permission: AccessPermission,
    },

    // Git activity behind the catalog's back
    CreateOnDisk {
        name: String,
    },
    Push {
        name: String,
    },
    HoldOpen {
        name: String,
    },
    AddMirrorRemote {
        name: String,
        url: String,
    },

    // Services
    ScriptFetch {
        name: String,
        updates: Vec<TrackingRefUpdate>,
    },
    MirrorSweep,
    WhileCollecting {
        name: String,
        steps: Vec<ScenarioStep>,
    },

    // Settings
    CacheRepositoryList(bool),
    AllowDeletingNonEmpty(bool),

    // Failure simulation
    Restart,

    // A step that must fail with an error containing `message`
    Fails {
        step: Box<ScenarioStep>,
        message: String,
    },

    // Assertions (can be interspersed)
    Assert {
        assertion: Assertion,
    },
}
