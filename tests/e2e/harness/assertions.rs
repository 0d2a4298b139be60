use anyhow::Result;
use repohost_core::{AccessPermission, RepositoryCatalog};

/// Declarative assertions on catalog state
pub enum Assertion {
    // Listing
    Listed(Vec<String>),
    Exists(String),
    Missing(String),

    // Records
    DescriptionIs {
        name: String,
        description: String,
    },
    HasCommits(String),
    OriginIs {
        name: String,
        origin: Option<String>,
    },
    ForksAre {
        name: String,
        forks: Vec<String>,
    },

    // Fork networks
    ForkOf {
        user: String,
        origin: String,
        fork: Option<String>,
    },
    NetworkSize {
        name: String,
        count: usize,
    },

    // Permissions
    EffectivePermission {
        user: String,
        repository: String,
        permission: Option<AccessPermission>,
    },

    // Handles
    UseCount {
        name: String,
        count: usize,
    },

    // Services
    FetchCount(usize),
    Notified(Vec<String>),

    // Custom (takes the live catalog)
    Custom(Box<dyn Fn(&RepositoryCatalog) -> Result<()> + Send + Sync>),
}

impl std::fmt::Debug for Assertion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Listed(names) => write!(f, "Listed({:?})", names),
            Self::Exists(name) => write!(f, "Exists({:?})", name),
            Self::Missing(name) => write!(f, "Missing({:?})", name),
            Self::DescriptionIs { name, description } => {
                write!(f, "DescriptionIs {{ name: {:?}, description: {:?} }}", name, description)
            }
            Self::HasCommits(name) => write!(f, "HasCommits({:?})", name),
            Self::OriginIs { name, origin } => {
                write!(f, "OriginIs {{ name: {:?}, origin: {:?} }}", name, origin)
            }
            Self::ForksAre { name, forks } => {
                write!(f, "ForksAre {{ name: {:?}, forks: {:?} }}", name, forks)
            }
            Self::ForkOf { user, origin, fork } => {
                write!(f, "ForkOf {{ user: {:?}, origin: {:?}, fork: {:?} }}", user, origin, fork)
            }
            Self::NetworkSize { name, count } => {
                write!(f, "NetworkSize {{ name: {:?}, count: {} }}", name, count)
            }
            Self::EffectivePermission {
                user,
                repository,
                permission,
            } => write!(
                f,
                "EffectivePermission {{ user: {:?}, repository: {:?}, permission: {:?} }}",
                user, repository, permission
            ),
            Self::UseCount { name, count } => {
                write!(f, "UseCount {{ name: {:?}, count: {} }}", name, count)
            }
            Self::FetchCount(n) => write!(f, "FetchCount({})", n),
            Self::Notified(names) => write!(f, "Notified({:?})", names),
            Self::Custom(_) => write!(f, "Custom(<fn>)"),
        }
    }
}
