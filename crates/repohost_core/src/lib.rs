//! Repohost Core Library
//!
//! The repository catalog of a self-hosted git server, providing:
//! - Discovery and caching of hosted repositories
//! - Per-repository configuration records
//! - Effective permission resolution
//! - Fork networks
//! - Scheduled mirror fetching and garbage collection
//!
//! # Quick Start
//!
//! ```
//! use repohost_core::{
//!     FsStorage, GcState, MemoryDirectory, RepositoryCatalog, RepositoryRecord, Settings,
//! };
//! use std::sync::{Arc, RwLock};
//! use tempfile::TempDir;
//!
//! let tmp = TempDir::new().unwrap();
//! let mut settings = Settings::default();
//! settings.catalog.repositories_folder = tmp.path().to_path_buf();
//!
//! let catalog = RepositoryCatalog::new(
//!     Arc::new(RwLock::new(settings)),
//!     Arc::new(FsStorage::new(tmp.path())),
//!     Arc::new(MemoryDirectory::new()),
//!     Arc::new(GcState::new()),
//! );
//!
//! let record = catalog
//!     .update_record("", RepositoryRecord::new("team/app"), true)
//!     .unwrap();
//! assert_eq!(record.name, "team/app.git");
//! assert_eq!(catalog.list(), vec!["team/app.git"]);
//! ```
//!
//! # Copy-on-read
//!
//! Records handed out by the catalog are independent clones:
//!
//! ```
//! # use repohost_core::{FsStorage, GcState, MemoryDirectory, RepositoryCatalog, RepositoryRecord, Settings};
//! # use std::sync::{Arc, RwLock};
//! # let tmp = tempfile::TempDir::new().unwrap();
//! # let mut settings = Settings::default();
//! # settings.catalog.repositories_folder = tmp.path().to_path_buf();
//! # let catalog = RepositoryCatalog::new(
//! #     Arc::new(RwLock::new(settings)),
//! #     Arc::new(FsStorage::new(tmp.path())),
//! #     Arc::new(MemoryDirectory::new()),
//! #     Arc::new(GcState::new()),
//! # );
//! # catalog.update_record("", RepositoryRecord::new("app"), true).unwrap();
//! let mut copy = catalog.get("app.git").unwrap();
//! copy.description = "local edit".into();
//! assert_eq!(catalog.get("app.git").unwrap().description, "");
//! ```

mod byte_format;
mod catalog;
mod config;
mod error;
mod fork;
mod fs_config;
mod fs_storage;
mod gc;
mod git_cli;
mod identity;
mod mirror;
mod names;
mod notify;
mod permission;
mod record;
mod record_config;
mod resolver;
mod service;
mod stamped_cache;
mod storage;

#[cfg(test)]
pub(crate) mod testing;

pub use byte_format::{format_bytes, parse_size};
pub use catalog::RepositoryCatalog;
pub use config::{CatalogSettings, GcSettings, MirrorSettings, Settings, TicketSettings};
pub use error::{CatalogError, Result};
pub use fork::{fork_of, has_fork, network, ForkNode, RecordSource};
pub use fs_config::{FsConfig, CONFIG_FILE};
pub use fs_storage::FsStorage;
pub use gc::{CollectingGuard, GcMonitor, GcReport, GcScheduler, GcState};
pub use git_cli::{Fetcher, GitCliFetcher, DEFAULT_MIRROR_REFSPEC};
pub use identity::{IdentityDirectory, MemoryDirectory, TeamModel, UserModel};
pub use mirror::{MirrorReport, MirrorSyncScheduler};
pub use names::{
    compare_repository_names, first_path_element, fix_name, repository_key,
    sort_repository_names, strip_dot_git, validate_name, with_dot_git, PersonalNamespace,
    DOT_GIT,
};
pub use notify::{
    BroadcastSink, LogSink, Notification, NotificationSink, ReceiveCommandType, RefUpdateEvent,
    TICKETS_REF,
};
pub use permission::{
    sort_permissions, AccessPermission, PermissionType, RegistrantAccessPermission,
    RegistrantType,
};
pub use record::{AccessRestriction, AuthorizationControl, MergeType, RepositoryRecord};
pub use resolver::PermissionResolver;
pub use service::{delay_until_hour, ServiceRunner};
pub use stamped_cache::TimestampedCache;
pub use storage::{
    ConfigStore, Credentials, HandleRegistry, LastChange, Metric, OpenRepository,
    RefUpdateResult, RemoteConfig, ScanOptions, StorageBackend, StorageHandle,
    TrackingRefUpdate,
};
