//! Repository configuration stored as `repohost.toml` in the git directory.
//!
//! Catalog fields live under `[catalog]`, custom fields under
//! `[catalog.custom]` and remotes under `[remote.<name>]`. Any other section
//! is preserved as-is across saves.

use crate::error::{CatalogError, Result};
use crate::storage::{ConfigStore, RemoteConfig};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;
use toml::{Table, Value};

/// File name of the per-repository configuration.
pub const CONFIG_FILE: &str = "repohost.toml";

const CATALOG_SECTION: &str = "catalog";
const CUSTOM_SECTION: &str = "custom";
const REMOTE_SECTION: &str = "remote";

/// Modification time and length of a file at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileSnapshot {
    modified: SystemTime,
    len: u64,
}

impl FileSnapshot {
    fn of(path: &std::path::Path) -> Option<Self> {
        let metadata = fs::metadata(path).ok()?;
        Some(Self {
            modified: metadata.modified().ok()?,
            len: metadata.len(),
        })
    }
}

/// Loaded configuration document shared by every view of one repository.
#[derive(Debug)]
pub(crate) struct ConfigDoc {
    repository: String,
    path: PathBuf,
    table: Table,
    snapshot: Option<FileSnapshot>,
}

impl ConfigDoc {
    pub(crate) fn load(repository: &str, path: PathBuf) -> Result<Self> {
        let mut doc = Self {
            repository: repository.to_string(),
            path,
            table: Table::new(),
            snapshot: None,
        };
        doc.read()?;
        Ok(doc)
    }

    fn read(&mut self) -> Result<()> {
        let snapshot = FileSnapshot::of(&self.path);
        let table = if snapshot.is_some() {
            let content = fs::read_to_string(&self.path)?;
            content
                .parse::<Table>()
                .map_err(|e| CatalogError::InvalidConfig {
                    path: self.path.clone(),
                    reason: e.to_string(),
                })?
        } else {
            Table::new()
        };
        self.table = table;
        self.snapshot = snapshot;
        Ok(())
    }

    fn catalog(&self) -> Option<&Table> {
        self.table.get(CATALOG_SECTION).and_then(Value::as_table)
    }

    fn catalog_mut(&mut self) -> &mut Table {
        section_mut(&mut self.table, CATALOG_SECTION)
    }

    fn value(&self, field: &str) -> Option<&Value> {
        self.catalog().and_then(|c| c.get(field))
    }
}

/// Returns the named sub-table, replacing any non-table value.
fn section_mut<'a>(table: &'a mut Table, name: &str) -> &'a mut Table {
    let entry = table
        .entry(name.to_string())
        .or_insert_with(|| Value::Table(Table::new()));
    if !entry.is_table() {
        *entry = Value::Table(Table::new());
    }
    match entry {
        Value::Table(t) => t,
        _ => unreachable!("section was just replaced by a table"),
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Integer(i) => Some(i.to_string()),
        Value::Boolean(b) => Some(b.to_string()),
        Value::Float(f) => Some(f.to_string()),
        Value::Datetime(d) => Some(d.to_string()),
        _ => None,
    }
}

/// [`ConfigStore`] view over a shared [`ConfigDoc`].
#[derive(Debug, Clone)]
pub struct FsConfig {
    doc: Arc<Mutex<ConfigDoc>>,
}

impl FsConfig {
    pub(crate) fn new(doc: Arc<Mutex<ConfigDoc>>) -> Self {
        Self { doc }
    }

    fn doc(&self) -> MutexGuard<'_, ConfigDoc> {
        self.doc.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ConfigStore for FsConfig {
    fn get_string(&self, field: &str) -> Option<String> {
        self.doc().value(field).and_then(value_to_string)
    }

    fn get_bool(&self, field: &str, default: bool) -> bool {
        match self.doc().value(field) {
            Some(Value::Boolean(b)) => *b,
            Some(Value::String(s)) => s.trim().parse().unwrap_or(default),
            _ => default,
        }
    }

    fn get_int(&self, field: &str, default: i64) -> i64 {
        match self.doc().value(field) {
            Some(Value::Integer(i)) => *i,
            Some(Value::String(s)) => s.trim().parse().unwrap_or(default),
            _ => default,
        }
    }

    fn get_string_list(&self, field: &str) -> Vec<String> {
        match self.doc().value(field) {
            Some(Value::Array(values)) => values.iter().filter_map(value_to_string).collect(),
            Some(Value::String(s)) if !s.trim().is_empty() => vec![s.clone()],
            _ => Vec::new(),
        }
    }

    fn set_string(&mut self, field: &str, value: &str) {
        self.doc()
            .catalog_mut()
            .insert(field.to_string(), Value::String(value.to_string()));
    }

    fn set_bool(&mut self, field: &str, value: bool) {
        self.doc()
            .catalog_mut()
            .insert(field.to_string(), Value::Boolean(value));
    }

    fn set_int(&mut self, field: &str, value: i64) {
        self.doc()
            .catalog_mut()
            .insert(field.to_string(), Value::Integer(value));
    }

    fn set_string_list(&mut self, field: &str, values: &[String]) {
        if values.is_empty() {
            self.unset(field);
            return;
        }
        let array = values.iter().cloned().map(Value::String).collect();
        self.doc()
            .catalog_mut()
            .insert(field.to_string(), Value::Array(array));
    }

    fn unset(&mut self, field: &str) {
        let mut doc = self.doc();
        if let Some(Value::Table(catalog)) = doc.table.get_mut(CATALOG_SECTION) {
            catalog.remove(field);
        }
    }

    fn custom_fields(&self) -> BTreeMap<String, String> {
        self.doc()
            .value(CUSTOM_SECTION)
            .and_then(Value::as_table)
            .map(|custom| {
                custom
                    .iter()
                    .filter_map(|(k, v)| value_to_string(v).map(|v| (k.clone(), v)))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn set_custom_fields(&mut self, fields: &BTreeMap<String, String>) {
        let mut doc = self.doc();
        let catalog = doc.catalog_mut();
        if fields.is_empty() {
            catalog.remove(CUSTOM_SECTION);
            return;
        }
        let custom = fields
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        catalog.insert(CUSTOM_SECTION.to_string(), Value::Table(custom));
    }

    fn remotes(&self) -> Vec<RemoteConfig> {
        let doc = self.doc();
        let Some(remotes) = doc.table.get(REMOTE_SECTION).and_then(Value::as_table) else {
            return Vec::new();
        };
        remotes
            .iter()
            .filter_map(|(name, section)| {
                let section = section.as_table()?;
                Some(RemoteConfig {
                    name: name.clone(),
                    url: section.get("url").and_then(value_to_string)?,
                    mirror: section
                        .get("mirror")
                        .and_then(Value::as_bool)
                        .unwrap_or(false),
                    fetch: section
                        .get("fetch")
                        .and_then(Value::as_array)
                        .map(|specs| specs.iter().filter_map(value_to_string).collect())
                        .unwrap_or_default(),
                })
            })
            .collect()
    }

    fn set_remote(&mut self, remote: &RemoteConfig) {
        let mut doc = self.doc();
        let remotes = section_mut(&mut doc.table, REMOTE_SECTION);
        let section = section_mut(remotes, &remote.name);
        section.insert("url".into(), Value::String(remote.url.clone()));
        section.insert("mirror".into(), Value::Boolean(remote.mirror));
        section.insert(
            "fetch".into(),
            Value::Array(remote.fetch.iter().cloned().map(Value::String).collect()),
        );
    }

    fn save(&mut self) -> Result<()> {
        let mut doc = self.doc();
        let content = toml::to_string_pretty(&doc.table).map_err(|e| CatalogError::Persistence {
            repository: doc.repository.clone(),
            reason: e.to_string(),
        })?;
        fs::write(&doc.path, content).map_err(|e| CatalogError::Persistence {
            repository: doc.repository.clone(),
            reason: format!("failed to write {}: {}", doc.path.display(), e),
        })?;
        doc.snapshot = FileSnapshot::of(&doc.path);
        Ok(())
    }

    fn reload(&mut self) -> Result<()> {
        self.doc().read()
    }

    fn is_outdated(&self) -> bool {
        let doc = self.doc();
        FileSnapshot::of(&doc.path) != doc.snapshot
    }
}
