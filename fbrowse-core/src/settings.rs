//! src/settings.rs
//! ============================================================================
//! # Settings: Key/Value View Settings with Per-Directory Overrides
//!
//! Keys have the form `Group/Name`. Global values live in memory and are
//! optionally persisted as TOML (`[Group]` tables of string values). A
//! directory may carry a `.directory` file with INI-style `[Group]` and
//! `Name=value` lines; callers pass its path as `local_file` to read from it
//! instead of the global store.
//!
//! Workers and models receive an `Arc<dyn SettingsProvider>` at
//! construction. Nothing in the crate reaches for a process-wide instance.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};

/// Name of the per-directory override file.
pub const LOCAL_SETTINGS_FILE: &str = ".directory";

const CHANGE_CHANNEL_CAPACITY: usize = 16;

/// Read access to settings, with optional per-directory override file.
pub trait SettingsProvider: Send + Sync {
    /// Value for `key`, or `default` when unset. With `local_file`, the value
    /// is read from that override file only.
    fn read_value(&self, key: &str, default: &str, local_file: Option<&Path>) -> String;

    fn read_bool(&self, key: &str, default: bool, local_file: Option<&Path>) -> bool {
        let fallback = if default { "true" } else { "false" };
        match self.read_value(key, fallback, local_file).trim() {
            "true" | "1" | "yes" => true,
            "false" | "0" | "no" => false,
            _ => default,
        }
    }
}

/// Broadcast when a setting changes. `local_path` names the directory whose
/// override file changed, `None` for a global change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsChanged {
    pub local_path: Option<PathBuf>,
}

pub struct Settings {
    values: RwLock<BTreeMap<String, String>>,
    store_path: Option<PathBuf>,
    changes: broadcast::Sender<SettingsChanged>,
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}

impl Settings {
    /// In-memory store, nothing persisted.
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            values: RwLock::new(BTreeMap::new()),
            store_path: None,
            changes,
        }
    }

    /// Store backed by a TOML file. A missing file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> AppResult<Self> {
        let path = path.into();
        let values = match fs::read_to_string(&path) {
            Ok(text) => parse_store(&text)?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %path.display(), "No settings file yet, starting empty");
                BTreeMap::new()
            }
            Err(e) => return Err(AppError::config_io(path, e)),
        };

        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Ok(Self {
            values: RwLock::new(values),
            store_path: Some(path),
            changes,
        })
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SettingsChanged> {
        self.changes.subscribe()
    }

    /// Set a global value, persist it if backed by a file, and notify.
    pub fn set_value(&self, key: &str, value: impl Into<String>) -> AppResult<()> {
        let value = value.into();
        {
            let mut values = self.values.write();
            if values.get(key) == Some(&value) {
                return Ok(());
            }

            // Memory only changes once the store has accepted the value.
            if let Some(path) = &self.store_path {
                let mut staged = values.clone();
                staged.insert(key.to_string(), value.clone());
                persist(path, &staged)?;
            }
            values.insert(key.to_string(), value);
        }

        debug!(key, "Global setting changed");
        let _ = self.changes.send(SettingsChanged { local_path: None });
        Ok(())
    }

    /// Write `key` into `dir/.directory`, creating the file when needed.
    pub fn write_local(&self, dir: &Path, key: &str, value: &str) -> AppResult<()> {
        let file = dir.join(LOCAL_SETTINGS_FILE);
        let text = match fs::read_to_string(&file) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(e) => return Err(AppError::config_io(file, e)),
        };

        let updated = ini_set(&text, key, value);
        fs::write(&file, updated).map_err(|e| AppError::config_io(&file, e))?;

        debug!(key, dir = %dir.display(), "Local setting changed");
        let _ = self.changes.send(SettingsChanged {
            local_path: Some(dir.to_path_buf()),
        });
        Ok(())
    }
}

impl SettingsProvider for Settings {
    fn read_value(&self, key: &str, default: &str, local_file: Option<&Path>) -> String {
        match local_file {
            Some(file) => read_local(file, key).unwrap_or_else(|| default.to_string()),
            None => self
                .values
                .read()
                .get(key)
                .cloned()
                .unwrap_or_else(|| default.to_string()),
        }
    }
}

fn persist(path: &Path, values: &BTreeMap<String, String>) -> AppResult<()> {
    let mut table = toml::Table::new();
    for (key, value) in values {
        let (group, name) = split_key(key);
        let section = table
            .entry(group.to_string())
            .or_insert_with(|| toml::Value::Table(toml::Table::new()));
        if let toml::Value::Table(section) = section {
            section.insert(name.to_string(), toml::Value::String(value.clone()));
        }
    }

    let text = toml::to_string_pretty(&table).map_err(|e| AppError::Other(e.to_string()))?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| AppError::config_io(parent, e))?;
    }
    fs::write(path, text).map_err(|e| AppError::config_io(path, e))
}

fn parse_store(text: &str) -> AppResult<BTreeMap<String, String>> {
    let table: toml::Table = text.parse()?;
    let mut values = BTreeMap::new();

    for (group, section) in table {
        let toml::Value::Table(section) = section else {
            warn!(group = %group, "Ignoring non-table settings entry");
            continue;
        };
        for (name, value) in section {
            let value = match value {
                toml::Value::String(s) => s,
                other => other.to_string(),
            };
            values.insert(format!("{group}/{name}"), value);
        }
    }

    Ok(values)
}

/// `Group/Name` -> (`Group`, `Name`). Keys without a group land in `General`.
fn split_key(key: &str) -> (&str, &str) {
    key.split_once('/').unwrap_or(("General", key))
}

fn read_local(file: &Path, key: &str) -> Option<String> {
    let text = fs::read_to_string(file).ok()?;
    ini_get(&text, key)
}

fn ini_get(text: &str, key: &str) -> Option<String> {
    let (group, name) = split_key(key);
    let mut in_group = false;

    for line in text.lines().map(str::trim) {
        if let Some(section) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            in_group = section == group;
            continue;
        }
        if !in_group {
            continue;
        }
        if let Some((k, v)) = line.split_once('=')
            && k.trim() == name
        {
            return Some(v.trim().to_string());
        }
    }

    None
}

fn ini_set(text: &str, key: &str, value: &str) -> String {
    let (group, name) = split_key(key);
    let mut lines: Vec<String> = text.lines().map(str::to_string).collect();
    let mut section_start = None;
    let mut section_end = lines.len();

    for (idx, line) in lines.iter().enumerate() {
        let trimmed = line.trim();
        if let Some(section) = trimmed.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            if section_start.is_some() {
                section_end = idx;
                break;
            }
            if section == group {
                section_start = Some(idx);
            }
        }
    }

    let entry = format!("{name}={value}");
    match section_start {
        Some(start) => {
            let existing = (start + 1..section_end).find(|&i| {
                lines[i]
                    .split_once('=')
                    .is_some_and(|(k, _)| k.trim() == name)
            });
            match existing {
                Some(i) => lines[i] = entry,
                None => lines.insert(section_end, entry),
            }
        }
        None => {
            if lines.last().is_some_and(|l| !l.trim().is_empty()) {
                lines.push(String::new());
            }
            lines.push(format!("[{group}]"));
            lines.push(entry);
        }
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}
