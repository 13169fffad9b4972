//! ``src/model/listing_policy.rs``
//! ============================================================================
//! # `ListingPolicy`: Filter and Sort Rules for One Directory
//!
//! Resolved from the settings provider by merging global keys with the
//! directory's `.directory` override file (when local overrides are enabled;
//! the override wins for every key it sets).

use std::cmp::Ordering;
use std::fmt;
use std::path::Path;

use crate::fs::entry_info::EntryInfo;
use crate::settings::{LOCAL_SETTINGS_FILE, SettingsProvider};

/// Settings keys read during resolution.
pub mod keys {
    pub const USE_LOCAL_SETTINGS: &str = "View/UseLocalSettings";

    pub const HIDDEN_FILES_SHOWN: &str = "View/HiddenFilesShown";
    pub const LOCAL_HIDDEN_FILES_SHOWN: &str = "Settings/HiddenFilesShown";

    pub const DIRECTORIES_FIRST: &str = "View/ShowDirectoriesFirst";
    pub const LOCAL_DIRECTORIES_FIRST: &str = "Sailfish/ShowDirectoriesFirst";

    pub const SORT_ROLE: &str = "View/SortRole";
    pub const LOCAL_SORT_ROLE: &str = "Dolphin/SortRole";

    pub const SORT_ORDER: &str = "View/SortOrder";
    pub const LOCAL_SORT_ORDER: &str = "Dolphin/SortOrder";

    pub const CASE_SENSITIVE: &str = "View/SortCaseSensitively";
    pub const LOCAL_CASE_SENSITIVE: &str = "Sailfish/SortCaseSensitively";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortRole {
    #[default]
    Name,
    /// Largest first.
    Size,
    /// Newest first.
    Modified,
    /// By suffix, then name.
    Type,
}

impl SortRole {
    /// Parse a stored role name. Unknown names fall back to `Name`.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "size" => Self::Size,
            "modificationtime" => Self::Modified,
            "type" => Self::Type,
            _ => Self::Name,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Size => "size",
            Self::Modified => "modificationtime",
            Self::Type => "type",
        }
    }
}

impl fmt::Display for SortRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListingPolicy {
    pub show_hidden: bool,
    pub sort_role: SortRole,
    /// Flip the role's natural direction. Never affects directory grouping.
    pub reversed: bool,
    pub dirs_first: bool,
    pub case_sensitive: bool,
}

impl Default for ListingPolicy {
    fn default() -> Self {
        Self {
            show_hidden: false,
            sort_role: SortRole::Name,
            reversed: false,
            dirs_first: true,
            case_sensitive: false,
        }
    }
}

impl ListingPolicy {
    pub fn resolve(settings: &dyn SettingsProvider, dir: &Path) -> Self {
        let local_file = dir.join(LOCAL_SETTINGS_FILE);
        let local = settings
            .read_bool(keys::USE_LOCAL_SETTINGS, true, None)
            .then_some(local_file.as_path());

        let merge_bool = |global_key: &str, local_key: &str, default: bool| -> bool {
            let global = settings.read_bool(global_key, default, None);
            local.map_or(global, |file| settings.read_bool(local_key, global, Some(file)))
        };

        let show_hidden = merge_bool(keys::HIDDEN_FILES_SHOWN, keys::LOCAL_HIDDEN_FILES_SHOWN, false);
        let dirs_first = merge_bool(keys::DIRECTORIES_FIRST, keys::LOCAL_DIRECTORIES_FIRST, true);
        let case_sensitive = merge_bool(keys::CASE_SENSITIVE, keys::LOCAL_CASE_SENSITIVE, false);

        let mut role = settings.read_value(keys::SORT_ROLE, SortRole::Name.as_str(), None);
        if let Some(file) = local {
            role = settings.read_value(keys::LOCAL_SORT_ROLE, &role, Some(file));
        }

        // Global order is "default" or anything else; local order is 0 or non-zero.
        let mut reversed = settings.read_value(keys::SORT_ORDER, "default", None) != "default";
        if let Some(file) = local {
            let fallback = if reversed { "1" } else { "0" };
            reversed = settings.read_value(keys::LOCAL_SORT_ORDER, fallback, Some(file)).trim() != "0";
        }

        Self {
            show_hidden,
            sort_role: SortRole::parse(&role),
            reversed,
            dirs_first,
            case_sensitive,
        }
    }

    /// Membership rule applied to names before stat.
    #[inline]
    #[must_use]
    pub fn includes(&self, name: &str) -> bool {
        self.show_hidden || !name.starts_with('.')
    }

    #[must_use]
    pub fn compare(&self, a: &EntryInfo, b: &EntryInfo) -> Ordering {
        if self.dirs_first {
            match (a.is_dir_at_end, b.is_dir_at_end) {
                (true, false) => return Ordering::Less,
                (false, true) => return Ordering::Greater,
                _ => {}
            }
        }

        let primary = match self.sort_role {
            SortRole::Name => Ordering::Equal,
            SortRole::Size => b.size.cmp(&a.size),
            SortRole::Modified => b.modified.cmp(&a.modified),
            SortRole::Type => self.compare_text(a.suffix(), b.suffix()),
        };

        let ordering = primary.then_with(|| self.compare_text(&a.name, &b.name));
        if self.reversed { ordering.reverse() } else { ordering }
    }

    pub fn sort(&self, entries: &mut [EntryInfo]) {
        entries.sort_by(|a: &EntryInfo, b: &EntryInfo| -> Ordering { self.compare(a, b) });
    }

    fn compare_text(&self, a: &str, b: &str) -> Ordering {
        if self.case_sensitive {
            a.cmp(b)
        } else {
            a.to_lowercase()
                .cmp(&b.to_lowercase())
                .then_with(|| a.cmp(b))
        }
    }
}
