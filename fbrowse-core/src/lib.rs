pub mod error;

pub mod config;

pub mod settings;

pub mod fs {
    pub mod entry_info;
    pub use entry_info::{EntryInfo, EntryKind, EntryView, Permissions};

    pub mod filesystem;
    pub use filesystem::{DirItem, FileSystem, RealFileSystem};

    pub mod watcher;

    #[cfg(test)]
    pub mod mock;
}

pub mod model {
    pub mod listing_policy;
    pub use listing_policy::{ListingPolicy, SortRole};

    pub mod name_filter;
    pub use name_filter::NameFilter;

    pub mod directory_model;
    pub use directory_model::{DirectoryModel, ModelEvent};
}

pub mod operators {
    pub mod listing_diff;

    pub mod directory_worker;
    pub use directory_worker::{DirectoryEvent, DirectoryWorker, ReadMode};

    pub mod search_worker;
    pub use search_worker::{SearchEvent, SearchOptions, SearchUpdate, SearchWorker};
}

pub mod logging;

pub mod util {
    pub mod humanize;

    pub mod running_guard;
}

pub use config::Config;
pub use error::{AppError, AppResult};
pub use settings::{Settings, SettingsProvider};
