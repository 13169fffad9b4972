//! src/main.rs
//! ============================================================================
//! # fbrowse: list a directory or search below it
//!
//! ```text
//! fbrowse [DIR]                 list DIR (default: current directory)
//! fbrowse [DIR] --search TERM   print paths below DIR whose name contains TERM
//! ```

use std::panic::PanicHookInfo;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tokio::{signal, sync::mpsc};
use tracing::{error, info, warn};

use fbrowse_core::{
    Config, Settings, SettingsProvider,
    fs::{FileSystem, RealFileSystem},
    logging::init_logging,
    model::DirectoryModel,
    operators::{SearchEvent, SearchOptions, SearchWorker},
};

mod cli;
use cli::Cli;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    setup_panic_handler();

    let cli = Cli::parse();
    let dir = match cli.dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let config = Config::load().await.unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {e}");
        Config::default()
    });
    let _guard = init_logging(&config.logging).context("Failed to initialize logging")?;
    info!(path = %dir.display(), "Starting fbrowse");

    let settings_path = config.settings_path()?;
    let settings = Settings::open(&settings_path)
        .with_context(|| format!("Failed to open settings at {}", settings_path.display()))?;
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);

    match &cli.search {
        Some(term) => search(fs, &config, &dir, term).await?,
        None => list(fs, Arc::new(settings), &config, &dir).await?,
    }

    info!("fbrowse exited cleanly");
    Ok(())
}

async fn list(
    fs: Arc<dyn FileSystem>,
    settings: Arc<dyn SettingsProvider>,
    config: &Config,
    dir: &Path,
) -> Result<()> {
    let (events_tx, _events_rx) = mpsc::unbounded_channel();
    let mut model = DirectoryModel::new(fs, settings, &config.watch, events_tx);

    model.set_active(true).await;
    model.set_directory(dir).await;
    model.wait_until_idle().await;

    if !model.error_message().is_empty() {
        bail!("{}: {}", dir.display(), model.error_message());
    }

    for (entry, _) in model.iter() {
        let name = if entry.is_dir_at_end {
            format!("{}/", entry.name)
        } else {
            entry.name.to_string()
        };
        println!(
            "{} {:>10} {} {}",
            entry.permissions_label(),
            entry.size_label(),
            entry.modified_label(),
            name
        );
    }
    Ok(())
}

async fn search(
    fs: Arc<dyn FileSystem>,
    config: &Config,
    root: &Path,
    term: &str,
) -> Result<()> {
    let (updates_tx, mut updates_rx) = mpsc::unbounded_channel();
    let mut worker = SearchWorker::new(fs, SearchOptions::from(&config.search), updates_tx);
    worker.start_search(root, term)?;

    let mut matches: usize = 0;
    loop {
        tokio::select! {
            update = updates_rx.recv() => {
                let Some(update) = update else { break };
                match update.event {
                    SearchEvent::Match(path) => {
                        matches += 1;
                        println!("{}", path.display());
                    }
                    SearchEvent::Error { message, directory } => {
                        warn!(directory = %directory.display(), "Search error: {}", message);
                        eprintln!("{message}: {}", directory.display());
                    }
                    SearchEvent::Progress(_) => {}
                    SearchEvent::Done => break,
                }
            }
            _ = signal::ctrl_c() => {
                info!("Interrupted, cancelling search");
                worker.cancel();
            }
        }
    }

    info!(matches, "Search finished");
    Ok(())
}

fn setup_panic_handler() {
    let original_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info: &PanicHookInfo<'_>| {
        error!("fbrowse panicked: {}", panic_info);
        original_hook(panic_info);
    }));
}
