//! src/cli.rs

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "fbrowse")]
#[command(about = "List a directory or search below it by name", long_about = None)]
pub struct Cli {
    /// Directory to list or search (defaults to current directory)
    pub dir: Option<PathBuf>,

    /// Print paths below DIR whose name contains TERM instead of listing
    #[arg(short, long, value_name = "TERM")]
    pub search: Option<String>,
}
