//! DVault CLI
//!
//! Synchronizes a repository snapshot with directory packages.
//!
//! # Usage
//!
//! ```bash
//! # Create an empty repository
//! dvault --repo repo.json init
//!
//! # Import a package, then export a subtree
//! dvault --repo repo.json import ./package
//! dvault --repo repo.json export /content ./out
//!
//! # Version a node and label the version
//! dvault --repo repo.json checkin /content/page
//! dvault --repo repo.json label /content/page 1.0 release
//! ```

mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dvault_core::AccessControlHandling;
use std::path::PathBuf;
use tokio::task;

#[derive(Parser, Debug)]
#[command(name = "dvault")]
#[command(author = "DVault Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Content repository to file-system synchronization tool")]
struct Cli {
    /// Repository snapshot file
    #[arg(short, long, global = true, default_value = "repository.json")]
    repo: PathBuf,

    /// Vault configuration file (defaults apply if missing)
    #[arg(short, long, global = true, default_value = "dvault.json")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Initialize a new, empty repository
    Init {
        /// Overwrite an existing repository
        #[arg(long)]
        force: bool,
    },

    /// Export a subtree into a directory package
    Export {
        /// Repository path to export
        root: String,
        /// Package directory
        output: PathBuf,
        /// Leave out version histories
        #[arg(long)]
        no_versions: bool,
    },

    /// Import a directory package
    Import {
        /// Package directory
        package: PathBuf,
        /// Access control handling (overwrite, clear, ignore, merge)
        #[arg(long)]
        ac_handling: Option<AccessControlHandling>,
    },

    /// Make a node versionable if needed and check it in
    Checkin { path: String },

    /// Bind a label to a version of a node
    Label {
        path: String,
        version: String,
        label: String,
    },

    /// List the aggregates of a subtree
    Aggregates {
        #[arg(default_value = "/")]
        root: String,
    },

    /// Remove the aggregate at a path
    Rm {
        path: String,
        /// Remove the whole subtree instead of the covered content only
        #[arg(short = 'R', long)]
        recursive: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    task::spawn_blocking(move || commands::run_pass(cli))
        .await
        .context("command task failed")?
}
