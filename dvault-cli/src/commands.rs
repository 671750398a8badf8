//! Command execution
//!
//! Every invocation is one pass: the repository snapshot is loaded, the
//! command runs under its own log subscriber and the snapshot is written
//! back if the command changed it.

use super::{Cli, Commands};
use anyhow::{Context, Result, bail};
use dvault_core::names::jcr;
use dvault_core::{
    AggregatorManager, Exporter, FilterConfig, ImportInfo, Importer, MemorySession,
    ProgressListener, Session, VaultConfig, VaultError, package,
};
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Listener printing one line per change
#[derive(Debug, Default)]
struct StdoutListener;

impl ProgressListener for StdoutListener {
    fn on_message(&mut self, action: &str, path: &str) {
        println!("{} {}", action, path);
    }

    fn on_error(&mut self, path: &str, error: &VaultError) {
        eprintln!("E {}: {}", path, error);
    }
}

fn subscriber(debug: bool) -> impl tracing::Subscriber + Send + Sync {
    let env_filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into())
    };
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .finish()
}

/// Run one command with a subscriber scoped to it
pub(crate) fn run_pass(cli: Cli) -> Result<()> {
    let subscriber = subscriber(cli.debug);
    tracing::subscriber::with_default(subscriber, || execute(cli))
}

fn open(repo: &Path) -> Result<MemorySession> {
    MemorySession::open(repo).with_context(|| format!("failed to open repository {}", repo.display()))
}

fn persist(session: &MemorySession, repo: &Path) -> Result<()> {
    session
        .persist(repo)
        .with_context(|| format!("failed to write repository {}", repo.display()))
}

fn load_config(path: &Path) -> Result<VaultConfig> {
    VaultConfig::load(path).with_context(|| format!("failed to load configuration {}", path.display()))
}

fn execute(cli: Cli) -> Result<()> {
    let repo = cli.repo.as_path();
    match cli.command {
        Commands::Init { force } => {
            if repo.exists() && !force {
                bail!("repository {} already exists (use --force to overwrite)", repo.display());
            }
            persist(&MemorySession::new(), repo)?;
            println!("Initialized empty repository at {}", repo.display());
        }

        Commands::Export {
            root,
            output,
            no_versions,
        } => {
            let session = open(repo)?;
            let mut config = load_config(&cli.config)?;
            if no_versions {
                config.export.include_versions = false;
            }
            let mut listener = StdoutListener;
            let exported = Exporter::from_config(&config.export).export(&session, &root, &mut listener)?;
            let files = package::write(&output, &session, &exported, &FilterConfig::for_root(&root))
                .with_context(|| format!("failed to write package {}", output.display()))?;
            println!(
                "Exported {} aggregate(s) in {} file(s) to {}",
                exported.len(),
                files,
                output.display()
            );
        }

        Commands::Import { package, ac_handling } => {
            let mut session = open(repo)?;
            let mut options = load_config(&cli.config)?.import_options();
            if let Some(ac_handling) = ac_handling {
                options.ac_handling = ac_handling;
            }
            let pkg = package::read(&package)
                .with_context(|| format!("failed to read package {}", package.display()))?;
            let filter = pkg.workspace_filter()?;
            let mut listener = StdoutListener;
            let info = Importer::from_options(&options).run(&mut session, &filter, pkg.entries(), &mut listener)?;
            persist(&session, repo)?;
            println!("Imported {} change(s) from {}", info.len(), package.display());
        }

        Commands::Checkin { path } => {
            let mut session = open(repo)?;
            session.add_mixin(&path, jcr::MIX_VERSIONABLE)?;
            let version = session.checkin(&path)?;
            session.save()?;
            persist(&session, repo)?;
            println!("Checked in {} as version {}", path, version);
        }

        Commands::Label { path, version, label } => {
            let mut session = open(repo)?;
            session.add_version_label(&path, &version, &label)?;
            session.save()?;
            persist(&session, repo)?;
            println!("Labeled version {} of {} as {}", version, path, label);
        }

        Commands::Aggregates { root } => {
            let session = open(repo)?;
            let config = load_config(&cli.config)?;
            let manager = AggregatorManager::from_config(&config.export);
            for aggregate in manager.collect(&session, &root)? {
                println!("{}\t{}", aggregate.path(), aggregate.aggregator().name());
            }
        }

        Commands::Rm { path, recursive } => {
            let mut session = open(repo)?;
            let config = load_config(&cli.config)?;
            let manager = AggregatorManager::from_config(&config.export);
            let aggregator = manager.find(session.require_node(&path)?, &path)?;
            let info: ImportInfo = aggregator.remove(&mut session, &path, recursive, true)?;
            StdoutListener.on_import_info(&info);
            persist(&session, repo)?;
        }
    }
    Ok(())
}
