use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};

use mod_registry::logging::{self, LogFormat, LogOptions};
use mod_registry::{Catalog, Config, OperationReport};

/// Manage the mod registry.
///
/// Tracks GitHub repositories listed in the registry, records their releases in
/// the package database and validates the dependency graph.
#[derive(Parser, Debug)]
#[command(name = "mod-registry", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Report what would change without writing anything
    #[arg(long, global = true)]
    dry_run: bool,

    /// Path to the registry directory
    #[arg(long, env = "REGISTRY_PATH", value_name = "PATH", global = true)]
    registry_path: Option<PathBuf>,

    /// Path to the package database directory
    #[arg(long, env = "PACKAGE_DB_PATH", value_name = "PATH", global = true)]
    package_db_path: Option<PathBuf>,

    /// GitHub token used for API requests
    #[arg(long, env = "GITHUB_TOKEN", value_name = "TOKEN", global = true, hide_env_values = true)]
    github_token: Option<String>,

    /// GitHub API URL (defaults to https://api.github.com)
    #[arg(long, value_name = "URL", global = true)]
    api_url: Option<String>,

    /// Config file (defaults to $XDG_CONFIG_HOME/mod-registry/config.json)
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Log level or filter directive
    #[arg(long, env = "LOG_LEVEL", default_value = logging::DEFAULT_LOG_LEVEL, global = true)]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "PATH", global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch a repository's releases and add it to the registry list
    #[command(alias = "add_package")]
    AddPackage {
        /// Repository URL or owner/name
        repo_url: String,
    },

    /// Add a single release of a registered repository
    #[command(alias = "add_package_release")]
    AddPackageRelease {
        /// Repository URL or owner/name
        repo_url: String,
        /// Release tag, e.g. v1.2.0
        release_tag: String,
    },

    /// Remove a repository from the registry list and the package database
    Remove {
        /// Repository URL or owner/name
        repo_url: String,
    },

    /// Fetch newly listed repositories and drop unlisted ones
    ProcessRegistryUpdates,

    /// Check that every dependency resolves to a compatible release
    Validate,

    /// Manage repository redirects
    Redirect {
        #[command(subcommand)]
        action: RedirectAction,
    },
}

#[derive(Subcommand, Debug)]
enum RedirectAction {
    /// Record that a repository moved
    Add { from: String, to: String },

    /// Drop a redirect
    Remove { from: String },
}

impl Cli {
    /// Config file values overridden by flags and environment
    fn resolve_config(&self) -> anyhow::Result<Config> {
        let path = self.config.clone().unwrap_or_else(mod_registry::config::config_path);
        let mut config = Config::load(&path)?;

        if let Some(registry) = &self.registry_path {
            config.paths.registry = registry.clone();
        }
        if let Some(package_db) = &self.package_db_path {
            config.paths.package_db = package_db.clone();
        }
        if let Some(token) = &self.github_token {
            config.github.token = Some(token.clone());
        }
        if let Some(api_url) = &self.api_url {
            config.github.api_url = api_url.clone();
        }
        Ok(config)
    }
}

async fn run(cli: Cli) -> anyhow::Result<OperationReport> {
    let config = cli.resolve_config()?;
    let catalog = Catalog::from_config(&config).context("Failed to create GitHub client")?;
    let dry_run = cli.dry_run;

    let report = match cli.command {
        Command::AddPackage { repo_url } => catalog.add_package(&repo_url, dry_run).await?,
        Command::AddPackageRelease {
            repo_url,
            release_tag,
        } => {
            catalog
                .add_package_release(&repo_url, release_tag.trim(), dry_run)
                .await?
        }
        Command::Remove { repo_url } => catalog.remove_package(&repo_url, dry_run).await?,
        Command::ProcessRegistryUpdates => catalog.process_registry_updates(dry_run).await?,
        Command::Validate => catalog.validate()?,
        Command::Redirect { action } => match action {
            RedirectAction::Add { from, to } => catalog.add_redirect(&from, &to, dry_run).await?,
            RedirectAction::Remove { from } => catalog.remove_redirect(&from, dry_run).await?,
        },
    };
    Ok(report)
}

fn print_report(report: &OperationReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        print!("{}", report);
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _guard = logging::init(&LogOptions {
        level: cli.log_level.clone(),
        format: cli.log_format,
        file: cli.log_file.clone(),
    });
    let json = cli.json;

    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")
        .and_then(|runtime| runtime.block_on(run(cli)))
        .and_then(|report| print_report(&report, json).map(|_| report));

    match result {
        Ok(report) if report.is_success() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(1),
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("error: {:#}", e);
            ExitCode::from(2)
        }
    }
}
