//! Command-line interface implementation
//!
//! This module provides the CLI entry point and dispatches to submodules
//! for specific command implementations.

mod build;
mod watch;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use crate::asset::AssetClass;
use crate::build::BuildContext;
use crate::config::loader::{find_config_from, merge_cli_overrides};
use crate::config::{default_config, load_config, CliOverrides, ConfigError};

/// Process exit codes
pub(crate) const EXIT_SUCCESS: u8 = 0;
pub(crate) const EXIT_ERROR: u8 = 1;

/// frontpipe - Build templates, styles, scripts, images, and fonts into `public/`
#[derive(Parser)]
#[command(name = "frontpipe")]
#[command(about = "Front-end asset pipeline with watch mode and a live-reload dev server")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to frontpipe.toml (default: search upward from the project root)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Project root (default: the config file's directory, or the current directory)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Show debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Fail when any task recovered from a transform error
    #[arg(long, global = true)]
    pub strict: bool,

    /// Number of tasks run concurrently
    #[arg(long, global = true)]
    pub jobs: Option<usize>,

    /// Dev server port
    #[arg(long, global = true)]
    pub port: Option<u16>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Clean the output root, then run every asset task once
    Build,
    /// Build, then rebuild on changes and serve with live reload
    Watch,
    /// Delete the output root
    Clean,
    /// Serve the output root with live reload, without building
    Serve,
    /// Compile templates to HTML
    Templates,
    /// Compile and prefix stylesheets
    Styles,
    /// Transpile and minify scripts
    Scripts,
    /// Optimize images
    Images,
    /// Copy fonts
    Fonts,
}

/// Run the CLI application
pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let ctx = match load_context(&cli) {
        Ok(ctx) => ctx,
        Err(e) => {
            tracing::error!("{}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    match cli.command {
        Commands::Build => build::run_build(&ctx),
        Commands::Clean => build::run_clean(&ctx),
        Commands::Watch => watch::run_watch(ctx),
        Commands::Serve => watch::run_serve(ctx),
        Commands::Templates => build::run_single(&ctx, AssetClass::Templates),
        Commands::Styles => build::run_single(&ctx, AssetClass::Styles),
        Commands::Scripts => build::run_single(&ctx, AssetClass::Scripts),
        Commands::Images => build::run_single(&ctx, AssetClass::Images),
        Commands::Fonts => build::run_single(&ctx, AssetClass::Fonts),
    }
}

/// Initialize the tracing subscriber. `RUST_LOG` takes precedence over `-v`.
fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose { "frontpipe=debug,tower_http=debug" } else { "frontpipe=info" })
    });

    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

/// Load the configuration and resolve the project root.
pub fn load_context(cli: &Cli) -> Result<BuildContext, ConfigError> {
    let cwd = std::env::current_dir()?;
    let search_from = cli.root.clone().unwrap_or_else(|| cwd.clone());

    let config_path = match &cli.config {
        Some(path) => Some(path.clone()),
        None => find_config_from(search_from),
    };

    let mut config = match &config_path {
        Some(path) => {
            tracing::debug!("using config: {}", path.display());
            load_config(Some(path))?
        }
        None => {
            tracing::debug!("no frontpipe.toml found, using defaults");
            default_config()
        }
    };

    let overrides = CliOverrides {
        strict: cli.strict.then_some(true),
        jobs: cli.jobs,
        port: cli.port,
    };
    merge_cli_overrides(&mut config, &overrides);

    let root = project_root(cli.root.as_deref(), config_path.as_deref(), &cwd);
    Ok(BuildContext::new(config, root))
}

fn project_root(root: Option<&Path>, config_path: Option<&Path>, cwd: &Path) -> PathBuf {
    match (root, config_path.and_then(Path::parent)) {
        (Some(root), _) => cwd.join(root),
        (None, Some(dir)) if !dir.as_os_str().is_empty() => cwd.join(dir),
        _ => cwd.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "frontpipe", "build", "--strict", "--jobs", "2", "--port", "4000", "-v",
        ])
        .unwrap();
        assert_eq!(cli.command, Commands::Build);
        assert!(cli.strict);
        assert!(cli.verbose);
        assert_eq!(cli.jobs, Some(2));
        assert_eq!(cli.port, Some(4000));
    }

    #[test]
    fn test_task_subcommands() {
        for (name, command) in [
            ("templates", Commands::Templates),
            ("styles", Commands::Styles),
            ("scripts", Commands::Scripts),
            ("images", Commands::Images),
            ("fonts", Commands::Fonts),
            ("serve", Commands::Serve),
        ] {
            let cli = Cli::try_parse_from(["frontpipe", name]).unwrap();
            assert_eq!(cli.command, command);
        }
    }

    #[test]
    fn test_project_root_resolution() {
        let cwd = Path::new("/work");
        assert_eq!(project_root(None, None, cwd), PathBuf::from("/work"));
        assert_eq!(
            project_root(None, Some(Path::new("site/frontpipe.toml")), cwd),
            PathBuf::from("/work/site")
        );
        assert_eq!(project_root(None, Some(Path::new("frontpipe.toml")), cwd), cwd);
        assert_eq!(
            project_root(Some(Path::new("/abs")), Some(Path::new("x/frontpipe.toml")), cwd),
            PathBuf::from("/abs")
        );
    }

    #[test]
    #[serial]
    fn test_load_context_finds_config_under_root() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("frontpipe.toml"),
            "[project]\nname = \"site\"\n\n[build]\njobs = 3\n",
        )
        .unwrap();

        let root = dir.path().to_string_lossy().into_owned();
        let cli = Cli::try_parse_from(["frontpipe", "build", "--root", &root, "--strict"]).unwrap();
        let ctx = load_context(&cli).unwrap();

        assert_eq!(ctx.project_root(), dir.path());
        assert_eq!(ctx.config().project.name, "site");
        assert_eq!(ctx.jobs(), 3);
        assert!(ctx.is_strict());
    }

    #[test]
    #[serial]
    fn test_load_context_reports_invalid_config() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("frontpipe.toml"), "[project\n").unwrap();

        let root = dir.path().to_string_lossy().into_owned();
        let cli = Cli::try_parse_from(["frontpipe", "build", "--root", &root]).unwrap();
        assert!(matches!(load_context(&cli), Err(ConfigError::Parse(_))));
    }
}
