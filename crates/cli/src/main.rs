use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use buildstack_lib::{Config, Kind};

mod cmd;
mod output;
mod prompts;

use cmd::{ExtensionArgs, InstallArgs, cmd_clean, cmd_install, cmd_paths, exit_status};
use output::{OutputFormat, print_error};

/// bstack - builds and installs the TPL, framework and extension stack
#[derive(Parser)]
#[command(name = "bstack")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Configuration file (default: ~/.config/buildstack/config.toml, then ./buildstack.toml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Output format
  #[arg(short, long, global = true, value_enum, default_value_t)]
  output: OutputFormat,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build and install the third-party libraries for a framework version
  InstallTpls(InstallArgs),

  /// Build the TPLs (if needed), then the framework
  InstallFramework(InstallArgs),

  /// Build the TPLs and framework (if needed), then the extension
  InstallFrameworkWithExtension {
    #[command(flatten)]
    args: InstallArgs,

    #[command(flatten)]
    extension: ExtensionArgs,
  },

  /// Remove the build and install trees of one build
  Clean {
    /// Canonical build name, e.g. framework/main/debug
    name: String,

    /// Also remove the module file, generated scripts and sources
    #[arg(long)]
    remove: bool,

    /// Do not ask before removing
    #[arg(short, long)]
    force: bool,
  },

  /// Show where a build lives
  Paths {
    /// Canonical build name, e.g. framework/main/debug
    name: String,
  },
}

fn init_tracing(verbose: bool) {
  let default_level = if verbose { "debug" } else { "info" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}

fn run(cli: Cli) -> Result<i32> {
  let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
  debug!(base = %config.base.display(), build_base = %config.build_base.display(), "configuration loaded");

  match cli.command {
    Commands::InstallTpls(args) => cmd_install(&config, Kind::Tpls, &args, None, cli.output),
    Commands::InstallFramework(args) => cmd_install(&config, Kind::Framework, &args, None, cli.output),
    Commands::InstallFrameworkWithExtension { args, extension } => {
      cmd_install(&config, Kind::Extension, &args, Some(&extension), cli.output)
    }
    Commands::Clean { name, remove, force } => cmd_clean(&config, &name, remove, force, cli.output),
    Commands::Paths { name } => cmd_paths(&config, &name, cli.output),
  }
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  match run(cli) {
    Ok(code) => ExitCode::from(exit_status(code)),
    Err(err) => {
      print_error(&format!("{err:#}"));
      ExitCode::FAILURE
    }
  }
}
