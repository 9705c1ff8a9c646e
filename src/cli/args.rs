// ABOUTME: Command line argument definitions and parsing using Clap
// ABOUTME: Defines the main CLI structure and subcommands for cntr

use clap::{Parser, Subcommand};
use indexmap::IndexMap;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "cntr")]
#[command(about = "Render self-hosted service Compose files from a template catalog")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(short, long, global = true, help = "Path to configuration file")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, help = "Disable colored output")]
    pub no_color: bool,

    #[arg(long, global = true, help = "Catalog directory to load services from")]
    pub catalog: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the services in the catalog and which of them are installed
    List,

    /// Add services to the installed set
    Add {
        #[arg(required = true, help = "Service names")]
        names: Vec<String>,
    },

    /// Remove services from the installed set
    Remove {
        #[arg(required = true, help = "Service names")]
        names: Vec<String>,

        #[arg(short, long, help = "Remove even if an installed service depends on them")]
        force: bool,
    },

    /// Show the definition of one or more services
    Info {
        #[arg(required = true, help = "Service names")]
        names: Vec<String>,
    },

    /// Render services into an output directory
    Render {
        #[arg(help = "Service names [default: the installed services and their dependencies]")]
        names: Vec<String>,

        #[arg(
            short = 'V',
            long = "var",
            help = "Override template variables (KEY=VALUE)"
        )]
        vars: Vec<String>,

        #[arg(short, long, help = "Output directory")]
        output: Option<PathBuf>,

        #[arg(long, help = "Also render the services they depend on")]
        with_deps: bool,

        #[arg(long, help = "Print the rendered documents without touching the filesystem")]
        dry_run: bool,
    },

    /// Render every service with its defaults and validate the output
    Check,

    /// Manage persisted variable overrides
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Persist variable overrides (KEY=VALUE)
    Set {
        #[arg(required = true)]
        vars: Vec<String>,
    },

    /// Remove persisted overrides
    Unset {
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Show the effective value of every variable the installed services use
    List,

    /// Re-read the configuration file and validate it against the catalog
    Reload,
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Parse variables from KEY=VALUE format, later duplicates winning
    pub fn parse_variables(vars: &[String]) -> anyhow::Result<IndexMap<String, String>> {
        let mut variables = IndexMap::new();

        for var in vars {
            match var.split_once('=') {
                Some((key, value)) if !key.trim().is_empty() => {
                    variables.insert(key.trim().to_string(), value.to_string());
                }
                _ => {
                    return Err(anyhow::anyhow!(
                        "Invalid variable format '{}'. Expected 'KEY=VALUE'",
                        var
                    ));
                }
            }
        }

        Ok(variables)
    }
}
