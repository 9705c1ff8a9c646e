// ABOUTME: Main application orchestration for the cntr CLI
// ABOUTME: Coordinates between CLI arguments, configuration, and command execution

use anyhow::Result;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use super::args::ConfigAction;
use super::commands;
use super::{Args, Commands, Config};

pub struct App {
    config: Config,
}

impl App {
    /// Create a new application instance
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Initialize logging based on configuration
    pub fn init_logging(&self, verbose: bool, no_color: bool) -> Result<()> {
        let log_level = if verbose {
            "debug"
        } else {
            &self.config.logging.level
        };

        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

        let result = match self.config.logging.format.as_str() {
            "compact" => tracing_subscriber::fmt()
                .compact()
                .with_env_filter(env_filter)
                .with_ansi(!no_color)
                .with_target(false)
                .with_writer(std::io::stderr)
                .try_init(),
            _ => tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_ansi(!no_color)
                .with_target(false)
                .with_writer(std::io::stderr)
                .try_init(),
        };
        result.map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

        debug!("Logging initialized with level: {}", log_level);
        Ok(())
    }

    /// Run the application with parsed arguments
    pub async fn run(&mut self, args: Args) -> Result<()> {
        self.init_logging(args.verbose, args.no_color)?;

        info!("Starting cntr v{}", env!("CARGO_PKG_VERSION"));
        debug!("Configuration loaded from: {}", self.config.path.display());

        if let Some(catalog) = args.catalog {
            self.config.catalog_dir = catalog;
        }

        match args.command {
            Commands::List => commands::list_services(&self.config).await,

            Commands::Add { names } => commands::add_services(names, &self.config).await,

            Commands::Remove { names, force } => {
                commands::remove_services(names, force, &self.config).await
            }

            Commands::Info { names } => commands::show_info(names, &self.config).await,

            Commands::Render {
                names,
                vars,
                output,
                with_deps,
                dry_run,
            } => commands::render_services(names, vars, output, with_deps, dry_run, &self.config)
                .await
                .map(|_| ()),

            Commands::Check => commands::check_catalog(&self.config).await.map(|_| ()),

            Commands::Config { action } => match action {
                ConfigAction::Set { vars } => commands::config_set(vars, &self.config).await,
                ConfigAction::Unset { keys } => commands::config_unset(keys, &self.config).await,
                ConfigAction::List => commands::config_list(&self.config).await,
                ConfigAction::Reload => {
                    self.config = commands::config_reload(&self.config).await?;
                    Ok(())
                }
            },
        }
    }

    /// Create application from command line arguments
    pub fn from_args(args: &Args) -> Result<Self> {
        let config = Config::load(args.config.clone())?;
        Ok(Self::new(config))
    }
}
