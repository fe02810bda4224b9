//! docbank - typed key-value storage on CouchDB.
//!
//! This is the main entry point for the docbank CLI.

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use docbank_couchdb::{CouchConfig, CouchDbDatabank};
use docbank_storage::{ConnectParams, Databank, MemoryDatabank};
use docbank_util::{LogConfig, LogLevel};
use tracing::debug;

#[derive(Parser)]
#[command(name = "docbank")]
#[command(author, version, about = "Typed key-value storage on CouchDB", long_about = None)]
struct Cli {
    /// Storage backend
    #[arg(long, value_enum, default_value_t = Driver::Couchdb, global = true)]
    driver: Driver,

    /// CouchDB server address (overrides config)
    #[arg(long, global = true)]
    location: Option<String>,

    /// Database name (overrides config)
    #[arg(long, global = true)]
    database: Option<String>,

    /// Basic auth user (overrides config)
    #[arg(long, global = true)]
    username: Option<String>,

    /// Basic auth password (overrides config)
    #[arg(long, global = true)]
    password: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error); overrides --verbose
    #[arg(long, global = true, value_parser = parse_log_level)]
    log_level: Option<LogLevel>,

    /// Subcommand
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Driver {
    /// CouchDB over HTTP
    Couchdb,
    /// In-process store, lost on exit
    Memory,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Store a new value
    Create {
        kind: String,
        id: String,
        /// Value as JSON
        value: String,
    },
    /// Overwrite an existing value
    Update {
        kind: String,
        id: String,
        /// Value as JSON
        value: String,
    },
    /// Create or overwrite a value
    Save {
        kind: String,
        id: String,
        /// Value as JSON
        value: String,
    },
    /// Print a stored value
    Read { kind: String, id: String },
    /// Delete a stored value
    Delete { kind: String, id: String },
    /// Print every value of a kind matching all filters
    Search {
        kind: String,
        /// Filter as PATH=JSON, e.g. `address.city="Oslo"`
        #[arg(long = "where", value_name = "PATH=JSON")]
        filters: Vec<String>,
    },
    /// Print many values of one kind at once
    ReadAll {
        kind: String,
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Check that the backend is reachable
    Ping,
    /// Show the effective configuration
    Config,
}

fn parse_log_level(s: &str) -> Result<LogLevel, String> {
    LogLevel::parse(s).ok_or_else(|| format!("unknown log level: {s}"))
}

impl Cli {
    fn log_level(&self) -> LogLevel {
        match (self.log_level, self.verbose) {
            (Some(level), _) => level,
            (None, true) => LogLevel::Debug,
            (None, false) => LogLevel::default(),
        }
    }

    /// Apply command-line overrides on top of loaded configuration.
    fn apply_overrides(&self, config: &mut CouchConfig) {
        if let Some(location) = &self.location {
            config.location = location.clone();
        }
        if let Some(database) = &self.database {
            config.database = Some(database.clone());
        }
        if let Some(username) = &self.username {
            config.username = Some(username.clone());
        }
        if let Some(password) = &self.password {
            config.password = Some(password.clone());
        }
    }
}

fn open_databank(driver: Driver, config: CouchConfig) -> Box<dyn Databank> {
    match driver {
        Driver::Couchdb => Box::new(CouchDbDatabank::new(config)),
        Driver::Memory => Box::new(MemoryDatabank::new()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    docbank_util::log::init(LogConfig {
        level: cli.log_level(),
        ..Default::default()
    });

    let cwd = std::env::current_dir()?;
    let (mut config, sources) = CouchConfig::load(Some(&cwd)).await?;
    cli.apply_overrides(&mut config);
    debug!(sources = sources.len(), driver = ?cli.driver, "Configuration loaded");

    if let Commands::Config = cli.command {
        return commands::show_config(&config, &sources);
    }

    let bank = open_databank(cli.driver, config.clone());
    bank.connect(&ConnectParams::new()).await?;
    let result = run_command(bank.as_ref(), cli.command, cli.driver, &config).await;
    bank.disconnect().await?;
    result
}

async fn run_command(
    bank: &dyn Databank,
    command: Commands,
    driver: Driver,
    config: &CouchConfig,
) -> anyhow::Result<()> {
    match command {
        Commands::Create { kind, id, value } => {
            let value = commands::parse_value(&value)?;
            commands::print_json(&bank.create(&kind, &id, value).await?)
        }
        Commands::Update { kind, id, value } => {
            let value = commands::parse_value(&value)?;
            commands::print_json(&bank.update(&kind, &id, value).await?)
        }
        Commands::Save { kind, id, value } => {
            let value = commands::parse_value(&value)?;
            commands::print_json(&bank.save(&kind, &id, value).await?)
        }
        Commands::Read { kind, id } => commands::print_json(&bank.read(&kind, &id).await?),
        Commands::Delete { kind, id } => {
            bank.del(&kind, &id).await?;
            Ok(())
        }
        Commands::Search { kind, filters } => commands::search(bank, &kind, &filters).await,
        Commands::ReadAll { kind, ids } => commands::read_all(bank, &kind, &ids).await,
        Commands::Ping => commands::ping(driver == Driver::Memory, config),
        Commands::Config => Ok(()),
    }
}
