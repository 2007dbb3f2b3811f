//! csvload CLI - upload CSV files into a relational table
//!
//! # Commands
//!
//! ```bash
//! csvload upload --file users.csv            # Transform, validate and insert rows
//! csvload upload --file users.csv --dry-run  # Same, without inserting
//! csvload create-table                       # Create the configured table
//! csvload check-config                       # Load the configuration and print a summary
//! csvload operations                         # List transformers and validators
//! ```
//!
//! Connect options come from the `database` section of the configuration,
//! overridden by `CSVLOAD_DB_*` environment variables (a `.env` file is
//! read if present) and finally by command line flags.

use clap::{Args, Parser, Subcommand};
use csvload::{logging, Config, ConnectOptions, Uploader};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "csvload", version)]
#[command(about = "Upload CSV files into a MySQL, PostgreSQL or SQLite table", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, env = "CSVLOAD_CONFIG", default_value = "config.json")]
    config: PathBuf,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a CSV file into the configured table
    Upload {
        /// Input CSV file
        #[arg(short, long)]
        file: PathBuf,

        /// Read, transform and validate without inserting
        #[arg(long)]
        dry_run: bool,

        /// Rows per INSERT (overrides the configuration)
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// CSV delimiter, or "auto" (overrides the configuration)
        #[arg(short, long)]
        delimiter: Option<String>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        db: DbArgs,
    },

    /// Create the configured table
    CreateTable {
        #[command(flatten)]
        db: DbArgs,
    },

    /// Load the configuration and print a summary
    CheckConfig,

    /// Show available transformers and validators
    Operations,
}

/// Connect option overrides
#[derive(Args, Debug, Default)]
struct DbArgs {
    /// Database driver: mysql, pgsql or sqlite
    #[arg(long, env = "CSVLOAD_DB_DRIVER")]
    driver: Option<String>,

    /// Database user
    #[arg(short = 'u', long, env = "CSVLOAD_DB_USER")]
    user: Option<String>,

    /// Database password
    #[arg(short = 'p', long, env = "CSVLOAD_DB_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Database host, optionally host:port
    #[arg(short = 'H', long, env = "CSVLOAD_DB_HOST")]
    host: Option<String>,

    /// Database name
    #[arg(long, env = "CSVLOAD_DB_NAME")]
    dbname: Option<String>,

    /// SQLite database file
    #[arg(long, env = "CSVLOAD_DB_PATH")]
    path: Option<String>,
}

impl DbArgs {
    fn into_options(self) -> ConnectOptions {
        ConnectOptions {
            driver: self.driver.unwrap_or_default(),
            host: self.host.unwrap_or_default(),
            user: self.user.unwrap_or_default(),
            password: self.password.unwrap_or_default(),
            dbname: self.dbname.unwrap_or_default(),
            path: self.path.unwrap_or_default(),
            ..ConnectOptions::default()
        }
    }
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Operations => cmd_operations(),

        Commands::CheckConfig => cmd_check_config(&cli.config),

        Commands::Upload {
            file,
            dry_run,
            batch_size,
            delimiter,
            json,
            db,
        } => match load_config(&cli.config, cli.verbose) {
            Ok(config) => cmd_upload(config, &file, dry_run, batch_size, delimiter, json, db).await,
            Err(e) => Err(e),
        },

        Commands::CreateTable { db } => match load_config(&cli.config, cli.verbose) {
            Ok(config) => cmd_create_table(config, db).await,
            Err(e) => Err(e),
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Load the configuration and install logging from it.
fn load_config(path: &Path, verbose: bool) -> Result<Config, Box<dyn std::error::Error>> {
    let config = Config::load(path)?;
    logging::init(&config.log, verbose)?;
    Ok(config)
}

async fn cmd_upload(
    mut config: Config,
    file: &Path,
    dry_run: bool,
    batch_size: Option<usize>,
    delimiter: Option<String>,
    json: bool,
    db: DbArgs,
) -> CliResult {
    if let Some(size) = batch_size {
        config = config.with_batch_size(size);
    }
    if let Some(delimiter) = delimiter {
        config = config.with_separator(delimiter);
    }
    config.validate()?;

    let options = config.connect_options(db.into_options());
    let table = config.table.clone();

    eprintln!("📄 Uploading: {} → {}", file.display(), table);
    if dry_run {
        eprintln!("   Dry run: nothing will be inserted");
    }

    let mut uploader = Uploader::with_database(config);
    let outcome = uploader.upload(file, &options, dry_run).await;
    let closed = uploader.close().await;
    let result = outcome?;
    closed?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", result);
    }

    Ok(())
}

async fn cmd_create_table(config: Config, db: DbArgs) -> CliResult {
    let options = config.connect_options(db.into_options());
    let table = config.table.clone();

    let mut uploader = Uploader::with_database(config);
    let outcome = uploader.create_table(&options).await;
    let closed = uploader.close().await;
    outcome?;
    closed?;

    eprintln!("✅ Table \"{}\" created", table);
    Ok(())
}

fn cmd_check_config(path: &Path) -> CliResult {
    let config = Config::load(path)?;

    println!("Configuration: {}", path.display());
    println!("  Table:      {}", config.table);
    println!("  Separator:  {}", format_delimiter(config.delimiter()?));
    println!("  Batch size: {}", config.batch_size);
    match config.log.file_path() {
        Some(file) => println!("  Log file:   {} ({})", file.display(), config.log.level),
        None => println!("  Log file:   - ({})", config.log.level),
    }
    if !config.database.driver.is_empty() {
        println!("  Driver:     {}", config.database.driver()?);
    }

    println!("\nColumns ({}):", config.columns.len());
    for (name, spec) in config.columns.iter() {
        let mut flags = Vec::new();
        if !spec.nullable {
            flags.push("not null");
        }
        if spec.unique {
            flags.push("unique");
        }
        println!("  {} {:?}{}", name, spec.column_type, format_flags(&flags));

        let transformers: Vec<_> = spec.transformer.iter().map(|t| t.name()).collect();
        if !transformers.is_empty() {
            println!("    transformers: {}", transformers.join(" → "));
        }
        let validators: Vec<_> = spec.validator.iter().map(|v| v.name()).collect();
        if !validators.is_empty() {
            println!("    validators:   {}", validators.join(", "));
        }
    }

    eprintln!("\n✅ Configuration is valid");
    Ok(())
}

fn cmd_operations() -> CliResult {
    println!("{}", csvload::operations_description());
    Ok(())
}

fn format_delimiter(d: Option<u8>) -> String {
    match d {
        None => "auto".to_string(),
        Some(b'\t') => "\\t".to_string(),
        Some(c) => (c as char).to_string(),
    }
}

fn format_flags(flags: &[&str]) -> String {
    if flags.is_empty() {
        String::new()
    } else {
        format!(" [{}]", flags.join(", "))
    }
}
