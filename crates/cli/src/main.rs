mod commands;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use commands::*;
use logging::LoggingConfig;

#[derive(Parser)]
#[command(name = "tidemark")]
#[command(about = "Keep MySQL tables in line with annotated models")]
struct Cli {
    /// Database connection URL
    #[arg(long, env = "DATABASE_URL", global = true)]
    database_url: Option<String>,

    /// Directory holding migration files
    #[arg(long, default_value = "migrations", global = true)]
    migrations_dir: PathBuf,

    /// Log level filter (RUST_LOG takes precedence)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database migration management
    Migrate {
        #[command(subcommand)]
        migrate_command: MigrateCommands,
    },

    /// Table synchronisation and rewrites
    Table {
        #[command(subcommand)]
        table_command: TableCommands,
    },
}

#[derive(Subcommand)]
enum MigrateCommands {
    /// Create an empty migration
    Make {
        /// Migration name
        name: String,
    },

    /// Generate a migration from a model definition
    Generate {
        /// Migration name
        name: String,

        /// Model definition file (YAML or JSON)
        #[arg(long)]
        model: PathBuf,
    },

    /// Run pending migrations
    Run {
        /// Print the statements without executing them
        #[arg(long)]
        pretend: bool,
    },

    /// Roll back the last batches
    Rollback {
        /// Number of batches to roll back
        #[arg(long, default_value = "1")]
        steps: usize,
    },

    /// Roll back every migration
    Reset,

    /// Show migration status
    Status,
}

#[derive(Subcommand)]
enum TableCommands {
    /// Bring a table in line with its model
    Update {
        /// Model definition file (YAML or JSON)
        #[arg(long)]
        model: PathBuf,

        /// Apply renames and drops without asking
        #[arg(long)]
        yes: bool,

        /// Only print the plan
        #[arg(long)]
        dry_run: bool,
    },

    /// Rewrite a table with a partition clause
    Partition {
        /// Table name
        table: String,

        /// Partition column
        #[arg(long)]
        column: String,

        /// Partitioning function
        #[arg(long, value_enum, default_value = "hash")]
        kind: PartitionKindArg,

        /// Number of partitions
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        count: u32,

        /// Rows per copy batch
        #[arg(long, default_value = "10000")]
        batch_size: u64,
    },

    /// Rewrite a partitioned table without its partition clause
    Unpartition {
        /// Table name
        table: String,

        /// Rows per copy batch
        #[arg(long, default_value = "10000")]
        batch_size: u64,
    },

    /// Drop shadow and old tables left by an interrupted rewrite
    Cleanup {
        /// Table name
        table: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PartitionKindArg {
    Hash,
    Key,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut logging = LoggingConfig::default().with_level(&cli.log_level);
    logging.json_format = cli.json_logs;
    logging::init_logging(&logging)?;

    let context = Context {
        database_url: cli.database_url,
        migrations_dir: cli.migrations_dir,
    };

    match cli.command {
        Commands::Migrate { migrate_command } => match migrate_command {
            MigrateCommands::Make { name } => migrate::make(&context, &name).await?,
            MigrateCommands::Generate { name, model } => {
                migrate::generate(&context, &name, &model).await?
            }
            MigrateCommands::Run { pretend } => migrate::run(&context, pretend).await?,
            MigrateCommands::Rollback { steps } => migrate::rollback(&context, steps).await?,
            MigrateCommands::Reset => migrate::reset(&context).await?,
            MigrateCommands::Status => migrate::status(&context).await?,
        },
        Commands::Table { table_command } => match table_command {
            TableCommands::Update {
                model,
                yes,
                dry_run,
            } => table::update(&context, &model, yes, dry_run).await?,
            TableCommands::Partition {
                table: name,
                column,
                kind,
                count,
                batch_size,
            } => {
                let kind = match kind {
                    PartitionKindArg::Hash => tidemark_schema::PartitionKind::Hash,
                    PartitionKindArg::Key => tidemark_schema::PartitionKind::Key,
                };
                table::partition(&context, &name, &column, kind, count, batch_size).await?
            }
            TableCommands::Unpartition { table: name, batch_size } => {
                table::unpartition(&context, &name, batch_size).await?
            }
            TableCommands::Cleanup { table: name } => table::cleanup(&context, &name).await?,
        },
    }

    Ok(())
}
