//! Command-line entry point for connection checks and schema migrations.
//!
//! # Responsibility
//! - Build a `ClientConfig` from flags and connect.
//! - Drive the migration runner over a directory of SQL files.

use clap::{Args, Parser, Subcommand};
use log::error;
use repokit_core::{init_logging, Client, ClientConfig, Context, MigrateError, Runner};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "repokit", version, about = "SQLite repository toolkit", long_about = None)]
struct Cli {
    /// SQLite database path, or `:memory:`.
    #[arg(long, default_value = repokit_core::db::MEMORY_DSN)]
    db: String,

    /// Log level for the rolling file logger.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Absolute directory for log files; logging stays off when omitted.
    #[arg(long)]
    log_dir: Option<String>,

    /// Overall deadline for the command in seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Connect and run a trivial query.
    Ping,
    /// Apply or revert migrations from a directory.
    Migrate(MigrateArgs),
}

#[derive(Debug, Args)]
struct MigrateArgs {
    /// Directory holding `<version>_<name>.up.sql` / `.down.sql` files.
    #[arg(long, default_value = "migrations")]
    dir: PathBuf,

    /// Tracking table name.
    #[arg(long, default_value = repokit_core::db::migrations::DEFAULT_TABLE)]
    table: String,

    #[command(subcommand)]
    action: MigrateAction,
}

#[derive(Debug, Subcommand)]
enum MigrateAction {
    Up,
    UpOne,
    UpTo { version: String },
    Down,
    DownTo { version: String },
    Reset,
    Refresh,
    Status,
    Version,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Some(log_dir) = &cli.log_dir {
        if let Err(err) = init_logging(&cli.log_level, log_dir) {
            eprintln!("logging disabled: {err}");
        }
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("event=cli_command module=cli status=error error={message}");
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), String> {
    let ctx = match cli.timeout_secs {
        Some(secs) => Context::background().with_timeout(Duration::from_secs(secs)),
        None => Context::background(),
    };
    let client = Client::open(ClientConfig::sqlite(cli.db.as_str()), &ctx)
        .map_err(|err| err.to_string())?;

    let result = match &cli.command {
        Command::Ping => client
            .ping(&ctx)
            .map(|()| println!("ok"))
            .map_err(|err| err.to_string()),
        Command::Migrate(args) => migrate(&client, &ctx, args).map_err(|err| err.to_string()),
    };
    client.close();
    result
}

fn migrate(client: &Client, ctx: &Context, args: &MigrateArgs) -> Result<(), MigrateError> {
    let mut runner = Runner::new(client.clone()).with_table(args.table.as_str())?;
    runner.load_dir(&args.dir)?;

    let changed = match &args.action {
        MigrateAction::Up => runner.up(ctx)?,
        MigrateAction::UpOne => runner.up_one(ctx)?,
        MigrateAction::UpTo { version } => runner.up_to(ctx, version)?,
        MigrateAction::Down => runner.down(ctx)?,
        MigrateAction::DownTo { version } => runner.down_to(ctx, version)?,
        MigrateAction::Reset => runner.reset(ctx)?,
        MigrateAction::Refresh => runner.refresh(ctx)?,
        MigrateAction::Status => {
            for status in runner.status(ctx)? {
                let state = match (status.registered, status.applied) {
                    (true, true) => "applied",
                    (false, true) => "applied (not registered)",
                    _ => "pending",
                };
                let applied_at = status
                    .applied_at
                    .map(|at| at.to_rfc3339())
                    .unwrap_or_default();
                println!("{}\t{}\t{state}\t{applied_at}", status.version, status.name);
            }
            return Ok(());
        }
        MigrateAction::Version => {
            println!("{}", runner.version(ctx)?.unwrap_or_default());
            return Ok(());
        }
    };
    println!("{changed} migration(s)");
    Ok(())
}
