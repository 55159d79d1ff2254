//! Command-line front-end for floodgate migrations.
//!
//! Applications build their own binary: register migrations, hand the
//! registration function to [`run`], and the CLI takes care of argument
//! parsing, configuration, confirmation prompts, and rendering.
//!
//! ```no_run
//! use floodgate::{Migration, Migrator};
//!
//! fn register(migrator: &mut Migrator) {
//!     migrator.must_add(
//!         Migration::new("001", "create_users")
//!             .up_sql("CREATE TABLE users (id INT)")
//!             .down_sql("DROP TABLE users"),
//!     );
//! }
//!
//! fn main() -> std::process::ExitCode {
//!     floodgate_cli::run(register)
//! }
//! ```
//!
//! Configuration precedence: flags, then `FLOODGATE_*` environment
//! variables, then a `.floodgate` config file.

pub mod output;
pub mod scaffold;
pub mod settings;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use floodgate::{CancelToken, Direction, Driver, MigrateError, Migrator};
use scaffold::TemplateKind;
use settings::Settings;

#[derive(Parser)]
#[command(name = "floodgate", about = "Database migration tool", version)]
struct Cli {
    /// Driver name: sqlite, postgres, cockroachdb
    #[arg(long, global = true)]
    driver: Option<String>,

    /// Database connection string
    #[arg(long, global = true)]
    dsn: Option<String>,

    /// Bookkeeping table name
    #[arg(long, global = true)]
    table: Option<String>,

    /// Lock timeout in seconds
    #[arg(long, global = true)]
    lock_timeout: Option<u64>,

    /// Answer yes to confirmation prompts
    #[arg(short, long, global = true)]
    yes: bool,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply pending migrations
    Up {
        /// Number of migrations to apply (0 = all)
        #[arg(long, default_value_t = 0)]
        steps: usize,
    },
    /// Roll back applied migrations
    Down {
        /// Number of migrations to roll back
        #[arg(long, default_value_t = 1)]
        steps: usize,
    },
    /// Roll back every applied migration
    Reset,
    /// Show the state of every migration
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Verify registered migrations against the applied set
    Validate,
    /// Print the tool version
    Version,
    /// Show what an up or down run would execute
    Plan {
        #[arg(long, default_value = "up")]
        direction: Direction,
        /// Limit the number of planned migrations
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Show the plan for one specific version
    Explain {
        version: String,
        #[arg(long)]
        json: bool,
    },
    /// Scaffold a new migration source file
    Create {
        name: String,
        /// Template kind: sql or code
        #[arg(long = "type", default_value = "sql")]
        kind: String,
        /// Directory to create the file in
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

/// Run the CLI with the given migration registration function.
///
/// Returns the process exit code: 0 on success, distinct non-zero codes
/// for lock timeouts, checksum mismatches, and missing migrations (see
/// [`output::exit_code`]).
pub fn run(register: impl Fn(&mut Migrator)) -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let json = wants_json(&cli.command);
    match execute(&cli, register) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            output::print_error(&err, json);
            ExitCode::from(output::exit_code(&err))
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose { "debug" } else { "warn" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

fn wants_json(command: &Command) -> bool {
    matches!(
        command,
        Command::Status { json: true }
            | Command::Plan { json: true, .. }
            | Command::Explain { json: true, .. }
    )
}

fn execute(cli: &Cli, register: impl Fn(&mut Migrator)) -> Result<(), MigrateError> {
    let settings = merged_settings(cli)?;

    match &cli.command {
        Command::Version => {
            println!("floodgate {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Command::Create { name, kind, dir } => {
            let kind = TemplateKind::parse(kind).ok_or_else(|| MigrateError::Naming {
                message: format!("invalid migration type {kind:?} (expected sql or code)"),
            })?;
            let dir = dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(&settings.migrations_dir));
            let path = scaffold::create_migration_file(
                &dir,
                &settings.scaffold_naming(),
                name,
                kind,
            )?;
            println!("created {}", path.display());
            println!("fill in the migration body, then register it where your");
            println!("binary builds its Migrator: migrator.must_add(<module>::migration());");
            Ok(())
        }
        command => {
            let mut migrator = build_migrator(&settings, &register)?;
            let result = run_command(command, cli, &mut migrator);
            let close_result = migrator.close();
            result.and(close_result)
        }
    }
}

fn merged_settings(cli: &Cli) -> Result<Settings, MigrateError> {
    let mut settings = Settings::load()?;
    if let Some(driver) = &cli.driver {
        settings.driver = driver.clone();
    }
    if let Some(dsn) = &cli.dsn {
        settings.dsn = dsn.clone();
    }
    if let Some(table) = &cli.table {
        settings.table = table.clone();
    }
    if let Some(lock_timeout) = cli.lock_timeout {
        settings.lock_timeout = lock_timeout;
    }
    Ok(settings)
}

fn build_migrator(
    settings: &Settings,
    register: &impl Fn(&mut Migrator),
) -> Result<Migrator, MigrateError> {
    let driver = open_driver(settings)?;
    let mut migrator = Migrator::with_boxed_driver(driver, settings.engine_config()?);
    register(&mut migrator);
    Ok(migrator)
}

fn open_driver(settings: &Settings) -> Result<Box<dyn Driver>, MigrateError> {
    match settings.driver.as_str() {
        #[cfg(feature = "sqlite")]
        "sqlite" => Ok(Box::new(
            floodgate::drivers::SqliteDriver::open_with_table_name(
                &settings.dsn,
                settings.table.clone(),
            )?,
        )),
        #[cfg(feature = "postgres")]
        "postgres" => Ok(Box::new(
            floodgate::drivers::PostgresDriver::connect_with_table_name(
                &settings.dsn,
                settings.table.clone(),
            )?,
        )),
        #[cfg(feature = "postgres")]
        "cockroachdb" => Ok(Box::new(
            floodgate::drivers::CockroachDriver::connect_with_table_name(
                &settings.dsn,
                settings.table.clone(),
            )?,
        )),
        _ => Err(MigrateError::NoDriver),
    }
}

fn run_command(
    command: &Command,
    cli: &Cli,
    migrator: &mut Migrator,
) -> Result<(), MigrateError> {
    let cancel = CancelToken::never();

    match command {
        Command::Up { steps } => {
            let applied = if *steps > 0 {
                migrator.up_steps(&cancel, *steps)?
            } else {
                migrator.up(&cancel)?
            };
            println!("applied {applied} migration(s)");
            Ok(())
        }
        Command::Down { steps } => {
            confirm(cli, &format!("roll back {steps} migration(s)"))?;
            let rolled_back = migrator.down(&cancel, *steps)?;
            println!("rolled back {rolled_back} migration(s)");
            Ok(())
        }
        Command::Reset => {
            confirm(cli, "roll back ALL migrations")?;
            let rolled_back = migrator.reset(&cancel)?;
            println!("rolled back {rolled_back} migration(s)");
            Ok(())
        }
        Command::Status { json } => {
            let statuses = migrator.status(&cancel)?;
            if *json {
                output::print_json(&statuses)
            } else {
                output::print_status_table(&statuses);
                Ok(())
            }
        }
        Command::Validate => {
            migrator.validate(&cancel)?;
            println!("all applied migrations match their registered content");
            Ok(())
        }
        Command::Plan {
            direction,
            limit,
            json,
        } => {
            let plans = migrator.dry_run(&cancel, *direction, *limit)?;
            if *json {
                output::print_json(&plans)
            } else {
                output::print_plans(&plans);
                Ok(())
            }
        }
        Command::Explain { version, json } => {
            let plan = migrator.explain(&cancel, version)?;
            if *json {
                output::print_json(&plan)
            } else {
                output::print_plans(std::slice::from_ref(&plan));
                Ok(())
            }
        }
        Command::Version | Command::Create { .. } => unreachable!("handled before driver setup"),
    }
}

fn confirm(cli: &Cli, operation: &str) -> Result<(), MigrateError> {
    if cli.yes {
        return Ok(());
    }
    let confirmed = dialoguer::Confirm::new()
        .with_prompt(format!("About to {operation}. Continue?"))
        .default(false)
        .interact()
        .map_err(MigrateError::database)?;
    if confirmed {
        Ok(())
    } else {
        Err(MigrateError::Cancelled)
    }
}
