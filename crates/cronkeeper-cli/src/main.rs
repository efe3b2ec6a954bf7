mod app;
mod jobs;
mod run;
mod watch;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use app::App;

#[derive(Parser)]
#[command(name = "cronkeeper", about = "Manage scheduled shell-script jobs")]
struct Cli {
    /// Config file (defaults to ~/.cronkeeper/config.json5)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List jobs with their schedule and last run
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Add a job and reinstall the schedule table
    Add {
        /// Display name (defaults to the script's file name)
        #[arg(short, long)]
        name: Option<String>,

        /// Five-field schedule expression, e.g. "0 9 * * 1-5"
        #[arg(short, long)]
        schedule: String,

        /// Script to run
        #[arg(long)]
        script: String,

        /// File the wrapper appends output to
        #[arg(long)]
        log: Option<String>,

        /// Store the job without installing it
        #[arg(long)]
        disabled: bool,
    },
    /// Change fields of a job
    Edit {
        /// Job id, id prefix or name
        job: String,

        #[arg(short, long)]
        name: Option<String>,

        #[arg(short, long)]
        schedule: Option<String>,

        #[arg(long)]
        script: Option<String>,

        #[arg(long)]
        log: Option<String>,

        /// Remove the log path
        #[arg(long)]
        clear_log: bool,
    },
    /// Delete a job and its history
    Remove { job: String },
    /// Enable a job
    Enable { job: String },
    /// Disable a job
    Disable { job: String },
    /// Reinstall the schedule table from the stored jobs
    Sync,
    /// Adopt entries of a schedule table as jobs
    Import {
        /// Table file to read (defaults to the installed table)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Describe a schedule expression or table line
    Explain { expression: String },
    /// Show recent runs of a job
    History {
        job: String,

        /// Number of runs to show
        #[arg(short, long, default_value_t = 10)]
        limit: usize,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Run a job's script now and record the outcome
    ///
    /// Schedule-table entries invoke the script path directly and record
    /// nothing. To record scheduled runs, point the scheduled job at a wrapper
    /// that calls `cronkeeper run` for a disabled job holding the real script.
    Run { job: String },
    /// Notify about failed runs until interrupted
    Watch {
        /// Seconds between checks (overrides config)
        #[arg(short, long)]
        interval: Option<u64>,
    },
    /// Write the default config file if none exists
    Init,
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Explain { expression } => {
            println!("{}", jobs::explain(&expression)?);
        }
        Commands::Init => {
            let path = match cli.config {
                Some(path) => path,
                None => cronkeeper_config::config_file_path()?,
            };
            println!("{}", init_config(&path)?);
        }
        command => {
            let config = match &cli.config {
                Some(path) => cronkeeper_config::load_config_from(path)?,
                None => cronkeeper_config::load_config()?,
            };
            let rt = tokio::runtime::Runtime::new()?;
            let code = rt.block_on(async {
                let app = App::open(config).await?;
                dispatch(&app, command).await
            })?;
            if code != 0 {
                drop(rt);
                std::process::exit(code);
            }
        }
    }

    Ok(())
}

/// Write the default config to `path` unless a file is already there.
fn init_config(path: &Path) -> anyhow::Result<String> {
    if path.exists() {
        return Ok(format!("Config already exists at {}", path.display()));
    }
    cronkeeper_config::save_config_to(path, &Default::default())?;
    Ok(format!("Wrote {}", path.display()))
}

/// Run a command that needs the store. Returns the process exit code.
async fn dispatch(app: &App, command: Commands) -> anyhow::Result<i32> {
    match command {
        Commands::List { json } => jobs::run_list(app, json).await?,
        Commands::Add {
            name,
            schedule,
            script,
            log,
            disabled,
        } => jobs::run_add(app, name, schedule, script, log, disabled).await?,
        Commands::Edit {
            job,
            name,
            schedule,
            script,
            log,
            clear_log,
        } => {
            let args = jobs::EditArgs {
                name,
                schedule,
                script,
                log,
                clear_log,
            };
            jobs::run_edit(app, &job, args).await?
        }
        Commands::Remove { job } => jobs::run_remove(app, &job).await?,
        Commands::Enable { job } => jobs::run_set_enabled(app, &job, true).await?,
        Commands::Disable { job } => jobs::run_set_enabled(app, &job, false).await?,
        Commands::Sync => jobs::run_sync(app).await?,
        Commands::Import { file } => jobs::run_import(app, file).await?,
        Commands::History { job, limit, json } => {
            jobs::run_history(app, &job, limit, json).await?
        }
        Commands::Run { job } => return run::run_job(app, &job).await,
        Commands::Watch { interval } => watch::run_watch(app, interval).await?,
        // Handled in main without opening the store.
        Commands::Explain { .. } | Commands::Init => {}
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_add() {
        let cli = Cli::parse_from([
            "cronkeeper",
            "add",
            "--schedule",
            "0 9 * * *",
            "--script",
            "/bin/backup.sh",
            "--disabled",
        ]);
        match cli.command {
            Commands::Add {
                name,
                schedule,
                script,
                log,
                disabled,
            } => {
                assert!(name.is_none());
                assert_eq!(schedule, "0 9 * * *");
                assert_eq!(script, "/bin/backup.sh");
                assert!(log.is_none());
                assert!(disabled);
            }
            _ => panic!("expected add"),
        }
    }

    #[test]
    fn test_init_writes_to_config_override() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("c.json5");
        let cli = Cli::parse_from(["cronkeeper", "--config", path.to_str().unwrap(), "init"]);
        let target = cli.config.unwrap();
        assert!(matches!(cli.command, Commands::Init));

        assert!(init_config(&target).unwrap().starts_with("Wrote"));
        let config = cronkeeper_config::load_config_from(&path).unwrap();
        assert_eq!(config.watch.interval_secs, 30);

        std::fs::write(&path, "{ watch: { interval_secs: 5 } }").unwrap();
        assert!(init_config(&target).unwrap().starts_with("Config already exists"));
        let config = cronkeeper_config::load_config_from(&path).unwrap();
        assert_eq!(config.watch.interval_secs, 5);
    }

    #[test]
    fn test_parse_history_defaults() {
        let cli = Cli::parse_from(["cronkeeper", "history", "backup", "--config", "/tmp/c.json5"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.json5")));
        match cli.command {
            Commands::History { job, limit, json } => {
                assert_eq!(job, "backup");
                assert_eq!(limit, 10);
                assert!(!json);
            }
            _ => panic!("expected history"),
        }
    }
}
