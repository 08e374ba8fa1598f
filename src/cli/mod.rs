pub mod dates;
pub mod process;
pub mod report;
pub mod sync;

use std::{path::PathBuf, process::ExitCode};

use anyhow::Result;
use chrono::Local;
use clap::{Parser, Subcommand};
use dates::{parse_day, parse_month, DateStyle};
use now::DateTimeNow;
use process::{restart_server, stop_trackers};
use sync::{resync, SyncCommand};
use tracing::level_filters::LevelFilter;

use crate::{
    config::Config,
    daemon::{
        args::TrackerOverrides,
        start_daemon,
        storage::{entities::ActivityStore, snapshot::JsonSnapshotStorage},
    },
    report::{chart::SvgChartRenderer, sheets::GoogleSheetsStore, sync::ReportSynchronizer},
    utils::{
        dir::resolve_application_dir,
        logging::{enable_logging, CLI_PREFIX, DAEMON_PREFIX},
    },
};

#[derive(Parser, Debug)]
#[command(name = "activity-tracker", version, long_about = None)]
#[command(about = "Tracks time spent in foreground windows and reports it daily", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long = "log-console", help = "Mirror logs to the console")]
    log_console: bool,
    #[arg(long = "log-filter", help = "Log level, overrides RUST_LOG")]
    log_filter: Option<LevelFilter>,
    #[arg(
        long,
        global = true,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Starts a tracker in the background, replacing a running one")]
    Init {
        #[command(flatten)]
        overrides: TrackerOverrides,
    },
    #[command(
        about = "Run the tracker directly in current console. Used for creating a daemon internally and for debugging"
    )]
    Serve {
        #[command(flatten)]
        overrides: TrackerOverrides,
    },
    #[command(about = "Stop currently running tracker")]
    Stop {},
    #[command(about = "Print the activity of a day")]
    Report {
        #[arg(
            long,
            help = "Day to print, today by default. Examples are \"yesterday\", \"2024-03-15\", \"15/03/2024\""
        )]
        date: Option<String>,
        #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
        date_style: DateStyle,
    },
    #[command(about = "Upload days to the spreadsheet again")]
    Sync {
        #[command(flatten)]
        command: SyncCommand,
    },
    #[command(about = "Render the chart of a month")]
    Chart {
        #[arg(long, help = "Month as YYYY-MM, the current one by default")]
        month: Option<String>,
    },
    #[command(about = "List days with recorded activity")]
    Dates {},
}

async fn read_store(dir: &std::path::Path) -> Result<ActivityStore> {
    JsonSnapshotStorage::new(dir)?.read().await
}

pub async fn run_cli() -> Result<ExitCode> {
    let args = Args::parse();
    let dir = resolve_application_dir(args.dir.as_deref())?;

    let prefix = match args.commands {
        Commands::Serve { .. } => DAEMON_PREFIX,
        _ => CLI_PREFIX,
    };
    enable_logging(prefix, &dir, args.log_filter, args.log_console)?;

    let mut config = Config::load(&dir)?;
    let mut out = std::io::stdout();

    match args.commands {
        Commands::Init { overrides } => {
            let mut serve_args = vec!["--dir".to_string(), dir.to_string_lossy().to_string()];
            serve_args.extend(overrides.to_args());
            restart_server(serve_args)?;
        }
        Commands::Stop {} => {
            let stopped = stop_trackers()?;
            println!("Stopped {stopped} tracker(s)");
        }
        Commands::Serve { overrides } => {
            overrides.apply(&mut config);
            start_daemon(dir, config).await?;
        }
        Commands::Report { date, date_style } => {
            let now = Local::now();
            let day = match date {
                Some(date) => parse_day(&date, date_style, now)?,
                None => now.date_naive(),
            };
            report::print_day(&read_store(&dir).await?, day, &mut out)?;
        }
        Commands::Sync { command } => {
            let store = read_store(&dir).await?;
            let dates = command.dates(&store, Local::now())?;
            let sheets = GoogleSheetsStore::new(config.sheets_settings(&dir))?;
            let mut synchronizer = ReportSynchronizer::new(sheets);
            let summary = resync(
                &mut synchronizer,
                &store,
                &dates,
                config.resync_pause(),
                &mut out,
            )
            .await?;
            if !summary.is_success() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Chart { month } => {
            let month = match month {
                Some(month) => parse_month(&month)?,
                None => Local::now().beginning_of_month().date_naive(),
            };
            let renderer = SvgChartRenderer::new(config.chart_dir(&dir));
            report::print_chart(
                &read_store(&dir).await?,
                month,
                config.top_n,
                &renderer,
                &mut out,
            )
            .await?;
        }
        Commands::Dates {} => report::print_dates(&read_store(&dir).await?, &mut out)?,
    }
    Ok(ExitCode::SUCCESS)
}
