use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use report::DailyReport;
use scheduler::{SchedulerSettings, TrackingScheduler};
use session::TrackerSession;
use storage::snapshot::{JsonSnapshotStorage, LoadOutcome, SnapshotStorage};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    config::Config,
    fs::operations::ProcessLock,
    report::{chart::SvgChartRenderer, sheets::GoogleSheetsStore, sync::ReportSynchronizer},
    utils::clock::{Clock, DefaultClock},
    window_api::{GenericWindowProbe, WindowProbe},
};

pub mod args;
pub mod report;
pub mod scheduler;
pub mod session;
pub mod shutdown;
pub mod storage;

pub const LOCK_FILE_NAME: &str = "tracker.lock";

/// Represents the starting point for the daemon. Returns once an interrupt was received and the
/// activity was saved.
pub async fn start_daemon(dir: PathBuf, config: Config) -> Result<()> {
    let lock = ProcessLock::acquire(dir.join(LOCK_FILE_NAME))
        .await
        .context("Failed to lock the application directory")?;

    let storage = JsonSnapshotStorage::new(&dir)?;
    let clock = DefaultClock;
    let mut session = restore_session(&storage, &clock).await?;

    let reporter = create_reporter(&dir, &config)?;
    let shutdown_token = CancellationToken::new();
    let mut scheduler = create_scheduler(
        GenericWindowProbe::new(),
        storage,
        reporter,
        &shutdown_token,
        clock,
        SchedulerSettings::from(&config),
    );

    let signals = tokio::spawn(shutdown::detect_shutdown(shutdown_token));
    let result = scheduler.run(&mut session).await;
    signals.abort();

    if let Err(e) = lock.release().await {
        warn!("Failed to release tracker lock {e:?}");
    }
    result.inspect_err(|e| error!("Tracking stopped {e:?}"))
}

async fn restore_session(
    storage: &impl SnapshotStorage,
    clock: &impl Clock,
) -> Result<TrackerSession> {
    let loaded = storage.load().await?;
    match &loaded.outcome {
        LoadOutcome::Fresh => info!("Starting with no prior activity"),
        LoadOutcome::Restored => info!("Continuing from saved activity"),
        LoadOutcome::Corrupt { reason, .. } => {
            warn!("Saved activity was lost: {reason}")
        }
    }
    Ok(TrackerSession::new(loaded.store, clock.time()))
}

pub fn create_reporter(
    dir: &Path,
    config: &Config,
) -> Result<DailyReport<GoogleSheetsStore, SvgChartRenderer>> {
    let sheets = GoogleSheetsStore::new(config.sheets_settings(dir))?;
    Ok(DailyReport::new(
        ReportSynchronizer::new(sheets),
        SvgChartRenderer::new(config.chart_dir(dir)),
        config.top_n,
    ))
}

fn create_scheduler<S: SnapshotStorage, R: report::ReportAction>(
    probe: impl WindowProbe + 'static,
    storage: S,
    reporter: R,
    shutdown_token: &CancellationToken,
    clock: impl Clock,
    settings: SchedulerSettings,
) -> TrackingScheduler<S, R> {
    TrackingScheduler::new(
        Box::new(probe),
        storage,
        reporter,
        Box::new(clock),
        shutdown_token.clone(),
        settings,
    )
}
