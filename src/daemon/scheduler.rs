use std::time::Duration;

use anyhow::Result;
use chrono::{NaiveDate, NaiveTime};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    config::Config,
    utils::{clock::Clock, time::next_time_of_day},
    window_api::WindowProbe,
};

use super::{
    report::ReportAction,
    session::{Sample, TrackerSession},
    storage::snapshot::SnapshotStorage,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub sample_interval: Duration,
    pub report_time: NaiveTime,
    /// Consecutive failed saves after which tracking gives up.
    pub max_save_failures: u32,
}

impl From<&Config> for SchedulerSettings {
    fn from(config: &Config) -> Self {
        Self {
            sample_interval: config.sample_interval(),
            report_time: config.report_time,
            max_save_failures: config.max_save_failures.max(1),
        }
    }
}

/// Single task driving both periodic activities: sampling the foreground window and the daily
/// report. Nothing else touches the [TrackerSession] while it runs.
pub struct TrackingScheduler<S, R> {
    probe: Box<dyn WindowProbe>,
    storage: S,
    reporter: R,
    clock: Box<dyn Clock>,
    shutdown: CancellationToken,
    settings: SchedulerSettings,
}

impl<S: SnapshotStorage, R: ReportAction> TrackingScheduler<S, R> {
    pub fn new(
        probe: Box<dyn WindowProbe>,
        storage: S,
        reporter: R,
        clock: Box<dyn Clock>,
        shutdown: CancellationToken,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            probe,
            storage,
            reporter,
            clock,
            shutdown,
            settings,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    async fn tick(&mut self, session: &mut TrackerSession) -> Result<()> {
        let key = self.probe.probe();
        let timestamp = self.clock.time();
        debug!("Sampled {key:?}");
        session.fold(Sample { key, timestamp });
        self.storage.save(session.store()).await
    }

    /// Runs until the shutdown token is cancelled, then saves one last time. Returns an error when
    /// saving keeps failing.
    pub async fn run(&mut self, session: &mut TrackerSession) -> Result<()> {
        let interval = self.settings.sample_interval;
        let report_time = self.settings.report_time;

        let mut next_sample = self.clock.instant();
        let mut next_report = next_time_of_day(self.clock.time().naive_local(), report_time);
        let mut last_reported: Option<NaiveDate> = None;
        let mut save_failures = 0u32;
        info!("Tracking every {interval:?}, next report at {next_report}");

        let result = loop {
            if self.clock.instant() >= next_sample {
                next_sample += interval;
                let now = self.clock.instant();
                if next_sample <= now {
                    warn!("Sampling fell behind, skipping missed samples");
                    next_sample = now + interval;
                }

                match self.tick(session).await {
                    Ok(_) => save_failures = 0,
                    Err(e) => {
                        save_failures += 1;
                        error!(
                            "Failed to save activity ({save_failures}/{}) {e:?}",
                            self.settings.max_save_failures
                        );
                        if save_failures >= self.settings.max_save_failures {
                            break Err(e.context("Activity can't be persisted"));
                        }
                    }
                }
            }

            let now = self.clock.time().naive_local();
            if now >= next_report {
                let day = next_report.date();
                if last_reported != Some(day) {
                    self.reporter.generate_report(session.store(), day).await;
                    last_reported = Some(day);
                } else {
                    debug!("Report for {day} already generated");
                }
                next_report = next_time_of_day(self.clock.time().naive_local(), report_time);
                info!("Next report at {next_report}");
            }

            let until_report = (next_report - self.clock.time().naive_local())
                .to_std()
                .unwrap_or_default();
            let wake = next_sample.min(self.clock.instant() + until_report);

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Shutting down tracking");
                    break Ok(());
                }
                _ = self.clock.sleep_until(wake) => ()
            }
        };

        let last_save = self.storage.save(session.store()).await;
        match (result, last_save) {
            (Ok(_), Ok(_)) => Ok(()),
            (Ok(_), Err(e)) => Err(e.context("Failed to save activity on shutdown")),
            (Err(e), Ok(_)) => Err(e),
            (Err(e), Err(last)) => {
                error!("Final save failed as well {last:?}");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        cell::{Cell, RefCell},
        time::Duration,
    };

    use anyhow::{bail, Result};
    use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone};
    use tokio_util::sync::CancellationToken;

    use crate::{
        daemon::{
            report::ReportAction,
            session::TrackerSession,
            storage::{
                entities::{ActivityKey, ActivityStore},
                snapshot::{LoadOutcome, LoadedStore, SnapshotStorage},
            },
        },
        utils::clock::{Clock, TestClock},
        window_api::MockWindowProbe,
    };

    use super::{SchedulerSettings, TrackingScheduler};

    #[derive(Default)]
    struct RecordingStorage {
        saves: RefCell<Vec<ActivityStore>>,
        failures_left: Cell<usize>,
    }

    impl SnapshotStorage for RecordingStorage {
        async fn load(&self) -> Result<LoadedStore> {
            Ok(LoadedStore {
                store: ActivityStore::default(),
                outcome: LoadOutcome::Fresh,
            })
        }

        async fn save(&self, store: &ActivityStore) -> Result<()> {
            self.saves.borrow_mut().push(store.clone());
            if self.failures_left.get() > 0 {
                self.failures_left.set(self.failures_left.get() - 1);
                bail!("disk full");
            }
            Ok(())
        }
    }

    /// Remembers the days reported and how much was tracked on them at that moment.
    #[derive(Default)]
    struct RecordingReporter {
        reports: Vec<(NaiveDate, f64)>,
    }

    impl ReportAction for RecordingReporter {
        async fn generate_report(&mut self, store: &ActivityStore, day: NaiveDate) {
            let total = store.ledger(day).map(|v| v.total()).unwrap_or_default();
            self.reports.push((day, total));
        }
    }

    fn start(hour: u32, minute: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 3, 15, hour, minute, 0)
            .unwrap()
    }

    fn probe_cycling(titles: &'static [&'static str]) -> MockWindowProbe {
        let mut probe = MockWindowProbe::new();
        let mut items = titles.iter().cycle().map(|v| ActivityKey::new_opt(*v));
        probe.expect_probe().returning(move || items.next().flatten());
        probe
    }

    fn scheduler(
        probe: MockWindowProbe,
        storage: RecordingStorage,
        clock: TestClock,
        shutdown: &CancellationToken,
        sample_interval: Duration,
        max_save_failures: u32,
    ) -> TrackingScheduler<RecordingStorage, RecordingReporter> {
        TrackingScheduler::new(
            Box::new(probe),
            storage,
            RecordingReporter::default(),
            Box::new(clock),
            shutdown.clone(),
            SchedulerSettings {
                sample_interval,
                report_time: NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
                max_save_failures,
            },
        )
    }

    async fn run_for(
        scheduler: &mut TrackingScheduler<RecordingStorage, RecordingReporter>,
        session: &mut TrackerSession,
        shutdown: &CancellationToken,
        duration: Duration,
    ) -> Result<()> {
        let (_, result) = tokio::join!(
            async {
                tokio::time::sleep(duration).await;
                shutdown.cancel();
            },
            scheduler.run(session)
        );
        result
    }

    #[tokio::test(start_paused = true)]
    async fn test_samples_accumulate_until_shutdown() -> Result<()> {
        let clock = TestClock::starting_at(start(10, 0));
        let shutdown = CancellationToken::new();
        let mut session = TrackerSession::new(ActivityStore::default(), clock.time());
        let mut scheduler = scheduler(
            probe_cycling(&["Editor", "Editor", "Browser"]),
            RecordingStorage::default(),
            clock,
            &shutdown,
            Duration::from_secs(5),
            3,
        );

        run_for(&mut scheduler, &mut session, &shutdown, Duration::from_secs(31)).await?;

        let ledger = session.store().ledger(start(10, 0).date_naive()).unwrap();
        assert!((ledger.get("Editor").unwrap() - 20. / 60.).abs() < 1e-9);
        assert!((ledger.get("Browser").unwrap() - 10. / 60.).abs() < 1e-9);
        assert!((ledger.total() - 0.5).abs() < 1e-9);

        // Seven samples plus the save on shutdown.
        let saves = scheduler.storage().saves.borrow();
        assert_eq!(saves.len(), 8);
        assert_eq!(saves.last(), Some(session.store()));
        assert!(scheduler.reporter().reports.is_empty());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_report_runs_once_per_day() -> Result<()> {
        let clock = TestClock::starting_at(start(19, 0));
        let shutdown = CancellationToken::new();
        let mut session = TrackerSession::new(ActivityStore::default(), clock.time());
        let mut scheduler = scheduler(
            probe_cycling(&["Editor"]),
            RecordingStorage::default(),
            clock,
            &shutdown,
            Duration::from_secs(60),
            3,
        );

        run_for(
            &mut scheduler,
            &mut session,
            &shutdown,
            Duration::from_secs(26 * 60 * 60),
        )
        .await?;

        let reports = &scheduler.reporter().reports;
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].0, NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());
        assert!((reports[0].1 - 60.).abs() < 1e-6);
        // The minute before midnight is credited to the new day.
        assert_eq!(reports[1].0, NaiveDate::from_ymd_opt(2024, 3, 16).unwrap());
        assert!((reports[1].1 - 1201.).abs() < 1e-6);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_save_failures_are_tolerated() -> Result<()> {
        let clock = TestClock::starting_at(start(10, 0));
        let shutdown = CancellationToken::new();
        let mut session = TrackerSession::new(ActivityStore::default(), clock.time());
        let storage = RecordingStorage::default();
        storage.failures_left.set(2);
        let mut scheduler = scheduler(
            probe_cycling(&["Editor"]),
            storage,
            clock,
            &shutdown,
            Duration::from_secs(5),
            3,
        );

        run_for(&mut scheduler, &mut session, &shutdown, Duration::from_secs(11)).await?;

        assert_eq!(scheduler.storage().saves.borrow().len(), 4);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_save_failures_stop_tracking() -> Result<()> {
        let clock = TestClock::starting_at(start(10, 0));
        let shutdown = CancellationToken::new();
        let mut session = TrackerSession::new(ActivityStore::default(), clock.time());
        let storage = RecordingStorage::default();
        storage.failures_left.set(usize::MAX);
        let mut scheduler = scheduler(
            probe_cycling(&["Editor"]),
            storage,
            clock,
            &shutdown,
            Duration::from_secs(5),
            3,
        );

        let result = scheduler.run(&mut session).await;

        assert!(result.is_err());
        // Three failed samples and the last attempt on the way out.
        assert_eq!(scheduler.storage().saves.borrow().len(), 4);
        Ok(())
    }
}
