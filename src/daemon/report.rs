use std::future::Future;

use chrono::NaiveDate;
use tracing::{error, info, instrument};

use crate::{
    report::{
        chart::{render_monthly_chart, ChartRenderer},
        ledger_rows,
        sync::{ExternalStore, ReportSynchronizer},
    },
    utils::time::is_last_day_of_month,
};

use super::storage::entities::ActivityStore;

/// Action run once a day by the scheduler. Failures are dealt with inside, tracking goes on
/// regardless.
pub trait ReportAction {
    fn generate_report(
        &mut self,
        store: &ActivityStore,
        day: NaiveDate,
    ) -> impl Future<Output = ()>;
}

/// Logs the day, exports it to the external store and, on the last day of a month, draws the
/// month's chart.
pub struct DailyReport<S, C> {
    synchronizer: ReportSynchronizer<S>,
    renderer: C,
    top_n: usize,
}

impl<S: ExternalStore, C: ChartRenderer> DailyReport<S, C> {
    pub fn new(synchronizer: ReportSynchronizer<S>, renderer: C, top_n: usize) -> Self {
        Self {
            synchronizer,
            renderer,
            top_n,
        }
    }

    pub fn synchronizer(&self) -> &ReportSynchronizer<S> {
        &self.synchronizer
    }
}

impl<S: ExternalStore, C: ChartRenderer> ReportAction for DailyReport<S, C> {
    #[instrument(skip(self, store))]
    async fn generate_report(&mut self, store: &ActivityStore, day: NaiveDate) {
        let Some(ledger) = store.ledger(day) else {
            info!("No data for {day}");
            return;
        };

        info!("Daily report for {day}");
        for row in ledger_rows(day, ledger) {
            info!("{}: {}", row.key, row.formatted);
        }

        match self.synchronizer.sync(day, ledger).await {
            Ok(report) => info!(
                "Uploaded {} rows of {day} to {}",
                report.inserted, report.segment
            ),
            Err(e) => error!("Failed to upload {day}, it can be retried with `sync`: {e}"),
        }

        if is_last_day_of_month(day) {
            if let Err(e) = render_monthly_chart(store, day, self.top_n, &self.renderer).await {
                error!("Failed to render monthly chart {e:?}");
            }
        }
    }
}
