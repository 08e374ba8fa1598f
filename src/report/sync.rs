use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::{
    daemon::storage::entities::DailyLedger,
    utils::time::{month_name, parse_record_name},
};

use super::{ledger_rows, ReportRow, SEGMENT_HEADER};

/// Ways talking to the external store can fail. None of them are fatal to tracking.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("credentials are unusable: {0}")]
    Credentials(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("request timed out")]
    Timeout,
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("service responded with {status}: {message}")]
    Api { status: u16, message: String },
    #[error("segment {0:?} is unavailable")]
    SegmentUnavailable(String),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// A month-scoped part of the external store, a worksheet in spreadsheet terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub id: i64,
    pub title: String,
}

/// Minimal set of operations needed from an append-biased row store.
#[async_trait]
pub trait ExternalStore: Send {
    /// Returns the segment called `title`, creating it if absent. Either way its first row is
    /// `header` afterwards.
    async fn ensure_segment(&mut self, title: &str, header: &[&str]) -> Result<Segment, SyncError>;

    /// All rows of the segment, header included, as displayed text.
    async fn list_rows(&mut self, segment: &Segment) -> Result<Vec<Vec<String>>, SyncError>;

    /// Deletes rows by zero based position. `indices` are strictly descending so that deleting one
    /// row never shifts a row that is still to be deleted.
    async fn delete_rows(&mut self, segment: &Segment, indices: &[usize]) -> Result<(), SyncError>;

    /// Appends all rows in a single call.
    async fn append_rows(&mut self, segment: &Segment, rows: &[ReportRow]) -> Result<(), SyncError>;
}

#[async_trait]
impl<S: ExternalStore + ?Sized> ExternalStore for Box<S> {
    async fn ensure_segment(&mut self, title: &str, header: &[&str]) -> Result<Segment, SyncError> {
        (**self).ensure_segment(title, header).await
    }

    async fn list_rows(&mut self, segment: &Segment) -> Result<Vec<Vec<String>>, SyncError> {
        (**self).list_rows(segment).await
    }

    async fn delete_rows(&mut self, segment: &Segment, indices: &[usize]) -> Result<(), SyncError> {
        (**self).delete_rows(segment, indices).await
    }

    async fn append_rows(&mut self, segment: &Segment, rows: &[ReportRow]) -> Result<(), SyncError> {
        (**self).append_rows(segment, rows).await
    }
}

#[async_trait]
impl<S: ExternalStore + ?Sized> ExternalStore for &mut S {
    async fn ensure_segment(&mut self, title: &str, header: &[&str]) -> Result<Segment, SyncError> {
        (**self).ensure_segment(title, header).await
    }

    async fn list_rows(&mut self, segment: &Segment) -> Result<Vec<Vec<String>>, SyncError> {
        (**self).list_rows(segment).await
    }

    async fn delete_rows(&mut self, segment: &Segment, indices: &[usize]) -> Result<(), SyncError> {
        (**self).delete_rows(segment, indices).await
    }

    async fn append_rows(&mut self, segment: &Segment, rows: &[ReportRow]) -> Result<(), SyncError> {
        (**self).append_rows(segment, rows).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub day: NaiveDate,
    pub segment: String,
    pub deleted: usize,
    pub inserted: usize,
}

/// Whether `row` holds exactly the cells of `header`, ignoring surrounding whitespace.
pub fn is_header_row(row: &[String], header: &[&str]) -> bool {
    row.iter().map(|v| v.trim()).eq(header.iter().copied())
}

/// Positions of rows belonging to `day`, highest first. Any row counts, including the first one,
/// since a segment may have lost its header. A header never parses as a date.
pub fn stale_row_indices(rows: &[Vec<String>], day: NaiveDate) -> Vec<usize> {
    let mut indices = rows
        .iter()
        .enumerate()
        .filter(|(_, row)| {
            row.first()
                .and_then(|cell| parse_record_name(cell.trim()))
                .is_some_and(|v| v == day)
        })
        .map(|(index, _)| index)
        .collect::<Vec<_>>();
    indices.reverse();
    indices
}

/// Makes the external store hold exactly one row per activity of a day. The store can't update
/// rows in place, so rows of the day are purged and written again.
pub struct ReportSynchronizer<S> {
    store: S,
}

impl<S: ExternalStore> ReportSynchronizer<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Replaces the rows of `day` with rows derived from `ledger`. Running it again with the same
    /// ledger leaves the store unchanged. On failure the store may be missing the day's rows until
    /// the next successful run.
    #[instrument(skip(self, ledger))]
    pub async fn sync(&mut self, day: NaiveDate, ledger: &DailyLedger) -> Result<SyncReport, SyncError> {
        let title = month_name(day);
        let segment = self.store.ensure_segment(&title, &SEGMENT_HEADER).await?;

        let existing = self.store.list_rows(&segment).await?;
        let stale = stale_row_indices(&existing, day);
        if !stale.is_empty() {
            debug!("Deleting {} stale rows of {day} from {title}", stale.len());
            self.store.delete_rows(&segment, &stale).await?;
        }

        let rows = ledger_rows(day, ledger);
        if !rows.is_empty() {
            self.store.append_rows(&segment, &rows).await?;
        }

        info!(
            "Synchronized {day} into {title}: {} removed, {} written",
            stale.len(),
            rows.len()
        );
        Ok(SyncReport {
            day,
            segment: title,
            deleted: stale.len(),
            inserted: rows.len(),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::BTreeMap;

    use async_trait::async_trait;
    use chrono::NaiveDate;

    use crate::{
        daemon::storage::entities::{ActivityKey, DailyLedger},
        report::{ReportRow, SEGMENT_HEADER},
    };

    use super::{
        is_header_row, stale_row_indices, ExternalStore, ReportSynchronizer, Segment, SyncError,
    };

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Operation {
        Ensure,
        List,
        Delete,
        Append,
    }

    /// Spreadsheet stand-in that keeps rows as displayed text.
    #[derive(Default)]
    pub struct MemoryStore {
        pub segments: BTreeMap<String, (i64, Vec<Vec<String>>)>,
        pub calls: Vec<Operation>,
        pub fail_on: Option<Operation>,
    }

    impl MemoryStore {
        pub fn rows(&self, title: &str) -> Vec<Vec<String>> {
            self.segments
                .get(title)
                .map(|v| v.1.clone())
                .unwrap_or_default()
        }

        fn record(&mut self, operation: Operation) -> Result<(), SyncError> {
            self.calls.push(operation);
            if self.fail_on == Some(operation) {
                return Err(SyncError::Transport("connection reset".into()));
            }
            Ok(())
        }

        fn segment_rows(&mut self, segment: &Segment) -> Result<&mut Vec<Vec<String>>, SyncError> {
            self.segments
                .get_mut(&segment.title)
                .map(|v| &mut v.1)
                .ok_or_else(|| SyncError::SegmentUnavailable(segment.title.clone()))
        }
    }

    #[async_trait]
    impl ExternalStore for MemoryStore {
        async fn ensure_segment(&mut self, title: &str, header: &[&str]) -> Result<Segment, SyncError> {
            self.record(Operation::Ensure)?;
            let next_id = self.segments.len() as i64;
            let (id, rows) = self
                .segments
                .entry(title.to_string())
                .or_insert_with(|| (next_id, vec![]));
            if !rows.first().is_some_and(|v| is_header_row(v, header)) {
                rows.insert(0, header.iter().map(|v| v.to_string()).collect());
            }
            Ok(Segment {
                id: *id,
                title: title.to_string(),
            })
        }

        async fn list_rows(&mut self, segment: &Segment) -> Result<Vec<Vec<String>>, SyncError> {
            self.record(Operation::List)?;
            Ok(self.segment_rows(segment)?.clone())
        }

        async fn delete_rows(&mut self, segment: &Segment, indices: &[usize]) -> Result<(), SyncError> {
            self.record(Operation::Delete)?;
            assert!(
                indices.windows(2).all(|w| w[0] > w[1]),
                "Deletion order must be descending {indices:?}"
            );
            let rows = self.segment_rows(segment)?;
            for index in indices {
                rows.remove(*index);
            }
            Ok(())
        }

        async fn append_rows(&mut self, segment: &Segment, new_rows: &[ReportRow]) -> Result<(), SyncError> {
            self.record(Operation::Append)?;
            let rows = self.segment_rows(segment)?;
            rows.extend(new_rows.iter().map(|row| {
                vec![
                    row.date_cell(),
                    row.key.to_string(),
                    row.minutes.to_string(),
                    row.formatted.clone(),
                ]
            }));
            Ok(())
        }
    }

    fn key(v: &str) -> ActivityKey {
        ActivityKey::new_opt(v).unwrap()
    }

    fn row(cells: [&str; 4]) -> Vec<String> {
        cells.iter().map(|v| v.to_string()).collect()
    }

    fn header() -> Vec<String> {
        row(SEGMENT_HEADER)
    }

    fn march_15() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
    }

    #[tokio::test]
    async fn test_sync_scenario() -> anyhow::Result<()> {
        let mut synchronizer = ReportSynchronizer::new(MemoryStore::default());

        let ledger = DailyLedger::from_iter([(key("Editor"), 125.5), (key("Browser"), 40.)]);
        let report = synchronizer.sync(march_15(), &ledger).await?;
        assert_eq!(report.segment, "March 2024");
        assert_eq!((report.deleted, report.inserted), (0, 2));
        assert_eq!(
            synchronizer.store().rows("March 2024"),
            vec![
                header(),
                row(["2024-03-15", "Editor", "125.5", "2h 5m"]),
                row(["2024-03-15", "Browser", "40", "0h 40m"]),
            ]
        );

        let ledger = DailyLedger::from_iter([(key("Editor"), 130.)]);
        let report = synchronizer.sync(march_15(), &ledger).await?;
        assert_eq!((report.deleted, report.inserted), (2, 1));
        assert_eq!(
            synchronizer.store().rows("March 2024"),
            vec![header(), row(["2024-03-15", "Editor", "130", "2h 10m"])]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_sync_is_idempotent() -> anyhow::Result<()> {
        let mut synchronizer = ReportSynchronizer::new(MemoryStore::default());
        let ledger = DailyLedger::from_iter([
            (key("Editor"), 12.),
            (key("Browser"), 40.),
            (key("Chat"), 12.),
        ]);

        synchronizer.sync(march_15(), &ledger).await?;
        let first = synchronizer.store().rows("March 2024");
        synchronizer.sync(march_15(), &ledger).await?;
        let second = synchronizer.store().rows("March 2024");

        assert_eq!(first, second);
        assert_eq!(second.len(), 4);
        Ok(())
    }

    #[tokio::test]
    async fn test_sync_keeps_other_days() -> anyhow::Result<()> {
        let mut store = MemoryStore::default();
        store.segments.insert(
            "March 2024".into(),
            (
                7,
                vec![
                    header(),
                    row(["2024-03-14", "Editor", "10", "0h 10m"]),
                    row(["2024-03-15", "Editor", "1", "0h 1m"]),
                    row(["2024-03-15", "Chat", "2", "0h 2m"]),
                    row(["2024-03-16", "Chat", "3", "0h 3m"]),
                    row(["2024-03-15", "Mail", "4", "0h 4m"]),
                ],
            ),
        );
        let mut synchronizer = ReportSynchronizer::new(store);

        let ledger = DailyLedger::from_iter([(key("Editor"), 20.)]);
        let report = synchronizer.sync(march_15(), &ledger).await?;

        assert_eq!(report.deleted, 3);
        assert_eq!(
            synchronizer.store().rows("March 2024"),
            vec![
                header(),
                row(["2024-03-14", "Editor", "10", "0h 10m"]),
                row(["2024-03-16", "Chat", "3", "0h 3m"]),
                row(["2024-03-15", "Editor", "20", "0h 20m"]),
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_rows_are_appended_in_one_batch() -> anyhow::Result<()> {
        let mut synchronizer = ReportSynchronizer::new(MemoryStore::default());
        let ledger: DailyLedger = (0..30).map(|i| (key(&format!("window {i}")), i as f64)).collect();

        synchronizer.sync(march_15(), &ledger).await?;
        synchronizer.sync(march_15(), &ledger).await?;

        use Operation::*;
        assert_eq!(
            synchronizer.store().calls,
            vec![Ensure, List, Append, Ensure, List, Delete, Append]
        );

        let minutes = synchronizer.store().rows("March 2024")[1..]
            .iter()
            .map(|v| v[2].parse::<f64>().unwrap())
            .collect::<Vec<_>>();
        assert!(minutes.windows(2).all(|w| w[0] >= w[1]));
        Ok(())
    }

    #[tokio::test]
    async fn test_failure_surfaces_and_retry_recovers() -> anyhow::Result<()> {
        let mut store = MemoryStore::default();
        let ledger = DailyLedger::from_iter([(key("Editor"), 5.)]);
        ReportSynchronizer::new(&mut store).sync(march_15(), &ledger).await?;

        store.fail_on = Some(Operation::Append);
        let result = ReportSynchronizer::new(&mut store).sync(march_15(), &ledger).await;
        assert!(matches!(result, Err(SyncError::Transport(_))));
        // Rows were purged but not written back.
        assert_eq!(store.rows("March 2024"), vec![header()]);

        store.fail_on = None;
        ReportSynchronizer::new(&mut store).sync(march_15(), &ledger).await?;
        assert_eq!(
            store.rows("March 2024"),
            vec![header(), row(["2024-03-15", "Editor", "5", "0h 5m"])]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_ledger_purges_day() -> anyhow::Result<()> {
        let mut synchronizer = ReportSynchronizer::new(MemoryStore::default());
        synchronizer
            .sync(march_15(), &DailyLedger::from_iter([(key("Editor"), 5.)]))
            .await?;
        let report = synchronizer.sync(march_15(), &DailyLedger::default()).await?;
        assert_eq!((report.deleted, report.inserted), (1, 0));
        assert_eq!(synchronizer.store().rows("March 2024"), vec![header()]);
        Ok(())
    }

    #[tokio::test]
    async fn test_segment_without_header_stays_idempotent() -> anyhow::Result<()> {
        let mut store = MemoryStore::default();
        store.segments.insert("March 2024".into(), (1, vec![]));
        let mut synchronizer = ReportSynchronizer::new(store);
        let ledger = DailyLedger::from_iter([(key("Editor"), 5.)]);

        for _ in 0..3 {
            synchronizer.sync(march_15(), &ledger).await?;
        }

        assert_eq!(
            synchronizer.store().rows("March 2024"),
            vec![header(), row(["2024-03-15", "Editor", "5", "0h 5m"])]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_lost_header_is_restored_above_data() -> anyhow::Result<()> {
        let mut store = MemoryStore::default();
        store.segments.insert(
            "March 2024".into(),
            (
                1,
                vec![
                    row(["2024-03-15", "Editor", "5", "0h 5m"]),
                    row(["2024-03-14", "Chat", "3", "0h 3m"]),
                ],
            ),
        );
        let mut synchronizer = ReportSynchronizer::new(store);

        let report = synchronizer
            .sync(march_15(), &DailyLedger::from_iter([(key("Editor"), 7.)]))
            .await?;

        assert_eq!(report.deleted, 1);
        assert_eq!(
            synchronizer.store().rows("March 2024"),
            vec![
                header(),
                row(["2024-03-14", "Chat", "3", "0h 3m"]),
                row(["2024-03-15", "Editor", "7", "0h 7m"]),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_stale_indices() {
        let rows = vec![
            row(["2024-03-15", "Editor", "1", "0h 1m"]),
            header(),
            row(["2024-03-15", "Editor", "1", "0h 1m"]),
            vec![],
            row(["2024-03-15", "Chat", "1", "0h 1m"]),
        ];
        assert_eq!(stale_row_indices(&rows, march_15()), vec![4, 2, 0]);
    }

    #[test]
    fn test_header_row_detection() {
        assert!(is_header_row(&header(), &SEGMENT_HEADER));
        assert!(is_header_row(
            &row([" Date", "Application/Tab ", "Time (minutes)", "Time (formatted)"]),
            &SEGMENT_HEADER
        ));
        assert!(!is_header_row(&[], &SEGMENT_HEADER));
        assert!(!is_header_row(&row(["2024-03-15", "Editor", "1", "0h 1m"]), &SEGMENT_HEADER));
    }
}
