use chrono::{DateTime, FixedOffset, NaiveDate, TimeDelta};
use tracing::{debug, info, warn};

use super::storage::entities::{ActivityKey, ActivityStore};

/// An observation of the foreground window at a point in time. [None] means nothing could be
/// identified.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub key: Option<ActivityKey>,
    pub timestamp: DateTime<FixedOffset>,
}

/// Runtime state of the tracker. Owns the [ActivityStore] and knows when the previous sample
/// was folded into it.
#[derive(Debug)]
pub struct TrackerSession {
    store: ActivityStore,
    current_day: NaiveDate,
    last_fold_time: DateTime<FixedOffset>,
    last_key: Option<ActivityKey>,
}

fn as_minutes(elapsed: TimeDelta) -> f64 {
    elapsed.num_milliseconds() as f64 / 60_000.
}

impl TrackerSession {
    pub fn new(store: ActivityStore, now: DateTime<FixedOffset>) -> Self {
        Self {
            store,
            current_day: now.date_naive(),
            last_fold_time: now,
            last_key: None,
        }
    }

    pub fn store(&self) -> &ActivityStore {
        &self.store
    }

    pub fn current_day(&self) -> NaiveDate {
        self.current_day
    }

    pub fn last_key(&self) -> Option<&ActivityKey> {
        self.last_key.as_ref()
    }

    pub fn into_store(self) -> ActivityStore {
        self.store
    }

    /// Attributes the time since the previous fold to the sampled activity.
    ///
    /// A change of calendar day is applied before the time is attributed, so a gap spanning
    /// midnight is credited entirely to the new day. With intervals of a few seconds that error is
    /// negligible and the previous day's ledger stays frozen once the day is over.
    pub fn fold(&mut self, sample: Sample) {
        let now = sample.timestamp;
        let today = now.date_naive();
        if today != self.current_day {
            info!("Day changed from {} to {today}", self.current_day);
            self.current_day = today;
        }

        let mut elapsed = now - self.last_fold_time;
        if elapsed < TimeDelta::zero() {
            warn!("Clock went backwards by {}, ignoring the interval", -elapsed);
            elapsed = TimeDelta::zero();
        }

        match &sample.key {
            Some(key) => {
                let minutes = as_minutes(elapsed);
                debug!("Adding {minutes:.3}m to {key}");
                self.store.ledger_mut(self.current_day).add(key.clone(), minutes);
            }
            None => debug!("Untracked interval of {elapsed}"),
        }

        self.last_fold_time = now;
        self.last_key = sample.key;
    }
}
