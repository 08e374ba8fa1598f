use std::{borrow::Borrow, collections::BTreeMap, fmt::Display, sync::Arc};

use chrono::{Datelike, NaiveDate};
use serde::{de::Error, Deserialize, Deserializer, Serialize};

/// Opaque identifier of a window/application/tab, taken verbatim from the OS. Two keys are the
/// same activity only if the strings match exactly.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Clone)]
#[serde(transparent)]
pub struct ActivityKey(Arc<str>);

impl ActivityKey {
    /// Returns [None] for empty titles, which carry no identity and are handled as unknown.
    pub fn new_opt(value: impl Into<Arc<str>>) -> Option<Self> {
        let value = value.into();
        if value.is_empty() {
            None
        } else {
            Some(Self(value))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for ActivityKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Arc::<str>::deserialize(deserializer)?;
        Self::new_opt(value).ok_or_else(|| D::Error::custom("activity key can't be empty"))
    }
}

impl Display for ActivityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ActivityKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Minutes spent per activity during one calendar day.
#[derive(PartialEq, Debug, Serialize, Clone, Default)]
#[serde(transparent)]
pub struct DailyLedger(BTreeMap<ActivityKey, f64>);

/// Goes through [DailyLedger::add], so entries with empty keys are dropped and negative minutes
/// are read as zero.
impl<'de> Deserialize<'de> for DailyLedger {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let entries = BTreeMap::<String, f64>::deserialize(deserializer)?;
        Ok(entries
            .into_iter()
            .filter_map(|(key, minutes)| Some((ActivityKey::new_opt(key)?, minutes)))
            .collect())
    }
}

impl DailyLedger {
    pub fn add(&mut self, key: ActivityKey, minutes: f64) {
        *self.0.entry(key).or_insert(0.) += minutes.max(0.);
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.0.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ActivityKey, f64)> {
        self.0.iter().map(|(k, v)| (k, *v))
    }

    /// Entries ordered by duration descending. Ties keep key order since the sort is stable.
    pub fn sorted_by_duration(&self) -> Vec<(ActivityKey, f64)> {
        let mut entries = self
            .0
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect::<Vec<_>>();
        entries.sort_by(|a, b| b.1.total_cmp(&a.1));
        entries
    }
}

impl FromIterator<(ActivityKey, f64)> for DailyLedger {
    fn from_iter<T: IntoIterator<Item = (ActivityKey, f64)>>(iter: T) -> Self {
        let mut ledger = DailyLedger::default();
        for (key, minutes) in iter {
            ledger.add(key, minutes);
        }
        ledger
    }
}

/// Everything the tracker knows: one [DailyLedger] per calendar day. This is the persisted
/// state.
#[derive(PartialEq, Debug, Serialize, Deserialize, Clone, Default)]
#[serde(transparent)]
pub struct ActivityStore(BTreeMap<NaiveDate, DailyLedger>);

impl ActivityStore {
    pub fn ledger(&self, day: NaiveDate) -> Option<&DailyLedger> {
        self.0.get(&day)
    }

    pub fn ledger_mut(&mut self, day: NaiveDate) -> &mut DailyLedger {
        self.0.entry(day).or_default()
    }

    pub fn insert(&mut self, day: NaiveDate, ledger: DailyLedger) {
        self.0.insert(day, ledger);
    }

    /// Known days in ascending order.
    pub fn days(&self) -> impl DoubleEndedIterator<Item = NaiveDate> + '_ {
        self.0.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Ledgers of all days in the same month as `month`.
    pub fn month(&self, month: NaiveDate) -> impl Iterator<Item = (NaiveDate, &DailyLedger)> {
        self.0
            .iter()
            .filter(move |(day, _)| day.year() == month.year() && day.month() == month.month())
            .map(|(day, ledger)| (*day, ledger))
    }
}
