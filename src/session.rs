use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::quests::local_date_key;
use crate::rng::hash_seed;
use crate::store::{self, KvBackend};

const SESSIONS_NAME: &str = "ets_review_sessions";
const SESSIONS_VERSION: u32 = 1;
const HISTOGRAM_NAME: &str = "ets_interval_misses";
const HISTOGRAM_VERSION: u32 = 1;
const AB_NAME: &str = "ets_ab_bucket";
const AB_VERSION: u32 = 1;
const TOAST_NAME: &str = "ets_goal_toast";
const TOAST_VERSION: u32 = 1;
const WORKOUT_NAME: &str = "ets_workout_days";
const WORKOUT_VERSION: u32 = 1;

/// Review sessions kept in the history log.
pub const MAX_SESSION_HISTORY: usize = 20;

/// Fingerprint of a review session's query parameters. Order-independent
/// over the parameter set; the manage flag folds in separately so the
/// manage view never shares a signature with a plain session.
pub fn review_session_signature(params: &[(String, String)], manage: bool) -> String {
    let mut pairs: Vec<String> = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();
    pairs.sort();
    let mut joined = pairs.join("&");
    if manage {
        joined.push_str("#manage");
    }
    format!("{:08x}", hash_seed(&joined))
}

/// One finished review session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub started_at: DateTime<Utc>,
    pub answered: u32,
    pub correct: u32,
    pub signature: String,
}

/// Bounded log of recent review sessions, newest last.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionHistory {
    pub records: Vec<SessionRecord>,
}

impl SessionHistory {
    pub fn push(&mut self, record: SessionRecord) {
        self.records.push(record);
        if self.records.len() > MAX_SESSION_HISTORY {
            let excess = self.records.len() - MAX_SESSION_HISTORY;
            self.records.drain(..excess);
        }
    }
}

pub fn load_sessions(kv: &dyn KvBackend) -> store::Result<SessionHistory> {
    Ok(
        store::load_versioned(kv, SESSIONS_NAME, SESSIONS_VERSION, &[], SessionHistory::default)?
            .into_inner(),
    )
}

pub fn save_sessions(kv: &dyn KvBackend, history: &SessionHistory) -> store::Result<()> {
    store::save_versioned(kv, SESSIONS_NAME, SESSIONS_VERSION, history)
}

/// Miss counts per interval size, for the "weak intervals" display.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntervalMisses {
    pub counts: BTreeMap<u8, u32>,
}

impl IntervalMisses {
    pub fn record(&mut self, semitones: u8) {
        *self.counts.entry(semitones).or_insert(0) += 1;
    }

    /// Interval sizes sorted by miss count, worst first.
    pub fn worst(&self) -> Vec<(u8, u32)> {
        let mut entries: Vec<(u8, u32)> =
            self.counts.iter().map(|(&s, &n)| (s, n)).collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        entries
    }
}

pub fn load_interval_misses(kv: &dyn KvBackend) -> store::Result<IntervalMisses> {
    Ok(
        store::load_versioned(kv, HISTOGRAM_NAME, HISTOGRAM_VERSION, &[], IntervalMisses::default)?
            .into_inner(),
    )
}

pub fn save_interval_misses(kv: &dyn KvBackend, misses: &IntervalMisses) -> store::Result<()> {
    store::save_versioned(kv, HISTOGRAM_NAME, HISTOGRAM_VERSION, misses)
}

/// Experiment bucket, assigned once at random and persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AbBucket {
    A,
    B,
}

impl AbBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            AbBucket::A => "a",
            AbBucket::B => "b",
        }
    }
}

/// Load the persisted bucket or assign one on first use.
pub fn ab_bucket(kv: &dyn KvBackend) -> store::Result<AbBucket> {
    let loaded =
        store::load_versioned(kv, AB_NAME, AB_VERSION, &[], || None::<AbBucket>)?.into_inner();
    if let Some(bucket) = loaded {
        return Ok(bucket);
    }
    let bucket = if rand::random::<bool>() {
        AbBucket::A
    } else {
        AbBucket::B
    };
    store::save_versioned(kv, AB_NAME, AB_VERSION, &Some(bucket))?;
    Ok(bucket)
}

/// Guard so the daily-goal toast fires at most once per local day.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalToastGuard {
    pub last_shown: Option<String>,
}

impl GoalToastGuard {
    /// Returns true (and records the day) the first time it is asked on a
    /// given local day.
    pub fn should_show(&mut self, now: DateTime<Utc>) -> bool {
        let today = local_date_key(now);
        if self.last_shown.as_deref() == Some(today.as_str()) {
            return false;
        }
        self.last_shown = Some(today);
        true
    }
}

pub fn load_toast_guard(kv: &dyn KvBackend) -> store::Result<GoalToastGuard> {
    Ok(
        store::load_versioned(kv, TOAST_NAME, TOAST_VERSION, &[], GoalToastGuard::default)?
            .into_inner(),
    )
}

pub fn save_toast_guard(kv: &dyn KvBackend, guard: &GoalToastGuard) -> store::Result<()> {
    store::save_versioned(kv, TOAST_NAME, TOAST_VERSION, guard)
}

/// Local dates with completed study, for the calendar display.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkoutDays {
    pub days: BTreeSet<String>,
}

impl WorkoutDays {
    pub fn mark(&mut self, now: DateTime<Utc>) -> bool {
        self.days.insert(local_date_key(now))
    }

    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        self.days.contains(&local_date_key(now))
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

pub fn load_workout_days(kv: &dyn KvBackend) -> store::Result<WorkoutDays> {
    Ok(
        store::load_versioned(kv, WORKOUT_NAME, WORKOUT_VERSION, &[], WorkoutDays::default)?
            .into_inner(),
    )
}

pub fn save_workout_days(kv: &dyn KvBackend, days: &WorkoutDays) -> store::Result<()> {
    store::save_versioned(kv, WORKOUT_NAME, WORKOUT_VERSION, days)
}
