use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{self, KvBackend, Loaded, MigrationStep};

const STORE_NAME: &str = "ets_progress";
const STORE_VERSION: u32 = 2;

const SECONDS_PER_DAY: i64 = 86_400;

/// Days since the Unix epoch, UTC. Streak arithmetic runs on these.
pub fn utc_day_index(t: DateTime<Utc>) -> i64 {
    t.timestamp().div_euclid(SECONDS_PER_DAY)
}

/// XP earned on a single UTC day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyXp {
    pub day: i64,
    pub xp: u32,
}

/// The single per-user progress record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub xp_total: u64,
    pub streak_days: u32,
    pub last_study_day: Option<i64>,
    pub today: DailyXp,
    pub stations_done: BTreeSet<String>,
}

impl Default for Progress {
    fn default() -> Self {
        Self {
            xp_total: 0,
            streak_days: 0,
            last_study_day: None,
            today: DailyXp { day: 0, xp: 0 },
            stations_done: BTreeSet::new(),
        }
    }
}

impl Progress {
    /// Add XP and maintain the streak. A UTC day-index gap of exactly one
    /// extends the streak; the same day leaves it; any other gap resets it
    /// to one.
    pub fn apply_study_reward(&mut self, now: DateTime<Utc>, xp: u32) {
        let day = utc_day_index(now);
        match self.last_study_day {
            Some(prev) if day == prev => {}
            Some(prev) if day - prev == 1 => self.streak_days += 1,
            _ => self.streak_days = 1,
        }
        self.last_study_day = Some(day);

        if self.today.day != day {
            self.today = DailyXp { day, xp: 0 };
        }
        self.today.xp += xp;
        self.xp_total += u64::from(xp);
    }

    /// Flag a station as completed. Returns whether it was newly done.
    pub fn mark_station_done(&mut self, station_id: &str) -> bool {
        self.stations_done.insert(station_id.to_string())
    }

    pub fn station_done(&self, station_id: &str) -> bool {
        self.stations_done.contains(station_id)
    }

    /// XP earned today, zero once the UTC day has rolled over.
    pub fn xp_today(&self, now: DateTime<Utc>) -> u32 {
        if self.today.day == utc_day_index(now) {
            self.today.xp
        } else {
            0
        }
    }

    /// Whether the streak is still alive at `now` (studied today or
    /// yesterday).
    pub fn streak_alive(&self, now: DateTime<Utc>) -> bool {
        match self.last_study_day {
            Some(prev) => utc_day_index(now) - prev <= 1,
            None => false,
        }
    }
}

// v1 kept stations as an `{id: bool}` map and had no daily XP counter.
const STEPS: [MigrationStep; 1] = [MigrationStep {
    from: 1,
    migrate: |mut v| {
        if let Some(map) = v.as_object_mut() {
            let done: Vec<serde_json::Value> = map
                .get("stationsDone")
                .and_then(|s| s.as_object())
                .map(|flags| {
                    flags
                        .iter()
                        .filter(|(_, flag)| flag.as_bool().unwrap_or(false))
                        .map(|(id, _)| serde_json::json!(id))
                        .collect()
                })
                .unwrap_or_default();
            map.insert("stationsDone".to_string(), serde_json::Value::Array(done));
            map.entry("today")
                .or_insert(serde_json::json!({ "day": 0, "xp": 0 }));
        }
        v
    },
}];

pub fn load_tagged(kv: &dyn KvBackend) -> store::Result<Loaded<Progress>> {
    store::load_versioned(kv, STORE_NAME, STORE_VERSION, &STEPS, Progress::default)
}

pub fn load(kv: &dyn KvBackend) -> store::Result<Progress> {
    Ok(load_tagged(kv)?.into_inner())
}

pub fn save(kv: &dyn KvBackend, progress: &Progress) -> store::Result<()> {
    store::save_versioned(kv, STORE_NAME, STORE_VERSION, progress)
}
