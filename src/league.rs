use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::rng::{hash_seed, Mulberry32};
use crate::store::{self, KvBackend, Loaded, MigrationStep};

const STORE_NAME: &str = "ets_league";
const STORE_VERSION: u32 = 2;

/// Display name for the user's own row.
pub const USER_NAME: &str = "You";

const BOT_NAMES: [&str; 9] = [
    "Aria", "Bartok", "Cadence", "Dorian", "Elody", "Fifths", "Grazia", "Hammond", "Ivory",
];

const BOT_XP_FLOOR: u32 = 25;
const BOT_XP_SPREAD: f32 = 1500.0;

/// ISO week id, e.g. `2026-W32`.
pub fn week_id(now: DateTime<Utc>) -> String {
    let week = now.iso_week();
    format!("{}-W{:02}", week.year(), week.week())
}

/// The user's weekly XP snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeagueState {
    pub week: String,
    pub xp_this_week: u64,
}

impl Default for LeagueState {
    fn default() -> Self {
        Self {
            week: String::new(),
            xp_this_week: 0,
        }
    }
}

impl LeagueState {
    /// Reset the snapshot when the ISO week has rolled over.
    pub fn normalized(self, now: DateTime<Utc>) -> Self {
        let current = week_id(now);
        if self.week == current {
            self
        } else {
            Self {
                week: current,
                xp_this_week: 0,
            }
        }
    }

    pub fn record_xp(&mut self, amount: u32) {
        self.xp_this_week += u64::from(amount);
    }
}

/// One leaderboard row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Standing {
    pub name: String,
    pub xp: u64,
    pub is_user: bool,
}

// Bot weekly XP is a pure function of (name, week): stable within a week,
// reshuffled across weeks.
fn bot_xp(name: &str, week: &str) -> u64 {
    let mut rng = Mulberry32::new(hash_seed(&format!("{}:{}", name, week)));
    u64::from(BOT_XP_FLOOR) + (rng.next_f32() * BOT_XP_SPREAD) as u64
}

/// Full leaderboard for the state's week, highest XP first. Ties go to the
/// user.
pub fn standings(state: &LeagueState) -> Vec<Standing> {
    let mut rows: Vec<Standing> = BOT_NAMES
        .iter()
        .map(|name| Standing {
            name: name.to_string(),
            xp: bot_xp(name, &state.week),
            is_user: false,
        })
        .collect();
    rows.push(Standing {
        name: USER_NAME.to_string(),
        xp: state.xp_this_week,
        is_user: true,
    });
    rows.sort_by(|a, b| b.xp.cmp(&a.xp).then(b.is_user.cmp(&a.is_user)));
    rows
}

/// 1-based position of the user's row.
pub fn user_rank(state: &LeagueState) -> usize {
    standings(state)
        .iter()
        .position(|s| s.is_user)
        .map(|p| p + 1)
        .unwrap_or(BOT_NAMES.len() + 1)
}

// v1 named the counter `xp`.
const STEPS: [MigrationStep; 1] = [MigrationStep {
    from: 1,
    migrate: |mut v| {
        if let Some(map) = v.as_object_mut() {
            if let Some(xp) = map.remove("xp") {
                map.insert("xpThisWeek".to_string(), xp);
            }
        }
        v
    },
}];

pub fn load_tagged(kv: &dyn KvBackend) -> store::Result<Loaded<LeagueState>> {
    store::load_versioned(kv, STORE_NAME, STORE_VERSION, &STEPS, LeagueState::default)
}

/// Load and normalize; callers always see the current week.
pub fn load(kv: &dyn KvBackend, now: DateTime<Utc>) -> store::Result<LeagueState> {
    Ok(load_tagged(kv)?.into_inner().normalized(now))
}

pub fn save(kv: &dyn KvBackend, state: &LeagueState) -> store::Result<()> {
    store::save_versioned(kv, STORE_NAME, STORE_VERSION, state)
}
