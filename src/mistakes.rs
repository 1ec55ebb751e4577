use chrono::{DateTime, Duration, Local, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{self, KvBackend, Loaded, MigrationStep};
use crate::theory::{self, ChordFunction, NoteName, ScaleMode, TriadQuality};

const STORE_NAME: &str = "ets_mistakes";
const STORE_VERSION: u32 = 2;

/// Consecutive correct reviews before an entry is cleared from the queue.
pub const CLEAR_STREAK: u32 = 3;

/// Lifetime misses before an entry counts as "hard".
pub const HARD_WRONG_COUNT: u32 = 3;

/// The musical fact that was missed. Kind plus parameters form the
/// de-duplication key, and are enough to regenerate the same question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum MistakeKind {
    #[serde(rename_all = "camelCase")]
    NoteName { midi: u8 },
    #[serde(rename_all = "camelCase")]
    Interval { root_midi: u8, semitones: u8 },
    #[serde(rename_all = "camelCase")]
    ScaleDegree {
        key: NoteName,
        mode: ScaleMode,
        degree: u8,
    },
    #[serde(rename_all = "camelCase")]
    TriadQuality { root_midi: u8, quality: TriadQuality },
    #[serde(rename_all = "camelCase")]
    ChordFunction {
        key: NoteName,
        function: ChordFunction,
    },
}

impl MistakeKind {
    /// Stable key used for de-duplication and CLI addressing.
    pub fn dedup_key(&self) -> String {
        match self {
            MistakeKind::NoteName { midi } => format!("noteName:{}", midi),
            MistakeKind::Interval {
                root_midi,
                semitones,
            } => format!("interval:{}:{}", root_midi, semitones),
            MistakeKind::ScaleDegree { key, mode, degree } => {
                format!("scaleDegree:{}:{}:{}", key.letter(), mode.label(), degree)
            }
            MistakeKind::TriadQuality { root_midi, quality } => {
                format!("triad:{}:{}", root_midi, quality.label())
            }
            MistakeKind::ChordFunction { key, function } => {
                format!("function:{}:{}", key.letter(), function.numeral())
            }
        }
    }

    /// Short human-readable description for lists.
    pub fn describe(&self) -> String {
        match self {
            MistakeKind::NoteName { midi } => {
                format!("Note naming: {}", theory::midi_label(*midi))
            }
            MistakeKind::Interval {
                root_midi,
                semitones,
            } => format!(
                "Interval: {} from {}",
                theory::interval_label(*semitones),
                theory::midi_label(*root_midi)
            ),
            MistakeKind::ScaleDegree { key, mode, degree } => format!(
                "Scale degree: {} of {} {}",
                theory::degree_label(*degree),
                key.letter(),
                mode.label()
            ),
            MistakeKind::TriadQuality { root_midi, quality } => format!(
                "Triad: {} on {}",
                quality.label(),
                theory::midi_label(*root_midi)
            ),
            MistakeKind::ChordFunction { key, function } => {
                format!("Function: {} in {} major", function.numeral(), key.letter())
            }
        }
    }
}

/// One queued mistake with its scheduling state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MistakeEntry {
    #[serde(flatten)]
    pub kind: MistakeKind,
    pub added_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub correct_streak: u32,
    pub wrong_count: u32,
}

/// Outcome of a single review attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewOutcome {
    /// Enough consecutive correct answers; the entry was removed.
    Cleared,
    /// Still in the queue, next eligible at the given time.
    Scheduled(DateTime<Utc>),
}

/// Due-window buckets for display.
#[derive(Debug, Default, Clone)]
pub struct DueBuckets {
    pub within_hour: Vec<MistakeEntry>,
    pub today: Vec<MistakeEntry>,
    pub later: Vec<MistakeEntry>,
}

// Spaced-repetition backoff after a correct review, indexed by the new
// streak value.
fn backoff(correct_streak: u32) -> Duration {
    match correct_streak {
        0 | 1 => Duration::minutes(10),
        _ => Duration::hours(8),
    }
}

// Retry delay after a wrong review.
fn retry_delay() -> Duration {
    Duration::minutes(5)
}

/// The whole review queue. Persisted as one JSON array; every mutation
/// rewrites the full array (single-writer, last-write-wins).
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MistakeQueue {
    pub entries: Vec<MistakeEntry>,
}

impl MistakeQueue {
    /// Upsert a freshly missed fact. A duplicate key replaces the old
    /// entry and resets its position; the lifetime miss count carries
    /// forward and grows by one.
    pub fn record_miss(&mut self, kind: MistakeKind, now: DateTime<Utc>) {
        let prior_wrong = match self.entries.iter().position(|e| e.kind == kind) {
            Some(idx) => self.entries.remove(idx).wrong_count,
            None => 0,
        };
        self.entries.push(MistakeEntry {
            kind,
            added_at: now,
            due_at: now,
            correct_streak: 0,
            wrong_count: prior_wrong + 1,
        });
    }

    /// Apply one review attempt to the entry with the given key.
    pub fn review(
        &mut self,
        key: &str,
        correct: bool,
        now: DateTime<Utc>,
    ) -> Option<ReviewOutcome> {
        let idx = self.entries.iter().position(|e| e.kind.dedup_key() == key)?;
        if correct {
            let entry = &mut self.entries[idx];
            entry.correct_streak += 1;
            if entry.correct_streak >= CLEAR_STREAK {
                self.entries.remove(idx);
                return Some(ReviewOutcome::Cleared);
            }
            entry.due_at = now + backoff(entry.correct_streak);
            Some(ReviewOutcome::Scheduled(entry.due_at))
        } else {
            let entry = &mut self.entries[idx];
            entry.correct_streak = 0;
            entry.wrong_count += 1;
            entry.due_at = now + retry_delay();
            Some(ReviewOutcome::Scheduled(entry.due_at))
        }
    }

    pub fn find(&self, key: &str) -> Option<&MistakeEntry> {
        self.entries.iter().find(|e| e.kind.dedup_key() == key)
    }

    /// Entries eligible for review right now, most overdue first.
    pub fn due_now(&self, now: DateTime<Utc>) -> Vec<&MistakeEntry> {
        let mut due: Vec<&MistakeEntry> =
            self.entries.iter().filter(|e| e.due_at <= now).collect();
        due.sort_by_key(|e| e.due_at);
        due
    }

    pub fn next_due(&self, now: DateTime<Utc>) -> Option<&MistakeEntry> {
        self.due_now(now).into_iter().next()
    }

    /// Everything in the queue, bucketed by how soon it comes due.
    pub fn buckets(&self, now: DateTime<Utc>) -> DueBuckets {
        let mut entries: Vec<MistakeEntry> = self.entries.clone();
        entries.sort_by_key(|e| e.due_at);

        let today_local = now.with_timezone(&Local).date_naive();
        let mut buckets = DueBuckets::default();
        for entry in entries {
            if entry.due_at <= now + Duration::hours(1) {
                buckets.within_hour.push(entry);
            } else if entry.due_at.with_timezone(&Local).date_naive() == today_local {
                buckets.today.push(entry);
            } else {
                buckets.later.push(entry);
            }
        }
        buckets
    }

    /// Entries missed often enough to flag as hard.
    pub fn hard(&self) -> Vec<&MistakeEntry> {
        self.entries
            .iter()
            .filter(|e| e.wrong_count >= HARD_WRONG_COUNT)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// v1 entries named the streak field `streak` and had no lifetime miss
// counter.
const STEPS: [MigrationStep; 1] = [MigrationStep {
    from: 1,
    migrate: |mut v| {
        if let Some(items) = v.as_array_mut() {
            for item in items {
                if let Some(map) = item.as_object_mut() {
                    if let Some(streak) = map.remove("streak") {
                        map.insert("correctStreak".to_string(), streak);
                    }
                    map.entry("wrongCount").or_insert(serde_json::json!(0));
                }
            }
        }
        v
    },
}];

pub fn load_tagged(kv: &dyn KvBackend) -> store::Result<Loaded<MistakeQueue>> {
    store::load_versioned(kv, STORE_NAME, STORE_VERSION, &STEPS, MistakeQueue::default)
}

pub fn load(kv: &dyn KvBackend) -> store::Result<MistakeQueue> {
    Ok(load_tagged(kv)?.into_inner())
}

pub fn save(kv: &dyn KvBackend, queue: &MistakeQueue) -> store::Result<()> {
    store::save_versioned(kv, STORE_NAME, STORE_VERSION, queue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryKv;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap()
    }

    fn interval_kind(semitones: u8) -> MistakeKind {
        MistakeKind::Interval {
            root_midi: NoteName::C.to_midi(4),
            semitones,
        }
    }

    mod dedup_tests {
        use super::*;

        #[test]
        fn duplicate_miss_keeps_one_entry() {
            let mut queue = MistakeQueue::default();
            queue.record_miss(interval_kind(7), t0());
            queue.record_miss(interval_kind(7), t0() + Duration::minutes(30));

            assert_eq!(queue.len(), 1);
            // addedAt comes from the most recent add
            assert_eq!(
                queue.entries[0].added_at,
                t0() + Duration::minutes(30)
            );
        }

        #[test]
        fn duplicate_miss_accumulates_wrong_count() {
            let mut queue = MistakeQueue::default();
            queue.record_miss(interval_kind(7), t0());
            queue.record_miss(interval_kind(7), t0());
            assert_eq!(queue.entries[0].wrong_count, 2);
        }

        #[test]
        fn different_params_are_distinct_entries() {
            let mut queue = MistakeQueue::default();
            queue.record_miss(interval_kind(7), t0());
            queue.record_miss(interval_kind(4), t0());
            assert_eq!(queue.len(), 2);
        }

        #[test]
        fn new_miss_is_immediately_due() {
            let mut queue = MistakeQueue::default();
            queue.record_miss(interval_kind(7), t0());
            assert_eq!(queue.due_now(t0()).len(), 1);
        }
    }

    mod review_tests {
        use super::*;

        #[test]
        fn correct_review_pushes_due_forward() {
            let mut queue = MistakeQueue::default();
            queue.record_miss(interval_kind(7), t0());
            let key = interval_kind(7).dedup_key();

            let outcome = queue.review(&key, true, t0()).unwrap();
            assert_eq!(
                outcome,
                ReviewOutcome::Scheduled(t0() + Duration::minutes(10))
            );
            assert_eq!(queue.entries[0].correct_streak, 1);
            assert!(queue.due_now(t0()).is_empty());
        }

        #[test]
        fn second_correct_review_backs_off_further() {
            let mut queue = MistakeQueue::default();
            queue.record_miss(interval_kind(7), t0());
            let key = interval_kind(7).dedup_key();

            queue.review(&key, true, t0()).unwrap();
            let outcome = queue.review(&key, true, t0()).unwrap();
            assert_eq!(outcome, ReviewOutcome::Scheduled(t0() + Duration::hours(8)));
        }

        #[test]
        fn streak_reaching_threshold_clears_entry() {
            let mut queue = MistakeQueue::default();
            queue.record_miss(interval_kind(7), t0());
            let key = interval_kind(7).dedup_key();

            for _ in 0..CLEAR_STREAK - 1 {
                assert!(matches!(
                    queue.review(&key, true, t0()),
                    Some(ReviewOutcome::Scheduled(_))
                ));
            }
            assert_eq!(queue.review(&key, true, t0()), Some(ReviewOutcome::Cleared));
            assert!(queue.is_empty());
        }

        #[test]
        fn wrong_review_resets_streak_and_counts() {
            let mut queue = MistakeQueue::default();
            queue.record_miss(interval_kind(7), t0());
            let key = interval_kind(7).dedup_key();

            queue.review(&key, true, t0()).unwrap();
            queue.review(&key, false, t0()).unwrap();

            let entry = &queue.entries[0];
            assert_eq!(entry.correct_streak, 0);
            assert_eq!(entry.wrong_count, 2);
            assert_eq!(entry.due_at, t0() + Duration::minutes(5));
        }

        #[test]
        fn review_of_unknown_key_is_none() {
            let mut queue = MistakeQueue::default();
            assert_eq!(queue.review("interval:0:0", true, t0()), None);
        }
    }

    mod query_tests {
        use super::*;

        #[test]
        fn due_now_sorts_most_overdue_first() {
            let mut queue = MistakeQueue::default();
            queue.record_miss(interval_kind(4), t0() - Duration::minutes(2));
            queue.record_miss(interval_kind(7), t0() - Duration::minutes(20));

            let due = queue.due_now(t0());
            assert_eq!(due.len(), 2);
            assert_eq!(due[0].kind, interval_kind(7));
        }

        #[test]
        fn buckets_split_by_window() {
            // Anchor mid-morning local so "later today" stays on today.
            let date = Local::now().date_naive();
            let now = date
                .and_hms_opt(8, 0, 0)
                .unwrap()
                .and_local_timezone(Local)
                .single()
                .unwrap()
                .with_timezone(&Utc);

            let mut queue = MistakeQueue::default();
            queue.record_miss(interval_kind(1), now); // due immediately
            queue.record_miss(interval_kind(2), now);
            queue.record_miss(interval_kind(3), now);
            // push one entry a couple of hours out, one far out
            queue
                .review(&interval_kind(2).dedup_key(), false, now + Duration::hours(2))
                .unwrap();
            queue
                .review(&interval_kind(3).dedup_key(), true, now)
                .unwrap();
            queue
                .review(&interval_kind(3).dedup_key(), true, now + Duration::days(2))
                .unwrap();

            let buckets = queue.buckets(now);
            assert_eq!(buckets.within_hour.len(), 1);
            assert_eq!(buckets.today.len(), 1);
            assert_eq!(buckets.later.len(), 1);
        }

        #[test]
        fn hard_requires_repeated_misses() {
            let mut queue = MistakeQueue::default();
            queue.record_miss(interval_kind(6), t0());
            assert!(queue.hard().is_empty());

            let key = interval_kind(6).dedup_key();
            queue.review(&key, false, t0()).unwrap();
            queue.review(&key, false, t0()).unwrap();
            assert_eq!(queue.hard().len(), 1);
        }
    }

    mod store_tests {
        use super::*;

        #[test]
        fn roundtrip_through_store() {
            let kv = MemoryKv::new();
            let mut queue = MistakeQueue::default();
            queue.record_miss(interval_kind(7), t0());
            queue.record_miss(
                MistakeKind::TriadQuality {
                    root_midi: NoteName::D.to_midi(3),
                    quality: TriadQuality::Minor,
                },
                t0(),
            );
            save(&kv, &queue).unwrap();
            assert_eq!(load(&kv).unwrap(), queue);
        }

        #[test]
        fn wire_format_is_camel_case() {
            let kv = MemoryKv::new();
            let mut queue = MistakeQueue::default();
            queue.record_miss(interval_kind(7), t0());
            save(&kv, &queue).unwrap();

            let raw = kv.get("ets_mistakes_v2").unwrap().unwrap();
            assert!(raw.contains("\"rootMidi\""));
            assert!(raw.contains("\"addedAt\""));
            assert!(raw.contains("\"correctStreak\""));
            assert!(raw.contains("\"wrongCount\""));
        }

        #[test]
        fn v1_blob_migrates_forward() {
            let kv = MemoryKv::new();
            kv.set(
                "ets_mistakes_v1",
                r#"[{"kind":"noteName","midi":65,
                     "addedAt":"2026-01-05T10:00:00Z",
                     "dueAt":"2026-01-05T10:00:00Z",
                     "streak":2}]"#,
            )
            .unwrap();

            let loaded = load_tagged(&kv).unwrap();
            assert!(loaded.was_migrated());
            let queue = loaded.into_inner();
            assert_eq!(queue.len(), 1);
            assert_eq!(queue.entries[0].correct_streak, 2);
            assert_eq!(queue.entries[0].wrong_count, 0);
            assert_eq!(kv.get("ets_mistakes_v1").unwrap(), None);
            assert!(kv.get("ets_mistakes_v2").unwrap().is_some());
        }

        #[test]
        fn garbage_blob_degrades_to_empty_queue() {
            let kv = MemoryKv::new();
            kv.set("ets_mistakes_v2", "not even json").unwrap();
            assert!(load(&kv).unwrap().is_empty());
        }
    }
}
