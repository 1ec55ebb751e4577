use serde::{Deserialize, Serialize};

use crate::store::{self, KvBackend, Loaded, MigrationStep};

const STORE_NAME: &str = "ets_settings";
const STORE_VERSION: u32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Notation {
    Letters,
    Solfege,
}

impl Notation {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "letters" | "letter" => Some(Notation::Letters),
            "solfege" | "solfège" => Some(Notation::Solfege),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Notation::Letters => "letters",
            Notation::Solfege => "solfege",
        }
    }
}

/// User settings, current shape (v6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Playback volume, 0.0..=1.0.
    pub volume: f32,
    /// Gap between prompt notes, milliseconds.
    pub prompt_gap_ms: u32,
    /// Replay the prompt automatically after a wrong answer.
    pub auto_replay: bool,
    pub notation: Notation,
    pub daily_goal_xp: u32,
    pub reduced_motion: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            volume: 0.8,
            prompt_gap_ms: 500,
            auto_replay: true,
            notation: Notation::Letters,
            daily_goal_xp: 50,
            reduced_motion: false,
        }
    }
}

// The chain, one step per historical version bump:
//   v1 {volume, showHints}
//   v2 + promptGapMs
//   v3 + autoReplay
//   v4 + notation, drops showHints
//   v5 + dailyGoalXp
//   v6 + reducedMotion
const STEPS: [MigrationStep; 5] = [
    MigrationStep {
        from: 1,
        migrate: |mut v| {
            if let Some(map) = v.as_object_mut() {
                map.entry("promptGapMs").or_insert(serde_json::json!(500));
            }
            v
        },
    },
    MigrationStep {
        from: 2,
        migrate: |mut v| {
            if let Some(map) = v.as_object_mut() {
                map.entry("autoReplay").or_insert(serde_json::json!(true));
            }
            v
        },
    },
    MigrationStep {
        from: 3,
        migrate: |mut v| {
            if let Some(map) = v.as_object_mut() {
                map.remove("showHints");
                map.entry("notation").or_insert(serde_json::json!("letters"));
            }
            v
        },
    },
    MigrationStep {
        from: 4,
        migrate: |mut v| {
            if let Some(map) = v.as_object_mut() {
                map.entry("dailyGoalXp").or_insert(serde_json::json!(50));
            }
            v
        },
    },
    MigrationStep {
        from: 5,
        migrate: |mut v| {
            if let Some(map) = v.as_object_mut() {
                map.entry("reducedMotion").or_insert(serde_json::json!(false));
            }
            v
        },
    },
];

pub fn load_tagged(kv: &dyn KvBackend) -> store::Result<Loaded<Settings>> {
    store::load_versioned(kv, STORE_NAME, STORE_VERSION, &STEPS, Settings::default)
}

pub fn load(kv: &dyn KvBackend) -> store::Result<Settings> {
    Ok(load_tagged(kv)?.into_inner())
}

pub fn save(kv: &dyn KvBackend, settings: &Settings) -> store::Result<()> {
    store::save_versioned(kv, STORE_NAME, STORE_VERSION, settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryKv;

    mod migration_tests {
        use super::*;

        #[test]
        fn v1_blob_reaches_v6_fully_populated() {
            let kv = MemoryKv::new();
            kv.set("ets_settings_v1", r#"{"volume":0.5,"showHints":true}"#)
                .unwrap();

            let loaded = load_tagged(&kv).unwrap();
            assert!(loaded.was_migrated());
            let s = loaded.into_inner();
            assert_eq!(s.volume, 0.5);
            assert_eq!(s.prompt_gap_ms, 500);
            assert!(s.auto_replay);
            assert_eq!(s.notation, Notation::Letters);
            assert_eq!(s.daily_goal_xp, 50);
            assert!(!s.reduced_motion);
        }

        #[test]
        fn every_legacy_version_reaches_v6() {
            let blobs = [
                (1, r#"{"volume":0.4,"showHints":false}"#),
                (2, r#"{"volume":0.4,"showHints":false,"promptGapMs":750}"#),
                (
                    3,
                    r#"{"volume":0.4,"showHints":true,"promptGapMs":750,"autoReplay":false}"#,
                ),
                (
                    4,
                    r#"{"volume":0.4,"promptGapMs":750,"autoReplay":false,"notation":"solfege"}"#,
                ),
                (
                    5,
                    r#"{"volume":0.4,"promptGapMs":750,"autoReplay":false,
                        "notation":"solfege","dailyGoalXp":80}"#,
                ),
            ];
            for (version, blob) in blobs {
                let kv = MemoryKv::new();
                kv.set(&format!("ets_settings_v{}", version), blob).unwrap();
                let s = load(&kv).unwrap();
                assert_eq!(s.volume, 0.4, "from v{}", version);
                let expected_gap = if version == 1 { 500 } else { 750 };
                assert_eq!(s.prompt_gap_ms, expected_gap, "from v{}", version);
                // migrated state lands under the current key, legacy key gone
                assert!(kv.get("ets_settings_v6").unwrap().is_some());
                assert_eq!(
                    kv.get(&format!("ets_settings_v{}", version)).unwrap(),
                    None
                );
            }
        }

        #[test]
        fn show_hints_is_discarded_by_the_chain() {
            let kv = MemoryKv::new();
            kv.set("ets_settings_v3", r#"{"volume":1.0,"showHints":true,
                    "promptGapMs":250,"autoReplay":true}"#)
                .unwrap();
            let _ = load(&kv).unwrap();
            let raw = kv.get("ets_settings_v6").unwrap().unwrap();
            assert!(!raw.contains("showHints"));
        }

        #[test]
        fn later_fields_survive_migration() {
            let kv = MemoryKv::new();
            kv.set(
                "ets_settings_v5",
                r#"{"volume":0.9,"promptGapMs":300,"autoReplay":false,
                    "notation":"solfege","dailyGoalXp":100}"#,
            )
            .unwrap();
            let s = load(&kv).unwrap();
            assert_eq!(s.notation, Notation::Solfege);
            assert_eq!(s.daily_goal_xp, 100);
            assert!(!s.reduced_motion);
        }

        #[test]
        fn unknown_state_yields_defaults() {
            let kv = MemoryKv::new();
            assert_eq!(load(&kv).unwrap(), Settings::default());
        }
    }

    mod roundtrip_tests {
        use super::*;

        #[test]
        fn save_then_load() {
            let kv = MemoryKv::new();
            let s = Settings {
                volume: 0.3,
                notation: Notation::Solfege,
                ..Settings::default()
            };
            save(&kv, &s).unwrap();
            assert_eq!(load(&kv).unwrap(), s);
        }

        #[test]
        fn wire_format_is_camel_case() {
            let kv = MemoryKv::new();
            save(&kv, &Settings::default()).unwrap();
            let raw = kv.get("ets_settings_v6").unwrap().unwrap();
            assert!(raw.contains("\"promptGapMs\""));
            assert!(raw.contains("\"dailyGoalXp\""));
            assert!(raw.contains("\"reducedMotion\""));
        }
    }
}
