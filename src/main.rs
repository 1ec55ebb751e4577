mod exercises;
mod league;
mod mistakes;
mod progress;
mod quests;
mod register;
mod rng;
mod session;
mod settings;
mod stations;
mod store;
mod theory;
mod tui;

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use exercises::{ExerciseKind, GenOptions, IntervalSpec, Mode, Question};
use mistakes::{MistakeKind, ReviewOutcome};
use store::{KvBackend, SqliteKv};

const DEFAULT_DB_NAME: &str = "eartrain.db";

// XP rewards per study event
const XP_PER_CORRECT: u32 = 5;
const XP_STATION: u32 = 20;
const XP_REVIEW_CLEAR: u32 = 10;

#[derive(Parser)]
#[command(name = "eartrain")]
#[command(about = "A terminal ear-training trainer with spaced-repetition review")]
#[command(version)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Print a generated question
    Question {
        #[command(flatten)]
        args: QuestionArgs,

        /// Also print the correct answer
        #[arg(long)]
        reveal: bool,
    },

    /// Grade an answer to a generated question
    Grade {
        #[command(flatten)]
        args: QuestionArgs,

        /// Chosen answer, 1-based
        #[arg(long)]
        choice: usize,
    },

    /// Work through the mistake review queue
    #[command(subcommand)]
    Review(ReviewCommands),

    /// Show learning statistics
    Stats,

    /// Show the learning path
    Stations,

    /// Mark a station as completed
    StationDone {
        /// Station ID
        id: String,
    },

    /// Daily quests
    #[command(subcommand)]
    Quests(QuestCommands),

    /// Weekly league standings
    League,

    /// Show or change settings
    #[command(subcommand)]
    Settings(SettingsCommands),

    /// Launch interactive terminal UI
    Tui,
}

#[derive(Args)]
struct QuestionArgs {
    /// Exercise kind: note|interval|degree|triad|function
    #[arg(long, short)]
    kind: String,

    /// Generation seed (random if omitted)
    #[arg(long, short)]
    seed: Option<u32>,

    /// Mode: lesson|test
    #[arg(long, short, default_value = "lesson")]
    mode: String,

    /// Number of answer choices
    #[arg(long, short, default_value_t = 4)]
    choices: usize,

    /// Lower MIDI bound of a custom register (with --hi)
    #[arg(long)]
    lo: Option<u8>,

    /// Upper MIDI bound of a custom register (with --lo)
    #[arg(long)]
    hi: Option<u8>,

    /// Fixed root MIDI note (interval questions)
    #[arg(long)]
    root: Option<u8>,

    /// Minimum interval size in semitones (interval questions)
    #[arg(long, default_value_t = 0)]
    min_semitones: u8,

    /// Maximum interval size in semitones (interval questions)
    #[arg(long, default_value_t = 12)]
    max_semitones: u8,
}

#[derive(Subcommand)]
enum ReviewCommands {
    /// List the review queue
    List {
        /// Only entries missed repeatedly
        #[arg(long)]
        hard: bool,
    },

    /// Print the next due mistake as a question
    Next {
        /// Distractor seed (random if omitted)
        #[arg(long, short)]
        seed: Option<u32>,

        /// Number of answer choices
        #[arg(long, short, default_value_t = 4)]
        choices: usize,
    },

    /// Grade a review answer
    Grade {
        /// Entry key as printed by list/next
        key: String,

        /// Chosen answer, 1-based
        #[arg(long)]
        choice: usize,

        /// Seed the question was generated with
        #[arg(long, short)]
        seed: u32,

        /// Number of answer choices
        #[arg(long, short, default_value_t = 4)]
        choices: usize,
    },
}

#[derive(Subcommand)]
enum QuestCommands {
    /// Today's quest progress
    Show,

    /// Claim the daily chest
    Claim,
}

#[derive(Subcommand)]
enum SettingsCommands {
    /// Print current settings
    Show,

    /// Change one setting
    Set {
        /// Field: volume|prompt-gap-ms|auto-replay|notation|daily-goal-xp|reduced-motion
        field: String,

        /// New value
        value: String,
    },
}

// JSON output wrapper for the --json flag
#[derive(Debug, Serialize)]
struct JsonOutput<T: Serialize> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

impl<T: Serialize> JsonOutput<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

fn get_db_path() -> PathBuf {
    if let Ok(path) = std::env::var("EARTRAIN_DB") {
        return PathBuf::from(path);
    }

    let config_dir = dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("eartrain");

    std::fs::create_dir_all(&config_dir).ok();
    config_dir.join(DEFAULT_DB_NAME)
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let db_path = get_db_path();
    let kv = SqliteKv::open(&db_path)?;

    match cli.command {
        Commands::Init => {
            // Loading every store runs any pending migrations and persists
            // the results under the current keys.
            let migrated = [
                settings::load_tagged(&kv)?.was_migrated(),
                progress::load_tagged(&kv)?.was_migrated(),
                mistakes::load_tagged(&kv)?.was_migrated(),
                quests::load_tagged(&kv)?.was_migrated(),
                league::load_tagged(&kv)?.was_migrated(),
            ]
            .iter()
            .filter(|&&m| m)
            .count();

            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string(&JsonOutput::ok(serde_json::json!({
                        "migratedStores": migrated
                    })))?
                );
            } else if migrated > 0 {
                println!(
                    "Database initialized at: {} ({} stores migrated)",
                    db_path.display(),
                    migrated
                );
            } else {
                println!("Database initialized at: {}", db_path.display());
            }
        }

        Commands::Question { args, reveal } => {
            let notation = settings::load(&kv)?.notation;
            let (question, seed, spec) = build_question(&args, notation)?;
            if cli.json {
                let mut data = serde_json::to_value(&question)?;
                if let Some(map) = data.as_object_mut() {
                    map.insert("seed".to_string(), serde_json::json!(seed));
                    if !reveal {
                        map.remove("correct");
                    }
                }
                println!("{}", serde_json::to_string(&JsonOutput::ok(data))?);
            } else {
                print_question(&question);
                println!();
                if reveal {
                    println!("Answer: {}", question.choices[question.correct]);
                }
                println!(
                    "Grade with:\n  eartrain grade --kind {} --seed {} --mode {} --choices {}{} --choice <n>",
                    spec.kind.as_str(),
                    seed,
                    spec.opts.mode.as_str(),
                    spec.opts.choices,
                    spec.echo_flags(),
                );
            }
        }

        Commands::Grade { args, choice } => {
            let notation = settings::load(&kv)?.notation;
            let (question, _, _) = build_question(&args, notation)?;
            if choice == 0 || choice > question.choices.len() {
                return Err(format!(
                    "Choice {} out of range 1..={}",
                    choice,
                    question.choices.len()
                )
                .into());
            }
            let correct = choice - 1 == question.correct;
            let summary = apply_drill_result(&kv, &question, correct, Utc::now())?;

            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string(&JsonOutput::ok(serde_json::json!({
                        "correct": correct,
                        "answer": question.choices[question.correct],
                        "xpAwarded": summary.xp_awarded,
                        "queued": summary.queued,
                        "goalReached": summary.goal_reached,
                    })))?
                );
            } else if correct {
                println!("Correct! (+{} XP)", summary.xp_awarded);
                if summary.goal_reached {
                    println!("Daily goal reached!");
                }
            } else {
                println!(
                    "Missed. The answer was: {}",
                    question.choices[question.correct]
                );
                println!("Queued for review ({}).", question.kind.dedup_key());
            }
        }

        Commands::Review(review_cmd) => run_review(&kv, cli.json, review_cmd)?,

        Commands::Stats => {
            let report = gather_stats(&kv, Utc::now())?;
            if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::ok(&report))?);
            } else {
                println!("=== Ear Training Statistics ===");
                println!("Total XP: {}", report.xp_total);
                println!("XP today: {}", report.xp_today);
                println!("Streak: {} days", report.streak_days);
                println!(
                    "Review queue: {} entries, {} due now ({} within the hour, {} later today, {} later)",
                    report.queue_size,
                    report.due_now,
                    report.due_within_hour,
                    report.due_today,
                    report.due_later
                );
                println!("Hard items: {}", report.hard);
                println!(
                    "Studied today: {}",
                    if report.studied_today { "yes" } else { "not yet" }
                );
                println!(
                    "Stations done: {}/{}",
                    report.stations_done, report.stations_total
                );
                println!(
                    "League: rank {} in {} ({} XP this week)",
                    report.league_rank, report.league_week, report.league_xp
                );
                println!("Workout days: {}", report.workout_days);
                if !report.worst_intervals.is_empty() {
                    let worst: Vec<String> = report
                        .worst_intervals
                        .iter()
                        .map(|(s, n)| format!("{} ({}x)", theory::interval_label(*s), n))
                        .collect();
                    println!("Weakest intervals: {}", worst.join(", "));
                }
            }
        }

        Commands::Stations => {
            let prog = progress::load(&kv)?;
            if cli.json {
                let rows: Vec<serde_json::Value> = stations::all_stations()
                    .map(|s| {
                        serde_json::json!({
                            "id": s.id,
                            "title": s.title,
                            "mode": s.mode.as_str(),
                            "exercise": s.exercise.as_str(),
                            "done": prog.station_done(s.id),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string(&JsonOutput::ok(rows))?);
            } else {
                for section in stations::SECTIONS {
                    println!("{}", section.title);
                    for station in section.stations {
                        let mark = if prog.station_done(station.id) {
                            "[x]"
                        } else {
                            "[ ]"
                        };
                        println!(
                            "  {} {:<16} {:<22} ({})",
                            mark,
                            station.id,
                            station.title,
                            station.mode.as_str()
                        );
                    }
                }
            }
        }

        Commands::StationDone { id } => {
            let station = stations::station_by_id(&id)
                .ok_or_else(|| format!("Unknown station '{}'", id))?;
            let now = Utc::now();
            let mut prog = progress::load(&kv)?;
            let newly_done = prog.mark_station_done(station.id);
            let mut xp_awarded = 0;
            progress::save(&kv, &prog)?;
            if newly_done {
                xp_awarded = XP_STATION;
                award_xp(&kv, XP_STATION, now)?;
                let mut quest = quests::load(&kv, now)?;
                quest.record_station_completed();
                quests::save(&kv, &quest)?;
                let mut workout = session::load_workout_days(&kv)?;
                workout.mark(now);
                session::save_workout_days(&kv, &workout)?;
            }

            let title = stations::title_for_station(&id).unwrap_or(station.title);
            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string(&JsonOutput::ok(serde_json::json!({
                        "id": station.id,
                        "title": title,
                        "newlyDone": newly_done,
                        "xpAwarded": xp_awarded,
                    })))?
                );
            } else if newly_done {
                println!("{} completed! (+{} XP)", title, xp_awarded);
            } else {
                println!("{} was already completed.", title);
            }
        }

        Commands::Quests(quest_cmd) => {
            let now = Utc::now();
            match quest_cmd {
                QuestCommands::Show => {
                    let quest = quests::load(&kv, now)?;
                    if cli.json {
                        println!("{}", serde_json::to_string(&JsonOutput::ok(&quest))?);
                    } else {
                        println!("=== Daily Quests ({}) ===", quest.date);
                        println!(
                            "Reviews attempted: {}/{}",
                            quest.review_attempts,
                            quests::REVIEW_GOAL
                        );
                        println!("Reviews cleared: {}", quest.reviews_cleared);
                        println!(
                            "Stations completed: {}/{}",
                            quest.stations_completed,
                            quests::STATION_GOAL
                        );
                        if quest.chest_claimed {
                            println!("Chest: claimed");
                        } else if quest.goals_met() {
                            println!("Chest: ready! Claim with: eartrain quests claim");
                        } else {
                            println!("Chest: locked");
                        }
                    }
                }
                QuestCommands::Claim => {
                    let mut quest = quests::load(&kv, now)?;
                    match quest.claim_chest() {
                        Some(xp) => {
                            quests::save(&kv, &quest)?;
                            award_xp(&kv, xp, now)?;
                            if cli.json {
                                println!(
                                    "{}",
                                    serde_json::to_string(&JsonOutput::ok(serde_json::json!({
                                        "xpAwarded": xp
                                    })))?
                                );
                            } else {
                                println!("Chest claimed! (+{} XP)", xp);
                            }
                        }
                        None => {
                            if cli.json {
                                println!(
                                    "{}",
                                    serde_json::to_string(&JsonOutput::<()>::err(
                                        "Chest unavailable"
                                    ))?
                                );
                            } else if quest.chest_claimed {
                                println!("Chest already claimed today.");
                            } else {
                                println!("Chest is locked; finish today's quests first.");
                            }
                        }
                    }
                }
            }
        }

        Commands::League => {
            let state = league::load(&kv, Utc::now())?;
            league::save(&kv, &state)?;
            let rows = league::standings(&state);
            if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::ok(&rows))?);
            } else {
                println!("=== League {} ===", state.week);
                for (i, row) in rows.iter().enumerate() {
                    let marker = if row.is_user { " <- you" } else { "" };
                    println!("{:>2}. {:<10} {:>6} XP{}", i + 1, row.name, row.xp, marker);
                }
            }
        }

        Commands::Settings(settings_cmd) => match settings_cmd {
            SettingsCommands::Show => {
                let s = settings::load(&kv)?;
                if cli.json {
                    println!("{}", serde_json::to_string(&JsonOutput::ok(&s))?);
                } else {
                    println!("volume:         {:.2}", s.volume);
                    println!("prompt-gap-ms:  {}", s.prompt_gap_ms);
                    println!("auto-replay:    {}", s.auto_replay);
                    println!("notation:       {}", s.notation.as_str());
                    println!("daily-goal-xp:  {}", s.daily_goal_xp);
                    println!("reduced-motion: {}", s.reduced_motion);
                }
            }
            SettingsCommands::Set { field, value } => {
                let mut s = settings::load(&kv)?;
                apply_setting(&mut s, &field, &value)?;
                settings::save(&kv, &s)?;
                if cli.json {
                    println!("{}", serde_json::to_string(&JsonOutput::ok(&s))?);
                } else {
                    println!("Set {} = {}", field, value);
                }
            }
        },

        Commands::Tui => {
            tui::run(kv)?;
        }
    }

    Ok(())
}

// A parsed question request: the resolved kind and options plus interval
// constraints, kept so output can echo a reproducible grade command.
struct QuestionSpec {
    kind: ExerciseKind,
    opts: GenOptions,
    interval: IntervalSpec,
}

impl QuestionSpec {
    fn echo_flags(&self) -> String {
        let mut flags = String::new();
        if let Some(band) = self.opts.register {
            flags.push_str(&format!(" --lo {} --hi {}", band.lo(), band.hi()));
        }
        if self.kind != ExerciseKind::Interval {
            return flags;
        }
        flags.push_str(&format!(
            " --min-semitones {} --max-semitones {}",
            self.interval.min_semitones, self.interval.max_semitones
        ));
        if let Some(root) = self.interval.root_midi {
            flags.push_str(&format!(" --root {}", root));
        }
        flags
    }
}

fn build_question(
    args: &QuestionArgs,
    notation: settings::Notation,
) -> Result<(Question, u32, QuestionSpec), Box<dyn std::error::Error>> {
    let kind = ExerciseKind::from_str(&args.kind).ok_or_else(|| {
        format!(
            "Invalid kind '{}'. Use: note, interval, degree, triad, or function",
            args.kind
        )
    })?;
    let mode = Mode::from_str(&args.mode)
        .ok_or_else(|| format!("Invalid mode '{}'. Use: lesson or test", args.mode))?;

    let seed = args.seed.unwrap_or_else(rand::random);
    let band = match (args.lo, args.hi) {
        (Some(lo), Some(hi)) => Some(register::Register::new(lo, hi)),
        _ => None,
    };
    let opts = GenOptions {
        mode,
        choices: args.choices,
        register: band,
        notation,
    };
    let interval = IntervalSpec {
        root_midi: args.root,
        min_semitones: args.min_semitones,
        max_semitones: args.max_semitones,
    };

    let question = match kind {
        ExerciseKind::Interval => exercises::interval_question(seed, &interval, &opts),
        _ => exercises::generate(kind, seed, &opts),
    };
    Ok((question, seed, QuestionSpec { kind, opts, interval }))
}

fn print_question(question: &Question) {
    println!("{}", question.prompt);
    for (i, choice) in question.choices.iter().enumerate() {
        println!("  {}. {}", i + 1, choice);
    }
}

// What a graded drill did to the stores, for reporting.
struct DrillSummary {
    xp_awarded: u32,
    queued: bool,
    goal_reached: bool,
}

fn apply_drill_result(
    kv: &dyn KvBackend,
    question: &Question,
    correct: bool,
    now: DateTime<Utc>,
) -> Result<DrillSummary, Box<dyn std::error::Error>> {
    let mut summary = DrillSummary {
        xp_awarded: 0,
        queued: false,
        goal_reached: false,
    };

    let mut workout = session::load_workout_days(kv)?;
    workout.mark(now);
    session::save_workout_days(kv, &workout)?;

    if correct {
        summary.xp_awarded = XP_PER_CORRECT;
        summary.goal_reached = award_xp(kv, XP_PER_CORRECT, now)?;
    } else {
        summary.queued = true;
        let mut queue = mistakes::load(kv)?;
        queue.record_miss(question.kind, now);
        mistakes::save(kv, &queue)?;

        if let MistakeKind::Interval { semitones, .. } = question.kind {
            let mut misses = session::load_interval_misses(kv)?;
            misses.record(semitones);
            session::save_interval_misses(kv, &misses)?;
        }
    }

    Ok(summary)
}

// Apply an XP reward to progress and the league; returns whether this
// crossed the daily goal (reported at most once per day via the toast
// guard).
fn award_xp(
    kv: &dyn KvBackend,
    xp: u32,
    now: DateTime<Utc>,
) -> Result<bool, Box<dyn std::error::Error>> {
    let mut prog = progress::load(kv)?;
    prog.apply_study_reward(now, xp);
    progress::save(kv, &prog)?;

    let mut league_state = league::load(kv, now)?;
    league_state.record_xp(xp);
    league::save(kv, &league_state)?;

    let goal = settings::load(kv)?.daily_goal_xp;
    if prog.xp_today(now) >= goal {
        let mut guard = session::load_toast_guard(kv)?;
        let fired = guard.should_show(now);
        session::save_toast_guard(kv, &guard)?;
        return Ok(fired);
    }
    Ok(false)
}

fn run_review(
    kv: &dyn KvBackend,
    json: bool,
    cmd: ReviewCommands,
) -> Result<(), Box<dyn std::error::Error>> {
    let now = Utc::now();
    let notation = settings::load(kv)?.notation;
    match cmd {
        ReviewCommands::List { hard } => {
            let queue = mistakes::load(kv)?;
            let entries: Vec<&mistakes::MistakeEntry> = if hard {
                queue.hard()
            } else {
                queue.entries.iter().collect()
            };
            if json {
                println!("{}", serde_json::to_string(&JsonOutput::ok(&entries))?);
            } else if entries.is_empty() {
                println!("Review queue is empty.");
            } else {
                println!("{:<24} {:<34} DUE", "KEY", "DESCRIPTION");
                println!("{}", "-".repeat(70));
                for entry in entries {
                    let due = if entry.due_at <= now {
                        "now".to_string()
                    } else {
                        let mins = (entry.due_at - now).num_minutes();
                        format!("in {}m", mins.max(1))
                    };
                    println!(
                        "{:<24} {:<34} {}",
                        entry.kind.dedup_key(),
                        entry.kind.describe(),
                        due
                    );
                }
            }
        }

        ReviewCommands::Next { seed, choices } => {
            let queue = mistakes::load(kv)?;
            match queue.next_due(now) {
                Some(entry) => {
                    let seed = seed.unwrap_or_else(rand::random);
                    let opts = GenOptions {
                        choices,
                        notation,
                        ..GenOptions::default()
                    };
                    let question = exercises::question_for(&entry.kind, seed, &opts);
                    if json {
                        let mut data = serde_json::to_value(&question)?;
                        if let Some(map) = data.as_object_mut() {
                            map.remove("correct");
                            map.insert(
                                "key".to_string(),
                                serde_json::json!(entry.kind.dedup_key()),
                            );
                            map.insert("seed".to_string(), serde_json::json!(seed));
                        }
                        println!("{}", serde_json::to_string(&JsonOutput::ok(data))?);
                    } else {
                        print_question(&question);
                        println!();
                        println!(
                            "Grade with:\n  eartrain review grade {} --seed {} --choices {} --choice <n>",
                            entry.kind.dedup_key(),
                            seed,
                            choices
                        );
                    }
                }
                None => {
                    if json {
                        println!("{}", serde_json::to_string(&JsonOutput::<()>::ok(()))?);
                    } else {
                        println!("Nothing due for review.");
                    }
                }
            }
        }

        ReviewCommands::Grade {
            key,
            choice,
            seed,
            choices,
        } => {
            let mut queue = mistakes::load(kv)?;
            let entry = queue
                .find(&key)
                .ok_or_else(|| format!("No queue entry with key '{}'", key))?;
            let kind = entry.kind;

            let opts = GenOptions {
                choices,
                notation,
                ..GenOptions::default()
            };
            let question = exercises::question_for(&kind, seed, &opts);
            if choice == 0 || choice > question.choices.len() {
                return Err(format!(
                    "Choice {} out of range 1..={}",
                    choice,
                    question.choices.len()
                )
                .into());
            }
            let correct = choice - 1 == question.correct;

            let outcome = match queue.review(&key, correct, now) {
                Some(outcome) => outcome,
                None => return Err(format!("No queue entry with key '{}'", key).into()),
            };
            mistakes::save(kv, &queue)?;

            let mut quest = quests::load(kv, now)?;
            quest.record_review_attempt();
            let mut xp_awarded = 0;
            if outcome == ReviewOutcome::Cleared {
                quest.record_review_cleared();
                xp_awarded = XP_REVIEW_CLEAR;
            }
            quests::save(kv, &quest)?;
            if xp_awarded > 0 {
                award_xp(kv, xp_awarded, now)?;
            }
            if !correct {
                if let MistakeKind::Interval { semitones, .. } = kind {
                    let mut misses = session::load_interval_misses(kv)?;
                    misses.record(semitones);
                    session::save_interval_misses(kv, &misses)?;
                }
            }
            record_review_session(kv, &kind, correct, now)?;

            if json {
                println!(
                    "{}",
                    serde_json::to_string(&JsonOutput::ok(serde_json::json!({
                        "correct": correct,
                        "answer": question.choices[question.correct],
                        "cleared": outcome == ReviewOutcome::Cleared,
                        "xpAwarded": xp_awarded,
                    })))?
                );
            } else if outcome == ReviewOutcome::Cleared {
                println!("Cleared! (+{} XP)", xp_awarded);
            } else if correct {
                println!("Correct. It will come back later for one more pass.");
            } else {
                println!(
                    "Missed again. The answer was: {}",
                    question.choices[question.correct]
                );
            }
        }
    }
    Ok(())
}

// Fold a graded review into the bounded session history. Grades close
// together extend the current session record; a lull starts a new one.
fn record_review_session(
    kv: &dyn KvBackend,
    kind: &MistakeKind,
    correct: bool,
    now: DateTime<Utc>,
) -> Result<(), Box<dyn std::error::Error>> {
    let params = vec![
        ("scope".to_string(), "due".to_string()),
        ("kind".to_string(), kind.dedup_key()),
    ];
    let signature = session::review_session_signature(&params, false);

    let mut history = session::load_sessions(kv)?;
    let extend = history
        .records
        .last()
        .map(|r| r.signature == signature && now - r.started_at < chrono::Duration::hours(1))
        .unwrap_or(false);
    if extend {
        if let Some(last) = history.records.last_mut() {
            last.answered += 1;
            if correct {
                last.correct += 1;
            }
        }
    } else {
        history.push(session::SessionRecord {
            started_at: now,
            answered: 1,
            correct: u32::from(correct),
            signature,
        });
    }
    session::save_sessions(kv, &history)?;
    Ok(())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsReport {
    xp_total: u64,
    xp_today: u32,
    streak_days: u32,
    due_now: usize,
    due_within_hour: usize,
    due_today: usize,
    due_later: usize,
    hard: usize,
    queue_size: usize,
    stations_done: usize,
    stations_total: usize,
    studied_today: bool,
    league_week: String,
    league_xp: u64,
    league_rank: usize,
    workout_days: usize,
    ab_bucket: String,
    worst_intervals: Vec<(u8, u32)>,
}

fn gather_stats(
    kv: &dyn KvBackend,
    now: DateTime<Utc>,
) -> Result<StatsReport, Box<dyn std::error::Error>> {
    let prog = progress::load(kv)?;
    let queue = mistakes::load(kv)?;
    let buckets = queue.buckets(now);
    let league_state = league::load(kv, now)?;
    let workout = session::load_workout_days(kv)?;
    let misses = session::load_interval_misses(kv)?;
    let bucket = session::ab_bucket(kv)?;

    Ok(StatsReport {
        xp_total: prog.xp_total,
        xp_today: prog.xp_today(now),
        streak_days: prog.streak_days,
        due_now: queue.due_now(now).len(),
        due_within_hour: buckets.within_hour.len(),
        due_today: buckets.today.len(),
        due_later: buckets.later.len(),
        hard: queue.hard().len(),
        queue_size: queue.len(),
        stations_done: prog.stations_done.len(),
        stations_total: stations::all_stations().count(),
        studied_today: workout.contains(now),
        league_week: league_state.week.clone(),
        league_xp: league_state.xp_this_week,
        league_rank: league::user_rank(&league_state),
        workout_days: workout.len(),
        ab_bucket: bucket.as_str().to_string(),
        worst_intervals: misses.worst().into_iter().take(3).collect(),
    })
}

fn apply_setting(
    s: &mut settings::Settings,
    field: &str,
    value: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    match field {
        "volume" => {
            let v: f32 = value.parse()?;
            if !(0.0..=1.0).contains(&v) {
                return Err("volume must be between 0.0 and 1.0".into());
            }
            s.volume = v;
        }
        "prompt-gap-ms" => s.prompt_gap_ms = value.parse()?,
        "auto-replay" => s.auto_replay = value.parse()?,
        "notation" => {
            s.notation = settings::Notation::from_str(value)
                .ok_or_else(|| format!("Invalid notation '{}'. Use: letters or solfege", value))?;
        }
        "daily-goal-xp" => s.daily_goal_xp = value.parse()?,
        "reduced-motion" => s.reduced_motion = value.parse()?,
        other => {
            return Err(format!(
                "Unknown setting '{}'. Fields: volume, prompt-gap-ms, auto-replay, notation, daily-goal-xp, reduced-motion",
                other
            )
            .into())
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryKv;
    use clap::Parser;

    mod cli_parsing_tests {
        use super::*;

        #[test]
        fn parse_init_command() {
            let cli = Cli::try_parse_from(["eartrain", "init"]).unwrap();
            assert!(!cli.json);
            assert!(matches!(cli.command, Commands::Init));
        }

        #[test]
        fn parse_question_with_kind() {
            let cli =
                Cli::try_parse_from(["eartrain", "question", "--kind", "interval"]).unwrap();
            match cli.command {
                Commands::Question { args, reveal } => {
                    assert_eq!(args.kind, "interval");
                    assert!(args.seed.is_none());
                    assert_eq!(args.choices, 4);
                    assert!(!reveal);
                }
                _ => panic!("Expected Question command"),
            }
        }

        #[test]
        fn parse_question_full() {
            let cli = Cli::try_parse_from([
                "eartrain",
                "question",
                "-k",
                "interval",
                "-s",
                "9",
                "-m",
                "test",
                "-c",
                "3",
                "--root",
                "70",
                "--min-semitones",
                "2",
                "--max-semitones",
                "9",
                "--reveal",
            ])
            .unwrap();
            match cli.command {
                Commands::Question { args, reveal } => {
                    assert_eq!(args.seed, Some(9));
                    assert_eq!(args.mode, "test");
                    assert_eq!(args.choices, 3);
                    assert_eq!(args.root, Some(70));
                    assert_eq!(args.min_semitones, 2);
                    assert_eq!(args.max_semitones, 9);
                    assert!(reveal);
                }
                _ => panic!("Expected Question command"),
            }
        }

        #[test]
        fn parse_grade_requires_choice() {
            assert!(Cli::try_parse_from(["eartrain", "grade", "--kind", "note"]).is_err());
            let cli = Cli::try_parse_from([
                "eartrain", "grade", "--kind", "note", "--seed", "4", "--choice", "2",
            ])
            .unwrap();
            match cli.command {
                Commands::Grade { args, choice } => {
                    assert_eq!(args.kind, "note");
                    assert_eq!(choice, 2);
                }
                _ => panic!("Expected Grade command"),
            }
        }

        #[test]
        fn parse_review_subcommands() {
            let cli = Cli::try_parse_from(["eartrain", "review", "list", "--hard"]).unwrap();
            assert!(matches!(
                cli.command,
                Commands::Review(ReviewCommands::List { hard: true })
            ));

            let cli = Cli::try_parse_from([
                "eartrain",
                "review",
                "grade",
                "interval:55:7",
                "--choice",
                "1",
                "--seed",
                "3",
            ])
            .unwrap();
            match cli.command {
                Commands::Review(ReviewCommands::Grade {
                    key,
                    choice,
                    seed,
                    choices,
                }) => {
                    assert_eq!(key, "interval:55:7");
                    assert_eq!(choice, 1);
                    assert_eq!(seed, 3);
                    assert_eq!(choices, 4);
                }
                _ => panic!("Expected Review Grade command"),
            }
        }

        #[test]
        fn parse_station_done() {
            let cli = Cli::try_parse_from(["eartrain", "station-done", "notes-1"]).unwrap();
            match cli.command {
                Commands::StationDone { id } => assert_eq!(id, "notes-1"),
                _ => panic!("Expected StationDone command"),
            }
        }

        #[test]
        fn parse_settings_set() {
            let cli =
                Cli::try_parse_from(["eartrain", "settings", "set", "volume", "0.5"]).unwrap();
            match cli.command {
                Commands::Settings(SettingsCommands::Set { field, value }) => {
                    assert_eq!(field, "volume");
                    assert_eq!(value, "0.5");
                }
                _ => panic!("Expected Settings Set command"),
            }
        }

        #[test]
        fn parse_json_flag_global() {
            let cli = Cli::try_parse_from(["eartrain", "--json", "stats"]).unwrap();
            assert!(cli.json);
            let cli = Cli::try_parse_from(["eartrain", "stats", "--json"]).unwrap();
            assert!(cli.json);
        }

        #[test]
        fn parse_invalid_command_fails() {
            assert!(Cli::try_parse_from(["eartrain", "invalid"]).is_err());
        }
    }

    mod build_question_tests {
        use super::*;
        use settings::Notation;

        fn args(kind: &str, seed: Option<u32>) -> QuestionArgs {
            QuestionArgs {
                kind: kind.to_string(),
                seed,
                mode: "lesson".to_string(),
                choices: 4,
                lo: None,
                hi: None,
                root: None,
                min_semitones: 0,
                max_semitones: 12,
            }
        }

        #[test]
        fn build_is_reproducible_from_seed() {
            let (a, seed_a, _) =
                build_question(&args("interval", Some(8)), Notation::Letters).unwrap();
            let (b, seed_b, _) =
                build_question(&args("interval", Some(8)), Notation::Letters).unwrap();
            assert_eq!(seed_a, seed_b);
            assert_eq!(a, b);
        }

        #[test]
        fn invalid_kind_is_rejected() {
            assert!(build_question(&args("melody", Some(1)), Notation::Letters).is_err());
        }

        #[test]
        fn invalid_mode_is_rejected() {
            let mut a = args("note", Some(1));
            a.mode = "exam2".to_string();
            assert!(build_question(&a, Notation::Letters).is_err());
        }

        #[test]
        fn echo_flags_echo_constraints() {
            let mut a = args("interval", Some(1));
            a.root = Some(66);
            a.min_semitones = 2;
            a.max_semitones = 9;
            let (_, _, spec) = build_question(&a, Notation::Letters).unwrap();
            let flags = spec.echo_flags();
            assert!(flags.contains("--root 66"));
            assert!(flags.contains("--min-semitones 2"));
        }

        #[test]
        fn non_interval_kinds_have_no_echo_flags() {
            let (_, _, spec) = build_question(&args("triad", Some(1)), Notation::Letters).unwrap();
            assert_eq!(spec.echo_flags(), "");
        }

        #[test]
        fn custom_register_bounds_are_applied() {
            let mut a = args("note", Some(2));
            a.lo = Some(48);
            a.hi = Some(59);
            let (question, _, spec) = build_question(&a, Notation::Letters).unwrap();
            match question.kind {
                MistakeKind::NoteName { midi } => assert!((48..=59).contains(&midi)),
                other => panic!("unexpected kind {:?}", other),
            }
            assert!(spec.echo_flags().contains("--lo 48"));
        }
    }

    mod pipeline_tests {
        use super::*;
        use chrono::TimeZone;

        fn t0() -> DateTime<Utc> {
            Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap()
        }

        fn sample_question() -> Question {
            exercises::generate(ExerciseKind::Interval, 7, &GenOptions::default())
        }

        #[test]
        fn correct_drill_awards_xp_and_marks_workout() {
            let kv = MemoryKv::new();
            let summary = apply_drill_result(&kv, &sample_question(), true, t0()).unwrap();
            assert_eq!(summary.xp_awarded, XP_PER_CORRECT);
            assert!(!summary.queued);

            let prog = progress::load(&kv).unwrap();
            assert_eq!(prog.xp_total, u64::from(XP_PER_CORRECT));
            assert_eq!(prog.streak_days, 1);
            assert_eq!(session::load_workout_days(&kv).unwrap().len(), 1);
            assert!(mistakes::load(&kv).unwrap().is_empty());
        }

        #[test]
        fn missed_drill_queues_mistake_and_histogram() {
            let kv = MemoryKv::new();
            let question = sample_question();
            let summary = apply_drill_result(&kv, &question, false, t0()).unwrap();
            assert!(summary.queued);
            assert_eq!(summary.xp_awarded, 0);

            let queue = mistakes::load(&kv).unwrap();
            assert_eq!(queue.len(), 1);
            assert_eq!(queue.entries[0].kind, question.kind);
            assert!(!session::load_interval_misses(&kv)
                .unwrap()
                .counts
                .is_empty());
        }

        #[test]
        fn goal_toast_fires_once_per_day() {
            let kv = MemoryKv::new();
            let mut s = settings::load(&kv).unwrap();
            s.daily_goal_xp = XP_PER_CORRECT;
            settings::save(&kv, &s).unwrap();

            let first = apply_drill_result(&kv, &sample_question(), true, t0()).unwrap();
            assert!(first.goal_reached);
            let second = apply_drill_result(&kv, &sample_question(), true, t0()).unwrap();
            assert!(!second.goal_reached);
        }

        #[test]
        fn review_session_history_extends_within_the_hour() {
            let kv = MemoryKv::new();
            let kind = MistakeKind::Interval {
                root_midi: theory::NoteName::C.to_midi(4),
                semitones: 7,
            };
            record_review_session(&kv, &kind, true, t0()).unwrap();
            record_review_session(&kv, &kind, false, t0() + chrono::Duration::minutes(5))
                .unwrap();

            let history = session::load_sessions(&kv).unwrap();
            assert_eq!(history.records.len(), 1);
            assert_eq!(history.records[0].answered, 2);
            assert_eq!(history.records[0].correct, 1);

            record_review_session(&kv, &kind, true, t0() + chrono::Duration::hours(3)).unwrap();
            let history = session::load_sessions(&kv).unwrap();
            assert_eq!(history.records.len(), 2);
        }

        #[test]
        fn stats_report_reflects_store_state() {
            let kv = MemoryKv::new();
            apply_drill_result(&kv, &sample_question(), false, t0()).unwrap();
            apply_drill_result(&kv, &sample_question(), true, t0()).unwrap();

            let report = gather_stats(&kv, t0()).unwrap();
            assert_eq!(report.due_now, 1);
            assert_eq!(report.xp_total, u64::from(XP_PER_CORRECT));
            assert_eq!(report.stations_total, stations::all_stations().count());
            assert!(report.ab_bucket == "a" || report.ab_bucket == "b");
        }
    }

    mod settings_field_tests {
        use super::*;

        #[test]
        fn set_volume_in_range() {
            let mut s = settings::Settings::default();
            apply_setting(&mut s, "volume", "0.25").unwrap();
            assert_eq!(s.volume, 0.25);
        }

        #[test]
        fn set_volume_out_of_range_fails() {
            let mut s = settings::Settings::default();
            assert!(apply_setting(&mut s, "volume", "1.5").is_err());
        }

        #[test]
        fn set_notation() {
            let mut s = settings::Settings::default();
            apply_setting(&mut s, "notation", "solfege").unwrap();
            assert_eq!(s.notation, settings::Notation::Solfege);
        }

        #[test]
        fn unknown_field_fails() {
            let mut s = settings::Settings::default();
            assert!(apply_setting(&mut s, "theme", "dark").is_err());
        }

        #[test]
        fn boolean_fields_parse() {
            let mut s = settings::Settings::default();
            apply_setting(&mut s, "auto-replay", "false").unwrap();
            assert!(!s.auto_replay);
            apply_setting(&mut s, "reduced-motion", "true").unwrap();
            assert!(s.reduced_motion);
        }
    }

    mod db_path_tests {
        use super::*;
        use std::env;

        #[test]
        fn get_db_path_uses_env_var() {
            let test_path = "/tmp/test_eartrain.db";
            env::set_var("EARTRAIN_DB", test_path);

            let path = get_db_path();
            assert_eq!(path.to_str().unwrap(), test_path);

            env::remove_var("EARTRAIN_DB");
        }

        #[test]
        fn get_db_path_default_includes_db_name() {
            env::remove_var("EARTRAIN_DB");

            let path = get_db_path();
            let path_str = path.to_str().unwrap();

            assert!(path_str.ends_with("eartrain.db"));
            assert!(path_str.contains("eartrain"));
        }
    }
}
