use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::mistakes::MistakeKind;
use crate::register::{self, Register};
use crate::rng::{derive_seed, Mulberry32};
use crate::settings::Notation;
use crate::theory::{
    self, ChordFunction, NoteName, ScaleMode, TriadQuality,
};

/// Smallest allowed multiple-choice list.
pub const MIN_CHOICES: usize = 2;

/// Exercise families offered by the trainer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExerciseKind {
    NoteName,
    Interval,
    ScaleDegree,
    TriadQuality,
    ChordFunction,
}

impl ExerciseKind {
    pub const ALL: [ExerciseKind; 5] = [
        ExerciseKind::NoteName,
        ExerciseKind::Interval,
        ExerciseKind::ScaleDegree,
        ExerciseKind::TriadQuality,
        ExerciseKind::ChordFunction,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExerciseKind::NoteName => "note",
            ExerciseKind::Interval => "interval",
            ExerciseKind::ScaleDegree => "degree",
            ExerciseKind::TriadQuality => "triad",
            ExerciseKind::ChordFunction => "function",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "note" | "notename" | "n" => Some(ExerciseKind::NoteName),
            "interval" | "i" => Some(ExerciseKind::Interval),
            "degree" | "scaledegree" | "d" => Some(ExerciseKind::ScaleDegree),
            "triad" | "t" => Some(ExerciseKind::TriadQuality),
            "function" | "chordfunction" | "f" => Some(ExerciseKind::ChordFunction),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ExerciseKind::NoteName => "Note naming",
            ExerciseKind::Interval => "Intervals",
            ExerciseKind::ScaleDegree => "Scale degrees",
            ExerciseKind::TriadQuality => "Triad qualities",
            ExerciseKind::ChordFunction => "Chord functions",
        }
    }
}

/// Lessons drill the stable register; tests roam the wide one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Lesson,
    Test,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Lesson => "lesson",
            Mode::Test => "test",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "lesson" | "l" => Some(Mode::Lesson),
            "test" | "t" | "exam" => Some(Mode::Test),
            _ => None,
        }
    }

    pub fn register(&self) -> Register {
        match self {
            Mode::Lesson => register::STABLE,
            Mode::Test => register::WIDE,
        }
    }
}

/// Shared generation options.
#[derive(Debug, Clone, Copy)]
pub struct GenOptions {
    pub mode: Mode,
    pub choices: usize,
    /// Override band for note sampling; defaults to the mode's band.
    pub register: Option<Register>,
    /// Pitch-class spelling for note-name answers.
    pub notation: Notation,
}

impl Default for GenOptions {
    fn default() -> Self {
        Self {
            mode: Mode::Lesson,
            choices: 4,
            register: None,
            notation: Notation::Letters,
        }
    }
}

impl GenOptions {
    fn band(&self) -> Register {
        self.register.unwrap_or_else(|| self.mode.register()).viable()
    }
}

/// Constraints for the interval generator.
#[derive(Debug, Clone, Copy)]
pub struct IntervalSpec {
    pub root_midi: Option<u8>,
    pub min_semitones: u8,
    pub max_semitones: u8,
}

impl Default for IntervalSpec {
    fn default() -> Self {
        Self {
            root_midi: None,
            min_semitones: 0,
            max_semitones: 12,
        }
    }
}

/// A fully generated multiple-choice question.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    /// The underlying fact; doubles as the mistake de-duplication key.
    #[serde(flatten)]
    pub kind: MistakeKind,
    pub prompt: String,
    pub choices: Vec<String>,
    /// Index of the correct answer within `choices`.
    pub correct: usize,
    /// MIDI payload for an external audio player.
    pub notes: Vec<u8>,
}

/// Generate a question of the given family from a seed.
pub fn generate(kind: ExerciseKind, seed: u32, opts: &GenOptions) -> Question {
    let fact = sample_fact(kind, seed, opts);
    question_for(&fact, derive_seed(seed, 1), opts)
}

/// Sample only the musical fact for an exercise family.
pub fn sample_fact(kind: ExerciseKind, seed: u32, opts: &GenOptions) -> MistakeKind {
    let mut rng = Mulberry32::new(seed);
    match kind {
        ExerciseKind::NoteName => MistakeKind::NoteName {
            midi: opts.band().sample(&mut rng),
        },
        ExerciseKind::Interval => sample_interval(&mut rng, &IntervalSpec::default(), opts),
        ExerciseKind::ScaleDegree => MistakeKind::ScaleDegree {
            key: NoteName::ALL[rng.pick_in(0, 11) as usize],
            mode: ScaleMode::ALL[rng.pick_in(0, 1) as usize],
            degree: rng.pick_in(1, 7) as u8,
        },
        ExerciseKind::TriadQuality => MistakeKind::TriadQuality {
            root_midi: opts.band().sample(&mut rng),
            quality: TriadQuality::ALL[rng.pick_in(0, 3) as usize],
        },
        ExerciseKind::ChordFunction => MistakeKind::ChordFunction {
            key: NoteName::ALL[rng.pick_in(0, 11) as usize],
            function: ChordFunction::ALL[rng.pick_in(0, 6) as usize],
        },
    }
}

/// Interval generator with explicit constraints (the other families go
/// through [`generate`]).
pub fn interval_question(seed: u32, spec: &IntervalSpec, opts: &GenOptions) -> Question {
    let mut rng = Mulberry32::new(seed);
    let fact = sample_interval(&mut rng, spec, opts);
    question_for(&fact, derive_seed(seed, 1), opts)
}

fn sample_interval(rng: &mut Mulberry32, spec: &IntervalSpec, opts: &GenOptions) -> MistakeKind {
    // Clamp degenerate constraints instead of erroring.
    let lo = spec.min_semitones.min(12);
    let hi = spec.max_semitones.min(12);
    let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
    let semitones = rng.pick_in(lo as u32, hi as u32) as u8;

    let root = spec
        .root_midi
        .unwrap_or_else(|| opts.band().sample(rng))
        .min(127 - semitones);
    MistakeKind::Interval {
        root_midi: root,
        semitones,
    }
}

/// Build the question for a known fact. Review uses this to re-ask a
/// stored mistake with fresh distractors.
pub fn question_for(kind: &MistakeKind, seed: u32, opts: &GenOptions) -> Question {
    let mut rng = Mulberry32::new(seed);
    match *kind {
        MistakeKind::NoteName { midi } => {
            let answer = NoteName::from_midi(midi);
            let ranked = ranked_pitch_classes(answer, opts.notation);
            let (choices, correct) = assemble_choices(
                &mut rng,
                note_label(answer, opts.notation),
                ranked,
                opts.choices,
            );
            Question {
                kind: *kind,
                prompt: format!("Which pitch class is {}?", theory::midi_label(midi)),
                choices,
                correct,
                notes: vec![midi],
            }
        }
        MistakeKind::Interval {
            root_midi,
            semitones,
        } => {
            let target = root_midi.saturating_add(semitones);
            let ranked = ranked_intervals(semitones);
            let (choices, correct) = assemble_choices(
                &mut rng,
                theory::interval_label(semitones).to_string(),
                ranked,
                opts.choices,
            );
            Question {
                kind: *kind,
                prompt: format!(
                    "From {} up to {}: which interval?",
                    theory::midi_label(root_midi),
                    theory::midi_label(target)
                ),
                choices,
                correct,
                notes: vec![root_midi, target],
            }
        }
        MistakeKind::ScaleDegree { key, mode, degree } => {
            let note = mode.degree_note(key, degree);
            let ranked = ranked_degrees(degree);
            let (choices, correct) = assemble_choices(
                &mut rng,
                theory::degree_label(degree).to_string(),
                ranked,
                opts.choices,
            );
            Question {
                kind: *kind,
                prompt: format!(
                    "In {} {}, which scale degree is {}?",
                    key.letter(),
                    mode.label(),
                    note.letter()
                ),
                choices,
                correct,
                notes: vec![key.to_midi(4), note.to_midi(4)],
            }
        }
        MistakeKind::TriadQuality { root_midi, quality } => {
            let spelled = theory::spell_triad(root_midi, quality);
            let labels: Vec<String> =
                spelled.iter().map(|&m| theory::midi_label(m)).collect();
            let ranked = ranked_qualities(quality);
            let (choices, correct) = assemble_choices(
                &mut rng,
                quality.label().to_string(),
                ranked,
                opts.choices,
            );
            Question {
                kind: *kind,
                prompt: format!("{}: which triad quality?", labels.join("-")),
                choices,
                correct,
                notes: spelled,
            }
        }
        MistakeKind::ChordFunction { key, function } => {
            let root = function.root_in(key);
            let ranked = ranked_functions(function);
            let (choices, correct) = assemble_choices(
                &mut rng,
                function.numeral().to_string(),
                ranked,
                opts.choices,
            );
            Question {
                kind: *kind,
                prompt: format!(
                    "In {} major, which function is the triad on {}?",
                    key.letter(),
                    root.letter()
                ),
                choices,
                correct,
                notes: theory::spell_triad(root.to_midi(4), function.quality()),
            }
        }
    }
}

fn note_label(pc: NoteName, notation: Notation) -> String {
    match notation {
        Notation::Letters => pc.letter().to_string(),
        Notation::Solfege => pc.solfege().to_string(),
    }
}

// Distractor pools, nearest plausible confusion first.

fn ranked_pitch_classes(answer: NoteName, notation: Notation) -> Vec<String> {
    let base = answer.semitone();
    let mut ranked = Vec::new();
    for d in 1..=6u8 {
        ranked.push(note_label(NoteName::from_semitone(base + d), notation));
        if d < 6 {
            ranked.push(note_label(NoteName::from_semitone(base + 12 - d), notation));
        }
    }
    ranked
}

fn ranked_intervals(semitones: u8) -> Vec<String> {
    let mut ranked = Vec::new();
    for d in 1..=12u8 {
        if semitones + d <= 12 {
            ranked.push(theory::interval_label(semitones + d).to_string());
        }
        if semitones >= d {
            ranked.push(theory::interval_label(semitones - d).to_string());
        }
    }
    ranked
}

fn ranked_degrees(degree: u8) -> Vec<String> {
    let mut ranked = Vec::new();
    for d in 1..=6u8 {
        if degree + d <= 7 {
            ranked.push(theory::degree_label(degree + d).to_string());
        }
        if degree > d {
            ranked.push(theory::degree_label(degree - d).to_string());
        }
    }
    ranked
}

fn ranked_qualities(quality: TriadQuality) -> Vec<String> {
    let idx = TriadQuality::ALL
        .iter()
        .position(|&q| q == quality)
        .unwrap_or(0);
    let mut ranked: Vec<(usize, String)> = TriadQuality::ALL
        .iter()
        .enumerate()
        .filter(|&(i, _)| i != idx)
        .map(|(i, q)| (idx.abs_diff(i), q.label().to_string()))
        .collect();
    ranked.sort_by_key(|&(dist, _)| dist);
    ranked.into_iter().map(|(_, label)| label).collect()
}

fn ranked_functions(function: ChordFunction) -> Vec<String> {
    let idx = function.degree_index();
    let mut ranked: Vec<(usize, String)> = ChordFunction::ALL
        .iter()
        .filter(|&&f| f != function)
        .map(|f| {
            let d = idx.abs_diff(f.degree_index());
            (d.min(7 - d), f.numeral().to_string())
        })
        .collect();
    ranked.sort_by_key(|&(dist, _)| dist);
    ranked.into_iter().map(|(_, label)| label).collect()
}

/// Take near-miss distractors from the ranked pool (with a little
/// deterministic variety), add the correct answer, shuffle, and report
/// where the answer landed. The requested count is clamped to
/// `[MIN_CHOICES, pool size]`; an exhausted pool is used whole.
fn assemble_choices(
    rng: &mut Mulberry32,
    correct: String,
    mut ranked: Vec<String>,
    requested: usize,
) -> (Vec<String>, usize) {
    ranked.dedup();
    ranked.retain(|c| *c != correct);
    let pool_size = ranked.len() + 1;
    let want = requested.max(MIN_CHOICES).min(pool_size);

    let window = (want + 1).min(ranked.len());
    let mut distractors: Vec<String> = ranked.drain(..window).collect();
    distractors.shuffle(rng);
    distractors.truncate(want - 1);

    let mut choices = distractors;
    choices.push(correct.clone());
    choices.shuffle(rng);
    let correct_idx = choices
        .iter()
        .position(|c| *c == correct)
        .unwrap_or_default();
    (choices, correct_idx)
}
