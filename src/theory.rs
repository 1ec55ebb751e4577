use serde::{Deserialize, Serialize};

/// The twelve pitch classes, spelled with sharps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NoteName {
    C,
    CSharp,
    D,
    DSharp,
    E,
    F,
    FSharp,
    G,
    GSharp,
    A,
    ASharp,
    B,
}

impl NoteName {
    pub const ALL: [NoteName; 12] = [
        NoteName::C,
        NoteName::CSharp,
        NoteName::D,
        NoteName::DSharp,
        NoteName::E,
        NoteName::F,
        NoteName::FSharp,
        NoteName::G,
        NoteName::GSharp,
        NoteName::A,
        NoteName::ASharp,
        NoteName::B,
    ];

    /// Semitone within the octave (C=0, B=11).
    pub fn semitone(self) -> u8 {
        match self {
            NoteName::C => 0,
            NoteName::CSharp => 1,
            NoteName::D => 2,
            NoteName::DSharp => 3,
            NoteName::E => 4,
            NoteName::F => 5,
            NoteName::FSharp => 6,
            NoteName::G => 7,
            NoteName::GSharp => 8,
            NoteName::A => 9,
            NoteName::ASharp => 10,
            NoteName::B => 11,
        }
    }

    pub fn from_semitone(semitone: u8) -> Self {
        Self::ALL[(semitone % 12) as usize]
    }

    /// Pitch class of a MIDI note number.
    pub fn from_midi(midi: u8) -> Self {
        Self::from_semitone(midi % 12)
    }

    /// MIDI note number for this pitch class in the given octave
    /// (octave 4 holds middle C).
    pub fn to_midi(self, octave: u8) -> u8 {
        (octave + 1) * 12 + self.semitone()
    }

    pub fn letter(self) -> &'static str {
        match self {
            NoteName::C => "C",
            NoteName::CSharp => "C#",
            NoteName::D => "D",
            NoteName::DSharp => "D#",
            NoteName::E => "E",
            NoteName::F => "F",
            NoteName::FSharp => "F#",
            NoteName::G => "G",
            NoteName::GSharp => "G#",
            NoteName::A => "A",
            NoteName::ASharp => "A#",
            NoteName::B => "B",
        }
    }

    pub fn solfege(self) -> &'static str {
        match self {
            NoteName::C => "Do",
            NoteName::CSharp => "Di",
            NoteName::D => "Re",
            NoteName::DSharp => "Ri",
            NoteName::E => "Mi",
            NoteName::F => "Fa",
            NoteName::FSharp => "Fi",
            NoteName::G => "Sol",
            NoteName::GSharp => "Si",
            NoteName::A => "La",
            NoteName::ASharp => "Li",
            NoteName::B => "Ti",
        }
    }
}

impl std::fmt::Display for NoteName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// "C4"-style label for a MIDI note number.
pub fn midi_label(midi: u8) -> String {
    let octave = (midi / 12) as i32 - 1;
    format!("{}{}", NoteName::from_midi(midi).letter(), octave)
}

/// Interval names for 0..=12 semitones. Out-of-range values clamp to the
/// octave.
pub fn interval_label(semitones: u8) -> &'static str {
    const LABELS: [&str; 13] = [
        "Unison",
        "Minor 2nd",
        "Major 2nd",
        "Minor 3rd",
        "Major 3rd",
        "Perfect 4th",
        "Tritone",
        "Perfect 5th",
        "Minor 6th",
        "Major 6th",
        "Minor 7th",
        "Major 7th",
        "Octave",
    ];
    LABELS[(semitones as usize).min(LABELS.len() - 1)]
}

/// The two scale modes the trainer drills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScaleMode {
    Major,
    NaturalMinor,
}

impl ScaleMode {
    pub const ALL: [ScaleMode; 2] = [ScaleMode::Major, ScaleMode::NaturalMinor];

    /// Interval pattern in semitones from the root.
    pub fn intervals(self) -> &'static [u8; 7] {
        match self {
            ScaleMode::Major => &[0, 2, 4, 5, 7, 9, 11],
            ScaleMode::NaturalMinor => &[0, 2, 3, 5, 7, 8, 10],
        }
    }

    /// Pitch class of the given degree (1..=7) in this mode.
    pub fn degree_note(self, key: NoteName, degree: u8) -> NoteName {
        let idx = (degree.clamp(1, 7) - 1) as usize;
        NoteName::from_semitone(key.semitone() + self.intervals()[idx])
    }

    pub fn label(self) -> &'static str {
        match self {
            ScaleMode::Major => "major",
            ScaleMode::NaturalMinor => "minor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriadQuality {
    Major,
    Minor,
    Diminished,
    Augmented,
}

impl TriadQuality {
    pub const ALL: [TriadQuality; 4] = [
        TriadQuality::Major,
        TriadQuality::Minor,
        TriadQuality::Diminished,
        TriadQuality::Augmented,
    ];

    pub fn intervals(self) -> &'static [u8; 3] {
        match self {
            TriadQuality::Major => &[0, 4, 7],
            TriadQuality::Minor => &[0, 3, 7],
            TriadQuality::Diminished => &[0, 3, 6],
            TriadQuality::Augmented => &[0, 4, 8],
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TriadQuality::Major => "Major",
            TriadQuality::Minor => "Minor",
            TriadQuality::Diminished => "Diminished",
            TriadQuality::Augmented => "Augmented",
        }
    }
}

/// MIDI notes of a triad built on the given root note.
pub fn spell_triad(root_midi: u8, quality: TriadQuality) -> Vec<u8> {
    quality
        .intervals()
        .iter()
        .map(|&i| root_midi.saturating_add(i))
        .collect()
}

/// Diatonic functions of the major scale, as drilled in the chord-function
/// exercise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChordFunction {
    Tonic,
    Supertonic,
    Mediant,
    Subdominant,
    Dominant,
    Submediant,
    LeadingTone,
}

impl ChordFunction {
    pub const ALL: [ChordFunction; 7] = [
        ChordFunction::Tonic,
        ChordFunction::Supertonic,
        ChordFunction::Mediant,
        ChordFunction::Subdominant,
        ChordFunction::Dominant,
        ChordFunction::Submediant,
        ChordFunction::LeadingTone,
    ];

    /// Scale position, 0-based.
    pub fn degree_index(self) -> usize {
        match self {
            ChordFunction::Tonic => 0,
            ChordFunction::Supertonic => 1,
            ChordFunction::Mediant => 2,
            ChordFunction::Subdominant => 3,
            ChordFunction::Dominant => 4,
            ChordFunction::Submediant => 5,
            ChordFunction::LeadingTone => 6,
        }
    }

    /// Root pitch class of this function's triad in the given major key.
    pub fn root_in(self, key: NoteName) -> NoteName {
        ScaleMode::Major.degree_note(key, self.degree_index() as u8 + 1)
    }

    /// Triad quality this function takes in a major key.
    pub fn quality(self) -> TriadQuality {
        match self {
            ChordFunction::Tonic | ChordFunction::Subdominant | ChordFunction::Dominant => {
                TriadQuality::Major
            }
            ChordFunction::LeadingTone => TriadQuality::Diminished,
            _ => TriadQuality::Minor,
        }
    }

    pub fn numeral(self) -> &'static str {
        match self {
            ChordFunction::Tonic => "I",
            ChordFunction::Supertonic => "ii",
            ChordFunction::Mediant => "iii",
            ChordFunction::Subdominant => "IV",
            ChordFunction::Dominant => "V",
            ChordFunction::Submediant => "vi",
            ChordFunction::LeadingTone => "vii\u{00b0}",
        }
    }
}

/// Ordinal label for a scale degree (1..=7).
pub fn degree_label(degree: u8) -> &'static str {
    match degree {
        1 => "1st",
        2 => "2nd",
        3 => "3rd",
        4 => "4th",
        5 => "5th",
        6 => "6th",
        _ => "7th",
    }
}
