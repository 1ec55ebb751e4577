use crate::exercises::{ExerciseKind, Mode};

/// One unit in the learning path: a lesson or a test over an exercise
/// family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Station {
    pub id: &'static str,
    pub title: &'static str,
    pub mode: Mode,
    pub exercise: ExerciseKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Section {
    pub id: &'static str,
    pub title: &'static str,
    pub stations: &'static [Station],
}

pub const SECTIONS: [Section; 3] = [
    Section {
        id: "notes",
        title: "Notes",
        stations: &[
            Station {
                id: "notes-1",
                title: "Naming notes",
                mode: Mode::Lesson,
                exercise: ExerciseKind::NoteName,
            },
            Station {
                id: "notes-2",
                title: "Scale degrees",
                mode: Mode::Lesson,
                exercise: ExerciseKind::ScaleDegree,
            },
            Station {
                id: "notes-test",
                title: "Notes checkpoint",
                mode: Mode::Test,
                exercise: ExerciseKind::NoteName,
            },
        ],
    },
    Section {
        id: "intervals",
        title: "Intervals",
        stations: &[
            Station {
                id: "intervals-1",
                title: "Seconds and thirds",
                mode: Mode::Lesson,
                exercise: ExerciseKind::Interval,
            },
            Station {
                id: "intervals-2",
                title: "Fourths and fifths",
                mode: Mode::Lesson,
                exercise: ExerciseKind::Interval,
            },
            Station {
                id: "intervals-test",
                title: "Intervals checkpoint",
                mode: Mode::Test,
                exercise: ExerciseKind::Interval,
            },
        ],
    },
    Section {
        id: "chords",
        title: "Chords",
        stations: &[
            Station {
                id: "chords-1",
                title: "Triad qualities",
                mode: Mode::Lesson,
                exercise: ExerciseKind::TriadQuality,
            },
            Station {
                id: "chords-2",
                title: "Chord functions",
                mode: Mode::Lesson,
                exercise: ExerciseKind::ChordFunction,
            },
            Station {
                id: "chords-test",
                title: "Chords checkpoint",
                mode: Mode::Test,
                exercise: ExerciseKind::TriadQuality,
            },
        ],
    },
];

pub fn all_stations() -> impl Iterator<Item = &'static Station> {
    SECTIONS.iter().flat_map(|s| s.stations.iter())
}

pub fn station_by_id(id: &str) -> Option<&'static Station> {
    all_stations().find(|s| s.id == id)
}

pub fn title_for_station(id: &str) -> Option<&'static str> {
    station_by_id(id).map(|s| s.title)
}
