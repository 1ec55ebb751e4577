mod ui;
mod widgets;

use std::io;
use std::time::Duration;

use chrono::Utc;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};

use crate::league::Standing;
use crate::mistakes::{DueBuckets, MistakeEntry};
use crate::progress::Progress;
use crate::quests::QuestState;
use crate::session::SessionRecord;
use crate::stations::Station;
use crate::store::SqliteKv;
use crate::{league, mistakes, progress, quests, session, stations};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Dashboard,
    Mistakes,
    Stations,
}

impl View {
    fn next(&self) -> Self {
        match self {
            View::Dashboard => View::Mistakes,
            View::Mistakes => View::Stations,
            View::Stations => View::Dashboard,
        }
    }

    fn prev(&self) -> Self {
        match self {
            View::Dashboard => View::Stations,
            View::Mistakes => View::Dashboard,
            View::Stations => View::Mistakes,
        }
    }
}

pub struct StatefulList<T> {
    pub items: Vec<T>,
    pub selected: Option<usize>,
}

impl<T> StatefulList<T> {
    fn with_items(items: Vec<T>) -> Self {
        let selected = if items.is_empty() { None } else { Some(0) };
        Self { items, selected }
    }

    fn next(&mut self) {
        if self.items.is_empty() {
            return;
        }
        let i = match self.selected {
            Some(i) => {
                if i >= self.items.len() - 1 {
                    0
                } else {
                    i + 1
                }
            }
            None => 0,
        };
        self.selected = Some(i);
    }

    fn previous(&mut self) {
        if self.items.is_empty() {
            return;
        }
        let i = match self.selected {
            Some(i) => {
                if i == 0 {
                    self.items.len() - 1
                } else {
                    i - 1
                }
            }
            None => 0,
        };
        self.selected = Some(i);
    }
}

/// One row of the learning-path view.
pub struct StationRow {
    pub section_title: &'static str,
    pub station: &'static Station,
    pub done: bool,
}

pub struct App {
    kv: SqliteKv,
    pub view: View,
    pub progress: Progress,
    pub quest: QuestState,
    pub buckets: DueBuckets,
    pub due_now: usize,
    pub hard: usize,
    pub league_week: String,
    pub league_rank: usize,
    pub standings: Vec<Standing>,
    pub mistakes: StatefulList<MistakeEntry>,
    pub stations: StatefulList<StationRow>,
    pub recent_sessions: Vec<SessionRecord>,
    pub should_quit: bool,
}

impl App {
    pub fn new(kv: SqliteKv) -> Result<Self, Box<dyn std::error::Error>> {
        let mut app = Self {
            kv,
            view: View::Dashboard,
            progress: Progress::default(),
            quest: QuestState::default(),
            buckets: DueBuckets::default(),
            due_now: 0,
            hard: 0,
            league_week: String::new(),
            league_rank: 0,
            standings: Vec::new(),
            mistakes: StatefulList::with_items(Vec::new()),
            stations: StatefulList::with_items(Vec::new()),
            recent_sessions: Vec::new(),
            should_quit: false,
        };
        app.refresh_data()?;
        Ok(app)
    }

    pub fn refresh_data(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let now = Utc::now();

        self.progress = progress::load(&self.kv)?;
        self.quest = quests::load(&self.kv, now)?;

        let queue = mistakes::load(&self.kv)?;
        self.due_now = queue.due_now(now).len();
        self.hard = queue.hard().len();
        self.buckets = queue.buckets(now);
        let mut entries = queue.entries;
        entries.sort_by_key(|e| e.due_at);
        self.mistakes = StatefulList::with_items(entries);

        let league_state = league::load(&self.kv, now)?;
        self.league_week = league_state.week.clone();
        self.league_rank = league::user_rank(&league_state);
        self.standings = league::standings(&league_state);

        let rows: Vec<StationRow> = stations::SECTIONS
            .iter()
            .flat_map(|section| {
                section.stations.iter().map(|station| StationRow {
                    section_title: section.title,
                    station,
                    done: self.progress.station_done(station.id),
                })
            })
            .collect();
        self.stations = StatefulList::with_items(rows);

        let history = session::load_sessions(&self.kv)?;
        self.recent_sessions = history.records.into_iter().rev().take(5).collect();

        Ok(())
    }

    fn handle_key(
        &mut self,
        key: KeyCode,
        modifiers: KeyModifiers,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match key {
            KeyCode::Char('q') => self.should_quit = true,

            KeyCode::Char('r') if modifiers.contains(KeyModifiers::CONTROL) => {
                self.refresh_data()?;
            }

            KeyCode::Char('h') | KeyCode::Left => self.view = self.view.prev(),
            KeyCode::Char('l') | KeyCode::Right => self.view = self.view.next(),

            KeyCode::Tab => {
                if modifiers.contains(KeyModifiers::SHIFT) {
                    self.view = self.view.prev();
                } else {
                    self.view = self.view.next();
                }
            }
            KeyCode::BackTab => {
                self.view = self.view.prev();
            }

            KeyCode::Char('j') | KeyCode::Down => match self.view {
                View::Mistakes => self.mistakes.next(),
                View::Stations => self.stations.next(),
                View::Dashboard => {}
            },
            KeyCode::Char('k') | KeyCode::Up => match self.view {
                View::Mistakes => self.mistakes.previous(),
                View::Stations => self.stations.previous(),
                View::Dashboard => {}
            },

            KeyCode::Char('g') => match self.view {
                View::Mistakes if !self.mistakes.items.is_empty() => {
                    self.mistakes.selected = Some(0);
                }
                View::Stations if !self.stations.items.is_empty() => {
                    self.stations.selected = Some(0);
                }
                _ => {}
            },
            KeyCode::Char('G') => match self.view {
                View::Mistakes if !self.mistakes.items.is_empty() => {
                    self.mistakes.selected = Some(self.mistakes.items.len() - 1);
                }
                View::Stations if !self.stations.items.is_empty() => {
                    self.stations.selected = Some(self.stations.items.len() - 1);
                }
                _ => {}
            },

            _ => {}
        }
        Ok(())
    }
}

pub fn run(kv: SqliteKv) -> Result<(), Box<dyn std::error::Error>> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Create app state
    let mut app = App::new(kv)?;

    // Main loop
    let result = run_app(&mut terminal, &mut app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    result
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
) -> Result<(), Box<dyn std::error::Error>> {
    loop {
        terminal.draw(|f| ui::draw(f, app))?;

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                app.handle_key(key.code, key.modifiers)?;
            }
        }

        if app.should_quit {
            return Ok(());
        }
    }
}
