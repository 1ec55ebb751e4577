use chrono::Utc;
use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState},
    Frame,
};

use crate::mistakes::{CLEAR_STREAK, HARD_WRONG_COUNT};
use crate::tui::App;

pub fn draw(f: &mut Frame, app: &App, area: Rect) {
    let now = Utc::now();

    let items: Vec<ListItem> = app
        .mistakes
        .items
        .iter()
        .map(|entry| {
            let streak_bar = create_streak_bar(entry.correct_streak);
            let (due_text, due_color) = if entry.due_at <= now {
                ("due now".to_string(), Color::Red)
            } else {
                let mins = (entry.due_at - now).num_minutes().max(1);
                if mins < 90 {
                    (format!("in {}m", mins), Color::Yellow)
                } else {
                    (entry.due_at.format("%b %d %H:%M").to_string(), Color::White)
                }
            };
            let hard_marker = if entry.wrong_count >= HARD_WRONG_COUNT {
                " !"
            } else {
                ""
            };

            ListItem::new(Line::from(vec![
                Span::styled(
                    format!("{:<34}", entry.kind.describe()),
                    Style::default().fg(Color::White),
                ),
                Span::styled(streak_bar, Style::default().fg(Color::Green)),
                Span::styled(
                    format!(" x{} ", entry.wrong_count),
                    Style::default().fg(if entry.wrong_count >= HARD_WRONG_COUNT {
                        Color::Red
                    } else {
                        Color::Gray
                    }),
                ),
                Span::styled(due_text, Style::default().fg(due_color)),
                Span::styled(hard_marker, Style::default().fg(Color::Red)),
            ]))
        })
        .collect();

    let title = format!(" Mistakes ({}) ", app.mistakes.items.len());
    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .title_style(Style::default().fg(Color::Cyan));

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    let mut state = ListState::default();
    state.select(app.mistakes.selected);

    f.render_stateful_widget(list, area, &mut state);
}

fn create_streak_bar(streak: u32) -> String {
    let filled = (streak as usize).min(CLEAR_STREAK as usize);
    let empty = CLEAR_STREAK as usize - filled;
    format!("{}{}", "█".repeat(filled), "░".repeat(empty))
}
