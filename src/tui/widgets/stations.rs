use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState},
    Frame,
};

use crate::tui::App;

pub fn draw(f: &mut Frame, app: &App, area: Rect) {
    let items: Vec<ListItem> = app
        .stations
        .items
        .iter()
        .map(|row| {
            let mark = if row.done { "[x]" } else { "[ ]" };
            let mark_color = if row.done { Color::Green } else { Color::Gray };
            ListItem::new(Line::from(vec![
                Span::styled(format!("{} ", mark), Style::default().fg(mark_color)),
                Span::styled(
                    format!("{:<10}", row.section_title),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::styled(
                    format!("{:<22}", row.station.title),
                    Style::default().fg(if row.done {
                        Color::DarkGray
                    } else {
                        Color::White
                    }),
                ),
                Span::styled(
                    format!("({})", row.station.mode.as_str()),
                    Style::default().fg(Color::Cyan),
                ),
            ]))
        })
        .collect();

    let done = app.stations.items.iter().filter(|r| r.done).count();
    let title = format!(" Stations ({}/{}) ", done, app.stations.items.len());
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
    state.select(app.stations.selected);

    f.render_stateful_widget(list, area, &mut state);
}
