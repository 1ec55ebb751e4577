use chrono::Utc;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Frame,
};

use crate::quests;
use crate::tui::App;

pub fn draw(f: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(9), // Stats + Quests row
            Constraint::Length(9), // Due + League row
            Constraint::Min(0),    // Recent sessions
        ])
        .split(area);

    let top_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(chunks[0]);

    let mid_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(chunks[1]);

    draw_stats(f, app, top_chunks[0]);
    draw_quests(f, app, top_chunks[1]);
    draw_due(f, app, mid_chunks[0]);
    draw_league(f, app, mid_chunks[1]);
    draw_recent_sessions(f, app, chunks[2]);
}

fn draw_stats(f: &mut Frame, app: &App, area: Rect) {
    let text = vec![
        Line::from(vec![
            Span::styled("XP: ", Style::default().fg(Color::Gray)),
            Span::styled(
                format!("{}", app.progress.xp_total),
                Style::default()
                    .fg(Color::White)
                    .add_modifier(Modifier::BOLD),
            ),
        ]),
        Line::from(vec![
            Span::styled("Streak: ", Style::default().fg(Color::Gray)),
            Span::styled(
                format!("{} days", app.progress.streak_days),
                Style::default().fg(if app.progress.streak_alive(Utc::now()) {
                    Color::Green
                } else {
                    Color::DarkGray
                }),
            ),
        ]),
        Line::from(vec![
            Span::styled("Due now: ", Style::default().fg(Color::Gray)),
            Span::styled(
                format!("{}", app.due_now),
                Style::default().fg(if app.due_now > 0 {
                    Color::Yellow
                } else {
                    Color::White
                }),
            ),
        ]),
        Line::from(vec![
            Span::styled("Hard items: ", Style::default().fg(Color::Gray)),
            Span::styled(
                format!("{}", app.hard),
                Style::default().fg(if app.hard > 0 {
                    Color::Red
                } else {
                    Color::White
                }),
            ),
        ]),
        Line::from(vec![
            Span::styled("Stations: ", Style::default().fg(Color::Gray)),
            Span::styled(
                format!(
                    "{}/{}",
                    app.progress.stations_done.len(),
                    app.stations.items.len()
                ),
                Style::default().fg(Color::Cyan),
            ),
        ]),
    ];

    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Stats ")
        .title_style(Style::default().fg(Color::Cyan));

    let paragraph = Paragraph::new(text).block(block);
    f.render_widget(paragraph, area);
}

fn draw_quests(f: &mut Frame, app: &App, area: Rect) {
    let quest = &app.quest;
    let chest = if quest.chest_claimed {
        ("claimed", Color::DarkGray)
    } else if quest.goals_met() {
        ("ready!", Color::Yellow)
    } else {
        ("locked", Color::Gray)
    };

    let text = vec![
        Line::from(vec![
            Span::styled("Reviews: ", Style::default().fg(Color::Gray)),
            Span::styled(
                format!("{}/{}", quest.review_attempts, quests::REVIEW_GOAL),
                Style::default().fg(Color::White),
            ),
        ]),
        Line::from(vec![
            Span::styled("Cleared: ", Style::default().fg(Color::Gray)),
            Span::styled(
                format!("{}", quest.reviews_cleared),
                Style::default().fg(Color::Green),
            ),
        ]),
        Line::from(vec![
            Span::styled("Stations: ", Style::default().fg(Color::Gray)),
            Span::styled(
                format!("{}/{}", quest.stations_completed, quests::STATION_GOAL),
                Style::default().fg(Color::White),
            ),
        ]),
        Line::from(vec![
            Span::styled("Chest: ", Style::default().fg(Color::Gray)),
            Span::styled(chest.0, Style::default().fg(chest.1)),
        ]),
    ];

    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" Quests ({}) ", quest.date))
        .title_style(Style::default().fg(Color::Yellow));

    let paragraph = Paragraph::new(text).block(block);
    f.render_widget(paragraph, area);
}

fn draw_due(f: &mut Frame, app: &App, area: Rect) {
    let buckets = &app.buckets;
    let mut lines = vec![Line::from(vec![
        Span::styled("<1h ", Style::default().fg(Color::Yellow)),
        Span::raw(format!("{}  ", buckets.within_hour.len())),
        Span::styled("today ", Style::default().fg(Color::Cyan)),
        Span::raw(format!("{}  ", buckets.today.len())),
        Span::styled("later ", Style::default().fg(Color::DarkGray)),
        Span::raw(format!("{}", buckets.later.len())),
    ])];
    for entry in buckets.within_hour.iter().take(4) {
        lines.push(Line::from(Span::styled(
            entry.kind.describe(),
            Style::default().fg(Color::White),
        )));
    }

    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Review Queue ")
        .title_style(Style::default().fg(Color::Yellow));

    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn draw_league(f: &mut Frame, app: &App, area: Rect) {
    let items: Vec<ListItem> = app
        .standings
        .iter()
        .enumerate()
        .take(6)
        .map(|(i, row)| {
            let style = if row.is_user {
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::White)
            };
            ListItem::new(Line::from(vec![
                Span::styled(format!("{}. ", i + 1), Style::default().fg(Color::DarkGray)),
                Span::styled(format!("{:<10}", row.name), style),
                Span::styled(format!("{:>6} XP", row.xp), Style::default().fg(Color::Gray)),
            ]))
        })
        .collect();

    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" League {} (rank {}) ", app.league_week, app.league_rank))
        .title_style(Style::default().fg(Color::Magenta));

    f.render_widget(List::new(items).block(block), area);
}

fn draw_recent_sessions(f: &mut Frame, app: &App, area: Rect) {
    let items: Vec<ListItem> = app
        .recent_sessions
        .iter()
        .map(|record| {
            let date = record.started_at.format("%b %d %H:%M").to_string();
            let rate = if record.answered == 0 {
                0
            } else {
                record.correct * 100 / record.answered
            };
            ListItem::new(Line::from(vec![
                Span::styled(format!("{:<14}", date), Style::default().fg(Color::DarkGray)),
                Span::styled(
                    format!("{:>3}/{:<3}", record.correct, record.answered),
                    Style::default().fg(Color::White),
                ),
                Span::styled(format!("  {}%", rate), Style::default().fg(Color::Cyan)),
            ]))
        })
        .collect();

    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Recent Review Sessions ")
        .title_style(Style::default().fg(Color::Magenta));

    f.render_widget(List::new(items).block(block), area);
}
