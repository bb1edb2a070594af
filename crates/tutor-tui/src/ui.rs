use std::sync::OnceLock;

use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Frame;
use tui_banner::Banner;

use crate::app::{Activity, App, MessageRole};

const SPINNER: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Banner art, rendered once.
struct BannerCache {
    lines: Vec<String>,
    width: u16,
    height: u16,
}

fn cached_banner() -> &'static BannerCache {
    static CACHE: OnceLock<BannerCache> = OnceLock::new();
    CACHE.get_or_init(|| {
        let text = Banner::new("TUTOR")
            .map(|b| b.style(tui_banner::Style::NeonCyber).render())
            .unwrap_or_else(|_| String::from("TUTOR"));
        let lines: Vec<String> = text.lines().map(str::to_string).collect();
        let width = lines
            .iter()
            .map(|l| l.chars().count() as u16)
            .max()
            .unwrap_or(5);
        let height = lines.len() as u16;
        BannerCache {
            lines,
            width,
            height,
        }
    })
}

pub fn draw(f: &mut Frame, app: &App) {
    let area = f.area();
    let banner = cached_banner();

    // Full art when it fits, a one-line title when cramped, nothing below 11 rows.
    let min_messages_rows: u16 = 8;
    let banner_height = if area.height < min_messages_rows + 3 {
        0
    } else if area.width >= banner.width + 2 && area.height >= banner.height + 1 + min_messages_rows {
        banner.height + 1
    } else {
        2
    };

    let mut constraints = Vec::with_capacity(4);
    if banner_height > 0 {
        constraints.push(Constraint::Length(banner_height));
    }
    constraints.extend([Constraint::Min(1), Constraint::Length(1), Constraint::Length(3)]);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(area);

    let body = if banner_height > 0 {
        draw_banner(f, chunks[0], banner_height);
        &chunks[1..]
    } else {
        &chunks[..]
    };
    draw_messages(f, app, body[0]);
    draw_status_bar(f, app, body[1]);
    draw_input(f, app, body[2]);
}

fn draw_banner(f: &mut Frame, area: Rect, banner_height: u16) {
    let banner = cached_banner();

    let lines: Vec<Line> = if banner_height > 2 && area.width >= banner.width {
        banner
            .lines
            .iter()
            .map(|l| Line::from(Span::styled(l.clone(), Style::default().fg(Color::Cyan))))
            .collect()
    } else {
        vec![Line::from(vec![
            Span::styled(
                " TUTOR",
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            ),
            Span::styled("  MCP-aware agent shell", Style::default().fg(Color::DarkGray)),
        ])]
    };

    let widget = Paragraph::new(lines).block(Block::default().borders(Borders::BOTTOM));
    f.render_widget(widget, area);
}

fn role_style(role: &MessageRole) -> (&'static str, Style) {
    match role {
        MessageRole::User => (
            "> ",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        MessageRole::Assistant => ("", Style::default().fg(Color::White)),
        MessageRole::Command => ("", Style::default().fg(Color::Yellow)),
        MessageRole::Error => (
            "[error] ",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        ),
        MessageRole::System => ("[system] ", Style::default().fg(Color::DarkGray)),
    }
}

fn draw_messages(f: &mut Frame, app: &App, area: Rect) {
    let mut lines: Vec<Line> = Vec::new();

    for msg in &app.messages {
        let (prefix, style) = role_style(&msg.role);
        for text_line in msg.text.lines() {
            lines.push(Line::from(vec![
                Span::styled(prefix, style),
                Span::styled(text_line.to_string(), style),
            ]));
        }
        lines.push(Line::from(""));
    }

    for text_line in app.streaming_text.lines() {
        lines.push(Line::from(Span::styled(
            text_line.to_string(),
            Style::default().fg(Color::White),
        )));
    }

    // Bottom-anchored; scroll_offset counts lines up from the bottom.
    let visible_height = area.height.saturating_sub(2) as usize;
    let scroll = lines
        .len()
        .saturating_sub(visible_height)
        .saturating_sub(app.scroll_offset);

    let messages = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title(" Messages "))
        .wrap(Wrap { trim: false })
        .scroll((scroll.min(u16::MAX as usize) as u16, 0));

    f.render_widget(messages, area);
}

/// Text shown in the one-line status bar.
pub fn status_text(app: &App) -> String {
    let spinner = SPINNER[(app.tick_count / 2) % SPINNER.len()];
    match app.activity() {
        Activity::Probing => format!(" {} Testing MCP connections... (Esc to cancel)", spinner),
        Activity::Thinking => format!(" {} Thinking... (Esc to cancel)", spinner),
        Activity::Idle => {
            let wizard = match app.session.wizard().step() {
                Some(step) => format!(" | adding server, step {}/4", step + 1),
                None => String::new(),
            };
            format!(
                " mcp: {} servers{} | /quit to exit",
                app.session.enabled_count(),
                wizard
            )
        }
    }
}

fn draw_status_bar(f: &mut Frame, app: &App, area: Rect) {
    let status = Paragraph::new(status_text(app))
        .style(Style::default().bg(Color::DarkGray).fg(Color::White));
    f.render_widget(status, area);
}

fn draw_input(f: &mut Frame, app: &App, area: Rect) {
    let input = Paragraph::new(app.input.buffer.as_str())
        .block(Block::default().borders(Borders::ALL).title(" Input "))
        .style(Style::default().fg(Color::White));

    f.render_widget(input, area);

    let cursor_x = area.x + 1 + app.input.cursor_column() as u16;
    let cursor_y = area.y + 1;
    f.set_cursor_position((cursor_x.min(area.x + area.width.saturating_sub(2)), cursor_y));
}
