//! Help overlay showing all keybindings

use crate::ui::dialogs::centered_rect;
use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Widget},
};

const SECTIONS: &[(&str, &[(&str, &str)])] = &[
    (
        "MARKET",
        &[
            ("Tab / ↓", "Next watchlist symbol"),
            ("S-Tab / ↑", "Previous watchlist symbol"),
            ("] / [", "Next / previous interval"),
            ("r", "Reload the active chart"),
            ("a", "Toggle auto-refresh"),
        ],
    ),
    (
        "WATCHLIST",
        &[
            ("/", "Add a symbol"),
            ("d", "Remove the active symbol"),
        ],
    ),
    (
        "TRADING",
        &[
            ("b", "Open BUY dialog for the active symbol"),
            ("s", "Open SELL dialog for the active symbol"),
        ],
    ),
    (
        "OTHER",
        &[
            ("mouse", "Hover a candle for its details"),
            ("?", "Show this help"),
            ("q / Esc", "Quit (close dialog or exit)"),
        ],
    ),
];

/// Help overlay widget
#[derive(Default)]
pub struct HelpOverlay;

impl HelpOverlay {
    pub fn new() -> Self {
        Self
    }
}

impl Widget for HelpOverlay {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let dialog_area = centered_rect(60, 70, area);

        // Clear background
        Clear.render(dialog_area, buf);

        let block = Block::default()
            .title(" Help - Keybindings ")
            .title_alignment(Alignment::Center)
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .style(Style::default().bg(Color::Black));

        let inner = block.inner(dialog_area);
        block.render(dialog_area, buf);

        let header_style = Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD);
        let key_style = Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD);
        let desc_style = Style::default().fg(Color::White);
        let dim_style = Style::default().fg(Color::DarkGray);

        let mut lines = Vec::new();
        for (header, keys) in SECTIONS {
            lines.push(Line::from(vec![Span::styled(*header, header_style)]));
            for (key, desc) in keys.iter() {
                lines.push(Line::from(vec![
                    Span::styled(format!("  {:<11}", key), key_style),
                    Span::styled(*desc, desc_style),
                ]));
            }
            lines.push(Line::from(""));
        }
        lines.push(Line::from(vec![Span::styled(
            "Press any key to close this help",
            dim_style,
        )]));

        Paragraph::new(lines)
            .alignment(Alignment::Left)
            .render(inner, buf);
    }
}
