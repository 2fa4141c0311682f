use crate::market::{Phase, WatchEntry};
use crate::ui::charts::Sparkline;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Widget},
};
use rust_decimal::prelude::ToPrimitive;

pub struct WatchlistWidget<'a> {
    entries: &'a [WatchEntry],
    active: Option<&'a str>,
}

impl<'a> WatchlistWidget<'a> {
    pub fn new(entries: &'a [WatchEntry], active: Option<&'a str>) -> Self {
        Self { entries, active }
    }
}

impl Widget for WatchlistWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .title(" Watchlist ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray));

        let inner = block.inner(area);
        block.render(area, buf);

        if inner.width < 16 || inner.height < 1 {
            return;
        }

        if self.entries.is_empty() {
            let msg = "Press / to add";
            let x = inner.x + (inner.width.saturating_sub(msg.len() as u16)) / 2;
            buf.set_string(x, inner.y, msg, Style::default().fg(Color::DarkGray));
            return;
        }

        // Two rows per entry: symbol + price, then a sparkline
        for (i, entry) in self.entries.iter().enumerate() {
            let y = inner.y + (i as u16) * 2;
            if y >= inner.y + inner.height {
                break;
            }

            let is_active = self.active == Some(entry.symbol());
            let marker = if is_active { "▶" } else { " " };
            let symbol_style = if is_active {
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::White)
            };

            buf.set_string(inner.x, y, marker, symbol_style);
            buf.set_string(inner.x + 2, y, entry.symbol(), symbol_style);

            let reconciler = entry.reconciler();
            let (price, color) = match (reconciler.phase(), reconciler.summary()) {
                (_, Some(summary)) => (
                    format!("{:.2}", summary.current_price),
                    if summary.is_rising() { Color::Green } else { Color::Red },
                ),
                (Phase::Loading, None) => ("…".to_string(), Color::Yellow),
                _ => ("-".to_string(), Color::DarkGray),
            };
            let x_price = inner.x + inner.width - price.chars().count() as u16;
            buf.set_string(x_price, y, &price, Style::default().fg(color));

            let spark_y = y + 1;
            if spark_y >= inner.y + inner.height {
                continue;
            }
            let closes: Vec<f64> = reconciler
                .candles()
                .iter()
                .map(|c| c.close.to_f64().unwrap_or(0.0))
                .collect();
            Sparkline::new(&closes)
                .color(if is_active { Color::Cyan } else { Color::DarkGray })
                .render(Rect::new(inner.x + 2, spark_y, inner.width - 2, 1), buf);
        }
    }
}
