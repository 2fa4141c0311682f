use crate::data::Candle;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Widget},
};

const WIDTH: u16 = 24;
const HEIGHT: u16 = 9;

/// OHLCV box for the candle under the mouse pointer.
pub struct TooltipWidget<'a> {
    candle: &'a Candle,
    /// Pointer position; the box is placed next to it
    pointer: (u16, u16),
}

impl<'a> TooltipWidget<'a> {
    pub fn new(candle: &'a Candle, pointer: (u16, u16)) -> Self {
        Self { candle, pointer }
    }

    /// Right of and below the pointer, flipped to stay inside `bounds`.
    pub fn placement(&self, bounds: Rect) -> Rect {
        let (px, py) = self.pointer;
        let width = WIDTH.min(bounds.width);
        let height = HEIGHT.min(bounds.height);

        let x = if px + 2 + width <= bounds.x + bounds.width {
            px + 2
        } else {
            px.saturating_sub(width + 1).max(bounds.x)
        };
        let y = if py + height <= bounds.y + bounds.height {
            py
        } else {
            (bounds.y + bounds.height).saturating_sub(height).max(bounds.y)
        };
        Rect::new(x, y, width, height)
    }
}

impl Widget for TooltipWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let rect = self.placement(area);
        Clear.render(rect, buf);

        let candle = self.candle;
        let color = if candle.is_up() { Color::Green } else { Color::Red };
        let block = Block::default()
            .title(format!(" {} ", candle.close_time.format("%d/%m %H:%M:%S")))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(color))
            .style(Style::default().bg(Color::Black));

        let label = Style::default().fg(Color::DarkGray);
        let value = Style::default().fg(Color::White);
        let row = |name: &'static str, text: String, style: Style| {
            Line::from(vec![Span::styled(name, label), Span::styled(text, style)])
        };

        let mut lines = vec![
            row("Open   ", format!("{:.2}", candle.open), value),
            row("High   ", format!("{:.2}", candle.high), value),
            row("Low    ", format!("{:.2}", candle.low), value),
            row(
                "Close  ",
                format!("{:.2}", candle.close),
                Style::default().fg(color).add_modifier(Modifier::BOLD),
            ),
            row("Volume ", format!("{:.0}", candle.volume), value),
        ];
        if let Some(trades) = candle.trade_count {
            lines.push(row("Trades ", trades.to_string(), value));
        }

        Paragraph::new(lines).block(block).render(rect, buf);
    }
}
