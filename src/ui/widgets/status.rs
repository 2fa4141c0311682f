use crate::data::{SeriesKey, Summary};
use crate::market::Phase;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Widget},
};
use rust_decimal::Decimal;

pub struct StatusWidget<'a> {
    series: Option<&'a SeriesKey>,
    summary: Option<&'a Summary>,
    phase: Option<Phase>,
    connected: bool,
    auto_refresh: bool,
    balance: Option<Decimal>,
}

impl<'a> StatusWidget<'a> {
    pub fn new(series: Option<&'a SeriesKey>, summary: Option<&'a Summary>, connected: bool) -> Self {
        Self {
            series,
            summary,
            phase: None,
            connected,
            auto_refresh: true,
            balance: None,
        }
    }

    pub fn phase(mut self, phase: Option<Phase>) -> Self {
        self.phase = phase;
        self
    }

    pub fn auto_refresh(mut self, on: bool) -> Self {
        self.auto_refresh = on;
        self
    }

    pub fn balance(mut self, balance: Option<Decimal>) -> Self {
        self.balance = balance;
        self
    }
}

impl Widget for StatusWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .title(" Candlewatch ")
            .title_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray));

        let inner = block.inner(area);
        block.render(area, buf);

        if inner.width < 40 || inner.height < 2 {
            return;
        }

        let mut y = inner.y;

        // Connection status
        let conn_status = if self.connected { "● CONNECTED" } else { "○ RECONNECTING" };
        let conn_color = if self.connected {
            Color::Green
        } else {
            Color::Red
        };
        buf.set_string(inner.x + 1, y, conn_status, Style::default().fg(conn_color));

        let series = self
            .series
            .map(|s| s.to_string())
            .unwrap_or_else(|| "no symbol selected".to_string());
        buf.set_string(
            inner.x + 18,
            y,
            &series,
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        );

        let phase = match self.phase {
            Some(Phase::Loading) => "loading…",
            Some(Phase::Empty) => "idle",
            Some(Phase::Ready) | None => "",
        };
        let x_phase = inner.x + 20 + series.len() as u16;
        if x_phase + 10 < inner.x + inner.width {
            buf.set_string(x_phase, y, phase, Style::default().fg(Color::Yellow));
        }

        let refresh = if self.auto_refresh { "auto-refresh on" } else { "auto-refresh off" };
        if inner.width > 70 {
            buf.set_string(
                inner.x + inner.width - refresh.len() as u16 - 1,
                y,
                refresh,
                Style::default().fg(Color::DarkGray),
            );
        }

        y += 1;
        if y >= inner.y + inner.height {
            return;
        }

        if let Some(summary) = self.summary {
            let change_color = if summary.is_rising() {
                Color::Green
            } else {
                Color::Red
            };
            let change_sign = if summary.is_rising() { "+" } else { "" };

            let price_str = format!(
                "Price: {:.2} ({}{:.2}%)",
                summary.current_price, change_sign, summary.price_change_24h
            );
            buf.set_string(inner.x + 1, y, &price_str, Style::default().fg(change_color));

            let range_str = format!("H {:.2}  L {:.2}", summary.high_24, summary.low_24);
            let x_range = inner.x + 3 + price_str.len() as u16;
            buf.set_string(x_range, y, &range_str, Style::default().fg(Color::White));

            let volume_str = format!("Avg vol {:.0}", summary.avg_volume);
            let x_volume = x_range + range_str.len() as u16 + 2;
            if x_volume + (volume_str.len() as u16) < inner.x + inner.width {
                buf.set_string(x_volume, y, &volume_str, Style::default().fg(Color::Cyan));
            }
        }

        if let Some(balance) = self.balance {
            let balance_str = format!("Balance: R$ {:.2}", balance);
            if inner.width > 90 {
                buf.set_string(
                    inner.x + inner.width - balance_str.chars().count() as u16 - 1,
                    y,
                    &balance_str,
                    Style::default().fg(Color::White),
                );
            }
        }
    }
}
