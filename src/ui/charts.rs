use crate::chart::{render, Anchor, ChartLayout, DrawCommand, Hue};
use crate::data::{Candle, SeriesKey};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Widget},
};

/// Chart draw commands for the last rendered (series, version, size).
/// Rebuilt only when one of those changes.
#[derive(Debug, Default)]
pub struct ChartCache {
    key: Option<(SeriesKey, u64, u16, u16)>,
    commands: Vec<DrawCommand>,
}

impl ChartCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(
        &mut self,
        series: &SeriesKey,
        version: u64,
        area: Rect,
        candles: &[Candle],
        layout: &ChartLayout,
    ) -> &[DrawCommand] {
        let key = (series.clone(), version, area.width, area.height);
        if self.key.as_ref() != Some(&key) {
            let label = format!("{} - {}", series.symbol, series.interval);
            self.commands = render(
                candles,
                area.width as f64,
                area.height as f64,
                &label,
                layout,
            );
            self.key = Some(key);
        }
        &self.commands
    }
}

/// The candles that fit in a chart `width` cells wide, newest last.
pub fn visible_candles<'a>(candles: &'a [Candle], width: u16, layout: &ChartLayout) -> &'a [Candle] {
    let fit = layout.capacity(width as f64).min(candles.len());
    &candles[candles.len() - fit..]
}

/// Rasterizes [`DrawCommand`]s in terminal cells.
pub struct PriceChart<'a> {
    commands: &'a [DrawCommand],
    title: String,
    status: Option<&'a str>,
}

impl<'a> PriceChart<'a> {
    pub fn new(commands: &'a [DrawCommand], title: &str) -> Self {
        Self {
            commands,
            title: format!(" {} ", title),
            status: None,
        }
    }

    /// Message shown instead of the chart when there is nothing to draw.
    pub fn status(mut self, status: Option<&'a str>) -> Self {
        self.status = status;
        self
    }
}

pub fn hue_color(hue: Hue) -> Color {
    match hue {
        Hue::Up | Hue::Down => {
            let (r, g, b) = hue.rgb();
            Color::Rgb(r, g, b)
        }
        Hue::Grid => Color::DarkGray,
        Hue::Axis => Color::Gray,
        Hue::Label => Color::Gray,
        Hue::Title => Color::White,
    }
}

impl Widget for PriceChart<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .title(self.title.as_str())
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray));

        let inner = block.inner(area);
        block.render(area, buf);

        if self.commands.is_empty() {
            if let Some(status) = self.status {
                let x = inner.x + inner.width.saturating_sub(status.len() as u16) / 2;
                let y = inner.y + inner.height / 2;
                buf.set_string(x, y, status, Style::default().fg(Color::DarkGray));
            }
            return;
        }

        let mut canvas = Canvas { area: inner, buf };
        for command in self.commands {
            canvas.draw(command);
        }
    }
}

struct Canvas<'b> {
    area: Rect,
    buf: &'b mut Buffer,
}

impl Canvas<'_> {
    fn cell(&mut self, col: i64, row: i64, ch: char, style: Style) {
        if col < 0 || row < 0 || col >= self.area.width as i64 || row >= self.area.height as i64 {
            return;
        }
        let pos = (self.area.x + col as u16, self.area.y + row as u16);
        self.buf[pos].set_char(ch).set_style(style);
    }

    fn is_blank(&self, col: i64, row: i64) -> bool {
        if col < 0 || row < 0 || col >= self.area.width as i64 || row >= self.area.height as i64 {
            return false;
        }
        let pos = (self.area.x + col as u16, self.area.y + row as u16);
        self.buf[pos].symbol() == " "
    }

    fn draw(&mut self, command: &DrawCommand) {
        match command {
            DrawCommand::Line { x1, y1, x2, y2, hue } => {
                let style = Style::default().fg(hue_color(*hue));
                if (x1 - x2).abs() < f64::EPSILON {
                    let col = x1.floor() as i64;
                    let (top, bottom) = span(*y1, *y2);
                    for row in top..=bottom {
                        self.cell(col, row, '│', style);
                    }
                } else {
                    let row = y1.floor() as i64;
                    let (start, end) = span(*x1, *x2);
                    for col in start..=end {
                        // Grid lines never cover what is already drawn
                        if *hue != Hue::Grid || self.is_blank(col, row) {
                            self.cell(col, row, '─', style);
                        }
                    }
                }
            }
            DrawCommand::Rect {
                x,
                y,
                width,
                height,
                hue,
            } => {
                let style = Style::default().fg(hue_color(*hue));
                let (left, right) = span(*x, x + width);
                let (top, bottom) = span(*y, y + height);
                for row in top..=bottom {
                    for col in left..=right {
                        self.cell(col, row, '█', style);
                    }
                }
            }
            DrawCommand::Text {
                x,
                y,
                text,
                hue,
                anchor,
            } => {
                let mut style = Style::default().fg(hue_color(*hue));
                if *hue == Hue::Title {
                    style = style.add_modifier(Modifier::BOLD);
                }
                let len = text.chars().count() as f64;
                let start = match anchor {
                    Anchor::Start => *x,
                    Anchor::Middle => x - len / 2.0,
                    Anchor::End => x - len,
                };
                let row = y.floor() as i64;
                for (i, ch) in text.chars().enumerate() {
                    self.cell(start.floor() as i64 + i as i64, row, ch, style);
                }
            }
        }
    }
}

/// Cells covered by the half-open interval between `a` and `b`, at least one.
fn span(a: f64, b: f64) -> (i64, i64) {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let start = lo.floor() as i64;
    let end = (hi.ceil() as i64 - 1).max(start);
    (start, end)
}

/// Simple sparkline for showing recent price movement
pub struct Sparkline<'a> {
    data: &'a [f64],
    color: Color,
}

impl<'a> Sparkline<'a> {
    pub fn new(data: &'a [f64]) -> Self {
        Self {
            data,
            color: Color::Cyan,
        }
    }

    pub fn color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }
}

impl Widget for Sparkline<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if self.data.is_empty() || area.width == 0 || area.height == 0 {
            return;
        }

        let min = self.data.iter().copied().fold(f64::MAX, f64::min);
        let max = self.data.iter().copied().fold(f64::MIN, f64::max);
        let range = if max == min { 1.0 } else { max - min };

        let bar_chars = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

        let width = area.width as usize;
        let data_len = self.data.len();

        for x in 0..width {
            let data_idx = (x * data_len) / width;
            if data_idx < data_len {
                let value = self.data[data_idx];
                let normalized = ((value - min) / range).clamp(0.0, 1.0);
                let char_idx = (normalized * 7.0) as usize;
                let ch = bar_chars[char_idx.min(7)];

                buf[(area.x + x as u16, area.y)]
                    .set_char(ch)
                    .set_fg(self.color);
            }
        }
    }
}
