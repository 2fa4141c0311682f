//! Candlestick chart as a list of drawing commands.
//!
//! Rendering is a pure function of the candles and the surface size, so
//! any backend able to draw lines, rectangles and text can display it.

use crate::chart::layout::{ChartLayout, Columns, PriceScale};
use crate::data::Candle;
use chrono::Duration;
use rust_decimal::prelude::ToPrimitive;

/// Price bands between horizontal grid lines
pub const GRID_DIVISIONS: usize = 5;
pub const MAX_TIME_LABELS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hue {
    Up,
    Down,
    Grid,
    Axis,
    Label,
    Title,
}

impl Hue {
    pub fn rgb(&self) -> (u8, u8, u8) {
        match self {
            Hue::Up => (0x10, 0xb9, 0x81),
            Hue::Down => (0xef, 0x44, 0x44),
            Hue::Grid => (0xe5, 0xe7, 0xeb),
            Hue::Axis => (0x1f, 0x29, 0x37),
            Hue::Label => (0x6b, 0x72, 0x80),
            Hue::Title => (0x11, 0x18, 0x27),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    Start,
    Middle,
    End,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Line {
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
        hue: Hue,
    },
    Rect {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        hue: Hue,
    },
    Text {
        x: f64,
        y: f64,
        text: String,
        hue: Hue,
        anchor: Anchor,
    },
}

/// Draws `candles` (oldest first) on a `width` x `height` surface.
/// Returns nothing for an empty series or a surface too small for the
/// plot area.
pub fn render(
    candles: &[Candle],
    width: f64,
    height: f64,
    label: &str,
    layout: &ChartLayout,
) -> Vec<DrawCommand> {
    let Some(columns) = layout.columns(width, candles.len()) else {
        return Vec::new();
    };
    let Some(scale) = PriceScale::fit(candles, layout, height) else {
        return Vec::new();
    };

    let left = layout.margins.left;
    let right = width - layout.margins.right;
    let top = layout.margins.top;
    let floor = top + layout.plot_height(height);

    let mut commands = Vec::with_capacity(candles.len() * 2 + 2 * (GRID_DIVISIONS + 1) + 16);

    for step in 0..=GRID_DIVISIONS {
        let (price, y) = scale.level(step, GRID_DIVISIONS);
        commands.push(DrawCommand::Line {
            x1: left,
            y1: y,
            x2: right,
            y2: y,
            hue: Hue::Grid,
        });
        commands.push(DrawCommand::Text {
            x: left - layout.price_label_gap,
            y,
            text: format_price(price),
            hue: Hue::Label,
            anchor: Anchor::End,
        });
    }

    commands.push(DrawCommand::Line {
        x1: left,
        y1: top,
        x2: left,
        y2: floor,
        hue: Hue::Axis,
    });
    commands.push(DrawCommand::Line {
        x1: left,
        y1: floor,
        x2: right,
        y2: floor,
        hue: Hue::Axis,
    });

    for (i, candle) in candles.iter().enumerate() {
        draw_candle(&mut commands, candle, columns.center(i), &columns, &scale, layout);
    }

    let format = time_format(candles);
    for i in time_label_indices(candles.len()) {
        commands.push(DrawCommand::Text {
            x: columns.center(i),
            y: floor + layout.time_label_gap,
            text: candles[i].close_time.format(format).to_string(),
            hue: Hue::Label,
            anchor: Anchor::Middle,
        });
    }

    commands.push(DrawCommand::Text {
        x: left,
        y: layout.title_y,
        text: label.to_string(),
        hue: Hue::Title,
        anchor: Anchor::Start,
    });

    commands
}

fn draw_candle(
    commands: &mut Vec<DrawCommand>,
    candle: &Candle,
    center: f64,
    columns: &Columns,
    scale: &PriceScale,
    layout: &ChartLayout,
) {
    let hue = if candle.is_up() { Hue::Up } else { Hue::Down };
    let open = candle.open.to_f64().unwrap_or(0.0);
    let close = candle.close.to_f64().unwrap_or(0.0);
    let high = candle.high.to_f64().unwrap_or(0.0);
    let low = candle.low.to_f64().unwrap_or(0.0);

    commands.push(DrawCommand::Line {
        x1: center,
        y1: scale.y(high),
        x2: center,
        y2: scale.y(low),
        hue,
    });

    let body_top = scale.y(open.max(close));
    let body_height = (scale.y(open.min(close)) - body_top).max(layout.min_body_height);
    commands.push(DrawCommand::Rect {
        x: center - columns.candle_width / 2.0,
        y: body_top,
        width: columns.candle_width,
        height: body_height,
        hue,
    });
}

/// At most [`MAX_TIME_LABELS`] evenly spaced positions, starting at the
/// first candle. The last candle gets a label too when it is not crowded
/// by the previous one.
pub fn time_label_indices(count: usize) -> Vec<usize> {
    if count == 0 {
        return Vec::new();
    }

    let step = count.div_ceil(MAX_TIME_LABELS).max(1);
    let mut indices: Vec<usize> = (0..count).step_by(step).collect();

    let last = count - 1;
    if let Some(&tail) = indices.last() {
        if tail != last && indices.len() < MAX_TIME_LABELS && last - tail >= step.div_ceil(2) {
            indices.push(last);
        }
    }
    indices
}

/// Time label pattern for the spacing between adjacent candles.
pub fn time_format(candles: &[Candle]) -> &'static str {
    let delta = match candles {
        [first, second, ..] => second.close_time - first.close_time,
        [only] => Duration::from_std(only.interval.duration()).unwrap_or(Duration::zero()),
        [] => Duration::zero(),
    };

    if delta < Duration::minutes(1) {
        "%H:%M:%S"
    } else if delta < Duration::hours(1) {
        "%H:%M"
    } else {
        "%d/%m %H:%M"
    }
}

fn format_price(price: f64) -> String {
    format!("{:.2}", price)
}
