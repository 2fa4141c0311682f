//! Layout shared by the renderer and the hit-tester.
//!
//! Units are whatever the drawing surface uses: pixels for the default
//! layout, terminal cells for [`ChartLayout::terminal`].

use crate::data::Candle;
use rust_decimal::prelude::ToPrimitive;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Margins {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChartLayout {
    pub margins: Margins,
    /// Share of the price range added above and below the candles
    pub price_margin: f64,
    pub min_candle_width: f64,
    pub max_candle_width: f64,
    /// Body width as a share of the column spacing
    pub body_ratio: f64,
    pub min_body_height: f64,
    /// Distance from the plot floor to the time labels
    pub time_label_gap: f64,
    /// Distance from the plot's left edge to the price labels
    pub price_label_gap: f64,
    /// Title baseline, from the top of the surface
    pub title_y: f64,
}

impl Default for ChartLayout {
    fn default() -> Self {
        Self {
            margins: Margins {
                top: 40.0,
                right: 60.0,
                bottom: 60.0,
                left: 60.0,
            },
            price_margin: 0.05,
            min_candle_width: 2.0,
            max_candle_width: 20.0,
            body_ratio: 0.7,
            min_body_height: 1.0,
            time_label_gap: 20.0,
            price_label_gap: 5.0,
            title_y: 25.0,
        }
    }
}

impl ChartLayout {
    /// Cell-based layout for the terminal chart: one column per candle at
    /// most, price labels in a left gutter.
    pub fn terminal() -> Self {
        Self {
            margins: Margins {
                top: 1.0,
                right: 1.0,
                bottom: 2.0,
                left: 11.0,
            },
            price_margin: 0.05,
            min_candle_width: 1.0,
            max_candle_width: 1.0,
            body_ratio: 0.7,
            min_body_height: 1.0,
            time_label_gap: 1.0,
            price_label_gap: 1.0,
            title_y: 0.0,
        }
    }

    pub fn plot_width(&self, width: f64) -> f64 {
        (width - self.margins.left - self.margins.right).max(0.0)
    }

    pub fn plot_height(&self, height: f64) -> f64 {
        (height - self.margins.top - self.margins.bottom).max(0.0)
    }

    /// Horizontal placement of `count` candles on a surface `width` wide.
    /// `None` when there is nothing to place or no room to place it.
    pub fn columns(&self, width: f64, count: usize) -> Option<Columns> {
        let plot_width = self.plot_width(width);
        if count == 0 || plot_width <= 0.0 {
            return None;
        }

        let spacing = plot_width / count as f64;
        let candle_width =
            (spacing * self.body_ratio).clamp(self.min_candle_width, self.max_candle_width);

        Some(Columns {
            left: self.margins.left,
            spacing,
            candle_width,
            count,
        })
    }

    /// How many candles fit when every one gets at least a full
    /// `min_candle_width` column.
    pub fn capacity(&self, width: f64) -> usize {
        (self.plot_width(width) / self.min_candle_width.max(1.0)) as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Columns {
    pub left: f64,
    pub spacing: f64,
    pub candle_width: f64,
    pub count: usize,
}

impl Columns {
    pub fn center(&self, index: usize) -> f64 {
        self.left + index as f64 * self.spacing + self.spacing / 2.0
    }

    pub fn index_at(&self, x: f64) -> Option<usize> {
        let slot = ((x - self.left) / self.spacing).floor();
        if slot < 0.0 || !slot.is_finite() {
            return None;
        }
        let index = slot as usize;
        (index < self.count).then_some(index)
    }
}

/// Linear price to vertical position mapping over the plot area.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceScale {
    pub min: f64,
    pub max: f64,
    top: f64,
    height: f64,
}

impl PriceScale {
    /// Fits the candles' low/high extremes, padded by `price_margin` of the
    /// range. A flat series is padded by the same share of its price.
    pub fn fit(candles: &[Candle], layout: &ChartLayout, surface_height: f64) -> Option<Self> {
        let height = layout.plot_height(surface_height);
        if candles.is_empty() || height <= 0.0 {
            return None;
        }

        let mut low = f64::MAX;
        let mut high = f64::MIN;
        for candle in candles {
            low = low.min(candle.low.to_f64().unwrap_or(0.0));
            high = high.max(candle.high.to_f64().unwrap_or(0.0));
        }

        let range = high - low;
        let pad = if range > 0.0 {
            range * layout.price_margin
        } else if high != 0.0 {
            high.abs() * layout.price_margin
        } else {
            1.0
        };

        Some(Self {
            min: low - pad,
            max: high + pad,
            top: layout.margins.top,
            height,
        })
    }

    pub fn y(&self, price: f64) -> f64 {
        self.top + (self.max - price) / (self.max - self.min) * self.height
    }

    /// Price and vertical position of grid line `step` out of `divisions`,
    /// counted from the top.
    pub fn level(&self, step: usize, divisions: usize) -> (f64, f64) {
        let ratio = step as f64 / divisions as f64;
        let price = self.max - (self.max - self.min) * ratio;
        (price, self.top + self.height * ratio)
    }
}
