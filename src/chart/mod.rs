pub mod layout;
pub mod render;

pub use hit_test::{candle_at, hit_test};
pub use layout::{ChartLayout, Columns, Margins, PriceScale};
pub use render::{render, Anchor, DrawCommand, Hue, GRID_DIVISIONS, MAX_TIME_LABELS};
