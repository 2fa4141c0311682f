pub mod status;
pub mod tooltip;
pub mod watchlist;

pub use status::StatusWidget;
pub use tooltip::TooltipWidget;
pub use watchlist::WatchlistWidget;
