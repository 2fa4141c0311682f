pub mod api;
pub mod chart;
pub mod config;
pub mod data;
pub mod error;
pub mod market;
pub mod storage;
pub mod trading;
pub mod ui;

pub use config::Config;
