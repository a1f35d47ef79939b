pub mod rolling_window;
pub mod tick_stream;

// Re-export the window types for convenient access
// (e.g. `use crate::market_data::RollingWindow`).
pub use rolling_window::{RollingWindow, BB_PERIOD, RSI_PERIOD, SMA_PERIODS, WINDOW_CAPACITY};
