//! Hand gesture keyboard control.
//!
//! Hand landmarks from an external detector are classified into [`Gesture`]s, which a
//! [`Dispatcher`] turns into key presses according to a [`Profile`].
//!
//! ```text
//! detector ─landmarks─▶ Policy::classify ─gesture─▶ Dispatcher ─press/release─▶ KeyInjector
//! ```
//!
//! # Coordinates
//!
//! Landmarks use normalized image coordinates: X points to the right, Y points *down*, both in
//! range 0.0 to 1.0. "Up" for a finger therefore means a *smaller* Y coordinate.
//!
//! # Environment Variables
//!
//! * `ZARU_GESTURE_PROFILE`: Name of the built-in profile (`runner` or `vehicle`) the
//!   `zaru-gesture` binary uses when neither `--profile` nor `--config` is given.
//! * `RUST_LOG`: Overrides the log filter, see [`env_logger`].
//!
//! [`Gesture`]: gesture::Gesture
//! [`Dispatcher`]: dispatch::Dispatcher
//! [`Profile`]: profile::Profile

use log::LevelFilter;

pub mod controller;
pub mod dispatch;
pub mod filter;
pub mod gesture;
pub mod keys;
pub mod landmark;
pub mod profile;
pub mod source;
pub mod timer;

/// macro-use only, not part of public API.
#[doc(hidden)]
pub fn init_logger(calling_crate: &'static str) {
    let log_level = if cfg!(debug_assertions) {
        LevelFilter::Trace
    } else {
        LevelFilter::Debug
    };
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .filter(Some(calling_crate), log_level)
        .filter(Some(env!("CARGO_CRATE_NAME")), log_level)
        .parse_default_env()
        .try_init()
        .ok();
}

/// Initializes logging to *stderr*.
///
/// If `cfg!(debug_assertions)` is enabled, the calling crate and this crate will log at *trace*
/// level. Otherwise, they will log at *debug* level. Everything else logs at *info* level.
///
/// If a global logger is already registered, this macro will do nothing.
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger(env!("CARGO_CRATE_NAME"))
    };
}
