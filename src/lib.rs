//! Radar breathing monitor driving a smart lamp.
//!
//! An acquisition service owns the radar and answers `energy` requests with
//! the latest aggregate reflected energy. A control loop polls it, smooths
//! the readings over a rolling window and maps them to lamp brightness, with
//! the hue drifting from blue to red the longer no breath peak is seen.

pub mod config;
pub mod error;
pub mod keys;
pub mod lamp;
pub mod local;
pub mod processing;
pub mod protocol;
pub mod sensor;
pub mod utils;

pub use config::Config;
pub use error::{Error, Result};
