use std::time::{Duration, Instant};

use super::window::EnergyWindow;
use crate::config::ControlConfig;

/// Window maxima at or below this leave no usable normalization range.
pub const DEGENERATE_RANGE: f64 = 1e-12;

/// Brightness and hue to push to the lamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LampTarget {
    pub brightness: u8,
    pub hue: u16,
}

/// Outcome of one control iteration, including the intermediate values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub target: LampTarget,
    pub smoothed: f64,
    pub max: f64,
    /// Brightness before the hue boost.
    pub base_brightness: i64,
    /// `false` when the normalization range was degenerate and the previous
    /// base brightness was held.
    pub signal: bool,
    pub since_peak: Duration,
}

// -----------------------------------------------------------------------------
// MAPPING STEPS
// -----------------------------------------------------------------------------

/// Scale the smoothed energy against `[0, max]` into `[floor, floor + span]`.
/// The lower bound is fixed at zero rather than the window minimum.
pub fn normalize_brightness(smoothed: f64, max: f64, config: &ControlConfig) -> Option<i64> {
    let min = 0.0;
    let range = max - min;
    if !range.is_finite() || range <= DEGENERATE_RANGE || !smoothed.is_finite() {
        return None;
    }
    let scaled = config.brightness_span * (smoothed - min) / range + config.brightness_floor;
    Some(scaled.round() as i64)
}

/// Hue drifts from calm towards alarm by one step per whole second since the
/// last breath peak, and jumps to alarm after the stillness timeout or when
/// there is no breathing signal at all.
pub fn stillness_hue(since_peak: Duration, max: f64, config: &ControlConfig) -> u16 {
    let no_signal = !(max >= config.no_signal_energy);
    if since_peak > config.stillness_timeout() || no_signal {
        return config.hue_alarm;
    }
    let drift = u64::from(config.hue_step) * since_peak.as_secs();
    let hue = u64::from(config.hue_calm) + drift;
    hue.min(u64::from(config.hue_alarm)) as u16
}

/// Brighten the lamp as the hue reddens, capped at full brightness.
pub fn boosted_brightness(base: i64, hue: u16, config: &ControlConfig) -> u8 {
    let boost = (i64::from(hue) - i64::from(config.hue_calm)) / config.hue_boost_divisor;
    (base + boost).clamp(0, 255) as u8
}

// -----------------------------------------------------------------------------
// BREATHING MAPPER
// -----------------------------------------------------------------------------

pub struct BreathingMapper {
    config: ControlConfig,
    last_peak: Instant,
    held_brightness: i64,
}

impl BreathingMapper {
    pub fn new(config: ControlConfig, initial_brightness: u8, now: Instant) -> Self {
        Self {
            config,
            last_peak: now,
            held_brightness: i64::from(initial_brightness),
        }
    }

    pub fn last_peak(&self) -> Instant {
        self.last_peak
    }

    pub fn evaluate(&mut self, window: &EnergyWindow, now: Instant) -> Option<Evaluation> {
        let smoothed = window.recent_mean(self.config.smoothing_samples)?;
        let max = window.max()?;

        let normalized = normalize_brightness(smoothed, max, &self.config);
        let base_brightness = match normalized {
            Some(brightness) => {
                self.held_brightness = brightness;
                if brightness > self.config.peak_brightness {
                    self.last_peak = now;
                }
                brightness
            }
            None => self.held_brightness,
        };

        let since_peak = now.saturating_duration_since(self.last_peak);
        let hue = stillness_hue(since_peak, max, &self.config);
        let brightness = boosted_brightness(base_brightness, hue, &self.config);

        Some(Evaluation {
            target: LampTarget { brightness, hue },
            smoothed,
            max,
            base_brightness,
            signal: normalized.is_some(),
            since_peak,
        })
    }
}
