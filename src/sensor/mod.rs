pub mod replay;
pub mod simulated;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub use replay::ReplayRadar;
pub use simulated::SimulatedRadar;

// -----------------------------------------------------------------------------
// SCAN VOLUME
// -----------------------------------------------------------------------------

/// One axis of the scan volume: `(min, max, resolution)`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct AxisRange {
    pub min: f64,
    pub max: f64,
    pub resolution: f64,
}

impl AxisRange {
    pub const fn new(min: f64, max: f64, resolution: f64) -> Self {
        Self {
            min,
            max,
            resolution,
        }
    }

    fn validate(&self, axis: &str) -> Result<()> {
        if !(self.min < self.max) {
            return Err(Error::Config(format!(
                "scan volume {axis}: min ({}) must be below max ({})",
                self.min, self.max
            )));
        }
        if !(self.resolution > 0.0) {
            return Err(Error::Config(format!(
                "scan volume {axis}: resolution must be positive, got {}",
                self.resolution
            )));
        }
        Ok(())
    }
}

/// Region the radar analyses: radial distance in cm, horizontal (phi) and
/// vertical (theta) angles in degrees.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct ScanVolume {
    pub radial: AxisRange,
    pub phi: AxisRange,
    pub theta: AxisRange,
}

impl Default for ScanVolume {
    fn default() -> Self {
        Self {
            radial: AxisRange::new(20.0, 80.0, 1.0),
            phi: AxisRange::new(-4.0, 4.0, 1.0),
            theta: AxisRange::new(-4.0, 4.0, 1.0),
        }
    }
}

impl ScanVolume {
    pub fn validate(&self) -> Result<()> {
        self.radial.validate("radial")?;
        self.phi.validate("phi")?;
        self.theta.validate("theta")
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    #[default]
    SensorNarrow,
    Sensor,
    ShortRange,
}

/// Dynamic image filter applied by the device to suppress static reflections.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    None,
    #[default]
    Derivative,
    MovingTargetIdentification,
}

// -----------------------------------------------------------------------------
// SENSOR DEVICE
// -----------------------------------------------------------------------------

/// Narrow view of a radar SDK. The acquisition service is the only owner of a
/// device handle, so implementations only need to be `Send`.
pub trait RadarSensor: Send {
    fn init(&mut self) -> Result<()>;

    /// Fails with [`Error::DeviceConnection`] when no device is available.
    fn connect_any(&mut self) -> Result<()>;

    fn set_profile(&mut self, profile: Profile) -> Result<()>;
    fn set_scan_volume(&mut self, volume: &ScanVolume) -> Result<()>;
    fn set_filter(&mut self, filter: FilterKind) -> Result<()>;

    fn start(&mut self) -> Result<()>;
    fn start_calibration(&mut self) -> Result<()>;

    /// Capture one frame. May block for up to one frame interval.
    fn trigger(&mut self) -> Result<()>;

    /// Aggregate reflected energy of the last triggered frame.
    fn read_energy(&mut self) -> Result<f64>;

    fn stop(&mut self) -> Result<()>;
    fn disconnect(&mut self) -> Result<()>;
}

impl<T: RadarSensor + ?Sized> RadarSensor for Box<T> {
    fn init(&mut self) -> Result<()> {
        (**self).init()
    }
    fn connect_any(&mut self) -> Result<()> {
        (**self).connect_any()
    }
    fn set_profile(&mut self, profile: Profile) -> Result<()> {
        (**self).set_profile(profile)
    }
    fn set_scan_volume(&mut self, volume: &ScanVolume) -> Result<()> {
        (**self).set_scan_volume(volume)
    }
    fn set_filter(&mut self, filter: FilterKind) -> Result<()> {
        (**self).set_filter(filter)
    }
    fn start(&mut self) -> Result<()> {
        (**self).start()
    }
    fn start_calibration(&mut self) -> Result<()> {
        (**self).start_calibration()
    }
    fn trigger(&mut self) -> Result<()> {
        (**self).trigger()
    }
    fn read_energy(&mut self) -> Result<f64> {
        (**self).read_energy()
    }
    fn stop(&mut self) -> Result<()> {
        (**self).stop()
    }
    fn disconnect(&mut self) -> Result<()> {
        (**self).disconnect()
    }
}

/// Build the sensor described by the configuration.
pub fn from_config(config: &crate::config::SensorConfig) -> Box<dyn RadarSensor> {
    use crate::config::SensorSource;

    match &config.source {
        SensorSource::Simulated(sim) => Box::new(SimulatedRadar::new(sim.clone())),
        SensorSource::Replay(replay) => Box::new(ReplayRadar::new(replay.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_scan_volume_is_valid() {
        assert!(ScanVolume::default().validate().is_ok());
    }

    #[test]
    fn inverted_axis_is_rejected() {
        let mut volume = ScanVolume::default();
        volume.phi = AxisRange::new(4.0, -4.0, 1.0);
        assert!(matches!(volume.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn zero_resolution_is_rejected() {
        let mut volume = ScanVolume::default();
        volume.radial.resolution = 0.0;
        assert!(volume.validate().is_err());
    }
}
