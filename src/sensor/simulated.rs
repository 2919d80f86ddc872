use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::{FilterKind, Profile, RadarSensor, ScanVolume};
use crate::config::SimulatedSensorConfig;
use crate::error::{Error, Result};

// -----------------------------------------------------------------------------
// SIMULATED RADAR
// -----------------------------------------------------------------------------

/// Synthetic device producing a breathing-like energy trace: a raised cosine
/// at the configured breathing rate on top of a baseline, plus uniform noise.
pub struct SimulatedRadar {
    config: SimulatedSensorConfig,
    rng: StdRng,
    connected: bool,
    scanning: bool,
    started_at: Option<Instant>,
    frame: Option<f64>,
}

impl SimulatedRadar {
    pub fn new(config: SimulatedSensorConfig) -> Self {
        Self {
            config,
            rng: StdRng::from_entropy(),
            connected: false,
            scanning: false,
            started_at: None,
            frame: None,
        }
    }

    fn require_connected(&self) -> Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(Error::Sensor("device not connected".to_string()))
        }
    }

    fn energy_at(&mut self, elapsed: Duration) -> f64 {
        let t = elapsed.as_secs_f64();
        let breath_hz = self.config.breathing_rate_bpm / 60.0;
        let breath = 0.5 * (1.0 - (2.0 * PI * breath_hz * t).cos());

        let noise = if self.config.noise > 0.0 {
            self.rng.gen_range(-self.config.noise..self.config.noise)
        } else {
            0.0
        };

        (self.config.baseline + self.config.amplitude * breath + noise).max(0.0)
    }
}

impl RadarSensor for SimulatedRadar {
    fn init(&mut self) -> Result<()> {
        info!("Initialize simulated radar API");
        Ok(())
    }

    fn connect_any(&mut self) -> Result<()> {
        if !self.config.present {
            return Err(Error::DeviceConnection(
                "no simulated device present".to_string(),
            ));
        }
        self.connected = true;
        Ok(())
    }

    fn set_profile(&mut self, profile: Profile) -> Result<()> {
        self.require_connected()?;
        debug!(?profile, "profile set");
        Ok(())
    }

    fn set_scan_volume(&mut self, volume: &ScanVolume) -> Result<()> {
        self.require_connected()?;
        volume
            .validate()
            .map_err(|e| Error::Sensor(format!("rejected scan volume: {e}")))
    }

    fn set_filter(&mut self, filter: FilterKind) -> Result<()> {
        self.require_connected()?;
        debug!(?filter, "dynamic filter set");
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        self.require_connected()?;
        self.scanning = true;
        self.started_at = Some(Instant::now());
        Ok(())
    }

    fn start_calibration(&mut self) -> Result<()> {
        self.require_connected()?;
        Ok(())
    }

    fn trigger(&mut self) -> Result<()> {
        let started_at = match (self.scanning, self.started_at) {
            (true, Some(started_at)) => started_at,
            _ => return Err(Error::Sensor("trigger before start".to_string())),
        };

        if self.config.frame_interval_ms > 0 {
            std::thread::sleep(Duration::from_millis(self.config.frame_interval_ms));
        }

        let energy = self.energy_at(started_at.elapsed());
        self.frame = Some(energy);
        Ok(())
    }

    fn read_energy(&mut self) -> Result<f64> {
        self.frame
            .ok_or_else(|| Error::Sensor("no frame captured yet".to_string()))
    }

    fn stop(&mut self) -> Result<()> {
        self.scanning = false;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        self.connected = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_config() -> SimulatedSensorConfig {
        SimulatedSensorConfig {
            frame_interval_ms: 0,
            noise: 0.0,
            ..SimulatedSensorConfig::default()
        }
    }

    #[test]
    fn absent_device_fails_to_connect() {
        let mut radar = SimulatedRadar::new(SimulatedSensorConfig {
            present: false,
            ..quiet_config()
        });
        radar.init().unwrap();
        assert!(matches!(radar.connect_any(), Err(Error::DeviceConnection(_))));
    }

    #[test]
    fn trigger_requires_start() {
        let mut radar = SimulatedRadar::new(quiet_config());
        radar.connect_any().unwrap();
        assert!(radar.trigger().is_err());
    }

    #[test]
    fn energy_follows_breathing_cycle() {
        let config = quiet_config();
        let mut radar = SimulatedRadar::new(config.clone());

        // 12 breaths per minute: exhale trough at 0 s, inhale peak at 2.5 s
        let trough = radar.energy_at(Duration::ZERO);
        let peak = radar.energy_at(Duration::from_millis(2500));

        assert!((trough - config.baseline).abs() < 1e-12);
        assert!((peak - (config.baseline + config.amplitude)).abs() < 1e-12);
    }

    #[test]
    fn triggered_frame_is_readable() {
        let mut radar = SimulatedRadar::new(quiet_config());
        radar.init().unwrap();
        radar.connect_any().unwrap();
        radar.start().unwrap();
        assert!(radar.read_energy().is_err());

        radar.trigger().unwrap();
        let energy = radar.read_energy().unwrap();
        assert!(energy >= 0.0);
    }
}
