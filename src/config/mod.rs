// src/config/mod.rs
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::sensor::{FilterKind, Profile, ScanVolume};

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub sensor: SensorConfig,
    pub lamp: LampConfig,
    pub control: ControlConfig,
    pub logging: LoggingConfig,
}

// SERVICE ---------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    /// Address the acquisition service binds and the control loop connects to.
    pub address: String,
    pub ready_timeout_ms: u64,
    /// Bounded wait for the `"stopped"` reply during shutdown.
    pub stop_timeout_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:5556".to_string(),
            ready_timeout_ms: 10_000,
            stop_timeout_ms: 5_000,
        }
    }
}

impl ServiceConfig {
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

// SENSOR ----------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct SensorConfig {
    pub profile: Profile,
    pub scan_volume: ScanVolume,
    pub filter: FilterKind,
    pub source: SensorSource,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SensorSource {
    Simulated(SimulatedSensorConfig),
    Replay(ReplaySensorConfig),
}

impl Default for SensorSource {
    fn default() -> Self {
        SensorSource::Simulated(SimulatedSensorConfig::default())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SimulatedSensorConfig {
    /// `false` makes `connect_any` fail as if no device were plugged in.
    pub present: bool,
    pub breathing_rate_bpm: f64,
    pub baseline: f64,
    pub amplitude: f64,
    pub noise: f64,
    pub frame_interval_ms: u64,
}

impl Default for SimulatedSensorConfig {
    fn default() -> Self {
        Self {
            present: true,
            breathing_rate_bpm: 12.0,
            baseline: 0.0001,
            amplitude: 0.0007,
            noise: 0.00003,
            frame_interval_ms: 30,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ReplaySensorConfig {
    pub path: PathBuf,
    pub frame_interval_ms: u64,
}

impl Default for ReplaySensorConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/energy.csv"),
            frame_interval_ms: 30,
        }
    }
}

// LAMP ------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct LampConfig {
    pub bridge_address: String,
    pub name: String,
    pub initial_brightness: u8,
    pub initial_hue: u16,
    pub initial_saturation: u8,
    /// Pause after each lamp write so the bridge is not flooded.
    pub write_delay_ms: u64,
    pub pairing_attempts: u32,
}

impl Default for LampConfig {
    fn default() -> Self {
        Self {
            bridge_address: "192.168.1.4".to_string(),
            name: "Demo 1".to_string(),
            initial_brightness: 150,
            initial_hue: 43690,
            initial_saturation: 250,
            write_delay_ms: 100,
            pairing_attempts: 3,
        }
    }
}

impl LampConfig {
    pub fn write_delay(&self) -> Duration {
        Duration::from_millis(self.write_delay_ms)
    }
}

// CONTROL ---------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct WindowConfig {
    pub default: usize,
    pub min: usize,
    pub max: usize,
    pub step: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            default: 60,
            min: 10,
            max: 250,
            step: 10,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ControlConfig {
    pub window: WindowConfig,
    /// Samples fetched before the first iteration.
    pub prefill_samples: usize,
    /// Number of most recent samples averaged into the smoothed energy.
    pub smoothing_samples: usize,

    pub brightness_floor: f64,
    pub brightness_span: f64,
    /// Base brightness above which a breath peak is recorded.
    pub peak_brightness: i64,
    pub stillness_timeout_ms: u64,
    /// Window maxima below this are read as "no breathing detected".
    pub no_signal_energy: f64,

    pub hue_calm: u16,
    pub hue_step: u16,
    pub hue_alarm: u16,
    pub hue_boost_divisor: i64,
    /// Brightness changes of at most this many units are not sent.
    pub brightness_deadband: u8,

    pub max_iterations: Option<u64>,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            prefill_samples: 5,
            smoothing_samples: 3,
            brightness_floor: 60.0,
            brightness_span: 195.0,
            peak_brightness: 90,
            stillness_timeout_ms: 13_000,
            no_signal_energy: 0.0002,
            hue_calm: 43690,
            hue_step: 1600,
            hue_alarm: 65000,
            hue_boost_divisor: 42,
            brightness_deadband: 2,
            max_iterations: None,
        }
    }
}

impl ControlConfig {
    pub fn stillness_timeout(&self) -> Duration {
        Duration::from_millis(self.stillness_timeout_ms)
    }
}

// LOGGING ---------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, overridden by `RUST_LOG`.
    pub level: String,
    /// When set, each process also writes a plain log file here.
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: None,
        }
    }
}

// -----------------------------------------------------------------------------
// VALIDATION
// -----------------------------------------------------------------------------

impl Config {
    pub fn validate(&self) -> Result<()> {
        self.sensor.scan_volume.validate()?;

        let window = &self.control.window;
        if window.min == 0 || window.min > window.default || window.default > window.max {
            return Err(Error::Config(format!(
                "window sizes must satisfy 1 <= min ({}) <= default ({}) <= max ({})",
                window.min, window.default, window.max
            )));
        }
        if window.step == 0 {
            return Err(Error::Config("window step must be positive".to_string()));
        }

        let control = &self.control;
        if control.prefill_samples == 0 || control.smoothing_samples == 0 {
            return Err(Error::Config(
                "prefill and smoothing sample counts must be positive".to_string(),
            ));
        }
        if control.hue_boost_divisor <= 0 {
            return Err(Error::Config(
                "hue boost divisor must be positive".to_string(),
            ));
        }
        if control.hue_calm > control.hue_alarm {
            return Err(Error::Config(format!(
                "calm hue ({}) must not exceed alarm hue ({})",
                control.hue_calm, control.hue_alarm
            )));
        }

        Ok(())
    }
}

// -----------------------------------------------------------------------------
// LOAD / SAVE
// -----------------------------------------------------------------------------

pub fn parse_config(yaml: &str) -> Result<Config> {
    let config: Config = serde_yaml::from_str(yaml)?;
    config.validate()?;
    Ok(config)
}

/// Load a configuration file. A path of `-` reads YAML from stdin.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let config_str = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {}", path.display(), e))
        })?
    };

    parse_config(&config_str)
}

pub fn save_config<P: AsRef<Path>>(config: &Config, path: P) -> Result<()> {
    let yaml = serde_yaml::to_string(config)?;
    fs::write(path, yaml)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = parse_config("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.control.window.default, 60);
        assert_eq!(config.service.ready_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let yaml = r#"
lamp:
  name: Bedroom
control:
  window:
    default: 40
sensor:
  source:
    kind: replay
    path: /tmp/trace.csv
"#;
        let config = parse_config(yaml).unwrap();
        assert_eq!(config.lamp.name, "Bedroom");
        assert_eq!(config.lamp.initial_saturation, 250);
        assert_eq!(config.control.window.default, 40);
        assert_eq!(config.control.window.max, 250);
        match config.sensor.source {
            SensorSource::Replay(replay) => {
                assert_eq!(replay.path, PathBuf::from("/tmp/trace.csv"));
                assert_eq!(replay.frame_interval_ms, 30);
            }
            other => panic!("unexpected source {:?}", other),
        }
    }

    #[test]
    fn invalid_scan_volume_is_rejected() {
        let yaml = r#"
sensor:
  scan_volume:
    radial: { min: 80, max: 20, resolution: 1 }
    phi: { min: -4, max: 4, resolution: 1 }
    theta: { min: -4, max: 4, resolution: 1 }
"#;
        assert!(matches!(parse_config(yaml), Err(Error::Config(_))));
    }

    #[test]
    fn window_default_outside_bounds_is_rejected() {
        let mut config = Config::default();
        config.control.window.default = 300;
        assert!(config.validate().is_err());
    }

    #[test]
    fn saved_config_loads_back() {
        let path = std::env::temp_dir().join(format!(
            "breath-lamp-config-{}.yaml",
            std::process::id()
        ));
        let mut config = Config::default();
        config.service.address = "0.0.0.0:6000".to_string();
        config.control.max_iterations = Some(12);

        save_config(&config, &path).unwrap();
        assert_eq!(load_config(&path).unwrap(), config);
        let _ = fs::remove_file(path);
    }
}
