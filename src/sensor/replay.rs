use std::fs::File;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use super::{FilterKind, Profile, RadarSensor, ScanVolume};
use crate::config::ReplaySensorConfig;
use crate::error::{Error, Result};

// -----------------------------------------------------------------------------
// SETUP FOR IMPORTING ENERGY TRACES FROM CSV
// -----------------------------------------------------------------------------

/// Read the first column of a CSV file as energy readings. A non-numeric first
/// row is treated as a header.
pub fn read_energy_trace<P: AsRef<Path>>(path: P) -> Result<Vec<f64>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(File::open(path)?);

    let mut trace = Vec::new();
    for (row, result) in rdr.records().enumerate() {
        let record = result?;
        let Some(field) = record.get(0) else {
            continue;
        };
        match field.trim().parse::<f64>() {
            Ok(value) => trace.push(value),
            Err(_) if row == 0 => continue,
            Err(e) => {
                return Err(Error::Sensor(format!(
                    "row {}: invalid energy value {:?}: {}",
                    row + 1,
                    field,
                    e
                )))
            }
        }
    }

    Ok(trace)
}

// -----------------------------------------------------------------------------
// REPLAY RADAR
// -----------------------------------------------------------------------------

/// Plays back a recorded energy trace, looping at the end.
pub struct ReplayRadar {
    config: ReplaySensorConfig,
    trace: Vec<f64>,
    position: usize,
    scanning: bool,
    frame: Option<f64>,
}

impl ReplayRadar {
    pub fn new(config: ReplaySensorConfig) -> Self {
        Self {
            config,
            trace: Vec::new(),
            position: 0,
            scanning: false,
            frame: None,
        }
    }
}

impl RadarSensor for ReplayRadar {
    fn init(&mut self) -> Result<()> {
        Ok(())
    }

    fn connect_any(&mut self) -> Result<()> {
        let path = &self.config.path;
        if !path.exists() {
            return Err(Error::DeviceConnection(format!(
                "recording not found at {}",
                path.display()
            )));
        }

        self.trace = read_energy_trace(path)?;
        if self.trace.is_empty() {
            return Err(Error::DeviceConnection(format!(
                "recording {} holds no energy values",
                path.display()
            )));
        }

        info!(
            path = %path.display(),
            frames = self.trace.len(),
            "replaying recorded energy trace"
        );
        Ok(())
    }

    fn set_profile(&mut self, _profile: Profile) -> Result<()> {
        Ok(())
    }

    fn set_scan_volume(&mut self, _volume: &ScanVolume) -> Result<()> {
        Ok(())
    }

    fn set_filter(&mut self, _filter: FilterKind) -> Result<()> {
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        if self.trace.is_empty() {
            return Err(Error::Sensor("start before connect".to_string()));
        }
        self.scanning = true;
        Ok(())
    }

    fn start_calibration(&mut self) -> Result<()> {
        Ok(())
    }

    fn trigger(&mut self) -> Result<()> {
        if !self.scanning {
            return Err(Error::Sensor("trigger before start".to_string()));
        }
        if self.config.frame_interval_ms > 0 {
            std::thread::sleep(Duration::from_millis(self.config.frame_interval_ms));
        }

        self.frame = Some(self.trace[self.position]);
        self.position = (self.position + 1) % self.trace.len();
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
        self.trace.clear();
        self.position = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    fn write_trace(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "breath-lamp-{}-{}.csv",
            name,
            std::process::id()
        ));
        let mut file = File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn header_row_is_skipped() {
        let path = write_trace("header", "energy\n0.0001\n0.0004\n");
        assert_eq!(read_energy_trace(&path).unwrap(), vec![0.0001, 0.0004]);
    }

    #[test]
    fn replay_loops_over_trace() {
        let path = write_trace("loop", "1.0\n2.0\n");
        let mut radar = ReplayRadar::new(ReplaySensorConfig {
            path,
            frame_interval_ms: 0,
        });
        radar.connect_any().unwrap();
        radar.start().unwrap();

        let mut seen = Vec::new();
        for _ in 0..3 {
            radar.trigger().unwrap();
            seen.push(radar.read_energy().unwrap());
        }
        assert_eq!(seen, vec![1.0, 2.0, 1.0]);
    }

    #[test]
    fn missing_recording_is_a_connection_error() {
        let mut radar = ReplayRadar::new(ReplaySensorConfig {
            path: PathBuf::from("/nonexistent/breath-lamp/trace.csv"),
            frame_interval_ms: 0,
        });
        assert!(matches!(radar.connect_any(), Err(Error::DeviceConnection(_))));
    }
}
