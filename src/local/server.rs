use std::net::SocketAddr;
use tracing::{debug, error, info, warn};

use crate::config::{Config, SensorConfig};
use crate::error::Result;
use crate::protocol::{Reply, ReplySocket, Request};
use crate::sensor::{self, RadarSensor};

// -----------------------------------------------------------------------------
// ACQUISITION SERVICE
// -----------------------------------------------------------------------------

/// Counters reported when the service stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceSummary {
    pub captures: u64,
    pub replies: u64,
    pub ignored: u64,
}

/// Owns the radar device and serves energy readings over a reply socket.
/// Between requests it keeps capturing, so a reply never waits on a capture.
pub struct AcquisitionService<S: RadarSensor> {
    sensor: S,
    config: SensorConfig,
    address: String,
    latest: Option<f64>,
    summary: ServiceSummary,
}

impl<S: RadarSensor> AcquisitionService<S> {
    pub fn new(sensor: S, config: SensorConfig, address: impl Into<String>) -> Self {
        Self {
            sensor,
            config,
            address: address.into(),
            latest: None,
            summary: ServiceSummary::default(),
        }
    }

    /// Run the startup sequence, signal readiness with the bound address and
    /// serve until a stop request arrives.
    ///
    /// A device connection failure returns early: the socket is never bound
    /// and `on_ready` is never called.
    pub fn run<F>(mut self, on_ready: F) -> Result<ServiceSummary>
    where
        F: FnOnce(SocketAddr),
    {
        if let Err(e) = self.setup_device() {
            error!(error = %e, "Failed to connect to radar");
            return Err(e);
        }

        let mut socket = ReplySocket::bind(self.address.as_str())?;
        let local_addr = socket.local_addr()?;
        info!(address = %local_addr, "Acquisition service started");

        on_ready(local_addr);

        let served = self.serve(&mut socket);
        self.shutdown_device();
        served?;

        info!(
            captures = self.summary.captures,
            replies = self.summary.replies,
            ignored = self.summary.ignored,
            "Acquisition service stopped"
        );
        Ok(self.summary)
    }

    fn setup_device(&mut self) -> Result<()> {
        self.sensor.init()?;
        self.sensor.connect_any()?;
        info!("Connected to radar");

        self.sensor.set_profile(self.config.profile)?;
        self.sensor.set_scan_volume(&self.config.scan_volume)?;
        debug!(volume = ?self.config.scan_volume, "scan volume set");

        self.sensor.set_filter(self.config.filter)?;

        self.sensor.start()?;
        self.sensor.start_calibration()?;
        Ok(())
    }

    fn serve(&mut self, socket: &mut ReplySocket) -> Result<()> {
        loop {
            match socket.poll()? {
                None => {
                    self.capture()?;
                }
                Some(Request::Energy) => {
                    let energy = match self.latest {
                        Some(energy) => energy,
                        None => self.capture()?,
                    };
                    self.reply(socket, &Reply::Energy(energy));
                }
                Some(Request::Stop) => break,
                Some(Request::Other(text)) => {
                    debug!(request = %text, "ignoring unknown request");
                    self.summary.ignored += 1;
                }
            }
        }

        self.reply(socket, &Reply::Stopped);
        Ok(())
    }

    /// Trigger one frame and store its energy as the latest reading.
    fn capture(&mut self) -> Result<f64> {
        self.sensor.trigger()?;
        let raw = self.sensor.read_energy()?;
        let energy = sanitize_energy(raw);
        self.latest = Some(energy);
        self.summary.captures += 1;
        Ok(energy)
    }

    fn reply(&mut self, socket: &mut ReplySocket, reply: &Reply) {
        match socket.send(reply) {
            Ok(()) => self.summary.replies += 1,
            Err(e) => warn!(error = %e, ?reply, "failed to send reply"),
        }
    }

    fn shutdown_device(&mut self) {
        if let Err(e) = self.sensor.stop() {
            warn!(error = %e, "failed to stop radar");
        }
        if let Err(e) = self.sensor.disconnect() {
            warn!(error = %e, "failed to disconnect radar");
        }
    }
}

/// Energy readings are non-negative; anything else is reported as zero.
fn sanitize_energy(raw: f64) -> f64 {
    if raw.is_finite() && raw >= 0.0 {
        raw
    } else {
        warn!(raw, "radar returned an invalid energy reading");
        0.0
    }
}

/// Build the configured sensor and run the service on it.
pub fn run<F>(config: &Config, on_ready: F) -> Result<ServiceSummary>
where
    F: FnOnce(SocketAddr),
{
    let sensor = sensor::from_config(&config.sensor);
    AcquisitionService::new(sensor, config.sensor.clone(), config.service.address.clone())
        .run(on_ready)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::protocol::{read_frame, write_frame, RequestSocket};
    use std::net::TcpStream;
    use crate::sensor::{FilterKind, Profile, ScanVolume};
    use std::sync::mpsc;
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::Duration;

    /// Sensor returning a fixed sequence of readings and recording calls.
    struct FakeSensor {
        present: bool,
        readings: Vec<f64>,
        next: usize,
        calls: Arc<Mutex<Vec<&'static str>>>,
    }

    impl FakeSensor {
        fn new(present: bool, readings: Vec<f64>) -> (Self, Arc<Mutex<Vec<&'static str>>>) {
            let calls = Arc::new(Mutex::new(Vec::new()));
            let sensor = Self {
                present,
                readings,
                next: 0,
                calls: Arc::clone(&calls),
            };
            (sensor, calls)
        }

        fn log(&self, call: &'static str) {
            self.calls.lock().unwrap().push(call);
        }
    }

    impl RadarSensor for FakeSensor {
        fn init(&mut self) -> Result<()> {
            self.log("init");
            Ok(())
        }
        fn connect_any(&mut self) -> Result<()> {
            self.log("connect_any");
            if self.present {
                Ok(())
            } else {
                Err(Error::DeviceConnection("none".into()))
            }
        }
        fn set_profile(&mut self, _profile: Profile) -> Result<()> {
            self.log("set_profile");
            Ok(())
        }
        fn set_scan_volume(&mut self, _volume: &ScanVolume) -> Result<()> {
            self.log("set_scan_volume");
            Ok(())
        }
        fn set_filter(&mut self, _filter: FilterKind) -> Result<()> {
            self.log("set_filter");
            Ok(())
        }
        fn start(&mut self) -> Result<()> {
            self.log("start");
            Ok(())
        }
        fn start_calibration(&mut self) -> Result<()> {
            self.log("start_calibration");
            Ok(())
        }
        fn trigger(&mut self) -> Result<()> {
            self.log("trigger");
            thread::sleep(Duration::from_millis(1));
            self.next = (self.next + 1).min(self.readings.len());
            Ok(())
        }
        fn read_energy(&mut self) -> Result<f64> {
            Ok(self.readings[self.next - 1])
        }
        fn stop(&mut self) -> Result<()> {
            self.log("stop");
            Ok(())
        }
        fn disconnect(&mut self) -> Result<()> {
            self.log("disconnect");
            Ok(())
        }
    }

    fn spawn_service(
        sensor: FakeSensor,
    ) -> (
        thread::JoinHandle<Result<ServiceSummary>>,
        mpsc::Receiver<SocketAddr>,
    ) {
        let (ready_tx, ready_rx) = mpsc::channel();
        let service = AcquisitionService::new(sensor, SensorConfig::default(), "127.0.0.1:0");
        let handle = thread::spawn(move || {
            service.run(move |addr| {
                let _ = ready_tx.send(addr);
            })
        });
        (handle, ready_rx)
    }

    #[test]
    fn missing_device_never_signals_ready() {
        let (sensor, calls) = FakeSensor::new(false, vec![0.1]);
        let (handle, ready_rx) = spawn_service(sensor);

        let result = handle.join().unwrap();
        assert!(matches!(result, Err(Error::DeviceConnection(_))));
        assert!(ready_rx.try_recv().is_err());
        assert_eq!(*calls.lock().unwrap(), vec!["init", "connect_any"]);
    }

    #[test]
    fn serves_energy_until_stopped() {
        let (sensor, calls) = FakeSensor::new(true, vec![0.0003, -1.0]);
        let (handle, ready_rx) = spawn_service(sensor);
        let address = ready_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        let mut client = RequestSocket::connect(address).unwrap();
        let reply = client.request(&Request::Energy, None).unwrap();
        // the second reading is negative and clamps to zero
        assert!(matches!(reply, Reply::Energy(e) if e == 0.0003 || e == 0.0));

        client.send(&Request::Other("status".into())).unwrap();
        // ignored requests get no reply; open a fresh connection for stop
        drop(client);
        let mut client = RequestSocket::connect(address).unwrap();
        assert_eq!(client.request(&Request::Stop, None).unwrap(), Reply::Stopped);

        let summary = handle.join().unwrap().unwrap();
        assert!(summary.captures >= 1);
        assert_eq!(summary.ignored, 1);

        let calls = calls.lock().unwrap();
        assert_eq!(
            calls[..7],
            [
                "init",
                "connect_any",
                "set_profile",
                "set_scan_volume",
                "set_filter",
                "start",
                "start_calibration"
            ]
        );
        assert_eq!(calls[calls.len() - 2..], ["stop", "disconnect"]);
    }

    #[test]
    fn energy_reply_is_the_latest_capture() {
        let (sensor, calls) = FakeSensor::new(true, vec![0.1, 0.2, 0.3]);
        let mut service = AcquisitionService::new(sensor, SensorConfig::default(), "127.0.0.1:0");
        let mut socket = ReplySocket::bind("127.0.0.1:0").unwrap();
        let mut client = TcpStream::connect(socket.local_addr().unwrap()).unwrap();

        service.capture().unwrap();
        service.capture().unwrap();

        // both requests are queued, so serve never polls an empty socket
        write_frame(&mut client, &Request::Energy.encode()).unwrap();
        write_frame(&mut client, &Request::Stop.encode()).unwrap();
        service.serve(&mut socket).unwrap();

        let energy = Reply::decode(&read_frame(&mut client).unwrap()).unwrap();
        let stopped = Reply::decode(&read_frame(&mut client).unwrap()).unwrap();
        assert_eq!(energy, Reply::Energy(0.2));
        assert_eq!(stopped, Reply::Stopped);

        let triggers = calls.lock().unwrap().iter().filter(|c| **c == "trigger").count();
        assert_eq!(triggers, 2);
        assert_eq!(service.summary.captures, 2);
    }

    #[test]
    fn invalid_readings_become_zero() {
        assert_eq!(sanitize_energy(0.5), 0.5);
        assert_eq!(sanitize_energy(-0.1), 0.0);
        assert_eq!(sanitize_energy(f64::NAN), 0.0);
        assert_eq!(sanitize_energy(f64::INFINITY), 0.0);
    }
}
