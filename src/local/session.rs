use colored::Colorize;
use std::ffi::OsStr;
use std::io::{BufRead, BufReader, Write};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{error, info, warn};

use super::client::ControlLoop;
use super::server::{self, ServiceSummary};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::keys::KeySource;
use crate::lamp::LampBridge;
use crate::protocol::{Reply, Request, RequestSocket};

const READY_PREFIX: &str = "ready ";

// -----------------------------------------------------------------------------
// SESSION OUTCOME
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The service confirmed the stop and was joined.
    Completed,
    /// The service never became ready; no energy was requested.
    ReadyTimeout,
    /// The stop handshake failed and the service was terminated.
    AbnormalShutdown,
}

impl SessionOutcome {
    pub fn exit_code(&self) -> u8 {
        match self {
            SessionOutcome::Completed => 0,
            SessionOutcome::ReadyTimeout | SessionOutcome::AbnormalShutdown => 1,
        }
    }
}

// -----------------------------------------------------------------------------
// SERVICE HANDLES
// -----------------------------------------------------------------------------

/// Launcher-side view of a running acquisition service.
pub trait ServiceHandle {
    /// Wait for the one-shot readiness signal. `None` means the service did
    /// not become ready in time.
    fn wait_ready(&mut self, timeout: Duration) -> Result<Option<SocketAddr>>;

    /// Wait for a service that confirmed the stop request to exit.
    fn join(&mut self) -> Result<()>;

    /// Forcibly end the service.
    fn terminate(&mut self) -> Result<()>;
}

/// Print the readiness line a launcher waits for.
pub fn announce_ready(address: SocketAddr) {
    let mut stdout = std::io::stdout().lock();
    let _ = writeln!(stdout, "{}{}", READY_PREFIX, address);
    let _ = stdout.flush();
}

pub fn parse_ready_line(line: &str) -> Option<SocketAddr> {
    line.trim().strip_prefix(READY_PREFIX)?.parse().ok()
}

fn wait_for_address(
    ready_rx: &Receiver<SocketAddr>,
    timeout: Duration,
) -> Option<SocketAddr> {
    match ready_rx.recv_timeout(timeout) {
        Ok(address) => Some(address),
        Err(RecvTimeoutError::Timeout) => None,
        Err(RecvTimeoutError::Disconnected) => {
            warn!("acquisition service exited before signalling readiness");
            None
        }
    }
}

// CHILD PROCESS ---------------------------------------------------------------

/// Acquisition service running as a child process (`breath-lamp serve`).
/// The configuration is written to its stdin; readiness arrives on its stdout.
pub struct ChildService {
    child: Child,
    ready_rx: Receiver<SocketAddr>,
    forwarder: Option<JoinHandle<()>>,
}

impl ChildService {
    /// Re-launch the current executable in service mode.
    pub fn spawn(config: &Config) -> Result<Self> {
        let exe = std::env::current_exe()?;
        Self::spawn_program(exe, config)
    }

    pub fn spawn_program<P: AsRef<OsStr>>(program: P, config: &Config) -> Result<Self> {
        let mut child = Command::new(program)
            .args(["serve", "--config", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;

        let yaml = serde_yaml::to_string(config)?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(yaml.as_bytes())?;
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Protocol("child stdout not captured".to_string()))?;

        let (ready_tx, ready_rx) = mpsc::channel();
        let forwarder = thread::spawn(move || {
            for line in BufReader::new(stdout).lines().map_while(|line| line.ok()) {
                match parse_ready_line(&line) {
                    Some(address) => {
                        let _ = ready_tx.send(address);
                    }
                    None => println!("{}", line),
                }
            }
        });

        info!(pid = child.id(), "acquisition service launched");
        Ok(Self {
            child,
            ready_rx,
            forwarder: Some(forwarder),
        })
    }

    fn reap(&mut self) -> Result<()> {
        let status = self.child.wait()?;
        if let Some(forwarder) = self.forwarder.take() {
            let _ = forwarder.join();
        }
        info!(%status, "acquisition service exited");
        Ok(())
    }
}

impl ServiceHandle for ChildService {
    fn wait_ready(&mut self, timeout: Duration) -> Result<Option<SocketAddr>> {
        Ok(wait_for_address(&self.ready_rx, timeout))
    }

    fn join(&mut self) -> Result<()> {
        self.reap()
    }

    fn terminate(&mut self) -> Result<()> {
        if let Err(e) = self.child.kill() {
            // Already exited
            if e.kind() != std::io::ErrorKind::InvalidInput {
                return Err(e.into());
            }
        }
        self.reap()
    }
}

// IN-PROCESS THREAD -----------------------------------------------------------

/// Acquisition service running on a thread of this process.
pub struct ThreadService {
    handle: Option<JoinHandle<Result<ServiceSummary>>>,
    ready_rx: Receiver<SocketAddr>,
}

impl ThreadService {
    pub fn spawn(config: &Config) -> Self {
        let config = config.clone();
        let (ready_tx, ready_rx) = mpsc::channel();
        let handle = thread::spawn(move || {
            server::run(&config, move |address| {
                let _ = ready_tx.send(address);
            })
        });
        Self {
            handle: Some(handle),
            ready_rx,
        }
    }
}

impl ServiceHandle for ThreadService {
    fn wait_ready(&mut self, timeout: Duration) -> Result<Option<SocketAddr>> {
        Ok(wait_for_address(&self.ready_rx, timeout))
    }

    fn join(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        handle
            .join()
            .map_err(|_| Error::Protocol("acquisition thread panicked".to_string()))?
            .map(|_| ())
    }

    fn terminate(&mut self) -> Result<()> {
        // Threads cannot be killed; the service is left to die with the process.
        if self.handle.take().is_some() {
            warn!("detaching unresponsive acquisition thread");
        }
        Ok(())
    }
}

// REMOTE ----------------------------------------------------------------------

/// Acquisition service started elsewhere, e.g. on the machine the radar is
/// plugged into. Readiness is a successful connect.
pub struct RemoteService {
    address: SocketAddr,
}

impl RemoteService {
    pub fn new(address: SocketAddr) -> Self {
        Self { address }
    }
}

impl ServiceHandle for RemoteService {
    fn wait_ready(&mut self, _timeout: Duration) -> Result<Option<SocketAddr>> {
        Ok(Some(self.address))
    }

    fn join(&mut self) -> Result<()> {
        Ok(())
    }

    fn terminate(&mut self) -> Result<()> {
        warn!(address = %self.address, "cannot terminate a remote acquisition service");
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// SESSION
// -----------------------------------------------------------------------------

/// A service bound to the wildcard address is reached over loopback.
fn connectable(address: SocketAddr) -> SocketAddr {
    match address.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), address.port())
        }
        IpAddr::V6(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), address.port())
        }
        _ => address,
    }
}

fn terminate_quietly<S: ServiceHandle>(service: &mut S) {
    if let Err(e) = service.terminate() {
        error!(error = %e, "failed to terminate acquisition service");
    }
}

/// Drive one monitoring session: wait for the service, run the control loop,
/// then stop the service.
pub fn run_session<S, L, K>(
    config: &Config,
    service: &mut S,
    lamp: L,
    keys: K,
) -> Result<SessionOutcome>
where
    S: ServiceHandle,
    L: LampBridge,
    K: KeySource,
{
    let ready_timeout = config.service.ready_timeout();

    let Some(address) = service.wait_ready(ready_timeout)? else {
        error!("Timed-out on acquisition service setup");
        terminate_quietly(service);
        return Ok(SessionOutcome::ReadyTimeout);
    };

    let socket = match RequestSocket::connect_within(connectable(address), ready_timeout) {
        Ok(socket) => socket,
        Err(Error::Timeout(what)) => {
            error!(%address, "Timed-out waiting for {}", what);
            terminate_quietly(service);
            return Ok(SessionOutcome::ReadyTimeout);
        }
        Err(e) => {
            terminate_quietly(service);
            return Err(e);
        }
    };

    println!("{}", "Starting breathing monitor".green());
    let mut control = ControlLoop::new(config, socket, lamp, keys);
    let result = control.bootstrap().and_then(|()| control.run());
    let iterations = control.iterations();
    let mut socket = control.into_source();

    let outcome = stop_service(service, &mut socket, config.service.stop_timeout())?;
    match result {
        Ok(_) => {
            info!(iterations, ?outcome, "session finished");
            Ok(outcome)
        }
        Err(e) => {
            error!(error = %e, iterations, "control loop failed");
            Err(e)
        }
    }
}

/// Ask the service to stop and wait a bounded time for the confirmation.
fn stop_service<S: ServiceHandle>(
    service: &mut S,
    socket: &mut RequestSocket,
    timeout: Duration,
) -> Result<SessionOutcome> {
    match socket.request(&Request::Stop, Some(timeout)) {
        Ok(Reply::Stopped) => {
            service.join()?;
            println!("\n{}", "Done!".green());
            Ok(SessionOutcome::Completed)
        }
        Ok(reply) => {
            warn!(?reply, "unexpected reply to stop request");
            terminate_quietly(service);
            Ok(SessionOutcome::AbnormalShutdown)
        }
        Err(e) => {
            warn!(error = %e, "no stop confirmation from acquisition service");
            terminate_quietly(service);
            Ok(SessionOutcome::AbnormalShutdown)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_line_round_trip() {
        assert_eq!(
            parse_ready_line("ready 127.0.0.1:5556\n"),
            Some("127.0.0.1:5556".parse().unwrap())
        );
        assert_eq!(parse_ready_line("Connected to radar"), None);
        assert_eq!(parse_ready_line("ready soon"), None);
    }

    #[test]
    fn wildcard_address_maps_to_loopback() {
        let wildcard: SocketAddr = "0.0.0.0:5556".parse().unwrap();
        assert_eq!(connectable(wildcard), "127.0.0.1:5556".parse().unwrap());

        let v6: SocketAddr = "[::]:5556".parse().unwrap();
        assert_eq!(connectable(v6), "[::1]:5556".parse().unwrap());

        let remote: SocketAddr = "192.168.1.20:5556".parse().unwrap();
        assert_eq!(connectable(remote), remote);
    }

    #[test]
    fn exit_codes() {
        assert_eq!(SessionOutcome::Completed.exit_code(), 0);
        assert_eq!(SessionOutcome::ReadyTimeout.exit_code(), 1);
        assert_eq!(SessionOutcome::AbnormalShutdown.exit_code(), 1);
    }
}
