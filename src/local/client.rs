use colored::Colorize;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::{Config, ControlConfig, LampConfig};
use crate::error::{Error, Result};
use crate::keys::{Key, KeySource};
use crate::lamp::{LampBridge, LampState, LightAttribute};
use crate::processing::{BreathingMapper, EnergyWindow, Evaluation, LampTarget};
use crate::protocol::{Reply, Request, RequestSocket};

// -----------------------------------------------------------------------------
// ENERGY SOURCE
// -----------------------------------------------------------------------------

/// Where the control loop gets its energy samples from.
pub trait EnergySource {
    /// Blocks until one sample is available.
    fn request_energy(&mut self) -> Result<f64>;
}

impl EnergySource for RequestSocket {
    fn request_energy(&mut self) -> Result<f64> {
        match self.request(&Request::Energy, None)? {
            Reply::Energy(energy) => Ok(energy),
            Reply::Stopped => Err(Error::Protocol(
                "acquisition service stopped unexpectedly".to_string(),
            )),
        }
    }
}

// -----------------------------------------------------------------------------
// CONTROL LOOP
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    pub energy: f64,
    pub evaluation: Evaluation,
    pub lamp_written: bool,
}

/// Turns the energy stream into lamp commands and handles operator keys.
pub struct ControlLoop<E, L, K> {
    control: ControlConfig,
    lamp_config: LampConfig,
    source: E,
    lamp: L,
    keys: K,
    window: EnergyWindow,
    mapper: BreathingMapper,
    lamp_state: LampState,
    state: LoopState,
    iterations: u64,
}

impl<E, L, K> ControlLoop<E, L, K>
where
    E: EnergySource,
    L: LampBridge,
    K: KeySource,
{
    pub fn new(config: &Config, source: E, lamp: L, keys: K) -> Self {
        let control = config.control.clone();
        let lamp_config = config.lamp.clone();
        Self {
            window: EnergyWindow::new(control.window.default),
            mapper: BreathingMapper::new(
                control.clone(),
                lamp_config.initial_brightness,
                Instant::now(),
            ),
            lamp_state: LampState {
                brightness: lamp_config.initial_brightness,
                hue: lamp_config.initial_hue,
            },
            control,
            lamp_config,
            source,
            lamp,
            keys,
            state: LoopState::Running,
            iterations: 0,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn window(&self) -> &EnergyWindow {
        &self.window
    }

    pub fn lamp_state(&self) -> LampState {
        self.lamp_state
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    pub fn lamp(&self) -> &L {
        &self.lamp
    }

    /// Give back the energy source, e.g. to send the stop request on it.
    pub fn into_source(self) -> E {
        self.source
    }

    // BOOTSTRAP ---------------------------------------------------------------

    /// Connect the lamp, set the baseline look and pre-fill the window.
    pub fn bootstrap(&mut self) -> Result<()> {
        self.connect_bridge()?;

        let name = self.lamp_config.name.clone();
        self.lamp.set_light(&name, LightAttribute::On(true))?;
        self.lamp.set_light(
            &name,
            LightAttribute::Brightness(self.lamp_config.initial_brightness),
        )?;
        self.lamp
            .set_light(&name, LightAttribute::Hue(self.lamp_config.initial_hue))?;
        self.lamp.set_light(
            &name,
            LightAttribute::Saturation(self.lamp_config.initial_saturation),
        )?;

        println!("{}", "Breath...".cyan());

        for _ in 0..self.control.prefill_samples {
            let energy = self.source.request_energy()?;
            self.window.push(energy);
        }

        self.mapper = BreathingMapper::new(
            self.control.clone(),
            self.lamp_config.initial_brightness,
            Instant::now(),
        );
        info!(samples = self.window.len(), "energy window pre-filled");
        Ok(())
    }

    fn connect_bridge(&mut self) -> Result<()> {
        let attempts = self.lamp_config.pairing_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.lamp.connect() {
                Ok(()) => {
                    info!(bridge = %self.lamp_config.bridge_address, "Connected to lamp bridge");
                    return Ok(());
                }
                Err(Error::PairingRequired) if attempt < attempts => {
                    println!(
                        "{}",
                        "Press the link button on the lamp bridge, then press any key".yellow()
                    );
                    if self.keys.wait()? == Key::Interrupt {
                        return Err(Error::PairingRequired);
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    // ITERATION ---------------------------------------------------------------

    pub fn run(&mut self) -> Result<u64> {
        while self.state == LoopState::Running {
            self.tick(Instant::now())?;

            if let Some(limit) = self.control.max_iterations {
                if self.iterations >= limit {
                    info!(iterations = self.iterations, "iteration limit reached");
                    self.state = LoopState::Stopped;
                }
            }
        }
        Ok(self.iterations)
    }

    pub fn tick(&mut self, now: Instant) -> Result<TickReport> {
        let energy = self.source.request_energy()?;
        self.window.push(energy);

        let evaluation = self
            .mapper
            .evaluate(&self.window, now)
            .ok_or_else(|| Error::Protocol("energy window is empty".to_string()))?;

        debug!(
            bri = evaluation.target.brightness,
            hue = evaluation.target.hue,
            value = evaluation.smoothed,
            max = evaluation.max,
            signal = evaluation.signal,
            "tick"
        );

        let lamp_written = self
            .lamp_state
            .needs_update(&evaluation.target, self.control.brightness_deadband);
        if lamp_written {
            self.push_target(&evaluation.target)?;
        }

        if let Some(key) = self.keys.poll()? {
            self.handle_key(key);
        }

        self.iterations += 1;
        Ok(TickReport {
            energy,
            evaluation,
            lamp_written,
        })
    }

    /// Brightness first, then hue, pausing after each write.
    fn push_target(&mut self, target: &LampTarget) -> Result<()> {
        let name = self.lamp_config.name.clone();
        let delay = self.lamp_config.write_delay();

        self.lamp
            .set_light(&name, LightAttribute::Brightness(target.brightness))?;
        pause(delay);
        self.lamp.set_light(&name, LightAttribute::Hue(target.hue))?;
        pause(delay);

        self.lamp_state.record(target);
        Ok(())
    }

    // KEYS --------------------------------------------------------------------

    pub fn handle_key(&mut self, key: Key) {
        let window = &self.control.window;
        let capacity = self.window.capacity();

        let resized = match key {
            Key::Char('q') | Key::Interrupt => {
                info!(?key, "quit requested");
                self.state = LoopState::Stopped;
                return;
            }
            Key::Char(' ') => window.default,
            Key::Up => (capacity + window.step).min(window.max),
            Key::Down => capacity.saturating_sub(window.step).max(window.min),
            Key::Char(_) => return,
        };

        self.window.set_capacity(resized);
        println!("\n{} {}", "Samples =".bold(), resized);
    }
}

fn pause(delay: Duration) {
    if !delay.is_zero() {
        std::thread::sleep(delay);
    }
}
