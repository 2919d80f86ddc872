use colored::Colorize;
use std::io::{self, Write};
use tracing::info;

use super::{LampBridge, LightAttribute};
use crate::error::Result;

/// Lamp stand-in that draws the lamp as a colored bar on stdout: bar length
/// follows brightness, bar color follows hue and saturation.
pub struct TerminalLamp {
    bridge_address: String,
    on: bool,
    brightness: u8,
    hue: u16,
    saturation: u8,
}

impl TerminalLamp {
    pub fn new(bridge_address: impl Into<String>) -> Self {
        Self {
            bridge_address: bridge_address.into(),
            on: false,
            brightness: 0,
            hue: 0,
            saturation: 0,
        }
    }

    fn render(&self, lamp: &str) -> io::Result<()> {
        let bar = if self.on {
            // To keep the bar inside an 80 column terminal
            let (r, g, b) = hue_to_rgb(self.hue, self.saturation);
            "|".repeat(usize::from(self.brightness) / 4).truecolor(r, g, b)
        } else {
            "off".dimmed()
        };

        let mut stdout = io::stdout().lock();
        write!(
            stdout,
            "\r\x1b[2K{} bri {:>3} hue {:>5} {}",
            lamp.bold(),
            self.brightness,
            self.hue,
            bar
        )?;
        stdout.flush()
    }
}

impl LampBridge for TerminalLamp {
    fn connect(&mut self) -> Result<()> {
        info!(bridge = %self.bridge_address, "terminal lamp connected");
        Ok(())
    }

    fn set_light(&mut self, lamp: &str, attribute: LightAttribute) -> Result<()> {
        match attribute {
            LightAttribute::On(on) => self.on = on,
            LightAttribute::Brightness(brightness) => self.brightness = brightness,
            LightAttribute::Hue(hue) => self.hue = hue,
            LightAttribute::Saturation(saturation) => self.saturation = saturation,
        }
        self.render(lamp)?;
        Ok(())
    }
}

/// HSV to RGB at full value, with hue on the bridge's 0-65535 scale.
pub fn hue_to_rgb(hue: u16, saturation: u8) -> (u8, u8, u8) {
    let h = f64::from(hue) / 65536.0 * 6.0;
    let s = f64::from(saturation) / 255.0;
    let sector = h.floor();
    let f = h - sector;

    let p = 1.0 - s;
    let q = 1.0 - s * f;
    let t = 1.0 - s * (1.0 - f);

    let (r, g, b) = match sector as u8 {
        0 => (1.0, t, p),
        1 => (q, 1.0, p),
        2 => (p, 1.0, t),
        3 => (p, q, 1.0),
        4 => (t, p, 1.0),
        _ => (1.0, p, q),
    };

    let to_byte = |channel: f64| (channel * 255.0).round() as u8;
    (to_byte(r), to_byte(g), to_byte(b))
}
