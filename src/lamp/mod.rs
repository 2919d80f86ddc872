pub mod terminal;

use crate::error::Result;
use crate::processing::LampTarget;

pub use terminal::TerminalLamp;

/// A single attribute write on a lamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightAttribute {
    On(bool),
    /// 0-255
    Brightness(u8),
    /// 0-65535, 43690 is blue and 65000 is close to red
    Hue(u16),
    Saturation(u8),
}

impl LightAttribute {
    /// Attribute name as used by the bridge API.
    pub fn key(&self) -> &'static str {
        match self {
            LightAttribute::On(_) => "on",
            LightAttribute::Brightness(_) => "bri",
            LightAttribute::Hue(_) => "hue",
            LightAttribute::Saturation(_) => "sat",
        }
    }
}

/// Narrow view of a smart-lamp bridge client.
pub trait LampBridge {
    /// Fails with [`crate::Error::PairingRequired`] until the bridge has
    /// authorised this client.
    fn connect(&mut self) -> Result<()>;

    fn set_light(&mut self, lamp: &str, attribute: LightAttribute) -> Result<()>;
}

impl<T: LampBridge + ?Sized> LampBridge for Box<T> {
    fn connect(&mut self) -> Result<()> {
        (**self).connect()
    }

    fn set_light(&mut self, lamp: &str, attribute: LightAttribute) -> Result<()> {
        (**self).set_light(lamp, attribute)
    }
}

/// Last brightness and hue sent to the lamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LampState {
    pub brightness: u8,
    pub hue: u16,
}

impl LampState {
    /// Whether the brightness moved by more than `deadband` units.
    pub fn needs_update(&self, target: &LampTarget, deadband: u8) -> bool {
        let delta = (i16::from(target.brightness) - i16::from(self.brightness)).abs();
        delta > i16::from(deadband)
    }

    pub fn record(&mut self, target: &LampTarget) {
        self.brightness = target.brightness;
        self.hue = target.hue;
    }
}
