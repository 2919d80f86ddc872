pub mod breathing;
pub mod window;

pub use breathing::{BreathingMapper, Evaluation, LampTarget};
pub use window::EnergyWindow;
