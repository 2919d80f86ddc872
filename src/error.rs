use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// No radar device could be opened. Terminal for the acquisition service.
    #[error("failed to connect to radar device: {0}")]
    DeviceConnection(String),

    #[error("radar sensor error: {0}")]
    Sensor(String),

    /// The lamp bridge has not authorised this client yet.
    #[error("lamp bridge requires pairing")]
    PairingRequired,

    #[error("lamp bridge error: {0}")]
    Bridge(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}
