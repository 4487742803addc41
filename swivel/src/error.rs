use reqwest::StatusCode;

/// Failure of a single request to the camera broker. Neither variant is
/// retried, the control loop absorbs both and carries on.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// The request never got a response, i.e. connection refused, DNS
    /// resolution or the request timeout elapsed.
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    /// The broker answered with something other than a success status.
    #[error("broker answered with status {status}")]
    Protocol {
        /// Status line returned by the broker.
        status: StatusCode,
    },
}

impl BrokerError {
    /// Status code of a protocol failure, `None` for transport failures.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            BrokerError::Transport(_) => None,
            BrokerError::Protocol { status } => Some(*status),
        }
    }
}

/// Failure to load or validate a swivel configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config sources could not be read or did not match the struct.
    #[error("failed to load config: {0}")]
    Load(#[from] config::ConfigError),
    /// The config parsed but a value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
    /// The broker client could not be built from the broker section.
    #[error("failed to build broker client: {0}")]
    Client(#[source] BrokerError),
}

/// Failure to hand a command to a running swivel controller.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SwivelError {
    /// The controller has been stopped and no longer accepts commands.
    #[error("swivel controller is stopped")]
    Stopped,
}
