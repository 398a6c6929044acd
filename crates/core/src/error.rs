/// Result alias that carries the custom [`HapticError`] type.
pub type Result<T> = std::result::Result<T, HapticError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum HapticError {
    /// Free-form failure reported by a collaborator that has no richer
    /// taxonomy of its own.
    #[error("{0}")]
    Message(String),
    /// A value handed to the library was outside of its accepted range.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// The score file could not be decoded as a Standard MIDI File.
    #[error("malformed MIDI file: {0}")]
    Midi(#[from] midly::Error),
    /// The configuration file could not be decoded.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
    /// Scores timed in SMPTE frames carry no ticks-per-quarter division.
    #[error("unsupported score timing: {0}")]
    UnsupportedTiming(String),
    /// Discovery finished without a single usable output channel.
    #[error("no haptic output channels discovered")]
    NoChannels,
    /// A pulse violated the actuator contract before it was dispatched.
    #[error("invalid pulse: {0}")]
    InvalidPulse(&'static str),
    /// The actuator rejected or failed to perform a pulse.
    #[error("actuator failure on channel {channel}: {reason}")]
    Actuator { channel: usize, reason: String },
}

impl HapticError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    /// Creates an actuator failure for `channel`.
    pub fn actuator<T: Into<String>>(channel: usize, reason: T) -> Self {
        Self::Actuator {
            channel,
            reason: reason.into(),
        }
    }
}

impl From<&str> for HapticError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for HapticError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
