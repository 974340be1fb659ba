use thiserror::Error;

/// Errors raised while configuring the scheduler. Scheduling itself is
/// infallible.
#[derive(Debug, Error)]
pub enum DecisionError {
    #[error("config error: {0}")]
    Config(String),

    #[error("round burst must be greater than zero")]
    InvalidRoundBurst,

    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),

    #[error("custom strategies cannot be serialized")]
    CustomStrategyNotSerializable,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
