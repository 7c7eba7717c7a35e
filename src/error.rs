use thiserror::Error;

/// Failure classes of the trading engine
///
/// Every per-symbol unit of work returns one of these. Only `Configuration`
/// is fatal, and only at startup; everything else is caught at the task
/// boundary and retried on the next scheduled tick.
#[derive(Debug, Error)]
pub enum BotError {
    /// Failed or timed-out venue / market data call
    #[error("network error: {0}")]
    TransientNetwork(String),

    /// Fewer candles than a computation requires ("no signal", not a failure)
    #[error("insufficient data: {0}")]
    DataInsufficient(String),

    /// Venue rejected the request or answered without an order id
    #[error("exchange rejected request: {0}")]
    ExchangeRejection(String),

    /// Local belief and venue truth diverged in a dangerous way
    /// (e.g. an open position without a protective stop)
    #[error("inconsistent state: {0}")]
    InconsistentState(String),

    /// Missing or invalid configuration
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl BotError {
    /// Whether this error should be pushed to the operator, not just logged
    pub fn should_alert(&self) -> bool {
        matches!(
            self,
            BotError::ExchangeRejection(_) | BotError::InconsistentState(_)
        )
    }

    pub fn is_data_insufficient(&self) -> bool {
        matches!(self, BotError::DataInsufficient(_))
    }
}

impl From<reqwest::Error> for BotError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            BotError::TransientNetwork(format!("request timed out: {}", e))
        } else {
            BotError::TransientNetwork(e.to_string())
        }
    }
}

impl From<config::ConfigError> for BotError {
    fn from(e: config::ConfigError) -> Self {
        BotError::Configuration(e.to_string())
    }
}

impl From<serde_json::Error> for BotError {
    fn from(e: serde_json::Error) -> Self {
        BotError::TransientNetwork(format!("malformed venue response: {}", e))
    }
}
