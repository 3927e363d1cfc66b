use thiserror::Error;

/// Failures surfaced to the operator, one per dashboard section or action.
///
/// None of these are retried. Callers convert them into a visible notice and
/// carry on with the rest of the view.
#[derive(Debug, Clone, Error)]
pub enum DashboardError {
    /// A required setting is missing or invalid. Fatal to the feature that
    /// needs it, never to the whole dashboard.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The network call itself could not complete (timeout, DNS, TLS, broker
    /// refused the connection).
    #[error("transport error: {0}")]
    Transport(String),

    /// The data store answered with a non-success status.
    #[error("remote error: HTTP {status}: {body}")]
    Remote { status: u16, body: String },

    /// The data store answered 2xx but the body was not what we asked for.
    #[error("decode error: {0}")]
    Decode(String),
}

impl DashboardError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }
}

impl From<reqwest::Error> for DashboardError {
    fn from(e: reqwest::Error) -> Self {
        // Keep the full source chain; reqwest's top-level message alone hides
        // whether it was DNS, TLS or a timeout.
        let mut msg = e.to_string();
        let mut source = std::error::Error::source(&e);
        while let Some(inner) = source {
            msg.push_str(": ");
            msg.push_str(&inner.to_string());
            source = inner.source();
        }
        Self::Transport(msg)
    }
}

impl From<rumqttc::ClientError> for DashboardError {
    fn from(e: rumqttc::ClientError) -> Self {
        Self::Transport(format!("MQTT client request failed: {e}"))
    }
}

impl From<rumqttc::ConnectionError> for DashboardError {
    fn from(e: rumqttc::ConnectionError) -> Self {
        Self::Transport(format!("MQTT connection failed: {e}"))
    }
}

pub type Result<T, E = DashboardError> = std::result::Result<T, E>;
