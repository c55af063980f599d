use crate::error::TransportError;
use crate::{DEFAULT_WS_URL, RECONNECT_DELAY, TOAST_DURATION};
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub endpoint: Url,
    pub reconnect_delay: Duration,
    pub toast_duration: Duration,
}

impl SessionConfig {
    pub fn with_endpoint(endpoint: &str) -> Result<Self, TransportError> {
        let endpoint = parse_endpoint(endpoint)?;
        Ok(Self {
            endpoint,
            ..Self::default()
        })
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: Url::parse(DEFAULT_WS_URL).expect("DEFAULT_WS_URL is a valid url"),
            reconnect_delay: RECONNECT_DELAY,
            toast_duration: TOAST_DURATION,
        }
    }
}

pub fn parse_endpoint(raw: &str) -> Result<Url, TransportError> {
    let url = Url::parse(raw).map_err(|e| TransportError::InvalidEndpoint {
        endpoint: raw.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(TransportError::InvalidEndpoint {
            endpoint: raw.to_string(),
            reason: format!("unsupported scheme `{other}`"),
        }),
    }
}
