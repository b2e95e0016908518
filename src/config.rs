use std::env;
use std::time::Duration;

use tracing::warn;

pub const DEFAULT_ADDR: &str = "127.0.0.1:6379";

const DEFAULT_MAX_FRAME_SIZE: usize = 512 * 1024 * 1024;

/// Upper bound on the bytes buffered for a single, still incomplete reply.
///
/// Read from `MAX_FRAME_SIZE`, falling back to 512 MiB.
pub fn max_frame_size() -> usize {
    match env::var("MAX_FRAME_SIZE") {
        Ok(value) => value.parse().unwrap_or_else(|_| {
            warn!(%value, "MAX_FRAME_SIZE is not a number, using the default");
            DEFAULT_MAX_FRAME_SIZE
        }),
        Err(_) => DEFAULT_MAX_FRAME_SIZE,
    }
}

/// Settings for a command connection.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address, e.g. "127.0.0.1:6379".
    pub addr: String,
    pub connect_timeout: Duration,
    /// Bound on writing a single request. Exceeding it tears the connection down.
    pub send_timeout: Duration,
    /// Bound on waiting for the next reply while requests are outstanding.
    pub receive_timeout: Duration,
    pub max_frame_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            addr: DEFAULT_ADDR.to_string(),
            connect_timeout: Duration::from_secs(3),
            send_timeout: Duration::from_secs(3),
            receive_timeout: Duration::from_secs(3),
            max_frame_size: max_frame_size(),
        }
    }
}

impl ClientConfig {
    pub fn new(addr: impl Into<String>) -> ClientConfig {
        ClientConfig {
            addr: addr.into(),
            ..Default::default()
        }
    }
}

/// Settings for the subscriber connection and its reconnect loop.
#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    pub addr: String,
    pub connect_timeout: Duration,
    /// Reconnect delays are drawn uniformly from `reconnect_min..=reconnect_max`.
    pub reconnect_min: Duration,
    pub reconnect_max: Duration,
    /// Interval between PINGs on an active connection.
    pub keepalive: Duration,
    pub max_frame_size: usize,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        SubscriberConfig {
            addr: DEFAULT_ADDR.to_string(),
            connect_timeout: Duration::from_secs(3),
            reconnect_min: Duration::from_millis(300),
            reconnect_max: Duration::from_millis(3000),
            keepalive: Duration::from_secs(10),
            max_frame_size: max_frame_size(),
        }
    }
}

impl SubscriberConfig {
    pub fn new(addr: impl Into<String>) -> SubscriberConfig {
        SubscriberConfig {
            addr: addr.into(),
            ..Default::default()
        }
    }
}
