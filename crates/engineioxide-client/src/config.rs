use std::time::Duration;

/// Reconnection policy applied after any transport loss that was not a
/// user-initiated close.
///
/// The delay before attempt `n` is `min(delay * 2^n, delay_max)` with no
/// jitter, `n` counting the retries already made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Maximum number of reconnection attempts.
    /// [`ReconnectConfig::UNLIMITED`] never gives up.
    pub attempts: u32,
    /// Base delay between reconnection attempts.
    /// Defaults to 5 seconds.
    pub delay: Duration,
    /// Saturation cap for the exponential backoff.
    /// Defaults to 25 seconds.
    pub delay_max: Duration,
    /// Master switch for the reconnection engine.
    pub enabled: bool,
}

impl ReconnectConfig {
    /// Sentinel for unlimited reconnection attempts
    pub const UNLIMITED: u32 = u32::MAX;

    /// Create a reconnection policy with the given attempts and delays
    pub fn new(attempts: u32, delay: Duration, delay_max: Duration) -> Self {
        Self {
            attempts,
            delay,
            delay_max,
            enabled: true,
        }
    }

    /// A policy that never reconnects
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Compute the backoff delay for the given attempt number,
    /// doubling from the base delay and saturating at `delay_max`.
    pub(crate) fn next_delay(&self, attempts_made: u32) -> Duration {
        let max = self.delay_max.as_millis() as u64;
        let mut delay = self.delay.as_millis() as u64;
        for _ in 0..attempts_made {
            if delay > max / 2 {
                delay = max;
                break;
            }
            delay *= 2;
        }
        Duration::from_millis(delay.min(max))
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            attempts: Self::UNLIMITED,
            delay: Duration::from_millis(5000),
            delay_max: Duration::from_millis(25000),
            enabled: true,
        }
    }
}

/// HTTP proxy with basic authentication, forwarded to the websocket
/// handshake as a `Proxy-Authorization` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyAuth {
    /// The proxy uri
    pub uri: String,
    /// The basic auth username
    pub username: String,
    /// The basic auth password
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// The path of the engine.io resource on the server.
    /// Defaults to "/socket.io/".
    pub req_path: String,

    /// The reconnection policy
    pub reconnect: ReconnectConfig,

    /// Optional http proxy with basic auth
    pub proxy: Option<ProxyAuth>,

    /// The maximum number of packets that can be buffered per connection
    /// before being sent to the server.
    ///
    /// Defaults to 128 packets
    pub max_buffer_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            req_path: "/socket.io/".to_string(),
            reconnect: ReconnectConfig::default(),
            proxy: None,
            max_buffer_size: 128,
        }
    }
}

impl EngineConfig {
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::new()
    }
}

pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
        }
    }

    /// The path of the engine.io resource on the server.
    /// Defaults to "/socket.io/".
    pub fn req_path(mut self, req_path: impl Into<String>) -> Self {
        self.config.req_path = req_path.into();
        self
    }

    /// The reconnection policy
    pub fn reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.config.reconnect = reconnect;
        self
    }

    /// Use an http proxy with basic auth
    pub fn proxy_basic_auth(
        mut self,
        uri: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.config.proxy = Some(ProxyAuth {
            uri: uri.into(),
            username: username.into(),
            password: password.into(),
        });
        self
    }

    /// The maximum number of packets that can be buffered per connection
    /// before being sent to the server.
    ///
    /// Defaults to 128 packets
    pub fn max_buffer_size(mut self, max_buffer_size: usize) -> Self {
        self.config.max_buffer_size = max_buffer_size;
        self
    }

    /// Build the config
    pub fn build(self) -> EngineConfig {
        self.config
    }
}

impl Default for EngineConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_saturates() {
        let config = ReconnectConfig::new(6, Duration::from_millis(1), Duration::from_millis(8));
        let delays: Vec<u64> = (0..6)
            .map(|n| config.next_delay(n).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 8, 8]);
    }

    #[test]
    fn backoff_defaults() {
        let config = ReconnectConfig::default();
        assert_eq!(config.next_delay(0), Duration::from_millis(5000));
        assert_eq!(config.next_delay(1), Duration::from_millis(10000));
        assert_eq!(config.next_delay(2), Duration::from_millis(20000));
        assert_eq!(config.next_delay(3), Duration::from_millis(25000));
        assert_eq!(config.next_delay(60), Duration::from_millis(25000));
    }
}
