use std::time::Duration;

/// Connection settings for a [`Client`](crate::Client).
#[derive(Debug, Clone)]
pub struct Config {
    /// What host to connect to, ipv4/6 or dns.
    pub host: String,
    /// What port to connect to, defaults to the standard redis port.
    pub port: u16,
    /// If a password is set, new connections AUTH with it before any user
    /// command is sent.
    pub password: Option<String>,
    /// How long to wait for a single connection attempt before moving on to
    /// the next candidate address. `None` defers to the operating system.
    pub connect_timeout: Option<Duration>,
    /// How long to wait before re-resolving and re-connecting after a failed
    /// attempt or a lost connection. Fixed delay, no backoff.
    pub reconnect_interval: Duration,
    /// How many times a command may be handed to the transport before a lost
    /// connection fails it permanently. Redis errors do not count; they are
    /// regular responses.
    pub command_retries: usize,
    /// Soft cap, in bytes, on a single batched write. Queued commands are
    /// copied into one buffer until the cap is reached; at least one command
    /// is always sent per batch.
    pub write_batch_target: usize,
}

impl Config {
    pub fn new(host: impl Into<String>) -> Config {
        Config {
            host: host.into(),
            port: 6379,
            password: None,
            connect_timeout: None,
            reconnect_interval: Duration::from_millis(500),
            command_retries: 3,
            write_batch_target: 1024 * 1024,
        }
    }
}

impl Default for Config {
    fn default() -> Config {
        Config::new("127.0.0.1")
    }
}
